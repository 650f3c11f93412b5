use clap::{Parser, Subcommand};
use ng_driver_s7::{S7Client, S7Codec, S7DataType};
use ng_s7_common::{parse_level, Logger, Settings, DEFAULT_CONFIG_FILE_NAME};
use ng_s7_error::{NGError, NGResult};
use serde_json::json;
use std::{collections::HashMap, env::current_dir, path::PathBuf};
use tracing::{info, instrument};

/// ng-s7 - read and write Siemens S7 PLC memory from the command line
///
/// The target PLC comes from the `[plc]` section of the settings file; any key
/// can be overridden with `NG__PLC__<KEY>` environment variables.
#[derive(Parser)]
#[command(name = "ng-s7")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Siemens S7 command-line client", long_about = None)]
struct Cli {
    /// Settings file; defaults to 'ng-s7.toml' in the working directory
    #[arg(short, long, env = "NG_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read one or more addresses; several addresses go through one optimized batch
    Read {
        /// Value type applied to every address
        #[arg(short = 't', long = "type", default_value = "word")]
        data_type: S7DataType,
        #[arg(required = true)]
        addresses: Vec<String>,
    },
    /// Write a single value
    Write {
        #[arg(short = 't', long = "type")]
        data_type: S7DataType,
        address: String,
        /// Decimal, `0x` hex for unsigned types, or true/false for bool
        value: String,
    },
    /// Connect, negotiate and report the granted PDU size
    Ping,
}

#[inline]
fn driver_err(e: ng_driver_s7::Error) -> NGError {
    NGError::DriverError(e.to_string())
}

fn print_json(value: &serde_json::Value) -> NGResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[instrument(name = "read", skip(client))]
async fn read(client: &S7Client, data_type: S7DataType, addresses: Vec<String>) -> NGResult<()> {
    if let [address] = addresses.as_slice() {
        let value = client.read(address, data_type).await.map_err(driver_err)?;
        return print_json(&json!({
            "address": address,
            "type": data_type,
            "value": value,
        }));
    }

    let request: HashMap<String, S7DataType> = addresses
        .into_iter()
        .map(|address| (address, data_type))
        .collect();
    let result = client.read_batch(&request).await;
    print_json(&serde_json::to_value(&result)?)?;
    result.ensure_success().map_err(driver_err)
}

async fn write(
    client: &S7Client,
    data_type: S7DataType,
    address: &str,
    value: &str,
) -> NGResult<()> {
    let value = S7Codec::parse_value(value, data_type).map_err(driver_err)?;
    client.write(address, value).await.map_err(driver_err)?;
    info!(address, %value, "value written");
    print_json(&json!({ "address": address, "written": value }))
}

async fn ping(client: &S7Client) -> NGResult<()> {
    client.connect().await.map_err(driver_err)?;
    let pdu_size = client.session().negotiated_pdu_size().await;
    client.disconnect().await;
    print_json(&json!({
        "endpoint": client.config().endpoint(),
        "pduSize": pdu_size,
    }))
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> NGResult<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(p) => p,
        None => {
            let dir = current_dir()
                .map_err(|e| NGError::from(format!("Failed to get current directory: {e}")))?;
            dir.join(DEFAULT_CONFIG_FILE_NAME)
        }
    };
    let settings = Settings::new(&config_path.to_string_lossy())?;

    let mut logger = Logger::new(Some(parse_level(&settings.general.log_level)?));
    logger.initialize(&settings.general.log_dir)?;

    let client = S7Client::new(settings.plc.clone())
        .map_err(|e| NGError::ConfigurationError(e.to_string()))?;

    let outcome = match cli.command {
        Command::Read {
            data_type,
            addresses,
        } => read(&client, data_type, addresses).await,
        Command::Write {
            data_type,
            address,
            value,
        } => write(&client, data_type, &address, &value).await,
        Command::Ping => ping(&client).await,
    };
    client.disconnect().await;
    outcome
}
