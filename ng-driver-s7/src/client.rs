use crate::{
    codec::S7Codec,
    protocol::{
        error::{Error, Result},
        frame::{parse_s7_address, S7Address, S7DataType, S7DataValue, S7VarSpec},
        optimizer::{optimize, AddressBlock, BlockKey, OptimizerConfig},
        session::{Session, SessionConfig, SessionLifecycleState},
        telegram::extract_value,
    },
    types::S7ClientConfig,
};
use backoff::backoff::Backoff;
use bytes::Bytes;
use ng_s7_sdk::{build_exponential_backoff, ConnectionMode};
use serde::Serialize;
use std::{
    collections::{BTreeMap, HashMap},
    future::Future,
};
use tokio::{sync::watch, time::sleep};
use tracing::{debug, info, warn};

/// Outcome of [`S7Client::read_batch`].
///
/// Every requested address has an entry; `None` marks an address that failed to
/// parse or whose block could not be read.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReadResult {
    pub success: bool,
    /// Per-item diagnostics joined with `"; "`, empty on full success
    pub message: String,
    pub values: HashMap<String, (S7DataType, Option<S7DataValue>)>,
}

impl BatchReadResult {
    #[inline]
    pub fn value(&self, address: &str) -> Option<S7DataValue> {
        self.values.get(address).and_then(|(_, v)| *v)
    }

    /// `Err(PartialBatchFailure)` unless every address was read.
    pub fn ensure_success(&self) -> Result<()> {
        let failed = self.values.values().filter(|(_, v)| v.is_none()).count();
        if failed == 0 {
            Ok(())
        } else {
            Err(Error::PartialBatchFailure {
                failed,
                total: self.values.len(),
            })
        }
    }
}

/// Outcome of [`S7Client::write_batch`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchWriteResult {
    pub success: bool,
    pub message: String,
    /// Failed address -> error text
    pub failures: HashMap<String, String>,
    /// Number of addresses in the request
    pub total: usize,
}

impl BatchWriteResult {
    pub fn ensure_success(&self) -> Result<()> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(Error::PartialBatchFailure {
                failed: self.failures.len(),
                total: self.total,
            })
        }
    }
}

fn join_diagnostics(diagnostics: BTreeMap<String, String>) -> String {
    diagnostics
        .into_iter()
        .map(|(address, reason)| format!("{address}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// S7 client: one PLC, one session.
///
/// In persistent mode the session stays open between calls and is re-established
/// on demand when `autoReconnect` is set. In disposable mode every call connects,
/// runs and disconnects.
#[derive(Debug)]
pub struct S7Client {
    config: S7ClientConfig,
    optimizer: OptimizerConfig,
    session: Session,
}

impl S7Client {
    pub fn new(config: S7ClientConfig) -> Result<Self> {
        config.validate()?;
        let session = Session::new(SessionConfig::try_from(&config)?);
        let optimizer =
            OptimizerConfig::default().with_max_block_size(u32::from(config.max_item_bytes));
        Ok(Self {
            config,
            optimizer,
            session,
        })
    }

    #[inline]
    pub fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    #[inline]
    pub fn config(&self) -> &S7ClientConfig {
        &self.config
    }

    #[inline]
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn lifecycle(&self) -> watch::Receiver<SessionLifecycleState> {
        self.session.lifecycle()
    }

    pub async fn connect(&self) -> Result<()> {
        self.session.connect().await
    }

    pub async fn disconnect(&self) {
        self.session.disconnect().await
    }

    /// Reconnect with the configured backoff. `max_attempts` bounds the connect calls.
    async fn reconnect(&self) -> Result<()> {
        let policy = &self.config.connection.backoff;
        let mut backoff = build_exponential_backoff(policy);
        let mut last = Error::ErrNotActive;
        let mut attempt: u32 = 0;
        while policy.allows(attempt) {
            if attempt > 0 {
                let Some(delay) = backoff.next_backoff() else {
                    break;
                };
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %last, "S7 reconnect retry");
                sleep(delay).await;
            }
            attempt += 1;
            match self.session.connect().await {
                Ok(()) => {
                    info!(attempt, endpoint = %self.config.endpoint(), "S7 reconnected");
                    return Ok(());
                }
                Err(e) => last = e,
            }
        }
        Err(last)
    }

    /// Run `op` under the configured connection mode.
    async fn run<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.config.connection.mode {
            ConnectionMode::Disposable => {
                self.session.connect().await?;
                let result = op().await;
                self.session.disconnect().await;
                result
            }
            ConnectionMode::Persistent => {
                let auto = self.config.connection.auto_reconnect;
                if !self.session.is_ready() {
                    if !auto {
                        return Err(Error::ErrNotActive);
                    }
                    self.reconnect().await?;
                }
                match op().await {
                    Err(e) if auto && e.is_connection_error() => {
                        warn!(error = %e, "S7 connection lost, reconnecting");
                        self.reconnect().await?;
                        op().await
                    }
                    other => other,
                }
            }
        }
    }

    /// Read one typed value.
    pub async fn read(&self, address: &str, data_type: S7DataType) -> Result<S7DataValue> {
        let addr = parse_s7_address(address, data_type)?;
        let bytes = self.read_address_bytes(&addr).await?;
        extract_value(&bytes, 0, &addr, self.config.endianness)
    }

    async fn read_address_bytes(&self, addr: &S7Address) -> Result<Bytes> {
        let session = &self.session;
        let spec = S7VarSpec::read_of(addr);
        let spec_ref = &spec;
        self.run(move || session.read_spec(spec_ref)).await
    }

    /// Write one typed value; the address is parsed with the value's type.
    pub async fn write(&self, address: &str, value: S7DataValue) -> Result<()> {
        let addr = parse_s7_address(address, value.data_type())?;
        let data = S7Codec::encode(&value, &addr, self.config.endianness)?;
        let session = &self.session;
        let (addr_ref, data_ref) = (&addr, &data[..]);
        self.run(move || session.write_item(addr_ref, data_ref))
            .await
    }

    /// Raw bytes starting at the address' byte offset.
    pub async fn read_bytes(&self, address: &str, len: u32) -> Result<Bytes> {
        let addr = S7Address::try_from(address)?;
        let session = &self.session;
        let area = addr.area.wire_code();
        let (db, start) = (addr.db_number, addr.byte_address);
        self.run(move || session.read_area(area, db, start, len))
            .await
    }

    /// Read many addresses with as few requests as the optimizer allows.
    pub async fn read_batch(&self, addresses: &HashMap<String, S7DataType>) -> BatchReadResult {
        let mut diagnostics = BTreeMap::new();
        let mut parsed = Vec::with_capacity(addresses.len());
        for (text, data_type) in addresses {
            match parse_s7_address(text, *data_type) {
                Ok(addr) => parsed.push(addr),
                Err(e) => {
                    diagnostics.insert(text.clone(), e.to_string());
                }
            }
        }
        let blocks = optimize(&parsed, &self.optimizer);
        debug!(
            requested = addresses.len(),
            parsed = parsed.len(),
            blocks = blocks.len(),
            "S7 batch read plan"
        );

        let session = &self.session;
        let blocks_ref = &blocks;
        let fetched = self.run(move || fetch_blocks(session, blocks_ref)).await;

        let mut values: HashMap<String, (S7DataType, Option<S7DataValue>)> = addresses
            .iter()
            .map(|(text, data_type)| (text.clone(), (*data_type, None)))
            .collect();

        match fetched {
            Ok(cache) => {
                for block in &blocks {
                    let bytes = match cache.get(&block.key()) {
                        Some(Ok(bytes)) => bytes,
                        Some(Err(e)) => {
                            for member in &block.members {
                                diagnostics.insert(member.text.clone(), e.to_string());
                            }
                            continue;
                        }
                        None => continue,
                    };
                    for member in &block.members {
                        match extract_value(bytes, block.offset_of(member), member, self.config.endianness)
                        {
                            Ok(value) => {
                                if let Some(slot) = values.get_mut(&member.text) {
                                    slot.1 = Some(value);
                                }
                            }
                            Err(e) => {
                                diagnostics.insert(member.text.clone(), e.to_string());
                            }
                        }
                    }
                }
            }
            Err(e) => {
                for text in addresses.keys() {
                    diagnostics
                        .entry(text.clone())
                        .or_insert_with(|| e.to_string());
                }
            }
        }

        BatchReadResult {
            success: diagnostics.is_empty(),
            message: join_diagnostics(diagnostics),
            values,
        }
    }

    /// Write many addresses, one request per address.
    pub async fn write_batch(&self, values: &HashMap<String, S7DataValue>) -> BatchWriteResult {
        let mut diagnostics = BTreeMap::new();
        let mut items: Vec<(S7Address, Bytes)> = Vec::with_capacity(values.len());
        for (text, value) in values {
            let encoded = parse_s7_address(text, value.data_type()).and_then(|addr| {
                S7Codec::encode(value, &addr, self.config.endianness).map(|data| (addr, data))
            });
            match encoded {
                Ok(item) => items.push(item),
                Err(e) => {
                    diagnostics.insert(text.clone(), e.to_string());
                }
            }
        }

        let session = &self.session;
        let items_ref = &items;
        match self.run(move || write_items(session, items_ref)).await {
            Ok(outcomes) => {
                for (text, outcome) in outcomes {
                    if let Err(e) = outcome {
                        diagnostics.insert(text, e.to_string());
                    }
                }
            }
            Err(e) => {
                for (addr, _) in &items {
                    diagnostics.insert(addr.text.clone(), e.to_string());
                }
            }
        }

        BatchWriteResult {
            success: diagnostics.is_empty(),
            failures: diagnostics
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            message: join_diagnostics(diagnostics),
            total: values.len(),
        }
    }
}

/// Read every block. Item-level failures stay with their block; a connection
/// failure aborts so the caller can reconnect.
async fn fetch_blocks(
    session: &Session,
    blocks: &[AddressBlock],
) -> Result<HashMap<BlockKey, Result<Bytes>>> {
    let mut cache = HashMap::with_capacity(blocks.len());
    for block in blocks {
        let key = block.key();
        if cache.contains_key(&key) {
            continue;
        }
        match session
            .read_area(block.area.wire_code(), block.db_number, block.start, block.length)
            .await
        {
            Err(e) if e.is_connection_error() => return Err(e),
            outcome => {
                if let Err(e) = &outcome {
                    debug!(?key, error = %e, "S7 block read failed");
                }
                cache.insert(key, outcome);
            }
        }
    }
    Ok(cache)
}

async fn write_items(
    session: &Session,
    items: &[(S7Address, Bytes)],
) -> Result<Vec<(String, Result<()>)>> {
    let mut outcomes = Vec::with_capacity(items.len());
    for (addr, data) in items {
        match session.write_item(addr, data).await {
            Err(e) if e.is_connection_error() => return Err(e),
            outcome => outcomes.push((addr.text.clone(), outcome)),
        }
    }
    Ok(outcomes)
}
