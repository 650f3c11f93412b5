use config::{Config, Environment, File};
use ng_driver_s7::S7ClientConfig;
use ng_s7_error::NGResult;
use serde::Deserialize;
use std::{ops::Deref, sync::Arc};

pub const DEFAULT_CONFIG_FILE_NAME: &str = "ng-s7.toml";

/// Layered settings: TOML file first, then `NG__SECTION__KEY` environment overrides.
#[derive(Debug, Clone)]
pub struct Settings(Arc<Inner>);

impl Deref for Settings {
    type Target = Inner;
    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl Settings {
    pub fn new(config_path: &str) -> NGResult<Self> {
        let builder = Config::builder()
            .add_source(File::with_name(config_path).required(false))
            .add_source(
                Environment::with_prefix("NG")
                    .separator("__")
                    .try_parsing(true),
            );
        let inner: Inner = builder.build()?.try_deserialize()?;
        Ok(Self(Arc::new(inner)))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Inner {
    #[serde(default)]
    pub general: General,
    /// Target PLC; `host` has no default
    pub plc: S7ClientConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct General {
    #[serde(default = "General::log_level_default")]
    pub log_level: String,
    /// Directory for the rolling log files
    #[serde(default = "General::log_dir_default")]
    pub log_dir: String,
}

impl Default for General {
    fn default() -> Self {
        General {
            log_level: General::log_level_default(),
            log_dir: General::log_dir_default(),
        }
    }
}

impl General {
    fn log_level_default() -> String {
        "info".into()
    }

    fn log_dir_default() -> String {
        "logs".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ng_driver_s7::{ConnectionMode, TsapConfig};
    use std::{env, fs};

    #[test]
    fn test_file_then_env_override() {
        let dir = env::temp_dir().join(format!("ng-s7-settings-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("ng-s7.toml");
        fs::write(
            &path,
            r#"
[general]
log_level = "debug"

[plc]
host = "192.168.0.10"

[plc.tsap]
kind = "rackSlot"
rack = 0
slot = 2

[plc.connection]
mode = "disposable"
"#,
        )
        .unwrap();

        let settings = Settings::new(path.to_str().unwrap()).unwrap();
        assert_eq!(settings.general.log_level, "debug");
        assert_eq!(settings.general.log_dir, "logs");
        assert_eq!(settings.plc.host, "192.168.0.10");
        assert_eq!(settings.plc.port, 102);
        assert_eq!(settings.plc.tsap, TsapConfig::RackSlot { rack: 0, slot: 2 });
        assert_eq!(settings.plc.connection.mode, ConnectionMode::Disposable);

        env::set_var("NG__PLC__PORT", "1102");
        let settings = Settings::new(path.to_str().unwrap()).unwrap();
        env::remove_var("NG__PLC__PORT");
        assert_eq!(settings.plc.port, 1102);
        assert_eq!(settings.plc.host, "192.168.0.10");

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_plc_section_fails() {
        let missing = env::temp_dir().join("ng-s7-does-not-exist.toml");
        assert!(Settings::new(missing.to_str().unwrap()).is_err());
    }
}
