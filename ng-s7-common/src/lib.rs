//! Runtime plumbing for the ng-s7 tools: structured logging and layered settings.
mod logger;
mod settings;

pub use logger::{parse_level, Logger};
pub use settings::{General, Settings, DEFAULT_CONFIG_FILE_NAME};

pub use ng_s7_error::{NGError, NGResult};
