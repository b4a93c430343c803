//! Layered configuration: built-in defaults, then an optional
//! `config/default.*` file, then `TCPSUB_*` environment variables
//! (`TCPSUB_BROKER__MAX_CONNECTIONS=10`).

mod settings;

use std::path::Path;

use config::{Config, ConfigError, Environment, File};

use crate::config::settings::PartialSettings;

pub use settings::{BrokerSettings, LoggingSettings, ServerSettings, Settings};

const DEFAULT_CONFIG_FILE: &str = "config/default";
const ENV_PREFIX: &str = "TCPSUB";

/// Loads the configuration from the default file and environment variables
/// and merges it over `Settings::default()`.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(Path::new(DEFAULT_CONFIG_FILE))
}

/// Same as [`load_config`] but reads the file source from `path`
/// (extension optional, the file itself is optional).
pub fn load_config_from(path: &Path) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(&path.to_string_lossy()).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(Settings::default().merge(partial))
}
