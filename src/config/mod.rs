//! The `config` module loads settings shared by the broker and the four
//! sender/receiver programs.

mod settings;

use config::{Config, ConfigError, Environment, File};

pub use settings::{
    BrokerSettings, DEFAULT_SHARED_SECRET, HttpSettings, IntegritySettings, LogSettings,
    PartialSettings, QueueSettings, Settings,
};

/// Prefix for environment overrides, e.g. `PIZZALINK_HTTP__PORT=9000`.
pub const ENV_PREFIX: &str = "PIZZALINK";

/// Loads the configuration from `.env`, the default file and environment
/// variables, in increasing order of precedence, then fills the gaps with
/// `Settings::default()`.
pub fn load_config() -> Result<Settings, ConfigError> {
    let _ = dotenvy::dotenv();
    load_config_from("config/default")
}

/// Same as [`load_config`] with an explicit config file stem, without
/// reading `.env`.
pub fn load_config_from(file: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(file).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;
    let settings = partial.merge_onto(Settings::default());

    if settings.integrity.shared_secret.is_empty() {
        return Err(ConfigError::Message(
            "integrity.shared_secret must not be empty".to_string(),
        ));
    }
    Ok(settings)
}

#[cfg(test)]
mod tests;
