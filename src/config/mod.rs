mod basic;
mod session;

pub use basic::BasicConfig;
pub use session::SessionConfig;

use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::LazyLock};

/// Application configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Storage and logging settings (see `basic` table in config.toml).
    #[serde(default)]
    pub basic: BasicConfig,

    /// Coordinator settings: retry policy and change channel (see `session` table in config.toml).
    #[serde(default)]
    pub session: SessionConfig,
}

const DEFAULT_CONFIG_FILE: &str = "config.toml";

impl Config {
    /// Builds a Figment that merges defaults and a config TOML file.
    pub fn figment() -> Figment {
        let figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            figment.merge(Toml::file(DEFAULT_CONFIG_FILE))
        } else {
            figment
        }
    }

    /// Loads configuration by merging defaults and `config.toml` if present.
    pub fn from_optional_toml() -> Self {
        Self::load(&Self::figment())
    }

    fn load(figment: &Figment) -> Self {
        Self::from_figment(figment).unwrap_or_else(|err| {
            panic!("failed to load configuration (defaults + optional config.toml): {err}")
        })
    }

    /// Extracts a configuration from an explicit figment and validates it.
    pub fn from_figment(figment: &Figment) -> Result<Self, figment::Error> {
        let cfg: Self = figment.extract()?;
        if cfg.basic.database_url.trim().is_empty() {
            return Err(figment::Error::from(
                "basic.database_url must be set and non-empty".to_string(),
            ));
        }
        if cfg.session.channel_name.trim().is_empty() {
            return Err(figment::Error::from(
                "session.channel_name must be set and non-empty".to_string(),
            ));
        }
        Ok(cfg)
    }
}

/// Global, lazily-initialized configuration instance.
pub static CONFIG: LazyLock<Config> = LazyLock::new(Config::from_optional_toml);

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Toml;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::from_figment(&Figment::from(Serialized::defaults(Config::default())))
            .expect("defaults are valid");
        assert_eq!(cfg.basic.database_url, "sqlite://patients.db");
        assert_eq!(cfg.basic.loglevel, "info");
        assert_eq!(cfg.session.channel_name, "patients-sync");
        assert_eq!(cfg.session.retry_max_attempts, 3);
        assert_eq!(cfg.session.retry_initial_delay_ms, 200);
        assert!((cfg.session.retry_backoff_factor - 1.5).abs() < f32::EPSILON);
        assert!(cfg.session.deliver_self);
    }

    #[test]
    fn toml_overrides_single_fields() {
        let figment = Figment::from(Serialized::defaults(Config::default())).merge(Toml::string(
            r#"
            [session]
            retry_max_attempts = 5
            channel_name = "other"
            "#,
        ));
        let cfg = Config::from_figment(&figment).expect("valid config");
        assert_eq!(cfg.session.retry_max_attempts, 5);
        assert_eq!(cfg.session.channel_name, "other");
        assert_eq!(cfg.session.retry_initial_delay_ms, 200);
    }

    #[test]
    fn empty_channel_name_is_rejected() {
        let figment = Figment::from(Serialized::defaults(Config::default())).merge(Toml::string(
            r#"
            [session]
            channel_name = "  "
            "#,
        ));
        assert!(Config::from_figment(&figment).is_err());
    }

    #[test]
    #[should_panic(expected = "basic.database_url must be set")]
    fn startup_load_rejects_empty_database_url() {
        let figment = Figment::from(Serialized::defaults(Config::default())).merge(Toml::string(
            r#"
            [basic]
            database_url = ""
            "#,
        ));
        Config::load(&figment);
    }
}
