use crate::config::AppConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads application configuration by layering the TOML file and
    /// `HYPERTRADER_`-prefixed environment variables over built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be read or parsed.
    pub fn load() -> Result<AppConfig> {
        Self::load_from("config/Hypertrader.toml")
    }

    /// Loads application configuration from a specific TOML path.
    ///
    /// The file is optional; missing files fall back to defaults so a fresh
    /// checkout runs with only environment variables set.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be parsed.
    pub fn load_from(path: &str) -> Result<AppConfig> {
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("HYPERTRADER_").split("__"))
            .extract()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_config_file() {
        figment::Jail::expect_with(|_jail| {
            let config = ConfigLoader::load_from("does/not/exist.toml").unwrap();
            assert_eq!(config.worker.stop_timeout_secs, 30);
            assert_eq!(config.directory.max_connections, 5);
            assert!(config.telegram.token.is_none());
            Ok(())
        });
    }

    #[test]
    fn toml_file_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "Hypertrader.toml",
                r#"
                [worker]
                command = "worker-bin"
                default_strategy = "Momentum"
                strategy_asset = "momentum.py"
                start_grace_secs = 2
                stop_timeout_secs = 10
                exec_timeout_secs = 15
                "#,
            )?;
            let config = ConfigLoader::load_from("Hypertrader.toml").unwrap();
            assert_eq!(config.worker.command, "worker-bin");
            assert_eq!(config.worker.start_grace_secs, 2);
            // Sections absent from the file keep their defaults.
            assert_eq!(config.directory.max_connections, 5);
            Ok(())
        });
    }

    #[test]
    fn env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("HYPERTRADER_WORKER__COMMAND", "env-worker");
            let config = ConfigLoader::load_from("does/not/exist.toml").unwrap();
            assert_eq!(config.worker.command, "env-worker");
            Ok(())
        });
    }
}
