use serde::{Deserialize, Serialize};

pub const MAINNET_API_URL: &str = "https://api.hyperliquid.xyz";
pub const TESTNET_API_URL: &str = "https://api.hyperliquid-testnet.xyz";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub worker: WorkerConfig,
    pub hyperliquid: HyperliquidConfig,
    pub directory: DirectoryConfig,
    pub telegram: TelegramConfig,
}

/// Settings for the external worker process spawned per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Executable invoked as `<command> trade --config <path> --strategy <name> --db-url <url>`.
    pub command: String,
    pub default_strategy: String,
    /// File name of the strategy asset copied into each user's working directory.
    pub strategy_asset: String,
    /// Grace period after spawn before the worker counts as started.
    pub start_grace_secs: u64,
    /// Bound on graceful termination before escalating to a forced kill.
    pub stop_timeout_secs: u64,
    /// Bound on one-shot command execution against a user's config.
    pub exec_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HyperliquidConfig {
    pub api_url: String,
    pub testnet_api_url: String,
}

impl HyperliquidConfig {
    #[must_use]
    pub fn resolve_url(&self, testnet: bool) -> &str {
        if testnet {
            &self.testnet_api_url
        } else {
            &self.api_url
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    pub database_url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token; `TELEGRAM_BOT_TOKEN` takes precedence at startup.
    pub token: Option<String>,
    /// Chat ids allowed to run admin commands; extended by `ADMIN_USER_IDS`.
    #[serde(default)]
    pub admin_ids: Vec<i64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            worker: WorkerConfig {
                command: "freqtrade".to_string(),
                default_strategy: "HyperliquidSampleStrategy".to_string(),
                strategy_asset: "hyperliquid_sample_strategy.py".to_string(),
                start_grace_secs: 5,
                stop_timeout_secs: 30,
                exec_timeout_secs: 60,
            },
            hyperliquid: HyperliquidConfig {
                api_url: MAINNET_API_URL.to_string(),
                testnet_api_url: TESTNET_API_URL.to_string(),
            },
            directory: DirectoryConfig {
                database_url: "sqlite://hypertrader.db?mode=rwc".to_string(),
                max_connections: 5,
            },
            telegram: TelegramConfig {
                token: None,
                admin_ids: Vec::new(),
            },
        }
    }
}
