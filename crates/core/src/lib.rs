pub mod config;
pub mod config_loader;

pub use config::{
    AppConfig, DirectoryConfig, HyperliquidConfig, TelegramConfig, WorkerConfig,
    MAINNET_API_URL, TESTNET_API_URL,
};
pub use config_loader::ConfigLoader;
