pub mod client;
pub mod exchange;
pub mod info;
pub mod signing;
pub mod wallet;

pub use client::HyperliquidClient;
pub use exchange::OrderSpec;
pub use info::{BalanceSnapshot, PositionSummary};
pub use wallet::{normalize_private_key, parse_private_key, wallet_address, CredentialError};
