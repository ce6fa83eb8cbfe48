use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection lifecycle of a user, persisted as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Unconnected,
    Connected,
    Trading,
}

impl ConnectionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unconnected => "unconnected",
            Self::Connected => "connected",
            Self::Trading => "trading",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unconnected" => Some(Self::Unconnected),
            "connected" => Some(Self::Connected),
            "trading" => Some(Self::Trading),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record per user, keyed by chat id with a secondary wallet lookup.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub chat_id: i64,
    pub wallet_address: String,
    pub private_key: String,
    pub status: ConnectionStatus,
    pub balance: f64,
    pub free_collateral: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status_changed_at: DateTime<Utc>,
}

pub(crate) type UserRow = (i64, String, String, String, f64, f64, i64, i64, i64);

impl UserRecord {
    pub(crate) fn from_row(row: UserRow) -> Self {
        let (
            chat_id,
            wallet_address,
            private_key,
            status,
            balance,
            free_collateral,
            created_at,
            updated_at,
            status_changed_at,
        ) = row;
        Self {
            chat_id,
            wallet_address,
            private_key,
            status: ConnectionStatus::parse(&status).unwrap_or(ConnectionStatus::Unconnected),
            balance,
            free_collateral,
            created_at: timestamp(created_at),
            updated_at: timestamp(updated_at),
            status_changed_at: timestamp(status_changed_at),
        }
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
