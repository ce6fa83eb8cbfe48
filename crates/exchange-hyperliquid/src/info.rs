use crate::client::HyperliquidClient;
use anyhow::{Context, Result};
use serde_json::{json, Value};

/// Parsed view of a user's `clearinghouseState` response.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceSnapshot {
    pub account_value: f64,
    pub free_collateral: f64,
    pub positions: Vec<PositionSummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionSummary {
    pub asset: String,
    pub size: f64,
    pub side: &'static str,
    pub entry_price: Option<f64>,
}

impl BalanceSnapshot {
    /// Extracts balances and open positions from a raw `clearinghouseState`
    /// document.
    ///
    /// # Errors
    ///
    /// Returns an error if the margin summary is missing, which indicates the
    /// address is unknown to the exchange.
    pub fn from_user_state(state: &Value) -> Result<Self> {
        let margin = state
            .get("marginSummary")
            .context("user state missing marginSummary")?;
        let account_value = number_field(margin, "accountValue").unwrap_or(0.0);
        let free_collateral = state
            .get("withdrawable")
            .and_then(as_number)
            .unwrap_or(0.0);

        let positions = state
            .get("assetPositions")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| entry.get("position"))
                    .filter_map(position_summary)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            account_value,
            free_collateral,
            positions,
        })
    }
}

fn position_summary(position: &Value) -> Option<PositionSummary> {
    let asset = position.get("coin")?.as_str()?.to_string();
    let size = number_field(position, "szi")?;
    if size == 0.0 {
        return None;
    }
    Some(PositionSummary {
        asset,
        size,
        side: if size > 0.0 { "long" } else { "short" },
        entry_price: number_field(position, "entryPx"),
    })
}

fn number_field(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(as_number)
}

// Hyperliquid encodes most numbers as strings.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

impl HyperliquidClient {
    /// Exchange metadata (tradable assets and their indices).
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    pub async fn get_meta(&self) -> Result<Value> {
        self.post("/info", json!({"type": "meta"})).await
    }

    /// Full clearinghouse state for an address.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    pub async fn get_user_state(&self, address: &str) -> Result<Value> {
        self.post("/info", json!({"type": "clearinghouseState", "user": address}))
            .await
    }

    /// Open orders for an address.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    pub async fn get_open_orders(&self, address: &str) -> Result<Value> {
        self.post("/info", json!({"type": "openOrders", "user": address}))
            .await
    }

    /// Live round-trip balance check used to validate a freshly captured
    /// credential.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or an unrecognized response.
    pub async fn verify_connection(&self, address: &str) -> Result<BalanceSnapshot> {
        let state = self.get_user_state(address).await?;
        BalanceSnapshot::from_user_state(&state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canned_state() -> Value {
        json!({
            "marginSummary": {"accountValue": "1250.5", "totalNtlPos": "310.0"},
            "withdrawable": "940.25",
            "assetPositions": [
                {"position": {"coin": "BTC", "szi": "0.01", "entryPx": "65000.0"}},
                {"position": {"coin": "ETH", "szi": "-2.5", "entryPx": "3200.5"}},
                {"position": {"coin": "SOL", "szi": "0.0"}}
            ]
        })
    }

    #[test]
    fn parses_balances_and_positions() {
        let snapshot = BalanceSnapshot::from_user_state(&canned_state()).unwrap();
        assert!((snapshot.account_value - 1250.5).abs() < f64::EPSILON);
        assert!((snapshot.free_collateral - 940.25).abs() < f64::EPSILON);

        assert_eq!(snapshot.positions.len(), 2);
        assert_eq!(snapshot.positions[0].asset, "BTC");
        assert_eq!(snapshot.positions[0].side, "long");
        assert_eq!(snapshot.positions[1].side, "short");
        assert_eq!(snapshot.positions[1].entry_price, Some(3200.5));
    }

    #[test]
    fn missing_margin_summary_is_an_error() {
        assert!(BalanceSnapshot::from_user_state(&json!({})).is_err());
    }

    #[test]
    fn empty_positions_tolerated() {
        let state = json!({"marginSummary": {"accountValue": "0"}, "withdrawable": "0"});
        let snapshot = BalanceSnapshot::from_user_state(&state).unwrap();
        assert!(snapshot.positions.is_empty());
        assert_eq!(snapshot.account_value, 0.0);
    }
}
