use crate::client::HyperliquidClient;
use crate::signing::{sign_action, signature_to_hex};
use anyhow::{Context, Result};
use ethers::signers::LocalWallet;
use serde_json::{json, Value};
use tracing::debug;

/// A single limit order against one asset index.
#[derive(Debug, Clone)]
pub struct OrderSpec {
    pub asset: u32,
    pub is_buy: bool,
    pub price: String,
    pub size: String,
    pub reduce_only: bool,
}

impl HyperliquidClient {
    /// Places a good-till-cancel limit order.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a rejected order.
    pub async fn place_order(&self, wallet: &LocalWallet, order: &OrderSpec) -> Result<Value> {
        let action = json!({
            "type": "order",
            "orders": [{
                "a": order.asset,
                "b": order.is_buy,
                "p": order.price,
                "s": order.size,
                "r": order.reduce_only,
                "t": {"limit": {"tif": "Gtc"}},
            }],
            "grouping": "na",
        });
        self.post_action(wallet, action).await
    }

    /// Updates leverage for one asset.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or rejection.
    pub async fn update_leverage(
        &self,
        wallet: &LocalWallet,
        asset: u32,
        leverage: u32,
        cross_margin: bool,
    ) -> Result<Value> {
        let action = json!({
            "type": "updateLeverage",
            "asset": asset,
            "isCross": cross_margin,
            "leverage": leverage,
        });
        self.post_action(wallet, action).await
    }

    async fn post_action(&self, wallet: &LocalWallet, action: Value) -> Result<Value> {
        let nonce = u64::try_from(chrono::Utc::now().timestamp_millis())
            .context("timestamp must be positive")?;
        let signature = sign_action(wallet, &action, nonce).await?;

        let body = json!({
            "action": action,
            "nonce": nonce,
            "signature": signature_to_hex(&signature),
        });
        let response = self.post("/exchange", body).await?;

        let status = response
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        if status != "ok" {
            let detail = response
                .get("response")
                .map(ToString::to_string)
                .unwrap_or_default();
            anyhow::bail!("exchange action rejected: {status} {detail}");
        }
        debug!(status, "exchange action accepted");
        Ok(response)
    }
}
