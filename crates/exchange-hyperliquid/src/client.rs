use anyhow::Result;
use governor::{clock::DefaultClock, state::InMemoryState, Quota, RateLimiter};
use reqwest::Client;
use std::num::NonZeroU32;
use std::sync::Arc;

type DirectRateLimiter = RateLimiter<governor::state::direct::NotKeyed, InMemoryState, DefaultClock>;

/// Rate-limited HTTP client for the Hyperliquid REST API.
#[derive(Clone)]
pub struct HyperliquidClient {
    http_client: Client,
    base_url: String,
    rate_limiter: Arc<DirectRateLimiter>,
}

impl HyperliquidClient {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        // 1200 requests per minute = 20 per second
        let quota = Quota::per_second(NonZeroU32::new(20).unwrap());
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Self {
            http_client: Client::new(),
            base_url,
            rate_limiter,
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POSTs a JSON body and returns the parsed JSON response.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-JSON response.
    pub async fn post(&self, endpoint: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        self.rate_limiter.until_ready().await;
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self.http_client.post(&url).json(&body).send().await?;
        let json = response.error_for_status()?.json().await?;
        Ok(json)
    }
}
