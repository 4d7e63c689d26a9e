//! REST client for the order-submission broker.
//!
//! Covers the three contract calls the engine consumes: open-position
//! listing (authoritative for reconciliation), notional order submission,
//! and position close. Every call carries a timeout and bounded retry with
//! exponential backoff; order submissions are idempotent through a client
//! order id.

use std::time::Duration;

use common::{BrokerPosition, Error, Result, Side};
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::json;
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

const PAPER_BASE_URL: &str = "https://paper-api.broker.example.com";
const LIVE_BASE_URL: &str = "https://api.broker.example.com";
const BACKOFF_BASE_MS: u64 = 250;

fn resolve_base_url(configured: &str, use_paper: bool) -> String {
    let trimmed = configured.trim().trim_end_matches('/');
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }
    if let Ok(override_url) = std::env::var("BROKER_API_BASE_URL") {
        let normalized = override_url.trim().trim_end_matches('/').to_string();
        if !normalized.is_empty() {
            info!("Using BROKER_API_BASE_URL override: {}", normalized);
            return normalized;
        }
    }
    if use_paper {
        PAPER_BASE_URL.to_string()
    } else {
        LIVE_BASE_URL.to_string()
    }
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    equity: f64,
}

#[derive(Debug, Clone)]
pub struct BrokerRestClient {
    client: Client,
    base_url: String,
    max_retries: u32,
}

impl BrokerRestClient {
    pub fn new(
        configured_base_url: &str,
        use_paper: bool,
        request_timeout_ms: u64,
        max_retries: u32,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_timeout_ms))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: resolve_base_url(configured_base_url, use_paper),
            max_retries,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send one request with bounded retry. 5xx and transport errors retry
    /// with exponential backoff; 4xx responses fail immediately.
    async fn request_with_retry(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let mut attempt = 0u32;
        loop {
            let mut req = self.client.request(method.clone(), self.url(path));
            if let Some(ref payload) = body {
                req = req.json(payload);
            }

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_server_error() && attempt < self.max_retries {
                        attempt += 1;
                        warn!(path, status = status.as_u16(), attempt, "broker retry");
                        sleep(backoff_delay(attempt)).await;
                        continue;
                    }
                    if !status.is_success() {
                        let body = resp.text().await.unwrap_or_default();
                        return Err(Error::Broker {
                            status: status.as_u16(),
                            message: body,
                        });
                    }
                    return Ok(resp);
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        attempt += 1;
                        warn!(path, error = %e, attempt, "broker retry");
                        sleep(backoff_delay(attempt)).await;
                        continue;
                    }
                    return Err(Error::Http(e.to_string()));
                }
            }
        }
    }

    /// Authoritative list of open positions at the broker.
    pub async fn get_open_positions(&self) -> Result<Vec<BrokerPosition>> {
        let resp = self
            .request_with_retry(Method::GET, "/v2/positions", None)
            .await?;
        resp.json::<Vec<BrokerPosition>>()
            .await
            .map_err(|e| Error::Http(e.to_string()))
    }

    /// Submit a notional market order. Returns the broker order id.
    pub async fn submit_order(&self, ticker: &str, side: Side, notional: f64) -> Result<String> {
        let client_order_id = Uuid::new_v4();
        let payload = json!({
            "symbol": ticker,
            "side": side,
            "type": "market",
            "time_in_force": "day",
            "notional": notional,
            "client_order_id": client_order_id,
        });

        let resp = self
            .request_with_retry(Method::POST, "/v2/orders", Some(payload))
            .await
            .map_err(|e| match e {
                Error::Broker { status, message } if (400..500).contains(&status) => {
                    Error::OrderRejected {
                        ticker: ticker.to_string(),
                        reason: message,
                    }
                }
                other => other,
            })?;

        let order: OrderResponse = resp.json().await.map_err(|e| Error::Http(e.to_string()))?;
        info!(ticker, order_id = %order.id, status = %order.status, "order placed");
        Ok(order.id)
    }

    /// Close the whole position for a ticker. Returns the closing order id.
    pub async fn close_position(&self, ticker: &str) -> Result<String> {
        let resp = self
            .request_with_retry(Method::DELETE, &format!("/v2/positions/{ticker}"), None)
            .await?;
        let order: OrderResponse = resp.json().await.map_err(|e| Error::Http(e.to_string()))?;
        info!(ticker, order_id = %order.id, "position close submitted");
        Ok(order.id)
    }

    /// Current account equity, used to size the daily loss limit.
    pub async fn get_account_equity(&self) -> Result<f64> {
        let resp = self
            .request_with_retry(Method::GET, "/v2/account", None)
            .await?;
        let account: AccountResponse =
            resp.json().await.map_err(|e| Error::Http(e.to_string()))?;
        Ok(account.equity)
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(BACKOFF_BASE_MS << attempt.min(6))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_url_wins_over_defaults() {
        let url = resolve_base_url("http://localhost:9200/", true);
        assert_eq!(url, "http://localhost:9200");
    }

    #[test]
    fn empty_config_falls_back_to_mode_default() {
        // The env override is not set in unit tests.
        if std::env::var("BROKER_API_BASE_URL").is_ok() {
            return;
        }
        assert_eq!(resolve_base_url("", true), PAPER_BASE_URL);
        assert_eq!(resolve_base_url("  ", false), LIVE_BASE_URL);
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay(1), Duration::from_millis(500));
        assert_eq!(backoff_delay(4), Duration::from_millis(4000));
        assert_eq!(backoff_delay(30), backoff_delay(6));
    }
}
