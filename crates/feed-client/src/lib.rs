//! REST client for the market/news signal feed.
//!
//! The feed aggregates document-level sentiment and lookback momentum per
//! ticker. A missing momentum value is not an error: the cycle degrades to
//! sentiment-only signals for that ticker.

use std::time::Duration;

use common::{Error, Result, TickerSnapshot};
use reqwest::{Client, StatusCode};
use tokio::time::sleep;
use tracing::warn;

const BACKOFF_BASE_MS: u64 = 250;

pub struct FeedClient {
    client: Client,
    base_url: String,
    max_retries: u32,
}

impl FeedClient {
    pub fn new(base_url: &str, request_timeout_ms: u64, max_retries: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_timeout_ms))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Fetch the current sentiment/momentum snapshot for one ticker.
    ///
    /// Retries timeouts and 5xx responses with exponential backoff. A 404
    /// maps to `DataUnavailable` so the caller can degrade instead of abort.
    pub async fn fetch_signals(&self, ticker: &str) -> Result<TickerSnapshot> {
        let url = self.url(&format!("/signals/{ticker}"));
        let mut attempt = 0u32;

        loop {
            let send_result = self.client.get(&url).send().await;
            match send_result {
                Ok(resp) => {
                    let status = resp.status();
                    if status == StatusCode::NOT_FOUND {
                        return Err(Error::DataUnavailable(format!(
                            "no feed data for {ticker}"
                        )));
                    }
                    if status.is_server_error() && attempt < self.max_retries {
                        attempt += 1;
                        warn!(ticker, status = status.as_u16(), attempt, "feed retry");
                        sleep(backoff_delay(attempt)).await;
                        continue;
                    }
                    if !status.is_success() {
                        let body = resp.text().await.unwrap_or_default();
                        return Err(Error::Http(format!(
                            "feed returned status {} for {ticker}: {body}",
                            status.as_u16()
                        )));
                    }

                    return resp
                        .json::<TickerSnapshot>()
                        .await
                        .map_err(|e| Error::Http(e.to_string()));
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        attempt += 1;
                        warn!(ticker, error = %e, attempt, "feed retry");
                        sleep(backoff_delay(attempt)).await;
                        continue;
                    }
                    return Err(Error::DataUnavailable(format!(
                        "feed unreachable for {ticker}: {e}"
                    )));
                }
            }
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(BACKOFF_BASE_MS << attempt.min(6))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially() {
        assert_eq!(backoff_delay(1), Duration::from_millis(500));
        assert_eq!(backoff_delay(2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(3), Duration::from_millis(2000));
    }

    #[test]
    fn backoff_is_capped() {
        assert_eq!(backoff_delay(20), backoff_delay(6));
    }

    #[test]
    fn base_url_is_normalized() {
        let client = FeedClient::new("http://localhost:9300/", 1000, 2).unwrap();
        assert_eq!(
            client.url("/signals/AAPL"),
            "http://localhost:9300/signals/AAPL"
        );
    }
}
