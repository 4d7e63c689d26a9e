//! REST adapter for the external embedding/vector-similarity sidecar.

use std::time::Duration;

use async_trait::async_trait;
use common::{Error, Result};
use reqwest::Client;
use serde_json::json;

use crate::types::{MemoryRecord, MemoryStore, QueryHit};

#[derive(Clone)]
pub struct HttpMemoryStore {
    client: Client,
    base_url: String,
}

impl HttpMemoryStore {
    pub fn new(base_url: &str, request_timeout_ms: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_timeout_ms))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl MemoryStore for HttpMemoryStore {
    async fn store(&self, record: MemoryRecord) -> Result<()> {
        let resp = self
            .client
            .post(self.url("/records"))
            .json(&record)
            .send()
            .await
            .map_err(|e| Error::Memory(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Memory(format!(
                "store failed (status={}): {}",
                status.as_u16(),
                body
            )));
        }
        Ok(())
    }

    async fn query(&self, text: &str, n: usize) -> Result<Vec<QueryHit>> {
        let resp = self
            .client
            .post(self.url("/query"))
            .json(&json!({ "text": text, "n": n }))
            .send()
            .await
            .map_err(|e| Error::Memory(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Memory(format!(
                "query failed (status={}): {}",
                status.as_u16(),
                body
            )));
        }

        resp.json::<Vec<QueryHit>>()
            .await
            .map_err(|e| Error::Memory(e.to_string()))
    }
}
