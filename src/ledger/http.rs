//! HTTP adapter for the order ledger.
//!
//! Talks to a small REST facade over the spreadsheet backend:
//!
//! ```text
//! POST   {base}/rows                  append a row
//! GET    {base}/rows/{order_id}       one row (404 when absent)
//! GET    {base}/rows?status=pending   pending rows
//! GET    {base}/rows                  every row (last-resort read)
//! PATCH  {base}/rows/{order_id}       status + optional links
//! POST   {base}/rows/{row}/processed  simple mark-processed fallback
//! ```

use async_trait::async_trait;

use crate::config::LedgerConfig;
use crate::order::OrderStatus;

use super::{ArtifactLinks, LedgerError, LedgerGateway, OrderRecord};

// ---------------------------------------------------------------------------
// HttpLedger
// ---------------------------------------------------------------------------

/// Thin REST adapter implementing [`LedgerGateway`].
pub struct HttpLedger {
    client: reqwest::Client,
    config: LedgerConfig,
}

impl HttpLedger {
    pub fn from_config(config: &LedgerConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.api_key.as_deref() {
            Some(key) if !key.is_empty() => req.bearer_auth(key),
            _ => req,
        }
    }

    async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, LedgerError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(LedgerError::Http(format!("ledger returned {status}: {body}")))
    }
}

#[async_trait]
impl LedgerGateway for HttpLedger {
    async fn append(&self, record: &OrderRecord) -> Result<(), LedgerError> {
        let response = self
            .authorized(self.client.post(self.url("/rows")).json(record))
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<OrderRecord>, LedgerError> {
        let response = self
            .authorized(self.client.get(self.url(&format!("/rows/{order_id}"))))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = Self::expect_success(response).await?;
        let record = response
            .json::<OrderRecord>()
            .await
            .map_err(|e| LedgerError::Decode(e.to_string()))?;
        Ok(Some(record))
    }

    async fn list_pending(&self) -> Result<Vec<OrderRecord>, LedgerError> {
        let response = self
            .authorized(self.client.get(self.url("/rows")).query(&[("status", "pending")]))
            .send()
            .await?;
        let response = Self::expect_success(response).await?;
        response
            .json::<Vec<OrderRecord>>()
            .await
            .map_err(|e| LedgerError::Decode(e.to_string()))
    }

    async fn all_rows(&self) -> Result<Vec<OrderRecord>, LedgerError> {
        let response = self
            .authorized(self.client.get(self.url("/rows")))
            .send()
            .await?;
        let response = Self::expect_success(response).await?;
        response
            .json::<Vec<OrderRecord>>()
            .await
            .map_err(|e| LedgerError::Decode(e.to_string()))
    }

    async fn update(
        &self,
        order_id: &str,
        status: &OrderStatus,
        links: Option<&ArtifactLinks>,
    ) -> Result<(), LedgerError> {
        let body = serde_json::json!({
            "status": status.to_string(),
            "links":  links,
        });

        let response = self
            .authorized(
                self.client
                    .patch(self.url(&format!("/rows/{order_id}")))
                    .json(&body),
            )
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn mark_processed(&self, row: u64) -> Result<(), LedgerError> {
        let response = self
            .authorized(self.client.post(self.url(&format!("/rows/{row}/processed"))))
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config() -> LedgerConfig {
        LedgerConfig {
            base_url: "http://localhost:9090".into(),
            api_key: Some("key".into()),
            timeout_secs: 10,
        }
    }

    #[test]
    fn from_config_builds_without_panic() {
        let _ledger = HttpLedger::from_config(&make_config());
    }

    #[test]
    fn url_joins_base_and_path() {
        let ledger = HttpLedger::from_config(&make_config());
        assert_eq!(ledger.url("/rows/ab12"), "http://localhost:9090/rows/ab12");
    }

    #[test]
    fn ledger_is_object_safe() {
        let gateway: Box<dyn LedgerGateway> = Box::new(HttpLedger::from_config(&make_config()));
        drop(gateway);
    }
}
