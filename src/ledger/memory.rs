//! In-memory ledger used by orchestrator and gateway tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::order::{status_is_fulfilled, OrderStatus};

use super::{ArtifactLinks, LedgerError, LedgerGateway, OrderRecord};

/// A [`LedgerGateway`] over a plain in-process vector of rows.
pub struct MemoryLedger {
    rows: Mutex<Vec<OrderRecord>>,
    /// Links written by the last rich update, for assertions.
    pub last_links: Mutex<Option<ArtifactLinks>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            last_links: Mutex::new(None),
        }
    }

    pub fn with_rows(rows: Vec<OrderRecord>) -> Self {
        Self {
            rows: Mutex::new(rows),
            last_links: Mutex::new(None),
        }
    }

    /// Snapshot of one row, for assertions.
    pub fn record(&self, order_id: &str) -> Option<OrderRecord> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.order_id == order_id)
            .cloned()
    }
}

#[async_trait]
impl LedgerGateway for MemoryLedger {
    async fn append(&self, record: &OrderRecord) -> Result<(), LedgerError> {
        self.rows.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<OrderRecord>, LedgerError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.order_id == order_id)
            .cloned())
    }

    async fn list_pending(&self) -> Result<Vec<OrderRecord>, LedgerError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| !status_is_fulfilled(&r.status))
            .cloned()
            .collect())
    }

    async fn all_rows(&self) -> Result<Vec<OrderRecord>, LedgerError> {
        Ok(self.rows.lock().unwrap().clone())
    }

    async fn update(
        &self,
        order_id: &str,
        status: &OrderStatus,
        links: Option<&ArtifactLinks>,
    ) -> Result<(), LedgerError> {
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.iter_mut().find(|r| r.order_id == order_id) else {
            return Err(LedgerError::Http(format!("no row for order {order_id}")));
        };
        row.status = status.to_string();
        *self.last_links.lock().unwrap() = links.cloned();
        Ok(())
    }

    async fn mark_processed(&self, row: u64) -> Result<(), LedgerError> {
        let mut rows = self.rows.lock().unwrap();
        let Some(record) = rows.iter_mut().find(|r| r.row == Some(row)) else {
            return Err(LedgerError::Http(format!("no row index {row}")));
        };
        record.status = "Processed".into();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record(order_id: &str, status: &str) -> OrderRecord {
        OrderRecord {
            order_id: order_id.into(),
            status: status.into(),
            ..OrderRecord::new(order_id, "Ada", "ada@example.com", "https://a/x.mp3", "single", "blue")
        }
    }

    #[tokio::test]
    async fn find_returns_the_matching_row() {
        let ledger = MemoryLedger::with_rows(vec![make_record("a1", "Paid")]);

        let found = ledger.find_by_order_id("a1").await.unwrap();
        assert_eq!(found.unwrap().order_id, "a1");
        assert!(ledger.find_by_order_id("zz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_pending_excludes_fulfilled_rows() {
        let ledger = MemoryLedger::with_rows(vec![
            make_record("a1", "Paid"),
            make_record("a2", "Delivered"),
            make_record("a3", "Procesado"),
        ]);

        let pending = ledger.list_pending().await.unwrap();
        let ids: Vec<&str> = pending.iter().map(|r| r.order_id.as_str()).collect();
        assert_eq!(ids, vec!["a1"]);
    }

    #[tokio::test]
    async fn update_rewrites_status_and_records_links() {
        let ledger = MemoryLedger::with_rows(vec![make_record("a1", "Paid")]);

        let links = ArtifactLinks {
            document: Some("https://files/doc.docx".into()),
            ..ArtifactLinks::default()
        };
        ledger
            .update("a1", &OrderStatus::Delivered, Some(&links))
            .await
            .unwrap();

        assert_eq!(ledger.record("a1").unwrap().status, "Delivered");
        assert_eq!(ledger.last_links.lock().unwrap().as_ref(), Some(&links));
    }

    #[tokio::test]
    async fn mark_processed_updates_by_row_index() {
        let mut record = make_record("a1", "Paid");
        record.row = Some(4);
        let ledger = MemoryLedger::with_rows(vec![record]);

        ledger.mark_processed(4).await.unwrap();
        assert_eq!(ledger.record("a1").unwrap().status, "Processed");
    }
}
