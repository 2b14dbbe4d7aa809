//! In-memory payment store
//!
//! Keeps inserted rows in a vector and applies the same validation as the
//! PostgreSQL writer. Failures can be injected for the whole store or for
//! individual users.

use async_trait::async_trait;
use event_schema::PaymentEvent;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::writer::{InsertError, PaymentWriter};

/// One stored row, as the `payment_events` table would hold it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRow {
    pub user_id: String,
    pub amount: i64,
    pub status: Option<String>,
}

#[derive(Default)]
pub struct MemoryPaymentStore {
    rows: Mutex<Vec<PaymentRow>>,
    rejected_users: Mutex<HashSet<String>>,
    unavailable: AtomicBool,
    store_calls: AtomicU64,
}

impl MemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<PaymentRow> {
        self.rows.lock().clone()
    }

    /// Inserts that got past validation
    pub fn store_calls(&self) -> u64 {
        self.store_calls.load(Ordering::SeqCst)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make every insert for `user_id` fail as a constraint violation would
    pub fn reject_user(&self, user_id: impl Into<String>) {
        self.rejected_users.lock().insert(user_id.into());
    }
}

#[async_trait]
impl PaymentWriter for MemoryPaymentStore {
    async fn insert(&self, event: &PaymentEvent) -> Result<(), InsertError> {
        event.validate()?;
        self.store_calls.fetch_add(1, Ordering::SeqCst);

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(InsertError::StoreUnavailable(
                "connection refused".to_string(),
            ));
        }
        if self.rejected_users.lock().contains(event.user_id()) {
            return Err(InsertError::Other(format!(
                "row rejected for user {}",
                event.user_id()
            )));
        }

        self.rows.lock().push(PaymentRow {
            user_id: event.user_id().to_string(),
            amount: event.amount(),
            status: event.status().map(str::to_string),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rows_keep_status_absence() {
        let store = MemoryPaymentStore::new();
        store.insert(&PaymentEvent::new("u1", 100)).await.unwrap();
        store
            .insert(&PaymentEvent::new("u1", 50).with_status(""))
            .await
            .unwrap();

        let rows = store.rows();
        assert_eq!(rows[0].status, None);
        assert_eq!(rows[1].status.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_validation_happens_before_store_call() {
        let store = MemoryPaymentStore::new();
        let err = store.insert(&PaymentEvent::new("u1", 0)).await.unwrap_err();

        assert_eq!(err.kind(), "invalid");
        assert_eq!(store.store_calls(), 0);
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryPaymentStore::new();
        store.reject_user("u9");
        assert_eq!(
            store.insert(&PaymentEvent::new("u9", 1)).await.unwrap_err().kind(),
            "other"
        );

        store.set_unavailable(true);
        assert_eq!(
            store.insert(&PaymentEvent::new("u1", 1)).await.unwrap_err().kind(),
            "store_unavailable"
        );
        assert!(store.rows().is_empty());
    }
}
