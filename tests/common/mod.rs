#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ezbill::fanout::RetryPolicy;
use ezbill::schemas::{
    Bill, BillDraft, BillId, Category, CategoryId, ErrorLog, Group, GroupPatch, Member, MemberId,
    NewGroup, PaymentTrackingMode,
};
use ezbill::store::{Backend, BackendResult, MemoryBackend};
use ezbill::{BackendError, SplitClient};

/// Wraps the in-memory store and fails chosen calls on demand.
#[derive(Default)]
pub struct FlakyBackend {
    pub inner: MemoryBackend,
    pub broken_groups: Mutex<HashSet<String>>,
    pub broken_bills: Mutex<HashSet<String>>,
    pub failing_inserts: AtomicU32,
    /// Inserts that write the first bill of the batch and then fail.
    pub partial_inserts: AtomicU32,
    pub insert_calls: AtomicU32,
    pub touch_calls: AtomicU32,
    pub mark_paid_calls: AtomicU32,
    pub fail_touch: AtomicBool,
}

impl FlakyBackend {
    pub fn break_group(&self, id: &str) {
        self.broken_groups.lock().unwrap().insert(id.to_string());
    }

    pub fn break_bill(&self, id: &str) {
        self.broken_bills.lock().unwrap().insert(id.to_string());
    }
}

#[async_trait]
impl Backend for FlakyBackend {
    async fn insert_group(&self, group: &Group) -> BackendResult<()> {
        self.inner.insert_group(group).await
    }

    async fn find_group(&self, id: &str) -> BackendResult<Option<Group>> {
        if self.broken_groups.lock().unwrap().contains(id) {
            return Err(BackendError::Unavailable(format!("group {} timed out", id)));
        }
        self.inner.find_group(id).await
    }

    async fn update_group(&self, id: &str, patch: &GroupPatch) -> BackendResult<()> {
        self.inner.update_group(id, patch).await
    }

    async fn touch_group(&self, id: &str, updated_at: DateTime<Utc>) -> BackendResult<()> {
        self.touch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_touch.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("touch rejected".to_string()));
        }
        self.inner.touch_group(id, updated_at).await
    }

    async fn list_bills(&self, group_id: &str) -> BackendResult<Vec<Bill>> {
        self.inner.list_bills(group_id).await
    }

    async fn insert_bills(&self, bills: &[Bill]) -> BackendResult<()> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_inserts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_inserts.store(remaining - 1, Ordering::SeqCst);
            return Err(BackendError::Unavailable("bills are not queryable yet".to_string()));
        }
        let remaining = self.partial_inserts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.partial_inserts.store(remaining - 1, Ordering::SeqCst);
            self.inner.insert_bills(&bills[..bills.len().min(1)]).await?;
            return Err(BackendError::Unavailable("connection reset mid batch".to_string()));
        }
        self.inner.insert_bills(bills).await
    }

    async fn update_bill(&self, bill_id: &str, draft: &BillDraft) -> BackendResult<()> {
        self.inner.update_bill(bill_id, draft).await
    }

    async fn set_bill_categories(
        &self,
        group_id: &str,
        bill_id: &str,
        category_ids: &[CategoryId],
    ) -> BackendResult<()> {
        if self.broken_bills.lock().unwrap().contains(bill_id) {
            return Err(BackendError::Unavailable(format!("bill {} is locked", bill_id)));
        }
        self.inner
            .set_bill_categories(group_id, bill_id, category_ids)
            .await
    }

    async fn delete_bill(&self, group_id: &str, bill_id: &str) -> BackendResult<()> {
        self.inner.delete_bill(group_id, bill_id).await
    }

    async fn mark_bills_paid(
        &self,
        group_id: &str,
        member_id: &MemberId,
        bill_ids: &[BillId],
        paid_at: DateTime<Utc>,
    ) -> BackendResult<()> {
        self.mark_paid_calls.fetch_add(1, Ordering::SeqCst);
        self.inner
            .mark_bills_paid(group_id, member_id, bill_ids, paid_at)
            .await
    }

    async fn insert_error_log(&self, log: &ErrorLog) -> BackendResult<()> {
        self.inner.insert_error_log(log).await
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        attempts: 10,
        delay: Duration::from_millis(1),
    }
}

pub fn setup() -> (SplitClient, Arc<FlakyBackend>) {
    let backend = Arc::new(FlakyBackend::default());
    let client = SplitClient::new(backend.clone()).with_import_retry(fast_retry());
    (client, backend)
}

pub fn member(id: &str, name: &str, is_accounting: bool) -> Member {
    Member {
        id: id.to_string(),
        name: name.to_string(),
        is_accounting,
    }
}

pub fn category(id: &str) -> Category {
    Category {
        id: id.to_string(),
        name: format!("Category {}", id),
    }
}

pub fn new_group(id: &str) -> NewGroup {
    NewGroup {
        id: id.to_string(),
        name: format!("Trip {}", id),
        payment_tracking_mode: PaymentTrackingMode::Basic,
        members: vec![
            member("m1", "An", true),
            member("m2", "Binh", false),
            member("m3", "Chi", false),
        ],
        categories: vec![category("A"), category("B")],
    }
}

pub fn draft(group_id: &str, created_by: &str, shares: &[(&str, f64)], categories: &[&str]) -> BillDraft {
    BillDraft {
        group_id: group_id.to_string(),
        amount: shares.iter().map(|(_, share)| share).sum(),
        members: shares
            .iter()
            .map(|(id, share)| (id.to_string(), *share))
            .collect(),
        category_ids: categories.iter().map(|c| c.to_string()).collect(),
        created_by: created_by.to_string(),
        paid_at: BTreeMap::new(),
    }
}
