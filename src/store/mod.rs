//! The hosted store as seen by the client: one table per entity kind,
//! bills keyed by their group.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::BackendError;
use crate::schemas::{Bill, BillDraft, BillId, CategoryId, ErrorLog, Group, GroupPatch, MemberId};

pub mod memory;
pub mod mongo;

pub use memory::MemoryBackend;
pub use mongo::MongoBackend;

pub type BackendResult<T> = Result<T, BackendError>;

#[async_trait]
pub trait Backend: Send + Sync {
    async fn insert_group(&self, group: &Group) -> BackendResult<()>;
    /// The group if it exists and is not soft-deleted.
    async fn find_group(&self, id: &str) -> BackendResult<Option<Group>>;
    async fn update_group(&self, id: &str, patch: &GroupPatch) -> BackendResult<()>;
    async fn touch_group(&self, id: &str, updated_at: DateTime<Utc>) -> BackendResult<()>;

    async fn list_bills(&self, group_id: &str) -> BackendResult<Vec<Bill>>;
    /// Bills whose `(groupId, id)` is already stored are left as they are
    /// and the rest are still written, so a failed batch can be sent again.
    async fn insert_bills(&self, bills: &[Bill]) -> BackendResult<()>;
    async fn update_bill(&self, bill_id: &str, draft: &BillDraft) -> BackendResult<()>;
    async fn set_bill_categories(
        &self,
        group_id: &str,
        bill_id: &str,
        category_ids: &[CategoryId],
    ) -> BackendResult<()>;
    async fn delete_bill(&self, group_id: &str, bill_id: &str) -> BackendResult<()>;
    /// Sets the same paid timestamp for `member_id` on every listed bill in one call.
    async fn mark_bills_paid(
        &self,
        group_id: &str,
        member_id: &MemberId,
        bill_ids: &[BillId],
        paid_at: DateTime<Utc>,
    ) -> BackendResult<()>;

    async fn insert_error_log(&self, log: &ErrorLog) -> BackendResult<()>;
}

/// Label used for a group's row in logs and missing-row errors.
pub fn group_label(group_id: &str) -> String {
    format!("group_{}", group_id)
}

pub fn bill_label(group_id: &str, bill_id: &str) -> String {
    format!("bill_{}/{}", group_id, bill_id)
}
