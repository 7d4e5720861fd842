use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{bill_label, group_label, Backend, BackendResult};
use crate::error::BackendError;
use crate::schemas::{Bill, BillDraft, BillId, CategoryId, ErrorLog, Group, GroupPatch, MemberId};

#[derive(Default)]
struct State {
    groups: HashMap<String, Group>,
    bills: HashMap<String, Vec<Bill>>,
    error_logs: Vec<ErrorLog>,
}

/// In-process store with the same semantics as the MongoDB one.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored row, soft-deleted or not.
    pub async fn raw_group(&self, id: &str) -> Option<Group> {
        self.state.lock().await.groups.get(id).cloned()
    }

    pub async fn error_logs(&self) -> Vec<ErrorLog> {
        self.state.lock().await.error_logs.clone()
    }
}

fn find_bill<'a>(state: &'a mut State, group_id: &str, bill_id: &str) -> BackendResult<&'a mut Bill> {
    state
        .bills
        .get_mut(group_id)
        .and_then(|bills| bills.iter_mut().find(|b| b.id == bill_id))
        .ok_or_else(|| BackendError::Missing(bill_label(group_id, bill_id)))
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn insert_group(&self, group: &Group) -> BackendResult<()> {
        let mut state = self.state.lock().await;
        if state.groups.contains_key(&group.id) {
            return Err(BackendError::Unavailable(format!(
                "{} already exists",
                group_label(&group.id)
            )));
        }
        state.groups.insert(group.id.clone(), group.clone());
        Ok(())
    }

    async fn find_group(&self, id: &str) -> BackendResult<Option<Group>> {
        let state = self.state.lock().await;
        Ok(state.groups.get(id).filter(|g| !g.deleted).cloned())
    }

    async fn update_group(&self, id: &str, patch: &GroupPatch) -> BackendResult<()> {
        let mut state = self.state.lock().await;
        let group = state
            .groups
            .get_mut(id)
            .ok_or_else(|| BackendError::Missing(group_label(id)))?;
        patch.apply(group);
        Ok(())
    }

    async fn touch_group(&self, id: &str, updated_at: DateTime<Utc>) -> BackendResult<()> {
        let mut state = self.state.lock().await;
        let group = state
            .groups
            .get_mut(id)
            .ok_or_else(|| BackendError::Missing(group_label(id)))?;
        group.updated_at = updated_at;
        Ok(())
    }

    async fn list_bills(&self, group_id: &str) -> BackendResult<Vec<Bill>> {
        let state = self.state.lock().await;
        Ok(state.bills.get(group_id).cloned().unwrap_or_default())
    }

    async fn insert_bills(&self, bills: &[Bill]) -> BackendResult<()> {
        let mut state = self.state.lock().await;
        for bill in bills {
            let stored = state.bills.entry(bill.group_id.clone()).or_default();
            if !stored.iter().any(|b| b.id == bill.id) {
                stored.push(bill.clone());
            }
        }
        Ok(())
    }

    async fn update_bill(&self, bill_id: &str, draft: &BillDraft) -> BackendResult<()> {
        let mut state = self.state.lock().await;
        find_bill(&mut state, &draft.group_id, bill_id)?.apply_draft(draft);
        Ok(())
    }

    async fn set_bill_categories(
        &self,
        group_id: &str,
        bill_id: &str,
        category_ids: &[CategoryId],
    ) -> BackendResult<()> {
        let mut state = self.state.lock().await;
        find_bill(&mut state, group_id, bill_id)?.category_ids = category_ids.to_vec();
        Ok(())
    }

    async fn delete_bill(&self, group_id: &str, bill_id: &str) -> BackendResult<()> {
        let mut state = self.state.lock().await;
        let bills = state
            .bills
            .get_mut(group_id)
            .ok_or_else(|| BackendError::Missing(bill_label(group_id, bill_id)))?;
        let before = bills.len();
        bills.retain(|b| b.id != bill_id);
        if bills.len() == before {
            return Err(BackendError::Missing(bill_label(group_id, bill_id)));
        }
        Ok(())
    }

    async fn mark_bills_paid(
        &self,
        group_id: &str,
        member_id: &MemberId,
        bill_ids: &[BillId],
        paid_at: DateTime<Utc>,
    ) -> BackendResult<()> {
        let mut state = self.state.lock().await;
        if let Some(bills) = state.bills.get_mut(group_id) {
            for bill in bills.iter_mut().filter(|b| bill_ids.contains(&b.id)) {
                bill.paid_at.insert(member_id.clone(), paid_at);
            }
        }
        Ok(())
    }

    async fn insert_error_log(&self, log: &ErrorLog) -> BackendResult<()> {
        self.state.lock().await.error_logs.push(log.clone());
        Ok(())
    }
}
