use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use futures::future::join;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::fanout::{settle_all, RetryPolicy};
use crate::rules;
use crate::schemas::{
    Bill, BillDraft, BillId, CategoryId, ErrorLog, ErrorReport, FetchGroupsResult, Group, GroupId,
    GroupPatch, ImportedBackup, Member, MemberId, NewGroup, NewGroupInfo,
};
use crate::store::Backend;

/// Every group, member, bill and category operation the application needs,
/// with the consistency rules applied before anything is written.
#[derive(Clone)]
pub struct SplitClient {
    backend: Arc<dyn Backend>,
    import_retry: RetryPolicy,
}

impl SplitClient {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        SplitClient {
            backend,
            import_retry: RetryPolicy::default(),
        }
    }

    pub fn with_import_retry(mut self, policy: RetryPolicy) -> Self {
        self.import_retry = policy;
        self
    }

    // Group

    pub async fn fetch_groups(&self, ids: &[GroupId]) -> FetchGroupsResult {
        let settled = settle_all(ids.iter().map(|id| (id.clone(), self.fetch_group(id)))).await;

        let mut groups: Vec<Group> = settled.succeeded.into_iter().map(|(_, g)| g).collect();
        groups.sort_by(|a, b| a.id.cmp(&b.id));

        let mut not_found_ids = Vec::new();
        let mut failed_ids = Vec::new();
        for (id, err) in settled.failed {
            if err.is_not_found() {
                not_found_ids.push(id);
            } else {
                warn!(group_id = %id, error = %err, "Failed to fetch group");
                failed_ids.push(id);
            }
        }

        FetchGroupsResult {
            groups,
            not_found_ids,
            failed_ids,
        }
    }

    pub async fn create_group(&self, group: NewGroup) -> Result<()> {
        rules::check_members(&group.members)?;
        let group = group.into_group(Utc::now());
        self.backend.insert_group(&group).await?;
        info!(group_id = %group.id, "Group created");
        Ok(())
    }

    pub async fn fetch_group(&self, id: &str) -> Result<Group> {
        self.backend
            .find_group(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub async fn update_group(&self, id: &str, patch: &GroupPatch) -> Result<()> {
        if patch.is_empty() {
            self.fetch_group(id).await?;
            return Ok(());
        }
        if let Some(members) = &patch.members {
            rules::check_members(members)?;
        }
        self.backend.update_group(id, patch).await?;
        self.touch(id).await;
        Ok(())
    }

    pub async fn delete_group(&self, id: &str) -> Result<()> {
        self.backend.update_group(id, &GroupPatch::deleted()).await?;
        info!(group_id = %id, "Group marked as deleted");
        self.touch(id).await;
        Ok(())
    }

    // Member

    pub async fn add_member(&self, group_id: &str, member: Member) -> Result<()> {
        let group = self.fetch_group(group_id).await?;
        let members = rules::with_member_added(&group.members, member)?;
        self.backend
            .update_group(group_id, &GroupPatch::members(members))
            .await?;
        self.touch(group_id).await;
        Ok(())
    }

    pub async fn remove_member(&self, group_id: &str, member_id: &str) -> Result<()> {
        let (group, bills) = join(self.fetch_group(group_id), self.fetch_bills(group_id)).await;
        let (group, bills) = (group?, bills?);

        if rules::is_member_referenced(&bills, member_id) {
            return Err(Error::MemberReferenced(member_id.to_string()));
        }

        let members = rules::without_member(&group.members, member_id);
        self.backend
            .update_group(group_id, &GroupPatch::members(members))
            .await?;
        self.touch(group_id).await;
        Ok(())
    }

    pub async fn update_member(&self, group_id: &str, member: Member) -> Result<()> {
        let group = self.fetch_group(group_id).await?;
        let member_id = member.id.clone();
        let members = rules::with_member_replaced(&group.members, member)?.ok_or_else(|| {
            Error::MemberNotFound {
                group_id: group_id.to_string(),
                member_id,
            }
        })?;
        self.backend
            .update_group(group_id, &GroupPatch::members(members))
            .await?;
        self.touch(group_id).await;
        Ok(())
    }

    // Bill

    pub async fn fetch_bills(&self, group_id: &str) -> Result<Vec<Bill>> {
        Ok(self.backend.list_bills(group_id).await?)
    }

    /// Returns the stored bill with its assigned id.
    pub async fn create_bill(&self, draft: BillDraft) -> Result<Bill> {
        rules::check_bill(&draft)?;
        let bill = draft.into_bill(Uuid::new_v4().to_string(), Utc::now());
        self.backend.insert_bills(std::slice::from_ref(&bill)).await?;
        self.touch(&bill.group_id).await;
        Ok(bill)
    }

    pub async fn update_bill(&self, bill_id: &str, draft: &BillDraft) -> Result<()> {
        rules::check_bill(draft)?;
        self.backend.update_bill(bill_id, draft).await?;
        self.touch(&draft.group_id).await;
        Ok(())
    }

    pub async fn delete_bill(&self, group_id: &str, bill_id: &str) -> Result<()> {
        self.backend.delete_bill(group_id, bill_id).await?;
        self.touch(group_id).await;
        Ok(())
    }

    pub async fn mark_bills_as_paid(
        &self,
        group_id: &str,
        member_id: &MemberId,
        bill_ids: &[BillId],
    ) -> Result<()> {
        rules::check_member_id(member_id)?;
        let paid_at = Utc::now().trunc_subsecs(0);
        self.backend
            .mark_bills_paid(group_id, member_id, bill_ids, paid_at)
            .await?;
        debug!(group_id, member_id = %member_id, bills = bill_ids.len(), "Bills marked as paid");
        self.touch(group_id).await;
        Ok(())
    }

    // Category

    /// Drops the category from the group, then from every bill holding it.
    /// If any bill cannot be updated the group's category list is restored.
    pub async fn delete_category(&self, group_id: &str, category_id: &CategoryId) -> Result<()> {
        let (group, bills) = join(self.fetch_group(group_id), self.fetch_bills(group_id)).await;
        let (group, bills) = (group?, bills?);

        let categories = rules::without_category(&group.categories, category_id);
        self.backend
            .update_group(group_id, &GroupPatch::categories(categories))
            .await?;

        let stripped = rules::strip_category(&bills, category_id);
        let settled = settle_all(stripped.iter().map(|(bill_id, remaining)| {
            (
                bill_id.clone(),
                self.backend
                    .set_bill_categories(group_id, bill_id, remaining),
            )
        }))
        .await;

        if !settled.failed.is_empty() {
            for (bill_id, err) in &settled.failed {
                warn!(group_id, bill_id = %bill_id, error = %err, "Failed to strip category from bill");
            }
            if let Err(err) = self
                .backend
                .update_group(group_id, &GroupPatch::categories(group.categories))
                .await
            {
                warn!(group_id, error = %err, "Failed to restore group categories");
            }
            return Err(Error::Cascade {
                failed: settled.failed.into_iter().map(|(id, _)| id).collect(),
            });
        }

        self.touch(group_id).await;
        Ok(())
    }

    // Import

    pub async fn import_group(&self, imported: ImportedBackup, info: NewGroupInfo) -> Result<()> {
        let group_id = info.id.clone();
        self.create_group(NewGroup {
            id: info.id,
            name: info.name,
            payment_tracking_mode: info.payment_tracking_mode,
            members: imported.group.members,
            categories: imported.group.categories,
        })
        .await?;

        let bills: Vec<Bill> = imported
            .bills
            .into_iter()
            .map(|bill| Bill {
                id: Uuid::new_v4().to_string(),
                group_id: group_id.clone(),
                ..bill
            })
            .collect();

        let backend = &self.backend;
        let pending = &bills;
        self.import_retry
            .run(move || backend.insert_bills(pending))
            .await?;
        info!(group_id = %group_id, bills = bills.len(), "Group imported");

        self.backend.touch_group(&group_id, Utc::now()).await?;
        Ok(())
    }

    // Error log

    pub async fn create_error_log(&self, report: ErrorReport) -> Result<()> {
        let log = ErrorLog {
            created_at: Utc::now().trunc_subsecs(0),
            log: report,
        };
        self.backend.insert_error_log(&log).await?;
        Ok(())
    }

    /// Refreshes the group's `updatedAt`. A failure here does not undo the
    /// write that preceded it, so it is only logged.
    async fn touch(&self, group_id: &str) {
        if let Err(err) = self.backend.touch_group(group_id, Utc::now()).await {
            warn!(group_id, error = %err, "Failed to refresh group updatedAt");
        }
    }
}
