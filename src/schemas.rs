use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type GroupId = String;
pub type MemberId = String;
pub type BillId = String;
pub type CategoryId = String;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentTrackingMode {
    #[default]
    Basic,
    Detail,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub payment_tracking_mode: PaymentTrackingMode,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub deleted: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    #[serde(default)]
    pub is_accounting: bool,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub id: BillId,
    pub group_id: GroupId,
    pub amount: f64,
    /// Owed amount per member id.
    pub members: BTreeMap<MemberId, f64>,
    #[serde(default)]
    pub category_ids: Vec<CategoryId>,
    pub created_by: MemberId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub paid_at: BTreeMap<MemberId, DateTime<Utc>>,
}

/// A bill as sent by a client, before the store assigns `id` and `createdAt`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillDraft {
    #[serde(default)]
    pub group_id: GroupId,
    pub amount: f64,
    pub members: BTreeMap<MemberId, f64>,
    #[serde(default)]
    pub category_ids: Vec<CategoryId>,
    pub created_by: MemberId,
    #[serde(default)]
    pub paid_at: BTreeMap<MemberId, DateTime<Utc>>,
}

impl BillDraft {
    pub fn into_bill(self, id: BillId, created_at: DateTime<Utc>) -> Bill {
        Bill {
            id,
            group_id: self.group_id,
            amount: self.amount,
            members: self.members,
            category_ids: self.category_ids,
            created_by: self.created_by,
            created_at,
            paid_at: self.paid_at,
        }
    }
}

impl Bill {
    pub fn apply_draft(&mut self, draft: &BillDraft) {
        self.amount = draft.amount;
        self.members = draft.members.clone();
        self.category_ids = draft.category_ids.clone();
        self.created_by = draft.created_by.clone();
        self.paid_at = draft.paid_at.clone();
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGroup {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub payment_tracking_mode: PaymentTrackingMode,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub categories: Vec<Category>,
}

impl NewGroup {
    pub fn into_group(self, updated_at: DateTime<Utc>) -> Group {
        Group {
            id: self.id,
            name: self.name,
            payment_tracking_mode: self.payment_tracking_mode,
            members: self.members,
            categories: self.categories,
            deleted: false,
            updated_at,
        }
    }
}

/// Identity given to a group restored from a backup.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGroupInfo {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub payment_tracking_mode: PaymentTrackingMode,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_tracking_mode: Option<PaymentTrackingMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<Member>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<Category>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
}

impl GroupPatch {
    pub fn members(members: Vec<Member>) -> Self {
        GroupPatch {
            members: Some(members),
            ..Default::default()
        }
    }

    pub fn categories(categories: Vec<Category>) -> Self {
        GroupPatch {
            categories: Some(categories),
            ..Default::default()
        }
    }

    pub fn deleted() -> Self {
        GroupPatch {
            deleted: Some(true),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == GroupPatch::default()
    }

    pub fn apply(&self, group: &mut Group) {
        if let Some(name) = &self.name {
            group.name = name.clone();
        }
        if let Some(mode) = self.payment_tracking_mode {
            group.payment_tracking_mode = mode;
        }
        if let Some(members) = &self.members {
            group.members = members.clone();
        }
        if let Some(categories) = &self.categories {
            group.categories = categories.clone();
        }
        if let Some(deleted) = self.deleted {
            group.deleted = deleted;
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ImportedBackup {
    pub group: Group,
    #[serde(default)]
    pub bills: Vec<Bill>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchGroupsResult {
    pub groups: Vec<Group>,
    pub not_found_ids: Vec<GroupId>,
    /// Ids whose fetch failed for a reason other than the group being absent.
    pub failed_ids: Vec<GroupId>,
}

/// What a client reports when it hits an error it cannot handle.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ErrorReport {
    pub path: String,
    pub ua: String,
    pub error: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLog {
    pub created_at: DateTime<Utc>,
    pub log: ErrorReport,
}
