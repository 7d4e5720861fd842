use async_trait::async_trait;
use bson::{doc, Document};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    error::ErrorKind,
    options::{IndexOptions, InsertManyOptions},
    Client, Collection, IndexModel,
};
use tracing::{debug, info};

use super::{bill_label, group_label, Backend, BackendResult};
use crate::error::BackendError;
use crate::schemas::{Bill, BillDraft, BillId, CategoryId, ErrorLog, Group, GroupPatch, MemberId};

const GROUPS: &str = "groups";
const BILLS: &str = "bills";
const ERROR_LOGS: &str = "error_logs";
const DUPLICATE_KEY: i32 = 11000;

/// Groups, bills and error logs live in three collections; bills carry
/// their `groupId` and are indexed on it.
#[derive(Clone)]
pub struct MongoBackend {
    groups: Collection<Group>,
    bills: Collection<Bill>,
    error_logs: Collection<ErrorLog>,
}

impl MongoBackend {
    pub async fn connect(uri: &str, database: &str) -> BackendResult<Self> {
        let client = Client::with_uri_str(uri).await?;
        let db = client.database(database);
        let backend = MongoBackend {
            groups: db.collection(GROUPS),
            bills: db.collection(BILLS),
            error_logs: db.collection(ERROR_LOGS),
        };
        backend.ensure_indexes().await?;
        info!(database, "Connected to MongoDB");
        Ok(backend)
    }

    async fn ensure_indexes(&self) -> BackendResult<()> {
        let unique = || IndexOptions::builder().unique(true).build();
        self.groups
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "id": 1 })
                    .options(unique())
                    .build(),
                None,
            )
            .await?;
        self.bills
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "groupId": 1, "id": 1 })
                    .options(unique())
                    .build(),
                None,
            )
            .await?;
        Ok(())
    }

    async fn set_group_fields(&self, id: &str, fields: Document) -> BackendResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let result = self
            .groups
            .update_one(doc! { "id": id }, doc! { "$set": fields }, None)
            .await?;
        if result.matched_count == 0 {
            return Err(BackendError::Missing(group_label(id)));
        }
        Ok(())
    }

    async fn set_bill_fields(
        &self,
        group_id: &str,
        bill_id: &str,
        fields: Document,
    ) -> BackendResult<()> {
        let result = self
            .bills
            .update_one(
                doc! { "groupId": group_id, "id": bill_id },
                doc! { "$set": fields },
                None,
            )
            .await?;
        if result.matched_count == 0 {
            return Err(BackendError::Missing(bill_label(group_id, bill_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for MongoBackend {
    async fn insert_group(&self, group: &Group) -> BackendResult<()> {
        self.groups.insert_one(group, None).await?;
        Ok(())
    }

    async fn find_group(&self, id: &str) -> BackendResult<Option<Group>> {
        let group = self
            .groups
            .find_one(doc! { "id": id, "deleted": false }, None)
            .await?;
        Ok(group)
    }

    async fn update_group(&self, id: &str, patch: &GroupPatch) -> BackendResult<()> {
        self.set_group_fields(id, bson::to_document(patch)?).await
    }

    async fn touch_group(&self, id: &str, updated_at: DateTime<Utc>) -> BackendResult<()> {
        self.set_group_fields(id, doc! { "updatedAt": bson::to_bson(&updated_at)? })
            .await
    }

    async fn list_bills(&self, group_id: &str) -> BackendResult<Vec<Bill>> {
        let bills: Vec<Bill> = self
            .bills
            .find(doc! { "groupId": group_id }, None)
            .await?
            .try_collect()
            .await?;
        Ok(bills)
    }

    async fn insert_bills(&self, bills: &[Bill]) -> BackendResult<()> {
        if bills.is_empty() {
            return Ok(());
        }
        let options = InsertManyOptions::builder().ordered(false).build();
        match self.bills.insert_many(bills, options).await {
            Ok(_) => Ok(()),
            Err(err) if only_duplicate_keys(&err) => {
                debug!(error = %err, "Some bills were already stored");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn update_bill(&self, bill_id: &str, draft: &BillDraft) -> BackendResult<()> {
        self.set_bill_fields(&draft.group_id, bill_id, bson::to_document(draft)?)
            .await
    }

    async fn set_bill_categories(
        &self,
        group_id: &str,
        bill_id: &str,
        category_ids: &[CategoryId],
    ) -> BackendResult<()> {
        self.set_bill_fields(
            group_id,
            bill_id,
            doc! { "categoryIds": bson::to_bson(category_ids)? },
        )
        .await
    }

    async fn delete_bill(&self, group_id: &str, bill_id: &str) -> BackendResult<()> {
        let result = self
            .bills
            .delete_one(doc! { "groupId": group_id, "id": bill_id }, None)
            .await?;
        if result.deleted_count == 0 {
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
        let mut fields = Document::new();
        fields.insert(format!("paidAt.{}", member_id), bson::to_bson(&paid_at)?);
        let ids = bson::to_bson(bill_ids)?;
        self.bills
            .update_many(
                doc! { "groupId": group_id, "id": { "$in": ids } },
                doc! { "$set": fields },
                None,
            )
            .await?;
        Ok(())
    }

    async fn insert_error_log(&self, log: &ErrorLog) -> BackendResult<()> {
        self.error_logs.insert_one(log, None).await?;
        Ok(())
    }
}

/// An unordered batch insert reports every rejected document; when all of
/// them hit the unique index the rest of the batch was written.
fn only_duplicate_keys(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::BulkWrite(failure) => {
            failure.write_concern_error.is_none()
                && failure
                    .write_errors
                    .as_ref()
                    .is_some_and(|errors| errors.iter().all(|e| e.code == DUPLICATE_KEY))
        }
        _ => false,
    }
}
