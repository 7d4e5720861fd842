use thiserror::Error;

use crate::schemas::{BillId, GroupId, MemberId};

/// Failure reported by the hosted store.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("mongodb error: {0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("failed to encode document: {0}")]
    Encode(#[from] bson::ser::Error),
    #[error("{0} does not exist")]
    Missing(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    pub fn is_missing(&self) -> bool {
        matches!(self, BackendError::Missing(_))
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("the bill total {amount} does not match the members' total {members_total}")]
    AmountMismatch { amount: f64, members_total: f64 },
    #[error("a member named {0:?} already exists in the group, please pick another name")]
    DuplicateMemberName(String),
    #[error("only one member can be the group's accountant")]
    MultipleAccounting,
    #[error("{0:?} is not a valid member id")]
    InvalidMemberId(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Remote(#[from] BackendError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("member {0} created or takes part in some bills, delete those bills first")]
    MemberReferenced(MemberId),
    #[error("group {0} does not exist")]
    NotFound(GroupId),
    #[error("member {member_id} is not part of group {group_id}")]
    MemberNotFound { group_id: GroupId, member_id: MemberId },
    #[error("failed to update bills referencing the deleted category: {failed:?}")]
    Cascade { failed: Vec<BillId> },
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Remote(err) => err.is_missing(),
            _ => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
