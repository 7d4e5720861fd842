use std::collections::{BTreeMap, HashSet};

use crate::error::ValidationError;
use crate::schemas::{Bill, BillDraft, BillId, Category, CategoryId, Member, MemberId};

pub fn members_total(members: &BTreeMap<MemberId, f64>) -> f64 {
    members.values().sum()
}

/// Halves round toward positive infinity, so -2.5 becomes -2.
fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

/// Member ids end up as document keys, so they cannot be empty, hold a
/// `.` or start with `$`.
pub fn check_member_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.contains('.') || id.starts_with('$') {
        return Err(ValidationError::InvalidMemberId(id.to_string()));
    }
    Ok(())
}

pub fn check_bill(draft: &BillDraft) -> Result<(), ValidationError> {
    check_member_id(&draft.created_by)?;
    for member_id in draft.members.keys().chain(draft.paid_at.keys()) {
        check_member_id(member_id)?;
    }
    check_bill_amount(draft)
}

/// The shares must add up to the bill total once both are rounded to whole
/// units. A zero total is never valid.
pub fn check_bill_amount(draft: &BillDraft) -> Result<(), ValidationError> {
    let members_total = members_total(&draft.members);
    if draft.amount == 0.0
        || !draft.amount.is_finite()
        || round_half_up(draft.amount) != round_half_up(members_total)
    {
        return Err(ValidationError::AmountMismatch {
            amount: draft.amount,
            members_total,
        });
    }
    Ok(())
}

pub fn check_members(members: &[Member]) -> Result<(), ValidationError> {
    let mut names = HashSet::new();
    for member in members {
        check_member_id(&member.id)?;
        if !names.insert(member.name.as_str()) {
            return Err(ValidationError::DuplicateMemberName(member.name.clone()));
        }
    }
    if members.iter().filter(|m| m.is_accounting).count() > 1 {
        return Err(ValidationError::MultipleAccounting);
    }
    Ok(())
}

pub fn with_member_added(
    members: &[Member],
    member: Member,
) -> Result<Vec<Member>, ValidationError> {
    check_member_id(&member.id)?;
    if members.iter().any(|m| m.name == member.name) {
        return Err(ValidationError::DuplicateMemberName(member.name));
    }
    let mut updated = members.to_vec();
    if member.is_accounting {
        for m in updated.iter_mut() {
            m.is_accounting = false;
        }
    }
    updated.push(member);
    Ok(updated)
}

/// Returns `Ok(None)` when no member has the replacement's id.
pub fn with_member_replaced(
    members: &[Member],
    replacement: Member,
) -> Result<Option<Vec<Member>>, ValidationError> {
    if !members.iter().any(|m| m.id == replacement.id) {
        return Ok(None);
    }
    if members
        .iter()
        .any(|m| m.id != replacement.id && m.name == replacement.name)
    {
        return Err(ValidationError::DuplicateMemberName(replacement.name));
    }
    let updated = members
        .iter()
        .map(|m| {
            if m.id == replacement.id {
                replacement.clone()
            } else if replacement.is_accounting {
                Member {
                    is_accounting: false,
                    ..m.clone()
                }
            } else {
                m.clone()
            }
        })
        .collect();
    Ok(Some(updated))
}

pub fn without_member(members: &[Member], member_id: &str) -> Vec<Member> {
    members
        .iter()
        .filter(|m| m.id != member_id)
        .cloned()
        .collect()
}

/// A member with a zero share is not considered a payer of the bill.
pub fn is_member_referenced(bills: &[Bill], member_id: &str) -> bool {
    bills.iter().any(|bill| {
        bill.created_by == member_id
            || bill
                .members
                .get(member_id)
                .is_some_and(|share| *share != 0.0)
    })
}

pub fn without_category(categories: &[Category], category_id: &str) -> Vec<Category> {
    categories
        .iter()
        .filter(|c| c.id != category_id)
        .cloned()
        .collect()
}

/// The bills holding `category_id`, each paired with its category list
/// once the reference is dropped.
pub fn strip_category(bills: &[Bill], category_id: &str) -> Vec<(BillId, Vec<CategoryId>)> {
    bills
        .iter()
        .filter(|bill| bill.category_ids.iter().any(|id| id == category_id))
        .map(|bill| {
            let remaining = bill
                .category_ids
                .iter()
                .filter(|id| *id != category_id)
                .cloned()
                .collect();
            (bill.id.clone(), remaining)
        })
        .collect()
}
