//! Time-bounded delegation of approval authority.
//!
//! A delegation lets one user act on another's pending approvals while the
//! grant window is open. A delegator holds at most one active delegation at
//! any point in time; that invariant is enforced when the grant is created,
//! not merely assumed. Deactivation flips a flag and keeps the record, so
//! delegation history stays queryable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::employee::EmployeeId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DelegationId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDelegation {
    pub id: DelegationId,
    pub delegator_id: EmployeeId,
    pub delegate_id: EmployeeId,
    pub starts_at: DateTime<Utc>,
    /// None means open-ended.
    pub ends_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApprovalDelegation {
    pub fn in_effect(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.starts_at <= now
            && self.ends_at.map_or(true, |ends_at| ends_at >= now)
    }

    /// Whether two grant windows can both be open at some instant. Open
    /// ends count as unbounded.
    pub fn window_overlaps(&self, other: &ApprovalDelegation) -> bool {
        let self_ends = self.ends_at.unwrap_or(DateTime::<Utc>::MAX_UTC);
        let other_ends = other.ends_at.unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.starts_at <= other_ends && other.starts_at <= self_ends
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("delegator `{delegator_id:?}` already has an active delegation ({existing_id:?})")]
pub struct DelegationConflict {
    pub delegator_id: EmployeeId,
    pub existing_id: DelegationId,
}

/// Find an existing active delegation for the same delegator whose window
/// overlaps the candidate's. Shared by the in-memory registry and the
/// in-memory store so both enforce the same invariant.
pub fn find_conflict<'a>(
    existing: impl IntoIterator<Item = &'a ApprovalDelegation>,
    candidate: &ApprovalDelegation,
) -> Option<&'a ApprovalDelegation> {
    existing.into_iter().find(|delegation| {
        delegation.id != candidate.id
            && delegation.is_active
            && delegation.delegator_id == candidate.delegator_id
            && delegation.window_overlaps(candidate)
    })
}

/// Answers "who may act on behalf of whom right now" over a set of
/// delegation records, typically the active records loaded for one decision.
#[derive(Clone, Debug, Default)]
pub struct DelegationRegistry {
    delegations: Vec<ApprovalDelegation>,
}

impl DelegationRegistry {
    pub fn new(delegations: Vec<ApprovalDelegation>) -> Self {
        Self { delegations }
    }

    pub fn active_delegate_of(
        &self,
        delegator_id: &EmployeeId,
        now: DateTime<Utc>,
    ) -> Option<&EmployeeId> {
        self.delegations
            .iter()
            .find(|delegation| delegation.delegator_id == *delegator_id && delegation.in_effect(now))
            .map(|delegation| &delegation.delegate_id)
    }

    pub fn delegators_of(&self, delegate_id: &EmployeeId, now: DateTime<Utc>) -> Vec<EmployeeId> {
        self.delegations
            .iter()
            .filter(|delegation| delegation.delegate_id == *delegate_id && delegation.in_effect(now))
            .map(|delegation| delegation.delegator_id.clone())
            .collect()
    }

    pub fn can_act_on_behalf_of(
        &self,
        actor_id: &EmployeeId,
        nominal_approver_id: &EmployeeId,
        now: DateTime<Utc>,
    ) -> bool {
        self.delegations.iter().any(|delegation| {
            delegation.delegator_id == *nominal_approver_id
                && delegation.delegate_id == *actor_id
                && delegation.in_effect(now)
        })
    }

    /// Register a new grant, rejecting it if the delegator already has an
    /// active delegation with an overlapping window.
    pub fn try_register(
        &mut self,
        delegation: ApprovalDelegation,
    ) -> Result<(), DelegationConflict> {
        if let Some(existing) = find_conflict(self.delegations.iter(), &delegation) {
            return Err(DelegationConflict {
                delegator_id: delegation.delegator_id,
                existing_id: existing.id.clone(),
            });
        }
        self.delegations.push(delegation);
        Ok(())
    }

    /// Soft deactivation; the record stays for history queries.
    pub fn deactivate(&mut self, id: &DelegationId, now: DateTime<Utc>) -> bool {
        match self.delegations.iter_mut().find(|delegation| delegation.id == *id) {
            Some(delegation) => {
                delegation.is_active = false;
                delegation.updated_at = now;
                true
            }
            None => false,
        }
    }
}
