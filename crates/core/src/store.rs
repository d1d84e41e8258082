//! Narrow persistence seams consumed by the workflow service, plus in-memory
//! implementations used by tests and embedding callers that do not need a
//! database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::delegation::{find_conflict, ApprovalDelegation, DelegationId};
use crate::domain::employee::{EmployeeId, PositionId, RoleId};
use crate::domain::submission::{
    ActionStatus, ApprovalComment, ApproverIdentity, RequestApprovalAction, RequestSubmission,
    SubmissionId, SubmissionStatus,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Identity filter for the pending-approvals inbox: the user themselves, the
/// delegators they may act for, and the roles/positions they hold.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApproverFilter {
    pub user_ids: Vec<EmployeeId>,
    pub role_ids: Vec<RoleId>,
    pub position_ids: Vec<PositionId>,
}

impl ApproverFilter {
    pub fn matches(&self, identity: &ApproverIdentity) -> bool {
        match identity {
            ApproverIdentity::User { user_id } => self.user_ids.contains(user_id),
            ApproverIdentity::Role { role_id } => self.role_ids.contains(role_id),
            ApproverIdentity::Position { position_id } => self.position_ids.contains(position_id),
        }
    }
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn create(
        &self,
        submission: &RequestSubmission,
        actions: &[RequestApprovalAction],
        comments: &[ApprovalComment],
    ) -> Result<(), StoreError>;

    async fn find_submission(
        &self,
        id: &SubmissionId,
    ) -> Result<Option<RequestSubmission>, StoreError>;

    async fn actions_for(
        &self,
        id: &SubmissionId,
    ) -> Result<Vec<RequestApprovalAction>, StoreError>;

    async fn comments_for(&self, id: &SubmissionId) -> Result<Vec<ApprovalComment>, StoreError>;

    /// Persist a state transition atomically: the submission row is replaced
    /// only if its stored version still equals `expected_version`, and the
    /// updated actions and appended comments go in the same transaction.
    /// A version mismatch surfaces as `StoreError::Conflict` with nothing
    /// written, which is how concurrent decisions on the same step are
    /// serialized.
    async fn persist_transition(
        &self,
        submission: &RequestSubmission,
        expected_version: u32,
        actions: &[RequestApprovalAction],
        comments: &[ApprovalComment],
    ) -> Result<(), StoreError>;

    async fn append_comment(&self, comment: &ApprovalComment) -> Result<(), StoreError>;

    /// Pending actions on the current step of pending submissions whose
    /// identity matches the filter.
    async fn pending_actions_for(
        &self,
        filter: &ApproverFilter,
    ) -> Result<Vec<RequestApprovalAction>, StoreError>;
}

#[async_trait]
pub trait DelegationStore: Send + Sync {
    /// Insert a delegation; the at-most-one-active-per-delegator check runs
    /// inside the same transaction as the insert.
    async fn create(&self, delegation: &ApprovalDelegation) -> Result<(), StoreError>;

    async fn deactivate(&self, id: &DelegationId, now: DateTime<Utc>) -> Result<(), StoreError>;

    async fn in_effect_at(&self, now: DateTime<Utc>) -> Result<Vec<ApprovalDelegation>, StoreError>;

    /// Full history for a delegator, inactive grants included.
    async fn history_for(
        &self,
        delegator: &EmployeeId,
    ) -> Result<Vec<ApprovalDelegation>, StoreError>;
}

#[derive(Clone, Debug)]
struct SubmissionEntry {
    submission: RequestSubmission,
    actions: Vec<RequestApprovalAction>,
    comments: Vec<ApprovalComment>,
}

#[derive(Default)]
pub struct InMemorySubmissionStore {
    entries: Mutex<HashMap<String, SubmissionEntry>>,
}

#[async_trait]
impl SubmissionStore for InMemorySubmissionStore {
    async fn create(
        &self,
        submission: &RequestSubmission,
        actions: &[RequestApprovalAction],
        comments: &[ApprovalComment],
    ) -> Result<(), StoreError> {
        let mut entries = lock(&self.entries);
        if entries.contains_key(&submission.id.0) {
            return Err(StoreError::Conflict(format!(
                "submission `{}` already exists",
                submission.id.0
            )));
        }
        entries.insert(
            submission.id.0.clone(),
            SubmissionEntry {
                submission: submission.clone(),
                actions: actions.to_vec(),
                comments: comments.to_vec(),
            },
        );
        Ok(())
    }

    async fn find_submission(
        &self,
        id: &SubmissionId,
    ) -> Result<Option<RequestSubmission>, StoreError> {
        Ok(lock(&self.entries).get(&id.0).map(|entry| entry.submission.clone()))
    }

    async fn actions_for(
        &self,
        id: &SubmissionId,
    ) -> Result<Vec<RequestApprovalAction>, StoreError> {
        Ok(lock(&self.entries).get(&id.0).map(|entry| entry.actions.clone()).unwrap_or_default())
    }

    async fn comments_for(&self, id: &SubmissionId) -> Result<Vec<ApprovalComment>, StoreError> {
        Ok(lock(&self.entries).get(&id.0).map(|entry| entry.comments.clone()).unwrap_or_default())
    }

    async fn persist_transition(
        &self,
        submission: &RequestSubmission,
        expected_version: u32,
        actions: &[RequestApprovalAction],
        comments: &[ApprovalComment],
    ) -> Result<(), StoreError> {
        let mut entries = lock(&self.entries);
        let entry = entries
            .get_mut(&submission.id.0)
            .ok_or_else(|| StoreError::NotFound(format!("submission `{}`", submission.id.0)))?;
        if entry.submission.version != expected_version {
            return Err(StoreError::Conflict(format!(
                "submission `{}` version changed (expected {expected_version}, found {})",
                submission.id.0, entry.submission.version
            )));
        }
        entry.submission = submission.clone();
        entry.actions = actions.to_vec();
        entry.comments.extend(comments.iter().cloned());
        Ok(())
    }

    async fn append_comment(&self, comment: &ApprovalComment) -> Result<(), StoreError> {
        let mut entries = lock(&self.entries);
        let entry = entries.get_mut(&comment.submission_id.0).ok_or_else(|| {
            StoreError::NotFound(format!("submission `{}`", comment.submission_id.0))
        })?;
        entry.comments.push(comment.clone());
        Ok(())
    }

    async fn pending_actions_for(
        &self,
        filter: &ApproverFilter,
    ) -> Result<Vec<RequestApprovalAction>, StoreError> {
        let entries = lock(&self.entries);
        let mut matches = Vec::new();
        for entry in entries.values() {
            if entry.submission.status != SubmissionStatus::Pending {
                continue;
            }
            let Some(current_step) = entry.submission.current_step_index else {
                continue;
            };
            matches.extend(
                entry
                    .actions
                    .iter()
                    .filter(|action| {
                        action.step_index == current_step
                            && action.status == ActionStatus::Pending
                            && filter.matches(&action.identity)
                    })
                    .cloned(),
            );
        }
        Ok(matches)
    }
}

#[derive(Default)]
pub struct InMemoryDelegationStore {
    delegations: Mutex<Vec<ApprovalDelegation>>,
}

#[async_trait]
impl DelegationStore for InMemoryDelegationStore {
    async fn create(&self, delegation: &ApprovalDelegation) -> Result<(), StoreError> {
        let mut delegations = lock(&self.delegations);
        if let Some(existing) = find_conflict(delegations.iter(), delegation) {
            return Err(StoreError::Conflict(format!(
                "delegator `{}` already has active delegation `{}`",
                delegation.delegator_id.0, existing.id.0
            )));
        }
        delegations.push(delegation.clone());
        Ok(())
    }

    async fn deactivate(&self, id: &DelegationId, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut delegations = lock(&self.delegations);
        let delegation = delegations
            .iter_mut()
            .find(|delegation| delegation.id == *id)
            .ok_or_else(|| StoreError::NotFound(format!("delegation `{}`", id.0)))?;
        delegation.is_active = false;
        delegation.updated_at = now;
        Ok(())
    }

    async fn in_effect_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ApprovalDelegation>, StoreError> {
        Ok(lock(&self.delegations)
            .iter()
            .filter(|delegation| delegation.in_effect(now))
            .cloned()
            .collect())
    }

    async fn history_for(
        &self,
        delegator: &EmployeeId,
    ) -> Result<Vec<ApprovalDelegation>, StoreError> {
        Ok(lock(&self.delegations)
            .iter()
            .filter(|delegation| delegation.delegator_id == *delegator)
            .cloned()
            .collect())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
