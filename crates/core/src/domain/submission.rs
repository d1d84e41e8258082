use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::resolve_step_status;
use crate::domain::employee::{EmployeeId, PositionId, RoleId};
use crate::domain::request::{ApprovalMode, ApprovalStep, FieldValue, RequestTypeId};
use crate::errors::WorkflowError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommentId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Fulfillment,
    Completed,
    Rejected,
    Withdrawn,
}

impl SubmissionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Withdrawn)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Approved,
    Rejected,
}

/// Concrete approver identity on an action row. The user variant is the
/// common case; role and position variants are placeholders kept when a spec
/// resolved to zero users, so the step remains displayable and completable by
/// whoever holds the role or position at decision time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApproverIdentity {
    User { user_id: EmployeeId },
    Role { role_id: RoleId },
    Position { position_id: PositionId },
}

/// How an action's identity was produced from the step's approver specs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApproverOrigin {
    Direct,
    RoleExpansion { role_id: RoleId },
    PositionExpansion { position_id: PositionId },
    Hierarchy { authority_level: u8 },
}

/// One approver's assignment within one step of one submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestApprovalAction {
    pub id: ActionId,
    pub submission_id: SubmissionId,
    pub step_index: usize,
    pub step_name: String,
    pub status: ActionStatus,
    pub identity: ApproverIdentity,
    pub origin: ApproverOrigin,
    pub was_escalated: bool,
    pub due_at: Option<DateTime<Utc>>,
    pub acted_by: Option<EmployeeId>,
    pub delegated_from: Option<EmployeeId>,
    pub acted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RequestApprovalAction {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == ActionStatus::Pending && self.due_at.is_some_and(|due| due < now)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentVisibility {
    Internal,
    Public,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentKind {
    General,
    Approval,
    Rejection,
    System,
}

/// Append-only annotation on a submission. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalComment {
    pub id: CommentId,
    pub submission_id: SubmissionId,
    pub action_id: Option<ActionId>,
    /// None for system-generated diagnostics.
    pub author_id: Option<EmployeeId>,
    pub body: String,
    pub visibility: CommentVisibility,
    pub kind: CommentKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepProgress {
    Pending,
    Approved,
    Rejected,
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverState {
    pub identity: ApproverIdentity,
    pub status: ActionStatus,
    pub acted_by: Option<EmployeeId>,
    pub delegated_from: Option<EmployeeId>,
    pub was_escalated: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepState {
    pub index: usize,
    pub name: String,
    pub mode: ApprovalMode,
    pub progress: StepProgress,
    pub approvers: Vec<ApproverState>,
}

/// Denormalized read view of step and approver statuses, stored on the
/// submission for read-without-join. Always recomputed from the action rows;
/// never edited independently of them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStateSnapshot {
    pub steps: Vec<StepState>,
}

impl ApprovalStateSnapshot {
    pub fn rebuild(steps: &[ApprovalStep], actions: &[RequestApprovalAction]) -> Self {
        let steps = steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                let step_actions: Vec<&RequestApprovalAction> =
                    actions.iter().filter(|action| action.step_index == index).collect();
                let statuses: Vec<ActionStatus> =
                    step_actions.iter().map(|action| action.status).collect();
                let progress = if step_actions.is_empty() {
                    StepProgress::Skipped
                } else {
                    match resolve_step_status(&statuses, step.mode) {
                        ActionStatus::Pending => StepProgress::Pending,
                        ActionStatus::Approved => StepProgress::Approved,
                        ActionStatus::Rejected => StepProgress::Rejected,
                    }
                };
                StepState {
                    index,
                    name: step.name.clone(),
                    mode: step.mode,
                    progress,
                    approvers: step_actions
                        .iter()
                        .map(|action| ApproverState {
                            identity: action.identity.clone(),
                            status: action.status,
                            acted_by: action.acted_by.clone(),
                            delegated_from: action.delegated_from.clone(),
                            was_escalated: action.was_escalated,
                        })
                        .collect(),
                }
            })
            .collect();

        Self { steps }
    }
}

/// One instance of a request moving through its type's workflow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSubmission {
    pub id: SubmissionId,
    pub reference_code: String,
    pub request_type_id: RequestTypeId,
    pub requester_id: EmployeeId,
    pub status: SubmissionStatus,
    /// Index of the step currently awaiting decisions. `Some` iff status is
    /// `Pending`.
    pub current_step_index: Option<usize>,
    pub answers: BTreeMap<String, FieldValue>,
    pub approval_state: ApprovalStateSnapshot,
    /// Optimistic concurrency counter; bumped on every persisted transition.
    pub version: u32,
    pub submitted_at: DateTime<Utc>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub withdrawn_at: Option<DateTime<Utc>>,
    pub withdraw_reason: Option<String>,
    pub artifact_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RequestSubmission {
    pub fn can_transition_to(&self, next: SubmissionStatus) -> bool {
        matches!(
            (self.status, next),
            (SubmissionStatus::Pending, SubmissionStatus::Approved)
                | (SubmissionStatus::Pending, SubmissionStatus::Rejected)
                | (SubmissionStatus::Pending, SubmissionStatus::Withdrawn)
                | (SubmissionStatus::Pending, SubmissionStatus::Fulfillment)
                | (SubmissionStatus::Approved, SubmissionStatus::Fulfillment)
                | (SubmissionStatus::Approved, SubmissionStatus::Completed)
                | (SubmissionStatus::Fulfillment, SubmissionStatus::Completed)
        )
    }

    pub fn transition_to(&mut self, next: SubmissionStatus) -> Result<(), WorkflowError> {
        if !self.can_transition_to(next) {
            return Err(WorkflowError::InvalidTransition { from: self.status, to: next });
        }
        self.status = next;
        if next != SubmissionStatus::Pending {
            self.current_step_index = None;
        }
        Ok(())
    }
}

/// Human-facing reference code, e.g. `REQ-2026-K4PX7N`. The alphabet skips
/// lookalike characters.
pub fn generate_reference_code(prefix: &str, now: DateTime<Utc>) -> String {
    use chrono::Datelike;
    use rand::Rng;

    const ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    let tail: String =
        (0..6).map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char).collect();
    format!("{prefix}-{}-{tail}", now.year())
}
