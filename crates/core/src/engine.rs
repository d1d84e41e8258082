//! The submission state machine.
//!
//! `pending → {approved, rejected, withdrawn}`, `approved → {fulfillment,
//! completed}`, `fulfillment → completed`. Rejection of any step halts the
//! flow unconditionally; approval advances to the next step holding pending
//! actions or finalizes the submission. All functions here are pure over the
//! submission and its action rows; persistence and side-effect dispatch live
//! in the service layer.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::resolve_step_status;
use crate::delegation::DelegationRegistry;
use crate::domain::employee::{EmployeeId, PositionId, RoleId};
use crate::domain::org::OrgDirectory;
use crate::domain::request::{FieldValue, RequestType};
use crate::domain::submission::{
    ActionId, ActionStatus, ApprovalStateSnapshot, ApproverIdentity, RequestApprovalAction,
    RequestSubmission, SubmissionId, SubmissionStatus,
};
use crate::errors::WorkflowError;
use crate::notify::{Notification, NotificationEvent};
use crate::resolver::{ApproverResolver, ResolutionNote, ScopeFilter};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

/// How the acting user matched the action they are deciding. The chain is
/// ordered: direct approver, then active delegate, then role holder, then
/// position holder; the first match wins.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActorMatch {
    Direct,
    Delegate { nominal: EmployeeId },
    RoleMember { role_id: RoleId },
    PositionHolder { position_id: PositionId },
}

/// A resolution diagnostic tied to the step it was produced for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDiagnostic {
    pub step_index: usize,
    pub step_name: String,
    pub note: ResolutionNote,
}

#[derive(Clone, Debug)]
pub struct InitializedFlow {
    pub submission: RequestSubmission,
    pub actions: Vec<RequestApprovalAction>,
    pub diagnostics: Vec<StepDiagnostic>,
    pub notifications: Vec<Notification>,
}

#[derive(Clone, Debug)]
pub struct DecisionOutcome {
    pub action_id: ActionId,
    pub actor_match: ActorMatch,
    pub step_status: ActionStatus,
    /// True when this decision completed the last approval step.
    pub final_approval: bool,
    pub notifications: Vec<Notification>,
}

pub struct ApprovalFlowEngine<'a> {
    directory: &'a OrgDirectory,
}

impl<'a> ApprovalFlowEngine<'a> {
    pub fn new(directory: &'a OrgDirectory) -> Self {
        Self { directory }
    }

    /// Build the submission and its per-step approval actions. Steps that
    /// resolve to zero usable approvers are skipped with a diagnostic; a
    /// submission whose every step is skipped (or whose type has no steps)
    /// finalizes immediately instead of blocking.
    pub fn initialize(
        &self,
        request_type: &RequestType,
        submission_id: SubmissionId,
        reference_code: String,
        requester_id: EmployeeId,
        answers: BTreeMap<String, FieldValue>,
        default_sla_hours: Option<u32>,
        now: DateTime<Utc>,
    ) -> InitializedFlow {
        let scope = ScopeFilter::for_requester(self.directory, &requester_id);
        let resolver = ApproverResolver::new(self.directory);
        let mut actions = Vec::new();
        let mut diagnostics = Vec::new();

        for (step_index, step) in request_type.steps.iter().enumerate() {
            let resolution = resolver.resolve(&step.approvers, &requester_id, scope.as_ref());
            for note in resolution.notes {
                diagnostics.push(StepDiagnostic {
                    step_index,
                    step_name: step.name.clone(),
                    note,
                });
            }
            let due_at = step
                .sla_hours
                .or(default_sla_hours)
                .map(|hours| now + Duration::hours(i64::from(hours)));
            for approver in resolution.approvers {
                actions.push(RequestApprovalAction {
                    id: ActionId(Uuid::new_v4().to_string()),
                    submission_id: submission_id.clone(),
                    step_index,
                    step_name: step.name.clone(),
                    status: ActionStatus::Pending,
                    identity: approver.identity,
                    origin: approver.origin,
                    was_escalated: approver.was_escalated,
                    due_at,
                    acted_by: None,
                    delegated_from: None,
                    acted_at: None,
                    created_at: now,
                    updated_at: now,
                });
            }
        }

        let current_step_index =
            actions.iter().map(|action| action.step_index).min();
        let status = match current_step_index {
            Some(_) => SubmissionStatus::Pending,
            None if request_type.requires_fulfillment => SubmissionStatus::Fulfillment,
            None => SubmissionStatus::Approved,
        };

        let submission = RequestSubmission {
            id: submission_id.clone(),
            reference_code: reference_code.clone(),
            request_type_id: request_type.id.clone(),
            requester_id: requester_id.clone(),
            status,
            current_step_index,
            answers,
            approval_state: ApprovalStateSnapshot::rebuild(&request_type.steps, &actions),
            version: 1,
            submitted_at: now,
            fulfilled_at: None,
            withdrawn_at: None,
            withdraw_reason: None,
            artifact_ref: None,
            created_at: now,
            updated_at: now,
        };

        let mut notifications = vec![Notification {
            recipients: vec![requester_id],
            event: NotificationEvent::SubmissionCreated {
                submission_id,
                reference_code,
            },
        }];
        if let Some(step_index) = current_step_index {
            notifications.push(self.step_awaiting_notification(&submission, &actions, step_index));
        }

        InitializedFlow { submission, actions, diagnostics, notifications }
    }

    /// Record one approver's decision on the current step, recompute the
    /// step's status, and advance or finalize the submission.
    pub fn record_decision(
        &self,
        submission: &mut RequestSubmission,
        actions: &mut [RequestApprovalAction],
        request_type: &RequestType,
        registry: &DelegationRegistry,
        actor: &EmployeeId,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> Result<DecisionOutcome, WorkflowError> {
        if submission.status != SubmissionStatus::Pending {
            return Err(WorkflowError::NotActionable {
                submission: submission.id.clone(),
                status: submission.status,
            });
        }
        let current_step =
            submission.current_step_index.ok_or_else(|| WorkflowError::NotActionable {
                submission: submission.id.clone(),
                status: submission.status,
            })?;

        let (action_index, actor_match) =
            find_actionable(actions, current_step, actor, registry, self.directory, now)
                .ok_or_else(|| WorkflowError::NoPendingAction {
                    submission: submission.id.clone(),
                    actor: actor.clone(),
                })?;

        let action = &mut actions[action_index];
        let action_id = action.id.clone();
        action.status = match decision {
            Decision::Approve => ActionStatus::Approved,
            Decision::Reject => ActionStatus::Rejected,
        };
        action.acted_by = Some(actor.clone());
        if let ActorMatch::Delegate { nominal } = &actor_match {
            action.delegated_from = Some(nominal.clone());
        }
        action.acted_at = Some(now);
        action.updated_at = now;

        let statuses: Vec<ActionStatus> = actions
            .iter()
            .filter(|action| action.step_index == current_step)
            .map(|action| action.status)
            .collect();
        let mode = request_type.steps[current_step].mode;
        let step_status = resolve_step_status(&statuses, mode);

        let mut final_approval = false;
        let mut notifications = Vec::new();
        match step_status {
            ActionStatus::Rejected => {
                submission.transition_to(SubmissionStatus::Rejected)?;
                notifications.push(Notification {
                    recipients: vec![submission.requester_id.clone()],
                    event: NotificationEvent::SubmissionRejected {
                        submission_id: submission.id.clone(),
                        step_index: current_step,
                    },
                });
            }
            ActionStatus::Approved => {
                let next_step = actions
                    .iter()
                    .filter(|action| {
                        action.step_index > current_step && action.status == ActionStatus::Pending
                    })
                    .map(|action| action.step_index)
                    .min();
                match next_step {
                    Some(next_step) => {
                        submission.current_step_index = Some(next_step);
                        notifications.push(self.step_awaiting_notification(
                            submission, actions, next_step,
                        ));
                    }
                    None => {
                        final_approval = true;
                        let next_status = if request_type.requires_fulfillment {
                            SubmissionStatus::Fulfillment
                        } else {
                            SubmissionStatus::Approved
                        };
                        submission.transition_to(next_status)?;
                        notifications.push(Notification {
                            recipients: vec![submission.requester_id.clone()],
                            event: NotificationEvent::SubmissionApproved {
                                submission_id: submission.id.clone(),
                                final_approval: true,
                            },
                        });
                    }
                }
            }
            ActionStatus::Pending => {}
        }

        submission.approval_state = ApprovalStateSnapshot::rebuild(&request_type.steps, actions);
        submission.version += 1;
        submission.updated_at = now;

        Ok(DecisionOutcome { action_id, actor_match, step_status, final_approval, notifications })
    }

    /// Requester-initiated withdrawal, valid only while pending. Approval
    /// actions are not mutated; they become inert.
    pub fn withdraw(
        &self,
        submission: &mut RequestSubmission,
        actions: &[RequestApprovalAction],
        request_type: &RequestType,
        requester: &EmployeeId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, WorkflowError> {
        if submission.requester_id != *requester {
            return Err(WorkflowError::Forbidden {
                submission: submission.id.clone(),
                actor: requester.clone(),
            });
        }

        let pending_recipients = submission
            .current_step_index
            .map(|step_index| self.step_recipients(actions, step_index))
            .unwrap_or_default();

        submission.transition_to(SubmissionStatus::Withdrawn)?;
        submission.withdrawn_at = Some(now);
        submission.withdraw_reason = reason;
        submission.approval_state = ApprovalStateSnapshot::rebuild(&request_type.steps, actions);
        submission.version += 1;
        submission.updated_at = now;

        let mut recipients = pending_recipients;
        recipients.push(submission.requester_id.clone());
        recipients.sort();
        recipients.dedup();
        Ok(vec![Notification {
            recipients,
            event: NotificationEvent::SubmissionWithdrawn { submission_id: submission.id.clone() },
        }])
    }

    /// Attach the deliverable and complete the submission. Valid only while
    /// in fulfillment.
    pub fn fulfill(
        &self,
        submission: &mut RequestSubmission,
        artifact_ref: String,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, WorkflowError> {
        if submission.status != SubmissionStatus::Fulfillment {
            return Err(WorkflowError::InvalidTransition {
                from: submission.status,
                to: SubmissionStatus::Completed,
            });
        }
        submission.transition_to(SubmissionStatus::Completed)?;
        submission.fulfilled_at = Some(now);
        submission.artifact_ref = Some(artifact_ref.clone());
        submission.version += 1;
        submission.updated_at = now;

        Ok(vec![Notification {
            recipients: vec![submission.requester_id.clone()],
            event: NotificationEvent::SubmissionFulfilled {
                submission_id: submission.id.clone(),
                artifact_ref,
            },
        }])
    }

    fn step_awaiting_notification(
        &self,
        submission: &RequestSubmission,
        actions: &[RequestApprovalAction],
        step_index: usize,
    ) -> Notification {
        let step_name = actions
            .iter()
            .find(|action| action.step_index == step_index)
            .map(|action| action.step_name.clone())
            .unwrap_or_default();
        Notification {
            recipients: self.step_recipients(actions, step_index),
            event: NotificationEvent::StepAwaitingApproval {
                submission_id: submission.id.clone(),
                step_index,
                step_name,
            },
        }
    }

    /// Users to notify for a step: named users plus the current holders of
    /// any unresolved role or position placeholders.
    fn step_recipients(
        &self,
        actions: &[RequestApprovalAction],
        step_index: usize,
    ) -> Vec<EmployeeId> {
        let mut recipients = Vec::new();
        for action in actions.iter().filter(|action| {
            action.step_index == step_index && action.status == ActionStatus::Pending
        }) {
            match &action.identity {
                ApproverIdentity::User { user_id } => recipients.push(user_id.clone()),
                ApproverIdentity::Role { role_id } => recipients.extend(
                    self.directory.role_holders(role_id).into_iter().map(|e| e.id.clone()),
                ),
                ApproverIdentity::Position { position_id } => recipients.extend(
                    self.directory
                        .primary_position_holders(position_id)
                        .into_iter()
                        .map(|e| e.id.clone()),
                ),
            }
        }
        recipients.sort();
        recipients.dedup();
        recipients
    }
}

/// The ordered actor-resolution chain: direct approver, active delegate of
/// the approver, holder of an unresolved role, holder of an unresolved
/// position. Only the current step's pending actions are considered; the
/// first arm that matches wins.
pub fn find_actionable(
    actions: &[RequestApprovalAction],
    current_step: usize,
    actor: &EmployeeId,
    registry: &DelegationRegistry,
    directory: &OrgDirectory,
    now: DateTime<Utc>,
) -> Option<(usize, ActorMatch)> {
    let pending = || {
        actions.iter().enumerate().filter(|(_, action)| {
            action.step_index == current_step && action.status == ActionStatus::Pending
        })
    };

    if let Some((index, _)) = pending().find(|(_, action)| {
        matches!(&action.identity, ApproverIdentity::User { user_id } if user_id == actor)
    }) {
        return Some((index, ActorMatch::Direct));
    }

    if let Some((index, nominal)) = pending().find_map(|(index, action)| match &action.identity {
        ApproverIdentity::User { user_id }
            if registry.can_act_on_behalf_of(actor, user_id, now) =>
        {
            Some((index, user_id.clone()))
        }
        _ => None,
    }) {
        return Some((index, ActorMatch::Delegate { nominal }));
    }

    if let Some((index, role_id)) = pending().find_map(|(index, action)| match &action.identity {
        ApproverIdentity::Role { role_id } if directory.holds_role(actor, role_id) => {
            Some((index, role_id.clone()))
        }
        _ => None,
    }) {
        return Some((index, ActorMatch::RoleMember { role_id }));
    }

    if let Some((index, position_id)) =
        pending().find_map(|(index, action)| match &action.identity {
            ApproverIdentity::Position { position_id }
                if directory.holds_position(actor, position_id) =>
            {
                Some((index, position_id.clone()))
            }
            _ => None,
        })
    {
        return Some((index, ActorMatch::PositionHolder { position_id }));
    }

    None
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Duration, Utc};

    use crate::delegation::{ApprovalDelegation, DelegationId, DelegationRegistry};
    use crate::domain::employee::{
        Designation, Employee, EmployeeId, OrgUnitId, Position, PositionId, Role, RoleAssignment,
        RoleId,
    };
    use crate::domain::org::{OrgDirectory, OrgUnit, OrgUnitKind};
    use crate::domain::request::{
        ApprovalMode, ApprovalStep, ApproverSpec, RequestType, RequestTypeId,
    };
    use crate::domain::submission::{
        ActionStatus, StepProgress, SubmissionId, SubmissionStatus,
    };
    use crate::errors::WorkflowError;
    use crate::notify::NotificationEvent;

    use super::{ActorMatch, ApprovalFlowEngine, Decision};

    fn employee(id: &str, name: &str) -> Employee {
        Employee {
            id: EmployeeId(id.to_string()),
            display_name: name.to_string(),
            unit_id: OrgUnitId("unit-hr".to_string()),
            active: true,
        }
    }

    fn directory() -> OrgDirectory {
        let units = vec![OrgUnit {
            id: OrgUnitId("unit-hr".to_string()),
            name: "Human Resources".to_string(),
            kind: OrgUnitKind::Unit,
            parent_id: None,
        }];
        let employees = vec![
            employee("e-req", "Rita Santos"),
            employee("e-ana", "Ana Reyes"),
            employee("e-ben", "Ben Cruz"),
            employee("e-dir", "Dina Ocampo"),
            employee("e-del", "Dex Ramos"),
        ];
        let roles =
            vec![Role { id: RoleId("hr-admin".to_string()), name: "HR Admin".to_string() }];
        let role_assignments = vec![
            RoleAssignment {
                employee_id: EmployeeId("e-ana".to_string()),
                role_id: RoleId("hr-admin".to_string()),
            },
            RoleAssignment {
                employee_id: EmployeeId("e-ben".to_string()),
                role_id: RoleId("hr-admin".to_string()),
            },
        ];
        let positions = vec![Position {
            id: PositionId("p-vacant".to_string()),
            title: "Deputy".to_string(),
            authority_level: 3,
            unit_id: OrgUnitId("unit-hr".to_string()),
        }];
        OrgDirectory::new(employees, roles, role_assignments, positions, Vec::new(), units)
    }

    fn single_step_any_role_type() -> RequestType {
        RequestType {
            id: RequestTypeId("rt-cert".to_string()),
            name: "Certificate Request".to_string(),
            fields: Vec::new(),
            steps: vec![ApprovalStep {
                name: "HR Review".to_string(),
                mode: ApprovalMode::Any,
                sla_hours: Some(48),
                approvers: vec![ApproverSpec::Role { role_id: RoleId("hr-admin".to_string()) }],
            }],
            requires_fulfillment: false,
            leave: None,
        }
    }

    fn two_step_type() -> RequestType {
        RequestType {
            id: RequestTypeId("rt-two".to_string()),
            name: "Two Step Request".to_string(),
            fields: Vec::new(),
            steps: vec![
                ApprovalStep {
                    name: "Supervisor".to_string(),
                    mode: ApprovalMode::Any,
                    sla_hours: None,
                    approvers: vec![ApproverSpec::User {
                        user_id: EmployeeId("e-ana".to_string()),
                    }],
                },
                ApprovalStep {
                    name: "Director".to_string(),
                    mode: ApprovalMode::Any,
                    sla_hours: None,
                    approvers: vec![ApproverSpec::User {
                        user_id: EmployeeId("e-dir".to_string()),
                    }],
                },
            ],
            requires_fulfillment: false,
            leave: None,
        }
    }

    fn init(
        engine: &ApprovalFlowEngine<'_>,
        request_type: &RequestType,
    ) -> super::InitializedFlow {
        engine.initialize(
            request_type,
            SubmissionId("sub-1".to_string()),
            "REQ-2026-TEST01".to_string(),
            EmployeeId("e-req".to_string()),
            BTreeMap::new(),
            None,
            Utc::now(),
        )
    }

    #[test]
    fn role_step_creates_one_action_per_holder_and_any_approval_finalizes() {
        let directory = directory();
        let engine = ApprovalFlowEngine::new(&directory);
        let request_type = single_step_any_role_type();
        let mut flow = init(&engine, &request_type);

        assert_eq!(flow.actions.len(), 2);
        assert_eq!(flow.submission.status, SubmissionStatus::Pending);
        assert_eq!(flow.submission.current_step_index, Some(0));
        assert!(flow.actions.iter().all(|action| action.due_at.is_some()));

        let outcome = engine
            .record_decision(
                &mut flow.submission,
                &mut flow.actions,
                &request_type,
                &DelegationRegistry::default(),
                &EmployeeId("e-ana".to_string()),
                Decision::Approve,
                Utc::now(),
            )
            .expect("ana approves");

        assert_eq!(outcome.step_status, ActionStatus::Approved);
        assert!(outcome.final_approval);
        assert_eq!(flow.submission.status, SubmissionStatus::Approved);
        assert_eq!(flow.submission.current_step_index, None);
        // The other holder's action stays pending but inert.
        assert_eq!(
            flow.actions.iter().filter(|a| a.status == ActionStatus::Pending).count(),
            1
        );
    }

    #[test]
    fn approving_step_zero_advances_to_step_one_and_notifies_its_approvers() {
        let directory = directory();
        let engine = ApprovalFlowEngine::new(&directory);
        let request_type = two_step_type();
        let mut flow = init(&engine, &request_type);

        let outcome = engine
            .record_decision(
                &mut flow.submission,
                &mut flow.actions,
                &request_type,
                &DelegationRegistry::default(),
                &EmployeeId("e-ana".to_string()),
                Decision::Approve,
                Utc::now(),
            )
            .expect("step zero approval");

        assert!(!outcome.final_approval);
        assert_eq!(flow.submission.status, SubmissionStatus::Pending);
        assert_eq!(flow.submission.current_step_index, Some(1));
        assert!(outcome.notifications.iter().any(|notification| matches!(
            &notification.event,
            NotificationEvent::StepAwaitingApproval { step_index: 1, .. }
        )));
        assert_eq!(flow.submission.approval_state.steps[0].progress, StepProgress::Approved);
        assert_eq!(flow.submission.approval_state.steps[1].progress, StepProgress::Pending);
    }

    #[test]
    fn rejection_short_circuits_the_whole_flow() {
        let directory = directory();
        let engine = ApprovalFlowEngine::new(&directory);
        let request_type = two_step_type();
        let mut flow = init(&engine, &request_type);

        let outcome = engine
            .record_decision(
                &mut flow.submission,
                &mut flow.actions,
                &request_type,
                &DelegationRegistry::default(),
                &EmployeeId("e-ana".to_string()),
                Decision::Reject,
                Utc::now(),
            )
            .expect("rejection");

        assert_eq!(outcome.step_status, ActionStatus::Rejected);
        assert_eq!(flow.submission.status, SubmissionStatus::Rejected);
        assert_eq!(flow.submission.current_step_index, None);

        // Nothing further is actionable, including the untouched step one.
        let error = engine
            .record_decision(
                &mut flow.submission,
                &mut flow.actions,
                &request_type,
                &DelegationRegistry::default(),
                &EmployeeId("e-dir".to_string()),
                Decision::Approve,
                Utc::now(),
            )
            .expect_err("rejected submission accepts no decisions");
        assert!(matches!(error, WorkflowError::NotActionable { .. }));
    }

    #[test]
    fn delegate_decision_records_the_nominal_approver() {
        let directory = directory();
        let engine = ApprovalFlowEngine::new(&directory);
        let request_type = two_step_type();
        let mut flow = init(&engine, &request_type);

        let now = Utc::now();
        let registry = DelegationRegistry::new(vec![ApprovalDelegation {
            id: DelegationId("d-1".to_string()),
            delegator_id: EmployeeId("e-ana".to_string()),
            delegate_id: EmployeeId("e-del".to_string()),
            starts_at: now - Duration::hours(1),
            ends_at: None,
            is_active: true,
            reason: None,
            created_at: now,
            updated_at: now,
        }]);

        let outcome = engine
            .record_decision(
                &mut flow.submission,
                &mut flow.actions,
                &request_type,
                &registry,
                &EmployeeId("e-del".to_string()),
                Decision::Approve,
                now,
            )
            .expect("delegate acts for ana");

        assert_eq!(
            outcome.actor_match,
            ActorMatch::Delegate { nominal: EmployeeId("e-ana".to_string()) }
        );
        let acted = flow.actions.iter().find(|a| a.acted_by.is_some()).expect("acted action");
        assert_eq!(acted.acted_by, Some(EmployeeId("e-del".to_string())));
        assert_eq!(acted.delegated_from, Some(EmployeeId("e-ana".to_string())));
    }

    #[test]
    fn unrelated_actor_gets_no_pending_action() {
        let directory = directory();
        let engine = ApprovalFlowEngine::new(&directory);
        let request_type = two_step_type();
        let mut flow = init(&engine, &request_type);

        let error = engine
            .record_decision(
                &mut flow.submission,
                &mut flow.actions,
                &request_type,
                &DelegationRegistry::default(),
                &EmployeeId("e-ben".to_string()),
                Decision::Approve,
                Utc::now(),
            )
            .expect_err("ben is not an approver of step zero");
        assert!(matches!(error, WorkflowError::NoPendingAction { .. }));
    }

    #[test]
    fn future_step_approver_cannot_act_early() {
        let directory = directory();
        let engine = ApprovalFlowEngine::new(&directory);
        let request_type = two_step_type();
        let mut flow = init(&engine, &request_type);

        let error = engine
            .record_decision(
                &mut flow.submission,
                &mut flow.actions,
                &request_type,
                &DelegationRegistry::default(),
                &EmployeeId("e-dir".to_string()),
                Decision::Approve,
                Utc::now(),
            )
            .expect_err("director's step is not current yet");
        assert!(matches!(error, WorkflowError::NoPendingAction { .. }));
    }

    #[test]
    fn withdraw_while_pending_then_any_decision_conflicts() {
        let directory = directory();
        let engine = ApprovalFlowEngine::new(&directory);
        let request_type = two_step_type();
        let mut flow = init(&engine, &request_type);

        engine
            .withdraw(
                &mut flow.submission,
                &flow.actions,
                &request_type,
                &EmployeeId("e-req".to_string()),
                Some("no longer needed".to_string()),
                Utc::now(),
            )
            .expect("requester withdraws");

        assert_eq!(flow.submission.status, SubmissionStatus::Withdrawn);
        assert_eq!(flow.submission.current_step_index, None);
        // Actions are untouched, merely inert.
        assert!(flow.actions.iter().all(|action| action.status == ActionStatus::Pending));

        let error = engine
            .record_decision(
                &mut flow.submission,
                &mut flow.actions,
                &request_type,
                &DelegationRegistry::default(),
                &EmployeeId("e-ana".to_string()),
                Decision::Approve,
                Utc::now(),
            )
            .expect_err("withdrawn submission accepts no decisions");
        assert!(matches!(error, WorkflowError::NotActionable { .. }));
    }

    #[test]
    fn withdraw_by_anyone_but_the_requester_is_forbidden() {
        let directory = directory();
        let engine = ApprovalFlowEngine::new(&directory);
        let request_type = two_step_type();
        let mut flow = init(&engine, &request_type);

        let error = engine
            .withdraw(
                &mut flow.submission,
                &flow.actions,
                &request_type,
                &EmployeeId("e-ana".to_string()),
                None,
                Utc::now(),
            )
            .expect_err("only the requester may withdraw");
        assert!(matches!(error, WorkflowError::Forbidden { .. }));
    }

    #[test]
    fn fulfillment_flow_completes_with_artifact() {
        let directory = directory();
        let engine = ApprovalFlowEngine::new(&directory);
        let mut request_type = two_step_type();
        request_type.requires_fulfillment = true;
        let mut flow = init(&engine, &request_type);

        for approver in ["e-ana", "e-dir"] {
            engine
                .record_decision(
                    &mut flow.submission,
                    &mut flow.actions,
                    &request_type,
                    &DelegationRegistry::default(),
                    &EmployeeId(approver.to_string()),
                    Decision::Approve,
                    Utc::now(),
                )
                .expect("approval");
        }
        assert_eq!(flow.submission.status, SubmissionStatus::Fulfillment);

        engine
            .fulfill(&mut flow.submission, "docs/cert-123.pdf".to_string(), Utc::now())
            .expect("fulfillment");
        assert_eq!(flow.submission.status, SubmissionStatus::Completed);
        assert_eq!(flow.submission.artifact_ref.as_deref(), Some("docs/cert-123.pdf"));
        assert!(flow.submission.fulfilled_at.is_some());

        let error = engine
            .fulfill(&mut flow.submission, "again".to_string(), Utc::now())
            .expect_err("completed submission cannot fulfill again");
        assert!(matches!(error, WorkflowError::InvalidTransition { .. }));
    }

    #[test]
    fn step_resolving_to_nothing_is_skipped_at_initialization() {
        let directory = directory();
        let engine = ApprovalFlowEngine::new(&directory);
        let request_type = RequestType {
            id: RequestTypeId("rt-skip".to_string()),
            name: "Skipping Request".to_string(),
            fields: Vec::new(),
            steps: vec![
                ApprovalStep {
                    name: "Ghost Step".to_string(),
                    mode: ApprovalMode::All,
                    sla_hours: None,
                    // Hierarchy has no position holders in the fixture, so this
                    // resolves to nothing.
                    approvers: vec![ApproverSpec::Hierarchical { min_authority_level: 9 }],
                },
                ApprovalStep {
                    name: "Director".to_string(),
                    mode: ApprovalMode::Any,
                    sla_hours: None,
                    approvers: vec![ApproverSpec::User {
                        user_id: EmployeeId("e-dir".to_string()),
                    }],
                },
            ],
            requires_fulfillment: false,
            leave: None,
        };

        let flow = init(&engine, &request_type);

        assert_eq!(flow.submission.current_step_index, Some(1));
        assert!(flow.actions.iter().all(|action| action.step_index == 1));
        assert!(!flow.diagnostics.is_empty());
        assert_eq!(flow.submission.approval_state.steps[0].progress, StepProgress::Skipped);
    }

    #[test]
    fn zero_step_type_finalizes_immediately() {
        let directory = directory();
        let engine = ApprovalFlowEngine::new(&directory);
        let request_type = RequestType {
            id: RequestTypeId("rt-auto".to_string()),
            name: "Auto Approved".to_string(),
            fields: Vec::new(),
            steps: Vec::new(),
            requires_fulfillment: true,
            leave: None,
        };

        let flow = init(&engine, &request_type);

        assert_eq!(flow.submission.status, SubmissionStatus::Fulfillment);
        assert_eq!(flow.submission.current_step_index, None);
        assert!(flow.actions.is_empty());
    }

    #[test]
    fn placeholder_role_action_is_completable_by_a_role_holder() {
        // Build a directory where the role has no holders at submission time,
        // then hand the decision to a directory where it does.
        let empty_units = vec![OrgUnit {
            id: OrgUnitId("unit-hr".to_string()),
            name: "Human Resources".to_string(),
            kind: OrgUnitKind::Unit,
            parent_id: None,
        }];
        let sparse = OrgDirectory::new(
            vec![employee("e-req", "Rita Santos")],
            vec![Role { id: RoleId("hr-admin".to_string()), name: "HR Admin".to_string() }],
            Vec::new(),
            Vec::new(),
            Vec::new(),
            empty_units,
        );
        let engine = ApprovalFlowEngine::new(&sparse);
        let request_type = single_step_any_role_type();
        let mut flow = init(&engine, &request_type);

        assert_eq!(flow.actions.len(), 1);
        assert!(matches!(
            flow.actions[0].identity,
            crate::domain::submission::ApproverIdentity::Role { .. }
        ));

        // Later, the role has a holder.
        let staffed = directory();
        let engine = ApprovalFlowEngine::new(&staffed);
        let outcome = engine
            .record_decision(
                &mut flow.submission,
                &mut flow.actions,
                &request_type,
                &DelegationRegistry::default(),
                &EmployeeId("e-ana".to_string()),
                Decision::Approve,
                Utc::now(),
            )
            .expect("role holder completes the placeholder action");

        assert_eq!(
            outcome.actor_match,
            ActorMatch::RoleMember { role_id: RoleId("hr-admin".to_string()) }
        );
        // The placeholder identity is untouched; the actor is recorded.
        assert!(matches!(
            flow.actions[0].identity,
            crate::domain::submission::ApproverIdentity::Role { .. }
        ));
        assert_eq!(flow.actions[0].acted_by, Some(EmployeeId("e-ana".to_string())));
    }
}
