//! Application facade invoked by the web-request layer.
//!
//! Wraps the pure engine with persistence, delegation lookup, balance
//! guarding, and best-effort audit/notification side effects. Persistence
//! failures abort an operation wholesale; sink failures never do.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::authz::Authorizer;
use crate::balance::{BalanceGuard, LeaveLedger};
use crate::delegation::{find_conflict, ApprovalDelegation, DelegationId, DelegationRegistry};
use crate::domain::employee::EmployeeId;
use crate::domain::org::OrgDirectory;
use crate::domain::request::{FieldValue, RequestType, RequestTypeId};
use crate::domain::submission::{
    generate_reference_code, ApprovalComment, CommentId, CommentKind, CommentVisibility,
    RequestApprovalAction, RequestSubmission, SubmissionId,
};
use crate::engine::{ApprovalFlowEngine, Decision};
use crate::errors::{ServiceError, WorkflowError};
use crate::notify::{Notification, NotificationSink};
use crate::store::{ApproverFilter, DelegationStore, SubmissionStore};

/// Static context the workflow runs against: the request-type catalog, the
/// organizational snapshot, and reference-code settings.
#[derive(Clone, Debug)]
pub struct WorkflowEnvironment {
    request_types: HashMap<String, RequestType>,
    pub directory: OrgDirectory,
    pub reference_prefix: String,
    pub default_sla_hours: Option<u32>,
}

impl WorkflowEnvironment {
    pub fn new(
        request_types: Vec<RequestType>,
        directory: OrgDirectory,
        reference_prefix: impl Into<String>,
    ) -> Self {
        Self {
            request_types: request_types
                .into_iter()
                .map(|request_type| (request_type.id.0.clone(), request_type))
                .collect(),
            directory,
            reference_prefix: reference_prefix.into(),
            default_sla_hours: None,
        }
    }

    pub fn with_default_sla_hours(mut self, hours: u32) -> Self {
        self.default_sla_hours = Some(hours);
        self
    }

    pub fn request_type(&self, id: &RequestTypeId) -> Option<&RequestType> {
        self.request_types.get(&id.0)
    }
}

pub struct WorkflowService<S, D, L> {
    env: WorkflowEnvironment,
    store: S,
    delegations: D,
    guard: BalanceGuard<L>,
    notifications: Arc<dyn NotificationSink>,
    audit: Arc<dyn AuditSink>,
    authorizer: Arc<dyn Authorizer>,
}

impl<S, D, L> WorkflowService<S, D, L>
where
    S: SubmissionStore,
    D: DelegationStore,
    L: LeaveLedger,
{
    pub fn new(
        env: WorkflowEnvironment,
        store: S,
        delegations: D,
        guard: BalanceGuard<L>,
        notifications: Arc<dyn NotificationSink>,
        audit: Arc<dyn AuditSink>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        Self { env, store, delegations, guard, notifications, audit, authorizer }
    }

    /// Validate and create a submission, resolving every step's approvers and
    /// notifying the first step. Leave-typed requests are balance-checked
    /// before anything is written.
    pub async fn submit(
        &self,
        request_type_id: &RequestTypeId,
        requester_id: &EmployeeId,
        answers: BTreeMap<String, FieldValue>,
        now: DateTime<Utc>,
    ) -> Result<RequestSubmission, ServiceError> {
        let request_type = self
            .env
            .request_type(request_type_id)
            .ok_or_else(|| WorkflowError::UnknownRequestType(request_type_id.clone()))?;
        let requester = self
            .env
            .directory
            .employee(requester_id)
            .filter(|employee| employee.active)
            .ok_or_else(|| WorkflowError::UnknownEmployee(requester_id.clone()))?;

        let problems = request_type.validate_answers(&answers);
        if !problems.is_empty() {
            return Err(WorkflowError::Validation { problems }.into());
        }

        if let Some(binding) = &request_type.leave {
            let mut date_problems = Vec::new();
            let start = RequestType::date_answer(&answers, &binding.start_field);
            let end = RequestType::date_answer(&answers, &binding.end_field);
            if start.is_none() {
                date_problems.push(format!("field `{}` must be a date", binding.start_field));
            }
            if end.is_none() {
                date_problems.push(format!("field `{}` must be a date", binding.end_field));
            }
            let (Some(start), Some(end)) = (start, end) else {
                return Err(WorkflowError::Validation { problems: date_problems }.into());
            };

            if let Err(error) = self
                .guard
                .assert_sufficient(&requester.id, &binding.leave_type, start, end)
                .await
            {
                self.audit.emit(AuditEvent::new(
                    "submission.balance_rejected",
                    AuditCategory::Balance,
                    "request_type",
                    request_type_id.0.clone(),
                    requester_id.0.clone(),
                    AuditOutcome::Rejected,
                    error.to_string(),
                ));
                return Err(error.into());
            }
        }

        let engine = ApprovalFlowEngine::new(&self.env.directory);
        let flow = engine.initialize(
            request_type,
            SubmissionId(Uuid::new_v4().to_string()),
            generate_reference_code(&self.env.reference_prefix, now),
            requester_id.clone(),
            answers,
            self.env.default_sla_hours,
            now,
        );

        // Resolution diagnostics become internal system comments so the
        // submission carries its own explanation of skipped or escalated
        // steps.
        let comments: Vec<ApprovalComment> = flow
            .diagnostics
            .iter()
            .map(|diagnostic| ApprovalComment {
                id: CommentId(Uuid::new_v4().to_string()),
                submission_id: flow.submission.id.clone(),
                action_id: None,
                author_id: None,
                body: format!(
                    "step {} ({}): {}",
                    diagnostic.step_index, diagnostic.step_name, diagnostic.note
                ),
                visibility: CommentVisibility::Internal,
                kind: CommentKind::System,
                created_at: now,
            })
            .collect();

        self.store.create(&flow.submission, &flow.actions, &comments).await?;

        self.audit.emit(
            AuditEvent::new(
                "submission.created",
                AuditCategory::Submission,
                "request_submission",
                flow.submission.id.0.clone(),
                requester_id.0.clone(),
                AuditOutcome::Success,
                format!("submitted `{}`", flow.submission.reference_code),
            )
            .with_metadata("request_type", request_type_id.0.clone())
            .with_metadata("status", format!("{:?}", flow.submission.status)),
        );
        self.dispatch(flow.notifications);

        Ok(flow.submission)
    }

    /// Record an approve/reject decision by `actor_id` on the submission's
    /// current step.
    pub async fn act(
        &self,
        submission_id: &SubmissionId,
        actor_id: &EmployeeId,
        decision: Decision,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<RequestSubmission, ServiceError> {
        let (mut submission, mut actions, request_type) = self.load(submission_id).await?;
        let expected_version = submission.version;

        let registry = DelegationRegistry::new(self.delegations.in_effect_at(now).await?);
        let engine = ApprovalFlowEngine::new(&self.env.directory);
        let outcome = match engine.record_decision(
            &mut submission,
            &mut actions,
            &request_type,
            &registry,
            actor_id,
            decision,
            now,
        ) {
            Ok(outcome) => outcome,
            Err(error) => {
                self.audit.emit(AuditEvent::new(
                    "submission.decision_rejected",
                    AuditCategory::Decision,
                    "request_submission",
                    submission_id.0.clone(),
                    actor_id.0.clone(),
                    AuditOutcome::Rejected,
                    error.to_string(),
                ));
                return Err(error.into());
            }
        };

        let comments: Vec<ApprovalComment> = notes
            .map(|body| ApprovalComment {
                id: CommentId(Uuid::new_v4().to_string()),
                submission_id: submission.id.clone(),
                action_id: Some(outcome.action_id.clone()),
                author_id: Some(actor_id.clone()),
                body,
                visibility: CommentVisibility::Public,
                kind: match decision {
                    Decision::Approve => CommentKind::Approval,
                    Decision::Reject => CommentKind::Rejection,
                },
                created_at: now,
            })
            .into_iter()
            .collect();

        self.store.persist_transition(&submission, expected_version, &actions, &comments).await?;

        self.audit.emit(
            AuditEvent::new(
                "submission.decision_recorded",
                AuditCategory::Decision,
                "request_submission",
                submission.id.0.clone(),
                actor_id.0.clone(),
                AuditOutcome::Success,
                format!("{decision:?} via {:?}", outcome.actor_match),
            )
            .with_metadata("step_status", format!("{:?}", outcome.step_status))
            .with_metadata("final_approval", outcome.final_approval.to_string())
            .with_metadata("status", format!("{:?}", submission.status)),
        );
        self.dispatch(outcome.notifications);

        Ok(submission)
    }

    /// Requester-initiated withdrawal of a pending submission.
    pub async fn withdraw(
        &self,
        submission_id: &SubmissionId,
        requester_id: &EmployeeId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<RequestSubmission, ServiceError> {
        let (mut submission, actions, request_type) = self.load(submission_id).await?;
        let expected_version = submission.version;

        let engine = ApprovalFlowEngine::new(&self.env.directory);
        let notifications =
            engine.withdraw(&mut submission, &actions, &request_type, requester_id, reason, now)?;

        self.store.persist_transition(&submission, expected_version, &actions, &[]).await?;

        self.audit.emit(AuditEvent::new(
            "submission.withdrawn",
            AuditCategory::Submission,
            "request_submission",
            submission.id.0.clone(),
            requester_id.0.clone(),
            AuditOutcome::Success,
            format!("withdrew `{}`", submission.reference_code),
        ));
        self.dispatch(notifications);

        Ok(submission)
    }

    /// Attach the deliverable artifact and complete a submission awaiting
    /// fulfillment. Gated on the host's permission capability rather than on
    /// approver eligibility.
    pub async fn fulfill(
        &self,
        submission_id: &SubmissionId,
        actor_id: &EmployeeId,
        artifact_ref: impl Into<String>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<RequestSubmission, ServiceError> {
        if !self.authorizer.can(actor_id, "requests.fulfill") {
            return Err(WorkflowError::Forbidden {
                submission: submission_id.clone(),
                actor: actor_id.clone(),
            }
            .into());
        }

        let (mut submission, actions, _request_type) = self.load(submission_id).await?;
        let expected_version = submission.version;

        let engine = ApprovalFlowEngine::new(&self.env.directory);
        let notifications = engine.fulfill(&mut submission, artifact_ref.into(), now)?;

        let comments: Vec<ApprovalComment> = notes
            .map(|body| ApprovalComment {
                id: CommentId(Uuid::new_v4().to_string()),
                submission_id: submission.id.clone(),
                action_id: None,
                author_id: Some(actor_id.clone()),
                body,
                visibility: CommentVisibility::Public,
                kind: CommentKind::General,
                created_at: now,
            })
            .into_iter()
            .collect();

        self.store.persist_transition(&submission, expected_version, &actions, &comments).await?;

        self.audit.emit(AuditEvent::new(
            "submission.fulfilled",
            AuditCategory::Fulfillment,
            "request_submission",
            submission.id.0.clone(),
            actor_id.0.clone(),
            AuditOutcome::Success,
            format!("fulfilled `{}`", submission.reference_code),
        ));
        self.dispatch(notifications);

        Ok(submission)
    }

    /// Append a comment; comments are accepted in any state and never
    /// mutated afterwards.
    pub async fn comment(
        &self,
        submission_id: &SubmissionId,
        author_id: &EmployeeId,
        body: impl Into<String>,
        visibility: CommentVisibility,
        now: DateTime<Utc>,
    ) -> Result<ApprovalComment, ServiceError> {
        let comment = ApprovalComment {
            id: CommentId(Uuid::new_v4().to_string()),
            submission_id: submission_id.clone(),
            action_id: None,
            author_id: Some(author_id.clone()),
            body: body.into(),
            visibility,
            kind: CommentKind::General,
            created_at: now,
        };
        self.store.append_comment(&comment).await?;
        Ok(comment)
    }

    /// Create a delegation grant. The conflict is checked here for a precise
    /// domain error and again inside the store's insert transaction, which is
    /// what holds under concurrent creation attempts.
    pub async fn delegate(
        &self,
        delegator_id: &EmployeeId,
        delegate_id: &EmployeeId,
        starts_at: DateTime<Utc>,
        ends_at: Option<DateTime<Utc>>,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ApprovalDelegation, ServiceError> {
        let delegation = ApprovalDelegation {
            id: DelegationId(Uuid::new_v4().to_string()),
            delegator_id: delegator_id.clone(),
            delegate_id: delegate_id.clone(),
            starts_at,
            ends_at,
            is_active: true,
            reason,
            created_at: now,
            updated_at: now,
        };

        let history = self.delegations.history_for(delegator_id).await?;
        if let Some(existing) = find_conflict(history.iter(), &delegation) {
            return Err(WorkflowError::from(crate::delegation::DelegationConflict {
                delegator_id: delegator_id.clone(),
                existing_id: existing.id.clone(),
            })
            .into());
        }

        self.delegations.create(&delegation).await?;

        self.audit.emit(
            AuditEvent::new(
                "delegation.created",
                AuditCategory::Delegation,
                "approval_delegation",
                delegation.id.0.clone(),
                delegator_id.0.clone(),
                AuditOutcome::Success,
                format!("delegated approvals to `{}`", delegate_id.0),
            )
            .with_metadata("delegate", delegate_id.0.clone()),
        );

        Ok(delegation)
    }

    /// Soft-deactivate a delegation; its record stays queryable.
    pub async fn revoke_delegation(
        &self,
        id: &DelegationId,
        actor_id: &EmployeeId,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        self.delegations.deactivate(id, now).await?;
        self.audit.emit(AuditEvent::new(
            "delegation.deactivated",
            AuditCategory::Delegation,
            "approval_delegation",
            id.0.clone(),
            actor_id.0.clone(),
            AuditOutcome::Success,
            "delegation deactivated",
        ));
        Ok(())
    }

    pub async fn delegations_for(
        &self,
        delegator_id: &EmployeeId,
    ) -> Result<Vec<ApprovalDelegation>, ServiceError> {
        Ok(self.delegations.history_for(delegator_id).await?)
    }

    /// Everything the actor can decide right now: their own pending actions,
    /// those of anyone who delegated to them, and unresolved role/position
    /// placeholders they hold.
    pub async fn inbox(
        &self,
        actor_id: &EmployeeId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RequestApprovalAction>, ServiceError> {
        let registry = DelegationRegistry::new(self.delegations.in_effect_at(now).await?);
        let mut user_ids = vec![actor_id.clone()];
        user_ids.extend(registry.delegators_of(actor_id, now));

        let filter = ApproverFilter {
            user_ids,
            role_ids: self.env.directory.roles_of(actor_id),
            position_ids: self.env.directory.primary_positions_of(actor_id),
        };
        Ok(self.store.pending_actions_for(&filter).await?)
    }

    async fn load(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<(RequestSubmission, Vec<RequestApprovalAction>, RequestType), ServiceError> {
        let submission = self
            .store
            .find_submission(submission_id)
            .await?
            .ok_or_else(|| ServiceError::SubmissionNotFound(submission_id.0.clone()))?;
        let actions = self.store.actions_for(submission_id).await?;
        let request_type = self
            .env
            .request_type(&submission.request_type_id)
            .cloned()
            .ok_or_else(|| WorkflowError::UnknownRequestType(submission.request_type_id.clone()))?;
        Ok((submission, actions, request_type))
    }

    fn dispatch(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            self.notifications.notify(notification);
        }
    }
}
