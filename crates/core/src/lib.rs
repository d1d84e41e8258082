pub mod aggregate;
pub mod audit;
pub mod authz;
pub mod balance;
pub mod config;
pub mod delegation;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod notify;
pub mod resolver;
pub mod service;
pub mod store;

pub use aggregate::resolve_step_status;
pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use authz::{AllowAll, Authorizer, StaticAuthorizer};
pub use balance::{
    BalanceClearance, BalanceError, BalanceGuard, InMemoryLeaveLedger, LeaveCatalog, LeaveLedger,
    LeaveType, LeaveTypeCode, WorkingCalendar,
};
pub use delegation::{
    ApprovalDelegation, DelegationConflict, DelegationId, DelegationRegistry,
};
pub use domain::employee::{
    Designation, Employee, EmployeeId, OrgUnitId, Position, PositionId, Role, RoleAssignment,
    RoleId,
};
pub use domain::org::{OrgDirectory, OrgUnit, OrgUnitKind};
pub use domain::request::{
    ApprovalMode, ApprovalStep, ApproverSpec, FieldDef, FieldKind, FieldValue, LeaveBinding,
    RequestType, RequestTypeId,
};
pub use domain::submission::{
    generate_reference_code, ActionId, ActionStatus, ApprovalComment, ApprovalStateSnapshot,
    ApproverIdentity, ApproverOrigin, CommentId, CommentKind, CommentVisibility,
    RequestApprovalAction, RequestSubmission, StepProgress, StepState, SubmissionId,
    SubmissionStatus,
};
pub use engine::{
    find_actionable, ActorMatch, ApprovalFlowEngine, Decision, DecisionOutcome, InitializedFlow,
    StepDiagnostic,
};
pub use errors::{ServiceError, WorkflowError};
pub use notify::{InMemoryNotificationSink, Notification, NotificationEvent, NotificationSink};
pub use resolver::{
    ApproverResolver, ResolutionNote, ResolvedApprover, ScopeFilter, StepResolution,
};
pub use service::{WorkflowEnvironment, WorkflowService};
pub use store::{
    ApproverFilter, DelegationStore, InMemoryDelegationStore, InMemorySubmissionStore, StoreError,
    SubmissionStore,
};
