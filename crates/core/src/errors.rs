use thiserror::Error;

use crate::balance::BalanceError;
use crate::delegation::DelegationConflict;
use crate::domain::employee::EmployeeId;
use crate::domain::request::RequestTypeId;
use crate::domain::submission::{SubmissionId, SubmissionStatus};
use crate::store::StoreError;

/// Domain-layer failures. Every variant leaves state unmutated: validation
/// failures block creation, authorization and state-conflict failures block
/// the attempted action.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("request validation failed: {problems:?}")]
    Validation { problems: Vec<String> },
    #[error("unknown request type `{0:?}`")]
    UnknownRequestType(RequestTypeId),
    #[error("unknown employee `{0:?}`")]
    UnknownEmployee(EmployeeId),
    #[error("invalid submission transition from {from:?} to {to:?}")]
    InvalidTransition { from: SubmissionStatus, to: SubmissionStatus },
    #[error("submission {submission:?} is {status:?} and accepts no decisions")]
    NotActionable { submission: SubmissionId, status: SubmissionStatus },
    #[error("no pending action on the current step of {submission:?} matches actor {actor:?}")]
    NoPendingAction { submission: SubmissionId, actor: EmployeeId },
    #[error("actor {actor:?} may not perform this operation on {submission:?}")]
    Forbidden { submission: SubmissionId, actor: EmployeeId },
    #[error(transparent)]
    DelegationConflict(#[from] DelegationConflict),
}

/// Application-layer wrapper surfaced by the service facade.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Balance(#[from] BalanceError),
    #[error("submission `{0}` not found")]
    SubmissionNotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use crate::domain::employee::EmployeeId;
    use crate::domain::submission::{SubmissionId, SubmissionStatus};

    use super::{ServiceError, WorkflowError};

    #[test]
    fn workflow_errors_carry_actionable_messages() {
        let error = WorkflowError::NotActionable {
            submission: SubmissionId("sub-1".to_string()),
            status: SubmissionStatus::Rejected,
        };
        assert!(error.to_string().contains("accepts no decisions"));

        let error = WorkflowError::NoPendingAction {
            submission: SubmissionId("sub-1".to_string()),
            actor: EmployeeId("e-x".to_string()),
        };
        assert!(error.to_string().contains("no pending action"));
    }

    #[test]
    fn workflow_errors_convert_into_service_errors() {
        let service: ServiceError = WorkflowError::Validation {
            problems: vec!["missing required field `start_date`".to_string()],
        }
        .into();

        assert!(matches!(service, ServiceError::Workflow(WorkflowError::Validation { .. })));
    }
}
