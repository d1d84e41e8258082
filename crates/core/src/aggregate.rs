//! Step-status aggregation: folds the statuses of a step's approver actions
//! into a single resolved status under the step's approval mode.

use crate::domain::request::ApprovalMode;
use crate::domain::submission::ActionStatus;

/// Resolve a step's status from its approvers' statuses.
///
/// Rejection thresholds are evaluated before approval thresholds in every
/// mode, so a step can never be reported approved while its rejection
/// condition also holds. A step with no approvers stays pending.
pub fn resolve_step_status(statuses: &[ActionStatus], mode: ApprovalMode) -> ActionStatus {
    if statuses.is_empty() {
        return ActionStatus::Pending;
    }

    let total = statuses.len();
    let approved = statuses.iter().filter(|status| **status == ActionStatus::Approved).count();
    let rejected = statuses.iter().filter(|status| **status == ActionStatus::Rejected).count();

    match mode {
        ApprovalMode::Any => {
            if rejected == total {
                ActionStatus::Rejected
            } else if approved >= 1 {
                ActionStatus::Approved
            } else {
                ActionStatus::Pending
            }
        }
        ApprovalMode::All => {
            if rejected >= 1 {
                ActionStatus::Rejected
            } else if approved == total {
                ActionStatus::Approved
            } else {
                ActionStatus::Pending
            }
        }
        ApprovalMode::Majority => {
            let threshold = total.div_ceil(2);
            if rejected >= threshold {
                ActionStatus::Rejected
            } else if approved >= threshold {
                ActionStatus::Approved
            } else {
                ActionStatus::Pending
            }
        }
    }
}
