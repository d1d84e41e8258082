use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::domain::employee::EmployeeId;
use crate::domain::submission::SubmissionId;

/// What happened, from the recipient's point of view. The approved variant
/// distinguishes the final approval so the request layer can vary wording.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationEvent {
    SubmissionCreated { submission_id: SubmissionId, reference_code: String },
    StepAwaitingApproval { submission_id: SubmissionId, step_index: usize, step_name: String },
    SubmissionApproved { submission_id: SubmissionId, final_approval: bool },
    SubmissionRejected { submission_id: SubmissionId, step_index: usize },
    SubmissionWithdrawn { submission_id: SubmissionId },
    SubmissionFulfilled { submission_id: SubmissionId, artifact_ref: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipients: Vec<EmployeeId>,
    pub event: NotificationEvent,
}

/// Opaque delivery seam. Dispatch is best-effort; failures are the caller's
/// to log, never to propagate into the workflow decision.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

#[derive(Clone, Default)]
pub struct InMemoryNotificationSink {
    notifications: Arc<Mutex<Vec<Notification>>>,
}

impl InMemoryNotificationSink {
    pub fn notifications(&self) -> Vec<Notification> {
        match self.notifications.lock() {
            Ok(notifications) => notifications.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl NotificationSink for InMemoryNotificationSink {
    fn notify(&self, notification: Notification) {
        match self.notifications.lock() {
            Ok(mut notifications) => notifications.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
    }
}
