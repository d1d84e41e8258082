use std::collections::HashSet;

use crate::domain::employee::EmployeeId;

/// Opaque permission capability supplied by the host application. The
/// workflow consults it only for operations that are not approver-eligibility
/// questions, such as fulfillment.
pub trait Authorizer: Send + Sync {
    fn can(&self, user: &EmployeeId, permission: &str) -> bool;
}

/// Grants everything; the default for tests and trusted callers.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn can(&self, _user: &EmployeeId, _permission: &str) -> bool {
        true
    }
}

/// Static grant table keyed by (user, permission).
#[derive(Clone, Debug, Default)]
pub struct StaticAuthorizer {
    grants: HashSet<(String, String)>,
}

impl StaticAuthorizer {
    pub fn with_grants(grants: Vec<(EmployeeId, &str)>) -> Self {
        Self {
            grants: grants
                .into_iter()
                .map(|(user, permission)| (user.0, permission.to_string()))
                .collect(),
        }
    }
}

impl Authorizer for StaticAuthorizer {
    fn can(&self, user: &EmployeeId, permission: &str) -> bool {
        self.grants.contains(&(user.0.clone(), permission.to_string()))
    }
}
