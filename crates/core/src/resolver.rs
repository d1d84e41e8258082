//! Turns abstract approver specs into concrete approver identities against an
//! organizational snapshot.
//!
//! Resolution never fails: specs that match nobody degrade to placeholder
//! identities or diagnostic notes, and a step that ends up with no usable
//! approvers is skipped by the engine rather than blocking the workflow.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::employee::{Employee, EmployeeId, OrgUnitId, Position, PositionId, RoleId};
use crate::domain::org::OrgDirectory;
use crate::domain::request::ApproverSpec;
use crate::domain::submission::{ApproverIdentity, ApproverOrigin};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedApprover {
    pub identity: ApproverIdentity,
    pub origin: ApproverOrigin,
    pub was_escalated: bool,
    pub display_name: Option<String>,
}

/// Structured diagnostics produced during resolution. Returned as values so
/// callers can persist or assert on them; nothing is written to a logger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionNote {
    UnknownUser { user_id: EmployeeId },
    EmptyRole { role_id: RoleId },
    EmptyPosition { position_id: PositionId },
    Escalated { from_unit: OrgUnitId, to_unit: OrgUnitId, min_authority_level: u8 },
    HierarchyExhausted { min_authority_level: u8 },
    ScopeFiltered { user_id: EmployeeId },
}

impl fmt::Display for ResolutionNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownUser { user_id } => {
                write!(f, "approver user `{}` is unknown or inactive", user_id.0)
            }
            Self::EmptyRole { role_id } => {
                write!(f, "role `{}` currently has no holders; kept unresolved", role_id.0)
            }
            Self::EmptyPosition { position_id } => {
                write!(f, "position `{}` currently has no holder; kept unresolved", position_id.0)
            }
            Self::Escalated { from_unit, to_unit, min_authority_level } => write!(
                f,
                "no approver at authority level {min_authority_level} in `{}`; escalated to `{}`",
                from_unit.0, to_unit.0
            ),
            Self::HierarchyExhausted { min_authority_level } => write!(
                f,
                "no approver at authority level {min_authority_level} anywhere up the hierarchy"
            ),
            Self::ScopeFiltered { user_id } => {
                write!(f, "approver `{}` dropped by organizational scope filter", user_id.0)
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StepResolution {
    pub approvers: Vec<ResolvedApprover>,
    pub notes: Vec<ResolutionNote>,
}

/// Restricts resolved user approvers to the requester's own unit or sector.
/// Escalated hierarchical approvers bypass the filter: they are deliberately
/// drawn from a broader scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopeFilter {
    pub unit_id: OrgUnitId,
    pub sector_id: Option<OrgUnitId>,
}

impl ScopeFilter {
    pub fn for_requester(directory: &OrgDirectory, requester: &EmployeeId) -> Option<Self> {
        let unit = directory.unit_of(requester)?;
        let sector = directory.sector_of(&unit.id).map(|sector| sector.id.clone());
        Some(Self { unit_id: unit.id.clone(), sector_id: sector })
    }
}

pub struct ApproverResolver<'a> {
    directory: &'a OrgDirectory,
}

impl<'a> ApproverResolver<'a> {
    pub fn new(directory: &'a OrgDirectory) -> Self {
        Self { directory }
    }

    /// Resolve a step's approver specs in spec order. Within a role or
    /// position expansion, approvers are ordered alphabetically by display
    /// name, so resolution is deterministic for unchanged organizational
    /// data. Duplicate identities across specs are collapsed to the first
    /// occurrence.
    pub fn resolve(
        &self,
        specs: &[ApproverSpec],
        requester: &EmployeeId,
        scope: Option<&ScopeFilter>,
    ) -> StepResolution {
        let mut resolution = StepResolution::default();

        for spec in specs {
            match spec {
                ApproverSpec::User { user_id } => self.resolve_user(user_id, &mut resolution),
                ApproverSpec::Role { role_id } => self.resolve_role(role_id, &mut resolution),
                ApproverSpec::Position { position_id } => {
                    self.resolve_position(position_id, &mut resolution);
                }
                ApproverSpec::Hierarchical { min_authority_level } => {
                    self.resolve_hierarchical(*min_authority_level, requester, &mut resolution);
                }
            }
        }

        if let Some(scope) = scope {
            self.apply_scope_filter(scope, &mut resolution);
        }

        dedup_by_identity(&mut resolution.approvers);
        resolution
    }

    fn resolve_user(&self, user_id: &EmployeeId, resolution: &mut StepResolution) {
        match self.directory.employee(user_id) {
            Some(employee) if employee.active => resolution.approvers.push(ResolvedApprover {
                identity: ApproverIdentity::User { user_id: user_id.clone() },
                origin: ApproverOrigin::Direct,
                was_escalated: false,
                display_name: Some(employee.display_name.clone()),
            }),
            _ => resolution.notes.push(ResolutionNote::UnknownUser { user_id: user_id.clone() }),
        }
    }

    fn resolve_role(&self, role_id: &RoleId, resolution: &mut StepResolution) {
        let mut holders = self.directory.role_holders(role_id);
        if holders.is_empty() {
            // Kept unresolved so the step still displays "Role: X — Pending"
            // and any later holder of the role can act on it.
            resolution.approvers.push(ResolvedApprover {
                identity: ApproverIdentity::Role { role_id: role_id.clone() },
                origin: ApproverOrigin::RoleExpansion { role_id: role_id.clone() },
                was_escalated: false,
                display_name: self.directory.role(role_id).map(|role| role.name.clone()),
            });
            resolution.notes.push(ResolutionNote::EmptyRole { role_id: role_id.clone() });
            return;
        }

        sort_by_display_name(&mut holders);
        for holder in holders {
            resolution.approvers.push(ResolvedApprover {
                identity: ApproverIdentity::User { user_id: holder.id.clone() },
                origin: ApproverOrigin::RoleExpansion { role_id: role_id.clone() },
                was_escalated: false,
                display_name: Some(holder.display_name.clone()),
            });
        }
    }

    fn resolve_position(&self, position_id: &PositionId, resolution: &mut StepResolution) {
        let mut holders = self.directory.primary_position_holders(position_id);
        if holders.is_empty() {
            resolution.approvers.push(ResolvedApprover {
                identity: ApproverIdentity::Position { position_id: position_id.clone() },
                origin: ApproverOrigin::PositionExpansion { position_id: position_id.clone() },
                was_escalated: false,
                display_name: self
                    .directory
                    .position(position_id)
                    .map(|position| position.title.clone()),
            });
            resolution.notes.push(ResolutionNote::EmptyPosition { position_id: position_id.clone() });
            return;
        }

        sort_by_display_name(&mut holders);
        for holder in holders {
            resolution.approvers.push(ResolvedApprover {
                identity: ApproverIdentity::User { user_id: holder.id.clone() },
                origin: ApproverOrigin::PositionExpansion { position_id: position_id.clone() },
                was_escalated: false,
                display_name: Some(holder.display_name.clone()),
            });
        }
    }

    /// Walk the requester's unit chain upward. At each hop, select the lowest
    /// authority level that still satisfies the minimum and has at least one
    /// primary holder; the first hop that yields holders wins. Hops past the
    /// requester's own unit mark the result escalated.
    fn resolve_hierarchical(
        &self,
        min_authority_level: u8,
        requester: &EmployeeId,
        resolution: &mut StepResolution,
    ) {
        let Some(start) = self.directory.unit_of(requester) else {
            resolution.notes.push(ResolutionNote::HierarchyExhausted { min_authority_level });
            return;
        };

        for (hop, unit) in self.directory.unit_chain(&start.id).into_iter().enumerate() {
            let mut eligible: Vec<(&Position, Vec<&Employee>)> = self
                .directory
                .positions_in_unit(&unit.id)
                .into_iter()
                .filter(|position| position.authority_level >= min_authority_level)
                .map(|position| {
                    (position, self.directory.primary_position_holders(&position.id))
                })
                .filter(|(_, holders)| !holders.is_empty())
                .collect();

            let Some(lowest_level) = eligible
                .iter()
                .map(|(position, _)| position.authority_level)
                .min()
            else {
                continue;
            };
            eligible.retain(|(position, _)| position.authority_level == lowest_level);

            let was_escalated = hop > 0;
            if was_escalated {
                resolution.notes.push(ResolutionNote::Escalated {
                    from_unit: start.id.clone(),
                    to_unit: unit.id.clone(),
                    min_authority_level,
                });
            }

            let mut holders: Vec<&Employee> =
                eligible.into_iter().flat_map(|(_, holders)| holders).collect();
            sort_by_display_name(&mut holders);
            for holder in holders {
                resolution.approvers.push(ResolvedApprover {
                    identity: ApproverIdentity::User { user_id: holder.id.clone() },
                    origin: ApproverOrigin::Hierarchy { authority_level: lowest_level },
                    was_escalated,
                    display_name: Some(holder.display_name.clone()),
                });
            }
            return;
        }

        resolution.notes.push(ResolutionNote::HierarchyExhausted { min_authority_level });
    }

    /// Direct and position-expanded user approvers must sit within the
    /// requester's unit or sector. Role expansions are organization-wide by
    /// design, and escalated approvers bypass the filter.
    fn apply_scope_filter(&self, scope: &ScopeFilter, resolution: &mut StepResolution) {
        let directory = self.directory;
        let notes = &mut resolution.notes;
        resolution.approvers.retain(|approver| {
            if approver.was_escalated {
                return true;
            }
            let filterable = matches!(
                approver.origin,
                ApproverOrigin::Direct | ApproverOrigin::PositionExpansion { .. }
            );
            if !filterable {
                return true;
            }
            let ApproverIdentity::User { user_id } = &approver.identity else {
                return true;
            };
            if directory.within_scope(user_id, &scope.unit_id, scope.sector_id.as_ref()) {
                return true;
            }
            notes.push(ResolutionNote::ScopeFiltered { user_id: user_id.clone() });
            false
        });
    }
}

fn sort_by_display_name(holders: &mut [&Employee]) {
    holders.sort_by(|left, right| {
        left.display_name.cmp(&right.display_name).then_with(|| left.id.cmp(&right.id))
    });
}

fn dedup_by_identity(approvers: &mut Vec<ResolvedApprover>) {
    let mut seen = HashSet::new();
    approvers.retain(|approver| seen.insert(approver.identity.clone()));
}
