use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::employee::{
    Designation, Employee, EmployeeId, OrgUnitId, Position, PositionId, Role, RoleAssignment,
    RoleId,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgUnitKind {
    Unit,
    Sector,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgUnit {
    pub id: OrgUnitId,
    pub name: String,
    pub kind: OrgUnitKind,
    pub parent_id: Option<OrgUnitId>,
}

/// Read-only snapshot of organizational data taken at resolution time.
///
/// Resolution is defined against this snapshot, not against live records, so
/// resolving the same approver specs twice with unchanged data yields
/// identical results.
#[derive(Clone, Debug, Default)]
pub struct OrgDirectory {
    employees: HashMap<String, Employee>,
    roles: HashMap<String, Role>,
    role_members: HashMap<String, Vec<EmployeeId>>,
    positions: HashMap<String, Position>,
    designations: Vec<Designation>,
    units: HashMap<String, OrgUnit>,
}

impl OrgDirectory {
    pub fn new(
        employees: Vec<Employee>,
        roles: Vec<Role>,
        role_assignments: Vec<RoleAssignment>,
        positions: Vec<Position>,
        designations: Vec<Designation>,
        units: Vec<OrgUnit>,
    ) -> Self {
        let employees: HashMap<String, Employee> =
            employees.into_iter().map(|employee| (employee.id.0.clone(), employee)).collect();
        let roles = roles.into_iter().map(|role| (role.id.0.clone(), role)).collect();
        let positions =
            positions.into_iter().map(|position| (position.id.0.clone(), position)).collect();
        let units = units.into_iter().map(|unit| (unit.id.0.clone(), unit)).collect();

        let mut role_members: HashMap<String, Vec<EmployeeId>> = HashMap::new();
        for assignment in role_assignments {
            role_members.entry(assignment.role_id.0.clone()).or_default().push(assignment.employee_id);
        }

        Self { employees, roles, role_members, positions, designations, units }
    }

    pub fn employee(&self, id: &EmployeeId) -> Option<&Employee> {
        self.employees.get(&id.0)
    }

    pub fn display_name(&self, id: &EmployeeId) -> Option<&str> {
        self.employee(id).map(|employee| employee.display_name.as_str())
    }

    pub fn role(&self, id: &RoleId) -> Option<&Role> {
        self.roles.get(&id.0)
    }

    pub fn position(&self, id: &PositionId) -> Option<&Position> {
        self.positions.get(&id.0)
    }

    pub fn unit(&self, id: &OrgUnitId) -> Option<&OrgUnit> {
        self.units.get(&id.0)
    }

    /// Active employees holding the role.
    pub fn role_holders(&self, id: &RoleId) -> Vec<&Employee> {
        let Some(members) = self.role_members.get(&id.0) else {
            return Vec::new();
        };
        members.iter().filter_map(|member| self.employee(member)).filter(|e| e.active).collect()
    }

    /// Active employees whose primary designation holds the position.
    pub fn primary_position_holders(&self, id: &PositionId) -> Vec<&Employee> {
        self.designations
            .iter()
            .filter(|designation| designation.is_primary && designation.position_id == *id)
            .filter_map(|designation| self.employee(&designation.employee_id))
            .filter(|employee| employee.active)
            .collect()
    }

    pub fn holds_role(&self, employee_id: &EmployeeId, role_id: &RoleId) -> bool {
        self.role_members
            .get(&role_id.0)
            .is_some_and(|members| members.iter().any(|member| member == employee_id))
    }

    pub fn holds_position(&self, employee_id: &EmployeeId, position_id: &PositionId) -> bool {
        self.designations.iter().any(|designation| {
            designation.is_primary
                && designation.employee_id == *employee_id
                && designation.position_id == *position_id
        })
    }

    pub fn roles_of(&self, employee_id: &EmployeeId) -> Vec<RoleId> {
        self.role_members
            .iter()
            .filter(|(_, members)| members.iter().any(|member| member == employee_id))
            .map(|(role_id, _)| RoleId(role_id.clone()))
            .collect()
    }

    pub fn primary_positions_of(&self, employee_id: &EmployeeId) -> Vec<PositionId> {
        self.designations
            .iter()
            .filter(|designation| designation.is_primary && designation.employee_id == *employee_id)
            .map(|designation| designation.position_id.clone())
            .collect()
    }

    pub fn unit_of(&self, employee_id: &EmployeeId) -> Option<&OrgUnit> {
        self.employee(employee_id).and_then(|employee| self.unit(&employee.unit_id))
    }

    /// The unit itself followed by its ancestors, ending at the sector.
    /// Cycles in parent links terminate the walk rather than loop.
    pub fn unit_chain(&self, start: &OrgUnitId) -> Vec<&OrgUnit> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = self.unit(start);

        while let Some(unit) = current {
            if !visited.insert(unit.id.0.clone()) {
                break;
            }
            chain.push(unit);
            if unit.kind == OrgUnitKind::Sector {
                break;
            }
            current = unit.parent_id.as_ref().and_then(|parent| self.unit(parent));
        }

        chain
    }

    pub fn sector_of(&self, unit_id: &OrgUnitId) -> Option<&OrgUnit> {
        self.unit_chain(unit_id).into_iter().find(|unit| unit.kind == OrgUnitKind::Sector)
    }

    pub fn positions_in_unit(&self, unit_id: &OrgUnitId) -> Vec<&Position> {
        self.positions.values().filter(|position| position.unit_id == *unit_id).collect()
    }

    /// Whether the employee sits inside the given unit or anywhere under the
    /// given sector.
    pub fn within_scope(
        &self,
        employee_id: &EmployeeId,
        unit_id: &OrgUnitId,
        sector_id: Option<&OrgUnitId>,
    ) -> bool {
        let Some(unit) = self.unit_of(employee_id) else {
            return false;
        };
        if unit.id == *unit_id {
            return true;
        }
        match sector_id {
            Some(sector_id) => self
                .sector_of(&unit.id)
                .is_some_and(|sector| sector.id == *sector_id),
            None => false,
        }
    }
}
