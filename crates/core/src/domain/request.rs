use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::balance::LeaveTypeCode;
use crate::domain::employee::{EmployeeId, PositionId, RoleId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestTypeId(pub String);

/// Reusable workflow template: the dynamic form plus the ordered approval
/// steps a submission of this type walks through.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestType {
    pub id: RequestTypeId,
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub steps: Vec<ApprovalStep>,
    pub requires_fulfillment: bool,
    pub leave: Option<LeaveBinding>,
}

/// Marks a request type as a leave request and names the answer fields that
/// carry the requested date range.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveBinding {
    pub leave_type: LeaveTypeCode,
    pub start_field: String,
    pub end_field: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub key: String,
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Date,
    Choice { options: Vec<String> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Number(Decimal),
    Date(NaiveDate),
    Choice(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    Any,
    All,
    Majority,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub name: String,
    pub mode: ApprovalMode,
    pub sla_hours: Option<u32>,
    pub approvers: Vec<ApproverSpec>,
}

/// Abstract description of who may approve a step. Resolution against
/// organizational data happens at submission time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApproverSpec {
    User { user_id: EmployeeId },
    Role { role_id: RoleId },
    Position { position_id: PositionId },
    Hierarchical { min_authority_level: u8 },
}

impl RequestType {
    /// Validate submitted answers against the field definitions, collecting
    /// every problem rather than stopping at the first.
    pub fn validate_answers(&self, answers: &BTreeMap<String, FieldValue>) -> Vec<String> {
        let mut problems = Vec::new();

        for field in &self.fields {
            match answers.get(&field.key) {
                None if field.required => {
                    problems.push(format!("missing required field `{}`", field.key));
                }
                None => {}
                Some(value) => {
                    if let Some(problem) = field.check_value(value) {
                        problems.push(problem);
                    }
                }
            }
        }

        for key in answers.keys() {
            if !self.fields.iter().any(|field| field.key == *key) {
                problems.push(format!("unknown field `{key}`"));
            }
        }

        problems
    }

    /// Date answer lookup used by the leave binding.
    pub fn date_answer(answers: &BTreeMap<String, FieldValue>, key: &str) -> Option<NaiveDate> {
        match answers.get(key) {
            Some(FieldValue::Date(date)) => Some(*date),
            _ => None,
        }
    }
}

impl FieldDef {
    fn check_value(&self, value: &FieldValue) -> Option<String> {
        match (&self.kind, value) {
            (FieldKind::Text, FieldValue::Text(_))
            | (FieldKind::Number, FieldValue::Number(_))
            | (FieldKind::Date, FieldValue::Date(_)) => None,
            (FieldKind::Choice { options }, FieldValue::Choice(choice)) => {
                if options.iter().any(|option| option == choice) {
                    None
                } else {
                    Some(format!("field `{}` has unknown option `{choice}`", self.key))
                }
            }
            _ => Some(format!("field `{}` has a value of the wrong kind", self.key)),
        }
    }
}
