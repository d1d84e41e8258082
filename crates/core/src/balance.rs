//! Leave-balance guarding for leave-type submissions.
//!
//! Credit-bearing leave types draw down another type's balance (a forced
//! leave charged against vacation leave, for instance), so availability is
//! always checked against the source type. Special non-credit types skip the
//! balance check but still honor a per-request day cap when one is
//! configured. Day counts exclude weekends and configured holidays.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::employee::EmployeeId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaveTypeCode(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveType {
    pub code: LeaveTypeCode,
    pub name: String,
    /// When set, balance is charged against this type instead of `code`.
    pub credit_source: Option<LeaveTypeCode>,
    /// Special leave types carry no balance of their own.
    pub requires_balance: bool,
    pub max_days_per_request: Option<Decimal>,
}

#[derive(Clone, Debug, Default)]
pub struct LeaveCatalog {
    types: HashMap<String, LeaveType>,
}

impl LeaveCatalog {
    pub fn new(types: Vec<LeaveType>) -> Self {
        Self { types: types.into_iter().map(|lt| (lt.code.0.clone(), lt)).collect() }
    }

    pub fn get(&self, code: &LeaveTypeCode) -> Option<&LeaveType> {
        self.types.get(&code.0)
    }
}

/// Weekday calendar with an optional holiday list.
#[derive(Clone, Debug, Default)]
pub struct WorkingCalendar {
    holidays: BTreeSet<NaiveDate>,
}

impl WorkingCalendar {
    pub fn new(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self { holidays: holidays.into_iter().collect() }
    }

    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    /// Working days between start and end, inclusive on both ends.
    pub fn working_days_between(&self, start: NaiveDate, end: NaiveDate) -> u32 {
        start
            .iter_days()
            .take_while(|date| *date <= end)
            .filter(|date| self.is_working_day(*date))
            .count() as u32
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BalanceError {
    #[error("unknown leave type `{0}`")]
    InvalidLeaveType(String),
    #[error("leave end date {end} is before start date {start}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
    #[error("requested {requested} days exceeds the {max} day cap for `{leave_type}`")]
    ExceedsMaxDays { leave_type: String, requested: Decimal, max: Decimal },
    #[error("insufficient `{charged_type}` balance: requested {requested}, available {available}")]
    InsufficientBalance { charged_type: String, requested: Decimal, available: Decimal },
    #[error("leave ledger unavailable: {0}")]
    Ledger(String),
}

/// External balance ledger; accrual accounting lives behind this seam.
#[async_trait]
pub trait LeaveLedger: Send + Sync {
    async fn balance(
        &self,
        employee_id: &EmployeeId,
        leave_type: &LeaveTypeCode,
        year: i32,
    ) -> Result<Decimal, BalanceError>;
}

/// Fixed balances keyed by (employee, leave type, year). Unknown keys read as
/// zero, matching a ledger that has accrued nothing.
#[derive(Debug, Default)]
pub struct InMemoryLeaveLedger {
    balances: std::sync::Mutex<HashMap<(String, String, i32), Decimal>>,
}

impl InMemoryLeaveLedger {
    pub fn with_balances(entries: Vec<(EmployeeId, LeaveTypeCode, i32, Decimal)>) -> Self {
        let balances = entries
            .into_iter()
            .map(|(employee, leave_type, year, balance)| {
                ((employee.0, leave_type.0, year), balance)
            })
            .collect();
        Self { balances: std::sync::Mutex::new(balances) }
    }
}

#[async_trait]
impl LeaveLedger for InMemoryLeaveLedger {
    async fn balance(
        &self,
        employee_id: &EmployeeId,
        leave_type: &LeaveTypeCode,
        year: i32,
    ) -> Result<Decimal, BalanceError> {
        let balances = match self.balances.lock() {
            Ok(balances) => balances,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(balances
            .get(&(employee_id.0.clone(), leave_type.0.clone(), year))
            .copied()
            .unwrap_or(Decimal::ZERO))
    }
}

/// Outcome of a successful sufficiency check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceClearance {
    pub leave_type: LeaveTypeCode,
    /// The type whose balance was (or would have been) charged.
    pub charged_type: LeaveTypeCode,
    pub working_days: Decimal,
    /// None when the type skips balance checking.
    pub available: Option<Decimal>,
}

pub struct BalanceGuard<L> {
    catalog: LeaveCatalog,
    calendar: WorkingCalendar,
    ledger: L,
}

impl<L> BalanceGuard<L>
where
    L: LeaveLedger,
{
    pub fn new(catalog: LeaveCatalog, calendar: WorkingCalendar, ledger: L) -> Self {
        Self { catalog, calendar, ledger }
    }

    pub async fn assert_sufficient(
        &self,
        employee_id: &EmployeeId,
        leave_type: &LeaveTypeCode,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BalanceClearance, BalanceError> {
        if end < start {
            return Err(BalanceError::InvalidDateRange { start, end });
        }

        let definition = self
            .catalog
            .get(leave_type)
            .ok_or_else(|| BalanceError::InvalidLeaveType(leave_type.0.clone()))?;

        let requested = Decimal::from(self.calendar.working_days_between(start, end));

        if let Some(max) = definition.max_days_per_request {
            if requested > max {
                return Err(BalanceError::ExceedsMaxDays {
                    leave_type: leave_type.0.clone(),
                    requested,
                    max,
                });
            }
        }

        let charged_type = definition.credit_source.clone().unwrap_or_else(|| leave_type.clone());
        if definition.credit_source.is_some() && self.catalog.get(&charged_type).is_none() {
            return Err(BalanceError::InvalidLeaveType(charged_type.0.clone()));
        }

        if !definition.requires_balance {
            return Ok(BalanceClearance {
                leave_type: leave_type.clone(),
                charged_type,
                working_days: requested,
                available: None,
            });
        }

        let available = self.ledger.balance(employee_id, &charged_type, start.year()).await?;
        if available < requested {
            return Err(BalanceError::InsufficientBalance {
                charged_type: charged_type.0.clone(),
                requested,
                available,
            });
        }

        Ok(BalanceClearance {
            leave_type: leave_type.clone(),
            charged_type,
            working_days: requested,
            available: Some(available),
        })
    }
}
