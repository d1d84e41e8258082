use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::Row;

use greenlight_core::balance::{BalanceError, LeaveLedger, LeaveTypeCode};
use greenlight_core::domain::employee::EmployeeId;

use crate::DbPool;

/// Leave ledger backed by the `leave_balance` table. Balances are stored as
/// decimal strings; a missing row reads as zero.
pub struct SqlLeaveLedger {
    pool: DbPool,
}

impl SqlLeaveLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Upsert a balance row. The accrual process that maintains these rows is
    /// outside this crate; this is the seam it writes through.
    pub async fn set_balance(
        &self,
        employee_id: &EmployeeId,
        leave_type: &LeaveTypeCode,
        year: i32,
        balance: Decimal,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO leave_balance (employee_id, leave_type, year, balance)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(employee_id, leave_type, year) DO UPDATE SET
                 balance = excluded.balance",
        )
        .bind(&employee_id.0)
        .bind(&leave_type.0)
        .bind(year)
        .bind(balance.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl LeaveLedger for SqlLeaveLedger {
    async fn balance(
        &self,
        employee_id: &EmployeeId,
        leave_type: &LeaveTypeCode,
        year: i32,
    ) -> Result<Decimal, BalanceError> {
        let row = sqlx::query(
            "SELECT balance FROM leave_balance
             WHERE employee_id = ? AND leave_type = ? AND year = ?",
        )
        .bind(&employee_id.0)
        .bind(&leave_type.0)
        .bind(year)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| BalanceError::Ledger(error.to_string()))?;

        match row {
            Some(row) => {
                let raw: String =
                    row.try_get("balance").map_err(|error| BalanceError::Ledger(error.to_string()))?;
                Decimal::from_str(&raw).map_err(|error| {
                    BalanceError::Ledger(format!("unparseable balance `{raw}`: {error}"))
                })
            }
            None => Ok(Decimal::ZERO),
        }
    }
}
