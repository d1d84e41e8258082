use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use greenlight_core::delegation::{ApprovalDelegation, DelegationId};
use greenlight_core::domain::employee::EmployeeId;
use greenlight_core::store::{DelegationStore, StoreError};

use super::{backend, parse_datetime, parse_optional_datetime};
use crate::DbPool;

// Lexicographic upper bound for open-ended grant windows; RFC 3339 strings
// for the same offset compare correctly as text.
const OPEN_ENDED: &str = "9999-12-31T23:59:59+00:00";

pub struct SqlDelegationStore {
    pool: DbPool,
}

impl SqlDelegationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_delegation(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalDelegation, StoreError> {
    let is_active: i64 = row.try_get("is_active").map_err(backend)?;

    Ok(ApprovalDelegation {
        id: DelegationId(row.try_get("id").map_err(backend)?),
        delegator_id: EmployeeId(row.try_get("delegator_id").map_err(backend)?),
        delegate_id: EmployeeId(row.try_get("delegate_id").map_err(backend)?),
        starts_at: parse_datetime(&row.try_get::<String, _>("starts_at").map_err(backend)?),
        ends_at: parse_optional_datetime(row.try_get("ends_at").map_err(backend)?),
        is_active: is_active != 0,
        reason: row.try_get("reason").map_err(backend)?,
        created_at: parse_datetime(&row.try_get::<String, _>("created_at").map_err(backend)?),
        updated_at: parse_datetime(&row.try_get::<String, _>("updated_at").map_err(backend)?),
    })
}

const SELECT_DELEGATION: &str = "SELECT id, delegator_id, delegate_id, starts_at, ends_at,
        is_active, reason, created_at, updated_at
 FROM approval_delegation";

#[async_trait]
impl DelegationStore for SqlDelegationStore {
    async fn create(&self, delegation: &ApprovalDelegation) -> Result<(), StoreError> {
        let starts_at = delegation.starts_at.to_rfc3339();
        let ends_at = delegation.ends_at.map(|dt| dt.to_rfc3339());

        let mut tx = self.pool.begin().await.map_err(backend)?;

        // Overlap check and insert share the transaction, so two concurrent
        // grants for the same delegator cannot both pass the check.
        let conflicting = sqlx::query(
            "SELECT id FROM approval_delegation
             WHERE delegator_id = ?
               AND is_active = 1
               AND starts_at <= COALESCE(?, ?)
               AND COALESCE(ends_at, ?) >= ?",
        )
        .bind(&delegation.delegator_id.0)
        .bind(&ends_at)
        .bind(OPEN_ENDED)
        .bind(OPEN_ENDED)
        .bind(&starts_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;

        if let Some(row) = conflicting {
            let existing: String = row.try_get("id").map_err(backend)?;
            return Err(StoreError::Conflict(format!(
                "delegator `{}` already has active delegation `{existing}`",
                delegation.delegator_id.0
            )));
        }

        sqlx::query(
            "INSERT INTO approval_delegation (id, delegator_id, delegate_id, starts_at, ends_at,
                                              is_active, reason, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&delegation.id.0)
        .bind(&delegation.delegator_id.0)
        .bind(&delegation.delegate_id.0)
        .bind(&starts_at)
        .bind(&ends_at)
        .bind(i64::from(delegation.is_active))
        .bind(&delegation.reason)
        .bind(delegation.created_at.to_rfc3339())
        .bind(delegation.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)
    }

    async fn deactivate(&self, id: &DelegationId, now: DateTime<Utc>) -> Result<(), StoreError> {
        let updated = sqlx::query(
            "UPDATE approval_delegation SET is_active = 0, updated_at = ? WHERE id = ?",
        )
        .bind(now.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("delegation `{}`", id.0)));
        }
        Ok(())
    }

    async fn in_effect_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ApprovalDelegation>, StoreError> {
        let now = now.to_rfc3339();
        let rows = sqlx::query(&format!(
            "{SELECT_DELEGATION}
             WHERE is_active = 1 AND starts_at <= ? AND (ends_at IS NULL OR ends_at >= ?)"
        ))
        .bind(&now)
        .bind(&now)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(row_to_delegation).collect()
    }

    async fn history_for(
        &self,
        delegator: &EmployeeId,
    ) -> Result<Vec<ApprovalDelegation>, StoreError> {
        let rows = sqlx::query(&format!(
            "{SELECT_DELEGATION} WHERE delegator_id = ? ORDER BY created_at DESC, id"
        ))
        .bind(&delegator.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(row_to_delegation).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use greenlight_core::delegation::{ApprovalDelegation, DelegationId};
    use greenlight_core::domain::employee::EmployeeId;
    use greenlight_core::store::{DelegationStore, StoreError};

    use super::SqlDelegationStore;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlDelegationStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlDelegationStore::new(pool)
    }

    fn grant(id: &str, delegator: &str, delegate: &str) -> ApprovalDelegation {
        let now = Utc::now();
        ApprovalDelegation {
            id: DelegationId(id.to_string()),
            delegator_id: EmployeeId(delegator.to_string()),
            delegate_id: EmployeeId(delegate.to_string()),
            starts_at: now - Duration::hours(1),
            ends_at: None,
            is_active: true,
            reason: Some("on official travel".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn create_then_read_in_effect() {
        let store = setup().await;
        store.create(&grant("d-1", "e-boss", "e-zoe")).await.expect("create");

        let active = store.in_effect_at(Utc::now()).await.expect("in effect");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].delegate_id.0, "e-zoe");
    }

    #[tokio::test]
    async fn overlapping_active_grant_conflicts_inside_the_transaction() {
        let store = setup().await;
        store.create(&grant("d-1", "e-boss", "e-zoe")).await.expect("first grant");

        let error =
            store.create(&grant("d-2", "e-boss", "e-abe")).await.expect_err("overlap conflicts");
        assert!(matches!(error, StoreError::Conflict(_)));

        // A different delegator is unaffected.
        store.create(&grant("d-3", "e-other", "e-abe")).await.expect("other delegator");
    }

    #[tokio::test]
    async fn non_overlapping_windows_are_allowed() {
        let store = setup().await;
        let now = Utc::now();

        let mut past = grant("d-1", "e-boss", "e-zoe");
        past.starts_at = now - Duration::days(10);
        past.ends_at = Some(now - Duration::days(5));
        store.create(&past).await.expect("past grant");

        let mut future = grant("d-2", "e-boss", "e-abe");
        future.starts_at = now + Duration::days(1);
        future.ends_at = Some(now + Duration::days(3));
        store.create(&future).await.expect("future grant");
    }

    #[tokio::test]
    async fn deactivation_is_soft_and_history_survives() {
        let store = setup().await;
        let now = Utc::now();
        store.create(&grant("d-1", "e-boss", "e-zoe")).await.expect("create");

        store.deactivate(&DelegationId("d-1".to_string()), now).await.expect("deactivate");
        assert!(store.in_effect_at(now).await.expect("in effect").is_empty());

        let history =
            store.history_for(&EmployeeId("e-boss".to_string())).await.expect("history");
        assert_eq!(history.len(), 1);
        assert!(!history[0].is_active);

        store.create(&grant("d-2", "e-boss", "e-abe")).await.expect("grant after deactivation");

        let error = store
            .deactivate(&DelegationId("d-missing".to_string()), now)
            .await
            .expect_err("unknown id");
        assert!(matches!(error, StoreError::NotFound(_)));
    }
}
