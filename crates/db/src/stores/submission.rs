use async_trait::async_trait;
use sqlx::Row;

use greenlight_core::domain::employee::{EmployeeId, PositionId, RoleId};
use greenlight_core::domain::request::RequestTypeId;
use greenlight_core::domain::submission::{
    ActionId, ActionStatus, ApprovalComment, ApproverIdentity, CommentId, CommentKind,
    CommentVisibility, RequestApprovalAction, RequestSubmission, SubmissionId, SubmissionStatus,
};
use greenlight_core::store::{ApproverFilter, StoreError, SubmissionStore};

use super::{backend, decode, insert_error, parse_datetime, parse_optional_datetime};
use crate::DbPool;

pub struct SqlSubmissionStore {
    pool: DbPool,
}

impl SqlSubmissionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn submission_status_as_str(status: SubmissionStatus) -> &'static str {
    match status {
        SubmissionStatus::Pending => "pending",
        SubmissionStatus::Approved => "approved",
        SubmissionStatus::Fulfillment => "fulfillment",
        SubmissionStatus::Completed => "completed",
        SubmissionStatus::Rejected => "rejected",
        SubmissionStatus::Withdrawn => "withdrawn",
    }
}

fn parse_submission_status(raw: &str) -> SubmissionStatus {
    match raw {
        "approved" => SubmissionStatus::Approved,
        "fulfillment" => SubmissionStatus::Fulfillment,
        "completed" => SubmissionStatus::Completed,
        "rejected" => SubmissionStatus::Rejected,
        "withdrawn" => SubmissionStatus::Withdrawn,
        _ => SubmissionStatus::Pending,
    }
}

fn action_status_as_str(status: ActionStatus) -> &'static str {
    match status {
        ActionStatus::Pending => "pending",
        ActionStatus::Approved => "approved",
        ActionStatus::Rejected => "rejected",
    }
}

fn parse_action_status(raw: &str) -> ActionStatus {
    match raw {
        "approved" => ActionStatus::Approved,
        "rejected" => ActionStatus::Rejected,
        _ => ActionStatus::Pending,
    }
}

fn visibility_as_str(visibility: CommentVisibility) -> &'static str {
    match visibility {
        CommentVisibility::Internal => "internal",
        CommentVisibility::Public => "public",
    }
}

fn parse_visibility(raw: &str) -> CommentVisibility {
    match raw {
        "public" => CommentVisibility::Public,
        _ => CommentVisibility::Internal,
    }
}

fn comment_kind_as_str(kind: CommentKind) -> &'static str {
    match kind {
        CommentKind::General => "general",
        CommentKind::Approval => "approval",
        CommentKind::Rejection => "rejection",
        CommentKind::System => "system",
    }
}

fn parse_comment_kind(raw: &str) -> CommentKind {
    match raw {
        "approval" => CommentKind::Approval,
        "rejection" => CommentKind::Rejection,
        "system" => CommentKind::System,
        _ => CommentKind::General,
    }
}

/// Split the identity enum across the three nullable approver columns.
fn identity_columns(
    identity: &ApproverIdentity,
) -> (Option<String>, Option<String>, Option<String>) {
    match identity {
        ApproverIdentity::User { user_id } => (Some(user_id.0.clone()), None, None),
        ApproverIdentity::Role { role_id } => (None, Some(role_id.0.clone()), None),
        ApproverIdentity::Position { position_id } => (None, None, Some(position_id.0.clone())),
    }
}

fn identity_from_columns(
    user_id: Option<String>,
    role_id: Option<String>,
    position_id: Option<String>,
) -> Result<ApproverIdentity, StoreError> {
    match (user_id, role_id, position_id) {
        (Some(user_id), None, None) => Ok(ApproverIdentity::User { user_id: EmployeeId(user_id) }),
        (None, Some(role_id), None) => Ok(ApproverIdentity::Role { role_id: RoleId(role_id) }),
        (None, None, Some(position_id)) => {
            Ok(ApproverIdentity::Position { position_id: PositionId(position_id) })
        }
        _ => Err(decode("approval_action row must carry exactly one approver identity column")),
    }
}

fn row_to_submission(row: &sqlx::sqlite::SqliteRow) -> Result<RequestSubmission, StoreError> {
    let answers_raw: String = row.try_get("answers").map_err(backend)?;
    let approval_state_raw: String = row.try_get("approval_state").map_err(backend)?;
    let current_step_index: Option<i64> = row.try_get("current_step_index").map_err(backend)?;
    let version: i64 = row.try_get("version").map_err(backend)?;

    Ok(RequestSubmission {
        id: SubmissionId(row.try_get("id").map_err(backend)?),
        reference_code: row.try_get("reference_code").map_err(backend)?,
        request_type_id: RequestTypeId(row.try_get("request_type_id").map_err(backend)?),
        requester_id: EmployeeId(row.try_get("requester_id").map_err(backend)?),
        status: parse_submission_status(&row.try_get::<String, _>("status").map_err(backend)?),
        current_step_index: current_step_index.map(|index| index as usize),
        answers: serde_json::from_str(&answers_raw)
            .map_err(|error| decode(format!("answers column: {error}")))?,
        approval_state: serde_json::from_str(&approval_state_raw)
            .map_err(|error| decode(format!("approval_state column: {error}")))?,
        version: version as u32,
        submitted_at: parse_datetime(&row.try_get::<String, _>("submitted_at").map_err(backend)?),
        fulfilled_at: parse_optional_datetime(row.try_get("fulfilled_at").map_err(backend)?),
        withdrawn_at: parse_optional_datetime(row.try_get("withdrawn_at").map_err(backend)?),
        withdraw_reason: row.try_get("withdraw_reason").map_err(backend)?,
        artifact_ref: row.try_get("artifact_ref").map_err(backend)?,
        created_at: parse_datetime(&row.try_get::<String, _>("created_at").map_err(backend)?),
        updated_at: parse_datetime(&row.try_get::<String, _>("updated_at").map_err(backend)?),
    })
}

fn row_to_action(row: &sqlx::sqlite::SqliteRow) -> Result<RequestApprovalAction, StoreError> {
    let step_index: i64 = row.try_get("step_index").map_err(backend)?;
    let origin_raw: String = row.try_get("origin").map_err(backend)?;
    let was_escalated: i64 = row.try_get("was_escalated").map_err(backend)?;
    let identity = identity_from_columns(
        row.try_get("approver_user_id").map_err(backend)?,
        row.try_get("approver_role_id").map_err(backend)?,
        row.try_get("approver_position_id").map_err(backend)?,
    )?;

    Ok(RequestApprovalAction {
        id: ActionId(row.try_get("id").map_err(backend)?),
        submission_id: SubmissionId(row.try_get("submission_id").map_err(backend)?),
        step_index: step_index as usize,
        step_name: row.try_get("step_name").map_err(backend)?,
        status: parse_action_status(&row.try_get::<String, _>("status").map_err(backend)?),
        identity,
        origin: serde_json::from_str(&origin_raw)
            .map_err(|error| decode(format!("origin column: {error}")))?,
        was_escalated: was_escalated != 0,
        due_at: parse_optional_datetime(row.try_get("due_at").map_err(backend)?),
        acted_by: row.try_get::<Option<String>, _>("acted_by").map_err(backend)?.map(EmployeeId),
        delegated_from: row
            .try_get::<Option<String>, _>("delegated_from")
            .map_err(backend)?
            .map(EmployeeId),
        acted_at: parse_optional_datetime(row.try_get("acted_at").map_err(backend)?),
        created_at: parse_datetime(&row.try_get::<String, _>("created_at").map_err(backend)?),
        updated_at: parse_datetime(&row.try_get::<String, _>("updated_at").map_err(backend)?),
    })
}

fn row_to_comment(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalComment, StoreError> {
    Ok(ApprovalComment {
        id: CommentId(row.try_get("id").map_err(backend)?),
        submission_id: SubmissionId(row.try_get("submission_id").map_err(backend)?),
        action_id: row.try_get::<Option<String>, _>("action_id").map_err(backend)?.map(ActionId),
        author_id: row
            .try_get::<Option<String>, _>("author_id")
            .map_err(backend)?
            .map(EmployeeId),
        body: row.try_get("body").map_err(backend)?,
        visibility: parse_visibility(&row.try_get::<String, _>("visibility").map_err(backend)?),
        kind: parse_comment_kind(&row.try_get::<String, _>("kind").map_err(backend)?),
        created_at: parse_datetime(&row.try_get::<String, _>("created_at").map_err(backend)?),
    })
}

async fn insert_action(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    action: &RequestApprovalAction,
) -> Result<(), StoreError> {
    let (user_id, role_id, position_id) = identity_columns(&action.identity);
    let origin = serde_json::to_string(&action.origin)
        .map_err(|error| decode(format!("origin encode: {error}")))?;

    sqlx::query(
        "INSERT INTO approval_action (id, submission_id, step_index, step_name, status,
                                      approver_user_id, approver_role_id, approver_position_id,
                                      origin, was_escalated, due_at, acted_by, delegated_from,
                                      acted_at, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             status = excluded.status,
             acted_by = excluded.acted_by,
             delegated_from = excluded.delegated_from,
             acted_at = excluded.acted_at,
             updated_at = excluded.updated_at",
    )
    .bind(&action.id.0)
    .bind(&action.submission_id.0)
    .bind(action.step_index as i64)
    .bind(&action.step_name)
    .bind(action_status_as_str(action.status))
    .bind(&user_id)
    .bind(&role_id)
    .bind(&position_id)
    .bind(&origin)
    .bind(i64::from(action.was_escalated))
    .bind(action.due_at.map(|dt| dt.to_rfc3339()))
    .bind(action.acted_by.as_ref().map(|id| id.0.clone()))
    .bind(action.delegated_from.as_ref().map(|id| id.0.clone()))
    .bind(action.acted_at.map(|dt| dt.to_rfc3339()))
    .bind(action.created_at.to_rfc3339())
    .bind(action.updated_at.to_rfc3339())
    .execute(&mut **tx)
    .await
    .map_err(backend)?;

    Ok(())
}

async fn insert_comment(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    comment: &ApprovalComment,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO approval_comment (id, submission_id, action_id, author_id, body,
                                       visibility, kind, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&comment.id.0)
    .bind(&comment.submission_id.0)
    .bind(comment.action_id.as_ref().map(|id| id.0.clone()))
    .bind(comment.author_id.as_ref().map(|id| id.0.clone()))
    .bind(&comment.body)
    .bind(visibility_as_str(comment.visibility))
    .bind(comment_kind_as_str(comment.kind))
    .bind(comment.created_at.to_rfc3339())
    .execute(&mut **tx)
    .await
    .map_err(backend)?;

    Ok(())
}

const SELECT_SUBMISSION: &str = "SELECT id, reference_code, request_type_id, requester_id, status,
        current_step_index, answers, approval_state, version, submitted_at, fulfilled_at,
        withdrawn_at, withdraw_reason, artifact_ref, created_at, updated_at
 FROM request_submission";

const SELECT_ACTION: &str = "SELECT id, submission_id, step_index, step_name, status,
        approver_user_id, approver_role_id, approver_position_id, origin, was_escalated,
        due_at, acted_by, delegated_from, acted_at, created_at, updated_at
 FROM approval_action";

#[async_trait]
impl SubmissionStore for SqlSubmissionStore {
    async fn create(
        &self,
        submission: &RequestSubmission,
        actions: &[RequestApprovalAction],
        comments: &[ApprovalComment],
    ) -> Result<(), StoreError> {
        let answers = serde_json::to_string(&submission.answers)
            .map_err(|error| decode(format!("answers encode: {error}")))?;
        let approval_state = serde_json::to_string(&submission.approval_state)
            .map_err(|error| decode(format!("approval_state encode: {error}")))?;

        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query(
            "INSERT INTO request_submission (id, reference_code, request_type_id, requester_id,
                                             status, current_step_index, answers, approval_state,
                                             version, submitted_at, fulfilled_at, withdrawn_at,
                                             withdraw_reason, artifact_ref, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&submission.id.0)
        .bind(&submission.reference_code)
        .bind(&submission.request_type_id.0)
        .bind(&submission.requester_id.0)
        .bind(submission_status_as_str(submission.status))
        .bind(submission.current_step_index.map(|index| index as i64))
        .bind(&answers)
        .bind(&approval_state)
        .bind(i64::from(submission.version))
        .bind(submission.submitted_at.to_rfc3339())
        .bind(submission.fulfilled_at.map(|dt| dt.to_rfc3339()))
        .bind(submission.withdrawn_at.map(|dt| dt.to_rfc3339()))
        .bind(&submission.withdraw_reason)
        .bind(&submission.artifact_ref)
        .bind(submission.created_at.to_rfc3339())
        .bind(submission.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|error| insert_error(error, "submission"))?;

        for action in actions {
            insert_action(&mut tx, action).await?;
        }
        for comment in comments {
            insert_comment(&mut tx, comment).await?;
        }

        tx.commit().await.map_err(backend)
    }

    async fn find_submission(
        &self,
        id: &SubmissionId,
    ) -> Result<Option<RequestSubmission>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_SUBMISSION} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        match row {
            Some(ref row) => Ok(Some(row_to_submission(row)?)),
            None => Ok(None),
        }
    }

    async fn actions_for(
        &self,
        id: &SubmissionId,
    ) -> Result<Vec<RequestApprovalAction>, StoreError> {
        let rows = sqlx::query(&format!(
            "{SELECT_ACTION} WHERE submission_id = ? ORDER BY step_index, created_at, id"
        ))
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(row_to_action).collect()
    }

    async fn comments_for(&self, id: &SubmissionId) -> Result<Vec<ApprovalComment>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, submission_id, action_id, author_id, body, visibility, kind, created_at
             FROM approval_comment WHERE submission_id = ? ORDER BY created_at, id",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(row_to_comment).collect()
    }

    async fn persist_transition(
        &self,
        submission: &RequestSubmission,
        expected_version: u32,
        actions: &[RequestApprovalAction],
        comments: &[ApprovalComment],
    ) -> Result<(), StoreError> {
        let answers = serde_json::to_string(&submission.answers)
            .map_err(|error| decode(format!("answers encode: {error}")))?;
        let approval_state = serde_json::to_string(&submission.approval_state)
            .map_err(|error| decode(format!("approval_state encode: {error}")))?;

        let mut tx = self.pool.begin().await.map_err(backend)?;

        // The version predicate is the serialization point: a concurrent
        // decision that committed first bumped the version, so this update
        // matches zero rows and the whole transaction is abandoned.
        let updated = sqlx::query(
            "UPDATE request_submission
             SET status = ?, current_step_index = ?, answers = ?, approval_state = ?,
                 version = ?, fulfilled_at = ?, withdrawn_at = ?, withdraw_reason = ?,
                 artifact_ref = ?, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(submission_status_as_str(submission.status))
        .bind(submission.current_step_index.map(|index| index as i64))
        .bind(&answers)
        .bind(&approval_state)
        .bind(i64::from(submission.version))
        .bind(submission.fulfilled_at.map(|dt| dt.to_rfc3339()))
        .bind(submission.withdrawn_at.map(|dt| dt.to_rfc3339()))
        .bind(&submission.withdraw_reason)
        .bind(&submission.artifact_ref)
        .bind(submission.updated_at.to_rfc3339())
        .bind(&submission.id.0)
        .bind(i64::from(expected_version))
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        if updated.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM request_submission WHERE id = ?")
                .bind(&submission.id.0)
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend)?
                .is_some();
            return Err(if exists {
                StoreError::Conflict(format!(
                    "submission `{}` version changed (expected {expected_version})",
                    submission.id.0
                ))
            } else {
                StoreError::NotFound(format!("submission `{}`", submission.id.0))
            });
        }

        for action in actions {
            insert_action(&mut tx, action).await?;
        }
        for comment in comments {
            insert_comment(&mut tx, comment).await?;
        }

        tx.commit().await.map_err(backend)
    }

    async fn append_comment(&self, comment: &ApprovalComment) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        insert_comment(&mut tx, comment).await?;
        tx.commit().await.map_err(backend)
    }

    async fn pending_actions_for(
        &self,
        filter: &ApproverFilter,
    ) -> Result<Vec<RequestApprovalAction>, StoreError> {
        let rows = sqlx::query(
            "SELECT a.id, a.submission_id, a.step_index, a.step_name, a.status,
                    a.approver_user_id, a.approver_role_id, a.approver_position_id, a.origin,
                    a.was_escalated, a.due_at, a.acted_by, a.delegated_from, a.acted_at,
                    a.created_at, a.updated_at
             FROM approval_action a
             JOIN request_submission s ON s.id = a.submission_id
             WHERE s.status = 'pending'
               AND a.status = 'pending'
               AND a.step_index = s.current_step_index
             ORDER BY a.created_at, a.id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let actions: Vec<RequestApprovalAction> =
            rows.iter().map(row_to_action).collect::<Result<_, _>>()?;
        Ok(actions.into_iter().filter(|action| filter.matches(&action.identity)).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use greenlight_core::domain::employee::EmployeeId;
    use greenlight_core::domain::request::RequestTypeId;
    use greenlight_core::domain::submission::{
        ActionId, ActionStatus, ApprovalComment, ApprovalStateSnapshot, ApproverIdentity,
        ApproverOrigin, CommentId, CommentKind, CommentVisibility, RequestApprovalAction,
        RequestSubmission, SubmissionId, SubmissionStatus,
    };
    use greenlight_core::store::{ApproverFilter, StoreError, SubmissionStore};

    use super::SqlSubmissionStore;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_submission(id: &str) -> RequestSubmission {
        let now = Utc::now();
        RequestSubmission {
            id: SubmissionId(id.to_string()),
            reference_code: format!("REQ-2026-{id}"),
            request_type_id: RequestTypeId("rt-leave".to_string()),
            requester_id: EmployeeId("e-req".to_string()),
            status: SubmissionStatus::Pending,
            current_step_index: Some(0),
            answers: BTreeMap::new(),
            approval_state: ApprovalStateSnapshot::default(),
            version: 1,
            submitted_at: now,
            fulfilled_at: None,
            withdrawn_at: None,
            withdraw_reason: None,
            artifact_ref: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_action(id: &str, submission_id: &str, approver: &str) -> RequestApprovalAction {
        let now = Utc::now();
        RequestApprovalAction {
            id: ActionId(id.to_string()),
            submission_id: SubmissionId(submission_id.to_string()),
            step_index: 0,
            step_name: "HR Review".to_string(),
            status: ActionStatus::Pending,
            identity: ApproverIdentity::User { user_id: EmployeeId(approver.to_string()) },
            origin: ApproverOrigin::Direct,
            was_escalated: false,
            due_at: None,
            acted_by: None,
            delegated_from: None,
            acted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn create_and_read_back_submission_with_actions() {
        let pool = setup().await;
        let store = SqlSubmissionStore::new(pool);

        let submission = sample_submission("sub-1");
        let actions = vec![
            sample_action("act-1", "sub-1", "e-ana"),
            sample_action("act-2", "sub-1", "e-ben"),
        ];
        store.create(&submission, &actions, &[]).await.expect("create");

        let found = store
            .find_submission(&SubmissionId("sub-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(found.reference_code, submission.reference_code);
        assert_eq!(found.status, SubmissionStatus::Pending);
        assert_eq!(found.current_step_index, Some(0));

        let stored_actions =
            store.actions_for(&SubmissionId("sub-1".to_string())).await.expect("actions");
        assert_eq!(stored_actions.len(), 2);
        assert_eq!(stored_actions[0].step_name, "HR Review");
    }

    #[tokio::test]
    async fn duplicate_submission_id_conflicts() {
        let pool = setup().await;
        let store = SqlSubmissionStore::new(pool);

        let submission = sample_submission("sub-1");
        store.create(&submission, &[], &[]).await.expect("create");

        let error = store.create(&submission, &[], &[]).await.expect_err("duplicate id");
        assert!(matches!(error, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn persist_transition_enforces_the_version_guard() {
        let pool = setup().await;
        let store = SqlSubmissionStore::new(pool);

        let mut submission = sample_submission("sub-1");
        let mut action = sample_action("act-1", "sub-1", "e-ana");
        store.create(&submission, &[action.clone()], &[]).await.expect("create");

        submission.status = SubmissionStatus::Approved;
        submission.current_step_index = None;
        submission.version = 2;
        action.status = ActionStatus::Approved;
        action.acted_by = Some(EmployeeId("e-ana".to_string()));

        store
            .persist_transition(&submission, 1, &[action.clone()], &[])
            .await
            .expect("first transition");

        // A competing writer that read version 1 must conflict and write
        // nothing.
        let error = store
            .persist_transition(&submission, 1, &[action], &[])
            .await
            .expect_err("stale version");
        assert!(matches!(error, StoreError::Conflict(_)));

        let found = store
            .find_submission(&SubmissionId("sub-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(found.version, 2);
        assert_eq!(found.status, SubmissionStatus::Approved);

        let actions = store.actions_for(&SubmissionId("sub-1".to_string())).await.expect("actions");
        assert_eq!(actions[0].status, ActionStatus::Approved);
        assert_eq!(actions[0].acted_by, Some(EmployeeId("e-ana".to_string())));
    }

    #[tokio::test]
    async fn comments_append_and_order_by_creation() {
        let pool = setup().await;
        let store = SqlSubmissionStore::new(pool);
        store.create(&sample_submission("sub-1"), &[], &[]).await.expect("create");

        let now = Utc::now();
        for (id, body) in [("c-1", "first"), ("c-2", "second")] {
            store
                .append_comment(&ApprovalComment {
                    id: CommentId(id.to_string()),
                    submission_id: SubmissionId("sub-1".to_string()),
                    action_id: None,
                    author_id: Some(EmployeeId("e-req".to_string())),
                    body: body.to_string(),
                    visibility: CommentVisibility::Public,
                    kind: CommentKind::General,
                    created_at: now,
                })
                .await
                .expect("append");
        }

        let comments =
            store.comments_for(&SubmissionId("sub-1".to_string())).await.expect("comments");
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].body, "first");
    }

    #[tokio::test]
    async fn pending_actions_filter_by_identity_and_current_step() {
        let pool = setup().await;
        let store = SqlSubmissionStore::new(pool);

        let submission = sample_submission("sub-1");
        let mut step_one_action = sample_action("act-2", "sub-1", "e-ana");
        step_one_action.step_index = 1;
        store
            .create(
                &submission,
                &[sample_action("act-1", "sub-1", "e-ana"), step_one_action],
                &[],
            )
            .await
            .expect("create");

        let filter = ApproverFilter {
            user_ids: vec![EmployeeId("e-ana".to_string())],
            role_ids: Vec::new(),
            position_ids: Vec::new(),
        };
        let pending = store.pending_actions_for(&filter).await.expect("pending");

        // Only the current step's action is actionable.
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id.0, "act-1");

        let other_filter = ApproverFilter {
            user_ids: vec![EmployeeId("e-ben".to_string())],
            role_ids: Vec::new(),
            position_ids: Vec::new(),
        };
        assert!(store.pending_actions_for(&other_filter).await.expect("pending").is_empty());
    }
}
