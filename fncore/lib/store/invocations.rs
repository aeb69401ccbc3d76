//! Invocation records: created before the remote call, updated after it.
//!
//! The admission-control and circuit-breaker queries live here too, since
//! both are pure reads over recent rows.

use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite};
use uuid::Uuid;

use crate::{
    models::{Invocation, InvocationStatus},
    FncoreError, FncoreResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Final outcome of an invocation attempt, persisted in one write.
#[derive(Debug, Clone)]
pub struct InvocationOutcome {
    /// Terminal status of the attempt.
    pub status: InvocationStatus,

    /// Handler return value, JSON-encoded.
    pub output_json: Option<String>,

    /// Error text when the attempt failed.
    pub error_message: String,

    /// Captured stdout/stderr text.
    pub logs: String,

    /// Execution duration in milliseconds.
    pub duration_ms: Option<i64>,

    /// Peak memory delta in MiB.
    pub memory_used_mb: Option<i64>,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates an invocation record in `pending` status.
pub async fn create_invocation(
    pool: &Pool<Sqlite>,
    function_uuid: &Uuid,
    request_id: &str,
    input_json: Option<&str>,
) -> FncoreResult<Invocation> {
    let row = sqlx::query(
        r#"
        INSERT INTO invocations (request_id, function_uuid, input_json)
        VALUES (?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(request_id)
    .bind(function_uuid.to_string())
    .bind(input_json)
    .fetch_one(pool)
    .await?;

    row_to_invocation(&row)
}

/// Moves a pending invocation into `running` and stamps `started_at`.
pub async fn mark_running(pool: &Pool<Sqlite>, id: i64) -> FncoreResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE invocations
        SET status = 'running', started_at = CURRENT_TIMESTAMP
        WHERE id = ? AND status = 'pending'
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Persists the terminal outcome of an invocation.
pub async fn complete_invocation(
    pool: &Pool<Sqlite>,
    id: i64,
    outcome: InvocationOutcome,
) -> FncoreResult<()> {
    sqlx::query(
        r#"
        UPDATE invocations
        SET status = ?,
            output_json = ?,
            error_message = ?,
            logs = ?,
            duration_ms = ?,
            memory_used_mb = ?,
            completed_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(outcome.status.as_str())
    .bind(outcome.output_json)
    .bind(outcome.error_message)
    .bind(outcome.logs)
    .bind(outcome.duration_ms)
    .bind(outcome.memory_used_mb)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetches an invocation by row id.
pub async fn get_invocation(pool: &Pool<Sqlite>, id: i64) -> FncoreResult<Option<Invocation>> {
    let row = sqlx::query("SELECT * FROM invocations WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_invocation).transpose()
}

/// Lists a function's invocations, newest first.
pub async fn list_for_function(
    pool: &Pool<Sqlite>,
    function_uuid: &Uuid,
    limit: i64,
) -> FncoreResult<Vec<Invocation>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM invocations
        WHERE function_uuid = ?
        ORDER BY created_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(function_uuid.to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_invocation).collect()
}

/// Counts invocations currently in `pending` or `running` state.
pub async fn count_in_flight(pool: &Pool<Sqlite>, function_uuid: &Uuid) -> FncoreResult<i64> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS n FROM invocations
        WHERE function_uuid = ? AND status IN ('pending', 'running')
        "#,
    )
    .bind(function_uuid.to_string())
    .fetch_one(pool)
    .await?;

    Ok(row.get::<i64, _>("n"))
}

/// Statuses of the most recent invocations created within the trailing
/// window, newest first, at most `sample` rows.
pub async fn recent_statuses(
    pool: &Pool<Sqlite>,
    function_uuid: &Uuid,
    window_seconds: i64,
    sample: i64,
) -> FncoreResult<Vec<InvocationStatus>> {
    let rows = sqlx::query(
        r#"
        SELECT status FROM invocations
        WHERE function_uuid = ?
          AND created_at >= datetime('now', '-' || ? || ' seconds')
        ORDER BY created_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(function_uuid.to_string())
    .bind(window_seconds)
    .bind(sample)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let status: String = row.get("status");
            InvocationStatus::parse(&status).ok_or_else(|| {
                FncoreError::custom(anyhow::anyhow!("unknown invocation status: {}", status))
            })
        })
        .collect()
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

pub(crate) fn row_to_invocation(row: &SqliteRow) -> FncoreResult<Invocation> {
    let function_uuid: String = row.get("function_uuid");
    let status: String = row.get("status");

    Ok(Invocation {
        id: row.get("id"),
        request_id: row.get("request_id"),
        function_uuid: Uuid::parse_str(&function_uuid).map_err(FncoreError::custom)?,
        status: InvocationStatus::parse(&status).ok_or_else(|| {
            FncoreError::custom(anyhow::anyhow!("unknown invocation status: {}", status))
        })?,
        input_json: row.get("input_json"),
        output_json: row.get("output_json"),
        error_message: row.get("error_message"),
        logs: row.get("logs"),
        duration_ms: row.get("duration_ms"),
        memory_used_mb: row.get("memory_used_mb"),
        created_at: row.get("created_at"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
    })
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
