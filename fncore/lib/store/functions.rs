//! Function records and their lifecycle transitions.
//!
//! Every transition is a conditional UPDATE guarded by the legal source
//! states, so the status column doubles as an optimistic lock: of two
//! concurrent deploy requests, exactly one flips `draft → deploying` and the
//! other sees zero affected rows.

use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite};
use uuid::Uuid;

use crate::{
    models::{Function, FunctionStatus},
    FncoreError, FncoreResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Fields required to register a function.
#[derive(Debug, Clone)]
pub struct NewFunction {
    /// The name of the function.
    pub name: String,

    /// The runtime identifier.
    pub runtime: String,

    /// The source code.
    pub code: String,

    /// The handler entry point.
    pub handler: String,

    /// Memory allocation in MB.
    pub memory_mb: i64,

    /// vCPU allocation.
    pub vcpus: f64,

    /// Execution timeout in seconds.
    pub timeout_seconds: i64,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Registers a new function in `draft` status and returns the stored row.
pub async fn create_function(pool: &Pool<Sqlite>, new: NewFunction) -> FncoreResult<Function> {
    let uuid = Uuid::new_v4();

    let row = sqlx::query(
        r#"
        INSERT INTO functions (uuid, name, runtime, code, handler, memory_mb, vcpus, timeout_seconds)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(uuid.to_string())
    .bind(&new.name)
    .bind(&new.runtime)
    .bind(&new.code)
    .bind(&new.handler)
    .bind(new.memory_mb)
    .bind(new.vcpus)
    .bind(new.timeout_seconds)
    .fetch_one(pool)
    .await?;

    row_to_function(&row)
}

/// Fetches a function by its stable identifier.
pub async fn get_function(pool: &Pool<Sqlite>, uuid: &Uuid) -> FncoreResult<Option<Function>> {
    let row = sqlx::query("SELECT * FROM functions WHERE uuid = ?")
        .bind(uuid.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_function).transpose()
}

/// Lists all functions, newest first.
pub async fn list_functions(pool: &Pool<Sqlite>) -> FncoreResult<Vec<Function>> {
    let rows = sqlx::query("SELECT * FROM functions ORDER BY created_at DESC, id DESC")
        .fetch_all(pool)
        .await?;

    rows.iter().map(row_to_function).collect()
}

/// Moves a function into `deploying`. Succeeds only from `draft` or `error`;
/// returns whether this caller won the transition.
pub async fn begin_deploy(pool: &Pool<Sqlite>, uuid: &Uuid) -> FncoreResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE functions
        SET status = 'deploying', modified_at = CURRENT_TIMESTAMP
        WHERE uuid = ? AND status IN ('draft', 'error')
        "#,
    )
    .bind(uuid.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Marks a deploy as finished: status `active`, binding fields set,
/// `last_deployed_at` stamped. Succeeds only from `deploying`.
pub async fn complete_deploy(
    pool: &Pool<Sqlite>,
    uuid: &Uuid,
    workload_name: &str,
    endpoint_name: &str,
    namespace: &str,
) -> FncoreResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE functions
        SET status = 'active',
            workload_name = ?,
            endpoint_name = ?,
            namespace = ?,
            last_deployed_at = CURRENT_TIMESTAMP,
            modified_at = CURRENT_TIMESTAMP
        WHERE uuid = ? AND status = 'deploying'
        "#,
    )
    .bind(workload_name)
    .bind(endpoint_name)
    .bind(namespace)
    .bind(uuid.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Marks a deploy as failed after retry exhaustion. Binding fields are
/// cleared; they are only ever set while `active`.
pub async fn fail_deploy(pool: &Pool<Sqlite>, uuid: &Uuid) -> FncoreResult<bool> {
    fail_in_flight(pool, uuid, "deploying").await
}

/// Moves a function into `undeploying`. Succeeds only from `active`.
pub async fn begin_undeploy(pool: &Pool<Sqlite>, uuid: &Uuid) -> FncoreResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE functions
        SET status = 'undeploying', modified_at = CURRENT_TIMESTAMP
        WHERE uuid = ? AND status = 'active'
        "#,
    )
    .bind(uuid.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Marks an undeploy as finished: back to `draft` with bindings cleared.
pub async fn complete_undeploy(pool: &Pool<Sqlite>, uuid: &Uuid) -> FncoreResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE functions
        SET status = 'draft',
            workload_name = NULL,
            endpoint_name = NULL,
            namespace = NULL,
            modified_at = CURRENT_TIMESTAMP
        WHERE uuid = ? AND status = 'undeploying'
        "#,
    )
    .bind(uuid.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Marks an undeploy as failed after retry exhaustion.
pub async fn fail_undeploy(pool: &Pool<Sqlite>, uuid: &Uuid) -> FncoreResult<bool> {
    fail_in_flight(pool, uuid, "undeploying").await
}

/// Increments the invocation counter and stamps `last_invoked_at`.
pub async fn bump_invocation_stats(pool: &Pool<Sqlite>, uuid: &Uuid) -> FncoreResult<()> {
    sqlx::query(
        r#"
        UPDATE functions
        SET invocation_count = invocation_count + 1,
            last_invoked_at = CURRENT_TIMESTAMP,
            modified_at = CURRENT_TIMESTAMP
        WHERE uuid = ?
        "#,
    )
    .bind(uuid.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

async fn fail_in_flight(pool: &Pool<Sqlite>, uuid: &Uuid, from: &str) -> FncoreResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE functions
        SET status = 'error',
            workload_name = NULL,
            endpoint_name = NULL,
            namespace = NULL,
            modified_at = CURRENT_TIMESTAMP
        WHERE uuid = ? AND status = ?
        "#,
    )
    .bind(uuid.to_string())
    .bind(from)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) fn row_to_function(row: &SqliteRow) -> FncoreResult<Function> {
    let uuid: String = row.get("uuid");
    let status: String = row.get("status");

    Ok(Function {
        id: row.get("id"),
        uuid: Uuid::parse_str(&uuid).map_err(FncoreError::custom)?,
        name: row.get("name"),
        runtime: row.get("runtime"),
        code: row.get("code"),
        handler: row.get("handler"),
        memory_mb: row.get("memory_mb"),
        vcpus: row.get("vcpus"),
        timeout_seconds: row.get("timeout_seconds"),
        status: FunctionStatus::parse(&status)
            .ok_or_else(|| FncoreError::custom(anyhow::anyhow!("unknown status: {}", status)))?,
        workload_name: row.get("workload_name"),
        endpoint_name: row.get("endpoint_name"),
        namespace: row.get("namespace"),
        invocation_count: row.get("invocation_count"),
        last_invoked_at: row.get("last_invoked_at"),
        last_deployed_at: row.get("last_deployed_at"),
        created_at: row.get("created_at"),
        modified_at: row.get("modified_at"),
    })
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::db;
    use tempfile::TempDir;

    pub(crate) async fn test_pool() -> (TempDir, Pool<Sqlite>) {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::init_db(dir.path().join("test.db"), &db::MIGRATOR)
            .await
            .unwrap();
        (dir, pool)
    }

    pub(crate) fn sample_function() -> NewFunction {
        NewFunction {
            name: "resize-images".to_string(),
            runtime: "python3.11".to_string(),
            code: "def handler(event, context):\n    return event\n".to_string(),
            handler: "handler".to_string(),
            memory_mb: 128,
            vcpus: 1.0,
            timeout_seconds: 30,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (_dir, pool) = test_pool().await;
        let func = create_function(&pool, sample_function()).await.unwrap();

        assert_eq!(func.status, FunctionStatus::Draft);
        assert!(func.workload_name.is_none());

        let fetched = get_function(&pool, &func.uuid).await.unwrap().unwrap();
        assert_eq!(fetched, func);
    }

    #[tokio::test]
    async fn test_deploy_lifecycle_sets_and_clears_bindings() {
        let (_dir, pool) = test_pool().await;
        let func = create_function(&pool, sample_function()).await.unwrap();

        assert!(begin_deploy(&pool, &func.uuid).await.unwrap());
        assert!(
            complete_deploy(&pool, &func.uuid, "func-12345678", "func-12345678-svc", "fncore-functions")
                .await
                .unwrap()
        );

        let active = get_function(&pool, &func.uuid).await.unwrap().unwrap();
        assert_eq!(active.status, FunctionStatus::Active);
        assert_eq!(active.workload_name.as_deref(), Some("func-12345678"));
        assert_eq!(active.endpoint_name.as_deref(), Some("func-12345678-svc"));
        assert!(active.last_deployed_at.is_some());

        assert!(begin_undeploy(&pool, &func.uuid).await.unwrap());
        assert!(complete_undeploy(&pool, &func.uuid).await.unwrap());

        let drafted = get_function(&pool, &func.uuid).await.unwrap().unwrap();
        assert_eq!(drafted.status, FunctionStatus::Draft);
        assert!(drafted.workload_name.is_none());
        assert!(drafted.endpoint_name.is_none());
        assert!(drafted.namespace.is_none());
    }

    #[tokio::test]
    async fn test_second_deploy_loses_the_race() {
        let (_dir, pool) = test_pool().await;
        let func = create_function(&pool, sample_function()).await.unwrap();

        assert!(begin_deploy(&pool, &func.uuid).await.unwrap());
        // The row is now 'deploying'; another deploy attempt must not pass.
        assert!(!begin_deploy(&pool, &func.uuid).await.unwrap());

        complete_deploy(&pool, &func.uuid, "w", "s", "ns").await.unwrap();
        // Nor may a deploy start while active.
        assert!(!begin_deploy(&pool, &func.uuid).await.unwrap());
    }

    #[tokio::test]
    async fn test_undeploy_requires_active() {
        let (_dir, pool) = test_pool().await;
        let func = create_function(&pool, sample_function()).await.unwrap();

        assert!(!begin_undeploy(&pool, &func.uuid).await.unwrap());
    }

    #[tokio::test]
    async fn test_fail_deploy_clears_bindings_and_allows_retry() {
        let (_dir, pool) = test_pool().await;
        let func = create_function(&pool, sample_function()).await.unwrap();

        begin_deploy(&pool, &func.uuid).await.unwrap();
        assert!(fail_deploy(&pool, &func.uuid).await.unwrap());

        let errored = get_function(&pool, &func.uuid).await.unwrap().unwrap();
        assert_eq!(errored.status, FunctionStatus::Error);
        assert!(errored.workload_name.is_none());

        // Error is a legal source for a fresh deploy.
        assert!(begin_deploy(&pool, &func.uuid).await.unwrap());
    }

    #[tokio::test]
    async fn test_bump_invocation_stats() {
        let (_dir, pool) = test_pool().await;
        let func = create_function(&pool, sample_function()).await.unwrap();

        bump_invocation_stats(&pool, &func.uuid).await.unwrap();
        bump_invocation_stats(&pool, &func.uuid).await.unwrap();

        let func = get_function(&pool, &func.uuid).await.unwrap().unwrap();
        assert_eq!(func.invocation_count, 2);
        assert!(func.last_invoked_at.is_some());
    }
}
