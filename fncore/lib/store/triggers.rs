//! Trigger records. Their lifecycle is independent of functions except for
//! the one-directional cascade: leaving `active` disables a function's
//! enabled scheduled triggers.

use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite};
use uuid::Uuid;

use crate::{
    models::{Trigger, TriggerKind},
    FncoreError, FncoreResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Fields required to register a trigger.
#[derive(Debug, Clone)]
pub struct NewTrigger {
    /// The owning function.
    pub function_uuid: Uuid,

    /// The name of the trigger, unique per function.
    pub name: String,

    /// The kind of trigger.
    pub kind: TriggerKind,

    /// Cron expression for scheduled triggers.
    pub schedule: Option<String>,

    /// Whether the trigger starts enabled.
    pub enabled: bool,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Registers a new trigger and returns the stored row.
pub async fn create_trigger(pool: &Pool<Sqlite>, new: NewTrigger) -> FncoreResult<Trigger> {
    let uuid = Uuid::new_v4();

    let row = sqlx::query(
        r#"
        INSERT INTO triggers (uuid, function_uuid, name, kind, schedule, enabled)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(uuid.to_string())
    .bind(new.function_uuid.to_string())
    .bind(&new.name)
    .bind(new.kind.as_str())
    .bind(&new.schedule)
    .bind(new.enabled)
    .fetch_one(pool)
    .await?;

    row_to_trigger(&row)
}

/// Fetches a trigger by its stable identifier.
pub async fn get_trigger(pool: &Pool<Sqlite>, uuid: &Uuid) -> FncoreResult<Option<Trigger>> {
    let row = sqlx::query("SELECT * FROM triggers WHERE uuid = ?")
        .bind(uuid.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_trigger).transpose()
}

/// Lists every scheduled trigger, for full reconciliation.
pub async fn list_scheduled(pool: &Pool<Sqlite>) -> FncoreResult<Vec<Trigger>> {
    let rows = sqlx::query("SELECT * FROM triggers WHERE kind = 'scheduled' ORDER BY id")
        .fetch_all(pool)
        .await?;

    rows.iter().map(row_to_trigger).collect()
}

/// Lists a function's triggers.
pub async fn list_for_function(
    pool: &Pool<Sqlite>,
    function_uuid: &Uuid,
) -> FncoreResult<Vec<Trigger>> {
    let rows = sqlx::query("SELECT * FROM triggers WHERE function_uuid = ? ORDER BY id")
        .bind(function_uuid.to_string())
        .fetch_all(pool)
        .await?;

    rows.iter().map(row_to_trigger).collect()
}

/// Sets a trigger's enabled flag.
pub async fn set_enabled(pool: &Pool<Sqlite>, uuid: &Uuid, enabled: bool) -> FncoreResult<bool> {
    let result = sqlx::query(
        "UPDATE triggers SET enabled = ?, modified_at = CURRENT_TIMESTAMP WHERE uuid = ?",
    )
    .bind(enabled)
    .bind(uuid.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Disables every enabled scheduled trigger of a function and returns the
/// identifiers that were flipped.
pub async fn disable_scheduled_for_function(
    pool: &Pool<Sqlite>,
    function_uuid: &Uuid,
) -> FncoreResult<Vec<Uuid>> {
    let rows = sqlx::query(
        r#"
        UPDATE triggers
        SET enabled = 0, modified_at = CURRENT_TIMESTAMP
        WHERE function_uuid = ? AND kind = 'scheduled' AND enabled = 1
        RETURNING uuid
        "#,
    )
    .bind(function_uuid.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let uuid: String = row.get("uuid");
            Uuid::parse_str(&uuid).map_err(FncoreError::custom)
        })
        .collect()
}

/// Stamps the last time the trigger fired.
pub async fn set_last_triggered(pool: &Pool<Sqlite>, uuid: &Uuid) -> FncoreResult<()> {
    sqlx::query(
        "UPDATE triggers SET last_triggered_at = CURRENT_TIMESTAMP WHERE uuid = ?",
    )
    .bind(uuid.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Deletes a trigger.
pub async fn delete_trigger(pool: &Pool<Sqlite>, uuid: &Uuid) -> FncoreResult<bool> {
    let result = sqlx::query("DELETE FROM triggers WHERE uuid = ?")
        .bind(uuid.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

pub(crate) fn row_to_trigger(row: &SqliteRow) -> FncoreResult<Trigger> {
    let uuid: String = row.get("uuid");
    let function_uuid: String = row.get("function_uuid");
    let kind: String = row.get("kind");

    Ok(Trigger {
        id: row.get("id"),
        uuid: Uuid::parse_str(&uuid).map_err(FncoreError::custom)?,
        function_uuid: Uuid::parse_str(&function_uuid).map_err(FncoreError::custom)?,
        name: row.get("name"),
        kind: TriggerKind::parse(&kind)
            .ok_or_else(|| FncoreError::custom(anyhow::anyhow!("unknown trigger kind: {}", kind)))?,
        schedule: row.get("schedule"),
        enabled: row.get("enabled"),
        last_triggered_at: row.get("last_triggered_at"),
        created_at: row.get("created_at"),
        modified_at: row.get("modified_at"),
    })
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::functions::tests::{sample_function, test_pool};
    use crate::store::functions::create_function;

    #[tokio::test]
    async fn test_create_and_list() {
        let (_dir, pool) = test_pool().await;
        let func = create_function(&pool, sample_function()).await.unwrap();

        let trigger = create_trigger(
            &pool,
            NewTrigger {
                function_uuid: func.uuid,
                name: "nightly".to_string(),
                kind: TriggerKind::Scheduled,
                schedule: Some("0 0 * * *".to_string()),
                enabled: true,
            },
        )
        .await
        .unwrap();

        assert!(trigger.enabled);
        assert_eq!(trigger.kind, TriggerKind::Scheduled);

        let listed = list_for_function(&pool, &func.uuid).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].uuid, trigger.uuid);
    }

    #[tokio::test]
    async fn test_disable_cascade_touches_only_enabled_scheduled() {
        let (_dir, pool) = test_pool().await;
        let func = create_function(&pool, sample_function()).await.unwrap();

        let on = create_trigger(
            &pool,
            NewTrigger {
                function_uuid: func.uuid,
                name: "on".to_string(),
                kind: TriggerKind::Scheduled,
                schedule: Some("*/5 * * * *".to_string()),
                enabled: true,
            },
        )
        .await
        .unwrap();

        create_trigger(
            &pool,
            NewTrigger {
                function_uuid: func.uuid,
                name: "off".to_string(),
                kind: TriggerKind::Scheduled,
                schedule: Some("*/5 * * * *".to_string()),
                enabled: false,
            },
        )
        .await
        .unwrap();

        create_trigger(
            &pool,
            NewTrigger {
                function_uuid: func.uuid,
                name: "webhook".to_string(),
                kind: TriggerKind::Http,
                schedule: None,
                enabled: true,
            },
        )
        .await
        .unwrap();

        let disabled = disable_scheduled_for_function(&pool, &func.uuid)
            .await
            .unwrap();
        assert_eq!(disabled, vec![on.uuid]);

        // The HTTP trigger is untouched by the cascade.
        let listed = list_for_function(&pool, &func.uuid).await.unwrap();
        let webhook = listed.iter().find(|t| t.name == "webhook").unwrap();
        assert!(webhook.enabled);
    }

    #[tokio::test]
    async fn test_set_last_triggered() {
        let (_dir, pool) = test_pool().await;
        let func = create_function(&pool, sample_function()).await.unwrap();

        let trigger = create_trigger(
            &pool,
            NewTrigger {
                function_uuid: func.uuid,
                name: "t".to_string(),
                kind: TriggerKind::Scheduled,
                schedule: Some("* * * * *".to_string()),
                enabled: true,
            },
        )
        .await
        .unwrap();
        assert!(trigger.last_triggered_at.is_none());

        set_last_triggered(&pool, &trigger.uuid).await.unwrap();
        let trigger = get_trigger(&pool, &trigger.uuid).await.unwrap().unwrap();
        assert!(trigger.last_triggered_at.is_some());
    }
}
