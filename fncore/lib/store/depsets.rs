//! Dependency sets: ordered package lists consumed read-only at deploy time.

use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;

use crate::{models::Depset, models::DepsetPackage, FncoreResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A package row joined with the runtime family of its depset, in install
/// order, ready for formatting.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionPackage {
    /// Runtime family of the owning depset.
    pub runtime_family: String,

    /// Package name.
    pub package_name: String,

    /// Version number or specifier; empty means latest.
    pub version_spec: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates a dependency set.
pub async fn create_depset(
    pool: &Pool<Sqlite>,
    name: &str,
    runtime_family: &str,
) -> FncoreResult<Depset> {
    let row = sqlx::query(
        r#"
        INSERT INTO depsets (name, runtime_family)
        VALUES (?, ?)
        RETURNING id, name, runtime_family, created_at
        "#,
    )
    .bind(name)
    .bind(runtime_family)
    .fetch_one(pool)
    .await?;

    Ok(Depset {
        id: row.get("id"),
        name: row.get("name"),
        runtime_family: row.get("runtime_family"),
        created_at: row.get("created_at"),
    })
}

/// Adds a package to a depset.
pub async fn add_package(
    pool: &Pool<Sqlite>,
    depset_id: i64,
    package_name: &str,
    version_spec: Option<&str>,
    install_order: i64,
) -> FncoreResult<DepsetPackage> {
    let row = sqlx::query(
        r#"
        INSERT INTO depset_packages (depset_id, package_name, version_spec, install_order)
        VALUES (?, ?, ?, ?)
        RETURNING id, depset_id, package_name, version_spec, install_order
        "#,
    )
    .bind(depset_id)
    .bind(package_name)
    .bind(version_spec)
    .bind(install_order)
    .fetch_one(pool)
    .await?;

    Ok(DepsetPackage {
        id: row.get("id"),
        depset_id: row.get("depset_id"),
        package_name: row.get("package_name"),
        version_spec: row.get("version_spec"),
        install_order: row.get("install_order"),
    })
}

/// Attaches a depset to a function.
pub async fn link_function(
    pool: &Pool<Sqlite>,
    function_uuid: &Uuid,
    depset_id: i64,
) -> FncoreResult<()> {
    sqlx::query("INSERT OR IGNORE INTO function_depsets (function_uuid, depset_id) VALUES (?, ?)")
        .bind(function_uuid.to_string())
        .bind(depset_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// All packages of a function's depsets, grouped by depset in attachment
/// order, then by each depset's install order.
pub async fn packages_for_function(
    pool: &Pool<Sqlite>,
    function_uuid: &Uuid,
) -> FncoreResult<Vec<FunctionPackage>> {
    let rows = sqlx::query(
        r#"
        SELECT d.runtime_family, p.package_name, p.version_spec
        FROM function_depsets fd
        JOIN depsets d ON d.id = fd.depset_id
        JOIN depset_packages p ON p.depset_id = d.id
        WHERE fd.function_uuid = ?
        ORDER BY d.id, p.install_order, p.package_name
        "#,
    )
    .bind(function_uuid.to_string())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| FunctionPackage {
            runtime_family: row.get("runtime_family"),
            package_name: row.get("package_name"),
            version_spec: row.get("version_spec"),
        })
        .collect())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
