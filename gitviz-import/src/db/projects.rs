//! Project record persistence
//!
//! Member repository ids are stored as a JSON array in one column.

use gitviz_common::{Error, Result};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use super::repositories::{parse_timestamp, parse_uuid};
use crate::models::Project;
use crate::utils::retry_on_lock;

/// Insert a project record
pub async fn insert_project(pool: &SqlitePool, project: &Project) -> Result<()> {
    let id = project.id.to_string();
    let repository_ids = serde_json::to_string(&project.repository_ids)
        .map_err(|e| Error::Internal(format!("Failed to serialize repository ids: {}", e)))?;
    let created_at = project.created_at.to_rfc3339();

    retry_on_lock("insert_project", 5000, || async {
        sqlx::query(
            r#"
            INSERT INTO projects (id, name, description, repository_ids, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&project.name)
        .bind(&project.description)
        .bind(&repository_ids)
        .bind(&created_at)
        .execute(pool)
        .await?;
        Ok(())
    })
    .await
}

/// List all projects, newest first
pub async fn list_projects(pool: &SqlitePool) -> Result<Vec<Project>> {
    let rows = sqlx::query(
        "SELECT id, name, description, repository_ids, created_at FROM projects ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_project).collect()
}

fn row_to_project(row: &SqliteRow) -> Result<Project> {
    let id: String = row.get("id");
    let repository_ids: String = row.get("repository_ids");
    let created_at: String = row.get("created_at");

    let repository_ids: Vec<String> = serde_json::from_str(&repository_ids)
        .map_err(|e| Error::Internal(format!("Corrupt repository_ids for project {}: {}", id, e)))?;

    Ok(Project {
        id: parse_uuid(&id)?,
        name: row.get("name"),
        description: row.get("description"),
        repository_ids: repository_ids
            .iter()
            .map(|s| parse_uuid(s))
            .collect::<Result<Vec<_>>>()?,
        created_at: parse_timestamp(&created_at)?,
    })
}
