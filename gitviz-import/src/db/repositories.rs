//! Repository record persistence

use chrono::{DateTime, Utc};
use gitviz_common::{Error, Result};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

use crate::models::Repository;
use crate::utils::retry_on_lock;

const SELECT_COLUMNS: &str =
    "SELECT id, url, name, owner, description, path, date_added, last_updated FROM repositories";

/// Insert a repository record
///
/// Writes come from many concurrent checkout workers, so transient SQLite
/// lock errors are retried.
pub async fn insert_repository(pool: &SqlitePool, repository: &Repository) -> Result<()> {
    let id = repository.id.to_string();
    let date_added = repository.date_added.to_rfc3339();
    let last_updated = repository.last_updated.to_rfc3339();

    retry_on_lock("insert_repository", 5000, || async {
        sqlx::query(
            r#"
            INSERT INTO repositories (id, url, name, owner, description, path, date_added, last_updated)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&repository.url)
        .bind(&repository.name)
        .bind(&repository.owner)
        .bind(&repository.description)
        .bind(&repository.path)
        .bind(&date_added)
        .bind(&last_updated)
        .execute(pool)
        .await?;
        Ok(())
    })
    .await
}

/// Find a repository by its remote URL
pub async fn find_by_url(pool: &SqlitePool, url: &str) -> Result<Option<Repository>> {
    let row = sqlx::query(&format!("{} WHERE url = ?", SELECT_COLUMNS))
        .bind(url)
        .fetch_optional(pool)
        .await?;

    row.map(|r| row_to_repository(&r)).transpose()
}

/// Find a repository by id
pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Repository>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(|r| row_to_repository(&r)).transpose()
}

/// List all repositories, newest first
pub async fn list_repositories(pool: &SqlitePool) -> Result<Vec<Repository>> {
    let rows = sqlx::query(&format!("{} ORDER BY date_added DESC", SELECT_COLUMNS))
        .fetch_all(pool)
        .await?;

    rows.iter().map(row_to_repository).collect()
}

fn row_to_repository(row: &SqliteRow) -> Result<Repository> {
    let id: String = row.get("id");
    let date_added: String = row.get("date_added");
    let last_updated: String = row.get("last_updated");

    Ok(Repository {
        id: parse_uuid(&id)?,
        url: row.get("url"),
        name: row.get("name"),
        owner: row.get("owner"),
        description: row.get("description"),
        path: row.get("path"),
        date_added: parse_timestamp(&date_added)?,
        last_updated: parse_timestamp(&last_updated)?,
    })
}

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::Internal(format!("Invalid id {}: {}", value, e)))
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid timestamp {}: {}", value, e)))
}
