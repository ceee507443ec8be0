//! Settings database operations
//!
//! Key-value accessors over the settings table.

use gitviz_common::{Error, Result};
use sqlx::{Pool, Sqlite};

const GITHUB_TOKEN_KEY: &str = "github_token";

/// Get GitHub API token from database
///
/// **Returns:** Some(token) if set, None otherwise
pub async fn get_github_token(db: &Pool<Sqlite>) -> Result<Option<String>> {
    get_setting::<String>(db, GITHUB_TOKEN_KEY).await
}

/// Set GitHub API token in database
pub async fn set_github_token(db: &Pool<Sqlite>, token: String) -> Result<()> {
    set_setting(db, GITHUB_TOKEN_KEY, token).await
}

/// Generic setting getter
async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match value {
        Some(s) => s
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("Invalid setting {}: {}", key, e))),
        None => Ok(None),
    }
}

/// Generic setting setter
async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        r#"
        INSERT INTO settings (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;

    Ok(())
}
