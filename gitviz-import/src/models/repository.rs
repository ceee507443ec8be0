//! Repository and project records held by the store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Imported repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: Uuid,
    pub url: String,
    pub name: String,
    pub owner: String,
    pub description: String,
    /// Local checkout directory
    pub path: String,
    pub date_added: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Insert payload for a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRepository {
    pub url: String,
    pub name: String,
    pub owner: String,
    pub description: Option<String>,
    pub path: String,
}

impl NewRepository {
    pub fn into_repository(self) -> Repository {
        let now = Utc::now();
        let description = self
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("Repository from {}", self.url));
        Repository {
            id: Uuid::new_v4(),
            url: self.url,
            name: self.name,
            owner: self.owner,
            description,
            path: self.path,
            date_added: now,
            last_updated: now,
        }
    }
}

/// Named group of repositories rendered together downstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub repository_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProject {
    pub name: String,
    pub description: String,
    pub repository_ids: Vec<Uuid>,
}

impl NewProject {
    pub fn into_project(self) -> Project {
        Project {
            id: Uuid::new_v4(),
            name: self.name,
            description: self.description,
            repository_ids: self.repository_ids,
            created_at: Utc::now(),
        }
    }
}
