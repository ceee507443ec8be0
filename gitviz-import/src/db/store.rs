//! Repository store seam
//!
//! The import pipeline only talks to [`RepositoryStore`]; the SQLite
//! implementation lives here and tests substitute in-memory or failing
//! stores.

use async_trait::async_trait;
use gitviz_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{projects, repositories};
use crate::models::{NewProject, NewRepository, Project, Repository};

/// Persistent collection of repositories and projects
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    async fn find_by_url(&self, url: &str) -> Result<Option<Repository>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Repository>>;

    /// Insert a new repository; duplicate URLs are rejected
    async fn insert(&self, repository: NewRepository) -> Result<Repository>;

    async fn list(&self) -> Result<Vec<Repository>>;

    async fn insert_project(&self, project: NewProject) -> Result<Project>;

    async fn list_projects(&self) -> Result<Vec<Project>>;
}

/// SQLite-backed store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RepositoryStore for SqliteStore {
    async fn find_by_url(&self, url: &str) -> Result<Option<Repository>> {
        repositories::find_by_url(&self.pool, url).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Repository>> {
        repositories::find_by_id(&self.pool, id).await
    }

    async fn insert(&self, repository: NewRepository) -> Result<Repository> {
        let repository = repository.into_repository();
        repositories::insert_repository(&self.pool, &repository).await?;
        Ok(repository)
    }

    async fn list(&self) -> Result<Vec<Repository>> {
        repositories::list_repositories(&self.pool).await
    }

    async fn insert_project(&self, project: NewProject) -> Result<Project> {
        let project = project.into_project();
        projects::insert_project(&self.pool, &project).await?;
        Ok(project)
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        projects::list_projects(&self.pool).await
    }
}
