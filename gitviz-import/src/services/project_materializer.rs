//! Project Materializer
//!
//! Groups the repositories a job imported (or reused) into projects once
//! every chunk has settled. Failures are logged and absorbed; a job never
//! fails because a project could not be written.

use chrono::NaiveDate;
use tracing::{info, warn};

use super::scheduler::ImportLedger;
use crate::db::RepositoryStore;
use crate::models::{CreatedProject, NewProject, ProjectCreationMode};

/// `{owner}` label for a multi-owner project
///
/// "a", "a - b", or "a - b and N others".
pub fn owner_label(owners: &[String]) -> String {
    match owners {
        [] => String::new(),
        [only] => only.clone(),
        [first, second] => format!("{} - {}", first, second),
        [first, second, rest @ ..] => {
            format!("{} - {} and {} others", first, second, rest.len())
        }
    }
}

/// Substitute `{owner}` and `{date}` (YYYY-MM-DD) in a name template
pub fn render_name(template: &str, owner: &str, date: NaiveDate) -> String {
    let template = if template.trim().is_empty() {
        crate::config::DEFAULT_PROJECT_NAME_TEMPLATE
    } else {
        template
    };
    template
        .replace("{owner}", owner)
        .replace("{date}", &date.format("%Y-%m-%d").to_string())
}

/// Create projects for `mode`; owners are visited in input order
pub async fn materialize(
    store: &dyn RepositoryStore,
    mode: ProjectCreationMode,
    template: &str,
    owners: &[String],
    ledger: &ImportLedger,
    date: NaiveDate,
) -> Vec<CreatedProject> {
    let plans: Vec<NewProject> = match mode {
        ProjectCreationMode::None => Vec::new(),
        ProjectCreationMode::Single => {
            if ledger.overall.is_empty() {
                Vec::new()
            } else {
                vec![NewProject {
                    name: render_name(template, &owner_label(owners), date),
                    description: format!(
                        "Project created from bulk import containing {} repositories",
                        ledger.overall.len()
                    ),
                    repository_ids: ledger.overall.clone(),
                }]
            }
        }
        ProjectCreationMode::PerOwner => owners
            .iter()
            .filter_map(|owner| {
                let ids = ledger.per_owner.get(owner).filter(|ids| !ids.is_empty())?;
                Some(NewProject {
                    name: render_name(template, owner, date),
                    description: format!(
                        "Project created from bulk import for {} containing {} repositories",
                        owner,
                        ids.len()
                    ),
                    repository_ids: ids.clone(),
                })
            })
            .collect(),
    };

    let mut created = Vec::with_capacity(plans.len());
    for plan in plans {
        let name = plan.name.clone();
        match store.insert_project(plan).await {
            Ok(project) => {
                info!(
                    project_id = %project.id,
                    name = %project.name,
                    repositories = project.repository_ids.len(),
                    "Created project"
                );
                created.push(CreatedProject {
                    id: project.id,
                    name: project.name,
                    repository_count: project.repository_ids.len(),
                });
            }
            Err(e) => warn!(name = %name, error = %e, "Failed to create project"),
        }
    }

    created
}
