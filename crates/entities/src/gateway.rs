//! Entity gateway
//!
//! Bundles the four service handles behind one struct so consumers take a
//! single dependency, and adds the kind-dispatched helpers the resolver
//! and indexer need.

use std::sync::Arc;

use task_agent_core::{EntityKind, Error, Result};

use crate::dto::Page;
use crate::memory::InMemoryEntityStore;
use crate::services::{ProjectService, TaskService, TeamService, UserService};

/// Aggregate counts across the relational entities
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityCounts {
    pub users: usize,
    pub teams: usize,
    pub projects: usize,
    pub tasks: usize,
}

/// Handles to the four entity services
#[derive(Clone)]
pub struct EntityGateway {
    pub users: Arc<dyn UserService>,
    pub teams: Arc<dyn TeamService>,
    pub projects: Arc<dyn ProjectService>,
    pub tasks: Arc<dyn TaskService>,
}

impl EntityGateway {
    pub fn new(
        users: Arc<dyn UserService>,
        teams: Arc<dyn TeamService>,
        projects: Arc<dyn ProjectService>,
        tasks: Arc<dyn TaskService>,
    ) -> Self {
        Self {
            users,
            teams,
            projects,
            tasks,
        }
    }

    /// All four services backed by one in-memory store.
    pub fn in_memory(store: Arc<InMemoryEntityStore>) -> Self {
        Self {
            users: store.clone(),
            teams: store.clone(),
            projects: store.clone(),
            tasks: store,
        }
    }

    /// List `(id, canonical name)` pairs for one entity kind.
    pub async fn list_names(
        &self,
        kind: EntityKind,
        page: usize,
        limit: usize,
    ) -> Result<Vec<(String, String)>> {
        Ok(match kind {
            EntityKind::User => pairs(self.users.find_all(page, limit, None).await?, |u| {
                (u.id, u.name)
            }),
            EntityKind::Team => pairs(self.teams.find_all(page, limit, None).await?, |t| {
                (t.id, t.name)
            }),
            EntityKind::Project => pairs(self.projects.find_all(page, limit, None).await?, |p| {
                (p.id, p.name)
            }),
            EntityKind::Task => pairs(self.tasks.find_all(page, limit, None).await?, |t| {
                (t.id, t.title)
            }),
            other => {
                return Err(Error::Validation(format!(
                    "{} is not a listable entity kind",
                    other
                )))
            }
        })
    }

    /// Check an id exists for the given kind.
    pub async fn exists(&self, kind: EntityKind, id: &str) -> Result<bool> {
        let result = match kind {
            EntityKind::User => self.users.find_one(id).await.map(|_| ()),
            EntityKind::Team => self.teams.find_one(id).await.map(|_| ()),
            EntityKind::Project => self.projects.find_one(id).await.map(|_| ()),
            EntityKind::Task => self.tasks.find_one(id).await.map(|_| ()),
            other => {
                return Err(Error::Validation(format!(
                    "{} is not a relational entity kind",
                    other
                )))
            }
        };
        match result {
            Ok(()) => Ok(true),
            Err(Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Totals for the statistics document. Uses single-item listings; the
    /// services return the full count alongside any page.
    pub async fn counts(&self) -> Result<EntityCounts> {
        let (users, teams, projects, tasks) = tokio::try_join!(
            self.users.find_all(1, 1, None),
            self.teams.find_all(1, 1, None),
            self.projects.find_all(1, 1, None),
            self.tasks.find_all(1, 1, None),
        )?;

        Ok(EntityCounts {
            users: users.total,
            teams: teams.total,
            projects: projects.total,
            tasks: tasks.total,
        })
    }
}

fn pairs<T, F: Fn(T) -> (String, String)>(page: Page<T>, f: F) -> Vec<(String, String)> {
    page.data.into_iter().map(f).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::CreateProjectDto;

    #[tokio::test]
    async fn test_list_names_and_counts() {
        let store = Arc::new(InMemoryEntityStore::new());
        let gateway = EntityGateway::in_memory(store);

        gateway
            .projects
            .create(CreateProjectDto {
                name: "Infra".into(),
                description: None,
            })
            .await
            .unwrap();

        let names = gateway
            .list_names(EntityKind::Project, 1, 1000)
            .await
            .unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].1, "Infra");

        let counts = gateway.counts().await.unwrap();
        assert_eq!(counts.projects, 1);
        assert_eq!(counts.tasks, 0);
    }

    #[tokio::test]
    async fn test_exists_maps_not_found() {
        let store = Arc::new(InMemoryEntityStore::new());
        let gateway = EntityGateway::in_memory(store);
        assert!(!gateway.exists(EntityKind::User, "nope").await.unwrap());
    }
}
