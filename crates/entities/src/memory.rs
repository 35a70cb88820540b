//! In-memory entity store
//!
//! Implements the four service traits against process-local maps, with the
//! same semantic constraints the real services enforce (email uniqueness,
//! password length, unknown ids). Used by tests and local development.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use task_agent_core::{
    Error, Project, ProjectSnapshot, Result, Task, TaskSnapshot, Team, TeamSnapshot, User,
    UserSnapshot,
};

use crate::dto::{
    CreateProjectDto, CreateTaskDto, CreateTeamDto, CreateUserDto, Page, UpdateProjectDto,
    UpdateTaskDto, UpdateTeamDto, UpdateUserDto,
};
use crate::services::{ProjectService, TaskService, TeamService, UserService};

const MIN_PASSWORD_LEN: usize = 6;

/// Process-local entity store
#[derive(Default)]
pub struct InMemoryEntityStore {
    users: RwLock<HashMap<String, User>>,
    teams: RwLock<HashMap<String, Team>>,
    projects: RwLock<HashMap<String, Project>>,
    tasks: RwLock<HashMap<String, Task>>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with a prebuilt entity, keeping its id. Test fixture helper.
    pub fn insert_user(&self, user: User) {
        self.users.write().insert(user.id.clone(), user);
    }

    pub fn insert_team(&self, team: Team) {
        self.teams.write().insert(team.id.clone(), team);
    }

    pub fn insert_project(&self, project: Project) {
        self.projects.write().insert(project.id.clone(), project);
    }

    pub fn insert_task(&self, task: Task) {
        self.tasks.write().insert(task.id.clone(), task);
    }

    fn paginate<T: Clone>(mut items: Vec<T>, page: usize, limit: usize) -> Page<T> {
        let total = items.len();
        let page = page.max(1);
        let limit = limit.max(1);
        let total_pages = total.div_ceil(limit);
        let start = (page - 1) * limit;

        let data = if start >= total {
            Vec::new()
        } else {
            items.drain(start..total.min(start + limit)).collect()
        };

        Page {
            data,
            total,
            page,
            limit,
            total_pages,
        }
    }

    fn matches(search: Option<&str>, haystack: &str) -> bool {
        match search {
            Some(needle) => haystack.to_lowercase().contains(&needle.to_lowercase()),
            None => true,
        }
    }
}

#[async_trait]
impl UserService for InMemoryEntityStore {
    async fn create(&self, dto: CreateUserDto) -> Result<User> {
        if dto.password.len() < MIN_PASSWORD_LEN {
            return Err(Error::Validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let mut users = self.users.write();
        if users.values().any(|u| u.email == dto.email) {
            return Err(Error::Conflict(format!(
                "email {} is already in use",
                dto.email
            )));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            name: dto.name,
            email: dto.email,
            role: dto.role.unwrap_or_default(),
            team_id: dto.team_id,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn find_one(&self, id: &str) -> Result<UserSnapshot> {
        let user = self
            .users
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("user", id))?;

        let team = user
            .team_id
            .as_ref()
            .and_then(|tid| self.teams.read().get(tid).cloned());

        let tasks = self
            .tasks
            .read()
            .values()
            .filter(|t| t.assigned_to.as_deref() == Some(id))
            .cloned()
            .collect();

        Ok(UserSnapshot { user, team, tasks })
    }

    async fn find_all(
        &self,
        page: usize,
        limit: usize,
        search: Option<&str>,
    ) -> Result<Page<User>> {
        let mut users: Vec<User> = self
            .users
            .read()
            .values()
            .filter(|u| Self::matches(search, &u.name))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self::paginate(users, page, limit))
    }

    async fn update(&self, id: &str, patch: UpdateUserDto) -> Result<User> {
        if let Some(ref password) = patch.password {
            if password.len() < MIN_PASSWORD_LEN {
                return Err(Error::Validation(format!(
                    "password must be at least {} characters",
                    MIN_PASSWORD_LEN
                )));
            }
        }

        let mut users = self.users.write();
        if let Some(ref email) = patch.email {
            if users.values().any(|u| u.email == *email && u.id != id) {
                return Err(Error::Conflict(format!("email {} is already in use", email)));
            }
        }

        let user = users
            .get_mut(id)
            .ok_or_else(|| Error::not_found("user", id))?;

        if let Some(name) = patch.name {
            user.name = name;
        }
        if let Some(email) = patch.email {
            user.email = email;
        }
        if let Some(role) = patch.role {
            user.role = role;
        }
        if let Some(team_id) = patch.team_id {
            user.team_id = Some(team_id);
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.users
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("user", id))
    }
}

#[async_trait]
impl TeamService for InMemoryEntityStore {
    async fn create(&self, dto: CreateTeamDto) -> Result<Team> {
        let now = Utc::now();
        let team = Team {
            id: Uuid::new_v4().to_string(),
            name: dto.name,
            owner_id: dto.owner_id,
            project_id: Some(dto.project_id),
            created_at: now,
            updated_at: now,
        };
        self.teams.write().insert(team.id.clone(), team.clone());
        Ok(team)
    }

    async fn find_one(&self, id: &str) -> Result<TeamSnapshot> {
        let team = self
            .teams
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("team", id))?;

        let owner = self.users.read().get(&team.owner_id).cloned();
        let project = team
            .project_id
            .as_ref()
            .and_then(|pid| self.projects.read().get(pid).cloned());
        let members = self
            .users
            .read()
            .values()
            .filter(|u| u.team_id.as_deref() == Some(id))
            .cloned()
            .collect();

        Ok(TeamSnapshot {
            team,
            owner,
            project,
            members,
        })
    }

    async fn find_all(
        &self,
        page: usize,
        limit: usize,
        search: Option<&str>,
    ) -> Result<Page<Team>> {
        let mut teams: Vec<Team> = self
            .teams
            .read()
            .values()
            .filter(|t| Self::matches(search, &t.name))
            .cloned()
            .collect();
        teams.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self::paginate(teams, page, limit))
    }

    async fn update(&self, id: &str, patch: UpdateTeamDto) -> Result<Team> {
        let mut teams = self.teams.write();
        let team = teams
            .get_mut(id)
            .ok_or_else(|| Error::not_found("team", id))?;

        if let Some(name) = patch.name {
            team.name = name;
        }
        if let Some(project_id) = patch.project_id {
            team.project_id = Some(project_id);
        }
        if let Some(owner_id) = patch.owner_id {
            team.owner_id = owner_id;
        }
        team.updated_at = Utc::now();
        Ok(team.clone())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.teams
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("team", id))
    }
}

#[async_trait]
impl ProjectService for InMemoryEntityStore {
    async fn create(&self, dto: CreateProjectDto) -> Result<Project> {
        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4().to_string(),
            name: dto.name,
            description: dto.description,
            created_at: now,
            updated_at: now,
        };
        self.projects
            .write()
            .insert(project.id.clone(), project.clone());
        Ok(project)
    }

    async fn find_one(&self, id: &str) -> Result<ProjectSnapshot> {
        let project = self
            .projects
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("project", id))?;

        let teams: Vec<Team> = self
            .teams
            .read()
            .values()
            .filter(|t| t.project_id.as_deref() == Some(id))
            .cloned()
            .collect();

        let team_ids: Vec<&str> = teams.iter().map(|t| t.id.as_str()).collect();
        let total_members = self
            .users
            .read()
            .values()
            .filter(|u| u.team_id.as_deref().is_some_and(|tid| team_ids.contains(&tid)))
            .count();

        Ok(ProjectSnapshot {
            project,
            teams,
            total_members,
        })
    }

    async fn find_all(
        &self,
        page: usize,
        limit: usize,
        search: Option<&str>,
    ) -> Result<Page<Project>> {
        let mut projects: Vec<Project> = self
            .projects
            .read()
            .values()
            .filter(|p| Self::matches(search, &p.name))
            .cloned()
            .collect();
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self::paginate(projects, page, limit))
    }

    async fn update(&self, id: &str, patch: UpdateProjectDto) -> Result<Project> {
        let mut projects = self.projects.write();
        let project = projects
            .get_mut(id)
            .ok_or_else(|| Error::not_found("project", id))?;

        if let Some(name) = patch.name {
            project.name = name;
        }
        if let Some(description) = patch.description {
            project.description = Some(description);
        }
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.projects
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("project", id))
    }
}

#[async_trait]
impl TaskService for InMemoryEntityStore {
    async fn create(&self, dto: CreateTaskDto) -> Result<Task> {
        if let Some(ref assignee) = dto.assigned_to {
            if !self.users.read().contains_key(assignee) {
                return Err(Error::not_found("user", assignee));
            }
        }

        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4().to_string(),
            title: dto.title,
            description: dto.description,
            status: dto.status.unwrap_or_default(),
            assigned_to: dto.assigned_to,
            deadline: dto.deadline,
            created_at: now,
            updated_at: now,
        };
        self.tasks.write().insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn find_one(&self, id: &str) -> Result<TaskSnapshot> {
        let task = self
            .tasks
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("task", id))?;

        let assignee = task
            .assigned_to
            .as_ref()
            .and_then(|uid| self.users.read().get(uid).cloned());
        let team = assignee
            .as_ref()
            .and_then(|u| u.team_id.as_ref())
            .and_then(|tid| self.teams.read().get(tid).cloned());
        let project = team
            .as_ref()
            .and_then(|t| t.project_id.as_ref())
            .and_then(|pid| self.projects.read().get(pid).cloned());

        Ok(TaskSnapshot {
            task,
            assignee,
            team,
            project,
        })
    }

    async fn find_all(
        &self,
        page: usize,
        limit: usize,
        search: Option<&str>,
    ) -> Result<Page<Task>> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .values()
            .filter(|t| Self::matches(search, &t.title))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(Self::paginate(tasks, page, limit))
    }

    async fn update(&self, id: &str, patch: UpdateTaskDto) -> Result<Task> {
        if let Some(ref assignee) = patch.assigned_to {
            if !self.users.read().contains_key(assignee) {
                return Err(Error::not_found("user", assignee));
            }
        }

        let mut tasks = self.tasks.write();
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| Error::not_found("task", id))?;

        if let Some(title) = patch.title {
            task.title = title;
        }
        if let Some(description) = patch.description {
            task.description = Some(description);
        }
        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(assigned_to) = patch.assigned_to {
            task.assigned_to = Some(assigned_to);
        }
        if let Some(deadline) = patch.deadline {
            task.deadline = Some(deadline);
        }
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.tasks
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("task", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_dto(name: &str, email: &str) -> CreateUserDto {
        CreateUserDto {
            name: name.to_string(),
            email: email.to_string(),
            password: "secret123".to_string(),
            role: None,
            team_id: None,
        }
    }

    #[tokio::test]
    async fn test_email_uniqueness() {
        let store = InMemoryEntityStore::new();
        UserService::create(&store, user_dto("A", "a@x.io"))
            .await
            .unwrap();
        let err = UserService::create(&store, user_dto("B", "a@x.io"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_password_minimum_length() {
        let store = InMemoryEntityStore::new();
        let mut dto = user_dto("A", "a@x.io");
        dto.password = "short".to_string();
        let err = UserService::create(&store, dto).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let store = InMemoryEntityStore::new();
        let err = TaskService::find_one(&store, "missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_pagination_totals() {
        let store = InMemoryEntityStore::new();
        for i in 0..7 {
            UserService::create(&store, user_dto(&format!("User {}", i), &format!("u{}@x.io", i)))
                .await
                .unwrap();
        }
        let page = UserService::find_all(&store, 2, 3, None).await.unwrap();
        assert_eq!(page.total, 7);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.data.len(), 3);

        let all = UserService::find_all(&store, 1, 1000, None).await.unwrap();
        assert_eq!(all.data.len(), 7);
    }

    #[tokio::test]
    async fn test_task_snapshot_joins_chain() {
        let store = InMemoryEntityStore::new();
        let project = ProjectService::create(
            &store,
            CreateProjectDto {
                name: "Infra".into(),
                description: None,
            },
        )
        .await
        .unwrap();
        let owner = UserService::create(&store, user_dto("Owner", "o@x.io"))
            .await
            .unwrap();
        let team = TeamService::create(
            &store,
            CreateTeamDto {
                name: "Backend Team".into(),
                project_id: project.id.clone(),
                owner_id: owner.id.clone(),
            },
        )
        .await
        .unwrap();
        UserService::update(
            &store,
            &owner.id,
            UpdateUserDto {
                team_id: Some(team.id.clone()),
                ..UpdateUserDto::default()
            },
        )
        .await
        .unwrap();

        let task = TaskService::create(
            &store,
            CreateTaskDto {
                title: "Database Optimization".into(),
                description: None,
                assigned_to: Some(owner.id.clone()),
                status: None,
                deadline: None,
            },
        )
        .await
        .unwrap();

        let snapshot = TaskService::find_one(&store, &task.id).await.unwrap();
        assert_eq!(snapshot.assignee.unwrap().id, owner.id);
        assert_eq!(snapshot.team.unwrap().id, team.id);
        assert_eq!(snapshot.project.unwrap().id, project.id);
    }
}
