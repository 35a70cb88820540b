//! Entity service traits
//!
//! The pipeline's view of the external CRUD services. `find_one` returns
//! the entity with its eagerly-joined relations (the shape the indexer
//! transforms); `find_all` returns plain entities for listing and name
//! resolution.

use async_trait::async_trait;

use task_agent_core::{
    Project, ProjectSnapshot, Result, Task, TaskSnapshot, Team, TeamSnapshot, User, UserSnapshot,
};

use crate::dto::{
    CreateProjectDto, CreateTaskDto, CreateTeamDto, CreateUserDto, Page, UpdateProjectDto,
    UpdateTaskDto, UpdateTeamDto, UpdateUserDto,
};

#[async_trait]
pub trait UserService: Send + Sync {
    async fn create(&self, dto: CreateUserDto) -> Result<User>;
    async fn find_one(&self, id: &str) -> Result<UserSnapshot>;
    async fn find_all(&self, page: usize, limit: usize, search: Option<&str>)
        -> Result<Page<User>>;
    async fn update(&self, id: &str, patch: UpdateUserDto) -> Result<User>;
    async fn remove(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait TeamService: Send + Sync {
    async fn create(&self, dto: CreateTeamDto) -> Result<Team>;
    async fn find_one(&self, id: &str) -> Result<TeamSnapshot>;
    async fn find_all(&self, page: usize, limit: usize, search: Option<&str>)
        -> Result<Page<Team>>;
    async fn update(&self, id: &str, patch: UpdateTeamDto) -> Result<Team>;
    async fn remove(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait ProjectService: Send + Sync {
    async fn create(&self, dto: CreateProjectDto) -> Result<Project>;
    async fn find_one(&self, id: &str) -> Result<ProjectSnapshot>;
    async fn find_all(
        &self,
        page: usize,
        limit: usize,
        search: Option<&str>,
    ) -> Result<Page<Project>>;
    async fn update(&self, id: &str, patch: UpdateProjectDto) -> Result<Project>;
    async fn remove(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait TaskService: Send + Sync {
    async fn create(&self, dto: CreateTaskDto) -> Result<Task>;
    async fn find_one(&self, id: &str) -> Result<TaskSnapshot>;
    async fn find_all(&self, page: usize, limit: usize, search: Option<&str>)
        -> Result<Page<Task>>;
    async fn update(&self, id: &str, patch: UpdateTaskDto) -> Result<Task>;
    async fn remove(&self, id: &str) -> Result<()>;
}
