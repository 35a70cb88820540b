//! HTTP client for the entity services
//!
//! One client serves all four entity kinds against a REST collaborator:
//! `POST /tasks`, `GET /tasks/:id`, `GET /tasks?page=&limit=&search=`,
//! `PATCH /tasks/:id`, `DELETE /tasks/:id`, and likewise for users, teams
//! and projects. Status codes map onto the shared error sum type.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use task_agent_core::{
    Error, Project, ProjectSnapshot, Result, Task, TaskSnapshot, Team, TeamSnapshot, User,
    UserSnapshot,
};

use crate::dto::{
    CreateProjectDto, CreateTaskDto, CreateTeamDto, CreateUserDto, Page, UpdateProjectDto,
    UpdateTaskDto, UpdateTeamDto, UpdateUserDto,
};
use crate::services::{ProjectService, TaskService, TeamService, UserService};

/// HTTP entity client configuration
#[derive(Debug, Clone)]
pub struct EntityClientConfig {
    /// Service base URL
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for EntityClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// REST client for the external entity services
pub struct HttpEntityClient {
    client: Client,
    config: EntityClientConfig,
}

impl HttpEntityClient {
    pub fn new(config: EntityClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Internal(format!("http client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn send<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        kind: &str,
        id: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let mut request = self.client.request(method, self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(format!("{} service", kind))
            } else {
                Error::Upstream(format!("{} service: {}", kind, e))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| Error::Upstream(format!("{} service response: {}", kind, e)));
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => Error::not_found(kind, id),
            StatusCode::CONFLICT => Error::Conflict(body),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Error::Validation(body),
            _ => Error::Upstream(format!("{} service: {} {}", kind, status, body)),
        })
    }

    /// DELETE with no response body expected.
    async fn delete(&self, path: &str, kind: &str, id: &str) -> Result<()> {
        let response = self.client.delete(self.url(path)).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(format!("{} service", kind))
            } else {
                Error::Upstream(format!("{} service: {}", kind, e))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => Error::not_found(kind, id),
            StatusCode::CONFLICT => Error::Conflict(body),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Error::Validation(body),
            _ => Error::Upstream(format!("{} service: {} {}", kind, status, body)),
        })
    }

    async fn list<T: DeserializeOwned>(
        &self,
        resource: &str,
        kind: &str,
        page: usize,
        limit: usize,
        search: Option<&str>,
    ) -> Result<Page<T>> {
        let mut path = format!("/{}?page={}&limit={}", resource, page, limit);
        if let Some(search) = search {
            path.push_str("&search=");
            path.push_str(&urlencode(search));
        }
        self.send::<(), Page<T>>(Method::GET, &path, kind, "", None)
            .await
    }
}

/// Minimal query-string escaping for the search parameter.
fn urlencode(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' | '~' => c.to_string(),
            ' ' => "+".to_string(),
            other => {
                let mut buf = [0u8; 4];
                other
                    .encode_utf8(&mut buf)
                    .bytes()
                    .map(|b| format!("%{:02X}", b))
                    .collect()
            }
        })
        .collect()
}

#[async_trait]
impl UserService for HttpEntityClient {
    async fn create(&self, dto: CreateUserDto) -> Result<User> {
        self.send(Method::POST, "/users", "user", "", Some(&dto))
            .await
    }

    async fn find_one(&self, id: &str) -> Result<UserSnapshot> {
        self.send::<(), _>(Method::GET, &format!("/users/{}", id), "user", id, None)
            .await
    }

    async fn find_all(
        &self,
        page: usize,
        limit: usize,
        search: Option<&str>,
    ) -> Result<Page<User>> {
        self.list("users", "user", page, limit, search).await
    }

    async fn update(&self, id: &str, patch: UpdateUserDto) -> Result<User> {
        self.send(
            Method::PATCH,
            &format!("/users/{}", id),
            "user",
            id,
            Some(&patch),
        )
        .await
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.delete(&format!("/users/{}", id), "user", id).await
    }
}

#[async_trait]
impl TeamService for HttpEntityClient {
    async fn create(&self, dto: CreateTeamDto) -> Result<Team> {
        self.send(Method::POST, "/teams", "team", "", Some(&dto))
            .await
    }

    async fn find_one(&self, id: &str) -> Result<TeamSnapshot> {
        self.send::<(), _>(Method::GET, &format!("/teams/{}", id), "team", id, None)
            .await
    }

    async fn find_all(
        &self,
        page: usize,
        limit: usize,
        search: Option<&str>,
    ) -> Result<Page<Team>> {
        self.list("teams", "team", page, limit, search).await
    }

    async fn update(&self, id: &str, patch: UpdateTeamDto) -> Result<Team> {
        self.send(
            Method::PATCH,
            &format!("/teams/{}", id),
            "team",
            id,
            Some(&patch),
        )
        .await
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.delete(&format!("/teams/{}", id), "team", id).await
    }
}

#[async_trait]
impl ProjectService for HttpEntityClient {
    async fn create(&self, dto: CreateProjectDto) -> Result<Project> {
        self.send(Method::POST, "/projects", "project", "", Some(&dto))
            .await
    }

    async fn find_one(&self, id: &str) -> Result<ProjectSnapshot> {
        self.send::<(), _>(
            Method::GET,
            &format!("/projects/{}", id),
            "project",
            id,
            None,
        )
        .await
    }

    async fn find_all(
        &self,
        page: usize,
        limit: usize,
        search: Option<&str>,
    ) -> Result<Page<Project>> {
        self.list("projects", "project", page, limit, search).await
    }

    async fn update(&self, id: &str, patch: UpdateProjectDto) -> Result<Project> {
        self.send(
            Method::PATCH,
            &format!("/projects/{}", id),
            "project",
            id,
            Some(&patch),
        )
        .await
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.delete(&format!("/projects/{}", id), "project", id).await
    }
}

#[async_trait]
impl TaskService for HttpEntityClient {
    async fn create(&self, dto: CreateTaskDto) -> Result<Task> {
        self.send(Method::POST, "/tasks", "task", "", Some(&dto))
            .await
    }

    async fn find_one(&self, id: &str) -> Result<TaskSnapshot> {
        self.send::<(), _>(Method::GET, &format!("/tasks/{}", id), "task", id, None)
            .await
    }

    async fn find_all(
        &self,
        page: usize,
        limit: usize,
        search: Option<&str>,
    ) -> Result<Page<Task>> {
        self.list("tasks", "task", page, limit, search).await
    }

    async fn update(&self, id: &str, patch: UpdateTaskDto) -> Result<Task> {
        self.send(
            Method::PATCH,
            &format!("/tasks/{}", id),
            "task",
            id,
            Some(&patch),
        )
        .await
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.delete(&format!("/tasks/{}", id), "task", id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urlencode() {
        assert_eq!(urlencode("Fix Login"), "Fix+Login");
        assert_eq!(urlencode("a&b"), "a%26b");
        assert_eq!(urlencode("plain"), "plain");
    }
}
