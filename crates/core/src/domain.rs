//! Domain entities
//!
//! The four entity kinds owned by the external CRUD services, plus the
//! eagerly-joined snapshot shapes the indexer consumes. Wire names follow
//! the upstream services' camelCase convention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entity kinds known to the vector index.
///
/// `SystemInfo` and `Statistics` are synthetic document kinds produced by
/// the indexer; they never appear in the relational store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Team,
    Project,
    Task,
    SystemInfo,
    Statistics,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Team => "team",
            EntityKind::Project => "project",
            EntityKind::Task => "task",
            EntityKind::SystemInfo => "system_info",
            EntityKind::Statistics => "statistics",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "user" | "users" => Some(EntityKind::User),
            "team" | "teams" => Some(EntityKind::Team),
            "project" | "projects" => Some(EntityKind::Project),
            "task" | "tasks" => Some(EntityKind::Task),
            "system_info" => Some(EntityKind::SystemInfo),
            "statistics" => Some(EntityKind::Statistics),
            _ => None,
        }
    }

    /// The relational entity kinds, in indexing order.
    pub fn relational() -> [EntityKind; 4] {
        [
            EntityKind::User,
            EntityKind::Team,
            EntityKind::Project,
            EntityKind::Task,
        ]
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    #[default]
    Member,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Some(UserRole::Admin),
            "member" => Some(UserRole::Member),
            _ => None,
        }
    }
}

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
        }
    }

    /// Human-readable label for document text
    pub fn human(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "To Do",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Done => "Done",
        }
    }

    /// Normalise a free-form status string.
    ///
    /// Accepts the canonical values plus the common variants the LLM
    /// produces (`"To Do"`, `"inprogress"`, `"completed"`), case- and
    /// whitespace-insensitively. Unknown values return `None` so callers
    /// can keep their default.
    pub fn normalize(s: &str) -> Option<Self> {
        let folded = s.trim().to_lowercase().replace([' ', '-'], "_");
        match folded.as_str() {
            "todo" | "to_do" => Some(TaskStatus::Todo),
            "in_progress" | "inprogress" => Some(TaskStatus::InProgress),
            "done" | "completed" => Some(TaskStatus::Done),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub team_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Team entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Project entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Task entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Days until the deadline, negative when overdue. `None` without one.
    pub fn days_until_deadline(&self, now: DateTime<Utc>) -> Option<i64> {
        self.deadline
            .map(|d| (d.date_naive() - now.date_naive()).num_days())
    }
}

/// User with its eagerly-joined relations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    #[serde(flatten)]
    pub user: User,
    #[serde(default)]
    pub team: Option<Team>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// Team with owner, project and members
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSnapshot {
    #[serde(flatten)]
    pub team: Team,
    #[serde(default)]
    pub owner: Option<User>,
    #[serde(default)]
    pub project: Option<Project>,
    #[serde(default)]
    pub members: Vec<User>,
}

/// Project with its teams and aggregate member count
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSnapshot {
    #[serde(flatten)]
    pub project: Project,
    #[serde(default)]
    pub teams: Vec<Team>,
    #[serde(default)]
    pub total_members: usize,
}

/// Task with assignee, team and project context
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    #[serde(flatten)]
    pub task: Task,
    #[serde(default)]
    pub assignee: Option<User>,
    #[serde(default)]
    pub team: Option<Team>,
    #[serde(default)]
    pub project: Option<Project>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_normalize() {
        assert_eq!(TaskStatus::normalize("In Progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::normalize(" inprogress "), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::normalize("TO DO"), Some(TaskStatus::Todo));
        assert_eq!(TaskStatus::normalize("completed"), Some(TaskStatus::Done));
        assert_eq!(TaskStatus::normalize("blocked"), None);
    }

    #[test]
    fn test_entity_kind_parse() {
        assert_eq!(EntityKind::parse("Tasks"), Some(EntityKind::Task));
        assert_eq!(EntityKind::parse("system_info"), Some(EntityKind::SystemInfo));
        assert_eq!(EntityKind::parse("widget"), None);
    }

    #[test]
    fn test_days_until_deadline() {
        let now = Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap();
        let task = Task {
            id: "t1".into(),
            title: "x".into(),
            description: None,
            status: TaskStatus::Todo,
            assigned_to: None,
            deadline: Some(Utc.with_ymd_and_hms(2025, 6, 7, 23, 0, 0).unwrap()),
            created_at: now,
            updated_at: now,
        };
        assert_eq!(task.days_until_deadline(now), Some(-3));
    }
}
