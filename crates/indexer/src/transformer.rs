//! Document transformer
//!
//! Pure functions from entity snapshots to the searchable document shape:
//! sentence-oriented text naming the entity and its relations, plus the
//! flat metadata the filter layer matches on. Secrets are redacted before
//! anything reaches the index.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value as JsonValue};

use task_agent_core::{
    ProjectSnapshot, TaskSnapshot, TaskStatus, TeamSnapshot, UserSnapshot,
};

/// Relation members listed by name before switching to a count
const MAX_LISTED: usize = 5;

/// Deadlines within this many days read as urgent
const URGENT_WINDOW_DAYS: i64 = 3;

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(password|token|api[-_]?key|secret)\b(\s*[:=]?\s*)(\S+)")
        .expect("secret pattern is valid")
});

/// Transformed document content
#[derive(Debug, Clone)]
pub struct EntityDocument {
    /// Sentence-oriented searchable text
    pub text: String,
    /// Flat scalar attributes for filtering
    pub metadata: HashMap<String, JsonValue>,
    /// Indexed relationship ids
    pub relationships: HashMap<String, String>,
    /// Entity creation time
    pub created_at: DateTime<Utc>,
    /// Entity update time
    pub updated_at: DateTime<Utc>,
}

/// Replace secret-looking values with a redaction marker.
pub fn sanitize(text: &str) -> String {
    SECRET_PATTERN.replace_all(text, "$1$2[REDACTED]").to_string()
}

/// Render a relation list: up to [`MAX_LISTED`] names, then
/// `"plus K more (T total <label>s)"`.
fn list_with_overflow(names: &[String], label: &str) -> String {
    let total = names.len();
    if total <= MAX_LISTED {
        names.join(", ")
    } else {
        format!(
            "{} plus {} more ({} total {}s)",
            names[..MAX_LISTED].join(", "),
            total - MAX_LISTED,
            total,
            label
        )
    }
}

/// Deadline phrase for task text.
fn deadline_phrase(days: i64) -> String {
    if days < 0 {
        format!("Overdue by {} days", -days)
    } else if days == 0 {
        "Due today".to_string()
    } else if days <= URGENT_WINDOW_DAYS {
        format!("Due in {} days (urgent)", days)
    } else {
        format!("Due in {} days", days)
    }
}

/// Transform a task snapshot.
pub fn transform_task(snapshot: &TaskSnapshot, now: DateTime<Utc>) -> EntityDocument {
    let task = &snapshot.task;
    let mut sentences = vec![format!("Task: {}.", task.title)];

    if let Some(ref description) = task.description {
        sentences.push(format!("Description: {}.", description));
    }
    sentences.push(format!("Status: {}.", task.status.human()));

    if let Some(ref assignee) = snapshot.assignee {
        sentences.push(format!("Assigned to {}.", assignee.name));
    } else {
        sentences.push("Unassigned.".to_string());
    }
    if let Some(ref team) = snapshot.team {
        sentences.push(format!("Team: {}.", team.name));
    }
    if let Some(ref project) = snapshot.project {
        sentences.push(format!("Project: {}.", project.name));
    }

    let days = task.days_until_deadline(now);
    if let Some(days) = days {
        sentences.push(format!("{}.", deadline_phrase(days)));
    }

    let open = task.status != TaskStatus::Done;
    let is_overdue = open && days.is_some_and(|d| d < 0);
    let is_urgent = open && days.is_some_and(|d| (0..=URGENT_WINDOW_DAYS).contains(&d));

    let mut metadata = HashMap::new();
    metadata.insert("task_status".into(), json!(task.status.as_str()));
    metadata.insert("is_overdue".into(), json!(is_overdue));
    metadata.insert("is_urgent".into(), json!(is_urgent));
    metadata.insert("days_until_deadline".into(), json!(days));
    metadata.insert(
        "assignee_name".into(),
        json!(snapshot.assignee.as_ref().map(|u| u.name.clone())),
    );
    metadata.insert(
        "team_name".into(),
        json!(snapshot.team.as_ref().map(|t| t.name.clone())),
    );
    metadata.insert(
        "project_name".into(),
        json!(snapshot.project.as_ref().map(|p| p.name.clone())),
    );

    let mut relationships = HashMap::new();
    if let Some(ref team) = snapshot.team {
        relationships.insert("team_id".into(), team.id.clone());
    }
    if let Some(ref project) = snapshot.project {
        relationships.insert("project_id".into(), project.id.clone());
    }
    if let Some(ref assigned_to) = task.assigned_to {
        relationships.insert("assigned_to".into(), assigned_to.clone());
    }

    EntityDocument {
        text: sanitize(&sentences.join(" ")),
        metadata,
        relationships,
        created_at: task.created_at,
        updated_at: task.updated_at,
    }
}

/// Transform a user snapshot.
pub fn transform_user(snapshot: &UserSnapshot) -> EntityDocument {
    let user = &snapshot.user;
    let mut sentences = vec![format!(
        "User: {} ({}), role {}.",
        user.name,
        user.email,
        user.role.as_str()
    )];

    if let Some(ref team) = snapshot.team {
        sentences.push(format!("Member of team {}.", team.name));
    }

    let total = snapshot.tasks.len();
    if total > 0 {
        let todo = count_status(snapshot, TaskStatus::Todo);
        let in_progress = count_status(snapshot, TaskStatus::InProgress);
        let done = count_status(snapshot, TaskStatus::Done);
        sentences.push(format!(
            "Has {} assigned tasks: {} to do, {} in progress, {} done.",
            total, todo, in_progress, done
        ));

        let titles: Vec<String> = snapshot.tasks.iter().map(|t| t.title.clone()).collect();
        sentences.push(format!("Tasks: {}.", list_with_overflow(&titles, "task")));
    } else {
        sentences.push("Has no assigned tasks.".to_string());
    }

    let mut metadata = HashMap::new();
    metadata.insert("user_name".into(), json!(user.name));
    metadata.insert("user_email".into(), json!(user.email));
    metadata.insert("user_role".into(), json!(user.role.as_str()));
    metadata.insert(
        "team_name".into(),
        json!(snapshot.team.as_ref().map(|t| t.name.clone())),
    );
    metadata.insert("tasks_count".into(), json!(total));

    let mut relationships = HashMap::new();
    if let Some(ref team_id) = user.team_id {
        relationships.insert("team_id".into(), team_id.clone());
    }

    EntityDocument {
        text: sanitize(&sentences.join(" ")),
        metadata,
        relationships,
        created_at: user.created_at,
        updated_at: user.updated_at,
    }
}

fn count_status(snapshot: &UserSnapshot, status: TaskStatus) -> usize {
    snapshot.tasks.iter().filter(|t| t.status == status).count()
}

/// Transform a team snapshot.
pub fn transform_team(snapshot: &TeamSnapshot) -> EntityDocument {
    let team = &snapshot.team;
    let mut sentences = vec![format!("Team: {}.", team.name)];

    if let Some(ref owner) = snapshot.owner {
        sentences.push(format!("Owned by {}.", owner.name));
    }
    if let Some(ref project) = snapshot.project {
        sentences.push(format!("Works on project {}.", project.name));
    }

    let members_count = snapshot.members.len();
    if members_count > 0 {
        let names: Vec<String> = snapshot.members.iter().map(|m| m.name.clone()).collect();
        sentences.push(format!("Members: {}.", list_with_overflow(&names, "member")));
    } else {
        sentences.push("Has no members yet.".to_string());
    }

    let mut metadata = HashMap::new();
    metadata.insert("team_name".into(), json!(team.name));
    metadata.insert(
        "owner_name".into(),
        json!(snapshot.owner.as_ref().map(|o| o.name.clone())),
    );
    metadata.insert(
        "project_name".into(),
        json!(snapshot.project.as_ref().map(|p| p.name.clone())),
    );
    metadata.insert("members_count".into(), json!(members_count));

    let mut relationships = HashMap::new();
    if let Some(ref project_id) = team.project_id {
        relationships.insert("project_id".into(), project_id.clone());
    }

    EntityDocument {
        text: sanitize(&sentences.join(" ")),
        metadata,
        relationships,
        created_at: team.created_at,
        updated_at: team.updated_at,
    }
}

/// Transform a project snapshot.
pub fn transform_project(snapshot: &ProjectSnapshot) -> EntityDocument {
    let project = &snapshot.project;
    let mut sentences = vec![format!("Project: {}.", project.name)];

    if let Some(ref description) = project.description {
        sentences.push(format!("Description: {}.", description));
    }

    let teams_count = snapshot.teams.len();
    if teams_count > 0 {
        let names: Vec<String> = snapshot.teams.iter().map(|t| t.name.clone()).collect();
        sentences.push(format!("Teams: {}.", list_with_overflow(&names, "team")));
    }
    sentences.push(format!(
        "Has {} members across {} teams.",
        snapshot.total_members, teams_count
    ));

    let mut metadata = HashMap::new();
    metadata.insert("project_name".into(), json!(project.name));
    metadata.insert("teams_count".into(), json!(teams_count));
    metadata.insert("total_members".into(), json!(snapshot.total_members));

    EntityDocument {
        text: sanitize(&sentences.join(" ")),
        metadata,
        relationships: HashMap::new(),
        created_at: project.created_at,
        updated_at: project.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use task_agent_core::{Task, Team, User, UserRole};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap()
    }

    fn user(id: &str, name: &str) -> User {
        User {
            id: id.into(),
            name: name.into(),
            email: format!("{}@example.com", id),
            role: UserRole::Member,
            team_id: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn task(title: &str, status: TaskStatus, deadline_days: Option<i64>) -> Task {
        Task {
            id: "K1".into(),
            title: title.into(),
            description: None,
            status,
            assigned_to: Some("U1".into()),
            deadline: deadline_days.map(|d| now() + chrono::Duration::days(d)),
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn test_deadline_phrases() {
        assert_eq!(deadline_phrase(-3), "Overdue by 3 days");
        assert_eq!(deadline_phrase(0), "Due today");
        assert_eq!(deadline_phrase(2), "Due in 2 days (urgent)");
        assert_eq!(deadline_phrase(7), "Due in 7 days");
    }

    #[test]
    fn test_task_document_overdue() {
        let snapshot = TaskSnapshot {
            task: task("Database Optimization", TaskStatus::InProgress, Some(-4)),
            assignee: Some(user("U1", "Youssef Mohamed")),
            team: Some(Team {
                id: "T1".into(),
                name: "Backend Team".into(),
                owner_id: "U1".into(),
                project_id: Some("P1".into()),
                created_at: now(),
                updated_at: now(),
            }),
            project: None,
        };

        let doc = transform_task(&snapshot, now());
        assert!(doc.text.starts_with("Task: Database Optimization."));
        assert!(doc.text.contains("Status: In Progress."));
        assert!(doc.text.contains("Overdue by 4 days"));
        assert_eq!(doc.metadata["is_overdue"], json!(true));
        assert_eq!(doc.metadata["is_urgent"], json!(false));
        assert_eq!(doc.metadata["assignee_name"], json!("Youssef Mohamed"));
        assert_eq!(doc.relationships["team_id"], "T1");
        assert_eq!(doc.relationships["assigned_to"], "U1");
    }

    #[test]
    fn test_done_task_is_not_overdue() {
        let snapshot = TaskSnapshot {
            task: task("Old Task", TaskStatus::Done, Some(-10)),
            assignee: None,
            team: None,
            project: None,
        };
        let doc = transform_task(&snapshot, now());
        assert_eq!(doc.metadata["is_overdue"], json!(false));
        assert_eq!(doc.metadata["task_status"], json!("done"));
    }

    #[test]
    fn test_user_document_breakdown() {
        let snapshot = UserSnapshot {
            user: user("U1", "Youssef Mohamed"),
            team: None,
            tasks: vec![
                task("A", TaskStatus::Todo, None),
                task("B", TaskStatus::InProgress, None),
                task("C", TaskStatus::Done, None),
            ],
        };
        let doc = transform_user(&snapshot);
        assert!(doc
            .text
            .contains("Has 3 assigned tasks: 1 to do, 1 in progress, 1 done."));
        assert_eq!(doc.metadata["tasks_count"], json!(3));
    }

    #[test]
    fn test_list_overflow() {
        let names: Vec<String> = (1..=8).map(|i| format!("Member {}", i)).collect();
        let rendered = list_with_overflow(&names, "member");
        assert!(rendered.ends_with("plus 3 more (8 total members)"));
    }

    #[test]
    fn test_sanitize_redacts_secrets() {
        let text = "Deploy notes: password: hunter22 and api_key=abc123 shipped";
        let clean = sanitize(text);
        assert!(clean.contains("password: [REDACTED]"));
        assert!(clean.contains("api_key=[REDACTED]"));
        assert!(!clean.contains("hunter22"));
        assert!(!clean.contains("abc123"));
    }
}
