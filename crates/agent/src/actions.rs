//! Action execution
//!
//! The function-calling branch: pick the CRUD function for the classified
//! intent, extract parameters with the fast model, resolve natural-language
//! references to ids, dispatch to the entity services, and reindex the
//! affected document before the response leaves the pipeline.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value as JsonValue};

use task_agent_config::constants::{actions as tuning, generation};
use task_agent_core::{
    EntityKind, Error, Result, RetrievedDoc, SourceCitation, TaskStatus, Turn, UserRole,
};
use task_agent_entities::{
    CreateProjectDto, CreateTaskDto, CreateTeamDto, CreateUserDto, EntityGateway,
    UpdateProjectDto, UpdateTaskDto, UpdateTeamDto, UpdateUserDto,
};
use task_agent_indexer::Indexer;
use task_agent_llm::{CompletionOptions, LlmBackend};
use task_agent_rag::{SearchFilter, Searcher};

use crate::generator::Generator;
use crate::intent::{Classification, QueryType};
use crate::resolver::EntityResolver;
use crate::response::FunctionCall;

/// CRUD operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Create,
    Update,
    Delete,
}

impl ActionKind {
    fn from_query_type(query_type: QueryType) -> Option<Self> {
        match query_type {
            QueryType::Create => Some(ActionKind::Create),
            QueryType::Update => Some(ActionKind::Update),
            QueryType::Delete => Some(ActionKind::Delete),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Create => "create",
            ActionKind::Update => "update",
            ActionKind::Delete => "delete",
        }
    }
}

/// One parameter of a recognised function
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub required: bool,
    pub description: &'static str,
}

const fn param(name: &'static str, required: bool, description: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        required,
        description,
    }
}

/// A recognised CRUD function
#[derive(Debug, Clone, Copy)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub action: ActionKind,
    pub entity: EntityKind,
    pub params: &'static [ParamSpec],
}

/// The fixed set of recognised functions.
pub static FUNCTIONS: &[FunctionSpec] = &[
    FunctionSpec {
        name: "create_task",
        action: ActionKind::Create,
        entity: EntityKind::Task,
        params: &[
            param("title", true, "task title"),
            param("description", false, "task description"),
            param("assignedTo", false, "assignee name or id"),
            param("status", false, "todo, in_progress or done"),
            param("deadline", false, "deadline date (YYYY-MM-DD)"),
        ],
    },
    FunctionSpec {
        name: "update_task",
        action: ActionKind::Update,
        entity: EntityKind::Task,
        params: &[
            param("taskId", true, "task name or id"),
            param("title", false, "new title"),
            param("description", false, "new description"),
            param("status", false, "todo, in_progress or done"),
            param("assignedTo", false, "new assignee name or id"),
            param("deadline", false, "new deadline (YYYY-MM-DD)"),
        ],
    },
    FunctionSpec {
        name: "delete_task",
        action: ActionKind::Delete,
        entity: EntityKind::Task,
        params: &[param("taskId", true, "task name or id")],
    },
    FunctionSpec {
        name: "create_user",
        action: ActionKind::Create,
        entity: EntityKind::User,
        params: &[
            param("name", true, "user name"),
            param("email", true, "email address"),
            param("password", true, "password, at least 6 characters"),
            param("role", false, "admin or member"),
            param("teamId", false, "team name or id"),
        ],
    },
    FunctionSpec {
        name: "update_user",
        action: ActionKind::Update,
        entity: EntityKind::User,
        params: &[
            param("userId", true, "user name or id"),
            param("name", false, "new name"),
            param("email", false, "new email"),
            param("password", false, "new password"),
            param("role", false, "admin or member"),
            param("teamId", false, "new team name or id"),
        ],
    },
    FunctionSpec {
        name: "delete_user",
        action: ActionKind::Delete,
        entity: EntityKind::User,
        params: &[param("userId", true, "user name or id")],
    },
    FunctionSpec {
        name: "create_team",
        action: ActionKind::Create,
        entity: EntityKind::Team,
        params: &[
            param("name", true, "team name"),
            param("projectId", true, "project name or id"),
            param("ownerId", true, "owner name or id"),
        ],
    },
    FunctionSpec {
        name: "update_team",
        action: ActionKind::Update,
        entity: EntityKind::Team,
        params: &[
            param("teamId", true, "team name or id"),
            param("name", false, "new name"),
            param("projectId", false, "new project name or id"),
            param("ownerId", false, "new owner name or id"),
        ],
    },
    FunctionSpec {
        name: "delete_team",
        action: ActionKind::Delete,
        entity: EntityKind::Team,
        params: &[param("teamId", true, "team name or id")],
    },
    FunctionSpec {
        name: "create_project",
        action: ActionKind::Create,
        entity: EntityKind::Project,
        params: &[
            param("name", true, "project name"),
            param("description", false, "project description"),
        ],
    },
    FunctionSpec {
        name: "update_project",
        action: ActionKind::Update,
        entity: EntityKind::Project,
        params: &[
            param("projectId", true, "project name or id"),
            param("name", false, "new name"),
            param("description", false, "new description"),
        ],
    },
    FunctionSpec {
        name: "delete_project",
        action: ActionKind::Delete,
        entity: EntityKind::Project,
        params: &[param("projectId", true, "project name or id")],
    },
];

/// Look up a function by name.
pub fn function_spec(name: &str) -> Option<&'static FunctionSpec> {
    FUNCTIONS.iter().find(|f| f.name == name)
}

/// The entity an intent operates on.
fn entity_for_intent(intent: &str, classification: &Classification) -> EntityKind {
    match intent {
        "user_management" | "user_info" => EntityKind::User,
        "team_management" | "team_info" => EntityKind::Team,
        "project_management" | "project_info" => EntityKind::Project,
        "task_management" | "task_info" => EntityKind::Task,
        _ => classification.primary_entity().unwrap_or(EntityKind::Task),
    }
}

/// Parameters that name another entity and must resolve to an id.
fn id_param_kind(name: &str) -> Option<EntityKind> {
    match name {
        "taskId" => Some(EntityKind::Task),
        "userId" | "assignedTo" | "ownerId" => Some(EntityKind::User),
        "teamId" => Some(EntityKind::Team),
        "projectId" => Some(EntityKind::Project),
        _ => None,
    }
}

/// Extract the first balanced JSON object from free-form LLM output.
/// String literals are honoured, so braces inside values don't truncate;
/// stray trailing braces after the balanced object are simply ignored.
pub fn first_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + offset + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Outcome of an action request
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub answer: String,
    pub sources: Vec<SourceCitation>,
    pub function_calls: Vec<FunctionCall>,
}

/// Function-calling executor
pub struct ActionExecutor {
    gateway: EntityGateway,
    searcher: Arc<Searcher>,
    resolver: Arc<EntityResolver>,
    indexer: Arc<Indexer>,
    generator: Arc<Generator>,
    llm: Arc<dyn LlmBackend>,
}

impl ActionExecutor {
    pub fn new(
        gateway: EntityGateway,
        searcher: Arc<Searcher>,
        resolver: Arc<EntityResolver>,
        indexer: Arc<Indexer>,
        generator: Arc<Generator>,
        llm: Arc<dyn LlmBackend>,
    ) -> Self {
        Self {
            gateway,
            searcher,
            resolver,
            indexer,
            generator,
            llm,
        }
    }

    /// Run the action branch for a classified write request.
    pub async fn execute(
        &self,
        query: &str,
        classification: &Classification,
        history: &[Turn],
        retrieved_docs: Vec<RetrievedDoc>,
    ) -> ActionOutcome {
        let Some(action) = ActionKind::from_query_type(classification.query_type) else {
            return ActionOutcome {
                answer: "I can only execute create, update or delete requests here.".to_string(),
                sources: Vec::new(),
                function_calls: Vec::new(),
            };
        };

        let intent = crate::intent::IntentClassifier::derive_intent(classification);
        let entity = entity_for_intent(&intent, classification);
        let function_name = format!("{}_{}", action.as_str(), entity.as_str());

        let Some(spec) = function_spec(&function_name) else {
            return ActionOutcome {
                answer: format!("I don't know how to {} a {}.", action.as_str(), entity),
                sources: Vec::new(),
                function_calls: Vec::new(),
            };
        };

        // Reference-resolution context: targeted per-kind retrieval when
        // the orchestrator didn't already search.
        let docs = if retrieved_docs.is_empty() {
            self.retrieve_reference_context(query, action, entity).await
        } else {
            retrieved_docs
        };
        let sources = doc_citations(&docs);

        // Parameter extraction.
        let mut arguments = match self.extract_parameters(query, spec, &docs, history).await {
            Ok(args) => args,
            Err(e) => {
                tracing::warn!(error = %e, function = spec.name, "parameter extraction failed");
                let answer = self
                    .generator
                    .render_error(query, &e.to_string(), &[])
                    .await;
                return ActionOutcome {
                    answer,
                    sources,
                    function_calls: Vec::new(),
                };
            }
        };

        // Required parameters must be present before anything touches the
        // store.
        if let Some(missing) = spec
            .params
            .iter()
            .find(|p| p.required && !has_value(&arguments, p.name))
        {
            return ActionOutcome {
                answer: format!(
                    "I'm missing the {} to {} this {}. Could you provide it?{}",
                    missing.name,
                    action.as_str(),
                    entity,
                    extracted_suffix(&arguments)
                ),
                sources,
                function_calls: Vec::new(),
            };
        }

        // Resolve id-bearing arguments.
        if let Err(unresolved) = self.resolve_id_arguments(&mut arguments).await {
            return ActionOutcome {
                answer: format!(
                    "I couldn't find {} \"{}\". Could you check the name?{}",
                    article_for(&unresolved.0),
                    unresolved.1,
                    extracted_suffix(&arguments)
                ),
                sources,
                function_calls: Vec::new(),
            };
        }

        normalize_status_argument(&mut arguments);

        let call = FunctionCall {
            name: spec.name.to_string(),
            arguments: arguments.clone(),
        };

        // Dispatch and reindex.
        match self.dispatch(spec, &arguments).await {
            Ok((message, affected_id)) => {
                self.reindex_after_write(action, entity, &affected_id).await;
                ActionOutcome {
                    answer: message,
                    sources,
                    function_calls: vec![call],
                }
            }
            Err(e) => {
                let extracted = argument_pairs(&arguments);
                let answer = match e.canned_message() {
                    Some(message) => format!("{}{}", message, extracted_suffix(&arguments)),
                    None => {
                        self.generator
                            .render_error(query, &e.to_string(), &extracted)
                            .await
                    }
                };
                ActionOutcome {
                    answer,
                    sources,
                    function_calls: vec![call],
                }
            }
        }
    }

    /// Per-kind vector search for the entities the function may refer to.
    /// Create and update always include the base entity and users, so
    /// assignment references can resolve.
    async fn retrieve_reference_context(
        &self,
        query: &str,
        action: ActionKind,
        entity: EntityKind,
    ) -> Vec<RetrievedDoc> {
        let mut kinds = vec![entity];
        if matches!(action, ActionKind::Create | ActionKind::Update)
            && !kinds.contains(&EntityKind::User)
        {
            kinds.push(EntityKind::User);
        }

        let searches = futures::future::join_all(kinds.into_iter().map(|kind| {
            let filter = SearchFilter::new().must("entity_type", kind.as_str());
            async move { self.searcher.vector_search(query, Some(filter)).await }
        }))
        .await;

        let mut docs = Vec::new();
        for result in searches {
            match result {
                Ok(mut hits) => {
                    hits.truncate(tuning::CONTEXT_TOP_K);
                    docs.extend(hits);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "reference retrieval failed for one entity kind");
                }
            }
        }
        docs
    }

    /// Ask the fast model for the function arguments.
    async fn extract_parameters(
        &self,
        query: &str,
        spec: &FunctionSpec,
        docs: &[RetrievedDoc],
        history: &[Turn],
    ) -> Result<Map<String, JsonValue>> {
        let prompt = extraction_prompt(query, spec, docs, history);
        let opts = CompletionOptions {
            model: Some(self.llm.fast_model().to_string()),
            temperature: Some(generation::EXTRACTION_TEMPERATURE),
            max_tokens: Some(300),
            ..CompletionOptions::default()
        };

        let raw = self
            .llm
            .complete(&prompt, &opts)
            .await
            .map_err(task_agent_core::Error::from)?;

        let json = first_json_object(&raw)
            .ok_or_else(|| Error::Validation("no JSON object in extraction output".to_string()))?;
        let parsed: JsonValue = serde_json::from_str(&json)
            .map_err(|e| Error::Validation(format!("malformed extraction JSON: {}", e)))?;

        let arguments = parsed
            .get("arguments")
            .and_then(JsonValue::as_object)
            .cloned()
            .ok_or_else(|| {
                Error::Validation("extraction output missing {name, arguments}".to_string())
            })?;

        Ok(arguments)
    }

    /// Resolve every id-bearing argument in place. Returns the offending
    /// (kind, reference) on failure.
    async fn resolve_id_arguments(
        &self,
        arguments: &mut Map<String, JsonValue>,
    ) -> std::result::Result<(), (EntityKind, String)> {
        let refs: Vec<(String, EntityKind, String)> = arguments
            .iter()
            .filter_map(|(key, value)| {
                let kind = id_param_kind(key)?;
                let reference = value.as_str()?.trim().to_string();
                if reference.is_empty() {
                    None
                } else {
                    Some((key.clone(), kind, reference))
                }
            })
            .collect();

        let resolutions = futures::future::join_all(
            refs.iter()
                .map(|(_, kind, reference)| self.resolver.resolve(*kind, reference)),
        )
        .await;

        for ((key, kind, reference), resolved) in refs.into_iter().zip(resolutions) {
            match resolved {
                Some(id) => {
                    arguments.insert(key, JsonValue::String(id));
                }
                None => return Err((kind, reference)),
            }
        }
        Ok(())
    }

    /// Dispatch to the matching entity service. Returns the success
    /// message and the affected entity id.
    async fn dispatch(
        &self,
        spec: &FunctionSpec,
        arguments: &Map<String, JsonValue>,
    ) -> Result<(String, String)> {
        let arg = |name: &str| -> Option<String> {
            arguments
                .get(name)
                .and_then(JsonValue::as_str)
                .map(|s| s.to_string())
        };
        let required = |name: &str| -> Result<String> {
            arg(name).ok_or_else(|| Error::Validation(format!("missing argument {}", name)))
        };

        match spec.name {
            "create_task" => {
                let dto = CreateTaskDto {
                    title: required("title")?,
                    description: arg("description"),
                    assigned_to: arg("assignedTo"),
                    status: arg("status").and_then(|s| TaskStatus::normalize(&s)),
                    deadline: parse_deadline(arg("deadline"))?,
                };
                let task = self.gateway.tasks.create(dto).await?;
                Ok((format!("Created task \"{}\".", task.title), task.id))
            }
            "update_task" => {
                let id = required("taskId")?;
                let patch = UpdateTaskDto {
                    title: arg("title"),
                    description: arg("description"),
                    status: arg("status").and_then(|s| TaskStatus::normalize(&s)),
                    assigned_to: arg("assignedTo"),
                    deadline: parse_deadline(arg("deadline"))?,
                };
                let task = self.gateway.tasks.update(&id, patch).await?;
                Ok((format!("Updated task \"{}\".", task.title), task.id))
            }
            "delete_task" => {
                let id = required("taskId")?;
                self.gateway.tasks.remove(&id).await?;
                Ok(("Deleted the task.".to_string(), id))
            }
            "create_user" => {
                let dto = CreateUserDto {
                    name: required("name")?,
                    email: required("email")?,
                    password: required("password")?,
                    role: arg("role").and_then(|r| UserRole::parse(&r)),
                    team_id: arg("teamId"),
                };
                let user = self.gateway.users.create(dto).await?;
                Ok((format!("Created user \"{}\".", user.name), user.id))
            }
            "update_user" => {
                let id = required("userId")?;
                let patch = UpdateUserDto {
                    name: arg("name"),
                    email: arg("email"),
                    password: arg("password"),
                    role: arg("role").and_then(|r| UserRole::parse(&r)),
                    team_id: arg("teamId"),
                };
                let user = self.gateway.users.update(&id, patch).await?;
                Ok((format!("Updated user \"{}\".", user.name), user.id))
            }
            "delete_user" => {
                let id = required("userId")?;
                self.gateway.users.remove(&id).await?;
                Ok(("Deleted the user.".to_string(), id))
            }
            "create_team" => {
                let dto = CreateTeamDto {
                    name: required("name")?,
                    project_id: required("projectId")?,
                    owner_id: required("ownerId")?,
                };
                let team = self.gateway.teams.create(dto).await?;
                Ok((format!("Created team \"{}\".", team.name), team.id))
            }
            "update_team" => {
                let id = required("teamId")?;
                let patch = UpdateTeamDto {
                    name: arg("name"),
                    project_id: arg("projectId"),
                    owner_id: arg("ownerId"),
                };
                let team = self.gateway.teams.update(&id, patch).await?;
                Ok((format!("Updated team \"{}\".", team.name), team.id))
            }
            "delete_team" => {
                let id = required("teamId")?;
                self.gateway.teams.remove(&id).await?;
                Ok(("Deleted the team.".to_string(), id))
            }
            "create_project" => {
                let dto = CreateProjectDto {
                    name: required("name")?,
                    description: arg("description"),
                };
                let project = self.gateway.projects.create(dto).await?;
                Ok((format!("Created project \"{}\".", project.name), project.id))
            }
            "update_project" => {
                let id = required("projectId")?;
                let patch = UpdateProjectDto {
                    name: arg("name"),
                    description: arg("description"),
                };
                let project = self.gateway.projects.update(&id, patch).await?;
                Ok((format!("Updated project \"{}\".", project.name), project.id))
            }
            "delete_project" => {
                let id = required("projectId")?;
                self.gateway.projects.remove(&id).await?;
                Ok(("Deleted the project.".to_string(), id))
            }
            other => Err(Error::Internal(format!("unrecognised function {}", other))),
        }
    }

    /// Post-commit reindex. The write already succeeded, so failures here
    /// are logged as stale documents rather than propagated.
    async fn reindex_after_write(&self, action: ActionKind, entity: EntityKind, id: &str) {
        let result = match action {
            ActionKind::Create => self.indexer.index(entity, id).await,
            ActionKind::Update => self.indexer.reindex(entity, id).await,
            ActionKind::Delete => self.indexer.delete(entity, id).await,
        };

        if let Err(e) = result {
            let stale = Error::IndexStale {
                kind: entity.as_str().to_string(),
                id: id.to_string(),
                reason: e.to_string(),
            };
            tracing::error!(error = %stale, "post-write reindex failed; document is stale");
        }
    }
}

/// Render the extraction prompt: function signature, retrieved entities
/// with their ids exposed, recent history and the query.
fn extraction_prompt(
    query: &str,
    spec: &FunctionSpec,
    docs: &[RetrievedDoc],
    history: &[Turn],
) -> String {
    let mut prompt = format!(
        "Extract the arguments for the function {} from the user's request.\n\nParameters:\n",
        spec.name
    );
    for p in spec.params {
        prompt.push_str(&format!(
            "- {} ({}): {}\n",
            p.name,
            if p.required { "required" } else { "optional" },
            p.description
        ));
    }

    if !docs.is_empty() {
        prompt.push_str("\nKnown entities:\n");
        for doc in docs {
            let name = doc
                .meta_str("assignee_name")
                .or_else(|| doc.meta_str("user_name"))
                .or_else(|| doc.meta_str("team_name"))
                .or_else(|| doc.meta_str("project_name"))
                .unwrap_or("");
            prompt.push_str(&format!(
                "- {}: id={}, name={}, {}\n",
                doc.entity_type,
                doc.entity_id,
                name,
                doc.text.chars().take(120).collect::<String>()
            ));
        }
    }

    if !history.is_empty() {
        let recent: Vec<Turn> = history
            .iter()
            .rev()
            .take(tuning::EXTRACTION_HISTORY_TURNS)
            .rev()
            .cloned()
            .collect();
        prompt.push_str("\nRecent conversation:\n");
        prompt.push_str(&task_agent_core::format_transcript(&recent));
    }

    prompt.push_str(&format!(
        "\nRequest: {}\n\nRespond with JSON only: {{\"name\": \"{}\", \"arguments\": {{...}}}}. \
         Omit parameters the user did not mention.",
        query, spec.name
    ));
    prompt
}

fn has_value(arguments: &Map<String, JsonValue>, name: &str) -> bool {
    arguments
        .get(name)
        .is_some_and(|v| !v.is_null() && v.as_str().map_or(true, |s| !s.trim().is_empty()))
}

/// Normalise a free-form status argument in place; unknown values are
/// dropped so the entity keeps its default.
fn normalize_status_argument(arguments: &mut Map<String, JsonValue>) {
    let Some(raw) = arguments.get("status").and_then(JsonValue::as_str) else {
        return;
    };
    match TaskStatus::normalize(raw) {
        Some(status) => {
            arguments.insert("status".into(), JsonValue::String(status.as_str().into()));
        }
        None => {
            arguments.remove("status");
        }
    }
}

/// Accept RFC-3339 timestamps or plain dates for deadline arguments.
fn parse_deadline(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = value else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let dt = date
            .and_hms_opt(23, 59, 59)
            .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc));
        return Ok(dt);
    }

    Err(Error::Validation(format!(
        "could not parse deadline \"{}\"; use YYYY-MM-DD",
        raw
    )))
}

/// Sorted `key="value"` pairs for error echoes.
fn argument_pairs(arguments: &Map<String, JsonValue>) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = arguments
        .iter()
        .map(|(k, v)| {
            let rendered = match v {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), rendered)
        })
        .collect();
    pairs.sort();
    pairs
}

/// The bracketed echo that lets the next turn continue the flow.
fn extracted_suffix(arguments: &Map<String, JsonValue>) -> String {
    if arguments.is_empty() {
        return String::new();
    }
    let rendered: Vec<String> = argument_pairs(arguments)
        .into_iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, v))
        .collect();
    format!(" [Extracted so far: {}]", rendered.join(", "))
}

fn article_for(kind: &EntityKind) -> String {
    format!("a {}", kind)
}

/// Citations for the reference-retrieval documents.
fn doc_citations(docs: &[RetrievedDoc]) -> Vec<SourceCitation> {
    docs.iter()
        .enumerate()
        .map(|(i, doc)| SourceCitation {
            entity_type: doc.entity_type,
            entity_id: doc.entity_id.clone(),
            text: doc.text.chars().take(200).collect::<String>() + "...",
            score: doc.score,
            citation: format!("[{}]", i + 1),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_json_object_trims_trailing_braces() {
        let raw = r#"Here you go: {"name": "create_task", "arguments": {"title": "Fix Login"}}}}"#;
        let json = first_json_object(raw).unwrap();
        assert_eq!(
            json,
            r#"{"name": "create_task", "arguments": {"title": "Fix Login"}}"#
        );
        assert!(serde_json::from_str::<JsonValue>(&json).is_ok());
    }

    #[test]
    fn test_first_json_object_honours_strings() {
        let raw = r#"{"name": "create_task", "arguments": {"title": "a } in a string"}}"#;
        let json = first_json_object(raw).unwrap();
        let parsed: JsonValue = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["arguments"]["title"], "a } in a string");
    }

    #[test]
    fn test_first_json_object_none_without_object() {
        assert!(first_json_object("no json here").is_none());
        assert!(first_json_object("{unterminated").is_none());
    }

    #[test]
    fn test_function_table_covers_all_combinations() {
        for action in ["create", "update", "delete"] {
            for entity in ["task", "user", "team", "project"] {
                let name = format!("{}_{}", action, entity);
                assert!(function_spec(&name).is_some(), "missing {}", name);
            }
        }
        assert!(function_spec("drop_table").is_none());
    }

    #[test]
    fn test_status_normalisation_in_arguments() {
        let mut args = Map::new();
        args.insert("status".into(), JsonValue::String("In Progress".into()));
        normalize_status_argument(&mut args);
        assert_eq!(args["status"], "in_progress");

        let mut args = Map::new();
        args.insert("status".into(), JsonValue::String("blocked".into()));
        normalize_status_argument(&mut args);
        assert!(!args.contains_key("status"));
    }

    #[test]
    fn test_parse_deadline_formats() {
        assert!(parse_deadline(None).unwrap().is_none());
        assert!(parse_deadline(Some("2025-07-01".into())).unwrap().is_some());
        assert!(parse_deadline(Some("2025-07-01T10:00:00Z".into()))
            .unwrap()
            .is_some());
        assert!(parse_deadline(Some("next tuesday".into())).is_err());
    }

    #[test]
    fn test_extracted_suffix_is_sorted_and_quoted() {
        let mut args = Map::new();
        args.insert("title".into(), JsonValue::String("Fix Login".into()));
        args.insert("assignedTo".into(), JsonValue::String("U1".into()));
        let suffix = extracted_suffix(&args);
        assert_eq!(
            suffix,
            " [Extracted so far: assignedTo=\"U1\", title=\"Fix Login\"]"
        );
        assert_eq!(extracted_suffix(&Map::new()), "");
    }

    #[test]
    fn test_extraction_prompt_exposes_ids() {
        let doc = RetrievedDoc {
            id: "1".into(),
            score: 0.9,
            score_kind: task_agent_core::ScoreKind::Dense,
            text: "User: Youssef Mohamed (y@x.io), role member.".into(),
            entity_type: EntityKind::User,
            entity_id: "U1".into(),
            metadata: [(
                "user_name".to_string(),
                JsonValue::String("Youssef Mohamed".into()),
            )]
            .into_iter()
            .collect(),
        };
        let spec = function_spec("create_task").unwrap();
        let prompt = extraction_prompt("assign it to Youssef", spec, &[doc], &[]);
        assert!(prompt.contains("id=U1"));
        assert!(prompt.contains("name=Youssef Mohamed"));
        assert!(prompt.contains("- title (required)"));
    }
}
