//! Vector store client (Qdrant)
//!
//! Owns the collection lifecycle (creation, payload indices, deletion) and
//! the point operations the pipeline needs: upsert, filtered search,
//! filtered scroll without vectors, and delete. Transport failures are
//! retried with exponential backoff; invalid-argument style errors are
//! surfaced immediately.

use std::collections::HashMap;
use std::time::Duration;

use qdrant_client::qdrant::{
    value::Kind, Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    DeletePointsBuilder, Distance, FieldCondition, FieldType, Filter, HnswConfigDiffBuilder,
    Match, OptimizersConfigDiffBuilder, PointId, PointStruct, PointsIdsList, ScrollPointsBuilder,
    SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant, QdrantError};
use serde_json::Value as JsonValue;

use task_agent_config::constants::vector_store as vs;

use crate::RagError;

/// Payload fields indexed at collection creation
const KEYWORD_INDICES: &[&str] = &[
    "entity_type",
    "relationships.team_id",
    "relationships.project_id",
    "relationships.assigned_to",
];

const DATETIME_INDICES: &[&str] = &["created_at", "updated_at"];

/// Vector store configuration
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    /// Qdrant endpoint URL
    pub endpoint: String,
    /// Collection name
    pub collection: String,
    /// Vector dimension
    pub vector_dim: usize,
    /// API key (optional)
    pub api_key: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:6334".to_string(),
            collection: "task_manager".to_string(),
            vector_dim: task_agent_config::constants::embedding::DIM,
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Equality predicate value
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Keyword(String),
    Flag(bool),
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Keyword(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        FilterValue::Keyword(s)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        FilterValue::Flag(b)
    }
}

/// Filter expression: `must` conditions AND together, `should` conditions
/// OR together. Both lists are forwarded to the store; neither is dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    pub must: Vec<(String, FilterValue)>,
    pub should: Vec<(String, FilterValue)>,
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(mut self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.must.push((field.into(), value.into()));
        self
    }

    pub fn should(mut self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.should.push((field.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.should.is_empty()
    }

    fn condition(field: &str, value: &FilterValue) -> Condition {
        let match_value = match value {
            FilterValue::Keyword(s) => {
                qdrant_client::qdrant::r#match::MatchValue::Keyword(s.clone())
            }
            FilterValue::Flag(b) => qdrant_client::qdrant::r#match::MatchValue::Boolean(*b),
        };
        Condition {
            condition_one_of: Some(qdrant_client::qdrant::condition::ConditionOneOf::Field(
                FieldCondition {
                    key: field.to_string(),
                    r#match: Some(Match {
                        match_value: Some(match_value),
                    }),
                    ..Default::default()
                },
            )),
        }
    }

    fn into_qdrant(self) -> Filter {
        let must: Vec<Condition> = self.must.iter().map(|(f, v)| Self::condition(f, v)).collect();
        let should: Vec<Condition> =
            self.should.iter().map(|(f, v)| Self::condition(f, v)).collect();

        // With `must` present the store treats top-level `should` as a
        // scoring hint only, so the OR group nests as one mandatory
        // sub-filter to keep its semantics binding.
        if !must.is_empty() && !should.is_empty() {
            let mut conditions = must;
            conditions.push(Condition {
                condition_one_of: Some(qdrant_client::qdrant::condition::ConditionOneOf::Filter(
                    Filter {
                        should,
                        ..Default::default()
                    },
                )),
            });
            return Filter {
                must: conditions,
                ..Default::default()
            };
        }

        Filter {
            must,
            should,
            ..Default::default()
        }
    }
}

/// A scored point from search
#[derive(Debug, Clone)]
pub struct VectorHit {
    /// Point id rendered as a string
    pub id: String,
    /// Similarity score (absent for scroll results)
    pub score: f32,
    /// Full payload as JSON
    pub payload: HashMap<String, JsonValue>,
}

/// Collection info
#[derive(Debug, Clone)]
pub struct CollectionInfo {
    pub name: String,
    pub points_count: u64,
}

/// Qdrant-backed vector store
pub struct VectorStore {
    client: Qdrant,
    config: VectorStoreConfig,
}

impl VectorStore {
    /// Connect to Qdrant.
    pub fn new(config: VectorStoreConfig) -> Result<Self, RagError> {
        let mut builder = Qdrant::from_url(&config.endpoint).timeout(config.timeout);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    /// Create the collection and its payload indices if absent.
    pub async fn ensure_collection(&self) -> Result<(), RagError> {
        let exists = self
            .client
            .collection_exists(&self.config.collection)
            .await
            .map_err(store_err)?;

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.config.collection)
                        .vectors_config(VectorParamsBuilder::new(
                            self.config.vector_dim as u64,
                            Distance::Cosine,
                        ))
                        .hnsw_config(
                            HnswConfigDiffBuilder::default()
                                .m(vs::HNSW_M)
                                .ef_construct(vs::HNSW_EF_CONSTRUCT),
                        )
                        .optimizers_config(
                            OptimizersConfigDiffBuilder::default()
                                .indexing_threshold(vs::INDEXING_THRESHOLD),
                        ),
                )
                .await
                .map_err(store_err)?;

            tracing::info!(
                collection = %self.config.collection,
                dim = self.config.vector_dim,
                "created vector collection"
            );
        }

        self.ensure_payload_indices().await
    }

    /// Create the payload indices needed by filter expressions. Safe to
    /// call repeatedly; existing indices are accepted.
    pub async fn ensure_payload_indices(&self) -> Result<(), RagError> {
        for field in KEYWORD_INDICES {
            self.create_index(field, FieldType::Keyword).await?;
        }
        for field in DATETIME_INDICES {
            self.create_index(field, FieldType::Datetime).await?;
        }
        Ok(())
    }

    async fn create_index(&self, field: &str, field_type: FieldType) -> Result<(), RagError> {
        let result = self
            .client
            .create_field_index(CreateFieldIndexCollectionBuilder::new(
                &self.config.collection,
                field,
                field_type,
            ))
            .await;

        match result {
            Ok(_) => Ok(()),
            // An index that already exists is fine.
            Err(e) if !is_retryable(&e) => {
                tracing::debug!(field, error = %e, "payload index already present or rejected");
                Ok(())
            }
            Err(e) => Err(store_err(e)),
        }
    }

    /// Upsert one point.
    pub async fn upsert(
        &self,
        id: u32,
        vector: Vec<f32>,
        payload: JsonValue,
    ) -> Result<(), RagError> {
        let payload = Payload::try_from(payload)
            .map_err(|e| RagError::VectorStore(format!("payload must be an object: {}", e)))?;
        let point = PointStruct::new(id as u64, vector, payload);

        self.with_retry("upsert", || {
            let points = vec![point.clone()];
            async {
                self.client
                    .upsert_points(UpsertPointsBuilder::new(&self.config.collection, points))
                    .await
                    .map(|_| ())
            }
        })
        .await
    }

    /// Nearest-neighbour search.
    pub async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<SearchFilter>,
    ) -> Result<Vec<VectorHit>, RagError> {
        let qdrant_filter = filter.filter(|f| !f.is_empty()).map(SearchFilter::into_qdrant);

        let response = self
            .with_retry("search", || {
                let mut builder = SearchPointsBuilder::new(
                    &self.config.collection,
                    vector.to_vec(),
                    limit as u64,
                )
                .with_payload(true);
                if let Some(f) = qdrant_filter.clone() {
                    builder = builder.filter(f);
                }
                async { self.client.search_points(builder).await }
            })
            .await?;

        Ok(response
            .result
            .into_iter()
            .map(|point| VectorHit {
                id: point_id_string(point.id),
                score: point.score,
                payload: payload_to_json(point.payload),
            })
            .collect())
    }

    /// Fetch up to `limit` points matching the filter, without vectors.
    pub async fn scroll(
        &self,
        filter: Option<SearchFilter>,
        limit: usize,
    ) -> Result<Vec<VectorHit>, RagError> {
        let qdrant_filter = filter.filter(|f| !f.is_empty()).map(SearchFilter::into_qdrant);

        let response = self
            .with_retry("scroll", || {
                let mut builder = ScrollPointsBuilder::new(&self.config.collection)
                    .limit(limit as u32)
                    .with_payload(true)
                    .with_vectors(false);
                if let Some(f) = qdrant_filter.clone() {
                    builder = builder.filter(f);
                }
                async { self.client.scroll(builder).await }
            })
            .await?;

        Ok(response
            .result
            .into_iter()
            .map(|point| VectorHit {
                id: point_id_string(point.id),
                score: 0.0,
                payload: payload_to_json(point.payload),
            })
            .collect())
    }

    /// Delete one point by id. Deleting an absent point succeeds.
    pub async fn delete(&self, id: u32) -> Result<(), RagError> {
        self.with_retry("delete", || async {
            self.client
                .delete_points(
                    DeletePointsBuilder::new(&self.config.collection).points(PointsIdsList {
                        ids: vec![PointId::from(id as u64)],
                    }),
                )
                .await
                .map(|_| ())
        })
        .await
    }

    /// Drop the whole collection.
    pub async fn delete_collection(&self) -> Result<(), RagError> {
        self.client
            .delete_collection(&self.config.collection)
            .await
            .map(|_| ())
            .map_err(store_err)
    }

    /// Collection point count.
    pub async fn collection_info(&self) -> Result<CollectionInfo, RagError> {
        let info = self
            .client
            .collection_info(&self.config.collection)
            .await
            .map_err(store_err)?;

        Ok(CollectionInfo {
            name: self.config.collection.clone(),
            points_count: info
                .result
                .and_then(|r| r.points_count)
                .unwrap_or_default(),
        })
    }

    /// Run `call` with exponential backoff on transport failures.
    async fn with_retry<T, F, Fut>(&self, what: &str, mut call: F) -> Result<T, RagError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, QdrantError>>,
    {
        let mut backoff = Duration::from_millis(vs::INITIAL_BACKOFF_MS);
        let mut last_error = None;

        for attempt in 0..=vs::MAX_RETRIES {
            if attempt > 0 {
                tracing::warn!(what, attempt, "vector store call failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if is_retryable(&e) => last_error = Some(e),
                Err(e) => return Err(store_err(e)),
            }
        }

        Err(store_err(last_error.expect("at least one attempt ran")))
    }
}

fn store_err(err: QdrantError) -> RagError {
    RagError::VectorStore(err.to_string())
}

/// Transport-level failures are retryable; client errors
/// (invalid argument, not found, permission, ...) are not.
fn is_retryable(err: &QdrantError) -> bool {
    match err {
        QdrantError::ResponseError { status } => {
            let code = status.code() as i32;
            // tonic codes: InvalidArgument=3, NotFound=5, AlreadyExists=6,
            // PermissionDenied=7, FailedPrecondition=9, Unimplemented=12,
            // Unauthenticated=16
            !matches!(code, 3 | 5 | 6 | 7 | 9 | 12 | 16)
        }
        QdrantError::ConversionError(_) => false,
        _ => true,
    }
}

fn point_id_string(id: Option<PointId>) -> String {
    use qdrant_client::qdrant::point_id::PointIdOptions;
    match id.and_then(|p| p.point_id_options) {
        Some(PointIdOptions::Num(n)) => n.to_string(),
        Some(PointIdOptions::Uuid(u)) => u,
        None => String::new(),
    }
}

fn payload_to_json(
    payload: HashMap<String, qdrant_client::qdrant::Value>,
) -> HashMap<String, JsonValue> {
    payload
        .into_iter()
        .map(|(k, v)| (k, qdrant_value_to_json(v)))
        .collect()
}

fn qdrant_value_to_json(value: qdrant_client::qdrant::Value) -> JsonValue {
    match value.kind {
        Some(Kind::NullValue(_)) | None => JsonValue::Null,
        Some(Kind::BoolValue(b)) => JsonValue::Bool(b),
        Some(Kind::IntegerValue(i)) => JsonValue::from(i),
        Some(Kind::DoubleValue(d)) => {
            serde_json::Number::from_f64(d).map_or(JsonValue::Null, JsonValue::Number)
        }
        Some(Kind::StringValue(s)) => JsonValue::String(s),
        Some(Kind::ListValue(list)) => {
            JsonValue::Array(list.values.into_iter().map(qdrant_value_to_json).collect())
        }
        Some(Kind::StructValue(s)) => JsonValue::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, qdrant_value_to_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_builder_keeps_both_lists() {
        let filter = SearchFilter::new()
            .must("metadata.is_overdue", true)
            .should("entity_type", "task")
            .should("entity_type", "user");

        assert_eq!(filter.must.len(), 1);
        assert_eq!(filter.should.len(), 2);

        // The OR group nests inside must so it stays binding.
        let qdrant = filter.into_qdrant();
        assert_eq!(qdrant.must.len(), 2);
        assert!(qdrant.should.is_empty());
        let nested = qdrant.must.iter().any(|c| {
            matches!(
                c.condition_one_of,
                Some(qdrant_client::qdrant::condition::ConditionOneOf::Filter(ref f))
                    if f.should.len() == 2
            )
        });
        assert!(nested);
    }

    #[test]
    fn test_should_only_filter_stays_top_level() {
        let filter = SearchFilter::new()
            .should("entity_type", "task")
            .should("entity_type", "user");
        let qdrant = filter.into_qdrant();
        assert!(qdrant.must.is_empty());
        assert_eq!(qdrant.should.len(), 2);
    }

    #[test]
    fn test_empty_filter() {
        assert!(SearchFilter::new().is_empty());
        assert!(!SearchFilter::new().must("entity_type", "task").is_empty());
    }

    #[test]
    fn test_qdrant_value_conversion() {
        use qdrant_client::qdrant::Value;

        let v = Value {
            kind: Some(Kind::BoolValue(true)),
        };
        assert_eq!(qdrant_value_to_json(v), JsonValue::Bool(true));

        let v = Value {
            kind: Some(Kind::StringValue("task".into())),
        };
        assert_eq!(qdrant_value_to_json(v), JsonValue::String("task".into()));
    }
}
