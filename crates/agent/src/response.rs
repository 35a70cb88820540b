//! Response and event types
//!
//! The request/response contract of the pipeline and the typed events the
//! streaming variant emits.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use task_agent_core::SourceCitation;

/// Incoming chat request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// A structured CRUD call extracted from an LLM response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: Map<String, JsonValue>,
}

/// Pipeline response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<SourceCitation>,
    pub confidence: f32,
    pub session_id: String,
    pub metadata: ResponseMetadata,
}

/// Per-request diagnostics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub processing_ms: u64,
    pub steps_executed: Vec<String>,
    pub retrieved_documents: usize,
    pub query_classification: String,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_calls: Option<Vec<FunctionCall>>,
}

/// Events emitted by the streaming pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Start {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Status {
        message: String,
    },
    Sources {
        sources: Vec<SourceCitation>,
    },
    Chunk {
        text: String,
    },
    Complete {
        response: ChatResponse,
    },
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event = PipelineEvent::Start {
            session_id: "s1".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "start");
        assert_eq!(json["sessionId"], "s1");

        let event = PipelineEvent::Chunk {
            text: "hel".into(),
        };
        assert_eq!(serde_json::to_value(&event).unwrap()["type"], "chunk");
    }

    #[test]
    fn test_response_camel_case() {
        let response = ChatResponse {
            answer: "ok".into(),
            sources: vec![],
            confidence: 0.8,
            session_id: "s1".into(),
            metadata: ResponseMetadata {
                processing_ms: 12,
                steps_executed: vec!["hybrid_search".into()],
                retrieved_documents: 3,
                query_classification: "list".into(),
                from_cache: false,
                function_calls: None,
            },
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["metadata"]["processingMs"], 12);
        assert_eq!(json["metadata"]["fromCache"], false);
        assert!(json["metadata"].get("functionCalls").is_none());
    }
}
