//! Integration tests for the complete Arbor pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - Preprocessing → Schema store
//! - Schema store → Mapping engine → Published equivalence graph
//! - Routing → Tools → Resolving executor (with field recovery)
//! - Snapshot save → load into a fresh runtime
//!
//! Run with: cargo test --test integration_tests

use std::sync::Arc;

use arbor_mapping::FieldRef;
use arbor_reasoning::{FnEngine, ReasoningError, ReasoningTask};
use arbor_schema::{FieldDescriptor, FieldType, GroupCount, MemoryStore, QueryOutput, SchemaError};
use arbor_tree::*;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tempfile::tempdir;

// ============================================================================
// Fixtures
// ============================================================================

fn store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.create_collection(
        "Posts",
        vec![
            FieldDescriptor::new("author_id", FieldType::Text).described("identifier of the post's author"),
            FieldDescriptor::new("content", FieldType::Text),
            FieldDescriptor::new("likes", FieldType::Int),
        ],
    );
    store
        .insert(
            "Posts",
            vec![
                json!({"author_id": "amal", "content": "Loving #Rust today", "likes": 4}),
                json!({"author_id": "amal", "content": "more #rust and #tokio", "likes": 9}),
                json!({"author_id": "amal", "content": "weekend", "likes": 3}),
                json!({"author_id": "badr", "content": "#RUST is fun", "likes": 1}),
                json!({"author_id": "cyd", "content": "no tags here", "likes": 0}),
            ],
        )
        .unwrap();
    store.create_collection(
        "Transcripts",
        vec![
            FieldDescriptor::new("speaker_id", FieldType::Text).described("identifier of the person speaking"),
            FieldDescriptor::new("text", FieldType::Text),
        ],
    );
    store
        .insert(
            "Transcripts",
            vec![
                json!({"speaker_id": "amal", "text": "good morning"}),
                json!({"speaker_id": "badr", "text": "thanks all"}),
            ],
        )
        .unwrap();
    store
}

/// Deterministic stand-in for a language model.
///
/// Routing always writes queries in transcript vocabulary (`speaker_id`),
/// so every query against `Posts` depends on recovery.
fn engine() -> FnEngine {
    FnEngine::new(|request| {
        let answer = match &request.task {
            ReasoningTask::FieldEquivalence => {
                let name = |key: &str| {
                    request
                        .get(key)
                        .and_then(|v| v["name"].as_str())
                        .unwrap_or_default()
                        .to_string()
                };
                let mut pair = [name("field_a"), name("field_b")];
                pair.sort();
                if pair == ["author_id", "speaker_id"] {
                    json!({"are_equivalent": true, "confidence": 0.91, "reasoning": "both identify a person", "relationship": "equivalent"})
                } else {
                    json!({"are_equivalent": false, "confidence": 0.05, "reasoning": "unrelated"})
                }
            }
            ReasoningTask::ToolSelection => {
                let node = request
                    .get("node")
                    .and_then(|n| n["id"].as_str())
                    .unwrap_or_default();
                let prompt = request.get_str("prompt").unwrap_or_default();
                match node {
                    "respond" => json!({"tool": "text_response", "inputs": {}}),
                    _ if prompt.contains('#') => json!({
                        "tool": "hashtag_aggregate",
                        "inputs": {"hashtag": "rust", "collection": "Posts"}
                    }),
                    _ => json!({"tool": "aggregate", "inputs": {"collection": "Posts"}}),
                }
            }
            ReasoningTask::QueryGeneration => json!({"group_by": "speaker_id"}),
            ReasoningTask::PropertySelection => {
                json!({"author_property": "speaker_id", "text_property": "content"})
            }
            ReasoningTask::Summary => {
                let seen = request
                    .get("previous_results")
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                json!({"text": format!("answered from {seen} result(s)")})
            }
            other => return Err(ReasoningError::Provider(format!("unexpected task {other}"))),
        };
        Ok(answer.to_string())
    })
}

fn arbor(store: Arc<MemoryStore>) -> Arbor {
    Arbor::new(store, Arc::new(engine()), ArborConfig::default()).unwrap()
}

async fn ready() -> (Arc<MemoryStore>, Arbor) {
    let store = store();
    let arbor = arbor(store.clone());
    let report = arbor
        .preprocess(&["Posts".to_string(), "Transcripts".to_string()])
        .await;
    assert!(report.is_complete());
    arbor.refresh_mappings().await;
    (store, arbor)
}

fn first_groups(outcome: &RouteOutcome) -> (&str, &[GroupCount], &Option<FieldSubstitution>) {
    match &outcome.results[0] {
        ToolOutput::Query {
            output: QueryOutput::Groups { field, groups, .. },
            substitution,
            ..
        } => (field.as_str(), groups.as_slice(), substitution),
        other => panic!("expected grouped output, got {other:?}"),
    }
}

// ============================================================================
// Preprocessing and mapping
// ============================================================================

#[tokio::test]
async fn test_preprocess_then_mapping_publishes_one_edge() {
    init_tracing();
    let store = store();
    let arbor = arbor(store);
    arbor
        .preprocess(&["Posts".to_string(), "Transcripts".to_string()])
        .await;

    let posts = arbor.schemas().get_schema("Posts").unwrap();
    let author = posts.field("author_id").unwrap();
    assert_eq!(author.top_groups.as_ref().unwrap()[0], GroupCount::new("amal", 3));
    assert!(posts.field("likes").unwrap().numeric.is_some());

    let report = arbor.refresh_mappings().await;
    assert!(report.is_complete());
    assert_eq!(report.compared, 4);

    let graph = arbor.graph().current();
    assert_eq!(graph.len(), 1);
    let counterparts = graph.counterparts("Posts", "author_id");
    assert_eq!(counterparts.len(), 1);
    assert_eq!(counterparts[0].0, FieldRef::new("Transcripts", "speaker_id"));
}

#[tokio::test]
async fn test_unavailable_collection_does_not_stop_the_batch() {
    let store = store();
    store.set_unavailable("Transcripts", true);
    let arbor = arbor(store);

    let report = arbor
        .preprocess(&["Posts".to_string(), "Transcripts".to_string()])
        .await;
    assert_eq!(report.built.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(
        report.failed[0].1,
        SchemaError::CollectionUnavailable { .. }
    ));
    assert_eq!(
        arbor.schemas().list_known_collections().into_iter().collect::<Vec<_>>(),
        ["Posts".to_string()]
    );
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn test_aggregate_request_recovers_through_equivalence() {
    let (store, arbor) = ready().await;

    let outcome = arbor
        .ask_collect("Who posts the most?", &["Posts"])
        .await
        .unwrap();
    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(outcome.tools_selected(), ["aggregate", "text_response"]);

    let (field, groups, substitution) = first_groups(&outcome);
    assert_eq!(field, "author_id");
    assert_eq!(groups[0], GroupCount::new("amal", 3));
    let substitution = substitution.as_ref().unwrap();
    assert_eq!((substitution.from.as_str(), substitution.to.as_str()), ("speaker_id", "author_id"));
    assert_eq!(store.execution_count(), 2);

    assert_eq!(
        outcome.results[1],
        ToolOutput::Text {
            text: "answered from 1 result(s)".to_string()
        }
    );
    assert!(outcome
        .events
        .iter()
        .any(|e| matches!(e, TreeEvent::Descended { from, to } if from == "base" && to == "respond")));
}

#[tokio::test]
async fn test_hashtag_request_counts_by_author() {
    let (_, arbor) = ready().await;

    let outcome = arbor
        .ask_collect("Who writes about #rust?", &["Posts"])
        .await
        .unwrap();
    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(outcome.tools_selected(), ["hashtag_aggregate", "text_response"]);

    let (field, groups, _) = first_groups(&outcome);
    assert_eq!(field, "author_id");
    assert_eq!(groups, [GroupCount::new("amal", 2), GroupCount::new("badr", 1)]);
    assert!(outcome.events.iter().any(|e| matches!(
        e,
        TreeEvent::Status { message, .. } if message == "Found 3 posts from 2 authors"
    )));
}

#[tokio::test]
async fn test_without_mappings_the_wrong_field_is_unresolvable() {
    let store = store();
    let arbor = arbor(store.clone());
    arbor
        .preprocess(&["Posts".to_string(), "Transcripts".to_string()])
        .await;

    let outcome = arbor
        .ask_collect("Who posts the most?", &["Posts"])
        .await
        .unwrap();
    match &outcome.error {
        Some(TreeError::Tool {
            tool,
            source: ToolError::Execution(ExecutionError::UnresolvableField { field, recovery_attempts, .. }),
        }) => {
            assert_eq!(tool, "aggregate");
            assert_eq!(field, "speaker_id");
            assert_eq!(*recovery_attempts, 1);
        }
        other => panic!("expected an unresolvable field, got {other:?}"),
    }
    assert!(matches!(outcome.events.last(), Some(TreeEvent::Failed { .. })));
    assert_eq!(store.execution_count(), 1);
}

#[tokio::test]
async fn test_ask_requires_preprocessed_collections() {
    let (_, arbor) = ready().await;
    assert!(matches!(
        arbor.ask("hello", &["Unknown"]),
        Err(ArborError::Schema(SchemaError::NotFound(_)))
    ));
}

#[tokio::test]
async fn test_concurrent_requests_do_not_share_state() {
    let (_, arbor) = ready().await;

    let (a, b) = tokio::join!(
        arbor.ask_collect("Who posts the most?", &["Posts"]),
        arbor.ask_collect("Who writes about #rust?", &["Posts"]),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(a.is_success() && b.is_success());
    assert_ne!(a.request_id, b.request_id);
    assert_eq!(a.tools_selected(), ["aggregate", "text_response"]);
    assert_eq!(b.tools_selected(), ["hashtag_aggregate", "text_response"]);
}

#[tokio::test]
async fn test_cancelled_request_ends_with_failure() {
    let (store, arbor) = ready().await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let events: Vec<TreeEvent> = arbor
        .ask_with_cancel("Who posts the most?", &["Posts"], cancel)
        .unwrap()
        .collect()
        .await;
    assert!(matches!(events.first(), Some(TreeEvent::Started { .. })));
    assert!(matches!(
        events.last(),
        Some(TreeEvent::Failed { error: TreeError::Cancelled, .. })
    ));
    assert_eq!(store.execution_count(), 0);
}

#[tokio::test]
async fn test_tool_registration_is_idempotent() {
    let (_, arbor) = ready().await;
    let before = arbor.tree().current();

    arbor
        .tree()
        .register_tool("base", Arc::new(QueryTool::aggregate()))
        .unwrap();
    arbor
        .tree()
        .register_branch("base", "respond", "Write the answer from the gathered results.")
        .unwrap();

    let after = arbor.tree().current();
    assert_eq!(after.len(), before.len());
    let names = |tree: &DecisionTree| -> Vec<String> {
        tree.node("base")
            .unwrap()
            .tools()
            .iter()
            .map(|e| e.tool.name().to_string())
            .collect()
    };
    assert_eq!(names(&after), names(&before));
    assert_eq!(
        after.node("base").unwrap().tool("aggregate").unwrap().child.as_deref(),
        Some("respond")
    );
}

// ============================================================================
// Snapshots
// ============================================================================

#[tokio::test]
async fn test_snapshot_restores_schemas_and_graph() {
    let (_, arbor) = ready().await;
    let dir = tempdir().unwrap();
    let path = dir.path().join("state").join("arbor.json");
    arbor.save_snapshot(&path).unwrap();

    // Same data, nothing preprocessed: the snapshot alone makes it routable.
    let fresh = self::arbor(store());
    assert!(fresh.routing_context(&["Posts"]).is_err());
    fresh.load_snapshot(&path).unwrap();

    assert_eq!(fresh.graph().current().len(), 1);
    let outcome = fresh
        .ask_collect("Who posts the most?", &["Posts"])
        .await
        .unwrap();
    assert!(outcome.is_success(), "{:?}", outcome.error);
    let (_, groups, substitution) = first_groups(&outcome);
    assert_eq!(groups[0], GroupCount::new("amal", 3));
    assert!(substitution.is_some());
}

#[tokio::test]
async fn test_snapshot_load_follows_the_loading_runtime_config() {
    let (_, arbor) = ready().await;
    let dir = tempdir().unwrap();
    let path = dir.path().join("arbor.json");
    arbor.save_snapshot(&path).unwrap();
    let saved_edge = arbor.graph().current().edges()[0].confidence;
    assert!(saved_edge < 0.95);

    let memory = store();
    memory.create_collection("Replies", vec![FieldDescriptor::new("body", FieldType::Text)]);
    let mut config = ArborConfig::default();
    config.mapping.acceptance_threshold = 0.95;
    config.preprocess.top_k = 2;
    let strict = Arbor::new(memory, Arc::new(engine()), config).unwrap();
    assert!(strict.preprocess(&["Replies".to_string()]).await.is_complete());

    strict.load_snapshot(&path).unwrap();

    let known: Vec<String> = strict.schemas().list_known_collections().into_iter().collect();
    assert_eq!(known, vec!["Posts".to_string(), "Transcripts".to_string()]);

    let graph = strict.graph().current();
    assert_eq!(graph.threshold(), 0.95);
    assert!(graph.is_empty());

    let posts = strict.schemas().get_schema("Posts").unwrap();
    let authors = posts.field("author_id").unwrap().top_groups.clone().unwrap();
    assert_eq!(authors, vec![GroupCount::new("amal", 3), GroupCount::new("badr", 1)]);
}
