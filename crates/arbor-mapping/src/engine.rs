//! Semantic Mapping Engine.
//!
//! Comparisons are independent, so they run with bounded parallelism
//! (`buffer_unordered`). A comparison that fails becomes a warning in the
//! report; `infer_mappings` itself never fails.

use std::collections::BTreeSet;
use std::sync::Arc;

use arbor_reasoning::{ReasoningClient, ReasoningError, ReasoningRequest, ReasoningTask, StructuredOutput};
use arbor_schema::{CollectionSchema, FieldMetadata};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::graph::{EquivalenceEdge, EquivalenceGraph, FieldRef, Relationship};

const EQUIVALENCE_INSTRUCTIONS: &str = "Two fields come from different collections. \
Decide whether they denote the same real-world concept, so that a value of one \
can be looked up in the other. Judge by names, descriptions and sample values. \
Report a confidence between 0 and 1.";

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// Edges need at least this confidence to be kept.
    pub acceptance_threshold: f32,
    /// Upper bound on reasoning calls per `infer_mappings`.
    pub max_comparisons: usize,
    /// Comparisons in flight at once.
    pub concurrency: usize,
    /// Top group values shown to the engine per field.
    pub sample_values: usize,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.8,
            max_comparisons: 400,
            concurrency: 4,
            sample_values: 5,
        }
    }
}

// ============================================================================
// Verdict
// ============================================================================

/// The engine's answer for one field pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquivalenceVerdict {
    pub are_equivalent: bool,
    pub confidence: f32,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub relationship: Option<Relationship>,
}

impl StructuredOutput for EquivalenceVerdict {
    fn output_schema() -> Value {
        json!({
            "type": "object",
            "required": ["are_equivalent", "confidence", "reasoning"],
            "properties": {
                "are_equivalent": {"type": "boolean"},
                "confidence": {"type": "number", "minimum": 0, "maximum": 1},
                "reasoning": {"type": "string"},
                "relationship": {"enum": ["equivalent", "similar", "related"]}
            }
        })
    }

    fn validate(&self) -> Result<(), String> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence {} outside [0, 1]", self.confidence));
        }
        Ok(())
    }
}

// ============================================================================
// Report
// ============================================================================

/// A comparison that could not be completed.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingWarning {
    pub field_a: FieldRef,
    pub field_b: FieldRef,
    pub error: ReasoningError,
}

/// Result of one `infer_mappings` run.
#[derive(Debug)]
pub struct MappingReport {
    pub graph: EquivalenceGraph,
    pub warnings: Vec<MappingWarning>,
    /// Reasoning calls issued.
    pub compared: usize,
    /// Eligible pairs dropped by `max_comparisons`.
    pub skipped: usize,
    /// Verdicts that did not produce an edge.
    pub rejected: usize,
}

impl MappingReport {
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty() && self.skipped == 0
    }
}

/// One field pair to ask about, with a cheap prior used for ranking.
#[derive(Debug, Clone)]
struct Candidate<'a> {
    collection_a: &'a str,
    field_a: &'a FieldMetadata,
    collection_b: &'a str,
    field_b: &'a FieldMetadata,
    overlap: f32,
    prior: f32,
}

impl Candidate<'_> {
    fn refs(&self) -> (FieldRef, FieldRef) {
        (
            FieldRef::new(self.collection_a, &self.field_a.name),
            FieldRef::new(self.collection_b, &self.field_b.name),
        )
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct MappingEngine {
    client: ReasoningClient,
    config: MappingConfig,
}

impl MappingEngine {
    pub fn new(client: ReasoningClient, config: MappingConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &MappingConfig {
        &self.config
    }

    /// Compare eligible field pairs across every pair of distinct
    /// collections and collect the accepted edges.
    pub async fn infer_mappings(&self, schemas: &[Arc<CollectionSchema>]) -> MappingReport {
        let mut candidates = candidate_pairs(schemas, self.config.sample_values);
        let eligible = candidates.len();
        candidates.sort_by(|a, b| {
            b.prior
                .total_cmp(&a.prior)
                .then_with(|| a.refs().cmp(&b.refs()))
        });
        candidates.truncate(self.config.max_comparisons);
        let skipped = eligible - candidates.len();
        if skipped > 0 {
            tracing::warn!(
                eligible,
                skipped,
                cap = self.config.max_comparisons,
                "comparison cap reached, lowest-ranked field pairs skipped"
            );
        }

        let compared = candidates.len();
        let mut outcomes: Vec<(FieldRef, FieldRef, Result<EquivalenceVerdict, ReasoningError>)> =
            stream::iter(candidates)
                .map(|candidate| async move {
                    let (a, b) = candidate.refs();
                    let verdict = self.compare(&candidate).await;
                    (a, b, verdict)
                })
                .buffer_unordered(self.config.concurrency.max(1))
                .collect()
                .await;
        // Completion order is nondeterministic; the report is not.
        outcomes.sort_by(|x, y| (&x.0, &x.1).cmp(&(&y.0, &y.1)));

        let mut graph = EquivalenceGraph::new(self.config.acceptance_threshold);
        let mut warnings = Vec::new();
        let mut rejected = 0;
        for (field_a, field_b, outcome) in outcomes {
            match outcome {
                Ok(verdict) if verdict.are_equivalent => {
                    let edge = EquivalenceEdge::new(
                        field_a.clone(),
                        field_b.clone(),
                        verdict.confidence,
                        verdict.relationship.unwrap_or(Relationship::Equivalent),
                    )
                    .with_reasoning(verdict.reasoning);
                    match graph.insert(edge) {
                        Ok(_) => tracing::debug!(
                            a = %field_a,
                            b = %field_b,
                            confidence = verdict.confidence,
                            "equivalence edge accepted"
                        ),
                        Err(reason) => {
                            rejected += 1;
                            tracing::debug!(a = %field_a, b = %field_b, reason = %reason, "equivalence edge rejected");
                        }
                    }
                }
                Ok(_) => rejected += 1,
                Err(error) => {
                    tracing::warn!(a = %field_a, b = %field_b, error = %error, "field comparison failed");
                    warnings.push(MappingWarning {
                        field_a,
                        field_b,
                        error,
                    });
                }
            }
        }

        tracing::info!(
            collections = schemas.len(),
            compared,
            edges = graph.len(),
            warnings = warnings.len(),
            "mapping inference finished"
        );
        MappingReport {
            graph,
            warnings,
            compared,
            skipped,
            rejected,
        }
    }

    async fn compare(&self, candidate: &Candidate<'_>) -> Result<EquivalenceVerdict, ReasoningError> {
        let n = self.config.sample_values;
        let request = ReasoningRequest::new(ReasoningTask::FieldEquivalence, EQUIVALENCE_INSTRUCTIONS)
            .input("field_a", field_view(candidate.collection_a, candidate.field_a, n))
            .input("field_b", field_view(candidate.collection_b, candidate.field_b, n))
            .input("sample_overlap", json!(candidate.overlap));
        self.client.ask(request).await
    }
}

fn field_view(collection: &str, field: &FieldMetadata, samples: usize) -> Value {
    json!({
        "collection": collection,
        "name": field.name,
        "type": field.declared_type.as_str(),
        "description": field.description,
        "sample_values": field.sample_values(samples),
    })
}

// ============================================================================
// Candidate selection
// ============================================================================

fn comparable(field: &FieldMetadata) -> bool {
    !field.declared_type.is_opaque() && !field.is_description_only()
}

/// Every same-typed, comparable field pair across unordered pairs of
/// distinct collections.
fn candidate_pairs(schemas: &[Arc<CollectionSchema>], samples: usize) -> Vec<Candidate<'_>> {
    let mut ordered: Vec<&CollectionSchema> = schemas.iter().map(Arc::as_ref).collect();
    ordered.sort_by(|a, b| a.collection_name.cmp(&b.collection_name));
    ordered.dedup_by(|a, b| a.collection_name == b.collection_name);

    let mut out = Vec::new();
    for (i, left) in ordered.iter().copied().enumerate() {
        for right in ordered[i + 1..].iter().copied() {
            for field_a in left.fields().iter().filter(|f| comparable(f)) {
                for field_b in right.fields().iter().filter(|f| comparable(f)) {
                    if field_a.declared_type != field_b.declared_type {
                        continue;
                    }
                    let overlap = value_overlap(field_a, field_b, samples);
                    let prior = overlap + name_similarity(&field_a.name, &field_b.name);
                    out.push(Candidate {
                        collection_a: &left.collection_name,
                        field_a,
                        collection_b: &right.collection_name,
                        field_b,
                        overlap,
                        prior,
                    });
                }
            }
        }
    }
    out
}

/// Jaccard overlap of the fields' top group values.
fn value_overlap(a: &FieldMetadata, b: &FieldMetadata, samples: usize) -> f32 {
    let left: BTreeSet<&str> = a.sample_values(samples).into_iter().collect();
    let right: BTreeSet<&str> = b.sample_values(samples).into_iter().collect();
    jaccard(&left, &right)
}

/// Jaccard overlap of `_`-separated name tokens.
fn name_similarity(a: &str, b: &str) -> f32 {
    let tokens = |s: &str| -> BTreeSet<String> {
        s.split(|c: char| c == '_' || c == '-')
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect()
    };
    jaccard(&tokens(a), &tokens(b))
}

fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_reasoning::{FnEngine, ReasoningConfig, ScriptedEngine};
    use arbor_schema::{FieldType, GroupCount};

    fn ids(values: &[&str]) -> Vec<GroupCount> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| GroupCount::new(*v, 10 - i as u64))
            .collect()
    }

    fn transcripts() -> Arc<CollectionSchema> {
        Arc::new(
            CollectionSchema::new(
                "Transcripts",
                vec![
                    FieldMetadata::new("speaker_id", FieldType::Text)
                        .with_description("identifier of the person speaking")
                        .with_groups(ids(&["u1", "u2", "u3"])),
                    FieldMetadata::new("duration_seconds", FieldType::Int)
                        .with_description("length of the segment")
                        .with_groups(ids(&["30", "60"])),
                    FieldMetadata::new("text", FieldType::Text)
                        .with_description("what was said"),
                ],
                3,
            )
            .unwrap(),
        )
    }

    fn posts() -> Arc<CollectionSchema> {
        Arc::new(
            CollectionSchema::new(
                "Posts",
                vec![
                    FieldMetadata::new("author_id", FieldType::Text)
                        .with_description("identifier of the post's author")
                        .with_groups(ids(&["u2", "u3", "u4"])),
                    FieldMetadata::new("hashtags", FieldType::TextArray)
                        .with_description("hashtags in the post")
                        .with_groups(ids(&["#ai", "#news"])),
                ],
                3,
            )
            .unwrap(),
        )
    }

    /// Says "equivalent" when the descriptions both talk about identifiers
    /// and the samples overlap.
    fn heuristic_engine() -> FnEngine {
        FnEngine::new(|request| {
            let desc = |key: &str| {
                request
                    .get(key)
                    .and_then(|v| v["description"].as_str())
                    .unwrap_or_default()
                    .to_string()
            };
            let overlap = request
                .get("sample_overlap")
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            let same = desc("field_a").contains("identifier")
                && desc("field_b").contains("identifier")
                && overlap > 0.0;
            let verdict = if same {
                json!({"are_equivalent": true, "confidence": 0.93, "reasoning": "both identify a person"})
            } else {
                json!({"are_equivalent": false, "confidence": 0.1, "reasoning": "unrelated"})
            };
            Ok(verdict.to_string())
        })
    }

    fn engine_with(engine: impl arbor_reasoning::ReasoningEngine + 'static) -> MappingEngine {
        MappingEngine::new(
            ReasoningClient::new(Arc::new(engine), ReasoningConfig::default()),
            MappingConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_identifiers_become_equivalent_edge() {
        let engine = engine_with(heuristic_engine());
        let report = engine.infer_mappings(&[transcripts(), posts()]).await;

        assert!(report.warnings.is_empty());
        assert_eq!(report.graph.len(), 1);
        let edges = report.graph.edges_for("Posts", "author_id");
        assert_eq!(edges.len(), 1);
        let edge = edges[0];
        assert_eq!(edge.relationship, Relationship::Equivalent);
        assert!(edge.confidence >= 0.8);
        assert_eq!(
            edge.other_end("Posts", "author_id"),
            Some(FieldRef::new("Transcripts", "speaker_id"))
        );
        assert!(report.graph.edges_for("Transcripts", "duration_seconds").is_empty());
        assert!(report.graph.edges_for("Posts", "hashtags").is_empty());
    }

    #[tokio::test]
    async fn test_only_same_typed_comparable_pairs_are_asked() {
        let scripted = Arc::new(ScriptedEngine::new());
        scripted.push_json(
            ReasoningTask::FieldEquivalence,
            json!({"are_equivalent": false, "confidence": 0.2, "reasoning": "no"}),
        );
        let engine = MappingEngine::new(
            ReasoningClient::new(scripted.clone(), ReasoningConfig::default()),
            MappingConfig::default(),
        );
        let report = engine.infer_mappings(&[transcripts(), posts()]).await;

        // speaker_id ↔ author_id is the only text/text pair; `text` is
        // description-only and int/text[] have no partner.
        assert_eq!(report.compared, 1);
        assert_eq!(report.rejected, 1);
        assert_eq!(scripted.requests().len(), 1);
        assert!(report.graph.is_empty());
    }

    #[tokio::test]
    async fn test_below_threshold_positive_verdict_is_dropped() {
        let engine = engine_with(FnEngine::new(|_| {
            Ok(json!({"are_equivalent": true, "confidence": 0.6, "reasoning": "maybe"}).to_string())
        }));
        let report = engine.infer_mappings(&[transcripts(), posts()]).await;
        assert!(report.graph.is_empty());
        assert_eq!(report.rejected, 1);
    }

    #[tokio::test]
    async fn test_failed_comparison_is_a_warning() {
        let engine = engine_with(FnEngine::new(|_| Ok("I refuse to answer in JSON".to_string())));
        let report = engine.infer_mappings(&[transcripts(), posts()]).await;

        assert!(report.graph.is_empty());
        assert_eq!(report.warnings.len(), 1);
        assert!(matches!(
            report.warnings[0].error,
            ReasoningError::MalformedOutput(_)
        ));
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_cap_keeps_highest_prior_pairs() {
        let engine = MappingEngine::new(
            ReasoningClient::new(Arc::new(heuristic_engine()), ReasoningConfig::default()),
            MappingConfig {
                max_comparisons: 0,
                ..MappingConfig::default()
            },
        );
        let report = engine.infer_mappings(&[transcripts(), posts()]).await;
        assert_eq!(report.compared, 0);
        assert_eq!(report.skipped, 1);
        assert!(report.graph.is_empty());
    }

    #[tokio::test]
    async fn test_single_collection_needs_no_calls() {
        let scripted = Arc::new(ScriptedEngine::new());
        let engine = MappingEngine::new(
            ReasoningClient::new(scripted.clone(), ReasoningConfig::default()),
            MappingConfig::default(),
        );
        let report = engine.infer_mappings(&[posts(), posts()]).await;
        assert_eq!(report.compared, 0);
        assert!(scripted.requests().is_empty());
    }

    #[test]
    fn test_name_similarity() {
        assert_eq!(name_similarity("speaker_id", "author_id"), 1.0 / 3.0);
        assert_eq!(name_similarity("hashtags", "duration_seconds"), 0.0);
    }

    #[test]
    fn test_verdict_rejects_bad_confidence() {
        let bad = EquivalenceVerdict {
            are_equivalent: true,
            confidence: 1.2,
            reasoning: String::new(),
            relationship: None,
        };
        assert!(bad.validate().is_err());
    }
}
