//! The equivalence graph.
//!
//! Stored as an edge list plus an index from `(collection, field)` to the
//! edges touching it, so a lookup from either endpoint is one hash probe.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Core Types
// ============================================================================

/// A field in a specific collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldRef {
    pub collection: String,
    pub field: String,
}

impl FieldRef {
    pub fn new(collection: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            field: field.into(),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.collection, self.field)
    }
}

/// Strength of the asserted correspondence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    Equivalent,
    Similar,
    Related,
}

/// Assertion that two fields in different collections denote one concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquivalenceEdge {
    pub collection_a: String,
    pub field_a: String,
    pub collection_b: String,
    pub field_b: String,
    pub confidence: f32,
    pub relationship: Relationship,
    /// Engine's stated rationale, kept for review.
    #[serde(default)]
    pub reasoning: String,
}

impl EquivalenceEdge {
    pub fn new(a: FieldRef, b: FieldRef, confidence: f32, relationship: Relationship) -> Self {
        Self {
            collection_a: a.collection,
            field_a: a.field,
            collection_b: b.collection,
            field_b: b.field,
            confidence,
            relationship,
            reasoning: String::new(),
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn endpoint_a(&self) -> FieldRef {
        FieldRef::new(&self.collection_a, &self.field_a)
    }

    pub fn endpoint_b(&self) -> FieldRef {
        FieldRef::new(&self.collection_b, &self.field_b)
    }

    /// The endpoint opposite `(collection, field)`, if the edge touches it.
    pub fn other_end(&self, collection: &str, field: &str) -> Option<FieldRef> {
        if self.collection_a == collection && self.field_a == field {
            Some(self.endpoint_b())
        } else if self.collection_b == collection && self.field_b == field {
            Some(self.endpoint_a())
        } else {
            None
        }
    }

    /// Endpoints in canonical order, for deduplication.
    fn key(&self) -> (FieldRef, FieldRef) {
        let (a, b) = (self.endpoint_a(), self.endpoint_b());
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EdgeRejection {
    #[error("edge joins collection '{0}' to itself")]
    SelfCollection(String),

    #[error("confidence {confidence} is below the acceptance threshold {threshold}")]
    BelowThreshold { confidence: f32, threshold: f32 },

    #[error("confidence {0} is not a probability")]
    InvalidConfidence(f32),
}

// ============================================================================
// Equivalence Graph
// ============================================================================

/// Index of accepted edges keyed by `(collection, field)`.
#[derive(Debug, Clone)]
pub struct EquivalenceGraph {
    threshold: f32,
    edges: Vec<EquivalenceEdge>,
    index: HashMap<FieldRef, Vec<usize>>,
}

impl Default for EquivalenceGraph {
    fn default() -> Self {
        Self::new(0.8)
    }
}

impl EquivalenceGraph {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            edges: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Build from stored edges, dropping any that violate the invariants.
    pub fn from_edges(threshold: f32, edges: impl IntoIterator<Item = EquivalenceEdge>) -> Self {
        let mut graph = Self::new(threshold);
        for edge in edges {
            if let Err(reason) = graph.insert(edge) {
                tracing::warn!(error = %reason, "dropping stored equivalence edge");
            }
        }
        graph
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Accept an edge. A repeat of an existing pair keeps the higher
    /// confidence. Returns whether the graph changed.
    pub fn insert(&mut self, edge: EquivalenceEdge) -> Result<bool, EdgeRejection> {
        if !(0.0..=1.0).contains(&edge.confidence) {
            return Err(EdgeRejection::InvalidConfidence(edge.confidence));
        }
        if edge.collection_a == edge.collection_b {
            return Err(EdgeRejection::SelfCollection(edge.collection_a));
        }
        if edge.confidence < self.threshold {
            return Err(EdgeRejection::BelowThreshold {
                confidence: edge.confidence,
                threshold: self.threshold,
            });
        }

        let key = edge.key();
        let existing = self
            .index
            .get(&key.0)
            .and_then(|ids| ids.iter().copied().find(|id| self.edges[*id].key() == key));
        if let Some(id) = existing {
            if self.edges[id].confidence >= edge.confidence {
                return Ok(false);
            }
            self.edges[id] = edge;
            self.sort_index_for(&key.0);
            self.sort_index_for(&key.1);
            return Ok(true);
        }

        let id = self.edges.len();
        self.edges.push(edge);
        for end in [key.0.clone(), key.1.clone()] {
            self.index.entry(end).or_default().push(id);
        }
        self.sort_index_for(&key.0);
        self.sort_index_for(&key.1);
        Ok(true)
    }

    fn sort_index_for(&mut self, end: &FieldRef) {
        let edges = &self.edges;
        if let Some(ids) = self.index.get_mut(end) {
            ids.sort_by(|a, b| {
                edges[*b]
                    .confidence
                    .total_cmp(&edges[*a].confidence)
                    .then_with(|| edges[*a].key().cmp(&edges[*b].key()))
            });
        }
    }

    /// Every edge touching `(collection, field)`, most confident first,
    /// regardless of which side it was stored on.
    pub fn edges_for(&self, collection: &str, field: &str) -> Vec<&EquivalenceEdge> {
        self.index
            .get(&FieldRef::new(collection, field))
            .map(|ids| ids.iter().map(|id| &self.edges[*id]).collect())
            .unwrap_or_default()
    }

    /// Fields equivalent to `(collection, field)` with their confidence.
    pub fn counterparts(&self, collection: &str, field: &str) -> Vec<(FieldRef, f32)> {
        self.edges_for(collection, field)
            .into_iter()
            .filter_map(|edge| {
                edge.other_end(collection, field)
                    .map(|other| (other, edge.confidence))
            })
            .collect()
    }

    /// Find a field of `target` that is directly equivalent to a field named
    /// `field` in some *other* collection.
    ///
    /// This is the one-hop correction for a query that used a sibling
    /// collection's name for a concept `target` stores under its own name.
    /// `exists` filters candidates to fields `target` actually has.
    pub fn substitute_for<F>(&self, target: &str, field: &str, exists: F) -> Option<(String, &EquivalenceEdge)>
    where
        F: Fn(&str) -> bool,
    {
        let mut best: Option<(String, &EquivalenceEdge)> = None;
        for collection in self.collections() {
            if collection == target {
                continue;
            }
            for edge in self.edges_for(collection, field) {
                let Some(other) = edge.other_end(collection, field) else {
                    continue;
                };
                if other.collection != target || !exists(&other.field) {
                    continue;
                }
                let better = best
                    .as_ref()
                    .map_or(true, |(_, current)| edge.confidence > current.confidence);
                if better {
                    best = Some((other.field, edge));
                }
            }
        }
        best
    }

    /// Collections that appear in at least one edge, sorted.
    pub fn collections(&self) -> BTreeSet<&str> {
        self.index.keys().map(|r| r.collection.as_str()).collect()
    }

    pub fn edges(&self) -> &[EquivalenceEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Compact view for prompts: `["A.x ≡ B.y (0.93)", ...]`, limited to
    /// edges touching one of `collections`.
    pub fn prompt_view(&self, collections: &[&str]) -> Vec<String> {
        self.edges
            .iter()
            .filter(|e| {
                collections.contains(&e.collection_a.as_str())
                    || collections.contains(&e.collection_b.as_str())
            })
            .map(|e| {
                format!(
                    "{} ≡ {} ({:.2})",
                    e.endpoint_a(),
                    e.endpoint_b(),
                    e.confidence
                )
            })
            .collect()
    }
}

// ============================================================================
// Published Graph
// ============================================================================

/// Shared handle over the current graph. Publishing swaps the whole graph;
/// readers keep whatever `Arc` they already hold.
#[derive(Debug, Default)]
pub struct GraphHandle {
    current: RwLock<Arc<EquivalenceGraph>>,
}

impl GraphHandle {
    pub fn new(graph: EquivalenceGraph) -> Self {
        Self {
            current: RwLock::new(Arc::new(graph)),
        }
    }

    pub fn current(&self) -> Arc<EquivalenceGraph> {
        Arc::clone(&self.current.read())
    }

    pub fn publish(&self, graph: EquivalenceGraph) -> Arc<EquivalenceGraph> {
        let graph = Arc::new(graph);
        *self.current.write() = Arc::clone(&graph);
        graph
    }
}
