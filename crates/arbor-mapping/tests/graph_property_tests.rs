//! Property-based tests for the equivalence graph
//!
//! 1. No edge joins a collection to itself
//! 2. No stored edge is below the acceptance threshold
//! 3. Lookup is symmetric: an edge is found from either endpoint
//! 4. At most one edge per unordered field pair

use std::collections::HashSet;

use arbor_mapping::*;
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn field_ref() -> impl Strategy<Value = FieldRef> {
    (
        prop_oneof![Just("Posts"), Just("Transcripts"), Just("Users")],
        prop_oneof![Just("author_id"), Just("speaker_id"), Just("user_id"), Just("hashtags")],
    )
        .prop_map(|(c, f)| FieldRef::new(c, f))
}

fn edge() -> impl Strategy<Value = EquivalenceEdge> {
    (field_ref(), field_ref(), 0.0f32..=1.0).prop_map(|(a, b, confidence)| {
        EquivalenceEdge::new(a, b, confidence, Relationship::Equivalent)
    })
}

fn graph_from(threshold: f32, edges: Vec<EquivalenceEdge>) -> EquivalenceGraph {
    let mut graph = EquivalenceGraph::new(threshold);
    for edge in edges {
        let _ = graph.insert(edge);
    }
    graph
}

// ============================================================================
// Invariants
// ============================================================================

proptest! {
    #[test]
    fn prop_no_self_collection_edges(edges in prop::collection::vec(edge(), 0..40)) {
        let graph = graph_from(0.8, edges);
        for e in graph.edges() {
            prop_assert_ne!(&e.collection_a, &e.collection_b);
        }
    }

    #[test]
    fn prop_threshold_respected(
        threshold in 0.0f32..=1.0,
        edges in prop::collection::vec(edge(), 0..40),
    ) {
        let graph = graph_from(threshold, edges);
        for e in graph.edges() {
            prop_assert!(e.confidence >= threshold);
        }
    }

    #[test]
    fn prop_lookup_is_symmetric(edges in prop::collection::vec(edge(), 0..40)) {
        let graph = graph_from(0.5, edges);
        for e in graph.edges() {
            let from_a = graph.edges_for(&e.collection_a, &e.field_a);
            let from_b = graph.edges_for(&e.collection_b, &e.field_b);
            prop_assert!(from_a.iter().any(|x| *x == e));
            prop_assert!(from_b.iter().any(|x| *x == e));
        }
    }

    #[test]
    fn prop_one_edge_per_pair(edges in prop::collection::vec(edge(), 0..40)) {
        let graph = graph_from(0.5, edges);
        let mut seen = HashSet::new();
        for e in graph.edges() {
            let (a, b) = (e.endpoint_a(), e.endpoint_b());
            let key = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(seen.insert(key));
        }
    }

    #[test]
    fn prop_edges_for_sorted_by_confidence(edges in prop::collection::vec(edge(), 0..40)) {
        let graph = graph_from(0.0, edges);
        for e in graph.edges() {
            let list = graph.edges_for(&e.collection_a, &e.field_a);
            prop_assert!(list.windows(2).all(|w| w[0].confidence >= w[1].confidence));
        }
    }
}
