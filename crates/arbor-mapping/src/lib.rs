//! Arbor Mapping: which fields across collections mean the same thing
//!
//! Two collections rarely agree on names: a transcript store says
//! `speaker_id`, a social-media store says `author_id`. The mapping engine
//! asks the reasoning engine about candidate field pairs and keeps only
//! confident, positive verdicts as edges in an equivalence graph.
//!
//! ```text
//!  CollectionSchema A ─┐                       ┌──────────────────────────┐
//!                      ├─► candidate pairs ──► │ reasoning engine         │
//!  CollectionSchema B ─┘   (same type,         │ {equivalent, confidence} │
//!                           not free text,     └────────────┬─────────────┘
//!                           capped)                         │ ≥ threshold
//!                                                           ▼
//!                         EquivalenceGraph: (collection, field) ─► [edges]
//! ```
//!
//! Lookups are one hop. Chains like A≈B≈C are never followed.

pub mod engine;
pub mod graph;
pub mod snapshot;

pub use engine::{
    EquivalenceVerdict, MappingConfig, MappingEngine, MappingReport, MappingWarning,
};
pub use graph::{
    EdgeRejection, EquivalenceEdge, EquivalenceGraph, FieldRef, GraphHandle, Relationship,
};
pub use snapshot::SchemaSnapshot;
