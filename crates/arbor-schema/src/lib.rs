//! Arbor Schema: collection metadata, query specs, and the backing-store boundary
//!
//! Everything above this crate reasons about collections it has never seen
//! at compile time. This crate gives them a shared, read-mostly view:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                       SCHEMA METADATA STORE                          │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                                                                      │
//! │   ┌────────────┐  describe / field_stats   ┌──────────────────────┐  │
//! │   │ DataStore  │◄──────────────────────────│     SchemaStore      │  │
//! │   │ (backing)  │                           │  build_schema(name)  │  │
//! │   │            │──── top-K groups, ───────►│                      │  │
//! │   └────────────┘     numeric summary       │  Arc<CollectionSchema>│ │
//! │         ▲                                  └──────────┬───────────┘  │
//! │         │ execute(QuerySpec)                          │ read-shared  │
//! │         │                                             ▼              │
//! │   resolving executor, tools                 mapping engine, tree     │
//! │                                                                      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//!
//! - A `CollectionSchema` has unique field names.
//! - `top_groups` is sorted by count descending and holds at most K entries.
//! - Schemas are replaced wholesale: readers hold an `Arc` and never see a
//!   half-built schema.

pub mod error;
pub mod memory;
pub mod metadata;
pub mod model;
pub mod normalize;
pub mod query;
pub mod store;

pub use error::SchemaError;
pub use memory::MemoryStore;
pub use metadata::{BuildReport, PreprocessConfig, SchemaStore};
pub use model::{
    sort_groups, CollectionSchema, FieldMetadata, FieldType, GroupCount, NumericSummary,
    DEFAULT_TOP_K,
};
pub use normalize::{is_arabic_text, normalize_hashtag, normalize_text};
pub use query::{is_field_name, AggregationSpec, Filter, FilterOp, QueryOutput, QuerySpec, Record};
pub use store::{CollectionDescription, DataStore, FieldDescriptor, FieldStats, StoreError};
