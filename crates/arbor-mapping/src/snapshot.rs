//! JSON snapshots of the schema store and the equivalence graph.
//!
//! Writes go to a temp file in the target directory which is then renamed
//! over the destination, so a crash mid-write leaves the old snapshot intact.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use arbor_schema::{CollectionSchema, SchemaStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::graph::{EquivalenceEdge, EquivalenceGraph};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub threshold: f32,
    pub schemas: Vec<CollectionSchema>,
    pub edges: Vec<EquivalenceEdge>,
}

impl SchemaSnapshot {
    pub fn capture(schemas: &SchemaStore, graph: &EquivalenceGraph) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            created_at: Utc::now(),
            threshold: graph.threshold(),
            schemas: schemas.all().iter().map(|s| s.as_ref().clone()).collect(),
            edges: graph.edges().to_vec(),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating snapshot directory {}", dir.display()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, self)?;
        tmp.flush()?;
        tmp.persist(path)
            .with_context(|| format!("writing snapshot {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading snapshot {}", path.display()))?;
        let snapshot: SchemaSnapshot = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing snapshot {}", path.display()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            anyhow::bail!(
                "unsupported snapshot version {} (expected {})",
                snapshot.version,
                SNAPSHOT_VERSION
            );
        }
        Ok(snapshot)
    }

    /// Replace the contents of `schemas` with the stored schemas and
    /// rebuild the graph under `threshold`.
    ///
    /// The stored threshold is informational only: edges below the
    /// caller's threshold are dropped. Group statistics are cut down to the
    /// store's K. A schema that still fails validation aborts the restore
    /// before anything is replaced.
    pub fn restore(self, schemas: &SchemaStore, threshold: f32) -> Result<EquivalenceGraph> {
        schemas
            .replace_all(self.schemas)
            .context("restoring snapshot schemas")?;
        let stored = self.edges.len();
        let graph = EquivalenceGraph::from_edges(threshold, self.edges);
        if graph.len() < stored {
            tracing::warn!(
                stored,
                kept = graph.len(),
                threshold,
                "snapshot edges dropped under current threshold"
            );
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{FieldRef, Relationship};
    use arbor_schema::{FieldDescriptor, FieldType, MemoryStore, PreprocessConfig};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_snapshot_roundtrip_through_file() {
        let memory = Arc::new(MemoryStore::new());
        memory.create_collection("Posts", vec![FieldDescriptor::new("author_id", FieldType::Text)]);
        memory
            .insert("Posts", vec![json!({"author_id": "u1"}), json!({"author_id": "u1"})])
            .unwrap();
        let store = SchemaStore::new(memory.clone(), PreprocessConfig::default());
        store.build_schema("Posts").await.unwrap();

        let mut graph = EquivalenceGraph::new(0.8);
        graph
            .insert(EquivalenceEdge::new(
                FieldRef::new("Transcripts", "speaker_id"),
                FieldRef::new("Posts", "author_id"),
                0.9,
                Relationship::Equivalent,
            ))
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("snapshot.json");
        SchemaSnapshot::capture(&store, &graph).save(&path).unwrap();

        let fresh = SchemaStore::new(memory, PreprocessConfig::default());
        let restored = SchemaSnapshot::load(&path).unwrap().restore(&fresh, 0.8).unwrap();

        assert_eq!(restored.len(), 1);
        assert_eq!(restored.edges_for("Posts", "author_id").len(), 1);
        let schema = fresh.get_schema("Posts").unwrap();
        assert_eq!(schema.record_count, 2);
        assert!(schema.has_field("author_id"));
    }

    #[test]
    fn test_restore_applies_callers_threshold() {
        let memory = Arc::new(MemoryStore::new());
        let store = SchemaStore::new(memory, PreprocessConfig::default());
        let edge = |confidence| {
            EquivalenceEdge::new(
                FieldRef::new("Transcripts", "speaker_id"),
                FieldRef::new("Posts", "author_id"),
                confidence,
                Relationship::Equivalent,
            )
        };
        let snapshot = SchemaSnapshot {
            version: SNAPSHOT_VERSION,
            created_at: Utc::now(),
            threshold: 0.8,
            schemas: Vec::new(),
            edges: vec![edge(0.85)],
        };

        let strict = snapshot.clone().restore(&store, 0.95).unwrap();
        assert_eq!(strict.threshold(), 0.95);
        assert!(strict.is_empty());

        let lenient = snapshot.restore(&store, 0.8).unwrap();
        assert_eq!(lenient.len(), 1);
    }

    #[test]
    fn test_load_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(
            &path,
            json!({"version": 99, "created_at": Utc::now(), "threshold": 0.8, "schemas": [], "edges": []})
                .to_string(),
        )
        .unwrap();
        assert!(SchemaSnapshot::load(&path).is_err());
    }
}
