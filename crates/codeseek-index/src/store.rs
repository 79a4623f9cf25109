//! Per-project chunk tables on top of a [`VectorStore`] backend.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use codeseek_llm::LlmProvider;
use codeseek_store::{
    FieldValue, InMemoryVectorStore, QdrantOps, StoredPoint, VectorFilter, VectorPoint,
    VectorStore, VectorStoreError,
};
use serde_json::Value;

use crate::embedder::{Embedder, PROBE_TEXT};
use crate::error::{IndexError, Result};
use crate::project::Project;

const COLLECTION_PREFIX: &str = "codeseek_";

/// A chunk ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    pub id: String,
    pub file: String,
    pub mtime: i64,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A stored chunk, read back without its embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRow {
    pub id: String,
    pub file: String,
    pub mtime: i64,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub row: ChunkRow,
    /// `1 - cosine similarity`; lower is closer.
    pub distance: f32,
}

/// Equality conditions on stored rows. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkPredicate {
    pub file: Option<String>,
    pub mtime: Option<i64>,
    pub id: Option<String>,
}

impl ChunkPredicate {
    #[must_use]
    pub fn file(file: impl Into<String>) -> Self {
        Self {
            file: Some(file.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn file_at(file: impl Into<String>, mtime: i64) -> Self {
        Self {
            file: Some(file.into()),
            mtime: Some(mtime),
            id: None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.file.is_none() && self.mtime.is_none() && self.id.is_none()
    }

    fn to_filter(&self) -> VectorFilter {
        let mut filter = VectorFilter::default();
        if let Some(file) = &self.file {
            filter = filter.must("file", FieldValue::Text(file.clone()));
        }
        if let Some(mtime) = self.mtime {
            filter = filter.must("mtime", FieldValue::Integer(mtime));
        }
        if let Some(id) = &self.id {
            filter = filter.must("id", FieldValue::Text(id.clone()));
        }
        filter
    }
}

/// Process-wide handle on the vector backend.
#[derive(Clone)]
pub struct CodeStore {
    backend: Arc<dyn VectorStore>,
}

impl std::fmt::Debug for CodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeStore").finish_non_exhaustive()
    }
}

impl CodeStore {
    #[must_use]
    pub fn new(backend: Arc<dyn VectorStore>) -> Self {
        Self { backend }
    }

    /// # Errors
    ///
    /// Returns an error if the `Qdrant` client cannot be built for `url`.
    pub fn qdrant(url: &str) -> Result<Self> {
        let ops = QdrantOps::new(url).map_err(|e| VectorStoreError::Connection(e.to_string()))?;
        Ok(Self::new(Arc::new(ops)))
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryVectorStore::new()))
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn VectorStore> {
        &self.backend
    }

    /// Open the table for `project` if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Store`] if the backend cannot be queried.
    pub async fn open(&self, project: &Project) -> Result<Option<ProjectTable>> {
        let name = collection_name(project);
        let Some(size) = self.backend.vector_size(&name).await? else {
            return Ok(None);
        };
        Ok(Some(self.table(name, size)?))
    }

    /// Open the table for `project`, creating it on first use.
    ///
    /// A new table's dimension comes from one probe embedding.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the probe embedding is rejected.
    pub async fn open_or_create<P: LlmProvider>(
        &self,
        project: &Project,
        embedder: &Embedder<P>,
    ) -> Result<ProjectTable> {
        if let Some(table) = self.open(project).await? {
            return Ok(table);
        }
        let probe = embedder.embed(PROBE_TEXT).await?;
        let name = collection_name(project);
        let size = probe.len() as u64;
        self.backend.ensure_collection(&name, size).await?;
        tracing::info!(project = project.id(), dimension = size, "created index table");
        // A concurrent creator may have won with a different probe; trust the store.
        let size = self.backend.vector_size(&name).await?.unwrap_or(size);
        self.table(name, size)
    }

    fn table(&self, name: String, size: u64) -> Result<ProjectTable> {
        let dimension = usize::try_from(size)
            .map_err(|_| IndexError::Other(format!("vector size {size} out of range")))?;
        Ok(ProjectTable {
            backend: Arc::clone(&self.backend),
            name,
            dimension,
        })
    }
}

/// Backend collection name for a project.
#[must_use]
pub fn collection_name(project: &Project) -> String {
    format!("{COLLECTION_PREFIX}{}", project.id())
}

/// One project's chunk table.
#[derive(Clone)]
pub struct ProjectTable {
    backend: Arc<dyn VectorStore>,
    name: String,
    dimension: usize,
}

impl std::fmt::Debug for ProjectTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectTable")
            .field("name", &self.name)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl ProjectTable {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Write rows. Callers remove stale rows for the file beforehand.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Embedding`] on a dimension mismatch, or
    /// [`IndexError::Store`] if the write fails.
    pub async fn upsert(&self, rows: Vec<IndexedChunk>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut points = Vec::with_capacity(rows.len());
        for row in rows {
            if row.embedding.len() != self.dimension {
                return Err(IndexError::Embedding(format!(
                    "chunk {} has {} dimensions, table {} expects {}",
                    row.id,
                    row.embedding.len(),
                    self.name,
                    self.dimension
                )));
            }
            points.push(to_point(row));
        }
        self.backend.upsert(&self.name, points).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Rejects an empty predicate; otherwise fails only if the backend does.
    pub async fn delete_where(&self, predicate: &ChunkPredicate) -> Result<()> {
        if predicate.is_empty() {
            return Err(IndexError::Other(
                "refusing to delete with an empty predicate".into(),
            ));
        }
        self.backend
            .delete_by_filter(&self.name, predicate.to_filter())
            .await?;
        Ok(())
    }

    /// Rows matching `predicate`, every row when it is empty.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Store`] if the scroll fails.
    pub async fn query_where(&self, predicate: &ChunkPredicate) -> Result<Vec<ChunkRow>> {
        let filter = (!predicate.is_empty()).then(|| predicate.to_filter());
        let points = self.backend.scroll(&self.name, filter).await?;
        points.into_iter().map(from_stored).collect()
    }

    /// Nearest `k` rows ordered by non-decreasing distance.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Store`] if the search fails.
    pub async fn vector_search(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let hits = self
            .backend
            .search(&self.name, embedding.to_vec(), k as u64, None)
            .await?;
        let mut out = hits
            .into_iter()
            .map(|hit| {
                let row = from_payload(hit.id, hit.payload)?;
                Ok(ScoredChunk {
                    row,
                    distance: 1.0 - hit.score,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        out.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(out)
    }

    /// Distinct source files that have at least one row.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Store`] if the scroll fails.
    pub async fn indexed_files(&self) -> Result<BTreeSet<String>> {
        let rows = self.query_where(&ChunkPredicate::default()).await?;
        Ok(rows.into_iter().map(|r| r.file).collect())
    }
}

/// Deterministic backend point id for a textual chunk id.
#[must_use]
pub fn point_id(chunk_id: &str) -> String {
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string()
}

fn to_point(row: IndexedChunk) -> VectorPoint {
    let mut payload = HashMap::with_capacity(4);
    payload.insert("id".to_owned(), Value::from(row.id.clone()));
    payload.insert("file".to_owned(), Value::from(row.file));
    payload.insert("mtime".to_owned(), Value::from(row.mtime));
    payload.insert("text".to_owned(), Value::from(row.text));
    VectorPoint {
        id: point_id(&row.id),
        vector: row.embedding,
        payload,
    }
}

fn from_stored(point: StoredPoint) -> Result<ChunkRow> {
    from_payload(point.id, point.payload)
}

fn from_payload(point_id: String, payload: HashMap<String, Value>) -> Result<ChunkRow> {
    let text_field = |key: &str| -> Result<String> {
        payload
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| malformed(&point_id, key))
    };
    let mtime = payload
        .get("mtime")
        .and_then(Value::as_i64)
        .ok_or_else(|| malformed(&point_id, "mtime"))?;
    Ok(ChunkRow {
        id: text_field("id")?,
        file: text_field("file")?,
        mtime,
        text: text_field("text")?,
    })
}

fn malformed(point_id: &str, field: &str) -> IndexError {
    IndexError::Store(VectorStoreError::Serialization(format!(
        "point {point_id} is missing payload field `{field}`"
    )))
}
