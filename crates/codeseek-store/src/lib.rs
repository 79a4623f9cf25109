//! Vector store abstraction used for per-project chunk tables.
//!
//! [`VectorStore`] is the seam between the indexer and the storage engine. Two backends are
//! provided: [`QdrantOps`] for a running Qdrant server and [`InMemoryVectorStore`] for
//! single-process use and tests.

pub mod in_memory_store;
pub mod qdrant_ops;
pub mod vector_store;

pub use in_memory_store::InMemoryVectorStore;
pub use qdrant_ops::QdrantOps;
pub use vector_store::{
    BoxFuture, FieldCondition, FieldValue, ScoredVectorPoint, StoredPoint, VectorFilter,
    VectorPoint, VectorStore, VectorStoreError,
};
