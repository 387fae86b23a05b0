//! # Storage Backend Trait
//!
//! This is THE contract between the query engine and any storage engine.
//! Every operation the planner and executor need is defined here.
//!
//! ## Implementations
//!
//! | Backend | Module | Description |
//! |---------|--------|-------------|
//! | `MemoryBackend` | `memory` | In-memory reference backend, used for testing and embedding |

pub mod memory;

use async_trait::async_trait;

use crate::index::IndexType;
use crate::model::*;
use crate::tx::{Transaction, TxMode};
use crate::{Error, Result};

pub use memory::MemoryBackend;

// ============================================================================
// Backend Configuration
// ============================================================================

/// Configuration for connecting to a storage backend.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// In-memory (no persistence)
    Memory,
}

// ============================================================================
// Expand depth specification
// ============================================================================

/// Depth specification for graph expansion.
#[derive(Debug, Clone, Copy)]
pub enum ExpandDepth {
    /// Exact depth
    Exact(usize),
    /// Range: min..max (inclusive)
    Range { min: usize, max: usize },
    /// Unbounded (up to implementation limit)
    Unbounded,
}

// ============================================================================
// Constraint types
// ============================================================================

/// Type of constraint to create on a label+property pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintType {
    /// Property value must be unique for nodes with this label.
    Unique,
    /// Property must exist on all nodes with this label.
    Exists,
}

// ============================================================================
// Backend capabilities
// ============================================================================

/// What a backend can do — used by the planner for optimization decisions.
///
/// All fields default to false / empty. Backends override via `capabilities()`.
#[derive(Debug, Clone, Default)]
pub struct BackendCapabilities {
    pub supports_vector_index: bool,
    pub supports_fulltext_index: bool,
    pub supports_batch_writes: bool,
    pub max_batch_size: Option<usize>,
    pub similarity_accelerated: bool,
}

// ============================================================================
// Graph-wide statistics, used by the planner's cost model
// ============================================================================

/// Cardinality estimates the optimizer reads when scoring candidate plans.
#[derive(Debug, Clone, Default)]
pub struct GraphStatistics {
    pub node_count: u64,
    pub edge_count: u64,
    pub label_counts: std::collections::HashMap<String, u64>,
    pub rel_type_counts: std::collections::HashMap<String, u64>,
}

// ============================================================================
// StorageBackend Trait
// ============================================================================

/// The universal storage contract.
///
/// Any backend that implements this trait can serve as the storage layer
/// for the query engine. The trait is intentionally broad — backends should
/// return `Error::StorageError("not supported")` for operations they can't
/// handle rather than having a hundred optional methods.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// The transaction type for this backend.
    type Tx: Transaction;

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Shut down the backend, flushing any pending writes.
    async fn shutdown(&self) -> Result<()>;

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begin a new transaction.
    async fn begin_tx(&self, mode: TxMode) -> Result<Self::Tx>;

    /// Commit a transaction.
    async fn commit_tx(&self, tx: Self::Tx) -> Result<()>;

    /// Roll back a transaction.
    async fn rollback_tx(&self, tx: Self::Tx) -> Result<()>;

    // ========================================================================
    // Node CRUD
    // ========================================================================

    /// Create a node with the given labels and properties.
    async fn create_node(&self, tx: &mut Self::Tx, labels: &[&str], props: PropertyMap) -> Result<NodeId>;

    /// Get a node by ID. Returns None if not found.
    async fn get_node(&self, tx: &Self::Tx, id: NodeId) -> Result<Option<Node>>;

    /// Delete a node. Returns true if it existed.
    /// Fails if the node still has edges attached (non-detach semantics).
    async fn delete_node(&self, tx: &mut Self::Tx, id: NodeId) -> Result<bool>;

    /// Set a property on a node (upsert).
    async fn set_node_property(&self, tx: &mut Self::Tx, id: NodeId, key: &str, val: Value) -> Result<()>;

    /// Remove a property from a node.
    async fn remove_node_property(&self, tx: &mut Self::Tx, id: NodeId, key: &str) -> Result<()>;

    /// Add a label to a node.
    async fn add_label(&self, tx: &mut Self::Tx, id: NodeId, label: &str) -> Result<()>;

    /// Remove a label from a node.
    async fn remove_label(&self, tx: &mut Self::Tx, id: NodeId, label: &str) -> Result<()>;

    /// Delete a node and all its edges in one operation (`DETACH DELETE n`).
    ///
    /// Default: get all edges, delete each, then delete the node.
    async fn detach_delete_node(&self, tx: &mut Self::Tx, id: NodeId) -> Result<bool> {
        let edges = self.get_edges(tx, id, Direction::Both, None).await?;
        for edge in &edges {
            self.delete_edge(tx, edge.id).await?;
        }
        self.delete_node(tx, id).await
    }

    // ========================================================================
    // Edge CRUD
    // ========================================================================

    /// Create an edge between two nodes.
    async fn create_edge(
        &self,
        tx: &mut Self::Tx,
        from_id: NodeId,
        to_id: NodeId,
        rel_type: &str,
        props: PropertyMap,
    ) -> Result<RelId>;

    /// Get an edge by ID.
    async fn get_edge(&self, tx: &Self::Tx, id: RelId) -> Result<Option<Edge>>;

    /// Delete an edge. Returns true if it existed.
    async fn delete_edge(&self, tx: &mut Self::Tx, id: RelId) -> Result<bool>;

    /// Set a property on an edge (upsert).
    async fn set_edge_property(&self, tx: &mut Self::Tx, id: RelId, key: &str, val: Value) -> Result<()>;

    /// Remove a property from an edge.
    async fn remove_edge_property(&self, tx: &mut Self::Tx, id: RelId, key: &str) -> Result<()>;

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Get all edges of a node, optionally filtered by direction and type.
    async fn get_edges(
        &self,
        tx: &Self::Tx,
        node: NodeId,
        dir: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Edge>>;

    /// Get only outgoing edges of a node, optionally filtered by type.
    ///
    /// Default: delegates to `get_edges` with `Direction::Outgoing`.
    async fn get_outgoing_edges(&self, tx: &Self::Tx, node: NodeId, rel_type: Option<&str>) -> Result<Vec<Edge>> {
        self.get_edges(tx, node, Direction::Outgoing, rel_type).await
    }

    /// Get only incoming edges of a node, optionally filtered by type.
    ///
    /// Default: delegates to `get_edges` with `Direction::Incoming`.
    async fn get_incoming_edges(&self, tx: &Self::Tx, node: NodeId, rel_type: Option<&str>) -> Result<Vec<Edge>> {
        self.get_edges(tx, node, Direction::Incoming, rel_type).await
    }

    /// Expand from a node: BFS/DFS traversal to the given depth.
    async fn expand(
        &self,
        tx: &Self::Tx,
        node: NodeId,
        dir: Direction,
        rel_types: &[&str],
        depth: ExpandDepth,
    ) -> Result<Vec<Path>>;

    // ========================================================================
    // Index
    // ========================================================================

    /// Create an index on a label+property combination.
    async fn create_index(&self, label: &str, property: &str, index_type: IndexType) -> Result<()>;

    /// Drop an index.
    async fn drop_index(&self, label: &str, property: &str) -> Result<()>;

    /// Whether a usable index exists for `label`+`property`. The optimizer's
    /// index-substitution pass calls this before rewriting a label+property
    /// scan into an `IndexLookup` step.
    ///
    /// Default: no indexes exist.
    async fn has_property_index(&self, _label: &str, _property: &str) -> Result<bool> {
        Ok(false)
    }

    // ========================================================================
    // Schema introspection
    // ========================================================================

    /// Total number of nodes.
    async fn node_count(&self, tx: &Self::Tx) -> Result<u64>;

    /// Total number of edges.
    async fn edge_count(&self, tx: &Self::Tx) -> Result<u64>;

    /// All distinct labels in the graph.
    async fn labels(&self, tx: &Self::Tx) -> Result<Vec<String>>;

    /// All distinct edge types in the graph.
    async fn rel_types(&self, tx: &Self::Tx) -> Result<Vec<String>>;

    /// Cardinality estimates for the planner's cost model.
    ///
    /// Default: derives coarse counts from `node_count`/`edge_count`/`labels`/
    /// `rel_types` without per-label breakdowns.
    async fn statistics(&self, tx: &Self::Tx) -> Result<GraphStatistics> {
        Ok(GraphStatistics {
            node_count: self.node_count(tx).await?,
            edge_count: self.edge_count(tx).await?,
            label_counts: std::collections::HashMap::new(),
            rel_type_counts: std::collections::HashMap::new(),
        })
    }

    // ========================================================================
    // Scan
    // ========================================================================

    /// Return all nodes (no label filter).
    async fn all_nodes(&self, tx: &Self::Tx) -> Result<Vec<Node>>;

    /// Find all nodes with a given label.
    async fn nodes_by_label(&self, tx: &Self::Tx, label: &str) -> Result<Vec<Node>>;

    /// Find nodes by label + property value (index-backed if available).
    async fn nodes_by_property(&self, tx: &Self::Tx, label: &str, key: &str, value: &Value) -> Result<Vec<Node>>;

    /// Find all edges of a given type.
    ///
    /// Default: scans all nodes and collects their outgoing edges of that type.
    async fn edges_by_type(&self, tx: &Self::Tx, rel_type: &str) -> Result<Vec<Edge>> {
        let mut result = Vec::new();
        let nodes = self.all_nodes(tx).await?;
        for node in &nodes {
            let edges = self.get_edges(tx, node.id, Direction::Outgoing, Some(rel_type)).await?;
            result.extend(edges);
        }
        Ok(result)
    }

    // ========================================================================
    // Constraints
    // ========================================================================

    /// Create a schema constraint.
    ///
    /// Default returns "not supported" — this engine's query grammar has no
    /// DDL surface, but a backend may still expose constraints programmatically.
    async fn create_constraint(&self, _label: &str, _property: &str, _constraint_type: ConstraintType) -> Result<()> {
        Err(Error::StorageError("constraints not supported".into()))
    }

    /// Drop a schema constraint.
    async fn drop_constraint(&self, _label: &str, _property: &str) -> Result<()> {
        Err(Error::StorageError("constraints not supported".into()))
    }

    // ========================================================================
    // Batch operations
    // ========================================================================

    /// Batch create nodes.
    ///
    /// Default falls back to sequential `create_node` calls.
    async fn create_nodes_batch(&self, tx: &mut Self::Tx, nodes: Vec<(Vec<String>, PropertyMap)>) -> Result<Vec<NodeId>> {
        let mut ids = Vec::with_capacity(nodes.len());
        for (labels, props) in nodes {
            let label_refs: Vec<&str> = labels.iter().map(|s| s.as_str()).collect();
            ids.push(self.create_node(tx, &label_refs, props).await?);
        }
        Ok(ids)
    }

    /// Batch create edges.
    ///
    /// Default falls back to sequential `create_edge` calls.
    async fn create_edges_batch(
        &self,
        tx: &mut Self::Tx,
        edges: Vec<(NodeId, NodeId, String, PropertyMap)>,
    ) -> Result<Vec<RelId>> {
        let mut ids = Vec::with_capacity(edges.len());
        for (from_id, to_id, rel_type, props) in edges {
            ids.push(self.create_edge(tx, from_id, to_id, &rel_type, props).await?);
        }
        Ok(ids)
    }

    // ========================================================================
    // Vector and fulltext collaborators
    // ========================================================================

    /// Vector similarity search. Returns `(NodeId, distance)` pairs ordered
    /// nearest-first in the backend's native metric; the optimizer's
    /// vector-search pass is responsible for converting distance to the
    /// score convention the query expects.
    ///
    /// Default returns "not supported" — `MemoryBackend` overrides with a
    /// brute-force scan.
    async fn vector_query(&self, _tx: &Self::Tx, _label: &str, _property: &str, _query: &[f32], _k: usize) -> Result<Vec<(NodeId, f64)>> {
        Err(Error::StorageError("vector index not supported".into()))
    }

    /// Full-text search over a property, returning `(NodeId, score)` pairs.
    ///
    /// Default returns "not supported" — `MemoryBackend` overrides with a
    /// naive substring-match scorer.
    async fn fulltext_query(&self, _tx: &Self::Tx, _label: &str, _property: &str, _query: &str, _k: usize) -> Result<Vec<(NodeId, f64)>> {
        Err(Error::StorageError("fulltext index not supported".into()))
    }

    // ========================================================================
    // Capability negotiation
    // ========================================================================

    /// Report what this backend can do.
    ///
    /// The planner uses this to choose optimization strategies. For example,
    /// if `similarity_accelerated` is true, the optimizer can push a
    /// vector-search step into the scan operator instead of post-filtering.
    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::default()
    }
}
