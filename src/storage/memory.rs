//! In-memory storage backend.
//!
//! This is the reference implementation of `StorageBackend`.
//! It uses simple HashMaps protected by RwLock.
//!
//! ## Limitations
//!
//! - **No real transactions**: `commit_tx()` and `rollback_tx()` are no-ops.
//!   Writes are applied immediately. Rollback does NOT undo mutations.
//! - **Single-writer only**: Per-collection locks mean multi-step mutations
//!   are NOT atomic. Safe for single-threaded or read-heavy use only.
//! - **Brute-force property/vector/fulltext lookups**: no real indexes are
//!   maintained; `create_index()` only records that an index was requested
//!   so `has_property_index()` can report it to the optimizer.
//!
//! Use this backend for testing the Cypher parser, planner, and execution
//! engine, and for embedding the engine in applications that don't need
//! persistence.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{ExpandDepth, StorageBackend};
use crate::index::IndexType;
use crate::model::*;
use crate::tx::{Transaction, TxId, TxMode};
use crate::{Error, Result};

// ============================================================================
// MemoryBackend
// ============================================================================

/// In-memory property graph storage.
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

struct MemoryInner {
    nodes: RwLock<HashMap<NodeId, Node>>,
    edges: RwLock<HashMap<RelId, Edge>>,
    /// node_id → list of edge IDs
    adjacency: RwLock<HashMap<NodeId, Vec<RelId>>>,
    /// label → set of node IDs (poor man's label index)
    label_index: RwLock<HashMap<String, Vec<NodeId>>>,
    /// (label, property) pairs an index was requested for, so the optimizer
    /// can route label+property filters through `nodes_by_property` instead
    /// of a full label scan. Does not change the lookup strategy itself —
    /// `nodes_by_property` is always a brute-force scan here.
    property_indexes: RwLock<HashSet<(String, String)>>,
    next_node_id: AtomicU64,
    next_rel_id: AtomicU64,
    next_tx_id: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                nodes: RwLock::new(HashMap::new()),
                edges: RwLock::new(HashMap::new()),
                adjacency: RwLock::new(HashMap::new()),
                label_index: RwLock::new(HashMap::new()),
                property_indexes: RwLock::new(HashSet::new()),
                next_node_id: AtomicU64::new(1),
                next_rel_id: AtomicU64::new(1),
                next_tx_id: AtomicU64::new(1),
            }),
        }
    }
}

// ============================================================================
// MemoryTx
// ============================================================================

/// In-memory transaction (currently just a marker — no real MVCC).
pub struct MemoryTx {
    id: TxId,
    mode: TxMode,
}

impl Transaction for MemoryTx {
    fn mode(&self) -> TxMode {
        self.mode
    }
    fn id(&self) -> TxId {
        self.id
    }
}

// ============================================================================
// StorageBackend impl
// ============================================================================

#[async_trait]
impl StorageBackend for MemoryBackend {
    type Tx = MemoryTx;

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn begin_tx(&self, mode: TxMode) -> Result<MemoryTx> {
        let id = TxId(self.inner.next_tx_id.fetch_add(1, Ordering::Relaxed));
        Ok(MemoryTx { id, mode })
    }

    /// No-op: memory backend applies writes immediately, not on commit.
    async fn commit_tx(&self, _tx: MemoryTx) -> Result<()> {
        Ok(())
    }

    /// No-op: memory backend has no write-ahead log. Mutations applied
    /// during this transaction are NOT reverted.
    async fn rollback_tx(&self, _tx: MemoryTx) -> Result<()> {
        Ok(())
    }

    // ========================================================================
    // Node CRUD
    // ========================================================================

    async fn create_node(&self, _tx: &mut MemoryTx, labels: &[&str], props: PropertyMap) -> Result<NodeId> {
        let id = NodeId(self.inner.next_node_id.fetch_add(1, Ordering::Relaxed));
        let node = Node { id, labels: labels.iter().map(|l| l.to_string()).collect(), properties: props };

        {
            let mut idx = self.inner.label_index.write();
            for label in &node.labels {
                idx.entry(label.clone()).or_default().push(id);
            }
        }

        self.inner.nodes.write().insert(id, node);
        self.inner.adjacency.write().insert(id, Vec::new());

        Ok(id)
    }

    async fn get_node(&self, _tx: &MemoryTx, id: NodeId) -> Result<Option<Node>> {
        Ok(self.inner.nodes.read().get(&id).cloned())
    }

    async fn delete_node(&self, _tx: &mut MemoryTx, id: NodeId) -> Result<bool> {
        {
            let adj = self.inner.adjacency.read();
            if let Some(edges) = adj.get(&id) {
                if !edges.is_empty() {
                    return Err(Error::ConstraintViolation(format!(
                        "cannot delete node {id} with {} edges attached; use DETACH DELETE",
                        edges.len()
                    )));
                }
            }
        }

        let removed = self.inner.nodes.write().remove(&id);
        self.inner.adjacency.write().remove(&id);

        if let Some(node) = &removed {
            let mut idx = self.inner.label_index.write();
            for label in &node.labels {
                if let Some(ids) = idx.get_mut(label) {
                    ids.retain(|nid| *nid != id);
                }
            }
        }

        Ok(removed.is_some())
    }

    async fn set_node_property(&self, _tx: &mut MemoryTx, id: NodeId, key: &str, val: Value) -> Result<()> {
        let mut nodes = self.inner.nodes.write();
        let node = nodes.get_mut(&id).ok_or_else(|| Error::NotFound(format!("node {id}")))?;
        node.properties.insert(key.to_string(), val);
        Ok(())
    }

    async fn remove_node_property(&self, _tx: &mut MemoryTx, id: NodeId, key: &str) -> Result<()> {
        let mut nodes = self.inner.nodes.write();
        let node = nodes.get_mut(&id).ok_or_else(|| Error::NotFound(format!("node {id}")))?;
        node.properties.remove(key);
        Ok(())
    }

    async fn add_label(&self, _tx: &mut MemoryTx, id: NodeId, label: &str) -> Result<()> {
        let mut nodes = self.inner.nodes.write();
        let node = nodes.get_mut(&id).ok_or_else(|| Error::NotFound(format!("node {id}")))?;
        if !node.labels.iter().any(|l| l == label) {
            node.labels.push(label.to_string());
            drop(nodes);
            self.inner.label_index.write().entry(label.to_string()).or_default().push(id);
        }
        Ok(())
    }

    async fn remove_label(&self, _tx: &mut MemoryTx, id: NodeId, label: &str) -> Result<()> {
        let mut nodes = self.inner.nodes.write();
        let node = nodes.get_mut(&id).ok_or_else(|| Error::NotFound(format!("node {id}")))?;
        node.labels.retain(|l| l != label);
        drop(nodes);
        let mut idx = self.inner.label_index.write();
        if let Some(ids) = idx.get_mut(label) {
            ids.retain(|nid| *nid != id);
        }
        Ok(())
    }

    // ========================================================================
    // Edge CRUD
    // ========================================================================

    async fn create_edge(
        &self,
        _tx: &mut MemoryTx,
        from_id: NodeId,
        to_id: NodeId,
        rel_type: &str,
        props: PropertyMap,
    ) -> Result<RelId> {
        {
            let nodes = self.inner.nodes.read();
            if !nodes.contains_key(&from_id) {
                return Err(Error::NotFound(format!("source node {from_id}")));
            }
            if !nodes.contains_key(&to_id) {
                return Err(Error::NotFound(format!("target node {to_id}")));
            }
        }

        let id = RelId(self.inner.next_rel_id.fetch_add(1, Ordering::Relaxed));
        let edge = Edge { id, from_id, to_id, rel_type: rel_type.to_string(), properties: props, weight: 1.0 };

        self.inner.edges.write().insert(id, edge);

        let mut adj = self.inner.adjacency.write();
        adj.entry(from_id).or_default().push(id);
        if from_id != to_id {
            adj.entry(to_id).or_default().push(id);
        }

        Ok(id)
    }

    async fn get_edge(&self, _tx: &MemoryTx, id: RelId) -> Result<Option<Edge>> {
        Ok(self.inner.edges.read().get(&id).cloned())
    }

    async fn set_edge_property(&self, _tx: &mut MemoryTx, id: RelId, key: &str, val: Value) -> Result<()> {
        let mut edges = self.inner.edges.write();
        let edge = edges.get_mut(&id).ok_or_else(|| Error::NotFound(format!("edge {id}")))?;
        edge.properties.insert(key.to_string(), val);
        Ok(())
    }

    async fn remove_edge_property(&self, _tx: &mut MemoryTx, id: RelId, key: &str) -> Result<()> {
        let mut edges = self.inner.edges.write();
        let edge = edges.get_mut(&id).ok_or_else(|| Error::NotFound(format!("edge {id}")))?;
        edge.properties.remove(key);
        Ok(())
    }

    async fn delete_edge(&self, _tx: &mut MemoryTx, id: RelId) -> Result<bool> {
        let removed = self.inner.edges.write().remove(&id);
        if let Some(edge) = &removed {
            let mut adj = self.inner.adjacency.write();
            if let Some(edges) = adj.get_mut(&edge.from_id) {
                edges.retain(|eid| *eid != id);
            }
            if edge.from_id != edge.to_id {
                if let Some(edges) = adj.get_mut(&edge.to_id) {
                    edges.retain(|eid| *eid != id);
                }
            }
        }
        Ok(removed.is_some())
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    async fn get_edges(&self, _tx: &MemoryTx, node: NodeId, dir: Direction, rel_type: Option<&str>) -> Result<Vec<Edge>> {
        let adj = self.inner.adjacency.read();
        let edges = self.inner.edges.read();

        let edge_ids = adj.get(&node).cloned().unwrap_or_default();
        let mut result = Vec::new();

        for eid in edge_ids {
            if let Some(edge) = edges.get(&eid) {
                let matches_dir = match dir {
                    Direction::Outgoing => edge.from_id == node,
                    Direction::Incoming => edge.to_id == node,
                    Direction::Both => true,
                };
                let matches_type = rel_type.map_or(true, |t| edge.rel_type == t);

                if matches_dir && matches_type {
                    result.push(edge.clone());
                }
            }
        }

        Ok(result)
    }

    async fn expand(
        &self,
        tx: &MemoryTx,
        node: NodeId,
        dir: Direction,
        rel_types: &[&str],
        depth: ExpandDepth,
    ) -> Result<Vec<Path>> {
        let (min_depth, max_depth) = match depth {
            ExpandDepth::Exact(d) => (d, d),
            ExpandDepth::Range { min, max } => (min, max),
            ExpandDepth::Unbounded => (1, 50), // safety ceiling
        };

        let mut results = Vec::new();
        let start_node = self.get_node(tx, node).await?.ok_or_else(|| Error::NotFound(format!("node {node}")))?;

        let mut queue: Vec<Path> = vec![Path::single(start_node)];

        for current_depth in 0..max_depth {
            let mut next_queue = Vec::new();

            for path in &queue {
                let tip = path.end();
                let edges = self.get_edges(tx, tip.id, dir, None).await?;

                for edge in edges {
                    if !rel_types.is_empty() && !rel_types.contains(&edge.rel_type.as_str()) {
                        continue;
                    }

                    let next_id = edge.other_node(tip.id).unwrap_or(edge.to_id);

                    if path.nodes.iter().any(|n| n.id == next_id) {
                        continue;
                    }

                    if let Some(next_node) = self.get_node(tx, next_id).await? {
                        let mut new_path = path.clone();
                        new_path.append(edge, next_node);

                        if current_depth + 1 >= min_depth {
                            results.push(new_path.clone());
                        }
                        if current_depth + 1 < max_depth {
                            next_queue.push(new_path);
                        }
                    }
                }
            }

            queue = next_queue;
            if queue.is_empty() {
                break;
            }
        }

        Ok(results)
    }

    // ========================================================================
    // Index
    // ========================================================================

    async fn create_index(&self, label: &str, property: &str, _index_type: IndexType) -> Result<()> {
        self.inner.property_indexes.write().insert((label.to_string(), property.to_string()));
        Ok(())
    }

    async fn drop_index(&self, label: &str, property: &str) -> Result<()> {
        self.inner.property_indexes.write().remove(&(label.to_string(), property.to_string()));
        Ok(())
    }

    async fn has_property_index(&self, label: &str, property: &str) -> Result<bool> {
        Ok(self.inner.property_indexes.read().contains(&(label.to_string(), property.to_string())))
    }

    // ========================================================================
    // Schema introspection
    // ========================================================================

    async fn node_count(&self, _tx: &MemoryTx) -> Result<u64> {
        Ok(self.inner.nodes.read().len() as u64)
    }

    async fn edge_count(&self, _tx: &MemoryTx) -> Result<u64> {
        Ok(self.inner.edges.read().len() as u64)
    }

    async fn labels(&self, _tx: &MemoryTx) -> Result<Vec<String>> {
        Ok(self.inner.label_index.read().keys().cloned().collect())
    }

    async fn rel_types(&self, _tx: &MemoryTx) -> Result<Vec<String>> {
        let edges = self.inner.edges.read();
        let mut types: Vec<String> = edges.values().map(|e| e.rel_type.clone()).collect();
        types.sort();
        types.dedup();
        Ok(types)
    }

    // ========================================================================
    // Scan
    // ========================================================================

    async fn all_nodes(&self, _tx: &MemoryTx) -> Result<Vec<Node>> {
        Ok(self.inner.nodes.read().values().cloned().collect())
    }

    async fn nodes_by_label(&self, _tx: &MemoryTx, label: &str) -> Result<Vec<Node>> {
        let idx = self.inner.label_index.read();
        let nodes = self.inner.nodes.read();

        let ids = idx.get(label).cloned().unwrap_or_default();
        Ok(ids.iter().filter_map(|id| nodes.get(id).cloned()).collect())
    }

    async fn nodes_by_property(&self, _tx: &MemoryTx, label: &str, key: &str, value: &Value) -> Result<Vec<Node>> {
        let idx = self.inner.label_index.read();
        let nodes = self.inner.nodes.read();

        let ids = idx.get(label).cloned().unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| nodes.get(id))
            .filter(|n| n.get(key).is_some_and(|v| v.values_equal(value)))
            .cloned()
            .collect())
    }

    // ========================================================================
    // Vector / fulltext
    // ========================================================================

    /// Brute-force cosine distance over every node carrying a `Value::Vector`
    /// at `property`. Not accelerated — exists so the planner's
    /// vector-search rewrite has something real to call against.
    async fn vector_query(&self, tx: &MemoryTx, label: &str, property: &str, query: &[f32], k: usize) -> Result<Vec<(NodeId, f64)>> {
        let nodes = self.nodes_by_label(tx, label).await?;
        let mut scored: Vec<(NodeId, f64)> = nodes
            .into_iter()
            .filter_map(|n| match n.properties.get(property) {
                Some(Value::Vector(v)) => Some((n.id, cosine_distance(query, v))),
                _ => None,
            })
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    /// Naive case-insensitive substring scorer: score is the fraction of
    /// the query's characters that matched as a contiguous substring.
    async fn fulltext_query(&self, tx: &MemoryTx, label: &str, property: &str, query: &str, k: usize) -> Result<Vec<(NodeId, f64)>> {
        let needle = query.to_lowercase();
        let nodes = self.nodes_by_label(tx, label).await?;
        let mut scored: Vec<(NodeId, f64)> = nodes
            .into_iter()
            .filter_map(|n| match n.properties.get(property) {
                Some(Value::String(s)) if s.to_lowercase().contains(&needle) && !needle.is_empty() => {
                    Some((n.id, needle.len() as f64 / s.len().max(1) as f64))
                }
                _ => None,
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - (dot / (norm_a * norm_b)) as f64
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get_node() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let mut props = PropertyMap::new();
        props.insert("name".into(), Value::from("Ada"));

        let id = db.create_node(&mut tx, &["Person"], props).await.unwrap();
        let node = db.get_node(&tx, id).await.unwrap().unwrap();

        assert_eq!(node.labels, vec!["Person"]);
        assert_eq!(node.get("name"), Some(&Value::from("Ada")));
    }

    #[tokio::test]
    async fn test_create_edge() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();
        let b = db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();

        let edge_id = db.create_edge(&mut tx, a, b, "KNOWS", PropertyMap::new()).await.unwrap();
        let edge = db.get_edge(&tx, edge_id).await.unwrap().unwrap();

        assert_eq!(edge.from_id, a);
        assert_eq!(edge.to_id, b);
        assert_eq!(edge.rel_type, "KNOWS");
        assert_eq!(edge.weight, 1.0);
    }

    #[tokio::test]
    async fn test_cannot_delete_connected_node() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();
        let b = db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();
        db.create_edge(&mut tx, a, b, "KNOWS", PropertyMap::new()).await.unwrap();

        let result = db.delete_node(&mut tx, a).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_all_nodes() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();
        db.create_node(&mut tx, &["Company"], PropertyMap::new()).await.unwrap();
        db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();

        let all = db.all_nodes(&tx).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_detach_delete_node() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();
        let b = db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();
        db.create_edge(&mut tx, a, b, "KNOWS", PropertyMap::new()).await.unwrap();

        assert!(db.delete_node(&mut tx, a).await.is_err());

        assert!(db.detach_delete_node(&mut tx, a).await.unwrap());
        assert!(db.get_node(&tx, a).await.unwrap().is_none());
        assert_eq!(db.edge_count(&tx).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_edge_properties() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();
        let b = db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();
        let edge_id = db.create_edge(&mut tx, a, b, "KNOWS", PropertyMap::new()).await.unwrap();

        db.set_edge_property(&mut tx, edge_id, "since", Value::from(2025i64)).await.unwrap();
        let edge = db.get_edge(&tx, edge_id).await.unwrap().unwrap();
        assert_eq!(edge.properties.get("since"), Some(&Value::from(2025i64)));

        db.remove_edge_property(&mut tx, edge_id, "since").await.unwrap();
        let edge = db.get_edge(&tx, edge_id).await.unwrap().unwrap();
        assert!(edge.properties.get("since").is_none());
    }

    #[tokio::test]
    async fn test_edges_by_type() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();
        let b = db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();
        let c = db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();

        db.create_edge(&mut tx, a, b, "KNOWS", PropertyMap::new()).await.unwrap();
        db.create_edge(&mut tx, b, c, "WORKS_WITH", PropertyMap::new()).await.unwrap();
        db.create_edge(&mut tx, a, c, "KNOWS", PropertyMap::new()).await.unwrap();

        let knows = db.edges_by_type(&tx, "KNOWS").await.unwrap();
        assert_eq!(knows.len(), 2);

        let works = db.edges_by_type(&tx, "WORKS_WITH").await.unwrap();
        assert_eq!(works.len(), 1);
    }

    #[tokio::test]
    async fn test_traversal() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();
        let b = db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();
        let c = db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();

        db.create_edge(&mut tx, a, b, "KNOWS", PropertyMap::new()).await.unwrap();
        db.create_edge(&mut tx, b, c, "KNOWS", PropertyMap::new()).await.unwrap();

        let paths = db.expand(&tx, a, Direction::Outgoing, &["KNOWS"], ExpandDepth::Range { min: 1, max: 2 }).await.unwrap();

        assert_eq!(paths.len(), 2);
    }

    #[tokio::test]
    async fn test_property_index_registration() {
        let db = MemoryBackend::new();
        assert!(!db.has_property_index("Person", "name").await.unwrap());
        db.create_index("Person", "name", IndexType::BTree).await.unwrap();
        assert!(db.has_property_index("Person", "name").await.unwrap());
    }

    #[tokio::test]
    async fn test_vector_query_orders_by_distance() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let mut near = PropertyMap::new();
        near.insert("embedding".into(), Value::Vector(vec![1.0, 0.0]));
        let mut far = PropertyMap::new();
        far.insert("embedding".into(), Value::Vector(vec![0.0, 1.0]));

        db.create_node(&mut tx, &["Doc"], near).await.unwrap();
        db.create_node(&mut tx, &["Doc"], far).await.unwrap();

        let results = db.vector_query(&tx, "Doc", "embedding", &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].1 < results[1].1);
    }

    #[tokio::test]
    async fn test_fulltext_query_matches_substring() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let mut props = PropertyMap::new();
        props.insert("bio".into(), Value::from("graph database enthusiast"));
        db.create_node(&mut tx, &["Person"], props).await.unwrap();

        let results = db.fulltext_query(&tx, "Person", "bio", "database", 5).await.unwrap();
        assert_eq!(results.len(), 1);
    }
}
