//! # cyrene — an embedded Cypher-subset graph query engine
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `StorageBackend` is the contract between query engine and storage
//! 2. **Clean DTOs**: `Node`, `Edge`, `Value` cross all boundaries
//! 3. **Parser owns nothing**: Cypher → AST is a pure function
//! 4. **Backend-agnostic planner**: logical plans don't know about storage
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cyrene::{Graph, Node, Value, PropertyMap};
//!
//! # async fn example() -> cyrene::Result<()> {
//! let graph = Graph::open_memory().await?;
//!
//! let mut params = PropertyMap::new();
//! params.insert("name".into(), Value::from("Ada"));
//! let result = graph.execute(
//!     "CREATE (n:Person {name: $name}) RETURN n",
//!     params,
//! ).await?;
//!
//! for row in &result.rows {
//!     println!("{:?}", row.get::<Node>("n")?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Storage Backends
//!
//! | Backend | Module | Description |
//! |---------|--------|-------------|
//! | `MemoryBackend` | `storage::memory` | In-memory reference backend, used for testing and embedding |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod cypher;
pub mod planner;
pub mod execution;
pub mod storage;
pub mod tx;
pub mod index;
pub mod config;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{Direction, Edge, Node, NodeId, Path, PropertyMap, RelId, Value};

// ============================================================================
// Re-exports: Storage
// ============================================================================

pub use storage::{BackendCapabilities, BackendConfig, ConstraintType, GraphStatistics, StorageBackend};

// ============================================================================
// Re-exports: Transactions
// ============================================================================

pub use tx::{Transaction, TxId, TxMode};

// ============================================================================
// Re-exports: Execution
// ============================================================================

pub use execution::{CancellationToken, ExecutionStats, QueryResult, ResultRow};

// ============================================================================
// Re-exports: Configuration
// ============================================================================

pub use config::EngineConfig;

// ============================================================================
// Top-level Graph handle
// ============================================================================

/// The primary entry point. A `Graph` wraps a storage backend and
/// provides Cypher execution.
pub struct Graph<B: StorageBackend> {
    backend: B,
    config: EngineConfig,
}

impl<B: StorageBackend> Graph<B> {
    /// Create a Graph with the given backend and default engine configuration.
    pub fn with_backend(backend: B) -> Self {
        Self { backend, config: EngineConfig::default() }
    }

    /// Create a Graph with the given backend and an explicit configuration.
    pub fn with_backend_and_config(backend: B, config: EngineConfig) -> Self {
        Self { backend, config }
    }

    /// Execute a read-only Cypher query with parameters.
    pub async fn execute<P>(&self, query: &str, params: P) -> Result<QueryResult>
    where
        P: Into<PropertyMap>,
    {
        self.run(query, params.into(), TxMode::ReadOnly).await
    }

    /// Execute a write query (CREATE, MERGE, DELETE, SET, etc.)
    pub async fn mutate<P>(&self, query: &str, params: P) -> Result<QueryResult>
    where
        P: Into<PropertyMap>,
    {
        self.run(query, params.into(), TxMode::ReadWrite).await
    }

    /// Describe the plan a query would execute, without running it.
    ///
    /// Returns a two-column `(step, detail)` result set, one row per plan
    /// node, parent before children.
    pub async fn explain(&self, query: &str) -> Result<QueryResult> {
        let ast = cypher::parse(query)?;
        let logical = planner::plan(&ast, &PropertyMap::new())?;
        let tx = self.backend.begin_tx(TxMode::ReadOnly).await?;
        let optimized = planner::optimize_with_backend(logical, &self.backend, &tx).await?;
        self.backend.rollback_tx(tx).await?;
        Ok(execution::explain_rows(&optimized))
    }

    /// Execute a query and return a `(step, detail)` result set like
    /// `explain`, with each step's detail annotated with the wall-time and
    /// output-row count it took during this run.
    pub async fn profile<P>(&self, query: &str, params: P) -> Result<QueryResult>
    where
        P: Into<PropertyMap>,
    {
        let params = params.into();
        let ast = cypher::parse(query)?;
        let logical = planner::plan(&ast, &params)?;
        let mut tx = self.backend.begin_tx(TxMode::ReadOnly).await?;
        let optimized = planner::optimize_with_backend(logical, &self.backend, &tx).await?;
        let token = execution::CancellationToken::new();
        let (_, step_stats) = tokio::time::timeout(
            self.config.query_timeout,
            execution::execute_profiled(&self.backend, &mut tx, optimized, params, token.clone(), self.config.var_length_ceiling),
        )
        .await
        .map_err(|_| {
            token.cancel();
            Error::Cancelled
        })??;
        self.backend.commit_tx(tx).await?;
        Ok(execution::profile_rows(&step_stats))
    }

    async fn run(&self, query: &str, params: PropertyMap, mode: TxMode) -> Result<QueryResult> {
        let ast = cypher::parse(query)?;
        let logical = planner::plan(&ast, &params)?;
        let mut tx = self.backend.begin_tx(mode).await?;
        let optimized = planner::optimize_with_backend(logical, &self.backend, &tx).await?;
        match self.run_plan(&mut tx, optimized, params).await {
            Ok(result) => {
                self.backend.commit_tx(tx).await?;
                Ok(result)
            }
            Err(err) => {
                self.backend.rollback_tx(tx).await?;
                Err(err)
            }
        }
    }

    async fn run_plan(&self, tx: &mut B::Tx, plan: planner::LogicalPlan, params: PropertyMap) -> Result<QueryResult> {
        let token = execution::CancellationToken::new();
        let timeout = self.config.query_timeout;
        tokio::time::timeout(timeout, execution::execute_with_cancellation(&self.backend, tx, plan, params, token.clone(), self.config.var_length_ceiling))
            .await
            .map_err(|_| {
                token.cancel();
                Error::Cancelled
            })?
    }

    /// Begin an explicit, caller-managed transaction.
    pub async fn begin(&self, mode: TxMode) -> Result<ExplicitTx<'_, B>> {
        let tx = self.backend.begin_tx(mode).await?;
        Ok(ExplicitTx { graph: self, tx })
    }

    /// Access the underlying backend (for advanced use).
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Access the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// In-memory graph for testing and embedding.
impl Graph<storage::MemoryBackend> {
    pub async fn open_memory() -> Result<Self> {
        let backend = storage::MemoryBackend::new();
        Ok(Self::with_backend(backend))
    }
}

/// Explicit transaction handle. The caller is responsible for calling
/// `commit` or `rollback`; dropping it without either leaves the backend's
/// rollback semantics up to the backend (the in-memory backend treats an
/// abandoned transaction as a no-op, since it never buffered writes).
pub struct ExplicitTx<'g, B: StorageBackend> {
    graph: &'g Graph<B>,
    tx: B::Tx,
}

impl<'g, B: StorageBackend> ExplicitTx<'g, B> {
    pub async fn execute<P>(&mut self, query: &str, params: P) -> Result<QueryResult>
    where
        P: Into<PropertyMap>,
    {
        let params = params.into();
        let ast = cypher::parse(query)?;
        let logical = planner::plan(&ast, &params)?;
        let optimized = planner::optimize_with_backend(logical, &self.graph.backend, &self.tx).await?;
        let token = execution::CancellationToken::new();
        execution::execute_with_cancellation(
            &self.graph.backend,
            &mut self.tx,
            optimized,
            params,
            token,
            self.graph.config.var_length_ceiling,
        )
        .await
    }

    pub async fn commit(self) -> Result<()> {
        self.graph.backend.commit_tx(self.tx).await
    }

    pub async fn rollback(self) -> Result<()> {
        self.graph.backend.rollback_tx(self.tx).await
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("lex error at {line}:{column}: {message}")]
    LexError { line: usize, column: usize, message: String },

    #[error("parse error at {line}:{column}: {message}")]
    ParseError { line: usize, column: usize, message: String },

    #[error("type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },

    #[error("planning error: {0}")]
    PlanError(String),

    #[error("evaluation error: {0}")]
    EvalError(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("transaction error: {0}")]
    TxError(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("query cancelled")]
    Cancelled,

    #[error("union error: {0}")]
    UnionError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
