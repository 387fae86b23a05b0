//! Query execution engine.
//!
//! Walks a `LogicalPlan` bottom-up, threading a working set of binding
//! rows through each step. Steps are pure transformations over
//! `Vec<Row>` except where they call into the `StorageBackend`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use tracing::{debug, instrument, warn};

use crate::cypher::ast::*;
use crate::model::*;
use crate::planner::LogicalPlan;
use crate::storage::{ExpandDepth, StorageBackend};
use crate::{Error, Result};

/// Safety ceiling for unbounded variable-length patterns (`*`, `*2..`).
/// Mirrors `EngineConfig::var_length_ceiling`'s default.
pub const VAR_LENGTH_CEILING: usize = 50;

/// A cooperative cancellation flag, checked at step boundaries and
/// inside long-running loops (BFS dequeues, >1000-item scans).
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }
    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::Relaxed);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::Relaxed)
    }
    fn check(&self) -> Result<()> {
        if self.is_cancelled() { Err(Error::Cancelled) } else { Ok(()) }
    }
}

/// Query execution result.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<ResultRow>,
    pub stats: ExecutionStats,
}

/// A single row in the result set. Preserves column order.
#[derive(Debug, Clone)]
pub struct ResultRow {
    pub values: Vec<(String, Value)>,
}

impl ResultRow {
    /// Get a typed value from the row by column name.
    pub fn get<T: FromValue>(&self, key: &str) -> Result<T> {
        let val = self.values.iter().find(|(k, _)| k == key).map(|(_, v)| v).ok_or_else(|| Error::NotFound(format!("column '{key}'")))?;
        T::from_value(val)
    }

    /// Get a raw Value reference by column name.
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.values.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// Execution statistics.
#[derive(Debug, Clone, Default)]
pub struct ExecutionStats {
    pub nodes_created: u64,
    pub nodes_deleted: u64,
    pub edges_created: u64,
    pub edges_deleted: u64,
    pub properties_set: u64,
    pub labels_added: u64,
    pub labels_removed: u64,
    pub execution_time_ms: u64,
}

/// Convert from Value to concrete types.
pub trait FromValue: Sized {
    fn from_value(val: &Value) -> Result<Self>;
}

impl FromValue for Node {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Node(n) => Ok(*n.clone()),
            _ => Err(Error::TypeError { expected: "Node".into(), got: val.type_name().into() }),
        }
    }
}

impl FromValue for Edge {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Edge(e) => Ok(*e.clone()),
            _ => Err(Error::TypeError { expected: "Edge".into(), got: val.type_name().into() }),
        }
    }
}

impl FromValue for String {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::String(s) => Ok(s.clone()),
            _ => Err(Error::TypeError { expected: "String".into(), got: val.type_name().into() }),
        }
    }
}

impl FromValue for i64 {
    fn from_value(val: &Value) -> Result<Self> {
        val.as_int().ok_or_else(|| Error::TypeError { expected: "Integer".into(), got: val.type_name().into() })
    }
}

impl FromValue for f64 {
    fn from_value(val: &Value) -> Result<Self> {
        val.as_float().ok_or_else(|| Error::TypeError { expected: "Float".into(), got: val.type_name().into() })
    }
}

impl FromValue for bool {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Bool(b) => Ok(*b),
            _ => Err(Error::TypeError { expected: "Bool".into(), got: val.type_name().into() }),
        }
    }
}

impl FromValue for Value {
    fn from_value(val: &Value) -> Result<Self> {
        Ok(val.clone())
    }
}

impl FromValue for Vec<Value> {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::List(l) => Ok(l.clone()),
            _ => Err(Error::TypeError { expected: "List".into(), got: val.type_name().into() }),
        }
    }
}

// ============================================================================
// Top-level entry point
// ============================================================================

type Row = HashMap<String, Value>;

struct ExecContext {
    columns: Vec<String>,
    stats: ExecutionStats,
    params: PropertyMap,
    cancel: CancellationToken,
    profile: bool,
    step_stats: Vec<StepStats>,
    var_length_ceiling: usize,
}

/// Per-step timing and row count, captured when `execute_profiled` runs a
/// plan with instrumentation turned on.
#[derive(Debug, Clone)]
pub struct StepStats {
    pub step: String,
    pub detail: String,
    pub rows: usize,
    pub time_ms: u64,
}

/// Execute a logical plan against a storage backend.
///
/// Takes `&mut B::Tx` because write operations (CREATE, SET, DELETE) need
/// mutable transaction access. Read-only plans simply don't mutate it.
#[instrument(skip(backend, tx, plan, params))]
pub async fn execute<B: StorageBackend>(backend: &B, tx: &mut B::Tx, plan: LogicalPlan, params: PropertyMap) -> Result<QueryResult> {
    execute_with_cancellation(backend, tx, plan, params, CancellationToken::new(), VAR_LENGTH_CEILING).await
}

/// Same as `execute`, but accepts an externally-owned cancellation token
/// so a caller (e.g. a worker-pool task with a timeout) can abort
/// mid-query, and a variable-length traversal ceiling sourced from
/// `EngineConfig` rather than the hardcoded default.
pub async fn execute_with_cancellation<B: StorageBackend>(
    backend: &B,
    tx: &mut B::Tx,
    plan: LogicalPlan,
    params: PropertyMap,
    cancel: CancellationToken,
    var_length_ceiling: usize,
) -> Result<QueryResult> {
    let start = std::time::Instant::now();
    let mut ctx = ExecContext { columns: Vec::new(), stats: ExecutionStats::default(), params, cancel, profile: false, step_stats: Vec::new(), var_length_ceiling };
    let rows = execute_plan(backend, tx, &plan, &mut ctx).await?;

    let columns = ctx.columns.clone();
    let result_rows: Vec<ResultRow> = rows
        .into_iter()
        .map(|row| {
            let values: Vec<(String, Value)> = columns.iter().map(|col| (col.clone(), row.get(col).cloned().unwrap_or(Value::Null))).collect();
            ResultRow { values }
        })
        .collect();

    ctx.stats.execution_time_ms = start.elapsed().as_millis() as u64;
    debug!(rows = result_rows.len(), ms = ctx.stats.execution_time_ms, "query executed");

    Ok(QueryResult { columns, rows: result_rows, stats: ctx.stats })
}

/// Run a plan with per-step instrumentation: wall-time and output-row
/// count for every `LogicalPlan` node touched during execution, in the
/// order each step finished. Backs `Graph::profile`.
pub async fn execute_profiled<B: StorageBackend>(
    backend: &B,
    tx: &mut B::Tx,
    plan: LogicalPlan,
    params: PropertyMap,
    cancel: CancellationToken,
    var_length_ceiling: usize,
) -> Result<(QueryResult, Vec<StepStats>)> {
    let start = std::time::Instant::now();
    let mut ctx = ExecContext { columns: Vec::new(), stats: ExecutionStats::default(), params, cancel, profile: true, step_stats: Vec::new(), var_length_ceiling };
    let rows = execute_plan(backend, tx, &plan, &mut ctx).await?;

    let columns = ctx.columns.clone();
    let result_rows: Vec<ResultRow> = rows
        .into_iter()
        .map(|row| {
            let values: Vec<(String, Value)> = columns.iter().map(|col| (col.clone(), row.get(col).cloned().unwrap_or(Value::Null))).collect();
            ResultRow { values }
        })
        .collect();

    let mut stats = ctx.stats;
    stats.execution_time_ms = start.elapsed().as_millis() as u64;
    debug!(rows = result_rows.len(), ms = stats.execution_time_ms, "query profiled");

    Ok((QueryResult { columns, rows: result_rows, stats }, ctx.step_stats))
}

/// Flatten a `LogicalPlan` tree into `(step, detail)` rows, parent before
/// children, without executing it. Backs `Graph::explain`.
pub fn explain_rows(plan: &LogicalPlan) -> QueryResult {
    let mut rows = Vec::new();
    flatten_plan(plan, 0, &mut rows);
    let result_rows = rows
        .into_iter()
        .map(|(step, detail)| ResultRow { values: vec![("step".to_string(), Value::String(step)), ("detail".to_string(), Value::String(detail))] })
        .collect();
    QueryResult { columns: vec!["step".to_string(), "detail".to_string()], rows: result_rows, stats: ExecutionStats::default() }
}

/// Flatten profiled step stats into `(step, detail)` rows, where `detail`
/// carries the row count and wall-time alongside the static description.
pub fn profile_rows(stats: &[StepStats]) -> QueryResult {
    let result_rows = stats
        .iter()
        .map(|s| ResultRow {
            values: vec![
                ("step".to_string(), Value::String(s.step.clone())),
                ("detail".to_string(), Value::String(format!("{} | rows={} time_ms={}", s.detail, s.rows, s.time_ms))),
            ],
        })
        .collect();
    QueryResult { columns: vec!["step".to_string(), "detail".to_string()], rows: result_rows, stats: ExecutionStats::default() }
}

fn flatten_plan(plan: &LogicalPlan, depth: usize, out: &mut Vec<(String, String)>) {
    let indent = "  ".repeat(depth);
    out.push((step_name(plan).to_string(), format!("{indent}{}", step_detail(plan))));
    for child in plan_children(plan) {
        flatten_plan(child, depth + 1, out);
    }
}

fn step_name(plan: &LogicalPlan) -> &'static str {
    match plan {
        LogicalPlan::Argument => "Argument",
        LogicalPlan::AllNodesScan { .. } => "AllNodesScan",
        LogicalPlan::NodeScan { .. } => "NodeScan",
        LogicalPlan::IndexLookup { .. } => "IndexLookup",
        LogicalPlan::VectorSearch { .. } => "VectorSearch",
        LogicalPlan::Expand { .. } => "Expand",
        LogicalPlan::CartesianProduct { .. } => "CartesianProduct",
        LogicalPlan::OptionalCartesian { .. } => "OptionalCartesian",
        LogicalPlan::OptionalAttach { .. } => "OptionalAttach",
        LogicalPlan::Filter { .. } => "Filter",
        LogicalPlan::Unwind { .. } => "Unwind",
        LogicalPlan::CreateNode { .. } => "CreateNode",
        LogicalPlan::CreateRel { .. } => "CreateRel",
        LogicalPlan::Merge { .. } => "Merge",
        LogicalPlan::SetItems { .. } => "SetItems",
        LogicalPlan::RemoveItems { .. } => "RemoveItems",
        LogicalPlan::DeleteEntities { .. } => "DeleteEntities",
        LogicalPlan::Project { .. } => "Project",
        LogicalPlan::Aggregate { .. } => "Aggregate",
        LogicalPlan::Distinct { .. } => "Distinct",
        LogicalPlan::Sort { .. } => "Sort",
        LogicalPlan::Skip { .. } => "Skip",
        LogicalPlan::Limit { .. } => "Limit",
        LogicalPlan::Union { .. } => "Union",
    }
}

fn step_detail(plan: &LogicalPlan) -> String {
    match plan {
        LogicalPlan::Argument => "()".to_string(),
        LogicalPlan::AllNodesScan { alias } => format!("alias={alias}"),
        LogicalPlan::NodeScan { label, alias } => format!("label={label} alias={alias}"),
        LogicalPlan::IndexLookup { label, property, value, alias } => {
            format!("label={label:?} property={property} value={value:?} alias={alias}")
        }
        LogicalPlan::VectorSearch { label, property, query, k, alias } => {
            format!("label={label:?} property={property} query={query:?} k={k} alias={alias}")
        }
        LogicalPlan::Expand { from, dir, rel_types, rel_alias, to, to_labels, var_length, .. } => {
            format!("from={from} dir={dir:?} rel_types={rel_types:?} rel_alias={rel_alias:?} to={to} to_labels={to_labels:?} var_length={var_length:?}")
        }
        LogicalPlan::CartesianProduct { .. } => "()".to_string(),
        LogicalPlan::OptionalCartesian { right_vars, .. } => format!("right_vars={right_vars:?}"),
        LogicalPlan::OptionalAttach { new_vars, .. } => format!("new_vars={new_vars:?}"),
        LogicalPlan::Filter { predicate, .. } => format!("predicate={predicate:?}"),
        LogicalPlan::Unwind { expr, alias, .. } => format!("expr={expr:?} alias={alias}"),
        LogicalPlan::CreateNode { labels, alias, .. } => format!("labels={labels:?} alias={alias}"),
        LogicalPlan::CreateRel { from, to, rel_type, alias, .. } => format!("from={from} to={to} rel_type={rel_type} alias={alias:?}"),
        LogicalPlan::Merge { .. } => "()".to_string(),
        LogicalPlan::SetItems { items, .. } => format!("items={}", items.len()),
        LogicalPlan::RemoveItems { items, .. } => format!("items={}", items.len()),
        LogicalPlan::DeleteEntities { variables, detach, .. } => format!("variables={variables:?} detach={detach}"),
        LogicalPlan::Project { items, star, .. } => format!("items={} star={star}", items.len()),
        LogicalPlan::Aggregate { group_by, aggregations, .. } => format!("group_by={} aggregations={}", group_by.len(), aggregations.len()),
        LogicalPlan::Distinct { .. } => "()".to_string(),
        LogicalPlan::Sort { keys, .. } => format!("keys={keys:?}"),
        LogicalPlan::Skip { count, .. } => format!("count={count:?}"),
        LogicalPlan::Limit { count, has_order_by, .. } => format!("count={count:?} has_order_by={has_order_by}"),
        LogicalPlan::Union { all, .. } => format!("all={all}"),
    }
}

fn plan_children(plan: &LogicalPlan) -> Vec<&LogicalPlan> {
    match plan {
        LogicalPlan::Argument | LogicalPlan::AllNodesScan { .. } | LogicalPlan::NodeScan { .. } | LogicalPlan::IndexLookup { .. } | LogicalPlan::VectorSearch { .. } => vec![],
        LogicalPlan::Expand { input, .. }
        | LogicalPlan::Filter { input, .. }
        | LogicalPlan::Unwind { input, .. }
        | LogicalPlan::CreateNode { input, .. }
        | LogicalPlan::CreateRel { input, .. }
        | LogicalPlan::Merge { input, .. }
        | LogicalPlan::SetItems { input, .. }
        | LogicalPlan::RemoveItems { input, .. }
        | LogicalPlan::DeleteEntities { input, .. }
        | LogicalPlan::Project { input, .. }
        | LogicalPlan::Aggregate { input, .. }
        | LogicalPlan::Distinct { input }
        | LogicalPlan::Sort { input, .. }
        | LogicalPlan::Skip { input, .. }
        | LogicalPlan::Limit { input, .. } => vec![input],
        LogicalPlan::CartesianProduct { left, right } | LogicalPlan::Union { left, right, .. } => vec![left, right],
        LogicalPlan::OptionalCartesian { left, right, .. } => vec![left, right],
        LogicalPlan::OptionalAttach { outer, matched, .. } => vec![outer, matched],
    }
}

// ============================================================================
// Plan executor (recursive walk over LogicalPlan tree)
// ============================================================================

fn execute_plan<'a, B: StorageBackend>(
    backend: &'a B,
    tx: &'a mut B::Tx,
    plan: &'a LogicalPlan,
    ctx: &'a mut ExecContext,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<Row>>> + Send + 'a>> {
    Box::pin(async move {
        ctx.cancel.check()?;
        let step_start = if ctx.profile { Some(std::time::Instant::now()) } else { None };
        let result: Result<Vec<Row>> = match plan {
            LogicalPlan::Argument => Ok(vec![HashMap::new()]),

            LogicalPlan::AllNodesScan { alias } => {
                let nodes = backend.all_nodes(tx).await?;
                mark_column(ctx, alias);
                Ok(nodes.into_iter().map(|n| single(alias, Value::Node(Box::new(n)))).collect())
            }

            LogicalPlan::NodeScan { label, alias } => {
                let nodes = backend.nodes_by_label(tx, label).await?;
                mark_column(ctx, alias);
                Ok(nodes.into_iter().map(|n| single(alias, Value::Node(Box::new(n)))).collect())
            }

            LogicalPlan::IndexLookup { label, property, value, alias } => {
                let val = eval_expr(value, &HashMap::new(), &ctx.params)?;
                let nodes = match label {
                    Some(l) => backend.nodes_by_property(tx, l, property, &val).await?,
                    None => {
                        warn!("IndexLookup without a label falls back to a full scan");
                        backend.all_nodes(tx).await?.into_iter().filter(|n| n.get(property).is_some_and(|v| v.values_equal(&val))).collect()
                    }
                };
                mark_column(ctx, alias);
                Ok(nodes.into_iter().map(|n| single(alias, Value::Node(Box::new(n)))).collect())
            }

            LogicalPlan::VectorSearch { label, property, query, k, alias } => {
                let query_val = eval_expr(query, &HashMap::new(), &ctx.params)?;
                let query_vec = query_val.as_vector().ok_or_else(|| Error::EvalError("vector search query must be a Vector".into()))?;
                let label = label.clone().ok_or_else(|| Error::PlanError("vector search requires a label".into()))?;
                let hits = backend.vector_query(tx, &label, property, query_vec, *k).await?;
                mark_column(ctx, alias);
                let mut rows = Vec::new();
                for (node_id, distance) in hits {
                    if let Some(node) = backend.get_node(tx, node_id).await? {
                        let mut row = single(alias, Value::Node(Box::new(node)));
                        row.insert(format!("__score:{alias}"), Value::Float(1.0 - distance));
                        rows.push(row);
                    }
                }
                Ok(rows)
            }

            LogicalPlan::Expand { input, from, dir, rel_types, rel_alias, to, to_labels, var_length } => {
                let input_rows = execute_plan(backend, tx, input, ctx).await?;
                let (min, max) = var_length.unwrap_or((1, 1));
                let depth = if *var_length == Some((1, 1)) || var_length.is_none() {
                    ExpandDepth::Exact(1)
                } else {
                    ExpandDepth::Range { min, max: max.min(ctx.var_length_ceiling) }
                };
                let rel_type_refs: Vec<&str> = rel_types.iter().map(String::as_str).collect();

                mark_column(ctx, from);
                mark_column(ctx, to);
                if let Some(ra) = rel_alias {
                    mark_column(ctx, ra);
                }

                let mut rows = Vec::new();
                for (i, input_row) in input_rows.iter().enumerate() {
                    if i % 1000 == 0 {
                        ctx.cancel.check()?;
                    }
                    let Some(Value::Node(from_node)) = input_row.get(from) else { continue };
                    let paths = backend.expand(tx, from_node.id, *dir, &rel_type_refs, depth).await?;
                    for path in paths {
                        let end = path.end();
                        if !to_labels.iter().all(|l| end.has_label(l)) {
                            continue;
                        }
                        let mut row = input_row.clone();
                        row.insert(to.clone(), Value::Node(Box::new(end.clone())));
                        if let Some(ra) = rel_alias {
                            let value = if var_length.is_none() {
                                Value::Edge(Box::new(path.edges[0].clone()))
                            } else {
                                Value::List(path.edges.iter().map(|e| Value::Edge(Box::new(e.clone()))).collect())
                            };
                            row.insert(ra.clone(), value);
                        }
                        rows.push(row);
                    }
                }
                Ok(rows)
            }

            LogicalPlan::CartesianProduct { left, right } => {
                let left_rows = execute_plan(backend, tx, left, ctx).await?;
                let right_rows = execute_plan(backend, tx, right, ctx).await?;
                let mut result = Vec::with_capacity(left_rows.len() * right_rows.len());
                for lr in &left_rows {
                    for rr in &right_rows {
                        let mut row = lr.clone();
                        row.extend(rr.clone());
                        result.push(row);
                    }
                }
                Ok(result)
            }

            LogicalPlan::OptionalCartesian { left, right, right_vars } => {
                let left_rows = execute_plan(backend, tx, left, ctx).await?;
                let right_rows = execute_plan(backend, tx, right, ctx).await?;
                for v in right_vars {
                    mark_column(ctx, v);
                }
                let mut result = Vec::new();
                for lr in &left_rows {
                    if right_rows.is_empty() {
                        result.push(null_extend(lr, right_vars));
                    } else {
                        for rr in &right_rows {
                            let mut row = lr.clone();
                            row.extend(rr.clone());
                            result.push(row);
                        }
                    }
                }
                Ok(result)
            }

            LogicalPlan::OptionalAttach { outer, matched, new_vars } => {
                let outer_rows = execute_plan(backend, tx, outer, ctx).await?;
                let matched_rows = execute_plan(backend, tx, matched, ctx).await?;
                for v in new_vars {
                    mark_column(ctx, v);
                }
                let mut result = Vec::new();
                for orow in &outer_rows {
                    let extensions: Vec<&Row> = matched_rows.iter().filter(|mrow| row_extends(mrow, orow)).collect();
                    if extensions.is_empty() {
                        result.push(null_extend(orow, new_vars));
                    } else {
                        for mrow in extensions {
                            result.push(mrow.clone());
                        }
                    }
                }
                Ok(result)
            }

            LogicalPlan::Filter { input, predicate } => {
                let rows = execute_plan(backend, tx, input, ctx).await?;
                let mut filtered = Vec::with_capacity(rows.len());
                for row in rows {
                    if eval_expr(predicate, &row, &ctx.params)?.is_truthy() {
                        filtered.push(row);
                    }
                }
                Ok(filtered)
            }

            LogicalPlan::Unwind { input, expr, alias } => {
                let rows = execute_plan(backend, tx, input, ctx).await?;
                mark_column(ctx, alias);
                let mut result = Vec::new();
                for row in &rows {
                    match eval_expr(expr, row, &ctx.params)? {
                        Value::List(items) => {
                            for item in items {
                                let mut new_row = row.clone();
                                new_row.insert(alias.clone(), item);
                                result.push(new_row);
                            }
                        }
                        Value::Null => {}
                        other => {
                            let mut new_row = row.clone();
                            new_row.insert(alias.clone(), other);
                            result.push(new_row);
                        }
                    }
                }
                Ok(result)
            }

            LogicalPlan::CreateNode { input, labels, properties, alias } => {
                let input_rows = execute_plan(backend, tx, input, ctx).await?;
                mark_column(ctx, alias);
                let label_refs: Vec<&str> = labels.iter().map(String::as_str).collect();
                let base_rows = if input_rows.is_empty() { vec![HashMap::new()] } else { input_rows };
                let mut rows = Vec::with_capacity(base_rows.len());
                for row in base_rows {
                    let mut props = PropertyMap::new();
                    for (key, expr) in properties {
                        props.insert(key.clone(), eval_expr(expr, &row, &ctx.params)?);
                    }
                    let node_id = backend.create_node(tx, &label_refs, props).await?;
                    ctx.stats.nodes_created += 1;
                    let node = backend.get_node(tx, node_id).await?.ok_or_else(|| Error::EvalError("created node vanished".into()))?;
                    let mut new_row = row;
                    new_row.insert(alias.clone(), Value::Node(Box::new(node)));
                    rows.push(new_row);
                }
                Ok(rows)
            }

            LogicalPlan::CreateRel { input, from, to, rel_type, properties, alias } => {
                let rows = execute_plan(backend, tx, input, ctx).await?;
                if let Some(a) = alias {
                    mark_column(ctx, a);
                }
                let mut result = Vec::with_capacity(rows.len());
                for row in rows {
                    let from_id = node_id_of(&row, from)?;
                    let to_id = node_id_of(&row, to)?;
                    let mut props = PropertyMap::new();
                    for (key, expr) in properties {
                        props.insert(key.clone(), eval_expr(expr, &row, &ctx.params)?);
                    }
                    let edge_id = backend.create_edge(tx, from_id, to_id, rel_type, props).await?;
                    ctx.stats.edges_created += 1;
                    let mut new_row = row;
                    if let Some(a) = alias {
                        let edge = backend.get_edge(tx, edge_id).await?.ok_or_else(|| Error::EvalError("created edge vanished".into()))?;
                        new_row.insert(a.clone(), Value::Edge(Box::new(edge)));
                    }
                    result.push(new_row);
                }
                Ok(result)
            }

            LogicalPlan::Merge { input, pattern, on_create, on_match } => execute_merge(backend, tx, input, pattern, on_create, on_match, ctx).await,

            LogicalPlan::SetItems { input, items } => {
                let rows = execute_plan(backend, tx, input, ctx).await?;
                for row in &rows {
                    apply_set_items(backend, tx, row, items, ctx).await?;
                }
                Ok(rows)
            }

            LogicalPlan::RemoveItems { input, items } => {
                let rows = execute_plan(backend, tx, input, ctx).await?;
                for row in &rows {
                    for item in items {
                        match item {
                            RemoveItem::Property { variable, key } => {
                                if let Some(id) = node_id_of(row, variable).ok() {
                                    backend.remove_node_property(tx, id, key).await?;
                                    ctx.stats.properties_set += 1;
                                }
                            }
                            RemoveItem::Label { variable, label } => {
                                if let Some(id) = node_id_of(row, variable).ok() {
                                    backend.remove_label(tx, id, label).await?;
                                    ctx.stats.labels_removed += 1;
                                }
                            }
                        }
                    }
                }
                Ok(rows)
            }

            LogicalPlan::DeleteEntities { input, variables, detach } => {
                // Snapshot all rows before any deletion (§9 DELETE snapshot
                // consistency): an early row's delete must not change what
                // variables a later row in this same step resolve to.
                let rows = execute_plan(backend, tx, input, ctx).await?;
                for row in &rows {
                    for var in variables {
                        match row.get(var) {
                            Some(Value::Node(n)) => {
                                if *detach {
                                    backend.detach_delete_node(tx, n.id).await?;
                                } else {
                                    backend.delete_node(tx, n.id).await?;
                                }
                                ctx.stats.nodes_deleted += 1;
                            }
                            Some(Value::Edge(e)) => {
                                backend.delete_edge(tx, e.id).await?;
                                ctx.stats.edges_deleted += 1;
                            }
                            _ => {}
                        }
                    }
                }
                Ok(vec![])
            }

            LogicalPlan::Project { input, items, star } => {
                let rows = execute_plan(backend, tx, input, ctx).await?;
                if *star {
                    ctx.columns = rows.first().map(|r| {
                        let mut keys: Vec<String> = r.keys().filter(|k| !k.starts_with("__")).cloned().collect();
                        keys.sort();
                        keys
                    }).unwrap_or_default();
                    return Ok(rows);
                }
                ctx.columns = items.iter().map(|(_, alias)| alias.clone()).collect();
                let mut projected = Vec::with_capacity(rows.len());
                for row in &rows {
                    let mut new_row = HashMap::new();
                    for (expr, alias) in items {
                        new_row.insert(alias.clone(), eval_expr(expr, row, &ctx.params)?);
                    }
                    projected.push(new_row);
                }
                Ok(projected)
            }

            LogicalPlan::Aggregate { input, group_by, aggregations } => {
                let rows = execute_plan(backend, tx, input, ctx).await?;
                let result = aggregate_rows(&rows, group_by, aggregations, &ctx.params)?;
                ctx.columns = group_by.iter().chain(aggregations.iter()).map(|(_, alias)| alias.clone()).collect();
                Ok(result)
            }

            LogicalPlan::Distinct { input } => {
                let rows = execute_plan(backend, tx, input, ctx).await?;
                let mut seen: Vec<Vec<String>> = Vec::new();
                let mut result = Vec::new();
                for row in rows {
                    let key = row_structural_key(&ctx.columns, &row);
                    if !seen.contains(&key) {
                        seen.push(key);
                        result.push(row);
                    }
                }
                Ok(result)
            }

            LogicalPlan::Sort { input, keys } => {
                let mut rows = execute_plan(backend, tx, input, ctx).await?;
                let params = ctx.params.clone();
                rows.sort_by(|a, b| {
                    for (expr, ascending) in keys {
                        let va = eval_expr(expr, a, &params).unwrap_or(Value::Null);
                        let vb = eval_expr(expr, b, &params).unwrap_or(Value::Null);
                        if let Some(ord) = va.compare(&vb) {
                            let ord = if *ascending { ord } else { ord.reverse() };
                            if ord != std::cmp::Ordering::Equal {
                                return ord;
                            }
                        }
                    }
                    std::cmp::Ordering::Equal
                });
                Ok(rows)
            }

            LogicalPlan::Skip { input, count } => {
                let rows = execute_plan(backend, tx, input, ctx).await?;
                let n = eval_expr(count, &HashMap::new(), &ctx.params)?.as_int().unwrap_or(0).max(0) as usize;
                Ok(rows.into_iter().skip(n).collect())
            }

            LogicalPlan::Limit { input, count, has_order_by } => {
                let n = eval_expr(count, &HashMap::new(), &ctx.params)?.as_int().unwrap_or(0).max(0) as usize;
                if *has_order_by {
                    let rows = execute_plan(backend, tx, input, ctx).await?;
                    Ok(rows.into_iter().take(n).collect())
                } else {
                    execute_limit_unordered(backend, tx, input, ctx, n).await
                }
            }

            LogicalPlan::Union { left, right, all } => {
                let left_cols_before = ctx.columns.clone();
                let left_rows = execute_plan(backend, tx, left, ctx).await?;
                let left_cols = ctx.columns.clone();

                ctx.columns = left_cols_before;
                let right_rows = execute_plan(backend, tx, right, ctx).await?;
                let right_cols = ctx.columns.clone();

                if left_cols.len() != right_cols.len() || !left_cols.iter().all(|c| right_cols.contains(c)) {
                    return Err(Error::UnionError(format!("column mismatch: {left_cols:?} vs {right_cols:?}")));
                }

                ctx.columns = left_cols.clone();
                let mut all_rows: Vec<Row> = left_rows;
                for rr in right_rows {
                    // Re-key right-hand rows to the left branch's column names
                    // positionally is unnecessary here since both share the
                    // same alias set (checked above); insert directly.
                    all_rows.push(rr);
                }

                if *all {
                    Ok(all_rows)
                } else {
                    let mut seen: Vec<Vec<String>> = Vec::new();
                    let mut deduped = Vec::new();
                    for row in all_rows {
                        let key = row_structural_key(&left_cols, &row);
                        if !seen.contains(&key) {
                            seen.push(key);
                            deduped.push(row);
                        }
                    }
                    Ok(deduped)
                }
            }
        };
        if let (Some(started), Ok(rows)) = (step_start, &result) {
            ctx.step_stats.push(StepStats {
                step: step_name(plan).to_string(),
                detail: step_detail(plan),
                rows: rows.len(),
                time_ms: started.elapsed().as_millis() as u64,
            });
        }
        result
    })
}

/// `LIMIT` with no preceding `ORDER BY`: which `n` rows come out doesn't
/// matter, so a `Filter` directly over a scan can stop evaluating the
/// predicate once `n` matches are found instead of filtering the whole
/// scan. Any other input shape falls back to full evaluation then
/// truncation — still correct, just without the early cutoff.
async fn execute_limit_unordered<'a, B: StorageBackend>(
    backend: &'a B,
    tx: &'a mut B::Tx,
    input: &'a LogicalPlan,
    ctx: &'a mut ExecContext,
    n: usize,
) -> Result<Vec<Row>> {
    if let LogicalPlan::Filter { input: scan, predicate } = input {
        if matches!(scan.as_ref(), LogicalPlan::AllNodesScan { .. } | LogicalPlan::NodeScan { .. } | LogicalPlan::IndexLookup { .. }) {
            let rows = execute_plan(backend, tx, scan, ctx).await?;
            let mut out = Vec::with_capacity(n.min(rows.len()));
            for row in rows {
                if out.len() >= n {
                    break;
                }
                if eval_expr(predicate, &row, &ctx.params)?.is_truthy() {
                    out.push(row);
                }
            }
            return Ok(out);
        }
    }
    let rows = execute_plan(backend, tx, input, ctx).await?;
    Ok(rows.into_iter().take(n).collect())
}

fn mark_column(ctx: &mut ExecContext, alias: &str) {
    if !ctx.columns.contains(&alias.to_string()) {
        ctx.columns.push(alias.to_string());
    }
}

fn single(alias: &str, value: Value) -> Row {
    let mut row = HashMap::new();
    row.insert(alias.to_string(), value);
    row
}

fn null_extend(row: &Row, vars: &[String]) -> Row {
    let mut new_row = row.clone();
    for v in vars {
        new_row.entry(v.clone()).or_insert(Value::Null);
    }
    new_row
}

/// True if every key/value in `base` also appears in `candidate` —
/// i.e. `candidate` is `base` plus possibly more bindings.
fn row_extends(candidate: &Row, base: &Row) -> bool {
    base.iter().all(|(k, v)| candidate.get(k).is_some_and(|cv| cv.values_equal(v) || cv == v))
}

fn row_structural_key(columns: &[String], row: &Row) -> Vec<String> {
    if columns.is_empty() {
        let mut keys: Vec<(String, String)> = row.iter().map(|(k, v)| (k.clone(), v.group_key())).collect();
        keys.sort();
        keys.into_iter().map(|(k, v)| format!("{k}={v}")).collect()
    } else {
        columns.iter().map(|c| row.get(c).map(|v| v.group_key()).unwrap_or_default()).collect()
    }
}

fn node_id_of(row: &Row, variable: &str) -> Result<NodeId> {
    match row.get(variable) {
        Some(Value::Node(n)) => Ok(n.id),
        _ => Err(Error::EvalError(format!("'{variable}' is not a bound node"))),
    }
}

// ============================================================================
// MERGE
// ============================================================================

async fn execute_merge<B: StorageBackend>(
    backend: &B,
    tx: &mut B::Tx,
    input: &LogicalPlan,
    pattern: &Pattern,
    on_create: &[SetItem],
    on_match: &[SetItem],
    ctx: &mut ExecContext,
) -> Result<Vec<Row>> {
    let input_rows = execute_plan(backend, tx, input, ctx).await?;
    let base_rows = if input_rows.is_empty() { vec![HashMap::new()] } else { input_rows };

    let Some(PatternElement::Node(node_pattern)) = pattern.elements.first() else {
        return Err(Error::PlanError("MERGE currently supports single-node patterns".into()));
    };
    let alias = node_pattern.alias.clone().unwrap_or_else(|| "__merge".to_string());
    mark_column(ctx, &alias);

    let mut result = Vec::with_capacity(base_rows.len());
    for row in base_rows {
        let mut props = PropertyMap::new();
        for (key, expr) in &node_pattern.properties {
            props.insert(key.clone(), eval_expr(expr, &row, &ctx.params)?);
        }

        let mut existing: Option<Node> = None;
        if let Some(label) = node_pattern.labels.first() {
            for candidate in backend.nodes_by_label(tx, label).await? {
                if node_pattern.labels.iter().all(|l| candidate.has_label(l)) && props.iter().all(|(k, v)| candidate.get(k).is_some_and(|cv| cv.values_equal(v))) {
                    existing = Some(candidate);
                    break;
                }
            }
        }

        let (node, matched) = match existing {
            Some(n) => (n, true),
            None => {
                let label_refs: Vec<&str> = node_pattern.labels.iter().map(String::as_str).collect();
                let id = backend.create_node(tx, &label_refs, props).await?;
                ctx.stats.nodes_created += 1;
                (backend.get_node(tx, id).await?.ok_or_else(|| Error::EvalError("created node vanished".into()))?, false)
            }
        };

        let mut new_row = row;
        new_row.insert(alias.clone(), Value::Node(Box::new(node.clone())));

        let items = if matched { on_match } else { on_create };
        apply_set_items(backend, tx, &new_row, items, ctx).await?;
        if !items.is_empty() {
            if let Some(refreshed) = backend.get_node(tx, node.id).await? {
                new_row.insert(alias.clone(), Value::Node(Box::new(refreshed)));
            }
        }

        result.push(new_row);
    }
    Ok(result)
}

async fn apply_set_items<B: StorageBackend>(backend: &B, tx: &mut B::Tx, row: &Row, items: &[SetItem], ctx: &mut ExecContext) -> Result<()> {
    for item in items {
        match item {
            SetItem::Property { variable, key, value } => {
                let val = eval_expr(value, row, &ctx.params)?;
                match row.get(variable) {
                    Some(Value::Node(n)) => {
                        backend.set_node_property(tx, n.id, key, val).await?;
                        ctx.stats.properties_set += 1;
                    }
                    Some(Value::Edge(e)) => {
                        backend.set_edge_property(tx, e.id, key, val).await?;
                        ctx.stats.properties_set += 1;
                    }
                    _ => {}
                }
            }
            SetItem::AllProperties { variable, properties } => {
                if let Some(Value::Node(n)) = row.get(variable) {
                    for key in n.properties.keys() {
                        backend.remove_node_property(tx, n.id, key).await?;
                    }
                    for (key, expr) in properties {
                        let val = eval_expr(expr, row, &ctx.params)?;
                        backend.set_node_property(tx, n.id, key, val).await?;
                        ctx.stats.properties_set += 1;
                    }
                }
            }
            SetItem::MergeProperties { variable, properties } => {
                if let Some(Value::Node(n)) = row.get(variable) {
                    for (key, expr) in properties {
                        let val = eval_expr(expr, row, &ctx.params)?;
                        backend.set_node_property(tx, n.id, key, val).await?;
                        ctx.stats.properties_set += 1;
                    }
                }
            }
            SetItem::Label { variable, label } => {
                if let Some(Value::Node(n)) = row.get(variable) {
                    backend.add_label(tx, n.id, label).await?;
                    ctx.stats.labels_added += 1;
                }
            }
        }
    }
    Ok(())
}

// ============================================================================
// Expression evaluator
// ============================================================================

/// Evaluate a Cypher expression against a row of bound variables. Pure:
/// no I/O, no storage access — everything it needs is already materialized
/// in `row` or `params`.
fn eval_expr(expr: &Expr, row: &Row, params: &PropertyMap) -> Result<Value> {
    match expr {
        Expr::Literal(lit) => Ok(match lit {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::String(s) => Value::String(s.clone()),
        }),

        Expr::Variable(name) => row.get(name).cloned().ok_or_else(|| Error::EvalError(format!("unbound variable: {name}"))),

        Expr::Parameter(name) => params.get(name).cloned().ok_or_else(|| Error::EvalError(format!("missing parameter: ${name}"))),

        Expr::Property { expr: inner, key } => {
            let val = eval_expr(inner, row, params)?;
            match val {
                Value::Node(n) => Ok(n.get(key).cloned().unwrap_or(Value::Null)),
                Value::Edge(e) => Ok(e.properties.get(key).cloned().unwrap_or(Value::Null)),
                Value::Null => Ok(Value::Null),
                _ => Err(Error::TypeError { expected: "Node or Edge".into(), got: val.type_name().into() }),
            }
        }

        Expr::FunctionCall { name, args, distinct: _ } => eval_function(name, args, row, params),

        Expr::BinaryOp { left, op, right } => {
            let lv = eval_expr(left, row, params)?;
            match op {
                BinaryOp::And => {
                    if !lv.is_truthy() && !lv.is_null() {
                        return Ok(Value::Bool(false));
                    }
                    let rv = eval_expr(right, row, params)?;
                    if lv.is_null() || rv.is_null() {
                        return Ok(if !rv.is_truthy() && !rv.is_null() { Value::Bool(false) } else { Value::Null });
                    }
                    return Ok(Value::Bool(lv.is_truthy() && rv.is_truthy()));
                }
                BinaryOp::Or => {
                    if lv.is_truthy() {
                        return Ok(Value::Bool(true));
                    }
                    let rv = eval_expr(right, row, params)?;
                    if lv.is_null() || rv.is_null() {
                        return Ok(if rv.is_truthy() { Value::Bool(true) } else { Value::Null });
                    }
                    return Ok(Value::Bool(rv.is_truthy()));
                }
                _ => {}
            }
            let rv = eval_expr(right, row, params)?;
            eval_binary_op(&lv, *op, &rv)
        }

        Expr::UnaryOp { op, expr: inner } => {
            let val = eval_expr(inner, row, params)?;
            match op {
                UnaryOp::Not => match val {
                    Value::Null => Ok(Value::Null),
                    _ => Ok(Value::Bool(!val.is_truthy())),
                },
                UnaryOp::Negate => match val {
                    Value::Int(i) => Ok(Value::Int(-i)),
                    Value::Float(f) => Ok(Value::Float(-f)),
                    Value::Null => Ok(Value::Null),
                    _ => Err(Error::TypeError { expected: "Numeric".into(), got: val.type_name().into() }),
                },
            }
        }

        Expr::List(items) => {
            let vals: Vec<Value> = items.iter().map(|e| eval_expr(e, row, params)).collect::<Result<_>>()?;
            Ok(Value::List(vals))
        }

        Expr::IsNull { expr: inner, negated } => {
            let is_null = eval_expr(inner, row, params)?.is_null();
            Ok(Value::Bool(if *negated { !is_null } else { is_null }))
        }

        Expr::In { expr: item, list } => {
            let item_val = eval_expr(item, row, params)?;
            if item_val.is_null() {
                return Ok(Value::Null);
            }
            match eval_expr(list, row, params)? {
                Value::Null => Ok(Value::Null),
                Value::List(items) => Ok(Value::Bool(items.iter().any(|v| v.values_equal(&item_val)))),
                other => Err(Error::TypeError { expected: "List".into(), got: other.type_name().into() }),
            }
        }

        Expr::HasLabel { expr: inner, label } => match eval_expr(inner, row, params)? {
            Value::Node(n) => Ok(Value::Bool(n.has_label(label))),
            Value::Null => Ok(Value::Null),
            other => Err(Error::TypeError { expected: "Node".into(), got: other.type_name().into() }),
        },

        Expr::StringOp { left, op, right } => {
            let lv = eval_expr(left, row, params)?;
            let rv = eval_expr(right, row, params)?;
            match (&lv, &rv) {
                (Value::String(a), Value::String(b)) => {
                    let result = match op {
                        StringOp::StartsWith => a.starts_with(b.as_str()),
                        StringOp::EndsWith => a.ends_with(b.as_str()),
                        StringOp::Contains => a.contains(b.as_str()),
                    };
                    Ok(Value::Bool(result))
                }
                (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                _ => Err(Error::TypeError { expected: "String".into(), got: format!("{}, {}", lv.type_name(), rv.type_name()) }),
            }
        }

        Expr::Star => Ok(Value::Null),

        Expr::Case { operand, whens, else_expr } => {
            if let Some(op) = operand {
                let op_val = eval_expr(op, row, params)?;
                for (when_expr, then_expr) in whens {
                    let when_val = eval_expr(when_expr, row, params)?;
                    if op_val.values_equal(&when_val) {
                        return eval_expr(then_expr, row, params);
                    }
                }
            } else {
                for (when_expr, then_expr) in whens {
                    if eval_expr(when_expr, row, params)?.is_truthy() {
                        return eval_expr(then_expr, row, params);
                    }
                }
            }
            else_expr.as_ref().map_or(Ok(Value::Null), |e| eval_expr(e, row, params))
        }
    }
}

fn eval_binary_op(left: &Value, op: BinaryOp, right: &Value) -> Result<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    match op {
        BinaryOp::Eq => Ok(Value::Bool(left.values_equal(right))),
        BinaryOp::Neq => Ok(Value::Bool(!left.values_equal(right))),
        BinaryOp::Lt => Ok(bool_or_null(left.compare(right).map(|o| o == std::cmp::Ordering::Less))),
        BinaryOp::Lte => Ok(bool_or_null(left.compare(right).map(|o| o != std::cmp::Ordering::Greater))),
        BinaryOp::Gt => Ok(bool_or_null(left.compare(right).map(|o| o == std::cmp::Ordering::Greater))),
        BinaryOp::Gte => Ok(bool_or_null(left.compare(right).map(|o| o != std::cmp::Ordering::Less))),

        BinaryOp::Add => eval_add(left, right),
        BinaryOp::Sub => eval_arith(left, right, |a, b| a - b, |a, b| a - b),
        BinaryOp::Mul => eval_arith(left, right, |a, b| a * b, |a, b| a * b),
        BinaryOp::Div => match right {
            Value::Int(0) => Err(Error::EvalError("division by zero".into())),
            Value::Float(f) if *f == 0.0 => Err(Error::EvalError("division by zero".into())),
            _ => eval_arith(left, right, |a, b| a / b, |a, b| a / b),
        },
        BinaryOp::Mod => eval_arith(left, right, |a, b| a % b, |a, b| a % b),
        BinaryOp::Pow => {
            let l = left.as_float().ok_or_else(|| Error::TypeError { expected: "Numeric".into(), got: left.type_name().into() })?;
            let r = right.as_float().ok_or_else(|| Error::TypeError { expected: "Numeric".into(), got: right.type_name().into() })?;
            Ok(Value::Float(l.powf(r)))
        }

        BinaryOp::And => Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
        BinaryOp::Or => Ok(Value::Bool(left.is_truthy() || right.is_truthy())),
        BinaryOp::Xor => Ok(Value::Bool(left.is_truthy() ^ right.is_truthy())),
    }
}

fn bool_or_null(result: Option<bool>) -> Value {
    result.map(Value::Bool).unwrap_or(Value::Null)
}

fn eval_add(left: &Value, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 + b)),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + *b as f64)),
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
        (Value::List(a), Value::List(b)) => {
            let mut result = a.clone();
            result.extend(b.clone());
            Ok(Value::List(result))
        }
        _ => Err(Error::TypeError { expected: "compatible types for +".into(), got: format!("{}, {}", left.type_name(), right.type_name()) }),
    }
}

fn eval_arith(left: &Value, right: &Value, int_op: fn(i64, i64) -> i64, float_op: fn(f64, f64) -> f64) -> Result<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(int_op(*a, *b))),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(float_op(*a, *b))),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(float_op(*a as f64, *b))),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(float_op(*a, *b as f64))),
        _ => Err(Error::TypeError { expected: "Numeric".into(), got: format!("{}, {}", left.type_name(), right.type_name()) }),
    }
}

// ============================================================================
// Built-in function registry (§4.7)
// ============================================================================

fn eval_function(name: &str, args: &[Expr], row: &Row, params: &PropertyMap) -> Result<Value> {
    let upper = name.to_uppercase();

    // Aggregates are resolved by `aggregate_rows`; a bare call outside an
    // aggregation context (e.g. `RETURN count(n)` with no group key) still
    // reaches here only via `compute_aggregate`'s per-row fallback, which
    // never calls this function for aggregate names — so an aggregate
    // name reaching this point is a planning bug, not a user error.
    if matches!(upper.as_str(), "COUNT" | "SUM" | "AVG" | "MIN" | "MAX" | "COLLECT") {
        return Err(Error::PlanError(format!("aggregate {name} used outside RETURN/aggregation context")));
    }

    let arg = |i: usize| -> Result<Value> { eval_expr(args.get(i).ok_or_else(|| Error::EvalError(format!("{name}() missing argument {i}")))?, row, params) };

    match upper.as_str() {
        "ABS" => match arg(0)? {
            Value::Int(i) => Ok(Value::Int(i.abs())),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            Value::Null => Ok(Value::Null),
            v => Err(Error::EvalError(format!("abs() expects Numeric, got {}", v.type_name()))),
        },
        "CEIL" => Ok(Value::Float(numeric_arg(&arg(0)?, "ceil")?.ceil())),
        "FLOOR" => Ok(Value::Float(numeric_arg(&arg(0)?, "floor")?.floor())),
        "ROUND" => Ok(Value::Float(numeric_arg(&arg(0)?, "round")?.round())),
        "TOINTEGER" => match arg(0)? {
            Value::Int(i) => Ok(Value::Int(i)),
            Value::Float(f) => Ok(Value::Int(f as i64)),
            Value::String(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| Error::EvalError(format!("toInteger(): '{s}' is not an integer"))),
            Value::Null => Ok(Value::Null),
            v => Err(Error::EvalError(format!("toInteger() expects a convertible value, got {}", v.type_name()))),
        },
        "TOFLOAT" => match arg(0)? {
            Value::Float(f) => Ok(Value::Float(f)),
            Value::Int(i) => Ok(Value::Float(i as f64)),
            Value::String(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| Error::EvalError(format!("toFloat(): '{s}' is not a float"))),
            Value::Null => Ok(Value::Null),
            v => Err(Error::EvalError(format!("toFloat() expects a convertible value, got {}", v.type_name()))),
        },
        "TOBOOLEAN" => match arg(0)? {
            Value::Bool(b) => Ok(Value::Bool(b)),
            Value::String(s) => match s.to_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Ok(Value::Null),
            },
            Value::Null => Ok(Value::Null),
            v => Err(Error::EvalError(format!("toBoolean() expects a convertible value, got {}", v.type_name()))),
        },
        "TOLOWER" => string_arg(&arg(0)?, "toLower").map(|s| Value::String(s.to_lowercase())),
        "TOUPPER" => string_arg(&arg(0)?, "toUpper").map(|s| Value::String(s.to_uppercase())),
        "CONTAINS" => Ok(Value::Bool(string_arg(&arg(0)?, "contains")?.contains(&string_arg(&arg(1)?, "contains")?))),
        "STARTSWITH" => Ok(Value::Bool(string_arg(&arg(0)?, "startsWith")?.starts_with(&string_arg(&arg(1)?, "startsWith")?))),
        "ENDSWITH" => Ok(Value::Bool(string_arg(&arg(0)?, "endsWith")?.ends_with(&string_arg(&arg(1)?, "endsWith")?))),
        "LENGTH" | "SIZE" => match arg(0)? {
            Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::List(l) => Ok(Value::Int(l.len() as i64)),
            Value::Null => Ok(Value::Null),
            v => Err(Error::EvalError(format!("{} expects String or List, got {}", name, v.type_name()))),
        },
        "SEARCH" => {
            // Full-text score via the search collaborator, evaluated here
            // as a pure text-overlap scorer against already-bound text —
            // not a backend call (expression evaluation stays I/O-free).
            let text = string_arg(&arg(0)?, "search")?.to_lowercase();
            let query = string_arg(&arg(1)?, "search")?.to_lowercase();
            if query.is_empty() || !text.contains(&query) {
                Ok(Value::Float(0.0))
            } else {
                Ok(Value::Float((query.len() as f64 / text.len().max(1) as f64).min(1.0)))
            }
        }
        "COSINE_SIMILARITY" => {
            let a = vector_arg(&arg(0)?)?;
            let b = vector_arg(&arg(1)?)?;
            Ok(Value::Float(cosine_similarity(&a, &b)))
        }
        "EUCLIDEAN_DISTANCE" => {
            let a = vector_arg(&arg(0)?)?;
            let b = vector_arg(&arg(1)?)?;
            Ok(Value::Float(euclidean_distance(&a, &b)))
        }
        _ => Err(Error::EvalError(format!("unknown function: {name}"))),
    }
}

fn numeric_arg(val: &Value, fn_name: &str) -> Result<f64> {
    val.as_float().ok_or_else(|| Error::EvalError(format!("{fn_name}() expects Numeric, got {}", val.type_name())))
}

fn string_arg(val: &Value, fn_name: &str) -> Result<String> {
    match val {
        Value::String(s) => Ok(s.clone()),
        _ => Err(Error::EvalError(format!("{fn_name}() expects String, got {}", val.type_name()))),
    }
}

fn vector_arg(val: &Value) -> Result<Vec<f32>> {
    match val {
        Value::Vector(v) => Ok(v.clone()),
        Value::List(items) => items.iter().map(|i| i.as_float().map(|f| f as f32).ok_or_else(|| Error::EvalError("expected numeric list for vector".into()))).collect(),
        _ => Err(Error::EvalError(format!("expected Vector, got {}", val.type_name()))),
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)) as f64
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(x, y)| ((x - y) as f64).powi(2)).sum::<f64>().sqrt()
}

// ============================================================================
// Aggregation (§4.8)
// ============================================================================

fn aggregate_rows(rows: &[Row], group_by: &[(Expr, String)], aggregations: &[(Expr, String)], params: &PropertyMap) -> Result<Vec<Row>> {
    let mut groups: Vec<(Vec<Value>, Vec<String>, Vec<&Row>)> = Vec::new();

    for row in rows {
        let values: Vec<Value> = group_by.iter().map(|(expr, _)| eval_expr(expr, row, params).unwrap_or(Value::Null)).collect();
        let key: Vec<String> = values.iter().map(Value::group_key).collect();
        if let Some(group) = groups.iter_mut().find(|(_, k, _)| k == &key) {
            group.2.push(row);
        } else {
            groups.push((values, key, vec![row]));
        }
    }

    if groups.is_empty() && group_by.is_empty() {
        let mut result_row = HashMap::new();
        for (expr, alias) in aggregations {
            result_row.insert(alias.clone(), compute_aggregate(expr, &[], params)?);
        }
        return Ok(vec![result_row]);
    }

    let mut result = Vec::with_capacity(groups.len());
    for (key_vals, _, group_rows) in &groups {
        let mut row = HashMap::new();
        for (i, (_, alias)) in group_by.iter().enumerate() {
            row.insert(alias.clone(), key_vals[i].clone());
        }
        for (expr, alias) in aggregations {
            row.insert(alias.clone(), compute_aggregate(expr, group_rows, params)?);
        }
        result.push(row);
    }
    Ok(result)
}

fn compute_aggregate(expr: &Expr, rows: &[&Row], params: &PropertyMap) -> Result<Value> {
    let Expr::FunctionCall { name, args, distinct } = expr else {
        return rows.first().map_or(Ok(Value::Null), |row| eval_expr(expr, row, params));
    };

    let upper = name.to_uppercase();
    let is_star = args.is_empty() || matches!(args.first(), Some(Expr::Star));

    if upper == "COUNT" && is_star {
        return Ok(Value::Int(rows.len() as i64));
    }

    let mut vals = Vec::new();
    for row in rows {
        let v = eval_expr(&args[0], row, params)?;
        if !v.is_null() {
            vals.push(v);
        }
    }
    if *distinct {
        let mut deduped: Vec<Value> = Vec::new();
        for v in vals {
            if !deduped.iter().any(|d| d.values_equal(&v)) {
                deduped.push(v);
            }
        }
        vals = deduped;
    }

    match upper.as_str() {
        "COUNT" => Ok(Value::Int(vals.len() as i64)),
        "SUM" => {
            let mut sum_i: i64 = 0;
            let mut sum_f: f64 = 0.0;
            let mut has_float = false;
            for val in &vals {
                match val {
                    Value::Int(i) => sum_i += i,
                    Value::Float(f) => {
                        has_float = true;
                        sum_f += f;
                    }
                    _ => {}
                }
            }
            if has_float {
                Ok(Value::Float(sum_i as f64 + sum_f))
            } else {
                Ok(Value::Int(sum_i))
            }
        }
        "AVG" => {
            if vals.is_empty() {
                return Ok(Value::Float(0.0));
            }
            let sum: f64 = vals.iter().map(|v| v.as_float().unwrap_or(0.0)).sum();
            Ok(Value::Float(sum / vals.len() as f64))
        }
        "MIN" => Ok(vals.into_iter().reduce(|a, b| if a.compare(&b) == Some(std::cmp::Ordering::Less) { a } else { b }).unwrap_or(Value::Null)),
        "MAX" => Ok(vals.into_iter().reduce(|a, b| if a.compare(&b) == Some(std::cmp::Ordering::Greater) { a } else { b }).unwrap_or(Value::Null)),
        "COLLECT" => Ok(Value::List(vals)),
        _ => Err(Error::EvalError(format!("unknown aggregate: {name}"))),
    }
}
