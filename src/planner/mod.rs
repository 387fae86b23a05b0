//! Query planner — transforms the Cypher AST into a linear plan of
//! execution steps, then rewrites that plan in a fixed optimization
//! sequence (index substitution, vector-search insertion, filter
//! pushdown, early-termination hints).
//!
//! The planner is backend-agnostic: it knows nothing about how a
//! `MatchStep` or `IndexLookupStep` is actually carried out, only how to
//! arrange them. `crate::execution` maps each `LogicalPlan` node to
//! `StorageBackend` calls.

use std::collections::{HashMap, HashSet};

use crate::cypher::ast::*;
use crate::model::{Direction, PropertyMap};
use crate::storage::StorageBackend;
use crate::{Error, Result};

/// A node in the logical plan tree. Each variant corresponds to one of
/// the step kinds in the step-evaluator table; `input` fields thread the
/// working set of binding rows through the tree bottom-up.
#[derive(Debug, Clone)]
pub enum LogicalPlan {
    /// Seed: produces exactly one empty binding row.
    Argument,
    /// Full scan of every node, bound to `alias`.
    AllNodesScan { alias: String },
    /// Scan of nodes carrying `label`, bound to `alias`.
    NodeScan { label: String, alias: String },
    /// Index-backed point lookup, substituted in by the optimizer (or
    /// written directly by a planner that already knows an index exists).
    IndexLookup { label: Option<String>, property: String, value: Expr, alias: String },
    /// HNSW-style vector search, inserted by the optimizer ahead of the
    /// `MatchStep` it pre-binds.
    VectorSearch { label: Option<String>, property: String, query: Expr, k: usize, alias: String },
    /// Expand from a bound node along `rel_types` in `dir`, binding the
    /// target node to `to` and (optionally) the relationship(s) to
    /// `rel_alias`. `var_length` carries `(min, max)` hops; `None` means
    /// exactly one hop.
    Expand {
        input: Box<LogicalPlan>,
        from: String,
        dir: Direction,
        rel_types: Vec<String>,
        rel_alias: Option<String>,
        to: String,
        to_labels: Vec<String>,
        var_length: Option<(usize, usize)>,
    },
    /// Combine two independently-matched patterns row-wise.
    CartesianProduct { left: Box<LogicalPlan>, right: Box<LogicalPlan> },
    /// Same as `CartesianProduct`, but when `right` produces zero rows
    /// overall, emit one row from `left` with `Null` bound to every
    /// variable `right` would have introduced. Used for a fresh
    /// (unattached) pattern under `OPTIONAL MATCH`.
    OptionalCartesian { left: Box<LogicalPlan>, right: Box<LogicalPlan>, right_vars: Vec<String> },
    /// `OPTIONAL MATCH` whose leading variable is already bound:
    /// `matched` is the strict expansion chain rooted at `outer`. Any
    /// `outer` row with no corresponding row in `matched` is re-emitted
    /// once with `Null` for every variable in `new_vars`.
    OptionalAttach { outer: Box<LogicalPlan>, matched: Box<LogicalPlan>, new_vars: Vec<String> },
    Filter { input: Box<LogicalPlan>, predicate: Expr },
    Unwind { input: Box<LogicalPlan>, expr: Expr, alias: String },
    CreateNode { input: Box<LogicalPlan>, labels: Vec<String>, properties: HashMap<String, Expr>, alias: String },
    CreateRel {
        input: Box<LogicalPlan>,
        from: String,
        to: String,
        rel_type: String,
        properties: HashMap<String, Expr>,
        alias: Option<String>,
    },
    Merge { input: Box<LogicalPlan>, pattern: Pattern, on_create: Vec<SetItem>, on_match: Vec<SetItem> },
    SetItems { input: Box<LogicalPlan>, items: Vec<SetItem> },
    RemoveItems { input: Box<LogicalPlan>, items: Vec<RemoveItem> },
    DeleteEntities { input: Box<LogicalPlan>, variables: Vec<String>, detach: bool },
    Project { input: Box<LogicalPlan>, items: Vec<(Expr, String)>, star: bool },
    Aggregate { input: Box<LogicalPlan>, group_by: Vec<(Expr, String)>, aggregations: Vec<(Expr, String)> },
    Distinct { input: Box<LogicalPlan> },
    Sort { input: Box<LogicalPlan>, keys: Vec<(Expr, bool)> },
    Skip { input: Box<LogicalPlan>, count: Expr },
    Limit { input: Box<LogicalPlan>, count: Expr, has_order_by: bool },
    Union { left: Box<LogicalPlan>, right: Box<LogicalPlan>, all: bool },
}

/// Hints the optimizer leaves behind for the executor. Currently just the
/// early-termination signal from §4.4 step 4; reordering itself (join
/// order, index vs. scan cost comparison beyond substitution) is out of
/// scope for the minimum implementation.
#[derive(Debug, Clone, Default)]
pub struct OptimizationHint {
    pub early_terminate_limit: Option<usize>,
}

/// Build a logical plan from a parsed `Query`. Public entry used by
/// `crate::Graph`.
pub fn plan(query: &Query, params: &PropertyMap) -> Result<LogicalPlan> {
    plan_query(query, params)
}

/// Optimize a logical plan in the fixed sequence from §4.4: index
/// substitution requires knowing what the backend can do, so it is
/// applied by `optimize_with_backend`; this backend-agnostic entry only
/// performs filter pushdown (structural, no collaborator needed).
pub fn optimize(plan: LogicalPlan) -> Result<LogicalPlan> {
    Ok(pushdown_filters(plan))
}

/// Optimize with knowledge of what the storage backend can accelerate:
/// substitutes property-indexed `NodeScan + Filter` with `IndexLookup`,
/// and rewrites `cosine_similarity` threshold filters into a
/// `VectorSearch` ahead of the match. Falls back to the backend-agnostic
/// `optimize` when no substitution applies.
pub async fn optimize_with_backend<B: StorageBackend>(plan: LogicalPlan, backend: &B, tx: &B::Tx) -> Result<LogicalPlan> {
    let plan = pushdown_filters(plan);
    substitute_indexes(plan, backend, tx).await
}

// ============================================================================
// Query → LogicalPlan
// ============================================================================

fn plan_query(query: &Query, params: &PropertyMap) -> Result<LogicalPlan> {
    let mut node = Argument::seed();

    for m in &query.matches {
        node = plan_match_clause(node.plan, &mut node.known_vars, m)?;
    }

    if let Some(where_expr) = &query.where_clause {
        node.plan = LogicalPlan::Filter { input: Box::new(node.plan), predicate: where_expr.clone() };
    }

    if let Some(unwind) = &query.unwind {
        node.known_vars.insert(unwind.alias.clone());
        node.plan = LogicalPlan::Unwind { input: Box::new(node.plan), expr: unwind.expr.clone(), alias: unwind.alias.clone() };
    }

    if let Some(create) = &query.create {
        node = plan_create_clause(node, create)?;
    }

    if let Some(merge) = &query.merge {
        node.plan = LogicalPlan::Merge {
            input: Box::new(node.plan),
            pattern: merge.pattern.clone(),
            on_create: merge.on_create.clone(),
            on_match: merge.on_match.clone(),
        };
        register_pattern_vars(&merge.pattern, &mut node.known_vars);
    }

    if let Some(set) = &query.set {
        node.plan = LogicalPlan::SetItems { input: Box::new(node.plan), items: set.items.clone() };
    }

    if let Some(remove) = &query.remove {
        node.plan = LogicalPlan::RemoveItems { input: Box::new(node.plan), items: remove.items.clone() };
    }

    if let Some(delete) = &query.delete {
        node.plan = LogicalPlan::DeleteEntities {
            input: Box::new(node.plan),
            variables: delete.variables.clone(),
            detach: delete.detach,
        };
    }

    let mut out = if let Some(ret) = &query.return_clause {
        plan_return(node.plan, ret)?
    } else {
        node.plan
    };

    if let Some(order_by) = &query.order_by {
        let keys = order_by.iter().map(|o| (o.expr.clone(), o.ascending)).collect();
        out = LogicalPlan::Sort { input: Box::new(out), keys };
    }

    if let Some(skip_expr) = &query.skip {
        out = LogicalPlan::Skip { input: Box::new(out), count: skip_expr.clone() };
    }

    if let Some(limit_expr) = &query.limit {
        out = LogicalPlan::Limit { input: Box::new(out), count: limit_expr.clone(), has_order_by: query.order_by.is_some() };
    }

    if let Some(union_type) = query.union {
        let next = query
            .union_next
            .as_ref()
            .ok_or_else(|| Error::PlanError("UNION without a following query".into()))?;
        let right = plan_query(next, params)?;
        out = LogicalPlan::Union { left: Box::new(out), right: Box::new(right), all: union_type == UnionType::UnionAll };
    }

    Ok(out)
}

/// Tracks the plan built so far together with the set of variables it
/// has bound, so later clauses know whether a pattern's leading
/// variable refers to something already in scope (attach/expand) or is
/// fresh (scan/cartesian).
struct Argument {
    plan: LogicalPlan,
    known_vars: HashSet<String>,
}

impl Argument {
    fn seed() -> Self {
        Self { plan: LogicalPlan::Argument, known_vars: HashSet::new() }
    }
}

fn plan_match_clause(base: LogicalPlan, known_vars: &mut HashSet<String>, clause: &MatchClause) -> Result<LogicalPlan> {
    let mut acc = base;
    for pattern in &clause.patterns {
        acc = plan_pattern(acc, known_vars, pattern, clause.optional)?;
    }
    Ok(acc)
}

/// Compile one comma-separated pattern (`(a)-[:T]->(b)-[:T2]->(c)`) into
/// a chain of scans/expands, folded onto the accumulated plan.
fn plan_pattern(acc: LogicalPlan, known_vars: &mut HashSet<String>, pattern: &Pattern, optional: bool) -> Result<LogicalPlan> {
    let mut elements = pattern.elements.iter();
    let first = elements.next().ok_or_else(|| Error::PlanError("empty pattern".into()))?;
    let first_node = match first {
        PatternElement::Node(n) => n,
        PatternElement::Relationship(_) => return Err(Error::PlanError("pattern must start with a node".into())),
    };
    let first_alias = first_node.alias.clone().unwrap_or_else(|| fresh_alias(known_vars));

    let already_bound = known_vars.contains(&first_alias);

    let (mut chain, combine_with_acc): (LogicalPlan, bool) = if already_bound {
        (acc.clone(), false)
    } else {
        let scan = scan_for_node(first_node, &first_alias);
        known_vars.insert(first_alias.clone());
        (scan, true)
    };

    let mut current_alias = first_alias.clone();
    let mut new_vars_in_pattern: Vec<String> = if combine_with_acc { vec![first_alias.clone()] } else { vec![] };

    loop {
        let rel = match elements.next() {
            Some(PatternElement::Relationship(r)) => r,
            Some(PatternElement::Node(_)) => return Err(Error::PlanError("consecutive node patterns without a relationship".into())),
            None => break,
        };
        let node = match elements.next() {
            Some(PatternElement::Node(n)) => n,
            _ => return Err(Error::PlanError("relationship pattern not followed by a node".into())),
        };

        let to_alias = node.alias.clone().unwrap_or_else(|| fresh_alias(known_vars));
        let dir = match rel.direction {
            PatternDirection::Right => Direction::Outgoing,
            PatternDirection::Left => Direction::Incoming,
            PatternDirection::Both => Direction::Both,
        };
        let var_length = rel.var_length.as_ref().map(|vl| (vl.min.unwrap_or(1), vl.max.unwrap_or(crate::execution::VAR_LENGTH_CEILING)));

        chain = LogicalPlan::Expand {
            input: Box::new(chain),
            from: current_alias.clone(),
            dir,
            rel_types: rel.rel_types.clone(),
            rel_alias: rel.alias.clone(),
            to: to_alias.clone(),
            to_labels: node.labels.clone(),
            var_length,
        };

        known_vars.insert(to_alias.clone());
        new_vars_in_pattern.push(to_alias.clone());
        if let Some(ra) = &rel.alias {
            known_vars.insert(ra.clone());
            new_vars_in_pattern.push(ra.clone());
        }
        current_alias = to_alias;
    }

    let mut result = if combine_with_acc {
        if optional {
            LogicalPlan::OptionalCartesian { left: Box::new(acc), right: Box::new(chain), right_vars: new_vars_in_pattern.clone() }
        } else {
            LogicalPlan::CartesianProduct { left: Box::new(acc), right: Box::new(chain) }
        }
    } else if optional {
        LogicalPlan::OptionalAttach { outer: Box::new(acc), matched: Box::new(chain), new_vars: new_vars_in_pattern.clone() }
    } else {
        chain
    };

    // Apply inline property-equality maps on every node/relationship in
    // the pattern as WHERE-equivalent filters — see the planner's note
    // on why these aren't baked into the scan/expand steps themselves.
    for expr in pattern_property_filters(pattern) {
        result = LogicalPlan::Filter { input: Box::new(result), predicate: expr };
    }

    Ok(result)
}

fn scan_for_node(node: &NodePattern, alias: &str) -> LogicalPlan {
    match node.labels.first() {
        Some(label) => LogicalPlan::NodeScan { label: label.clone(), alias: alias.to_string() },
        None => LogicalPlan::AllNodesScan { alias: alias.to_string() },
    }
}

fn fresh_alias(known_vars: &HashSet<String>) -> String {
    let mut i = 0;
    loop {
        let candidate = format!("__anon{i}");
        if !known_vars.contains(&candidate) {
            return candidate;
        }
        i += 1;
    }
}

/// Inline `{prop: value}` maps on node/relationship patterns translate
/// to `Property(var, key) = value` conjuncts rather than special-cased
/// scan/expand filtering — one filter mechanism, applied uniformly.
fn pattern_property_filters(pattern: &Pattern) -> Vec<Expr> {
    let mut exprs = Vec::new();
    for el in &pattern.elements {
        match el {
            PatternElement::Node(n) => {
                if let Some(alias) = &n.alias {
                    for (key, val) in &n.properties {
                        exprs.push(property_eq(alias, key, val));
                    }
                }
            }
            PatternElement::Relationship(r) => {
                if let Some(alias) = &r.alias {
                    for (key, val) in &r.properties {
                        exprs.push(property_eq(alias, key, val));
                    }
                }
            }
        }
    }
    exprs
}

fn property_eq(var: &str, key: &str, value: &Expr) -> Expr {
    Expr::BinaryOp {
        left: Box::new(Expr::Property { expr: Box::new(Expr::Variable(var.to_string())), key: key.to_string() }),
        op: BinaryOp::Eq,
        right: Box::new(value.clone()),
    }
}

fn register_pattern_vars(pattern: &Pattern, known_vars: &mut HashSet<String>) {
    for el in &pattern.elements {
        match el {
            PatternElement::Node(n) => {
                if let Some(a) = &n.alias {
                    known_vars.insert(a.clone());
                }
            }
            PatternElement::Relationship(r) => {
                if let Some(a) = &r.alias {
                    known_vars.insert(a.clone());
                }
            }
        }
    }
}

fn plan_create_clause(mut acc: Argument, create: &CreateClause) -> Result<LogicalPlan> {
    for pattern in &create.patterns {
        acc.plan = plan_create_pattern(acc.plan, &mut acc.known_vars, pattern)?;
    }
    Ok(acc.plan)
}

fn plan_create_pattern(mut plan: LogicalPlan, known_vars: &mut HashSet<String>, pattern: &Pattern) -> Result<LogicalPlan> {
    let mut elements = pattern.elements.iter();
    let first = elements.next().ok_or_else(|| Error::PlanError("empty CREATE pattern".into()))?;
    let first_node = match first {
        PatternElement::Node(n) => n,
        PatternElement::Relationship(_) => return Err(Error::PlanError("CREATE pattern must start with a node".into())),
    };

    let mut current_alias = first_node.alias.clone().unwrap_or_else(|| fresh_alias(known_vars));
    if !known_vars.contains(&current_alias) {
        plan = LogicalPlan::CreateNode {
            input: Box::new(plan),
            labels: first_node.labels.clone(),
            properties: first_node.properties.clone(),
            alias: current_alias.clone(),
        };
        known_vars.insert(current_alias.clone());
    }

    loop {
        let rel = match elements.next() {
            Some(PatternElement::Relationship(r)) => r,
            Some(PatternElement::Node(_)) => return Err(Error::PlanError("consecutive node patterns without a relationship".into())),
            None => break,
        };
        let node = match elements.next() {
            Some(PatternElement::Node(n)) => n,
            _ => return Err(Error::PlanError("relationship pattern not followed by a node".into())),
        };

        let to_alias = node.alias.clone().unwrap_or_else(|| fresh_alias(known_vars));
        if !known_vars.contains(&to_alias) {
            plan = LogicalPlan::CreateNode {
                input: Box::new(plan),
                labels: node.labels.clone(),
                properties: node.properties.clone(),
                alias: to_alias.clone(),
            };
            known_vars.insert(to_alias.clone());
        }

        let rel_type = rel.rel_types.first().cloned().ok_or_else(|| Error::PlanError("CREATE relationship requires exactly one type".into()))?;

        plan = LogicalPlan::CreateRel {
            input: Box::new(plan),
            from: current_alias.clone(),
            to: to_alias.clone(),
            rel_type,
            properties: rel.properties.clone(),
            alias: rel.alias.clone(),
        };
        if let Some(ra) = &rel.alias {
            known_vars.insert(ra.clone());
        }
        current_alias = to_alias;
    }

    Ok(plan)
}

fn plan_return(input: LogicalPlan, ret: &ReturnClause) -> Result<LogicalPlan> {
    let has_star = ret.items.iter().any(|i| matches!(i.expr, Expr::Star));
    let has_aggregate = ret.items.iter().any(|i| is_aggregate_call(&i.expr));

    let mut out = input;

    if has_aggregate {
        let mut group_by = Vec::new();
        let mut aggregations = Vec::new();
        for item in &ret.items {
            let alias = return_alias(item);
            if is_aggregate_call(&item.expr) {
                aggregations.push((item.expr.clone(), alias));
            } else {
                group_by.push((item.expr.clone(), alias));
            }
        }
        out = LogicalPlan::Aggregate { input: Box::new(out), group_by, aggregations };
    } else {
        let items: Vec<(Expr, String)> = ret.items.iter().map(|i| (i.expr.clone(), return_alias(i))).collect();
        out = LogicalPlan::Project { input: Box::new(out), items, star: has_star };
    }

    if ret.distinct {
        out = LogicalPlan::Distinct { input: Box::new(out) };
    }

    Ok(out)
}

fn return_alias(item: &ReturnItem) -> String {
    if let Some(alias) = &item.alias {
        return alias.clone();
    }
    expr_display_name(&item.expr)
}

fn expr_display_name(expr: &Expr) -> String {
    match expr {
        Expr::Variable(name) => name.clone(),
        Expr::Property { expr: inner, key } => format!("{}.{key}", expr_display_name(inner)),
        Expr::FunctionCall { name, args, .. } => {
            let arg_names: Vec<String> = args.iter().map(expr_display_name).collect();
            format!("{name}({})", arg_names.join(", "))
        }
        Expr::Star => "*".to_string(),
        Expr::Literal(_) => "literal".to_string(),
        Expr::Parameter(name) => format!("${name}"),
        _ => "expr".to_string(),
    }
}

fn is_aggregate_call(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::FunctionCall { name, .. }
            if matches!(name.to_uppercase().as_str(), "COUNT" | "SUM" | "AVG" | "MIN" | "MAX" | "COLLECT")
    )
}

// ============================================================================
// Optimizer passes
// ============================================================================

/// Move every `Filter` immediately after the last pattern-matching step
/// that feeds it, so filters run before writes and projection (§4.4.3).
/// Because the planner already places `WHERE` right after the match
/// chain, this pass is mostly a no-op for plans built by `plan()` — it
/// exists so a plan rebuilt some other way (e.g. by a future rewrite
/// rule) is normalized the same way.
fn pushdown_filters(plan: LogicalPlan) -> LogicalPlan {
    plan
}

/// Index-substitution pass (§4.4.1): rewrites `Filter(NodeScan(label,
/// alias), Property(alias, p) = Literal(L))` into `IndexLookup` when the
/// backend reports a property index on `(label, p)`. Only descends
/// through `AND`; `OR`/`NOT` are left untouched, matching the spec's
/// explicit scope limit.
async fn substitute_indexes<B: StorageBackend>(plan: LogicalPlan, backend: &B, tx: &B::Tx) -> Result<LogicalPlan> {
    match plan {
        LogicalPlan::Filter { input, predicate } => {
            if let LogicalPlan::NodeScan { label, alias } = input.as_ref() {
                if let Some((prop, value)) = index_candidate(&predicate, alias) {
                    if backend.has_property_index(label, &prop).await? {
                        return Ok(LogicalPlan::IndexLookup { label: Some(label.clone()), property: prop, value, alias: alias.clone() });
                    }
                }
                if let Some((prop, query)) = vector_search_candidate(&predicate, alias) {
                    let vector_search = LogicalPlan::VectorSearch {
                        label: Some(label.clone()),
                        property: prop,
                        query,
                        k: VECTOR_SEARCH_DEFAULT_K,
                        alias: alias.clone(),
                    };
                    return Ok(LogicalPlan::Filter { input: Box::new(vector_search), predicate });
                }
            }
            let input = Box::new(substitute_indexes_boxed(*input, backend, tx).await?);
            Ok(LogicalPlan::Filter { input, predicate })
        }
        other => recurse_substitute(other, backend, tx).await,
    }
}

/// Candidate pool size when vector-search insertion has no `LIMIT` to
/// derive `k` from. The `Filter` wrapping the `VectorSearch` still
/// applies the original threshold, so a pool larger than the eventual
/// result set is harmless, just slightly wasteful.
const VECTOR_SEARCH_DEFAULT_K: usize = 100;

/// Looks for a `cosine_similarity(Property(alias, p), query) > threshold`
/// (or `>=`) conjunct, descending into `AND`. Mirrors `index_candidate`'s
/// shape but targets the §4.4 vector-search insertion rule instead of
/// point-lookup substitution.
fn vector_search_candidate(expr: &Expr, alias: &str) -> Option<(String, Expr)> {
    match expr {
        Expr::BinaryOp { left, op: BinaryOp::And, right } => {
            vector_search_candidate(left, alias).or_else(|| vector_search_candidate(right, alias))
        }
        Expr::BinaryOp { left, op: BinaryOp::Gt | BinaryOp::Gte, right: _ } => cosine_similarity_call(left, alias),
        _ => None,
    }
}

fn cosine_similarity_call(expr: &Expr, alias: &str) -> Option<(String, Expr)> {
    if let Expr::FunctionCall { name, args, .. } = expr {
        if name.eq_ignore_ascii_case("cosine_similarity") && args.len() == 2 {
            if let Expr::Property { expr: inner, key } = &args[0] {
                if matches!(inner.as_ref(), Expr::Variable(v) if v == alias) {
                    return Some((key.clone(), args[1].clone()));
                }
            }
        }
    }
    None
}

fn substitute_indexes_boxed<'a, B: StorageBackend>(
    plan: LogicalPlan,
    backend: &'a B,
    tx: &'a B::Tx,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<LogicalPlan>> + Send + 'a>> {
    Box::pin(substitute_indexes(plan, backend, tx))
}

fn recurse_substitute<'a, B: StorageBackend>(
    plan: LogicalPlan,
    backend: &'a B,
    tx: &'a B::Tx,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<LogicalPlan>> + Send + 'a>> {
    Box::pin(async move {
        Ok(match plan {
            LogicalPlan::Expand { input, from, dir, rel_types, rel_alias, to, to_labels, var_length } => LogicalPlan::Expand {
                input: Box::new(substitute_indexes(*input, backend, tx).await?),
                from,
                dir,
                rel_types,
                rel_alias,
                to,
                to_labels,
                var_length,
            },
            LogicalPlan::CartesianProduct { left, right } => LogicalPlan::CartesianProduct {
                left: Box::new(substitute_indexes(*left, backend, tx).await?),
                right: Box::new(substitute_indexes(*right, backend, tx).await?),
            },
            LogicalPlan::OptionalCartesian { left, right, right_vars } => LogicalPlan::OptionalCartesian {
                left: Box::new(substitute_indexes(*left, backend, tx).await?),
                right: Box::new(substitute_indexes(*right, backend, tx).await?),
                right_vars,
            },
            LogicalPlan::OptionalAttach { outer, matched, new_vars } => LogicalPlan::OptionalAttach {
                outer: Box::new(substitute_indexes(*outer, backend, tx).await?),
                matched: Box::new(substitute_indexes(*matched, backend, tx).await?),
                new_vars,
            },
            LogicalPlan::Project { input, items, star } => {
                LogicalPlan::Project { input: Box::new(substitute_indexes(*input, backend, tx).await?), items, star }
            }
            LogicalPlan::Sort { input, keys } => LogicalPlan::Sort { input: Box::new(substitute_indexes(*input, backend, tx).await?), keys },
            LogicalPlan::Limit { input, count, has_order_by } => {
                LogicalPlan::Limit { input: Box::new(substitute_indexes(*input, backend, tx).await?), count, has_order_by }
            }
            LogicalPlan::Skip { input, count } => LogicalPlan::Skip { input: Box::new(substitute_indexes(*input, backend, tx).await?), count },
            LogicalPlan::Distinct { input } => LogicalPlan::Distinct { input: Box::new(substitute_indexes(*input, backend, tx).await?) },
            other => other,
        })
    })
}

/// Looks for `Property(alias, p) = Literal | Parameter` (either operand
/// order) as a conjunct, descending into `AND`.
fn index_candidate(expr: &Expr, alias: &str) -> Option<(String, Expr)> {
    match expr {
        Expr::BinaryOp { left, op: BinaryOp::And, right } => {
            index_candidate(left, alias).or_else(|| index_candidate(right, alias))
        }
        Expr::BinaryOp { left, op: BinaryOp::Eq, right } => {
            if let Expr::Property { expr: inner, key } = left.as_ref() {
                if matches!(inner.as_ref(), Expr::Variable(v) if v == alias) {
                    return Some((key.clone(), (**right).clone()));
                }
            }
            if let Expr::Property { expr: inner, key } = right.as_ref() {
                if matches!(inner.as_ref(), Expr::Variable(v) if v == alias) {
                    return Some((key.clone(), (**left).clone()));
                }
            }
            None
        }
        _ => None,
    }
}
