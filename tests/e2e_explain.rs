//! End-to-end tests for `Graph::explain` and `Graph::profile`.
//!
//! Both return a two-column `(step, detail)` result set: `explain`
//! describes the optimized plan without running it, `profile` runs it
//! and annotates each step's detail with its row count and wall-time.

use cyrene::PropertyMap;
use cyrene::Graph;

#[tokio::test]
async fn test_explain_returns_step_detail_columns() {
    let graph = Graph::open_memory().await.unwrap();
    graph.mutate("CREATE (n:Person {name: 'Alice'})", PropertyMap::new()).await.unwrap();

    let result = graph.explain("MATCH (n:Person) WHERE n.name = 'Alice' RETURN n").await.unwrap();

    assert_eq!(result.columns, vec!["step", "detail"]);
    assert!(!result.rows.is_empty());

    let steps: Vec<String> = result.rows.iter().map(|r| r.get::<String>("step").unwrap()).collect();
    assert!(steps.contains(&"Project".to_string()));
    assert!(steps.iter().any(|s| s == "NodeScan" || s == "IndexLookup"));
}

#[tokio::test]
async fn test_explain_does_not_mutate_graph() {
    let graph = Graph::open_memory().await.unwrap();
    graph.mutate("CREATE (n:Person {name: 'Alice'})", PropertyMap::new()).await.unwrap();

    // explain() should never create, delete, or otherwise change state.
    graph.explain("CREATE (n:Person {name: 'Bob'})").await.unwrap();

    let result = graph.execute("MATCH (n:Person) RETURN count(n) AS cnt", PropertyMap::new()).await.unwrap();
    let count: i64 = result.rows[0].get("cnt").unwrap();
    assert_eq!(count, 1, "explain must roll back, not commit, its transaction");
}

#[tokio::test]
async fn test_profile_annotates_steps_with_rows_and_time() {
    let graph = Graph::open_memory().await.unwrap();
    graph.mutate("CREATE (n:Person {name: 'Alice'})", PropertyMap::new()).await.unwrap();
    graph.mutate("CREATE (n:Person {name: 'Bob'})", PropertyMap::new()).await.unwrap();

    let result = graph.profile("MATCH (n:Person) RETURN n", PropertyMap::new()).await.unwrap();

    assert_eq!(result.columns, vec!["step", "detail"]);
    assert!(!result.rows.is_empty());

    for row in &result.rows {
        let detail: String = row.get("detail").unwrap();
        assert!(detail.contains("rows="), "detail should carry a row count: {detail}");
        assert!(detail.contains("time_ms="), "detail should carry a wall-time: {detail}");
    }
}

#[tokio::test]
async fn test_profile_runs_the_query_for_real() {
    let graph = Graph::open_memory().await.unwrap();

    // profile() of a CREATE should actually create the node.
    graph.profile("CREATE (n:Person {name: 'Ada'})", PropertyMap::new()).await.unwrap();

    let result = graph.execute("MATCH (n:Person) RETURN count(n) AS cnt", PropertyMap::new()).await.unwrap();
    let count: i64 = result.rows[0].get("cnt").unwrap();
    assert_eq!(count, 1, "profile must commit, since it actually executes the query");
}
