//! Foreign-key dependency planning.
//!
//! Converts the FK graph into a level-ordered plan whose traversal visits
//! referenced tables before referencing ones. Cycles are tolerated and
//! flagged rather than rejected: every member of a cycle is marked
//! circular, and circular referenced tables do not contribute to a
//! referencing table's level. Self-references are dropped before traversal.

use std::collections::{HashMap, HashSet};

use sqlx::mysql::MySqlPool;
use tracing::{debug, warn};

use crate::catalog::{self, ForeignKeyEdge};
use crate::error::Result;

/// One table in the processing plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNode {
    pub name: String,

    /// In-catalog tables this one references, self-references excluded.
    pub references: Vec<String>,

    /// Longest dependency chain from this table to a root table.
    pub level: u32,

    /// Set on every member of a foreign-key cycle.
    pub circular: bool,
}

/// Probe the source catalog and produce the plan.
///
/// A table whose foreign keys cannot be read is planned without them.
pub async fn dependency_plan(pool: &MySqlPool) -> Result<Vec<TableNode>> {
    let tables = catalog::list_tables(pool).await?;

    let mut edges: HashMap<String, Vec<ForeignKeyEdge>> = HashMap::new();
    for table in &tables {
        match catalog::foreign_keys(pool, table).await {
            Ok(fks) => {
                edges.insert(table.clone(), fks);
            }
            Err(err) => warn!("failed to read foreign keys for table {table}: {err}"),
        }
    }

    Ok(build_plan(&tables, &edges))
}

/// Build the level-ordered plan from a known table set and its FK edges.
///
/// The output is sorted by ascending level; ties keep the input order, so
/// a lexicographic table list yields a deterministic plan.
pub fn build_plan(
    tables: &[String],
    edges: &HashMap<String, Vec<ForeignKeyEdge>>,
) -> Vec<TableNode> {
    let known: HashSet<&str> = tables.iter().map(String::as_str).collect();

    let mut references: HashMap<&str, Vec<String>> = HashMap::new();
    for table in tables {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut targets = Vec::new();
        for fk in edges.get(table).map(Vec::as_slice).unwrap_or_default() {
            let target = fk.referenced_table.as_str();
            if target == table {
                debug!("table {table} references itself, ignored for ordering");
                continue;
            }
            if !known.contains(target) {
                warn!("table {table} references {target}, which is not in the catalog");
                continue;
            }
            if seen.insert(target) {
                targets.push(target.to_string());
            }
        }
        references.insert(table.as_str(), targets);
    }

    let mut circular: HashSet<String> = HashSet::new();
    {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = Vec::new();
        let mut on_stack: HashSet<&str> = HashSet::new();
        for table in tables {
            mark_cycles(
                table.as_str(),
                &references,
                &mut visited,
                &mut stack,
                &mut on_stack,
                &mut circular,
            );
        }
    }

    let mut memo: HashMap<&str, u32> = HashMap::new();
    let mut in_progress: HashSet<&str> = HashSet::new();
    let mut nodes: Vec<TableNode> = tables
        .iter()
        .map(|table| TableNode {
            name: table.clone(),
            references: references.get(table.as_str()).cloned().unwrap_or_default(),
            level: level_of(
                table.as_str(),
                &references,
                &circular,
                &mut memo,
                &mut in_progress,
            ),
            circular: circular.contains(table.as_str()),
        })
        .collect();

    // stable sort: ties stay in catalog order
    nodes.sort_by_key(|node| node.level);
    nodes
}

/// Depth-first cycle detection. Hitting a table already on the recursion
/// stack marks the whole stack segment from that table upward as circular.
fn mark_cycles<'a>(
    table: &'a str,
    references: &'a HashMap<&'a str, Vec<String>>,
    visited: &mut HashSet<&'a str>,
    stack: &mut Vec<&'a str>,
    on_stack: &mut HashSet<&'a str>,
    circular: &mut HashSet<String>,
) {
    if on_stack.contains(table) {
        if let Some(pos) = stack.iter().position(|entry| *entry == table) {
            for member in &stack[pos..] {
                circular.insert((*member).to_string());
            }
        }
        return;
    }
    if !visited.insert(table) {
        return;
    }

    stack.push(table);
    on_stack.insert(table);
    if let Some(targets) = references.get(table) {
        for target in targets {
            mark_cycles(target.as_str(), references, visited, stack, on_stack, circular);
        }
    }
    stack.pop();
    on_stack.remove(table);
}

/// Memoized level computation.
///
/// level(t) = 0 when t has no contributing references, otherwise
/// 1 + max(level(r)) over references that are not cycle members.
fn level_of<'a>(
    table: &'a str,
    references: &'a HashMap<&'a str, Vec<String>>,
    circular: &HashSet<String>,
    memo: &mut HashMap<&'a str, u32>,
    in_progress: &mut HashSet<&'a str>,
) -> u32 {
    if let Some(level) = memo.get(table) {
        return *level;
    }
    // recursion guard; cycle members are already flagged
    if !in_progress.insert(table) {
        return 0;
    }

    let mut level = 0;
    if let Some(targets) = references.get(table) {
        for target in targets {
            if circular.contains(target.as_str()) {
                continue;
            }
            let contribution = level_of(target.as_str(), references, circular, memo, in_progress) + 1;
            level = level.max(contribution);
        }
    }

    in_progress.remove(table);
    memo.insert(table, level);
    level
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(table: &str, referenced: &str) -> ForeignKeyEdge {
        ForeignKeyEdge {
            table: table.to_string(),
            column: format!("{referenced}_id"),
            referenced_table: referenced.to_string(),
            referenced_column: "id".to_string(),
            constraint: format!("fk_{table}_{referenced}"),
        }
    }

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn plan(tables: &[&str], fks: &[(&str, &str)]) -> Vec<TableNode> {
        let mut edges: HashMap<String, Vec<ForeignKeyEdge>> = HashMap::new();
        for (table, referenced) in fks {
            edges
                .entry(table.to_string())
                .or_default()
                .push(edge(table, referenced));
        }
        build_plan(&names(tables), &edges)
    }

    fn node<'a>(plan: &'a [TableNode], name: &str) -> &'a TableNode {
        plan.iter().find(|n| n.name == name).unwrap()
    }

    #[test]
    fn test_independent_tables_are_all_level_zero() {
        let plan = plan(&["a", "b", "c"], &[]);
        assert!(plan.iter().all(|n| n.level == 0 && !n.circular));
        let order: Vec<&str> = plan.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_chain_orders_parents_first() {
        // c -> b -> a
        let plan = plan(&["a", "b", "c"], &[("b", "a"), ("c", "b")]);
        assert_eq!(node(&plan, "a").level, 0);
        assert_eq!(node(&plan, "b").level, 1);
        assert_eq!(node(&plan, "c").level, 2);
        let order: Vec<&str> = plan.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_diamond_takes_longest_chain() {
        // d -> b, d -> c, b -> a, c -> a
        let plan = plan(
            &["a", "b", "c", "d"],
            &[("d", "b"), ("d", "c"), ("b", "a"), ("c", "a")],
        );
        assert_eq!(node(&plan, "a").level, 0);
        assert_eq!(node(&plan, "b").level, 1);
        assert_eq!(node(&plan, "c").level, 1);
        assert_eq!(node(&plan, "d").level, 2);
    }

    #[test]
    fn test_levels_are_non_decreasing_in_plan_order() {
        let plan = plan(
            &["a", "b", "c", "d", "e"],
            &[("b", "a"), ("c", "a"), ("d", "c"), ("e", "d")],
        );
        let levels: Vec<u32> = plan.iter().map(|n| n.level).collect();
        let mut sorted = levels.clone();
        sorted.sort_unstable();
        assert_eq!(levels, sorted);
    }

    #[test]
    fn test_self_reference_is_not_a_cycle() {
        let plan = plan(&["nodes"], &[("nodes", "nodes")]);
        let n = node(&plan, "nodes");
        assert_eq!(n.level, 0);
        assert!(!n.circular);
        assert!(n.references.is_empty());
    }

    #[test]
    fn test_two_node_cycle_flags_both_members() {
        let plan = plan(&["a", "b"], &[("a", "b"), ("b", "a")]);
        let a = node(&plan, "a");
        let b = node(&plan, "b");
        assert!(a.circular);
        assert!(b.circular);
        // neither level depends on the other
        assert_eq!(a.level, 0);
        assert_eq!(b.level, 0);
    }

    #[test]
    fn test_cycle_members_still_take_outside_dependencies() {
        // a <-> b cycle, but b also references a plain root table
        let plan = plan(&["a", "b", "root"], &[("a", "b"), ("b", "a"), ("b", "root")]);
        assert!(node(&plan, "a").circular);
        assert!(node(&plan, "b").circular);
        assert_eq!(node(&plan, "root").level, 0);
        assert!(!node(&plan, "root").circular);
        assert_eq!(node(&plan, "b").level, 1);
    }

    #[test]
    fn test_reference_to_unknown_table_is_skipped() {
        let plan = plan(&["a"], &[("a", "phantom")]);
        let a = node(&plan, "a");
        assert_eq!(a.level, 0);
        assert!(a.references.is_empty());
    }

    #[test]
    fn test_duplicate_edges_count_once() {
        let mut edges: HashMap<String, Vec<ForeignKeyEdge>> = HashMap::new();
        edges.insert(
            "b".to_string(),
            vec![edge("b", "a"), edge("b", "a"), edge("b", "a")],
        );
        let plan = build_plan(&names(&["a", "b"]), &edges);
        assert_eq!(node(&plan, "b").references, vec!["a".to_string()]);
        assert_eq!(node(&plan, "b").level, 1);
    }

    #[test]
    fn test_three_node_cycle_flags_every_member() {
        let plan = plan(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "a")]);
        assert!(plan.iter().all(|n| n.circular));
    }
}
