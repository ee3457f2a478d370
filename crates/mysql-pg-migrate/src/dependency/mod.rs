//! Foreign key dependency graph and import ordering.
//!
//! The graph maps each table to the set of tables it references. The import
//! order is a post-order depth-first traversal: every table is emitted after
//! all of the tables it depends on.
//!
//! The traversal is iterative (explicit stack over an index arena), so deep
//! FK chains do not grow the call stack. A table that is reached again while
//! it is still on the stack closes a cycle, which is a fatal error.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::core::schema::ForeignKeyEdge;
use crate::error::{MigrateError, Result};

/// Mapping from table name to the tables it references.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    deps: BTreeMap<String, BTreeSet<String>>,
}

/// Visitation state of a node during the traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

impl DependencyGraph {
    /// Build the graph from the catalog's table list and FK edges.
    ///
    /// Every listed table gets an entry, possibly empty. Repeated edges
    /// between the same pair collapse into one. Self-references are dropped:
    /// they never constrain the order between tables.
    pub fn build(tables: &[String], edges: &[ForeignKeyEdge]) -> Self {
        let mut deps: BTreeMap<String, BTreeSet<String>> = tables
            .iter()
            .map(|t| (t.clone(), BTreeSet::new()))
            .collect();

        for edge in edges {
            if edge.is_self_reference() {
                debug!(
                    "{}: ignoring self-referencing foreign key on column {}",
                    edge.table, edge.column
                );
                continue;
            }
            deps.entry(edge.table.clone())
                .or_default()
                .insert(edge.ref_table.clone());
        }

        Self { deps }
    }

    /// Number of distinct table-to-table edges.
    pub fn edge_count(&self) -> usize {
        self.deps.values().map(BTreeSet::len).sum()
    }

    /// Compute the import order for `tables`.
    ///
    /// Tables are visited in the order given, and each table's dependencies
    /// are visited in that same order, so the result is deterministic for a
    /// given input. Dependencies on tables outside `tables` are ignored.
    /// Duplicate names in `tables` are emitted once.
    pub fn topological_order(&self, tables: &[String]) -> Result<Vec<String>> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(tables.len());
        for (i, name) in tables.iter().enumerate() {
            index.entry(name.as_str()).or_insert(i);
        }

        let adjacency: Vec<Vec<usize>> = tables
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let mut ids: Vec<usize> = Vec::new();
                for referenced in self.deps.get(name).into_iter().flatten() {
                    match index.get(referenced.as_str()) {
                        Some(&id) if id != i => ids.push(id),
                        Some(_) => {}
                        None => warn!(
                            "{}: referenced table {} is not being imported, ignoring dependency",
                            name, referenced
                        ),
                    }
                }
                ids.sort_unstable();
                ids.dedup();
                ids
            })
            .collect();

        let mut marks = vec![Mark::Unvisited; tables.len()];
        let mut order = Vec::with_capacity(tables.len());
        // (node, position of the next dependency to visit)
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for root in 0..tables.len() {
            if index[tables[root].as_str()] != root || marks[root] != Mark::Unvisited {
                continue;
            }

            marks[root] = Mark::InProgress;
            stack.push((root, 0));

            while let Some(frame) = stack.last_mut() {
                let node = frame.0;
                if let Some(&dep) = adjacency[node].get(frame.1) {
                    frame.1 += 1;
                    match marks[dep] {
                        Mark::Unvisited => {
                            marks[dep] = Mark::InProgress;
                            stack.push((dep, 0));
                        }
                        Mark::InProgress => return Err(cycle_error(tables, &stack, dep)),
                        Mark::Done => {}
                    }
                } else {
                    marks[node] = Mark::Done;
                    order.push(tables[node].clone());
                    stack.pop();
                }
            }
        }

        Ok(order)
    }
}

/// Build the cycle error from the traversal stack.
fn cycle_error(tables: &[String], stack: &[(usize, usize)], dep: usize) -> MigrateError {
    let start = stack.iter().position(|&(n, _)| n == dep).unwrap_or(0);
    let mut cycle: Vec<String> = stack[start..]
        .iter()
        .map(|&(n, _)| tables[n].clone())
        .collect();
    cycle.push(tables[dep].clone());

    MigrateError::CyclicDependency {
        table: tables[dep].clone(),
        cycle,
    }
}

/// Build the graph and compute the import order in one step.
pub fn import_order(tables: &[String], edges: &[ForeignKeyEdge]) -> Result<Vec<String>> {
    DependencyGraph::build(tables, edges).topological_order(tables)
}
