//! Restoration order for a set of tables.
//!
//! Every foreign key between two tables of the set is an edge
//! `child → parent`. Kahn's algorithm emits parents before children; ties
//! are broken by table name so the order is deterministic. A self-reference
//! is not an edge: the table is a single node whose own constraint stays
//! disabled for the restore window.

use crate::errors::{PitrError, Result};
use crate::model::SchemaRegistry;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

/// Order `tables` so that every referenced table precedes its referrers.
///
/// Duplicates are collapsed. Tables absent from the registry are rejected.
///
/// # Errors
///
/// - `PitrError::UnknownTable` if a table is not registered
/// - `PitrError::SchemaCycle` if the tables reference each other in a loop
///   of two or more distinct tables; `tables` lists the unresolved nodes
pub fn restoration_order(registry: &SchemaRegistry, tables: &[String]) -> Result<Vec<String>> {
    let nodes: BTreeSet<&str> = tables.iter().map(String::as_str).collect();

    // parent → children
    let mut outgoing: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();

    for &table in &nodes {
        let schema = registry.get(table)?;
        let parents: BTreeSet<&str> = schema
            .foreign_keys
            .iter()
            .filter(|fk| !fk.is_self_reference(table))
            .map(|fk| fk.references_table.as_str())
            .filter(|parent| nodes.contains(parent))
            .collect();
        indegree.insert(table, parents.len());
        for parent in parents {
            outgoing.entry(parent).or_default().insert(table);
        }
    }

    let mut ready: BinaryHeap<Reverse<&str>> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| Reverse(*name))
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(Reverse(current)) = ready.pop() {
        order.push(current.to_string());
        if let Some(children) = outgoing.get(current) {
            for child in children {
                if let Some(degree) = indegree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse(*child));
                    }
                }
            }
        }
    }

    if order.len() != nodes.len() {
        let unresolved = indegree
            .into_iter()
            .filter_map(|(name, degree)| (degree > 0).then(|| name.to_string()))
            .collect();
        return Err(PitrError::SchemaCycle { tables: unresolved });
    }

    Ok(order)
}
