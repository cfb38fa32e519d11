//! Topological ordering of merge tables by FK dependency.

use std::collections::{BTreeMap, BTreeSet};

use steep_engine::TableRef;
use steep_engine::catalog::ForeignKeyDep;

use crate::error::{MergeError, Result};

/// Sorts `tables` so every FK parent precedes its children.
///
/// Kahn's algorithm with a deterministic tie-break: among tables with no
/// remaining parents, the lexicographically smallest qualified name goes
/// first. Only edges whose endpoints are both in `tables` matter;
/// self-references are ignored. A cycle aborts the merge.
pub fn topo_sort(tables: &[TableRef], deps: &[ForeignKeyDep]) -> Result<Vec<TableRef>> {
    let in_scope: BTreeSet<&TableRef> = tables.iter().collect();

    // parent -> children, and per-table count of in-scope parents
    let mut children: BTreeMap<&TableRef, Vec<&TableRef>> = BTreeMap::new();
    let mut parent_count: BTreeMap<&TableRef, usize> =
        tables.iter().map(|t| (t, 0usize)).collect();

    for dep in deps {
        if dep.child == dep.parent {
            continue;
        }
        let (Some(&child), Some(&parent)) =
            (in_scope.get(&dep.child), in_scope.get(&dep.parent))
        else {
            continue;
        };
        children.entry(parent).or_default().push(child);
        *parent_count.entry(child).or_default() += 1;
    }

    let mut ready: BTreeSet<&TableRef> = parent_count
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(t, _)| *t)
        .collect();

    let mut order = Vec::with_capacity(tables.len());
    while let Some(&next) = ready.iter().next() {
        ready.remove(next);
        order.push(next.clone());
        if let Some(kids) = children.get(next) {
            for &kid in kids {
                if let Some(count) = parent_count.get_mut(kid) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(kid);
                    }
                }
            }
        }
    }

    if order.len() != tables.len() {
        let stuck: Vec<String> = parent_count
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(t, _)| t.to_string())
            .collect();
        return Err(MergeError::DependencyCycle(stuck));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn t(name: &str) -> TableRef {
        TableRef::new("public", name)
    }

    fn dep(child: &str, parent: &str) -> ForeignKeyDep {
        ForeignKeyDep {
            child: t(child),
            parent: t(parent),
        }
    }

    #[test]
    fn parents_precede_children() {
        let tables = vec![t("order_items"), t("orders"), t("customers")];
        let deps = vec![dep("orders", "customers"), dep("order_items", "orders")];
        let order = topo_sort(&tables, &deps).unwrap();
        assert_eq!(order, vec![t("customers"), t("orders"), t("order_items")]);
    }

    #[test]
    fn independent_tables_sort_by_name() {
        let tables = vec![t("zebra"), t("apple"), t("mango")];
        let order = topo_sort(&tables, &[]).unwrap();
        assert_eq!(order, vec![t("apple"), t("mango"), t("zebra")]);
    }

    #[test]
    fn out_of_scope_edges_ignored() {
        let tables = vec![t("orders")];
        let deps = vec![dep("orders", "customers")];
        let order = topo_sort(&tables, &deps).unwrap();
        assert_eq!(order, vec![t("orders")]);
    }

    #[test]
    fn self_reference_ignored() {
        let tables = vec![t("employees")];
        let deps = vec![dep("employees", "employees")];
        assert!(topo_sort(&tables, &deps).is_ok());
    }

    #[test]
    fn cycle_fails() {
        let tables = vec![t("a"), t("b")];
        let deps = vec![dep("a", "b"), dep("b", "a")];
        let err = topo_sort(&tables, &deps).unwrap_err();
        match err {
            MergeError::DependencyCycle(stuck) => {
                assert_eq!(stuck, vec!["public.a".to_string(), "public.b".to_string()]);
            }
            other => panic!("expected cycle error, got {other}"),
        }
    }

    #[test]
    fn deterministic_across_input_order() {
        let deps = vec![dep("orders", "customers")];
        let forward = topo_sort(&[t("customers"), t("orders"), t("misc")], &deps).unwrap();
        let reversed = topo_sort(&[t("misc"), t("orders"), t("customers")], &deps).unwrap();
        assert_eq!(forward, reversed);
    }

    proptest! {
        #[test]
        fn every_edge_respected(n in 2usize..8, edges in proptest::collection::vec((0usize..8, 0usize..8), 0..12)) {
            let tables: Vec<TableRef> = (0..n).map(|i| t(&format!("t{i}"))).collect();
            // keep it acyclic: only parent < child edges
            let deps: Vec<ForeignKeyDep> = edges
                .into_iter()
                .filter(|(p, c)| p < c && *c < n)
                .map(|(p, c)| dep(&format!("t{c}"), &format!("t{p}")))
                .collect();
            let order = topo_sort(&tables, &deps).unwrap();
            prop_assert_eq!(order.len(), n);
            for d in &deps {
                let pi = order.iter().position(|x| x == &d.parent).unwrap();
                let ci = order.iter().position(|x| x == &d.child).unwrap();
                prop_assert!(pi < ci, "parent {} must precede child {}", d.parent, d.child);
            }
        }
    }
}
