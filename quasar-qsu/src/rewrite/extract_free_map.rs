//! Hoisting of map functions out of relational nodes.
//!
//! Adjacent maps fuse, and a map feeding a filter, sort, or subset is
//! commuted above it (the consumer's expressions compose with the map
//! function). The effect is that scalar work bubbles rootward and the
//! relational skeleton below it is laid bare, which is what the
//! distinct/autojoin recognizers and the shift machinery want to look at.
//!
//! Each rewrite either removes a map node or moves one strictly rootward,
//! so the fixpoint loop terminates.

use quasar_errors::PlannerResult;
use quasar_qscript::{FreeMap, Hole, NameGenerator, QScriptUniform, Symbol, UniformBranch};
use tracing::{instrument, trace};

use crate::graph::QsuGraph;

#[instrument(skip_all)]
pub(crate) fn extract_free_map(
    graph: &mut QsuGraph,
    names: &mut NameGenerator,
) -> PlannerResult<()> {
    loop {
        let Some(rewrite) = find_rewrite(graph)? else {
            break;
        };
        apply(graph, names, rewrite)?;
        graph.prune_unreachable();
    }
    Ok(())
}

enum Rewrite {
    /// `Map(Map(s, f), g)` fuses to `Map(s, g ∘ f)`.
    Fuse {
        node: Symbol,
        inner_source: Symbol,
        inner: FreeMap<Hole>,
        outer: FreeMap<Hole>,
    },
    /// `node(Map(s, f), …)` commutes to `Map(node(s, … ∘ f), f)`.
    Hoist {
        node: Symbol,
        inner_source: Symbol,
        func: FreeMap<Hole>,
    },
}

fn find_rewrite(graph: &QsuGraph) -> PlannerResult<Option<Rewrite>> {
    let rev = graph.reverse_index();
    let single_consumer =
        |m: Symbol| rev.get(&m).map(Vec::len) == Some(1) && m != graph.root();

    for sym in graph.topo_symbols()? {
        let pattern = graph.node(sym)?;
        let source = match pattern {
            QScriptUniform::Map { source, .. }
            | QScriptUniform::Filter { source, .. }
            | QScriptUniform::Sort { source, .. } => *source,
            QScriptUniform::Subset {
                source,
                from: UniformBranch::Hole,
                ..
            } => *source,
            _ => continue,
        };
        let QScriptUniform::Map {
            source: inner_source,
            func,
        } = graph.node(source)?
        else {
            continue;
        };
        if !single_consumer(source) {
            continue;
        }
        let rewrite = match pattern {
            QScriptUniform::Map { func: outer, .. } => Rewrite::Fuse {
                node: sym,
                inner_source: *inner_source,
                inner: func.clone(),
                outer: outer.clone(),
            },
            _ => Rewrite::Hoist {
                node: sym,
                inner_source: *inner_source,
                func: func.clone(),
            },
        };
        return Ok(Some(rewrite));
    }
    Ok(None)
}

fn apply(graph: &mut QsuGraph, names: &mut NameGenerator, rewrite: Rewrite) -> PlannerResult<()> {
    match rewrite {
        Rewrite::Fuse {
            node,
            inner_source,
            inner,
            outer,
        } => {
            trace!(%node, "fusing adjacent maps");
            graph.overwrite(
                node,
                QScriptUniform::Map {
                    source: inner_source,
                    func: outer.flat_map(|_| inner.clone()),
                },
            )?;
        }
        Rewrite::Hoist {
            node,
            inner_source,
            func,
        } => {
            trace!(%node, "hoisting map above relational node");
            let compose =
                |expr: FreeMap<Hole>| expr.flat_map(|_| func.clone());
            let lowered = match graph.node(node)?.clone() {
                QScriptUniform::Filter { predicate, .. } => QScriptUniform::Filter {
                    source: inner_source,
                    predicate: compose(predicate),
                },
                QScriptUniform::Sort { buckets, order, .. } => QScriptUniform::Sort {
                    source: inner_source,
                    buckets: buckets.into_iter().map(compose).collect(),
                    order: order.mapped(|(expr, dir)| (compose(expr), dir)),
                },
                QScriptUniform::Subset {
                    from, op, count, ..
                } => QScriptUniform::Subset {
                    source: inner_source,
                    from,
                    op,
                    count,
                },
                other => {
                    // find_rewrite only proposes the shapes above
                    quasar_errors::internal!(
                        "cannot hoist a map past {}",
                        other.description()
                    )
                }
            };
            let lowered_sym = graph.add_node(names, lowered);
            graph.overwrite(
                node,
                QScriptUniform::Map {
                    source: lowered_sym,
                    func,
                },
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use quasar_qscript::dsl::*;
    use quasar_qscript::{IdStatus, SortOrder, TablePath};
    use vec1::vec1;

    use super::*;

    fn base_graph(names: &mut NameGenerator) -> QsuGraph {
        QsuGraph::with_name(
            names,
            QScriptUniform::ShiftedRead {
                path: TablePath::from("/db/zips"),
                id_status: IdStatus::ExcludeId,
            },
        )
    }

    #[test]
    fn adjacent_maps_fuse() {
        let mut names = NameGenerator::new();
        let mut graph = base_graph(&mut names);
        let base = graph.root();
        let inner = graph.add_node(
            &mut names,
            QScriptUniform::Map {
                source: base,
                func: project_key_s(hole(), "loc"),
            },
        );
        let outer = graph.add_node(
            &mut names,
            QScriptUniform::Map {
                source: inner,
                func: project_index_i(hole(), 0),
            },
        );
        graph.set_root(outer).unwrap();

        extract_free_map(&mut graph, &mut names).unwrap();

        assert_eq!(graph.len(), 2);
        match graph.node(outer).unwrap() {
            QScriptUniform::Map { source, func } => {
                assert_eq!(*source, base);
                assert_eq!(func, &project_index_i(project_key_s(hole(), "loc"), 0));
            }
            other => panic!("expected a map, got {}", other.description()),
        }
    }

    #[test]
    fn map_commutes_above_filter() {
        let mut names = NameGenerator::new();
        let mut graph = base_graph(&mut names);
        let base = graph.root();
        let map = graph.add_node(
            &mut names,
            QScriptUniform::Map {
                source: base,
                func: project_key_s(hole(), "loc"),
            },
        );
        let filter = graph.add_node(
            &mut names,
            QScriptUniform::Filter {
                source: map,
                predicate: eq(project_index_i(hole(), 0), int_lit(7)),
            },
        );
        graph.set_root(filter).unwrap();

        extract_free_map(&mut graph, &mut names).unwrap();

        // root is now the hoisted map, over a filter whose predicate
        // composed with the map function
        let QScriptUniform::Map { source, func } = graph.node(graph.root()).unwrap() else {
            panic!("expected the root to be a map");
        };
        assert_eq!(func, &project_key_s(hole(), "loc"));
        match graph.node(*source).unwrap() {
            QScriptUniform::Filter { source, predicate } => {
                assert_eq!(*source, base);
                assert_eq!(
                    predicate,
                    &eq(
                        project_index_i(project_key_s(hole(), "loc"), 0),
                        int_lit(7)
                    )
                );
            }
            other => panic!("expected a filter, got {}", other.description()),
        }
    }

    #[test]
    fn map_commutes_above_sort() {
        let mut names = NameGenerator::new();
        let mut graph = base_graph(&mut names);
        let base = graph.root();
        let map = graph.add_node(
            &mut names,
            QScriptUniform::Map {
                source: base,
                func: project_key_s(hole(), "loc"),
            },
        );
        let sort = graph.add_node(
            &mut names,
            QScriptUniform::Sort {
                source: map,
                buckets: vec![],
                order: vec1![(hole(), SortOrder::Ascending)],
            },
        );
        graph.set_root(sort).unwrap();

        extract_free_map(&mut graph, &mut names).unwrap();

        let QScriptUniform::Map { source, .. } = graph.node(graph.root()).unwrap() else {
            panic!("expected the root to be a map");
        };
        match graph.node(*source).unwrap() {
            QScriptUniform::Sort { order, .. } => {
                assert_eq!(&order.first().0, &project_key_s(hole(), "loc"));
            }
            other => panic!("expected a sort, got {}", other.description()),
        }
    }

    #[test]
    fn shared_maps_are_not_hoisted() {
        let mut names = NameGenerator::new();
        let mut graph = base_graph(&mut names);
        let base = graph.root();
        let map = graph.add_node(
            &mut names,
            QScriptUniform::Map {
                source: base,
                func: project_key_s(hole(), "loc"),
            },
        );
        let filter = graph.add_node(
            &mut names,
            QScriptUniform::Filter {
                source: map,
                predicate: eq(hole(), int_lit(1)),
            },
        );
        let join = graph.add_node(
            &mut names,
            QScriptUniform::AutoJoin {
                left: map,
                right: filter,
                combine: left_side(),
            },
        );
        graph.set_root(join).unwrap();
        let before = graph.len();

        extract_free_map(&mut graph, &mut names).unwrap();
        assert_eq!(graph.len(), before);
    }
}
