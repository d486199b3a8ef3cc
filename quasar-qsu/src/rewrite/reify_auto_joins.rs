//! Conversion of the remaining autojoins into explicit theta joins.
//!
//! Arms that the minimization pass could not merge diverge below some
//! common source ancestor. As long as the divergence is row-preserving
//! (maps, filters, sorts, subsets), rows on the two sides still correspond
//! through the ancestor row, so the autojoin is an inner join keyed on it.
//! Each arm is rebuilt as a branch sub-plan that threads the pre-branch
//! row under a `"key"` entry next to its transformed `"val"`; the join
//! equates the keys and the combiner projects the vals.
//!
//! Divergence through row-multiplying or row-collapsing nodes (shifts,
//! reduces, unions) has no keyed-join rendering here and is reported as
//! unsupported rather than planned wrongly.

use std::collections::HashSet;

use quasar_errors::{unsupported, PlannerResult};
use quasar_qscript::dsl::{
    concat_maps, eq, hole, left_side, make_map_s, project_key_s, right_side,
};
use quasar_qscript::{
    FreeMap, Hole, JoinType, QScriptUniform, Symbol, UniformBranch,
};
use tracing::{instrument, trace};

use crate::graph::QsuGraph;
use crate::provenance::AuthenticatedQsu;
use crate::rewrite::apply_provenance::refresh;

#[instrument(skip_all)]
pub(crate) fn reify_auto_joins(qsu: &mut AuthenticatedQsu) -> PlannerResult<()> {
    for sym in qsu.graph.topo_symbols()? {
        if !qsu.graph.contains(sym) {
            // removed by pruning after an earlier reification
            continue;
        }
        let QScriptUniform::AutoJoin {
            left,
            right,
            combine,
        } = qsu.graph.node(sym)?
        else {
            continue;
        };
        let (left, right, combine) = (*left, *right, combine.clone());

        let left_chain = source_chain(&qsu.graph, left)?;
        let right_chain = source_chain(&qsu.graph, right)?;
        let left_set: HashSet<Symbol> = left_chain.iter().copied().collect();
        let Some(ancestor) = right_chain.iter().copied().find(|s| left_set.contains(s))
        else {
            unsupported!("autojoin arms at {} share no common source", sym)
        };
        trace!(node = %sym, %ancestor, "reifying autojoin into a theta join");

        let left_branch = arm_branch(&qsu.graph, &left_chain, ancestor)?;
        let right_branch = arm_branch(&qsu.graph, &right_chain, ancestor)?;

        let pattern = QScriptUniform::ThetaJoin {
            source: ancestor,
            left: left_branch,
            right: right_branch,
            on: eq(
                project_key_s(left_side(), "key"),
                project_key_s(right_side(), "key"),
            ),
            join_type: JoinType::Inner,
            combine: combine
                .flat_map(|side| project_key_s(FreeMap::Leaf(side), "val")),
        };
        qsu.graph.overwrite(sym, pattern)?;
        refresh(qsu, sym)?;
        qsu.graph.prune_unreachable();
    }
    Ok(())
}

/// The chain of symbols from `from` down through single-source nodes,
/// starting with `from` itself.
fn source_chain(graph: &QsuGraph, from: Symbol) -> PlannerResult<Vec<Symbol>> {
    let mut chain = vec![from];
    let mut current = from;
    loop {
        let next = match graph.node(current)?.sources().as_slice() {
            [only] => **only,
            _ => break,
        };
        chain.push(next);
        current = next;
    }
    Ok(chain)
}

/// Rebuilds the arm segment above `ancestor` as a key-threading branch.
fn arm_branch(
    graph: &QsuGraph,
    chain: &[Symbol],
    ancestor: Symbol,
) -> PlannerResult<UniformBranch> {
    // scaffold at the bottom: every row enters as {key: row, val: row}
    let mut branch = UniformBranch::node(QScriptUniform::Map {
        source: UniformBranch::Hole,
        func: concat_maps(make_map_s("key", hole()), make_map_s("val", hole())),
    });

    let segment = chain
        .iter()
        .copied()
        .take_while(|&s| s != ancestor)
        .collect::<Vec<_>>();
    let with_val = |expr: FreeMap<Hole>| expr.flat_map(|_| project_key_s(hole(), "val"));

    for sym in segment.into_iter().rev() {
        let node = match graph.node(sym)?.clone() {
            QScriptUniform::Map { func, .. } => QScriptUniform::Map {
                source: branch,
                func: concat_maps(
                    make_map_s("key", project_key_s(hole(), "key")),
                    make_map_s("val", with_val(func)),
                ),
            },
            QScriptUniform::Filter { predicate, .. } => QScriptUniform::Filter {
                source: branch,
                predicate: with_val(predicate),
            },
            QScriptUniform::Sort { buckets, order, .. } => QScriptUniform::Sort {
                source: branch,
                buckets: buckets.into_iter().map(with_val).collect(),
                order: order.mapped(|(expr, dir)| (with_val(expr), dir)),
            },
            QScriptUniform::Subset {
                from: UniformBranch::Hole,
                op,
                count,
                ..
            } => QScriptUniform::Subset {
                source: branch,
                from: UniformBranch::Hole,
                op,
                count,
            },
            other => unsupported!(
                "autojoin arm diverges through {}, which does not preserve rows",
                other.description()
            ),
        };
        branch = UniformBranch::node(node);
    }
    Ok(branch)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use quasar_qscript::dsl::*;
    use quasar_qscript::{IdStatus, NameGenerator, Rotation, TablePath};

    use super::*;
    use crate::rewrite::apply_provenance::apply_provenance;

    fn zips(names: &mut NameGenerator) -> QsuGraph {
        QsuGraph::with_name(
            names,
            QScriptUniform::ShiftedRead {
                path: TablePath::from("/db/zips"),
                id_status: IdStatus::ExcludeId,
            },
        )
    }

    #[test]
    fn filtered_arm_joins_back_on_the_ancestor_row() {
        let mut names = NameGenerator::new();
        let mut graph = zips(&mut names);
        let base = graph.root();
        let filtered = graph.add_node(
            &mut names,
            QScriptUniform::Filter {
                source: base,
                predicate: eq(project_key_s(hole(), "state"), str_lit("CO")),
            },
        );
        let join = graph.add_node(
            &mut names,
            QScriptUniform::AutoJoin {
                left: base,
                right: filtered,
                combine: concat_maps(
                    make_map_s("row", left_side()),
                    make_map_s("co_row", right_side()),
                ),
            },
        );
        graph.set_root(join).unwrap();
        let mut qsu = apply_provenance(graph).unwrap();

        reify_auto_joins(&mut qsu).unwrap();

        let QScriptUniform::ThetaJoin {
            source,
            left,
            right,
            on,
            join_type,
            combine,
        } = qsu.graph.node(join).unwrap()
        else {
            panic!("expected a theta join");
        };
        assert_eq!(*source, base);
        assert_eq!(*join_type, JoinType::Inner);
        assert_eq!(
            on,
            &eq(
                project_key_s(left_side(), "key"),
                project_key_s(right_side(), "key"),
            )
        );
        // left arm is bare: just the scaffold
        assert_eq!(
            left,
            &UniformBranch::node(QScriptUniform::Map {
                source: UniformBranch::Hole,
                func: concat_maps(make_map_s("key", hole()), make_map_s("val", hole())),
            })
        );
        // right arm re-applies the filter against the threaded val
        match right {
            UniformBranch::Node(node) => match &**node {
                QScriptUniform::Filter { predicate, .. } => assert_eq!(
                    predicate,
                    &eq(
                        project_key_s(project_key_s(hole(), "val"), "state"),
                        str_lit("CO")
                    )
                ),
                other => panic!("expected a filter, got {}", other.description()),
            },
            UniformBranch::Hole => panic!("expected a rolled branch"),
        }
        assert_eq!(
            combine,
            &concat_maps(
                make_map_s("row", project_key_s(left_side(), "val")),
                make_map_s("co_row", project_key_s(right_side(), "val")),
            )
        );
    }

    #[test]
    fn shift_divergence_is_unsupported() {
        let mut names = NameGenerator::new();
        let mut graph = zips(&mut names);
        let base = graph.root();
        let shifted = graph.add_node(
            &mut names,
            QScriptUniform::LeftShift {
                source: base,
                structure: project_key_s(hole(), "cities"),
                id_status: IdStatus::ExcludeId,
                rotation: Rotation::ShiftArray,
                repair: right_target(),
            },
        );
        let filtered = graph.add_node(
            &mut names,
            QScriptUniform::Filter {
                source: base,
                predicate: constant(quasar_qscript::Value::Bool(false)),
            },
        );
        let join = graph.add_node(
            &mut names,
            QScriptUniform::AutoJoin {
                left: shifted,
                right: filtered,
                combine: left_side(),
            },
        );
        graph.set_root(join).unwrap();
        let mut qsu = apply_provenance(graph).unwrap();

        assert!(reify_auto_joins(&mut qsu).unwrap_err().is_unsupported());
    }

    #[test]
    fn unrelated_sources_are_unsupported() {
        let mut names = NameGenerator::new();
        let mut graph = zips(&mut names);
        let a = graph.root();
        let b = graph.add_node(
            &mut names,
            QScriptUniform::ShiftedRead {
                path: TablePath::from("/db/pets"),
                id_status: IdStatus::ExcludeId,
            },
        );
        let join = graph.add_node(
            &mut names,
            QScriptUniform::AutoJoin {
                left: a,
                right: b,
                combine: left_side(),
            },
        );
        graph.set_root(join).unwrap();
        let mut qsu = apply_provenance(graph).unwrap();

        assert!(reify_auto_joins(&mut qsu).unwrap_err().is_unsupported());
    }
}
