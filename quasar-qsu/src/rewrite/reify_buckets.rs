//! Bucket reification: reduce repairs stop referencing buckets directly.
//!
//! A repair leaf `Bucket(i)` is made explicit by routing the bucket
//! expression through an `Arbitrary` reducer (every row in a group agrees
//! on its bucket values, so `Arbitrary` is exact) and pointing the leaf at
//! that reducer's output. After this pass reduce repairs reference reducer
//! outputs only, which graduation enforces.

use quasar_errors::{internal, PlannerResult};
use quasar_qscript::{FreeMap, QScriptUniform, ReduceIndex, Reducer};
use tracing::{instrument, trace};

use crate::provenance::AuthenticatedQsu;

#[instrument(skip_all)]
pub(crate) fn reify_buckets(qsu: &mut AuthenticatedQsu) -> PlannerResult<()> {
    qsu.graph.rewrite_nodes(|sym, pattern| {
        let QScriptUniform::Reduce {
            source,
            buckets,
            reducers,
            repair,
        } = pattern
        else {
            return Ok(None);
        };
        if !repair.any_leaf(|idx| matches!(idx, ReduceIndex::Bucket(_))) {
            return Ok(None);
        }

        let mut reducers = reducers.clone();
        let buckets = buckets.clone();
        let repair = repair.clone().try_flat_map(|idx| match idx {
            ReduceIndex::Bucket(i) => {
                let Some(bucket) = buckets.get(i) else {
                    internal!("bucket reference {} out of range at {}", i, sym)
                };
                let wanted = Reducer::Arbitrary(bucket.clone());
                let reducer_idx = match reducers.iter().position(|r| *r == wanted) {
                    Some(existing) => existing,
                    None => {
                        reducers.push(wanted);
                        reducers.len() - 1
                    }
                };
                Ok(FreeMap::Leaf(ReduceIndex::Reducer(reducer_idx)))
            }
            reducer => Ok(FreeMap::Leaf(reducer)),
        })?;
        trace!(node = %sym, reducers = reducers.len(), "reified bucket references");
        Ok(Some(QScriptUniform::Reduce {
            source: *source,
            buckets,
            reducers,
            repair,
        }))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use quasar_qscript::dsl::*;
    use quasar_qscript::{IdStatus, NameGenerator, TablePath};

    use super::*;
    use crate::graph::QsuGraph;
    use crate::rewrite::apply_provenance::apply_provenance;

    #[test]
    fn bucket_leaves_become_reducer_leaves() {
        let mut names = NameGenerator::new();
        let mut graph = QsuGraph::with_name(
            &mut names,
            QScriptUniform::ShiftedRead {
                path: TablePath::from("/db/zips"),
                id_status: IdStatus::ExcludeId,
            },
        );
        let base = graph.root();
        let reduce = graph.add_node(
            &mut names,
            QScriptUniform::Reduce {
                source: base,
                buckets: vec![project_key_s(hole(), "state")],
                reducers: vec![Reducer::Sum(project_key_s(hole(), "pop"))],
                repair: concat_maps(
                    make_map_s("state", FreeMap::Leaf(ReduceIndex::Bucket(0))),
                    make_map_s("pop", FreeMap::Leaf(ReduceIndex::Reducer(0))),
                ),
            },
        );
        graph.set_root(reduce).unwrap();
        let mut qsu = apply_provenance(graph).unwrap();

        reify_buckets(&mut qsu).unwrap();

        match qsu.graph.node(reduce).unwrap() {
            QScriptUniform::Reduce {
                reducers, repair, ..
            } => {
                assert_eq!(
                    reducers,
                    &vec![
                        Reducer::Sum(project_key_s(hole(), "pop")),
                        Reducer::Arbitrary(project_key_s(hole(), "state")),
                    ]
                );
                assert_eq!(
                    repair,
                    &concat_maps(
                        make_map_s("state", FreeMap::Leaf(ReduceIndex::Reducer(1))),
                        make_map_s("pop", FreeMap::Leaf(ReduceIndex::Reducer(0))),
                    )
                );
            }
            other => panic!("expected a reduce, got {}", other.description()),
        }
    }

    #[test]
    fn repeated_references_share_one_reducer() {
        let mut names = NameGenerator::new();
        let mut graph = QsuGraph::with_name(
            &mut names,
            QScriptUniform::ShiftedRead {
                path: TablePath::from("/db/zips"),
                id_status: IdStatus::ExcludeId,
            },
        );
        let base = graph.root();
        let reduce = graph.add_node(
            &mut names,
            QScriptUniform::Reduce {
                source: base,
                buckets: vec![project_key_s(hole(), "state")],
                reducers: vec![],
                repair: concat_maps(
                    make_map_s("a", FreeMap::Leaf(ReduceIndex::Bucket(0))),
                    make_map_s("b", FreeMap::Leaf(ReduceIndex::Bucket(0))),
                ),
            },
        );
        graph.set_root(reduce).unwrap();
        let mut qsu = apply_provenance(graph).unwrap();

        reify_buckets(&mut qsu).unwrap();

        match qsu.graph.node(reduce).unwrap() {
            QScriptUniform::Reduce { reducers, .. } => assert_eq!(reducers.len(), 1),
            other => panic!("expected a reduce, got {}", other.description()),
        }
    }
}
