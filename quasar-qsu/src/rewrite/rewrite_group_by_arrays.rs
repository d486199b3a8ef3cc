//! Normalization of group-bys whose buckets are static array
//! constructions.
//!
//! A front end grouping by several keys at once often packs them into one
//! array-valued bucket. Grouping by the array is equivalent to grouping by
//! its elements, and the element form is what the later bucket machinery
//! (provenance, reification) wants to see, so each static array bucket is
//! split into one bucket per element. Repair references to a split bucket
//! are rewritten to rebuild the array from the split parts, preserving the
//! node's output exactly.

use quasar_errors::{internal, PlannerResult};
use quasar_qscript::dsl::{concat_arrays, make_array};
use quasar_qscript::{
    FreeMap, Hole, MapFunc, QScriptUniform, ReduceIndex, ReduceRepair,
};
use tracing::{instrument, trace};

use crate::graph::QsuGraph;

#[instrument(skip_all)]
pub(crate) fn rewrite_group_by_arrays(graph: &mut QsuGraph) -> PlannerResult<()> {
    graph.rewrite_nodes(|sym, pattern| {
        let QScriptUniform::Reduce {
            source,
            buckets,
            reducers,
            repair,
        } = pattern
        else {
            return Ok(None);
        };
        if !buckets.iter().any(|b| splits(b).is_some()) {
            return Ok(None);
        }

        // where each original bucket landed in the split list, and whether
        // its repair references must rebuild an array value
        let mut split_buckets = Vec::new();
        let mut spans = Vec::with_capacity(buckets.len());
        for bucket in buckets {
            match splits(bucket) {
                Some(parts) => {
                    spans.push(Span {
                        start: split_buckets.len(),
                        len: parts.len(),
                        rebuild_array: true,
                    });
                    split_buckets.extend(parts.into_iter().cloned());
                }
                None => {
                    spans.push(Span {
                        start: split_buckets.len(),
                        len: 1,
                        rebuild_array: false,
                    });
                    split_buckets.push(bucket.clone());
                }
            }
        }
        trace!(%sym, from = buckets.len(), to = split_buckets.len(), "split array buckets");

        let repair = rewrite_repair(repair.clone(), &spans)?;
        Ok(Some(QScriptUniform::Reduce {
            source: *source,
            buckets: split_buckets,
            reducers: reducers.clone(),
            repair,
        }))
    })?;
    Ok(())
}

/// The element expressions of a static array construction, or `None` if
/// the bucket is anything else.
fn splits(bucket: &FreeMap<Hole>) -> Option<Vec<&FreeMap<Hole>>> {
    match bucket {
        FreeMap::Func(node) => match &**node {
            MapFunc::MakeArray(elem) => Some(vec![elem]),
            MapFunc::ConcatArrays(left, right) => {
                let mut parts = splits(left)?;
                parts.extend(splits(right)?);
                Some(parts)
            }
            _ => None,
        },
        FreeMap::Leaf(_) => None,
    }
}

#[derive(Clone, Copy)]
struct Span {
    start: usize,
    len: usize,
    rebuild_array: bool,
}

fn rewrite_repair(repair: ReduceRepair, spans: &[Span]) -> PlannerResult<ReduceRepair> {
    repair.try_flat_map(|idx| match idx {
        ReduceIndex::Bucket(i) => {
            let Some(&Span {
                start,
                len,
                rebuild_array,
            }) = spans.get(i)
            else {
                internal!("bucket reference {} out of range in reduce repair", i)
            };
            if !rebuild_array {
                Ok(FreeMap::Leaf(ReduceIndex::Bucket(start)))
            } else {
                // rebuild the original array value from the split buckets
                let mut acc = make_array(FreeMap::Leaf(ReduceIndex::Bucket(start)));
                for j in start + 1..start + len {
                    acc = concat_arrays(acc, make_array(FreeMap::Leaf(ReduceIndex::Bucket(j))));
                }
                Ok(acc)
            }
        }
        reducer => Ok(FreeMap::Leaf(reducer)),
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use quasar_qscript::dsl::*;
    use quasar_qscript::{IdStatus, NameGenerator, Reducer, TablePath};

    use super::*;

    #[test]
    fn array_buckets_split_into_elements() {
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
                buckets: vec![concat_arrays(
                    make_array(project_key_s(hole(), "state")),
                    make_array(project_key_s(hole(), "city")),
                )],
                reducers: vec![Reducer::Count(hole())],
                repair: concat_maps(
                    make_map_s("key", FreeMap::Leaf(ReduceIndex::Bucket(0))),
                    make_map_s("count", FreeMap::Leaf(ReduceIndex::Reducer(0))),
                ),
            },
        );
        graph.set_root(reduce).unwrap();

        rewrite_group_by_arrays(&mut graph).unwrap();

        match graph.node(reduce).unwrap() {
            QScriptUniform::Reduce {
                buckets, repair, ..
            } => {
                assert_eq!(
                    buckets,
                    &vec![
                        project_key_s(hole(), "state"),
                        project_key_s(hole(), "city")
                    ]
                );
                assert_eq!(
                    repair,
                    &concat_maps(
                        make_map_s(
                            "key",
                            concat_arrays(
                                make_array(FreeMap::Leaf(ReduceIndex::Bucket(0))),
                                make_array(FreeMap::Leaf(ReduceIndex::Bucket(1))),
                            )
                        ),
                        make_map_s("count", FreeMap::Leaf(ReduceIndex::Reducer(0))),
                    )
                );
            }
            other => panic!("expected a reduce, got {}", other.description()),
        }
    }

    #[test]
    fn scalar_buckets_are_untouched() {
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
                reducers: vec![Reducer::Count(hole())],
                repair: FreeMap::Leaf(ReduceIndex::Reducer(0)),
            },
        );
        graph.set_root(reduce).unwrap();
        let before = graph.node(reduce).unwrap().clone();

        rewrite_group_by_arrays(&mut graph).unwrap();
        assert_eq!(graph.node(reduce).unwrap(), &before);
    }
}
