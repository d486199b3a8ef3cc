//! Recognition of the reduce-based distinct idiom.
//!
//! Front ends spell `DISTINCT e` as "group by `e`, keep an arbitrary `e`
//! per group": `Reduce(src, [e], [Arbitrary(e)], Reducer(0))`. That shape
//! is rewritten to a first-class `Distinct` node (over an inserted map
//! when `e` is not the row itself), which later stages can plan far more
//! directly than the general reduce.

use quasar_errors::PlannerResult;
use quasar_qscript::{
    FreeMap, Hole, NameGenerator, QScriptUniform, ReduceIndex, Reducer,
};
use tracing::{instrument, trace};

use crate::graph::QsuGraph;

#[instrument(skip_all)]
pub(crate) fn recognize_distinct(
    graph: &mut QsuGraph,
    names: &mut NameGenerator,
) -> PlannerResult<()> {
    for sym in graph.topo_symbols()? {
        let QScriptUniform::Reduce {
            source,
            buckets,
            reducers,
            repair,
        } = graph.node(sym)?
        else {
            continue;
        };
        let [bucket] = &buckets[..] else { continue };
        let [Reducer::Arbitrary(kept)] = &reducers[..] else {
            continue;
        };
        if kept != bucket || *repair != FreeMap::Leaf(ReduceIndex::Reducer(0)) {
            continue;
        }

        let source = *source;
        let bucket = bucket.clone();
        let replacement = if bucket == FreeMap::Leaf(Hole) {
            QScriptUniform::Distinct { source }
        } else {
            let mapped = graph.add_node(
                names,
                QScriptUniform::Map {
                    source,
                    func: bucket,
                },
            );
            QScriptUniform::Distinct { source: mapped }
        };
        trace!(node = %sym, "recognized distinct idiom");
        graph.overwrite(sym, replacement)?;
    }
    Ok(())
}
