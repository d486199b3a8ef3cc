//! Elimination of trivial unary nodes.
//!
//! Identity maps, always-true filters, and drop-zero subsets contribute
//! nothing; consumers are re-pointed at the node's source and the node is
//! pruned. Runs to fixpoint so chains of trivial nodes collapse fully.

use quasar_errors::PlannerResult;
use quasar_qscript::{
    FreeMap, Hole, MapFunc, QScriptUniform, Symbol, UniformBranch, Value,
};
use tracing::{instrument, trace};

use crate::graph::{QsuGraph, QsuPattern};

#[instrument(skip_all)]
pub(crate) fn eliminate_unary(graph: &mut QsuGraph) -> PlannerResult<()> {
    loop {
        let mut victim = None;
        for sym in graph.topo_symbols()? {
            if let Some(source) = trivial_source(graph.node(sym)?) {
                victim = Some((sym, source));
                break;
            }
        }
        let Some((sym, source)) = victim else {
            break;
        };
        trace!(node = %sym, %source, "folding trivial unary node into its source");
        graph.rename_references(sym, source);
        graph.prune_unreachable();
    }
    Ok(())
}

/// If the node is trivial, the source that can replace it.
fn trivial_source(pattern: &QsuPattern) -> Option<Symbol> {
    match pattern {
        QScriptUniform::Map {
            source,
            func: FreeMap::Leaf(Hole),
        } => Some(*source),
        QScriptUniform::Filter { source, predicate } if is_true(predicate) => Some(*source),
        QScriptUniform::Subset {
            source,
            from: UniformBranch::Hole,
            op: quasar_qscript::SubsetOp::Drop,
            count,
        } if is_zero_count(count) => Some(*source),
        _ => None,
    }
}

fn is_true(predicate: &FreeMap<Hole>) -> bool {
    matches!(
        predicate,
        FreeMap::Func(node) if matches!(&**node, MapFunc::Constant(Value::Bool(true)))
    )
}

/// Whether a count branch is the lowering of the constant `0`.
fn is_zero_count(count: &UniformBranch) -> bool {
    let UniformBranch::Node(node) = count else {
        return false;
    };
    let QScriptUniform::Map { source, func } = &**node else {
        return false;
    };
    matches!(source, UniformBranch::Node(inner) if matches!(&**inner, QScriptUniform::Unreferenced))
        && matches!(
            func,
            FreeMap::Func(c) if matches!(&**c, MapFunc::Constant(Value::Int(0)))
        )
}
