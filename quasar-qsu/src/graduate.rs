//! Graduation: the projection from the uniform algebra onto the published
//! [`QScriptEducated`] algebra.
//!
//! Graduation does no rewriting of its own. Anything it cannot express —
//! multi shifts, autojoins, identity accesses, bucket references, the
//! datasource root — was supposed to be eliminated by an earlier pass, so
//! encountering one is reported as a planner bug
//! ([`PlannerError::UnexpectedConstruct`]), never worked around.
//!
//! The one piece of recognition graduation does perform is lowering a
//! theta join whose condition is a conjunction of single-sided equalities
//! to the [`EquiJoin`] operator, which several backends plan natively.
//!
//! [`EquiJoin`]: QScriptEducated::EquiJoin

use quasar_errors::{PlannerError, PlannerResult};
use quasar_qscript::dsl::{hole, left_side, right_side};
use quasar_qscript::{
    Access, EducatedBranch, EducatedPlan, FreeMap, Hole, JoinFunc, JoinSide, MapFunc,
    NameGenerator, QScriptEducated, QScriptUniform, ReduceIndex, Reducer, ShiftTarget, Symbol,
    UniformBranch,
};
use tracing::instrument;

use crate::graph::QsuGraph;
use crate::provenance::ResearchedQsu;

/// Projects a fully normalized graph onto the published algebra.
#[instrument(skip_all)]
pub fn graduate(rqsu: ResearchedQsu) -> PlannerResult<EducatedPlan> {
    let graph = rqsu.graph;
    graduate_symbol(&graph, graph.root())
}

fn graduate_symbol(graph: &QsuGraph, sym: Symbol) -> PlannerResult<EducatedPlan> {
    let pattern = graph.node(sym)?.clone();
    let node = graduate_pattern(pattern, &sym.to_string(), &mut |source| {
        graduate_symbol(graph, source)
    })?;
    Ok(EducatedPlan::new(node))
}

fn graduate_branch(branch: UniformBranch, at: &str) -> PlannerResult<EducatedBranch> {
    match branch {
        UniformBranch::Hole => Ok(EducatedBranch::Hole),
        UniformBranch::Node(node) => Ok(EducatedBranch::node(graduate_pattern(
            *node,
            at,
            &mut |child| graduate_branch(child, at),
        )?)),
    }
}

/// Lowers one uniform layer, converting child positions with `f`. `at`
/// names the node in errors.
fn graduate_pattern<S, T, F>(
    pattern: QScriptUniform<S>,
    at: &str,
    f: &mut F,
) -> PlannerResult<QScriptEducated<T>>
where
    F: FnMut(S) -> PlannerResult<T>,
{
    use QScriptUniform::*;
    Ok(match pattern {
        Map { source, func } => QScriptEducated::Map {
            source: f(source)?,
            func,
        },
        LeftShift {
            source,
            structure,
            id_status,
            rotation,
            repair,
        } => QScriptEducated::LeftShift {
            source: f(source)?,
            structure,
            id_status,
            shift_type: rotation.shift_type(),
            repair: repair.try_flat_map(|target| match target {
                ShiftTarget::Left(Access::Value) => Ok(left_side()),
                ShiftTarget::Right => Ok(right_side()),
                ShiftTarget::Left(Access::Id(id)) => Err(unexpected(
                    format!("identity access to {}", id),
                    at,
                )),
            })?,
        },
        MultiLeftShift { .. } => return Err(unexpected("multi left shift".to_owned(), at)),
        AutoJoin { .. } => return Err(unexpected("autojoin".to_owned(), at)),
        Root => return Err(unexpected("datasource root".to_owned(), at)),
        Distinct { source } => QScriptEducated::Reduce {
            source: f(source)?,
            buckets: vec![hole()],
            reducers: vec![Reducer::Arbitrary(hole())],
            repair: FreeMap::Leaf(ReduceIndex::Reducer(0)),
        },
        Reduce {
            source,
            buckets,
            reducers,
            repair,
        } => {
            if repair.any_leaf(|idx| matches!(idx, ReduceIndex::Bucket(_))) {
                return Err(unexpected("bucket reference in reduce repair".to_owned(), at));
            }
            QScriptEducated::Reduce {
                source: f(source)?,
                buckets,
                reducers,
                repair,
            }
        }
        Sort {
            source,
            buckets,
            order,
        } => QScriptEducated::Sort {
            source: f(source)?,
            buckets,
            order,
        },
        Filter { source, predicate } => QScriptEducated::Filter {
            source: f(source)?,
            predicate,
        },
        Union {
            source,
            left,
            right,
        } => QScriptEducated::Union {
            source: f(source)?,
            left: graduate_branch(left, at)?,
            right: graduate_branch(right, at)?,
        },
        Subset {
            source,
            from,
            op,
            count,
        } => QScriptEducated::Subset {
            source: f(source)?,
            from: graduate_branch(from, at)?,
            op,
            count: graduate_branch(count, at)?,
        },
        ThetaJoin {
            source,
            left,
            right,
            on,
            join_type,
            combine,
        } => {
            let source = f(source)?;
            let left = graduate_branch(left, at)?;
            let right = graduate_branch(right, at)?;
            match equi_keys(&on) {
                Some(keys) => QScriptEducated::EquiJoin {
                    source,
                    left,
                    right,
                    keys,
                    join_type,
                    combine,
                },
                None => QScriptEducated::ThetaJoin {
                    source,
                    left,
                    right,
                    on,
                    join_type,
                    combine,
                },
            }
        }
        EquiJoin {
            source,
            left,
            right,
            keys,
            join_type,
            combine,
        } => QScriptEducated::EquiJoin {
            source: f(source)?,
            left: graduate_branch(left, at)?,
            right: graduate_branch(right, at)?,
            keys,
            join_type,
            combine,
        },
        Read { path } => QScriptEducated::Read { path },
        ShiftedRead { path, id_status } => QScriptEducated::ShiftedRead { path, id_status },
        Unreferenced => QScriptEducated::Unreferenced,
    })
}

/// Extracts equi-join keys from a join condition that is a conjunction of
/// `Eq(left-only, right-only)` comparisons. Returns `None` for genuinely
/// theta conditions.
fn equi_keys(on: &JoinFunc) -> Option<Vec<(FreeMap<Hole>, FreeMap<Hole>)>> {
    match on {
        FreeMap::Leaf(_) => None,
        FreeMap::Func(node) => match &**node {
            MapFunc::And(l, r) => {
                let mut keys = equi_keys(l)?;
                keys.extend(equi_keys(r)?);
                Some(keys)
            }
            MapFunc::Eq(a, b) => {
                let a_left = is_single_sided(a, JoinSide::Left);
                let a_right = is_single_sided(a, JoinSide::Right);
                let b_left = is_single_sided(b, JoinSide::Left);
                let b_right = is_single_sided(b, JoinSide::Right);
                if a_left && b_right {
                    Some(vec![(strip_sides(a), strip_sides(b))])
                } else if a_right && b_left {
                    Some(vec![(strip_sides(b), strip_sides(a))])
                } else {
                    None
                }
            }
            _ => None,
        },
    }
}

fn is_single_sided(expr: &JoinFunc, side: JoinSide) -> bool {
    let mut has_leaf = false;
    let mut only_side = true;
    expr.each_leaf(|leaf| {
        has_leaf = true;
        if *leaf != side {
            only_side = false;
        }
    });
    has_leaf && only_side
}

fn strip_sides(expr: &JoinFunc) -> FreeMap<Hole> {
    expr.clone().map_leaves(|_| Hole)
}

fn unexpected(construct: String, at: &str) -> PlannerError {
    PlannerError::UnexpectedConstruct {
        construct,
        symbol: at.to_owned(),
    }
}

/// Installs a published plan into a fresh graph, minting symbols bottom-up.
///
/// This is the coproduct injection at graph scope: it is how a graduated
/// plan can be fed back through the pipeline, and what makes graduation
/// idempotent on its range.
pub fn load_educated(
    plan: EducatedPlan,
    names: &mut NameGenerator,
) -> PlannerResult<QsuGraph> {
    let mut vertices = std::collections::HashMap::new();
    let root = install(plan, &mut vertices, names);
    QsuGraph::from_parts(vertices, root)
}

fn install(
    plan: EducatedPlan,
    vertices: &mut std::collections::HashMap<Symbol, QScriptUniform<Symbol>>,
    names: &mut NameGenerator,
) -> Symbol {
    let pattern = plan
        .0
        .into_uniform(|child| install(child, vertices, names));
    let sym = names.fresh();
    vertices.insert(sym, pattern);
    sym
}
