//! Lowering of the incoming logical plan into the initial graph.
//!
//! This is the only place the core consumes [`LogicalPlan`]. Lowering
//! hash-conses: structurally equal patterns share one symbol, which is the
//! sharing invariant the graph view promises and what lets the two arms of
//! a `Combine` meet at a common source node.

use std::collections::HashMap;

use quasar_errors::{unsupported, PlannerError, PlannerResult};
use quasar_lp::LogicalPlan;
use quasar_qscript::dsl::constant;
use quasar_qscript::{
    FreeMap, IdStatus, NameGenerator, QScriptUniform, ShiftTarget, Symbol, UniformBranch,
};
use tracing::instrument;

use crate::graph::{QsuGraph, QsuPattern};

/// Translates a logical plan into the initial QSU graph.
#[instrument(skip_all)]
pub(crate) fn read_lp(
    plan: LogicalPlan,
    names: &mut NameGenerator,
) -> PlannerResult<QsuGraph> {
    let mut lowering = Lowering {
        names,
        vertices: HashMap::new(),
        memo: HashMap::new(),
    };
    let root = lowering.lower(plan)?;
    QsuGraph::from_parts(lowering.vertices, root)
}

struct Lowering<'a> {
    names: &'a mut NameGenerator,
    vertices: HashMap<Symbol, QsuPattern>,
    memo: HashMap<QsuPattern, Symbol>,
}

impl Lowering<'_> {
    /// Installs a pattern, reusing the node if an identical pattern is
    /// already present.
    fn install(&mut self, pattern: QsuPattern) -> Symbol {
        if let Some(&sym) = self.memo.get(&pattern) {
            return sym;
        }
        let sym = self.names.fresh();
        self.memo.insert(pattern.clone(), sym);
        self.vertices.insert(sym, pattern);
        sym
    }

    fn lower(&mut self, plan: LogicalPlan) -> PlannerResult<Symbol> {
        let pattern = match plan {
            LogicalPlan::Read(path) => {
                if path.is_root() {
                    return Err(PlannerError::NoFilePathFound);
                }
                QScriptUniform::ShiftedRead {
                    path,
                    id_status: IdStatus::ExcludeId,
                }
            }
            LogicalPlan::Constant(value) => {
                let source = self.install(QScriptUniform::Unreferenced);
                QScriptUniform::Map {
                    source,
                    func: constant(value),
                }
            }
            LogicalPlan::Project { source, func } => QScriptUniform::Map {
                source: self.lower(*source)?,
                func,
            },
            LogicalPlan::Shift {
                source,
                structure,
                id_status,
                rotation,
            } => QScriptUniform::LeftShift {
                source: self.lower(*source)?,
                structure,
                id_status,
                rotation,
                repair: FreeMap::Leaf(ShiftTarget::Right),
            },
            LogicalPlan::Filter { source, predicate } => QScriptUniform::Filter {
                source: self.lower(*source)?,
                predicate,
            },
            LogicalPlan::Sort { source, order } => QScriptUniform::Sort {
                source: self.lower(*source)?,
                buckets: vec![],
                order,
            },
            LogicalPlan::GroupBy {
                source,
                buckets,
                reducers,
                repair,
            } => QScriptUniform::Reduce {
                source: self.lower(*source)?,
                buckets,
                reducers,
                repair,
            },
            LogicalPlan::Union { left, right } => {
                let source = self.install(QScriptUniform::Unreferenced);
                QScriptUniform::Union {
                    source,
                    left: self.lower_branch(*left)?,
                    right: self.lower_branch(*right)?,
                }
            }
            LogicalPlan::Join {
                left,
                right,
                on,
                join_type,
                combine,
            } => {
                let source = self.install(QScriptUniform::Unreferenced);
                QScriptUniform::ThetaJoin {
                    source,
                    left: self.lower_branch(*left)?,
                    right: self.lower_branch(*right)?,
                    on,
                    join_type,
                    combine,
                }
            }
            LogicalPlan::Subset { source, op, count } => QScriptUniform::Subset {
                source: self.lower(*source)?,
                from: UniformBranch::Hole,
                op,
                count: self.lower_branch(*count)?,
            },
            LogicalPlan::Combine { left, right, func } => QScriptUniform::AutoJoin {
                left: self.lower(*left)?,
                right: self.lower(*right)?,
                combine: func,
            },
        };
        Ok(self.install(pattern))
    }

    /// Lowers a plan into a branch sub-plan (a free tree, no symbols).
    fn lower_branch(&mut self, plan: LogicalPlan) -> PlannerResult<UniformBranch> {
        let node = match plan {
            LogicalPlan::Read(path) => {
                if path.is_root() {
                    return Err(PlannerError::NoFilePathFound);
                }
                QScriptUniform::ShiftedRead {
                    path,
                    id_status: IdStatus::ExcludeId,
                }
            }
            LogicalPlan::Constant(value) => QScriptUniform::Map {
                source: UniformBranch::node(QScriptUniform::Unreferenced),
                func: constant(value),
            },
            LogicalPlan::Project { source, func } => QScriptUniform::Map {
                source: self.lower_branch(*source)?,
                func,
            },
            LogicalPlan::Shift {
                source,
                structure,
                id_status,
                rotation,
            } => QScriptUniform::LeftShift {
                source: self.lower_branch(*source)?,
                structure,
                id_status,
                rotation,
                repair: FreeMap::Leaf(ShiftTarget::Right),
            },
            LogicalPlan::Filter { source, predicate } => QScriptUniform::Filter {
                source: self.lower_branch(*source)?,
                predicate,
            },
            LogicalPlan::Sort { source, order } => QScriptUniform::Sort {
                source: self.lower_branch(*source)?,
                buckets: vec![],
                order,
            },
            LogicalPlan::GroupBy {
                source,
                buckets,
                reducers,
                repair,
            } => QScriptUniform::Reduce {
                source: self.lower_branch(*source)?,
                buckets,
                reducers,
                repair,
            },
            LogicalPlan::Union { left, right } => QScriptUniform::Union {
                source: UniformBranch::node(QScriptUniform::Unreferenced),
                left: self.lower_branch(*left)?,
                right: self.lower_branch(*right)?,
            },
            LogicalPlan::Join {
                left,
                right,
                on,
                join_type,
                combine,
            } => QScriptUniform::ThetaJoin {
                source: UniformBranch::node(QScriptUniform::Unreferenced),
                left: self.lower_branch(*left)?,
                right: self.lower_branch(*right)?,
                on,
                join_type,
                combine,
            },
            LogicalPlan::Subset { source, op, count } => QScriptUniform::Subset {
                source: self.lower_branch(*source)?,
                from: UniformBranch::Hole,
                op,
                count: self.lower_branch(*count)?,
            },
            LogicalPlan::Combine { .. } => {
                unsupported!("row-wise combination inside a branch sub-plan")
            }
        };
        Ok(UniformBranch::node(node))
    }
}
