//! The uniform QScript algebra: the operator set the pipeline rewrites.
//!
//! [`QScriptUniform`] is the one-layer functor; the child position type `T`
//! is `Symbol` when a node lives in a graph, and [`UniformBranch`] when it
//! lives inside a branch sub-plan. The uniform algebra is a superset of the
//! published one: `MultiLeftShift`, `AutoJoin`, `Distinct`, and `Root` only
//! exist here and must be eliminated before graduation.

use std::fmt;

use serde::{Deserialize, Serialize};
use vec1::Vec1;

use crate::educated::{EducatedBranch, QScriptEducated};
use crate::expr::FreeMap;
use crate::func::{Hole, JoinFunc, JoinSide, MultiShiftRepair, ReduceRepair, ShiftRepair, ShiftTarget};
use crate::op::{JoinType, Reducer, ShiftSpec, SortOrder, SubsetOp};
use crate::path::TablePath;
use crate::rotation::{IdStatus, Rotation, ShiftType};

/// One layer of a uniform QScript plan.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QScriptUniform<T> {
    /// Applies a scalar function to each row of the source.
    Map {
        source: T,
        func: FreeMap<Hole>,
    },
    /// Unnests the value produced by `structure` from each row of the
    /// source, combining the pre-shift row and each unnested element with
    /// `repair`.
    LeftShift {
        source: T,
        structure: FreeMap<Hole>,
        id_status: IdStatus,
        rotation: Rotation,
        repair: ShiftRepair,
    },
    /// An n-ary shift over one source; lowered to a chain of single
    /// shifts by the shift-expansion pass.
    MultiLeftShift {
        source: T,
        shifts: Vec<ShiftSpec>,
        repair: MultiShiftRepair,
    },
    /// Groups rows by the bucket expressions, applies the reducers to each
    /// group, and combines the outputs with `repair`.
    Reduce {
        source: T,
        buckets: Vec<FreeMap<Hole>>,
        reducers: Vec<Reducer>,
        repair: ReduceRepair,
    },
    Sort {
        source: T,
        buckets: Vec<FreeMap<Hole>>,
        order: Vec1<(FreeMap<Hole>, SortOrder)>,
    },
    Filter {
        source: T,
        predicate: FreeMap<Hole>,
    },
    Union {
        source: T,
        left: UniformBranch,
        right: UniformBranch,
    },
    Subset {
        source: T,
        from: UniformBranch,
        op: SubsetOp,
        count: UniformBranch,
    },
    ThetaJoin {
        source: T,
        left: UniformBranch,
        right: UniformBranch,
        on: JoinFunc,
        join_type: JoinType,
        combine: JoinFunc,
    },
    EquiJoin {
        source: T,
        left: UniformBranch,
        right: UniformBranch,
        keys: Vec<(FreeMap<Hole>, FreeMap<Hole>)>,
        join_type: JoinType,
        combine: JoinFunc,
    },
    /// The row-wise combination of two plans derived from a common origin.
    /// Eliminated by the autojoin passes.
    AutoJoin {
        left: T,
        right: T,
        combine: JoinFunc,
    },
    /// Rows of the source with duplicates removed.
    Distinct {
        source: T,
    },
    Read {
        path: TablePath,
    },
    ShiftedRead {
        path: TablePath,
        id_status: IdStatus,
    },
    /// The datasource root; lowering resolves reads against it, so one
    /// surviving to graduation is a planner bug.
    Root,
    /// Sentinel empty source for nodes that do not consume rows.
    Unreferenced,
}

impl<T> QScriptUniform<T> {
    /// References to the node's graph children (its sources), left to
    /// right. Branch sub-plans are not children: they are part of the node.
    pub fn sources(&self) -> Vec<&T> {
        use QScriptUniform::*;
        match self {
            Map { source, .. }
            | LeftShift { source, .. }
            | MultiLeftShift { source, .. }
            | Reduce { source, .. }
            | Sort { source, .. }
            | Filter { source, .. }
            | Union { source, .. }
            | Subset { source, .. }
            | ThetaJoin { source, .. }
            | EquiJoin { source, .. }
            | Distinct { source } => vec![source],
            AutoJoin { left, right, .. } => vec![left, right],
            Read { .. } | ShiftedRead { .. } | Root | Unreferenced => vec![],
        }
    }

    /// Rewrites the node's child positions with `f`, preserving everything
    /// else.
    pub fn map_sources<U, F>(self, mut f: F) -> QScriptUniform<U>
    where
        F: FnMut(T) -> U,
    {
        use QScriptUniform::*;
        match self {
            Map { source, func } => Map {
                source: f(source),
                func,
            },
            LeftShift {
                source,
                structure,
                id_status,
                rotation,
                repair,
            } => LeftShift {
                source: f(source),
                structure,
                id_status,
                rotation,
                repair,
            },
            MultiLeftShift {
                source,
                shifts,
                repair,
            } => MultiLeftShift {
                source: f(source),
                shifts,
                repair,
            },
            Reduce {
                source,
                buckets,
                reducers,
                repair,
            } => Reduce {
                source: f(source),
                buckets,
                reducers,
                repair,
            },
            Sort {
                source,
                buckets,
                order,
            } => Sort {
                source: f(source),
                buckets,
                order,
            },
            Filter { source, predicate } => Filter {
                source: f(source),
                predicate,
            },
            Union {
                source,
                left,
                right,
            } => Union {
                source: f(source),
                left,
                right,
            },
            Subset {
                source,
                from,
                op,
                count,
            } => Subset {
                source: f(source),
                from,
                op,
                count,
            },
            ThetaJoin {
                source,
                left,
                right,
                on,
                join_type,
                combine,
            } => ThetaJoin {
                source: f(source),
                left,
                right,
                on,
                join_type,
                combine,
            },
            EquiJoin {
                source,
                left,
                right,
                keys,
                join_type,
                combine,
            } => EquiJoin {
                source: f(source),
                left,
                right,
                keys,
                join_type,
                combine,
            },
            AutoJoin {
                left,
                right,
                combine,
            } => AutoJoin {
                left: f(left),
                right: f(right),
                combine,
            },
            Distinct { source } => Distinct { source: f(source) },
            Read { path } => Read { path },
            ShiftedRead { path, id_status } => ShiftedRead { path, id_status },
            Root => Root,
            Unreferenced => Unreferenced,
        }
    }

    /// A short description of the node kind, for errors and rendering.
    pub fn description(&self) -> String {
        use QScriptUniform::*;
        match self {
            Map { .. } => "Map".to_owned(),
            LeftShift {
                rotation,
                id_status,
                ..
            } => format!("LeftShift({}, {:?})", rotation, id_status),
            MultiLeftShift { shifts, .. } => format!("MultiLeftShift({})", shifts.len()),
            Reduce {
                buckets, reducers, ..
            } => format!("Reduce({}, {})", buckets.len(), reducers.len()),
            Sort { order, .. } => format!("Sort({})", order.len()),
            Filter { .. } => "Filter".to_owned(),
            Union { .. } => "Union".to_owned(),
            Subset { op, .. } => format!("Subset({})", op),
            ThetaJoin { join_type, .. } => format!("ThetaJoin({:?})", join_type),
            EquiJoin { join_type, .. } => format!("EquiJoin({:?})", join_type),
            AutoJoin { .. } => "AutoJoin".to_owned(),
            Distinct { .. } => "Distinct".to_owned(),
            Read { path } => format!("Read({})", path),
            ShiftedRead { path, id_status } => {
                format!("ShiftedRead({}, {:?})", path, id_status)
            }
            Root => "Root".to_owned(),
            Unreferenced => "Unreferenced".to_owned(),
        }
    }
}

impl<T> fmt::Display for QScriptUniform<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// A sub-plan rooted at a `Hole`: the free carrier of the uniform algebra.
///
/// Branches of unions, subsets, and joins are expressed this way; their
/// hole stands for the rows of the enclosing node's source.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UniformBranch {
    Hole,
    Node(Box<QScriptUniform<UniformBranch>>),
}

impl UniformBranch {
    pub fn node(pattern: QScriptUniform<UniformBranch>) -> Self {
        UniformBranch::Node(Box::new(pattern))
    }
}

impl From<EducatedBranch> for UniformBranch {
    fn from(branch: EducatedBranch) -> Self {
        match branch {
            EducatedBranch::Hole => UniformBranch::Hole,
            EducatedBranch::Node(node) => {
                UniformBranch::node(node.into_uniform(UniformBranch::from))
            }
        }
    }
}

impl<S> QScriptEducated<S> {
    /// Embeds one published-algebra layer back into the uniform algebra,
    /// converting child positions with `f`.
    ///
    /// This is the coproduct injection: graduation followed by this embed
    /// loses nothing, which is what makes graduation idempotent on its
    /// range.
    pub fn into_uniform<T, F>(self, mut f: F) -> QScriptUniform<T>
    where
        F: FnMut(S) -> T,
    {
        match self {
            QScriptEducated::Map { source, func } => QScriptUniform::Map {
                source: f(source),
                func,
            },
            QScriptEducated::LeftShift {
                source,
                structure,
                id_status,
                shift_type,
                repair,
            } => QScriptUniform::LeftShift {
                source: f(source),
                structure,
                id_status,
                rotation: match shift_type {
                    ShiftType::Array => Rotation::ShiftArray,
                    ShiftType::Map => Rotation::ShiftMap,
                },
                repair: repair.map_leaves(|side| match side {
                    JoinSide::Left => ShiftTarget::left_value(),
                    JoinSide::Right => ShiftTarget::Right,
                }),
            },
            QScriptEducated::Reduce {
                source,
                buckets,
                reducers,
                repair,
            } => QScriptUniform::Reduce {
                source: f(source),
                buckets,
                reducers,
                repair,
            },
            QScriptEducated::Sort {
                source,
                buckets,
                order,
            } => QScriptUniform::Sort {
                source: f(source),
                buckets,
                order,
            },
            QScriptEducated::Filter { source, predicate } => QScriptUniform::Filter {
                source: f(source),
                predicate,
            },
            QScriptEducated::Union {
                source,
                left,
                right,
            } => QScriptUniform::Union {
                source: f(source),
                left: left.into(),
                right: right.into(),
            },
            QScriptEducated::Subset {
                source,
                from,
                op,
                count,
            } => QScriptUniform::Subset {
                source: f(source),
                from: from.into(),
                op,
                count: count.into(),
            },
            QScriptEducated::ThetaJoin {
                source,
                left,
                right,
                on,
                join_type,
                combine,
            } => QScriptUniform::ThetaJoin {
                source: f(source),
                left: left.into(),
                right: right.into(),
                on,
                join_type,
                combine,
            },
            QScriptEducated::EquiJoin {
                source,
                left,
                right,
                keys,
                join_type,
                combine,
            } => QScriptUniform::EquiJoin {
                source: f(source),
                left: left.into(),
                right: right.into(),
                keys,
                join_type,
                combine,
            },
            QScriptEducated::Read { path } => QScriptUniform::Read { path },
            QScriptEducated::ShiftedRead { path, id_status } => {
                QScriptUniform::ShiftedRead { path, id_status }
            }
            QScriptEducated::Unreferenced => QScriptUniform::Unreferenced,
        }
    }
}
