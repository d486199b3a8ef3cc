//! The published QScript algebra, accepted by the backend planners.
//!
//! This is the restriction of the uniform algebra that survives
//! graduation: no multi shifts, no autojoins, no identity accesses in
//! repairs (shift repairs are plain [`JoinFunc`]s), and reduce repairs
//! reference reducer outputs only. Shifts carry the public [`ShiftType`]
//! rather than the internal rotation.

use serde::{Deserialize, Serialize};
use vec1::Vec1;

use crate::expr::FreeMap;
use crate::func::{Hole, JoinFunc, ReduceRepair};
use crate::op::{JoinType, Reducer, SortOrder, SubsetOp};
use crate::path::TablePath;
use crate::rotation::{IdStatus, ShiftType};

/// One layer of a published plan.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QScriptEducated<T> {
    Map {
        source: T,
        func: FreeMap<Hole>,
    },
    LeftShift {
        source: T,
        structure: FreeMap<Hole>,
        id_status: IdStatus,
        shift_type: ShiftType,
        repair: JoinFunc,
    },
    Reduce {
        source: T,
        buckets: Vec<FreeMap<Hole>>,
        reducers: Vec<Reducer>,
        /// Invariant: every leaf is a `ReduceIndex::Reducer`.
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
        left: EducatedBranch,
        right: EducatedBranch,
    },
    Subset {
        source: T,
        from: EducatedBranch,
        op: SubsetOp,
        count: EducatedBranch,
    },
    ThetaJoin {
        source: T,
        left: EducatedBranch,
        right: EducatedBranch,
        on: JoinFunc,
        join_type: JoinType,
        combine: JoinFunc,
    },
    EquiJoin {
        source: T,
        left: EducatedBranch,
        right: EducatedBranch,
        keys: Vec<(FreeMap<Hole>, FreeMap<Hole>)>,
        join_type: JoinType,
        combine: JoinFunc,
    },
    Read {
        path: TablePath,
    },
    ShiftedRead {
        path: TablePath,
        id_status: IdStatus,
    },
    Unreferenced,
}

impl<T> QScriptEducated<T> {
    /// A short name for the node kind.
    pub fn kind(&self) -> &'static str {
        use QScriptEducated::*;
        match self {
            Map { .. } => "Map",
            LeftShift { .. } => "LeftShift",
            Reduce { .. } => "Reduce",
            Sort { .. } => "Sort",
            Filter { .. } => "Filter",
            Union { .. } => "Union",
            Subset { .. } => "Subset",
            ThetaJoin { .. } => "ThetaJoin",
            EquiJoin { .. } => "EquiJoin",
            Read { .. } => "Read",
            ShiftedRead { .. } => "ShiftedRead",
            Unreferenced => "Unreferenced",
        }
    }

    /// Reference to the source position, if the node has one.
    pub fn source(&self) -> Option<&T> {
        use QScriptEducated::*;
        match self {
            Map { source, .. }
            | LeftShift { source, .. }
            | Reduce { source, .. }
            | Sort { source, .. }
            | Filter { source, .. }
            | Union { source, .. }
            | Subset { source, .. }
            | ThetaJoin { source, .. }
            | EquiJoin { source, .. } => Some(source),
            Read { .. } | ShiftedRead { .. } | Unreferenced => None,
        }
    }

    fn branches(&self) -> Vec<&EducatedBranch> {
        use QScriptEducated::*;
        match self {
            Union { left, right, .. } | ThetaJoin { left, right, .. }
            | EquiJoin { left, right, .. } => vec![left, right],
            Subset { from, count, .. } => vec![from, count],
            _ => vec![],
        }
    }
}

/// A complete published plan: the fixpoint carrier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EducatedPlan(pub Box<QScriptEducated<EducatedPlan>>);

impl EducatedPlan {
    pub fn new(node: QScriptEducated<EducatedPlan>) -> Self {
        EducatedPlan(Box::new(node))
    }

    pub fn node(&self) -> &QScriptEducated<EducatedPlan> {
        &self.0
    }

    /// Counts the nodes of the given kind anywhere in the plan, branches
    /// included.
    pub fn count_kind(&self, kind: &str) -> usize {
        let mut count = usize::from(self.node().kind() == kind);
        if let Some(source) = self.node().source() {
            count += source.count_kind(kind);
        }
        for branch in self.node().branches() {
            count += branch.count_kind(kind);
        }
        count
    }
}

/// A published sub-plan rooted at a `Hole`: the free carrier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EducatedBranch {
    Hole,
    Node(Box<QScriptEducated<EducatedBranch>>),
}

impl EducatedBranch {
    pub fn node(pattern: QScriptEducated<EducatedBranch>) -> Self {
        EducatedBranch::Node(Box::new(pattern))
    }

    fn count_kind(&self, kind: &str) -> usize {
        match self {
            EducatedBranch::Hole => 0,
            EducatedBranch::Node(node) => {
                let mut count = usize::from(node.kind() == kind);
                if let Some(source) = node.source() {
                    count += source.count_kind(kind);
                }
                for branch in node.branches() {
                    count += branch.count_kind(kind);
                }
                count
            }
        }
    }
}
