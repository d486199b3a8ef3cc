//! The logical plan handed to the compilation core.
//!
//! This tree is produced by the query front end; the core consumes it in
//! exactly one place (the `read_lp` pass) and never constructs it. Scalar
//! positions reuse the expression algebra from `quasar-qscript`, with
//! [`Hole`] standing for the current row of the node's source.

use serde::{Deserialize, Serialize};
use vec1::Vec1;

use quasar_qscript::{
    FreeMap, Hole, IdStatus, JoinFunc, JoinType, ReduceRepair, Reducer, Rotation, SortOrder,
    SubsetOp, TablePath, Value,
};

/// A logical query plan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalPlan {
    /// All rows of the collection at `path`.
    Read(TablePath),
    /// A single constant row.
    Constant(Value),
    /// Row-wise application of a scalar function.
    Project {
        source: Box<LogicalPlan>,
        func: FreeMap<Hole>,
    },
    /// Unnesting of an array- or map-valued expression of each row.
    Shift {
        source: Box<LogicalPlan>,
        structure: FreeMap<Hole>,
        id_status: IdStatus,
        rotation: Rotation,
    },
    Filter {
        source: Box<LogicalPlan>,
        predicate: FreeMap<Hole>,
    },
    Sort {
        source: Box<LogicalPlan>,
        order: Vec1<(FreeMap<Hole>, SortOrder)>,
    },
    /// Grouped aggregation.
    GroupBy {
        source: Box<LogicalPlan>,
        buckets: Vec<FreeMap<Hole>>,
        reducers: Vec<Reducer>,
        repair: ReduceRepair,
    },
    Union {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
    },
    Join {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        on: JoinFunc,
        join_type: JoinType,
        combine: JoinFunc,
    },
    Subset {
        source: Box<LogicalPlan>,
        op: SubsetOp,
        count: Box<LogicalPlan>,
    },
    /// Row-wise combination of two plans derived from a common origin.
    ///
    /// The front end emits this when one scalar expression draws on two
    /// sub-plans of the same dataset (for example, two different
    /// unnestings of one document). The core is responsible for planning
    /// the implied join.
    Combine {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        func: JoinFunc,
    },
}

impl LogicalPlan {
    pub fn read(path: impl Into<TablePath>) -> Self {
        LogicalPlan::Read(path.into())
    }

    pub fn project(source: LogicalPlan, func: FreeMap<Hole>) -> Self {
        LogicalPlan::Project {
            source: Box::new(source),
            func,
        }
    }

    pub fn shift(
        source: LogicalPlan,
        structure: FreeMap<Hole>,
        id_status: IdStatus,
        rotation: Rotation,
    ) -> Self {
        LogicalPlan::Shift {
            source: Box::new(source),
            structure,
            id_status,
            rotation,
        }
    }

    pub fn filter(source: LogicalPlan, predicate: FreeMap<Hole>) -> Self {
        LogicalPlan::Filter {
            source: Box::new(source),
            predicate,
        }
    }

    pub fn combine(left: LogicalPlan, right: LogicalPlan, func: JoinFunc) -> Self {
        LogicalPlan::Combine {
            left: Box::new(left),
            right: Box::new(right),
            func,
        }
    }
}
