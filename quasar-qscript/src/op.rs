//! Shared relational vocabulary: sort orders, join types, subset
//! operators, reducers, and shift specifications.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::expr::FreeMap;
use crate::func::Hole;
use crate::rotation::{IdStatus, Rotation};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
}

/// How a subset node interprets its count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubsetOp {
    Take,
    Drop,
    Sample,
}

impl fmt::Display for SubsetOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubsetOp::Take => write!(f, "Take"),
            SubsetOp::Drop => write!(f, "Drop"),
            SubsetOp::Sample => write!(f, "Sample"),
        }
    }
}

/// An aggregation applied to each group of a reduce.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reducer {
    Count(FreeMap<Hole>),
    Sum(FreeMap<Hole>),
    Min(FreeMap<Hole>),
    Max(FreeMap<Hole>),
    Avg(FreeMap<Hole>),
    /// Any one value of the argument within the group.
    Arbitrary(FreeMap<Hole>),
    First(FreeMap<Hole>),
    Last(FreeMap<Hole>),
    /// Re-nests the group's values into an array.
    UnshiftArray(FreeMap<Hole>),
    /// Re-nests the group's key/value pairs into a map.
    UnshiftMap(FreeMap<Hole>, FreeMap<Hole>),
}

impl Reducer {
    pub fn description(&self) -> &'static str {
        match self {
            Reducer::Count(_) => "Count",
            Reducer::Sum(_) => "Sum",
            Reducer::Min(_) => "Min",
            Reducer::Max(_) => "Max",
            Reducer::Avg(_) => "Avg",
            Reducer::Arbitrary(_) => "Arbitrary",
            Reducer::First(_) => "First",
            Reducer::Last(_) => "Last",
            Reducer::UnshiftArray(_) => "UnshiftArray",
            Reducer::UnshiftMap(..) => "UnshiftMap",
        }
    }
}

/// One member of a multi left shift: what to unnest, how, and whether to
/// keep identities.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShiftSpec {
    pub structure: FreeMap<Hole>,
    pub id_status: IdStatus,
    pub rotation: Rotation,
}
