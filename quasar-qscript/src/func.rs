//! Leaf families for the scalar expression carrier.
//!
//! Each operator picks the leaf type that names what can flow into its
//! expressions; the type aliases at the bottom are the combinations the
//! operators actually use.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::expr::FreeMap;
use crate::ident::Symbol;

/// The leaf of a single-source function: the row flowing into the operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hole;

impl fmt::Display for Hole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_")
    }
}

/// A side of a join, in join conditions and combiners, and in the published
/// shift repair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinSide {
    Left,
    Right,
}

impl fmt::Display for JoinSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinSide::Left => write!(f, "left"),
            JoinSide::Right => write!(f, "right"),
        }
    }
}

/// A provenance-tagged projection of a row: either the row's value, or the
/// identity introduced by the shift node named by the symbol.
///
/// Identity accesses are an internal device; they are introduced by
/// [`expand_shifts`] guards, settled by the identity-reification passes,
/// and rejected by `graduate` should one survive.
///
/// [`expand_shifts`]: ../quasar_qsu/rewrite/expand_shifts/index.html
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Access {
    Value,
    Id(Symbol),
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Value => write!(f, "value"),
            Access::Id(sym) => write!(f, "id({})", sym),
        }
    }
}

/// The leaf of an (unexpanded) shift repair: the pre-shift row, viewed
/// through an [`Access`], or the freshly unnested element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShiftTarget {
    Left(Access),
    Right,
}

impl ShiftTarget {
    /// The plain pre-shift row.
    pub fn left_value() -> Self {
        ShiftTarget::Left(Access::Value)
    }
}

impl fmt::Display for ShiftTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShiftTarget::Left(access) => write!(f, "left[{}]", access),
            ShiftTarget::Right => write!(f, "right"),
        }
    }
}

/// The leaf of a multi-shift repair: the original row, or the element
/// produced by the `i`-th shift (in the order the caller listed them).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MultiShiftTarget {
    Source,
    Shifted(usize),
}

impl fmt::Display for MultiShiftTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MultiShiftTarget::Source => write!(f, "source"),
            MultiShiftTarget::Shifted(i) => write!(f, "shifted({})", i),
        }
    }
}

/// The leaf of a reduce repair: a bucket expression or a reducer output,
/// referenced by position.
///
/// Bucket references are made explicit (turned into reducer references) by
/// the bucket-reification pass; only reducer references survive to the
/// published algebra.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReduceIndex {
    Bucket(usize),
    Reducer(usize),
}

impl fmt::Display for ReduceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReduceIndex::Bucket(i) => write!(f, "bucket({})", i),
            ReduceIndex::Reducer(i) => write!(f, "reducer({})", i),
        }
    }
}

/// A join condition or combiner.
pub type JoinFunc = FreeMap<JoinSide>;

/// The repair of an unexpanded (uniform) left shift.
pub type ShiftRepair = FreeMap<ShiftTarget>;

/// The repair of a multi left shift.
pub type MultiShiftRepair = FreeMap<MultiShiftTarget>;

/// The repair of a reduce.
pub type ReduceRepair = FreeMap<ReduceIndex>;
