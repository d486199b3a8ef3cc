use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether a read or shift yields the value, the identity, or both.
///
/// Under `IncludeId` the produced element is the two-element array
/// `[identity, value]`; under `IdOnly` it is the identity alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdStatus {
    IdOnly,
    IncludeId,
    ExcludeId,
}

/// The public granularity of a shift: which container is being unnested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShiftType {
    Array,
    Map,
}

/// The internal, four-way granularity of a shift.
///
/// `Shift*` keeps the unnested elements associated with their source row;
/// `Flatten*` additionally dissolves one level of nesting in the source
/// itself. Both granularities are kept: compatibility between adjacent
/// shifts is decided here, while the published [`LeftShift`] node only
/// carries the coarser [`ShiftType`].
///
/// The derived total order is what [`expand_shifts`] sorts by, so equal
/// rotations always end up adjacent in the expanded chain.
///
/// [`LeftShift`]: crate::educated::QScriptEducated::LeftShift
/// [`expand_shifts`]: ../quasar_qsu/rewrite/expand_shifts/index.html
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[cfg_attr(test, derive(test_strategy::Arbitrary))]
pub enum Rotation {
    FlattenArray,
    FlattenMap,
    ShiftArray,
    ShiftMap,
}

impl Rotation {
    /// The public coarsening of this rotation.
    pub fn shift_type(&self) -> ShiftType {
        match self {
            Rotation::FlattenArray | Rotation::ShiftArray => ShiftType::Array,
            Rotation::FlattenMap | Rotation::ShiftMap => ShiftType::Map,
        }
    }

    /// Whether two rotations traverse the same axis of the source value.
    ///
    /// Adjacent compatible shifts in an expanded chain are guarded with an
    /// identity equality condition to suppress the spurious cross-product
    /// of unnesting one axis twice.
    pub fn compatible_with(&self, other: Rotation) -> bool {
        self.shift_type() == other.shift_type()
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rotation::FlattenArray => "FlattenArray",
            Rotation::FlattenMap => "FlattenMap",
            Rotation::ShiftArray => "ShiftArray",
            Rotation::ShiftMap => "ShiftMap",
        };
        write!(f, "{}", s)
    }
}
