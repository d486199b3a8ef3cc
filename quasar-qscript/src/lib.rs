//! The QScript algebra definitions.
//!
//! This crate holds the data model of the compilation core and nothing
//! else: the scalar expression functor and its free carrier, the uniform
//! (internal) and educated (published) relational algebras, the leaf
//! families their expressions range over, and the construction DSL. The
//! graph substrate and the passes that rewrite plans live in `quasar-qsu`;
//! this crate is deliberately free of rewrite logic so that every consumer
//! of the algebra — passes, planners, tests — agrees on one vocabulary.
//!
//! Two concrete carriers realize each recursive algebra, in place of the
//! original's open-ended fixpoint machinery: boxed trees for final forms
//! and branch sub-plans, and symbol patterns for plans under rewrite (see
//! `quasar-qsu`'s graph).

pub mod dsl;
pub mod educated;
pub mod expr;
pub mod func;
pub mod ident;
pub mod op;
pub mod path;
pub mod rotation;
pub mod uniform;
pub mod value;

pub use educated::{EducatedBranch, EducatedPlan, QScriptEducated};
pub use expr::{FreeMap, MapFunc, TemporalPart, TypePattern};
pub use func::{
    Access, Hole, JoinFunc, JoinSide, MultiShiftRepair, MultiShiftTarget, ReduceIndex,
    ReduceRepair, ShiftRepair, ShiftTarget,
};
pub use ident::{NameGenerator, Symbol};
pub use op::{JoinType, Reducer, ShiftSpec, SortOrder, SubsetOp};
pub use path::TablePath;
pub use rotation::{IdStatus, Rotation, ShiftType};
pub use uniform::{QScriptUniform, UniformBranch};
pub use value::Value;
