//! The scalar expression algebra.
//!
//! [`MapFunc`] is the one-layer functor: every child position is the type
//! parameter `T`. [`FreeMap`] ties the knot with a leaf type `A`, so a
//! "FreeMap over `A`" is either a leaf `A` or one rolled [`MapFunc`] layer
//! whose children are again FreeMaps over `A`. Operator nodes pick the leaf
//! type that names what flows into them: [`Hole`] for single-source
//! functions, [`ShiftTarget`] for shift repairs, and so on.
//!
//! [`Hole`]: crate::func::Hole
//! [`ShiftTarget`]: crate::func::ShiftTarget

use std::fmt;

use itertools::Itertools;
use quasar_errors::PlannerResult;
use serde::{Deserialize, Serialize};

use crate::ident::Symbol;
use crate::value::Value;

/// The temporal components extractable by [`MapFunc::Extract`] and
/// truncatable by [`MapFunc::TemporalTrunc`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemporalPart {
    Century,
    Day,
    Decade,
    DayOfWeek,
    DayOfYear,
    Epoch,
    Hour,
    IsoDayOfWeek,
    IsoYear,
    Microsecond,
    Millennium,
    Millisecond,
    Minute,
    Month,
    Quarter,
    Second,
    Timezone,
    TimezoneHour,
    TimezoneMinute,
    Week,
    Year,
}

/// The coarse runtime types checkable by [`MapFunc::Guard`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypePattern {
    /// Matches any value.
    Top,
    Null,
    Bool,
    Numeric,
    Str,
    Array,
    Map,
}

/// One layer of a scalar expression; `T` is the type of each child
/// position.
///
/// The *Core* constructors are primitives of the backend expression
/// algebras; the *Derived* constructors (`Abs` through `RoundScale`) have
/// standard expansions in terms of the core and are kept as first-class
/// nodes so backends with native support can use it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MapFunc<T> {
    // nullary
    Constant(Value),
    Undefined,
    Now,
    /// The name of the join side a row came through; only meaningful inside
    /// join combiners.
    JoinSideName(Symbol),

    // arithmetic
    Add(T, T),
    Subtract(T, T),
    Multiply(T, T),
    Divide(T, T),
    Modulo(T, T),
    Power(T, T),
    Negate(T),

    // comparison
    Eq(T, T),
    Neq(T, T),
    Lt(T, T),
    Lte(T, T),
    Gt(T, T),
    Gte(T, T),

    // boolean
    And(T, T),
    Or(T, T),
    Not(T),

    // structural
    MakeArray(T),
    MakeMap(T, T),
    ConcatArrays(T, T),
    ConcatMaps(T, T),
    ProjectKey(T, T),
    ProjectIndex(T, T),
    DeleteKey(T, T),

    // conversion
    Bool(T),
    Integer(T),
    Decimal(T),
    Null(T),
    ToString(T),
    ToId(T),
    ToTimestamp(T),
    TypeOf(T),
    Meta(T),

    // temporal
    Extract(TemporalPart, T),
    Date(T),
    Time(T),
    Timestamp(T),
    Interval(T),
    StartOfDay(T),
    TimeOfDay(T),
    TemporalTrunc(TemporalPart, T),

    // string
    Length(T),
    Lower(T),
    Upper(T),
    Substring(T, T, T),
    Split(T, T),
    Search(T, T, T),

    // collection
    Range(T, T),
    Within(T, T),

    // control
    IfUndefined(T, T),
    Cond(T, T, T),
    Between(T, T, T),
    /// `Guard(value, type, continuation, fallback)`: evaluates to the
    /// continuation when `value` matches `type`, to the fallback otherwise.
    Guard(T, TypePattern, T, T),

    // derived
    Abs(T),
    Ceil(T),
    Floor(T),
    Trunc(T),
    Round(T),
    FloorScale(T, T),
    CeilScale(T, T),
    RoundScale(T, T),
}

impl<T> MapFunc<T> {
    /// Applies `f` to every child position, preserving the shape.
    pub fn map<U, F>(self, mut f: F) -> MapFunc<U>
    where
        F: FnMut(T) -> U,
    {
        use MapFunc::*;
        match self {
            Constant(v) => Constant(v),
            Undefined => Undefined,
            Now => Now,
            JoinSideName(s) => JoinSideName(s),
            Add(a, b) => Add(f(a), f(b)),
            Subtract(a, b) => Subtract(f(a), f(b)),
            Multiply(a, b) => Multiply(f(a), f(b)),
            Divide(a, b) => Divide(f(a), f(b)),
            Modulo(a, b) => Modulo(f(a), f(b)),
            Power(a, b) => Power(f(a), f(b)),
            Negate(a) => Negate(f(a)),
            Eq(a, b) => Eq(f(a), f(b)),
            Neq(a, b) => Neq(f(a), f(b)),
            Lt(a, b) => Lt(f(a), f(b)),
            Lte(a, b) => Lte(f(a), f(b)),
            Gt(a, b) => Gt(f(a), f(b)),
            Gte(a, b) => Gte(f(a), f(b)),
            And(a, b) => And(f(a), f(b)),
            Or(a, b) => Or(f(a), f(b)),
            Not(a) => Not(f(a)),
            MakeArray(a) => MakeArray(f(a)),
            MakeMap(k, v) => MakeMap(f(k), f(v)),
            ConcatArrays(a, b) => ConcatArrays(f(a), f(b)),
            ConcatMaps(a, b) => ConcatMaps(f(a), f(b)),
            ProjectKey(m, k) => ProjectKey(f(m), f(k)),
            ProjectIndex(a, i) => ProjectIndex(f(a), f(i)),
            DeleteKey(m, k) => DeleteKey(f(m), f(k)),
            Bool(a) => Bool(f(a)),
            Integer(a) => Integer(f(a)),
            Decimal(a) => Decimal(f(a)),
            Null(a) => Null(f(a)),
            ToString(a) => ToString(f(a)),
            ToId(a) => ToId(f(a)),
            ToTimestamp(a) => ToTimestamp(f(a)),
            TypeOf(a) => TypeOf(f(a)),
            Meta(a) => Meta(f(a)),
            Extract(p, a) => Extract(p, f(a)),
            Date(a) => Date(f(a)),
            Time(a) => Time(f(a)),
            Timestamp(a) => Timestamp(f(a)),
            Interval(a) => Interval(f(a)),
            StartOfDay(a) => StartOfDay(f(a)),
            TimeOfDay(a) => TimeOfDay(f(a)),
            TemporalTrunc(p, a) => TemporalTrunc(p, f(a)),
            Length(a) => Length(f(a)),
            Lower(a) => Lower(f(a)),
            Upper(a) => Upper(f(a)),
            Substring(s, from, count) => Substring(f(s), f(from), f(count)),
            Split(s, sep) => Split(f(s), f(sep)),
            Search(s, pat, ci) => Search(f(s), f(pat), f(ci)),
            Range(a, b) => Range(f(a), f(b)),
            Within(a, b) => Within(f(a), f(b)),
            IfUndefined(a, b) => IfUndefined(f(a), f(b)),
            Cond(c, t, e) => Cond(f(c), f(t), f(e)),
            Between(v, lo, hi) => Between(f(v), f(lo), f(hi)),
            Guard(v, ty, cont, fallback) => Guard(f(v), ty, f(cont), f(fallback)),
            Abs(a) => Abs(f(a)),
            Ceil(a) => Ceil(f(a)),
            Floor(a) => Floor(f(a)),
            Trunc(a) => Trunc(f(a)),
            Round(a) => Round(f(a)),
            FloorScale(a, s) => FloorScale(f(a), f(s)),
            CeilScale(a, s) => CeilScale(f(a), f(s)),
            RoundScale(a, s) => RoundScale(f(a), f(s)),
        }
    }

    /// References to the children, left to right.
    pub fn children(&self) -> Vec<&T> {
        use MapFunc::*;
        match self {
            Constant(_) | Undefined | Now | JoinSideName(_) => vec![],
            Negate(a) | Not(a) | MakeArray(a) | Bool(a) | Integer(a) | Decimal(a) | Null(a)
            | ToString(a) | ToId(a) | ToTimestamp(a) | TypeOf(a) | Meta(a) | Extract(_, a)
            | Date(a) | Time(a) | Timestamp(a) | Interval(a) | StartOfDay(a) | TimeOfDay(a)
            | TemporalTrunc(_, a) | Length(a) | Lower(a) | Upper(a) | Abs(a) | Ceil(a)
            | Floor(a) | Trunc(a) | Round(a) => vec![a],
            Add(a, b) | Subtract(a, b) | Multiply(a, b) | Divide(a, b) | Modulo(a, b)
            | Power(a, b) | Eq(a, b) | Neq(a, b) | Lt(a, b) | Lte(a, b) | Gt(a, b)
            | Gte(a, b) | And(a, b) | Or(a, b) | MakeMap(a, b) | ConcatArrays(a, b)
            | ConcatMaps(a, b) | ProjectKey(a, b) | ProjectIndex(a, b) | DeleteKey(a, b)
            | Split(a, b) | Range(a, b) | Within(a, b) | IfUndefined(a, b)
            | FloorScale(a, b) | CeilScale(a, b) | RoundScale(a, b) => vec![a, b],
            Substring(a, b, c) | Search(a, b, c) | Cond(a, b, c) | Between(a, b, c) => {
                vec![a, b, c]
            }
            Guard(a, _, b, c) => vec![a, b, c],
        }
    }

    fn name(&self) -> &'static str {
        use MapFunc::*;
        match self {
            Constant(_) => "Constant",
            Undefined => "Undefined",
            Now => "Now",
            JoinSideName(_) => "JoinSideName",
            Add(..) => "Add",
            Subtract(..) => "Subtract",
            Multiply(..) => "Multiply",
            Divide(..) => "Divide",
            Modulo(..) => "Modulo",
            Power(..) => "Power",
            Negate(..) => "Negate",
            Eq(..) => "Eq",
            Neq(..) => "Neq",
            Lt(..) => "Lt",
            Lte(..) => "Lte",
            Gt(..) => "Gt",
            Gte(..) => "Gte",
            And(..) => "And",
            Or(..) => "Or",
            Not(..) => "Not",
            MakeArray(..) => "MakeArray",
            MakeMap(..) => "MakeMap",
            ConcatArrays(..) => "ConcatArrays",
            ConcatMaps(..) => "ConcatMaps",
            ProjectKey(..) => "ProjectKey",
            ProjectIndex(..) => "ProjectIndex",
            DeleteKey(..) => "DeleteKey",
            Bool(..) => "Bool",
            Integer(..) => "Integer",
            Decimal(..) => "Decimal",
            Null(..) => "Null",
            ToString(..) => "ToString",
            ToId(..) => "ToId",
            ToTimestamp(..) => "ToTimestamp",
            TypeOf(..) => "TypeOf",
            Meta(..) => "Meta",
            Extract(..) => "Extract",
            Date(..) => "Date",
            Time(..) => "Time",
            Timestamp(..) => "Timestamp",
            Interval(..) => "Interval",
            StartOfDay(..) => "StartOfDay",
            TimeOfDay(..) => "TimeOfDay",
            TemporalTrunc(..) => "TemporalTrunc",
            Length(..) => "Length",
            Lower(..) => "Lower",
            Upper(..) => "Upper",
            Substring(..) => "Substring",
            Split(..) => "Split",
            Search(..) => "Search",
            Range(..) => "Range",
            Within(..) => "Within",
            IfUndefined(..) => "IfUndefined",
            Cond(..) => "Cond",
            Between(..) => "Between",
            Guard(..) => "Guard",
            Abs(..) => "Abs",
            Ceil(..) => "Ceil",
            Floor(..) => "Floor",
            Trunc(..) => "Trunc",
            Round(..) => "Round",
            FloorScale(..) => "FloorScale",
            CeilScale(..) => "CeilScale",
            RoundScale(..) => "RoundScale",
        }
    }
}

impl<T: fmt::Display> fmt::Display for MapFunc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapFunc::Constant(v) => write!(f, "{}", v),
            MapFunc::Undefined => write!(f, "undefined"),
            MapFunc::Now => write!(f, "now()"),
            MapFunc::JoinSideName(s) => write!(f, "side({})", s),
            MapFunc::Extract(part, a) => write!(f, "Extract({:?}, {})", part, a),
            MapFunc::TemporalTrunc(part, a) => write!(f, "TemporalTrunc({:?}, {})", part, a),
            MapFunc::Guard(v, ty, cont, fallback) => {
                write!(f, "Guard({}, {:?}, {}, {})", v, ty, cont, fallback)
            }
            other => write!(f, "{}({})", other.name(), other.children().iter().join(", ")),
        }
    }
}

/// A scalar expression tree over leaves of type `A`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FreeMap<A> {
    Leaf(A),
    Func(Box<MapFunc<FreeMap<A>>>),
}

impl<A> FreeMap<A> {
    /// Rolls one [`MapFunc`] layer.
    pub fn func(node: MapFunc<FreeMap<A>>) -> Self {
        FreeMap::Func(Box::new(node))
    }

    /// Replaces every leaf with `f(leaf)`, preserving the tree shape.
    pub fn map_leaves<B, F>(self, mut f: F) -> FreeMap<B>
    where
        F: FnMut(A) -> B,
    {
        self.map_leaves_inner(&mut f)
    }

    fn map_leaves_inner<B, F>(self, f: &mut F) -> FreeMap<B>
    where
        F: FnMut(A) -> B,
    {
        match self {
            FreeMap::Leaf(a) => FreeMap::Leaf(f(a)),
            FreeMap::Func(node) => {
                FreeMap::Func(Box::new(node.map(|child| child.map_leaves_inner(f))))
            }
        }
    }

    /// Substitutes every leaf with the expression `f(leaf)`; this is the
    /// monadic bind of the free carrier.
    pub fn flat_map<B, F>(self, mut f: F) -> FreeMap<B>
    where
        F: FnMut(A) -> FreeMap<B>,
    {
        self.flat_map_inner(&mut f)
    }

    fn flat_map_inner<B, F>(self, f: &mut F) -> FreeMap<B>
    where
        F: FnMut(A) -> FreeMap<B>,
    {
        match self {
            FreeMap::Leaf(a) => f(a),
            FreeMap::Func(node) => {
                FreeMap::Func(Box::new(node.map(|child| child.flat_map_inner(f))))
            }
        }
    }

    /// Fallible leaf substitution; the first failing leaf aborts.
    pub fn try_flat_map<B, F>(self, mut f: F) -> PlannerResult<FreeMap<B>>
    where
        F: FnMut(A) -> PlannerResult<FreeMap<B>>,
    {
        self.try_flat_map_inner(&mut f)
    }

    fn try_flat_map_inner<B, F>(self, f: &mut F) -> PlannerResult<FreeMap<B>>
    where
        F: FnMut(A) -> PlannerResult<FreeMap<B>>,
    {
        match self {
            FreeMap::Leaf(a) => f(a),
            FreeMap::Func(node) => {
                let mut err = None;
                let mapped = node.map(|child| match child.try_flat_map_inner(f) {
                    Ok(mapped_child) => Some(mapped_child),
                    Err(e) => {
                        err.get_or_insert(e);
                        None
                    }
                });
                match err {
                    Some(e) => Err(e),
                    // no child failed, so every position is Some
                    None => Ok(FreeMap::Func(Box::new(
                        mapped.map(|child| child.unwrap_or_else(|| unreachable!())),
                    ))),
                }
            }
        }
    }

    /// Whether any leaf satisfies `f`.
    pub fn any_leaf<F>(&self, mut f: F) -> bool
    where
        F: FnMut(&A) -> bool,
    {
        self.any_leaf_inner(&mut f)
    }

    fn any_leaf_inner<F>(&self, f: &mut F) -> bool
    where
        F: FnMut(&A) -> bool,
    {
        match self {
            FreeMap::Leaf(a) => f(a),
            FreeMap::Func(node) => node
                .children()
                .into_iter()
                .any(|child| child.any_leaf_inner(f)),
        }
    }

    /// Visits every leaf, left to right.
    pub fn each_leaf<F>(&self, mut f: F)
    where
        F: FnMut(&A),
    {
        self.each_leaf_inner(&mut f)
    }

    fn each_leaf_inner<F>(&self, f: &mut F)
    where
        F: FnMut(&A),
    {
        match self {
            FreeMap::Leaf(a) => f(a),
            FreeMap::Func(node) => {
                for child in node.children() {
                    child.each_leaf_inner(f);
                }
            }
        }
    }
}

impl<A: fmt::Display> fmt::Display for FreeMap<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FreeMap::Leaf(a) => write!(f, "{}", a),
            FreeMap::Func(node) => write!(f, "{}", node),
        }
    }
}
