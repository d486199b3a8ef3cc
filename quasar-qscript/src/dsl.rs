//! Construction helpers for scalar and relational trees.
//!
//! Everything here is pure and allocates no symbols; graphs are built
//! separately through the graph substrate. Equality of constructed trees
//! is structural.

use vec1::Vec1;

use crate::expr::{FreeMap, MapFunc};
use crate::func::{Access, Hole, JoinSide, ShiftTarget};
use crate::op::{JoinType, Reducer, ShiftSpec, SortOrder, SubsetOp};
use crate::path::TablePath;
use crate::rotation::{IdStatus, Rotation};
use crate::uniform::{QScriptUniform, UniformBranch};
use crate::value::Value;

// ---- scalar helpers ----

/// The row flowing into a single-source function.
pub fn hole() -> FreeMap<Hole> {
    FreeMap::Leaf(Hole)
}

pub fn constant<A>(value: Value) -> FreeMap<A> {
    FreeMap::func(MapFunc::Constant(value))
}

pub fn str_lit<A>(s: &str) -> FreeMap<A> {
    constant(Value::from(s))
}

pub fn int_lit<A>(i: i64) -> FreeMap<A> {
    constant(Value::from(i))
}

pub fn undefined<A>() -> FreeMap<A> {
    FreeMap::func(MapFunc::Undefined)
}

pub fn eq<A>(a: FreeMap<A>, b: FreeMap<A>) -> FreeMap<A> {
    FreeMap::func(MapFunc::Eq(a, b))
}

pub fn and<A>(a: FreeMap<A>, b: FreeMap<A>) -> FreeMap<A> {
    FreeMap::func(MapFunc::And(a, b))
}

pub fn cond<A>(c: FreeMap<A>, then: FreeMap<A>, other: FreeMap<A>) -> FreeMap<A> {
    FreeMap::func(MapFunc::Cond(c, then, other))
}

pub fn if_undefined<A>(a: FreeMap<A>, b: FreeMap<A>) -> FreeMap<A> {
    FreeMap::func(MapFunc::IfUndefined(a, b))
}

pub fn make_array<A>(a: FreeMap<A>) -> FreeMap<A> {
    FreeMap::func(MapFunc::MakeArray(a))
}

pub fn make_map<A>(key: FreeMap<A>, value: FreeMap<A>) -> FreeMap<A> {
    FreeMap::func(MapFunc::MakeMap(key, value))
}

/// `MakeMap` with a static string key.
pub fn make_map_s<A>(key: &str, value: FreeMap<A>) -> FreeMap<A> {
    make_map(str_lit(key), value)
}

pub fn concat_arrays<A>(a: FreeMap<A>, b: FreeMap<A>) -> FreeMap<A> {
    FreeMap::func(MapFunc::ConcatArrays(a, b))
}

pub fn concat_maps<A>(a: FreeMap<A>, b: FreeMap<A>) -> FreeMap<A> {
    FreeMap::func(MapFunc::ConcatMaps(a, b))
}

pub fn project_key<A>(src: FreeMap<A>, key: FreeMap<A>) -> FreeMap<A> {
    FreeMap::func(MapFunc::ProjectKey(src, key))
}

/// `ProjectKey` with a static string key.
pub fn project_key_s<A>(src: FreeMap<A>, key: &str) -> FreeMap<A> {
    project_key(src, str_lit(key))
}

pub fn project_index<A>(src: FreeMap<A>, index: FreeMap<A>) -> FreeMap<A> {
    FreeMap::func(MapFunc::ProjectIndex(src, index))
}

/// `ProjectIndex` with a static index.
pub fn project_index_i<A>(src: FreeMap<A>, index: i64) -> FreeMap<A> {
    project_index(src, int_lit(index))
}

pub fn delete_key<A>(src: FreeMap<A>, key: FreeMap<A>) -> FreeMap<A> {
    FreeMap::func(MapFunc::DeleteKey(src, key))
}

/// `DeleteKey` with a static string key.
pub fn delete_key_s<A>(src: FreeMap<A>, key: &str) -> FreeMap<A> {
    delete_key(src, str_lit(key))
}

// ---- shift repair leaves ----

/// The pre-shift row.
pub fn left_target() -> FreeMap<ShiftTarget> {
    FreeMap::Leaf(ShiftTarget::left_value())
}

/// The freshly unnested element.
pub fn right_target() -> FreeMap<ShiftTarget> {
    FreeMap::Leaf(ShiftTarget::Right)
}

/// The identity introduced by the named shift, read off the pre-shift row.
pub fn left_identity(sym: crate::ident::Symbol) -> FreeMap<ShiftTarget> {
    FreeMap::Leaf(ShiftTarget::Left(Access::Id(sym)))
}

pub fn left_side() -> FreeMap<JoinSide> {
    FreeMap::Leaf(JoinSide::Left)
}

pub fn right_side() -> FreeMap<JoinSide> {
    FreeMap::Leaf(JoinSide::Right)
}

// ---- relational DSL ----

/// A carrier the uniform algebra embeds into: the free branch carrier, or
/// any future fixpoint carrier.
pub trait EmbedUniform: Sized {
    fn embed(node: QScriptUniform<Self>) -> Self;
}

impl EmbedUniform for UniformBranch {
    fn embed(node: QScriptUniform<UniformBranch>) -> Self {
        UniformBranch::node(node)
    }
}

pub fn map_of<R: EmbedUniform>(source: R, func: FreeMap<Hole>) -> R {
    R::embed(QScriptUniform::Map { source, func })
}

pub fn left_shift<R: EmbedUniform>(
    source: R,
    structure: FreeMap<Hole>,
    id_status: IdStatus,
    rotation: Rotation,
    repair: FreeMap<ShiftTarget>,
) -> R {
    R::embed(QScriptUniform::LeftShift {
        source,
        structure,
        id_status,
        rotation,
        repair,
    })
}

pub fn reduce<R: EmbedUniform>(
    source: R,
    buckets: Vec<FreeMap<Hole>>,
    reducers: Vec<Reducer>,
    repair: crate::func::ReduceRepair,
) -> R {
    R::embed(QScriptUniform::Reduce {
        source,
        buckets,
        reducers,
        repair,
    })
}

pub fn sort<R: EmbedUniform>(
    source: R,
    buckets: Vec<FreeMap<Hole>>,
    order: Vec1<(FreeMap<Hole>, SortOrder)>,
) -> R {
    R::embed(QScriptUniform::Sort {
        source,
        buckets,
        order,
    })
}

pub fn filter<R: EmbedUniform>(source: R, predicate: FreeMap<Hole>) -> R {
    R::embed(QScriptUniform::Filter { source, predicate })
}

pub fn union<R: EmbedUniform>(source: R, left: UniformBranch, right: UniformBranch) -> R {
    R::embed(QScriptUniform::Union {
        source,
        left,
        right,
    })
}

pub fn subset<R: EmbedUniform>(
    source: R,
    from: UniformBranch,
    op: SubsetOp,
    count: UniformBranch,
) -> R {
    R::embed(QScriptUniform::Subset {
        source,
        from,
        op,
        count,
    })
}

pub fn theta_join<R: EmbedUniform>(
    source: R,
    left: UniformBranch,
    right: UniformBranch,
    on: crate::func::JoinFunc,
    join_type: JoinType,
    combine: crate::func::JoinFunc,
) -> R {
    R::embed(QScriptUniform::ThetaJoin {
        source,
        left,
        right,
        on,
        join_type,
        combine,
    })
}

pub fn equi_join<R: EmbedUniform>(
    source: R,
    left: UniformBranch,
    right: UniformBranch,
    keys: Vec<(FreeMap<Hole>, FreeMap<Hole>)>,
    join_type: JoinType,
    combine: crate::func::JoinFunc,
) -> R {
    R::embed(QScriptUniform::EquiJoin {
        source,
        left,
        right,
        keys,
        join_type,
        combine,
    })
}

pub fn distinct<R: EmbedUniform>(source: R) -> R {
    R::embed(QScriptUniform::Distinct { source })
}

pub fn read<R: EmbedUniform>(path: TablePath) -> R {
    R::embed(QScriptUniform::Read { path })
}

pub fn shifted_read<R: EmbedUniform>(path: TablePath, id_status: IdStatus) -> R {
    R::embed(QScriptUniform::ShiftedRead { path, id_status })
}

pub fn unreferenced<R: EmbedUniform>() -> R {
    R::embed(QScriptUniform::Unreferenced)
}

/// A multi left shift, from its shift specifications.
pub fn multi_left_shift<R: EmbedUniform>(
    source: R,
    shifts: Vec<ShiftSpec>,
    repair: crate::func::MultiShiftRepair,
) -> R {
    R::embed(QScriptUniform::MultiLeftShift {
        source,
        shifts,
        repair,
    })
}
