//! Lowering of n-ary shifts into chains of single shifts.
//!
//! A `MultiLeftShift(source, shifts, repair)` unnests several expressions
//! of one row at once. Backends only know single shifts, so the node is
//! expanded into a chain: the first shift stashes the original row under
//! `"original"` and its element under `"0"`; every later shift re-emits
//! the accumulated keys off its left side, addresses its structure against
//! the preserved original, and adds its own element under the next index;
//! a final map projects the scaffold away and reassembles the caller's
//! repair.
//!
//! Shifts are stable-sorted by rotation first, so shifts over one axis end
//! up adjacent. Two adjacent shifts over the same axis would multiply rows
//! spuriously (every element paired with every other); the chain suppresses
//! that by guarding the later repair with an identity equality between the
//! two shifts. The sort permutation is remembered explicitly and the final
//! mapper translates each caller-facing index through it, so callers never
//! need to present shifts pre-sorted.
//!
//! The scaffold is strictly internal: the final map yields exactly the
//! value schema of the original repair.

use quasar_errors::{internal, PlannerResult};
use quasar_qscript::dsl::{
    cond, concat_maps, eq, hole, left_identity, left_target, make_map_s, project_key_s,
    right_target, undefined,
};
use quasar_qscript::{
    FreeMap, Hole, MultiShiftRepair, MultiShiftTarget, NameGenerator, QScriptUniform,
    ShiftSpec, Symbol,
};
use tracing::{instrument, trace};

use crate::provenance::AuthenticatedQsu;
use crate::rewrite::apply_provenance::refresh;

/// The scaffold key preserving the pre-shift row along the chain.
pub(crate) const ORIGINAL_KEY: &str = "original";

#[instrument(skip_all)]
pub(crate) fn expand_shifts(
    qsu: &mut AuthenticatedQsu,
    names: &mut NameGenerator,
) -> PlannerResult<()> {
    for sym in qsu.graph.topo_symbols()? {
        let QScriptUniform::MultiLeftShift {
            source,
            shifts,
            repair,
        } = qsu.graph.node(sym)?
        else {
            continue;
        };
        let (source, shifts, repair) = (*source, shifts.clone(), repair.clone());
        trace!(node = %sym, shifts = shifts.len(), "expanding multi shift");
        expand_one(qsu, names, sym, source, shifts, repair)?;
    }
    Ok(())
}

fn expand_one(
    qsu: &mut AuthenticatedQsu,
    names: &mut NameGenerator,
    sym: Symbol,
    source: Symbol,
    shifts: Vec<ShiftSpec>,
    repair: MultiShiftRepair,
) -> PlannerResult<()> {
    if shifts.is_empty() {
        let mapper = repair.try_flat_map(|target| match target {
            MultiShiftTarget::Source => Ok(hole()),
            MultiShiftTarget::Shifted(i) => {
                internal!("reference to shift {} in an empty multi shift at {}", i, sym)
            }
        })?;
        qsu.graph.overwrite(
            sym,
            QScriptUniform::Map {
                source,
                func: mapper,
            },
        )?;
        refresh(qsu, sym)?;
        return Ok(());
    }

    // stable sort by rotation keeps equal rotations adjacent; remember
    // where each caller-facing index landed
    let mut sorted: Vec<(usize, ShiftSpec)> = shifts.into_iter().enumerate().collect();
    sorted.sort_by_key(|(_, spec)| spec.rotation);
    let mut sorted_position = vec![0usize; sorted.len()];
    for (pos, (original, _)) in sorted.iter().enumerate() {
        sorted_position[*original] = pos;
    }

    // base shift: the original row rides under "original", its element
    // under "0"
    let first = &sorted[0].1;
    let mut top = qsu.graph.add_node(
        names,
        QScriptUniform::LeftShift {
            source,
            structure: first.structure.clone(),
            id_status: first.id_status,
            rotation: first.rotation,
            repair: concat_maps(
                make_map_s(ORIGINAL_KEY, left_target()),
                make_map_s("0", right_target()),
            ),
        },
    );
    refresh(qsu, top)?;

    for (k, (_, spec)) in sorted.iter().enumerate().skip(1) {
        // re-emit the keys the chain has accumulated so far
        let mut static_above = make_map_s(
            ORIGINAL_KEY,
            project_key_s(left_target(), ORIGINAL_KEY),
        );
        for j in 0..k {
            let key = j.to_string();
            static_above = concat_maps(
                static_above,
                make_map_s(&key, project_key_s(left_target(), &key)),
            );
        }
        let repair_k = concat_maps(static_above, make_map_s(&k.to_string(), right_target()));

        // the shift still addresses the preserved original row
        let structure = spec
            .structure
            .clone()
            .flat_map(|_| project_key_s(hole(), ORIGINAL_KEY));

        let next = qsu.graph.add_node(
            names,
            QScriptUniform::LeftShift {
                source: top,
                structure,
                id_status: spec.id_status,
                rotation: spec.rotation,
                repair: repair_k.clone(),
            },
        );
        if sorted[k - 1].1.rotation.compatible_with(spec.rotation) {
            // adjacent shifts over one axis: keep only rows whose two
            // identities align, suppressing the spurious cross product
            let guarded = cond(
                eq(left_identity(top), left_identity(next)),
                repair_k,
                undefined(),
            );
            let QScriptUniform::LeftShift {
                source,
                structure,
                id_status,
                rotation,
                ..
            } = qsu.graph.node(next)?.clone()
            else {
                internal!("freshly emitted chain node {} is not a left shift", next)
            };
            qsu.graph.overwrite(
                next,
                QScriptUniform::LeftShift {
                    source,
                    structure,
                    id_status,
                    rotation,
                    repair: guarded,
                },
            )?;
        }
        refresh(qsu, next)?;
        top = next;
    }

    // the final mapper projects the scaffold away, translating the
    // caller's indices through the sort permutation
    let mapper: FreeMap<Hole> = repair.try_flat_map(|target| match target {
        MultiShiftTarget::Source => Ok(project_key_s(hole(), ORIGINAL_KEY)),
        MultiShiftTarget::Shifted(i) => match sorted_position.get(i) {
            Some(pos) => Ok(project_key_s(hole(), &pos.to_string())),
            None => internal!("reference to shift {} outside the multi shift at {}", i, sym),
        },
    })?;
    qsu.graph.overwrite(
        sym,
        QScriptUniform::Map {
            source: top,
            func: mapper,
        },
    )?;
    refresh(qsu, sym)?;
    Ok(())
}
