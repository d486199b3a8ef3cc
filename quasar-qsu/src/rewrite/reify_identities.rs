//! Materialization of cross-node identity reads as first-class data.
//!
//! After expansion and own-identity resolution, the only identity reads
//! left are a chain node reading its *direct source* shift's identity (the
//! left half of an expansion guard). The demanded shift is upgraded to
//! `IncludeId` and taught to carry its identity in-band, under a reserved
//! key concatenated onto its repair output; the consumer's read becomes a
//! plain key projection off its left side. The reserved keys are recorded
//! in the returned [`ResearchedQsu`], and no identity access survives this
//! pass — graduation treats one as a planner bug.
//!
//! Identity demands at a distance greater than one source hop never arise
//! from the passes above; rather than planning them wrongly, they are
//! reported as unsupported.

use std::collections::HashMap;

use quasar_errors::{internal, unsupported, PlannerResult};
use quasar_qscript::dsl::{concat_maps, make_map_s, project_index_i, project_key_s, right_target};
use quasar_qscript::{
    Access, FreeMap, IdStatus, QScriptUniform, ShiftTarget, Symbol,
};
use tracing::{instrument, trace};

use crate::provenance::{AuthenticatedQsu, ResearchedQsu};

/// The reserved row key carrying the identity of the named shift.
fn identity_key(sym: Symbol) -> String {
    format!("__identity_{}", sym)
}

#[instrument(skip_all)]
pub(crate) fn reify_identities(qsu: AuthenticatedQsu) -> PlannerResult<ResearchedQsu> {
    let AuthenticatedQsu { mut graph, auth } = qsu;

    // collect (consumer, demanded) pairs
    let mut demands: Vec<(Symbol, Symbol)> = vec![];
    for sym in graph.topo_symbols()? {
        let QScriptUniform::LeftShift { source, repair, .. } = graph.node(sym)? else {
            continue;
        };
        let source = *source;
        let mut demanded = vec![];
        repair.each_leaf(|target| {
            if let ShiftTarget::Left(Access::Id(id)) = target {
                if *id != sym && !demanded.contains(id) {
                    demanded.push(*id);
                }
            }
        });
        for id in demanded {
            if id != source {
                unsupported!(
                    "identity of {} demanded at {}, which is not its direct consumer",
                    id,
                    sym
                )
            }
            demands.push((sym, id));
        }
    }

    // teach each demanded shift to carry its identity in-band
    let mut identity_keys: HashMap<Symbol, String> = HashMap::new();
    for &(_, demanded) in &demands {
        if identity_keys.contains_key(&demanded) {
            continue;
        }
        let QScriptUniform::LeftShift {
            source,
            structure,
            id_status,
            rotation,
            repair,
        } = graph.node(demanded)?.clone()
        else {
            internal!("identity demanded of {}, which is not a shift", demanded)
        };
        let key = identity_key(demanded);
        trace!(shift = %demanded, key = %key, "reifying shift identity");

        let (id_status, carried, id_expr) = match id_status {
            IdStatus::IdOnly => (IdStatus::IdOnly, repair, right_target()),
            IdStatus::IncludeId => (
                IdStatus::IncludeId,
                repair,
                project_index_i(right_target(), 0),
            ),
            IdStatus::ExcludeId => (
                IdStatus::IncludeId,
                repair.flat_map(|target| match target {
                    ShiftTarget::Right => project_index_i(right_target(), 1),
                    other => FreeMap::Leaf(other),
                }),
                project_index_i(right_target(), 0),
            ),
        };
        graph.overwrite(
            demanded,
            QScriptUniform::LeftShift {
                source,
                structure,
                id_status,
                rotation,
                repair: concat_maps(carried, make_map_s(&key, id_expr)),
            },
        )?;
        identity_keys.insert(demanded, key);
    }

    // re-point every consumer read at the reserved key
    for &(consumer, demanded) in &demands {
        let QScriptUniform::LeftShift {
            source,
            structure,
            id_status,
            rotation,
            repair,
        } = graph.node(consumer)?.clone()
        else {
            internal!("identity consumer {} is no longer a shift", consumer)
        };
        let key = identity_keys
            .get(&demanded)
            .ok_or_else(|| quasar_errors::internal_err(format!(
                "no reserved key for demanded shift {}",
                demanded
            )))?
            .clone();
        let repair = repair.try_flat_map(|target| match target {
            ShiftTarget::Left(Access::Id(id)) if id == demanded => {
                Ok(project_key_s(FreeMap::Leaf(ShiftTarget::left_value()), &key))
            }
            ShiftTarget::Left(Access::Id(id)) => internal!(
                "unresolved identity read of {} at {} after own-identity resolution",
                id,
                consumer
            ),
            other => Ok(FreeMap::Leaf(other)),
        })?;
        graph.overwrite(
            consumer,
            QScriptUniform::LeftShift {
                source,
                structure,
                id_status,
                rotation,
                repair,
            },
        )?;
    }

    Ok(ResearchedQsu {
        graph,
        auth,
        identity_keys,
    })
}
