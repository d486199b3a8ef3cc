//! Settling of shifts that read their own identity.
//!
//! The expansion guard compares a shift's own identity with its
//! predecessor's, so a chain node's repair can reference the identity of
//! the very node it sits on. A shift's own identity is available in-band:
//! under `IncludeId` the unnested element arrives as `[identity, value]`.
//! This pass upgrades such shifts to `IncludeId` (re-pointing value reads
//! of the element at index 1) and rewrites own-identity reads to index 0.
//! Reads of *other* nodes' identities are left for identity reification.

use quasar_errors::PlannerResult;
use quasar_qscript::dsl::{project_index_i, right_target};
use quasar_qscript::{Access, FreeMap, IdStatus, QScriptUniform, ShiftTarget};
use tracing::{instrument, trace};

use crate::provenance::AuthenticatedQsu;

#[instrument(skip_all)]
pub(crate) fn resolve_own_identities(qsu: &mut AuthenticatedQsu) -> PlannerResult<()> {
    qsu.graph.rewrite_nodes(|sym, pattern| {
        let QScriptUniform::LeftShift {
            source,
            structure,
            id_status,
            rotation,
            repair,
        } = pattern
        else {
            return Ok(None);
        };
        let reads_own_id = repair.any_leaf(
            |target| matches!(target, ShiftTarget::Left(Access::Id(id)) if *id == sym),
        );
        if !reads_own_id {
            return Ok(None);
        }
        trace!(node = %sym, status = ?id_status, "resolving own-identity reads");

        let (id_status, repair) = match id_status {
            // the element is the identity already
            IdStatus::IdOnly => (
                IdStatus::IdOnly,
                repair.clone().flat_map(|target| match target {
                    ShiftTarget::Left(Access::Id(id)) if id == sym => right_target(),
                    other => FreeMap::Leaf(other),
                }),
            ),
            // the element is already the [identity, value] pair
            IdStatus::IncludeId => (
                IdStatus::IncludeId,
                repair.clone().flat_map(|target| match target {
                    ShiftTarget::Left(Access::Id(id)) if id == sym => {
                        project_index_i(right_target(), 0)
                    }
                    other => FreeMap::Leaf(other),
                }),
            ),
            // upgrade: the element becomes the pair, so existing value
            // reads move to index 1
            IdStatus::ExcludeId => (
                IdStatus::IncludeId,
                repair.clone().flat_map(|target| match target {
                    ShiftTarget::Right => project_index_i(right_target(), 1),
                    ShiftTarget::Left(Access::Id(id)) if id == sym => {
                        project_index_i(right_target(), 0)
                    }
                    other => FreeMap::Leaf(other),
                }),
            ),
        };
        Ok(Some(QScriptUniform::LeftShift {
            source: *source,
            structure: structure.clone(),
            id_status,
            rotation: *rotation,
            repair,
        }))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use quasar_qscript::dsl::*;
    use quasar_qscript::{NameGenerator, Rotation, TablePath};

    use super::*;
    use crate::graph::QsuGraph;
    use crate::rewrite::apply_provenance::apply_provenance;

    fn shift_graph(
        id_status: IdStatus,
        repair_of: impl FnOnce(quasar_qscript::Symbol) -> FreeMap<ShiftTarget>,
    ) -> (AuthenticatedQsu, quasar_qscript::Symbol) {
        let mut names = NameGenerator::new();
        let mut graph = QsuGraph::with_name(
            &mut names,
            QScriptUniform::ShiftedRead {
                path: TablePath::from("/db/zips"),
                id_status: IdStatus::ExcludeId,
            },
        );
        let base = graph.root();
        // mint the shift symbol first so the repair can mention it
        let shift = graph.add_node(
            &mut names,
            QScriptUniform::Unreferenced,
        );
        graph
            .overwrite(
                shift,
                QScriptUniform::LeftShift {
                    source: base,
                    structure: hole(),
                    id_status,
                    rotation: Rotation::ShiftArray,
                    repair: repair_of(shift),
                },
            )
            .unwrap();
        graph.set_root(shift).unwrap();
        let qsu = apply_provenance(graph).unwrap();
        (qsu, shift)
    }

    #[test]
    fn excluded_ids_are_upgraded_and_repointed() {
        let (mut qsu, shift) = shift_graph(IdStatus::ExcludeId, |sym| {
            cond(
                eq(left_identity(sym), left_identity(sym)),
                right_target(),
                undefined(),
            )
        });

        resolve_own_identities(&mut qsu).unwrap();

        let QScriptUniform::LeftShift {
            id_status, repair, ..
        } = qsu.graph.node(shift).unwrap()
        else {
            panic!("expected a left shift");
        };
        assert_eq!(*id_status, IdStatus::IncludeId);
        assert_eq!(
            repair,
            &cond(
                eq(
                    project_index_i(right_target(), 0),
                    project_index_i(right_target(), 0)
                ),
                project_index_i(right_target(), 1),
                undefined(),
            )
        );
    }

    #[test]
    fn id_only_shifts_read_the_element_directly() {
        let (mut qsu, shift) = shift_graph(IdStatus::IdOnly, left_identity);

        resolve_own_identities(&mut qsu).unwrap();

        let QScriptUniform::LeftShift {
            id_status, repair, ..
        } = qsu.graph.node(shift).unwrap()
        else {
            panic!("expected a left shift");
        };
        assert_eq!(*id_status, IdStatus::IdOnly);
        assert_eq!(repair, &right_target());
    }

    #[test]
    fn foreign_identity_reads_are_untouched() {
        let (mut qsu, shift) = shift_graph(IdStatus::ExcludeId, |_| right_target());
        let before = qsu.graph.node(shift).unwrap().clone();

        resolve_own_identities(&mut qsu).unwrap();
        assert_eq!(qsu.graph.node(shift).unwrap(), &before);
    }
}
