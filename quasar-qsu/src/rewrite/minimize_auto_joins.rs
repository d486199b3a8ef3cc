//! Collapsing of autojoins whose arms reconverge.
//!
//! An autojoin pairs up rows of two plans derived from one origin. When
//! the arms are scalar work over the same node the pairing is the identity
//! and no join is needed at all; when the arms are shifts of the same node
//! the pairing is exactly an n-ary shift. The rules, tried in order:
//!
//! - equal arms merge into a `Map` of the combiner,
//! - two maps of one source merge into one `Map`,
//! - a map and a shift of one source merge into the shift (the map's
//!   function folds into the repair's left target),
//! - shifts and multi-shifts of one source merge into a `MultiLeftShift`,
//!   which is what the shift-expansion pass later lowers.
//!
//! Anything left over is handled by the autojoin reification pass.

use quasar_errors::PlannerResult;
use quasar_qscript::{
    Access, FreeMap, Hole, JoinSide, MultiShiftRepair, MultiShiftTarget, QScriptUniform,
    ShiftRepair, ShiftSpec, ShiftTarget, Symbol,
};
use tracing::{instrument, trace};

use crate::graph::QsuPattern;
use crate::provenance::AuthenticatedQsu;
use crate::rewrite::apply_provenance::refresh;

#[instrument(skip_all)]
pub(crate) fn minimize_auto_joins(qsu: &mut AuthenticatedQsu) -> PlannerResult<()> {
    loop {
        let mut changed = false;
        for sym in qsu.graph.topo_symbols()? {
            let QScriptUniform::AutoJoin {
                left,
                right,
                combine,
            } = qsu.graph.node(sym)?
            else {
                continue;
            };
            let (left, right, combine) = (*left, *right, combine.clone());

            let replacement = if left == right {
                trace!(node = %sym, "autojoin arms are one node");
                Some(QScriptUniform::Map {
                    source: left,
                    func: combine.map_leaves(|_| Hole),
                })
            } else {
                merge_arms(
                    qsu.graph.node(left)?.clone(),
                    qsu.graph.node(right)?.clone(),
                    &combine,
                )
            };

            if let Some(pattern) = replacement {
                trace!(node = %sym, to = %pattern.description(), "minimized autojoin");
                qsu.graph.overwrite(sym, pattern)?;
                refresh(qsu, sym)?;
                changed = true;
            }
        }
        if !changed {
            break;
        }
        qsu.graph.prune_unreachable();
    }
    Ok(())
}

/// One merged node equivalent to the autojoin of the two arm patterns, if
/// the arms reconverge on a shared source.
fn merge_arms(
    left: QsuPattern,
    right: QsuPattern,
    combine: &FreeMap<JoinSide>,
) -> Option<QsuPattern> {
    use QScriptUniform::*;
    match (left, right) {
        (
            Map {
                source: ls,
                func: f,
            },
            Map {
                source: rs,
                func: g,
            },
        ) if ls == rs => Some(Map {
            source: ls,
            func: combine.clone().flat_map(|side| match side {
                JoinSide::Left => f.clone(),
                JoinSide::Right => g.clone(),
            }),
        }),
        (
            Map {
                source: ls,
                func: f,
            },
            LeftShift {
                source: rs,
                structure,
                id_status,
                rotation,
                repair,
            },
        ) if ls == rs && plain(&repair) => Some(LeftShift {
            source: ls,
            structure,
            id_status,
            rotation,
            repair: combine.clone().flat_map(|side| match side {
                JoinSide::Left => lift(&f),
                JoinSide::Right => repair.clone(),
            }),
        }),
        (
            LeftShift {
                source: ls,
                structure,
                id_status,
                rotation,
                repair,
            },
            Map {
                source: rs,
                func: g,
            },
        ) if ls == rs && plain(&repair) => Some(LeftShift {
            source: ls,
            structure,
            id_status,
            rotation,
            repair: combine.clone().flat_map(|side| match side {
                JoinSide::Left => repair.clone(),
                JoinSide::Right => lift(&g),
            }),
        }),
        (left, right) => {
            let (ls, l_shifts, l_repair) = as_multi(left)?;
            let (rs, r_shifts, r_repair) = as_multi(right)?;
            if ls != rs {
                return None;
            }
            let offset = l_shifts.len();
            let mut shifts = l_shifts;
            shifts.extend(r_shifts);
            let r_repair = r_repair.map_leaves(|target| match target {
                MultiShiftTarget::Shifted(i) => MultiShiftTarget::Shifted(i + offset),
                source => source,
            });
            Some(MultiLeftShift {
                source: ls,
                shifts,
                repair: combine.clone().flat_map(|side| match side {
                    JoinSide::Left => l_repair.clone(),
                    JoinSide::Right => r_repair.clone(),
                }),
            })
        }
    }
}

/// Views a shift or multi-shift arm in multi-shift form.
fn as_multi(pattern: QsuPattern) -> Option<(Symbol, Vec<ShiftSpec>, MultiShiftRepair)> {
    match pattern {
        QScriptUniform::LeftShift {
            source,
            structure,
            id_status,
            rotation,
            repair,
        } => {
            let repair = translate(&repair, 0)?;
            Some((
                source,
                vec![ShiftSpec {
                    structure,
                    id_status,
                    rotation,
                }],
                repair,
            ))
        }
        QScriptUniform::MultiLeftShift {
            source,
            shifts,
            repair,
        } => Some((source, shifts, repair)),
        _ => None,
    }
}

/// A single shift's repair in multi-shift leaf space, with the shifted
/// element at index `idx`. Identity accesses have no multi-shift form.
fn translate(repair: &ShiftRepair, idx: usize) -> Option<MultiShiftRepair> {
    if !plain(repair) {
        return None;
    }
    Some(repair.clone().map_leaves(|target| match target {
        ShiftTarget::Left(_) => MultiShiftTarget::Source,
        ShiftTarget::Right => MultiShiftTarget::Shifted(idx),
    }))
}

/// Whether a repair is free of identity accesses.
fn plain(repair: &ShiftRepair) -> bool {
    !repair.any_leaf(|target| matches!(target, ShiftTarget::Left(Access::Id(_))))
}

fn lift(func: &FreeMap<Hole>) -> ShiftRepair {
    func.clone().map_leaves(|_| ShiftTarget::left_value())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use quasar_qscript::dsl::*;
    use quasar_qscript::{IdStatus, NameGenerator, Rotation, TablePath};

    use super::*;
    use crate::graph::QsuGraph;
    use crate::rewrite::apply_provenance::apply_provenance;

    fn zips(names: &mut NameGenerator) -> QsuGraph {
        QsuGraph::with_name(
            names,
            QScriptUniform::ShiftedRead {
                path: TablePath::from("/db/zips"),
                id_status: IdStatus::ExcludeId,
            },
        )
    }

    #[test]
    fn equal_arms_become_a_map() {
        let mut names = NameGenerator::new();
        let mut graph = zips(&mut names);
        let base = graph.root();
        let join = graph.add_node(
            &mut names,
            QScriptUniform::AutoJoin {
                left: base,
                right: base,
                combine: concat_maps(
                    make_map_s("a", left_side()),
                    make_map_s("b", right_side()),
                ),
            },
        );
        graph.set_root(join).unwrap();
        let mut qsu = apply_provenance(graph).unwrap();

        minimize_auto_joins(&mut qsu).unwrap();

        match qsu.graph.node(join).unwrap() {
            QScriptUniform::Map { source, func } => {
                assert_eq!(*source, base);
                assert_eq!(
                    func,
                    &concat_maps(make_map_s("a", hole()), make_map_s("b", hole()))
                );
            }
            other => panic!("expected a map, got {}", other.description()),
        }
    }

    #[test]
    fn two_maps_of_one_source_merge() {
        let mut names = NameGenerator::new();
        let mut graph = zips(&mut names);
        let base = graph.root();
        let l = graph.add_node(
            &mut names,
            QScriptUniform::Map {
                source: base,
                func: project_key_s(hole(), "city"),
            },
        );
        let r = graph.add_node(
            &mut names,
            QScriptUniform::Map {
                source: base,
                func: project_key_s(hole(), "pop"),
            },
        );
        let join = graph.add_node(
            &mut names,
            QScriptUniform::AutoJoin {
                left: l,
                right: r,
                combine: concat_maps(
                    make_map_s("city", left_side()),
                    make_map_s("pop", right_side()),
                ),
            },
        );
        graph.set_root(join).unwrap();
        let mut qsu = apply_provenance(graph).unwrap();

        minimize_auto_joins(&mut qsu).unwrap();

        match qsu.graph.node(join).unwrap() {
            QScriptUniform::Map { source, func } => {
                assert_eq!(*source, base);
                assert_eq!(
                    func,
                    &concat_maps(
                        make_map_s("city", project_key_s(hole(), "city")),
                        make_map_s("pop", project_key_s(hole(), "pop")),
                    )
                );
            }
            other => panic!("expected a map, got {}", other.description()),
        }
        assert_eq!(qsu.graph.len(), 2);
    }

    #[test]
    fn two_shifts_of_one_source_become_a_multi_shift() {
        let mut names = NameGenerator::new();
        let mut graph = zips(&mut names);
        let base = graph.root();
        let l = graph.add_node(
            &mut names,
            QScriptUniform::LeftShift {
                source: base,
                structure: project_key_s(hole(), "cities"),
                id_status: IdStatus::ExcludeId,
                rotation: Rotation::ShiftArray,
                repair: right_target(),
            },
        );
        let r = graph.add_node(
            &mut names,
            QScriptUniform::LeftShift {
                source: base,
                structure: project_key_s(hole(), "pops"),
                id_status: IdStatus::ExcludeId,
                rotation: Rotation::ShiftArray,
                repair: right_target(),
            },
        );
        let join = graph.add_node(
            &mut names,
            QScriptUniform::AutoJoin {
                left: l,
                right: r,
                combine: concat_maps(
                    make_map_s("city", left_side()),
                    make_map_s("pop", right_side()),
                ),
            },
        );
        graph.set_root(join).unwrap();
        let mut qsu = apply_provenance(graph).unwrap();

        minimize_auto_joins(&mut qsu).unwrap();

        match qsu.graph.node(join).unwrap() {
            QScriptUniform::MultiLeftShift {
                source,
                shifts,
                repair,
            } => {
                assert_eq!(*source, base);
                assert_eq!(shifts.len(), 2);
                assert_eq!(
                    repair,
                    &concat_maps(
                        make_map_s("city", FreeMap::Leaf(MultiShiftTarget::Shifted(0))),
                        make_map_s("pop", FreeMap::Leaf(MultiShiftTarget::Shifted(1))),
                    )
                );
            }
            other => panic!("expected a multi shift, got {}", other.description()),
        }
    }

    #[test]
    fn map_folds_into_a_shift_repair() {
        let mut names = NameGenerator::new();
        let mut graph = zips(&mut names);
        let base = graph.root();
        let mapped = graph.add_node(
            &mut names,
            QScriptUniform::Map {
                source: base,
                func: project_key_s(hole(), "state"),
            },
        );
        let shift = graph.add_node(
            &mut names,
            QScriptUniform::LeftShift {
                source: base,
                structure: project_key_s(hole(), "cities"),
                id_status: IdStatus::ExcludeId,
                rotation: Rotation::ShiftArray,
                repair: right_target(),
            },
        );
        let join = graph.add_node(
            &mut names,
            QScriptUniform::AutoJoin {
                left: mapped,
                right: shift,
                combine: concat_maps(
                    make_map_s("state", left_side()),
                    make_map_s("city", right_side()),
                ),
            },
        );
        graph.set_root(join).unwrap();
        let mut qsu = apply_provenance(graph).unwrap();

        minimize_auto_joins(&mut qsu).unwrap();

        match qsu.graph.node(join).unwrap() {
            QScriptUniform::LeftShift { repair, .. } => {
                assert_eq!(
                    repair,
                    &concat_maps(
                        make_map_s(
                            "state",
                            project_key_s(left_target(), "state")
                        ),
                        make_map_s("city", right_target()),
                    )
                );
            }
            other => panic!("expected a left shift, got {}", other.description()),
        }
    }

    #[test]
    fn unrelated_arms_are_left_for_reification() {
        let mut names = NameGenerator::new();
        let mut graph = zips(&mut names);
        let base = graph.root();
        let filtered = graph.add_node(
            &mut names,
            QScriptUniform::Filter {
                source: base,
                predicate: eq(project_key_s(hole(), "state"), str_lit("CO")),
            },
        );
        let join = graph.add_node(
            &mut names,
            QScriptUniform::AutoJoin {
                left: base,
                right: filtered,
                combine: left_side(),
            },
        );
        graph.set_root(join).unwrap();
        let mut qsu = apply_provenance(graph).unwrap();

        minimize_auto_joins(&mut qsu).unwrap();
        assert!(matches!(
            qsu.graph.node(join).unwrap(),
            QScriptUniform::AutoJoin { .. }
        ));
    }
}
