//! Provenance: which input identities contribute to the rows of each node.
//!
//! Every symbol in a graph is assigned a [`Provenance`] polynomial once
//! [`apply_provenance`] has run; the mapping ([`QAuth`]) travels with the
//! graph through the remaining passes as an [`AuthenticatedQsu`]. Passes
//! that add or replace nodes are responsible for recording provenance for
//! what they emit; the driver checks domain coverage after every
//! provenance-carrying pass.
//!
//! [`apply_provenance`]: crate::rewrite::apply_provenance

use std::collections::HashMap;

use quasar_errors::{PlannerError, PlannerResult};
use quasar_qscript::{QScriptUniform, Rotation, Symbol, TablePath, UniformBranch, Value};
use serde::{Deserialize, Serialize};

use crate::graph::{QsuGraph, QsuPattern};

/// A polynomial of identity accesses and structural projections describing
/// the origin coordinates of a row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    /// No identity contributes (constants and sentinels).
    Nada,
    /// The base identity introduced by reading the collection at `path`.
    Source(TablePath),
    /// The identity axis introduced by the shift node named `symbol`.
    Shift { symbol: Symbol, rotation: Rotation },
    /// A structural projection of an identity.
    Project { key: Value, of: Box<Provenance> },
    /// Identities multiplied by a join.
    Both(Box<Provenance>, Box<Provenance>),
    /// Identities merged by a union.
    OneOf(Box<Provenance>, Box<Provenance>),
    /// A new axis sequenced on top of an existing origin.
    Then(Box<Provenance>, Box<Provenance>),
}

impl Provenance {
    pub fn both(a: Provenance, b: Provenance) -> Provenance {
        Provenance::Both(Box::new(a), Box::new(b))
    }

    pub fn one_of(a: Provenance, b: Provenance) -> Provenance {
        Provenance::OneOf(Box::new(a), Box::new(b))
    }

    pub fn then(axis: Provenance, origin: Provenance) -> Provenance {
        Provenance::Then(Box::new(axis), Box::new(origin))
    }

    pub fn project(key: Value, of: Provenance) -> Provenance {
        Provenance::Project {
            key,
            of: Box::new(of),
        }
    }
}

/// The per-symbol provenance map.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QAuth {
    provenance: HashMap<Symbol, Provenance>,
}

impl QAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records (or replaces) the provenance of `sym`.
    pub fn record(&mut self, sym: Symbol, prov: Provenance) {
        self.provenance.insert(sym, prov);
    }

    pub fn lookup(&self, sym: Symbol) -> PlannerResult<&Provenance> {
        self.provenance
            .get(&sym)
            .ok_or_else(|| PlannerError::ProvenanceInvariantViolated {
                symbol: sym.to_string(),
            })
    }

    pub fn contains(&self, sym: Symbol) -> bool {
        self.provenance.contains_key(&sym)
    }

    /// Checks that every symbol reachable from the graph root has an
    /// entry: the invariant every post-provenance pass must preserve.
    pub fn validate_covers(&self, graph: &QsuGraph) -> PlannerResult<()> {
        for sym in graph.reachable_symbols() {
            self.lookup(sym)?;
        }
        Ok(())
    }
}

/// Computes the provenance of one pattern node named `at`, looking up its
/// sources in `auth`.
pub fn pattern_provenance(
    at: Symbol,
    pattern: &QsuPattern,
    auth: &QAuth,
) -> PlannerResult<Provenance> {
    use QScriptUniform::*;
    Ok(match pattern {
        Read { path } | ShiftedRead { path, .. } => Provenance::Source(path.clone()),
        Map { source, .. }
        | Filter { source, .. }
        | Sort { source, .. }
        | Distinct { source } => auth.lookup(*source)?.clone(),
        LeftShift {
            source, rotation, ..
        } => Provenance::then(
            Provenance::Shift {
                symbol: at,
                rotation: *rotation,
            },
            auth.lookup(*source)?.clone(),
        ),
        MultiLeftShift { source, shifts, .. } => {
            let mut prov = auth.lookup(*source)?.clone();
            for spec in shifts {
                prov = Provenance::then(
                    Provenance::Shift {
                        symbol: at,
                        rotation: spec.rotation,
                    },
                    prov,
                );
            }
            prov
        }
        Reduce {
            source, buckets, ..
        } => {
            let origin = auth.lookup(*source)?;
            bucket_provenance(buckets.len(), origin)
        }
        Subset { source, from, .. } => {
            let input = auth.lookup(*source)?.clone();
            branch_provenance(at, from, &input)
        }
        Union {
            source,
            left,
            right,
        } => {
            let input = auth.lookup(*source)?.clone();
            Provenance::one_of(
                branch_provenance(at, left, &input),
                branch_provenance(at, right, &input),
            )
        }
        ThetaJoin {
            source,
            left,
            right,
            ..
        }
        | EquiJoin {
            source,
            left,
            right,
            ..
        } => {
            let input = auth.lookup(*source)?.clone();
            Provenance::both(
                branch_provenance(at, left, &input),
                branch_provenance(at, right, &input),
            )
        }
        AutoJoin { left, right, .. } => {
            Provenance::both(auth.lookup(*left)?.clone(), auth.lookup(*right)?.clone())
        }
        Root | Unreferenced => Provenance::Nada,
    })
}

/// Provenance of a branch sub-plan whose hole carries `input`. Shift axes
/// inside branches are tagged with the enclosing node's symbol.
pub fn branch_provenance(at: Symbol, branch: &UniformBranch, input: &Provenance) -> Provenance {
    use QScriptUniform::*;
    match branch {
        UniformBranch::Hole => input.clone(),
        UniformBranch::Node(node) => match &**node {
            Read { path } | ShiftedRead { path, .. } => Provenance::Source(path.clone()),
            Map { source, .. }
            | Filter { source, .. }
            | Sort { source, .. }
            | Distinct { source } => branch_provenance(at, source, input),
            LeftShift {
                source, rotation, ..
            } => Provenance::then(
                Provenance::Shift {
                    symbol: at,
                    rotation: *rotation,
                },
                branch_provenance(at, source, input),
            ),
            MultiLeftShift { source, shifts, .. } => {
                let mut prov = branch_provenance(at, source, input);
                for spec in shifts {
                    prov = Provenance::then(
                        Provenance::Shift {
                            symbol: at,
                            rotation: spec.rotation,
                        },
                        prov,
                    );
                }
                prov
            }
            Reduce {
                source, buckets, ..
            } => bucket_provenance(buckets.len(), &branch_provenance(at, source, input)),
            Subset { source, from, .. } => {
                let inner = branch_provenance(at, source, input);
                branch_provenance(at, from, &inner)
            }
            Union {
                source,
                left,
                right,
            } => {
                let inner = branch_provenance(at, source, input);
                Provenance::one_of(
                    branch_provenance(at, left, &inner),
                    branch_provenance(at, right, &inner),
                )
            }
            ThetaJoin {
                source,
                left,
                right,
                ..
            }
            | EquiJoin {
                source,
                left,
                right,
                ..
            } => {
                let inner = branch_provenance(at, source, input);
                Provenance::both(
                    branch_provenance(at, left, &inner),
                    branch_provenance(at, right, &inner),
                )
            }
            AutoJoin { .. } => {
                // autojoins never occur inside branches: lowering rejects them
                Provenance::Nada
            }
            Root | Unreferenced => Provenance::Nada,
        },
    }
}

/// Reduces replace row provenance with the provenance of their buckets:
/// one integer-keyed projection per bucket, multiplied together, or `Nada`
/// for a global reduce.
fn bucket_provenance(buckets: usize, origin: &Provenance) -> Provenance {
    let mut terms = (0..buckets)
        .map(|i| Provenance::project(Value::Int(i as i64), origin.clone()));
    match terms.next() {
        None => Provenance::Nada,
        Some(first) => terms.fold(first, Provenance::both),
    }
}

/// A graph together with its provenance map; what the post-provenance
/// passes consume and produce.
#[derive(Debug)]
pub struct AuthenticatedQsu {
    pub graph: QsuGraph,
    pub auth: QAuth,
}

/// An [`AuthenticatedQsu`] with identity bookkeeping resolved, ready for
/// graduation. `identity_keys` names the in-band row key under which each
/// reified shift's identity travels.
#[derive(Debug)]
pub struct ResearchedQsu {
    pub graph: QsuGraph,
    pub auth: QAuth,
    pub identity_keys: HashMap<Symbol, String>,
}
