//! Initial provenance assignment.
//!
//! Computes an origin polynomial for every symbol, sources first, and
//! packages the graph and the resulting map as an [`AuthenticatedQsu`].
//! From here on every pass that emits a node must record its provenance.

use quasar_errors::PlannerResult;
use quasar_qscript::Symbol;
use tracing::instrument;

use crate::graph::QsuGraph;
use crate::provenance::{pattern_provenance, AuthenticatedQsu, QAuth};

#[instrument(skip_all)]
pub(crate) fn apply_provenance(graph: QsuGraph) -> PlannerResult<AuthenticatedQsu> {
    let mut auth = QAuth::new();
    for sym in graph.topo_symbols()? {
        let prov = pattern_provenance(sym, graph.node(sym)?, &auth)?;
        auth.record(sym, prov);
    }
    auth.validate_covers(&graph)?;
    Ok(AuthenticatedQsu { graph, auth })
}

/// Recomputes and records provenance for one (possibly replaced) node.
pub(crate) fn refresh(qsu: &mut AuthenticatedQsu, sym: Symbol) -> PlannerResult<()> {
    let prov = pattern_provenance(sym, qsu.graph.node(sym)?, &qsu.auth)?;
    qsu.auth.record(sym, prov);
    Ok(())
}
