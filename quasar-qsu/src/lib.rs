//! The QScript compilation core: graph substrate, provenance, and the
//! normalizing pass pipeline.
//!
//! The entry point is [`lp_to_qscript`] (or [`compile`] without a debug
//! sink): it consumes a [`LogicalPlan`], threads it through the ordered
//! rewrite passes over the symbol-indexed [`QsuGraph`], and graduates the
//! result into the published [`EducatedPlan`] algebra. The host supplies
//! the [`NameGenerator`] — the single authority for fresh symbols — and
//! optionally a [`DebugSink`] that receives every intermediate graph.
//!
//! The core is a synchronous, purely functional transformation: its only
//! observable effects are fresh-symbol generation, accumulation into the
//! provenance map, and error signaling through [`PlannerResult`].
//!
//! [`LogicalPlan`]: quasar_lp::LogicalPlan
//! [`EducatedPlan`]: quasar_qscript::EducatedPlan
//! [`NameGenerator`]: quasar_qscript::NameGenerator
//! [`PlannerResult`]: quasar_errors::PlannerResult

pub mod graduate;
pub mod graph;
pub mod provenance;
pub mod rewrite;
pub mod visualize;

pub use graduate::load_educated;
pub use graph::{QsuGraph, QsuPattern};
pub use provenance::{AuthenticatedQsu, Provenance, QAuth, ResearchedQsu};
pub use rewrite::{compile, lp_to_qscript, DebugSink, NoopDebug};
pub use visualize::GraphViz;
