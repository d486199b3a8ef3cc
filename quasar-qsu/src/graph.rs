//! The graph view of a plan under rewrite.
//!
//! A [`QsuGraph`] maps every [`Symbol`] to a pattern node — a
//! [`QScriptUniform`] layer whose child positions carry only symbols — plus
//! a designated root. Duplicate subtrees share nodes; the lowering pass is
//! responsible for that sharing, the graph only preserves it.
//!
//! # Invariants
//!
//! - every symbol referenced by any pattern is present in the map,
//! - the graph is acyclic,
//! - the root reaches every symbol (passes prune after they rewire).
//!
//! [`validate`](QsuGraph::validate) checks all three and is run by the
//! pipeline driver between passes.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use quasar_errors::{internal, PlannerError, PlannerResult};
use quasar_qscript::{NameGenerator, QScriptUniform, Symbol};
use serde::{Deserialize, Serialize};

/// A pattern node: one operator layer whose children are symbols.
pub type QsuPattern = QScriptUniform<Symbol>;

/// A symbol-indexed plan DAG with a designated root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QsuGraph {
    vertices: HashMap<Symbol, QsuPattern>,
    root: Symbol,
}

impl QsuGraph {
    /// Allocates a fresh symbol for `pattern` and returns the
    /// singleton-rooted graph containing it.
    pub fn with_name(names: &mut NameGenerator, pattern: QsuPattern) -> QsuGraph {
        let root = names.fresh();
        let mut vertices = HashMap::new();
        vertices.insert(root, pattern);
        QsuGraph { vertices, root }
    }

    /// Assembles a graph from parts, checking the reference invariant.
    pub fn from_parts(
        vertices: HashMap<Symbol, QsuPattern>,
        root: Symbol,
    ) -> PlannerResult<QsuGraph> {
        let graph = QsuGraph { vertices, root };
        graph.validate()?;
        Ok(graph)
    }

    pub fn root(&self) -> Symbol {
        self.root
    }

    /// Re-roots the graph. The new root must be present.
    pub fn set_root(&mut self, root: Symbol) -> PlannerResult<()> {
        if !self.vertices.contains_key(&root) {
            return Err(unresolved(root));
        }
        self.root = root;
        Ok(())
    }

    pub fn contains(&self, sym: Symbol) -> bool {
        self.vertices.contains_key(&sym)
    }

    /// The pattern at `sym`.
    pub fn node(&self, sym: Symbol) -> PlannerResult<&QsuPattern> {
        self.vertices.get(&sym).ok_or_else(|| unresolved(sym))
    }

    /// Installs `pattern` under a fresh symbol and returns it.
    ///
    /// This is `with_name` followed by a merge into `self`, fused.
    pub fn add_node(&mut self, names: &mut NameGenerator, pattern: QsuPattern) -> Symbol {
        let sym = names.fresh();
        self.vertices.insert(sym, pattern);
        sym
    }

    /// Replaces the pattern at `sym`, returning the old pattern. Other
    /// nodes and edges are unchanged.
    pub fn overwrite(&mut self, sym: Symbol, pattern: QsuPattern) -> PlannerResult<QsuPattern> {
        match self.vertices.get_mut(&sym) {
            Some(slot) => Ok(std::mem::replace(slot, pattern)),
            None => Err(unresolved(sym)),
        }
    }

    /// Replaces the root's pattern.
    pub fn overwrite_at_root(&mut self, pattern: QsuPattern) -> PlannerResult<QsuPattern> {
        self.overwrite(self.root, pattern)
    }

    /// Disjoint-symbol union of two graphs, keeping `self`'s root.
    ///
    /// Coincident symbols must carry identical patterns; a collision with
    /// differing patterns is an internal error, since symbols are only
    /// minted by one generator per run.
    pub fn merge(&mut self, other: QsuGraph) -> PlannerResult<()> {
        for (sym, pattern) in other.vertices {
            match self.vertices.get(&sym) {
                None => {
                    self.vertices.insert(sym, pattern);
                }
                Some(existing) if *existing == pattern => {}
                Some(existing) => internal!(
                    "symbol {} already bound to {} while merging {}",
                    sym,
                    existing.description(),
                    pattern.description()
                ),
            }
        }
        Ok(())
    }

    /// Every symbol in the graph, sources before their consumers.
    ///
    /// Fails if the graph has a cycle, which no pass is allowed to create.
    pub fn topo_symbols(&self) -> PlannerResult<Vec<Symbol>> {
        let mut dep_graph = DiGraph::<Symbol, ()>::new();
        let mut indices = HashMap::new();
        for &sym in self.vertices.keys() {
            indices.insert(sym, dep_graph.add_node(sym));
        }
        for (&sym, pattern) in &self.vertices {
            for &source in pattern.sources() {
                let from = indices.get(&source).ok_or_else(|| unresolved(source))?;
                dep_graph.add_edge(*from, indices[&sym], ());
            }
        }
        match toposort(&dep_graph, None) {
            Ok(order) => Ok(order.into_iter().map(|idx| dep_graph[idx]).collect()),
            Err(cycle) => {
                internal!("plan graph has a cycle through {}", dep_graph[cycle.node_id()])
            }
        }
    }

    /// The reverse adjacency: for each symbol, the symbols whose patterns
    /// reference it. Refreshed by callers whenever they change structure.
    pub fn reverse_index(&self) -> HashMap<Symbol, Vec<Symbol>> {
        let mut rev: HashMap<Symbol, Vec<Symbol>> = HashMap::new();
        for (&sym, pattern) in &self.vertices {
            for &source in pattern.sources() {
                rev.entry(source).or_default().push(sym);
            }
        }
        rev
    }

    /// The symbols reachable from the root through source references.
    pub fn reachable_symbols(&self) -> HashSet<Symbol> {
        let mut seen = HashSet::new();
        let mut stack = vec![self.root];
        while let Some(sym) = stack.pop() {
            if seen.insert(sym) {
                if let Some(pattern) = self.vertices.get(&sym) {
                    stack.extend(pattern.sources().into_iter().copied());
                }
            }
        }
        seen
    }

    /// Drops every node the root no longer reaches. Passes call this after
    /// rewiring references.
    pub fn prune_unreachable(&mut self) {
        let reachable = self.reachable_symbols();
        self.vertices.retain(|sym, _| reachable.contains(sym));
    }

    /// Rewrites every reference to `from` into a reference to `to`,
    /// including the root.
    pub fn rename_references(&mut self, from: Symbol, to: Symbol) {
        for pattern in self.vertices.values_mut() {
            let rewired = std::mem::replace(pattern, QScriptUniform::Unreferenced)
                .map_sources(|sym| if sym == from { to } else { sym });
            *pattern = rewired;
        }
        if self.root == from {
            self.root = to;
        }
    }

    /// Bottom-up rewrite: visits every node sources-first and replaces its
    /// pattern wherever `f` returns one. Returns whether anything changed.
    ///
    /// Termination is guaranteed by acyclicity; `f` must not introduce new
    /// symbols (use explicit [`add_node`](QsuGraph::add_node) loops for
    /// structural rewrites).
    pub fn rewrite_nodes<F>(&mut self, mut f: F) -> PlannerResult<bool>
    where
        F: FnMut(Symbol, &QsuPattern) -> PlannerResult<Option<QsuPattern>>,
    {
        let mut changed = false;
        for sym in self.topo_symbols()? {
            // unwrap is fine: topo_symbols only returns installed symbols
            let pattern = self.vertices.get(&sym).ok_or_else(|| unresolved(sym))?;
            if let Some(replacement) = f(sym, pattern)? {
                self.vertices.insert(sym, replacement);
                changed = true;
            }
        }
        Ok(changed)
    }

    /// Checks the graph invariants: no dangling references, acyclicity,
    /// and root reachability of every installed symbol.
    pub fn validate(&self) -> PlannerResult<()> {
        if !self.vertices.contains_key(&self.root) {
            return Err(unresolved(self.root));
        }
        for pattern in self.vertices.values() {
            for &source in pattern.sources() {
                if !self.vertices.contains_key(&source) {
                    return Err(unresolved(source));
                }
            }
        }
        // also detects cycles
        self.topo_symbols()?;
        let reachable = self.reachable_symbols();
        for &sym in self.vertices.keys() {
            if !reachable.contains(&sym) {
                internal!("symbol {} is not reachable from the root", sym);
            }
        }
        Ok(())
    }

    /// Iterates over all `(symbol, pattern)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (Symbol, &QsuPattern)> {
        self.vertices.iter().map(|(sym, pattern)| (*sym, pattern))
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

fn unresolved(sym: Symbol) -> PlannerError {
    PlannerError::UnresolvedReference {
        symbol: sym.to_string(),
    }
}
