//! Graphviz rendering of intermediate graphs, for the debug sink.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

use crate::graph::QsuGraph;

pub struct GraphVizzed<'a, T: ?Sized>(&'a T);

impl<'a, T> fmt::Display for GraphVizzed<'a, T>
where
    T: GraphViz,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.graphviz_fmt(f)
    }
}

struct Sanitized<T>(T);

impl<T> fmt::Display for Sanitized<T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        lazy_static! {
            static ref SANITIZE_RE: Regex = Regex::new("([<>{}|])").unwrap();
        };
        write!(
            f,
            "{}",
            SANITIZE_RE.replace_all(&self.0.to_string(), "\\$1")
        )
    }
}

pub trait GraphViz {
    fn graphviz_fmt(&self, f: &mut fmt::Formatter) -> fmt::Result;
    fn to_graphviz(&self) -> GraphVizzed<Self> {
        GraphVizzed(self)
    }
}

impl GraphViz for QsuGraph {
    fn graphviz_fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("digraph {\n")?;
        f.write_str("node [shape=record, fontsize=10]\n")?;
        let mut nodes: Vec<_> = self.iter().collect();
        nodes.sort_by_key(|(sym, _)| *sym);
        for (sym, pattern) in &nodes {
            let marker = if *sym == self.root() { " (root)" } else { "" };
            writeln!(
                f,
                "\"{}\" [label=\"{{ {}{} | {} }}\"]",
                sym,
                sym,
                marker,
                Sanitized(pattern.description()),
            )?;
        }
        for (sym, pattern) in &nodes {
            for source in pattern.sources() {
                writeln!(f, "\"{}\" -> \"{}\"", source, sym)?;
            }
        }
        f.write_str("}\n")
    }
}
