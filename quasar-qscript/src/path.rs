use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// The location of a collection in the backing store, as a sequence of path
/// segments rooted at the datasource root.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TablePath {
    segments: Vec<String>,
}

impl TablePath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TablePath {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// A path with no segments. Reads from it are rejected by the pipeline
    /// with [`PlannerError::NoFilePathFound`].
    ///
    /// [`PlannerError::NoFilePathFound`]: quasar_errors::PlannerError::NoFilePathFound
    pub fn root() -> Self {
        TablePath { segments: vec![] }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl From<&str> for TablePath {
    /// Parses a `/`-separated path; empty segments are dropped, so `"/"`
    /// parses to the root path.
    fn from(s: &str) -> Self {
        TablePath::new(s.split('/').filter(|seg| !seg.is_empty()))
    }
}

impl fmt::Display for TablePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.iter().join("/"))
    }
}
