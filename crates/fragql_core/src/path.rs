//! Response paths for field errors and incremental payloads.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A single segment of a response path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl From<String> for PathSegment {
    fn from(s: String) -> Self {
        Self::Field(s)
    }
}

impl From<&str> for PathSegment {
    fn from(s: &str) -> Self {
        Self::Field(s.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(i: usize) -> Self {
        Self::Index(i)
    }
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Field(name) => write!(f, "{}", name),
            Self::Index(i) => write!(f, "{}", i),
        }
    }
}

/// An immutable, singly-linked response path.
///
/// A node is created per nested field or list index and never mutated; a
/// child holds a back-reference to its parent, so sibling branches share
/// their common prefix.
#[derive(Debug)]
pub struct Path {
    segment: PathSegment,
    parent: Option<Arc<Path>>,
}

impl Path {
    /// Creates a path root with a single segment.
    pub fn root(segment: impl Into<PathSegment>) -> Arc<Self> {
        Arc::new(Self {
            segment: segment.into(),
            parent: None,
        })
    }

    /// Creates a child path node pointing back at `self`.
    pub fn child(self: &Arc<Self>, segment: impl Into<PathSegment>) -> Arc<Self> {
        Arc::new(Self {
            segment: segment.into(),
            parent: Some(Arc::clone(self)),
        })
    }

    /// Extends an optional parent path, starting a new root when absent.
    pub fn extend(parent: Option<&Arc<Self>>, segment: impl Into<PathSegment>) -> Arc<Self> {
        match parent {
            Some(p) => p.child(segment),
            None => Self::root(segment),
        }
    }

    /// The segment of this node.
    pub fn segment(&self) -> &PathSegment {
        &self.segment
    }

    /// The parent node, if any.
    pub fn parent(&self) -> Option<&Arc<Path>> {
        self.parent.as_ref()
    }

    /// Materializes the path from the root down to this node.
    pub fn to_segments(&self) -> Vec<PathSegment> {
        let mut segments = Vec::new();
        let mut current = Some(self);
        while let Some(node) = current {
            segments.push(node.segment.clone());
            current = node.parent.as_deref();
        }
        segments.reverse();
        segments
    }

    /// Materializes an optional path, yielding an empty vector for `None`.
    pub fn segments_of(path: Option<&Arc<Self>>) -> Vec<PathSegment> {
        path.map(|p| p.to_segments()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_segments() {
        let root = Path::root("film");
        let list = root.child(0usize);
        let leaf = list.child("title");

        assert_eq!(
            leaf.to_segments(),
            vec![
                PathSegment::Field("film".to_string()),
                PathSegment::Index(0),
                PathSegment::Field("title".to_string()),
            ]
        );
        // The sibling still sees the shared prefix untouched.
        assert_eq!(list.to_segments().len(), 2);
    }

    #[test]
    fn test_path_extend() {
        let root = Path::extend(None, "a");
        let child = Path::extend(Some(&root), "b");
        assert_eq!(
            child.to_segments(),
            vec![PathSegment::from("a"), PathSegment::from("b")]
        );
        assert_eq!(Path::segments_of(None), Vec::<PathSegment>::new());
    }

    #[test]
    fn test_segment_serialization() {
        let segments = vec![PathSegment::from("user"), PathSegment::from(3usize)];
        let json = serde_json::to_value(&segments).unwrap();
        assert_eq!(json, serde_json::json!(["user", 3]));
    }
}
