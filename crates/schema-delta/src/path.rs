//! Paths into a schema document.
//!
//! A [`SchemaPath`] addresses a node by the chain of object fields and array
//! item schemas leading to it. It renders as a JSON Pointer into the schema
//! document itself, so the field `name` of the root object is
//! `/properties/name` and the element schema of an array field `tags` is
//! `/properties/tags/items`. There are no numeric segments: the document
//! describes shapes, not data.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};

const PROPERTIES: &str = "properties";
const ITEMS: &str = "items";

/// One step in a [`SchemaPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathSegment {
    /// A named field of an object node.
    Property(String),
    /// The element schema of an array node.
    Items,
}

impl PathSegment {
    /// Creates a property segment.
    #[must_use]
    pub fn property(name: impl Into<String>) -> Self {
        Self::Property(name.into())
    }

    fn write_pointer(&self, out: &mut String) {
        match self {
            Self::Property(name) => {
                out.push('/');
                out.push_str(PROPERTIES);
                out.push('/');
                out.push_str(&escape_token(name));
            }
            Self::Items => {
                out.push('/');
                out.push_str(ITEMS);
            }
        }
    }
}

/// An immutable location of a node inside a schema tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaPath {
    segments: Vec<PathSegment>,
}

impl SchemaPath {
    /// The root path (empty pointer).
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Builds a path from its segments.
    #[must_use]
    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    /// Returns the segments.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns true for the root path.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns a new path extended by one segment.
    #[must_use]
    pub fn child(&self, segment: PathSegment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }

    /// Returns a new path extended by a property segment.
    #[must_use]
    pub fn property(&self, name: impl Into<String>) -> Self {
        self.child(PathSegment::Property(name.into()))
    }

    /// Returns a new path extended by the items segment.
    #[must_use]
    pub fn items(&self) -> Self {
        self.child(PathSegment::Items)
    }

    /// Returns the parent path, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Returns the last segment, or `None` for the root.
    #[must_use]
    pub fn last(&self) -> Option<&PathSegment> {
        self.segments.last()
    }

    /// Returns true if `self` lies strictly below `ancestor`.
    #[must_use]
    pub fn is_child_of(&self, ancestor: &Self) -> bool {
        self.segments.len() > ancestor.segments.len()
            && self.segments[..ancestor.segments.len()] == ancestor.segments[..]
    }

    /// Number of array boundaries crossed from the root.
    #[must_use]
    pub fn items_depth(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, PathSegment::Items))
            .count()
    }

    /// The name of the field this path points at.
    ///
    /// Item schemas and the root have no name of their own, so this returns
    /// the empty string for them.
    #[must_use]
    pub fn field_name(&self) -> &str {
        match self.segments.last() {
            Some(PathSegment::Property(name)) => name,
            _ => "",
        }
    }

    /// Renders the path as a JSON Pointer into the schema document.
    #[must_use]
    pub fn to_json_pointer(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            segment.write_pointer(&mut out);
        }
        out
    }

    /// Parses a schema-document JSON Pointer.
    ///
    /// Accepted tokens are `properties/<name>` pairs and `items`.
    pub fn from_json_pointer(pointer: &str) -> Result<Self> {
        let invalid = |reason: &str| SchemaError::InvalidPointer {
            pointer: pointer.to_string(),
            reason: reason.to_string(),
        };

        if pointer.is_empty() {
            return Ok(Self::root());
        }
        let Some(rest) = pointer.strip_prefix('/') else {
            return Err(invalid("pointer must start with '/'"));
        };

        let mut segments = Vec::new();
        let mut tokens = rest.split('/');
        while let Some(token) = tokens.next() {
            match token {
                PROPERTIES => {
                    let name = tokens
                        .next()
                        .ok_or_else(|| invalid("'properties' must be followed by a field name"))?;
                    segments.push(PathSegment::Property(unescape_token(name)));
                }
                ITEMS => segments.push(PathSegment::Items),
                other => return Err(invalid(&format!("unexpected token '{other}'"))),
            }
        }
        Ok(Self { segments })
    }
}

impl fmt::Display for SchemaPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json_pointer())
    }
}

impl FromStr for SchemaPath {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_json_pointer(s)
    }
}

/// Escapes one JSON Pointer reference token (RFC 6901).
#[must_use]
pub fn escape_token(token: &str) -> String {
    if !token.contains('~') && !token.contains('/') {
        return token.to_string();
    }
    token.replace('~', "~0").replace('/', "~1")
}

/// Unescapes one JSON Pointer reference token (RFC 6901).
#[must_use]
pub fn unescape_token(token: &str) -> String {
    if !token.contains('~') {
        return token.to_string();
    }
    token.replace("~1", "/").replace("~0", "~")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_pointer_is_empty() {
        assert_eq!(SchemaPath::root().to_json_pointer(), "");
        assert_eq!(SchemaPath::from_json_pointer("").unwrap(), SchemaPath::root());
    }

    #[test]
    fn test_pointer_rendering() {
        let path = SchemaPath::root().property("tags").items().property("label");
        assert_eq!(
            path.to_json_pointer(),
            "/properties/tags/items/properties/label"
        );
        assert_eq!(path.to_string(), path.to_json_pointer());
    }

    #[test]
    fn test_pointer_round_trip_with_escaping() {
        let path = SchemaPath::root().property("a/b").property("c~d");
        let pointer = path.to_json_pointer();
        assert_eq!(pointer, "/properties/a~1b/properties/c~0d");
        assert_eq!(SchemaPath::from_json_pointer(&pointer).unwrap(), path);
    }

    #[test]
    fn test_malformed_pointers() {
        for bad in ["properties/x", "/properties", "/0", "/items/oops"] {
            assert!(
                matches!(
                    SchemaPath::from_json_pointer(bad),
                    Err(SchemaError::InvalidPointer { .. })
                ),
                "expected failure for {bad}"
            );
        }
    }

    #[test]
    fn test_parent_and_child_queries() {
        let parent = SchemaPath::root().property("address");
        let child = parent.property("street");

        assert_eq!(child.parent(), Some(parent.clone()));
        assert!(child.is_child_of(&parent));
        assert!(child.is_child_of(&SchemaPath::root()));
        assert!(!parent.is_child_of(&parent));
        assert!(!parent.is_child_of(&child));
        assert_eq!(SchemaPath::root().parent(), None);
    }

    #[test]
    fn test_field_name_and_items_depth() {
        let path = SchemaPath::root().property("matrix").items().items();
        assert_eq!(path.items_depth(), 2);
        assert_eq!(path.field_name(), "");
        assert_eq!(SchemaPath::root().property("age").field_name(), "age");
    }
}
