//! Schema node representation.
//!
//! A [`SchemaNode`] describes one field of a schema document. Container
//! nodes (objects and arrays) only hold the ids of their children; the nodes
//! themselves live in the owning [`SchemaTree`](crate::tree::SchemaTree)
//! arena.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::formula::Formula;

const NODE_ID_ALPHABET: &[char] = &[
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'j',
    'k', 'm', 'n', 'p', 'q', 'r', 's', 't', 'v', 'w', 'x', 'y', 'z',
];
const NODE_ID_LENGTH: usize = 16;

/// Stable identity of a node, preserved across clones of its tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Wraps an explicit id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mints a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(nanoid::nanoid!(NODE_ID_LENGTH, NODE_ID_ALPHABET))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&NodeId> for NodeId {
    fn from(id: &NodeId) -> Self {
        id.clone()
    }
}

/// The variant tag of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Object with named fields.
    Object,
    /// Array with a single element schema.
    Array,
    /// String field.
    String,
    /// Number field.
    Number,
    /// Boolean field.
    Boolean,
    /// Unresolved `$ref`.
    Ref,
}

impl NodeType {
    /// Returns the JSON Schema type keyword for this variant.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Ref => "ref",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive metadata shared by every node kind.
///
/// A node without metadata carries `Metadata::default()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Metadata {
    /// Human-readable title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the field is deprecated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<bool>,
}

impl Metadata {
    /// Creates empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the title.
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the deprecation flag.
    #[must_use]
    pub fn deprecated(mut self, deprecated: bool) -> Self {
        self.deprecated = Some(deprecated);
        self
    }

    /// Returns true if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.deprecated.is_none()
    }
}

/// Default value of a primitive field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    /// String default.
    String(String),
    /// Numeric default (integer or float, preserved as written).
    Number(Number),
    /// Boolean default.
    Boolean(bool),
}

impl DefaultValue {
    /// Converts to a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Number(n) => Value::Number(n.clone()),
            Self::Boolean(b) => Value::Bool(*b),
        }
    }
}

impl From<&str> for DefaultValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for DefaultValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for DefaultValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for DefaultValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<i32> for DefaultValue {
    fn from(value: i32) -> Self {
        Self::Number(i64::from(value).into())
    }
}

impl From<Number> for DefaultValue {
    fn from(value: Number) -> Self {
        Self::Number(value)
    }
}

/// Attributes shared by string, number and boolean fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimitiveFields {
    /// Default value.
    pub default: Option<DefaultValue>,
    /// Computed-field formula.
    pub formula: Option<Formula>,
}

/// Attributes of a string field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringFields {
    /// Default and formula.
    pub primitive: PrimitiveFields,
    /// Referenced table for foreign-key fields.
    pub foreign_key: Option<String>,
    /// Media type of encoded content (e.g. `text/markdown`).
    pub content_media_type: Option<String>,
}

/// Variant payload of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Object with ordered, uniquely named children.
    Object {
        /// Child ids in declaration order.
        children: Vec<NodeId>,
        /// `$ref` provenance, if resolved from a reference.
        ref_uri: Option<String>,
    },
    /// Array with one element schema.
    Array {
        /// Id of the element schema node.
        items: NodeId,
        /// `$ref` provenance, if resolved from a reference.
        ref_uri: Option<String>,
    },
    /// String field.
    String(StringFields),
    /// Number field.
    Number(PrimitiveFields),
    /// Boolean field.
    Boolean(PrimitiveFields),
    /// Unresolved reference.
    Ref {
        /// Target URI.
        uri: String,
    },
}

/// A single node of a schema tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaNode {
    id: NodeId,
    name: String,
    metadata: Metadata,
    kind: NodeKind,
}

impl SchemaNode {
    fn with_kind(kind: NodeKind) -> Self {
        Self {
            id: NodeId::generate(),
            name: String::new(),
            metadata: Metadata::default(),
            kind,
        }
    }

    /// Creates an empty object node.
    #[must_use]
    pub fn object() -> Self {
        Self::with_kind(NodeKind::Object {
            children: Vec::new(),
            ref_uri: None,
        })
    }

    /// Creates a string node.
    #[must_use]
    pub fn string() -> Self {
        Self::with_kind(NodeKind::String(StringFields::default()))
    }

    /// Creates a number node.
    #[must_use]
    pub fn number() -> Self {
        Self::with_kind(NodeKind::Number(PrimitiveFields::default()))
    }

    /// Creates a boolean node.
    #[must_use]
    pub fn boolean() -> Self {
        Self::with_kind(NodeKind::Boolean(PrimitiveFields::default()))
    }

    /// Creates an unresolved `$ref` node.
    #[must_use]
    pub fn reference(uri: impl Into<String>) -> Self {
        Self::with_kind(NodeKind::Ref { uri: uri.into() })
    }

    pub(crate) fn array(items: NodeId) -> Self {
        Self::with_kind(NodeKind::Array {
            items,
            ref_uri: None,
        })
    }

    /// Sets an explicit id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = id.into();
        self
    }

    /// Replaces the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Sets the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.metadata.title = Some(title.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = Some(description.into());
        self
    }

    /// Sets the deprecation flag.
    #[must_use]
    pub fn with_deprecated(mut self, deprecated: bool) -> Self {
        self.metadata.deprecated = Some(deprecated);
        self
    }

    /// Sets the default value. Ignored on non-primitive nodes.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<DefaultValue>) -> Self {
        self.set_default(Some(value.into()));
        self
    }

    /// Sets the formula. Ignored on non-primitive nodes.
    #[must_use]
    pub fn with_formula(mut self, formula: Formula) -> Self {
        self.set_formula(Some(formula));
        self
    }

    /// Sets the foreign-key target. Ignored on non-string nodes.
    #[must_use]
    pub fn with_foreign_key(mut self, table: impl Into<String>) -> Self {
        self.set_foreign_key(Some(table.into()));
        self
    }

    /// Sets the content media type. Ignored on non-string nodes.
    #[must_use]
    pub fn with_content_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.set_content_media_type(Some(media_type.into()));
        self
    }

    /// Records `$ref` provenance on an object or array. Ignored otherwise.
    #[must_use]
    pub fn with_ref(mut self, uri: impl Into<String>) -> Self {
        self.set_ref(Some(uri.into()));
        self
    }

    /// Returns the node id.
    #[must_use]
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Returns the local field name (empty for items and the root).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the metadata.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Returns the variant payload.
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Returns the variant tag.
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        match self.kind {
            NodeKind::Object { .. } => NodeType::Object,
            NodeKind::Array { .. } => NodeType::Array,
            NodeKind::String(_) => NodeType::String,
            NodeKind::Number(_) => NodeType::Number,
            NodeKind::Boolean(_) => NodeType::Boolean,
            NodeKind::Ref { .. } => NodeType::Ref,
        }
    }

    /// Returns true for objects.
    #[must_use]
    pub fn is_object(&self) -> bool {
        matches!(self.kind, NodeKind::Object { .. })
    }

    /// Returns true for arrays.
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self.kind, NodeKind::Array { .. })
    }

    /// Returns true for objects and arrays.
    #[must_use]
    pub fn is_container(&self) -> bool {
        self.is_object() || self.is_array()
    }

    /// Child ids of an object, empty for every other kind.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Object { children, .. } => children,
            _ => &[],
        }
    }

    /// Element schema id of an array.
    #[must_use]
    pub fn items(&self) -> Option<&NodeId> {
        match &self.kind {
            NodeKind::Array { items, .. } => Some(items),
            _ => None,
        }
    }

    fn primitive(&self) -> Option<&PrimitiveFields> {
        match &self.kind {
            NodeKind::String(fields) => Some(&fields.primitive),
            NodeKind::Number(fields) | NodeKind::Boolean(fields) => Some(fields),
            _ => None,
        }
    }

    fn primitive_mut(&mut self) -> Option<&mut PrimitiveFields> {
        match &mut self.kind {
            NodeKind::String(fields) => Some(&mut fields.primitive),
            NodeKind::Number(fields) | NodeKind::Boolean(fields) => Some(fields),
            _ => None,
        }
    }

    /// Default value of a primitive.
    #[must_use]
    pub fn default_value(&self) -> Option<&DefaultValue> {
        self.primitive().and_then(|p| p.default.as_ref())
    }

    /// Formula of a primitive.
    #[must_use]
    pub fn formula(&self) -> Option<&Formula> {
        self.primitive().and_then(|p| p.formula.as_ref())
    }

    /// Foreign-key target of a string.
    #[must_use]
    pub fn foreign_key(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::String(fields) => fields.foreign_key.as_deref(),
            _ => None,
        }
    }

    /// Content media type of a string.
    #[must_use]
    pub fn content_media_type(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::String(fields) => fields.content_media_type.as_deref(),
            _ => None,
        }
    }

    /// `$ref` URI of a ref node, or the provenance of an object/array.
    #[must_use]
    pub fn ref_uri(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Ref { uri } => Some(uri),
            NodeKind::Object { ref_uri, .. } | NodeKind::Array { ref_uri, .. } => {
                ref_uri.as_deref()
            }
            _ => None,
        }
    }

    /// Replaces the metadata.
    pub fn set_metadata(&mut self, metadata: Metadata) {
        self.metadata = metadata;
    }

    /// Sets or clears the default value of a primitive.
    pub fn set_default(&mut self, value: Option<DefaultValue>) {
        if let Some(primitive) = self.primitive_mut() {
            primitive.default = value;
        }
    }

    /// Sets or clears the formula of a primitive.
    pub fn set_formula(&mut self, formula: Option<Formula>) {
        if let Some(primitive) = self.primitive_mut() {
            primitive.formula = formula;
        }
    }

    /// Sets or clears the foreign-key target of a string.
    pub fn set_foreign_key(&mut self, table: Option<String>) {
        if let NodeKind::String(fields) = &mut self.kind {
            fields.foreign_key = table;
        }
    }

    /// Sets or clears the content media type of a string.
    pub fn set_content_media_type(&mut self, media_type: Option<String>) {
        if let NodeKind::String(fields) = &mut self.kind {
            fields.content_media_type = media_type;
        }
    }

    /// Sets or clears `$ref` provenance on an object or array.
    pub fn set_ref(&mut self, uri: Option<String>) {
        match &mut self.kind {
            NodeKind::Object { ref_uri, .. } | NodeKind::Array { ref_uri, .. } => *ref_uri = uri,
            NodeKind::Ref { uri: current } => {
                if let Some(uri) = uri {
                    *current = uri;
                }
            }
            _ => {}
        }
    }

    pub(crate) fn set_id(&mut self, id: NodeId) {
        self.id = id;
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        match &mut self.kind {
            NodeKind::Object { children, .. } => Some(children),
            _ => None,
        }
    }

    pub(crate) fn set_items(&mut self, id: NodeId) {
        if let NodeKind::Array { items, .. } = &mut self.kind {
            *items = id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = NodeId::generate();
        let b = NodeId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), NODE_ID_LENGTH);
    }

    #[test]
    fn test_string_only_attributes() {
        let string = SchemaNode::string()
            .with_foreign_key("users")
            .with_content_media_type("text/markdown");
        assert_eq!(string.foreign_key(), Some("users"));
        assert_eq!(string.content_media_type(), Some("text/markdown"));

        let number = SchemaNode::number().with_foreign_key("users");
        assert_eq!(number.foreign_key(), None);
    }

    #[test]
    fn test_defaults_keep_numeric_form() {
        let node = SchemaNode::number().with_default(0);
        assert_eq!(
            node.default_value().map(DefaultValue::to_value),
            Some(serde_json::json!(0))
        );

        let object = SchemaNode::object().with_default("ignored");
        assert_eq!(object.default_value(), None);
    }

    #[test]
    fn test_metadata_builder() {
        let node = SchemaNode::string()
            .with_title("Name")
            .with_description("Full name")
            .with_deprecated(true);
        assert_eq!(
            node.metadata(),
            &Metadata::new()
                .title("Name")
                .description("Full name")
                .deprecated(true)
        );
        assert!(SchemaNode::string().metadata().is_empty());
    }

    #[test]
    fn test_node_type_tags() {
        assert_eq!(SchemaNode::object().node_type(), NodeType::Object);
        assert_eq!(SchemaNode::boolean().node_type().as_str(), "boolean");
        assert_eq!(SchemaNode::reference("#/defs/a").ref_uri(), Some("#/defs/a"));
    }
}
