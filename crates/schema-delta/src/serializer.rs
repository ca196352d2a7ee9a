//! Rendering schema trees as JSON Schema documents.

use std::collections::HashSet;

use serde_json::{json, Map, Value};
use tracing::warn;

use crate::formula::{FieldRefFormulaSerializer, Formula, FormulaSerializer, FORMULA_VERSION};
use crate::node::{NodeId, NodeKind, SchemaNode};
use crate::tree::SchemaTree;

/// Options for a serialization pass.
#[derive(Debug, Clone, Default)]
pub struct SerializeOptions {
    exclude_node_ids: HashSet<NodeId>,
}

impl SerializeOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Leaves the node with this id (and its subtree) out of the output.
    #[must_use]
    pub fn with_excluded(mut self, id: impl Into<NodeId>) -> Self {
        self.exclude_node_ids.insert(id.into());
        self
    }

    /// Leaves every listed node out of the output.
    #[must_use]
    pub fn with_excluded_ids(mut self, ids: impl IntoIterator<Item = NodeId>) -> Self {
        self.exclude_node_ids.extend(ids);
        self
    }

    /// Returns true if `id` is excluded.
    #[must_use]
    pub fn excludes(&self, id: &NodeId) -> bool {
        self.exclude_node_ids.contains(id)
    }

    /// The excluded ids.
    #[must_use]
    pub fn exclude_node_ids(&self) -> &HashSet<NodeId> {
        &self.exclude_node_ids
    }
}

/// Turns tree nodes into schema document fragments.
///
/// Implementations must be deterministic and free of side effects: the
/// differ compares their output to decide whether a replace is needed.
pub trait SchemaSerializer {
    /// Serializes the subtree rooted at `id`.
    ///
    /// Returns `None` if the node is unknown or excluded.
    fn serialize_node(
        &self,
        tree: &SchemaTree,
        id: &NodeId,
        options: &SerializeOptions,
    ) -> Option<Value>;

    /// Canonical, non-failing text of a formula owned by `id`.
    fn formula_expression(&self, tree: &SchemaTree, id: &NodeId, formula: &Formula) -> String;

    /// Serializes the whole tree.
    fn serialize_tree(&self, tree: &SchemaTree) -> Value {
        self.serialize_node(tree, tree.root_id(), &SerializeOptions::default())
            .unwrap_or(Value::Null)
    }
}

/// JSON Schema renderer.
///
/// Objects render as `{"type":"object","properties":{..}}`, arrays as
/// `{"type":"array","items":{..}}`, and anything carrying `$ref` provenance
/// as `{"$ref": uri}`. Computed fields carry an `x-formula` block.
#[derive(Debug, Clone, Default)]
pub struct JsonSchemaSerializer<F: FormulaSerializer = FieldRefFormulaSerializer> {
    formulas: F,
}

impl JsonSchemaSerializer {
    /// Creates a serializer with the default formula renderer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<F: FormulaSerializer> JsonSchemaSerializer<F> {
    /// Creates a serializer with a custom formula renderer.
    #[must_use]
    pub const fn with_formula_serializer(formulas: F) -> Self {
        Self { formulas }
    }

    /// The formula renderer in use.
    pub const fn formula_serializer(&self) -> &F {
        &self.formulas
    }

    fn render(&self, tree: &SchemaTree, node: &SchemaNode, options: &SerializeOptions) -> Value {
        let mut out = Map::new();

        if let Some(uri) = node.ref_uri() {
            out.insert("$ref".to_string(), json!(uri));
        } else {
            out.insert("type".to_string(), json!(node.node_type().as_str()));
            match node.kind() {
                NodeKind::Object { children, .. } => {
                    let mut properties = Map::new();
                    for child_id in children {
                        let Some(child) = tree.node(child_id) else {
                            continue;
                        };
                        if options.excludes(child_id) {
                            continue;
                        }
                        properties.insert(
                            child.name().to_string(),
                            self.render(tree, child, options),
                        );
                    }
                    out.insert("properties".to_string(), Value::Object(properties));
                }
                NodeKind::Array { items, .. } => {
                    if let Some(items_node) = tree.node(items) {
                        if !options.excludes(items) {
                            out.insert("items".to_string(), self.render(tree, items_node, options));
                        }
                    }
                }
                NodeKind::String(fields) => {
                    if let Some(table) = &fields.foreign_key {
                        out.insert("foreignKey".to_string(), json!(table));
                    }
                    if let Some(media_type) = &fields.content_media_type {
                        out.insert("contentMediaType".to_string(), json!(media_type));
                    }
                }
                NodeKind::Number(_) | NodeKind::Boolean(_) | NodeKind::Ref { .. } => {}
            }
            if let Some(default) = node.default_value() {
                out.insert("default".to_string(), default.to_value());
            }
            if let Some(formula) = node.formula() {
                out.insert(
                    "x-formula".to_string(),
                    json!({
                        "version": FORMULA_VERSION,
                        "expression": self.formula_expression(tree, node.id(), formula),
                    }),
                );
            }
        }

        let metadata = node.metadata();
        if let Some(title) = &metadata.title {
            out.insert("title".to_string(), json!(title));
        }
        if let Some(description) = &metadata.description {
            out.insert("description".to_string(), json!(description));
        }
        if let Some(deprecated) = metadata.deprecated {
            out.insert("deprecated".to_string(), json!(deprecated));
        }
        Value::Object(out)
    }
}

impl<F: FormulaSerializer> SchemaSerializer for JsonSchemaSerializer<F> {
    fn serialize_node(
        &self,
        tree: &SchemaTree,
        id: &NodeId,
        options: &SerializeOptions,
    ) -> Option<Value> {
        if options.excludes(id) {
            return None;
        }
        let node = tree.node(id)?;
        Some(self.render(tree, node, options))
    }

    fn formula_expression(&self, tree: &SchemaTree, id: &NodeId, formula: &Formula) -> String {
        match self.formulas.serialize_expression(tree, id, formula, false) {
            Ok(text) => text,
            Err(err) => {
                warn!(node = %id, error = %err, "formula serialization failed, using raw source");
                formula.source()
            }
        }
    }
}
