//! Formula handles and their canonical text form.
//!
//! The formula language itself lives outside this crate. Here a [`Formula`]
//! is an opaque token list whose field references are bound to node ids, so
//! the differ can compare two formulas by the text they render to against
//! their respective trees. Renaming a referenced field changes that text even
//! though the formula's own node did not change.

use serde::{Deserialize, Serialize};

use crate::node::NodeId;
use crate::path::PathSegment;
use crate::tree::SchemaTree;

/// Version tag written next to serialized expressions.
pub const FORMULA_VERSION: u32 = 1;

/// Placeholder rendered for references that cannot be resolved in
/// non-strict mode.
pub const UNRESOLVED_REFERENCE: &str = "#unresolved";

/// Errors raised by strict formula serialization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormulaError {
    /// The formula's own node is not part of the tree.
    #[error("Formula owner '{0}' is not in the tree")]
    UnknownOwner(NodeId),

    /// A referenced field no longer exists.
    #[error("Formula on '{owner}' references missing field '{reference}'")]
    UnresolvedReference {
        /// The node carrying the formula.
        owner: NodeId,
        /// The dangling reference.
        reference: NodeId,
    },
}

/// One piece of a formula expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FormulaToken {
    /// Literal expression text (operators, numbers, function names).
    Text(String),
    /// A reference to another field, bound by identity.
    Field(NodeId),
}

/// An opaque formula handle attached to a primitive field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Formula {
    tokens: Vec<FormulaToken>,
}

impl Formula {
    /// Creates an empty formula.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a formula from literal text without references.
    #[must_use]
    pub fn expression(text: impl Into<String>) -> Self {
        Self::new().text(text)
    }

    /// Appends literal text.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.tokens.push(FormulaToken::Text(text.into()));
        self
    }

    /// Appends a reference to the field with the given id.
    #[must_use]
    pub fn field(mut self, id: impl Into<NodeId>) -> Self {
        self.tokens.push(FormulaToken::Field(id.into()));
        self
    }

    /// Returns the tokens.
    #[must_use]
    pub fn tokens(&self) -> &[FormulaToken] {
        &self.tokens
    }

    /// Ids of every referenced field, in order of appearance.
    pub fn references(&self) -> impl Iterator<Item = &NodeId> {
        self.tokens.iter().filter_map(|t| match t {
            FormulaToken::Field(id) => Some(id),
            FormulaToken::Text(_) => None,
        })
    }

    /// The raw source with references shown as `{id}`.
    ///
    /// Used as a last-resort rendering when the formula cannot be resolved
    /// against any tree.
    #[must_use]
    pub fn source(&self) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                FormulaToken::Text(text) => out.push_str(text),
                FormulaToken::Field(id) => {
                    out.push('{');
                    out.push_str(id.as_str());
                    out.push('}');
                }
            }
        }
        out
    }
}

/// Renders a formula to its canonical expression text.
pub trait FormulaSerializer {
    /// Serializes `formula`, owned by `node_id`, against `tree`.
    ///
    /// With `strict` unset this must not fail: unresolvable references
    /// degrade to a best-effort rendering.
    fn serialize_expression(
        &self,
        tree: &SchemaTree,
        node_id: &NodeId,
        formula: &Formula,
        strict: bool,
    ) -> Result<String, FormulaError>;
}

/// Default formula serializer.
///
/// A reference to a sibling field renders as its bare name; any other
/// reference renders as an absolute dotted path from the root, with `[*]`
/// marking array item schemas (`/orders[*].total`).
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldRefFormulaSerializer;

impl FieldRefFormulaSerializer {
    /// Creates the serializer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn render_reference(tree: &SchemaTree, owner: &NodeId, target: &NodeId) -> Option<String> {
        let path = tree.path_of(target)?;
        let owner_parent = tree.parent_of(owner).map(|p| p.id().clone());
        let target_parent = tree.parent_of(target).map(|p| p.id().clone());

        if owner_parent.is_some() && owner_parent == target_parent {
            if let Some(PathSegment::Property(name)) = path.last() {
                return Some(name.clone());
            }
        }

        let mut out = String::from("/");
        for segment in path.segments() {
            match segment {
                PathSegment::Property(name) => {
                    if !out.ends_with('/') {
                        out.push('.');
                    }
                    out.push_str(name);
                }
                PathSegment::Items => out.push_str("[*]"),
            }
        }
        Some(out)
    }
}

impl FormulaSerializer for FieldRefFormulaSerializer {
    fn serialize_expression(
        &self,
        tree: &SchemaTree,
        node_id: &NodeId,
        formula: &Formula,
        strict: bool,
    ) -> Result<String, FormulaError> {
        if strict && tree.node(node_id).is_none() {
            return Err(FormulaError::UnknownOwner(node_id.clone()));
        }

        let mut out = String::new();
        for token in formula.tokens() {
            match token {
                FormulaToken::Text(text) => out.push_str(text),
                FormulaToken::Field(target) => {
                    match Self::render_reference(tree, node_id, target) {
                        Some(rendered) => out.push_str(&rendered),
                        None if strict => {
                            return Err(FormulaError::UnresolvedReference {
                                owner: node_id.clone(),
                                reference: target.clone(),
                            });
                        }
                        None => out.push_str(UNRESOLVED_REFERENCE),
                    }
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::SchemaNode;
    use crate::path::SchemaPath;

    fn invoice_tree() -> SchemaTree {
        SchemaTree::object()
            .with_field("price", SchemaNode::number().with_id("price"))
            .with_field(
                "total",
                SchemaNode::number()
                    .with_id("total")
                    .with_formula(Formula::new().field("price").text(" * 2")),
            )
            .with_field(
                "address",
                SchemaTree::object().with_field("city", SchemaNode::string().with_id("city")),
            )
    }

    fn render(tree: &SchemaTree, formula: &Formula, strict: bool) -> Result<String, FormulaError> {
        FieldRefFormulaSerializer::new().serialize_expression(
            tree,
            &NodeId::from("total"),
            formula,
            strict,
        )
    }

    #[test]
    fn test_sibling_reference_renders_bare_name() {
        let tree = invoice_tree();
        let formula = Formula::new().field("price").text(" * 2");
        assert_eq!(render(&tree, &formula, true).unwrap(), "price * 2");
    }

    #[test]
    fn test_nested_reference_renders_absolute_path() {
        let tree = invoice_tree();
        let formula = Formula::new().text("upper(").field("city").text(")");
        assert_eq!(render(&tree, &formula, true).unwrap(), "upper(/address.city)");
    }

    #[test]
    fn test_rename_changes_rendered_text() {
        let mut tree = invoice_tree();
        let formula = Formula::new().field("price").text(" * 2");
        tree.rename_node(&SchemaPath::root().property("price"), "cost")
            .unwrap();
        assert_eq!(render(&tree, &formula, true).unwrap(), "cost * 2");
    }

    #[test]
    fn test_unresolved_reference() {
        let tree = invoice_tree();
        let formula = Formula::new().field("gone").text(" + 1");

        assert!(matches!(
            render(&tree, &formula, true),
            Err(FormulaError::UnresolvedReference { .. })
        ));
        assert_eq!(render(&tree, &formula, false).unwrap(), "#unresolved + 1");
    }

    #[test]
    fn test_source_shows_bound_ids() {
        let formula = Formula::new().field("a").text(" + ").field("b");
        assert_eq!(formula.source(), "{a} + {b}");
        assert_eq!(formula.references().count(), 2);
    }
}
