//! Annotating patch operations with schema-level meaning.

use tracing::warn;

use crate::collector::formula_text;
use crate::index::{NodePairing, NodePathIndex};
use crate::node::SchemaNode;
use crate::patch::{
    ContentMediaTypeChange, DefaultChange, DeprecatedChange, DescriptionChange, ForeignKeyChange,
    FormulaChange, JsonPatch, MetadataChangeKind, PatchOp, SchemaPatch, TypeChange,
};
use crate::path::SchemaPath;
use crate::serializer::SchemaSerializer;
use crate::tree::SchemaTree;

/// Computes [`SchemaPatch`] metadata for single operations.
pub struct PatchEnricher<'a, S: SchemaSerializer + ?Sized> {
    base: &'a SchemaTree,
    current: &'a SchemaTree,
    pairing: NodePairing,
    serializer: &'a S,
}

impl<'a, S: SchemaSerializer + ?Sized> PatchEnricher<'a, S> {
    /// Creates an enricher and derives the node pairing from `index`.
    pub fn new(
        base: &'a SchemaTree,
        current: &'a SchemaTree,
        index: &NodePathIndex,
        serializer: &'a S,
    ) -> Self {
        Self::with_pairing(base, current, NodePairing::new(base, current, index), serializer)
    }

    pub(crate) const fn with_pairing(
        base: &'a SchemaTree,
        current: &'a SchemaTree,
        pairing: NodePairing,
        serializer: &'a S,
    ) -> Self {
        Self {
            base,
            current,
            pairing,
            serializer,
        }
    }

    /// Enriches an operation, resolving its nodes from the pointers.
    ///
    /// Malformed pointers are tolerated: the result then carries an empty
    /// field name and no node-derived metadata.
    #[must_use]
    pub fn enrich(&self, patch: &JsonPatch) -> SchemaPatch {
        let path = parse_pointer(&patch.path);
        let from = patch.from.as_deref().and_then(parse_pointer);

        let (base, current) = match patch.op {
            PatchOp::Remove => (path.as_ref().and_then(|p| self.base.node_at(p)), None),
            PatchOp::Add => (None, path.as_ref().and_then(|p| self.current.node_at(p))),
            PatchOp::Move | PatchOp::Replace => {
                let current = path.as_ref().and_then(|p| self.current.node_at(p));
                let partner = current
                    .and_then(|node| self.pairing.partner_in_base(node.id()))
                    .and_then(|id| self.base.node(id));
                let fallback = || {
                    from.as_ref()
                        .or(path.as_ref())
                        .and_then(|p| self.base.node_at(p))
                };
                (partner.or_else(fallback), current)
            }
        };
        self.enrich_nodes(patch, base, current)
    }

    /// Enriches an operation whose nodes are already known.
    #[must_use]
    pub fn enrich_nodes(
        &self,
        patch: &JsonPatch,
        base: Option<&SchemaNode>,
        current: Option<&SchemaNode>,
    ) -> SchemaPatch {
        let path = parse_pointer(&patch.path);
        let field_name = path
            .as_ref()
            .map(|p| p.field_name().to_string())
            .unwrap_or_default();
        let mut out = SchemaPatch::bare(patch.clone(), field_name);

        match patch.op {
            PatchOp::Remove => {}
            PatchOp::Add => {
                if let Some(current) = current {
                    self.attribute_changes(&mut out, None, current);
                }
            }
            PatchOp::Move => {
                let from = patch.from.as_deref().and_then(parse_pointer);
                let (is_rename, moves_into_array) = match (&from, &path) {
                    (Some(from), Some(to)) => (
                        from.parent() == to.parent(),
                        to.items_depth() > from.items_depth(),
                    ),
                    _ => (false, false),
                };
                out.is_rename = Some(is_rename);
                out.moves_into_array = Some(moves_into_array);

                if let (Some(base), Some(current)) = (base, current) {
                    let before = formula_text(self.serializer, self.base, base);
                    let after = formula_text(self.serializer, self.current, current);
                    if before != after {
                        out.formula_change = Some(FormulaChange {
                            from_formula: before,
                            to_formula: after,
                        });
                    }
                }
            }
            PatchOp::Replace => {
                if let Some(current) = current {
                    if let Some(base) = base {
                        if base.node_type() != current.node_type() {
                            out.type_change = Some(TypeChange {
                                from_type: base.node_type(),
                                to_type: current.node_type(),
                            });
                        }
                    }
                    self.attribute_changes(&mut out, base, current);
                }
            }
        }
        out
    }

    /// Fills every attribute change between `base` (or nothing) and
    /// `current`, and lists the kinds that changed.
    fn attribute_changes(
        &self,
        out: &mut SchemaPatch,
        base: Option<&SchemaNode>,
        current: &SchemaNode,
    ) {
        let before_formula = base.and_then(|b| formula_text(self.serializer, self.base, b));
        let after_formula = formula_text(self.serializer, self.current, current);
        if before_formula != after_formula {
            out.formula_change = Some(FormulaChange {
                from_formula: before_formula,
                to_formula: after_formula,
            });
            out.metadata_changes.push(MetadataChangeKind::Formula);
        }

        let before_default = base.and_then(SchemaNode::default_value).map(|d| d.to_value());
        let after_default = current.default_value().map(|d| d.to_value());
        if before_default != after_default {
            out.default_change = Some(DefaultChange {
                from_default: before_default,
                to_default: after_default,
            });
            out.metadata_changes.push(MetadataChangeKind::Default);
        }

        let before_description = base.and_then(|b| b.metadata().description.clone());
        let after_description = current.metadata().description.clone();
        if before_description != after_description {
            out.description_change = Some(DescriptionChange {
                from_description: before_description,
                to_description: after_description,
            });
            out.metadata_changes.push(MetadataChangeKind::Description);
        }

        let before_deprecated = base.and_then(|b| b.metadata().deprecated);
        let after_deprecated = current.metadata().deprecated;
        if before_deprecated != after_deprecated {
            out.deprecated_change = Some(DeprecatedChange {
                from_deprecated: before_deprecated,
                to_deprecated: after_deprecated,
            });
            out.metadata_changes.push(MetadataChangeKind::Deprecated);
        }

        let before_foreign_key = base.and_then(SchemaNode::foreign_key).map(str::to_string);
        let after_foreign_key = current.foreign_key().map(str::to_string);
        if before_foreign_key != after_foreign_key {
            out.foreign_key_change = Some(ForeignKeyChange {
                from_foreign_key: before_foreign_key,
                to_foreign_key: after_foreign_key,
            });
            out.metadata_changes.push(MetadataChangeKind::ForeignKey);
        }

        let before_media_type = base
            .and_then(SchemaNode::content_media_type)
            .map(str::to_string);
        let after_media_type = current.content_media_type().map(str::to_string);
        if before_media_type != after_media_type {
            out.content_media_type_change = Some(ContentMediaTypeChange {
                from_content_media_type: before_media_type,
                to_content_media_type: after_media_type,
            });
            out.metadata_changes.push(MetadataChangeKind::ContentMediaType);
        }
    }
}

fn parse_pointer(pointer: &str) -> Option<SchemaPath> {
    match SchemaPath::from_json_pointer(pointer) {
        Ok(path) => Some(path),
        Err(err) => {
            warn!(pointer, error = %err, "cannot resolve patch pointer");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::Formula;
    use crate::node::NodeType;
    use crate::serializer::JsonSchemaSerializer;
    use serde_json::json;

    fn enrich(base: &SchemaTree, current: &SchemaTree, patch: &JsonPatch) -> SchemaPatch {
        let serializer = JsonSchemaSerializer::new();
        let index = NodePathIndex::build(base, current);
        PatchEnricher::new(base, current, &index, &serializer).enrich(patch)
    }

    fn invoice() -> SchemaTree {
        SchemaTree::object()
            .with_field("price", SchemaNode::number().with_id("price"))
            .with_field(
                "total",
                SchemaNode::number()
                    .with_id("total")
                    .with_formula(Formula::new().field("price").text(" * 2")),
            )
    }

    #[test]
    fn test_add_reports_from_nothing() {
        let base = invoice();
        let current = base.clone().with_field(
            "note",
            SchemaNode::string()
                .with_default("n/a")
                .with_description("Free text"),
        );
        let patch = enrich(
            &base,
            &current,
            &JsonPatch::add("/properties/note", json!({ "type": "string" })),
        );

        assert_eq!(patch.field_name, "note");
        assert_eq!(
            patch.default_change,
            Some(DefaultChange {
                from_default: None,
                to_default: Some(json!("n/a")),
            })
        );
        assert_eq!(
            patch.metadata_changes,
            vec![MetadataChangeKind::Default, MetadataChangeKind::Description]
        );
        assert!(patch.type_change.is_none());
    }

    #[test]
    fn test_remove_has_field_name_only() {
        let base = invoice();
        let mut current = base.clone();
        current
            .remove_node_at(&SchemaPath::root().property("total"))
            .unwrap();
        let patch = enrich(&base, &current, &JsonPatch::remove("/properties/total"));
        assert_eq!(patch.field_name, "total");
        assert!(patch.is_bare());
    }

    #[test]
    fn test_rename_surfaces_formula_change() {
        let base = invoice();
        let mut current = base.clone();
        current
            .rename_node(&SchemaPath::root().property("price"), "cost")
            .unwrap();

        let patch = enrich(
            &base,
            &current,
            &JsonPatch::relocate("/properties/price", "/properties/cost"),
        );
        assert_eq!(patch.is_rename, Some(true));
        assert_eq!(patch.moves_into_array, Some(false));
        assert!(patch.formula_change.is_none());

        let patch = enrich(
            &base,
            &current,
            &JsonPatch::replace("/properties/total", json!({})),
        );
        assert_eq!(
            patch.formula_change,
            Some(FormulaChange {
                from_formula: Some("price * 2".into()),
                to_formula: Some("cost * 2".into()),
            })
        );
        assert_eq!(patch.metadata_changes, vec![MetadataChangeKind::Formula]);
    }

    #[test]
    fn test_move_into_array() {
        let base = SchemaTree::object()
            .with_field("tag", SchemaNode::string().with_id("tag"))
            .with_field("list", SchemaTree::array(SchemaNode::string()));
        let mut current = base.clone();
        current
            .move_node(
                &SchemaPath::root().property("tag"),
                &SchemaPath::root().property("list").items(),
            )
            .unwrap();

        let patch = enrich(
            &base,
            &current,
            &JsonPatch::relocate("/properties/tag", "/properties/list/items"),
        );
        assert_eq!(patch.is_rename, Some(false));
        assert_eq!(patch.moves_into_array, Some(true));
        assert_eq!(patch.field_name, "");
    }

    #[test]
    fn test_replace_reports_type_change() {
        let base = SchemaTree::object().with_field("age", SchemaNode::string().with_id("a"));
        let mut current = base.clone();
        current
            .set_node_at(
                &SchemaPath::root().property("age"),
                SchemaNode::number().with_id("b"),
            )
            .unwrap();
        current.track_replacement("a", "b");

        let patch = enrich(
            &base,
            &current,
            &JsonPatch::replace("/properties/age", json!({ "type": "number" })),
        );
        assert_eq!(
            patch.type_change,
            Some(TypeChange {
                from_type: NodeType::String,
                to_type: NodeType::Number,
            })
        );
        assert!(patch.metadata_changes.is_empty());
    }

    #[test]
    fn test_malformed_pointer_falls_back() {
        let base = invoice();
        let patch = enrich(&base, &base.clone(), &JsonPatch::relocate("bogus", "/nope"));
        assert_eq!(patch.field_name, "");
        assert_eq!(patch.is_rename, Some(false));
        assert_eq!(patch.moves_into_array, Some(false));
    }
}
