//! Change detection between two versions of a schema tree.
//!
//! The collector walks the current tree depth-first and classifies every
//! node against its partner in the base tree, then walks the base tree for
//! nodes that have no partner left.

use tracing::debug;

use crate::index::{NodePairing, NodePathIndex};
use crate::node::SchemaNode;
use crate::serializer::SchemaSerializer;
use crate::tree::SchemaTree;

/// A classified difference between base and current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change<'a> {
    /// A node exists only in the current tree.
    Added {
        /// The new node (topmost of its unpaired region).
        current: &'a SchemaNode,
    },
    /// A node exists only in the base tree.
    Removed {
        /// The dropped node (topmost of its unpaired region).
        base: &'a SchemaNode,
    },
    /// A paired node whose own fields differ.
    Modified {
        /// Node in the base tree.
        base: &'a SchemaNode,
        /// Node in the current tree.
        current: &'a SchemaNode,
    },
    /// A paired node that was renamed or reparented.
    Moved {
        /// Node in the base tree.
        base: &'a SchemaNode,
        /// Node in the current tree.
        current: &'a SchemaNode,
    },
}

/// Kind tag of a [`Change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
    Moved,
}

impl<'a> Change<'a> {
    /// The kind tag.
    #[must_use]
    pub const fn kind(&self) -> ChangeKind {
        match self {
            Self::Added { .. } => ChangeKind::Added,
            Self::Removed { .. } => ChangeKind::Removed,
            Self::Modified { .. } => ChangeKind::Modified,
            Self::Moved { .. } => ChangeKind::Moved,
        }
    }

    /// The base side, if any.
    #[must_use]
    pub const fn base(&self) -> Option<&'a SchemaNode> {
        match self {
            Self::Added { .. } => None,
            Self::Removed { base } | Self::Modified { base, .. } | Self::Moved { base, .. } => {
                Some(*base)
            }
        }
    }

    /// The current side, if any.
    #[must_use]
    pub const fn current(&self) -> Option<&'a SchemaNode> {
        match self {
            Self::Removed { .. } => None,
            Self::Added { current }
            | Self::Modified { current, .. }
            | Self::Moved { current, .. } => Some(*current),
        }
    }
}

/// Compares the node's own fields, ignoring children and items.
///
/// A pair with different ids (a tracked replacement) is never equal.
/// Formulas compare by their non-strict expression text, each rendered
/// against its own tree.
pub fn shallow_equal<S: SchemaSerializer + ?Sized>(
    serializer: &S,
    base_tree: &SchemaTree,
    base: &SchemaNode,
    current_tree: &SchemaTree,
    current: &SchemaNode,
) -> bool {
    if base.id() != current.id()
        || base.node_type() != current.node_type()
        || base.default_value() != current.default_value()
        || base.metadata() != current.metadata()
        || base.foreign_key() != current.foreign_key()
        || base.content_media_type() != current.content_media_type()
        || base.ref_uri() != current.ref_uri()
    {
        return false;
    }
    formula_text(serializer, base_tree, base) == formula_text(serializer, current_tree, current)
}

/// Non-strict expression text of a node's formula.
pub fn formula_text<S: SchemaSerializer + ?Sized>(
    serializer: &S,
    tree: &SchemaTree,
    node: &SchemaNode,
) -> Option<String> {
    node.formula()
        .map(|formula| serializer.formula_expression(tree, node.id(), formula))
}

/// Changes grouped by kind, each group in encounter order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoalescedChanges<'a> {
    pub added: Vec<Change<'a>>,
    pub removed: Vec<Change<'a>>,
    pub modified: Vec<Change<'a>>,
    pub moved: Vec<Change<'a>>,
}

impl<'a> CoalescedChanges<'a> {
    /// Total number of changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len() + self.moved.len()
    }

    /// Returns true if there is nothing to report.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> FromIterator<Change<'a>> for CoalescedChanges<'a> {
    fn from_iter<I: IntoIterator<Item = Change<'a>>>(iter: I) -> Self {
        let mut out = Self::default();
        for change in iter {
            match change.kind() {
                ChangeKind::Added => out.added.push(change),
                ChangeKind::Removed => out.removed.push(change),
                ChangeKind::Modified => out.modified.push(change),
                ChangeKind::Moved => out.moved.push(change),
            }
        }
        out
    }
}

/// Produces the flat change list for one base/current pair.
pub struct ChangeCollector<'a, S: SchemaSerializer + ?Sized> {
    base: &'a SchemaTree,
    current: &'a SchemaTree,
    pairing: NodePairing,
    serializer: &'a S,
}

impl<'a, S: SchemaSerializer + ?Sized> ChangeCollector<'a, S> {
    /// Creates a collector and derives the node pairing from `index`.
    pub fn new(
        base: &'a SchemaTree,
        current: &'a SchemaTree,
        index: &NodePathIndex,
        serializer: &'a S,
    ) -> Self {
        Self {
            base,
            current,
            pairing: NodePairing::new(base, current, index),
            serializer,
        }
    }

    /// The derived base/current pairing.
    #[must_use]
    pub const fn pairing(&self) -> &NodePairing {
        &self.pairing
    }

    /// Runs one pass and returns the changes in encounter order.
    #[must_use]
    pub fn collect(&self) -> Vec<Change<'a>> {
        let mut changes = Vec::new();

        for node in self.current.walk() {
            let Some(base) = self
                .pairing
                .partner_in_base(node.id())
                .and_then(|id| self.base.node(id))
            else {
                if self.is_topmost_unpaired_current(node) {
                    changes.push(Change::Added { current: node });
                }
                continue;
            };

            if self.is_moved(base, node) {
                changes.push(Change::Moved {
                    base,
                    current: node,
                });
            }
            if !shallow_equal(self.serializer, self.base, base, self.current, node) {
                changes.push(Change::Modified {
                    base,
                    current: node,
                });
            }
        }

        for node in self.base.walk() {
            if self.pairing.partner_in_current(node.id()).is_some() {
                continue;
            }
            let topmost = self
                .base
                .parent_id(node.id())
                .is_none_or(|parent| self.pairing.partner_in_current(parent).is_some());
            if topmost {
                changes.push(Change::Removed { base: node });
            }
        }

        debug!(
            changes = changes.len(),
            base_nodes = self.base.count_nodes(),
            current_nodes = self.current.count_nodes(),
            "collected schema changes"
        );
        changes
    }

    /// An unpaired root counts as topmost.
    fn is_topmost_unpaired_current(&self, node: &SchemaNode) -> bool {
        self.current
            .parent_id(node.id())
            .is_none_or(|parent| self.pairing.partner_in_base(parent).is_some())
    }

    fn is_moved(&self, base: &SchemaNode, current: &SchemaNode) -> bool {
        match (
            self.base.parent_id(base.id()),
            self.current.parent_id(current.id()),
        ) {
            (None, None) => false,
            (Some(base_parent), Some(current_parent)) => {
                base.name() != current.name()
                    || self.pairing.partner_in_current(base_parent) != Some(current_parent)
            }
            // crossed the root boundary
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Metadata;
    use crate::path::SchemaPath;
    use crate::serializer::JsonSchemaSerializer;

    fn kinds(base: &SchemaTree, current: &SchemaTree) -> Vec<(ChangeKind, String)> {
        let index = NodePathIndex::build(base, current);
        let serializer = JsonSchemaSerializer::new();
        ChangeCollector::new(base, current, &index, &serializer)
            .collect()
            .into_iter()
            .map(|change| {
                let node = change.current().or_else(|| change.base()).unwrap();
                (change.kind(), node.id().to_string())
            })
            .collect()
    }

    fn base() -> SchemaTree {
        SchemaTree::object()
            .with_id("root")
            .with_field("name", SchemaNode::string().with_id("name"))
            .with_field(
                "address",
                SchemaTree::object()
                    .with_id("address")
                    .with_field("city", SchemaNode::string().with_id("city")),
            )
    }

    #[test]
    fn test_identical_trees_have_no_changes() {
        let tree = base();
        assert!(kinds(&tree, &tree.clone()).is_empty());
    }

    #[test]
    fn test_rename_is_moved_only() {
        let base = base();
        let mut current = base.clone();
        current
            .rename_node(&SchemaPath::root().property("name"), "fullName")
            .unwrap();
        assert_eq!(kinds(&base, &current), vec![(ChangeKind::Moved, "name".into())]);
    }

    #[test]
    fn test_reparent_is_moved() {
        let base = base();
        let mut current = base.clone();
        current
            .move_node(
                &SchemaPath::root().property("name"),
                &SchemaPath::root().property("address").property("name"),
            )
            .unwrap();
        assert_eq!(kinds(&base, &current), vec![(ChangeKind::Moved, "name".into())]);
    }

    #[test]
    fn test_only_topmost_addition_and_removal_reported() {
        let base = base();
        let mut current = base.clone();
        current
            .remove_node_at(&SchemaPath::root().property("address"))
            .unwrap();
        current
            .add_child_to(
                &SchemaPath::root(),
                "meta",
                SchemaTree::object()
                    .with_id("meta")
                    .with_field("created", SchemaNode::string().with_id("created")),
            )
            .unwrap();

        assert_eq!(
            kinds(&base, &current),
            vec![
                (ChangeKind::Added, "meta".into()),
                (ChangeKind::Removed, "address".into()),
            ]
        );
    }

    #[test]
    fn test_paired_node_inside_added_region_is_classified() {
        let base = base();
        let mut current = base.clone();
        current
            .add_child_to(&SchemaPath::root(), "wrapper", SchemaTree::object().with_id("wrapper"))
            .unwrap();
        current
            .move_node(
                &SchemaPath::root().property("name"),
                &SchemaPath::root().property("wrapper").property("name"),
            )
            .unwrap();

        assert_eq!(
            kinds(&base, &current),
            vec![
                (ChangeKind::Added, "wrapper".into()),
                (ChangeKind::Moved, "name".into()),
            ]
        );
    }

    #[test]
    fn test_replacement_pair_is_modified_only() {
        let base = base();
        let mut current = base.clone();
        current
            .set_node_at(
                &SchemaPath::root().property("name"),
                SchemaNode::number().with_id("name2"),
            )
            .unwrap();
        current.track_replacement("name", "name2");
        assert_eq!(kinds(&base, &current), vec![(ChangeKind::Modified, "name2".into())]);
    }

    #[test]
    fn test_untracked_replacement_is_add_and_remove() {
        let base = base();
        let mut current = base.clone();
        current
            .set_node_at(
                &SchemaPath::root().property("name"),
                SchemaNode::number().with_id("name2"),
            )
            .unwrap();
        assert_eq!(
            kinds(&base, &current),
            vec![
                (ChangeKind::Added, "name2".into()),
                (ChangeKind::Removed, "name".into()),
            ]
        );
    }

    #[test]
    fn test_root_metadata_change_is_modified() {
        let base = base();
        let mut current = base.clone();
        let root = current.root_id().clone();
        current
            .update_node(&root, |node| {
                node.set_metadata(Metadata::new().description("People"));
            })
            .unwrap();
        assert_eq!(kinds(&base, &current), vec![(ChangeKind::Modified, "root".into())]);
    }

    #[test]
    fn test_unwrapped_root_moves_items_up() {
        let base = SchemaTree::array(SchemaNode::string().with_id("item")).with_id("list");
        let mut current = base.clone();
        current.unwrap_array(&SchemaPath::root()).unwrap();
        assert_eq!(
            kinds(&base, &current),
            vec![
                (ChangeKind::Moved, "item".into()),
                (ChangeKind::Removed, "list".into()),
            ]
        );
    }

    #[test]
    fn test_wrapped_root_is_added_above_old_root() {
        let base = base();
        let mut current = base.clone();
        let array = current.wrap_in_array(&SchemaPath::root()).unwrap();
        assert_eq!(
            kinds(&base, &current),
            vec![
                (ChangeKind::Added, array.to_string()),
                (ChangeKind::Moved, "root".into()),
            ]
        );
    }

    #[test]
    fn test_child_change_does_not_mark_parent() {
        let base = base();
        let mut current = base.clone();
        current
            .update_node(&"city".into(), |node| node.set_default(Some("Paris".into())))
            .unwrap();
        assert_eq!(kinds(&base, &current), vec![(ChangeKind::Modified, "city".into())]);
    }

    #[test]
    fn test_coalesce_groups_by_kind() {
        let base = base();
        let mut current = base.clone();
        current
            .rename_node(&SchemaPath::root().property("name"), "fullName")
            .unwrap();
        current
            .update_node(&"name".into(), |node| node.set_default(Some("x".into())))
            .unwrap();
        current
            .remove_node_at(&SchemaPath::root().property("address"))
            .unwrap();

        let index = NodePathIndex::build(&base, &current);
        let serializer = JsonSchemaSerializer::new();
        let grouped: CoalescedChanges<'_> = ChangeCollector::new(&base, &current, &index, &serializer)
            .collect()
            .into_iter()
            .collect();

        assert_eq!(grouped.len(), 3);
        assert_eq!(grouped.moved.len(), 1);
        assert_eq!(grouped.modified.len(), 1);
        assert_eq!(grouped.removed.len(), 1);
        assert!(grouped.added.is_empty());
    }
}
