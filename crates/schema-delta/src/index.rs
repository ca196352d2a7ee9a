//! Identity bookkeeping between two tree versions.
//!
//! [`NodePathIndex`] freezes where every base node lived when a diff started,
//! together with the replacement table recorded on the current tree.
//! [`NodePairing`] turns that into the concrete base/current correspondence
//! every later stage works from.

use std::collections::HashMap;

use tracing::warn;

use crate::node::NodeId;
use crate::path::SchemaPath;
use crate::tree::SchemaTree;

/// Frozen id-to-path map of the base tree plus the replacement table.
#[derive(Debug, Clone, Default)]
pub struct NodePathIndex {
    base_paths: HashMap<NodeId, SchemaPath>,
    replacements: HashMap<NodeId, NodeId>,
}

impl NodePathIndex {
    /// Indexes a base tree with an empty replacement table.
    #[must_use]
    pub fn new(base: &SchemaTree) -> Self {
        let base_paths = base
            .node_ids()
            .filter_map(|id| base.path_of(id).map(|path| (id.clone(), path)))
            .collect();
        Self {
            base_paths,
            replacements: HashMap::new(),
        }
    }

    /// Indexes `base` and snapshots the replacements recorded on `current`.
    #[must_use]
    pub fn build(base: &SchemaTree, current: &SchemaTree) -> Self {
        let mut index = Self::new(base);
        index.replacements = current.replacements().clone();
        index
    }

    /// Path of a base node when the index was built.
    #[must_use]
    pub fn path_of(&self, id: &NodeId) -> Option<&SchemaPath> {
        self.base_paths.get(id)
    }

    /// Records `new_id` as the successor of `old_id`. Last write wins.
    pub fn track_replacement(&mut self, old_id: impl Into<NodeId>, new_id: impl Into<NodeId>) {
        let old_id = old_id.into();
        let new_id = new_id.into();
        for target in self.replacements.values_mut() {
            if *target == old_id {
                *target = new_id.clone();
            }
        }
        self.replacements.insert(old_id, new_id);
    }

    /// The recorded successor of `old_id`, if any.
    #[must_use]
    pub fn replacement_node_id(&self, old_id: &NodeId) -> Option<&NodeId> {
        self.replacements.get(old_id)
    }

    /// Number of indexed base nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.base_paths.len()
    }

    /// Returns true if no base node is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.base_paths.is_empty()
    }
}

/// One-to-one correspondence between base and current nodes.
#[derive(Debug, Clone, Default)]
pub struct NodePairing {
    base_to_current: HashMap<NodeId, NodeId>,
    current_to_base: HashMap<NodeId, NodeId>,
}

impl NodePairing {
    /// Derives the pairing.
    ///
    /// The roots pair first unless one of them also lives in the other
    /// tree (a wrapped or unwrapped root), in which case that id pairs with
    /// itself instead. Nodes present in both trees pair by id next, and only
    /// then do replacement entries pair a base-only node with a current-only
    /// node. Entries whose ends are missing or already claimed are ignored,
    /// so the nodes fall back to a plain remove and add.
    #[must_use]
    pub fn new(base: &SchemaTree, current: &SchemaTree, index: &NodePathIndex) -> Self {
        let mut pairing = Self::default();
        let (base_root, current_root) = (base.root_id(), current.root_id());
        let root_relocated = base_root != current_root
            && (base.contains(current_root) || current.contains(base_root));
        if !root_relocated {
            pairing.pair(base_root, current_root);
        }

        for id in base.node_ids() {
            if current.contains(id) && !pairing.is_claimed(id, id) {
                pairing.pair(id, id);
            }
        }

        for old_id in base.node_ids() {
            let Some(new_id) = index.replacement_node_id(old_id) else {
                continue;
            };
            if pairing.base_to_current.contains_key(old_id) {
                continue;
            }
            if !current.contains(new_id) || pairing.current_to_base.contains_key(new_id) {
                warn!(
                    old = %old_id,
                    new = %new_id,
                    "ignoring replacement entry whose successor is missing or already paired"
                );
                continue;
            }
            pairing.pair(old_id, new_id);
        }
        pairing
    }

    fn is_claimed(&self, base_id: &NodeId, current_id: &NodeId) -> bool {
        self.base_to_current.contains_key(base_id) || self.current_to_base.contains_key(current_id)
    }

    fn pair(&mut self, base_id: &NodeId, current_id: &NodeId) {
        self.base_to_current
            .insert(base_id.clone(), current_id.clone());
        self.current_to_base
            .insert(current_id.clone(), base_id.clone());
    }

    /// Partner of a base node in the current tree.
    #[must_use]
    pub fn partner_in_current(&self, base_id: &NodeId) -> Option<&NodeId> {
        self.base_to_current.get(base_id)
    }

    /// Partner of a current node in the base tree.
    #[must_use]
    pub fn partner_in_base(&self, current_id: &NodeId) -> Option<&NodeId> {
        self.current_to_base.get(current_id)
    }

    /// Number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.base_to_current.len()
    }

    /// Returns true if nothing is paired.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.base_to_current.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::SchemaNode;

    fn tree() -> SchemaTree {
        SchemaTree::object()
            .with_id("root")
            .with_field("a", SchemaNode::string().with_id("a"))
            .with_field("b", SchemaNode::string().with_id("b"))
    }

    #[test]
    fn test_index_snapshots_base_paths() {
        let base = tree();
        let mut current = base.clone();
        current
            .rename_node(&SchemaPath::root().property("a"), "z")
            .unwrap();

        let index = NodePathIndex::build(&base, &current);
        assert_eq!(index.len(), 3);
        assert_eq!(
            index.path_of(&"a".into()).unwrap().to_json_pointer(),
            "/properties/a"
        );
    }

    #[test]
    fn test_index_replacement_last_write_wins() {
        let mut index = NodePathIndex::new(&tree());
        index.track_replacement("a", "x");
        index.track_replacement("a", "y");
        assert_eq!(index.replacement_node_id(&"a".into()), Some(&NodeId::from("y")));
    }

    #[test]
    fn test_pairing_by_id_and_replacement() {
        let base = tree();
        let mut current = base.clone();
        let path = SchemaPath::root().property("a");
        current
            .set_node_at(&path, SchemaNode::number().with_id("a2"))
            .unwrap();
        current.track_replacement("a", "a2");

        let index = NodePathIndex::build(&base, &current);
        let pairing = NodePairing::new(&base, &current, &index);

        assert_eq!(pairing.len(), 3);
        assert_eq!(pairing.partner_in_current(&"a".into()), Some(&NodeId::from("a2")));
        assert_eq!(pairing.partner_in_base(&"b".into()), Some(&NodeId::from("b")));
    }

    #[test]
    fn test_unwrapped_root_pairs_by_id() {
        let base = SchemaTree::array(SchemaNode::string().with_id("item")).with_id("list");
        let mut current = base.clone();
        current.unwrap_array(&SchemaPath::root()).unwrap();

        let pairing = NodePairing::new(&base, &current, &NodePathIndex::build(&base, &current));
        assert_eq!(pairing.partner_in_current(&"item".into()), Some(&NodeId::from("item")));
        assert!(pairing.partner_in_current(&"list".into()).is_none());
        assert_eq!(pairing.len(), 1);
    }

    #[test]
    fn test_roots_pair_when_unrelated() {
        let base = tree();
        let current = SchemaTree::object().with_id("other-root");
        let pairing = NodePairing::new(&base, &current, &NodePathIndex::new(&base));
        assert_eq!(
            pairing.partner_in_current(&"root".into()),
            Some(&NodeId::from("other-root"))
        );
    }

    #[test]
    fn test_dangling_replacement_is_ignored() {
        let base = tree();
        let mut current = base.clone();
        current.track_replacement("a", "missing");

        let index = NodePathIndex::build(&base, &current);
        let pairing = NodePairing::new(&base, &current, &index);
        assert_eq!(pairing.partner_in_current(&"a".into()), Some(&NodeId::from("a")));
        assert!(pairing.partner_in_base(&"missing".into()).is_none());
    }
}
