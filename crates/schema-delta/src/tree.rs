//! The schema tree arena.
//!
//! A [`SchemaTree`] owns every node of one schema version in a map keyed by
//! [`NodeId`], with parent links kept alongside. Paths are never stored; they
//! are derived by walking parent links up to the root. Cloning a tree copies
//! every node and keeps every id, which is what lets a clone serve both as a
//! rollback point and as the baseline of a diff.

use std::collections::{HashMap, HashSet};

use crate::error::{Result, SchemaError};
use crate::node::{Metadata, NodeId, SchemaNode};
use crate::path::{PathSegment, SchemaPath};

#[derive(Debug, Clone)]
struct Slot {
    node: SchemaNode,
    parent: Option<NodeId>,
}

/// An owned schema tree with stable node identity.
#[derive(Debug, Clone)]
pub struct SchemaTree {
    root: NodeId,
    slots: HashMap<NodeId, Slot>,
    replacements: HashMap<NodeId, NodeId>,
}

impl Default for SchemaTree {
    fn default() -> Self {
        Self::object()
    }
}

impl From<SchemaNode> for SchemaTree {
    fn from(node: SchemaNode) -> Self {
        Self::new(node)
    }
}

impl SchemaTree {
    // ---------------------------------------------------------------
    // Construction
    // ---------------------------------------------------------------

    /// Creates a tree holding a single node.
    ///
    /// Objects start without children; use [`SchemaTree::with_field`] or the
    /// mutation API to populate them.
    #[must_use]
    pub fn new(mut root: SchemaNode) -> Self {
        root.set_name("");
        if let Some(children) = root.children_mut() {
            children.clear();
        }
        let id = root.id().clone();
        let mut slots = HashMap::new();
        slots.insert(id.clone(), Slot { node: root, parent: None });
        Self {
            root: id,
            slots,
            replacements: HashMap::new(),
        }
    }

    /// Creates a tree whose root is an empty object.
    #[must_use]
    pub fn object() -> Self {
        Self::new(SchemaNode::object())
    }

    /// Creates a tree whose root is an array of `items`.
    #[must_use]
    pub fn array(items: impl Into<Self>) -> Self {
        let items = items.into();
        let root = SchemaNode::array(items.root.clone());
        let id = root.id().clone();
        let mut tree = Self {
            root: id.clone(),
            slots: HashMap::new(),
            replacements: HashMap::new(),
        };
        tree.slots.insert(id.clone(), Slot { node: root, parent: None });
        tree.absorb(items, &id, "");
        tree
    }

    /// Re-keys the root node.
    ///
    /// # Panics
    ///
    /// Panics if another node of the tree already uses `id`.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        let id = id.into();
        if id == self.root {
            return self;
        }
        assert!(
            !self.slots.contains_key(&id),
            "node id '{id}' is already used in this tree"
        );
        let old = self.root.clone();
        self.rekey(&old, id);
        self
    }

    /// Replaces the root's metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        let root = self.root.clone();
        if let Some(slot) = self.slots.get_mut(&root) {
            slot.node.set_metadata(metadata);
        }
        self
    }

    /// Records `$ref` provenance on the root.
    #[must_use]
    pub fn with_ref(mut self, uri: impl Into<String>) -> Self {
        let root = self.root.clone();
        if let Some(slot) = self.slots.get_mut(&root) {
            slot.node.set_ref(Some(uri.into()));
        }
        self
    }

    /// Appends a field to the root object.
    ///
    /// # Panics
    ///
    /// Panics if the root is not an object, the name is taken, or the
    /// subtree reuses an id of this tree. Use [`SchemaTree::add_child_to`]
    /// for the fallible form.
    #[must_use]
    pub fn with_field(mut self, name: &str, subtree: impl Into<Self>) -> Self {
        if let Err(err) = self.add_child_to(&SchemaPath::root(), name, subtree) {
            panic!("cannot add field '{name}': {err}");
        }
        self
    }

    // ---------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------

    /// Returns the root id.
    #[must_use]
    pub fn root_id(&self) -> &NodeId {
        &self.root
    }

    /// Returns the root node.
    #[must_use]
    pub fn root(&self) -> &SchemaNode {
        &self.slots[&self.root].node
    }

    /// Looks up a node by id.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&SchemaNode> {
        self.slots.get(id).map(|slot| &slot.node)
    }

    /// Returns true if the tree contains a node with this id.
    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.slots.contains_key(id)
    }

    /// Looks up the node at a path.
    #[must_use]
    pub fn node_at(&self, path: &SchemaPath) -> Option<&SchemaNode> {
        let mut current = self.root();
        for segment in path.segments() {
            let next = match segment {
                PathSegment::Property(name) => self.child_named(current, name)?,
                PathSegment::Items => current.items()?,
            };
            current = self.node(next)?;
        }
        Some(current)
    }

    /// Derives the path of a node by walking up to the root.
    #[must_use]
    pub fn path_of(&self, id: &NodeId) -> Option<SchemaPath> {
        let mut segments = Vec::new();
        let mut current = id;
        loop {
            let slot = self.slots.get(current)?;
            let Some(parent) = &slot.parent else {
                break;
            };
            segments.push(self.segment_in(parent, &slot.node));
            current = parent;
        }
        segments.reverse();
        Some(SchemaPath::from_segments(segments))
    }

    /// Returns the segment under which a node hangs off its parent.
    #[must_use]
    pub fn segment_of(&self, id: &NodeId) -> Option<PathSegment> {
        let slot = self.slots.get(id)?;
        let parent = slot.parent.as_ref()?;
        Some(self.segment_in(parent, &slot.node))
    }

    fn segment_in(&self, parent: &NodeId, node: &SchemaNode) -> PathSegment {
        match self.node(parent) {
            Some(p) if p.is_array() => PathSegment::Items,
            _ => PathSegment::Property(node.name().to_string()),
        }
    }

    /// Returns the parent id of a node.
    #[must_use]
    pub fn parent_id(&self, id: &NodeId) -> Option<&NodeId> {
        self.slots.get(id)?.parent.as_ref()
    }

    /// Returns the parent node of a node.
    #[must_use]
    pub fn parent_of(&self, id: &NodeId) -> Option<&SchemaNode> {
        self.parent_id(id).and_then(|p| self.node(p))
    }

    /// Returns the children of an object, or the items of an array.
    #[must_use]
    pub fn children_of(&self, id: &NodeId) -> Vec<&SchemaNode> {
        let Some(node) = self.node(id) else {
            return Vec::new();
        };
        node.children()
            .iter()
            .chain(node.items())
            .filter_map(|child| self.node(child))
            .collect()
    }

    fn child_named<'a>(&'a self, parent: &'a SchemaNode, name: &str) -> Option<&'a NodeId> {
        parent
            .children()
            .iter()
            .find(|child| self.node(child).is_some_and(|c| c.name() == name))
    }

    /// Returns true if `ancestor` lies strictly above `id`.
    #[must_use]
    pub fn is_ancestor_of(&self, ancestor: &NodeId, id: &NodeId) -> bool {
        let mut current = self.parent_id(id);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent_id(parent);
        }
        false
    }

    /// Depth-first pre-order walk from the root.
    #[must_use]
    pub fn walk(&self) -> Vec<&SchemaNode> {
        self.walk_from(&self.root)
    }

    /// Depth-first pre-order walk of the subtree rooted at `id`.
    #[must_use]
    pub fn walk_from(&self, id: &NodeId) -> Vec<&SchemaNode> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(node) = self.node(next) else {
                continue;
            };
            out.push(node);
            for child in node.items().into_iter().chain(node.children().iter().rev()) {
                stack.push(child);
            }
        }
        out
    }

    /// Ids of every node, in walk order.
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.walk().into_iter().map(SchemaNode::id)
    }

    /// Number of nodes in the tree.
    #[must_use]
    pub fn count_nodes(&self) -> usize {
        self.slots.len()
    }

    // ---------------------------------------------------------------
    // Replacement tracking
    // ---------------------------------------------------------------

    /// Declares `new_id` as the structural successor of `old_id`.
    ///
    /// Registering the same `old_id` twice keeps the last mapping. Chains are
    /// collapsed, so `A -> B` followed by `B -> C` also maps `A -> C`.
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

    /// Returns the recorded successor of `old_id`.
    #[must_use]
    pub fn replacement_for(&self, old_id: &NodeId) -> Option<&NodeId> {
        self.replacements.get(old_id)
    }

    /// Returns the whole replacement table.
    #[must_use]
    pub fn replacements(&self) -> &HashMap<NodeId, NodeId> {
        &self.replacements
    }

    /// Forgets every recorded replacement.
    pub fn clear_replacements(&mut self) {
        self.replacements.clear();
    }

    // ---------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------

    /// Appends a named field to the object at `parent`.
    pub fn add_child_to(
        &mut self,
        parent: &SchemaPath,
        name: &str,
        subtree: impl Into<Self>,
    ) -> Result<NodeId> {
        self.insert_child(parent, None, name, subtree.into())
    }

    /// Inserts a named field at `index` among the children of `parent`.
    ///
    /// An index past the end appends.
    pub fn insert_child_at(
        &mut self,
        parent: &SchemaPath,
        index: usize,
        name: &str,
        subtree: impl Into<Self>,
    ) -> Result<NodeId> {
        self.insert_child(parent, Some(index), name, subtree.into())
    }

    fn insert_child(
        &mut self,
        parent: &SchemaPath,
        index: Option<usize>,
        name: &str,
        subtree: Self,
    ) -> Result<NodeId> {
        let parent_id = self.require_object(parent)?;
        self.ensure_name_free(&parent_id, name, parent, None)?;
        self.ensure_ids_free(&subtree, &HashSet::new())?;

        let id = subtree.root.clone();
        self.absorb(subtree, &parent_id, name);
        let children = self
            .slots
            .get_mut(&parent_id)
            .and_then(|slot| slot.node.children_mut())
            .ok_or_else(|| SchemaError::NotAContainer(parent.to_string()))?;
        // absorb appended the child; move it to the requested index
        if let Some(index) = index {
            children.pop();
            children.insert(index.min(children.len()), id.clone());
        }
        Ok(id)
    }

    /// Detaches the node at `path` and returns it as its own tree.
    pub fn remove_node_at(&mut self, path: &SchemaPath) -> Result<Self> {
        let id = self.require_node(path)?;
        let Some(parent) = self.parent_id(&id).cloned() else {
            return Err(SchemaError::RootOperation("removed"));
        };
        if self.node(&parent).is_some_and(SchemaNode::is_array) {
            return Err(SchemaError::ArrayItemsRequired(path.to_string()));
        }
        if let Some(children) = self
            .slots
            .get_mut(&parent)
            .and_then(|slot| slot.node.children_mut())
        {
            children.retain(|child| *child != id);
        }
        Ok(self.detach(&id))
    }

    /// Renames the field at `path`.
    pub fn rename_node(&mut self, path: &SchemaPath, new_name: &str) -> Result<()> {
        let id = self.require_node(path)?;
        let Some(parent) = self.parent_id(&id).cloned() else {
            return Err(SchemaError::RootOperation("renamed"));
        };
        if self.node(&parent).is_some_and(SchemaNode::is_array) {
            return Err(SchemaError::NotAField(path.to_string()));
        }
        let parent_path = path.parent().unwrap_or_default();
        self.ensure_name_free(&parent, new_name, &parent_path, Some(&id))?;
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.node.set_name(new_name);
        }
        Ok(())
    }

    /// Replaces the node at `path` wholesale, keeping its slot.
    ///
    /// Returns the replaced subtree. Callers changing a field's type should
    /// follow up with [`SchemaTree::track_replacement`] so the differ pairs
    /// the old and new node.
    pub fn set_node_at(&mut self, path: &SchemaPath, subtree: impl Into<Self>) -> Result<Self> {
        let subtree = subtree.into();
        let old_id = self.require_node(path)?;
        let Some(parent) = self.parent_id(&old_id).cloned() else {
            return Ok(self.replace_root(subtree));
        };

        let outgoing: HashSet<NodeId> = self.subtree_ids(&old_id).into_iter().collect();
        self.ensure_ids_free(&subtree, &outgoing)?;

        let name = self
            .node(&old_id)
            .map(|n| n.name().to_string())
            .unwrap_or_default();
        let new_id = subtree.root.clone();
        let removed = self.detach(&old_id);
        self.absorb_in_place(subtree, &parent, &name, &old_id, &new_id);
        Ok(removed)
    }

    /// Swaps in a new root and returns the previous tree.
    ///
    /// The replacement table stays with `self`.
    pub fn replace_root(&mut self, subtree: impl Into<Self>) -> Self {
        let mut subtree = subtree.into();
        if let Some(slot) = subtree.slots.get_mut(&subtree.root) {
            slot.node.set_name("");
        }
        let replacements = std::mem::take(&mut self.replacements);
        subtree.replacements = replacements;
        let mut old = std::mem::replace(self, subtree);
        old.replacements = HashMap::new();
        old
    }

    /// Moves the node at `from` to the location `to`.
    ///
    /// A property destination renames the node into the target object; an
    /// items destination makes it the element schema of the target array,
    /// dropping the previous element schema.
    pub fn move_node(&mut self, from: &SchemaPath, to: &SchemaPath) -> Result<()> {
        let id = self.require_node(from)?;
        let Some(old_parent) = self.parent_id(&id).cloned() else {
            return Err(SchemaError::RootOperation("moved"));
        };
        if self.node(&old_parent).is_some_and(SchemaNode::is_array) {
            return Err(SchemaError::ArrayItemsRequired(from.to_string()));
        }
        let Some(target_parent_path) = to.parent() else {
            return Err(SchemaError::RootOperation("replaced by a move"));
        };
        let target_parent = self.require_node(&target_parent_path)?;
        if target_parent == id || self.is_ancestor_of(&id, &target_parent) {
            return Err(SchemaError::MoveIntoSelf {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        match to.last() {
            Some(PathSegment::Property(name)) => {
                if !self.node(&target_parent).is_some_and(SchemaNode::is_object) {
                    return Err(SchemaError::NotAContainer(target_parent_path.to_string()));
                }
                self.ensure_name_free(&target_parent, name, &target_parent_path, Some(&id))?;
                self.unlink(&id, &old_parent);
                self.link_child(&id, &target_parent, name);
            }
            Some(PathSegment::Items) => {
                let previous = self
                    .node(&target_parent)
                    .and_then(SchemaNode::items)
                    .cloned()
                    .ok_or_else(|| SchemaError::NotAContainer(target_parent_path.to_string()))?;
                self.unlink(&id, &old_parent);
                self.detach(&previous);
                self.link_items(&id, &target_parent);
            }
            None => unreachable!("a path with a parent has a last segment"),
        }
        Ok(())
    }

    /// Wraps the node at `path` into a new array, which takes its slot.
    ///
    /// The wrapped node keeps its id and becomes the element schema. Returns
    /// the id of the new array.
    pub fn wrap_in_array(&mut self, path: &SchemaPath) -> Result<NodeId> {
        let id = self.require_node(path)?;
        let mut array = SchemaNode::array(id.clone());
        let array_id = array.id().clone();
        let parent = self.parent_id(&id).cloned();
        let name = self
            .node(&id)
            .map(|n| n.name().to_string())
            .unwrap_or_default();

        match &parent {
            Some(parent) => self.replace_link(parent, &id, &array_id),
            None => self.root = array_id.clone(),
        }
        array.set_name(name);
        self.slots.insert(
            array_id.clone(),
            Slot {
                node: array,
                parent,
            },
        );
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.node.set_name("");
            slot.parent = Some(array_id.clone());
        }
        Ok(array_id)
    }

    /// Replaces the array at `path` by its element schema.
    ///
    /// The element schema keeps its id and takes over the array's slot and
    /// name. Returns the id of the element schema.
    pub fn unwrap_array(&mut self, path: &SchemaPath) -> Result<NodeId> {
        let array_id = self.require_node(path)?;
        let items = self
            .node(&array_id)
            .and_then(SchemaNode::items)
            .cloned()
            .ok_or_else(|| SchemaError::NotAContainer(path.to_string()))?;
        let parent = self.parent_id(&array_id).cloned();
        let name = self
            .node(&array_id)
            .map(|n| n.name().to_string())
            .unwrap_or_default();

        match &parent {
            Some(parent) => self.replace_link(parent, &array_id, &items),
            None => self.root = items.clone(),
        }
        self.slots.remove(&array_id);
        if let Some(slot) = self.slots.get_mut(&items) {
            slot.node.set_name(name);
            slot.parent = parent;
        }
        Ok(items)
    }

    /// Applies an attribute edit to the node with the given id.
    ///
    /// Structure (id, name, children) is not reachable through the public
    /// node setters, so the edit can only touch attributes.
    pub fn update_node(&mut self, id: &NodeId, edit: impl FnOnce(&mut SchemaNode)) -> Result<()> {
        let slot = self
            .slots
            .get_mut(id)
            .ok_or_else(|| SchemaError::UnknownNode(id.clone()))?;
        edit(&mut slot.node);
        Ok(())
    }

    /// Applies an attribute edit to the node at `path`.
    pub fn update_node_at(
        &mut self,
        path: &SchemaPath,
        edit: impl FnOnce(&mut SchemaNode),
    ) -> Result<()> {
        let id = self.require_node(path)?;
        self.update_node(&id, edit)
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    fn require_node(&self, path: &SchemaPath) -> Result<NodeId> {
        self.node_at(path)
            .map(|n| n.id().clone())
            .ok_or_else(|| SchemaError::NodeNotFound(path.to_string()))
    }

    fn require_object(&self, path: &SchemaPath) -> Result<NodeId> {
        let node = self
            .node_at(path)
            .ok_or_else(|| SchemaError::NodeNotFound(path.to_string()))?;
        if !node.is_object() {
            return Err(SchemaError::NotAContainer(path.to_string()));
        }
        Ok(node.id().clone())
    }

    fn ensure_name_free(
        &self,
        parent: &NodeId,
        name: &str,
        parent_path: &SchemaPath,
        allow: Option<&NodeId>,
    ) -> Result<()> {
        let Some(parent_node) = self.node(parent) else {
            return Err(SchemaError::UnknownNode(parent.clone()));
        };
        match self.child_named(parent_node, name) {
            Some(existing) if Some(existing) != allow => Err(SchemaError::DuplicateField {
                parent: parent_path.to_string(),
                name: name.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn ensure_ids_free(&self, subtree: &Self, outgoing: &HashSet<NodeId>) -> Result<()> {
        for id in subtree.slots.keys() {
            if self.slots.contains_key(id) && !outgoing.contains(id) {
                return Err(SchemaError::DuplicateNodeId(id.clone()));
            }
        }
        Ok(())
    }

    fn subtree_ids(&self, id: &NodeId) -> Vec<NodeId> {
        self.walk_from(id).into_iter().map(|n| n.id().clone()).collect()
    }

    /// Moves every slot of `subtree` into `self`, hanging its root under
    /// `parent` as `name` (appended to an object, or set as array items).
    fn absorb(&mut self, subtree: Self, parent: &NodeId, name: &str) {
        let root = subtree.root.clone();
        self.absorb_slots(subtree, parent, name);
        if self.node(parent).is_some_and(SchemaNode::is_array) {
            self.link_items(&root, parent);
        } else if let Some(children) = self
            .slots
            .get_mut(parent)
            .and_then(|slot| slot.node.children_mut())
        {
            children.push(root);
        }
    }

    fn absorb_in_place(
        &mut self,
        subtree: Self,
        parent: &NodeId,
        name: &str,
        old_id: &NodeId,
        new_id: &NodeId,
    ) {
        let is_items = self.node(parent).is_some_and(SchemaNode::is_array);
        self.absorb_slots(subtree, parent, if is_items { "" } else { name });
        self.replace_link(parent, old_id, new_id);
    }

    fn absorb_slots(&mut self, subtree: Self, parent: &NodeId, name: &str) {
        let root = subtree.root.clone();
        for (id, mut slot) in subtree.slots {
            if id == root {
                slot.parent = Some(parent.clone());
                slot.node.set_name(name);
            }
            self.slots.insert(id, slot);
        }
    }

    /// Removes the subtree rooted at `id` from the arena and returns it.
    ///
    /// Does not touch the parent's child list.
    fn detach(&mut self, id: &NodeId) -> Self {
        let ids = self.subtree_ids(id);
        let mut slots = HashMap::new();
        for sub in ids {
            if let Some(mut slot) = self.slots.remove(&sub) {
                if sub == *id {
                    slot.parent = None;
                }
                slots.insert(sub, slot);
            }
        }
        Self {
            root: id.clone(),
            slots,
            replacements: HashMap::new(),
        }
    }

    fn unlink(&mut self, id: &NodeId, parent: &NodeId) {
        if let Some(children) = self
            .slots
            .get_mut(parent)
            .and_then(|slot| slot.node.children_mut())
        {
            children.retain(|child| child != id);
        }
    }

    fn link_child(&mut self, id: &NodeId, parent: &NodeId, name: &str) {
        if let Some(children) = self
            .slots
            .get_mut(parent)
            .and_then(|slot| slot.node.children_mut())
        {
            children.push(id.clone());
        }
        if let Some(slot) = self.slots.get_mut(id) {
            slot.parent = Some(parent.clone());
            slot.node.set_name(name);
        }
    }

    fn link_items(&mut self, id: &NodeId, parent: &NodeId) {
        if let Some(slot) = self.slots.get_mut(parent) {
            slot.node.set_items(id.clone());
        }
        if let Some(slot) = self.slots.get_mut(id) {
            slot.parent = Some(parent.clone());
            slot.node.set_name("");
        }
    }

    /// Points the parent's reference to `old` at `new` instead, in place.
    fn replace_link(&mut self, parent: &NodeId, old: &NodeId, new: &NodeId) {
        let Some(slot) = self.slots.get_mut(parent) else {
            return;
        };
        if slot.node.is_array() {
            slot.node.set_items(new.clone());
        } else if let Some(children) = slot.node.children_mut() {
            for child in children.iter_mut() {
                if child == old {
                    *child = new.clone();
                }
            }
        }
    }

    fn rekey(&mut self, old: &NodeId, new: NodeId) {
        let Some(mut slot) = self.slots.remove(old) else {
            return;
        };
        slot.node.set_id(new.clone());
        let children: Vec<NodeId> = slot
            .node
            .children()
            .iter()
            .chain(slot.node.items())
            .cloned()
            .collect();
        let parent = slot.parent.clone();
        self.slots.insert(new.clone(), slot);

        for child in children {
            if let Some(child_slot) = self.slots.get_mut(&child) {
                child_slot.parent = Some(new.clone());
            }
        }
        match parent {
            Some(parent) => self.replace_link(&parent, old, &new),
            None => self.root = new,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;

    fn path(pointer: &str) -> SchemaPath {
        SchemaPath::from_json_pointer(pointer).unwrap()
    }

    fn sample() -> SchemaTree {
        SchemaTree::object()
            .with_id("root")
            .with_field("name", SchemaNode::string().with_id("name"))
            .with_field(
                "address",
                SchemaTree::object()
                    .with_id("address")
                    .with_field("city", SchemaNode::string().with_id("city")),
            )
            .with_field(
                "tags",
                SchemaTree::array(SchemaNode::string().with_id("tag")).with_id("tags"),
            )
    }

    #[test]
    fn test_lookup_by_id_and_path() {
        let tree = sample();
        assert_eq!(tree.count_nodes(), 6);
        assert_eq!(
            tree.path_of(&"city".into()).unwrap().to_json_pointer(),
            "/properties/address/properties/city"
        );
        assert_eq!(
            tree.path_of(&"tag".into()).unwrap().to_json_pointer(),
            "/properties/tags/items"
        );
        assert_eq!(
            tree.node_at(&path("/properties/tags/items")).unwrap().id(),
            &NodeId::from("tag")
        );
        assert!(tree.node_at(&path("/properties/missing")).is_none());
        assert_eq!(tree.parent_of(&"city".into()).unwrap().id().as_str(), "address");
    }

    #[test]
    fn test_walk_order() {
        let tree = sample();
        let ids: Vec<&str> = tree.node_ids().map(NodeId::as_str).collect();
        assert_eq!(ids, vec!["root", "name", "address", "city", "tags", "tag"]);
    }

    #[test]
    fn test_clone_is_independent() {
        let original = sample();
        let mut copy = original.clone();
        copy.rename_node(&path("/properties/name"), "fullName").unwrap();
        copy.remove_node_at(&path("/properties/address")).unwrap();

        assert_eq!(original.node(&"name".into()).unwrap().name(), "name");
        assert!(original.contains(&"city".into()));
        assert_eq!(copy.node(&"name".into()).unwrap().name(), "fullName");
        assert!(!copy.contains(&"city".into()));
    }

    #[test]
    fn test_add_and_insert_children() {
        let mut tree = sample();
        tree.add_child_to(&SchemaPath::root(), "age", SchemaNode::number().with_id("age"))
            .unwrap();
        tree.insert_child_at(&SchemaPath::root(), 0, "id", SchemaNode::string().with_id("id"))
            .unwrap();

        let names: Vec<&str> = tree
            .children_of(tree.root_id())
            .into_iter()
            .map(SchemaNode::name)
            .collect();
        assert_eq!(names, vec!["id", "name", "address", "tags", "age"]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut tree = sample();
        let result = tree.add_child_to(&SchemaPath::root(), "name", SchemaNode::string());
        assert!(matches!(result, Err(SchemaError::DuplicateField { .. })));

        let result = tree.rename_node(&path("/properties/name"), "address");
        assert!(matches!(result, Err(SchemaError::DuplicateField { .. })));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut tree = sample();
        let result = tree.add_child_to(
            &SchemaPath::root(),
            "other",
            SchemaNode::string().with_id("city"),
        );
        assert!(matches!(result, Err(SchemaError::DuplicateNodeId(_))));
    }

    #[test]
    fn test_root_operations_rejected() {
        let mut tree = sample();
        assert!(matches!(
            tree.remove_node_at(&SchemaPath::root()),
            Err(SchemaError::RootOperation(_))
        ));
        assert!(matches!(
            tree.rename_node(&SchemaPath::root(), "x"),
            Err(SchemaError::RootOperation(_))
        ));
    }

    #[test]
    fn test_set_node_keeps_slot_and_position() {
        let mut tree = sample();
        let old = tree
            .set_node_at(&path("/properties/name"), SchemaNode::number().with_id("name2"))
            .unwrap();
        tree.track_replacement(old.root_id().clone(), "name2");

        let node = tree.node_at(&path("/properties/name")).unwrap();
        assert_eq!(node.id().as_str(), "name2");
        assert_eq!(node.node_type(), NodeType::Number);
        assert_eq!(tree.children_of(tree.root_id())[0].id().as_str(), "name2");
        assert_eq!(tree.replacement_for(&"name".into()), Some(&NodeId::from("name2")));
    }

    #[test]
    fn test_set_node_may_reuse_outgoing_ids() {
        let mut tree = sample();
        tree.set_node_at(&path("/properties/address"), SchemaNode::string().with_id("city"))
            .unwrap();
        assert_eq!(
            tree.path_of(&"city".into()).unwrap().to_json_pointer(),
            "/properties/address"
        );
        assert!(!tree.contains(&"address".into()));
    }

    #[test]
    fn test_replacement_chains_collapse() {
        let mut tree = sample();
        tree.track_replacement("a", "b");
        tree.track_replacement("b", "c");
        assert_eq!(tree.replacement_for(&"a".into()), Some(&NodeId::from("c")));

        tree.track_replacement("a", "d");
        assert_eq!(tree.replacement_for(&"a".into()), Some(&NodeId::from("d")));
    }

    #[test]
    fn test_move_between_parents() {
        let mut tree = sample();
        tree.move_node(&path("/properties/name"), &path("/properties/address/properties/label"))
            .unwrap();
        assert_eq!(
            tree.path_of(&"name".into()).unwrap().to_json_pointer(),
            "/properties/address/properties/label"
        );
        assert_eq!(tree.node(&"name".into()).unwrap().name(), "label");
    }

    #[test]
    fn test_move_into_own_subtree_rejected() {
        let mut tree = sample();
        let result = tree.move_node(
            &path("/properties/address"),
            &path("/properties/address/properties/inner"),
        );
        assert!(matches!(result, Err(SchemaError::MoveIntoSelf { .. })));
    }

    #[test]
    fn test_move_into_array_items() {
        let mut tree = sample();
        tree.move_node(&path("/properties/name"), &path("/properties/tags/items"))
            .unwrap();
        assert!(!tree.contains(&"tag".into()));
        assert_eq!(
            tree.path_of(&"name".into()).unwrap().to_json_pointer(),
            "/properties/tags/items"
        );
    }

    #[test]
    fn test_wrap_and_unwrap() {
        let mut tree = sample();
        let array = tree.wrap_in_array(&path("/properties/name")).unwrap();
        assert_eq!(
            tree.path_of(&"name".into()).unwrap().to_json_pointer(),
            "/properties/name/items"
        );
        assert_eq!(tree.node(&array).unwrap().name(), "name");

        tree.unwrap_array(&path("/properties/name")).unwrap();
        assert_eq!(
            tree.path_of(&"name".into()).unwrap().to_json_pointer(),
            "/properties/name"
        );
        assert!(!tree.contains(&array));
        assert_eq!(tree.count_nodes(), 6);
    }

    #[test]
    fn test_remove_returns_subtree() {
        let mut tree = sample();
        let removed = tree.remove_node_at(&path("/properties/address")).unwrap();
        assert_eq!(removed.count_nodes(), 2);
        assert_eq!(removed.root().name(), "address");
        assert!(matches!(
            tree.remove_node_at(&path("/properties/tags/items")),
            Err(SchemaError::ArrayItemsRequired(_))
        ));
    }

    #[test]
    fn test_update_node_edits_attributes() {
        let mut tree = sample();
        tree.update_node_at(&path("/properties/name"), |node| {
            node.set_default(Some("anon".into()));
        })
        .unwrap();
        assert!(tree.node(&"name".into()).unwrap().default_value().is_some());
    }

    #[test]
    fn test_replace_root_keeps_replacements() {
        let mut tree = sample();
        tree.track_replacement("x", "y");
        let old = tree.replace_root(SchemaTree::object().with_id("root2"));
        assert_eq!(old.root_id().as_str(), "root");
        assert_eq!(tree.root_id().as_str(), "root2");
        assert_eq!(tree.replacement_for(&"x".into()), Some(&NodeId::from("y")));
    }
}
