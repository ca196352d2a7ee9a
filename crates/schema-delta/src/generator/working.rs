//! Structural model of the document while a script is being emitted.
//!
//! Each entry is keyed by the id the node has in the current tree, or by its
//! base id when it only exists in the base tree. Keys are path segments, so
//! the pointer of any entry can be rebuilt at any point of the script.

use std::collections::{HashMap, HashSet};

use crate::index::NodePairing;
use crate::node::{NodeId, SchemaNode};
use crate::path::{PathSegment, SchemaPath};
use crate::tree::SchemaTree;

/// What an entry can hold below itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum EntryKind {
    Object,
    Array,
    Leaf,
}

impl EntryKind {
    pub(super) fn of(node: &SchemaNode) -> Self {
        if node.is_object() {
            Self::Object
        } else if node.is_array() {
            Self::Array
        } else {
            Self::Leaf
        }
    }

    /// True if a child can sit under this kind at `key`.
    pub(super) fn accepts(self, key: &PathSegment) -> bool {
        matches!(
            (self, key),
            (Self::Object, PathSegment::Property(_)) | (Self::Array, PathSegment::Items)
        )
    }
}

#[derive(Debug, Clone)]
struct Entry {
    parent: Option<NodeId>,
    key: Option<PathSegment>,
    children: Vec<NodeId>,
    kind: EntryKind,
}

#[derive(Debug, Clone)]
pub(super) struct WorkingDoc {
    root: NodeId,
    entries: HashMap<NodeId, Entry>,
}

impl WorkingDoc {
    /// Mirrors the base tree, renaming paired nodes to their current ids.
    pub(super) fn from_base(base: &SchemaTree, pairing: &NodePairing) -> Self {
        let key_of = |id: &NodeId| pairing.partner_in_current(id).unwrap_or(id).clone();

        let mut entries = HashMap::new();
        for node in base.walk() {
            let id = key_of(node.id());
            let children = node
                .children()
                .iter()
                .chain(node.items())
                .map(key_of)
                .collect();
            entries.insert(
                id,
                Entry {
                    parent: base.parent_id(node.id()).map(key_of),
                    key: base.segment_of(node.id()),
                    children,
                    kind: EntryKind::of(node),
                },
            );
        }
        Self {
            root: key_of(base.root_id()),
            entries,
        }
    }

    pub(super) fn root(&self) -> &NodeId {
        &self.root
    }

    pub(super) fn contains(&self, id: &NodeId) -> bool {
        self.entries.contains_key(id)
    }

    pub(super) fn parent(&self, id: &NodeId) -> Option<&NodeId> {
        self.entries.get(id)?.parent.as_ref()
    }

    pub(super) fn key(&self, id: &NodeId) -> Option<&PathSegment> {
        self.entries.get(id)?.key.as_ref()
    }

    pub(super) fn kind(&self, id: &NodeId) -> Option<EntryKind> {
        self.entries.get(id).map(|e| e.kind)
    }

    pub(super) fn is_object(&self, id: &NodeId) -> bool {
        self.kind(id) == Some(EntryKind::Object)
    }

    pub(super) fn set_kind(&mut self, id: &NodeId, kind: EntryKind) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.kind = kind;
        }
    }

    pub(super) fn children(&self, id: &NodeId) -> &[NodeId] {
        self.entries
            .get(id)
            .map(|e| e.children.as_slice())
            .unwrap_or_default()
    }

    /// Pointer path of `id`, or `None` if it is missing or its parent
    /// chain loops.
    pub(super) fn path_of(&self, id: &NodeId) -> Option<SchemaPath> {
        let mut segments = Vec::new();
        let mut seen = HashSet::new();
        let mut current = id;
        loop {
            if !seen.insert(current) {
                return None;
            }
            let entry = self.entries.get(current)?;
            match (&entry.parent, &entry.key) {
                (Some(parent), Some(key)) => {
                    segments.push(key.clone());
                    current = parent;
                }
                _ => break,
            }
        }
        segments.reverse();
        Some(SchemaPath::from_segments(segments))
    }

    pub(super) fn occupant(&self, parent: &NodeId, key: &PathSegment) -> Option<&NodeId> {
        self.children(parent)
            .iter()
            .find(|child| self.key(child) == Some(key))
    }

    /// True if `id` is `ancestor` or lies below it.
    pub(super) fn is_within(&self, id: &NodeId, ancestor: &NodeId) -> bool {
        id == ancestor || self.ancestors(id).iter().any(|next| next == ancestor)
    }

    /// Strict ancestors of `id`, nearest first. Stops at the first repeat.
    pub(super) fn ancestors(&self, id: &NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut current = self.parent(id);
        while let Some(next) = current {
            if !seen.insert(next) {
                break;
            }
            out.push(next.clone());
            current = self.parent(next);
        }
        out
    }

    pub(super) fn detach(&mut self, id: &NodeId) {
        let Some(parent) = self.parent(id).cloned() else {
            return;
        };
        if let Some(entry) = self.entries.get_mut(&parent) {
            entry.children.retain(|child| child != id);
        }
        if let Some(entry) = self.entries.get_mut(id) {
            entry.parent = None;
            entry.key = None;
        }
    }

    pub(super) fn attach(&mut self, id: &NodeId, parent: &NodeId, key: PathSegment) {
        if let Some(entry) = self.entries.get_mut(parent) {
            entry.children.push(id.clone());
        }
        if let Some(entry) = self.entries.get_mut(id) {
            entry.parent = Some(parent.clone());
            entry.key = Some(key);
        }
    }

    pub(super) fn insert(&mut self, id: NodeId, parent: &NodeId, key: PathSegment, kind: EntryKind) {
        self.entries.insert(
            id.clone(),
            Entry {
                parent: None,
                key: None,
                children: Vec::new(),
                kind,
            },
        );
        self.attach(&id, parent, key);
    }

    /// Drops `id` and everything below it.
    pub(super) fn remove_subtree(&mut self, id: &NodeId) {
        self.detach(id);
        let mut stack = vec![id.clone()];
        while let Some(next) = stack.pop() {
            if let Some(entry) = self.entries.remove(&next) {
                stack.extend(entry.children);
            }
        }
    }

    /// Drops everything below `id`, keeping `id` itself.
    pub(super) fn clear_children(&mut self, id: &NodeId) {
        for child in self.children(id).to_vec() {
            self.remove_subtree(&child);
        }
    }
}
