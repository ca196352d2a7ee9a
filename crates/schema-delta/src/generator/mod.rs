//! Ordered patch synthesis.
//!
//! The generator turns coalesced changes into an RFC 6902 script over the
//! serialized base document. Ops are emitted in five blocks:
//!
//! 1. adds whose subtree receives a moved node (prerequisites),
//! 2. moves, each followed by its replace when the moved node also changed,
//! 3. replaces,
//! 4. the remaining adds,
//! 5. removes.
//!
//! A modified node that changes kind and receives moved nodes is replaced
//! before the moves, leaving out the nodes the moves will supply.
//!
//! While emitting, a [`WorkingDoc`](working::WorkingDoc) tracks where every
//! node sits in the document, so each op addresses a location that exists
//! at that point of the script. When no order keeps every op valid, or the
//! finished script does not replay to the current tree, the script collapses
//! into one replace of the whole document.

mod working;

use std::collections::HashSet;

use tracing::{debug, trace, warn};

use crate::apply::DocumentState;
use crate::collector::{Change, CoalescedChanges};
use crate::enricher::PatchEnricher;
use crate::index::{NodePairing, NodePathIndex};
use crate::node::{NodeId, SchemaNode};
use crate::patch::{JsonPatch, SchemaPatch};
use crate::path::PathSegment;
use crate::serializer::{SchemaSerializer, SerializeOptions};
use crate::tree::SchemaTree;

use working::{EntryKind, WorkingDoc};

/// Default prefix of the keys used to park nodes during swaps.
pub const DEFAULT_TEMP_KEY_PREFIX: &str = "__tmp_";

/// Options for patch generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOptions {
    /// Prefix of temporary sibling keys used to break move cycles.
    pub temp_key_prefix: String,
}

impl Default for PatchOptions {
    fn default() -> Self {
        Self {
            temp_key_prefix: DEFAULT_TEMP_KEY_PREFIX.to_string(),
        }
    }
}

impl PatchOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the temporary key prefix.
    #[must_use]
    pub fn with_temp_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.temp_key_prefix = prefix.into();
        self
    }
}

/// An op together with the nodes it was emitted for.
#[derive(Debug, Clone)]
struct PlannedOp {
    patch: JsonPatch,
    base: Option<NodeId>,
    current: Option<NodeId>,
}

/// A move still waiting to be emitted.
#[derive(Debug, Clone)]
struct MoveTask {
    id: NodeId,
    parent: NodeId,
    key: PathSegment,
    modified: bool,
}

/// State of a destination slot.
enum Slot {
    Free,
    Overwrite(NodeId),
    Blocked(NodeId),
}

/// Emits ordered patch scripts for one base/current pair.
pub struct PatchGenerator<'a, S: SchemaSerializer + ?Sized> {
    base: &'a SchemaTree,
    current: &'a SchemaTree,
    pairing: NodePairing,
    serializer: &'a S,
    options: PatchOptions,
}

impl<'a, S: SchemaSerializer + ?Sized> PatchGenerator<'a, S> {
    /// Creates a generator and derives the node pairing from `index`.
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
            options: PatchOptions::default(),
        }
    }

    /// Replaces the options.
    #[must_use]
    pub fn with_options(mut self, options: PatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Emits the ordered script.
    #[must_use]
    pub fn generate(&self, changes: &CoalescedChanges<'_>) -> Vec<JsonPatch> {
        self.plan(changes).into_iter().map(|op| op.patch).collect()
    }

    /// Emits the ordered script with every op enriched.
    #[must_use]
    pub fn generate_enriched(&self, changes: &CoalescedChanges<'_>) -> Vec<SchemaPatch> {
        let enricher =
            PatchEnricher::with_pairing(self.base, self.current, self.pairing.clone(), self.serializer);
        self.plan(changes)
            .into_iter()
            .map(|op| {
                let base = op.base.as_ref().and_then(|id| self.base.node(id));
                let current = op.current.as_ref().and_then(|id| self.current.node(id));
                enricher.enrich_nodes(&op.patch, base, current)
            })
            .collect()
    }

    fn plan(&self, changes: &CoalescedChanges<'_>) -> Vec<PlannedOp> {
        let mut planner = Planner::new(self);
        planner.run(changes);
        let ops = if self.replays(&planner.ops) {
            planner.ops
        } else {
            warn!(
                ops = planner.ops.len(),
                "planned script does not reproduce the current tree, replacing the document"
            );
            vec![PlannedOp {
                patch: JsonPatch::replace(String::new(), self.serializer.serialize_tree(self.current)),
                base: Some(self.base.root_id().clone()),
                current: Some(self.current.root_id().clone()),
            }]
        };
        debug!(
            ops = ops.len(),
            added = changes.added.len(),
            removed = changes.removed.len(),
            modified = changes.modified.len(),
            moved = changes.moved.len(),
            "generated patch script"
        );
        ops
    }

    /// True if replaying `ops` onto the serialized base yields the
    /// serialized current tree.
    fn replays(&self, ops: &[PlannedOp]) -> bool {
        let patches: Vec<JsonPatch> = ops.iter().map(|op| op.patch.clone()).collect();
        let expected = self.serializer.serialize_tree(self.current);
        DocumentState::from_patches(self.serializer.serialize_tree(self.base), &patches)
            .is_ok_and(|state| *state.document() == expected)
    }
}

/// Mutable state of one generation pass.
struct Planner<'g, 'a, S: SchemaSerializer + ?Sized> {
    generator: &'g PatchGenerator<'a, S>,
    doc: WorkingDoc,
    ops: Vec<PlannedOp>,
    pending: Vec<MoveTask>,
    replaced: HashSet<NodeId>,
    prepared: HashSet<NodeId>,
    document_replaced: bool,
    temp_counter: usize,
}

impl<'g, 'a, S: SchemaSerializer + ?Sized> Planner<'g, 'a, S> {
    fn new(generator: &'g PatchGenerator<'a, S>) -> Self {
        Self {
            generator,
            doc: WorkingDoc::from_base(generator.base, &generator.pairing),
            ops: Vec::new(),
            pending: Vec::new(),
            replaced: HashSet::new(),
            prepared: HashSet::new(),
            document_replaced: false,
            temp_counter: 0,
        }
    }

    fn run(&mut self, changes: &CoalescedChanges<'_>) {
        let generator = self.generator;
        let current = generator.current;
        let pairing = &generator.pairing;

        if pairing.partner_in_base(current.root_id()) != Some(generator.base.root_id()) {
            self.emit_root_change();
            return;
        }

        let modified: HashSet<&NodeId> = changes
            .modified
            .iter()
            .filter_map(Change::current)
            .map(SchemaNode::id)
            .collect();
        let moved: HashSet<&NodeId> = changes
            .moved
            .iter()
            .filter_map(Change::current)
            .map(SchemaNode::id)
            .collect();

        self.pending = changes
            .moved
            .iter()
            .filter_map(Change::current)
            .filter_map(|node| {
                Some(MoveTask {
                    id: node.id().clone(),
                    parent: current.parent_id(node.id())?.clone(),
                    key: current.segment_of(node.id())?,
                    modified: modified.contains(node.id()),
                })
            })
            .collect();

        let (prerequisites, regular): (Vec<&SchemaNode>, Vec<&SchemaNode>) = changes
            .added
            .iter()
            .filter_map(Change::current)
            .partition(|node| {
                current
                    .walk_from(node.id())
                    .iter()
                    .any(|inner| pairing.partner_in_base(inner.id()).is_some())
            });

        for node in changes.modified.iter().filter_map(Change::current) {
            if !moved.contains(node.id()) && self.must_become_container(node) {
                self.prepare_container(node.id());
            }
        }

        for node in prerequisites {
            self.emit_add(node, true);
        }

        let deferred = self.run_moves();
        for id in deferred {
            self.emit_replace(&id);
        }

        for node in changes.modified.iter().filter_map(Change::current) {
            if !moved.contains(node.id()) {
                self.emit_replace(node.id());
            }
        }

        for node in regular {
            self.emit_add(node, false);
        }

        for node in changes.removed.iter().filter_map(Change::base) {
            self.emit_remove(node);
        }
    }

    /// The current root sat elsewhere in the base tree, or is new above the
    /// old root. The old root itself is gone, so the script either lifts
    /// the node up to the document or rewrites the document outright.
    fn emit_root_change(&mut self) {
        let generator = self.generator;
        let root = generator.current.root_id();
        let options = SerializeOptions::default();
        let Some(after) = generator.serializer.serialize_node(generator.current, root, &options)
        else {
            return;
        };

        if let Some(base_id) = generator.pairing.partner_in_base(root) {
            if let Some(from) = generator.base.path_of(base_id) {
                self.push(
                    JsonPatch::relocate(from.to_json_pointer(), String::new()),
                    Some(base_id.clone()),
                    Some(root.clone()),
                );
                let before = generator.serializer.serialize_node(generator.base, base_id, &options);
                if before.as_ref() == Some(&after) {
                    return;
                }
                self.push(
                    JsonPatch::replace(String::new(), after),
                    Some(base_id.clone()),
                    Some(root.clone()),
                );
                return;
            }
        }

        self.push(
            JsonPatch::replace(String::new(), after),
            Some(generator.base.root_id().clone()),
            Some(root.clone()),
        );
    }

    // ---------------------------------------------------------------
    // Moves
    // ---------------------------------------------------------------

    /// Emits every pending move; returns the replaces that had to wait for
    /// the end of the block.
    fn run_moves(&mut self) -> Vec<NodeId> {
        let mut deferred = Vec::new();
        while !self.pending.is_empty() {
            let mut progressed = false;
            let mut i = 0;
            while i < self.pending.len() {
                match self.readiness(&self.pending[i]) {
                    Some(slot) => {
                        let task = self.pending.remove(i);
                        self.execute_move(&task, slot, &mut deferred);
                        progressed = true;
                    }
                    None => i += 1,
                }
            }
            if !progressed && !self.break_deadlock() {
                self.replace_document();
            }
        }
        deferred
    }

    /// True if the destination parent exists and holds children of the
    /// task's key kind, outside the moving node.
    fn can_land(&self, task: &MoveTask) -> bool {
        self.doc
            .kind(&task.parent)
            .is_some_and(|kind| kind.accepts(&task.key))
            && !self.doc.is_within(&task.parent, &task.id)
    }

    /// Returns how the move can land now, or `None` if it has to wait.
    fn readiness(&self, task: &MoveTask) -> Option<Slot> {
        if !self.can_land(task) {
            return None;
        }
        match self.slot(&task.parent, &task.key, Some(&task.id)) {
            Slot::Blocked(_) => None,
            slot => Some(slot),
        }
    }

    /// Classifies the slot `(parent, key)` for a node landing there.
    ///
    /// An occupant can be overwritten when no pending move still needs to
    /// take something out of it, ignoring moves carried along by `mover`.
    fn slot(&self, parent: &NodeId, key: &PathSegment, mover: Option<&NodeId>) -> Slot {
        let Some(occupant) = self.doc.occupant(parent, key) else {
            return Slot::Free;
        };
        if Some(occupant) == mover {
            return Slot::Free;
        }
        let blocked = self.pending.iter().any(|task| {
            let carried = mover.is_some_and(|m| self.doc.is_within(&task.id, m));
            !carried && self.doc.is_within(&task.id, occupant)
        });
        if blocked {
            Slot::Blocked(occupant.clone())
        } else {
            Slot::Overwrite(occupant.clone())
        }
    }

    fn execute_move(&mut self, task: &MoveTask, slot: Slot, deferred: &mut Vec<NodeId>) {
        let Some(from) = self.doc.path_of(&task.id) else {
            warn!(node = %task.id, "moved node is no longer in the document");
            self.replace_document();
            return;
        };
        self.doc.detach(&task.id);
        if let Slot::Overwrite(occupant) | Slot::Blocked(occupant) = slot {
            self.doc.remove_subtree(&occupant);
        }
        self.doc.attach(&task.id, &task.parent, task.key.clone());
        let to = self.doc.path_of(&task.id).unwrap_or_default();

        let base = self.generator.pairing.partner_in_base(&task.id).cloned();
        self.push(
            JsonPatch::relocate(from.to_json_pointer(), to.to_json_pointer()),
            base,
            Some(task.id.clone()),
        );

        if task.modified {
            if !self.pending_touches(&task.id) {
                self.emit_replace(&task.id);
            } else if self.kind_changes(&task.id) {
                self.prepare_container(&task.id);
            } else {
                trace!(node = %task.id, "deferring replace until the moves settle");
                deferred.push(task.id.clone());
            }
        }
    }

    /// True if a pending move starts inside `id` or lands inside it.
    fn pending_touches(&self, id: &NodeId) -> bool {
        let current = self.generator.current;
        self.pending.iter().any(|task| {
            self.doc.is_within(&task.id, id)
                || task.parent == *id
                || current.is_ancestor_of(id, &task.id)
        })
    }

    /// Parks one blocking occupant under a temporary key.
    fn break_deadlock(&mut self) -> bool {
        let blocker = self.pending.iter().find_map(|task| {
            if !self.can_land(task) {
                return None;
            }
            match self.slot(&task.parent, &task.key, Some(&task.id)) {
                Slot::Blocked(occupant) => Some(occupant),
                _ => None,
            }
        });
        blocker.is_some_and(|occupant| self.move_aside(&occupant))
    }

    /// Moves `id` to a fresh temporary key in the nearest object.
    fn move_aside(&mut self, id: &NodeId) -> bool {
        let holder = self
            .doc
            .parent(id)
            .filter(|parent| self.doc.is_object(parent))
            .cloned()
            .or_else(|| {
                let root = self.doc.root().clone();
                (self.doc.is_object(&root) && root != *id).then_some(root)
            });
        match holder {
            Some(holder) => self.park(id, &holder),
            None => {
                debug!(node = %id, "no object available to park a blocking node");
                false
            }
        }
    }

    /// Moves `id` under a fresh temporary key of the object `holder`.
    fn park(&mut self, id: &NodeId, holder: &NodeId) -> bool {
        let Some(from) = self.doc.path_of(id) else {
            return false;
        };

        let name = match self.doc.key(id) {
            Some(PathSegment::Property(name)) => name.clone(),
            _ => "items".to_string(),
        };
        let key = loop {
            let candidate = PathSegment::Property(format!(
                "{}{}_{}",
                self.generator.options.temp_key_prefix, self.temp_counter, name
            ));
            self.temp_counter += 1;
            if self.doc.occupant(holder, &candidate).is_none() {
                break candidate;
            }
        };

        self.doc.detach(id);
        self.doc.attach(id, holder, key);
        let to = self.doc.path_of(id).unwrap_or_default();
        trace!(node = %id, to = %to, "parking node under temporary key");

        let (base, current) = if self.generator.current.contains(id) {
            (self.generator.pairing.partner_in_base(id).cloned(), Some(id.clone()))
        } else {
            (Some(id.clone()), None)
        };
        self.push(
            JsonPatch::relocate(from.to_json_pointer(), to.to_json_pointer()),
            base,
            current,
        );
        true
    }

    // ---------------------------------------------------------------
    // Containers
    // ---------------------------------------------------------------

    fn kind_changes(&self, id: &NodeId) -> bool {
        self.generator.current.node(id).map(EntryKind::of) != self.doc.kind(id)
    }

    /// True if `node` changes kind and a pending move lands inside it.
    fn must_become_container(&self, node: &SchemaNode) -> bool {
        let current = self.generator.current;
        self.kind_changes(node.id())
            && self
                .pending
                .iter()
                .any(|task| task.parent == *node.id() || current.is_ancestor_of(node.id(), &task.parent))
    }

    /// Replaces `id` ahead of the moves that land inside it.
    ///
    /// Pending moves that start inside are parked outside first, and the
    /// value leaves out every node a pending move will supply.
    fn prepare_container(&mut self, id: &NodeId) {
        if self.document_replaced || self.prepared.contains(id) {
            return;
        }
        let generator = self.generator;
        let (Some(node), Some(base_id)) =
            (generator.current.node(id), generator.pairing.partner_in_base(id))
        else {
            return;
        };

        let inside: Vec<NodeId> = self
            .pending
            .iter()
            .filter(|task| task.id != *id && self.doc.is_within(&task.id, id))
            .map(|task| task.id.clone())
            .collect();
        if !inside.is_empty() {
            let Some(holder) = self
                .doc
                .ancestors(id)
                .into_iter()
                .find(|ancestor| self.doc.is_object(ancestor))
            else {
                self.replace_document();
                return;
            };
            for moving in &inside {
                if self.doc.is_within(moving, id) && !self.park(moving, &holder) {
                    self.replace_document();
                    return;
                }
            }
        }

        let exclude: HashSet<NodeId> = self
            .pending
            .iter()
            .filter(|task| generator.current.is_ancestor_of(id, &task.id))
            .map(|task| task.id.clone())
            .collect();
        let options = SerializeOptions::new().with_excluded_ids(exclude.iter().cloned());
        let (Some(value), Some(path)) = (
            generator.serializer.serialize_node(generator.current, id, &options),
            self.doc.path_of(id),
        ) else {
            return;
        };

        trace!(node = %id, "replacing container ahead of the moves into it");
        self.push(
            JsonPatch::replace(path.to_json_pointer(), value),
            Some(base_id.clone()),
            Some(id.clone()),
        );
        self.doc.set_kind(id, EntryKind::of(node));
        self.doc.clear_children(id);
        let materialized = self.materialize_children(id, &exclude);
        self.prepared.insert(id.clone());
        self.prepared.extend(materialized);
    }

    /// Rewrites the whole document from the current tree, for when no
    /// order of the remaining ops keeps every step valid.
    fn replace_document(&mut self) {
        let generator = self.generator;
        let root = generator.current.root_id();
        let Some(value) =
            generator
                .serializer
                .serialize_node(generator.current, root, &SerializeOptions::default())
        else {
            return;
        };
        debug!(pending = self.pending.len(), "falling back to a whole-document replace");
        self.push(
            JsonPatch::replace(String::new(), value),
            generator.pairing.partner_in_base(root).cloned(),
            Some(root.clone()),
        );
        self.pending.clear();
        self.document_replaced = true;

        let doc_root = self.doc.root().clone();
        if let Some(node) = generator.current.node(root) {
            self.doc.set_kind(&doc_root, EntryKind::of(node));
        }
        self.doc.clear_children(&doc_root);
        self.materialize_children(root, &HashSet::new());
        self.replaced.insert(doc_root);
    }

    // ---------------------------------------------------------------
    // Replaces, adds and removes
    // ---------------------------------------------------------------

    /// Replaces are only planned for pairs whose own fields differ, so a
    /// node whose only changes sit in its descendants never gets one.
    fn emit_replace(&mut self, id: &NodeId) {
        let generator = self.generator;
        if self.document_replaced || self.prepared.contains(id) {
            return;
        }
        let Some(current) = generator.current.node(id) else {
            return;
        };
        let Some(base_id) = generator.pairing.partner_in_base(id) else {
            return;
        };
        if !self.doc.contains(id) || self.subsumed(id) {
            trace!(node = %id, "replace subsumed by an ancestor replace");
            return;
        }

        let options = SerializeOptions::default();
        let before = generator.serializer.serialize_node(generator.base, base_id, &options);
        let Some(after) = generator.serializer.serialize_node(generator.current, id, &options) else {
            return;
        };
        if before.as_ref() == Some(&after) {
            trace!(node = %id, "replace skipped, serializations are identical");
            return;
        }

        let Some(path) = self.doc.path_of(id) else {
            return;
        };
        self.push(
            JsonPatch::replace(path.to_json_pointer(), after),
            Some(base_id.clone()),
            Some(id.clone()),
        );
        self.replaced.insert(id.clone());
        self.doc.set_kind(id, EntryKind::of(current));
        self.doc.clear_children(id);
        self.materialize_children(id, &HashSet::new());
    }

    /// True if an ancestor was replaced wholesale.
    ///
    /// The element schema of a replaced array keeps its own replace.
    fn subsumed(&self, id: &NodeId) -> bool {
        let parent = self.doc.parent(id);
        self.doc.ancestors(id).iter().any(|ancestor| {
            if !self.replaced.contains(ancestor) {
                return false;
            }
            let own_array = Some(ancestor) == parent
                && matches!(self.doc.key(id), Some(PathSegment::Items));
            !own_array
        })
    }

    fn emit_add(&mut self, node: &SchemaNode, prerequisite: bool) {
        let generator = self.generator;
        let id = node.id();
        if self.doc.contains(id) {
            trace!(node = %id, "add already covered by a replace");
            return;
        }
        let (Some(parent), Some(key)) = (generator.current.parent_id(id), generator.current.segment_of(id))
        else {
            return;
        };
        if !self.doc.kind(parent).is_some_and(|kind| kind.accepts(&key)) {
            warn!(node = %id, "parent of added node cannot hold it yet");
            self.replace_document();
            return;
        }

        match self.slot(parent, &key, None) {
            Slot::Free => {}
            Slot::Overwrite(occupant) => self.doc.remove_subtree(&occupant),
            Slot::Blocked(occupant) => {
                if !self.move_aside(&occupant) {
                    self.replace_document();
                    return;
                }
            }
        }

        let exclude: HashSet<NodeId> = if prerequisite {
            generator
                .current
                .walk_from(id)
                .into_iter()
                .map(SchemaNode::id)
                .filter(|inner| generator.pairing.partner_in_base(inner).is_some())
                .cloned()
                .collect()
        } else {
            HashSet::new()
        };
        let options = SerializeOptions::new().with_excluded_ids(exclude.iter().cloned());
        let Some(value) = generator.serializer.serialize_node(generator.current, id, &options)
        else {
            return;
        };
        let Some(path) = self.doc.path_of(parent) else {
            return;
        };

        self.push(
            JsonPatch::add(path.child(key.clone()).to_json_pointer(), value),
            None,
            Some(id.clone()),
        );
        self.doc.insert(id.clone(), parent, key, EntryKind::of(node));
        self.materialize_children(id, &exclude);
    }

    fn emit_remove(&mut self, node: &SchemaNode) {
        let id = node.id();
        if !self.doc.contains(id) {
            trace!(node = %id, "remove dropped, node was already overwritten");
            return;
        }
        if self
            .doc
            .ancestors(id)
            .iter()
            .any(|ancestor| self.replaced.contains(ancestor))
        {
            trace!(node = %id, "remove subsumed by an ancestor replace");
            return;
        }
        let Some(path) = self.doc.path_of(id) else {
            return;
        };
        self.push(JsonPatch::remove(path.to_json_pointer()), Some(id.clone()), None);
        self.doc.remove_subtree(id);
    }

    /// Mirrors the current children of `id` into the working document and
    /// returns the ids it inserted.
    fn materialize_children(&mut self, id: &NodeId, exclude: &HashSet<NodeId>) -> Vec<NodeId> {
        let current = self.generator.current;
        let mut inserted = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(next) = stack.pop() {
            for child in current.children_of(&next) {
                if exclude.contains(child.id()) {
                    continue;
                }
                let Some(key) = current.segment_of(child.id()) else {
                    continue;
                };
                self.doc
                    .insert(child.id().clone(), &next, key, EntryKind::of(child));
                inserted.push(child.id().clone());
                stack.push(child.id().clone());
            }
        }
        inserted
    }

    fn push(&mut self, patch: JsonPatch, base: Option<NodeId>, current: Option<NodeId>) {
        trace!(op = %patch.op, path = %patch.path, from = ?patch.from, "planned patch operation");
        self.ops.push(PlannedOp {
            patch,
            base,
            current,
        });
    }
}
