//! The stateful diff facade.
//!
//! A [`SchemaDiff`] keeps the last saved tree as its baseline and the live
//! tree being edited, and answers what changed between the two.
//!
//! # Example
//!
//! ```rust
//! use schema_delta::prelude::*;
//!
//! let tree = SchemaTree::object().with_field("name", SchemaNode::string());
//! let mut diff = SchemaDiff::new(tree);
//!
//! diff.current_mut()
//!     .rename_node(&SchemaPath::root().property("name"), "fullName")
//!     .unwrap();
//! assert!(diff.is_dirty());
//!
//! let patches = diff.generate_patches();
//! assert_eq!(patches.len(), 1);
//! assert_eq!(patches[0].op, PatchOp::Move);
//!
//! diff.mark_as_saved();
//! assert!(!diff.is_dirty());
//! ```

use tracing::debug;

use crate::collector::{Change, ChangeCollector, CoalescedChanges};
use crate::enricher::PatchEnricher;
use crate::generator::{PatchGenerator, PatchOptions};
use crate::index::NodePathIndex;
use crate::node::NodeId;
use crate::patch::{JsonPatch, SchemaPatch};
use crate::serializer::{JsonSchemaSerializer, SchemaSerializer};
use crate::tree::SchemaTree;

/// Baseline and live tree, with change detection between them.
#[derive(Debug, Clone)]
pub struct SchemaDiff<S: SchemaSerializer = JsonSchemaSerializer> {
    base: SchemaTree,
    current: SchemaTree,
    serializer: S,
    options: PatchOptions,
}

impl SchemaDiff {
    /// Starts tracking `tree`; the baseline is a clone of it.
    #[must_use]
    pub fn new(tree: SchemaTree) -> Self {
        Self::with_serializer(tree, JsonSchemaSerializer::new())
    }

    /// Starts from an explicit baseline and live tree.
    #[must_use]
    pub fn from_trees(base: SchemaTree, current: SchemaTree) -> Self {
        Self {
            base,
            current,
            serializer: JsonSchemaSerializer::new(),
            options: PatchOptions::default(),
        }
    }
}

impl<S: SchemaSerializer> SchemaDiff<S> {
    /// Starts tracking `tree` with a custom serializer.
    #[must_use]
    pub fn with_serializer(tree: SchemaTree, serializer: S) -> Self {
        Self {
            base: tree.clone(),
            current: tree,
            serializer,
            options: PatchOptions::default(),
        }
    }

    /// Replaces the patch generation options.
    #[must_use]
    pub fn with_options(mut self, options: PatchOptions) -> Self {
        self.options = options;
        self
    }

    /// The baseline.
    #[must_use]
    pub const fn base(&self) -> &SchemaTree {
        &self.base
    }

    /// The live tree.
    #[must_use]
    pub const fn current(&self) -> &SchemaTree {
        &self.current
    }

    /// Mutable access to the live tree.
    pub fn current_mut(&mut self) -> &mut SchemaTree {
        &mut self.current
    }

    /// The serializer used for comparisons and patch values.
    #[must_use]
    pub const fn serializer(&self) -> &S {
        &self.serializer
    }

    fn index(&self) -> NodePathIndex {
        NodePathIndex::build(&self.base, &self.current)
    }

    /// Runs one collector pass.
    #[must_use]
    pub fn collect_changes(&self) -> Vec<Change<'_>> {
        ChangeCollector::new(&self.base, &self.current, &self.index(), &self.serializer).collect()
    }

    /// Groups the collected changes by kind.
    #[must_use]
    pub fn coalesce_changes(&self) -> CoalescedChanges<'_> {
        self.collect_changes().into_iter().collect()
    }

    /// Returns true if the live tree differs from the baseline.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.collect_changes().is_empty()
    }

    /// Makes the live tree the new baseline.
    pub fn mark_as_saved(&mut self) {
        self.base = self.current.clone();
        self.current.clear_replacements();
        debug!(nodes = self.base.count_nodes(), "schema marked as saved");
    }

    /// Discards every edit since the last save.
    pub fn revert(&mut self) {
        self.current = self.base.clone();
        self.current.clear_replacements();
        debug!(nodes = self.current.count_nodes(), "schema reverted to baseline");
    }

    /// Declares `new_id` as the structural successor of `old_id`.
    pub fn track_replacement(&mut self, old_id: impl Into<NodeId>, new_id: impl Into<NodeId>) {
        self.current.track_replacement(old_id, new_id);
    }

    fn generator<'a>(&'a self, index: &NodePathIndex) -> PatchGenerator<'a, S> {
        PatchGenerator::new(&self.base, &self.current, index, &self.serializer)
            .with_options(self.options.clone())
    }

    /// Emits the patch script turning the baseline into the live tree.
    #[must_use]
    pub fn generate_patches(&self) -> Vec<JsonPatch> {
        let index = self.index();
        let changes: CoalescedChanges<'_> =
            ChangeCollector::new(&self.base, &self.current, &index, &self.serializer)
                .collect()
                .into_iter()
                .collect();
        self.generator(&index).generate(&changes)
    }

    /// Emits the patch script with every op enriched.
    #[must_use]
    pub fn generate_schema_patches(&self) -> Vec<SchemaPatch> {
        let index = self.index();
        let changes: CoalescedChanges<'_> =
            ChangeCollector::new(&self.base, &self.current, &index, &self.serializer)
                .collect()
                .into_iter()
                .collect();
        self.generator(&index).generate_enriched(&changes)
    }

    /// Enriches a single operation against the baseline and live tree.
    #[must_use]
    pub fn enrich(&self, patch: &JsonPatch) -> SchemaPatch {
        PatchEnricher::new(&self.base, &self.current, &self.index(), &self.serializer).enrich(patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::ChangeKind;
    use crate::node::SchemaNode;
    use crate::path::SchemaPath;

    fn diff() -> SchemaDiff {
        SchemaDiff::new(
            SchemaTree::object()
                .with_field("name", SchemaNode::string().with_id("name"))
                .with_field("age", SchemaNode::number().with_id("age")),
        )
    }

    #[test]
    fn test_fresh_diff_is_clean() {
        let diff = diff();
        assert!(!diff.is_dirty());
        assert!(diff.collect_changes().is_empty());
        assert!(diff.generate_patches().is_empty());
    }

    #[test]
    fn test_mark_as_saved_resets_baseline() {
        let mut diff = diff();
        diff.current_mut()
            .remove_node_at(&SchemaPath::root().property("age"))
            .unwrap();
        assert!(diff.is_dirty());

        diff.mark_as_saved();
        assert!(!diff.is_dirty());
        assert!(diff.base().node(&"age".into()).is_none());
    }

    #[test]
    fn test_revert_restores_baseline() {
        let mut diff = diff();
        diff.current_mut()
            .rename_node(&SchemaPath::root().property("name"), "fullName")
            .unwrap();
        diff.revert();
        assert!(!diff.is_dirty());
        assert_eq!(diff.current().node(&"name".into()).unwrap().name(), "name");
    }

    #[test]
    fn test_tracked_replacement_is_single_modification() {
        let mut diff = diff();
        diff.current_mut()
            .set_node_at(
                &SchemaPath::root().property("age"),
                SchemaNode::string().with_id("age2"),
            )
            .unwrap();
        diff.track_replacement("age", "age2");

        let grouped = diff.coalesce_changes();
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped.modified[0].kind(), ChangeKind::Modified);

        diff.mark_as_saved();
        assert!(diff.current().replacements().is_empty());
        assert!(!diff.is_dirty());
    }
}
