//! Identity-aware diffing and patch synthesis for evolving schemas.
//!
//! `schema-delta` versions a JSON-Schema-like document describing record
//! shapes. Clients edit a [`SchemaTree`](tree::SchemaTree) whose nodes keep a
//! stable id across clones, and the crate answers two questions about the
//! edits made since the last save:
//! - what changed (added, removed, modified and moved fields)
//! - which ordered RFC 6902 script turns the saved document into the new one
//!
//! # Architecture
//!
//! - **Tree** - Arena of nodes keyed by id, with structural editing
//! - **Index** - Frozen base paths plus the replacement table for retyped nodes
//! - **Collector** - Classifies every node pair between two tree versions
//! - **Generator** - Emits an ordered, replayable patch script
//! - **Enricher** - Annotates each op with type, default, formula and metadata changes
//! - **Serializer** - Renders trees as JSON Schema fragments
//! - **Apply** - Replays scripts onto serialized documents
//!
//! # Example
//!
//! ```rust
//! use schema_delta::prelude::*;
//! use serde_json::json;
//!
//! let tree = SchemaTree::object().with_field("name", SchemaNode::string());
//! let mut diff = SchemaDiff::new(tree);
//!
//! diff.current_mut()
//!     .add_child_to(
//!         &SchemaPath::root(),
//!         "age",
//!         SchemaNode::number().with_default(0),
//!     )
//!     .unwrap();
//!
//! let patches = diff.generate_patches();
//! assert_eq!(
//!     serde_json::to_value(&patches).unwrap(),
//!     json!([{
//!         "op": "add",
//!         "path": "/properties/age",
//!         "value": { "type": "number", "default": 0 }
//!     }])
//! );
//!
//! // Replaying the script onto the saved document yields the live one.
//! let serializer = JsonSchemaSerializer::new();
//! let saved = serializer.serialize_tree(diff.base());
//! let state = DocumentState::from_patches(saved, &patches).unwrap();
//! assert_eq!(state.document(), &serializer.serialize_tree(diff.current()));
//! ```

pub mod apply;
pub mod collector;
pub mod diff;
pub mod enricher;
pub mod error;
pub mod formula;
pub mod generator;
pub mod index;
pub mod node;
pub mod patch;
pub mod path;
pub mod serializer;
pub mod tree;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::apply::DocumentState;
    pub use crate::collector::{Change, ChangeCollector, ChangeKind, CoalescedChanges};
    pub use crate::diff::SchemaDiff;
    pub use crate::enricher::PatchEnricher;
    pub use crate::error::{Result, SchemaError};
    pub use crate::formula::{FieldRefFormulaSerializer, Formula, FormulaError, FormulaSerializer};
    pub use crate::generator::{PatchGenerator, PatchOptions};
    pub use crate::index::{NodePairing, NodePathIndex};
    pub use crate::node::{DefaultValue, Metadata, NodeId, NodeKind, NodeType, SchemaNode};
    pub use crate::patch::{
        ContentMediaTypeChange, DefaultChange, DeprecatedChange, DescriptionChange,
        ForeignKeyChange, FormulaChange, JsonPatch, MetadataChangeKind, PatchOp, SchemaPatch,
        TypeChange,
    };
    pub use crate::path::{PathSegment, SchemaPath};
    pub use crate::serializer::{JsonSchemaSerializer, SchemaSerializer, SerializeOptions};
    pub use crate::tree::SchemaTree;
}
