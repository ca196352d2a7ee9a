//! Error types for schema trees, pointers and patch replay.

use crate::node::NodeId;

/// Errors that can occur while editing a schema tree or replaying patches.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// A JSON Pointer could not be converted into a schema path.
    #[error("Invalid JSON pointer '{pointer}': {reason}")]
    InvalidPointer {
        /// The offending pointer.
        pointer: String,
        /// Why it was rejected.
        reason: String,
    },

    /// No node exists at the given path.
    #[error("No node at path '{0}'")]
    NodeNotFound(String),

    /// No node carries the given id.
    #[error("Unknown node id '{0}'")]
    UnknownNode(NodeId),

    /// The target of a structural edit is not an object or array.
    #[error("Node at '{0}' cannot hold children")]
    NotAContainer(String),

    /// A sibling with the same name already exists.
    #[error("Field '{name}' already exists under '{parent}'")]
    DuplicateField {
        /// Path of the parent object.
        parent: String,
        /// The conflicting field name.
        name: String,
    },

    /// A grafted subtree reuses an id already present in the tree.
    #[error("Node id '{0}' is already used in this tree")]
    DuplicateNodeId(NodeId),

    /// The root node cannot be removed, renamed or moved.
    #[error("The root node cannot be {0}")]
    RootOperation(&'static str),

    /// The node is an array element schema, which has no name of its own.
    #[error("Node at '{0}' is not a named field")]
    NotAField(String),

    /// An array must always keep an element schema.
    #[error("Element schema at '{0}' cannot be detached from its array")]
    ArrayItemsRequired(String),

    /// A node cannot be moved into its own subtree.
    #[error("Cannot move '{from}' into its own subtree at '{to}'")]
    MoveIntoSelf {
        /// Source path.
        from: String,
        /// Destination parent path.
        to: String,
    },

    /// A patch referenced a location that does not exist in the document.
    #[error("Invalid patch target '{path}': {reason}")]
    InvalidPatchTarget {
        /// The pointer of the failing operation.
        path: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;
