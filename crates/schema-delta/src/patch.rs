//! Patch operations and their enriched form.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::node::NodeType;

/// RFC 6902 operation kinds emitted by the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    /// Insert a value at `path`.
    Add,
    /// Delete the value at `path`.
    Remove,
    /// Overwrite the value at `path`.
    Replace,
    /// Relocate the value at `from` to `path`.
    Move,
}

impl PatchOp {
    /// Lowercase operation name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Replace => "replace",
            Self::Move => "move",
        }
    }
}

impl fmt::Display for PatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One RFC 6902 operation against a schema document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonPatch {
    /// Operation kind.
    pub op: PatchOp,
    /// Target location (JSON Pointer).
    pub path: String,
    /// Schema fragment for `add` and `replace`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Source location for `move`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl JsonPatch {
    /// Creates an `add` operation.
    #[must_use]
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Add,
            path: path.into(),
            value: Some(value),
            from: None,
        }
    }

    /// Creates a `remove` operation.
    #[must_use]
    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: PatchOp::Remove,
            path: path.into(),
            value: None,
            from: None,
        }
    }

    /// Creates a `replace` operation.
    #[must_use]
    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Replace,
            path: path.into(),
            value: Some(value),
            from: None,
        }
    }

    /// Creates a `move` operation.
    #[must_use]
    pub fn relocate(from: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            op: PatchOp::Move,
            path: path.into(),
            value: None,
            from: Some(from.into()),
        }
    }
}

impl fmt::Display for JsonPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.from {
            Some(from) => write!(f, "{} {} -> {}", self.op, from, self.path),
            None => write!(f, "{} {}", self.op, self.path),
        }
    }
}

/// Attribute kinds aggregated in [`SchemaPatch::metadata_changes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetadataChangeKind {
    Formula,
    Default,
    Description,
    Deprecated,
    ForeignKey,
    ContentMediaType,
}

/// A node type change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeChange {
    pub from_type: NodeType,
    pub to_type: NodeType,
}

/// A formula change, compared by canonical expression text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_formula: Option<String>,
}

/// A default value change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_default: Option<Value>,
}

/// A description change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptionChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_description: Option<String>,
}

/// A deprecation flag change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeprecatedChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_deprecated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_deprecated: Option<bool>,
}

/// A foreign-key target change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_foreign_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_foreign_key: Option<String>,
}

/// A content media type change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMediaTypeChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_content_media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_content_media_type: Option<String>,
}

/// A patch operation annotated with what it means for the schema.
///
/// Computed on demand and never persisted by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaPatch {
    #[serde(flatten)]
    pub patch: JsonPatch,
    /// Name of the affected field; empty for item schemas and the root.
    pub field_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata_changes: Vec<MetadataChangeKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_change: Option<TypeChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula_change: Option<FormulaChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_change: Option<DefaultChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_change: Option<DescriptionChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated_change: Option<DeprecatedChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key_change: Option<ForeignKeyChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_media_type_change: Option<ContentMediaTypeChange>,
    /// Set on moves: the parent is unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_rename: Option<bool>,
    /// Set on moves: the destination sits under more array boundaries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moves_into_array: Option<bool>,
}

impl SchemaPatch {
    /// Wraps a bare patch without any enrichment.
    #[must_use]
    pub fn bare(patch: JsonPatch, field_name: impl Into<String>) -> Self {
        Self {
            patch,
            field_name: field_name.into(),
            metadata_changes: Vec::new(),
            type_change: None,
            formula_change: None,
            default_change: None,
            description_change: None,
            deprecated_change: None,
            foreign_key_change: None,
            content_media_type_change: None,
            is_rename: None,
            moves_into_array: None,
        }
    }

    /// Returns true if the patch carries no change metadata.
    #[must_use]
    pub fn is_bare(&self) -> bool {
        self.metadata_changes.is_empty()
            && self.type_change.is_none()
            && self.formula_change.is_none()
            && self.default_change.is_none()
            && self.description_change.is_none()
            && self.deprecated_change.is_none()
            && self.foreign_key_change.is_none()
            && self.content_media_type_change.is_none()
            && self.is_rename.is_none()
            && self.moves_into_array.is_none()
    }
}
