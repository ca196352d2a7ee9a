//! Replaying patch scripts onto serialized documents.

use serde_json::Value;
use tracing::trace;

use crate::error::{Result, SchemaError};
use crate::patch::{JsonPatch, PatchOp};
use crate::path::unescape_token;

/// A JSON document that patch operations are replayed onto.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentState {
    document: Value,
}

impl DocumentState {
    /// Wraps a document.
    #[must_use]
    pub const fn new(document: Value) -> Self {
        Self { document }
    }

    /// Returns the current document.
    #[must_use]
    pub const fn document(&self) -> &Value {
        &self.document
    }

    /// Consumes and returns the document.
    #[must_use]
    pub fn into_document(self) -> Value {
        self.document
    }

    /// Applies a single operation.
    pub fn apply_patch(&mut self, patch: &JsonPatch) -> Result<()> {
        trace!(op = %patch.op, path = %patch.path, "applying patch operation");
        match patch.op {
            PatchOp::Add => {
                let value = required_value(patch)?;
                self.add(&patch.path, value)
            }
            PatchOp::Remove => self.remove(&patch.path).map(drop),
            PatchOp::Replace => {
                let value = required_value(patch)?;
                self.replace(&patch.path, value)
            }
            PatchOp::Move => {
                let from = patch.from.as_deref().ok_or_else(|| SchemaError::InvalidPatchTarget {
                    path: patch.path.clone(),
                    reason: "move without 'from'".to_string(),
                })?;
                if from == patch.path {
                    return Ok(());
                }
                if patch.path.starts_with(from) && patch.path[from.len()..].starts_with('/') {
                    return Err(SchemaError::InvalidPatchTarget {
                        path: patch.path.clone(),
                        reason: format!("cannot move '{from}' into itself"),
                    });
                }
                let value = self.remove(from)?;
                self.add(&patch.path, value)
            }
        }
    }

    /// Applies operations in order, stopping at the first failure.
    pub fn apply_patches(&mut self, patches: &[JsonPatch]) -> Result<()> {
        for patch in patches {
            self.apply_patch(patch)?;
        }
        Ok(())
    }

    /// Replays `patches` onto `document`.
    pub fn from_patches(document: Value, patches: &[JsonPatch]) -> Result<Self> {
        let mut state = Self::new(document);
        state.apply_patches(patches)?;
        Ok(state)
    }

    fn add(&mut self, pointer: &str, value: Value) -> Result<()> {
        let mut tokens = parse_tokens(pointer)?;
        let Some(last) = tokens.pop() else {
            self.document = value;
            return Ok(());
        };
        match lookup_mut(&mut self.document, &tokens, pointer)? {
            Value::Object(map) => {
                map.insert(last, value);
                Ok(())
            }
            Value::Array(items) => {
                if last == "-" {
                    items.push(value);
                    return Ok(());
                }
                let index = parse_index(&last, pointer)?;
                if index > items.len() {
                    return Err(invalid(pointer, "array index out of bounds"));
                }
                items.insert(index, value);
                Ok(())
            }
            _ => Err(invalid(pointer, "parent is not a container")),
        }
    }

    fn remove(&mut self, pointer: &str) -> Result<Value> {
        let mut tokens = parse_tokens(pointer)?;
        let Some(last) = tokens.pop() else {
            return Err(invalid(pointer, "cannot remove the document root"));
        };
        match lookup_mut(&mut self.document, &tokens, pointer)? {
            Value::Object(map) => map
                .remove(&last)
                .ok_or_else(|| invalid(pointer, "no such member")),
            Value::Array(items) => {
                let index = parse_index(&last, pointer)?;
                if index >= items.len() {
                    return Err(invalid(pointer, "array index out of bounds"));
                }
                Ok(items.remove(index))
            }
            _ => Err(invalid(pointer, "parent is not a container")),
        }
    }

    fn replace(&mut self, pointer: &str, value: Value) -> Result<()> {
        let tokens = parse_tokens(pointer)?;
        let target = lookup_mut(&mut self.document, &tokens, pointer)?;
        *target = value;
        Ok(())
    }
}

fn required_value(patch: &JsonPatch) -> Result<Value> {
    patch
        .value
        .clone()
        .ok_or_else(|| invalid(&patch.path, "operation requires a value"))
}

fn invalid(pointer: &str, reason: &str) -> SchemaError {
    SchemaError::InvalidPatchTarget {
        path: pointer.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_tokens(pointer: &str) -> Result<Vec<String>> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    let Some(rest) = pointer.strip_prefix('/') else {
        return Err(invalid(pointer, "pointer must start with '/'"));
    };
    Ok(rest.split('/').map(unescape_token).collect())
}

fn parse_index(token: &str, pointer: &str) -> Result<usize> {
    if token.len() > 1 && token.starts_with('0') {
        return Err(invalid(pointer, "array index has leading zeros"));
    }
    token
        .parse()
        .map_err(|_| invalid(pointer, "expected an array index"))
}

fn lookup_mut<'v>(document: &'v mut Value, tokens: &[String], pointer: &str) -> Result<&'v mut Value> {
    let mut current = document;
    for token in tokens {
        current = match current {
            Value::Object(map) => map
                .get_mut(token)
                .ok_or_else(|| invalid(pointer, "no such member"))?,
            Value::Array(items) => {
                let index = parse_index(token, pointer)?;
                items
                    .get_mut(index)
                    .ok_or_else(|| invalid(pointer, "array index out of bounds"))?
            }
            _ => return Err(invalid(pointer, "path runs through a scalar")),
        };
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person() -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "tags": { "type": "array", "items": { "type": "string" } }
            }
        })
    }

    #[test]
    fn test_add_and_remove_members() {
        let mut state = DocumentState::new(person());
        state
            .apply_patch(&JsonPatch::add("/properties/age", json!({ "type": "number" })))
            .unwrap();
        state.apply_patch(&JsonPatch::remove("/properties/name")).unwrap();

        assert_eq!(
            state.document()["properties"],
            json!({
                "age": { "type": "number" },
                "tags": { "type": "array", "items": { "type": "string" } }
            })
        );
    }

    #[test]
    fn test_move_and_replace() {
        let state = DocumentState::from_patches(
            person(),
            &[
                JsonPatch::relocate("/properties/name", "/properties/fullName"),
                JsonPatch::replace("/properties/fullName", json!({ "type": "string", "default": "x" })),
            ],
        )
        .unwrap();
        assert_eq!(
            state.document()["properties"]["fullName"],
            json!({ "type": "string", "default": "x" })
        );
        assert!(state.document()["properties"].get("name").is_none());
    }

    #[test]
    fn test_move_up_over_own_ancestor() {
        let state = DocumentState::from_patches(
            person(),
            &[JsonPatch::relocate("/properties/tags/items", "/properties/tags")],
        )
        .unwrap();
        assert_eq!(state.document()["properties"]["tags"], json!({ "type": "string" }));
    }

    #[test]
    fn test_move_into_itself_rejected() {
        let mut state = DocumentState::new(person());
        let result = state.apply_patch(&JsonPatch::relocate(
            "/properties/tags",
            "/properties/tags/items/x",
        ));
        assert!(matches!(result, Err(SchemaError::InvalidPatchTarget { .. })));
    }

    #[test]
    fn test_missing_targets_rejected() {
        let mut state = DocumentState::new(person());
        for patch in [
            JsonPatch::remove("/properties/missing"),
            JsonPatch::replace("/properties/missing", json!({})),
            JsonPatch::add("/properties/missing/properties/x", json!({})),
            JsonPatch::remove(""),
        ] {
            assert!(
                matches!(state.apply_patch(&patch), Err(SchemaError::InvalidPatchTarget { .. })),
                "expected failure for {patch}"
            );
        }
    }

    #[test]
    fn test_array_indices() {
        let mut state = DocumentState::new(json!({ "list": [1, 3] }));
        state.apply_patch(&JsonPatch::add("/list/1", json!(2))).unwrap();
        state.apply_patch(&JsonPatch::add("/list/-", json!(4))).unwrap();
        state.apply_patch(&JsonPatch::remove("/list/0")).unwrap();
        assert_eq!(state.document(), &json!({ "list": [2, 3, 4] }));
    }

    #[test]
    fn test_root_replace() {
        let mut state = DocumentState::new(person());
        state
            .apply_patch(&JsonPatch::replace("", json!({ "type": "object" })))
            .unwrap();
        assert_eq!(state.into_document(), json!({ "type": "object" }));
    }
}
