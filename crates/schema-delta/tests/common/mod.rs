#![allow(dead_code)]

use schema_delta::prelude::*;

/// Installs a test-scoped subscriber so `RUST_LOG`-style output shows up
/// with `--nocapture`. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

pub fn path(pointer: &str) -> SchemaPath {
    SchemaPath::from_json_pointer(pointer)
        .unwrap_or_else(|e| panic!("Invalid pointer: {pointer}\nError: {e}"))
}

/// A small record schema used across scenarios.
pub fn person() -> SchemaTree {
    SchemaTree::object()
        .with_id("root")
        .with_field("name", SchemaNode::string().with_id("name"))
        .with_field("email", SchemaNode::string().with_id("email"))
        .with_field(
            "address",
            SchemaTree::object()
                .with_id("address")
                .with_field("street", SchemaNode::string().with_id("street"))
                .with_field("city", SchemaNode::string().with_id("city")),
        )
        .with_field(
            "tags",
            SchemaTree::array(SchemaNode::string().with_id("tag")).with_id("tags"),
        )
}

/// One-line rendering of each op, e.g. `move /properties/a -> /properties/b`.
pub fn summary(patches: &[JsonPatch]) -> Vec<String> {
    patches.iter().map(ToString::to_string).collect()
}

/// Generates the script for `diff` and checks that replaying it onto the
/// serialized baseline yields the serialized live tree.
pub fn assert_round_trip(diff: &SchemaDiff) -> Vec<JsonPatch> {
    let patches = diff.generate_patches();
    let serializer = JsonSchemaSerializer::new();
    let saved = serializer.serialize_tree(diff.base());
    let expected = serializer.serialize_tree(diff.current());

    let state = DocumentState::from_patches(saved, &patches).unwrap_or_else(|e| {
        panic!(
            "Replay failed: {e}\nScript:\n  {}",
            summary(&patches).join("\n  ")
        )
    });
    assert_eq!(
        state.document(),
        &expected,
        "Round-trip mismatch.\nScript:\n  {}",
        summary(&patches).join("\n  ")
    );
    patches
}
