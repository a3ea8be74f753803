use schemars::schema::{RootSchema, Schema};
use schemars::schema_for;
use serde_json::json;

use crate::HeapwiseConfig;

/// JSON schema for `heapwise.toml`.
///
/// Intended for editor tooling (TOML JSON schema integration) and CI validation.
#[must_use]
pub fn json_schema() -> RootSchema {
    let mut schema = schema_for!(HeapwiseConfig);
    schema.schema.metadata().title = Some("heapwise.toml".to_owned());
    apply_semantic_constraints(&mut schema);
    schema
}

fn apply_semantic_constraints(schema: &mut RootSchema) {
    // JSON Schema cannot express `maximum >= 2 * default`; encode the part that holds for the
    // built-in default so an explicitly small maximum is still flagged in editors.
    push_all_of(
        schema,
        schema_from_json(json!({
            "if": {
                "required": ["policy"],
                "properties": {
                    "policy": { "not": { "required": ["default_xmx_mb"] } }
                }
            },
            "then": {
                "properties": {
                    "policy": {
                        "properties": {
                            "maximum_suggested_xmx_mb": {
                                "minimum": heapwise_advisor::DEFAULT_XMX_MB * 2
                            }
                        }
                    }
                }
            }
        })),
    );
}

fn push_all_of(root: &mut RootSchema, schema: Schema) {
    let subschemas = root.schema.subschemas();
    subschemas.all_of.get_or_insert_with(Vec::new).push(schema);
}

fn schema_from_json(value: serde_json::Value) -> Schema {
    serde_json::from_value(value).expect("valid json schema")
}
