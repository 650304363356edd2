//! Schema-driven message supplier.

use crate::error::{CoreError, Result};
use crate::generator::Generator;
use crate::message::Message;
use crate::schema::{json_type_name, PathTree, ScalarKind, SchemaNode};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Sentinel for string fields without a constant or generator.
pub const STRING_SENTINEL: &str = "-1";
/// Sentinel for number and integer fields without a constant or generator.
pub const NUMBER_SENTINEL: i64 = -1;

type ConstantScope = BTreeMap<String, PathTree<Value>>;
type VariableScope = BTreeMap<String, PathTree<Generator>>;

/// Source of outbound messages, one per call.
pub trait MessageSupplier: Send + Sync {
    fn get_data(&self) -> Result<Message>;
}

/// Builds messages from a schema template, constants and generators.
///
/// The base document is synthesized once at construction; `get_data` only
/// clones it and runs the variable generators. The merged document is the
/// message payload as is.
#[derive(Debug, Clone)]
pub struct SchemaSupplier {
    base: Map<String, Value>,
    variables: VariableScope,
}

impl SchemaSupplier {
    /// Creates a supplier from a parsed schema and flat dot-path maps.
    pub fn new<C, V, K1, K2>(schema: &SchemaNode, constants: C, variables: V) -> Result<Self>
    where
        C: IntoIterator<Item = (K1, Value)>,
        V: IntoIterator<Item = (K2, Generator)>,
        K1: AsRef<str>,
        K2: AsRef<str>,
    {
        let constants = PathTree::expand(constants)?;
        let variables = PathTree::expand(variables)?;
        validate_generators(&variables)?;

        let base = match synthesize(schema, Some(&constants)) {
            Value::Object(map) => map,
            other => return Err(CoreError::RootNotObject(json_type_name(&other))),
        };

        // The correlation key, if present, must be readable.
        Message::from_document(base.clone())?;

        debug!(fields = base.len(), "synthesized base document");
        Ok(Self { base, variables })
    }

    pub fn from_json_schema<C, V, K1, K2>(
        schema: &Value,
        constants: C,
        variables: V,
    ) -> Result<Self>
    where
        C: IntoIterator<Item = (K1, Value)>,
        V: IntoIterator<Item = (K2, Generator)>,
        K1: AsRef<str>,
        K2: AsRef<str>,
    {
        Self::new(&SchemaNode::from_json(schema)?, constants, variables)
    }

    pub fn from_schema_file<C, V, K1, K2>(
        path: impl AsRef<Path>,
        constants: C,
        variables: V,
    ) -> Result<Self>
    where
        C: IntoIterator<Item = (K1, Value)>,
        V: IntoIterator<Item = (K2, Generator)>,
        K1: AsRef<str>,
        K2: AsRef<str>,
    {
        Self::new(&SchemaNode::from_file(path)?, constants, variables)
    }

    /// The base document every call starts from.
    pub fn base_document(&self) -> &Map<String, Value> {
        &self.base
    }

    /// Base document with all generators applied.
    pub fn generate_document(&self) -> Map<String, Value> {
        let mut doc = self.base.clone();
        fill_variables(&mut doc, &self.variables);
        doc
    }
}

impl MessageSupplier for SchemaSupplier {
    fn get_data(&self) -> Result<Message> {
        Message::from_document(self.generate_document())
    }
}

fn validate_generators(scope: &VariableScope) -> Result<()> {
    for node in scope.values() {
        match node {
            PathTree::Leaf(generator) => generator.validate()?,
            PathTree::Node(children) => validate_generators(children)?,
        }
    }
    Ok(())
}

/// Builds the placeholder document for `node`, taking values from the
/// constant scope that belongs to it.
fn synthesize(node: &SchemaNode, constants: Option<&ConstantScope>) -> Value {
    match node {
        SchemaNode::Object { fields } => {
            let mut out = Map::new();
            for (name, child) in fields {
                let value = match constants.and_then(|scope| scope.get(name)) {
                    Some(PathTree::Leaf(value)) => value.clone(),
                    Some(PathTree::Node(scope)) => synthesize(child, Some(scope)),
                    None => synthesize(child, None),
                };
                out.insert(name.clone(), value);
            }
            Value::Object(out)
        }
        SchemaNode::Array { item } => Value::Array(vec![synthesize(item, constants)]),
        SchemaNode::Scalar(ScalarKind::String) => Value::String(STRING_SENTINEL.to_string()),
        SchemaNode::Scalar(ScalarKind::Number | ScalarKind::Integer) => {
            Value::from(NUMBER_SENTINEL)
        }
        SchemaNode::Scalar(ScalarKind::Boolean) => Value::Bool(false),
        SchemaNode::Unknown => Value::Null,
    }
}

/// Deep-merges generated values into `doc`.
///
/// A generator only overwrites a field the base document already has; keys
/// that are missing are skipped. Branches always descend, creating an empty
/// object where the base has none.
fn fill_variables(doc: &mut Map<String, Value>, variables: &VariableScope) {
    for (key, node) in variables {
        match node {
            PathTree::Node(children) => {
                let entry = doc
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !entry.is_object() {
                    *entry = Value::Object(Map::new());
                }
                if let Value::Object(sub) = entry {
                    fill_variables(sub, children);
                }
            }
            PathTree::Leaf(generator) => {
                if let Some(slot) = doc.get_mut(key) {
                    *slot = generator.generate();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::RFC3339_LAYOUT;
    use serde_json::json;
    use std::io::Write;

    fn test_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "timestamp": {"type": "string"},
                "type": {"type": "string"},
                "unit": {"type": "string"},
                "value": {
                    "type": "object",
                    "properties": {
                        "__type": {"type": "string"},
                        "numeric_value": {"type": "number"}
                    },
                    "required": ["__type", "numeric_value"]
                }
            },
            "required": ["timestamp", "type", "unit", "value"]
        })
    }

    fn no_variables() -> Vec<(&'static str, Generator)> {
        Vec::new()
    }

    fn no_constants() -> Vec<(&'static str, Value)> {
        Vec::new()
    }

    #[test]
    fn test_base_document_from_constants() {
        let supplier = SchemaSupplier::from_json_schema(
            &test_schema(),
            [("value.__type", json!("TestType")), ("type", json!("TestType"))],
            [
                ("timestamp", Generator::timestamp(RFC3339_LAYOUT)),
                ("value.numeric_value", Generator::numeric(1000.0, 100.0)),
            ],
        )
        .unwrap();

        let expected = json!({
            "timestamp": "-1",
            "type": "TestType",
            "unit": "-1",
            "value": {"__type": "TestType", "numeric_value": -1}
        });
        assert_eq!(Value::Object(supplier.base_document().clone()), expected);
    }

    #[test]
    fn test_generated_fields_vary_constants_hold() {
        let schema = json!({
            "type": "object",
            "properties": {
                "a": {"type": "string"},
                "b": {
                    "type": "object",
                    "properties": {"c": {"type": "integer"}},
                    "required": ["c"]
                }
            },
            "required": ["a", "b"]
        });
        let supplier = SchemaSupplier::from_json_schema(
            &schema,
            [("b.c", json!(7))],
            [("a", Generator::identifier())],
        )
        .unwrap();

        let first = supplier.get_data().unwrap();
        let second = supplier.get_data().unwrap();
        let (first, second) = (first.document().unwrap(), second.document().unwrap());
        assert_eq!(first["b"]["c"], 7);
        assert_eq!(second["b"]["c"], 7);
        assert_ne!(first["a"], second["a"]);
    }

    #[test]
    fn test_base_synthesis_is_deterministic() {
        let constants = || [("type", json!("TestType")), ("value.__type", json!("X"))];
        let build = || {
            SchemaSupplier::from_json_schema(&test_schema(), constants(), no_variables()).unwrap()
        };
        let (a, b) = (build(), build());
        assert_eq!(a.base_document(), b.base_document());
        assert_eq!(a.generate_document(), *a.base_document());
    }

    #[test]
    fn test_constant_scope_follows_path() {
        // `c` at the root must not leak into `b.c`.
        let schema = json!({
            "type": "object",
            "properties": {
                "c": {"type": "integer"},
                "b": {
                    "type": "object",
                    "properties": {"c": {"type": "integer"}},
                    "required": ["c"]
                }
            },
            "required": ["c", "b"]
        });
        let supplier =
            SchemaSupplier::from_json_schema(&schema, [("c", json!(3))], no_variables()).unwrap();
        let doc = supplier.base_document();
        assert_eq!(doc["c"], 3);
        assert_eq!(doc["b"]["c"], -1);
    }

    #[test]
    fn test_generator_skips_fields_absent_from_base() {
        let supplier = SchemaSupplier::from_json_schema(
            &test_schema(),
            Vec::<(&str, Value)>::new(),
            [
                ("not_in_schema", Generator::identifier()),
                ("value.also_missing", Generator::numeric(1.0, 0.0)),
                ("value.numeric_value", Generator::numeric(5.0, 0.0)),
            ],
        )
        .unwrap();

        let doc = supplier.generate_document();
        assert!(!doc.contains_key("not_in_schema"));
        assert!(!doc["value"].as_object().unwrap().contains_key("also_missing"));
        assert_eq!(doc["value"]["numeric_value"], 5.0);
    }

    #[test]
    fn test_branch_creates_missing_object() {
        let supplier = SchemaSupplier::from_json_schema(
            &test_schema(),
            Vec::<(&str, Value)>::new(),
            [("extra.id", Generator::identifier())],
        )
        .unwrap();

        let doc = supplier.generate_document();
        // The branch exists, but its leaf was skipped because the base has no such field.
        assert_eq!(doc["extra"], json!({}));
    }

    #[test]
    fn test_array_and_boolean_placeholders() {
        let schema = json!({
            "type": "object",
            "properties": {
                "flags": {"type": "array", "items": {"type": "boolean"}},
                "blob": {"type": "binary"}
            },
            "required": ["flags", "blob"]
        });
        let supplier =
            SchemaSupplier::from_json_schema(&schema, Vec::<(&str, Value)>::new(), no_variables())
                .unwrap();
        let doc = supplier.base_document();
        assert_eq!(doc["flags"], json!([false]));
        assert_eq!(doc["blob"], Value::Null);
    }

    #[test]
    fn test_message_schema_fills_device_id() {
        let schema = json!({
            "type": "object",
            "properties": {
                "deviceInfo": {
                    "type": "object",
                    "properties": {
                        "platform": {"type": "string"},
                        "deviceID": {"type": "string"},
                        "authorizationToken": {"type": "string"}
                    },
                    "required": ["platform", "deviceID", "authorizationToken"]
                },
                "sourceName": {"type": "string"},
                "timestamp": {"type": "string"}
            },
            "required": ["deviceInfo", "sourceName", "timestamp"]
        });
        let supplier = SchemaSupplier::from_json_schema(
            &schema,
            [("deviceInfo.platform", json!("iOS")), ("sourceName", json!("Test iPhone"))],
            [
                (
                    "deviceInfo.deviceID",
                    Generator::Identifier {
                        prefix: "test-device-".to_string(),
                    },
                ),
                ("timestamp", Generator::timestamp(RFC3339_LAYOUT)),
            ],
        )
        .unwrap();

        let msg = supplier.get_data().unwrap();
        assert!(msg.device_id().starts_with("test-device-"));
        let doc = msg.document().unwrap();
        assert_eq!(doc["deviceInfo"]["deviceID"], msg.device_id());
        assert_eq!(doc["deviceInfo"]["platform"], "iOS");
        assert_eq!(doc["deviceInfo"]["authorizationToken"], "-1");
        assert_eq!(doc["sourceName"], "Test iPhone");
        assert_ne!(doc["timestamp"], "-1");
    }

    #[test]
    fn test_wire_payload_is_merged_document() {
        let schema = json!({
            "type": "object",
            "properties": {
                "deviceInfo": {
                    "type": "object",
                    "properties": {
                        "deviceID": {"type": "string"},
                        "firmware": {"type": "string"}
                    },
                    "required": ["deviceID", "firmware"]
                },
                "measurements": {
                    "type": "object",
                    "properties": {
                        "instantaneous": {"type": "array", "items": test_schema()}
                    },
                    "required": ["instantaneous"]
                }
            },
            "required": ["deviceInfo", "measurements"]
        });
        let supplier = SchemaSupplier::from_json_schema(
            &schema,
            [
                ("deviceInfo.firmware", json!("1.2.3")),
                ("measurements.instantaneous.value.__type", json!("TestType")),
            ],
            [("deviceInfo.deviceID", Generator::identifier())],
        )
        .unwrap();

        let msg = supplier.get_data().unwrap();
        let wire: Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();
        assert_eq!(wire, Value::Object(msg.document().unwrap().clone()));
        assert_eq!(wire["deviceInfo"]["firmware"], "1.2.3");
        assert_eq!(wire["deviceInfo"]["deviceID"], msg.device_id());
        assert_eq!(wire["measurements"]["instantaneous"][0]["value"]["__type"], "TestType");
        assert_eq!(wire["measurements"]["instantaneous"][0]["value"]["numeric_value"], -1);
        // Nothing the schema did not ask for
        assert!(wire.get("batchInfo").is_none());
        assert!(wire.get("sourceName").is_none());
        assert_eq!(wire["measurements"].as_object().unwrap().len(), 1);
    }

    #[test]
    fn test_construction_errors() {
        let not_object = json!({"type": "string"});
        assert!(matches!(
            SchemaSupplier::from_json_schema(&not_object, no_constants(), no_variables()),
            Err(CoreError::RootNotObject("string"))
        ));

        assert!(matches!(
            SchemaSupplier::from_json_schema(
                &test_schema(),
                Vec::<(&str, Value)>::new(),
                [("unit", Generator::numeric(1.0, -1.0))]
            ),
            Err(CoreError::InvalidGenerator(_))
        ));

        // The correlation key must be readable
        let wrong_shape = json!({
            "type": "object",
            "properties": {"deviceInfo": {"type": "string"}},
            "required": ["deviceInfo"]
        });
        assert!(matches!(
            SchemaSupplier::from_json_schema(&wrong_shape, no_constants(), no_variables()),
            Err(CoreError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_from_schema_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", test_schema()).unwrap();

        let supplier =
            SchemaSupplier::from_schema_file(file.path(), [("unit", json!("bpm"))], no_variables())
                .unwrap();
        assert_eq!(supplier.base_document()["unit"], "bpm");
    }
}
