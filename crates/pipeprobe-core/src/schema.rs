//! Schema templates and dot-path trees.
//!
//! A schema template is parsed once into a [`SchemaNode`] tree; flat
//! `a.b.c -> value` maps are expanded into [`PathTree`]s. The supplier walks
//! both without any runtime type inspection.

use crate::error::{CoreError, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Primitive JSON schema types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    String,
    Number,
    Integer,
    Boolean,
}

/// Required shape of a document.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    /// Required fields in declaration order
    Object { fields: Vec<(String, SchemaNode)> },
    Array { item: Box<SchemaNode> },
    Scalar(ScalarKind),
    /// Missing or unsupported `type`
    Unknown,
}

impl SchemaNode {
    /// Builds the tree from a JSON schema document.
    ///
    /// Only fields listed in `required` that are also described in
    /// `properties` are kept.
    pub fn from_json(schema: &Value) -> Result<Self> {
        let obj = match schema {
            Value::Object(obj) => obj,
            Value::Null => return Ok(SchemaNode::Unknown),
            other => {
                return Err(CoreError::InvalidSchema(format!(
                    "schema node must be an object, got {}",
                    json_type_name(other)
                )))
            }
        };

        let ty = obj.get("type").and_then(Value::as_str).unwrap_or_default();
        let node = match ty {
            "object" => {
                let properties = obj.get("properties").and_then(Value::as_object);
                let required = obj.get("required").and_then(Value::as_array);

                let mut fields = Vec::new();
                if let (Some(properties), Some(required)) = (properties, required) {
                    for name in required {
                        let name = name.as_str().ok_or_else(|| {
                            CoreError::InvalidSchema(format!(
                                "required entries must be strings, got {name}"
                            ))
                        })?;
                        if let Some(prop) = properties.get(name) {
                            fields.push((name.to_string(), SchemaNode::from_json(prop)?));
                        }
                    }
                }
                SchemaNode::Object { fields }
            }
            "array" => {
                let item = match obj.get("items") {
                    Some(items) => SchemaNode::from_json(items)?,
                    None => SchemaNode::Unknown,
                };
                SchemaNode::Array {
                    item: Box::new(item),
                }
            }
            "string" => SchemaNode::Scalar(ScalarKind::String),
            "number" => SchemaNode::Scalar(ScalarKind::Number),
            "integer" => SchemaNode::Scalar(ScalarKind::Integer),
            "boolean" => SchemaNode::Scalar(ScalarKind::Boolean),
            _ => SchemaNode::Unknown,
        };
        Ok(node)
    }

    pub fn from_str(schema: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(schema)?;
        Self::from_json(&value)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_str(&content)
    }
}

/// A flat dot-path map expanded into nested form.
#[derive(Debug, Clone, PartialEq)]
pub enum PathTree<T> {
    Leaf(T),
    Node(BTreeMap<String, PathTree<T>>),
}

impl<T> PathTree<T> {
    /// Expands `"a.b.c" -> v` entries into a nested tree.
    ///
    /// Fails on empty segments and when a path is used both as a value and
    /// as the parent of another path.
    pub fn expand<I, K>(flat: I) -> Result<BTreeMap<String, PathTree<T>>>
    where
        I: IntoIterator<Item = (K, T)>,
        K: AsRef<str>,
    {
        let mut root: BTreeMap<String, PathTree<T>> = BTreeMap::new();

        for (path, value) in flat {
            let path = path.as_ref();
            let parts: Vec<&str> = path.split('.').collect();
            if parts.iter().any(|p| p.is_empty()) {
                return Err(CoreError::InvalidPath(path.to_string()));
            }

            let (last, parents) = parts
                .split_last()
                .ok_or_else(|| CoreError::InvalidPath(path.to_string()))?;

            let mut cursor = &mut root;
            for part in parents {
                let entry = cursor
                    .entry(part.to_string())
                    .or_insert_with(|| PathTree::Node(BTreeMap::new()));
                cursor = match entry {
                    PathTree::Node(children) => children,
                    PathTree::Leaf(_) => return Err(CoreError::PathConflict(path.to_string())),
                };
            }

            if cursor.contains_key(*last) {
                return Err(CoreError::PathConflict(path.to_string()));
            }
            cursor.insert(last.to_string(), PathTree::Leaf(value));
        }

        Ok(root)
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
