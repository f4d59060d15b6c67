use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Context;
use crate::interpolate::{interpolate_value, InterpolationError};

/// A typed field descriptor, used for request form schemas and for
/// validating a workflow's declared `schema`/`layout` pair.
///
/// `Field` is the untyped escape hatch: it interpolates its subject
/// generically (recursing through any JSON shape) rather than enforcing a
/// particular structure, matching the original system's free-form
/// `Field()` scheme type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Integer,
    Boolean,
    Token,
    Uuid,
    Map(Box<FieldKind>),
    Structure(BTreeMap<String, FieldKind>),
    Sequence(Box<FieldKind>),
    Field,
}

impl FieldKind {
    /// Interpolates `subject` against `ctx` according to this field's shape.
    pub fn interpolate(&self, subject: &Value, ctx: &Context) -> Result<Value, InterpolationError> {
        match self {
            FieldKind::Text | FieldKind::Token | FieldKind::Integer | FieldKind::Boolean | FieldKind::Uuid => {
                interpolate_value(subject, ctx)
            }
            FieldKind::Field => interpolate_value(subject, ctx),
            FieldKind::Map(inner) => {
                let Value::Object(map) = subject else {
                    return interpolate_value(subject, ctx);
                };
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, value) in map {
                    out.insert(key.clone(), inner.interpolate(value, ctx)?);
                }
                Ok(Value::Object(out))
            }
            FieldKind::Structure(fields) => {
                let Value::Object(map) = subject else {
                    return interpolate_value(subject, ctx);
                };
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, value) in map {
                    match fields.get(key) {
                        Some(field) => out.insert(key.clone(), field.interpolate(value, ctx)?),
                        None => out.insert(key.clone(), interpolate_value(value, ctx)?),
                    };
                }
                Ok(Value::Object(out))
            }
            FieldKind::Sequence(inner) => {
                let Value::Array(items) = subject else {
                    return interpolate_value(subject, ctx);
                };
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(inner.interpolate(item, ctx)?);
                }
                Ok(Value::Array(out))
            }
        }
    }

    /// Field names reachable one level down, used by layout/schema
    /// bijection checks. Scalar kinds have none; `Structure` exposes its
    /// declared keys.
    pub fn field_names(&self) -> Vec<&str> {
        match self {
            FieldKind::Structure(fields) => fields.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }
}
