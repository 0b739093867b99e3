//! JSON codec bridge
//!
//! Maps schema instances to JSON objects and back. Property names are the
//! fields' wire names, emitted in declaration order; enums are written as
//! their symbolic names; absent fields are omitted rather than written as
//! `null`.
//!
//! Decoding is best-effort per field: a property that cannot be converted is
//! reported as a [`SkippedField`] and the rest of the object still decodes.

use base64::Engine;
use serde_json::{Map, Number, Value as Json};

use crate::catalog::Schema;
use crate::config::JsonStyle;
use crate::error::{ConvertError, Result};
use crate::schema::{
    FieldAccess, FieldDescriptor, FieldKind, FieldValue, Instance, Message, Value, ValueType,
};
use crate::wire::MAX_DEPTH;

/// A property that was ignored while decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedField {
    /// Dotted path of the property, e.g. `stat_mods[1].amount`
    pub path: String,
    pub reason: String,
}

/// Result of decoding JSON into an instance
#[derive(Debug, Clone)]
pub struct JsonDecoded {
    pub instance: Instance,
    pub skipped: Vec<SkippedField>,
}

// =============================================================================
// Text entry points
// =============================================================================

/// Encode an instance as JSON text, terminated by a newline
pub fn encode(instance: &Instance, schema: Schema<'_>, style: JsonStyle) -> Result<Vec<u8>> {
    let value = to_value(instance, schema)?;
    let mut text = match style {
        JsonStyle::Pretty => serde_json::to_vec_pretty(&value)?,
        JsonStyle::Compact => serde_json::to_vec(&value)?,
    };
    text.push(b'\n');
    Ok(text)
}

/// Decode JSON text, logging and dropping any skipped fields
pub fn decode(bytes: &[u8], schema: Schema<'_>) -> Result<Instance> {
    let decoded = decode_with_report(bytes, schema)?;
    Ok(decoded.instance)
}

/// Decode JSON text and keep the skipped-field diagnostics
pub fn decode_with_report(bytes: &[u8], schema: Schema<'_>) -> Result<JsonDecoded> {
    let value: Json = serde_json::from_slice(bytes)?;
    from_value(&value, schema)
}

// =============================================================================
// Encode
// =============================================================================

/// Convert an instance to a JSON value
pub fn to_value(instance: &Instance, schema: Schema<'_>) -> Result<Json> {
    match (instance, schema.is_blob()) {
        (Instance::Blob(bytes), true) => {
            let text = std::str::from_utf8(bytes).map_err(|e| ConvertError::Encode {
                schema: schema.name().to_string(),
                reason: format!("blob is not valid UTF-8 text: {}", e),
            })?;
            Ok(Json::String(text.to_string()))
        }
        (Instance::Message(message), false) => message_to_json(message, schema, 0),
        (_, blob) => Err(ConvertError::Encode {
            schema: schema.name().to_string(),
            reason: format!("expected {} instance", if blob { "blob" } else { "message" }),
        }),
    }
}

fn message_to_json(message: &Message, schema: Schema<'_>, depth: usize) -> Result<Json> {
    if message.schema_name() != schema.name() {
        return Err(encode_error(
            schema,
            format!("instance of {} does not match schema", message.schema_name()),
        ));
    }
    if depth > MAX_DEPTH {
        return Err(encode_error(schema, format!("nesting deeper than {}", MAX_DEPTH)));
    }

    let mut object = Map::new();
    for (field, value) in message.present_fields() {
        let json = match (field.kind(), value) {
            (FieldKind::RepeatedList, FieldValue::Repeated(items)) => Json::Array(
                items
                    .iter()
                    .map(|v| value_to_json(field, v, schema, depth))
                    .collect::<Result<Vec<_>>>()?,
            ),
            (FieldKind::Scalar | FieldKind::Enum | FieldKind::NestedSchema, FieldValue::Single(v)) => {
                value_to_json(field, v, schema, depth)?
            }
            (kind, _) => {
                return Err(encode_error(
                    schema,
                    format!("field '{}' has the wrong shape for {:?}", field.name, kind),
                ))
            }
        };
        object.insert(field.name.clone(), json);
    }
    Ok(Json::Object(object))
}

fn value_to_json(
    field: &FieldDescriptor,
    value: &Value,
    schema: Schema<'_>,
    depth: usize,
) -> Result<Json> {
    let json = match (&field.ty, value) {
        (ValueType::Bool, Value::Bool(b)) => Json::Bool(*b),
        (ValueType::Int32 | ValueType::SInt32 | ValueType::SFixed32, Value::I32(n)) => {
            Json::from(*n)
        }
        (ValueType::Int64 | ValueType::SInt64 | ValueType::SFixed64, Value::I64(n)) => {
            Json::from(*n)
        }
        (ValueType::UInt32 | ValueType::Fixed32, Value::U32(n)) => Json::from(*n),
        (ValueType::UInt64 | ValueType::Fixed64, Value::U64(n)) => Json::from(*n),
        (ValueType::Float, Value::F32(f)) => float_to_json(*f as f64, Some(*f)),
        (ValueType::Double, Value::F64(f)) => float_to_json(*f, None),
        (ValueType::String, Value::String(s)) => Json::String(s.clone()),
        (ValueType::Bytes, Value::Bytes(b)) => {
            Json::String(base64::engine::general_purpose::STANDARD.encode(b))
        }
        (ValueType::Enum(name), Value::Enum(n)) => match schema.enumeration(name)?.symbol_of(*n) {
            Some(symbol) => Json::String(symbol.to_string()),
            None => Json::from(*n),
        },
        (ValueType::Message(name), Value::Message(m)) => {
            message_to_json(m, schema.nested(name)?, depth + 1)?
        }
        (ty, v) => {
            return Err(encode_error(
                schema,
                format!("field '{}' of type {} holds a {} value", field.name, ty, v.type_name()),
            ))
        }
    };
    Ok(json)
}

/// Finite floats become numbers; `f32` values use their shortest decimal form
fn float_to_json(f: f64, single: Option<f32>) -> Json {
    if f.is_nan() {
        return Json::String("NaN".to_string());
    }
    if f.is_infinite() {
        let text = if f > 0.0 { "Infinity" } else { "-Infinity" };
        return Json::String(text.to_string());
    }
    let f = match single {
        Some(s) => s.to_string().parse::<f64>().unwrap_or(f),
        None => f,
    };
    Number::from_f64(f).map(Json::Number).unwrap_or(Json::Null)
}

fn encode_error(schema: Schema<'_>, reason: String) -> ConvertError {
    ConvertError::Encode {
        schema: schema.name().to_string(),
        reason,
    }
}

// =============================================================================
// Decode
// =============================================================================

/// Convert a JSON value to an instance of `schema`
pub fn from_value(value: &Json, schema: Schema<'_>) -> Result<JsonDecoded> {
    if schema.is_blob() {
        let text = value.as_str().ok_or_else(|| ConvertError::Decode {
            schema: schema.name().to_string(),
            reason: "expected a JSON string".to_string(),
        })?;
        return Ok(JsonDecoded {
            instance: Instance::Blob(text.as_bytes().to_vec()),
            skipped: Vec::new(),
        });
    }

    let object = value.as_object().ok_or_else(|| ConvertError::Decode {
        schema: schema.name().to_string(),
        reason: "expected a JSON object".to_string(),
    })?;

    let mut decoder = ObjectDecoder::default();
    let message = decoder.message(object, schema, "", 0);
    Ok(JsonDecoded {
        instance: Instance::Message(message),
        skipped: decoder.skipped,
    })
}

#[derive(Default)]
struct ObjectDecoder {
    skipped: Vec<SkippedField>,
}

impl ObjectDecoder {
    fn message(&mut self, object: &Map<String, Json>, schema: Schema<'_>, path: &str, depth: usize) -> Message {
        let mut message = schema.new_message();

        for key in object.keys() {
            if schema.descriptor().field_index(key).is_none() {
                tracing::debug!(schema = %schema.name(), property = %join(path, key), "ignoring unknown property");
            }
        }

        for (index, field) in schema.fields().iter().enumerate() {
            let token = match object.get(&field.name) {
                None | Some(Json::Null) => continue,
                Some(token) => token,
            };
            let field_path = join(path, &field.name);

            let outcome = if field.kind() == FieldKind::RepeatedList {
                self.repeated(field, token, schema, &field_path, depth)
                    .and_then(|items| match field.access {
                        FieldAccess::Assign => message
                            .set(index, FieldValue::Repeated(items))
                            .map_err(|e| e.to_string()),
                        FieldAccess::Append => items
                            .into_iter()
                            .try_for_each(|item| message.append(index, item))
                            .map_err(|e| e.to_string()),
                    })
            } else {
                self.value(field, token, schema, &field_path, depth)
                    .and_then(|v| {
                        message
                            .set(index, FieldValue::Single(v))
                            .map_err(|e| e.to_string())
                    })
            };

            if let Err(reason) = outcome {
                tracing::warn!(schema = %schema.name(), field = %field_path, %reason, "skipping field");
                self.skipped.push(SkippedField {
                    path: field_path,
                    reason,
                });
            }
        }

        message
    }

    fn repeated(
        &mut self,
        field: &FieldDescriptor,
        token: &Json,
        schema: Schema<'_>,
        path: &str,
        depth: usize,
    ) -> std::result::Result<Vec<Value>, String> {
        let items = token
            .as_array()
            .ok_or_else(|| format!("expected an array, found {}", json_kind(token)))?;
        items
            .iter()
            .enumerate()
            .map(|(i, item)| self.value(field, item, schema, &format!("{}[{}]", path, i), depth))
            .collect()
    }

    fn value(
        &mut self,
        field: &FieldDescriptor,
        token: &Json,
        schema: Schema<'_>,
        path: &str,
        depth: usize,
    ) -> std::result::Result<Value, String> {
        let mismatch = || format!("expected {}, found {}", field.ty, json_kind(token));

        Ok(match &field.ty {
            ValueType::Bool => Value::Bool(token.as_bool().ok_or_else(mismatch)?),
            ValueType::Int32 | ValueType::SInt32 | ValueType::SFixed32 => {
                let n = integer_i64(token).ok_or_else(mismatch)?;
                Value::I32(i32::try_from(n).map_err(|_| format!("{} is out of range for {}", n, field.ty))?)
            }
            ValueType::Int64 | ValueType::SInt64 | ValueType::SFixed64 => {
                Value::I64(integer_i64(token).ok_or_else(mismatch)?)
            }
            ValueType::UInt32 | ValueType::Fixed32 => {
                let n = integer_u64(token).ok_or_else(mismatch)?;
                Value::U32(u32::try_from(n).map_err(|_| format!("{} is out of range for {}", n, field.ty))?)
            }
            ValueType::UInt64 | ValueType::Fixed64 => {
                Value::U64(integer_u64(token).ok_or_else(mismatch)?)
            }
            ValueType::Float => Value::F32(float_from_json(token).ok_or_else(mismatch)? as f32),
            ValueType::Double => Value::F64(float_from_json(token).ok_or_else(mismatch)?),
            ValueType::String => Value::String(token.as_str().ok_or_else(mismatch)?.to_string()),
            ValueType::Bytes => {
                let text = token.as_str().ok_or_else(mismatch)?;
                Value::Bytes(
                    base64::engine::general_purpose::STANDARD
                        .decode(text)
                        .map_err(|e| format!("invalid base64: {}", e))?,
                )
            }
            ValueType::Enum(name) => {
                let descriptor = schema.enumeration(name).map_err(|e| e.to_string())?;
                match token {
                    Json::String(symbol) => Value::Enum(
                        descriptor
                            .number_of(symbol)
                            .ok_or_else(|| format!("unknown {} value '{}'", name, symbol))?,
                    ),
                    Json::Number(_) => {
                        let n = integer_i64(token).ok_or_else(mismatch)?;
                        Value::Enum(i32::try_from(n).map_err(|_| format!("{} is out of range for enum", n))?)
                    }
                    _ => return Err(mismatch()),
                }
            }
            ValueType::Message(name) => {
                let nested = schema.nested(name).map_err(|e| e.to_string())?;
                let object = token.as_object().ok_or_else(mismatch)?;
                if depth >= MAX_DEPTH {
                    return Err(format!("nesting deeper than {}", MAX_DEPTH));
                }
                Value::Message(self.message(object, nested, path, depth + 1))
            }
        })
    }
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

fn json_kind(token: &Json) -> &'static str {
    match token {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

/// Integers may also arrive as decimal strings (common for 64-bit values)
fn integer_i64(token: &Json) -> Option<i64> {
    match token {
        Json::Number(n) => n.as_i64(),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn integer_u64(token: &Json) -> Option<u64> {
    match token {
        Json::Number(n) => n.as_u64(),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn float_from_json(token: &Json) -> Option<f64> {
    match token {
        Json::Number(n) => n.as_f64(),
        Json::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            _ => None,
        },
        _ => None,
    }
}
