//! Tagged binary wire codec
//!
//! Protobuf-compatible encoding driven by a [`Schema`]:
//!
//! - key: varint `(field_number << 3) | wire_type`
//! - varint (0): bool, int32/64, uint32/64, sint32/64 (zigzag), enum
//! - 64-bit (1): fixed64, sfixed64, double, little-endian
//! - length-delimited (2): string, bytes, nested message, packed repeated
//! - 32-bit (5): fixed32, sfixed32, float, little-endian
//!
//! Present optional fields are written once; repeated fields are written
//! one record per element. The reader also accepts packed numeric lists,
//! skips unknown fields, merges repeated occurrences of a singular nested
//! message and keeps the last value of a singular scalar.

use thiserror::Error;

use crate::catalog::{Schema, MAX_FIELD_NUMBER};
use crate::schema::{FieldDescriptor, FieldValue, Instance, Message, SlotError, Value, ValueType};

/// Nesting limit for decoding and encoding messages
pub const MAX_DEPTH: usize = 100;

/// Wire-level decoding and encoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("unexpected end of input")]
    EndOfInput,
    #[error("variable-length integer is too long")]
    VarIntTooLong,
    #[error("invalid field number 0")]
    InvalidFieldNumber,
    #[error("unsupported wire type {0}")]
    UnsupportedWireType(u8),
    #[error("field '{field}' expects wire type {expected}, found {actual}")]
    WireTypeMismatch {
        field: String,
        expected: u8,
        actual: u8,
    },
    #[error("field '{0}' contains invalid UTF-8")]
    InvalidUtf8(String),
    #[error("field '{field}' of type {ty} cannot hold a {value} value")]
    TypeMismatch {
        field: String,
        ty: String,
        value: &'static str,
    },
    #[error("schema {schema} expects {expected} content")]
    ShapeMismatch {
        schema: String,
        expected: &'static str,
    },
    #[error("unknown schema reference {0}")]
    UnknownSchema(String),
    #[error("nesting deeper than {MAX_DEPTH} levels")]
    RecursionLimit,
    #[error(transparent)]
    Slot(#[from] SlotError),
}

/// Wire types
pub mod wire_type {
    pub const VARINT: u8 = 0;
    pub const FIXED64: u8 = 1;
    pub const LEN: u8 = 2;
    pub const START_GROUP: u8 = 3;
    pub const END_GROUP: u8 = 4;
    pub const FIXED32: u8 = 5;
}

/// Natural wire type of a value type
pub fn wire_type_of(ty: &ValueType) -> u8 {
    match ty {
        ValueType::Bool
        | ValueType::Int32
        | ValueType::Int64
        | ValueType::UInt32
        | ValueType::UInt64
        | ValueType::SInt32
        | ValueType::SInt64
        | ValueType::Enum(_) => wire_type::VARINT,
        ValueType::Fixed64 | ValueType::SFixed64 | ValueType::Double => wire_type::FIXED64,
        ValueType::String | ValueType::Bytes | ValueType::Message(_) => wire_type::LEN,
        ValueType::Fixed32 | ValueType::SFixed32 | ValueType::Float => wire_type::FIXED32,
    }
}

// =============================================================================
// Public codec entry points
// =============================================================================

/// Decode a whole file into an instance of `schema`
pub fn decode(bytes: &[u8], schema: Schema<'_>) -> Result<Instance, WireError> {
    if schema.is_blob() {
        return Ok(Instance::Blob(bytes.to_vec()));
    }
    let mut message = schema.new_message();
    decode_into(&mut message, bytes, schema, 0)?;
    Ok(Instance::Message(message))
}

/// Encode an instance of `schema` into bytes
pub fn encode(instance: &Instance, schema: Schema<'_>) -> Result<Vec<u8>, WireError> {
    match (instance, schema.is_blob()) {
        (Instance::Blob(bytes), true) => Ok(bytes.clone()),
        (Instance::Message(message), false) => {
            let mut writer = WireWriter::new();
            writer.message(message, 0)?;
            Ok(writer.into_inner())
        }
        (_, true) => Err(WireError::ShapeMismatch {
            schema: schema.name().to_string(),
            expected: "blob",
        }),
        (_, false) => Err(WireError::ShapeMismatch {
            schema: schema.name().to_string(),
            expected: "message",
        }),
    }
}

// =============================================================================
// Writer
// =============================================================================

/// Byte sink for the wire format
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn varint(&mut self, mut n: u64) {
        loop {
            let low7 = (n & 0x7f) as u8;
            n >>= 7;
            if n == 0 {
                self.buf.push(low7);
                return;
            }
            self.buf.push(low7 | 0x80);
        }
    }

    pub fn key(&mut self, number: u32, wire_type: u8) {
        self.varint(((number as u64) << 3) | wire_type as u64);
    }

    pub fn zigzag32(&mut self, n: i32) {
        self.varint(((n << 1) ^ (n >> 31)) as u32 as u64);
    }

    pub fn zigzag64(&mut self, n: i64) {
        self.varint(((n << 1) ^ (n >> 63)) as u64);
    }

    pub fn fixed32(&mut self, n: u32) {
        self.buf.extend_from_slice(&n.to_le_bytes());
    }

    pub fn fixed64(&mut self, n: u64) {
        self.buf.extend_from_slice(&n.to_le_bytes());
    }

    pub fn len_delimited(&mut self, data: &[u8]) {
        self.varint(data.len() as u64);
        self.buf.extend_from_slice(data);
    }

    fn message(&mut self, message: &Message, depth: usize) -> Result<(), WireError> {
        if depth > MAX_DEPTH {
            return Err(WireError::RecursionLimit);
        }
        for (field, value) in message.present_fields() {
            match value {
                FieldValue::Single(v) => self.field(field, v, depth)?,
                FieldValue::Repeated(items) => {
                    for v in items {
                        self.field(field, v, depth)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn field(&mut self, field: &FieldDescriptor, value: &Value, depth: usize) -> Result<(), WireError> {
        let mismatch = || WireError::TypeMismatch {
            field: field.name.clone(),
            ty: field.ty.to_string(),
            value: value.type_name(),
        };

        self.key(field.number, wire_type_of(&field.ty));
        match (&field.ty, value) {
            (ValueType::Bool, Value::Bool(b)) => self.varint(*b as u64),
            (ValueType::Int32, Value::I32(n)) => self.varint(*n as i64 as u64),
            (ValueType::Int64, Value::I64(n)) => self.varint(*n as u64),
            (ValueType::UInt32, Value::U32(n)) => self.varint(*n as u64),
            (ValueType::UInt64, Value::U64(n)) => self.varint(*n),
            (ValueType::SInt32, Value::I32(n)) => self.zigzag32(*n),
            (ValueType::SInt64, Value::I64(n)) => self.zigzag64(*n),
            (ValueType::Fixed32, Value::U32(n)) => self.fixed32(*n),
            (ValueType::SFixed32, Value::I32(n)) => self.fixed32(*n as u32),
            (ValueType::Fixed64, Value::U64(n)) => self.fixed64(*n),
            (ValueType::SFixed64, Value::I64(n)) => self.fixed64(*n as u64),
            (ValueType::Float, Value::F32(f)) => self.fixed32(f.to_bits()),
            (ValueType::Double, Value::F64(f)) => self.fixed64(f.to_bits()),
            (ValueType::String, Value::String(s)) => self.len_delimited(s.as_bytes()),
            (ValueType::Bytes, Value::Bytes(b)) => self.len_delimited(b),
            (ValueType::Enum(_), Value::Enum(n)) => self.varint(*n as i64 as u64),
            (ValueType::Message(name), Value::Message(m)) => {
                if m.schema_name() != name {
                    return Err(mismatch());
                }
                let mut nested = WireWriter::new();
                nested.message(m, depth + 1)?;
                self.len_delimited(&nested.buf);
            }
            _ => return Err(mismatch()),
        }
        Ok(())
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Cursor over wire-format bytes
#[derive(Debug)]
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn byte(&mut self) -> Result<u8, WireError> {
        let b = *self.data.get(self.pos).ok_or(WireError::EndOfInput)?;
        self.pos += 1;
        Ok(b)
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        let end = self.pos.checked_add(n).ok_or(WireError::EndOfInput)?;
        let slice = self.data.get(self.pos..end).ok_or(WireError::EndOfInput)?;
        self.pos = end;
        Ok(slice)
    }

    /// Reads a variable-length unsigned integer (max 10 bytes)
    pub fn varint(&mut self) -> Result<u64, WireError> {
        let mut result: u64 = 0;
        for i in 0..10 {
            let b = self.byte()?;
            result |= ((b & 0x7f) as u64) << (7 * i);
            if b & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(WireError::VarIntTooLong)
    }

    pub fn fixed32(&mut self) -> Result<u32, WireError> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn fixed64(&mut self) -> Result<u64, WireError> {
        let b = self.bytes(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_le_bytes(arr))
    }

    pub fn len_delimited(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.varint()?;
        let len = usize::try_from(len).map_err(|_| WireError::EndOfInput)?;
        self.bytes(len)
    }

    /// Reads a key, returning `(field_number, wire_type)`
    pub fn key(&mut self) -> Result<(u32, u8), WireError> {
        let key = self.varint()?;
        let number = u32::try_from(key >> 3)
            .ok()
            .filter(|n| (1..=MAX_FIELD_NUMBER).contains(n))
            .ok_or(WireError::InvalidFieldNumber)?;
        Ok((number, (key & 0x7) as u8))
    }

    /// Skips the value of an unknown field
    pub fn skip(&mut self, wire_type: u8) -> Result<(), WireError> {
        match wire_type {
            wire_type::VARINT => self.varint().map(drop),
            wire_type::FIXED64 => self.bytes(8).map(drop),
            wire_type::LEN => self.len_delimited().map(drop),
            wire_type::FIXED32 => self.bytes(4).map(drop),
            other => Err(WireError::UnsupportedWireType(other)),
        }
    }

    /// Reads one scalar or enum value encoded with its natural wire type
    fn scalar(&mut self, field: &FieldDescriptor) -> Result<Value, WireError> {
        Ok(match &field.ty {
            ValueType::Bool => Value::Bool(self.varint()? != 0),
            ValueType::Int32 => Value::I32(self.varint()? as i32),
            ValueType::Int64 => Value::I64(self.varint()? as i64),
            ValueType::UInt32 => Value::U32(self.varint()? as u32),
            ValueType::UInt64 => Value::U64(self.varint()?),
            ValueType::SInt32 => {
                let n = self.varint()? as u32;
                Value::I32(((n >> 1) as i32) ^ -((n & 1) as i32))
            }
            ValueType::SInt64 => {
                let n = self.varint()?;
                Value::I64(((n >> 1) as i64) ^ -((n & 1) as i64))
            }
            ValueType::Fixed32 => Value::U32(self.fixed32()?),
            ValueType::SFixed32 => Value::I32(self.fixed32()? as i32),
            ValueType::Fixed64 => Value::U64(self.fixed64()?),
            ValueType::SFixed64 => Value::I64(self.fixed64()? as i64),
            ValueType::Float => Value::F32(f32::from_bits(self.fixed32()?)),
            ValueType::Double => Value::F64(f64::from_bits(self.fixed64()?)),
            ValueType::Enum(_) => Value::Enum(self.varint()? as i32),
            ValueType::String => {
                let raw = self.len_delimited()?;
                let s = std::str::from_utf8(raw)
                    .map_err(|_| WireError::InvalidUtf8(field.name.clone()))?;
                Value::String(s.to_string())
            }
            ValueType::Bytes => Value::Bytes(self.len_delimited()?.to_vec()),
            ValueType::Message(_) => {
                return Err(WireError::TypeMismatch {
                    field: field.name.clone(),
                    ty: field.ty.to_string(),
                    value: "scalar",
                })
            }
        })
    }
}

fn decode_into(
    message: &mut Message,
    bytes: &[u8],
    schema: Schema<'_>,
    depth: usize,
) -> Result<(), WireError> {
    if depth > MAX_DEPTH {
        return Err(WireError::RecursionLimit);
    }

    let mut reader = WireReader::new(bytes);
    while !reader.is_eof() {
        let (number, actual) = reader.key()?;
        let index = match schema.descriptor().field_by_number(number) {
            Some(index) => index,
            None => {
                reader.skip(actual)?;
                continue;
            }
        };
        let field = &schema.fields()[index];
        let expected = wire_type_of(&field.ty);

        if field.is_repeated() && actual == wire_type::LEN && field.ty.is_packable() {
            let mut packed = WireReader::new(reader.len_delimited()?);
            while !packed.is_eof() {
                message.append(index, packed.scalar(field)?)?;
            }
            continue;
        }

        if actual != expected {
            return Err(WireError::WireTypeMismatch {
                field: field.name.clone(),
                expected,
                actual,
            });
        }

        match &field.ty {
            ValueType::Message(name) => {
                let nested_schema = schema
                    .nested(name)
                    .map_err(|_| WireError::UnknownSchema(name.clone()))?;
                let payload = reader.len_delimited()?;
                if field.is_repeated() {
                    let mut nested = nested_schema.new_message();
                    decode_into(&mut nested, payload, nested_schema, depth + 1)?;
                    message.append(index, Value::Message(nested))?;
                } else if let Some(existing) = message.nested_mut(index) {
                    decode_into(existing, payload, nested_schema, depth + 1)?;
                } else {
                    let mut nested = nested_schema.new_message();
                    decode_into(&mut nested, payload, nested_schema, depth + 1)?;
                    message.set(index, FieldValue::Single(Value::Message(nested)))?;
                }
            }
            _ => {
                let value = reader.scalar(field)?;
                if field.is_repeated() {
                    message.append(index, value)?;
                } else {
                    message.set(index, FieldValue::Single(value))?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SchemaCatalog;
    use crate::schema::{EnumDescriptor, EnumValue, SchemaDescriptor};

    fn catalog() -> SchemaCatalog {
        let stat = SchemaDescriptor::message(
            "StatMod",
            vec![
                FieldDescriptor::new("stat", 1, ValueType::Enum("StatType".into())),
                FieldDescriptor::new("amount", 2, ValueType::SInt32),
            ],
        );
        let item = SchemaDescriptor::message(
            "ItemDef",
            vec![
                FieldDescriptor::new("id", 1, ValueType::String),
                FieldDescriptor::new("cost", 2, ValueType::Int32),
                FieldDescriptor::new("mod", 3, ValueType::Message("StatMod".into())),
                FieldDescriptor::new("levels", 4, ValueType::UInt32).repeated(),
                FieldDescriptor::new("weight", 5, ValueType::Float),
                FieldDescriptor::new("tags", 6, ValueType::String).append_only(),
            ],
        );
        let stat_type = EnumDescriptor {
            name: "StatType".into(),
            values: vec![
                EnumValue { name: "Body".into(), number: 0 },
                EnumValue { name: "Strength".into(), number: 2 },
            ],
        };
        SchemaCatalog::from_parts(vec![stat, item, SchemaDescriptor::blob("Credits")], vec![stat_type])
            .unwrap()
    }

    #[test]
    fn test_varint_encoding() {
        let mut w = WireWriter::new();
        w.varint(300);
        assert_eq!(w.into_inner(), vec![0xac, 0x02]);

        let mut r = WireReader::new(&[0xac, 0x02]);
        assert_eq!(r.varint().unwrap(), 300);
    }

    #[test]
    fn test_zigzag_encoding() {
        let mut w = WireWriter::new();
        w.zigzag32(-1);
        w.zigzag32(1);
        w.zigzag64(-2);
        assert_eq!(w.into_inner(), vec![1, 2, 3]);
    }

    #[test]
    fn test_known_message_bytes() {
        let catalog = catalog();
        let schema = catalog.schema("ItemDef").unwrap();
        let mut msg = schema.new_message();
        msg.set(0, FieldValue::Single(Value::String("a".into()))).unwrap();
        msg.set(1, FieldValue::Single(Value::I32(150))).unwrap();

        let bytes = encode(&Instance::Message(msg), schema).unwrap();
        assert_eq!(bytes, vec![0x0a, 0x01, b'a', 0x10, 0x96, 0x01]);
    }

    #[test]
    fn test_negative_int32_uses_ten_bytes() {
        let catalog = catalog();
        let schema = catalog.schema("ItemDef").unwrap();
        let mut msg = schema.new_message();
        msg.set(1, FieldValue::Single(Value::I32(-1))).unwrap();

        let bytes = encode(&Instance::Message(msg.clone()), schema).unwrap();
        assert_eq!(bytes.len(), 11);
        assert_eq!(decode(&bytes, schema).unwrap(), Instance::Message(msg));
    }

    #[test]
    fn test_roundtrip_populated_message() {
        let catalog = catalog();
        let schema = catalog.schema("ItemDef").unwrap();
        let stat_schema = catalog.schema("StatMod").unwrap();

        let mut stat = stat_schema.new_message();
        stat.set(0, FieldValue::Single(Value::Enum(2))).unwrap();
        stat.set(1, FieldValue::Single(Value::I32(-4))).unwrap();

        let mut msg = schema.new_message();
        msg.set(0, FieldValue::Single(Value::String("sword".into()))).unwrap();
        msg.set(2, FieldValue::Single(Value::Message(stat))).unwrap();
        msg.set(3, FieldValue::Repeated(vec![Value::U32(1), Value::U32(2)])).unwrap();
        msg.set(4, FieldValue::Single(Value::F32(2.5))).unwrap();
        msg.append(5, Value::String("rare".into())).unwrap();

        let instance = Instance::Message(msg);
        let bytes = encode(&instance, schema).unwrap();
        assert_eq!(decode(&bytes, schema).unwrap(), instance);
    }

    #[test]
    fn test_packed_repeated_accepted() {
        let catalog = catalog();
        let schema = catalog.schema("ItemDef").unwrap();
        // field 4, wire type 2, three packed varints
        let bytes = [0x22, 0x03, 0x01, 0x02, 0x03];
        let decoded = decode(&bytes, schema).unwrap();
        let msg = decoded.as_message().unwrap();
        assert_eq!(
            msg.get(3),
            Some(&FieldValue::Repeated(vec![Value::U32(1), Value::U32(2), Value::U32(3)]))
        );
    }

    #[test]
    fn test_unknown_fields_skipped() {
        let catalog = catalog();
        let schema = catalog.schema("ItemDef").unwrap();
        // field 15 varint, field 16 fixed32, then id = "x"
        let bytes = [0x78, 0x05, 0x85, 0x01, 0, 0, 0, 0, 0x0a, 0x01, b'x'];
        let decoded = decode(&bytes, schema).unwrap();
        assert_eq!(
            decoded.as_message().unwrap().get(0),
            Some(&FieldValue::Single(Value::String("x".into())))
        );
    }

    #[test]
    fn test_singular_nested_messages_merge() {
        let catalog = catalog();
        let schema = catalog.schema("ItemDef").unwrap();
        // mod { stat = 2 } followed by mod { amount = 1 (zigzag 2) }
        let bytes = [0x1a, 0x02, 0x08, 0x02, 0x1a, 0x02, 0x10, 0x02];
        let decoded = decode(&bytes, schema).unwrap();
        let Some(FieldValue::Single(Value::Message(stat))) = decoded.as_message().unwrap().get(2)
        else {
            panic!("expected nested message");
        };
        assert_eq!(stat.get(0), Some(&FieldValue::Single(Value::Enum(2))));
        assert_eq!(stat.get(1), Some(&FieldValue::Single(Value::I32(1))));
    }

    #[test]
    fn test_truncated_input_fails() {
        let catalog = catalog();
        let schema = catalog.schema("ItemDef").unwrap();
        assert_eq!(decode(&[0x0a, 0x05, b'a'], schema), Err(WireError::EndOfInput));
        assert_eq!(decode(&[0x10], schema), Err(WireError::EndOfInput));
    }

    #[test]
    fn test_wire_type_mismatch_fails() {
        let catalog = catalog();
        let schema = catalog.schema("ItemDef").unwrap();
        // field 1 (string) encoded as varint
        let err = decode(&[0x08, 0x01], schema).unwrap_err();
        assert!(matches!(err, WireError::WireTypeMismatch { .. }));
    }

    #[test]
    fn test_group_wire_type_rejected() {
        let catalog = catalog();
        let schema = catalog.schema("ItemDef").unwrap();
        // unknown field 9 with start-group wire type
        assert_eq!(
            decode(&[0x4b], schema),
            Err(WireError::UnsupportedWireType(wire_type::START_GROUP))
        );
    }

    #[test]
    fn test_oversized_field_number_rejected() {
        let catalog = catalog();
        let schema = catalog.schema("ItemDef").unwrap();

        // field number 2^32 + 1 would truncate to field 1
        let mut w = WireWriter::new();
        w.varint((((1u64 << 32) + 1) << 3) | wire_type::LEN as u64);
        w.len_delimited(b"x");
        assert_eq!(decode(&w.into_inner(), schema), Err(WireError::InvalidFieldNumber));

        // one past the largest legal field number
        let mut w = WireWriter::new();
        w.varint(((MAX_FIELD_NUMBER as u64 + 1) << 3) | wire_type::VARINT as u64);
        w.varint(1);
        assert_eq!(decode(&w.into_inner(), schema), Err(WireError::InvalidFieldNumber));
    }

    #[test]
    fn test_blob_passthrough() {
        let catalog = catalog();
        let schema = catalog.schema("Credits").unwrap();
        let decoded = decode(b"Thanks to everyone", schema).unwrap();
        assert_eq!(decoded, Instance::Blob(b"Thanks to everyone".to_vec()));
        assert_eq!(encode(&decoded, schema).unwrap(), b"Thanks to everyone".to_vec());
    }

    #[test]
    fn test_value_type_mismatch_on_encode() {
        let catalog = catalog();
        let schema = catalog.schema("ItemDef").unwrap();
        let mut msg = schema.new_message();
        msg.set(1, FieldValue::Single(Value::String("oops".into()))).unwrap();
        let err = encode(&Instance::Message(msg), schema).unwrap_err();
        assert!(matches!(err, WireError::TypeMismatch { .. }));
    }
}
