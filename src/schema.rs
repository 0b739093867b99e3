//! Schema descriptors and schema instances
//!
//! A [`SchemaDescriptor`] is plain data: a named, ordered list of
//! [`FieldDescriptor`]s. Descriptors are deserialized from catalog files and
//! never change afterwards. A [`Message`] is one instance of a descriptor,
//! holding one optional slot per declared field.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shape of a schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaShape {
    /// Field-list driven object
    #[default]
    Message,
    /// The whole payload is one opaque byte blob (e.g. raw text)
    Blob,
}

/// Whether a field holds one value or a sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    #[default]
    Optional,
    Repeated,
}

/// How a repeated field can be populated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldAccess {
    /// The whole field value can be replaced
    #[default]
    Assign,
    /// Only element-by-element appends into the field's accumulator
    Append,
}

/// Derived classification of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Scalar,
    Enum,
    NestedSchema,
    RepeatedList,
}

/// Declared type of a field value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ValueType {
    Bool,
    Int32,
    Int64,
    UInt32,
    UInt64,
    SInt32,
    SInt64,
    Fixed32,
    Fixed64,
    SFixed32,
    SFixed64,
    Float,
    Double,
    String,
    Bytes,
    /// Reference to an enum descriptor by name
    Enum(String),
    /// Reference to a nested schema descriptor by name
    Message(String),
}

impl ValueType {
    /// Whether repeated values of this type may be packed on the wire
    pub fn is_packable(&self) -> bool {
        !matches!(
            self,
            ValueType::String | ValueType::Bytes | ValueType::Message(_)
        )
    }

    /// The zero value for scalar types; `None` for enums and nested schemas
    pub fn scalar_default(&self) -> Option<Value> {
        let value = match self {
            ValueType::Bool => Value::Bool(false),
            ValueType::Int32 | ValueType::SInt32 | ValueType::SFixed32 => Value::I32(0),
            ValueType::Int64 | ValueType::SInt64 | ValueType::SFixed64 => Value::I64(0),
            ValueType::UInt32 | ValueType::Fixed32 => Value::U32(0),
            ValueType::UInt64 | ValueType::Fixed64 => Value::U64(0),
            ValueType::Float => Value::F32(0.0),
            ValueType::Double => Value::F64(0.0),
            ValueType::String => Value::String(String::new()),
            ValueType::Bytes => Value::Bytes(Vec::new()),
            ValueType::Enum(_) | ValueType::Message(_) => return None,
        };
        Some(value)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Bool => write!(f, "bool"),
            ValueType::Int32 => write!(f, "int32"),
            ValueType::Int64 => write!(f, "int64"),
            ValueType::UInt32 => write!(f, "uint32"),
            ValueType::UInt64 => write!(f, "uint64"),
            ValueType::SInt32 => write!(f, "sint32"),
            ValueType::SInt64 => write!(f, "sint64"),
            ValueType::Fixed32 => write!(f, "fixed32"),
            ValueType::Fixed64 => write!(f, "fixed64"),
            ValueType::SFixed32 => write!(f, "sfixed32"),
            ValueType::SFixed64 => write!(f, "sfixed64"),
            ValueType::Float => write!(f, "float"),
            ValueType::Double => write!(f, "double"),
            ValueType::String => write!(f, "string"),
            ValueType::Bytes => write!(f, "bytes"),
            ValueType::Enum(name) => write!(f, "enum:{}", name),
            ValueType::Message(name) => write!(f, "message:{}", name),
        }
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Some(name) = s.strip_prefix("enum:") {
            return non_empty_ref(name, s).map(ValueType::Enum);
        }
        if let Some(name) = s.strip_prefix("message:") {
            return non_empty_ref(name, s).map(ValueType::Message);
        }
        Ok(match s {
            "bool" => ValueType::Bool,
            "int32" => ValueType::Int32,
            "int64" => ValueType::Int64,
            "uint32" => ValueType::UInt32,
            "uint64" => ValueType::UInt64,
            "sint32" => ValueType::SInt32,
            "sint64" => ValueType::SInt64,
            "fixed32" => ValueType::Fixed32,
            "fixed64" => ValueType::Fixed64,
            "sfixed32" => ValueType::SFixed32,
            "sfixed64" => ValueType::SFixed64,
            "float" => ValueType::Float,
            "double" => ValueType::Double,
            "string" => ValueType::String,
            "bytes" => ValueType::Bytes,
            other => return Err(format!("unknown value type '{}'", other)),
        })
    }
}

fn non_empty_ref(name: &str, full: &str) -> std::result::Result<String, String> {
    if name.trim().is_empty() {
        Err(format!("missing type name in '{}'", full))
    } else {
        Ok(name.to_string())
    }
}

impl TryFrom<String> for ValueType {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ValueType> for String {
    fn from(value: ValueType) -> Self {
        value.to_string()
    }
}

/// A single declared field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Wire name, shared by the binary field metadata and the JSON property
    pub name: String,
    /// Binary field number
    pub number: u32,
    /// Declared value type
    #[serde(rename = "type")]
    pub ty: ValueType,
    #[serde(default)]
    pub label: Label,
    #[serde(default)]
    pub access: FieldAccess,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, number: u32, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            number,
            ty,
            label: Label::Optional,
            access: FieldAccess::Assign,
        }
    }

    pub fn repeated(mut self) -> Self {
        self.label = Label::Repeated;
        self
    }

    pub fn append_only(mut self) -> Self {
        self.label = Label::Repeated;
        self.access = FieldAccess::Append;
        self
    }

    pub fn is_repeated(&self) -> bool {
        self.label == Label::Repeated
    }

    pub fn kind(&self) -> FieldKind {
        if self.is_repeated() {
            return FieldKind::RepeatedList;
        }
        match self.ty {
            ValueType::Enum(_) => FieldKind::Enum,
            ValueType::Message(_) => FieldKind::NestedSchema,
            _ => FieldKind::Scalar,
        }
    }
}

/// A named, ordered list of fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub name: String,
    #[serde(default)]
    pub shape: SchemaShape,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

impl SchemaDescriptor {
    pub fn message(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.into(),
            shape: SchemaShape::Message,
            fields,
        }
    }

    pub fn blob(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shape: SchemaShape::Blob,
            fields: Vec::new(),
        }
    }

    pub fn is_blob(&self) -> bool {
        self.shape == SchemaShape::Blob
    }

    /// Position of the field with this wire name
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Position of the field with this binary field number
    pub fn field_by_number(&self, number: u32) -> Option<usize> {
        self.fields.iter().position(|f| f.number == number)
    }
}

/// One symbolic value of an enum
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValue {
    pub name: String,
    pub number: i32,
}

/// A named enum; the first value is the default
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDescriptor {
    pub name: String,
    pub values: Vec<EnumValue>,
}

impl EnumDescriptor {
    pub fn symbol_of(&self, number: i32) -> Option<&str> {
        self.values
            .iter()
            .find(|v| v.number == number)
            .map(|v| v.name.as_str())
    }

    /// Case-insensitive symbol lookup
    pub fn number_of(&self, symbol: &str) -> Option<i32> {
        self.values
            .iter()
            .find(|v| v.name.eq_ignore_ascii_case(symbol))
            .map(|v| v.number)
    }

    pub fn default_number(&self) -> i32 {
        self.values.first().map(|v| v.number).unwrap_or(0)
    }
}

/// A single typed value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    /// Numeric enum value; the symbol lives in the enum descriptor
    Enum(i32),
    Message(Message),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Enum(_) => "enum",
            Value::Message(_) => "message",
        }
    }
}

/// Contents of a present field slot
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Single(Value),
    Repeated(Vec<Value>),
}

/// Errors raised when writing into a message slot
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    #[error("field index {0} out of range")]
    OutOfRange(usize),

    #[error("no field named '{0}'")]
    UnknownField(String),

    #[error("field '{0}' only supports appending elements")]
    AppendOnly(String),

    #[error("field '{0}' is repeated and needs a list value")]
    ExpectedList(String),

    #[error("field '{0}' is singular and cannot hold a list")]
    ExpectedSingle(String),
}

/// An instance of a message schema
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    descriptor: Arc<SchemaDescriptor>,
    slots: Vec<Option<FieldValue>>,
}

impl Message {
    /// Default instance: every field absent
    pub fn new(descriptor: Arc<SchemaDescriptor>) -> Self {
        let slots = vec![None; descriptor.fields.len()];
        Self { descriptor, slots }
    }

    pub fn descriptor(&self) -> &Arc<SchemaDescriptor> {
        &self.descriptor
    }

    pub fn schema_name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn get(&self, index: usize) -> Option<&FieldValue> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&FieldValue> {
        self.descriptor.field_index(name).and_then(|i| self.get(i))
    }

    pub fn is_present(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    /// Present slots in declaration order
    pub fn present_fields(&self) -> impl Iterator<Item = (&FieldDescriptor, &FieldValue)> {
        self.descriptor
            .fields
            .iter()
            .zip(self.slots.iter())
            .filter_map(|(field, slot)| slot.as_ref().map(|value| (field, value)))
    }

    /// Replace the whole value of an assignable field.
    ///
    /// An empty list leaves the field absent, matching the binary encoding
    /// where an empty repeated field has no records.
    pub fn set(&mut self, index: usize, value: FieldValue) -> Result<(), SlotError> {
        let field = self
            .descriptor
            .fields
            .get(index)
            .ok_or(SlotError::OutOfRange(index))?;
        if field.access == FieldAccess::Append {
            return Err(SlotError::AppendOnly(field.name.clone()));
        }
        let value = match (field.is_repeated(), value) {
            (true, FieldValue::Repeated(items)) if items.is_empty() => None,
            (true, v @ FieldValue::Repeated(_)) => Some(v),
            (true, FieldValue::Single(_)) => return Err(SlotError::ExpectedList(field.name.clone())),
            (false, v @ FieldValue::Single(_)) => Some(v),
            (false, FieldValue::Repeated(_)) => {
                return Err(SlotError::ExpectedSingle(field.name.clone()))
            }
        };
        self.slots[index] = value;
        Ok(())
    }

    pub fn set_by_name(&mut self, name: &str, value: FieldValue) -> Result<(), SlotError> {
        let index = self
            .descriptor
            .field_index(name)
            .ok_or_else(|| SlotError::UnknownField(name.to_string()))?;
        self.set(index, value)
    }

    /// Append one element to a repeated field's accumulator
    pub fn append(&mut self, index: usize, value: Value) -> Result<(), SlotError> {
        let field = self
            .descriptor
            .fields
            .get(index)
            .ok_or(SlotError::OutOfRange(index))?;
        if !field.is_repeated() {
            return Err(SlotError::ExpectedSingle(field.name.clone()));
        }
        match &mut self.slots[index] {
            Some(FieldValue::Repeated(items)) => items.push(value),
            slot => *slot = Some(FieldValue::Repeated(vec![value])),
        }
        Ok(())
    }

    /// Mutable access to a present singular nested message
    pub(crate) fn nested_mut(&mut self, index: usize) -> Option<&mut Message> {
        match self.slots.get_mut(index) {
            Some(Some(FieldValue::Single(Value::Message(m)))) => Some(m),
            _ => None,
        }
    }
}

/// A decoded asset: either a structured message or a raw blob
#[derive(Debug, Clone, PartialEq)]
pub enum Instance {
    Message(Message),
    Blob(Vec<u8>),
}

impl Instance {
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Instance::Message(m) => Some(m),
            Instance::Blob(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_schema() -> Arc<SchemaDescriptor> {
        Arc::new(SchemaDescriptor::message(
            "ItemDef",
            vec![
                FieldDescriptor::new("id", 1, ValueType::String),
                FieldDescriptor::new("tags", 2, ValueType::String).repeated(),
                FieldDescriptor::new("mods", 3, ValueType::Int32).append_only(),
            ],
        ))
    }

    #[test]
    fn test_value_type_parse_roundtrip() {
        for text in ["int32", "sfixed64", "enum:Rarity", "message:StatMod"] {
            let ty: ValueType = text.parse().unwrap();
            assert_eq!(ty.to_string(), text);
        }
        assert!("enum:".parse::<ValueType>().is_err());
        assert!("varchar".parse::<ValueType>().is_err());
    }

    #[test]
    fn test_field_kind() {
        assert_eq!(FieldDescriptor::new("a", 1, ValueType::Bool).kind(), FieldKind::Scalar);
        assert_eq!(
            FieldDescriptor::new("a", 1, ValueType::Enum("E".into())).kind(),
            FieldKind::Enum
        );
        assert_eq!(
            FieldDescriptor::new("a", 1, ValueType::Message("M".into())).kind(),
            FieldKind::NestedSchema
        );
        assert_eq!(
            FieldDescriptor::new("a", 1, ValueType::Message("M".into())).repeated().kind(),
            FieldKind::RepeatedList
        );
    }

    #[test]
    fn test_append_only_field_rejects_assignment() {
        let mut msg = Message::new(item_schema());
        let err = msg
            .set(2, FieldValue::Repeated(vec![Value::I32(1)]))
            .unwrap_err();
        assert_eq!(err, SlotError::AppendOnly("mods".to_string()));

        msg.append(2, Value::I32(1)).unwrap();
        msg.append(2, Value::I32(2)).unwrap();
        assert_eq!(
            msg.get(2),
            Some(&FieldValue::Repeated(vec![Value::I32(1), Value::I32(2)]))
        );
    }

    #[test]
    fn test_empty_list_stays_absent() {
        let mut msg = Message::new(item_schema());
        msg.set(1, FieldValue::Repeated(Vec::new())).unwrap();
        assert!(!msg.is_present(1));
    }

    #[test]
    fn test_shape_mismatch() {
        let mut msg = Message::new(item_schema());
        assert!(msg.set(0, FieldValue::Repeated(vec![])).is_err());
        assert!(msg.set(1, FieldValue::Single(Value::String("x".into()))).is_err());
        assert!(msg.append(0, Value::String("x".into())).is_err());
    }

    #[test]
    fn test_enum_lookup_is_case_insensitive() {
        let e = EnumDescriptor {
            name: "Rarity".into(),
            values: vec![
                EnumValue { name: "Common".into(), number: 0 },
                EnumValue { name: "Rare".into(), number: 2 },
            ],
        };
        assert_eq!(e.number_of("rare"), Some(2));
        assert_eq!(e.symbol_of(2), Some("Rare"));
        assert_eq!(e.symbol_of(7), None);
        assert_eq!(e.default_number(), 0);
    }
}
