//! Deep comparison of decoded instances
//!
//! Walks two instances of the same schema side by side and reports every
//! slot that differs, addressed by a dotted path such as `stat_mods[1].amount`.

use std::fmt;

use serde::Serialize;

use crate::schema::{FieldValue, Instance, Message, Value};

/// How a path differs between the two sides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Present only on the right
    Added,
    /// Present only on the left
    Removed,
    /// Present on both sides with different values
    Changed,
}

/// One differing path
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Difference {
    pub path: String,
    pub kind: ChangeKind,
    /// Rendered left value, when present
    pub left: Option<String>,
    /// Rendered right value, when present
    pub right: Option<String>,
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ChangeKind::Added => write!(f, "+ {}: {}", self.path, self.right.as_deref().unwrap_or("")),
            ChangeKind::Removed => write!(f, "- {}: {}", self.path, self.left.as_deref().unwrap_or("")),
            ChangeKind::Changed => write!(
                f,
                "~ {}: {} -> {}",
                self.path,
                self.left.as_deref().unwrap_or(""),
                self.right.as_deref().unwrap_or("")
            ),
        }
    }
}

/// Every difference between `left` and `right`, in declaration order
pub fn diff(left: &Instance, right: &Instance) -> Vec<Difference> {
    let mut out = Vec::new();
    match (left, right) {
        (Instance::Message(l), Instance::Message(r)) => diff_messages("", l, r, &mut out),
        (Instance::Blob(l), Instance::Blob(r)) => {
            if l != r {
                out.push(changed("", render_bytes(l), render_bytes(r)));
            }
        }
        (l, r) => out.push(changed("", render_instance(l), render_instance(r))),
    }
    out
}

fn diff_messages(prefix: &str, left: &Message, right: &Message, out: &mut Vec<Difference>) {
    if left.schema_name() != right.schema_name() {
        out.push(changed(
            prefix,
            left.schema_name().to_string(),
            right.schema_name().to_string(),
        ));
        return;
    }

    for (index, field) in left.descriptor().fields.iter().enumerate() {
        let path = join(prefix, &field.name);
        match (left.get(index), right.get(index)) {
            (None, None) => {}
            (Some(l), None) => out.push(Difference {
                path,
                kind: ChangeKind::Removed,
                left: Some(render_field(l)),
                right: None,
            }),
            (None, Some(r)) => out.push(Difference {
                path,
                kind: ChangeKind::Added,
                left: None,
                right: Some(render_field(r)),
            }),
            (Some(l), Some(r)) => diff_fields(&path, l, r, out),
        }
    }
}

fn diff_fields(path: &str, left: &FieldValue, right: &FieldValue, out: &mut Vec<Difference>) {
    match (left, right) {
        (FieldValue::Single(l), FieldValue::Single(r)) => diff_values(path, l, r, out),
        (FieldValue::Repeated(l), FieldValue::Repeated(r)) => {
            for i in 0..l.len().max(r.len()) {
                let item_path = format!("{}[{}]", path, i);
                match (l.get(i), r.get(i)) {
                    (Some(a), Some(b)) => diff_values(&item_path, a, b, out),
                    (Some(a), None) => out.push(Difference {
                        path: item_path,
                        kind: ChangeKind::Removed,
                        left: Some(render_value(a)),
                        right: None,
                    }),
                    (None, Some(b)) => out.push(Difference {
                        path: item_path,
                        kind: ChangeKind::Added,
                        left: None,
                        right: Some(render_value(b)),
                    }),
                    (None, None) => {}
                }
            }
        }
        (l, r) => out.push(changed(path, render_field(l), render_field(r))),
    }
}

fn diff_values(path: &str, left: &Value, right: &Value, out: &mut Vec<Difference>) {
    match (left, right) {
        (Value::Message(l), Value::Message(r)) => diff_messages(path, l, r, out),
        // NaN never equals itself but survives a round trip unchanged
        (Value::F32(l), Value::F32(r)) if l.is_nan() && r.is_nan() => {}
        (Value::F64(l), Value::F64(r)) if l.is_nan() && r.is_nan() => {}
        (l, r) if l == r => {}
        (l, r) => out.push(changed(path, render_value(l), render_value(r))),
    }
}

fn changed(path: &str, left: String, right: String) -> Difference {
    Difference {
        path: if path.is_empty() { "<root>".to_string() } else { path.to_string() },
        kind: ChangeKind::Changed,
        left: Some(left),
        right: Some(right),
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn render_instance(instance: &Instance) -> String {
    match instance {
        Instance::Message(m) => format!("<{}>", m.schema_name()),
        Instance::Blob(b) => render_bytes(b),
    }
}

fn render_field(value: &FieldValue) -> String {
    match value {
        FieldValue::Single(v) => render_value(v),
        FieldValue::Repeated(items) => format!("[{} items]", items.len()),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Bool(v) => v.to_string(),
        Value::I32(v) => v.to_string(),
        Value::I64(v) => v.to_string(),
        Value::U32(v) => v.to_string(),
        Value::U64(v) => v.to_string(),
        Value::F32(v) => v.to_string(),
        Value::F64(v) => v.to_string(),
        Value::String(v) => format!("{:?}", v),
        Value::Bytes(v) => render_bytes(v),
        Value::Enum(v) => format!("enum {}", v),
        Value::Message(m) => format!("<{}>", m.schema_name()),
    }
}

fn render_bytes(bytes: &[u8]) -> String {
    format!("<{} bytes>", bytes.len())
}
