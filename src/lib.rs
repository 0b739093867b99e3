//! Asset Convert
//!
//! Converts game asset files between a compact tagged binary encoding and
//! editable JSON. The schema of each file is picked from its double
//! extension, `<basename>.<assettype>.<format>`.
//!
//! ## Features
//!
//! - **Schema Catalog**: asset schemas are data files, embedded at build time
//!   and replaceable from a directory
//! - **Lossless Round Trips**: field identity, repeated fields and enum
//!   symbols survive binary → JSON → binary
//! - **Fault-Tolerant JSON**: a bad field is logged and skipped, the rest of
//!   the object still loads
//! - **Batch Conversion**: whole directories, with a per-file report
//!
//! ## Architecture
//!
//! ```text
//!  sword.item.json ──► filename ──► (AssetType::Item, Format::Json)
//!                                        │              │
//!                        TypeRegistry ◄──┘              └──► FormatRegistry
//!                             │                                  │
//!                    SchemaCatalog::schema("ItemDef")     json / wire codecs
//!                             └──────────► Converter ◄───────────┘
//!                                              │
//!                                       sword.item.bytes
//! ```

pub mod asset_type;
pub mod catalog;
pub mod checksum;
pub mod config;
pub mod diff;
pub mod dispatch;
pub mod error;
pub mod filename;
pub mod format;
pub mod json;
pub mod schema;
pub mod wire;

pub use asset_type::{AssetType, TypeHandler, TypeRegistry};
pub use catalog::{Schema, SchemaCatalog};
pub use checksum::Checksum;
pub use config::{ConvertConfig, JsonStyle};
pub use diff::{ChangeKind, Difference};
pub use dispatch::{BatchReport, ConversionOutcome, ConversionPlan, ConversionRequest, Converter};
pub use error::{ConvertError, Result};
pub use format::{CodecOptions, Format, FormatHandler, FormatRegistry};
pub use json::{JsonDecoded, SkippedField};
pub use schema::{FieldDescriptor, FieldValue, Instance, Message, SchemaDescriptor, Value, ValueType};
pub use wire::WireError;
