//! Schema Catalog
//!
//! Loads schema and enum descriptors from catalog files, either embedded in
//! the binary (compiled via `include_dir!`) or read from a directory, and
//! checks every cross-reference once so that codecs can rely on them.
//!
//! ## Catalog file format
//!
//! ```json
//! {
//!   "enums": [
//!     { "name": "Rarity", "values": [ { "name": "Common", "number": 0 } ] }
//!   ],
//!   "schemas": [
//!     {
//!       "name": "ItemDef",
//!       "fields": [
//!         { "name": "id", "number": 1, "type": "string" },
//!         { "name": "rarity", "number": 2, "type": "enum:Rarity" },
//!         { "name": "tags", "number": 3, "type": "string", "label": "repeated" }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use include_dir::{include_dir, Dir};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::checksum::Checksum;
use crate::error::{ConvertError, Result};
use crate::schema::{
    EnumDescriptor, FieldAccess, FieldDescriptor, Message, SchemaDescriptor, Value, ValueType,
};

static EMBEDDED_SCHEMAS: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/schemas");

/// Largest field number the wire format can carry
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;

/// Contents of one catalog file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub enums: Vec<EnumDescriptor>,
    #[serde(default)]
    pub schemas: Vec<SchemaDescriptor>,
}

/// Immutable set of schema and enum descriptors
#[derive(Debug)]
pub struct SchemaCatalog {
    schemas: BTreeMap<String, Arc<SchemaDescriptor>>,
    enums: BTreeMap<String, EnumDescriptor>,
    checksum: Checksum,
}

impl SchemaCatalog {
    /// The catalog compiled into the binary. Built once per process.
    pub fn embedded() -> Result<&'static SchemaCatalog> {
        static CATALOG: OnceLock<std::result::Result<SchemaCatalog, String>> = OnceLock::new();

        CATALOG
            .get_or_init(|| {
                let mut files = Vec::new();
                collect_embedded_files(&EMBEDDED_SCHEMAS, &mut files);
                SchemaCatalog::from_sources(files).map_err(|e| e.to_string())
            })
            .as_ref()
            .map_err(|e| ConvertError::catalog(e.clone()))
    }

    /// Load every `.json` catalog file under a directory
    pub fn from_directory(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(ConvertError::catalog(format!(
                "catalog directory not found: {}",
                dir.display()
            )));
        }

        let mut files: Vec<(PathBuf, String)> = Vec::new();
        for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_file() || path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            let relative = path.strip_prefix(dir).unwrap_or(path).to_path_buf();
            files.push((relative, fs::read_to_string(path)?));
        }

        if files.is_empty() {
            return Err(ConvertError::catalog(format!(
                "no catalog files in {}",
                dir.display()
            )));
        }

        Self::from_sources(files.iter().map(|(p, c)| (p.as_path(), c.as_str())))
    }

    /// Parse catalog files given as `(path, content)` pairs
    pub fn from_sources<'a, I>(sources: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a Path, &'a str)>,
    {
        let mut enums = Vec::new();
        let mut schemas = Vec::new();
        let mut parts: Vec<(String, &'a str)> = Vec::new();

        for (path, content) in sources {
            let file: CatalogFile = serde_json::from_str(content).map_err(|e| {
                ConvertError::catalog(format!("invalid catalog file {}: {}", path.display(), e))
            })?;
            enums.extend(file.enums);
            schemas.extend(file.schemas);
            parts.push((path.to_string_lossy().replace('\\', "/"), content));
        }

        let checksum = Checksum::from_named_parts(
            parts.iter().map(|(name, content)| (name.as_str(), content.as_bytes())),
        );
        Self::build(schemas, enums, checksum)
    }

    /// Build a catalog from descriptors directly
    pub fn from_parts(schemas: Vec<SchemaDescriptor>, enums: Vec<EnumDescriptor>) -> Result<Self> {
        let file = CatalogFile { enums, schemas };
        let content = serde_json::to_vec(&file)?;
        let checksum = Checksum::from_bytes(&content);
        Self::build(file.schemas, file.enums, checksum)
    }

    fn build(
        schemas: Vec<SchemaDescriptor>,
        enums: Vec<EnumDescriptor>,
        checksum: Checksum,
    ) -> Result<Self> {
        let mut catalog = Self {
            schemas: BTreeMap::new(),
            enums: BTreeMap::new(),
            checksum,
        };

        for e in enums {
            if e.values.is_empty() {
                return Err(ConvertError::catalog(format!("enum {} has no values", e.name)));
            }
            let name = e.name.clone();
            if catalog.enums.insert(name.clone(), e).is_some() {
                return Err(ConvertError::catalog(format!("duplicate enum {}", name)));
            }
        }

        for s in schemas {
            let name = s.name.clone();
            if catalog.enums.contains_key(&name) {
                return Err(ConvertError::catalog(format!(
                    "{} is declared as both an enum and a schema",
                    name
                )));
            }
            if catalog.schemas.insert(name.clone(), Arc::new(s)).is_some() {
                return Err(ConvertError::catalog(format!("duplicate schema {}", name)));
            }
        }

        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<()> {
        for schema in self.schemas.values() {
            if schema.is_blob() && !schema.fields.is_empty() {
                return Err(ConvertError::catalog(format!(
                    "blob schema {} cannot declare fields",
                    schema.name
                )));
            }

            let mut names = HashSet::new();
            let mut numbers = HashSet::new();
            for field in &schema.fields {
                self.validate_field(schema, field)?;
                if !names.insert(field.name.as_str()) {
                    return Err(ConvertError::catalog(format!(
                        "{}: duplicate field name '{}'",
                        schema.name, field.name
                    )));
                }
                if !numbers.insert(field.number) {
                    return Err(ConvertError::catalog(format!(
                        "{}: duplicate field number {}",
                        schema.name, field.number
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_field(&self, schema: &SchemaDescriptor, field: &FieldDescriptor) -> Result<()> {
        if field.number == 0 || field.number > MAX_FIELD_NUMBER {
            return Err(ConvertError::catalog(format!(
                "{}.{}: field number {} out of range",
                schema.name, field.name, field.number
            )));
        }
        if field.access == FieldAccess::Append && !field.is_repeated() {
            return Err(ConvertError::catalog(format!(
                "{}.{}: append access requires a repeated field",
                schema.name, field.name
            )));
        }
        match &field.ty {
            ValueType::Enum(name) if !self.enums.contains_key(name) => {
                Err(ConvertError::catalog(format!(
                    "{}.{}: unknown enum {}",
                    schema.name, field.name, name
                )))
            }
            ValueType::Message(name) => match self.schemas.get(name) {
                None => Err(ConvertError::catalog(format!(
                    "{}.{}: unknown schema {}",
                    schema.name, field.name, name
                ))),
                Some(nested) if nested.is_blob() => Err(ConvertError::catalog(format!(
                    "{}.{}: blob schema {} cannot be nested",
                    schema.name, field.name, name
                ))),
                Some(_) => Ok(()),
            },
            _ => Ok(()),
        }
    }

    /// View of a named schema
    pub fn schema(&self, name: &str) -> Option<Schema<'_>> {
        self.schemas.get(name).map(|descriptor| Schema {
            catalog: self,
            descriptor,
        })
    }

    pub fn enumeration(&self, name: &str) -> Option<&EnumDescriptor> {
        self.enums.get(name)
    }

    /// Schema names, sorted
    pub fn schema_names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn enum_names(&self) -> impl Iterator<Item = &str> {
        self.enums.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Fingerprint of the catalog sources
    pub fn checksum(&self) -> &Checksum {
        &self.checksum
    }
}

/// Recursively collect JSON files from embedded directory
fn collect_embedded_files(dir: &'static Dir<'static>, files: &mut Vec<(&'static Path, &'static str)>) {
    for file in dir.files() {
        let path = file.path();
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            if let Some(content) = file.contents_utf8() {
                files.push((path, content));
            }
        }
    }

    for subdir in dir.dirs() {
        collect_embedded_files(subdir, files);
    }
}

/// A schema descriptor together with the catalog that resolves its references
#[derive(Debug, Clone, Copy)]
pub struct Schema<'a> {
    catalog: &'a SchemaCatalog,
    descriptor: &'a Arc<SchemaDescriptor>,
}

impl<'a> Schema<'a> {
    pub fn name(&self) -> &'a str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &'a Arc<SchemaDescriptor> {
        self.descriptor
    }

    pub fn catalog(&self) -> &'a SchemaCatalog {
        self.catalog
    }

    pub fn is_blob(&self) -> bool {
        self.descriptor.is_blob()
    }

    pub fn fields(&self) -> &'a [FieldDescriptor] {
        &self.descriptor.fields
    }

    /// Default-constructed instance of this schema
    pub fn new_message(&self) -> Message {
        Message::new(Arc::clone(self.descriptor))
    }

    /// Resolve a nested schema reference
    pub fn nested(&self, name: &str) -> Result<Schema<'a>> {
        self.catalog
            .schema(name)
            .ok_or_else(|| ConvertError::catalog(format!("unknown schema {}", name)))
    }

    /// Resolve an enum reference
    pub fn enumeration(&self, name: &str) -> Result<&'a EnumDescriptor> {
        self.catalog
            .enumeration(name)
            .ok_or_else(|| ConvertError::catalog(format!("unknown enum {}", name)))
    }

    /// Value a reader observes for an absent singular field
    pub fn default_value(&self, field: &FieldDescriptor) -> Result<Value> {
        match &field.ty {
            ValueType::Enum(name) => Ok(Value::Enum(self.enumeration(name)?.default_number())),
            ValueType::Message(name) => Ok(Value::Message(self.nested(name)?.new_message())),
            scalar => scalar
                .scalar_default()
                .ok_or_else(|| ConvertError::catalog(format!("no default for {}", scalar))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EnumValue;
    use tempfile::tempdir;

    fn rarity() -> EnumDescriptor {
        EnumDescriptor {
            name: "Rarity".into(),
            values: vec![
                EnumValue { name: "Common".into(), number: 0 },
                EnumValue { name: "Rare".into(), number: 1 },
            ],
        }
    }

    #[test]
    fn test_embedded_catalog_loads() {
        let catalog = SchemaCatalog::embedded().unwrap();
        assert!(catalog.schema("ItemDef").is_some());
        assert!(catalog.schema("Credits").map(|s| s.is_blob()).unwrap_or(false));
        assert!(!catalog.checksum().as_str().is_empty());
    }

    #[test]
    fn test_unknown_reference_rejected() {
        let schema = SchemaDescriptor::message(
            "ItemDef",
            vec![FieldDescriptor::new("rarity", 1, ValueType::Enum("Missing".into()))],
        );
        let err = SchemaCatalog::from_parts(vec![schema], vec![rarity()]).unwrap_err();
        assert!(err.to_string().contains("unknown enum Missing"));
    }

    #[test]
    fn test_duplicate_field_number_rejected() {
        let schema = SchemaDescriptor::message(
            "ItemDef",
            vec![
                FieldDescriptor::new("a", 1, ValueType::String),
                FieldDescriptor::new("b", 1, ValueType::String),
            ],
        );
        assert!(SchemaCatalog::from_parts(vec![schema], vec![]).is_err());
    }

    #[test]
    fn test_field_number_range() {
        let schema = SchemaDescriptor::message(
            "ItemDef",
            vec![FieldDescriptor::new("a", 0, ValueType::String)],
        );
        assert!(SchemaCatalog::from_parts(vec![schema], vec![]).is_err());
    }

    #[test]
    fn test_default_values() {
        let schema = SchemaDescriptor::message(
            "ItemDef",
            vec![
                FieldDescriptor::new("rarity", 1, ValueType::Enum("Rarity".into())),
                FieldDescriptor::new("cost", 2, ValueType::Int32),
            ],
        );
        let catalog = SchemaCatalog::from_parts(vec![schema], vec![rarity()]).unwrap();
        let view = catalog.schema("ItemDef").unwrap();
        assert_eq!(view.default_value(&view.fields()[0]).unwrap(), Value::Enum(0));
        assert_eq!(view.default_value(&view.fields()[1]).unwrap(), Value::I32(0));
    }

    #[test]
    fn test_from_directory() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("enums.json"),
            r#"{"enums":[{"name":"Rarity","values":[{"name":"Common","number":0}]}]}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("item.json"),
            r#"{"schemas":[{"name":"ItemDef","fields":[{"name":"rarity","number":1,"type":"enum:Rarity"}]}]}"#,
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let catalog = SchemaCatalog::from_directory(dir.path()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.enum_names().collect::<Vec<_>>(), vec!["Rarity"]);
    }

    #[test]
    fn test_from_directory_missing() {
        let dir = tempdir().unwrap();
        assert!(SchemaCatalog::from_directory(dir.path().join("nope")).is_err());
        assert!(SchemaCatalog::from_directory(dir.path()).is_err());
    }
}
