//! Asset Type Registry
//!
//! Closed dispatch table from [`AssetType`] to its file extension and the
//! name of the catalog schema that describes it.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde::{Deserialize, Serialize};

use crate::catalog::{Schema, SchemaCatalog};
use crate::error::{ConvertError, Result};

/// Schema selector inferred from a filename's type segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Unknown,
    Ab,
    Ai,
    Ambi,
    Blib,
    ChInst,
    ChSht,
    Convo,
    Cpack,
    Credits,
    Cvf,
    EqSht,
    Hiring,
    Item,
    Mf,
    Mode,
    Pb,
    Pcode,
    Pl,
    Srm,
    Srt,
    Story,
    Submix,
    Tml,
    Topic,
}

impl AssetType {
    /// Every asset type, `Unknown` included
    pub const ALL: [AssetType; 25] = [
        AssetType::Unknown,
        AssetType::Ab,
        AssetType::Ai,
        AssetType::Ambi,
        AssetType::Blib,
        AssetType::ChInst,
        AssetType::ChSht,
        AssetType::Convo,
        AssetType::Cpack,
        AssetType::Credits,
        AssetType::Cvf,
        AssetType::EqSht,
        AssetType::Hiring,
        AssetType::Item,
        AssetType::Mf,
        AssetType::Mode,
        AssetType::Pb,
        AssetType::Pcode,
        AssetType::Pl,
        AssetType::Srm,
        AssetType::Srt,
        AssetType::Story,
        AssetType::Submix,
        AssetType::Tml,
        AssetType::Topic,
    ];

    /// The type tag as it appears in filenames
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Unknown => "unknown",
            AssetType::Ab => "ab",
            AssetType::Ai => "ai",
            AssetType::Ambi => "ambi",
            AssetType::Blib => "blib",
            AssetType::ChInst => "ch_inst",
            AssetType::ChSht => "ch_sht",
            AssetType::Convo => "convo",
            AssetType::Cpack => "cpack",
            AssetType::Credits => "credits",
            AssetType::Cvf => "cvf",
            AssetType::EqSht => "eq_sht",
            AssetType::Hiring => "hiring",
            AssetType::Item => "item",
            AssetType::Mf => "mf",
            AssetType::Mode => "mode",
            AssetType::Pb => "pb",
            AssetType::Pcode => "pcode",
            AssetType::Pl => "pl",
            AssetType::Srm => "srm",
            AssetType::Srt => "srt",
            AssetType::Story => "story",
            AssetType::Submix => "submix",
            AssetType::Tml => "tml",
            AssetType::Topic => "topic",
        }
    }

    /// Parse a type tag, ignoring case; `Unknown` when nothing matches
    pub fn from_tag(tag: &str) -> AssetType {
        Self::valid_options()
            .find(|t| t.as_str().eq_ignore_ascii_case(tag))
            .unwrap_or(AssetType::Unknown)
    }

    /// Infer the asset type from a path.
    ///
    /// The outermost extension is dropped and the next one is read as the type
    /// tag (`sword.item.bytes` -> `item`). When no second extension exists the
    /// whole remaining name is tried instead (`credits.bytes` -> `credits`).
    pub fn from_filename(path: impl AsRef<Path>) -> AssetType {
        let path = path.as_ref();
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            return AssetType::Unknown;
        };

        let tag = match Path::new(stem).extension().and_then(|e| e.to_str()) {
            Some(ext) if !ext.is_empty() => ext,
            _ => stem,
        };

        let asset_type = Self::from_tag(tag);
        if asset_type == AssetType::Unknown {
            tracing::debug!(path = %path.display(), %tag, "could not infer asset type from filename");
        }
        asset_type
    }

    /// The registry entry for this type
    pub fn handler(self) -> Result<&'static TypeHandler> {
        TypeRegistry::global().resolve(self)
    }

    /// Asset types valid as conversion operands
    pub fn valid_options() -> impl Iterator<Item = AssetType> {
        Self::ALL.into_iter().filter(|t| *t != AssetType::Unknown)
    }

    pub fn valid_options_string() -> String {
        Self::valid_options()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Closest type tags to a mistyped one, best first
    pub fn suggest(input: &str) -> Vec<AssetType> {
        let matcher = SkimMatcherV2::default();
        let mut scored: Vec<(i64, AssetType)> = Self::valid_options()
            .filter_map(|t| matcher.fuzzy_match(t.as_str(), input).map(|score| (score, t)))
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.into_iter().take(3).map(|(_, t)| t).collect()
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match Self::from_tag(s) {
            AssetType::Unknown => {
                let suggestions = Self::suggest(s);
                let hint = if suggestions.is_empty() {
                    String::new()
                } else {
                    let names: Vec<_> = suggestions.iter().map(|t| t.as_str()).collect();
                    format!(" Did you mean '{}'?", names.join("', '"))
                };
                Err(ConvertError::validation(format!(
                    "invalid asset type '{}'.{} Valid values are '{}'",
                    s,
                    hint,
                    Self::valid_options_string()
                )))
            }
            asset_type => Ok(asset_type),
        }
    }
}

/// Extension and schema of one asset type
#[derive(Debug, Clone)]
pub struct TypeHandler {
    pub asset_type: AssetType,
    /// Lowercase, with leading dot
    pub extension: String,
    /// Name of the catalog schema
    pub schema: &'static str,
}

impl TypeHandler {
    fn new(asset_type: AssetType, schema: &'static str) -> Self {
        Self {
            asset_type,
            extension: format!(".{}", asset_type.as_str()),
            schema,
        }
    }
}

/// Process-wide asset type table
#[derive(Debug)]
pub struct TypeRegistry {
    handlers: HashMap<AssetType, TypeHandler>,
}

impl TypeRegistry {
    pub fn global() -> &'static TypeRegistry {
        static REGISTRY: OnceLock<TypeRegistry> = OnceLock::new();
        REGISTRY.get_or_init(TypeRegistry::builtin)
    }

    fn builtin() -> Self {
        Self::from_handlers(vec![
            TypeHandler::new(AssetType::Ab, "AbilityDef"),
            TypeHandler::new(AssetType::Ai, "ObjectiveArchetype"),
            TypeHandler::new(AssetType::Ambi, "AmbienceTemplate"),
            TypeHandler::new(AssetType::Blib, "BackerPCLibrary"),
            TypeHandler::new(AssetType::ChInst, "CharacterInstance"),
            TypeHandler::new(AssetType::ChSht, "Character"),
            TypeHandler::new(AssetType::Convo, "Conversation"),
            TypeHandler::new(AssetType::Cpack, "ProjectDef"),
            TypeHandler::new(AssetType::Credits, "Credits"),
            TypeHandler::new(AssetType::Cvf, "CharacterVariant"),
            TypeHandler::new(AssetType::EqSht, "EquipmentSheet"),
            TypeHandler::new(AssetType::Hiring, "HiringSet"),
            TypeHandler::new(AssetType::Item, "ItemDef"),
            TypeHandler::new(AssetType::Mf, "Manifest"),
            TypeHandler::new(AssetType::Mode, "ModeDef"),
            TypeHandler::new(AssetType::Pb, "PropDef"),
            TypeHandler::new(AssetType::Pcode, "PortraitCodeList"),
            TypeHandler::new(AssetType::Pl, "PortraitList"),
            TypeHandler::new(AssetType::Srm, "MapDef"),
            TypeHandler::new(AssetType::Srt, "SceneDef"),
            TypeHandler::new(AssetType::Story, "StoryDef"),
            TypeHandler::new(AssetType::Submix, "SubMixGroup"),
            TypeHandler::new(AssetType::Tml, "TotemList"),
            TypeHandler::new(AssetType::Topic, "Topic"),
        ])
    }

    fn from_handlers(handlers: Vec<TypeHandler>) -> Self {
        Self {
            handlers: handlers.into_iter().map(|h| (h.asset_type, h)).collect(),
        }
    }

    pub fn resolve(&self, asset_type: AssetType) -> Result<&TypeHandler> {
        if asset_type == AssetType::Unknown {
            return Err(ConvertError::UnsupportedAssetType(asset_type));
        }
        self.handlers
            .get(&asset_type)
            .ok_or(ConvertError::UnsupportedAssetType(asset_type))
    }

    /// The schema used to encode and decode this asset type
    pub fn schema<'c>(&self, asset_type: AssetType, catalog: &'c SchemaCatalog) -> Result<Schema<'c>> {
        let handler = self.resolve(asset_type)?;
        catalog
            .schema(handler.schema)
            .ok_or(ConvertError::UnsupportedAssetType(asset_type))
    }

    /// Fails on the first asset type without a handler or catalog schema
    pub fn validate_all(&self, catalog: &SchemaCatalog) -> Result<()> {
        for asset_type in AssetType::valid_options() {
            self.schema(asset_type, catalog).map_err(|e| {
                tracing::error!(%asset_type, "asset type has no usable schema");
                e
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_all_with_embedded_catalog() {
        let catalog = SchemaCatalog::embedded().unwrap();
        TypeRegistry::global().validate_all(catalog).unwrap();
    }

    #[test]
    fn test_validate_all_detects_missing_schema() {
        let catalog = SchemaCatalog::from_parts(vec![], vec![]).unwrap();
        assert!(matches!(
            TypeRegistry::global().validate_all(&catalog),
            Err(ConvertError::UnsupportedAssetType(AssetType::Ab))
        ));
    }

    #[test]
    fn test_validate_all_detects_missing_handler() {
        let registry = TypeRegistry::from_handlers(vec![TypeHandler::new(AssetType::Ab, "AbilityDef")]);
        let catalog = SchemaCatalog::embedded().unwrap();
        assert!(matches!(
            registry.validate_all(catalog),
            Err(ConvertError::UnsupportedAssetType(AssetType::Ai))
        ));
    }

    #[test]
    fn test_unknown_is_unsupported() {
        assert!(AssetType::Unknown.handler().is_err());
    }

    #[test]
    fn test_extension() {
        assert_eq!(AssetType::ChInst.handler().unwrap().extension, ".ch_inst");
        assert_eq!(AssetType::Item.handler().unwrap().schema, "ItemDef");
    }

    #[test]
    fn test_from_filename() {
        assert_eq!(AssetType::from_filename("item1.item.bytes"), AssetType::Item);
        assert_eq!(AssetType::from_filename("data/misc/credits.bytes"), AssetType::Credits);
        assert_eq!(AssetType::from_filename("hero.CH_SHT.json"), AssetType::ChSht);
        assert_eq!(AssetType::from_filename("unknownthing.xyz"), AssetType::Unknown);
        assert_eq!(AssetType::from_filename(""), AssetType::Unknown);
        assert_eq!(AssetType::from_filename("a.b.c.pl.json"), AssetType::Pl);
    }

    #[test]
    fn test_parse_with_suggestion() {
        assert_eq!("Item".parse::<AssetType>().unwrap(), AssetType::Item);
        let err = "chinst".parse::<AssetType>().unwrap_err().to_string();
        assert!(err.contains("Did you mean 'ch_inst'"), "{}", err);
        assert!("unknown".parse::<AssetType>().is_err());
    }
}
