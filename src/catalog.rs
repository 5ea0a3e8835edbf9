//! Configuration Model - read-only catalog snapshot
//!
//! Loaded once per session from the catalog collaborator and never mutated
//! by the core. Entities are indexed by id so the resolver and compositor can
//! walk relationships without scanning.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::CATALOG_SCHEMA_REQ;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

entity_id!(
    /// Identifier of a [`Model`]
    ModelId
);
entity_id!(
    /// Identifier of a [`Floor`]
    FloorId
);
entity_id!(
    /// Identifier of an [`OptionSet`]
    OptionSetId
);
entity_id!(
    /// Identifier of a [`ConfigOption`]
    OptionId
);

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Invalid catalog schema version: {0}")]
    InvalidSchemaVersion(String),

    #[error("Catalog schema {found} is not supported (engine accepts {supported})")]
    UnsupportedSchema { found: String, supported: String },

    #[error("Duplicate {kind} id {id}")]
    DuplicateId { kind: &'static str, id: u64 },

    #[error("{kind} {id} belongs to missing {parent_kind} {parent}")]
    MissingParent {
        kind: &'static str,
        id: u64,
        parent_kind: &'static str,
        parent: u64,
    },

    #[error("Catalog fetch failed: {0}")]
    Fetch(String),

    #[error("Catalog I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: ModelId,
    pub name: String,
    #[serde(default)]
    pub cover_image: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FloorKind {
    Plan,
    Elevation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Floor {
    pub id: FloorId,
    pub name: String,
    pub model_id: ModelId,
    #[serde(default)]
    pub base_image: Option<String>,
    /// Explicit kind tag; untagged floors are classified by name
    #[serde(default, rename = "type")]
    pub kind: Option<FloorKind>,
}

impl Floor {
    pub fn kind(&self) -> FloorKind {
        self.kind.unwrap_or_else(|| {
            let name = self.name.to_lowercase();
            if name.contains("elevation") || name.contains("exterior") {
                FloorKind::Elevation
            } else {
                FloorKind::Plan
            }
        })
    }

    pub fn is_elevation(&self) -> bool {
        self.kind() == FloorKind::Elevation
    }
}

/// A point expressed in percent of the background image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IconMode {
    SetLevel,
    OptionLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionSet {
    pub id: OptionSetId,
    pub name: String,
    pub floor_id: FloorId,
    pub position: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub allow_multiple: bool,
    #[serde(default)]
    pub hotspot: Option<PercentPoint>,
    #[serde(default)]
    pub icon_mode: Option<IconMode>,
}

impl OptionSet {
    pub fn icon_mode(&self) -> IconMode {
        self.icon_mode.unwrap_or(IconMode::SetLevel)
    }
}

/// Placement rectangle in percent of the background image
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GalleryImage {
    pub url: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl GalleryImage {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            group: None,
            description: None,
        }
    }

    /// Package name, if the image belongs to a real group
    pub fn package(&self) -> Option<&str> {
        self.group
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty() && *g != UNCATEGORIZED)
    }
}

/// Group name the authoring tool gives to ungrouped images
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Gallery entries are objects, older documents wrote a bare URL
#[derive(Deserialize)]
#[serde(untagged)]
enum GalleryEntry {
    Url(String),
    Image(GalleryImage),
}

impl From<GalleryEntry> for GalleryImage {
    fn from(entry: GalleryEntry) -> Self {
        match entry {
            GalleryEntry::Url(url) => GalleryImage::new(url),
            GalleryEntry::Image(image) => image,
        }
    }
}

/// The whole gallery may also arrive as a JSON-encoded string
#[derive(Deserialize)]
#[serde(untagged)]
enum GalleryWire {
    Encoded(String),
    Entries(Vec<GalleryEntry>),
}

fn deserialize_gallery<'de, D>(deserializer: D) -> Result<Vec<GalleryImage>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = match Option::<GalleryWire>::deserialize(deserializer)? {
        None => vec![],
        Some(GalleryWire::Entries(entries)) => entries,
        Some(GalleryWire::Encoded(raw)) if raw.trim().is_empty() => vec![],
        Some(GalleryWire::Encoded(raw)) => match serde_json::from_str::<Vec<GalleryEntry>>(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "discarding malformed gallery");
                vec![]
            }
        },
    };
    Ok(entries.into_iter().map(GalleryImage::from).collect())
}

/// Explicit `null` reads as the field's default, same as a missing key
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigOption {
    pub id: OptionId,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    pub option_set_id: OptionSetId,
    pub position: u32,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub overlay_image: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub placement: Placement,
    #[serde(default, deserialize_with = "null_as_default")]
    pub layer_order: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub requirements: Vec<OptionId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub conflicts: Vec<OptionId>,
    #[serde(default, alias = "galleryImages", deserialize_with = "deserialize_gallery")]
    pub gallery: Vec<GalleryImage>,
    #[serde(default)]
    pub hotspot: Option<PercentPoint>,
}

impl ConfigOption {
    /// Overlay image identifier, ignoring blank and literal "null" values
    pub fn overlay(&self) -> Option<&str> {
        self.overlay_image
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty() && *s != "null")
    }
}

/// Raw catalog document as delivered by the catalog collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogData {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub models: Vec<Model>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub floors: Vec<Floor>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub option_sets: Vec<OptionSet>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub options: Vec<ConfigOption>,
}

fn default_schema_version() -> String {
    "1.0.0".to_string()
}

impl Default for CatalogData {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            models: vec![],
            floors: vec![],
            option_sets: vec![],
            options: vec![],
        }
    }
}

/// Indexed, read-only catalog
#[derive(Debug, Clone)]
pub struct Catalog {
    data: CatalogData,
    models: HashMap<ModelId, usize>,
    floors: HashMap<FloorId, usize>,
    sets: HashMap<OptionSetId, usize>,
    options: HashMap<OptionId, usize>,
}

fn index<K, T>(
    items: &[T],
    kind: &'static str,
    key: impl Fn(&T) -> K,
    raw: impl Fn(&K) -> u64,
) -> Result<HashMap<K, usize>, CatalogError>
where
    K: std::hash::Hash + Eq,
{
    let mut map = HashMap::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let k = key(item);
        let id = raw(&k);
        if map.insert(k, i).is_some() {
            return Err(CatalogError::DuplicateId { kind, id });
        }
    }
    Ok(map)
}

impl Catalog {
    /// Check the schema version and index every entity
    pub fn build(data: CatalogData) -> Result<Self, CatalogError> {
        check_schema_version(&data.schema_version)?;

        let models = index(&data.models, "model", |m| m.id, |k| k.0)?;
        let floors = index(&data.floors, "floor", |f| f.id, |k| k.0)?;
        let sets = index(&data.option_sets, "option set", |s| s.id, |k| k.0)?;
        let options = index(&data.options, "option", |o| o.id, |k| k.0)?;

        for floor in &data.floors {
            if !models.contains_key(&floor.model_id) {
                return Err(CatalogError::MissingParent {
                    kind: "floor",
                    id: floor.id.0,
                    parent_kind: "model",
                    parent: floor.model_id.0,
                });
            }
        }
        for set in &data.option_sets {
            if !floors.contains_key(&set.floor_id) {
                return Err(CatalogError::MissingParent {
                    kind: "option set",
                    id: set.id.0,
                    parent_kind: "floor",
                    parent: set.floor_id.0,
                });
            }
        }
        for option in &data.options {
            if !sets.contains_key(&option.option_set_id) {
                return Err(CatalogError::MissingParent {
                    kind: "option",
                    id: option.id.0,
                    parent_kind: "option set",
                    parent: option.option_set_id.0,
                });
            }
        }

        debug!(
            models = models.len(),
            floors = floors.len(),
            option_sets = sets.len(),
            options = options.len(),
            "catalog indexed"
        );

        Ok(Self { data, models, floors, sets, options })
    }

    pub fn data(&self) -> &CatalogData {
        &self.data
    }

    pub fn models(&self) -> &[Model] {
        &self.data.models
    }

    pub fn model(&self, id: ModelId) -> Option<&Model> {
        self.models.get(&id).map(|&i| &self.data.models[i])
    }

    pub fn floor(&self, id: FloorId) -> Option<&Floor> {
        self.floors.get(&id).map(|&i| &self.data.floors[i])
    }

    pub fn option_set(&self, id: OptionSetId) -> Option<&OptionSet> {
        self.sets.get(&id).map(|&i| &self.data.option_sets[i])
    }

    pub fn option(&self, id: OptionId) -> Option<&ConfigOption> {
        self.options.get(&id).map(|&i| &self.data.options[i])
    }

    /// Display name for an option id, falling back to the raw id
    pub fn option_name(&self, id: OptionId) -> String {
        self.option(id)
            .map(|o| o.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn set_of(&self, option: &ConfigOption) -> Option<&OptionSet> {
        self.option_set(option.option_set_id)
    }

    pub fn floor_of(&self, set: &OptionSet) -> Option<&Floor> {
        self.floor(set.floor_id)
    }

    /// Floors of a model, elevation floors first, then by id
    pub fn floors_for_model(&self, model: ModelId) -> Vec<&Floor> {
        let mut floors: Vec<&Floor> = self
            .data
            .floors
            .iter()
            .filter(|f| f.model_id == model)
            .collect();
        floors.sort_by(|a, b| {
            b.is_elevation()
                .cmp(&a.is_elevation())
                .then(a.id.cmp(&b.id))
        });
        floors
    }

    /// Option sets of a floor ordered by position
    pub fn option_sets_for_floor(&self, floor: FloorId) -> Vec<&OptionSet> {
        let mut sets: Vec<&OptionSet> = self
            .data
            .option_sets
            .iter()
            .filter(|s| s.floor_id == floor)
            .collect();
        sets.sort_by_key(|s| (s.position, s.id));
        sets
    }

    /// Options of a set ordered by position
    pub fn options_for_set(&self, set: OptionSetId) -> Vec<&ConfigOption> {
        let mut options: Vec<&ConfigOption> = self
            .data
            .options
            .iter()
            .filter(|o| o.option_set_id == set)
            .collect();
        options.sort_by_key(|o| (o.position, o.id));
        options
    }

    /// Every option on a floor, in set order then option order
    pub fn options_for_floor(&self, floor: FloorId) -> Vec<&ConfigOption> {
        self.option_sets_for_floor(floor)
            .into_iter()
            .flat_map(|s| self.options_for_set(s.id))
            .collect()
    }
}

fn check_schema_version(version: &str) -> Result<(), CatalogError> {
    let found = semver::Version::parse(version)
        .map_err(|_| CatalogError::InvalidSchemaVersion(version.to_string()))?;
    let supported = semver::VersionReq::parse(CATALOG_SCHEMA_REQ)
        .map_err(|_| CatalogError::InvalidSchemaVersion(CATALOG_SCHEMA_REQ.to_string()))?;

    if !supported.matches(&found) {
        return Err(CatalogError::UnsupportedSchema {
            found: version.to_string(),
            supported: CATALOG_SCHEMA_REQ.to_string(),
        });
    }
    Ok(())
}

/// Catalog collaborator: read-only fetch, refreshed on demand
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch(&self) -> Result<CatalogData, CatalogError>;
}

#[async_trait]
impl CatalogSource for CatalogData {
    async fn fetch(&self) -> Result<CatalogData, CatalogError> {
        Ok(self.clone())
    }
}

/// Reads the catalog document from a JSON file
#[derive(Debug, Clone)]
pub struct JsonCatalogSource {
    path: PathBuf,
}

impl JsonCatalogSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

#[async_trait]
impl CatalogSource for JsonCatalogSource {
    async fn fetch(&self) -> Result<CatalogData, CatalogError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let data: CatalogData = serde_json::from_str(&content)?;
        info!(
            path = %self.path.display(),
            models = data.models.len(),
            options = data.options.len(),
            "catalog fetched"
        );
        Ok(data)
    }
}
