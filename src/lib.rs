//! Planview Core - Option Configurator Engine
//!
//! # Guarantees
//! 1. Selections Are Consistent: no conflicts, every requirement met
//! 2. Changes Are Atomic: a rejected change leaves the selection untouched
//! 3. Rendering Is Incremental: unchanged layers keep their identity
//! 4. Last Render Wins: superseded image loads are dropped
//! 5. History Never Records Itself

pub mod catalog;
pub mod selection;
pub mod resolver;
pub mod validation;
pub mod hashing;
pub mod settings;
pub mod compositor;
pub mod hotspot;
pub mod markup;
pub mod packages;
pub mod history;
pub mod summary;
pub mod session;

pub use catalog::{Catalog, CatalogData, CatalogError, CatalogSource, JsonCatalogSource};
pub use catalog::{ConfigOption, Floor, FloorId, FloorKind, GalleryImage, Model, ModelId, OptionId, OptionSet, OptionSetId};
pub use selection::{FileStore, MemoryStore, SelectionState, SelectionStore};
pub use resolver::{reconcile, resolve, Action, Rejection};
pub use validation::{ValidationResult, ValidationRule, ValidationViolation, Validator, ViolationSeverity};
pub use hashing::{canonical_json, selection_fingerprint};
pub use settings::Settings;
pub use compositor::{Compositor, RenderReport, SceneSnapshot};
pub use hotspot::{Hotspot, HotspotMapper, HotspotTarget};
pub use markup::{Markup, MarkupBoard};
pub use packages::DesignSelections;
pub use history::AnnotationHistory;
pub use summary::DesignSummary;
pub use session::{Session, SessionDeps, SessionError};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
/// Catalog documents this engine reads
pub const CATALOG_SCHEMA_REQ: &str = "^1.0";
