//! Configuration Session - explicit context for one model
//!
//! Owns the catalog snapshot, the selection, the compositor and the
//! markup history. Every UI-facing operation goes through here.
//!
//! CRITICAL: selection changes only through `apply`, which persists every
//! successful change.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::catalog::{Catalog, CatalogError, CatalogSource, Floor, FloorId, GalleryImage, ModelId, OptionId};
use crate::compositor::{
    AssetResolver, Compositor, CompositorError, ImageLoader, RenderReport, SceneSnapshot,
};
use crate::history::AnnotationHistory;
use crate::hotspot::{Hotspot, HotspotMapper, HotspotTarget, PanelGroup};
use crate::markup::{Markup, MarkupBoard, MarkupError, MarkupId, MarkupItem};
use crate::packages::{DesignSelections, PackageError};
use crate::resolver::{reconcile, resolve, Action, Rejection};
use crate::selection::{persist, restore, SelectionState, SelectionStore};
use crate::settings::Settings;
use crate::summary::{summarize, DesignSummary};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Model not found: {0}")]
    UnknownModel(ModelId),

    #[error("Floor {floor} is not part of model {model}")]
    ForeignFloor { floor: FloorId, model: ModelId },

    #[error("No floor is active")]
    NoActiveFloor,

    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error(transparent)]
    Render(#[from] CompositorError),

    #[error(transparent)]
    Markup(#[from] MarkupError),

    #[error(transparent)]
    Package(#[from] PackageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Collaborators a session is wired to
#[derive(Clone)]
pub struct SessionDeps {
    pub source: Arc<dyn CatalogSource>,
    pub store: Arc<dyn SelectionStore>,
    pub assets: Arc<dyn AssetResolver>,
    pub loader: Arc<dyn ImageLoader>,
    pub settings: Settings,
}

pub struct Session {
    id: Uuid,
    model: ModelId,
    catalog: Catalog,
    selection: SelectionState,
    designs: DesignSelections,
    floor: Option<FloorId>,
    source: Arc<dyn CatalogSource>,
    store: Arc<dyn SelectionStore>,
    compositor: Compositor,
    mapper: HotspotMapper,
    markups: MarkupBoard,
    history: AnnotationHistory,
}

impl Session {
    /// Fetch the catalog and start a session on `model`.
    /// A fetch failure is returned as is; there is no cached fallback.
    pub async fn open(deps: SessionDeps, model: ModelId) -> Result<Self, SessionError> {
        let data = deps.source.fetch().await?;
        let catalog = Catalog::build(data)?;
        Self::from_catalog(catalog, deps, model)
    }

    pub fn from_catalog(
        catalog: Catalog,
        deps: SessionDeps,
        model: ModelId,
    ) -> Result<Self, SessionError> {
        if catalog.model(model).is_none() {
            return Err(SessionError::UnknownModel(model));
        }

        let mut session = Self {
            id: Uuid::new_v4(),
            model,
            selection: restore(deps.store.as_ref(), model),
            designs: DesignSelections::new(),
            floor: None,
            compositor: Compositor::new(&deps.settings, deps.assets, deps.loader),
            mapper: HotspotMapper::new(deps.settings.hotspot_precision),
            source: deps.source,
            store: deps.store,
            markups: MarkupBoard::new(),
            history: AnnotationHistory::new(),
            catalog,
        };

        if let Some(first) = session.floors().first().map(|f| f.id) {
            session.set_floor(first)?;
        }
        info!(
            session = %session.id,
            model = %model,
            restored = !session.selection.is_empty(),
            "session opened"
        );
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn model(&self) -> ModelId {
        self.model
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    pub fn floor(&self) -> Option<FloorId> {
        self.floor
    }

    /// Floors of the active model in display order
    pub fn floors(&self) -> Vec<&Floor> {
        self.catalog.floors_for_model(self.model)
    }

    fn active_floor(&self) -> Result<FloorId, SessionError> {
        self.floor.ok_or(SessionError::NoActiveFloor)
    }

    /// Validate and apply a selection change. On rejection nothing changes.
    pub fn apply(&mut self, action: Action) -> Result<&SelectionState, SessionError> {
        let next = match resolve(&self.catalog, &self.selection, self.floor, action) {
            Ok(next) => next,
            Err(rejection) => {
                info!(session = %self.id, ?action, reason = %rejection, "selection change rejected");
                return Err(rejection.into());
            }
        };

        if next != self.selection {
            self.selection = next;
            let cleared = self.designs.retain_selected(&self.selection);
            if !cleared.is_empty() {
                debug!(session = %self.id, options = ?cleared, "design packages cleared");
            }
            // Persistence failure never undoes an accepted change
            if let Err(e) = persist(self.store.as_ref(), self.model, &self.selection) {
                warn!(session = %self.id, error = %e, "failed to persist selection");
            }
        }
        debug!(session = %self.id, ?action, "selection change applied");
        Ok(&self.selection)
    }

    /// Make `floor` active: swap its markup in and restart the history
    pub fn set_floor(&mut self, floor: FloorId) -> Result<(), SessionError> {
        match self.catalog.floor(floor) {
            Some(f) if f.model_id == self.model => {}
            _ => {
                return Err(SessionError::ForeignFloor { floor, model: self.model });
            }
        }
        if self.floor == Some(floor) {
            return Ok(());
        }
        self.floor = Some(floor);
        self.markups.swap_floor(floor);
        self.history.reset(self.markups.snapshot()?);
        debug!(session = %self.id, floor = %floor, "floor activated");
        Ok(())
    }

    /// Render the active floor
    pub async fn render(&self) -> Result<RenderReport, SessionError> {
        let floor = self.active_floor()?;
        self.render_floor(floor).await
    }

    pub async fn render_floor(&self, floor: FloorId) -> Result<RenderReport, SessionError> {
        let span = info_span!("render", session = %self.id, floor = %floor);
        Ok(self
            .compositor
            .render_floor(&self.catalog, &self.selection, floor)
            .instrument(span)
            .await?)
    }

    pub fn scene(&self) -> SceneSnapshot {
        self.compositor.snapshot()
    }

    pub fn hotspots(&self) -> Vec<Hotspot> {
        match self.floor {
            Some(floor) => self.mapper.hotspots(&self.catalog, &self.selection, floor),
            None => vec![],
        }
    }

    pub fn resolve_hotspot(&self, key: &str) -> Vec<HotspotTarget> {
        match self.floor {
            Some(floor) => self
                .mapper
                .resolve_hotspot(&self.catalog, &self.selection, floor, key),
            None => vec![],
        }
    }

    /// Selection panel opened by clicking the hotspot at `key`
    pub fn panel(&self, key: &str) -> Vec<PanelGroup> {
        let targets = self.resolve_hotspot(key);
        self.mapper.panel(&self.catalog, &self.selection, &targets)
    }

    // --- Design packages ---

    /// Pick the package containing gallery image `image` of `option`.
    /// An unselected option is selected first; a rejection picks nothing.
    pub fn select_package(
        &mut self,
        option: OptionId,
        image: usize,
    ) -> Result<&[GalleryImage], SessionError> {
        let gallery_len = self
            .catalog
            .option(option)
            .ok_or(Rejection::UnknownOption { option })?
            .gallery
            .len();
        if image >= gallery_len {
            return Err(PackageError::NoSuchImage { option, index: image }.into());
        }
        if !self.selection.is_selected(option) {
            self.apply(Action::Select(option))?;
        }
        let option = self
            .catalog
            .option(option)
            .ok_or(Rejection::UnknownOption { option })?;
        Ok(self.designs.pick(option, image)?)
    }

    /// Returns whether the option had a package
    pub fn clear_package(&mut self, option: OptionId) -> bool {
        self.designs.clear(option)
    }

    pub fn package(&self, option: OptionId) -> &[GalleryImage] {
        self.designs.for_option(option)
    }

    // --- Markup ---

    pub fn markups(&self) -> &[MarkupItem] {
        self.markups.items()
    }

    pub fn add_markup(&mut self, markup: Markup) -> Result<MarkupId, SessionError> {
        let id = self.markups.add(markup)?;
        self.markup_changed()?;
        Ok(id)
    }

    pub fn update_markup(&mut self, id: MarkupId, markup: Markup) -> Result<(), SessionError> {
        self.markups.update(id, markup)?;
        self.markup_changed()
    }

    pub fn remove_markup(&mut self, id: MarkupId) -> Result<(), SessionError> {
        self.markups.remove(id)?;
        self.markup_changed()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Returns false when there is nothing to undo
    pub fn undo(&mut self) -> Result<bool, SessionError> {
        match self.history.undo() {
            Some(snapshot) => self.replay(&snapshot).map(|_| true),
            None => Ok(false),
        }
    }

    pub fn redo(&mut self) -> Result<bool, SessionError> {
        match self.history.redo() {
            Some(snapshot) => self.replay(&snapshot).map(|_| true),
            None => Ok(false),
        }
    }

    fn markup_changed(&mut self) -> Result<(), SessionError> {
        let snapshot = self.markups.snapshot()?;
        self.history.record(snapshot);
        Ok(())
    }

    fn replay(&mut self, snapshot: &str) -> Result<(), SessionError> {
        self.history.begin_replay();
        let result = self
            .markups
            .restore(snapshot)
            .map_err(SessionError::from)
            .and_then(|_| self.markup_changed());
        self.history.end_replay();
        result
    }

    // --- Lifecycle ---

    pub fn summary(&self) -> Result<DesignSummary, SessionError> {
        Ok(summarize(&self.catalog, self.model, &self.selection, &self.designs)?)
    }

    /// Move to another model. The current selection is dropped and the
    /// new model's persisted selection, if any, is restored.
    pub fn switch_model(&mut self, model: ModelId) -> Result<(), SessionError> {
        if self.catalog.model(model).is_none() {
            return Err(SessionError::UnknownModel(model));
        }
        self.model = model;
        self.selection = restore(self.store.as_ref(), model);
        self.designs = DesignSelections::new();
        self.floor = None;
        self.markups = MarkupBoard::new();
        self.history = AnnotationHistory::new();
        if let Some(first) = self.floors().first().map(|f| f.id) {
            self.set_floor(first)?;
        }
        info!(session = %self.id, model = %model, "model switched");
        Ok(())
    }

    /// Re-fetch the catalog and repair the selection against it
    pub async fn refresh_catalog(&mut self) -> Result<(), SessionError> {
        let catalog = Catalog::build(self.source.fetch().await?)?;
        if catalog.model(self.model).is_none() {
            return Err(SessionError::UnknownModel(self.model));
        }

        let (repaired, dropped) = reconcile(&catalog, &self.selection);
        self.catalog = catalog;
        if !dropped.is_empty() {
            warn!(session = %self.id, dropped = ?dropped, "selection no longer valid against refreshed catalog");
            self.selection = repaired;
            self.designs.retain_selected(&self.selection);
            if let Err(e) = persist(self.store.as_ref(), self.model, &self.selection) {
                warn!(session = %self.id, error = %e, "failed to persist selection");
            }
        }

        let floor_gone = self
            .floor
            .map_or(true, |f| self.catalog.floor(f).is_none());
        if floor_gone {
            self.floor = None;
            if let Some(first) = self.floors().first().map(|f| f.id) {
                self.set_floor(first)?;
            }
        }
        info!(session = %self.id, "catalog refreshed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogData, ConfigOption, Model, OptionSet, OptionSetId, Placement};
    use crate::compositor::{AssetError, BaseUrlResolver, ImageInfo};
    use crate::markup::{Point, Stroke};
    use crate::selection::{storage_key, MemoryStore};
    use async_trait::async_trait;

    struct FixedLoader;

    #[async_trait]
    impl ImageLoader for FixedLoader {
        async fn load(&self, _url: &str) -> Result<ImageInfo, AssetError> {
            Ok(ImageInfo::new(100, 100))
        }
    }

    fn data() -> CatalogData {
        CatalogData {
            models: vec![
                Model { id: ModelId(1), name: "Aspen".to_string(), cover_image: None },
                Model { id: ModelId(2), name: "Birch".to_string(), cover_image: None },
            ],
            floors: vec![
                Floor { id: FloorId(1), name: "Main".to_string(), model_id: ModelId(1), base_image: Some("main.png".to_string()), kind: None },
                Floor { id: FloorId(5), name: "Birch Main".to_string(), model_id: ModelId(2), base_image: None, kind: None },
            ],
            option_sets: vec![OptionSet {
                id: OptionSetId(1),
                name: "Kitchen".to_string(),
                floor_id: FloorId(1),
                position: 0,
                allow_multiple: false,
                hotspot: None,
                icon_mode: None,
            }],
            options: vec![ConfigOption {
                id: OptionId(10),
                name: "Island".to_string(),
                code: None,
                option_set_id: OptionSetId(1),
                position: 0,
                thumbnail: None,
                overlay_image: None,
                placement: Placement::default(),
                layer_order: 0,
                requirements: vec![],
                conflicts: vec![],
                gallery: vec![
                    GalleryImage { url: "marble-1.jpg".to_string(), group: Some("Marble".to_string()), description: None },
                    GalleryImage::new("butcher-block.jpg"),
                    GalleryImage { url: "marble-2.jpg".to_string(), group: Some("Marble".to_string()), description: None },
                ],
                hotspot: None,
            }],
            ..CatalogData::default()
        }
    }

    /// `data()` plus a pantry set on the main floor
    fn with_pantry(allow_multiple: bool) -> CatalogData {
        let mut d = data();
        d.option_sets.push(OptionSet {
            id: OptionSetId(2),
            name: "Pantry".to_string(),
            floor_id: FloorId(1),
            position: 1,
            allow_multiple,
            hotspot: None,
            icon_mode: None,
        });
        for (id, name) in [(20, "Walk-in"), (21, "Butler")] {
            let mut o = d.options[0].clone();
            o.id = OptionId(id);
            o.name = name.to_string();
            o.option_set_id = OptionSetId(2);
            o.gallery = vec![];
            d.options.push(o);
        }
        d
    }

    /// Serves whatever document is current at fetch time
    struct RevisedSource {
        current: parking_lot::Mutex<CatalogData>,
    }

    #[async_trait]
    impl CatalogSource for RevisedSource {
        async fn fetch(&self) -> Result<CatalogData, CatalogError> {
            Ok(self.current.lock().clone())
        }
    }

    struct UnreachableSource;

    #[async_trait]
    impl CatalogSource for UnreachableSource {
        async fn fetch(&self) -> Result<CatalogData, CatalogError> {
            Err(CatalogError::Fetch("catalog service unavailable".to_string()))
        }
    }

    fn deps(store: Arc<MemoryStore>) -> SessionDeps {
        SessionDeps {
            source: Arc::new(data()),
            store,
            assets: Arc::new(BaseUrlResolver::default()),
            loader: Arc::new(FixedLoader),
            settings: Settings::default(),
        }
    }

    fn line() -> Markup {
        Markup::Line {
            from: Point { x: 1.0, y: 1.0 },
            to: Point { x: 2.0, y: 2.0 },
            stroke: Stroke::default(),
        }
    }

    #[tokio::test]
    async fn test_apply_persists() {
        let store = Arc::new(MemoryStore::new());
        let mut session = Session::open(deps(store.clone()), ModelId(1)).await.unwrap();
        session.apply(Action::Select(OptionId(10))).unwrap();

        let saved = store.load(&storage_key(ModelId(1))).unwrap().unwrap();
        assert_eq!(saved, r#"{"1":[10]}"#);

        let reopened = Session::open(deps(store), ModelId(1)).await.unwrap();
        assert!(reopened.selection().is_selected(OptionId(10)));
    }

    #[tokio::test]
    async fn test_unknown_model() {
        let store = Arc::new(MemoryStore::new());
        let err = Session::open(deps(store), ModelId(9)).await.err().unwrap();
        assert!(matches!(err, SessionError::UnknownModel(ModelId(9))));
    }

    #[tokio::test]
    async fn test_undo_redo_markup() {
        let mut session = Session::open(deps(Arc::new(MemoryStore::new())), ModelId(1)).await.unwrap();
        assert!(!session.can_undo());

        let first = session.add_markup(line()).unwrap();
        session.add_markup(line()).unwrap();
        assert_eq!(session.markups().len(), 2);

        assert!(session.undo().unwrap());
        assert_eq!(session.markups().len(), 1);
        assert!(session.undo().unwrap());
        assert!(session.markups().is_empty());
        assert!(!session.undo().unwrap());

        assert!(session.redo().unwrap());
        assert_eq!(session.markups()[0].id, first);
        assert!(session.can_redo());

        session.remove_markup(first).unwrap();
        assert!(!session.can_redo());
    }

    #[tokio::test]
    async fn test_switch_model_drops_selection() {
        let mut session = Session::open(deps(Arc::new(MemoryStore::new())), ModelId(1)).await.unwrap();
        session.apply(Action::Select(OptionId(10))).unwrap();
        session.add_markup(line()).unwrap();

        session.switch_model(ModelId(2)).unwrap();
        assert!(session.selection().is_empty());
        assert_eq!(session.floor(), Some(FloorId(5)));
        assert!(session.markups().is_empty());
        assert!(!session.can_undo());
    }

    #[tokio::test]
    async fn test_foreign_floor_rejected() {
        let mut session = Session::open(deps(Arc::new(MemoryStore::new())), ModelId(1)).await.unwrap();
        let err = session.set_floor(FloorId(5)).unwrap_err();
        assert!(matches!(err, SessionError::ForeignFloor { .. }));
        assert_eq!(session.floor(), Some(FloorId(1)));
    }

    #[tokio::test]
    async fn test_render_active_floor() {
        let session = Session::open(deps(Arc::new(MemoryStore::new())), ModelId(1)).await.unwrap();
        let report = session.render().await.unwrap();
        assert!(report.rebuilt);
        assert_eq!(session.scene().floor, Some(FloorId(1)));
    }

    #[tokio::test]
    async fn test_catalog_fetch_failure_surfaces() {
        let mut d = deps(Arc::new(MemoryStore::new()));
        d.source = Arc::new(UnreachableSource);
        let err = Session::open(d, ModelId(1)).await.err().unwrap();
        assert!(matches!(err, SessionError::Catalog(CatalogError::Fetch(_))));
    }

    #[tokio::test]
    async fn test_refresh_repairs_selection() {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(RevisedSource { current: parking_lot::Mutex::new(with_pantry(true)) });
        let mut d = deps(store.clone());
        d.source = source.clone();
        let mut session = Session::open(d, ModelId(1)).await.unwrap();
        session.apply(Action::Select(OptionId(20))).unwrap();
        session.apply(Action::Select(OptionId(21))).unwrap();

        // Pantry becomes single-select
        *source.current.lock() = with_pantry(false);
        session.refresh_catalog().await.unwrap();

        assert_eq!(session.selection().selected_in(OptionSetId(2)), &[OptionId(20)]);
        let saved = store.load(&storage_key(ModelId(1))).unwrap().unwrap();
        assert_eq!(saved, r#"{"2":[20]}"#);
        assert_eq!(session.floor(), Some(FloorId(1)));
    }

    #[tokio::test]
    async fn test_refresh_drops_new_conflicts() {
        let source = Arc::new(RevisedSource { current: parking_lot::Mutex::new(with_pantry(true)) });
        let mut d = deps(Arc::new(MemoryStore::new()));
        d.source = source.clone();
        let mut session = Session::open(d, ModelId(1)).await.unwrap();
        session.apply(Action::Select(OptionId(10))).unwrap();
        session.apply(Action::Select(OptionId(21))).unwrap();

        let mut revised = with_pantry(true);
        revised.options[2].conflicts = vec![OptionId(10)];
        *source.current.lock() = revised;
        session.refresh_catalog().await.unwrap();

        assert!(session.selection().is_selected(OptionId(10)));
        assert!(!session.selection().is_selected(OptionId(21)));
    }

    #[tokio::test]
    async fn test_package_selects_option_and_group() {
        let mut session = Session::open(deps(Arc::new(MemoryStore::new())), ModelId(1)).await.unwrap();

        let picked: Vec<String> = session
            .select_package(OptionId(10), 2)
            .unwrap()
            .iter()
            .map(|img| img.url.clone())
            .collect();
        assert_eq!(picked, vec!["marble-1.jpg", "marble-2.jpg"]);
        assert!(session.selection().is_selected(OptionId(10)));

        let summary = session.summary().unwrap();
        assert_eq!(summary.floors[0].items[0].package.len(), 2);

        session.select_package(OptionId(10), 1).unwrap();
        assert_eq!(session.package(OptionId(10)), &[GalleryImage::new("butcher-block.jpg")]);

        session.apply(Action::Deselect(OptionId(10))).unwrap();
        assert!(session.package(OptionId(10)).is_empty());
    }

    #[tokio::test]
    async fn test_package_out_of_range_changes_nothing() {
        let mut session = Session::open(deps(Arc::new(MemoryStore::new())), ModelId(1)).await.unwrap();
        let err = session.select_package(OptionId(10), 7).unwrap_err();
        assert!(matches!(err, SessionError::Package(PackageError::NoSuchImage { index: 7, .. })));
        assert!(session.selection().is_empty());
        assert!(!session.clear_package(OptionId(10)));
    }

    #[tokio::test]
    async fn test_reactivating_floor_keeps_history() {
        let mut session = Session::open(deps(Arc::new(MemoryStore::new())), ModelId(1)).await.unwrap();
        session.add_markup(line()).unwrap();
        session.set_floor(FloorId(1)).unwrap();
        assert!(session.can_undo());
        assert_eq!(session.markups().len(), 1);
    }
}
