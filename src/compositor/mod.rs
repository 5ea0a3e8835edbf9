//! Incremental Compositor - Single Entry Point
//!
//! `render_floor` keeps the materialized scene in step with the selection:
//! a floor or background change rebuilds the scene, anything else is a
//! diff against the overlay layers already on the canvas.
//!
//! CRITICAL: the scene lock is never held across an await. Every await is
//! followed by a render-generation check; a superseded render drops its
//! results instead of inserting them.

mod assets;
mod geometry;
mod scene;
mod viewport;

pub use assets::{
    decode_png_header, AssetError, AssetResolver, BaseUrlResolver, FsImageLoader, ImageInfo,
    ImageLoader,
};
pub use geometry::{BackgroundMetrics, CanvasSize, Rect};
pub use scene::{Background, Layer, LayerId, LayerKind, LayerTag, SceneLayer, SceneSnapshot};
pub use viewport::{Viewport, ZoomLimits};

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::catalog::{Catalog, ConfigOption, Floor, FloorId, OptionId};
use crate::hotspot::HotspotMapper;
use crate::selection::SelectionState;
use crate::settings::Settings;
use scene::Scene;

pub const ELEVATION_PLACEHOLDER: &str = "Select an option to preview...";
pub const PLAN_PLACEHOLDER: &str = "No Floor Plan Available";

#[derive(Debug, Error)]
pub enum CompositorError {
    #[error("Floor not found: {0}")]
    UnknownFloor(FloorId),
}

/// What a single render call did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderReport {
    pub floor: Option<FloorId>,
    pub generation: u64,
    /// A newer render started before this one finished; its results were dropped
    pub superseded: bool,
    pub rebuilt: bool,
    pub added: Vec<OptionId>,
    pub removed: Vec<OptionId>,
    pub failed: Vec<OptionId>,
}

/// The background a floor should show for the current selection
struct BackgroundPlan {
    source: Option<String>,
    placeholder: &'static str,
}

pub struct Compositor {
    canvas: CanvasSize,
    zoom_limits: ZoomLimits,
    zoom_step: f64,
    icon_size: f64,
    icon: String,
    mapper: HotspotMapper,
    assets: Arc<dyn AssetResolver>,
    loader: Arc<dyn ImageLoader>,
    scene: Mutex<Scene>,
    generation: AtomicU64,
}

impl Compositor {
    pub fn new(
        settings: &Settings,
        assets: Arc<dyn AssetResolver>,
        loader: Arc<dyn ImageLoader>,
    ) -> Self {
        Self {
            canvas: settings.canvas(),
            zoom_limits: settings.zoom_limits(),
            zoom_step: settings.zoom_step,
            icon_size: settings.hotspot_icon_size,
            icon: assets.resolve(&settings.hotspot_icon),
            mapper: HotspotMapper::new(settings.hotspot_precision),
            assets,
            loader,
            scene: Mutex::new(Scene::default()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn canvas(&self) -> CanvasSize {
        self.canvas
    }

    pub fn snapshot(&self) -> SceneSnapshot {
        self.scene.lock().snapshot()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Bring the scene in line with `selection` on `floor`.
    ///
    /// Safe to call repeatedly and concurrently; the last request wins.
    pub async fn render_floor(
        &self,
        catalog: &Catalog,
        selection: &SelectionState,
        floor: FloorId,
    ) -> Result<RenderReport, CompositorError> {
        let floor = catalog
            .floor(floor)
            .ok_or(CompositorError::UnknownFloor(floor))?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut report = RenderReport {
            floor: Some(floor.id),
            generation,
            ..RenderReport::default()
        };

        let plan = self.plan_background(catalog, selection, floor);
        let unchanged = {
            let scene = self.scene.lock();
            scene.floor == Some(floor.id) && scene.background_ref == plan.source
        };

        if !unchanged {
            if !self.rebuild(floor, &plan, generation).await {
                report.superseded = true;
                return Ok(report);
            }
            report.rebuilt = true;
        }

        // Elevations show a single full-bleed image; no per-option rectangles
        if !floor.is_elevation() {
            if !self
                .sync_overlays(catalog, selection, floor, generation, &mut report)
                .await
            {
                report.superseded = true;
                return Ok(report);
            }
        }

        let mut scene = self.scene.lock();
        if !self.is_current(generation) {
            report.superseded = true;
            return Ok(report);
        }
        self.sync_hotspots(&mut scene, catalog, selection, floor);
        scene.sort_layers();
        debug!(
            floor = %floor.id,
            generation,
            rebuilt = report.rebuilt,
            added = report.added.len(),
            removed = report.removed.len(),
            layers = scene.layers.len(),
            "render settled"
        );
        Ok(report)
    }

    fn plan_background(
        &self,
        catalog: &Catalog,
        selection: &SelectionState,
        floor: &Floor,
    ) -> BackgroundPlan {
        if floor.is_elevation() {
            let options = catalog.options_for_floor(floor.id);
            let chosen = options
                .iter()
                .find(|o| selection.is_selected(o.id) && o.overlay().is_some())
                .or_else(|| options.iter().find(|o| o.overlay().is_some()))
                .and_then(|o| o.overlay());
            let source = chosen
                .or_else(|| non_blank(floor.base_image.as_deref()))
                .map(|id| self.assets.resolve(id));
            BackgroundPlan { source, placeholder: ELEVATION_PLACEHOLDER }
        } else {
            BackgroundPlan {
                source: non_blank(floor.base_image.as_deref()).map(|id| self.assets.resolve(id)),
                placeholder: PLAN_PLACEHOLDER,
            }
        }
    }

    /// Full wipe: load the background, then swap it in with every
    /// selection-driven layer cleared. Returns false when superseded.
    async fn rebuild(&self, floor: &Floor, plan: &BackgroundPlan, generation: u64) -> bool {
        let loaded = match &plan.source {
            Some(url) => match self.loader.load(url).await {
                Ok(info) => Some((url.clone(), info)),
                Err(e) => {
                    warn!(floor = %floor.id, url = %url, error = %e, "background failed to load");
                    None
                }
            },
            None => None,
        };

        let mut scene = self.scene.lock();
        if !self.is_current(generation) {
            debug!(floor = %floor.id, generation, "dropping superseded background");
            return false;
        }

        if scene.floor != Some(floor.id) {
            scene.viewport.reset();
        }
        scene.clear_layers();
        match loaded {
            Some((source, info)) => {
                scene.metrics = Some(BackgroundMetrics::fit(self.canvas, info));
                scene.background = Background::Image { source, info };
            }
            None => {
                scene.metrics = Some(BackgroundMetrics::full_canvas(self.canvas));
                scene.background = Background::Placeholder {
                    message: plan.placeholder.to_string(),
                };
            }
        }
        scene.floor = Some(floor.id);
        scene.background_ref = plan.source.clone();
        true
    }

    /// Diff overlay layers against the selection. Returns false when superseded.
    async fn sync_overlays(
        &self,
        catalog: &Catalog,
        selection: &SelectionState,
        floor: &Floor,
        generation: u64,
        report: &mut RenderReport,
    ) -> bool {
        let target: Vec<&ConfigOption> = catalog
            .options_for_floor(floor.id)
            .into_iter()
            .filter(|o| selection.is_selected(o.id) && o.overlay().is_some())
            .collect();
        let wanted: HashSet<OptionId> = target.iter().map(|o| o.id).collect();

        let missing: Vec<&ConfigOption> = {
            let mut scene = self.scene.lock();
            let removed = scene.retain(|tag| {
                tag.kind != LayerKind::Overlay || tag.option_id.is_some_and(|id| wanted.contains(&id))
            });
            report.removed = removed.iter().filter_map(|t| t.option_id).collect();
            target
                .into_iter()
                .filter(|o| scene.overlay_layer(o.id).is_none())
                .collect()
        };

        for option in missing {
            let Some(image) = option.overlay() else { continue };
            let url = self.assets.resolve(image);
            let loaded = self.loader.load(&url).await;

            let mut scene = self.scene.lock();
            if !self.is_current(generation) {
                debug!(option = %option.id, generation, "dropping superseded overlay load");
                return false;
            }
            let info = match loaded {
                Ok(info) => info,
                Err(e) => {
                    warn!(option = %option.id, url = %url, error = %e, "overlay failed to load, omitting layer");
                    report.failed.push(option.id);
                    continue;
                }
            };
            if scene.overlay_layer(option.id).is_some() {
                continue;
            }
            let Some(metrics) = scene.metrics else { continue };

            let bounds = metrics.place(&option.placement);
            scene.insert(
                |id| Layer {
                    id,
                    source: url,
                    bounds,
                    scale_x: bounds.width / f64::from(info.width.max(1)),
                    scale_y: bounds.height / f64::from(info.height.max(1)),
                },
                LayerTag::overlay(option.id, option.layer_order),
            );
            report.added.push(option.id);
        }
        true
    }

    /// Reconcile hotspot icons by coordinate key so unchanged icons keep their ids
    fn sync_hotspots(
        &self,
        scene: &mut Scene,
        catalog: &Catalog,
        selection: &SelectionState,
        floor: &Floor,
    ) {
        let Some(metrics) = scene.metrics else { return };
        let hotspots = if floor.is_elevation() {
            vec![]
        } else {
            self.mapper.hotspots(catalog, selection, floor.id)
        };

        let keys: HashSet<&str> = hotspots.iter().map(|h| h.key.as_str()).collect();
        scene.retain(|tag| {
            tag.kind != LayerKind::Hotspot
                || tag.hotspot_key.as_deref().is_some_and(|k| keys.contains(k))
        });

        let half = self.icon_size / 2.0;
        for hotspot in &hotspots {
            if scene.hotspot_layer(&hotspot.key).is_some() {
                continue;
            }
            let (x, y) = metrics.point(hotspot.point);
            let bounds = Rect {
                left: x - half,
                top: y - half,
                width: self.icon_size,
                height: self.icon_size,
            };
            scene.insert(
                |id| Layer {
                    id,
                    source: self.icon.clone(),
                    bounds,
                    scale_x: 1.0,
                    scale_y: 1.0,
                },
                LayerTag::hotspot(hotspot.key.clone()),
            );
        }
    }

    // --- Viewport ---

    /// One zoom step in (`true`) or out about the canvas centre
    pub fn zoom_step(&self, zoom_in: bool) -> Viewport {
        let factor = if zoom_in { self.zoom_step } else { 1.0 / self.zoom_step };
        self.zoom_by(factor)
    }

    pub fn zoom_by(&self, factor: f64) -> Viewport {
        let mut scene = self.scene.lock();
        scene.viewport.zoom_by(factor, self.canvas, self.zoom_limits);
        scene.viewport
    }

    pub fn zoom_to_point(&self, x: f64, y: f64, zoom: f64) -> Viewport {
        let mut scene = self.scene.lock();
        scene.viewport.zoom_to_point(x, y, zoom, self.zoom_limits);
        scene.viewport
    }

    pub fn pan_by(&self, dx: f64, dy: f64) -> Viewport {
        let mut scene = self.scene.lock();
        scene.viewport.pan_by(dx, dy);
        scene.viewport
    }

    pub fn reset_viewport(&self) -> Viewport {
        let mut scene = self.scene.lock();
        scene.viewport.reset();
        scene.viewport
    }

    /// Zoom to the extents of the background and every layer
    pub fn fit_to_content(&self) -> Viewport {
        let mut scene = self.scene.lock();
        if let Some(bounds) = scene.content_bounds() {
            scene.viewport.fit(bounds, self.canvas);
        }
        scene.viewport
    }
}

fn non_blank(id: Option<&str>) -> Option<&str> {
    id.map(str::trim).filter(|s| !s.is_empty() && *s != "null")
}
