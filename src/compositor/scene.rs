//! Materialized scene state owned by the compositor

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use super::assets::ImageInfo;
use super::geometry::{BackgroundMetrics, Rect};
use super::viewport::Viewport;
use crate::catalog::{FloorId, OptionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct LayerId(pub u64);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Overlay,
    Hotspot,
}

/// Side-table entry identifying what a layer stands for
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerTag {
    pub kind: LayerKind,
    pub option_id: Option<OptionId>,
    pub layer_order: i32,
    pub hotspot_key: Option<String>,
}

impl LayerTag {
    pub fn overlay(option_id: OptionId, layer_order: i32) -> Self {
        Self {
            kind: LayerKind::Overlay,
            option_id: Some(option_id),
            layer_order,
            hotspot_key: None,
        }
    }

    pub fn hotspot(key: String) -> Self {
        Self {
            kind: LayerKind::Hotspot,
            option_id: None,
            layer_order: 0,
            hotspot_key: Some(key),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layer {
    pub id: LayerId,
    pub source: String,
    pub bounds: Rect,
    pub scale_x: f64,
    pub scale_y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Background {
    Empty,
    Image { source: String, info: ImageInfo },
    Placeholder { message: String },
}

#[derive(Debug)]
pub(crate) struct Scene {
    pub(crate) floor: Option<FloorId>,
    /// Background source this scene was built for, set only once committed
    pub(crate) background_ref: Option<String>,
    pub(crate) background: Background,
    pub(crate) metrics: Option<BackgroundMetrics>,
    /// Paint order, bottom first
    pub(crate) layers: Vec<Layer>,
    pub(crate) tags: HashMap<LayerId, LayerTag>,
    pub(crate) viewport: Viewport,
    next_id: u64,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            floor: None,
            background_ref: None,
            background: Background::Empty,
            metrics: None,
            layers: vec![],
            tags: HashMap::new(),
            viewport: Viewport::IDENTITY,
            next_id: 1,
        }
    }
}

impl Scene {
    pub(crate) fn insert(&mut self, layer: impl FnOnce(LayerId) -> Layer, tag: LayerTag) -> LayerId {
        let id = LayerId(self.next_id);
        self.next_id += 1;
        self.layers.push(layer(id));
        self.tags.insert(id, tag);
        id
    }

    /// Drop every layer whose tag fails `keep`; returns the removed tags
    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&LayerTag) -> bool) -> Vec<LayerTag> {
        let doomed: Vec<LayerId> = self
            .tags
            .iter()
            .filter(|(_, tag)| !keep(tag))
            .map(|(id, _)| *id)
            .collect();
        let mut removed = Vec::with_capacity(doomed.len());
        for id in &doomed {
            if let Some(tag) = self.tags.remove(id) {
                removed.push(tag);
            }
        }
        self.layers.retain(|l| self.tags.contains_key(&l.id));
        removed
    }

    pub(crate) fn clear_layers(&mut self) {
        self.layers.clear();
        self.tags.clear();
    }

    pub(crate) fn overlay_layer(&self, option: OptionId) -> Option<LayerId> {
        self.tags
            .iter()
            .find(|(_, t)| t.kind == LayerKind::Overlay && t.option_id == Some(option))
            .map(|(id, _)| *id)
    }

    pub(crate) fn hotspot_layer(&self, key: &str) -> Option<LayerId> {
        self.tags
            .iter()
            .find(|(_, t)| t.kind == LayerKind::Hotspot && t.hotspot_key.as_deref() == Some(key))
            .map(|(id, _)| *id)
    }

    /// Overlays ascending by layer order (stable), hotspot icons on top
    pub(crate) fn sort_layers(&mut self) {
        let tags = &self.tags;
        self.layers.sort_by_key(|l| match tags.get(&l.id) {
            Some(t) if t.kind == LayerKind::Hotspot => (1, 0),
            Some(t) => (0, t.layer_order),
            None => (0, 0),
        });
    }

    pub(crate) fn content_bounds(&self) -> Option<Rect> {
        let background = match self.background {
            Background::Image { .. } => self.metrics.map(|m| m.bounds()),
            _ => None,
        };
        self.layers
            .iter()
            .map(|l| l.bounds)
            .chain(background)
            .reduce(|acc, r| acc.union(&r))
    }

    pub(crate) fn snapshot(&self) -> SceneSnapshot {
        SceneSnapshot {
            floor: self.floor,
            background: self.background.clone(),
            metrics: self.metrics,
            viewport: self.viewport,
            layers: self
                .layers
                .iter()
                .filter_map(|l| {
                    self.tags.get(&l.id).map(|tag| SceneLayer {
                        layer: l.clone(),
                        tag: tag.clone(),
                    })
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneLayer {
    #[serde(flatten)]
    pub layer: Layer,
    pub tag: LayerTag,
}

/// Read-only copy of the scene in paint order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneSnapshot {
    pub floor: Option<FloorId>,
    pub background: Background,
    pub metrics: Option<BackgroundMetrics>,
    pub viewport: Viewport,
    pub layers: Vec<SceneLayer>,
}

impl SceneSnapshot {
    pub fn layer_ids(&self) -> Vec<LayerId> {
        self.layers.iter().map(|l| l.layer.id).collect()
    }

    pub fn overlay_options(&self) -> Vec<OptionId> {
        self.layers
            .iter()
            .filter(|l| l.tag.kind == LayerKind::Overlay)
            .filter_map(|l| l.tag.option_id)
            .collect()
    }

    pub fn hotspot_keys(&self) -> Vec<&str> {
        self.layers
            .iter()
            .filter_map(|l| l.tag.hotspot_key.as_deref())
            .collect()
    }

    pub fn overlay(&self, option: OptionId) -> Option<&Layer> {
        self.layers
            .iter()
            .find(|l| l.tag.kind == LayerKind::Overlay && l.tag.option_id == Some(option))
            .map(|l| &l.layer)
    }
}
