//! Viewport transform: uniform zoom plus pan, canvas = world * zoom + pan

use serde::Serialize;

use super::geometry::{CanvasSize, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZoomLimits {
    pub min: f64,
    pub max: f64,
}

impl ZoomLimits {
    pub fn clamp(&self, zoom: f64) -> f64 {
        zoom.max(self.min).min(self.max)
    }
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self { min: 0.2, max: 5.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub zoom: f64,
    pub pan_x: f64,
    pub pan_y: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Viewport {
    pub const IDENTITY: Viewport = Viewport { zoom: 1.0, pan_x: 0.0, pan_y: 0.0 };

    pub fn reset(&mut self) {
        *self = Self::IDENTITY;
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Zoom so the world point under canvas point (x, y) stays put
    pub fn zoom_to_point(&mut self, x: f64, y: f64, zoom: f64, limits: ZoomLimits) {
        let zoom = limits.clamp(zoom);
        let world_x = (x - self.pan_x) / self.zoom;
        let world_y = (y - self.pan_y) / self.zoom;
        self.zoom = zoom;
        self.pan_x = x - world_x * zoom;
        self.pan_y = y - world_y * zoom;
    }

    /// Multiply the zoom about the canvas centre
    pub fn zoom_by(&mut self, factor: f64, canvas: CanvasSize, limits: ZoomLimits) {
        let (cx, cy) = canvas.center();
        self.zoom_to_point(cx, cy, self.zoom * factor, limits);
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.pan_x += dx;
        self.pan_y += dy;
    }

    /// Zoom to extents: fit `bounds` entirely and centre it. Not clamped,
    /// matching a manual "fit" which may exceed the interactive limits.
    pub fn fit(&mut self, bounds: Rect, canvas: CanvasSize) {
        if bounds.width <= 0.0 || bounds.height <= 0.0 {
            return;
        }
        let zoom = (canvas.width / bounds.width).min(canvas.height / bounds.height);
        let (cx, cy) = canvas.center();
        self.zoom = zoom;
        self.pan_x = cx - (bounds.left + bounds.width / 2.0) * zoom;
        self.pan_y = cy - (bounds.top + bounds.height / 2.0) * zoom;
    }

    pub fn to_canvas(&self, x: f64, y: f64) -> (f64, f64) {
        (x * self.zoom + self.pan_x, y * self.zoom + self.pan_y)
    }
}
