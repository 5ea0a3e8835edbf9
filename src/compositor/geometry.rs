//! Canvas geometry: background fitting and percent-to-pixel placement

use serde::Serialize;

use super::assets::ImageInfo;
use crate::catalog::{PercentPoint, Placement};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CanvasSize {
    pub width: f64,
    pub height: f64,
}

impl CanvasSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.width / 2.0, self.height / 2.0)
    }
}

/// Axis-aligned rectangle in canvas pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let left = self.left.min(other.left);
        let top = self.top.min(other.top);
        Rect {
            left,
            top,
            width: self.right().max(other.right()) - left,
            height: self.bottom().max(other.bottom()) - top,
        }
    }
}

/// Where the background landed on the canvas. Every overlay and hotspot
/// is positioned relative to this rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BackgroundMetrics {
    pub offset_x: f64,
    pub offset_y: f64,
    pub scale: f64,
    /// Rendered size, i.e. natural size times `scale`
    pub width: f64,
    pub height: f64,
}

impl BackgroundMetrics {
    /// Fit an image inside the canvas, preserving aspect ratio, centred
    pub fn fit(canvas: CanvasSize, image: ImageInfo) -> Self {
        let iw = f64::from(image.width.max(1));
        let ih = f64::from(image.height.max(1));
        let scale = (canvas.width / iw).min(canvas.height / ih);
        let width = iw * scale;
        let height = ih * scale;
        Self {
            offset_x: (canvas.width - width) / 2.0,
            offset_y: (canvas.height - height) / 2.0,
            scale,
            width,
            height,
        }
    }

    /// Metrics used when there is no background image
    pub fn full_canvas(canvas: CanvasSize) -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            scale: 1.0,
            width: canvas.width,
            height: canvas.height,
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect {
            left: self.offset_x,
            top: self.offset_y,
            width: self.width,
            height: self.height,
        }
    }

    /// Rectangle covered by a percent placement
    pub fn place(&self, placement: &Placement) -> Rect {
        Rect {
            left: self.offset_x + (placement.x / 100.0) * self.width,
            top: self.offset_y + (placement.y / 100.0) * self.height,
            width: (placement.width / 100.0) * self.width,
            height: (placement.height / 100.0) * self.height,
        }
    }

    pub fn point(&self, p: PercentPoint) -> (f64, f64) {
        (
            self.offset_x + (p.x / 100.0) * self.width,
            self.offset_y + (p.y / 100.0) * self.height,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_letterboxes_wide_image() {
        let m = BackgroundMetrics::fit(CanvasSize::new(1200.0, 800.0), ImageInfo::new(2400, 800));
        assert_eq!(m.scale, 0.5);
        assert_eq!((m.width, m.height), (1200.0, 400.0));
        assert_eq!((m.offset_x, m.offset_y), (0.0, 200.0));
    }

    #[test]
    fn test_place_percent_rectangle() {
        let m = BackgroundMetrics::fit(CanvasSize::new(1200.0, 800.0), ImageInfo::new(2400, 800));
        let r = m.place(&Placement { x: 50.0, y: 25.0, width: 10.0, height: 50.0 });
        assert_eq!(r, Rect { left: 600.0, top: 300.0, width: 120.0, height: 200.0 });
    }

    #[test]
    fn test_union() {
        let a = Rect { left: 0.0, top: 10.0, width: 10.0, height: 10.0 };
        let b = Rect { left: -5.0, top: 15.0, width: 5.0, height: 20.0 };
        assert_eq!(a.union(&b), Rect { left: -5.0, top: 10.0, width: 15.0, height: 25.0 });
    }
}
