//! Free-form markup kept per floor, above every selection-driven layer

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::catalog::FloorId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkupId(pub u64);

impl fmt::Display for MarkupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum MarkupError {
    #[error("No floor is active")]
    NoActiveFloor,

    #[error("Markup not found: {0}")]
    NotFound(MarkupId),

    #[error("Markup snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub color: String,
    pub width: f64,
}

impl Default for Stroke {
    fn default() -> Self {
        Self {
            color: "#ff0000".to_string(),
            width: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Markup {
    Line {
        from: Point,
        to: Point,
        #[serde(default)]
        stroke: Stroke,
    },
    Path {
        points: Vec<Point>,
        #[serde(default)]
        stroke: Stroke,
    },
    Text {
        at: Point,
        text: String,
        #[serde(default = "default_font_size")]
        size: f64,
        #[serde(default)]
        color: Option<String>,
    },
}

fn default_font_size() -> f64 {
    20.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkupItem {
    pub id: MarkupId,
    #[serde(flatten)]
    pub markup: Markup,
}

/// Markup for every floor visited this session. Switching floors swaps
/// the visible set; nothing is discarded.
#[derive(Debug, Default)]
pub struct MarkupBoard {
    floors: HashMap<FloorId, Vec<MarkupItem>>,
    current: Option<FloorId>,
    next_id: u64,
}

impl MarkupBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn swap_floor(&mut self, floor: FloorId) -> &[MarkupItem] {
        self.current = Some(floor);
        self.floors.entry(floor).or_default()
    }

    pub fn current_floor(&self) -> Option<FloorId> {
        self.current
    }

    pub fn items(&self) -> &[MarkupItem] {
        self.current
            .and_then(|f| self.floors.get(&f))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn items_mut(&mut self) -> Result<&mut Vec<MarkupItem>, MarkupError> {
        let floor = self.current.ok_or(MarkupError::NoActiveFloor)?;
        Ok(self.floors.entry(floor).or_default())
    }

    pub fn add(&mut self, markup: Markup) -> Result<MarkupId, MarkupError> {
        self.next_id += 1;
        let id = MarkupId(self.next_id);
        self.items_mut()?.push(MarkupItem { id, markup });
        Ok(id)
    }

    pub fn update(&mut self, id: MarkupId, markup: Markup) -> Result<(), MarkupError> {
        let item = self
            .items_mut()?
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(MarkupError::NotFound(id))?;
        item.markup = markup;
        Ok(())
    }

    pub fn remove(&mut self, id: MarkupId) -> Result<(), MarkupError> {
        let items = self.items_mut()?;
        let before = items.len();
        items.retain(|i| i.id != id);
        if items.len() == before {
            return Err(MarkupError::NotFound(id));
        }
        Ok(())
    }

    /// Serialized markup of the active floor
    pub fn snapshot(&self) -> Result<String, MarkupError> {
        Ok(serde_json::to_string(self.items())?)
    }

    /// Replace the active floor's markup with a snapshot's contents
    pub fn restore(&mut self, snapshot: &str) -> Result<(), MarkupError> {
        let restored: Vec<MarkupItem> = serde_json::from_str(snapshot)?;
        if let Some(max) = restored.iter().map(|i| i.id.0).max() {
            self.next_id = self.next_id.max(max);
        }
        *self.items_mut()? = restored;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> Markup {
        Markup::Line {
            from: Point { x: 0.0, y: 0.0 },
            to: Point { x: 10.0, y: 5.0 },
            stroke: Stroke::default(),
        }
    }

    #[test]
    fn test_requires_active_floor() {
        let mut board = MarkupBoard::new();
        assert!(matches!(board.add(line()), Err(MarkupError::NoActiveFloor)));
    }

    #[test]
    fn test_floors_swap_not_clear() {
        let mut board = MarkupBoard::new();
        board.swap_floor(FloorId(1));
        board.add(line()).unwrap();
        assert!(board.swap_floor(FloorId(2)).is_empty());
        assert_eq!(board.swap_floor(FloorId(1)).len(), 1);
    }

    #[test]
    fn test_snapshot_restore() {
        let mut board = MarkupBoard::new();
        board.swap_floor(FloorId(1));
        let empty = board.snapshot().unwrap();
        let id = board.add(line()).unwrap();
        let one = board.snapshot().unwrap();
        assert!(one.contains(r#""type":"line""#));

        board.restore(&empty).unwrap();
        assert!(board.items().is_empty());
        board.restore(&one).unwrap();
        assert_eq!(board.items()[0].id, id);

        let next = board.add(line()).unwrap();
        assert_ne!(next, id);
    }

    #[test]
    fn test_remove_unknown() {
        let mut board = MarkupBoard::new();
        board.swap_floor(FloorId(1));
        assert!(matches!(board.remove(MarkupId(9)), Err(MarkupError::NotFound(_))));
    }

    #[test]
    fn test_text_defaults() {
        let item: MarkupItem =
            serde_json::from_str(r#"{"id": 4, "type": "text", "at": {"x": 1, "y": 2}, "text": "Note"}"#).unwrap();
        assert_eq!(
            item.markup,
            Markup::Text { at: Point { x: 1.0, y: 2.0 }, text: "Note".to_string(), size: 20.0, color: None }
        );
    }
}
