//! Annotation History Stack
//!
//! Linear list of markup snapshots plus a cursor. Recording while a replay
//! is in progress is ignored so undo/redo never write their own history.

use tracing::debug;

#[derive(Debug, Default)]
pub struct AnnotationHistory {
    states: Vec<String>,
    /// Index of the state currently shown; None when empty
    cursor: Option<usize>,
    replaying: bool,
}

impl AnnotationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start over with `seed` as the only state
    pub fn reset(&mut self, seed: String) {
        self.states = vec![seed];
        self.cursor = Some(0);
        self.replaying = false;
    }

    /// Capture an edit. Drops any redo tail. Returns false while replaying.
    pub fn record(&mut self, snapshot: String) -> bool {
        if self.replaying {
            debug!("snapshot suppressed during replay");
            return false;
        }
        let keep = self.cursor.map_or(0, |c| c + 1);
        self.states.truncate(keep);
        self.states.push(snapshot);
        self.cursor = Some(self.states.len() - 1);
        true
    }

    pub fn can_undo(&self) -> bool {
        self.cursor.is_some_and(|c| c > 0)
    }

    pub fn can_redo(&self) -> bool {
        self.cursor.is_some_and(|c| c + 1 < self.states.len())
    }

    /// Step back; returns the snapshot to restore
    pub fn undo(&mut self) -> Option<String> {
        let c = self.cursor.filter(|c| *c > 0)?;
        self.cursor = Some(c - 1);
        self.states.get(c - 1).cloned()
    }

    /// Step forward; returns the snapshot to restore
    pub fn redo(&mut self) -> Option<String> {
        let c = self.cursor.filter(|c| c + 1 < self.states.len())?;
        self.cursor = Some(c + 1);
        self.states.get(c + 1).cloned()
    }

    pub fn begin_replay(&mut self) {
        self.replaying = true;
    }

    pub fn end_replay(&mut self) {
        self.replaying = false;
    }

    pub fn is_replaying(&self) -> bool {
        self.replaying
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
