use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use image::RgbaImage;
use tracing::debug;

use crate::canvas::{CanvasState, LayerId};
use crate::error::PaintError;

// ============================================================================
// SNAPSHOTS - immutable copy of every paint layer at one instant
// ============================================================================

/// All three paint layers, captured together. The sketch is never recorded.
#[derive(Clone, Debug)]
pub struct HistorySnapshot {
    layers: [Arc<RgbaImage>; 3],
}

impl HistorySnapshot {
    /// Buffers are shared with the canvas; the canvas copies on its next write.
    pub fn capture(state: &CanvasState) -> Self {
        Self {
            layers: LayerId::PAINT.map(|id| state.layer(id).shared_pixels()),
        }
    }

    pub fn layer(&self, id: LayerId) -> Option<&RgbaImage> {
        id.paint_slot().map(|slot| self.layers[slot].as_ref())
    }

    /// Overwrite every paint layer of `state` from this snapshot.
    pub fn restore_into(&self, state: &mut CanvasState) -> Result<(), PaintError> {
        for (slot, id) in LayerId::PAINT.into_iter().enumerate() {
            state.restore_layer(id, Arc::clone(&self.layers[slot]))?;
        }
        Ok(())
    }

    fn buffers(&self) -> impl Iterator<Item = &Arc<RgbaImage>> {
        self.layers.iter()
    }
}

// ============================================================================
// HISTORY MANAGER - linear snapshot log with a single step pointer
// ============================================================================

/// Global cross-layer undo/redo. `step` is `None` until the first push.
#[derive(Debug)]
pub struct HistoryManager {
    log: VecDeque<HistorySnapshot>,
    step: Option<usize>,
    max_history_size: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(50)
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            log: VecDeque::new(),
            step: None,
            max_history_size: max_history_size.max(1),
        }
    }

    /// Drop everything after the current step, append, and move to the end.
    pub fn push(&mut self, snapshot: HistorySnapshot) {
        let keep = self.step.map_or(0, |p| p + 1);
        self.log.truncate(keep);
        self.log.push_back(snapshot);
        self.step = Some(self.log.len() - 1);
        self.prune();
        debug!(step = self.step(), len = self.log.len(), "history snapshot pushed");
    }

    /// Capture `state` and push it.
    pub fn push_state(&mut self, state: &CanvasState) {
        self.push(HistorySnapshot::capture(state));
    }

    /// Step back; returns the snapshot the caller must restore.
    pub fn undo(&mut self) -> Option<&HistorySnapshot> {
        if !self.can_undo() {
            return None;
        }
        let p = self.step? - 1;
        self.step = Some(p);
        debug!(step = p, "undo");
        self.log.get(p)
    }

    pub fn redo(&mut self) -> Option<&HistorySnapshot> {
        if !self.can_redo() {
            return None;
        }
        let p = self.step.map_or(0, |p| p + 1);
        self.step = Some(p);
        debug!(step = p, "redo");
        self.log.get(p)
    }

    pub fn can_undo(&self) -> bool {
        self.step.is_some_and(|p| p > 0)
    }

    pub fn can_redo(&self) -> bool {
        self.step() < self.log.len() as isize - 1
    }

    /// Current step pointer, `-1` when empty.
    pub fn step(&self) -> isize {
        self.step.map_or(-1, |p| p as isize)
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn max_history_size(&self) -> usize {
        self.max_history_size
    }

    pub fn clear(&mut self) {
        self.log.clear();
        self.step = None;
    }

    /// Bytes held by distinct buffers across the log.
    pub fn memory_usage(&self) -> usize {
        let mut seen = HashSet::new();
        self.log
            .iter()
            .flat_map(HistorySnapshot::buffers)
            .filter(|buf| seen.insert(Arc::as_ptr(buf)))
            .map(|buf| buf.as_raw().len())
            .sum()
    }

    fn prune(&mut self) {
        while self.log.len() > self.max_history_size {
            self.log.pop_front();
            self.step = self.step.map(|p| p.saturating_sub(1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn canvas() -> CanvasState {
        CanvasState::new(RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255])))
    }

    fn paint(state: &mut CanvasState, id: LayerId, shade: u8) {
        state.set_active_layer(id);
        state.active_pixels_mut().put_pixel(0, 0, Rgba([shade, shade, shade, 255]));
    }

    fn pixel(state: &CanvasState, id: LayerId) -> Rgba<u8> {
        *state.layer(id).pixels().get_pixel(0, 0)
    }

    #[test]
    fn push_moves_pointer_to_tail() {
        let state = canvas();
        let mut history = HistoryManager::default();
        assert_eq!(history.step(), -1);
        assert!(!history.can_undo() && !history.can_redo());
        for _ in 0..3 {
            history.push_state(&state);
        }
        assert_eq!(history.step(), 2);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn undo_stops_at_initial_snapshot() {
        let mut state = canvas();
        let mut history = HistoryManager::default();
        history.push_state(&state);
        paint(&mut state, LayerId::Paint1, 10);
        history.push_state(&state);
        paint(&mut state, LayerId::Paint1, 20);
        history.push_state(&state);

        history.undo().unwrap().restore_into(&mut state).unwrap();
        history.undo().unwrap().restore_into(&mut state).unwrap();
        assert_eq!(history.step(), 0);
        assert!(state.layer(LayerId::Paint1).is_blank());

        assert!(history.undo().is_none());
        assert_eq!(history.step(), 0);
    }

    #[test]
    fn undo_on_empty_history_is_noop() {
        let mut history = HistoryManager::default();
        assert!(history.undo().is_none());
        assert!(history.redo().is_none());
        assert_eq!(history.step(), -1);
    }

    #[test]
    fn redo_advances_by_one() {
        let mut state = canvas();
        let mut history = HistoryManager::default();
        history.push_state(&state);
        for shade in [10, 20, 30] {
            paint(&mut state, LayerId::Paint1, shade);
            history.push_state(&state);
        }
        history.undo();
        history.undo();
        assert_eq!(history.step(), 1);

        history.redo().unwrap().restore_into(&mut state).unwrap();
        assert_eq!(history.step(), 2);
        assert_eq!(pixel(&state, LayerId::Paint1), Rgba([20, 20, 20, 255]));
        assert!(history.can_redo());
    }

    #[test]
    fn restore_covers_every_paint_layer() {
        let mut state = canvas();
        let mut history = HistoryManager::default();
        history.push_state(&state);
        paint(&mut state, LayerId::Paint1, 10);
        history.push_state(&state);
        paint(&mut state, LayerId::Paint3, 30);
        history.push_state(&state);

        history.undo().unwrap().restore_into(&mut state).unwrap();
        assert_eq!(pixel(&state, LayerId::Paint1), Rgba([10, 10, 10, 255]));
        assert!(state.layer(LayerId::Paint3).is_blank());
    }

    #[test]
    fn push_after_undo_discards_branch() {
        let mut state = canvas();
        let mut history = HistoryManager::default();
        history.push_state(&state);
        paint(&mut state, LayerId::Paint1, 10);
        history.push_state(&state);
        paint(&mut state, LayerId::Paint1, 20);
        history.push_state(&state);

        history.undo();
        paint(&mut state, LayerId::Paint2, 99);
        history.push_state(&state);
        assert_eq!(history.len(), 3);
        assert_eq!(history.step(), 2);
        assert!(!history.can_redo());
    }

    #[test]
    fn cap_drops_oldest_snapshots() {
        let mut state = canvas();
        let mut history = HistoryManager::new(3);
        for shade in 0..5 {
            paint(&mut state, LayerId::Paint1, shade);
            history.push_state(&state);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.step(), 2);
        let oldest = history.log.front().unwrap();
        assert_eq!(oldest.layer(LayerId::Paint1).unwrap().get_pixel(0, 0)[0], 2);
    }

    #[test]
    fn unchanged_layers_share_buffers() {
        let mut state = canvas();
        let mut history = HistoryManager::default();
        history.push_state(&state);
        paint(&mut state, LayerId::Paint1, 10);
        history.push_state(&state);

        let layer_bytes = 4 * 4 * 4;
        // Three initial buffers plus one detached copy of Paint1.
        assert_eq!(history.memory_usage(), 4 * layer_bytes);
    }
}
