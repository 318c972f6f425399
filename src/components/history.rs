use image::RgbaImage;
use std::sync::Arc;

use crate::canvas::MaskRaster;
use crate::log_err;

// ============================================================================
// SNAPSHOT — immutable full-raster copy
// ============================================================================

/// A frozen copy of the mask raster.
///
/// The buffer is shared behind an `Arc` so moving a snapshot between the undo
/// and redo stacks never copies pixels. Nothing hands out mutable access, and
/// restoring copies the pixels out, so later edits to the live raster cannot
/// reach a snapshot.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pixels: Arc<RgbaImage>,
}

impl Snapshot {
    pub fn capture(raster: &MaskRaster) -> Self {
        Self {
            pixels: Arc::new(raster.image().clone()),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn restore_into(&self, raster: &mut MaskRaster) -> bool {
        raster.restore_from(&self.pixels)
    }

    pub fn memory_size(&self) -> usize {
        self.pixels.as_raw().len()
    }
}

// ============================================================================
// HISTORY MANAGER - full-state undo/redo stacks with optional limits
// ============================================================================

/// Caps on how much history is retained. Both default to unlimited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HistoryLimits {
    /// Maximum entries on the undo stack, including the blank base.
    pub max_entries: Option<usize>,
    /// Maximum bytes held across both stacks.
    pub max_memory_bytes: Option<usize>,
}

/// Undo/redo availability after a history transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HistoryFlags {
    pub can_undo: bool,
    pub can_redo: bool,
}

/// Two-stack snapshot history.
///
/// `undo_stack[0]` is always the blank raster the session started from and the
/// last entry always matches the live raster. The stack is never empty once
/// `initialize` has run.
#[derive(Debug, Default)]
pub struct HistoryManager {
    undo_stack: Vec<Snapshot>,
    redo_stack: Vec<Snapshot>,
    limits: HistoryLimits,
    /// Running memory total across both stacks.
    total_memory: usize,
}

impl HistoryManager {
    pub fn new(limits: HistoryLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    pub fn limits(&self) -> HistoryLimits {
        self.limits
    }

    /// Drop all history and record `raster` as the sole base entry.
    pub fn initialize(&mut self, raster: &MaskRaster) -> HistoryFlags {
        self.clear();
        let base = Snapshot::capture(raster);
        self.total_memory = base.memory_size();
        self.undo_stack.push(base);
        self.flags()
    }

    /// Record the raster as the new current state after a finished stroke.
    /// Anything that was undone is no longer reachable.
    pub fn commit(&mut self, raster: &MaskRaster) -> HistoryFlags {
        for snap in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(snap.memory_size());
        }

        let snap = Snapshot::capture(raster);
        self.total_memory += snap.memory_size();
        self.undo_stack.push(snap);

        self.prune();
        self.flags()
    }

    /// Step back one entry and restore the raster to it.
    /// Returns `None` (raster and stacks untouched) when only the base entry
    /// remains or the raster no longer has the history's dimensions.
    pub fn undo(&mut self, raster: &mut MaskRaster) -> Option<HistoryFlags> {
        if !self.can_undo() {
            return None;
        }
        let target = self.undo_stack.get(self.undo_stack.len() - 2)?;
        if !target.restore_into(raster) {
            log_err!(
                "undo skipped: raster is {:?}, history holds {:?}",
                raster.dimensions(),
                target.image().dimensions()
            );
            return None;
        }
        let current = self.undo_stack.pop()?;
        self.redo_stack.push(current);
        Some(self.flags())
    }

    /// Re-apply the most recently undone entry.
    /// Returns `None` (raster and stacks untouched) when there is nothing to
    /// redo or the raster no longer has the history's dimensions.
    pub fn redo(&mut self, raster: &mut MaskRaster) -> Option<HistoryFlags> {
        let target = self.redo_stack.last()?;
        if !target.restore_into(raster) {
            log_err!(
                "redo skipped: raster is {:?}, history holds {:?}",
                raster.dimensions(),
                target.image().dimensions()
            );
            return None;
        }
        let snap = self.redo_stack.pop()?;
        self.undo_stack.push(snap);
        Some(self.flags())
    }

    pub fn can_undo(&self) -> bool {
        self.undo_stack.len() > 1
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn flags(&self) -> HistoryFlags {
        HistoryFlags {
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
        }
    }

    /// The entry that matches the live raster.
    pub fn current(&self) -> Option<&Snapshot> {
        self.undo_stack.last()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Get the current memory usage of the history (O(1) via cached total)
    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.total_memory = 0;
    }

    /// Evict the oldest entries above the base until within limits.
    fn prune(&mut self) {
        if let Some(max) = self.limits.max_entries {
            let max = max.max(2);
            while self.undo_stack.len() > max {
                let removed = self.undo_stack.remove(1);
                self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
            }
        }

        if let Some(max_bytes) = self.limits.max_memory_bytes {
            // Keep at least the base and the current entry
            while self.total_memory > max_bytes && self.undo_stack.len() > 2 {
                let removed = self.undo_stack.remove(1);
                self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn painted(width: u32, height: u32, shade: u8) -> MaskRaster {
        let mut raster = MaskRaster::new(width, height);
        raster.fill(Rgba([shade, shade, shade, 255]));
        raster
    }

    #[test]
    fn initialize_leaves_single_base_entry() {
        let mut history = HistoryManager::default();
        let flags = history.initialize(&MaskRaster::new(8, 8));
        assert_eq!(flags, HistoryFlags { can_undo: false, can_redo: false });
        assert_eq!(history.undo_count(), 1);
        assert_eq!(history.memory_usage(), 8 * 8 * 4);
    }

    #[test]
    fn undo_on_base_is_noop() {
        let mut history = HistoryManager::default();
        let mut raster = MaskRaster::new(4, 4);
        history.initialize(&raster);
        assert!(history.undo(&mut raster).is_none());
        assert!(history.redo(&mut raster).is_none());
        assert_eq!(history.undo_count(), 1);
    }

    #[test]
    fn snapshot_is_not_aliased_with_live_raster() {
        let mut history = HistoryManager::default();
        let mut raster = MaskRaster::new(4, 4);
        history.initialize(&raster);
        raster.fill(Rgba([255, 255, 255, 255]));
        history.commit(&raster);
        raster.fill(Rgba([9, 9, 9, 255]));
        let current = history.current().map(|s| *s.image().get_pixel(0, 0));
        assert_eq!(current, Some(Rgba([255, 255, 255, 255])));
    }

    #[test]
    fn undo_redo_walks_both_stacks() {
        let mut history = HistoryManager::default();
        let mut raster = MaskRaster::new(4, 4);
        history.initialize(&raster);
        raster = painted(4, 4, 100);
        history.commit(&raster);
        raster = painted(4, 4, 200);
        history.commit(&raster);

        let flags = history.undo(&mut raster);
        assert_eq!(flags, Some(HistoryFlags { can_undo: true, can_redo: true }));
        assert_eq!(raster, painted(4, 4, 100));

        history.undo(&mut raster);
        assert!(raster.is_blank());
        assert!(!history.can_undo());

        history.redo(&mut raster);
        history.redo(&mut raster);
        assert_eq!(raster, painted(4, 4, 200));
        assert!(!history.can_redo());
    }

    #[test]
    fn commit_discards_redo() {
        let mut history = HistoryManager::default();
        let mut raster = MaskRaster::new(4, 4);
        history.initialize(&raster);
        raster = painted(4, 4, 50);
        history.commit(&raster);
        history.undo(&mut raster);
        assert!(history.can_redo());
        raster = painted(4, 4, 70);
        let flags = history.commit(&raster);
        assert!(!flags.can_redo);
        assert!(history.redo(&mut raster).is_none());
        assert_eq!(history.memory_usage(), 2 * 4 * 4 * 4);
    }

    #[test]
    fn mismatched_raster_leaves_stacks_alone() {
        let mut history = HistoryManager::default();
        history.initialize(&MaskRaster::new(4, 4));
        history.commit(&painted(4, 4, 200));

        let mut other = MaskRaster::new(6, 3);
        assert!(history.undo(&mut other).is_none());
        assert_eq!((history.undo_count(), history.redo_count()), (2, 0));
        assert!(other.is_blank());

        let mut raster = painted(4, 4, 200);
        assert!(history.undo(&mut raster).is_some());
        assert!(history.redo(&mut other).is_none());
        assert_eq!((history.undo_count(), history.redo_count()), (1, 1));
        assert!(raster.is_blank());
    }

    #[test]
    fn entry_limit_keeps_blank_base() {
        let mut history = HistoryManager::new(HistoryLimits {
            max_entries: Some(3),
            max_memory_bytes: None,
        });
        let mut raster = MaskRaster::new(2, 2);
        history.initialize(&raster);
        for shade in [10, 20, 30, 40] {
            raster = painted(2, 2, shade);
            history.commit(&raster);
        }
        assert_eq!(history.undo_count(), 3);
        history.undo(&mut raster);
        assert_eq!(raster, painted(2, 2, 30));
        history.undo(&mut raster);
        assert!(raster.is_blank());
    }

    #[test]
    fn memory_limit_evicts_oldest_strokes() {
        let mut history = HistoryManager::new(HistoryLimits {
            max_entries: None,
            max_memory_bytes: Some(3 * 16),
        });
        let mut raster = MaskRaster::new(2, 2);
        history.initialize(&raster);
        for shade in [1, 2, 3, 4, 5] {
            raster = painted(2, 2, shade);
            history.commit(&raster);
        }
        assert_eq!(history.undo_count(), 3);
        assert!(history.memory_usage() <= 3 * 16);
    }
}
