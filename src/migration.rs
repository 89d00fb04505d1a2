// Migration manager: authoritative item count and active-backend flag.
//
// Pure threshold bookkeeping lives here; the actual record copy is driven by
// the store, which owns both sinks. The mode flips only after a copy
// completes, so a failed migration leaves reads on the backend they started
// from and the pending direction is retried on the next count update.

use crate::store::StoreMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    /// Flat file -> document store; the document store becomes active.
    ImportToDocumentStore,
    /// Document store -> flat file; the flat file becomes active.
    ExportToFlatFile,
}

impl MigrationDirection {
    pub fn target_mode(self) -> StoreMode {
        match self {
            MigrationDirection::ImportToDocumentStore => StoreMode::Document,
            MigrationDirection::ExportToFlatFile => StoreMode::FlatFile,
        }
    }
}

#[derive(Debug)]
pub struct MigrationManager {
    count: usize,
    mode: StoreMode,
    pending: Option<MigrationDirection>,
    threshold: usize,
}

impl MigrationManager {
    pub fn new(threshold: usize) -> Self {
        Self {
            count: 0,
            mode: StoreMode::default(),
            pending: None,
            threshold: threshold.max(1),
        }
    }

    /// Adopt the persisted mode and the count observed on that backend.
    /// Called once at startup; a later real count arrives via
    /// `update_count`.
    pub fn init(&mut self, mode: StoreMode, count: usize) {
        self.mode = mode;
        self.count = count;
        self.pending = None;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mode(&self) -> StoreMode {
        self.mode
    }

    pub fn pending(&self) -> Option<MigrationDirection> {
        self.pending
    }

    /// Record a new authoritative count and schedule a migration when the
    /// threshold was crossed. Returns the direction newly scheduled by this
    /// call, if any. An already-pending direction (from a failed copy) is
    /// kept until it succeeds or a crossing back supersedes it.
    pub fn update_count(&mut self, new_count: usize) -> Option<MigrationDirection> {
        let old_count = self.count;
        self.count = new_count;

        if old_count >= self.threshold && new_count < self.threshold {
            return self.schedule(MigrationDirection::ExportToFlatFile);
        }

        // The old_count != 0 guard suppresses a spurious import on the very
        // first update after init, before any real count was observed.
        if new_count >= self.threshold && old_count < self.threshold && old_count != 0 {
            return self.schedule(MigrationDirection::ImportToDocumentStore);
        }

        None
    }

    fn schedule(&mut self, direction: MigrationDirection) -> Option<MigrationDirection> {
        // Crossing back toward the still-active backend means an earlier
        // copy never completed; reads never moved, so there is nothing to
        // copy and copying would clobber current data with a stale sink.
        if self.mode == direction.target_mode() {
            self.pending = None;
            return None;
        }
        self.pending = Some(direction);
        self.pending
    }

    /// A full copy finished; flip the active backend and clear the pending
    /// direction.
    pub fn complete(&mut self, direction: MigrationDirection) {
        self.mode = direction.target_mode();
        if self.pending == Some(direction) {
            self.pending = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_crossing_schedules_once_each_way() {
        let mut mgr = MigrationManager::new(10_000);
        mgr.init(StoreMode::FlatFile, 9_999);

        // 9999 -> 10000 -> 9999: one import, one export
        assert_eq!(mgr.update_count(9_999), None);
        assert_eq!(
            mgr.update_count(10_000),
            Some(MigrationDirection::ImportToDocumentStore)
        );
        mgr.complete(MigrationDirection::ImportToDocumentStore);
        assert_eq!(mgr.mode(), StoreMode::Document);

        assert_eq!(
            mgr.update_count(9_999),
            Some(MigrationDirection::ExportToFlatFile)
        );
        mgr.complete(MigrationDirection::ExportToFlatFile);
        assert_eq!(mgr.mode(), StoreMode::FlatFile);
        assert_eq!(mgr.pending(), None);
    }

    #[test]
    fn no_migration_on_first_update_after_empty_init() {
        let mut mgr = MigrationManager::new(10_000);
        mgr.init(StoreMode::FlatFile, 0);

        // A fresh library jumping straight past the threshold must not
        // schedule anything (old_count == 0 guard).
        assert_eq!(mgr.update_count(10_000), None);
        assert_eq!(mgr.pending(), None);
    }

    #[test]
    fn staying_on_one_side_schedules_nothing() {
        let mut mgr = MigrationManager::new(100);
        mgr.init(StoreMode::FlatFile, 10);
        assert_eq!(mgr.update_count(50), None);
        assert_eq!(mgr.update_count(99), None);
        mgr.init(StoreMode::Document, 500);
        assert_eq!(mgr.update_count(200), None);
        assert_eq!(mgr.update_count(101), None);
    }

    #[test]
    fn failed_copy_keeps_pending_for_retry() {
        let mut mgr = MigrationManager::new(100);
        mgr.init(StoreMode::FlatFile, 99);
        assert_eq!(
            mgr.update_count(100),
            Some(MigrationDirection::ImportToDocumentStore)
        );
        // Copy failed: nothing completed, mode unchanged, still pending.
        assert_eq!(mgr.mode(), StoreMode::FlatFile);
        assert_eq!(
            mgr.pending(),
            Some(MigrationDirection::ImportToDocumentStore)
        );

        // Next update without a crossing keeps the retry pending.
        assert_eq!(mgr.update_count(101), None);
        assert_eq!(
            mgr.pending(),
            Some(MigrationDirection::ImportToDocumentStore)
        );
    }

    #[test]
    fn crossing_back_cancels_unfinished_import() {
        let mut mgr = MigrationManager::new(100);
        mgr.init(StoreMode::FlatFile, 99);
        mgr.update_count(100);
        assert_eq!(
            mgr.pending(),
            Some(MigrationDirection::ImportToDocumentStore)
        );

        // Dropped back below before the import ever succeeded: reads never
        // left the flat file, so no export must be scheduled (it would
        // overwrite live data with the stale document store).
        assert_eq!(mgr.update_count(80), None);
        assert_eq!(mgr.pending(), None);
        assert_eq!(mgr.mode(), StoreMode::FlatFile);
    }
}
