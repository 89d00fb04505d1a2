// Persistence layer: two interchangeable backends behind one contract.
//
// Exactly one backend is active for reads at any time; the migration
// manager decides which. Every mutation goes through `Store::mutate`, a
// single process-wide read-modify-write section, so UI edits, folder
// reconciliation and migration copies can never interleave between their
// read and write steps.

pub mod document;
pub mod flatfile;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::constants::{DB_FILENAME, IMAGES_JSON_FILENAME};
use crate::error::{Result, ShoeboxError};
use crate::migration::{MigrationDirection, MigrationManager};
use crate::model::{Category, MediaRecord};
use crate::settings::{load_settings, save_settings, LibraryConfig};

pub use document::DocumentStore;
pub use flatfile::FlatFileStore;

/// Contract both backends implement. `load_all`/`save_all` move the whole
/// library; the single-record operations serve point lookups and edits.
pub trait PersistenceSink: Send {
    fn load_all(&self) -> Result<(Vec<MediaRecord>, Vec<Category>)>;
    fn save_all(&self, images: &[MediaRecord], categories: &[Category]) -> Result<()>;

    fn get_image(&self, id: &str) -> Result<Option<MediaRecord>>;
    fn create_image(&self, record: &MediaRecord) -> Result<()>;
    fn update_image(&self, id: &str, record: &MediaRecord) -> Result<()>;
    fn delete_image(&self, id: &str) -> Result<()>;

    fn get_category(&self, id: &str) -> Result<Option<Category>>;
    fn create_category(&self, category: &Category) -> Result<()>;
    fn update_category(&self, id: &str, category: &Category) -> Result<()>;
    fn delete_category(&self, id: &str) -> Result<()>;
}

/// Which backend currently answers reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StoreMode {
    #[default]
    FlatFile,
    Document,
}

impl StoreMode {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreMode::FlatFile => "flat-file",
            StoreMode::Document => "document",
        }
    }
}

pub struct Store {
    inner: Mutex<StoreInner>,
    config: LibraryConfig,
    data_dir: PathBuf,
}

struct StoreInner {
    flat: FlatFileStore,
    doc: DocumentStore,
    migration: MigrationManager,
    data_dir: PathBuf,
}

impl Store {
    /// Open (or create) the library under `data_dir`. The active backend
    /// comes from the persisted mode indicator; an unreadable backend is
    /// logged and treated as an empty library rather than failing startup.
    pub fn open(data_dir: &Path, config: LibraryConfig) -> Result<Self> {
        fs::create_dir_all(data_dir)?;
        let settings = load_settings(data_dir);
        let flat = FlatFileStore::new(data_dir.join(IMAGES_JSON_FILENAME));
        let doc = DocumentStore::open(&data_dir.join(DB_FILENAME))?;

        let mut migration = MigrationManager::new(config.max_item_count);
        let mode = settings.store_mode;
        let count = {
            let active: &dyn PersistenceSink = match mode {
                StoreMode::FlatFile => &flat,
                StoreMode::Document => &doc,
            };
            match active.load_all() {
                Ok((images, _)) => images.len(),
                Err(e) => {
                    log::error!(
                        "active backend ({}) unreadable at startup, starting empty: {}",
                        mode.as_str(),
                        e
                    );
                    0
                }
            }
        };
        migration.init(mode, count);
        log::info!(
            "library opened: {} items on the {} backend",
            count,
            mode.as_str()
        );

        Ok(Self {
            inner: Mutex::new(StoreInner {
                flat,
                doc,
                migration,
                data_dir: data_dir.to_path_buf(),
            }),
            config,
            data_dir: data_dir.to_path_buf(),
        })
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn mode(&self) -> StoreMode {
        self.inner.lock().unwrap().migration.mode()
    }

    pub fn count(&self) -> usize {
        self.inner.lock().unwrap().migration.count()
    }

    /// Read the whole library from the active backend.
    pub fn load(&self) -> Result<(Vec<MediaRecord>, Vec<Category>)> {
        let inner = self.inner.lock().unwrap();
        inner.active().load_all()
    }

    /// Point lookup for display; absent id signals `NotFound`.
    pub fn get_image(&self, id: &str) -> Result<MediaRecord> {
        let inner = self.inner.lock().unwrap();
        inner
            .active()
            .get_image(id)?
            .ok_or_else(|| ShoeboxError::NotFound(id.to_string()))
    }

    pub fn get_category(&self, id: &str) -> Result<Category> {
        let inner = self.inner.lock().unwrap();
        inner
            .active()
            .get_category(id)?
            .ok_or_else(|| ShoeboxError::NotFound(id.to_string()))
    }

    /// Run one serialized read-modify-write cycle against the active
    /// backend. The closure sees the full collections, the result is
    /// persisted as one write, the item count feeds the migration manager,
    /// and any pending backend copy runs before the lock is released.
    pub fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Vec<MediaRecord>, &mut Vec<Category>) -> Result<T>,
    ) -> Result<T> {
        let mut inner = self.inner.lock().unwrap();
        let (mut images, mut categories) = inner.active().load_all()?;
        let out = f(&mut images, &mut categories)?;
        inner.active().save_all(&images, &categories)?;

        if let Some(direction) = inner.migration.update_count(images.len()) {
            log::info!(
                "item count crossed {} ({} items), scheduling {:?}",
                self.config.max_item_count,
                images.len(),
                direction
            );
        }
        inner.run_pending_migration();
        Ok(out)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

impl StoreInner {
    fn active(&self) -> &dyn PersistenceSink {
        match self.migration.mode() {
            StoreMode::FlatFile => &self.flat,
            StoreMode::Document => &self.doc,
        }
    }

    /// Execute a scheduled (or previously failed) backend copy. The mode
    /// flag and the persisted indicator flip only after the copy succeeds;
    /// on failure the direction stays pending for the next count update.
    fn run_pending_migration(&mut self) {
        let Some(direction) = self.migration.pending() else {
            return;
        };

        let copy_result = match direction {
            MigrationDirection::ImportToDocumentStore => copy_records(&self.flat, &self.doc),
            MigrationDirection::ExportToFlatFile => copy_records(&self.doc, &self.flat),
        };

        match copy_result {
            Ok(copied) => {
                self.migration.complete(direction);
                let mut settings = load_settings(&self.data_dir);
                settings.store_mode = self.migration.mode();
                if let Err(e) = save_settings(&self.data_dir, &settings) {
                    log::error!("failed to persist store mode: {}", e);
                }
                log::info!(
                    "migrated {} records, {} backend is now active",
                    copied,
                    self.migration.mode().as_str()
                );
            }
            Err(e) => {
                log::error!(
                    "migration {:?} failed, staying on {} backend: {}",
                    direction,
                    self.migration.mode().as_str(),
                    e
                );
            }
        }
    }
}

/// Copy every record from one backend to the other, matched by business id.
/// Safe to run repeatedly; the source is left untouched.
fn copy_records(src: &dyn PersistenceSink, dst: &dyn PersistenceSink) -> Result<usize> {
    let (images, categories) = src.load_all()?;
    dst.save_all(&images, &categories)?;
    Ok(images.len() + categories.len())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{MediaKind, MediaRecord};
    use tempfile::TempDir;

    pub(crate) fn sample_image(id: &str) -> MediaRecord {
        MediaRecord {
            id: id.to_string(),
            path: format!("/photos/{}.jpg", id),
            name: id.to_string(),
            extension: "jpg".into(),
            size: 1024,
            date_created: "2024-01-01T00:00:00Z".into(),
            date_modified: "2024-01-01T00:00:00Z".into(),
            tags: Default::default(),
            favorite: false,
            categories: Default::default(),
            kind: MediaKind::Image,
            width: 1920,
            height: 1080,
            ratio: Some("16:9".into()),
            duration: None,
            thumbnail: None,
            rating: None,
            colors: Vec::new(),
            is_bound_to_folder: false,
            dirty: false,
        }
    }

    pub(crate) fn sample_category(id: &str) -> Category {
        Category::new(id, format!("category {}", id))
    }

    fn small_store(tmp: &TempDir, threshold: usize) -> Store {
        let config = LibraryConfig {
            max_item_count: threshold,
            ..LibraryConfig::default()
        };
        Store::open(tmp.path(), config).unwrap()
    }

    #[test]
    fn starts_on_flat_file_by_default() {
        let tmp = TempDir::new().unwrap();
        let store = small_store(&tmp, 3);
        assert_eq!(store.mode(), StoreMode::FlatFile);
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn crossing_threshold_flips_to_document_and_back() {
        let tmp = TempDir::new().unwrap();
        let store = small_store(&tmp, 3);

        store
            .mutate(|images, _| {
                images.push(sample_image("i1"));
                images.push(sample_image("i2"));
                Ok(())
            })
            .unwrap();
        assert_eq!(store.mode(), StoreMode::FlatFile);

        store
            .mutate(|images, _| {
                images.push(sample_image("i3"));
                Ok(())
            })
            .unwrap();
        assert_eq!(store.mode(), StoreMode::Document);
        assert_eq!(store.count(), 3);

        // Copy, not move: the flat file stays populated.
        let (flat_images, _) = FlatFileStore::new(tmp.path().join(IMAGES_JSON_FILENAME))
            .load_all()
            .unwrap();
        assert_eq!(flat_images.len(), 3);

        // The flip was persisted only after the copy completed.
        assert_eq!(load_settings(tmp.path()).store_mode, StoreMode::Document);

        // Dropping below the threshold exports back to the flat file.
        store
            .mutate(|images, _| {
                images.retain(|img| img.id != "i3");
                Ok(())
            })
            .unwrap();
        assert_eq!(store.mode(), StoreMode::FlatFile);
        assert_eq!(load_settings(tmp.path()).store_mode, StoreMode::FlatFile);

        let (images, _) = store.load().unwrap();
        let mut ids: Vec<_> = images.iter().map(|i| i.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["i1", "i2"]);
    }

    #[test]
    fn first_update_after_empty_init_never_migrates() {
        let tmp = TempDir::new().unwrap();
        let store = small_store(&tmp, 3);

        // A single bulk insert straight past the threshold on a fresh
        // library stays on the flat file.
        store
            .mutate(|images, _| {
                for i in 0..5 {
                    images.push(sample_image(&format!("i{}", i)));
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(store.mode(), StoreMode::FlatFile);
        assert_eq!(store.count(), 5);
    }

    #[test]
    fn reopen_restores_mode_and_count() {
        let tmp = TempDir::new().unwrap();
        {
            let store = small_store(&tmp, 3);
            // Two inserts: 0 -> 2 (below threshold), then 2 -> 5 crossing
            // it. The first update after an empty init never migrates, so
            // the crossing must come from a non-zero count.
            store
                .mutate(|images, _| {
                    images.push(sample_image("a"));
                    images.push(sample_image("b"));
                    Ok(())
                })
                .unwrap();
            assert_eq!(store.mode(), StoreMode::FlatFile);
            store
                .mutate(|images, _| {
                    images.push(sample_image("c"));
                    images.push(sample_image("d"));
                    images.push(sample_image("e"));
                    Ok(())
                })
                .unwrap();
            assert_eq!(store.mode(), StoreMode::Document);
        }

        let store = small_store(&tmp, 3);
        assert_eq!(store.mode(), StoreMode::Document);
        assert_eq!(store.count(), 5);
    }

    #[test]
    fn get_image_signals_not_found() {
        let tmp = TempDir::new().unwrap();
        let store = small_store(&tmp, 100);
        assert!(matches!(
            store.get_image("ghost"),
            Err(ShoeboxError::NotFound(_))
        ));
    }

    #[test]
    fn mutate_error_leaves_store_untouched() {
        let tmp = TempDir::new().unwrap();
        let store = small_store(&tmp, 100);
        store
            .mutate(|images, _| {
                images.push(sample_image("keep"));
                Ok(())
            })
            .unwrap();

        let result: Result<()> = store.mutate(|images, _| {
            images.clear();
            Err(ShoeboxError::Other("abort".into()))
        });
        assert!(result.is_err());

        let (images, _) = store.load().unwrap();
        assert_eq!(images.len(), 1);
    }
}
