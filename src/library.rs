// Library facade: the operations a frontend or CLI calls.
//
// Every method is one `Store::mutate` cycle, so each user action lands on
// disk as a single atomic write and the item count is re-checked against
// the migration threshold exactly once per action.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use crate::category;
use crate::error::{Result, ShoeboxError};
use crate::metadata::{record_from_path, scan_folder, MetadataExtractor};
use crate::model::{normalize_path_str, Category, CategoryId, MediaId, MediaRecord};
use crate::store::Store;

/// Result of a bulk import: how many files became records and how many
/// were skipped (unsupported, unreadable, or already present).
#[derive(Debug, Default, Clone, Copy)]
pub struct ImportOutcome {
    pub added: usize,
    pub skipped: usize,
}

/// What a folder reconciliation changed, for observers.
#[derive(Debug, Clone)]
pub struct FolderDelta {
    pub category_id: CategoryId,
    pub added: Vec<MediaRecord>,
    pub removed: Vec<MediaRecord>,
}

impl FolderDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Clone)]
pub struct Library {
    store: Arc<Store>,
    extractor: Arc<dyn MetadataExtractor>,
}

impl Library {
    pub fn new(store: Arc<Store>, extractor: Arc<dyn MetadataExtractor>) -> Self {
        Self { store, extractor }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn list(&self) -> Result<(Vec<MediaRecord>, Vec<Category>)> {
        self.store.load()
    }

    // --- category operations -------------------------------------------

    pub fn add_category(&self, name: &str, father: Option<&str>) -> Result<Category> {
        self.store.mutate(|_, categories| {
            if let Some(father_id) = father {
                if !categories.iter().any(|c| c.id == father_id) {
                    return Err(ShoeboxError::NotFound(father_id.to_string()));
                }
            }
            Ok(category::add_category(categories, name, father))
        })
    }

    pub fn rename_category(&self, id: &str, name: &str) -> Result<()> {
        self.store.mutate(|_, categories| {
            category::rename_category(categories, id, name);
            Ok(())
        })
    }

    pub fn delete_category(&self, id: &str) -> Result<()> {
        self.store.mutate(|images, categories| {
            category::delete_category(images, categories, id);
            Ok(())
        })
    }

    pub fn add_to_category(
        &self,
        image_ids: &BTreeSet<MediaId>,
        category_ids: &[CategoryId],
    ) -> Result<()> {
        self.store.mutate(|images, categories| {
            category::add_to_category(images, categories, image_ids, category_ids);
            Ok(())
        })
    }

    pub fn reorder_categories(&self, ids: &[CategoryId]) -> Result<()> {
        self.store.mutate(|_, categories| {
            category::reorder_categories(categories, ids);
            Ok(())
        })
    }

    // --- media operations ----------------------------------------------

    /// Import explicit files. Files whose content id is already in the
    /// library are skipped, as are files the extractor rejects.
    pub fn import_files(&self, paths: &[impl AsRef<Path>]) -> Result<ImportOutcome> {
        let mut records = Vec::new();
        let mut skipped = 0usize;
        for path in paths {
            match record_from_path(path.as_ref(), self.extractor.as_ref()) {
                Ok(record) => records.push(record),
                Err(e) => {
                    log::warn!("skipping {}: {}", path.as_ref().display(), e);
                    skipped += 1;
                }
            }
        }

        self.store.mutate(move |images, _| {
            let mut outcome = ImportOutcome { added: 0, skipped };
            for record in records {
                if images.iter().any(|img| img.id == record.id) {
                    outcome.skipped += 1;
                } else {
                    images.push(record);
                    outcome.added += 1;
                }
            }
            Ok(outcome)
        })
    }

    /// Import a folder as a folder-bound category, scanning one level deep.
    pub fn import_folder(&self, folder: &Path) -> Result<(Category, ImportOutcome)> {
        let depth = self.store.config().watch_depth;
        let scan = scan_folder(folder, depth, self.extractor.as_ref())?;
        let folder_key = normalize_path_str(folder);
        let folder_name = folder
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| folder_key.clone());

        self.store.mutate(move |images, categories| {
            let mut outcome = ImportOutcome {
                skipped: scan.skipped,
                ..Default::default()
            };
            let mut new_ids: BTreeSet<MediaId> = BTreeSet::new();
            for mut record in scan.records {
                if images.iter().any(|img| img.id == record.id) {
                    outcome.skipped += 1;
                    continue;
                }
                record.is_bound_to_folder = true;
                new_ids.insert(record.id.clone());
                images.push(record);
                outcome.added += 1;
            }

            let cat_id = match categories
                .iter()
                .find(|c| c.folder_path.as_deref() == Some(folder_key.as_str()))
            {
                Some(existing) => existing.id.clone(),
                None => {
                    let mut cat = category::add_category(categories, &folder_name, None);
                    cat.folder_path = Some(folder_key.clone());
                    cat.is_bound_to_folder = true;
                    let id = cat.id.clone();
                    if let Some(stored) = categories.iter_mut().find(|c| c.id == id) {
                        stored.folder_path = Some(folder_key.clone());
                        stored.is_bound_to_folder = true;
                    }
                    id
                }
            };

            category::add_to_category(images, categories, &new_ids, &[cat_id.clone()]);
            let cat = categories
                .iter()
                .find(|c| c.id == cat_id)
                .cloned()
                .ok_or_else(|| ShoeboxError::NotFound(cat_id))?;
            Ok((cat, outcome))
        })
    }

    /// Delete records outright and drop them from every category.
    pub fn delete_images(&self, ids: &BTreeSet<MediaId>) -> Result<usize> {
        self.store.mutate(|images, categories| {
            let before = images.len();
            images.retain(|img| !ids.contains(&img.id));
            let removed = before - images.len();
            category::reconcile_membership(images, categories);
            Ok(removed)
        })
    }

    pub fn toggle_favorite(&self, id: &str) -> Result<bool> {
        self.edit_image(id, |img| {
            img.favorite = !img.favorite;
            img.favorite
        })
    }

    /// Rating is 1..=5, or `None` to clear.
    pub fn set_rating(&self, id: &str, rating: Option<u32>) -> Result<()> {
        if let Some(r) = rating {
            if !(1..=5).contains(&r) {
                return Err(ShoeboxError::Other(format!("rating out of range: {}", r)));
            }
        }
        self.edit_image(id, |img| {
            img.rating = rating;
        })
    }

    pub fn add_tags(&self, ids: &BTreeSet<MediaId>, tags: &[String]) -> Result<()> {
        self.store.mutate(|images, _| {
            for image in images.iter_mut() {
                if ids.contains(&image.id) {
                    image.tags.extend(tags.iter().cloned());
                    image.dirty = true;
                }
            }
            Ok(())
        })
    }

    fn edit_image<T>(&self, id: &str, f: impl FnOnce(&mut MediaRecord) -> T) -> Result<T> {
        self.store.mutate(|images, _| {
            let image = images
                .iter_mut()
                .find(|img| img.id == id)
                .ok_or_else(|| ShoeboxError::NotFound(id.to_string()))?;
            image.dirty = true;
            Ok(f(image))
        })
    }

    // --- folder reconciliation -----------------------------------------

    /// Bring the library in line with a watched folder's current contents:
    /// scan it, create or refresh its folder-bound category, add records
    /// for new files and drop folder-bound records whose files vanished.
    pub fn sync_folder_content(&self, folder: &Path) -> Result<FolderDelta> {
        let depth = self.store.config().watch_depth;
        let scan = scan_folder(folder, depth, self.extractor.as_ref())?;
        let present: Vec<String> = scan
            .records
            .iter()
            .map(|r| r.path.clone())
            .collect();
        let folder_key = normalize_path_str(folder);

        self.store.mutate(move |images, categories| {
            let cat_id = ensure_folder_category(categories, &folder_key);

            let mut removed = Vec::new();
            images.retain(|img| {
                let in_folder = img
                    .categories
                    .iter()
                    .any(|c| c == &cat_id);
                let gone = in_folder
                    && img.is_bound_to_folder
                    && !present.contains(&img.path);
                if gone {
                    removed.push(img.clone());
                }
                !gone
            });

            let mut added = Vec::new();
            let mut new_ids: BTreeSet<MediaId> = BTreeSet::new();
            for mut record in scan.records {
                if images.iter().any(|img| img.id == record.id) {
                    continue;
                }
                record.is_bound_to_folder = true;
                new_ids.insert(record.id.clone());
                added.push(record.clone());
                images.push(record);
            }

            category::add_to_category(images, categories, &new_ids, &[cat_id.clone()]);
            category::reconcile_membership(images, categories);

            Ok(FolderDelta {
                category_id: cat_id,
                added,
                removed,
            })
        })
    }

    /// Apply a debounced batch of watcher events for one folder: additions
    /// first, then unlinks. Unlinked records are deleted outright; their
    /// metadata does not survive the file. Returns `None` when the batch
    /// changed nothing (all adds duplicate, all unlinks unknown).
    pub fn flush_folder_changes(
        &self,
        folder: &Path,
        adds: &[std::path::PathBuf],
        unlinks: &[std::path::PathBuf],
    ) -> Result<Option<FolderDelta>> {
        let mut new_records = Vec::new();
        for path in adds {
            match record_from_path(path, self.extractor.as_ref()) {
                Ok(record) => new_records.push(record),
                Err(e) => log::warn!("skipping {}: {}", path.display(), e),
            }
        }
        let unlink_keys: Vec<String> = unlinks.iter().map(|p| normalize_path_str(p)).collect();
        let folder_key = normalize_path_str(folder);

        let delta = self.store.mutate(move |images, categories| {
            let cat_id = ensure_folder_category(categories, &folder_key);

            let mut added = Vec::new();
            let mut new_ids: BTreeSet<MediaId> = BTreeSet::new();
            for mut record in new_records {
                if images.iter().any(|img| img.id == record.id) {
                    continue;
                }
                record.is_bound_to_folder = true;
                new_ids.insert(record.id.clone());
                added.push(record.clone());
                images.push(record);
            }
            category::add_to_category(images, categories, &new_ids, &[cat_id.clone()]);

            let mut removed = Vec::new();
            images.retain(|img| {
                let gone = unlink_keys.contains(&img.path);
                if gone {
                    removed.push(img.clone());
                }
                !gone
            });
            category::reconcile_membership(images, categories);

            Ok(FolderDelta {
                category_id: cat_id,
                added,
                removed,
            })
        })?;

        if delta.is_empty() {
            Ok(None)
        } else {
            log::debug!(
                "folder {} reconciled: +{} -{}",
                folder.display(),
                delta.added.len(),
                delta.removed.len()
            );
            Ok(Some(delta))
        }
    }
}

/// Find the folder-bound category mirroring `folder_key`, creating it when
/// the folder is watched for the first time.
fn ensure_folder_category(categories: &mut Vec<Category>, folder_key: &str) -> CategoryId {
    if let Some(existing) = categories
        .iter()
        .find(|c| c.folder_path.as_deref() == Some(folder_key))
    {
        return existing.id.clone();
    }

    let name = folder_key
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(folder_key)
        .to_string();
    let cat = category::add_category(categories, &name, None);
    let id = cat.id.clone();
    if let Some(stored) = categories.iter_mut().find(|c| c.id == id) {
        stored.folder_path = Some(folder_key.to_string());
        stored.is_bound_to_folder = true;
    }
    id
}
