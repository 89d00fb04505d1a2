// Flat-file backend: the whole library as one JSON document.
//
// `images.json` holds `{ "images": [...], "categories": [...] }`. A missing
// file is an empty library; an unreadable one is reset to empty and logged,
// trading the damaged data for availability.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShoeboxError};
use crate::model::{Category, MediaRecord};
use crate::store::PersistenceSink;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LibraryDocument {
    #[serde(default)]
    pub images: Vec<MediaRecord>,
    #[serde(default)]
    pub categories: Vec<Category>,
}

#[derive(Debug)]
pub struct FlatFileStore {
    path: PathBuf,
}

impl FlatFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<LibraryDocument> {
        if !self.path.exists() {
            return Ok(LibraryDocument::default());
        }
        let text = fs::read_to_string(&self.path)?;
        match serde_json::from_str(&text) {
            Ok(doc) => Ok(doc),
            Err(e) => {
                log::error!(
                    "flat file {} unreadable ({}), resetting to empty library",
                    self.path.display(),
                    e
                );
                let empty = LibraryDocument::default();
                self.write_document(&empty)?;
                Ok(empty)
            }
        }
    }

    fn write_document(&self, doc: &LibraryDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write-then-rename keeps a crash from truncating the library.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(doc)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl PersistenceSink for FlatFileStore {
    fn load_all(&self) -> Result<(Vec<MediaRecord>, Vec<Category>)> {
        let doc = self.read_document()?;
        Ok((doc.images, doc.categories))
    }

    fn save_all(&self, images: &[MediaRecord], categories: &[Category]) -> Result<()> {
        self.write_document(&LibraryDocument {
            images: images.to_vec(),
            categories: categories.to_vec(),
        })
    }

    fn get_image(&self, id: &str) -> Result<Option<MediaRecord>> {
        let doc = self.read_document()?;
        Ok(doc.images.into_iter().find(|img| img.id == id))
    }

    fn create_image(&self, record: &MediaRecord) -> Result<()> {
        let mut doc = self.read_document()?;
        if doc.images.iter().any(|img| img.id == record.id) {
            return Err(ShoeboxError::Other(format!(
                "image already exists: {}",
                record.id
            )));
        }
        doc.images.push(record.clone());
        self.write_document(&doc)
    }

    fn update_image(&self, id: &str, record: &MediaRecord) -> Result<()> {
        let mut doc = self.read_document()?;
        let slot = doc
            .images
            .iter_mut()
            .find(|img| img.id == id)
            .ok_or_else(|| ShoeboxError::NotFound(id.to_string()))?;
        *slot = record.clone();
        self.write_document(&doc)
    }

    fn delete_image(&self, id: &str) -> Result<()> {
        let mut doc = self.read_document()?;
        doc.images.retain(|img| img.id != id);
        self.write_document(&doc)
    }

    fn get_category(&self, id: &str) -> Result<Option<Category>> {
        let doc = self.read_document()?;
        Ok(doc.categories.into_iter().find(|cat| cat.id == id))
    }

    fn create_category(&self, category: &Category) -> Result<()> {
        let mut doc = self.read_document()?;
        if doc.categories.iter().any(|cat| cat.id == category.id) {
            return Err(ShoeboxError::Other(format!(
                "category already exists: {}",
                category.id
            )));
        }
        doc.categories.push(category.clone());
        self.write_document(&doc)
    }

    fn update_category(&self, id: &str, category: &Category) -> Result<()> {
        let mut doc = self.read_document()?;
        let slot = doc
            .categories
            .iter_mut()
            .find(|cat| cat.id == id)
            .ok_or_else(|| ShoeboxError::NotFound(id.to_string()))?;
        *slot = category.clone();
        self.write_document(&doc)
    }

    fn delete_category(&self, id: &str) -> Result<()> {
        let mut doc = self.read_document()?;
        doc.categories.retain(|cat| cat.id != id);
        self.write_document(&doc)
    }

}
