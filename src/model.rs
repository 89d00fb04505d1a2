// Core data model: media records and categories.
//
// Both persistence backends serialize these with the same camelCase JSON
// shape, so a record written by one backend can be read back by the other
// without translation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::constants::DISPLAY_RATIOS;

pub type MediaId = String;
pub type CategoryId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorInfo {
    pub color: String,
    pub percentage: f64,
}

/// A single image or video entry in the library.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    /// Content-derived identifier, stable across renames of the library.
    pub id: MediaId,
    pub path: String,
    pub name: String,
    pub extension: String,
    pub size: u64,
    pub date_created: String,
    pub date_modified: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub categories: BTreeSet<CategoryId>,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub colors: Vec<ColorInfo>,
    /// True when the record exists because a watched folder contains the
    /// file, rather than because of an explicit import.
    #[serde(default)]
    pub is_bound_to_folder: bool,
    /// Transient marker: the record needs a re-sync to the document backend.
    #[serde(skip)]
    pub dirty: bool,
}

/// A named, possibly hierarchical grouping of media records. May mirror a
/// watched filesystem folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    /// Ordered, duplicate-free member ids. Must equal the set of records
    /// whose `categories` contains this category's id.
    #[serde(default)]
    pub images: Vec<MediaId>,
    /// Denormalized `images.len()`, recomputed on every structural change.
    #[serde(default)]
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_path: Option<String>,
    #[serde(default)]
    pub is_bound_to_folder: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub father: Option<CategoryId>,
    #[serde(default)]
    pub children: Vec<CategoryId>,
    /// Explicit position making iteration order backend-independent.
    #[serde(default)]
    pub order: i64,
}

impl Category {
    pub fn new(id: impl Into<CategoryId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            images: Vec::new(),
            count: 0,
            folder_path: None,
            is_bound_to_folder: false,
            father: None,
            children: Vec::new(),
            order: 0,
        }
    }

    pub fn recount(&mut self) {
        self.count = self.images.len();
    }
}

/// Snap a pixel size to the closest display ratio.
pub fn closest_ratio(width: u32, height: u32) -> Option<String> {
    if width == 0 || height == 0 {
        return None;
    }
    let actual = width as f64 / height as f64;
    DISPLAY_RATIOS
        .iter()
        .min_by(|a, b| {
            let da = (parse_ratio(a) - actual).abs();
            let db = (parse_ratio(b) - actual).abs();
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|r| r.to_string())
}

fn parse_ratio(text: &str) -> f64 {
    let mut parts = text.split(':');
    let w: f64 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(1.0);
    let h: f64 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(1.0);
    w / h
}

/// Normalize a path for comparison: forward slashes only, no trailing slash.
pub fn normalize_path_str(path: &std::path::Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    s.trim_end_matches('/').to_string()
}
