// Metadata extraction boundary.
//
// Deep probing (dimensions, duration, thumbnails) belongs to an external
// collaborator; the library only depends on the `MetadataExtractor` trait.
// The bundled extractor classifies by extension and leaves dimensions to
// whatever richer implementation the host application plugs in.

use std::path::Path;

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::constants::{IMAGE_EXTENSIONS, VIDEO_EXTENSIONS};
use crate::error::{Result, ShoeboxError};
use crate::hash::content_id;
use crate::model::{closest_ratio, normalize_path_str, MediaKind, MediaRecord};

/// What an extractor reports about one file.
#[derive(Debug, Clone)]
pub struct MediaMeta {
    pub kind: MediaKind,
    pub width: u32,
    pub height: u32,
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
}

pub trait MetadataExtractor: Send + Sync {
    /// Extract media properties for one file. Unsupported or corrupt files
    /// fail with `Extraction`; batch callers skip the file and continue.
    fn extract(&self, path: &Path) -> Result<MediaMeta>;
}

/// Extension-based extractor with no external tooling.
#[derive(Debug, Default)]
pub struct FsMetadataExtractor;

impl MetadataExtractor for FsMetadataExtractor {
    fn extract(&self, path: &Path) -> Result<MediaMeta> {
        let kind = detect_media_kind(path).ok_or_else(|| {
            ShoeboxError::Extraction(format!("unsupported file: {}", path.display()))
        })?;
        Ok(MediaMeta {
            kind,
            width: 0,
            height: 0,
            duration: None,
            thumbnail: None,
        })
    }
}

/// Determine media kind from the file extension, `None` when unsupported.
pub fn detect_media_kind(path: &Path) -> Option<MediaKind> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())?;

    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

/// Build a full record for a file on disk, consulting the extractor for
/// media properties.
pub fn record_from_path(path: &Path, extractor: &dyn MetadataExtractor) -> Result<MediaRecord> {
    let meta = extractor.extract(path)?;
    let stat = std::fs::metadata(path)?;
    let size = stat.len();

    let created: DateTime<Utc> = stat.created().unwrap_or(std::time::UNIX_EPOCH).into();
    let modified: DateTime<Utc> = stat.modified().unwrap_or(std::time::UNIX_EPOCH).into();

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    Ok(MediaRecord {
        id: content_id(path, size),
        path: normalize_path_str(path),
        name,
        extension,
        size,
        date_created: created.to_rfc3339(),
        date_modified: modified.to_rfc3339(),
        tags: Default::default(),
        favorite: false,
        categories: Default::default(),
        kind: meta.kind,
        width: meta.width,
        height: meta.height,
        ratio: closest_ratio(meta.width, meta.height),
        duration: meta.duration,
        thumbnail: meta.thumbnail,
        rating: None,
        colors: Vec::new(),
        is_bound_to_folder: false,
        dirty: true,
    })
}

/// Outcome of scanning one folder.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub records: Vec<MediaRecord>,
    pub skipped: usize,
}

/// Scan a directory up to `depth` levels and build records for every
/// supported file. Extraction failures are logged and counted, never fatal.
pub fn scan_folder(dir: &Path, depth: usize, extractor: &dyn MetadataExtractor) -> Result<ScanOutcome> {
    if !dir.is_dir() {
        return Err(ShoeboxError::InvalidPath(format!(
            "not a directory: {}",
            dir.display()
        )));
    }

    let mut outcome = ScanOutcome::default();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(depth.max(1))
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        match record_from_path(entry.path(), extractor) {
            Ok(record) => outcome.records.push(record),
            Err(ShoeboxError::Extraction(reason)) => {
                log::warn!("skipping {}: {}", entry.path().display(), reason);
                outcome.skipped += 1;
            }
            Err(e) => {
                log::warn!("failed to read {}: {}", entry.path().display(), e);
                outcome.skipped += 1;
            }
        }
    }
    Ok(outcome)
}
