//! Collaborators the pipeline consumes but does not implement: the embedding
//! model, the face detector and capture-date resolution.

use anyhow::{Context, Result};
use image::DynamicImage;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::{BoundingBox, FaceRecord, PhotoRecord};
use crate::utils::date::validate_iso_date;

/// An image region handed to the embedding provider.
pub struct FaceCrop<'a> {
    pub face_id: &'a str,
    /// File the pixels were read from: the crop, or the source photo.
    pub source: &'a Path,
    pub image: &'a DynamicImage,
}

pub trait EmbeddingProvider: Send + Sync {
    /// Locates a face inside `region` and embeds it. `Ok(None)` means no face
    /// was found.
    fn embed(&self, region: &FaceCrop<'_>) -> Result<Option<Vec<f32>>>;

    /// Embeds `region` treating the whole frame as the face. Providers without
    /// such a mode return `Ok(None)`.
    fn embed_frame(&self, _region: &FaceCrop<'_>) -> Result<Option<Vec<f32>>> {
        Ok(None)
    }
}

/// Capture date of a photo, as `YYYY-MM-DD`.
pub trait DateResolver {
    fn date_for(&self, photo: &Path) -> Option<String>;
}

/// Newly detected records, not yet merged into the ledger.
#[derive(Debug, Default)]
pub struct Detection {
    pub faces: Vec<FaceRecord>,
    pub photos: Vec<PhotoRecord>,
}

pub trait FaceSource {
    /// Detects faces in photos the ledger does not know yet.
    fn detect(&self, known_photos: &[String]) -> Result<Detection>;
}

/// Embeddings precomputed by an external model, one JSON array of numbers per
/// face at `<dir>/<face_id>.json`.
pub struct SidecarEmbeddings {
    dir: PathBuf,
}

impl SidecarEmbeddings {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    fn read(&self, face_id: &str) -> Result<Option<Vec<f32>>> {
        let path = self.dir.join(format!("{face_id}.json"));
        if !path.is_file() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let vector: Vec<f32> = serde_json::from_str(&raw)
            .with_context(|| format!("malformed embedding in {}", path.display()))?;
        if vector.is_empty() {
            return Ok(None);
        }
        Ok(Some(vector))
    }
}

impl EmbeddingProvider for SidecarEmbeddings {
    fn embed(&self, region: &FaceCrop<'_>) -> Result<Option<Vec<f32>>> {
        self.read(region.face_id)
    }
}

#[derive(Debug, Deserialize)]
struct DetectedPhoto {
    file: String,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetectedFace {
    photo: String,
    index: usize,
    bbox: BoundingBox,
    #[serde(default)]
    thumbnail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetectionFileContents {
    #[serde(default)]
    photos: Vec<DetectedPhoto>,
    #[serde(default)]
    faces: Vec<DetectedFace>,
}

/// Detector output exported to a JSON file:
/// `{"photos": [{"file", "date"?}], "faces": [{"photo", "index", "bbox", "thumbnail"?}]}`.
pub struct DetectionFile {
    path: PathBuf,
}

impl DetectionFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl FaceSource for DetectionFile {
    fn detect(&self, known_photos: &[String]) -> Result<Detection> {
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let contents: DetectionFileContents =
            serde_json::from_str(&raw)
                .with_context(|| format!("malformed detections in {}", self.path.display()))?;

        let is_new = |file: &str| !known_photos.iter().any(|k| k == file);
        let photos = contents
            .photos
            .into_iter()
            .filter(|p| is_new(&p.file))
            .map(|p| PhotoRecord::new(&p.file, p.date.and_then(|d| validate_iso_date(&d).ok())))
            .collect();
        let faces = contents
            .faces
            .into_iter()
            .filter(|f| is_new(&f.photo))
            .map(|f| {
                let mut face = FaceRecord::new(&f.photo, f.index, f.bbox, None);
                if let Some(thumbnail) = f.thumbnail {
                    face.thumbnail = thumbnail;
                }
                face
            })
            .collect();
        Ok(Detection { faces, photos })
    }
}

/// Reads a date embedded in the file name, `YYYY-MM-DD`, `YYYY_MM_DD` or
/// `YYYYMMDD`, as cameras and phones commonly write it.
pub struct FileNameDates;

impl DateResolver for FileNameDates {
    fn date_for(&self, photo: &Path) -> Option<String> {
        let stem = photo.file_stem()?.to_string_lossy();
        let digits: Vec<(usize, char)> = stem.char_indices().collect();
        for start in 0..digits.len() {
            for len in [10usize, 8] {
                let Some(end) = digits.get(start + len - 1).map(|&(i, c)| i + c.len_utf8()) else {
                    continue;
                };
                let candidate = &stem[digits[start].0..end];
                let normalized = match len {
                    10 => candidate.replace('_', "-"),
                    _ if candidate.chars().all(|c| c.is_ascii_digit()) => {
                        format!("{}-{}-{}", &candidate[0..4], &candidate[4..6], &candidate[6..8])
                    }
                    _ => continue,
                };
                if let Ok(date) = validate_iso_date(&normalized) {
                    return Some(date);
                }
            }
        }
        None
    }
}
