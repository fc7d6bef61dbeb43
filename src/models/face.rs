use serde::{Deserialize, Serialize};
use std::path::Path;

use super::NOISE_LABEL;

/// Face location inside its source photo, in pixels.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// Where a face's current name came from.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NameSource {
    /// Stamped from the Identity Map; may be rewritten by the next propagation.
    Propagated,
    /// Set on this face directly; propagation never touches it.
    Manual,
}

impl NameSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            NameSource::Propagated => "propagated",
            NameSource::Manual => "manual",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "propagated" => Some(NameSource::Propagated),
            "manual" => Some(NameSource::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FaceRecord {
    pub face_id: String,
    /// File name of the owning photo.
    pub photo: String,
    pub bbox: BoundingBox,
    /// File name of the face crop inside the faces directory.
    pub thumbnail: String,
    pub group: i64,
    pub name: Option<String>,
    pub name_source: Option<NameSource>,
    pub date: Option<String>,
}

impl FaceRecord {
    /// A freshly detected face: ungrouped, unnamed, crop named after the id.
    pub fn new(photo: &str, index: usize, bbox: BoundingBox, date: Option<String>) -> Self {
        let face_id = face_id(photo, index);
        Self {
            thumbnail: format!("{face_id}.jpg"),
            face_id,
            photo: photo.to_string(),
            bbox,
            group: NOISE_LABEL,
            name: None,
            name_source: None,
            date,
        }
    }

    pub fn is_grouped(&self) -> bool {
        self.group != NOISE_LABEL
    }

    pub fn is_manual(&self) -> bool {
        self.name_source == Some(NameSource::Manual)
    }

    pub fn has_name(&self) -> bool {
        self.name.as_deref().is_some_and(|n| !n.is_empty())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PhotoRecord {
    pub file: String,
    pub date: Option<String>,
    pub faces: Vec<String>,
}

impl PhotoRecord {
    pub fn new(file: &str, date: Option<String>) -> Self {
        Self { file: file.to_string(), date, faces: Vec::new() }
    }
}

/// Deterministic face identifier: re-processing the same photo yields the same ids.
pub fn face_id(photo_file: &str, index: usize) -> String {
    let stem = Path::new(photo_file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| photo_file.to_string());
    format!("{stem}_face{index}")
}
