//! The Face Ledger: authoritative face and photo records, and the operations
//! that keep their cross-references and group/name fields coherent.
//!
//! Everything here works on an in-memory [`Ledger`]; persistence is the job of
//! [`crate::db::LedgerStore`].

pub mod identity;
pub mod corrections;
pub mod summary;
pub mod timeline;

pub use identity::IdentityMap;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::error::{IdentityError, Result};
use crate::models::{FaceRecord, NameSource, PhotoRecord, NOISE_LABEL};
use crate::utils::date;
use crate::utils::path::AssetLookup;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    pub faces: Vec<FaceRecord>,
    pub photos: Vec<PhotoRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AssignReport {
    /// Faces whose label was written from the grouping result.
    pub labelled: usize,
    /// Faces whose name was stamped from the Identity Map.
    pub named: usize,
    /// Faces absent from the grouping input, reset to the noise label.
    pub reset: usize,
    /// Identifiers in the grouping input with no ledger entry.
    pub unknown: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub faces_added: usize,
    pub faces_skipped: usize,
    pub photos_added: usize,
    pub photos_skipped: usize,
    pub dates_resolved: usize,
}

impl Ledger {
    pub fn face(&self, face_id: &str) -> Option<&FaceRecord> {
        self.faces.iter().find(|f| f.face_id == face_id)
    }

    pub fn face_mut(&mut self, face_id: &str) -> Option<&mut FaceRecord> {
        self.faces.iter_mut().find(|f| f.face_id == face_id)
    }

    pub fn photo(&self, file: &str) -> Option<&PhotoRecord> {
        self.photos.iter().find(|p| p.file == file)
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty() && self.photos.is_empty()
    }

    /// Highest group label held by any face, or the noise label when none is grouped.
    pub fn max_label(&self) -> i64 {
        self.faces.iter().map(|f| f.group).max().unwrap_or(NOISE_LABEL).max(NOISE_LABEL)
    }

    pub fn faces_in_group(&self, label: i64) -> impl Iterator<Item = &FaceRecord> {
        self.faces.iter().filter(move |f| f.group == label)
    }

    pub fn group_size(&self, label: i64) -> usize {
        self.faces_in_group(label).count()
    }

    /// Writes `labels[i]` onto the face `face_ids[i]` and stamps names for labels
    /// present in `names`. Manually named faces keep their name. Faces missing
    /// from `face_ids` have no embedding and go back to the noise label.
    pub fn assign_groups(
        &mut self,
        face_ids: &[String],
        labels: &[i64],
        names: &IdentityMap,
    ) -> Result<AssignReport> {
        if face_ids.len() != labels.len() {
            return Err(IdentityError::InvalidInput(format!(
                "{} face ids but {} labels",
                face_ids.len(),
                labels.len()
            )));
        }

        let by_id: HashMap<&str, i64> =
            face_ids.iter().map(String::as_str).zip(labels.iter().copied()).collect();
        let mut report = AssignReport::default();
        let mut seen: HashSet<&str> = HashSet::with_capacity(by_id.len());

        for face in self.faces.iter_mut() {
            match by_id.get_key_value(face.face_id.as_str()) {
                Some((&id, &label)) => {
                    seen.insert(id);
                    face.group = label;
                    report.labelled += 1;
                    if label == NOISE_LABEL || face.is_manual() {
                        continue;
                    }
                    if let Some(name) = names.name_for(label) {
                        if face.name.as_deref() != Some(name) {
                            face.name = Some(name.to_string());
                            face.name_source = Some(NameSource::Propagated);
                            report.named += 1;
                        }
                    }
                }
                None if face.group != NOISE_LABEL => {
                    face.group = NOISE_LABEL;
                    report.reset += 1;
                }
                None => {}
            }
        }

        report.unknown = by_id.keys().filter(|id| !seen.contains(*id)).count();
        if report.unknown > 0 {
            debug!("{} grouped identifiers have no ledger entry", report.unknown);
        }
        Ok(report)
    }

    /// Recomputes every photo's face list from the face records. Returns the
    /// number of photos whose list changed.
    pub fn rebuild_photo_face_links(&mut self) -> usize {
        let mut by_photo: HashMap<&str, Vec<String>> = HashMap::new();
        for face in &self.faces {
            if !face.photo.is_empty() {
                by_photo.entry(face.photo.as_str()).or_default().push(face.face_id.clone());
            }
        }

        let mut changed = 0;
        for photo in self.photos.iter_mut() {
            let faces = by_photo.remove(photo.file.as_str()).unwrap_or_default();
            if photo.faces != faces {
                photo.faces = faces;
                changed += 1;
            }
        }
        changed
    }

    /// Removes faces whose crop is gone. Returns how many were removed.
    pub fn cleanup_orphaned_faces(&mut self, assets: &dyn AssetLookup) -> usize {
        let before = self.faces.len();
        self.faces.retain(|f| !f.thumbnail.is_empty() && assets.crop_exists(f));
        let removed = before - self.faces.len();
        if removed > 0 {
            info!("Removed {} orphaned face records", removed);
        }
        removed
    }

    /// Removes photos whose file is gone. Returns how many were removed.
    pub fn cleanup_orphaned_photos(&mut self, assets: &dyn AssetLookup) -> usize {
        let before = self.photos.len();
        self.photos.retain(|p| !p.file.is_empty() && assets.photo_exists(&p.file));
        let removed = before - self.photos.len();
        if removed > 0 {
            info!("Removed {} orphaned photo records", removed);
        }
        removed
    }

    /// Merges externally detected records. Identifiers and files already in the
    /// ledger are kept as they are; the incoming duplicate is skipped.
    pub fn ingest(&mut self, faces: Vec<FaceRecord>, photos: Vec<PhotoRecord>) -> IngestReport {
        let mut report = IngestReport::default();

        let mut known_faces: HashSet<String> =
            self.faces.iter().map(|f| f.face_id.clone()).collect();
        for face in faces {
            if known_faces.insert(face.face_id.clone()) {
                self.faces.push(face);
                report.faces_added += 1;
            } else {
                report.faces_skipped += 1;
            }
        }

        let mut known_photos: HashSet<String> =
            self.photos.iter().map(|p| p.file.clone()).collect();
        for photo in photos {
            if known_photos.insert(photo.file.clone()) {
                self.photos.push(photo);
                report.photos_added += 1;
            } else {
                report.photos_skipped += 1;
            }
        }

        self.rebuild_photo_face_links();
        report
    }

    /// Sets the capture date of a photo and of every face taken from it.
    /// Returns the number of faces updated.
    pub fn update_photo_date(&mut self, file: &str, raw_date: &str) -> Result<usize> {
        let date = date::validate_iso_date(raw_date)?;
        let photo = self
            .photos
            .iter_mut()
            .find(|p| p.file == file)
            .ok_or_else(|| IdentityError::photo_not_found(file))?;
        photo.date = Some(date.clone());

        let mut faces = 0;
        for face in self.faces.iter_mut().filter(|f| f.photo == file) {
            face.date = Some(date.clone());
            faces += 1;
        }
        Ok(faces)
    }
}
