use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::provider::{EmbeddingProvider, FaceCrop};
use crate::db::EmbeddingSet;
use crate::error::IdentityError;
use crate::ledger::Ledger;
use crate::models::FaceRecord;
use crate::utils::path::AssetPaths;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmbedReport {
    pub total_faces: usize,
    pub already_present: usize,
    pub computed: usize,
    /// Neither the crop nor the source photo is on disk.
    pub missing_asset: usize,
    /// Assets present but no usable vector came out of them.
    pub failed: usize,
    /// Faces marked failed on an earlier run and not retried.
    pub previously_failed: usize,
    /// Stored entries whose face is no longer in the ledger.
    pub pruned: usize,
    pub stored: usize,
}

enum Outcome {
    Embedded(Vec<f32>),
    Missing(IdentityError),
    Failed,
}

/// Computes embeddings for ledger faces lacking one. With `recompute` every
/// face is embedded again and faces that now fail lose their entry.
/// Per-face failures are logged and counted, never propagated. A face whose
/// assets yield no vector is marked failed and skipped by later runs until
/// `recompute` clears the marks.
pub fn compute_missing(
    ledger: &Ledger,
    set: &mut EmbeddingSet,
    paths: &AssetPaths,
    provider: &dyn EmbeddingProvider,
    recompute: bool,
) -> EmbedReport {
    let mut report = EmbedReport { total_faces: ledger.faces.len(), ..EmbedReport::default() };
    if recompute {
        *set = EmbeddingSet::default();
    }

    let known: HashSet<&str> = ledger.faces.iter().map(|f| f.face_id.as_str()).collect();
    report.pruned = set.retain_ids(&known);
    if report.pruned > 0 {
        info!("Pruned {} embeddings of faces no longer in the ledger", report.pruned);
    }

    if ledger.faces.is_empty() {
        info!("No faces found in the ledger");
        report.stored = set.len();
        return report;
    }

    for face in &ledger.faces {
        if set.contains(&face.face_id) {
            report.already_present += 1;
            continue;
        }
        if set.is_failed(&face.face_id) {
            debug!("Skipping {}: no usable embedding on an earlier run", face.face_id);
            report.previously_failed += 1;
            continue;
        }
        match embed_face(face, paths, provider) {
            Outcome::Embedded(vector) => {
                if let Some(dim) = set.dim().filter(|&d| d != vector.len()) {
                    warn!(
                        "Embedding for {} has dimension {}, store holds {}; skipping",
                        face.face_id,
                        vector.len(),
                        dim
                    );
                    set.mark_failed(&face.face_id);
                    report.failed += 1;
                    continue;
                }
                debug!("Computed embedding for {}", face.face_id);
                set.insert(face.face_id.clone(), vector);
                report.computed += 1;
            }
            Outcome::Missing(e) => {
                warn!("Skipping {}: {}", face.face_id, e);
                report.missing_asset += 1;
            }
            Outcome::Failed => {
                warn!("Failed to compute embedding for {}", face.face_id);
                set.mark_failed(&face.face_id);
                report.failed += 1;
            }
        }
    }

    report.stored = set.len();
    info!(
        "Embeddings: {} computed, {} present, {} missing, {} failed, {} failed before ({} stored)",
        report.computed,
        report.already_present,
        report.missing_asset,
        report.failed,
        report.previously_failed,
        report.stored
    );
    report
}

/// Crop first, then the crop as a whole frame, then the face region of the
/// source photo.
fn embed_face(face: &FaceRecord, paths: &AssetPaths, provider: &dyn EmbeddingProvider) -> Outcome {
    let crop_path = paths.crop_path(face);
    let photo_path = paths.photo_path(&face.photo);
    let crop_present = !face.thumbnail.is_empty() && crop_path.is_file();
    let photo_present = !face.photo.is_empty() && photo_path.is_file();

    if !crop_present && !photo_present {
        return Outcome::Missing(IdentityError::AssetMissing(crop_path));
    }

    if crop_present {
        match image::open(&crop_path) {
            Ok(image) => {
                let region = FaceCrop { face_id: &face.face_id, source: &crop_path, image: &image };
                if let Some(v) = attempt(face, "crop", provider.embed(&region)) {
                    return Outcome::Embedded(v);
                }
                if let Some(v) = attempt(face, "frame", provider.embed_frame(&region)) {
                    return Outcome::Embedded(v);
                }
            }
            Err(e) => warn!("Failed to decode crop {}: {}", crop_path.display(), e),
        }
    }

    if photo_present && !face.bbox.is_empty() {
        match image::open(&photo_path) {
            Ok(photo) => {
                let b = face.bbox;
                if b.right > photo.width() || b.bottom > photo.height() {
                    warn!("Bounding box of {} lies outside {}", face.face_id, photo_path.display());
                    return Outcome::Failed;
                }
                let region_image = photo.crop_imm(b.left, b.top, b.width(), b.height());
                let region = FaceCrop {
                    face_id: &face.face_id,
                    source: &photo_path,
                    image: &region_image,
                };
                if let Some(v) = attempt(face, "photo region", provider.embed(&region)) {
                    return Outcome::Embedded(v);
                }
            }
            Err(e) => warn!("Failed to decode photo {}: {}", photo_path.display(), e),
        }
    }
    Outcome::Failed
}

fn attempt(
    face: &FaceRecord,
    what: &str,
    result: anyhow::Result<Option<Vec<f32>>>,
) -> Option<Vec<f32>> {
    match result {
        Ok(Some(v)) if !v.is_empty() => Some(v),
        Ok(_) => {
            debug!("No face found in {} of {}", what, face.face_id);
            None
        }
        Err(e) => {
            warn!("Embedding provider failed on {} of {}: {:#}", what, face.face_id, e);
            None
        }
    }
}
