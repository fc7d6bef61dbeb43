use std::collections::HashMap;
use tracing::{debug, info};

use super::provider::{DateResolver, Detection};
use crate::ledger::{IngestReport, Ledger};
use crate::utils::date::validate_iso_date;
use crate::utils::path::AssetPaths;

/// Merges detector output into the ledger. Photos arriving without a date are
/// resolved through `dates`; faces take the date of their photo.
pub fn ingest_detection(
    ledger: &mut Ledger,
    detection: Detection,
    dates: Option<&dyn DateResolver>,
    paths: &AssetPaths,
) -> IngestReport {
    let Detection { mut faces, mut photos } = detection;
    let mut resolved = 0;

    if let Some(dates) = dates {
        for photo in photos.iter_mut().filter(|p| p.date.is_none()) {
            let found = dates.date_for(&paths.photo_path(&photo.file));
            match found.as_deref().map(validate_iso_date) {
                Some(Ok(date)) => {
                    photo.date = Some(date);
                    resolved += 1;
                }
                Some(Err(e)) => debug!("Ignoring date for {}: {}", photo.file, e),
                None => {}
            }
        }
    }

    let photo_dates: HashMap<&str, &str> = photos
        .iter()
        .chain(ledger.photos.iter())
        .filter_map(|p| p.date.as_deref().map(|d| (p.file.as_str(), d)))
        .collect();
    for face in faces.iter_mut().filter(|f| f.date.is_none()) {
        face.date = photo_dates.get(face.photo.as_str()).map(|d| d.to_string());
    }

    let mut report = ledger.ingest(faces, photos);
    report.dates_resolved = resolved;
    if report.faces_added > 0 || report.photos_added > 0 {
        info!(
            "Ingested {} photos and {} faces ({} dates resolved)",
            report.photos_added, report.faces_added, report.dates_resolved
        );
    }
    report
}
