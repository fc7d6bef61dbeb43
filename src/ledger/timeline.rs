use std::collections::BTreeMap;

use super::Ledger;
use crate::error::{IdentityError, Result};
use crate::models::{FaceRecord, PersonTimeline, PersonYear, PhotoRecord, PhotoYear};
use crate::utils::date::{year_of, UNKNOWN_YEAR};

const SAMPLE_PHOTOS: usize = 10;

/// Splits records into year buckets, ascending, with the undated bucket last.
fn by_year<'a, T>(
    items: impl Iterator<Item = &'a T>,
    date: impl Fn(&T) -> Option<&str>,
) -> Vec<(String, Vec<&'a T>)>
where
    T: 'a,
{
    let mut years: BTreeMap<&str, Vec<&'a T>> = BTreeMap::new();
    let mut unknown = Vec::new();
    for item in items {
        match year_of(date(item)) {
            UNKNOWN_YEAR => unknown.push(item),
            year => years.entry(year).or_default().push(item),
        }
    }
    let mut out: Vec<(String, Vec<&T>)> =
        years.into_iter().map(|(y, v)| (y.to_string(), v)).collect();
    if !unknown.is_empty() {
        out.push((UNKNOWN_YEAR.to_string(), unknown));
    }
    out
}

impl Ledger {
    /// Photos per year, newest year first and undated photos last. Each bucket
    /// carries up to ten photos in date order.
    pub fn photo_timeline(&self) -> Vec<PhotoYear> {
        let mut buckets = by_year(self.photos.iter(), |p: &PhotoRecord| p.date.as_deref());
        let unknown = match buckets.last() {
            Some((year, _)) if year == UNKNOWN_YEAR => buckets.pop(),
            _ => None,
        };
        buckets.reverse();
        buckets.extend(unknown);

        buckets
            .into_iter()
            .map(|(year, mut photos)| {
                photos.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.file.cmp(&b.file)));
                PhotoYear {
                    year,
                    photo_count: photos.len(),
                    photos: photos.into_iter().take(SAMPLE_PHOTOS).cloned().collect(),
                }
            })
            .collect()
    }

    /// Appearances of one person per year, oldest first, undated last.
    pub fn person_timeline(&self, name: &str) -> Result<PersonTimeline> {
        let faces = self.faces_by_name(name);
        if faces.is_empty() {
            return Err(IdentityError::person_not_found(name.trim()));
        }
        let total_appearances = faces.len();
        let timeline = by_year(faces.into_iter(), |f: &FaceRecord| f.date.as_deref())
            .into_iter()
            .map(|(year, faces)| PersonYear {
                year,
                appearances: faces.len(),
                faces: faces.into_iter().cloned().collect(),
            })
            .collect();
        Ok(PersonTimeline { name: name.trim().to_string(), total_appearances, timeline })
    }
}
