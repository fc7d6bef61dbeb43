use std::collections::{BTreeMap, BTreeSet};

use super::{IdentityMap, Ledger};
use crate::models::{FaceRecord, GroupSummary, PersonSummary, Statistics, NOISE_LABEL};
use crate::utils::date::DateRange;

const SAMPLE_FACES: usize = 5;

impl Ledger {
    /// One entry per non-noise label, ascending. The name is the Identity Map
    /// entry for the label, if any.
    pub fn list_groups(&self, names: &IdentityMap) -> Vec<GroupSummary> {
        let mut groups: BTreeMap<i64, (Vec<String>, usize, DateRange)> = BTreeMap::new();
        for face in self.faces.iter().filter(|f| f.is_grouped()) {
            let (samples, count, range) = groups.entry(face.group).or_default();
            if samples.len() < SAMPLE_FACES {
                samples.push(face.face_id.clone());
            }
            *count += 1;
            range.include(face.date.as_deref());
        }

        groups
            .into_iter()
            .map(|(label, (sample_faces, face_count, range))| GroupSummary {
                label,
                name: names.name_for(label).map(str::to_string),
                face_count,
                sample_faces,
                earliest_date: range.start,
                latest_date: range.end,
            })
            .collect()
    }

    pub fn noise_count(&self) -> usize {
        self.group_size(NOISE_LABEL)
    }

    /// Distinct face names with how often and when they appear, by name.
    pub fn list_people(&self) -> Vec<PersonSummary> {
        let mut people: BTreeMap<&str, (usize, DateRange)> = BTreeMap::new();
        for face in self.faces.iter().filter(|f| f.has_name()) {
            let Some(name) = face.name.as_deref() else { continue };
            let (count, range) = people.entry(name).or_default();
            *count += 1;
            range.include(face.date.as_deref());
        }
        people
            .into_iter()
            .map(|(name, (face_count, range))| PersonSummary {
                name: name.to_string(),
                face_count,
                earliest_date: range.start,
                latest_date: range.end,
            })
            .collect()
    }

    pub fn faces_by_name(&self, name: &str) -> Vec<&FaceRecord> {
        let name = name.trim();
        self.faces.iter().filter(|f| f.name.as_deref() == Some(name)).collect()
    }

    pub fn statistics(&self, names: &IdentityMap) -> Statistics {
        let named_faces = self.faces.iter().filter(|f| f.has_name()).count();
        let clustered_faces = self.faces.iter().filter(|f| f.is_grouped()).count();
        let labels: BTreeSet<i64> =
            self.faces.iter().filter(|f| f.is_grouped()).map(|f| f.group).collect();

        let mut range = DateRange::default();
        for photo in &self.photos {
            range.include(photo.date.as_deref());
        }

        Statistics {
            total_photos: self.photos.len(),
            total_faces: self.faces.len(),
            named_faces,
            unnamed_faces: self.faces.len() - named_faces,
            clustered_faces,
            unclustered_faces: self.faces.len() - clustered_faces,
            num_groups: labels.len(),
            unique_people: names.unique_names().len(),
            date_range_start: range.start,
            date_range_end: range.end,
        }
    }
}
