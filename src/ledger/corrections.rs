use tracing::info;

use super::identity::normalize_name;
use super::Ledger;
use crate::error::{IdentityError, Result};
use crate::models::{NameSource, NOISE_LABEL};

impl Ledger {
    /// Relabels every face in `source` to `target`. Returns the number of faces
    /// moved; zero means no face held `source` and nothing changed.
    ///
    /// The Identity Map is not touched: whatever name `target` maps to governs
    /// the next propagation. Merging a group into itself changes nothing and
    /// reports the group's size.
    pub fn merge_groups(&mut self, target: i64, source: i64) -> usize {
        if target == source {
            return self.group_size(source);
        }
        let mut moved = 0;
        for face in self.faces.iter_mut().filter(|f| f.group == source) {
            face.group = target;
            moved += 1;
        }
        if moved > 0 {
            info!("Merged {} faces from group {} into group {}", moved, source, target);
        }
        moved
    }

    /// Moves one face into a brand-new group. The label is one past the
    /// highest label in the ledger, and never below `floor`. A propagated name
    /// is cleared; a manual one stays with the face.
    pub fn split_face(&mut self, face_id: &str, floor: i64) -> Result<i64> {
        let label = (self.max_label() + 1).max(floor).max(0);
        let face = self.face_mut(face_id).ok_or_else(|| IdentityError::face_not_found(face_id))?;
        face.group = label;
        if face.name_source != Some(NameSource::Manual) {
            face.name = None;
            face.name_source = None;
        }
        info!("Moved face {} to new group {}", face_id, label);
        Ok(label)
    }

    /// Names exactly one face. The name is marked manual so regrouping and
    /// propagation leave it alone; the face's group label is unchanged.
    pub fn direct_assign(&mut self, face_id: &str, raw_name: &str) -> Result<()> {
        let name = normalize_name(raw_name)?;
        let face = self.face_mut(face_id).ok_or_else(|| IdentityError::face_not_found(face_id))?;
        face.name = Some(name);
        face.name_source = Some(NameSource::Manual);
        Ok(())
    }

    /// Clears one face's name, whatever its provenance.
    pub fn clear_assign(&mut self, face_id: &str) -> Result<()> {
        let face = self.face_mut(face_id).ok_or_else(|| IdentityError::face_not_found(face_id))?;
        face.name = None;
        face.name_source = None;
        Ok(())
    }

    /// Validates a merge request before any mutation. Any source is accepted,
    /// noise included; the target must be a group label or the noise label.
    pub fn check_merge(&self, target: i64, _source: i64) -> Result<()> {
        if target < NOISE_LABEL {
            return Err(IdentityError::InvalidInput(format!("{target} is not a group label")));
        }
        Ok(())
    }
}
