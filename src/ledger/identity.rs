use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

use super::Ledger;
use crate::error::{IdentityError, Result};
use crate::models::{group_key, label_from_key, NameSource, NOISE_LABEL};

/// Durable mapping from group key (`group_<label>`) to a human-chosen name.
///
/// Labels are only meaningful for the grouping run that produced them, so the
/// map is re-keyed after every run (see [`IdentityMap::rekey`]) and names reach
/// faces through [`Ledger::propagate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityMap {
    entries: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RekeyReport {
    pub carried: usize,
    pub dropped: usize,
}

impl IdentityMap {
    pub fn insert(&mut self, key: String, name: String) {
        self.entries.insert(key, name);
    }

    pub fn set_name(&mut self, label: i64, name: &str) {
        self.entries.insert(group_key(label), name.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn name_for(&self, label: i64) -> Option<&str> {
        self.get(&group_key(label))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Labels that currently carry a name.
    pub fn labels(&self) -> BTreeSet<i64> {
        self.entries.keys().filter_map(|k| label_from_key(k)).collect()
    }

    pub fn max_label(&self) -> i64 {
        self.labels().into_iter().max().unwrap_or(NOISE_LABEL).max(NOISE_LABEL)
    }

    pub fn unique_names(&self) -> BTreeSet<&str> {
        self.entries.values().map(String::as_str).collect()
    }

    /// Moves every name keyed by an old label to the key of the new label it
    /// was matched with. Names of unmatched labels are dropped; keys outside the
    /// `group_<label>` scheme are left alone.
    pub fn rekey(&mut self, old_to_new: &BTreeMap<i64, i64>) -> RekeyReport {
        let mut report = RekeyReport::default();
        let mut next = BTreeMap::new();
        for (key, name) in std::mem::take(&mut self.entries) {
            match label_from_key(&key) {
                Some(old) => match old_to_new.get(&old) {
                    Some(&new) => {
                        if old != new {
                            info!("Name '{}' follows group {} to {}", name, old, new);
                        }
                        next.insert(group_key(new), name);
                        report.carried += 1;
                    }
                    None => {
                        warn!(
                            "Group {} ('{}') has no counterpart after regrouping; name dropped",
                            old, name
                        );
                        report.dropped += 1;
                    }
                },
                None => {
                    next.insert(key, name);
                }
            }
        }
        self.entries = next;
        report
    }
}

/// Trims a human-supplied name; empty names are rejected.
pub fn normalize_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(IdentityError::InvalidInput("name must not be empty".into()));
    }
    Ok(name.to_string())
}

impl Ledger {
    /// Stamps Identity Map names onto grouped faces. Manually named faces are
    /// skipped. Returns how many faces changed; a second call with no change in
    /// between returns zero.
    pub fn propagate(&mut self, names: &IdentityMap) -> usize {
        let mut changed = 0;
        for face in self.faces.iter_mut() {
            if face.group == NOISE_LABEL || face.is_manual() {
                continue;
            }
            let Some(name) = names.name_for(face.group) else {
                continue;
            };
            if face.name.as_deref() != Some(name) {
                face.name = Some(name.to_string());
                face.name_source = Some(NameSource::Propagated);
                changed += 1;
            } else if face.name_source.is_none() {
                face.name_source = Some(NameSource::Propagated);
            }
        }
        if changed > 0 {
            info!("Updated names for {} faces", changed);
        }
        changed
    }

    /// Names a whole group: upserts the Identity Map entry and stamps the name
    /// onto the group's faces that are not manually named. Returns that count.
    pub fn set_group_name(
        &mut self,
        label: i64,
        raw_name: &str,
        names: &mut IdentityMap,
    ) -> Result<usize> {
        let name = normalize_name(raw_name)?;
        if label == NOISE_LABEL {
            return Err(IdentityError::InvalidInput("the noise group cannot be named".into()));
        }
        if self.group_size(label) == 0 {
            return Err(IdentityError::group_not_found(label));
        }

        names.set_name(label, &name);
        let mut updated = 0;
        for face in self.faces.iter_mut().filter(|f| f.group == label && !f.is_manual()) {
            face.name = Some(name.clone());
            face.name_source = Some(NameSource::Propagated);
            updated += 1;
        }
        Ok(updated)
    }
}
