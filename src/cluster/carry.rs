//! Carries group identity across regrouping runs by centroid proximity.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::distance::{centroid, euclidean};
use crate::models::NOISE_LABEL;

/// Mean vector of each non-noise label. Labels whose members disagree on
/// dimension are left out.
pub fn centroids(vectors: &[Vec<f32>], labels: &[i64]) -> BTreeMap<i64, Vec<f32>> {
    let mut members: BTreeMap<i64, Vec<&[f32]>> = BTreeMap::new();
    for (v, &label) in vectors.iter().zip(labels) {
        if label != NOISE_LABEL {
            members.entry(label).or_default().push(v.as_slice());
        }
    }
    members
        .into_iter()
        .filter_map(|(label, vs)| centroid(vs).map(|c| (label, c)))
        .collect()
}

/// Centroids of the labels currently held in the ledger, computed from the
/// embeddings of their members. `current` maps face id to label.
pub fn centroids_by_face(
    ids: &[String],
    vectors: &[Vec<f32>],
    current: &HashMap<&str, i64>,
) -> BTreeMap<i64, Vec<f32>> {
    let labels: Vec<i64> = ids
        .iter()
        .map(|id| current.get(id.as_str()).copied().unwrap_or(NOISE_LABEL))
        .collect();
    centroids(vectors, &labels)
}

/// One-to-one matching of old labels to new labels. Candidate pairs within
/// `max_distance` are taken greedily by ascending distance, ties broken by old
/// then new label. Old labels without a match are absent from the result.
pub fn match_labels(
    old: &BTreeMap<i64, Vec<f32>>,
    new: &BTreeMap<i64, Vec<f32>>,
    max_distance: f64,
) -> BTreeMap<i64, i64> {
    let mut candidates: Vec<(f64, i64, i64)> = Vec::new();
    for (&o, oc) in old {
        for (&n, nc) in new {
            let d = euclidean(oc, nc);
            if d <= max_distance {
                candidates.push((d, o, n));
            }
        }
    }
    candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    let mut taken: BTreeSet<i64> = BTreeSet::new();
    let mut mapping = BTreeMap::new();
    for (_, o, n) in candidates {
        if mapping.contains_key(&o) || taken.contains(&n) {
            continue;
        }
        mapping.insert(o, n);
        taken.insert(n);
    }
    mapping
}
