use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::info;

use crate::cluster::{carry, GroupingEngine};
use crate::db::EmbeddingSet;
use crate::error::Result;
use crate::ledger::{AssignReport, IdentityMap, Ledger};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupReport {
    pub algorithm: String,
    pub faces: usize,
    pub groups: usize,
    pub noise: usize,
    pub names_carried: usize,
    pub names_dropped: usize,
    pub assign: AssignReport,
}

/// Regroups the whole embedding population and writes the labels into the
/// ledger. With `carry_names`, named groups of the previous run hand their
/// Identity Map entry to the new group whose centroid is nearest (within eps).
pub fn regroup(
    ledger: &mut Ledger,
    names: &mut IdentityMap,
    set: &EmbeddingSet,
    engine: &GroupingEngine,
    carry_names: bool,
) -> Result<GroupReport> {
    let mut report = GroupReport {
        algorithm: engine.strategy_name().to_string(),
        ..GroupReport::default()
    };
    if set.is_empty() {
        // No face has an embedding, so none may keep a group label.
        info!("No embeddings to group; every face goes back to noise");
        if carry_names {
            let rekey = names.rekey(&BTreeMap::new());
            report.names_dropped = rekey.dropped;
        }
        report.assign = ledger.assign_groups(&[], &[], names)?;
        return Ok(report);
    }

    let previous = if carry_names {
        let named = names.labels();
        let current: HashMap<&str, i64> = ledger
            .faces
            .iter()
            .filter(|f| named.contains(&f.group))
            .map(|f| (f.face_id.as_str(), f.group))
            .collect();
        carry::centroids_by_face(&set.ids, &set.vectors, &current)
    } else {
        BTreeMap::new()
    };

    let labels = engine.group(&set.vectors);
    report.faces = labels.len();
    report.noise = labels.iter().filter(|&&l| l < 0).count();
    let fresh = carry::centroids(&set.vectors, &labels);
    report.groups = fresh.len();

    if carry_names {
        let mapping = carry::match_labels(&previous, &fresh, engine.config().eps as f64);
        let rekey = names.rekey(&mapping);
        report.names_carried = rekey.carried;
        report.names_dropped = rekey.dropped;
    }

    report.assign = ledger.assign_groups(&set.ids, &labels, names)?;
    info!(
        "Grouped {} faces into {} groups; {} names carried, {} dropped",
        report.faces, report.groups, report.names_carried, report.names_dropped
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::GroupingConfig;
    use crate::ledger::test_support::face;
    use crate::models::{PhotoRecord, NOISE_LABEL};

    /// Four faces: two near the origin, two near (5, 5).
    fn fixture() -> (Ledger, EmbeddingSet) {
        let files = ["a.jpg", "b.jpg", "c.jpg", "d.jpg"];
        let faces = files.iter().map(|p| face(p, 0, NOISE_LABEL)).collect();
        let photos = files.iter().map(|p| PhotoRecord::new(p, None)).collect();
        let mut ledger = Ledger::default();
        ledger.ingest(faces, photos);
        let set = EmbeddingSet::from_parts(
            vec![vec![0.0, 0.0], vec![0.1, 0.0], vec![5.0, 5.0], vec![5.1, 5.0]],
            vec!["a_face0".into(), "b_face0".into(), "c_face0".into(), "d_face0".into()],
        );
        (ledger, set)
    }

    #[test]
    fn writes_labels_and_names() {
        let (mut ledger, set) = fixture();
        let engine = GroupingEngine::new(GroupingConfig::default());
        let mut names = IdentityMap::default();
        let report = regroup(&mut ledger, &mut names, &set, &engine, true).unwrap();
        assert_eq!(report.groups, 2);
        assert_eq!(report.noise, 0);
        assert_eq!(ledger.face("a_face0").unwrap().group, 0);
        assert_eq!(ledger.face("d_face0").unwrap().group, 1);
    }

    #[test]
    fn names_follow_their_group_when_labels_shift() {
        let (mut ledger, set) = fixture();
        let engine = GroupingEngine::new(GroupingConfig::default());
        let mut names = IdentityMap::default();
        regroup(&mut ledger, &mut names, &set, &engine, true).unwrap();
        ledger.set_group_name(1, "Bob", &mut names).unwrap();

        // A new face ahead of Bob's in embedding order: Bob's group becomes label 2.
        let mut set2 = EmbeddingSet::from_parts(
            vec![vec![-9.0, -9.0], vec![-9.1, -9.0]],
            vec!["x_face0".into(), "y_face0".into()],
        );
        for (id, v) in set.ids.iter().zip(&set.vectors) {
            set2.insert(id.clone(), v.clone());
        }
        let report = regroup(&mut ledger, &mut names, &set2, &engine, true).unwrap();
        assert_eq!(report.names_carried, 1);
        assert_eq!(ledger.face("c_face0").unwrap().group, 2);
        assert_eq!(names.name_for(2), Some("Bob"));
        assert_eq!(names.name_for(1), None);
        assert_eq!(ledger.face("c_face0").unwrap().name.as_deref(), Some("Bob"));
        assert_eq!(ledger.face("a_face0").unwrap().name, None);
    }

    #[test]
    fn without_carry_the_raw_label_keeps_its_name() {
        let (mut ledger, set) = fixture();
        let engine = GroupingEngine::new(GroupingConfig::default());
        let mut names = IdentityMap::default();
        names.set_name(0, "Alice");
        let report = regroup(&mut ledger, &mut names, &set, &engine, false).unwrap();
        assert_eq!(report.names_carried, 0);
        assert_eq!(ledger.face("a_face0").unwrap().name.as_deref(), Some("Alice"));
    }

    #[test]
    fn empty_population_resets_every_label() {
        let (mut ledger, set) = fixture();
        let engine = GroupingEngine::new(GroupingConfig::default());
        let mut names = IdentityMap::default();
        regroup(&mut ledger, &mut names, &set, &engine, true).unwrap();
        ledger.set_group_name(0, "Alice", &mut names).unwrap();

        let empty = EmbeddingSet::default();
        let report = regroup(&mut ledger, &mut names, &empty, &engine, true).unwrap();
        assert_eq!(report.faces, 0);
        assert_eq!(report.assign.reset, 4);
        assert_eq!(report.names_dropped, 1);
        assert!(ledger.faces.iter().all(|f| f.group == NOISE_LABEL));
        assert!(names.is_empty());
    }
}
