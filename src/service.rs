use parking_lot::Mutex;
use tracing::info;

use crate::cluster::{GroupingConfig, GroupingEngine};
use crate::db::{Store, Stores};
use crate::error::{IdentityError, Result};
use crate::ledger::{AssignReport, IdentityMap, IngestReport, Ledger};
use crate::models::{
    FaceRecord, GroupSummary, PersonSummary, PersonTimeline, PhotoRecord, PhotoYear, Statistics,
};
use crate::pipeline::{
    self, DateResolver, Detection, EmbeddingProvider, FaceSource, Pipeline, PipelineReport,
    RunOptions,
};
use crate::utils::config::Config;
use crate::utils::path::AssetPaths;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CleanupReport {
    pub faces_removed: usize,
    pub photos_removed: usize,
    pub photos_relinked: usize,
}

/// The operations exposed to the transport layer.
///
/// Every mutating call is one load → mutate → save cycle against the stores,
/// serialized by an in-process write lock. Two processes writing the same data
/// directory are not coordinated: their cycles race and the last save wins.
///
/// Calls that change both names and labels save the Identity Map before the
/// ledger. If the ledger save fails, the map is ahead; rerunning the call, a
/// propagation, or a grouping run brings the ledger back in line.
pub struct IdentityService {
    stores: Stores,
    paths: AssetPaths,
    grouping: GroupingConfig,
    carry_names: bool,
    provider: Box<dyn EmbeddingProvider>,
    write_lock: Mutex<()>,
}

impl IdentityService {
    pub fn new(
        stores: Stores,
        paths: AssetPaths,
        grouping: GroupingConfig,
        provider: Box<dyn EmbeddingProvider>,
    ) -> Self {
        Self { stores, paths, grouping, carry_names: true, provider, write_lock: Mutex::new(()) }
    }

    /// Opens the stores under `config.data`.
    pub fn open(config: &Config, provider: Box<dyn EmbeddingProvider>) -> Result<Self> {
        let stores = Stores::open(&config.data)?;
        let paths = AssetPaths::new(&config.photos_dir, &config.faces_dir);
        Ok(Self::new(stores, paths, config.grouping, provider).with_carry_names(config.carry_names))
    }

    pub fn with_carry_names(mut self, carry: bool) -> Self {
        self.carry_names = carry;
        self
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn paths(&self) -> &AssetPaths {
        &self.paths
    }

    pub fn grouping(&self) -> &GroupingConfig {
        &self.grouping
    }

    // ---- reads ----

    pub fn list_groups(&self) -> Result<Vec<GroupSummary>> {
        let ledger = self.stores.ledger.load()?;
        let names = self.stores.identities.load()?;
        Ok(ledger.list_groups(&names))
    }

    pub fn list_people(&self) -> Result<Vec<PersonSummary>> {
        Ok(self.stores.ledger.load()?.list_people())
    }

    pub fn faces_by_name(&self, name: &str) -> Result<Vec<FaceRecord>> {
        let ledger = self.stores.ledger.load()?;
        Ok(ledger.faces_by_name(name).into_iter().cloned().collect())
    }

    pub fn face(&self, face_id: &str) -> Result<FaceRecord> {
        let ledger = self.stores.ledger.load()?;
        ledger.face(face_id).cloned().ok_or_else(|| IdentityError::face_not_found(face_id))
    }

    pub fn statistics(&self) -> Result<Statistics> {
        let ledger = self.stores.ledger.load()?;
        let names = self.stores.identities.load()?;
        Ok(ledger.statistics(&names))
    }

    pub fn identity_map(&self) -> Result<IdentityMap> {
        Ok(self.stores.identities.load()?)
    }

    pub fn photo_timeline(&self) -> Result<Vec<PhotoYear>> {
        Ok(self.stores.ledger.load()?.photo_timeline())
    }

    pub fn person_timeline(&self, name: &str) -> Result<PersonTimeline> {
        self.stores.ledger.load()?.person_timeline(name)
    }

    // ---- group-level corrections ----

    pub fn set_group_name(&self, label: i64, name: &str) -> Result<usize> {
        let _guard = self.write_lock.lock();
        self.stores
            .update_names_and_ledger(|names, ledger| ledger.set_group_name(label, name, names))
    }

    /// Upserts a raw Identity Map entry without touching the ledger.
    pub fn set_name(&self, group_key: &str, name: &str) -> Result<()> {
        let name = crate::ledger::identity::normalize_name(name)?;
        if group_key.trim().is_empty() {
            return Err(IdentityError::InvalidInput("group key must not be empty".into()));
        }
        let _guard = self.write_lock.lock();
        self.stores.identities.update(|names| -> Result<()> {
            names.insert(group_key.trim().to_string(), name);
            Ok(())
        })
    }

    /// Returns false when no face holds `source`; nothing is written then.
    pub fn merge_groups(&self, target: i64, source: i64) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let moved = self.stores.ledger.update(|ledger| -> Result<usize> {
            ledger.check_merge(target, source)?;
            match ledger.merge_groups(target, source) {
                0 => Err(IdentityError::group_not_found(source)),
                n => Ok(n),
            }
        });
        match moved {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn split_face(&self, face_id: &str) -> Result<i64> {
        let _guard = self.write_lock.lock();
        let floor = self.stores.identities.load()?.max_label() + 1;
        self.stores.ledger.update(|ledger| ledger.split_face(face_id, floor))
    }

    // ---- face-level corrections ----

    pub fn direct_assign(&self, face_id: &str, name: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.stores.ledger.update(|ledger| ledger.direct_assign(face_id, name))
    }

    pub fn clear_assign(&self, face_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.stores.ledger.update(|ledger| ledger.clear_assign(face_id))
    }

    pub fn update_photo_date(&self, file: &str, date: &str) -> Result<usize> {
        let _guard = self.write_lock.lock();
        self.stores.ledger.update(|ledger| ledger.update_photo_date(file, date))
    }

    // ---- ledger maintenance ----

    pub fn assign_groups(&self, face_ids: &[String], labels: &[i64]) -> Result<AssignReport> {
        let _guard = self.write_lock.lock();
        let names = self.stores.identities.load()?;
        self.stores.ledger.update(|ledger| ledger.assign_groups(face_ids, labels, &names))
    }

    pub fn propagate(&self) -> Result<usize> {
        let _guard = self.write_lock.lock();
        let names = self.stores.identities.load()?;
        self.stores.ledger.update(|ledger| Ok(ledger.propagate(&names)))
    }

    pub fn rebuild_photo_face_links(&self) -> Result<usize> {
        let _guard = self.write_lock.lock();
        self.stores.ledger.update(|ledger| Ok(ledger.rebuild_photo_face_links()))
    }

    pub fn cleanup(&self) -> Result<CleanupReport> {
        let _guard = self.write_lock.lock();
        let report = self.stores.ledger.update(|ledger| -> Result<CleanupReport> {
            let faces_removed = ledger.cleanup_orphaned_faces(&self.paths);
            let photos_removed = ledger.cleanup_orphaned_photos(&self.paths);
            let photos_relinked = ledger.rebuild_photo_face_links();
            Ok(CleanupReport { faces_removed, photos_removed, photos_relinked })
        })?;
        info!(
            "Removed {} orphaned faces and {} orphaned photos",
            report.faces_removed, report.photos_removed
        );
        Ok(report)
    }

    pub fn ingest(
        &self,
        faces: Vec<FaceRecord>,
        photos: Vec<PhotoRecord>,
        dates: Option<&dyn DateResolver>,
    ) -> Result<IngestReport> {
        let _guard = self.write_lock.lock();
        self.stores.ledger.update(|ledger: &mut Ledger| -> Result<IngestReport> {
            let detection = Detection { faces, photos };
            Ok(pipeline::detect::ingest_detection(ledger, detection, dates, &self.paths))
        })
    }

    // ---- pipeline ----

    pub fn run_pipeline(&self, opts: RunOptions) -> Result<PipelineReport> {
        self.run_with(opts, None, None, None)
    }

    pub fn run_incremental(&self) -> Result<PipelineReport> {
        self.run_with(RunOptions::incremental(), None, None, None)
    }

    /// Full run. `grouping` overrides the configured parameters for this run
    /// only; `source` feeds the Detect stage, which is skipped without one.
    pub fn run_with(
        &self,
        opts: RunOptions,
        grouping: Option<GroupingConfig>,
        source: Option<&dyn FaceSource>,
        dates: Option<&dyn DateResolver>,
    ) -> Result<PipelineReport> {
        let grouping = grouping.unwrap_or(self.grouping);
        grouping.validate()?;
        let _guard = self.write_lock.lock();
        let engine = GroupingEngine::new(grouping);
        let pipeline = Pipeline {
            stores: &self.stores,
            paths: &self.paths,
            engine: &engine,
            provider: self.provider.as_ref(),
            carry_names: self.carry_names,
            source,
            dates,
        };
        pipeline.run_full(opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::test_support::three_faces;
    use crate::pipeline::FaceCrop;

    struct NoModel;

    impl EmbeddingProvider for NoModel {
        fn embed(&self, _region: &FaceCrop<'_>) -> anyhow::Result<Option<Vec<f32>>> {
            Ok(None)
        }
    }

    fn service() -> IdentityService {
        let stores = Stores::open_in_memory().unwrap();
        stores.ledger.save(&three_faces()).unwrap();
        let paths = AssetPaths::new("/nonexistent/photos", "/nonexistent/faces");
        IdentityService::new(stores, paths, GroupingConfig::default(), Box::new(NoModel))
    }

    #[test]
    fn group_name_is_persisted_in_both_stores() {
        let svc = service();
        assert_eq!(svc.set_group_name(0, "Alice").unwrap(), 2);
        assert_eq!(svc.identity_map().unwrap().name_for(0), Some("Alice"));
        assert_eq!(svc.face("f1_face0").unwrap().name.as_deref(), Some("Alice"));
        assert_eq!(svc.propagate().unwrap(), 0);
    }

    #[test]
    fn failed_operations_write_nothing() {
        let svc = service();
        let before = svc.stores().ledger.load().unwrap();
        assert!(svc.set_group_name(0, " ").is_err());
        assert!(svc.split_face("missing").unwrap_err().is_not_found());
        assert!(svc.update_photo_date("f1.jpg", "not-a-date").is_err());
        assert_eq!(svc.stores().ledger.load().unwrap(), before);
        assert!(svc.identity_map().unwrap().is_empty());
    }

    #[test]
    fn group_name_is_saved_to_both_stores_in_one_call() {
        let svc = service();
        assert!(svc.set_group_name(9, "Nobody").unwrap_err().is_not_found());
        assert!(svc.identity_map().unwrap().is_empty());
        svc.set_group_name(1, "Bob").unwrap();
        let ledger = svc.stores().ledger.load().unwrap();
        assert_eq!(ledger.face("f3_face0").unwrap().name.as_deref(), Some("Bob"));
        assert_eq!(svc.identity_map().unwrap().name_for(1), Some("Bob"));
    }

    #[test]
    fn timelines_read_the_ledger() {
        let svc = service();
        svc.set_group_name(0, "Alice").unwrap();
        svc.update_photo_date("f1.jpg", "2012-12-12").unwrap();
        let people = svc.person_timeline("Alice").unwrap();
        assert_eq!(people.total_appearances, 2);
        assert_eq!(people.timeline[0].year, "2012");
        assert!(svc.person_timeline("Zed").unwrap_err().is_not_found());
        assert_eq!(svc.photo_timeline().unwrap().len(), 2);
    }

    #[test]
    fn merge_reports_success() {
        let svc = service();
        assert!(svc.merge_groups(0, 1).unwrap());
        assert!(!svc.merge_groups(0, 1).unwrap());
        let groups = svc.list_groups().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].face_count, 3);
    }

    #[test]
    fn split_skips_labels_still_named_in_the_map() {
        let svc = service();
        svc.set_name("group_7", "Stale").unwrap();
        let label = svc.split_face("f1_face0").unwrap();
        assert_eq!(label, 8);
        assert_eq!(svc.face("f1_face0").unwrap().name, None);
    }

    #[test]
    fn cleanup_removes_records_without_assets() {
        let svc = service();
        let report = svc.cleanup().unwrap();
        assert_eq!(report.faces_removed, 3);
        assert_eq!(report.photos_removed, 3);
        assert_eq!(svc.cleanup().unwrap(), CleanupReport::default());
    }
}
