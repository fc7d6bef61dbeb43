mod common;

use common::*;
use famphotos_identity::db::Store;
use famphotos_identity::pipeline::provider::DetectionFile;
use famphotos_identity::pipeline::{FaceSource, Stage};
use famphotos_identity::{RunOptions, NOISE_LABEL};

const RECLUSTER: RunOptions = RunOptions { recompute_embeddings: false, recluster: true };

fn label(svc: &famphotos_identity::IdentityService, face_id: &str) -> i64 {
    svc.face(face_id).unwrap().group
}

#[test]
fn full_run_groups_and_reports() {
    let env = TestEnv::new();
    let svc = env.service();
    env.ingest(&svc, &[("a.png", &[RED, BLUE]), ("b.png", &[RED_2]), ("c.png", &[BLUE_2, GREEN])]);

    let report = svc.run_pipeline(RECLUSTER).unwrap();
    assert_eq!(report.stages, vec![Stage::Embed, Stage::Group, Stage::Propagate]);
    assert_eq!(report.embed.computed, 5);
    let group = report.group.unwrap();
    assert_eq!(group.groups, 2);
    assert_eq!(group.noise, 1);
    assert_eq!(report.statistics.total_faces, 5);
    assert_eq!(report.statistics.total_photos, 3);
    assert_eq!(report.statistics.num_groups, 2);

    assert_eq!(label(&svc, "a_face0"), 0);
    assert_eq!(label(&svc, "b_face0"), 0);
    assert_eq!(label(&svc, "a_face1"), 1);
    assert_eq!(label(&svc, "c_face0"), 1);
    assert_eq!(label(&svc, "c_face1"), NOISE_LABEL);
}

#[test]
fn rerun_is_stable_and_idempotent() {
    let env = TestEnv::new();
    let svc = env.service();
    env.ingest(&svc, &[("a.png", &[RED, BLUE]), ("b.png", &[RED_2]), ("c.png", &[BLUE_2, GREEN])]);
    svc.run_pipeline(RECLUSTER).unwrap();
    assert_eq!(svc.set_group_name(0, "Alice").unwrap(), 2);
    let before = svc.stores().ledger.load().unwrap();

    let report = svc.run_pipeline(RECLUSTER).unwrap();
    assert_eq!(report.embed.computed, 0);
    assert_eq!(report.embed.already_present, 5);
    assert_eq!(report.group.unwrap().names_carried, 1);
    assert_eq!(report.propagated, 0);
    assert_eq!(svc.stores().ledger.load().unwrap(), before);
}

#[test]
fn without_recluster_labels_are_left_alone() {
    let env = TestEnv::new();
    let svc = env.service();
    env.ingest(&svc, &[("a.png", &[RED, BLUE]), ("b.png", &[RED_2]), ("c.png", &[BLUE_2])]);
    svc.run_pipeline(RECLUSTER).unwrap();
    assert!(svc.merge_groups(0, 1).unwrap());

    let report = svc.run_pipeline(RunOptions::default()).unwrap();
    assert!(report.group.is_none());
    assert_eq!(report.stages, vec![Stage::Embed, Stage::Propagate]);
    assert_eq!(label(&svc, "c_face0"), 0);
}

#[test]
fn empty_collection_is_a_valid_run() {
    let env = TestEnv::new();
    let svc = env.service();
    let report = svc.run_incremental().unwrap();
    assert_eq!(report.embed.total_faces, 0);
    assert_eq!(report.group.unwrap().faces, 0);
    assert_eq!(report.statistics.total_faces, 0);
    assert!(svc.list_groups().unwrap().is_empty());
}

#[test]
fn incremental_run_names_new_faces() {
    let env = TestEnv::new();
    let svc = env.service();
    env.ingest(&svc, &[("a.png", &[RED, BLUE]), ("b.png", &[RED_2]), ("c.png", &[BLUE_2])]);
    svc.run_pipeline(RECLUSTER).unwrap();
    svc.set_group_name(label(&svc, "a_face0"), "Alice").unwrap();

    env.ingest(&svc, &[("d.png", &[RED])]);
    let report = svc.run_incremental().unwrap();
    assert_eq!(report.embed.computed, 1);
    assert_eq!(report.embed.already_present, 4);
    assert_eq!(svc.face("d_face0").unwrap().name.as_deref(), Some("Alice"));
    assert_eq!(svc.faces_by_name("Alice").unwrap().len(), 3);
}

#[test]
fn manual_names_survive_regrouping() {
    let env = TestEnv::new();
    let svc = env.service();
    env.ingest(&svc, &[("a.png", &[RED, BLUE]), ("c.png", &[BLUE_2])]);
    svc.run_pipeline(RECLUSTER).unwrap();
    svc.direct_assign("a_face1", "Carol").unwrap();
    assert_eq!(svc.set_group_name(label(&svc, "c_face0"), "Bob").unwrap(), 1);

    svc.run_incremental().unwrap();
    assert_eq!(svc.face("a_face1").unwrap().name.as_deref(), Some("Carol"));
    assert_eq!(svc.face("c_face0").unwrap().name.as_deref(), Some("Bob"));

    svc.clear_assign("a_face1").unwrap();
    assert_eq!(svc.propagate().unwrap(), 1);
    assert_eq!(svc.face("a_face1").unwrap().name.as_deref(), Some("Bob"));
}

#[test]
fn names_follow_groups_when_labels_shift() {
    let env = TestEnv::new();
    let svc = env.service();
    env.ingest(&svc, &[("x.png", &[BLUE, BLUE_2]), ("y.png", &[RED, RED_2])]);
    svc.run_pipeline(RECLUSTER).unwrap();
    assert_eq!(label(&svc, "y_face0"), 1);
    svc.set_group_name(1, "Alice").unwrap();

    // The blue photo disappears; the red group becomes the first group found.
    for id in ["x_face0", "x_face1"] {
        std::fs::remove_file(env.crop(id)).unwrap();
    }
    std::fs::remove_file(env.paths.photos_dir.join("x.png")).unwrap();
    let cleanup = svc.cleanup().unwrap();
    assert_eq!((cleanup.faces_removed, cleanup.photos_removed), (2, 1));

    let report = svc.run_pipeline(RECLUSTER).unwrap();
    assert_eq!(report.embed.pruned, 2);
    assert_eq!(label(&svc, "y_face0"), 0);
    let names = svc.identity_map().unwrap();
    assert_eq!(names.name_for(0), Some("Alice"));
    assert_eq!(names.name_for(1), None);
    assert_eq!(svc.face("y_face1").unwrap().name.as_deref(), Some("Alice"));
}

#[test]
fn faces_without_assets_are_skipped_not_fatal() {
    let env = TestEnv::new();
    let svc = env.service();
    env.ingest(&svc, &[("a.png", &[RED, RED_2]), ("b.png", &[GREEN])]);
    std::fs::remove_file(env.crop("b_face0")).unwrap();
    std::fs::remove_file(env.paths.photos_dir.join("b.png")).unwrap();

    let report = svc.run_pipeline(RECLUSTER).unwrap();
    assert_eq!(report.embed.computed, 2);
    assert_eq!(report.embed.missing_asset, 1);
    assert_eq!(label(&svc, "b_face0"), NOISE_LABEL);
    assert!(!svc.stores().embeddings.load().unwrap().contains("b_face0"));
}

#[test]
fn detections_feed_the_detect_stage() {
    let env = TestEnv::new();
    let svc = env.service();
    env.photo("e.png", &[GREEN, GREEN]);
    let detections = env.tmp.path().join("detections.json");
    std::fs::write(
        &detections,
        r#"{
            "photos": [{"file": "e.png", "date": "2015-08-01"}],
            "faces": [
                {"photo": "e.png", "index": 0, "bbox": {"top": 0, "right": 16, "bottom": 16, "left": 0}, "thumbnail": "e_face0.png"},
                {"photo": "e.png", "index": 1, "bbox": {"top": 0, "right": 32, "bottom": 16, "left": 16}, "thumbnail": "e_face1.png"}
            ]
        }"#,
    )
    .unwrap();

    let source = DetectionFile::new(&detections);
    let report = svc.run_with(RECLUSTER, None, Some(&source as &dyn FaceSource), None).unwrap();
    assert_eq!(report.stages.first(), Some(&Stage::Detect));
    assert_eq!(report.detect.unwrap().faces_added, 2);
    assert_eq!(label(&svc, "e_face1"), 0);
    assert_eq!(svc.face("e_face0").unwrap().date.as_deref(), Some("2015-08-01"));

    // Running again detects nothing new.
    let again = svc.run_with(RECLUSTER, None, Some(&source as &dyn FaceSource), None).unwrap();
    assert_eq!(again.detect.unwrap().faces_added, 0);
}

#[test]
fn recompute_with_every_asset_gone_leaves_only_noise() {
    let env = TestEnv::new();
    let svc = env.service();
    env.ingest(&svc, &[("a.png", &[RED, RED_2])]);
    svc.run_pipeline(RECLUSTER).unwrap();
    svc.set_group_name(0, "Alice").unwrap();

    for id in ["a_face0", "a_face1"] {
        std::fs::remove_file(env.crop(id)).unwrap();
    }
    std::fs::remove_file(env.paths.photos_dir.join("a.png")).unwrap();

    let report = svc
        .run_pipeline(RunOptions { recompute_embeddings: true, recluster: true })
        .unwrap();
    assert_eq!(report.embed.missing_asset, 2);
    assert_eq!(report.embed.stored, 0);
    assert_eq!(report.group.unwrap().assign.reset, 2);
    assert!(svc.stores().embeddings.load().unwrap().is_empty());
    assert_eq!(label(&svc, "a_face0"), NOISE_LABEL);
    assert_eq!(label(&svc, "a_face1"), NOISE_LABEL);
    assert!(svc.list_groups().unwrap().is_empty());
}
