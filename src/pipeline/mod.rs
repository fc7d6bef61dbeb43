//! Pipeline orchestration: Detect (external) → Embed → Group → Propagate.
//!
//! Stages run strictly in order and each one persists its store before the
//! next starts. A stage with nothing to do logs it and the run carries on.

pub mod detect;
pub mod embed;
pub mod group;
pub mod provider;

use serde::Serialize;
use std::fmt;
use tracing::info;

use crate::cluster::GroupingEngine;
use crate::db::{Store, Stores};
use crate::error::Result;
use crate::ledger::IngestReport;
use crate::models::Statistics;
use crate::utils::path::AssetPaths;

pub use embed::EmbedReport;
pub use group::GroupReport;
pub use provider::{DateResolver, Detection, EmbeddingProvider, FaceCrop, FaceSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Detect,
    Embed,
    Group,
    Propagate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Detect => "detect",
            Stage::Embed => "embed",
            Stage::Group => "group",
            Stage::Propagate => "propagate",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub recompute_embeddings: bool,
    pub recluster: bool,
}

impl RunOptions {
    /// New faces only get a meaningful label when the whole population is
    /// regrouped, so an incremental run always reclusters.
    pub const fn incremental() -> Self {
        Self { recompute_embeddings: false, recluster: true }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    /// Stages that ran to completion, in order.
    pub stages: Vec<Stage>,
    pub detect: Option<IngestReport>,
    pub embed: EmbedReport,
    pub group: Option<GroupReport>,
    pub propagated: usize,
    pub statistics: Statistics,
}

/// Borrowed collaborators for one run.
pub struct Pipeline<'a> {
    pub stores: &'a Stores,
    pub paths: &'a AssetPaths,
    pub engine: &'a GroupingEngine,
    pub provider: &'a dyn EmbeddingProvider,
    pub carry_names: bool,
    pub source: Option<&'a dyn FaceSource>,
    pub dates: Option<&'a dyn DateResolver>,
}

impl Pipeline<'_> {
    /// Embed always runs; Group only with `recluster`, otherwise existing
    /// labels stay as they are; Propagate always runs.
    pub fn run_full(&self, opts: RunOptions) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();
        info!(
            "Pipeline start (recompute_embeddings={}, recluster={})",
            opts.recompute_embeddings, opts.recluster
        );

        if let Some(source) = self.source {
            report.detect = Some(self.detect(source)?);
            self.finish(&mut report, Stage::Detect);
        }

        report.embed = self.embed(opts.recompute_embeddings)?;
        self.finish(&mut report, Stage::Embed);

        if opts.recluster {
            report.group = Some(self.group()?);
            self.finish(&mut report, Stage::Group);
        }

        report.propagated = self.propagate()?;
        self.finish(&mut report, Stage::Propagate);

        report.statistics = {
            let ledger = self.stores.ledger.load()?;
            let names = self.stores.identities.load()?;
            ledger.statistics(&names)
        };
        info!(
            "Pipeline complete: {} photos, {} faces, {} groups, {} named faces",
            report.statistics.total_photos,
            report.statistics.total_faces,
            report.statistics.num_groups,
            report.statistics.named_faces
        );
        Ok(report)
    }

    fn finish(&self, report: &mut PipelineReport, stage: Stage) {
        info!("Stage {} complete", stage);
        report.stages.push(stage);
    }

    fn detect(&self, source: &dyn FaceSource) -> Result<IngestReport> {
        self.stores.ledger.update(|ledger| -> Result<IngestReport> {
            let known: Vec<String> = ledger.photos.iter().map(|p| p.file.clone()).collect();
            let detection = source.detect(&known)?;
            if detection.photos.is_empty() && detection.faces.is_empty() {
                info!("No new photos detected");
            }
            Ok(detect::ingest_detection(ledger, detection, self.dates, self.paths))
        })
    }

    fn embed(&self, recompute: bool) -> Result<EmbedReport> {
        let ledger = self.stores.ledger.load()?;
        self.stores
            .embeddings
            .update(|set| {
                Ok(embed::compute_missing(&ledger, set, self.paths, self.provider, recompute))
            })
    }

    fn group(&self) -> Result<GroupReport> {
        let set = self.stores.embeddings.load()?;
        self.stores.update_names_and_ledger(|names, ledger| {
            group::regroup(ledger, names, &set, self.engine, self.carry_names)
        })
    }

    fn propagate(&self) -> Result<usize> {
        let names = self.stores.identities.load()?;
        self.stores.ledger.update(|ledger| Ok(ledger.propagate(&names)))
    }
}
