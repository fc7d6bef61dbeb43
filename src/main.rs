use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;

use famphotos_identity::cluster::{Algorithm, GroupingConfig};
use famphotos_identity::pipeline::provider::{DetectionFile, FileNameDates, SidecarEmbeddings};
use famphotos_identity::pipeline::{DateResolver, FaceSource, RunOptions};
use famphotos_identity::utils::config::Config;
use famphotos_identity::utils::logging;
use famphotos_identity::IdentityService;

#[derive(Parser, Debug)]
#[command(name = "famphotos", about = "Face identity resolution over a family photo collection")]
struct Cli {
    /// Data directory; overrides FAMPHOTOS_DATA
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Directory of precomputed `<face_id>.json` embeddings (default: the faces directory)
    #[arg(long, global = true)]
    embeddings_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Method {
    Dbscan,
    Hdbscan,
}

impl From<Method> for Algorithm {
    fn from(method: Method) -> Self {
        match method {
            Method::Dbscan => Algorithm::DensityBased,
            Method::Hdbscan => Algorithm::VariableDensity,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline: embed, optionally regroup, apply names
    Run {
        #[arg(long)]
        recompute_embeddings: bool,
        #[arg(long)]
        recluster: bool,
        #[arg(long, value_enum)]
        method: Option<Method>,
        #[arg(long)]
        eps: Option<f32>,
        #[arg(long)]
        min_samples: Option<usize>,
        /// Detector output to ingest first (JSON)
        #[arg(long)]
        detections: Option<PathBuf>,
    },
    /// Embed new faces and regroup everything
    Incremental {
        #[arg(long)]
        detections: Option<PathBuf>,
    },
    /// Remove records whose crop or photo is gone
    Cleanup,
    /// Collection statistics
    Stats,
    /// List groups with their names and date ranges
    Groups,
    /// List named people
    People,
    /// Photos per year, or one person's appearances per year
    Timeline {
        #[arg(long)]
        person: Option<String>,
    },
    /// Show one face
    Face { face_id: String },
    /// Name a whole group
    Name { label: i64, name: String },
    /// Move every face of SOURCE into TARGET
    Merge { target: i64, source: i64 },
    /// Move one face into a new group
    Split { face_id: String },
    /// Name one face; survives regrouping
    Assign { face_id: String, name: String },
    /// Clear one face's name
    Unassign { face_id: String },
    /// Re-apply Identity Map names to grouped faces
    ApplyNames,
    /// Recompute photo face lists from face records
    RebuildLinks,
    /// Set the capture date of a photo and its faces
    SetDate { photo: String, date: String },
}

fn print<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();

    let mut cfg = Config::from_env();
    if let Some(data) = cli.data {
        if std::env::var_os("FAMPHOTOS_PHOTOS_DIR").is_none() {
            cfg.photos_dir = data.join("photos");
        }
        if std::env::var_os("FAMPHOTOS_FACES_DIR").is_none() {
            cfg.faces_dir = data.join("faces");
        }
        cfg.data = data;
    }
    let embeddings_dir = cli.embeddings_dir.unwrap_or_else(|| cfg.faces_dir.clone());
    let svc = IdentityService::open(&cfg, Box::new(SidecarEmbeddings::new(embeddings_dir)))?;
    let dates = FileNameDates;

    match cli.command {
        Command::Run { recompute_embeddings, recluster, method, eps, min_samples, detections } => {
            let grouping = GroupingConfig {
                algorithm: method.map(Algorithm::from).unwrap_or(cfg.grouping.algorithm),
                eps: eps.unwrap_or(cfg.grouping.eps),
                min_samples: min_samples.unwrap_or(cfg.grouping.min_samples),
                ..cfg.grouping
            };
            let source = detections.map(DetectionFile::new);
            let report = svc.run_with(
                RunOptions { recompute_embeddings, recluster },
                Some(grouping),
                source.as_ref().map(|s| s as &dyn FaceSource),
                Some(&dates as &dyn DateResolver),
            )?;
            print(&report)?;
        }
        Command::Incremental { detections } => {
            let source = detections.map(DetectionFile::new);
            let report = svc.run_with(
                RunOptions::incremental(),
                None,
                source.as_ref().map(|s| s as &dyn FaceSource),
                Some(&dates as &dyn DateResolver),
            )?;
            print(&report)?;
        }
        Command::Cleanup => print(&svc.cleanup()?)?,
        Command::Stats => print(&svc.statistics()?)?,
        Command::Groups => print(&svc.list_groups()?)?,
        Command::People => print(&svc.list_people()?)?,
        Command::Timeline { person: Some(name) } => print(&svc.person_timeline(&name)?)?,
        Command::Timeline { person: None } => print(&svc.photo_timeline()?)?,
        Command::Face { face_id } => print(&svc.face(&face_id)?)?,
        Command::Name { label, name } => {
            let faces_updated = svc.set_group_name(label, &name)?;
            print(&serde_json::json!({ "label": label, "faces_updated": faces_updated }))?
        }
        Command::Merge { target, source } => {
            print(&serde_json::json!({ "success": svc.merge_groups(target, source)? }))?
        }
        Command::Split { face_id } => {
            print(&serde_json::json!({ "new_label": svc.split_face(&face_id)? }))?
        }
        Command::Assign { face_id, name } => {
            svc.direct_assign(&face_id, &name)?;
            print(&svc.face(&face_id)?)?
        }
        Command::Unassign { face_id } => {
            svc.clear_assign(&face_id)?;
            print(&svc.face(&face_id)?)?
        }
        Command::ApplyNames => print(&serde_json::json!({ "faces_updated": svc.propagate()? }))?,
        Command::RebuildLinks => {
            print(&serde_json::json!({ "photos_updated": svc.rebuild_photo_face_links()? }))?
        }
        Command::SetDate { photo, date } => {
            print(&serde_json::json!({ "faces_updated": svc.update_photo_date(&photo, &date)? }))?
        }
    }
    Ok(())
}
