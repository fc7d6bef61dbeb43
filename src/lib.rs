pub mod utils;
pub mod error;
pub mod models;
pub mod db;
pub mod cluster;
pub mod ledger;
pub mod pipeline;
pub mod service;

pub use cluster::{Algorithm, GroupingConfig, GroupingEngine};
pub use error::{IdentityError, Result};
pub use ledger::{IdentityMap, Ledger};
pub use models::{face_id, FaceRecord, PhotoRecord, NOISE_LABEL};
pub use pipeline::{EmbeddingProvider, RunOptions};
pub use service::IdentityService;
