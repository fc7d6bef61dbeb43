use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IdentityError>;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("asset missing: {}", .0.display())]
    AssetMissing(PathBuf),

    #[error("grouping algorithm unavailable: {0}")]
    AlgorithmUnavailable(String),

    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl IdentityError {
    pub fn face_not_found(id: &str) -> Self {
        Self::NotFound { kind: "face", id: id.to_string() }
    }

    pub fn photo_not_found(file: &str) -> Self {
        Self::NotFound { kind: "photo", id: file.to_string() }
    }

    pub fn person_not_found(name: &str) -> Self {
        Self::NotFound { kind: "person", id: name.to_string() }
    }

    pub fn group_not_found(label: i64) -> Self {
        Self::NotFound { kind: "group", id: label.to_string() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<rusqlite::Error> for IdentityError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store(e.into())
    }
}
