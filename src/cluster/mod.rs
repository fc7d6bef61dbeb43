//! The Grouping Engine: partitions the embedding population into groups of
//! faces believed to show the same individual.
//!
//! Strategies are stateless. For a fixed input order and fixed parameters they
//! return identical labels on every call, whatever the rayon pool size. Label
//! values carry no meaning across calls; [`carry`] exists to bridge runs.

pub mod carry;
pub mod dbscan;
pub mod distance;
#[cfg(feature = "variable-density")]
pub mod hdbscan;

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

use crate::error::{IdentityError, Result};

pub use dbscan::Dbscan;
#[cfg(feature = "variable-density")]
pub use hdbscan::Hdbscan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Algorithm {
    /// Fixed-radius density grouping (DBSCAN). Always available.
    #[serde(rename = "dbscan")]
    DensityBased,
    /// Hierarchical density grouping (HDBSCAN), behind the `variable-density` feature.
    #[serde(rename = "hdbscan")]
    VariableDensity,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::DensityBased => "dbscan",
            Algorithm::VariableDensity => "hdbscan",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dbscan" => Ok(Algorithm::DensityBased),
            "hdbscan" => Ok(Algorithm::VariableDensity),
            other => Err(IdentityError::InvalidInput(format!("unknown grouping method '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GroupingConfig {
    pub algorithm: Algorithm,
    /// Neighbourhood radius (Euclidean). Also the largest centroid shift a
    /// name may follow across regrouping.
    pub eps: f32,
    /// Points, the point itself included, needed within `eps` to be core.
    pub min_samples: usize,
    /// Smallest group the hierarchical strategy will report.
    pub min_cluster_size: usize,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self { algorithm: Algorithm::DensityBased, eps: 0.5, min_samples: 2, min_cluster_size: 2 }
    }
}

impl GroupingConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.eps.is_finite() || self.eps <= 0.0 {
            return Err(IdentityError::InvalidInput(format!(
                "eps must be a positive number, got {}",
                self.eps
            )));
        }
        if self.min_samples == 0 {
            return Err(IdentityError::InvalidInput("min_samples must be at least 1".into()));
        }
        if self.min_cluster_size < 2 {
            return Err(IdentityError::InvalidInput("min_cluster_size must be at least 2".into()));
        }
        Ok(())
    }
}

pub trait GroupingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `labels[i]` is the group of `vectors[i]`, or [`crate::models::NOISE_LABEL`].
    fn group(&self, vectors: &[Vec<f32>]) -> Vec<i64>;
}

/// Configured strategy plus the parameters it was built from.
pub struct GroupingEngine {
    config: GroupingConfig,
    strategy: Box<dyn GroupingStrategy>,
}

impl GroupingEngine {
    /// Builds the configured strategy. An unavailable hierarchical strategy
    /// falls back to DBSCAN with a warning; it is never an error.
    pub fn new(config: GroupingConfig) -> Self {
        Self::with_hierarchical(config, variable_density)
    }

    fn with_hierarchical(config: GroupingConfig, hierarchical: StrategyBuilder) -> Self {
        let strategy = match select(&config, hierarchical) {
            Ok(strategy) => strategy,
            Err(e) => {
                warn!("{}; falling back to dbscan", e);
                Box::new(Dbscan::new(config.eps, config.min_samples)) as Box<dyn GroupingStrategy>
            }
        };
        Self { config, strategy }
    }

    pub fn config(&self) -> &GroupingConfig {
        &self.config
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn group(&self, vectors: &[Vec<f32>]) -> Vec<i64> {
        if vectors.is_empty() {
            return Vec::new();
        }
        let labels = self.strategy.group(vectors);
        let groups = labels.iter().filter(|&&l| l >= 0).max().map_or(0, |&m| m + 1);
        let noise = labels.iter().filter(|&&l| l < 0).count();
        info!(
            "{} grouped {} faces into {} groups ({} noise)",
            self.strategy.name(),
            vectors.len(),
            groups,
            noise
        );
        labels
    }
}

type StrategyBuilder = fn(&GroupingConfig) -> Result<Box<dyn GroupingStrategy>>;

fn select(
    config: &GroupingConfig,
    hierarchical: StrategyBuilder,
) -> Result<Box<dyn GroupingStrategy>> {
    match config.algorithm {
        Algorithm::DensityBased => Ok(Box::new(Dbscan::new(config.eps, config.min_samples))),
        Algorithm::VariableDensity => hierarchical(config),
    }
}

#[cfg(feature = "variable-density")]
fn variable_density(config: &GroupingConfig) -> Result<Box<dyn GroupingStrategy>> {
    Ok(Box::new(Hdbscan::new(config.min_cluster_size, config.min_samples)))
}

#[cfg(not(feature = "variable-density"))]
fn variable_density(_config: &GroupingConfig) -> Result<Box<dyn GroupingStrategy>> {
    Err(IdentityError::AlgorithmUnavailable(
        "hdbscan support was not compiled in (feature `variable-density`)".into(),
    ))
}
