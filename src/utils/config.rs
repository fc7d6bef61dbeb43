use std::env;
use std::path::PathBuf;
use tracing::warn;

use crate::cluster::{Algorithm, GroupingConfig};

#[derive(Clone, Debug)]
pub struct Config {
    pub data: PathBuf,
    pub photos_dir: PathBuf,
    pub faces_dir: PathBuf,
    pub grouping: GroupingConfig,
    /// Re-key the Identity Map after each regroup by centroid matching.
    pub carry_names: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let data =
            PathBuf::from(env::var("FAMPHOTOS_DATA").unwrap_or_else(|_| "./data".to_string()));
        let photos_dir = env::var("FAMPHOTOS_PHOTOS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data.join("photos"));
        let faces_dir = env::var("FAMPHOTOS_FACES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data.join("faces"));

        let defaults = GroupingConfig::default();
        let algorithm = match env::var("FAMPHOTOS_CLUSTER_METHOD") {
            Ok(raw) => raw.parse::<Algorithm>().unwrap_or_else(|e| {
                warn!("{}; using {}", e, defaults.algorithm);
                defaults.algorithm
            }),
            Err(_) => defaults.algorithm,
        };
        let eps = env::var("FAMPHOTOS_CLUSTER_EPS")
            .ok()
            .and_then(|v| v.parse::<f32>().ok())
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(defaults.eps);
        let min_samples = env::var("FAMPHOTOS_CLUSTER_MIN_SAMPLES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(defaults.min_samples);
        let min_cluster_size = env::var("FAMPHOTOS_HDBSCAN_MIN_CLUSTER_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v >= 2)
            .unwrap_or(defaults.min_cluster_size);
        let carry_names = env::var("FAMPHOTOS_CARRY_NAMES").map(|v| parse_flag(&v)).unwrap_or(true);

        Self {
            data,
            photos_dir,
            faces_dir,
            grouping: GroupingConfig { algorithm, eps, min_samples, min_cluster_size },
            carry_names,
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    !matches!(raw.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off")
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tests in this module mutate the process environment.
    static ENV_LOCK: parking_lot::Mutex<()> = parking_lot::const_mutex(());

    const VARS: &[&str] = &[
        "FAMPHOTOS_DATA",
        "FAMPHOTOS_PHOTOS_DIR",
        "FAMPHOTOS_FACES_DIR",
        "FAMPHOTOS_CLUSTER_METHOD",
        "FAMPHOTOS_CLUSTER_EPS",
        "FAMPHOTOS_CLUSTER_MIN_SAMPLES",
        "FAMPHOTOS_HDBSCAN_MIN_CLUSTER_SIZE",
        "FAMPHOTOS_CARRY_NAMES",
    ];

    fn clear_vars(vars: &[&str]) -> Vec<(String, Option<String>)> {
        let mut saved = Vec::new();
        for &k in vars {
            let prev = env::var(k).ok();
            saved.push((k.to_string(), prev));
            env::remove_var(k);
        }
        saved
    }

    fn restore_vars(saved: Vec<(String, Option<String>)>) {
        for (k, v) in saved {
            if let Some(val) = v {
                env::set_var(k, val);
            } else {
                env::remove_var(k);
            }
        }
    }

    #[test]
    fn test_config_defaults() {
        let _guard = ENV_LOCK.lock();
        let saved = clear_vars(VARS);

        let config = Config::from_env();
        assert_eq!(config.data, PathBuf::from("./data"));
        assert_eq!(config.photos_dir, PathBuf::from("./data").join("photos"));
        assert_eq!(config.faces_dir, PathBuf::from("./data").join("faces"));
        assert_eq!(config.grouping, GroupingConfig::default());
        assert!(config.carry_names);

        restore_vars(saved);
    }

    #[test]
    fn test_config_from_env() {
        let _guard = ENV_LOCK.lock();
        let saved = clear_vars(VARS);

        env::set_var("FAMPHOTOS_DATA", "/custom/data");
        env::set_var("FAMPHOTOS_FACES_DIR", "/custom/crops");
        env::set_var("FAMPHOTOS_CLUSTER_METHOD", "hdbscan");
        env::set_var("FAMPHOTOS_CLUSTER_EPS", "0.42");
        env::set_var("FAMPHOTOS_CLUSTER_MIN_SAMPLES", "4");
        env::set_var("FAMPHOTOS_HDBSCAN_MIN_CLUSTER_SIZE", "5");
        env::set_var("FAMPHOTOS_CARRY_NAMES", "off");

        let config = Config::from_env();
        assert_eq!(config.data, PathBuf::from("/custom/data"));
        assert_eq!(config.photos_dir, PathBuf::from("/custom/data/photos"));
        assert_eq!(config.faces_dir, PathBuf::from("/custom/crops"));
        assert_eq!(config.grouping.algorithm, Algorithm::VariableDensity);
        assert_eq!(config.grouping.eps, 0.42);
        assert_eq!(config.grouping.min_samples, 4);
        assert_eq!(config.grouping.min_cluster_size, 5);
        assert!(!config.carry_names);

        restore_vars(saved);
    }

    #[test]
    fn test_config_ignores_bad_values() {
        let _guard = ENV_LOCK.lock();
        let saved = clear_vars(VARS);

        env::set_var("FAMPHOTOS_CLUSTER_METHOD", "kmeans");
        env::set_var("FAMPHOTOS_CLUSTER_EPS", "-1");
        env::set_var("FAMPHOTOS_CLUSTER_MIN_SAMPLES", "zero");
        let config = Config::from_env();
        assert_eq!(config.grouping, GroupingConfig::default());

        restore_vars(saved);
    }
}
