use rayon::prelude::*;

use super::distance::euclidean;
use super::GroupingStrategy;
use crate::models::NOISE_LABEL;

/// Populations at or above this size compute neighbourhoods on the rayon pool.
pub const PARALLEL_THRESHOLD: usize = 512;

/// Fixed-radius density grouping.
///
/// A point's neighbourhood is every point within `eps`, itself included. A
/// point is core when its neighbourhood holds at least `min_samples` points.
/// Groups are numbered from 0 in the order of their lowest-index core point;
/// a border point joins the first group that reaches it.
#[derive(Debug, Clone, Copy)]
pub struct Dbscan {
    pub eps: f32,
    pub min_samples: usize,
}

impl Dbscan {
    pub fn new(eps: f32, min_samples: usize) -> Self {
        Self { eps, min_samples: min_samples.max(1) }
    }

    fn neighbourhoods(&self, vectors: &[Vec<f32>], parallel: bool) -> Vec<Vec<usize>> {
        let eps = self.eps as f64;
        let query = |i: usize| -> Vec<usize> {
            let q = &vectors[i];
            vectors
                .iter()
                .enumerate()
                .filter(|(_, v)| euclidean(q, v) <= eps)
                .map(|(j, _)| j)
                .collect()
        };
        if parallel {
            (0..vectors.len()).into_par_iter().map(query).collect()
        } else {
            (0..vectors.len()).map(query).collect()
        }
    }

    pub(crate) fn group_with(&self, vectors: &[Vec<f32>], parallel: bool) -> Vec<i64> {
        let n = vectors.len();
        if n == 0 {
            return Vec::new();
        }

        let neighbours = self.neighbourhoods(vectors, parallel);
        let is_core: Vec<bool> = neighbours.iter().map(|nb| nb.len() >= self.min_samples).collect();

        let mut labels = vec![NOISE_LABEL; n];
        let mut next_label: i64 = 0;
        let mut stack = Vec::new();

        for seed in 0..n {
            if labels[seed] != NOISE_LABEL || !is_core[seed] {
                continue;
            }
            let label = next_label;
            next_label += 1;
            labels[seed] = label;
            stack.push(seed);

            while let Some(p) = stack.pop() {
                if !is_core[p] {
                    continue;
                }
                for &q in &neighbours[p] {
                    if labels[q] == NOISE_LABEL {
                        labels[q] = label;
                        stack.push(q);
                    }
                }
            }
        }
        labels
    }
}

impl GroupingStrategy for Dbscan {
    fn name(&self) -> &'static str {
        "dbscan"
    }

    fn group(&self, vectors: &[Vec<f32>]) -> Vec<i64> {
        self.group_with(vectors, vectors.len() >= PARALLEL_THRESHOLD)
    }
}
