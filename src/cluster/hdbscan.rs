use rayon::prelude::*;
use std::cmp::Ordering;

use super::distance::euclidean;
use super::GroupingStrategy;
use crate::models::NOISE_LABEL;

/// Smallest merge distance used when turning distances into densities;
/// duplicate embeddings would otherwise give an infinite lambda.
const MIN_DISTANCE: f64 = 1e-12;

/// Hierarchical density grouping.
///
/// Builds the minimum spanning tree over mutual reachability distances,
/// condenses the single-linkage hierarchy with `min_cluster_size`, and keeps
/// the most stable clusters (excess of mass). The root is never selected, so a
/// population with no density split is all noise.
#[derive(Debug, Clone, Copy)]
pub struct Hdbscan {
    pub min_cluster_size: usize,
    pub min_samples: usize,
}

struct Merge {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

#[derive(Default)]
struct Condensed {
    birth: f64,
    size: usize,
    children: Vec<usize>,
    /// Points leaving this cluster, with the density at which they leave.
    fallen: Vec<(usize, f64)>,
}

impl Hdbscan {
    pub fn new(min_cluster_size: usize, min_samples: usize) -> Self {
        Self { min_cluster_size: min_cluster_size.max(2), min_samples: min_samples.max(1) }
    }

    fn distances(vectors: &[Vec<f32>]) -> Vec<Vec<f64>> {
        (0..vectors.len())
            .into_par_iter()
            .map(|i| vectors.iter().map(|v| euclidean(&vectors[i], v)).collect())
            .collect()
    }

    /// Distance to the `min_samples`-th closest point, the point itself included.
    fn core_distances(&self, dist: &[Vec<f64>]) -> Vec<f64> {
        let k = self.min_samples.min(dist.len()) - 1;
        dist.iter()
            .map(|row| {
                let mut sorted = row.clone();
                sorted.sort_by(|a, b| a.total_cmp(b));
                sorted[k]
            })
            .collect()
    }

    /// Prim's algorithm over the complete mutual reachability graph, started at
    /// point 0. Ties go to the lower index.
    fn spanning_tree(dist: &[Vec<f64>], core: &[f64]) -> Vec<(usize, usize, f64)> {
        let n = dist.len();
        let mut in_tree = vec![false; n];
        let mut best = vec![f64::INFINITY; n];
        let mut from = vec![0usize; n];
        let mut edges = Vec::with_capacity(n.saturating_sub(1));

        let mut current = 0;
        in_tree[0] = true;
        for _ in 1..n {
            for j in 0..n {
                if in_tree[j] {
                    continue;
                }
                let reach = dist[current][j].max(core[current]).max(core[j]);
                if reach < best[j] {
                    best[j] = reach;
                    from[j] = current;
                }
            }
            let mut next = usize::MAX;
            for j in 0..n {
                if in_tree[j] {
                    continue;
                }
                if next == usize::MAX || best[j].total_cmp(&best[next]) == Ordering::Less {
                    next = j;
                }
            }
            in_tree[next] = true;
            edges.push((from[next], next, best[next]));
            current = next;
        }
        edges
    }

    /// Single-linkage hierarchy from MST edges. Merge `k` is node `n + k`.
    fn single_linkage(n: usize, mut edges: Vec<(usize, usize, f64)>) -> Vec<Merge> {
        edges.sort_by(|a, b| a.2.total_cmp(&b.2).then(a.0.cmp(&b.0)).then(a.1.cmp(&b.1)));

        let mut parent: Vec<usize> = (0..n).collect();
        let mut node_of: Vec<usize> = (0..n).collect();
        let mut size = vec![1usize; n];
        fn find(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }

        let mut merges = Vec::with_capacity(edges.len());
        for (a, b, distance) in edges {
            let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
            let merged = size[ra] + size[rb];
            merges.push(Merge { left: node_of[ra], right: node_of[rb], distance, size: merged });
            parent[rb] = ra;
            size[ra] = merged;
            node_of[ra] = n + merges.len() - 1;
        }
        merges
    }

    fn condense(&self, n: usize, merges: &[Merge]) -> Vec<Condensed> {
        let node_size = |node: usize| if node < n { 1 } else { merges[node - n].size };
        let mut clusters = vec![Condensed { size: n, ..Condensed::default() }];
        let mut stack = vec![(n + merges.len() - 1, 0usize)];

        while let Some((node, cluster)) = stack.pop() {
            if node < n {
                continue;
            }
            let merge = &merges[node - n];
            let lambda = 1.0 / merge.distance.max(MIN_DISTANCE);
            let (left, right) = (merge.left, merge.right);
            let big_left = node_size(left) >= self.min_cluster_size;
            let big_right = node_size(right) >= self.min_cluster_size;

            match (big_left, big_right) {
                (true, true) => {
                    for child in [left, right] {
                        let id = clusters.len();
                        clusters.push(Condensed {
                            birth: lambda,
                            size: node_size(child),
                            ..Condensed::default()
                        });
                        clusters[cluster].children.push(id);
                        stack.push((child, id));
                    }
                }
                (true, false) => {
                    Self::fall_out(n, merges, right, lambda, &mut clusters[cluster].fallen);
                    stack.push((left, cluster));
                }
                (false, true) => {
                    Self::fall_out(n, merges, left, lambda, &mut clusters[cluster].fallen);
                    stack.push((right, cluster));
                }
                (false, false) => {
                    Self::fall_out(n, merges, left, lambda, &mut clusters[cluster].fallen);
                    Self::fall_out(n, merges, right, lambda, &mut clusters[cluster].fallen);
                }
            }
        }
        clusters
    }

    fn fall_out(n: usize, merges: &[Merge], node: usize, lambda: f64, out: &mut Vec<(usize, f64)>) {
        let mut stack = vec![node];
        while let Some(x) = stack.pop() {
            if x < n {
                out.push((x, lambda));
            } else {
                stack.push(merges[x - n].left);
                stack.push(merges[x - n].right);
            }
        }
    }

    /// Excess-of-mass selection, root excluded.
    fn select(clusters: &[Condensed]) -> Vec<bool> {
        let mut stability: Vec<f64> = clusters
            .iter()
            .map(|c| {
                let points: f64 = c.fallen.iter().map(|&(_, l)| l - c.birth).sum();
                let children: f64 = c
                    .children
                    .iter()
                    .map(|&ch| (clusters[ch].birth - c.birth) * clusters[ch].size as f64)
                    .sum();
                points + children
            })
            .collect();

        let mut selected = vec![false; clusters.len()];
        // Children always have higher ids than their parent.
        for c in (1..clusters.len()).rev() {
            if clusters[c].children.is_empty() {
                selected[c] = true;
                continue;
            }
            let subtree: f64 = clusters[c].children.iter().map(|&ch| stability[ch]).sum();
            if subtree > stability[c] {
                stability[c] = subtree;
            } else {
                selected[c] = true;
                let mut stack = clusters[c].children.clone();
                while let Some(d) = stack.pop() {
                    selected[d] = false;
                    stack.extend(clusters[d].children.iter().copied());
                }
            }
        }
        selected
    }
}

impl GroupingStrategy for Hdbscan {
    fn name(&self) -> &'static str {
        "hdbscan"
    }

    fn group(&self, vectors: &[Vec<f32>]) -> Vec<i64> {
        let n = vectors.len();
        let mut labels = vec![NOISE_LABEL; n];
        if n < self.min_cluster_size {
            return labels;
        }

        let dist = Self::distances(vectors);
        let core = self.core_distances(&dist);
        let merges = Self::single_linkage(n, Self::spanning_tree(&dist, &core));
        let clusters = self.condense(n, &merges);
        let selected = Self::select(&clusters);

        let mut next_label = 0;
        for id in (0..selected.len()).filter(|&c| selected[c]) {
            let mut stack = vec![id];
            while let Some(c) = stack.pop() {
                for &(point, _) in &clusters[c].fallen {
                    labels[point] = next_label;
                }
                stack.extend(clusters[c].children.iter().copied());
            }
            next_label += 1;
        }
        labels
    }
}
