/// Euclidean distance, accumulated in f64. Vectors of different length are
/// never neighbours of each other.
pub fn euclidean(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return f64::INFINITY;
    }
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Component-wise mean of the given vectors, or `None` when they are empty or
/// disagree on length.
pub fn centroid<'a, I>(vectors: I) -> Option<Vec<f32>>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut sum: Vec<f64> = Vec::new();
    let mut count = 0usize;
    for v in vectors {
        if count == 0 {
            sum = vec![0.0; v.len()];
        } else if v.len() != sum.len() {
            return None;
        }
        for (s, &x) in sum.iter_mut().zip(v) {
            *s += x as f64;
        }
        count += 1;
    }
    if count == 0 {
        return None;
    }
    Some(sum.into_iter().map(|s| (s / count as f64) as f32).collect())
}
