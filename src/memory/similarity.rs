//! Vector math shared by the store and the fractal index.

/// Cosine similarity in [-1, 1].
///
/// Vectors of different length, and zero vectors, score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    // `+ 0.0` folds -0.0 into 0.0; `total_cmp` would order them apart
    dot / (norm_a * norm_b) + 0.0
}

/// Elementwise mean of `vectors`, or `None` when there is nothing to average.
///
/// The first vector fixes the dimension; longer vectors are cut to it and
/// shorter ones only contribute to their own components.
pub fn centroid<'a, I>(vectors: I) -> Option<Vec<f32>>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut iter = vectors.into_iter();
    let first = iter.next()?;
    let mut sum = first.to_vec();
    let mut n = 1usize;

    for v in iter {
        for (acc, x) in sum.iter_mut().zip(v.iter()) {
            *acc += x;
        }
        n += 1;
    }

    let n = n as f32;
    for acc in &mut sum {
        *acc /= n;
    }
    Some(sum)
}

/// Round a score to 4 decimals for reporting. Never returns -0.0.
pub fn round_score(score: f32) -> f32 {
    (score * 10_000.0).round() / 10_000.0 + 0.0
}
