//! Feature-vector helpers shared by the tracker and the identity resolver.

/// Euclidean (L2) distance between two feature vectors.
///
/// Returns `None` when the lengths differ; such vectors come from different
/// models and have no meaningful distance.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    let sum = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>();
    Some(sum.sqrt())
}

/// Element-wise mean of a set of equal-length vectors.
///
/// Accumulates in f64 to keep long tracks from drifting. Returns `None`
/// for an empty set.
pub fn mean<'a, I>(vectors: I) -> Option<Vec<f32>>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut iter = vectors.into_iter();
    let first = iter.next()?;
    let mut sum: Vec<f64> = first.iter().map(|&v| v as f64).collect();
    let mut count = 1usize;

    for v in iter {
        debug_assert_eq!(v.len(), sum.len(), "feature vectors must have equal length");
        for (acc, &x) in sum.iter_mut().zip(v.iter()) {
            *acc += x as f64;
        }
        count += 1;
    }

    Some(sum.into_iter().map(|s| (s / count as f64) as f32).collect())
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
