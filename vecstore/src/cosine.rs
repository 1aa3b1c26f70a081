/// Compute the cosine similarity between two vectors.
///
/// Returns a value in `[-1, 1]` where 1 means identical direction and
/// -1 means opposite direction.
///
/// Accumulates in f64 and clamps the result to absorb rounding error.
/// Returns 0.0 for zero vectors or dimension mismatches.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot: f64 = 0.0;
    let mut norm_a: f64 = 0.0;
    let mut norm_b: f64 = 0.0;

    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    similarity.clamp(-1.0, 1.0) as f32
}
