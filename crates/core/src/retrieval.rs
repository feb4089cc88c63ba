use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredPosition {
    pub position: usize,
    pub score: f32,
}

pub fn dot(left: &[f32], right: &[f32]) -> f32 {
    left.iter().zip(right).map(|(a, b)| a * b).sum()
}

/// Scores every vector against `query` by dot product and returns the `k`
/// best, highest score first. Equal scores keep the earlier position first.
/// Returns everything when fewer than `k` vectors exist.
pub fn top_k(vectors: &[Vec<f32>], query: &[f32], k: usize) -> Vec<ScoredPosition> {
    let mut scored: Vec<ScoredPosition> = vectors
        .iter()
        .enumerate()
        .map(|(position, vector)| {
            let score = dot(vector, query);
            ScoredPosition {
                position,
                score: if score.is_nan() { f32::NEG_INFINITY } else { score },
            }
        })
        .collect();

    scored.sort_by(|left, right| rank_order(left, right));
    scored.truncate(k);
    scored
}

fn rank_order(left: &ScoredPosition, right: &ScoredPosition) -> Ordering {
    right
        .score
        .partial_cmp(&left.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| left.position.cmp(&right.position))
}
