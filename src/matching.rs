//! Cosine-similarity ranking of historical tickets.

use serde::Serialize;
use thiserror::Error;

use crate::tickets::Ticket;

/// Errors raised while ranking.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchError {
    #[error("Embedding dimension mismatch: query has {query}, corpus entry {index} has {entry}")]
    DimensionMismatch {
        query: usize,
        entry: usize,
        index: usize,
    },
}

/// A historical ticket paired with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub ticket: Ticket,
    /// Similarity in `[0, 1]`.
    pub similarity: f32,
}

/// Cosine similarity clamped to `[0, 1]`.
///
/// A zero-magnitude vector has similarity 0 with everything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot_product / (norm_a * norm_b)).clamp(0.0, 1.0)
}

/// Rank `corpus` against `query`, returning the `k` best matches.
///
/// Output is sorted by descending similarity; equal scores keep corpus
/// order. Length is `min(k, corpus.len())`.
pub fn rank<'a, I, V>(query: &[f32], corpus: I, k: usize) -> Result<Vec<MatchResult>, MatchError>
where
    I: IntoIterator<Item = (&'a Ticket, V)>,
    V: AsRef<[f32]>,
{
    let mut scored = Vec::new();
    for (index, (ticket, vector)) in corpus.into_iter().enumerate() {
        let vector = vector.as_ref();
        if vector.len() != query.len() {
            return Err(MatchError::DimensionMismatch {
                query: query.len(),
                entry: vector.len(),
                index,
            });
        }
        scored.push((ticket, cosine_similarity(query, vector)));
    }

    // `sort_by` is stable, which gives the insertion-order tie-break.
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(k);

    Ok(scored
        .into_iter()
        .map(|(ticket, similarity)| MatchResult {
            ticket: ticket.clone(),
            similarity,
        })
        .collect())
}

/// Drop matches below `min_similarity`, falling back to the best
/// `fallback` matches when nothing clears the floor.
///
/// A floor of `0.0` disables filtering.
pub fn apply_floor(
    mut matches: Vec<MatchResult>,
    min_similarity: f32,
    fallback: usize,
) -> Vec<MatchResult> {
    if min_similarity <= 0.0 {
        return matches;
    }
    if matches.iter().any(|m| m.similarity >= min_similarity) {
        matches.retain(|m| m.similarity >= min_similarity);
    } else {
        matches.truncate(fallback);
    }
    matches
}
