use crate::corpus::{Corpus, GlobalIndex};
use crate::error::{RagError, Result};
use crate::filter::{filter, FilterSpec, FilteredView};
use crate::metadata::OfferMetadata;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    /// 1-based position in the ranking.
    pub rank: usize,
    pub score: f32,
    pub content: String,
    pub metadata: OfferMetadata,
    pub global_index: GlobalIndex,
}

/// Cosine similarity in `[-1, 1]`. A zero vector on either side scores 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}

/// Ranks the filtered candidates against `query` and returns the best `top_n`.
///
/// Scores are sorted descending with ties broken by ascending global index,
/// so the output is reproducible for a fixed input. An empty view is a normal
/// outcome and yields an empty list.
pub fn rank(query: &[f32], view: &FilteredView<'_>, top_n: usize) -> Result<Vec<RankedResult>> {
    if top_n == 0 {
        return Err(RagError::invalid("top_n must be a positive integer"));
    }
    if view.is_empty() {
        tracing::warn!("no candidates left after filtering; try less restrictive criteria");
        return Ok(Vec::new());
    }
    let dim = view.embeddings[0].len();
    if query.len() != dim {
        return Err(RagError::schema(format!("query has dimension {}, candidates have {dim}", query.len())));
    }

    let mut scored: Vec<(f32, usize)> = view
        .embeddings
        .iter()
        .enumerate()
        .map(|(local, e)| (cosine_similarity(query, e), local))
        .collect();
    scored.sort_by(|a, b| {
        b.0.total_cmp(&a.0)
            .then_with(|| view.global_indices[a.1].cmp(&view.global_indices[b.1]))
    });
    scored.truncate(top_n);
    tracing::debug!(candidates = view.len(), returned = scored.len(), "ranked candidates");

    Ok(scored
        .into_iter()
        .enumerate()
        .map(|(pos, (score, local))| RankedResult {
            rank: pos + 1,
            score,
            content: view.contents[local].to_string(),
            metadata: view.metadata[local].clone(),
            global_index: view.global_indices[local],
        })
        .collect())
}

/// Filter then rank in one call.
pub fn search(corpus: &Corpus, query: &[f32], spec: &FilterSpec, top_n: usize) -> Result<Vec<RankedResult>> {
    rank(query, &filter(corpus, spec), top_n)
}

/// Vector in, ranked list with metadata out. Each backend brings its own filter language.
pub trait VectorSearch {
    type Filter;

    fn search(&self, query: &[f32], filter: Option<&Self::Filter>, top_n: usize) -> Result<Vec<RankedResult>>;
}

impl VectorSearch for Corpus {
    type Filter = FilterSpec;

    fn search(&self, query: &[f32], filter: Option<&FilterSpec>, top_n: usize) -> Result<Vec<RankedResult>> {
        match filter {
            Some(spec) => search(self, query, spec, top_n),
            None => rank(query, &FilteredView::all(self), top_n),
        }
    }
}

/// Supplies query vectors. Embedding models live outside this crate.
pub trait Embedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Embeds `text` and runs it against any backend.
pub fn search_text<E, B>(embedder: &E, backend: &B, text: &str, filter: Option<&B::Filter>, top_n: usize) -> Result<Vec<RankedResult>>
where
    E: Embedder + ?Sized,
    B: VectorSearch + ?Sized,
{
    let query = embedder.embed(text)?;
    backend.search(&query, filter, top_n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_handles_zero_and_opposite_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-3.0, 0.0]) + 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn rejects_zero_top_n_even_without_candidates() {
        let view = FilteredView::default();
        assert!(matches!(rank(&[1.0], &view, 0), Err(RagError::InvalidArgument(_))));
        assert!(rank(&[1.0], &view, 3).unwrap().is_empty());
    }
}
