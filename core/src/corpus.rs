use crate::error::{RagError, Result};
use crate::metadata::OfferMetadata;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Position of a record in the corpus. Stable across filtering and appends.
pub type GlobalIndex = usize;

/// One unit of ingested data: the embedding, its metadata and the text it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub embedding: Vec<f32>,
    pub metadata: OfferMetadata,
    pub content: String,
}

#[derive(Debug, Clone, Copy)]
pub struct RecordRef<'a> {
    pub index: GlobalIndex,
    pub embedding: &'a [f32],
    pub metadata: &'a OfferMetadata,
    pub content: &'a str,
}

/// Three parallel arrays sharing one index space.
///
/// The arrays always have equal length and every embedding has the same
/// dimension; the constructors and [`Corpus::extend`] reject anything else
/// with `SchemaMismatch` because a silent truncation would break the global
/// index correspondence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Corpus {
    embeddings: Vec<Vec<f32>>,
    metadata: Vec<OfferMetadata>,
    contents: Vec<String>,
}

impl Corpus {
    pub fn new() -> Self { Self::default() }

    pub fn from_parts(embeddings: Vec<Vec<f32>>, metadata: Vec<OfferMetadata>, contents: Vec<String>) -> Result<Self> {
        if embeddings.len() != metadata.len() || embeddings.len() != contents.len() {
            return Err(RagError::schema(format!(
                "parallel arrays differ in length: {} embeddings, {} metadata, {} contents",
                embeddings.len(),
                metadata.len(),
                contents.len()
            )));
        }
        if let Some(first) = embeddings.first() {
            check_dimension(first.len(), &embeddings)?;
        }
        Ok(Self { embeddings, metadata, contents })
    }

    pub fn from_records(records: Vec<Record>) -> Result<Self> {
        let mut corpus = Self::new();
        corpus.extend(records)?;
        Ok(corpus)
    }

    /// Appends records after the current last index and returns the indices they received.
    /// Nothing is appended if any record has the wrong dimension.
    pub fn extend(&mut self, records: Vec<Record>) -> Result<Range<GlobalIndex>> {
        let start = self.len();
        let Some(first) = records.first() else { return Ok(start..start) };
        let dim = self.dimension().unwrap_or(first.embedding.len());
        for (offset, r) in records.iter().enumerate() {
            if r.embedding.is_empty() || r.embedding.len() != dim {
                return Err(RagError::schema(format!(
                    "record {} has dimension {}, corpus expects {}",
                    start + offset,
                    r.embedding.len(),
                    dim
                )));
            }
        }
        for r in records {
            self.embeddings.push(r.embedding);
            self.metadata.push(r.metadata);
            self.contents.push(r.content);
        }
        Ok(start..self.len())
    }

    pub fn len(&self) -> usize { self.embeddings.len() }

    pub fn is_empty(&self) -> bool { self.embeddings.is_empty() }

    /// Embedding dimension, or `None` for an empty corpus.
    pub fn dimension(&self) -> Option<usize> { self.embeddings.first().map(Vec::len) }

    pub fn embeddings(&self) -> &[Vec<f32>] { &self.embeddings }

    pub fn metadata(&self) -> &[OfferMetadata] { &self.metadata }

    pub fn contents(&self) -> &[String] { &self.contents }

    pub fn get(&self, index: GlobalIndex) -> Option<RecordRef<'_>> {
        Some(RecordRef {
            index,
            embedding: self.embeddings.get(index)?,
            metadata: self.metadata.get(index)?,
            content: self.contents.get(index)?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = RecordRef<'_>> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    pub fn into_parts(self) -> (Vec<Vec<f32>>, Vec<OfferMetadata>, Vec<String>) {
        (self.embeddings, self.metadata, self.contents)
    }
}

fn check_dimension(dim: usize, embeddings: &[Vec<f32>]) -> Result<()> {
    if dim == 0 {
        return Err(RagError::schema("embeddings must not be empty"));
    }
    if let Some((i, e)) = embeddings.iter().enumerate().find(|(_, e)| e.len() != dim) {
        return Err(RagError::schema(format!("record {i} has dimension {}, corpus expects {dim}", e.len())));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(embedding: Vec<f32>, content: &str) -> Record {
        Record { embedding, metadata: OfferMetadata::default(), content: content.into() }
    }

    #[test]
    fn extend_assigns_following_indices() {
        let mut c = Corpus::from_records(vec![rec(vec![1.0, 0.0], "a")]).unwrap();
        let range = c.extend(vec![rec(vec![0.0, 1.0], "b"), rec(vec![1.0, 1.0], "c")]).unwrap();
        assert_eq!(range, 1..3);
        assert_eq!(c.get(2).unwrap().content, "c");
        assert_eq!(c.dimension(), Some(2));
    }

    #[test]
    fn extend_is_all_or_nothing() {
        let mut c = Corpus::from_records(vec![rec(vec![1.0, 0.0], "a")]).unwrap();
        let err = c.extend(vec![rec(vec![0.0, 1.0], "b"), rec(vec![1.0], "bad")]).unwrap_err();
        assert!(matches!(err, RagError::SchemaMismatch(_)));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn from_parts_rejects_uneven_arrays() {
        let err = Corpus::from_parts(vec![vec![1.0]], vec![], vec!["x".into()]).unwrap_err();
        assert!(matches!(err, RagError::SchemaMismatch(_)));
        let err = Corpus::from_parts(vec![vec![1.0], vec![1.0, 2.0]], vec![OfferMetadata::default(); 2], vec![String::new(); 2]).unwrap_err();
        assert!(matches!(err, RagError::SchemaMismatch(_)));
    }
}
