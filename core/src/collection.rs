//! Embedded vector collection backend.
//!
//! An alternative to the flat corpus file: named collections inside one sled
//! database, one tree per collection, each record stored under `chunk_<i>`.
//! Queries run the same exact cosine ranking as the in-memory corpus, after a
//! [`WhereFilter`] pass over the stored metadata.

use crate::corpus::{Corpus, GlobalIndex, Record};
use crate::error::{RagError, Result};
use crate::filter::FilteredView;
use crate::metadata::OfferMetadata;
use crate::rank::{rank, RankedResult, VectorSearch};
use crate::where_filter::WhereFilter;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::Path;

pub const DEFAULT_COLLECTION: &str = "vie_offers";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    index: u64,
    embedding: Vec<f32>,
    metadata: OfferMetadata,
    content: String,
}

pub fn chunk_id(index: GlobalIndex) -> String { format!("chunk_{index}") }

pub struct VectorDb {
    db: sled::Db,
}

impl VectorDb {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let db = sled::open(dir.as_ref())?;
        tracing::info!(path = %dir.as_ref().display(), "opened vector database");
        Ok(Self { db })
    }

    /// Gets or creates a collection.
    pub fn collection(&self, name: &str) -> Result<Collection> {
        if name.trim().is_empty() {
            return Err(RagError::invalid("collection name is required"));
        }
        Ok(Collection { name: name.to_string(), tree: self.db.open_tree(name)? })
    }

    /// Opens a collection that must already hold records.
    pub fn existing_collection(&self, name: &str) -> Result<Collection> {
        let exists = self.db.tree_names().iter().any(|n| n.as_ref() == name.as_bytes());
        if !exists {
            return Err(RagError::StorageUnavailable { path: name.into(), reason: "collection does not exist".into() });
        }
        self.collection(name)
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

pub struct Collection {
    name: String,
    tree: sled::Tree,
}

impl Collection {
    pub fn name(&self) -> &str { &self.name }

    pub fn count(&self) -> usize { self.tree.len() }

    fn dimension(&self) -> Result<Option<usize>> {
        match self.tree.first()? {
            Some((_, bytes)) => Ok(Some(bincode::deserialize::<StoredRecord>(&bytes)?.embedding.len())),
            None => Ok(None),
        }
    }

    /// Fails with `SchemaMismatch` when `corpus` cannot be added to this collection.
    pub fn check_compatible(&self, corpus: &Corpus) -> Result<()> {
        if let (Some(have), Some(incoming)) = (self.dimension()?, corpus.dimension()) {
            if have != incoming {
                return Err(RagError::schema(format!("collection {} has dimension {have}, records have {incoming}", self.name)));
            }
        }
        Ok(())
    }

    /// Adds every record of `corpus`; ids continue after the current count.
    pub fn add(&self, corpus: &Corpus) -> Result<Range<GlobalIndex>> {
        let start = self.count();
        self.check_compatible(corpus)?;
        let mut batch = sled::Batch::default();
        for r in corpus.iter() {
            let index = start + r.index;
            let stored = StoredRecord {
                index: index as u64,
                embedding: r.embedding.to_vec(),
                metadata: r.metadata.clone(),
                content: r.content.to_string(),
            };
            batch.insert(chunk_id(index).as_bytes(), bincode::serialize(&stored)?);
        }
        self.tree.apply_batch(batch)?;
        self.tree.flush()?;
        tracing::info!(collection = %self.name, added = corpus.len(), total = self.count(), "added records to collection");
        Ok(start..start + corpus.len())
    }

    pub fn get(&self, id: &str) -> Result<Option<Record>> {
        Ok(match self.tree.get(id.as_bytes())? {
            Some(bytes) => {
                let s: StoredRecord = bincode::deserialize(&bytes)?;
                Some(Record { embedding: s.embedding, metadata: s.metadata, content: s.content })
            }
            None => None,
        })
    }

    fn load_matching(&self, filter: Option<&WhereFilter>) -> Result<Vec<StoredRecord>> {
        let mut out = Vec::new();
        for item in self.tree.iter() {
            let (_, bytes) = item?;
            let s: StoredRecord = bincode::deserialize(&bytes)?;
            if filter.map_or(true, |w| w.matches(&s.metadata)) {
                out.push(s);
            }
        }
        // keys sort as text (chunk_10 < chunk_2); restore index order
        out.sort_by_key(|s| s.index);
        Ok(out)
    }

    pub fn query(&self, vector: &[f32], n_results: usize, filter: Option<&WhereFilter>) -> Result<Vec<RankedResult>> {
        let matching = self.load_matching(filter)?;
        tracing::debug!(collection = %self.name, matching = matching.len(), total = self.count(), "collection filter applied");
        let view = FilteredView {
            embeddings: matching.iter().map(|s| s.embedding.as_slice()).collect(),
            metadata: matching.iter().map(|s| &s.metadata).collect(),
            contents: matching.iter().map(|s| s.content.as_str()).collect(),
            global_indices: matching.iter().map(|s| s.index as GlobalIndex).collect(),
        };
        rank(vector, &view, n_results)
    }
}

impl VectorSearch for Collection {
    type Filter = WhereFilter;

    fn search(&self, query: &[f32], filter: Option<&WhereFilter>, top_n: usize) -> Result<Vec<RankedResult>> {
        self.query(query, top_n, filter)
    }
}
