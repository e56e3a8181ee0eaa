use crate::corpus::{Corpus, Record};
use crate::error::{RagError, Result};
use crate::metadata::OfferMetadata;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 1;
pub const DEFAULT_CORPUS_FILE: &str = "vie_embeddings.bin";

#[derive(Debug, Serialize, Deserialize)]
struct CorpusFile {
    format_version: u32,
    dimension: u32,
    embeddings: Vec<Vec<f32>>,
    metadata: Vec<OfferMetadata>,
    contents: Vec<String>,
}

/// What `append` does when the corpus file does not exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppendMode {
    /// Start a new corpus from the appended records.
    #[default]
    CreateIfMissing,
    /// Incremental mode: a missing corpus is an error.
    RequireExisting,
}

/// Flat-file corpus store: the three parallel arrays in one bincode file.
/// Sole owner of the corpus persistence side effects.
#[derive(Debug, Clone)]
pub struct CorpusStore {
    path: PathBuf,
}

impl CorpusStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path { &self.path }

    fn tmp_path(&self) -> PathBuf { self.path.with_extension("bin.tmp") }

    pub fn exists(&self) -> bool { self.path.is_file() }

    pub fn load(&self) -> Result<Corpus> {
        let mut f = File::open(&self.path).map_err(|e| self.unavailable(e))?;
        let mut buf = Vec::new();
        f.read_to_end(&mut buf).map_err(|e| self.unavailable(e))?;
        let file: CorpusFile = bincode::deserialize(&buf)?;
        if file.format_version != FORMAT_VERSION {
            return Err(RagError::schema(format!(
                "unsupported corpus format version {} (expected {FORMAT_VERSION})",
                file.format_version
            )));
        }
        let corpus = Corpus::from_parts(file.embeddings, file.metadata, file.contents)?;
        if let Some(dim) = corpus.dimension() {
            if dim as u32 != file.dimension {
                return Err(RagError::schema(format!("header says dimension {}, embeddings have {dim}", file.dimension)));
            }
        }
        tracing::info!(path = %self.path.display(), records = corpus.len(), dimension = file.dimension, "loaded corpus");
        Ok(corpus)
    }

    /// Loads the corpus, substituting an empty one when the file is missing or unreadable.
    /// Schema problems are still returned since they mean the file is corrupt.
    pub fn load_or_empty(&self) -> Result<Corpus> {
        match self.load() {
            Ok(corpus) => Ok(corpus),
            Err(RagError::StorageUnavailable { path, reason }) => {
                tracing::warn!(path = %path.display(), %reason, "corpus unavailable, starting from an empty corpus");
                Ok(Corpus::new())
            }
            Err(e) => Err(e),
        }
    }

    pub fn save(&self, corpus: &Corpus) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let file = CorpusFile {
            format_version: FORMAT_VERSION,
            dimension: corpus.dimension().unwrap_or(0) as u32,
            embeddings: corpus.embeddings().to_vec(),
            metadata: corpus.metadata().to_vec(),
            contents: corpus.contents().to_vec(),
        };
        let bytes = bincode::serialize(&file)?;
        // write then rename so a crash never leaves a truncated corpus behind
        let tmp = self.tmp_path();
        let mut f = File::create(&tmp)?;
        f.write_all(&bytes)?;
        f.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        tracing::info!(path = %self.path.display(), records = corpus.len(), dimension = file.dimension, "saved corpus");
        Ok(())
    }

    /// Appends records after the current last index, persists, and returns the grown corpus.
    pub fn append(&self, records: Vec<Record>, mode: AppendMode) -> Result<Corpus> {
        let added = records.len();
        let mut corpus = match (self.load(), mode) {
            (Ok(corpus), _) => corpus,
            (Err(RagError::StorageUnavailable { path, reason }), AppendMode::CreateIfMissing) => {
                tracing::warn!(path = %path.display(), %reason, "corpus not found, creating a new one");
                Corpus::new()
            }
            (Err(e), _) => return Err(e),
        };
        let range = corpus.extend(records)?;
        self.save(&corpus)?;
        tracing::info!(added, first_index = range.start, total = corpus.len(), "appended records");
        Ok(corpus)
    }

    fn unavailable(&self, e: std::io::Error) -> RagError {
        let reason = match e.kind() {
            ErrorKind::NotFound => "file not found".to_string(),
            _ => e.to_string(),
        };
        RagError::StorageUnavailable { path: self.path.clone(), reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_storage_unavailable() {
        let dir = tempdir().unwrap();
        let store = CorpusStore::new(dir.path().join("absent.bin"));
        assert!(matches!(store.load(), Err(RagError::StorageUnavailable { .. })));
        assert!(store.load_or_empty().unwrap().is_empty());
    }

    #[test]
    fn rejects_unknown_format_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corpus.bin");
        let file = CorpusFile { format_version: 99, dimension: 0, embeddings: vec![], metadata: vec![], contents: vec![] };
        fs::write(&path, bincode::serialize(&file).unwrap()).unwrap();
        assert!(matches!(CorpusStore::new(&path).load(), Err(RagError::SchemaMismatch(_))));
    }
}
