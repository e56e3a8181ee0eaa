//! Filtered similarity ranking over an embedded job-offer corpus.
//!
//! The pipeline is: load a [`Corpus`] through a [`CorpusStore`], narrow it with
//! a [`FilterSpec`] (and optionally a parsed [`DateRange`]), [`rank`] the
//! survivors against a query vector, then [`summarize`] the ranked results.

pub mod collection;
pub mod corpus;
pub mod dates;
pub mod error;
pub mod filter;
pub mod metadata;
pub mod persist;
pub mod rank;
pub mod refresh;
pub mod report;
pub mod stats;
pub mod where_filter;

pub use corpus::{Corpus, GlobalIndex, Record, RecordRef};
pub use error::{RagError, Result};
pub use filter::{filter, filter_by_date_range, DateBounds, DateRange, FilterSpec, FilteredView};
pub use metadata::{CompetitionLevel, OfferMetadata};
pub use persist::{AppendMode, CorpusStore};
pub use rank::{cosine_similarity, rank, search, search_text, Embedder, RankedResult, VectorSearch};
pub use refresh::RefreshMarker;
pub use stats::{summarize, Statistics};
pub use where_filter::WhereFilter;
