use rag_core::metadata::OfferMetadata;
use rag_core::persist::{AppendMode, CorpusStore};
use rag_core::{CompetitionLevel, Corpus, RagError, Record, RefreshMarker};
use std::collections::BTreeMap;
use tempfile::tempdir;

fn record(i: usize, dim: usize) -> Record {
    let mut extra = BTreeMap::new();
    extra.insert("organization_type".to_string(), "PME".to_string());
    Record {
        embedding: (0..dim).map(|d| (i * dim + d) as f32 * 0.5).collect(),
        metadata: OfferMetadata {
            offer_reference: Some(format!("VIE-{i:04}")),
            country: Some("ESPAGNE".into()),
            duration_months: if i % 2 == 0 { Some(12) } else { None },
            application_rate: Some(i as f64 + 0.25),
            competition_level: Some(CompetitionLevel::Moyenne),
            start_date: Some("non spécifié".into()),
            extra,
            ..Default::default()
        },
        content: format!("offer {i}"),
    }
}

#[test]
fn save_then_load_reproduces_the_corpus() {
    let dir = tempdir().unwrap();
    let store = CorpusStore::new(dir.path().join("nested").join("corpus.bin"));
    let corpus = Corpus::from_records((0..4).map(|i| record(i, 3)).collect()).unwrap();
    store.save(&corpus).unwrap();
    let loaded = store.load().unwrap();
    assert_eq!(loaded, corpus);
    assert_eq!(loaded.metadata()[1].duration_months, None);
    assert_eq!(loaded.metadata()[0].extra.get("organization_type").map(String::as_str), Some("PME"));
}

#[test]
fn append_continues_global_indices() {
    let dir = tempdir().unwrap();
    let store = CorpusStore::new(dir.path().join("corpus.bin"));
    let first = store.append((0..3).map(|i| record(i, 2)).collect(), AppendMode::CreateIfMissing).unwrap();
    assert_eq!(first.len(), 3);
    let grown = store.append(vec![record(3, 2), record(4, 2)], AppendMode::RequireExisting).unwrap();
    assert_eq!(grown.len(), 5);
    assert_eq!(grown.get(3).unwrap().content, "offer 3");
    assert_eq!(grown.get(0).unwrap().content, "offer 0");
    assert_eq!(store.load().unwrap(), grown);
}

#[test]
fn require_existing_fails_without_a_corpus() {
    let dir = tempdir().unwrap();
    let store = CorpusStore::new(dir.path().join("missing.bin"));
    let err = store.append(vec![record(0, 2)], AppendMode::RequireExisting).unwrap_err();
    assert!(matches!(err, RagError::StorageUnavailable { .. }));
    assert!(!store.exists());
}

#[test]
fn append_with_wrong_dimension_leaves_file_untouched() {
    let dir = tempdir().unwrap();
    let store = CorpusStore::new(dir.path().join("corpus.bin"));
    store.append(vec![record(0, 2)], AppendMode::CreateIfMissing).unwrap();
    let err = store.append(vec![record(1, 3)], AppendMode::RequireExisting).unwrap_err();
    assert!(matches!(err, RagError::SchemaMismatch(_)));
    assert_eq!(store.load().unwrap().len(), 1);
}

#[test]
fn refresh_marker_round_trip() {
    let dir = tempdir().unwrap();
    let marker = RefreshMarker::new(dir.path().join("Last_refresh"));
    assert_eq!(marker.last_refresh(), rag_core::refresh::earliest());
    let written = marker.mark_refreshed().unwrap();
    let read = marker.last_refresh();
    // the marker keeps milliseconds only
    let diff = (written - read).whole_milliseconds().abs();
    assert!(diff < 1, "written {written}, read {read}");
    assert!(read > rag_core::refresh::earliest());
}
