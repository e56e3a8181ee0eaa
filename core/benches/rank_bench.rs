use criterion::{criterion_group, criterion_main, Criterion};
use rag_core::{filter, rank, CompetitionLevel, Corpus, FilterSpec, OfferMetadata, Record};

fn synthetic_corpus(n: usize, dim: usize) -> Corpus {
    let records = (0..n)
        .map(|i| Record {
            embedding: (0..dim).map(|d| ((i * 31 + d * 17) % 97) as f32 / 97.0).collect(),
            metadata: OfferMetadata {
                country: Some(["FR", "DE", "IT", "ES"][i % 4].to_string()),
                salary_eur: Some(2000 + (i % 20) as i64 * 100),
                competition_level: Some(CompetitionLevel::ALL[i % 3]),
                ..Default::default()
            },
            content: String::new(),
        })
        .collect();
    Corpus::from_records(records).expect("uniform dimension")
}

fn bench_filter_and_rank(c: &mut Criterion) {
    let corpus = synthetic_corpus(10_000, 256);
    let query: Vec<f32> = (0..256).map(|d| (d % 7) as f32).collect();
    let spec = FilterSpec { countries: Some(vec!["FR".into(), "DE".into()]), min_salary_eur: Some(2500), ..Default::default() };
    c.bench_function("filter_rank_10k_x_256", |b| b.iter(|| rank(&query, &filter(&corpus, &spec), 10)));
}

criterion_group!(benches, bench_filter_and_rank);
criterion_main!(benches);
