//! Block write benchmark

use loki_backfill::block::{partition, write_block, ParquetBlockStore};
use loki_backfill::labels::{resolve_labels, LabelSet};
use loki_backfill::matrix::{Matrix, Sample, TimeSeries};

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use object_store::memory::InMemory;
use std::sync::Arc;

const TWO_HOURS_MS: i64 = 7_200_000;
const STEP_MS: i64 = 15_000;

/// `series` series with one sample per step across one block.
fn create_matrix(series: usize) -> Matrix {
    (0..series)
        .map(|i| {
            let labels: LabelSet = [
                ("host".to_string(), format!("server-{:02}", i % 10)),
                ("status".to_string(), ["200", "404", "500"][i % 3].to_string()),
                ("shard".to_string(), i.to_string()),
            ]
            .into_iter()
            .collect();
            let samples = (0..TWO_HOURS_MS / STEP_MS)
                .map(|n| Sample::new(n * STEP_MS, (n as f64 % 100.0) / 100.0))
                .collect();
            TimeSeries::new(labels, samples)
        })
        .collect()
}

fn benchmark_block_write(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let mut group = c.benchmark_group("block_write");
    let rule_labels: LabelSet = [("source".to_string(), "loki".to_string())]
        .into_iter()
        .collect();
    let interval = partition(0, TWO_HOURS_MS - 1, TWO_HOURS_MS)[0];

    for series in [10, 100, 1_000] {
        let matrix = create_matrix(series);
        group.throughput(Throughput::Elements(
            loki_backfill::matrix::sample_count(&matrix) as u64,
        ));

        group.bench_function(format!("{}_series", series), |b| {
            b.to_async(&runtime).iter(|| async {
                let store = ParquetBlockStore::new(Arc::new(InMemory::new()));
                let outcome = write_block(&store, interval, 2 * TWO_HOURS_MS, &matrix, |s| {
                    resolve_labels(s, &rule_labels, "requests_total")
                })
                .await
                .unwrap();
                black_box(outcome)
            });
        });
    }

    group.finish();
}

fn benchmark_partition(c: &mut Criterion) {
    c.bench_function("partition_30d", |b| {
        b.iter(|| black_box(partition(black_box(1_000), 30 * 24 * 3_600_000, TWO_HOURS_MS)))
    });
}

criterion_group!(benches, benchmark_block_write, benchmark_partition);
criterion_main!(benches);
