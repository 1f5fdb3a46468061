// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Benchmarks for the staging queue.
//!
//! Measures:
//! - Enqueue throughput at different record sizes
//! - Enqueue-then-dequeue cycle for a full batch
//! - `has_pending_data` against a large backlog

use std::hint::black_box;

use bytes::Bytes;
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use telespool_queue::{FileQueue, FlushMode, QueueBuilder, RawCodec, StagedRecord};
use tempfile::TempDir;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

/// Record sizes to benchmark (bytes)
const RECORD_SIZES: &[usize] = &[256, 4096, 65536];

/// Records per enqueue call
const BATCH_SIZE: usize = 100;

fn create_queue(temp_dir: &TempDir, flush_mode: FlushMode) -> FileQueue<StagedRecord, RawCodec> {
    QueueBuilder::new(temp_dir.path())
        .flush_mode(flush_mode)
        .build(RawCodec)
        .expect("Failed to create queue")
}

fn generate_batch(prefix: &str, size: usize) -> Vec<StagedRecord> {
    let payload = Bytes::from(vec![0xABu8; size]);
    (0..BATCH_SIZE)
        .map(|i| StagedRecord::new(format!("{prefix}-{i:06}"), payload.clone()))
        .collect()
}

fn bench_enqueue(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("enqueue_batch");

    for &size in RECORD_SIZES {
        group.throughput(Throughput::Bytes((size * BATCH_SIZE) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let queue = create_queue(&temp_dir, FlushMode::Async);
            let cancel = CancellationToken::new();
            let batch = generate_batch("bench", size);

            // Same keys every iteration: files are replaced, the directory
            // does not grow.
            b.iter(|| {
                rt.block_on(queue.enqueue(black_box(&batch), &cancel))
                    .unwrap();
            });
        });
    }

    group.finish();
}

fn bench_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("enqueue_dequeue");
    group.throughput(Throughput::Elements(BATCH_SIZE as u64));

    for mode in [FlushMode::Async, FlushMode::Sync] {
        group.bench_function(format!("{mode:?}"), |b| {
            let temp_dir = TempDir::new().unwrap();
            let queue = create_queue(&temp_dir, mode);
            let cancel = CancellationToken::new();

            b.iter_batched(
                || generate_batch("rt", 1024),
                |batch| {
                    rt.block_on(async {
                        queue.enqueue(&batch, &cancel).await.unwrap();
                        let out = queue.dequeue_batch(&cancel).await.unwrap();
                        assert_eq!(out.len(), BATCH_SIZE);
                    });
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_has_pending(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let temp_dir = TempDir::new().unwrap();
    let queue = create_queue(&temp_dir, FlushMode::Async);
    let cancel = CancellationToken::new();
    for round in 0..50 {
        rt.block_on(queue.enqueue(&generate_batch(&format!("backlog{round:02}"), 64), &cancel))
            .unwrap();
    }

    c.bench_function("has_pending_data_5000", |b| {
        b.iter(|| black_box(rt.block_on(queue.has_pending_data()).unwrap()));
    });
}

criterion_group!(benches, bench_enqueue, bench_round_trip, bench_has_pending);
criterion_main!(benches);
