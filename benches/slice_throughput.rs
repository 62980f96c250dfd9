//! Benchmarks for tarlz4
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::Path;
use tarlz4::inventory::PartitionPlan;
use tarlz4::{compress, CompressOptions};
use tempfile::tempdir;

fn build_dataset(root: &Path, files: usize) -> u64 {
    let mut rng = StdRng::seed_from_u64(2024);
    let mut total = 0u64;
    for i in 0..files {
        let dir = root.join(format!("d{:02}", i % 16));
        fs::create_dir_all(&dir).unwrap();
        let size = if i % 25 == 0 { 1 << 20 } else { rng.gen_range(512..32_768) };
        let mut body = vec![b'a'; size];
        rng.fill(&mut body[..size / 3]);
        fs::write(dir.join(format!("f{i:05}.bin")), body).unwrap();
        total += size as u64;
    }
    total
}

fn benchmark_compress_threads(c: &mut Criterion) {
    let data = tempdir().unwrap();
    let src = data.path().join("dataset");
    let total = build_dataset(&src, 400);
    let out = tempdir().unwrap();

    let mut group = c.benchmark_group("compress");
    group.sample_size(10);
    group.throughput(Throughput::Bytes(total));
    for threads in [1usize, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let opts = CompressOptions::new().threads(threads).buffer_size(64 * 1024);
            b.iter(|| {
                let path = compress(&src, out.path(), "bench", &opts).unwrap();
                black_box(path);
            })
        });
    }
    group.finish();
}

fn benchmark_partition_planning(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let sizes: Vec<u64> = (0..100_000).map(|_| rng.gen_range(0..1_000_000)).collect();

    c.bench_function("partition_100k_files_16_slices", |b| {
        b.iter(|| black_box(PartitionPlan::from_sizes(black_box(&sizes), 16)))
    });
}

criterion_group!(benches, benchmark_compress_threads, benchmark_partition_planning);
criterion_main!(benches);
