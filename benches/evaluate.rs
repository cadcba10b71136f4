//! Benchmarks for retention evaluation and inventory building.
//!
//! Benchmark targets:
//! - Evaluating 10k digests: <10ms
//! - Building an in-use index from 10k references: <10ms

// Criterion macros generate items without docs - this is expected for benchmarks
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::collections::HashSet;
use std::hint::black_box;

use tagreaper::gc::{MILLIS_PER_DAY, RetentionPolicy, evaluate};
use tagreaper::inventory::{InUseIndex, RawListing, RawManifest, build_inventory};
use tagreaper::models::DigestRecord;

const NOW: i64 = 20_000 * MILLIS_PER_DAY;

fn records(count: usize) -> Vec<DigestRecord> {
    (0..count)
        .map(|i| {
            let age = i64::try_from(i % 365).unwrap_or(0);
            let tags = match i % 3 {
                0 => Vec::new(),
                1 => vec![format!("release-{i}")],
                _ => vec![format!("build-{i}"), format!("sha-{i:08x}")],
            };
            DigestRecord::new(format!("sha256:{i:064x}"), tags, NOW - age * MILLIS_PER_DAY)
        })
        .collect()
}

fn used_tags(count: usize) -> HashSet<String> {
    (0..count).step_by(50).map(|i| format!("release-{i}")).collect()
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");
    let policy = RetentionPolicy::new(10, 30, "^(release|build)-").unwrap_or_default();

    for size in [100, 1_000, 10_000] {
        let records = records(size);
        let used = used_tags(size);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &records, |b, records| {
            b.iter(|| evaluate(black_box(records), black_box(&used), &policy, NOW));
        });
    }

    group.finish();
}

fn bench_build_inventory(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_inventory");

    for size in [1_000_u32, 10_000] {
        let listing = (0..size).fold(RawListing::new("acme/api"), |listing, i| {
            let tag = format!("v{i}");
            listing.with_manifest(
                format!("sha256:{i:064x}"),
                RawManifest::new(&[tag.as_str()], Some(&(NOW - i64::from(i)).to_string())),
            )
        });

        group.throughput(Throughput::Elements(u64::from(size)));
        group.bench_with_input(BenchmarkId::from_parameter(size), &listing, |b, listing| {
            b.iter(|| build_inventory(black_box(listing)));
        });
    }

    group.finish();
}

fn bench_in_use_index(c: &mut Criterion) {
    let references: Vec<String> = (0..10_000)
        .map(|i| match i % 4 {
            0 => format!("gcr.io/acme/svc-{}:v{i}", i % 40),
            1 => format!("gcr.io/acme/svc-{}@sha256:{i:064x}", i % 40),
            2 => format!("docker.io/library/redis:{i}"),
            _ => format!("gcr.io/acme/svc-{}:v{i}@sha256:{i:064x}", i % 40),
        })
        .collect();

    c.bench_function("in_use_index_10k", |b| {
        b.iter(|| InUseIndex::build(black_box(&references), "gcr.io"));
    });
}

criterion_group!(benches, bench_evaluate, bench_build_inventory, bench_in_use_index);
criterion_main!(benches);
