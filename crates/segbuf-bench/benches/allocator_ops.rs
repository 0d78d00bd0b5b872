//! Criterion micro-benchmarks for allocation, compaction and view access.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use segbuf::{BufferConfig, BufferManager, SegmentAllocator};
use segbuf_bench::{bone_profile, fragmented_manager, BONES_PER_SKELETON};
use segbuf_test_utils::OpDriver;

/// Benchmark: bump-allocate then free 1K segments on a bare allocator.
fn bench_allocator_churn_1k(c: &mut Criterion) {
    c.bench_function("allocator_churn_1k", |b| {
        b.iter(|| {
            let mut alloc = SegmentAllocator::new();
            let segs: Vec<_> = (0..1_000).map(|i| alloc.allocate(1 + i % 7).unwrap()).collect();
            for s in segs.into_iter().rev() {
                alloc.free(s).unwrap();
            }
            black_box(alloc.high_water_mark());
        });
    });
}

/// Benchmark: compact 1K half-freed segments, moving data.
fn bench_defragment_1k(c: &mut Criterion) {
    c.bench_function("defragment_1k", |b| {
        b.iter_batched(
            || fragmented_manager(2_000, 16).0,
            |mut mgr| black_box(mgr.defragment().unwrap()),
            criterion::BatchSize::SmallInput,
        );
    });
}

/// Benchmark: allocate 256 skeletons of 64 bones and write one transform each.
fn bench_bone_skeletons_256(c: &mut Criterion) {
    let identity: [f32; 16] = [
        1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
    ];
    c.bench_function("bone_skeletons_256", |b| {
        b.iter(|| {
            let mut mgr = BufferManager::new(bone_profile()).unwrap();
            let view = mgr.create_view::<[f32; 16]>().unwrap();
            for _ in 0..256 {
                let seg = mgr.allocate(BONES_PER_SKELETON).unwrap();
                view.set(&mut mgr, seg, 0, identity).unwrap();
            }
            black_box(mgr.capacity());
        });
    });
}

/// Benchmark: 1K seeded random operations starting from a tiny store.
fn bench_random_ops_1k(c: &mut Criterion) {
    c.bench_function("random_ops_1k", |b| {
        b.iter(|| {
            let mut mgr =
                BufferManager::new(BufferConfig::default().with_initial_capacity(16)).unwrap();
            let mut driver = OpDriver::new(&mgr, 42, 32).unwrap();
            for _ in 0..1_000 {
                driver.step(&mut mgr).unwrap();
            }
            black_box(mgr.stats().unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_allocator_churn_1k,
    bench_defragment_1k,
    bench_bone_skeletons_256,
    bench_random_ops_1k
);
criterion_main!(benches);
