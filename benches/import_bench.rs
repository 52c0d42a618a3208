//! Benchmarks for dc-import
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dc_import::bridge::{ImportBridge, WrappedRecord};
use dc_import::error::BridgeResult;
use dc_import::{ImportConfig, ImportDriver, LoadMode};

/// Containers are unit counts; every unit wraps to its index
struct CountBridge;

impl ImportBridge for CountBridge {
    type Container = usize;
    type SubUnit = usize;
    type Geometry = u64;

    fn sub_units(&self, _: &str, count: &usize) -> BridgeResult<Vec<usize>> {
        Ok((0..*count).collect())
    }

    fn wrap(&self, source_id: &str, _: &usize, unit: usize) -> Option<WrappedRecord<u64>> {
        Some(WrappedRecord::new(source_id, format!("unit_{}", unit), unit as u64))
    }

    fn finalize(&self, _: &str, staged: &u64) -> BridgeResult<u64> {
        Ok(staged.wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }
}

fn benchmark_queue_operations(c: &mut Criterion) {
    use dc_import::import::{WorkItem, WorkQueue};

    c.bench_function("queue_push_pop", |b| {
        let queue = WorkQueue::new();

        b.iter(|| {
            queue.push(WorkItem::new("row_0", 1usize, LoadMode::Import));
            let item = queue.pop_front().unwrap();
            black_box(item);
        })
    });
}

fn benchmark_import_batch(c: &mut Criterion) {
    c.bench_function("import_4x256", |b| {
        b.iter(|| {
            let driver = ImportDriver::new(CountBridge, ImportConfig::auto());
            for row in 0..4 {
                driver.enqueue(format!("row_{}", row), 256, LoadMode::Import);
            }
            black_box(driver.run())
        })
    });

    c.bench_function("reload_4x256", |b| {
        let driver = ImportDriver::new(CountBridge, ImportConfig::auto());
        for row in 0..4 {
            driver.enqueue(format!("row_{}", row), 256, LoadMode::Import);
        }
        driver.run();

        b.iter(|| {
            for row in 0..4 {
                driver.enqueue(format!("row_{}", row), 256, LoadMode::Reload);
            }
            black_box(driver.run())
        })
    });
}

criterion_group!(benches, benchmark_queue_operations, benchmark_import_batch);
criterion_main!(benches);
