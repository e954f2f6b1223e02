//! Criterion benchmarks for elementwise vector addition.
//!
//! Run with `cargo bench`.  The GPU benchmark includes the cost of
//! allocating the result buffer, submitting the launch and waiting for
//! completion, which makes it representative of the real latency of a
//! single synchronous `add`.  The CPU reference backend is benchmarked
//! alongside it; on machines without a GPU adapter only the CPU benchmark
//! runs.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::Rng;

use device_vector::{CpuBackend, DeviceVector, WgpuBackend};

const N: usize = 1_000_000;

fn random_values(n: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..n).map(|_| rng.gen()).collect()
}

fn gpu_add_benchmark(c: &mut Criterion) {
    env_logger::try_init().ok();
    // Build the backend once up front so device and pipeline creation
    // overhead is excluded from the measurement.
    let backend = match WgpuBackend::new_blocking() {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            eprintln!("skipping GPU benchmark: {e}");
            return;
        }
    };
    let a = DeviceVector::from_host(&backend, &random_values(N)).unwrap();
    let b = DeviceVector::from_host(&backend, &random_values(N)).unwrap();
    c.bench_function("gpu_add_1m", |bencher| {
        bencher.iter(|| black_box(a.add(&b).unwrap()));
    });
}

fn cpu_add_benchmark(c: &mut Criterion) {
    let backend = Arc::new(CpuBackend::new());
    let a = DeviceVector::from_host(&backend, &random_values(N)).unwrap();
    let b = DeviceVector::from_host(&backend, &random_values(N)).unwrap();
    c.bench_function("cpu_add_1m", |bencher| {
        bencher.iter(|| black_box(a.add(&b).unwrap()));
    });
}

criterion_group!(benches, gpu_add_benchmark, cpu_add_benchmark);
criterion_main!(benches);
