//! The core numeric properties, run against the real wgpu backend.
//!
//! Each test skips (with a note on stderr) when no GPU adapter is
//! available, so the suite stays green on headless CI machines; the same
//! properties are checked deterministically in `tests/vector.rs`.

use std::sync::Arc;

use device_vector::{ComputeBackend, ComputeError, DeviceVector, WgpuBackend};

fn gpu() -> Option<Arc<WgpuBackend>> {
    let _ = env_logger::builder().is_test(true).try_init();
    match WgpuBackend::new_blocking() {
        Ok(backend) => Some(Arc::new(backend)),
        Err(e) => {
            eprintln!("skipping GPU test: {e}");
            None
        }
    }
}

#[test]
fn round_trip_identity() {
    let Some(backend) = gpu() else { return };
    let values: Vec<f32> = (0..10_000).map(|i| i as f32 * 0.25 - 1000.0).collect();
    let vector = DeviceVector::from_host(&backend, &values).unwrap();
    assert_eq!(vector.to_host().unwrap(), values);
}

#[test]
fn add_matches_host_arithmetic_exactly() {
    let Some(backend) = gpu() else { return };
    // Deliberately not a multiple of any chunk size, so the tail guard in
    // the kernel is exercised.
    let n = 4099;
    let a_values: Vec<f32> = (0..n).map(|i| (i as f32).sin()).collect();
    let b_values: Vec<f32> = (0..n).map(|i| (i as f32).cos() + 0.1).collect();
    let a = DeviceVector::from_host(&backend, &a_values).unwrap();
    let b = DeviceVector::from_host(&backend, &b_values).unwrap();
    let sum = a.add(&b).unwrap().to_host().unwrap();
    for i in 0..n {
        assert_eq!(sum[i].to_bits(), (a_values[i] + b_values[i]).to_bits());
    }
}

#[test]
fn divide_follows_ieee_special_cases() {
    let Some(backend) = gpu() else { return };
    let a = DeviceVector::from_host(&backend, &[1.0, -1.0, 0.0, 6.0]).unwrap();
    let b = DeviceVector::from_host(&backend, &[0.0, 0.0, 0.0, 3.0]).unwrap();
    let quotient = a.divide(&b).unwrap().to_host().unwrap();
    assert_eq!(quotient[0], f32::INFINITY);
    assert_eq!(quotient[1], f32::NEG_INFINITY);
    assert!(quotient[2].is_nan());
    assert_eq!(quotient[3], 2.0);
}

#[test]
fn worked_scenario() {
    let Some(backend) = gpu() else { return };
    let a = DeviceVector::from_host(&backend, &[-4.0, -2.0, 0.0, 2.0, 4.0]).unwrap();
    let b = DeviceVector::from_host(&backend, &[4.0; 5]).unwrap();
    let c = DeviceVector::from_host(&backend, &[2.0; 5]).unwrap();
    let result = a.add(&b).unwrap().divide(&c).unwrap().to_host().unwrap();
    assert_eq!(result, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn chunk_size_does_not_change_results() {
    let Some(backend) = gpu() else { return };
    let n = 4099;
    let a_values: Vec<f32> = (0..n).map(|i| (i as f32).sin()).collect();
    let b_values: Vec<f32> = (0..n).map(|i| (i as f32).cos() + 0.1).collect();
    let mut outputs = Vec::new();
    for chunk_size in [32, 256, 1024] {
        let a = DeviceVector::from_host(&backend, &a_values)
            .unwrap()
            .with_chunk_size(chunk_size);
        let b = DeviceVector::from_host(&backend, &b_values).unwrap();
        let bits: Vec<u32> = a
            .add(&b)
            .unwrap()
            .to_host()
            .unwrap()
            .iter()
            .map(|v| v.to_bits())
            .collect();
        outputs.push(bits);
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[1], outputs[2]);
}

#[test]
fn self_application_and_release() {
    let Some(backend) = gpu() else { return };
    let mut a = DeviceVector::from_host(&backend, &[1.0, 2.0, 3.0]).unwrap();
    assert_eq!(a.add(&a).unwrap().to_host().unwrap(), vec![2.0, 4.0, 6.0]);
    a.release();
    a.release();
    assert!(matches!(a.to_host(), Err(ComputeError::UseAfterRelease)));
}

#[test]
fn zero_length_round_trip() {
    let Some(backend) = gpu() else { return };
    let a = DeviceVector::from_host(&backend, &[]).unwrap();
    let b = DeviceVector::from_host(&backend, &[]).unwrap();
    assert_eq!(a.add(&b).unwrap().to_host().unwrap(), Vec::<f32>::new());
}

#[test]
fn drops_return_live_count_to_baseline() {
    let Some(backend) = gpu() else { return };
    let baseline = backend.live_buffer_count();
    {
        let a = DeviceVector::from_host(&backend, &[1.0; 256]).unwrap();
        let mut result = a.add(&a).unwrap();
        for _ in 0..10 {
            result = result.add(&a).unwrap();
        }
        assert!(backend.live_buffer_count() > baseline);
    }
    assert_eq!(backend.live_buffer_count(), baseline);
}
