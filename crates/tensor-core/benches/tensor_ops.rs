// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for tensor buffer allocation and cloning.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tensor_core::{TensorType, TensorsData, TensorsInfo};

fn image_info() -> TensorsInfo {
    TensorsInfo::from_specs(&[(TensorType::Float32, &[1, 3, 224, 224])]).unwrap()
}

fn bench_allocate(c: &mut Criterion) {
    let info = image_info();
    c.bench_function("tensors_data_new_1x3x224x224_f32", |b| {
        b.iter(|| TensorsData::new(black_box(&info)).unwrap())
    });
}

fn bench_clone(c: &mut Criterion) {
    let data = TensorsData::new(&image_info()).unwrap();
    c.bench_function("tensors_data_try_clone_1x3x224x224_f32", |b| {
        b.iter(|| black_box(&data).try_clone().unwrap())
    });
}

criterion_group!(benches, bench_allocate, bench_clone);
criterion_main!(benches);
