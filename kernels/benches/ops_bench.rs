use criterion::{criterion_group, criterion_main, Criterion};
use encoder_rs_kernels::{cpu_matmul, cpu_softmax, cpu_transpose};
use std::hint::black_box;

fn benchmark_matmul(c: &mut Criterion) {
    let mut group = c.benchmark_group("matmul");

    // Attention-score shaped products: [B, H, S, D] x [B, H, D, S]
    for &(heads, seq, d_k) in &[(8, 64, 64), (8, 128, 64), (16, 128, 32)] {
        let lhs_shape = [1, heads, seq, d_k];
        let rhs_shape = [1, heads, d_k, seq];
        let lhs = vec![0.5f32; heads * seq * d_k];
        let rhs = vec![0.25f32; heads * seq * d_k];

        group.bench_function(format!("h{}_s{}_d{}", heads, seq, d_k), |b| {
            b.iter(|| {
                cpu_matmul(
                    black_box(&lhs),
                    black_box(&rhs),
                    black_box(&lhs_shape),
                    black_box(&rhs_shape),
                )
                .unwrap()
            })
        });
    }
    group.finish();
}

fn benchmark_transpose(c: &mut Criterion) {
    let mut group = c.benchmark_group("transpose");

    for &size in &[128, 512, 1024] {
        let shape = [size, size];
        let data = vec![1.0f32; size * size];

        group.bench_function(format!("{}x{}", size, size), |b| {
            b.iter(|| cpu_transpose(black_box(&data), black_box(&shape)).unwrap())
        });
    }
    group.finish();
}

fn benchmark_softmax(c: &mut Criterion) {
    let mut group = c.benchmark_group("softmax");

    for &(rows, row_len) in &[(8 * 128, 128), (16 * 512, 512)] {
        let data: Vec<f32> = (0..rows * row_len).map(|i| (i as f32 * 0.01).sin()).collect();

        group.bench_function(format!("{}x{}", rows, row_len), |b| {
            b.iter(|| cpu_softmax(black_box(&data), black_box(row_len)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_matmul, benchmark_transpose, benchmark_softmax);
criterion_main!(benches);
