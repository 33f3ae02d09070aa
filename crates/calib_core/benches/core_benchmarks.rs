//! Criterion benchmarks for calib_core finite differences and factorisations.
//!
//! Measures gradient cost against input dimension for both difference
//! schemes, and the Cholesky whitening factors used by 3D-VAR.

use std::sync::Arc;

use calib_core::math::diff::{FiniteDifferenceGradient, FiniteDifferenceStep};
use calib_core::traits::{Evaluation, FnEvaluation};
use calib_core::types::{CovarianceMatrix, Matrix, Point};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// Smooth test function `F: R^n -> R^n`, `F_j(x) = sin(x_j) + Σ x_i² / n`.
fn smooth_evaluation(n: usize) -> Arc<dyn Evaluation> {
    Arc::new(FnEvaluation::new(n, n, move |x: &Point| {
        let mean_sq = x.norm_squared() / n as f64;
        Ok(x.map(|v| v.sin() + mean_sq))
    }))
}

/// Symmetric positive definite test matrix with unit diagonal and decaying correlation.
fn correlation_matrix(n: usize) -> CovarianceMatrix {
    let m = Matrix::from_fn(n, n, |i, j| 0.5_f64.powi((i as i32 - j as i32).abs()));
    CovarianceMatrix::new(m).unwrap()
}

/// Benchmark gradient evaluation across dimensions.
fn bench_gradient(c: &mut Criterion) {
    let mut group = c.benchmark_group("finite_difference_gradient");

    for n in [2, 10, 50] {
        let x = Point::from_fn(n, |i, _| 0.1 * i as f64);

        let forward =
            FiniteDifferenceGradient::non_centered_uniform(1e-7, smooth_evaluation(n)).unwrap();
        group.bench_with_input(BenchmarkId::new("non_centered", n), &x, |b, x| {
            b.iter(|| forward.gradient(black_box(x)).unwrap());
        });

        let centered =
            FiniteDifferenceGradient::centered(FiniteDifferenceStep::Uniform(1e-5), smooth_evaluation(n))
                .unwrap();
        group.bench_with_input(BenchmarkId::new("centered", n), &x, |b, x| {
            b.iter(|| centered.gradient(black_box(x)).unwrap());
        });
    }

    group.finish();
}

/// Benchmark the whitening factors.
fn bench_cholesky(c: &mut Criterion) {
    let mut group = c.benchmark_group("covariance_factorisation");

    for n in [5, 50, 200] {
        let cov = correlation_matrix(n);
        group.bench_with_input(BenchmarkId::new("cholesky", n), &cov, |b, cov| {
            b.iter(|| black_box(cov).cholesky().unwrap());
        });
        group.bench_with_input(BenchmarkId::new("inverse_cholesky", n), &cov, |b, cov| {
            b.iter(|| black_box(cov).inverse_cholesky().unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_gradient, bench_cholesky);
criterion_main!(benches);
