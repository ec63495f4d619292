//! Benchmark: Decimal Arithmetic
//!
//! Purpose: Measure the overhead the `Decimal` newtype adds over raw
//! `rust_decimal::Decimal` operations on the value path every order, fill,
//! and position update touches.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use exec_core::decimal::Decimal;

fn bench_add(c: &mut Criterion) {
    let a = Decimal::new(15025, 2);
    let b = Decimal::new(375, 2);

    c.bench_function("decimal_add", |bencher| {
        bencher.iter(|| black_box(black_box(a) + black_box(b)));
    });
}

fn bench_mul(c: &mut Criterion) {
    let price = Decimal::new(15025, 2);
    let qty = Decimal::from_i64(10);

    c.bench_function("decimal_mul", |bencher| {
        bencher.iter(|| black_box(black_box(price) * black_box(qty)));
    });
}

fn bench_div(c: &mut Criterion) {
    let total = Decimal::new(150_250_00, 2);
    let qty = Decimal::from_i64(1_000);

    c.bench_function("decimal_div", |bencher| {
        bencher.iter(|| black_box(black_box(total).div(black_box(qty))));
    });
}

fn bench_weighted_average_step(c: &mut Criterion) {
    // The `increase()` hot path in position.rs: avg = (avg*qty + price*tx_qty) / (qty+tx_qty)
    let avg = Decimal::new(15000, 2);
    let qty = Decimal::from_i64(100);
    let price = Decimal::new(15100, 2);
    let tx_qty = Decimal::from_i64(10);

    c.bench_function("decimal_weighted_average_step", |bencher| {
        bencher.iter(|| {
            let new_qty = black_box(qty) + black_box(tx_qty);
            black_box((avg * qty + price * tx_qty).div(new_qty))
        });
    });
}

criterion_group!(benches, bench_add, bench_mul, bench_div, bench_weighted_average_step);
criterion_main!(benches);
