//! Path enumeration benchmarks.
//!
//! Run with:
//! ```bash
//! cargo bench --bench enumerate
//! ```

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use whilecov::cfg::Cfg;
use whilecov::expr::{AExp, BExp};
use whilecov::paths::count_k_paths;
use whilecov::stmt::Stmt;

/// A chain of `n` if-statements followed by two nested loops.
fn diamonds_and_loops(n: u32) -> Cfg {
    let x = || AExp::var("x");
    let mut stmts = Vec::new();
    for i in 0..n {
        let label = 3 * i + 1;
        stmts.push(Stmt::if_else(
            label,
            BExp::gt(x(), AExp::cst(i as i64)),
            Stmt::assign(label + 1, "x", AExp::add(x(), AExp::cst(1))),
            Stmt::assign(label + 2, "x", AExp::sub(x(), AExp::cst(1))),
        ));
    }
    let base = 3 * n + 1;
    stmts.push(Stmt::while_do(
        base,
        BExp::gt(x(), AExp::cst(0)),
        Stmt::seq([
            Stmt::assign(base + 1, "y", x()),
            Stmt::while_do(
                base + 2,
                BExp::gt(AExp::var("y"), AExp::cst(0)),
                Stmt::assign(base + 3, "y", AExp::sub(AExp::var("y"), AExp::cst(1))),
            ),
            Stmt::assign(base + 4, "x", AExp::sub(x(), AExp::cst(1))),
        ]),
    ));
    Cfg::build(&Stmt::seq(stmts)).expect("labels are unique")
}

fn bench_k_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("k_paths");
    let cfg = diamonds_and_loops(6);
    for k in [20, 30, 40] {
        let count = count_k_paths(&cfg, k);
        group.throughput(Throughput::Elements(count.try_into().unwrap_or(u64::MAX)));
        group.bench_with_input(BenchmarkId::from_parameter(k), &k, |b, &k| {
            b.iter(|| cfg.k_paths(k).count());
        });
    }
    group.finish();
}

fn bench_loop_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("loop_paths");
    let cfg = diamonds_and_loops(4);
    for i in [1, 2, 3] {
        group.bench_with_input(BenchmarkId::from_parameter(i), &i, |b, &i| {
            b.iter(|| cfg.loop_paths(i).count());
        });
    }
    group.finish();
}

fn bench_count(c: &mut Criterion) {
    let cfg = diamonds_and_loops(10);
    c.bench_function("count_k_paths/100", |b| b.iter(|| count_k_paths(&cfg, 100)));
}

criterion_group!(benches, bench_k_paths, bench_loop_paths, bench_count);
criterion_main!(benches);
