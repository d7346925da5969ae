//! Trampoline throughput benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kerneltron::backend::Interp;

fn bench_recursive_sum(c: &mut Criterion) {
    std::env::set_var("KERNELPATH", env!("CARGO_MANIFEST_DIR"));
    let interp = Interp::new().expect("boot");
    let env = interp.standard_environment();
    interp
        .run_str(
            "($define! sum ($lambda (n) ($if (=? n 0) 0 (+ n (sum (- n 1))))))",
            &env,
        )
        .expect("define");

    c.bench_function("recursive_sum_200", |b| {
        b.iter(|| {
            let result = interp.run_str("(sum 200)", &env).expect("run");
            black_box(result)
        })
    });
}

fn bench_tail_loop(c: &mut Criterion) {
    std::env::set_var("KERNELPATH", env!("CARGO_MANIFEST_DIR"));
    let interp = Interp::new().expect("boot");
    let env = interp.standard_environment();
    interp
        .run_str(
            "($define! loop ($lambda (n) ($if (=? n 0) 0 (loop (- n 1)))))",
            &env,
        )
        .expect("define");

    c.bench_function("tail_loop_1000", |b| {
        b.iter(|| {
            let result = interp.run_str("(loop 1000)", &env).expect("run");
            black_box(result)
        })
    });
}

criterion_group!(benches, bench_recursive_sum, bench_tail_loop);
criterion_main!(benches);
