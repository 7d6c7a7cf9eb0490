//! # Solve Benchmark

use criterion::{criterion_group, criterion_main, Criterion};

use mpc_lib::mpc_ctrl::{PanocSolver, Params, TrajectoryOptimizer};

fn solve_benchmark(c: &mut Criterion) {
    // ---- Build the optimizer from the shipped parameters ----

    let params: Params = util::params::from_str(include_str!("../../params/mpc_ctrl.toml"))
        .unwrap();
    let solver = PanocSolver::new(params.solver);
    let optimizer = TrajectoryOptimizer::new(params, solver).unwrap();

    // On the reference at the target speed
    let on_track = [0.0, 0.0, 0.0, 40.0, 0.0, 0.0];

    // Offset 5 m from a straight reference
    let offset = [0.0, 0.0, 0.0, 40.0, 5.0, 0.0];
    let offset_coeffs = [5.0, 0.0, 0.0, 0.0];

    c.bench_function("TrajectoryOptimizer::solve::equilibrium", |b| {
        b.iter(|| optimizer.solve(&on_track, &[0.0; 4], None).unwrap())
    });

    c.bench_function("TrajectoryOptimizer::solve::offset", |b| {
        b.iter(|| optimizer.solve(&offset, &offset_coeffs, None).unwrap())
    });
}

criterion_group!(benches, solve_benchmark);
criterion_main!(benches);
