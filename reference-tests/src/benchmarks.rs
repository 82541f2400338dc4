//! Long-running validation benchmarks.
//!
//! These are marked with `#[ignore]` so they only run when explicitly
//! requested via:
//!
//! ```sh
//! cargo test --release -p sph2d-reference-tests -- --ignored
//! ```

use std::sync::Arc;
use std::time::Instant;

use kernel::{ContextConfig, ExecutionContext, IntegrationScheme, Solver, SolverConfig};
use orchestrator::SimulationConfig;

/// Resolve a path relative to the workspace root.
fn project_path(relative: &str) -> std::path::PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    std::path::Path::new(manifest_dir)
        .parent()
        .expect("Could not find project root")
        .join(relative)
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .try_init();
}

/// Rightmost particle x coordinate
fn front_position(solver: &Solver) -> f32 {
    solver
        .positions()
        .iter()
        .map(|p| p.x)
        .fold(f32::NEG_INFINITY, f32::max)
}

/// Dam break front advance, per integration scheme.
///
/// The column starts in the left half of the tank. Under gravity and its own
/// pressure it collapses and the front runs along the floor, so for every
/// scheme the front must move right while every particle stays in the tank.
#[test]
#[ignore]
fn benchmark_dam_break_front() {
    init_logging();

    let scene = SimulationConfig::load(project_path("configs/dam_break.json"))
        .expect("dam break scene");
    let half = scene.solver.half_extents;
    let frames = 300;

    println!("\n  {:>8} {:>10} {:>10} {:>10} {:>10}", "scheme", "t (s)", "front0", "front", "wall (s)");
    for scheme in IntegrationScheme::ALL {
        let config = SolverConfig {
            particle_count: 2048,
            particle_radius: 0.01,
            scheme,
            ..scene.solver.clone()
        };
        let ctx = Arc::new(ExecutionContext::new(&scene.context).expect("context"));
        let mut solver = Solver::new(config, ctx).expect("solver");

        let front0 = front_position(&solver);
        let wall = Instant::now();
        for _ in 0..frames {
            solver.advance_frame();
        }
        let front = front_position(&solver);
        let metrics = solver.error_metrics();

        println!(
            "  {:>8} {:>10.4} {:>10.4} {:>10.4} {:>10.2}",
            scheme.name(),
            solver.sim_time(),
            front0,
            front,
            wall.elapsed().as_secs_f64()
        );

        assert_eq!(metrics.non_finite, 0, "{scheme}: non-finite particles");
        assert!(front > front0, "{scheme}: front did not advance ({front0} -> {front})");
        for p in solver.positions() {
            assert!(
                p.x.abs() <= half[0] && p.y.abs() <= half[1],
                "{scheme}: particle escaped the tank at {p}"
            );
        }
    }
}

/// Frame throughput of the serial and parallel executors on the same scene.
///
/// Both executors must produce bit-identical particle state.
#[test]
#[ignore]
fn benchmark_executor_throughput() {
    init_logging();

    let scene = SimulationConfig::load(project_path("configs/dam_break.json"))
        .expect("dam break scene");
    let frames = 50;

    let mut results = Vec::new();
    for (label, context) in [
        ("serial", ContextConfig::serial()),
        ("parallel", scene.context.clone()),
    ] {
        let ctx = Arc::new(ExecutionContext::new(&context).expect("context"));
        let mut solver = Solver::new(scene.solver.clone(), ctx).expect("solver");
        let wall = Instant::now();
        for _ in 0..frames {
            solver.advance_frame();
        }
        let seconds = wall.elapsed().as_secs_f64();
        println!(
            "  {:>8}: {} frames in {:.2} s ({:.1} frames/s, {} threads)",
            label,
            frames,
            seconds,
            frames as f64 / seconds.max(1e-9),
            solver.context().thread_count()
        );
        results.push(solver.positions().to_vec());
    }

    assert_eq!(results[0], results[1], "executors diverged");
}
