//! End-to-end scenarios: isolated particles, free fall, wall contact and a
//! small dam break.

use std::sync::Arc;

use glam::Vec2;
use kernel::sph::GRAVITY;
use kernel::{ExecutionContext, IntegrationScheme, SeedConfig, Solver, SolverConfig};

fn ctx() -> Arc<ExecutionContext> {
    Arc::new(ExecutionContext::parallel().unwrap())
}

fn explicit(config: SolverConfig, positions: Vec<Vec2>, velocities: Vec<Vec2>) -> Solver {
    Solver::with_initial_state(config, ctx(), positions, velocities).unwrap()
}

#[test]
fn four_corners_keep_rest_density() {
    let positions = vec![
        Vec2::new(-0.5, -0.5),
        Vec2::new(0.5, -0.5),
        Vec2::new(-0.5, 0.5),
        Vec2::new(0.5, 0.5),
    ];
    let config = SolverConfig {
        particle_count: 4,
        scheme: IntegrationScheme::Rk4,
        dt: 1.0e-5,
        substeps: 1,
        gravity_multiplier: 0.0,
        ..SolverConfig::default()
    };
    let half = config.half_extents;
    let mut solver = explicit(config, positions.clone(), vec![Vec2::ZERO; 4]);
    for _ in 0..10 {
        assert!(solver.advance_frame());
    }

    for (i, &rho) in solver.densities().iter().enumerate() {
        assert!((rho - 1000.0).abs() / 1000.0 < 0.05, "particle {i}: rho = {rho}");
    }
    for (i, v) in solver.velocities().iter().enumerate() {
        assert_eq!(*v, Vec2::ZERO, "particle {i} picked up velocity");
    }
    for (p, p0) in solver.positions().iter().zip(&positions) {
        assert_eq!(p, p0, "isolated particle moved");
        assert!(p.x.abs() <= half[0] && p.y.abs() <= half[1], "{p} left the domain");
    }
}

#[test]
fn free_fall_matches_analytic() {
    let dt = 1.0e-3_f32;
    let frames = 5;
    let substeps = 4;
    for scheme in IntegrationScheme::ALL {
        let config = SolverConfig {
            particle_count: 1,
            scheme,
            dt,
            substeps,
            ..SolverConfig::default()
        };
        let mut solver = explicit(config, vec![Vec2::new(0.3, 0.5)], vec![Vec2::ZERO]);
        for _ in 0..frames {
            solver.advance_frame();
        }

        let steps = (frames * substeps) as f32;
        let t = steps * dt;
        let v = solver.velocities()[0];
        let p = solver.positions()[0];
        let expected_v = GRAVITY.y * t;
        let expected_y = 0.5 + 0.5 * GRAVITY.y * t * t;

        assert!(
            (v.y - expected_v).abs() < 1e-5 * expected_v.abs(),
            "{scheme}: v_y = {}, expected {expected_v}",
            v.y
        );
        assert!(
            (p.y - expected_y).abs() < 1e-5,
            "{scheme}: y = {}, expected {expected_y}",
            p.y
        );
        assert_eq!(v.x, 0.0);
        assert_eq!(p.x, 0.3);
        assert!((solver.sim_time() - t as f64).abs() < 1e-6);
    }
}

#[test]
fn floor_contact_reflects_with_restitution() {
    let config = SolverConfig {
        particle_count: 1,
        half_extents: [0.5, 0.5],
        gravity_multiplier: 0.0,
        restitution: 0.5,
        dt: 1.0e-4,
        substeps: 1,
        ..SolverConfig::default()
    };
    let mut solver = explicit(config, vec![Vec2::new(0.0, -0.4999)], vec![Vec2::new(0.0, -2.0)]);
    solver.advance_frame();

    let p = solver.positions()[0];
    let v = solver.velocities()[0];
    assert_eq!(p.y, -0.5);
    assert!((v.y - 1.0).abs() < 1e-6, "v_y = {}", v.y);
}

#[test]
fn dam_break_stays_contained() {
    let config = SolverConfig {
        particle_count: 400,
        particle_radius: 0.01,
        half_extents: [0.5, 0.5],
        dt: 1.0e-4,
        substeps: 4,
        seed: SeedConfig {
            region_min: [0.0, 0.0],
            region_max: [0.5, 0.9],
            ..SeedConfig::default()
        },
        ..SolverConfig::default()
    };
    let mut solver = Solver::new(config, ctx()).unwrap();
    for _ in 0..50 {
        solver.advance_frame();
    }

    let metrics = solver.error_metrics();
    assert_eq!(metrics.non_finite, 0);
    assert!(metrics.mean_density >= 1000.0);
    for p in solver.positions() {
        assert!(p.x.abs() <= 0.5 && p.y.abs() <= 0.5, "escaped the domain: {p}");
    }
    assert_eq!(solver.frame(), 50);
}
