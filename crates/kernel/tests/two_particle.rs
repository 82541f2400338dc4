//! Two-particle symmetry test.
//!
//! Verifies Newton's 3rd law (forces equal and opposite) and momentum
//! conservation for a pair of particles inside each other's support.

use std::sync::Arc;

use glam::Vec2;
use kernel::{ExecutionContext, IntegrationScheme, Solver, SolverConfig};

/// Two particles separated by `distance` along the x-axis, at rest, without gravity.
fn two_particles(distance: f32, scheme: IntegrationScheme) -> Solver {
    let config = SolverConfig {
        particle_count: 2,
        particle_radius: 0.005, // h = 0.02
        gravity_multiplier: 0.0,
        substeps: 1,
        dt: 1.0e-5,
        scheme,
        ..SolverConfig::default()
    };
    let positions = vec![Vec2::new(-0.5 * distance, 0.0), Vec2::new(0.5 * distance, 0.0)];
    let velocities = vec![Vec2::ZERO; 2];
    let ctx = Arc::new(ExecutionContext::serial().unwrap());
    Solver::with_initial_state(config, ctx, positions, velocities).unwrap()
}

#[test]
fn forces_equal_and_opposite() {
    for scheme in IntegrationScheme::ALL {
        let mut solver = two_particles(0.01, scheme);
        assert!(solver.advance_frame());

        let v = solver.velocities();
        // Compressed pair: pushed apart along x.
        assert!(v[0].x < 0.0, "{scheme}: left particle should move left, v = {}", v[0]);
        assert!(v[1].x > 0.0, "{scheme}: right particle should move right, v = {}", v[1]);

        let momentum = v[0] + v[1];
        assert!(
            momentum.length() <= 1e-6 * v[0].length(),
            "{scheme}: momentum not conserved: {momentum}"
        );
        assert_eq!(v[0].y, 0.0);
        assert_eq!(v[1].y, 0.0);
    }
}

#[test]
fn pair_density_includes_neighbor() {
    let mut solver = two_particles(0.01, IntegrationScheme::Rk4);
    solver.advance_frame();
    let rho = solver.densities();
    assert_eq!(rho[0], rho[1]);
    // rho0 * (1 + (1 - 0.25)^3) at the final stage, slightly separated by then.
    assert!(rho[0] > 1000.0 && rho[0] < 1000.0 * (1.0 + 0.421_875) + 1.0, "rho = {}", rho[0]);
    assert!(solver.pressures()[0] > 0.0);
}

#[test]
fn separated_pair_does_not_interact() {
    let mut solver = two_particles(0.05, IntegrationScheme::Rk4);
    for _ in 0..5 {
        solver.advance_frame();
    }
    assert!(solver.velocities().iter().all(|v| *v == Vec2::ZERO));
    assert_eq!(solver.densities(), &[1000.0, 1000.0]);
    assert_eq!(solver.pressures(), &[0.0, 0.0]);
}

#[test]
fn viscosity_damps_relative_motion() {
    let config = SolverConfig {
        particle_count: 2,
        particle_radius: 0.005,
        gravity_multiplier: 0.0,
        stiffness: 0.0,
        viscosity: 1.0,
        substeps: 1,
        dt: 1.0e-5,
        ..SolverConfig::default()
    };
    // Sliding past each other vertically, inside the support.
    let positions = vec![Vec2::new(-0.004, 0.0), Vec2::new(0.004, 0.0)];
    let velocities = vec![Vec2::new(0.0, 1.0), Vec2::new(0.0, -1.0)];
    let ctx = Arc::new(ExecutionContext::serial().unwrap());
    let mut solver = Solver::with_initial_state(config, ctx, positions, velocities).unwrap();
    solver.advance_frame();

    let v = solver.velocities();
    assert!(v[0].y < 1.0 && v[0].y > 0.0, "v0 = {}", v[0]);
    assert!((v[0].y + v[1].y).abs() < 1e-6);
}

#[test]
fn near_pressure_separates_pair_without_stiffness() {
    let run = |near_pressure: f32| {
        let config = SolverConfig {
            particle_count: 2,
            particle_radius: 0.005,
            gravity_multiplier: 0.0,
            stiffness: 0.0,
            viscosity: 0.0,
            near_pressure,
            substeps: 1,
            dt: 1.0e-5,
            ..SolverConfig::default()
        };
        let positions = vec![Vec2::new(-0.003, 0.0), Vec2::new(0.003, 0.0)];
        let ctx = Arc::new(ExecutionContext::serial().unwrap());
        let mut solver =
            Solver::with_initial_state(config, ctx, positions, vec![Vec2::ZERO; 2]).unwrap();
        solver.advance_frame();
        solver.velocities().to_vec()
    };

    // Zero stiffness: pressure is zero, so nothing moves without the near term.
    assert!(run(0.0).iter().all(|v| *v == Vec2::ZERO));

    let v = run(10.0);
    assert!(v[0].x < 0.0 && v[1].x > 0.0, "v = {v:?}");
    assert!((v[0] + v[1]).length() <= 1e-6 * v[0].length());
}
