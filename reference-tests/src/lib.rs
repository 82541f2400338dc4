//! Reference test framework for SPH fluid simulation validation
//!
//! Each reference test loads a scene (from a file under `configs/` or built
//! inline), runs it for a fixed number of frames and validates the final
//! particle state against physical expectations and closed-form solutions.

pub mod analytical;

#[cfg(test)]
mod benchmarks;

use std::path::PathBuf;

use glam::Vec2;
use kernel::{ErrorMetrics, ParticleArrays, SimulationKernel};
use orchestrator::{build_solver, SimulationConfig};

/// Where a reference test takes its scene from
#[derive(Debug, Clone)]
pub enum Scene {
    /// Scene file on disk
    File(PathBuf),
    /// Scene built in code
    Inline(SimulationConfig),
}

impl Scene {
    fn load(&self) -> Result<SimulationConfig, String> {
        match self {
            Scene::File(path) => SimulationConfig::load(path).map_err(|e| e.to_string()),
            Scene::Inline(config) => {
                config.validate().map_err(|e| e.to_string())?;
                Ok(config.clone())
            }
        }
    }
}

/// Expected result criteria for a reference test
#[derive(Debug, Clone, Default)]
pub struct ExpectedResult {
    /// Particle position bounds validation
    pub position_bounds: Option<PositionBoundsCheck>,
    /// Every particle stays finite
    pub finite: bool,
    /// Upper bound on particle speed
    pub speed_limit: Option<SpeedLimitCheck>,
    /// Density window around rest density
    pub density: Option<DensityCheck>,
    /// Agreement with unobstructed ballistic motion
    pub free_fall: Option<FreeFallCheck>,
}

/// Check that particles remain within specified bounds
#[derive(Debug, Clone)]
pub struct PositionBoundsCheck {
    /// Minimum allowed position [x, y]
    pub min: [f32; 2],
    /// Maximum allowed position [x, y]
    pub max: [f32; 2],
}

impl PositionBoundsCheck {
    /// Bounds of a centered box with half-extents `half`, widened by `margin`.
    pub fn domain(half: [f32; 2], margin: f32) -> Self {
        Self {
            min: [-half[0] - margin, -half[1] - margin],
            max: [half[0] + margin, half[1] + margin],
        }
    }
}

/// Check the largest particle speed
#[derive(Debug, Clone)]
pub struct SpeedLimitCheck {
    /// Maximum allowed speed (m/s)
    pub max_speed: f32,
}

/// Check the density range of the finite particles
#[derive(Debug, Clone)]
pub struct DensityCheck {
    /// Maximum allowed relative deviation from rest density
    pub max_variation: f32,
}

/// Check particles against `p0 + v0 t + g t^2 / 2`
#[derive(Debug, Clone)]
pub struct FreeFallCheck {
    /// Absolute position tolerance (m)
    pub position_tolerance: f32,
    /// Absolute velocity tolerance (m/s)
    pub velocity_tolerance: f32,
}

/// Result of running a reference test
#[derive(Debug)]
pub struct TestResult {
    /// Test name
    pub name: String,
    /// Whether test passed
    pub passed: bool,
    /// Individual check results
    pub checks: Vec<CheckResult>,
    /// Final error metrics
    pub error_metrics: ErrorMetrics,
    /// Number of frames executed
    pub frames: u64,
    /// Simulated time (seconds)
    pub sim_time: f64,
}

/// Result of an individual validation check
#[derive(Debug)]
pub struct CheckResult {
    /// Check name
    pub name: String,
    /// Whether check passed
    pub passed: bool,
    /// Error message if failed
    pub message: Option<String>,
}

impl CheckResult {
    fn pass(name: &str, message: String) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            message: Some(message),
        }
    }

    fn fail(name: &str, message: String) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            message: Some(message),
        }
    }
}

/// A reference test case
#[derive(Debug, Clone)]
pub struct ReferenceTest {
    /// Test name
    pub name: String,
    /// Scene to run
    pub scene: Scene,
    /// Number of frames to run
    pub frames: u64,
    /// Expected results to validate
    pub expected: ExpectedResult,
}

impl ReferenceTest {
    /// Run the reference test and return results
    pub fn run(&self) -> Result<TestResult, String> {
        tracing::info!("Running reference test: {}", self.name);

        let config = self.scene.load()?;
        let mut solver = build_solver(&config).map_err(|e| e.to_string())?;
        let initial = solver.particles().clone();
        let gravity = solver.fluid_params().gravity();

        tracing::info!(
            "Initialized: {} particles, h={}, scheme={}",
            solver.particle_count(),
            solver.fluid_params().h,
            config.solver.scheme,
        );

        tracing::info!("Running {} frames...", self.frames);
        for frame in 0..self.frames {
            solver.advance_frame();

            if (frame + 1) % (self.frames / 10).max(1) == 0 {
                let progress = ((frame + 1) as f32 / self.frames as f32) * 100.0;
                tracing::info!("Progress: {:.0}% ({}/{})", progress, frame + 1, self.frames);
            }
        }
        let sim_time = solver.sim_time();
        tracing::info!("Simulation complete: {} frames, {:.6}s simulated", self.frames, sim_time);

        let particles = solver.particles();
        let error_metrics = solver.error_metrics();

        let mut checks = Vec::new();
        if let Some(ref bounds) = self.expected.position_bounds {
            checks.push(validate_position_bounds(particles, bounds));
        }
        if self.expected.finite {
            checks.push(validate_finite(&error_metrics));
        }
        if let Some(ref limit) = self.expected.speed_limit {
            checks.push(validate_speed(&error_metrics, limit));
        }
        if let Some(ref density) = self.expected.density {
            checks.push(validate_density(&error_metrics, density));
        }
        if let Some(ref free_fall) = self.expected.free_fall {
            checks.push(validate_free_fall(
                &initial,
                particles,
                gravity,
                sim_time as f32,
                free_fall,
            ));
        }

        Ok(TestResult {
            name: self.name.clone(),
            passed: checks.iter().all(|c| c.passed),
            checks,
            error_metrics,
            frames: self.frames,
            sim_time,
        })
    }
}

/// Validate that particles remain within specified bounds
fn validate_position_bounds(
    particles: &ParticleArrays,
    bounds: &PositionBoundsCheck,
) -> CheckResult {
    let min = Vec2::from(bounds.min);
    let max = Vec2::from(bounds.max);
    let mut violations = 0;
    let mut max_violation = 0.0_f32;

    for p in &particles.positions {
        let below = (min - *p).max(Vec2::ZERO);
        let above = (*p - max).max(Vec2::ZERO);
        let violation = below.max_element().max(above.max_element());
        // NaN positions fail the comparison below and are left to the finite check.
        if violation > 0.0 {
            violations += 1;
            max_violation = max_violation.max(violation);
        }
    }

    if violations == 0 {
        CheckResult {
            name: "Position Bounds".to_string(),
            passed: true,
            message: None,
        }
    } else {
        CheckResult::fail(
            "Position Bounds",
            format!(
                "{} particles out of bounds (max violation: {:.6} m)",
                violations, max_violation
            ),
        )
    }
}

fn validate_finite(metrics: &ErrorMetrics) -> CheckResult {
    if metrics.non_finite == 0 {
        CheckResult::pass("Finite State", "no NaN or infinite values".to_string())
    } else {
        CheckResult::fail(
            "Finite State",
            format!("{} particles with non-finite state", metrics.non_finite),
        )
    }
}

fn validate_speed(metrics: &ErrorMetrics, check: &SpeedLimitCheck) -> CheckResult {
    let message = format!(
        "Max speed: {:.3} m/s (limit: {:.3} m/s)",
        metrics.max_speed, check.max_speed
    );
    if metrics.max_speed <= check.max_speed {
        CheckResult::pass("Speed Limit", message)
    } else {
        CheckResult::fail("Speed Limit", message)
    }
}

fn validate_density(metrics: &ErrorMetrics, check: &DensityCheck) -> CheckResult {
    let message = format!(
        "Mean: {:.1} kg/m^2, Max variation: {:.1}% (limit: {:.1}%)",
        metrics.mean_density,
        metrics.max_density_variation * 100.0,
        check.max_variation * 100.0
    );
    if metrics.max_density_variation <= check.max_variation {
        CheckResult::pass("Density Variation", message)
    } else {
        CheckResult::fail("Density Variation", message)
    }
}

/// Compare every particle with the closed-form trajectory from its initial state
fn validate_free_fall(
    initial: &ParticleArrays,
    particles: &ParticleArrays,
    gravity: Vec2,
    t: f32,
    check: &FreeFallCheck,
) -> CheckResult {
    if initial.len() != particles.len() {
        return CheckResult::fail(
            "Free Fall",
            format!("particle count changed: {} -> {}", initial.len(), particles.len()),
        );
    }

    let mut max_position_error = 0.0_f32;
    let mut max_velocity_error = 0.0_f32;
    for i in 0..particles.len() {
        let p0 = initial.positions[i];
        let v0 = initial.velocities[i];
        let expected_p = analytical::ballistic_position(p0, v0, gravity, t);
        let expected_v = analytical::ballistic_velocity(v0, gravity, t);
        max_position_error = max_position_error.max((particles.positions[i] - expected_p).length());
        max_velocity_error =
            max_velocity_error.max((particles.velocities[i] - expected_v).length());
    }

    let message = format!(
        "Position error: {:.3e} m, Velocity error: {:.3e} m/s after {:.4} s",
        max_position_error, max_velocity_error, t
    );
    // NaN errors compare false and fail.
    let passed = max_position_error <= check.position_tolerance
        && max_velocity_error <= check.velocity_tolerance;
    if passed {
        CheckResult::pass("Free Fall", message)
    } else {
        CheckResult::fail("Free Fall", message)
    }
}

impl TestResult {
    /// Print a summary of the test result
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(80));
        println!("Test: {}", self.name);
        println!("{}", "=".repeat(80));
        println!("Status: {}", if self.passed { "PASSED" } else { "FAILED" });
        println!("Frames: {}", self.frames);
        println!("Simulated time: {:.6} s", self.sim_time);
        println!("\nError Metrics:");
        println!("  Max density variation: {:.2}%", self.error_metrics.max_density_variation * 100.0);
        println!("  Mean density: {:.1}", self.error_metrics.mean_density);
        println!("  Kinetic energy: {:.4e} J", self.error_metrics.kinetic_energy);
        println!("  Max speed: {:.3} m/s", self.error_metrics.max_speed);
        println!("\nValidation Checks:");
        for check in &self.checks {
            let status = if check.passed { "PASS" } else { "FAIL" };
            print!("  [{}] {}", status, check.name);
            if let Some(ref msg) = check.message {
                print!(" - {}", msg);
            }
            println!();
        }
        println!("{}", "=".repeat(80));
    }
}
