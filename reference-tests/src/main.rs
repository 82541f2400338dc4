//! Reference test binary entry point
//!
//! Runs every reference scenario and exits non-zero if any of them fails.

use reference_tests::{
    DensityCheck, ExpectedResult, FreeFallCheck, PositionBoundsCheck, ReferenceTest, Scene,
    SpeedLimitCheck, TestResult,
};
use std::path::PathBuf;

use kernel::{SeedConfig, SolverConfig};
use orchestrator::SimulationConfig;

/// Scene files live next to the workspace root
fn configs_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../configs")
}

/// Sparse particles falling without touching each other or a wall.
///
/// Every scheme integrates constant acceleration exactly, so the result must
/// match the closed-form trajectory up to f32 rounding.
fn free_fall_test() -> ReferenceTest {
    let config = SimulationConfig {
        name: "free fall".to_string(),
        solver: SolverConfig {
            particle_count: 16,
            dt: 1.0e-3,
            substeps: 4,
            seed: SeedConfig {
                spacing_factor: 10.0,
                ..SeedConfig::default()
            },
            ..SolverConfig::default()
        },
        max_frames: Some(25),
        ..SimulationConfig::default()
    };
    ReferenceTest {
        name: "Free Fall".to_string(),
        scene: Scene::Inline(config),
        frames: 25, // 0.1 s, well clear of the floor
        expected: ExpectedResult {
            finite: true,
            free_fall: Some(FreeFallCheck {
                position_tolerance: 1e-4,
                velocity_tolerance: 1e-3,
            }),
            ..ExpectedResult::default()
        },
    }
}

/// Small serial tank: particles stay inside the walls and finite.
fn small_tank_test() -> ReferenceTest {
    ReferenceTest {
        name: "Small Tank Containment".to_string(),
        scene: Scene::File(configs_dir().join("small_tank.json")),
        frames: 20,
        expected: ExpectedResult {
            position_bounds: Some(PositionBoundsCheck::domain([0.5, 0.5], 1e-6)),
            finite: true,
            speed_limit: Some(SpeedLimitCheck { max_speed: 100.0 }),
            ..ExpectedResult::default()
        },
    }
}

/// Dam break column collapsing under gravity
fn dam_break_test() -> ReferenceTest {
    ReferenceTest {
        name: "Dam Break".to_string(),
        scene: Scene::File(configs_dir().join("dam_break.json")),
        frames: 200,
        expected: ExpectedResult {
            position_bounds: Some(PositionBoundsCheck::domain([1.0, 1.0], 1e-6)),
            finite: true,
            speed_limit: Some(SpeedLimitCheck { max_speed: 100.0 }),
            ..ExpectedResult::default()
        },
    }
}

/// Blob released without gravity: it spreads but must not blow up.
fn zero_gravity_test() -> ReferenceTest {
    ReferenceTest {
        name: "Zero Gravity Drop".to_string(),
        scene: Scene::File(configs_dir().join("zero_gravity_drop.json")),
        frames: 120,
        expected: ExpectedResult {
            position_bounds: Some(PositionBoundsCheck::domain([1.0, 1.0], 1e-6)),
            finite: true,
            speed_limit: Some(SpeedLimitCheck { max_speed: 100.0 }),
            density: Some(DensityCheck { max_variation: 2.0 }),
            ..ExpectedResult::default()
        },
    }
}

/// Get all reference tests
fn all_tests() -> Vec<ReferenceTest> {
    vec![
        free_fall_test(),
        small_tank_test(),
        zero_gravity_test(),
        dam_break_test(),
    ]
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    tracing::info!("2D SPH Reference Test Suite");
    tracing::info!("===========================");

    let tests = all_tests();
    tracing::info!("Found {} reference tests", tests.len());

    let mut results: Vec<TestResult> = Vec::new();
    let mut passed_count = 0;
    let mut failed_count = 0;

    for test in tests {
        match test.run() {
            Ok(result) => {
                if result.passed {
                    passed_count += 1;
                } else {
                    failed_count += 1;
                }
                result.print_summary();
                results.push(result);
            }
            Err(e) => {
                eprintln!("\nERROR running test {}: {}", test.name, e);
                failed_count += 1;
            }
        }
    }

    println!("\n{}", "=".repeat(80));
    println!("OVERALL SUMMARY");
    println!("{}", "=".repeat(80));
    println!("Total tests: {}", passed_count + failed_count);
    println!("Passed: {}", passed_count);
    println!("Failed: {}", failed_count);
    println!("{}", "=".repeat(80));

    if failed_count > 0 {
        std::process::exit(1);
    }
}
