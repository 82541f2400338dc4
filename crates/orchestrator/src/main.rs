//! `sph2d`: headless driver for the 2D SPH solver.
//!
//! Loads a scene file (or the built-in defaults), applies command-line
//! overrides, runs the requested number of frames on the background runner
//! and prints a JSON report of the final state.

use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use kernel::{ErrorMetrics, ExecutorKind, IntegrationScheme, StepProfile};
use orchestrator::{build_solver, run_limits, RunnerState, SimulationConfig, SimulationRunner};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FRAMES: u64 = 240;

#[derive(Debug, Parser)]
#[command(name = "sph2d", version, about = "Run a 2D SPH fluid scene headless")]
struct Cli {
    /// Scene file (JSON); built-in defaults when omitted
    config: Option<PathBuf>,

    /// Frames to run (overrides the scene's max_frames)
    #[arg(short, long)]
    frames: Option<u64>,

    /// Integration scheme: verlet, rk2, pc or rk4
    #[arg(short, long)]
    scheme: Option<IntegrationScheme>,

    /// Particle count
    #[arg(short = 'n', long)]
    particles: Option<usize>,

    /// Physics steps per frame
    #[arg(long)]
    substeps: Option<u32>,

    /// Worker threads (0 = one per core)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Run every dispatch on the calling thread
    #[arg(long)]
    serial: bool,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Seconds between progress log lines
    #[arg(long, default_value_t = 1.0)]
    progress_interval: f32,
}

#[derive(Debug, Serialize)]
struct RunReport {
    name: String,
    scheme: String,
    particles: usize,
    frames: u64,
    sim_time: f64,
    wall_seconds: f64,
    frames_per_second: f64,
    metrics: ErrorMetrics,
    last_frame: StepProfile,
}

fn apply_overrides(cli: &Cli, config: &mut SimulationConfig) {
    if let Some(frames) = cli.frames {
        config.max_frames = Some(frames);
    }
    if config.max_frames.is_none() {
        config.max_frames = Some(DEFAULT_FRAMES);
    }
    if let Some(scheme) = cli.scheme {
        config.solver.scheme = scheme;
    }
    if let Some(n) = cli.particles {
        config.solver.particle_count = n;
    }
    if let Some(substeps) = cli.substeps {
        config.solver.substeps = substeps;
    }
    if let Some(threads) = cli.threads {
        config.context.threads = threads;
    }
    if cli.serial {
        config.context.executor = ExecutorKind::Serial;
    }
}

fn run(cli: Cli) -> orchestrator::Result<()> {
    let mut config = match &cli.config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };
    apply_overrides(&cli, &mut config);
    tracing::info!("Scene: {}", config.name);

    let solver = build_solver(&config)?;
    let particles = solver.positions().len();
    let scheme = solver.config().scheme;
    let runner = SimulationRunner::new(solver, run_limits(&config));

    let wall_start = Instant::now();
    let interval = Duration::from_secs_f32(cli.progress_interval.max(0.05));
    let mut next_log = wall_start + interval;
    runner.start();
    while runner.state() != RunnerState::Finished {
        thread::sleep(Duration::from_millis(10));
        if Instant::now() >= next_log {
            let metrics = runner.error_metrics();
            tracing::info!(
                frame = runner.frame(),
                sim_time = runner.sim_time(),
                max_density_variation = metrics.max_density_variation,
                max_speed = metrics.max_speed,
                "progress"
            );
            next_log += interval;
        }
    }
    let wall_seconds = wall_start.elapsed().as_secs_f64();
    let solver = runner.join()?;

    let metrics = solver.error_metrics();
    if metrics.non_finite > 0 {
        tracing::warn!("{} particles left the finite range", metrics.non_finite);
    }
    let report = RunReport {
        name: config.name.clone(),
        scheme: scheme.to_string(),
        particles,
        frames: solver.frame(),
        sim_time: solver.sim_time(),
        wall_seconds,
        frames_per_second: solver.frame() as f64 / wall_seconds.max(1e-9),
        metrics,
        last_frame: solver.last_profile(),
    };

    let json = serde_json::to_string_pretty(&report).map_err(|source| {
        orchestrator::OrchestratorError::Json {
            path: cli.report.clone().unwrap_or_else(|| PathBuf::from("<stdout>")),
            source,
        }
    })?;
    match &cli.report {
        Some(path) => {
            std::fs::write(path, json).map_err(|source| orchestrator::OrchestratorError::Io {
                path: path.clone(),
                source,
            })?;
            tracing::info!("Report written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sph2d=info,orchestrator=info,kernel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
