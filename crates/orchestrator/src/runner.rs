//! Simulation runner with lifecycle management
//!
//! This module provides the `SimulationRunner` which owns a [`Solver`] on a
//! background thread and advances it frame by frame. Parameter updates and
//! resets are queued by the control side and applied between frames, so a
//! frame is never observed half-applied.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use kernel::{
    ErrorMetrics, FrameSnapshot, ParamUpdate, Solver, SolverConfig, StepProfile,
};

use crate::error::{OrchestratorError, Result};

/// Runner state enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerState {
    /// Simulation created but not yet started
    Created,
    /// Simulation actively running
    Running,
    /// Simulation paused
    Paused,
    /// Simulation finished (reached stopping condition or stopped)
    Finished,
}

/// Change queued for the runner thread.
#[derive(Debug, Clone)]
pub enum RunnerCommand {
    /// Single parameter change.
    Update(ParamUpdate),
    /// Replace the whole solver configuration.
    Configure(SolverConfig),
    /// Reset to the initial state.
    Reset,
}

/// When to stop and how fast to go.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunLimits {
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
    /// Cap on frames per second.
    pub frame_rate: Option<f32>,
}

/// Shared state between the runner thread and control interface
struct SharedState {
    /// Current runner state
    state: RunnerState,
    /// Frames completed
    frame: u64,
    /// Current simulation time (seconds)
    sim_time: f64,
    /// Latest published particle state
    snapshot: Arc<FrameSnapshot>,
    /// Diagnostics of the latest snapshot
    metrics: ErrorMetrics,
    /// Timing of the latest frame
    profile: StepProfile,
    /// Commands waiting for the next frame boundary
    pending: Vec<RunnerCommand>,
    /// Most recent rejected command
    error_message: Option<String>,
}

fn lock(shared: &Mutex<SharedState>) -> MutexGuard<'_, SharedState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle for controlling and querying a running simulation
pub struct SimulationRunner {
    /// Shared state (protected by mutex)
    shared: Arc<Mutex<SharedState>>,
    /// Handle to the background thread; yields the solver on exit
    thread_handle: Option<thread::JoinHandle<Solver>>,
}

impl SimulationRunner {
    /// Move `solver` onto a background thread. Nothing runs until [`start`](Self::start).
    pub fn new(solver: Solver, limits: RunLimits) -> Self {
        let shared = Arc::new(Mutex::new(SharedState {
            state: RunnerState::Created,
            frame: solver.frame(),
            sim_time: solver.sim_time(),
            snapshot: Arc::new(solver.snapshot()),
            metrics: solver.error_metrics(),
            profile: StepProfile::default(),
            pending: Vec::new(),
            error_message: None,
        }));

        let shared_clone = Arc::clone(&shared);
        let thread_handle = thread::Builder::new()
            .name("sph2d-runner".to_string())
            .spawn(move || run_simulation_loop(solver, shared_clone, limits));

        match thread_handle {
            Ok(handle) => Self {
                shared,
                thread_handle: Some(handle),
            },
            Err(err) => {
                tracing::error!("failed to spawn simulation thread: {err}");
                lock(&shared).state = RunnerState::Finished;
                Self {
                    shared,
                    thread_handle: None,
                }
            }
        }
    }

    /// Get current runner state
    pub fn state(&self) -> RunnerState {
        lock(&self.shared).state.clone()
    }

    /// Frames completed
    pub fn frame(&self) -> u64 {
        lock(&self.shared).frame
    }

    /// Get current simulation time (seconds)
    pub fn sim_time(&self) -> f64 {
        lock(&self.shared).sim_time
    }

    /// Latest particle state published by the runner thread
    pub fn latest_snapshot(&self) -> Arc<FrameSnapshot> {
        Arc::clone(&lock(&self.shared).snapshot)
    }

    /// Diagnostics of the latest snapshot
    pub fn error_metrics(&self) -> ErrorMetrics {
        lock(&self.shared).metrics
    }

    /// Timing of the latest frame
    pub fn profile(&self) -> StepProfile {
        lock(&self.shared).profile
    }

    /// Message of the most recent rejected command, if any
    pub fn error_message(&self) -> Option<String> {
        lock(&self.shared).error_message.clone()
    }

    /// Start the simulation (transition from Created to Running)
    pub fn start(&self) {
        let mut state = lock(&self.shared);
        if state.state == RunnerState::Created {
            state.state = RunnerState::Running;
        }
    }

    /// Pause the simulation
    pub fn pause(&self) {
        let mut state = lock(&self.shared);
        if state.state == RunnerState::Running {
            state.state = RunnerState::Paused;
        }
    }

    /// Resume the simulation
    pub fn resume(&self) {
        let mut state = lock(&self.shared);
        if state.state == RunnerState::Paused {
            state.state = RunnerState::Running;
        }
    }

    /// Ask the runner thread to exit after the current frame
    pub fn stop(&self) {
        lock(&self.shared).state = RunnerState::Finished;
    }

    /// Queue a command for the next frame boundary
    pub fn send(&self, command: RunnerCommand) {
        lock(&self.shared).pending.push(command);
    }

    /// Queue a single parameter change
    pub fn update(&self, update: ParamUpdate) {
        self.send(RunnerCommand::Update(update));
    }

    /// Queue a reset
    pub fn reset(&self) {
        self.send(RunnerCommand::Reset);
    }

    /// Wait for the simulation thread to complete and take the solver back
    pub fn join(mut self) -> Result<Solver> {
        let handle = self
            .thread_handle
            .take()
            .ok_or(OrchestratorError::ThreadPanicked)?;
        handle.join().map_err(|_| OrchestratorError::ThreadPanicked)
    }
}

impl Drop for SimulationRunner {
    fn drop(&mut self) {
        // Signal the thread to exit, then wait for it
        lock(&self.shared).state = RunnerState::Finished;
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                tracing::warn!("simulation thread panicked during shutdown");
            }
        }
    }
}

fn apply_command(solver: &mut Solver, command: RunnerCommand) -> kernel::Result<()> {
    match command {
        RunnerCommand::Update(update) => solver.apply_update(update),
        RunnerCommand::Configure(config) => solver.apply_config(config),
        RunnerCommand::Reset => {
            solver.reset();
            Ok(())
        }
    }
}

fn publish(solver: &Solver, shared: &Mutex<SharedState>) {
    let snapshot = Arc::new(solver.snapshot());
    let metrics = solver.error_metrics();
    let mut guard = lock(shared);
    guard.frame = solver.frame();
    guard.sim_time = solver.sim_time();
    guard.snapshot = snapshot;
    guard.metrics = metrics;
    guard.profile = solver.last_profile();
}

/// Main simulation loop executed in background thread
fn run_simulation_loop(
    mut solver: Solver,
    shared: Arc<Mutex<SharedState>>,
    limits: RunLimits,
) -> Solver {
    let frame_budget = limits
        .frame_rate
        .filter(|fps| fps.is_finite() && *fps > 0.0)
        .map(|fps| Duration::from_secs_f32(1.0 / fps));
    let start_wall_time = Instant::now();
    let mut frames_run = 0_u64;

    loop {
        // Take state and queued commands in one lock
        let (current_state, commands) = {
            let mut guard = lock(&shared);
            (guard.state.clone(), std::mem::take(&mut guard.pending))
        };

        if !commands.is_empty() {
            for command in commands {
                tracing::debug!(?command, "applying runner command");
                if let Err(err) = apply_command(&mut solver, command) {
                    tracing::warn!("rejected runner command: {err}");
                    lock(&shared).error_message = Some(err.to_string());
                }
            }
            publish(&solver, &shared);
        }

        match current_state {
            RunnerState::Created => {
                thread::sleep(Duration::from_millis(10));
            }
            RunnerState::Running => {
                let frame_start = Instant::now();
                solver.resume();
                if solver.advance_frame() {
                    frames_run += 1;
                    publish(&solver, &shared);
                    if frames_run % 100 == 0 {
                        let profile = solver.last_profile();
                        tracing::debug!(
                            frame = solver.frame(),
                            sim_time = solver.sim_time(),
                            frame_us = profile.total_us,
                            wall_time = start_wall_time.elapsed().as_secs_f64(),
                            "progress"
                        );
                    }
                }

                if let Some(max_frames) = limits.max_frames {
                    if frames_run >= max_frames {
                        tracing::info!("Simulation finished: reached max_frames = {}", max_frames);
                        lock(&shared).state = RunnerState::Finished;
                        break;
                    }
                }

                if let Some(budget) = frame_budget {
                    let spent = frame_start.elapsed();
                    if spent < budget {
                        thread::sleep(budget - spent);
                    }
                }
            }
            RunnerState::Paused => {
                solver.pause();
                thread::sleep(Duration::from_millis(20));
            }
            RunnerState::Finished => break,
        }
    }

    tracing::info!(
        "Simulation thread exiting: {} frames, {:.4}s simulated",
        frames_run,
        solver.sim_time()
    );
    solver
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::ExecutionContext;

    fn small_solver(n: usize) -> Solver {
        let config = SolverConfig {
            particle_count: n,
            substeps: 1,
            ..SolverConfig::default()
        };
        Solver::new(config, Arc::new(ExecutionContext::serial().unwrap())).unwrap()
    }

    fn wait_for(runner: &SimulationRunner, target: RunnerState) {
        let deadline = Instant::now() + Duration::from_secs(30);
        while runner.state() != target {
            assert!(Instant::now() < deadline, "timed out waiting for {target:?}");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_runner_lifecycle() {
        let runner = SimulationRunner::new(
            small_solver(32),
            RunLimits {
                max_frames: Some(10),
                frame_rate: None,
            },
        );

        // Initially Created
        assert_eq!(runner.state(), RunnerState::Created);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(runner.frame(), 0);

        runner.start();
        wait_for(&runner, RunnerState::Finished);
        assert_eq!(runner.frame(), 10);
        assert_eq!(runner.latest_snapshot().frame, 10);

        let solver = runner.join().unwrap();
        assert_eq!(solver.frame(), 10);
    }

    #[test]
    fn test_runner_pause_resume() {
        let runner = SimulationRunner::new(
            small_solver(32),
            RunLimits {
                max_frames: Some(1_000_000),
                frame_rate: Some(500.0),
            },
        );

        runner.start();
        thread::sleep(Duration::from_millis(50));
        runner.pause();
        assert_eq!(runner.state(), RunnerState::Paused);

        // Let an in-flight frame land
        thread::sleep(Duration::from_millis(50));
        let frames_paused = runner.frame();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(
            runner.frame(),
            frames_paused,
            "frames should not advance while paused"
        );

        runner.resume();
        assert_eq!(runner.state(), RunnerState::Running);
        runner.stop();
        let solver = runner.join().unwrap();
        assert!(solver.frame() >= frames_paused);
    }

    #[test]
    fn drop_joins_running_thread() {
        let runner = SimulationRunner::new(small_solver(32), RunLimits::default());
        let shared = Arc::clone(&runner.shared);
        runner.start();
        wait_for(&runner, RunnerState::Running);
        let deadline = Instant::now() + Duration::from_secs(30);
        while runner.frame() == 0 {
            assert!(Instant::now() < deadline, "no frame completed");
            thread::sleep(Duration::from_millis(5));
        }

        let started = Instant::now();
        drop(runner);
        assert!(started.elapsed() < Duration::from_secs(30));
        // The loop's clone of the shared state is gone once the thread has exited.
        assert_eq!(Arc::strong_count(&shared), 1);
        assert_eq!(lock(&shared).state, RunnerState::Finished);
    }

    #[test]
    fn commands_apply_between_frames() {
        let runner = SimulationRunner::new(small_solver(32), RunLimits::default());
        runner.update(ParamUpdate::ParticleCount(48));
        runner.update(ParamUpdate::Dt(-1.0));
        runner.start();

        let deadline = Instant::now() + Duration::from_secs(30);
        while runner.latest_snapshot().len() != 48 {
            assert!(Instant::now() < deadline, "particle count update never applied");
            thread::sleep(Duration::from_millis(5));
        }
        while runner.error_message().is_none() {
            assert!(Instant::now() < deadline, "rejected update never reported");
            thread::sleep(Duration::from_millis(5));
        }
        runner.stop();
        let solver = runner.join().unwrap();
        assert_eq!(solver.positions().len(), 48);
        assert!(solver.config().dt > 0.0);
    }
}
