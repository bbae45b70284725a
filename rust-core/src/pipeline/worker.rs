//! Cancellable worker threads
//!
//! Each pipeline stage runs its loop on a dedicated thread. Cancellation is
//! cooperative: the stop flag is checked once per iteration, and an iteration
//! that has begun always runs to completion.

use crate::error::{PipelineError, Result};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Lifecycle of a worker. Transitions are monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    StopRequested,
    Stopped,
}

const RUNNING: u8 = 0;
const STOP_REQUESTED: u8 = 1;
const STOPPED: u8 = 2;

/// Atomic worker state shared between the owner and the loop thread
#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(RUNNING))
    }

    fn load(&self) -> WorkerState {
        match self.0.load(Ordering::SeqCst) {
            RUNNING => WorkerState::Running,
            STOP_REQUESTED => WorkerState::StopRequested,
            _ => WorkerState::Stopped,
        }
    }

    fn request_stop(&self) {
        // Only Running may move to StopRequested; Stopped stays Stopped
        let _ = self
            .0
            .compare_exchange(RUNNING, STOP_REQUESTED, Ordering::SeqCst, Ordering::SeqCst);
    }

    fn mark_stopped(&self) {
        self.0.store(STOPPED, Ordering::SeqCst);
    }
}

/// Marks the worker stopped when the loop thread exits, including by panic
struct StoppedOnExit(Arc<StateCell>);

impl Drop for StoppedOnExit {
    fn drop(&mut self) {
        self.0.mark_stopped();
    }
}

/// Outcome of one loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep looping (also returned after an idle poll)
    Continue,
    /// The stage has nothing more to do
    Finished,
}

/// A pipeline stage driven by a [`CancellableWorker`]
///
/// `step` must not block longer than the stage's poll interval, so that a
/// stop request is observed promptly.
pub trait Stage: Send + 'static {
    /// Thread name and log label
    fn name(&self) -> &str;

    /// Run one iteration of the stage loop
    fn step(&mut self) -> Result<Flow>;

    /// Called once on the worker thread after the loop exits
    fn on_stop(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Runs a [`Stage`] loop on its own thread with a cooperative stop flag
pub struct CancellableWorker {
    name: String,
    state: Arc<StateCell>,
    stage: Option<Box<dyn Stage>>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl CancellableWorker {
    /// Wrap a stage; nothing runs until [`start`](Self::start)
    pub fn new<S: Stage>(stage: S) -> Self {
        Self {
            name: stage.name().to_string(),
            state: Arc::new(StateCell::new()),
            stage: Some(Box::new(stage)),
            handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawn the stage loop
    pub fn start(&mut self) -> Result<()> {
        let mut stage = self
            .stage
            .take()
            .ok_or_else(|| PipelineError::AlreadyStarted(self.name.clone()))?;

        let state = Arc::clone(&self.state);
        let name = self.name.clone();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let _guard = StoppedOnExit(Arc::clone(&state));
                run_loop(&name, stage.as_mut(), &state)
            })?;

        self.handle = Some(handle);
        Ok(())
    }

    /// Ask the loop to exit at the top of its next iteration (idempotent)
    pub fn request_stop(&self) {
        self.state.request_stop();
    }

    pub fn state(&self) -> WorkerState {
        self.state.load()
    }

    pub fn is_stopped(&self) -> bool {
        self.state() != WorkerState::Running
    }

    pub fn is_running(&self) -> bool {
        self.state() == WorkerState::Running
    }

    /// Request a stop and block until the loop has exited
    ///
    /// Returns the fault that terminated the loop, if any.
    pub fn join_after_stop(&mut self) -> Result<()> {
        self.request_stop();

        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(_) => {
                    self.state.mark_stopped();
                    Err(PipelineError::StagePanicked(self.name.clone()))
                }
            },
            None => {
                // Never started: drop the stage so it can release its resources
                self.stage = None;
                self.state.mark_stopped();
                Ok(())
            }
        }
    }
}

impl Drop for CancellableWorker {
    fn drop(&mut self) {
        self.request_stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_loop(name: &str, stage: &mut dyn Stage, state: &StateCell) -> Result<()> {
    log::debug!("Stage '{}' started", name);

    let mut outcome = Ok(());
    while state.load() == WorkerState::Running {
        match stage.step() {
            Ok(Flow::Continue) => {}
            Ok(Flow::Finished) => break,
            Err(e) => {
                log::error!("Stage '{}' terminated: {}", name, e);
                outcome = Err(PipelineError::StageFailed {
                    stage: name.to_string(),
                    reason: e.to_string(),
                });
                break;
            }
        }
    }

    if let Err(e) = stage.on_stop() {
        log::error!("Stage '{}' failed to shut down cleanly: {}", name, e);
        if outcome.is_ok() {
            outcome = Err(PipelineError::StageFailed {
                stage: name.to_string(),
                reason: e.to_string(),
            });
        }
    }

    log::debug!("Stage '{}' exited", name);
    outcome
}
