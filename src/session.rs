//! Optimization sessions.
//!
//! [`OptimizationEngine`] is the synchronous core: it owns the population
//! and runs batches of generations. [`OptimizationSession`] moves an engine
//! onto a dedicated worker thread and talks to it over channels, so the
//! interactive side never blocks on a batch.
//!
//! Every `initialize` starts a new epoch. Batch results carry the epoch they
//! were computed under; [`OptimizationSession::accept`] rejects results from
//! an earlier epoch so a stale batch is never applied.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::constraints::evaluate_with_blame;
use crate::domain::{validate_roster, BlameMatrix, Requirement, ScheduleMatrix, Staff};
use crate::error::{EngineError, Result};
use crate::rules::ConstraintRule;
use crate::solver::{mirror_trainees, GeneticSolver};

/// Everything the engine needs to start a search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPayload {
    pub staff: Vec<Staff>,
    pub days: usize,
    pub start_date: NaiveDate,
    pub rules: Vec<ConstraintRule>,
    pub requirement: Requirement,
    /// Current schedule, used as the first individual.
    #[serde(default)]
    pub warm_start: Option<ScheduleMatrix>,
}

/// Outcome of one batch of generations.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub epoch: u64,
    pub best_schedule: ScheduleMatrix,
    pub best_score: f64,
    /// Generation count after this batch.
    pub generation: u64,
    pub blame: BlameMatrix,
}

struct EngineState {
    solver: GeneticSolver,
    population: Vec<ScheduleMatrix>,
}

/// Synchronous search engine.
pub struct OptimizationEngine {
    config: EngineConfig,
    state: Option<EngineState>,
}

impl OptimizationEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config, state: None }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Replaces the engine state with a fresh population for `payload`.
    pub fn initialize(&mut self, payload: InitPayload) -> Result<()> {
        self.state = None;
        if payload.staff.is_empty() {
            return Err(EngineError::Configuration("cannot optimize an empty roster".into()));
        }
        validate_roster(&payload.staff)?;

        let mut solver = GeneticSolver::new(
            payload.staff,
            payload.days,
            payload.start_date,
            payload.requirement,
            payload.rules,
            self.config.clone(),
        )?;
        let population =
            solver.seed_population(self.config.population_size, payload.warm_start.as_ref())?;

        info!(
            staff = solver.staff().len(),
            days = solver.days(),
            population = population.len(),
            "Optimizer initialized"
        );
        self.state = Some(EngineState { solver, population });
        Ok(())
    }

    /// Evolves `batch_size` generations and reports the best schedule.
    ///
    /// The reported schedule has trainee rows mirrored from their preceptors,
    /// and its score and blame are computed after mirroring.
    pub fn run_batch(&mut self, start_generation: u64) -> Result<BatchResult> {
        let Some(state) = self.state.as_mut() else {
            return Err(EngineError::Configuration("optimizer is not initialized".into()));
        };

        let started = Instant::now();
        for _ in 0..self.config.batch_size {
            let population = std::mem::take(&mut state.population);
            state.population = state.solver.evolve(population)?;
        }

        let (best_index, _) = state.solver.best(&state.population)?;
        let mut best_schedule = state.population[best_index].clone();
        mirror_trainees(&mut best_schedule, state.solver.staff());
        let (best_score, blame) =
            evaluate_with_blame(&best_schedule, &state.solver.context(), state.solver.rules())?;

        let generation = start_generation + self.config.batch_size as u64;
        debug!(
            generation,
            best_score,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch complete"
        );
        Ok(BatchResult {
            epoch: 0,
            best_schedule,
            best_score,
            generation,
            blame,
        })
    }
}

enum Command {
    Initialize {
        epoch: u64,
        payload: Box<InitPayload>,
        reply: oneshot::Sender<Result<()>>,
    },
    RunBatch {
        epoch: u64,
        generation: u64,
        reply: oneshot::Sender<Result<BatchResult>>,
    },
}

/// Emitted by a running batch loop.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Batch(BatchResult),
    Failed(EngineError),
}

/// Whether a batch loop is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Idle,
    Running,
}

struct RunningLoop {
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

/// Handle to an optimizer running on its own thread.
pub struct OptimizationSession {
    commands: mpsc::Sender<Command>,
    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: Option<mpsc::Receiver<SessionEvent>>,
    epoch: u64,
    running: Option<RunningLoop>,
}

impl OptimizationSession {
    /// Spawns the worker thread.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let capacity = config.channel_capacity.max(1);
        let (commands, rx) = mpsc::channel(capacity);
        thread::Builder::new()
            .name("roster-optimizer".into())
            .spawn(move || worker_loop(rx, config))
            .map_err(|e| {
                warn!(error = %e, "Failed to spawn optimizer worker");
                EngineError::WorkerUnavailable
            })?;
        let (events_tx, events_rx) = mpsc::channel(capacity);
        Ok(Self {
            commands,
            events_tx,
            events_rx: Some(events_rx),
            epoch: 0,
            running: None,
        })
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn status(&self) -> SessionStatus {
        match &self.running {
            Some(run) if !run.task.is_finished() => SessionStatus::Running,
            _ => SessionStatus::Idle,
        }
    }

    /// Stops any running loop, starts a new epoch and seeds the worker.
    ///
    /// Returns the new epoch.
    pub async fn initialize(&mut self, payload: InitPayload) -> Result<u64> {
        self.stop();
        self.epoch += 1;
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Initialize {
                epoch: self.epoch,
                payload: Box::new(payload),
                reply,
            })
            .await
            .map_err(|_| EngineError::WorkerUnavailable)?;
        rx.await.map_err(|_| EngineError::WorkerUnavailable)??;
        Ok(self.epoch)
    }

    /// Runs a single batch in the current epoch.
    pub async fn run_batch(&self, start_generation: u64) -> Result<BatchResult> {
        request_batch(&self.commands, self.epoch, start_generation).await
    }

    /// Starts a loop that runs batches back to back and emits each result.
    ///
    /// The loop stops at the next batch boundary after [`stop`](Self::stop),
    /// after a failed batch, or when nobody listens for events.
    pub fn start(&mut self, start_generation: u64) {
        self.stop();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let commands = self.commands.clone();
        let events = self.events_tx.clone();
        let epoch = self.epoch;

        let task = tokio::spawn(async move {
            let mut generation = start_generation;
            loop {
                let outcome = tokio::select! {
                    _ = token.cancelled() => break,
                    outcome = request_batch(&commands, epoch, generation) => outcome,
                };
                let event = match outcome {
                    Ok(result) => {
                        generation = result.generation;
                        SessionEvent::Batch(result)
                    }
                    Err(err) => SessionEvent::Failed(err),
                };
                let failed = matches!(event, SessionEvent::Failed(_));
                let delivered = tokio::select! {
                    _ = token.cancelled() => break,
                    sent = events.send(event) => sent.is_ok(),
                };
                if failed || !delivered {
                    break;
                }
                tokio::task::yield_now().await;
            }
            debug!(epoch, generation, "Batch loop exited");
        });

        info!(epoch = self.epoch, start_generation, "Batch loop started");
        self.running = Some(RunningLoop { cancel, task });
    }

    /// Signals the running loop to stop. Results already in flight are
    /// still delivered but belong to a loop that has ended.
    pub fn stop(&mut self) {
        if let Some(run) = self.running.take() {
            run.cancel.cancel();
            info!(epoch = self.epoch, "Batch loop stopped");
        }
    }

    /// Hands the event stream to a consumer task.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.events_rx.take()
    }

    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events_rx.as_mut()?.recv().await
    }

    /// Passes `result` through if it belongs to the current epoch.
    pub fn accept(&self, result: BatchResult) -> Result<BatchResult> {
        if result.epoch != self.epoch {
            return Err(EngineError::StaleResult {
                result_epoch: result.epoch,
                current_epoch: self.epoch,
            });
        }
        Ok(result)
    }
}

impl Drop for OptimizationSession {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn request_batch(
    commands: &mpsc::Sender<Command>,
    epoch: u64,
    generation: u64,
) -> Result<BatchResult> {
    let (reply, rx) = oneshot::channel();
    commands
        .send(Command::RunBatch {
            epoch,
            generation,
            reply,
        })
        .await
        .map_err(|_| EngineError::WorkerUnavailable)?;
    rx.await.map_err(|_| EngineError::WorkerUnavailable)?
}

fn worker_loop(mut commands: mpsc::Receiver<Command>, config: EngineConfig) {
    let mut engine = OptimizationEngine::new(config);
    let mut current_epoch = 0;

    while let Some(command) = commands.blocking_recv() {
        match command {
            Command::Initialize {
                epoch,
                payload,
                reply,
            } => {
                current_epoch = epoch;
                let outcome = engine.initialize(*payload);
                if let Err(err) = &outcome {
                    warn!(epoch, error = %err, "Optimizer initialization failed");
                }
                let _ = reply.send(outcome);
            }
            Command::RunBatch {
                epoch,
                generation,
                reply,
            } => {
                // Skip work queued by a loop from an earlier epoch.
                let outcome = if epoch != current_epoch {
                    Err(EngineError::StaleResult {
                        result_epoch: epoch,
                        current_epoch,
                    })
                } else {
                    engine.run_batch(generation).map(|mut result| {
                        result.epoch = epoch;
                        result
                    })
                };
                let _ = reply.send(outcome);
            }
        }
    }
    debug!("Optimizer worker shut down");
}
