//! Executor: drive a planned pipeline to completion against back-ends.
//!
//! Ready steps (every required dependency terminal) are started in pipeline
//! order, up to `parallelism` at a time. Each running step is a future that
//! reports [`StepEvent`]s over a channel; the loop folds them into the
//! pipeline with [`Pipeline::apply_update`], so only the loop mutates it.
//! Step ids and edges are indexed once per run ([`StepIndex`]).
//! The first failure stops scheduling; running steps are drained and the
//! pipeline is left as-is for persistence.

use super::config::EngineConfig;
use super::error::{Error, Result};
use super::graph;
use super::state;
use super::types::*;
use crate::backend::{ApplyContext, Backend, BackendError, BackendRegistry};
use crate::resources::{ResourceInputs, ResourceKind};
use crate::tripwire::eventlog::{self, now_millis, ProvenanceEvent};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, FuturesUnordered, StreamExt};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedSender};

/// Receives a pipeline snapshot after every folded event.
pub type Progress = UnboundedSender<Pipeline>;

/// Outcome of a successful apply run.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplySummary {
    pub run_id: String,
    pub completed: u32,
    pub unchanged: u32,
    pub duration: Duration,
}

/// A failed run: the error plus the pipeline as it stood.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ApplyFailure {
    pub error: Error,
    pub pipeline: Pipeline,
}

#[derive(Clone)]
pub struct Executor {
    config: EngineConfig,
    registry: Arc<BackendRegistry>,
    event_log: Option<PathBuf>,
    checkpoint: Option<(PathBuf, String)>,
}

/// Everything a running step needs, detached from the pipeline.
struct Job {
    ctx: ApplyContext,
    kind: ResourceKind,
    inputs: ResourceInputs,
    state: Option<serde_json::Value>,
    backend: Arc<dyn Backend>,
}

/// Tallies for one run.
#[derive(Default)]
struct RunStats {
    completed: u32,
    unchanged: u32,
    failed: u32,
}

impl Executor {
    pub fn new(config: EngineConfig, registry: Arc<BackendRegistry>) -> Self {
        Self {
            config,
            registry,
            event_log: None,
            checkpoint: None,
        }
    }

    /// Append provenance events to the JSONL log at `path`.
    pub fn with_event_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.event_log = Some(path.into());
        self
    }

    /// Persist the pipeline under `state_dir/name` whenever a step settles.
    pub fn with_checkpoint(mut self, state_dir: impl Into<PathBuf>, name: &str) -> Self {
        self.checkpoint = Some((state_dir.into(), name.to_string()));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Apply `pipeline` in place. On error the pipeline holds every step's
    /// final status and the error is returned.
    pub async fn apply(
        &self,
        pipeline: &mut Pipeline,
        progress: Option<&Progress>,
    ) -> Result<ApplySummary> {
        graph::execution_order(pipeline)?;
        let index = StepIndex::new(pipeline);

        let run_id = eventlog::generate_run_id();
        let started = Instant::now();
        let parallelism = self.config.parallelism.max(1);
        self.log(ProvenanceEvent::ApplyStarted {
            run_id: run_id.clone(),
            steps: pipeline.steps.len(),
            tessera_version: env!("CARGO_PKG_VERSION").to_string(),
        })
        .await;
        tracing::info!(%run_id, steps = pipeline.steps.len(), parallelism, "apply started");

        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<StepEvent>();
        let mut running: FuturesUnordered<BoxFuture<'static, (String, Result<()>)>> =
            FuturesUnordered::new();
        let mut in_flight: HashSet<String> = HashSet::new();
        let mut failure: Option<Error> = None;
        let mut stats = RunStats::default();

        loop {
            while failure.is_none() && running.len() < parallelism {
                let Some(pos) = next_ready(pipeline, &index, &in_flight) else {
                    break;
                };
                let id = index.id(pos).to_string();
                if pipeline.steps[pos].action == Action::NoOp {
                    tracing::debug!(step = %id, "no-op");
                    let done = StepEvent::new(&id, StepUpdate::Completed { at: now_millis() });
                    self.fold(pipeline, &index, done, progress);
                    stats.unchanged += 1;
                    continue;
                }

                let at = now_millis();
                let begin = StepEvent::new(&id, StepUpdate::Started { at });
                self.fold(pipeline, &index, begin, progress);
                self.log_started(&run_id, pipeline, pos).await;
                match self.prepare(pipeline, pos, &id) {
                    Ok((job, hash)) => {
                        if let Some(hash) = hash {
                            let hashed = StepEvent::new(&id, StepUpdate::Hashed(hash));
                            self.fold(pipeline, &index, hashed, progress);
                        }
                        in_flight.insert(id.clone());
                        running.push(job.run(events_tx.clone()).boxed());
                    }
                    Err(e) => {
                        self.settle(&run_id, pipeline, &index, &id, Err(&e), progress).await;
                        stats.failed += 1;
                        failure = Some(e);
                    }
                }
            }

            if running.is_empty() {
                break;
            }

            tokio::select! {
                Some(event) = events_rx.recv() => self.fold(pipeline, &index, event, progress),
                Some((id, result)) = running.next() => {
                    while let Ok(event) = events_rx.try_recv() {
                        self.fold(pipeline, &index, event, progress);
                    }
                    in_flight.remove(&id);
                    match result {
                        Ok(()) => {
                            self.settle(&run_id, pipeline, &index, &id, Ok(()), progress).await;
                            stats.completed += 1;
                        }
                        Err(e) => {
                            self.settle(&run_id, pipeline, &index, &id, Err(&e), progress).await;
                            stats.failed += 1;
                            failure.get_or_insert(e);
                        }
                    }
                }
            }
        }

        if failure.is_none() && !pipeline.is_finished() {
            let mut stuck: Vec<String> = pipeline
                .steps
                .iter()
                .filter(|s| !s.is_terminal())
                .map(Step::id)
                .collect();
            stuck.sort();
            failure = Some(Error::Cycle(stuck));
        }

        let duration = started.elapsed();
        self.log(ProvenanceEvent::ApplyCompleted {
            run_id: run_id.clone(),
            steps_completed: stats.completed,
            steps_unchanged: stats.unchanged,
            steps_failed: stats.failed,
            total_seconds: duration.as_secs_f64(),
        })
        .await;

        match failure {
            Some(e) => {
                tracing::warn!(%run_id, error = %e, "apply stopped");
                Err(e)
            }
            None => {
                tracing::info!(
                    %run_id,
                    completed = stats.completed,
                    unchanged = stats.unchanged,
                    "apply finished"
                );
                Ok(ApplySummary {
                    run_id,
                    completed: stats.completed,
                    unchanged: stats.unchanged,
                    duration,
                })
            }
        }
    }

    /// Apply `pipeline` on a background task, yielding a snapshot after each
    /// event. A failed run ends with an `Err` carrying the final pipeline.
    pub fn stream(
        &self,
        pipeline: Pipeline,
    ) -> BoxStream<'static, std::result::Result<Pipeline, ApplyFailure>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let executor = self.clone();
        let handle = tokio::spawn(async move {
            let mut pipeline = pipeline;
            let result = executor.apply(&mut pipeline, Some(&tx)).await;
            (result, pipeline)
        });

        let snapshots = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|snapshot| (Ok(snapshot), rx))
        });
        let outcome = stream::once(async move {
            match handle.await {
                Ok((Ok(_), _)) => None,
                Ok((Err(error), pipeline)) => Some(Err(ApplyFailure { error, pipeline })),
                Err(join) => Some(Err(ApplyFailure {
                    error: Error::Execution {
                        step: String::new(),
                        message: format!("executor task failed: {}", join),
                    },
                    pipeline: Pipeline::default(),
                })),
            }
        })
        .filter_map(futures::future::ready);
        snapshots.chain(outcome).boxed()
    }

    /// Resolve inputs, back-end and fingerprint for a step about to run.
    fn prepare(
        &self,
        pipeline: &Pipeline,
        pos: usize,
        id: &str,
    ) -> Result<(Job, Option<String>)> {
        let step = &pipeline.steps[pos];

        let inputs = if step.action == Action::Delete {
            // referenced steps may already be gone; destroy works from state
            step.inputs
                .interpolate(id, pipeline)
                .unwrap_or_else(|_| step.inputs.clone())
        } else {
            step.inputs.interpolate(id, pipeline)?
        };

        let backend = self.registry.backend_for(id, &inputs, step.action)?;
        // deletions keep the hash of what was applied
        let hash = (step.action != Action::Delete).then(|| backend.hash(&inputs));
        let job = Job {
            ctx: ApplyContext {
                step: id.to_string(),
                work_dir: self.config.work_dir.join(sanitize(id)),
                action: step.action,
            },
            kind: step.kind(),
            inputs,
            state: step.state.clone(),
            backend,
        };
        Ok((job, hash))
    }

    fn fold(
        &self,
        pipeline: &mut Pipeline,
        index: &StepIndex,
        event: StepEvent,
        progress: Option<&Progress>,
    ) {
        tracing::trace!(step = %event.step, update = ?event.update, "step event");
        let Some(pos) = index.position(&event.step) else {
            return;
        };
        pipeline.apply_update(pos, event.update);
        if let Some(tx) = progress {
            let _ = tx.send(pipeline.clone());
        }
    }

    /// Mark a step complete or failed, then log and checkpoint.
    async fn settle(
        &self,
        run_id: &str,
        pipeline: &mut Pipeline,
        index: &StepIndex,
        id: &str,
        result: std::result::Result<(), &Error>,
        progress: Option<&Progress>,
    ) {
        let at = now_millis();
        match result {
            Ok(()) => {
                let done = StepEvent::new(id, StepUpdate::Completed { at });
                self.fold(pipeline, index, done, progress);
                if let Some(step) = index.position(id).map(|pos| &pipeline.steps[pos]) {
                    let start = step.status.start_time.unwrap_or(at);
                    tracing::info!(step = %id, action = %step.action, "step complete");
                    self.log(ProvenanceEvent::StepCompleted {
                        run_id: run_id.to_string(),
                        step: id.to_string(),
                        action: step.action.to_string(),
                        duration_seconds: at.saturating_sub(start) as f64 / 1000.0,
                        hash: step.hash.clone(),
                    })
                    .await;
                }
            }
            Err(e) => {
                let message = match e {
                    Error::Execution { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                tracing::error!(step = %id, error = %message, "step failed");
                let failed = StepUpdate::Failed {
                    message: message.clone(),
                    at,
                };
                self.fold(pipeline, index, StepEvent::new(id, failed), progress);
                self.log(ProvenanceEvent::StepFailed {
                    run_id: run_id.to_string(),
                    step: id.to_string(),
                    error: message,
                })
                .await;
            }
        }
        self.save_checkpoint(pipeline).await;
    }

    async fn log_started(&self, run_id: &str, pipeline: &Pipeline, pos: usize) {
        if let Some(step) = pipeline.steps.get(pos) {
            let id = step.id();
            tracing::info!(step = %id, action = %step.action, "step started");
            self.log(ProvenanceEvent::StepStarted {
                run_id: run_id.to_string(),
                step: id,
                action: step.action.to_string(),
            })
            .await;
        }
    }

    /// Append to the event log on the blocking pool.
    async fn log(&self, event: ProvenanceEvent) {
        let Some(path) = self.event_log.clone() else {
            return;
        };
        let written = tokio::task::spawn_blocking(move || eventlog::append_event(&path, event))
            .await
            .map_err(|e| e.to_string())
            .and_then(|r| r);
        if let Err(e) = written {
            tracing::warn!(error = %e, "cannot append event");
        }
    }

    /// Persist a snapshot of the pipeline on the blocking pool.
    async fn save_checkpoint(&self, pipeline: &Pipeline) {
        let Some((dir, name)) = self.checkpoint.clone() else {
            return;
        };
        let snapshot = pipeline.clone();
        let saved = tokio::task::spawn_blocking(move || {
            state::save_pipeline(&dir, &name, &snapshot).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| e.to_string())
        .and_then(|r| r);
        if let Err(e) = saved {
            tracing::warn!(error = %e, "cannot checkpoint pipeline");
        }
    }
}

impl Job {
    async fn run(self, events: UnboundedSender<StepEvent>) -> (String, Result<()>) {
        let id = self.ctx.step.clone();
        let result = self.execute(&events).await.map_err(|e| Error::Execution {
            step: id.clone(),
            message: e.to_string(),
        });
        (id, result)
    }

    async fn execute(
        self,
        events: &UnboundedSender<StepEvent>,
    ) -> std::result::Result<(), BackendError> {
        tokio::fs::create_dir_all(&self.ctx.work_dir).await?;
        let id = self.ctx.step.clone();
        let mut last = StepState::Starting;
        let mut report = |state: StepState| {
            if !state.is_terminal() && state != last {
                last = state;
                let _ = events.send(StepEvent::new(&id, StepUpdate::Status(state)));
            }
        };

        if self.ctx.action == Action::Delete {
            let mut updates = self.backend.destroy(self.ctx.clone(), self.inputs, self.state);
            while let Some(state) = updates.next().await {
                report(state?);
            }
            if self.kind == ResourceKind::Module {
                self.backend.after_delete(&self.ctx).await?;
            }
            return Ok(());
        }

        let mut outputs = None;
        let mut updates = self.backend.apply(self.ctx.clone(), self.inputs, self.state);
        while let Some(update) = updates.next().await {
            let update = update?;
            report(update.status);
            if update.outputs.is_some() || update.state.is_some() {
                if update.outputs.is_some() {
                    outputs = update.outputs.clone();
                }
                let _ = events.send(StepEvent::new(
                    &id,
                    StepUpdate::Applied {
                        outputs: update.outputs,
                        state: update.state,
                    },
                ));
            }
        }
        if self.kind == ResourceKind::Module {
            self.backend.after_create(&self.ctx, outputs.as_ref()).await?;
        }
        Ok(())
    }
}

/// Position of the first non-terminal, not-running step whose required
/// dependencies are all terminal, in pipeline order.
fn next_ready(
    pipeline: &Pipeline,
    index: &StepIndex,
    in_flight: &HashSet<String>,
) -> Option<usize> {
    (0..index.len()).find(|&pos| {
        !pipeline.steps[pos].is_terminal()
            && !in_flight.contains(index.id(pos))
            && index.dependencies_in(pipeline, pos, Step::is_terminal)
    })
}

/// Directory-safe form of a step id.
pub fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| match c {
            '/' | ':' | '\\' => '_',
            c => c,
        })
        .collect()
}
