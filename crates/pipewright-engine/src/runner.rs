//! The process runner.
//!
//! Drives one run of a [`ProcessDefinition`] through its tasks in order:
//!
//! 1. Build the task spec from the resolved inputs and earlier outputs
//! 2. Reserve the task's effect id in the store
//! 3. Serve a completed effect from the store, or dispatch to the executor
//! 4. Validate the output against the task's schema
//! 5. Record the output and append its artifacts
//!
//! The first failure halts the run. Once every task succeeds the run moves
//! to `AwaitingApproval` and the breakpoint is put to the approval gate.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pipewright_core::{
    ApprovalMethod, Artifact, ArtifactAggregator, BreakpointDecision, CoreError, EffectId, HaltInfo,
    PipelineResult, RunRecord, RunState, TaskContext, TaskSpec,
};
use serde_json::Value;
use tracing::{debug, error, info, warn, Instrument};

use crate::context::RunContext;
use crate::definition::{ProcessDefinition, TaskArgs};
use crate::error::RunError;
use crate::executor::{ExecutorError, ExecutorRequest, TaskExecutor};
use crate::gate::{ApprovalGate, GateOutcome};
use crate::store::{Reservation, StoreError};

/// Default age after which a pending reservation may be reclaimed.
pub const DEFAULT_RECLAIM_AFTER: Duration = Duration::from_secs(10 * 60);

/// Runner tuning.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Pending reservations younger than this are treated as in flight.
    pub reclaim_after: Duration,

    /// Upper bound on a single dispatch. `None` waits indefinitely.
    pub dispatch_timeout: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            reclaim_after: DEFAULT_RECLAIM_AFTER,
            dispatch_timeout: None,
        }
    }
}

impl RunnerConfig {
    pub fn with_reclaim_after(mut self, reclaim_after: Duration) -> Self {
        self.reclaim_after = reclaim_after;
        self
    }

    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = Some(timeout);
        self
    }

    fn reclaim_window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.reclaim_after).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100))
    }
}

/// Runs processes against an executor, an approval gate and the stores
/// carried by a [`RunContext`].
#[derive(Clone)]
pub struct ProcessRunner {
    executor: Arc<dyn TaskExecutor>,
    gate: Arc<dyn ApprovalGate>,
    config: RunnerConfig,
}

impl ProcessRunner {
    pub fn new(executor: Arc<dyn TaskExecutor>, gate: Arc<dyn ApprovalGate>) -> Self {
        Self {
            executor,
            gate,
            config: RunnerConfig::default(),
        }
    }

    /// Builder method to replace the runner configuration.
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run (or resume) `process` under `ctx`.
    ///
    /// Re-invoking with the same run id serves every completed task from the
    /// effect store and dispatches only what is left. A run that was already
    /// approved or rejected returns its recorded result without dispatching.
    pub async fn run(
        &self,
        process: &dyn ProcessDefinition,
        raw_inputs: &Value,
        ctx: &RunContext,
    ) -> Result<PipelineResult, RunError> {
        self.run_inner(process, raw_inputs, ctx)
            .instrument(ctx.span().clone())
            .await
    }

    /// Record an external decision for a run that is awaiting approval.
    ///
    /// Deciding a run that is already decided returns the recorded result
    /// unchanged.
    pub async fn resolve(
        &self,
        ctx: &RunContext,
        approved: bool,
        notes: Option<String>,
    ) -> Result<PipelineResult, RunError> {
        self.resolve_inner(ctx, approved, notes)
            .instrument(ctx.span().clone())
            .await
    }

    async fn run_inner(
        &self,
        process: &dyn ProcessDefinition,
        raw_inputs: &Value,
        ctx: &RunContext,
    ) -> Result<PipelineResult, RunError> {
        let inputs = process.resolve_inputs(raw_inputs).map_err(RunError::Inputs)?;
        let started = ctx.now();

        let mut record = match ctx.runs().load_run(ctx.run_id()).await.map_err(RunError::RunStore)? {
            Some(existing) => {
                if existing.process != process.name() {
                    return Err(RunError::ProcessMismatch {
                        run_id: ctx.run_id().to_string(),
                        recorded: existing.process,
                        requested: process.name().to_string(),
                    });
                }
                if existing.inputs != inputs {
                    return Err(RunError::InputsMismatch(ctx.run_id().to_string()));
                }
                if matches!(existing.state, RunState::Completed | RunState::Rejected) {
                    info!(state = %existing.state, "Run already decided, returning recorded result");
                    return recorded_result(&existing);
                }
                info!(state = %existing.state, completed = existing.completed_tasks.len(), "Resuming run");
                existing
            }
            None => {
                info!(process = process.name(), tasks = process.tasks().len(), "Starting run");
                RunRecord::new(ctx.run_id().clone(), process.name(), inputs.clone(), started)
            }
        };

        record.transition(RunState::Running, started)?;
        record.completed_tasks.clear();
        record.artifacts.clear();
        record.summaries.clear();
        record.breakpoint = None;
        record.decision = None;
        record.halted_at = None;
        self.save(ctx, &record).await?;

        let mut outputs: BTreeMap<String, Value> = BTreeMap::new();
        let mut artifacts = ArtifactAggregator::new();

        for (index, task) in process.tasks().iter().enumerate() {
            let name = task.name();

            if ctx.is_cancelled() {
                let err = RunError::Cancelled { task: name.to_string() };
                return self.halt(ctx, &mut record, err).await;
            }

            let task_ctx = TaskContext::new(ctx.run_id(), index, name);
            let args = TaskArgs {
                inputs: &inputs,
                previous: &outputs,
            };
            let spec = match task.build(&args, &task_ctx) {
                Ok(spec) => spec,
                Err(e) => return self.halt(ctx, &mut record, e.into()).await,
            };

            let output = match self.execute_task(ctx, &task_ctx, &spec).await {
                Ok(output) => output,
                Err(e) => return self.halt(ctx, &mut record, e).await,
            };

            let produced = Artifact::from_output(name, &output);
            debug!(task = name, artifacts = produced.len(), "Task output accepted");
            artifacts.append(produced);
            outputs.insert(name.to_string(), output);

            record.completed_tasks.push(name.to_string());
            record.artifacts = artifacts.all().to_vec();
            record.updated_at = ctx.now();
            self.save(ctx, &record).await?;
        }

        let summaries = process.summarize(&inputs, &outputs);
        let breakpoint = process.breakpoint(&inputs, &summaries);
        let finished = ctx.now();

        record.summaries = summaries;
        record.breakpoint = Some(breakpoint.clone());
        record.duration_ms = elapsed_ms(record.started_at, finished);
        record.transition(RunState::AwaitingApproval, finished)?;
        self.save(ctx, &record).await?;

        info!(
            tasks = record.completed_tasks.len(),
            artifacts = artifacts.len(),
            duration_ms = record.duration_ms,
            "All tasks completed, awaiting approval"
        );

        let outcome = tokio::select! {
            _ = ctx.cancellation().cancelled() => {
                info!("Cancelled while awaiting approval, leaving run undecided");
                GateOutcome::Deferred
            }
            outcome = self.gate.request_approval(&breakpoint) => outcome?,
        };

        match outcome {
            GateOutcome::Deferred => recorded_result(&record),
            GateOutcome::Decided(decision) => self.apply_decision(ctx, record, decision).await,
        }
    }

    async fn resolve_inner(
        &self,
        ctx: &RunContext,
        approved: bool,
        notes: Option<String>,
    ) -> Result<PipelineResult, RunError> {
        let record = ctx
            .runs()
            .load_run(ctx.run_id())
            .await
            .map_err(RunError::RunStore)?
            .ok_or_else(|| RunError::RunNotFound(ctx.run_id().to_string()))?;

        match record.state {
            RunState::AwaitingApproval => {}
            RunState::Completed | RunState::Rejected => {
                info!(state = %record.state, "Run already decided");
                return recorded_result(&record);
            }
            other => {
                let to = if approved { RunState::Completed } else { RunState::Rejected };
                return Err(CoreError::InvalidStateTransition {
                    from: other.to_string(),
                    to: to.to_string(),
                }
                .into());
            }
        }

        let breakpoint = record
            .breakpoint
            .clone()
            .ok_or_else(|| CoreError::InvalidInput(format!("run '{}' has no breakpoint", record.run_id)))?;
        let decision = if approved {
            BreakpointDecision::approve(&breakpoint, ApprovalMethod::External, notes)
        } else {
            BreakpointDecision::reject(&breakpoint, ApprovalMethod::External, notes)
        };
        self.apply_decision(ctx, record, decision).await
    }

    /// Reserve, then serve from the store or dispatch, then validate.
    async fn execute_task(
        &self,
        ctx: &RunContext,
        task_ctx: &TaskContext,
        spec: &TaskSpec,
    ) -> Result<Value, RunError> {
        let name = task_ctx.task_name();
        let effect_id = task_ctx.effect_id();
        let store_err = |source: StoreError| RunError::Store {
            task: name.to_string(),
            source,
        };

        let request = ExecutorRequest::new(task_ctx, spec);
        let input_doc = serde_json::to_value(&request).map_err(|e| store_err(e.into()))?;

        let reservation = ctx
            .effects()
            .reserve(effect_id, input_doc, ctx.now(), self.config.reclaim_window())
            .await
            .map_err(store_err)?;

        match reservation {
            Reservation::Cached(record) => {
                debug!(task = name, effect_id = %effect_id, "Serving task from effect store");
                let output = record.output.unwrap_or(Value::Null);
                spec.payload
                    .output_schema
                    .validate(&output)
                    .map_err(|source| RunError::Validation {
                        task: name.to_string(),
                        source,
                    })?;
                info!(task = name, cached = true, "task_completed");
                Ok(output)
            }
            Reservation::Acquired => {
                info!(task = name, effect_id = %effect_id, "task_started");

                let output = match self.dispatch(ctx, &request).await {
                    None => {
                        // The reservation stays pending; a later run reclaims
                        // it once it is stale.
                        return Err(RunError::Cancelled { task: name.to_string() });
                    }
                    Some(Err(source)) => {
                        self.record_failure(ctx, effect_id, &source.to_string()).await;
                        return Err(RunError::Dispatch {
                            task: name.to_string(),
                            source,
                        });
                    }
                    Some(Ok(output)) => output,
                };

                if let Err(source) = spec.payload.output_schema.validate(&output) {
                    self.record_failure(ctx, effect_id, &source.to_string()).await;
                    return Err(RunError::Validation {
                        task: name.to_string(),
                        source,
                    });
                }

                ctx.effects()
                    .complete(effect_id, output.clone(), ctx.now())
                    .await
                    .map_err(store_err)?;
                info!(task = name, cached = false, "task_completed");
                Ok(output)
            }
        }
    }

    /// Call the executor, bounded by the dispatch timeout. `None` means the
    /// run was cancelled first.
    async fn dispatch(
        &self,
        ctx: &RunContext,
        request: &ExecutorRequest,
    ) -> Option<Result<Value, ExecutorError>> {
        let call = async {
            match self.config.dispatch_timeout {
                Some(limit) => tokio::time::timeout(limit, self.executor.execute(request))
                    .await
                    .unwrap_or(Err(ExecutorError::Timeout(limit))),
                None => self.executor.execute(request).await,
            }
        };

        tokio::select! {
            _ = ctx.cancellation().cancelled() => {
                warn!(task = %request.task_name, "Dispatch cancelled");
                None
            }
            result = call => Some(result),
        }
    }

    async fn record_failure(&self, ctx: &RunContext, effect_id: &EffectId, message: &str) {
        if let Err(e) = ctx.effects().fail(effect_id, message, ctx.now()).await {
            warn!(effect_id = %effect_id, error = %e, "Failed to mark effect failed");
        }
    }

    async fn apply_decision(
        &self,
        ctx: &RunContext,
        mut record: RunRecord,
        decision: BreakpointDecision,
    ) -> Result<PipelineResult, RunError> {
        let next = if decision.approved {
            RunState::Completed
        } else {
            RunState::Rejected
        };
        info!(approved = decision.approved, method = ?decision.method, "Breakpoint decided");

        record.decision = Some(decision);
        record.transition(next, ctx.now())?;
        self.save(ctx, &record).await?;
        recorded_result(&record)
    }

    /// Mark the run failed at the task named by `err` and return `err`.
    async fn halt(
        &self,
        ctx: &RunContext,
        record: &mut RunRecord,
        err: RunError,
    ) -> Result<PipelineResult, RunError> {
        if matches!(err, RunError::Store { source: StoreError::InFlight { .. }, .. }) {
            // Another invocation owns this run; its record is left alone.
            warn!(task = ?err.task(), error = %err, "Task in flight elsewhere, not marking run failed");
            return Err(err);
        }
        error!(task = ?err.task(), error = %err, "Run halted");

        if let (Some(task), Some(kind)) = (err.task(), err.halt_kind()) {
            record.halted_at = Some(HaltInfo {
                task: task.to_string(),
                kind,
                message: err.to_string(),
            });
        }
        let now = ctx.now();
        if let Err(e) = record.transition(RunState::Failed, now) {
            warn!(error = %e, "Could not mark run failed");
        } else if let Err(e) = ctx.runs().save_run(record).await {
            warn!(error = %e, "Failed to persist halted run");
        }
        Err(err)
    }

    async fn save(&self, ctx: &RunContext, record: &RunRecord) -> Result<(), RunError> {
        ctx.runs().save_run(record).await.map_err(RunError::RunStore)
    }
}

fn recorded_result(record: &RunRecord) -> Result<PipelineResult, RunError> {
    record.to_result().ok_or_else(|| {
        RunError::State(CoreError::InvalidInput(format!(
            "run '{}' in state {} has no result",
            record.run_id, record.state
        )))
    })
}

fn elapsed_ms(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    u64::try_from((to - from).num_milliseconds()).unwrap_or(0)
}
