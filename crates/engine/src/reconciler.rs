//! One lifecycle pass over one Action.
//!
//! A pass loads the record, performs at most one phase transition plus the
//! side effects leading up to it, writes the record back with
//! compare-and-swap and tells the caller when to come back. Nothing is kept
//! in memory between passes, so any pass can be repeated or resumed by
//! another process.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use quasar_core::{ActionId, OutputTypeInstance};
use quasar_execution::{Action, ActionError, ActionPhase, ActionSpec, IdempotencyKey};
use quasar_ports::{
    ActionRepo, CancelStatus, ExecutionBackend, ExecutionContext, ExecutionHandle, PortsError,
    RunnerInput, RunnerStatus, TypeInstanceRepository,
};
use quasar_render::{RenderError, RenderOutput, RenderProgress, Renderer};
use quasar_telemetry::{ActionEvent, EventBus};
use tracing::{debug, error, info, warn};

use crate::config::ReconcilerConfig;
use crate::error::EngineError;

/// Actions run once, so the submission key never changes across retries.
const RUN_ATTEMPT: u32 = 0;

/// Attempts at a spec update before giving up on a contended record.
const SPEC_UPDATE_ATTEMPTS: usize = 8;

/// What the caller should do after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing left to do until the spec changes.
    Done,
    /// Run another pass after the delay.
    Requeue(Duration),
}

impl ReconcileOutcome {
    /// Requeue without delay.
    pub const NOW: Self = Self::Requeue(Duration::ZERO);
}

/// Drives Actions through their lifecycle.
pub struct ActionReconciler {
    actions: Arc<dyn ActionRepo>,
    type_instances: Arc<dyn TypeInstanceRepository>,
    backend: Arc<dyn ExecutionBackend>,
    renderer: Renderer,
    events: Arc<EventBus>,
    config: ReconcilerConfig,
}

impl std::fmt::Debug for ActionReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionReconciler")
            .field("renderer", &self.renderer)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ActionReconciler {
    /// Create a reconciler with default configuration.
    pub fn new(
        actions: Arc<dyn ActionRepo>,
        type_instances: Arc<dyn TypeInstanceRepository>,
        backend: Arc<dyn ExecutionBackend>,
        renderer: Renderer,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            actions,
            type_instances,
            backend,
            renderer,
            events,
            config: ReconcilerConfig::default(),
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Event bus the reconciler publishes to.
    #[must_use]
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Store a new Action.
    pub async fn create(&self, action: &Action) -> Result<(), EngineError> {
        self.actions.create(action.id, action.to_record()?).await?;
        debug!(action_id = %action.id, name = %action.name, "Action created");
        Ok(())
    }

    /// Load an Action.
    pub async fn get(&self, id: ActionId) -> Result<Action, EngineError> {
        Ok(self.load(id).await?.1)
    }

    /// Identifiers of every stored Action.
    pub async fn list(&self) -> Result<Vec<ActionId>, EngineError> {
        Ok(self.actions.list().await?)
    }

    /// Apply `change` to the spec of `id`, retrying on concurrent updates.
    pub async fn update_spec(
        &self,
        id: ActionId,
        change: impl Fn(&mut ActionSpec),
    ) -> Result<Action, EngineError> {
        for _ in 0..SPEC_UPDATE_ATTEMPTS {
            let (version, mut action) = self.load(id).await?;
            change(&mut action.spec);
            if self
                .actions
                .transition(id, version, action.to_record()?)
                .await?
            {
                return Ok(action);
            }
        }
        Err(EngineError::Conflict(id))
    }

    /// Run one pass over `id`.
    ///
    /// A lost compare-and-swap is not an error: the pass is discarded and
    /// [`ReconcileOutcome::NOW`] asks for an immediate retry.
    pub async fn reconcile(&self, id: ActionId) -> Result<ReconcileOutcome, EngineError> {
        let (version, mut action) = self.load(id).await?;
        let before = action.clone();

        let outcome = self.step(&mut action).await?;

        if action != before {
            if !self
                .actions
                .transition(id, version, action.to_record()?)
                .await?
            {
                debug!(action_id = %id, version, "Lost update race, requeueing");
                return Ok(ReconcileOutcome::NOW);
            }
            if action.phase() != before.phase() {
                info!(
                    action_id = %id,
                    from = %before.phase(),
                    to = %action.phase(),
                    message = action.status.message.as_deref().unwrap_or(""),
                    "Action phase changed"
                );
                self.events.emit(ActionEvent::PhaseChanged {
                    action_id: id,
                    from: before.phase().to_string(),
                    to: action.phase().to_string(),
                });
            }
        }
        Ok(outcome)
    }

    async fn load(&self, id: ActionId) -> Result<(u64, Action), EngineError> {
        let (version, record) = self
            .actions
            .get(id)
            .await?
            .ok_or(EngineError::ActionNotFound(id))?;
        Ok((version, Action::from_record(record)?))
    }

    async fn step(&self, action: &mut Action) -> Result<ReconcileOutcome, EngineError> {
        let phase = action.phase();
        if action.spec.cancel && phase.is_cancellable() {
            return self.cancel(action).await;
        }
        match phase {
            ActionPhase::Initial => {
                action.transition_to(ActionPhase::BeingRendered)?;
                Ok(ReconcileOutcome::NOW)
            }
            ActionPhase::BeingRendered => self.render(action).await,
            ActionPhase::ReadyToRun => {
                if action.spec.run {
                    action.transition_to(ActionPhase::Running)?;
                    Ok(ReconcileOutcome::NOW)
                } else {
                    Ok(ReconcileOutcome::Done)
                }
            }
            ActionPhase::Running => self.run(action).await,
            ActionPhase::Succeeded | ActionPhase::Failed | ActionPhase::Cancelled => {
                Ok(self.release(action).await)
            }
        }
    }

    // ── BeingRendered ───────────────────────────────────────────────────

    async fn render(&self, action: &mut Action) -> Result<ReconcileOutcome, EngineError> {
        let budget = if action.spec.advanced_rendering {
            Some(1)
        } else {
            self.config.render_iterations_per_pass
        };

        let result = match (action.status.render_progress.clone(), budget) {
            (None, None) => self
                .renderer
                .render(action.render_input())
                .await
                .map(RenderProgress::Complete),
            (None, Some(_)) => self
                .renderer
                .start(action.render_input())
                .await
                .map(RenderProgress::InProgress),
            (Some(state), budget) => {
                self.renderer
                    .advance(state, budget.unwrap_or(usize::MAX))
                    .await
            }
        };

        match result {
            Ok(RenderProgress::InProgress(state)) => {
                debug!(
                    action_id = %action.id,
                    iteration = state.iterations,
                    pending = state.pending(),
                    "Render progressed"
                );
                self.events.emit(ActionEvent::RenderProgressed {
                    action_id: action.id,
                    iterations: state.iterations,
                    pending: state.pending(),
                });
                action.status.render_progress = Some(state);
                action.status.attempts = 0;
                Ok(ReconcileOutcome::NOW)
            }
            Ok(RenderProgress::Complete(output)) => {
                info!(
                    action_id = %action.id,
                    capability = %action.spec.action_ref,
                    iterations = output.iterations,
                    templates = output.workflow.templates.len(),
                    "Action rendered"
                );
                self.events.emit(ActionEvent::RenderProgressed {
                    action_id: action.id,
                    iterations: output.iterations,
                    pending: 0,
                });
                action.status.rendered_workflow = Some(output);
                action.status.render_progress = None;
                action.status.message = None;
                action.transition_to(ActionPhase::ReadyToRun)?;
                Ok(ReconcileOutcome::NOW)
            }
            Err(err) => self.render_failed(action, &err),
        }
    }

    fn render_failed(
        &self,
        action: &mut Action,
        err: &RenderError,
    ) -> Result<ReconcileOutcome, EngineError> {
        let retryable = err.is_retryable();
        self.events.emit(ActionEvent::RenderFailed {
            action_id: action.id,
            error: err.to_string(),
            retryable,
        });
        if retryable {
            return self.retry(action, err.to_string());
        }
        error!(
            action_id = %action.id,
            capability = %action.spec.action_ref,
            error = %err,
            "Render failed"
        );
        action.status.render_progress = None;
        action.fail(err.to_string())?;
        Ok(ReconcileOutcome::Done)
    }

    // ── Running ─────────────────────────────────────────────────────────

    async fn run(&self, action: &mut Action) -> Result<ReconcileOutcome, EngineError> {
        let Some(rendered) = action.status.rendered_workflow.clone() else {
            action.fail("running without a rendered workflow")?;
            return Ok(ReconcileOutcome::Done);
        };
        match action.status.execution_handle.clone() {
            None => self.submit(action, &rendered).await,
            Some(handle) => self.poll(action, &rendered, &handle).await,
        }
    }

    /// Every step is idempotent, so a pass interrupted anywhere in here can
    /// simply be repeated.
    async fn submit(
        &self,
        action: &mut Action,
        rendered: &RenderOutput,
    ) -> Result<ReconcileOutcome, EngineError> {
        if !action.status.locked && !rendered.type_instances_to_lock.is_empty() {
            match self
                .type_instances
                .lock(&rendered.type_instances_to_lock, &owner(action.id))
                .await
            {
                Ok(()) => action.status.locked = true,
                Err(err @ PortsError::Locked { .. }) => {
                    return self.retry(action, err.to_string());
                }
                Err(err) if err.is_retryable() => return self.retry(action, err.to_string()),
                Err(err) => {
                    action.fail(format!("cannot lock type instances: {err}"))?;
                    return Ok(ReconcileOutcome::Done);
                }
            }
        }

        let mut context = self.context(action);
        let identity = match self.backend.ensure_identity(&context).await {
            Ok(identity) => identity,
            Err(err) => return self.retry(action, format!("ensure identity: {err}")),
        };
        context.identity = Some(identity.name.clone());
        action.status.identity = Some(identity.name);

        let input = RunnerInput {
            context,
            workflow: serde_json::to_value(&rendered.workflow).map_err(ActionError::from)?,
            parameters: action.spec.input_parameters.clone(),
        };
        match self.backend.store_runner_input(&input).await {
            Ok(()) => {}
            Err(err) if err.is_already_exists() => {
                debug!(action_id = %action.id, "Runner input already stored");
            }
            Err(err) => return self.retry(action, format!("store runner input: {err}")),
        }

        let key = IdempotencyKey::submit(action.id, RUN_ATTEMPT);
        let handle = match self.backend.submit(&input, key.as_str()).await {
            Ok(handle) => handle,
            Err(PortsError::AlreadyExists { id, .. }) => {
                debug!(action_id = %action.id, handle = %id, "Execution already submitted");
                ExecutionHandle::new(id)
            }
            Err(err) => return self.retry(action, format!("submit: {err}")),
        };

        info!(action_id = %action.id, %handle, idempotency_key = %key, "Execution submitted");
        self.events.emit(ActionEvent::Submitted {
            action_id: action.id,
            handle: handle.to_string(),
        });
        action.status.execution_handle = Some(handle);
        action.status.runner_started_at = Some(Utc::now());
        action.status.attempts = 0;
        action.status.message = None;
        Ok(ReconcileOutcome::NOW)
    }

    async fn poll(
        &self,
        action: &mut Action,
        rendered: &RenderOutput,
        handle: &ExecutionHandle,
    ) -> Result<ReconcileOutcome, EngineError> {
        let elapsed = elapsed_since_submit(action);
        if let Some(timeout) = self.config.runner_timeout()
            && elapsed > timeout
        {
            let reason = format!("execution timed out after {timeout:?}");
            return self.abort(action, handle, reason, elapsed).await;
        }

        let status = match self.backend.status(handle).await {
            Ok(status) => status,
            Err(err) => {
                let message = format!("execution status: {err}");
                let attempts = action.status.attempts.saturating_add(1);
                if attempts < self.config.retry.max_attempts {
                    return self.retry(action, message);
                }
                action.status.attempts = attempts;
                error!(
                    action_id = %action.id,
                    %handle,
                    attempts,
                    error = %message,
                    "Retries exhausted, cancelling execution"
                );
                let reason = format!("giving up after {attempts} attempts: {message}");
                return self.abort(action, handle, reason, elapsed).await;
            }
        };
        action.status.attempts = 0;
        if action.status.runner_status.as_ref() != Some(&status) {
            action.status.runner_status = Some(status.clone());
        }
        if !status.finished {
            return Ok(ReconcileOutcome::Requeue(self.config.poll_interval()));
        }

        action.status.output_type_instances = captured_outputs(rendered, &status);
        if status.succeeded {
            action.transition_to(ActionPhase::Succeeded)?;
            action.status.message = status.message.clone();
        } else {
            let reason = status
                .message
                .clone()
                .unwrap_or_else(|| "execution did not report success".to_owned());
            action.fail(reason)?;
        }
        self.finished(action, status.succeeded, elapsed);
        Ok(ReconcileOutcome::NOW)
    }

    /// Tear the execution down, then fail with `reason`.
    ///
    /// Until the backend confirms, the action stays Running and keeps its
    /// Type-instances locked.
    async fn abort(
        &self,
        action: &mut Action,
        handle: &ExecutionHandle,
        reason: String,
        elapsed: Duration,
    ) -> Result<ReconcileOutcome, EngineError> {
        match self.backend.cancel(handle).await {
            Ok(CancelStatus::Confirmed) => {
                action.fail(reason)?;
                self.finished(action, false, elapsed);
                Ok(ReconcileOutcome::NOW)
            }
            Ok(CancelStatus::Pending) => {
                debug!(action_id = %action.id, %handle, "Waiting for execution teardown before failing");
                action.status.message = Some(format!("waiting for execution teardown: {reason}"));
                Ok(ReconcileOutcome::Requeue(self.config.poll_interval()))
            }
            Err(err) => {
                warn!(action_id = %action.id, %handle, error = %err, "Cancel before failing failed");
                action.status.message = Some(format!("cancel: {err}; then: {reason}"));
                Ok(ReconcileOutcome::Requeue(self.config.poll_interval()))
            }
        }
    }

    fn finished(&self, action: &Action, succeeded: bool, duration: Duration) {
        self.events.emit(ActionEvent::Finished {
            action_id: action.id,
            succeeded,
            duration,
        });
    }

    fn context(&self, action: &Action) -> ExecutionContext {
        let mut context = ExecutionContext::new(action.id, action.name.clone());
        context.dry_run = action.spec.dry_run;
        context.timeout_ms = self.config.runner_timeout_ms;
        context.identity = action.status.identity.clone();
        context.metadata = action.spec.metadata.clone();
        context
    }

    // ── Cancel ──────────────────────────────────────────────────────────

    async fn cancel(&self, action: &mut Action) -> Result<ReconcileOutcome, EngineError> {
        self.events.emit(ActionEvent::CancelRequested {
            action_id: action.id,
            phase: action.phase().to_string(),
        });

        if let Some(handle) = action.status.execution_handle.clone() {
            match self.backend.cancel(&handle).await {
                Ok(CancelStatus::Confirmed) => {}
                Ok(CancelStatus::Pending) => {
                    debug!(action_id = %action.id, %handle, "Waiting for execution teardown");
                    action.status.message = Some("waiting for execution teardown".to_owned());
                    return Ok(ReconcileOutcome::Requeue(self.config.poll_interval()));
                }
                // Never gives up: the Type-instances stay locked until teardown is confirmed.
                Err(err) => {
                    let attempts = action.record_retry(format!("cancel: {err}"));
                    let delay = self.config.retry.delay_for_attempt(attempts - 1);
                    warn!(action_id = %action.id, %handle, error = %err, attempts, "Cancel failed, retrying");
                    return Ok(ReconcileOutcome::Requeue(delay));
                }
            }
        }

        action.status.render_progress = None;
        action.transition_to(ActionPhase::Cancelled)?;
        action.status.message = Some("cancelled on request".to_owned());
        Ok(if action.status.locked {
            ReconcileOutcome::NOW
        } else {
            ReconcileOutcome::Done
        })
    }

    // ── Terminal ────────────────────────────────────────────────────────

    async fn release(&self, action: &mut Action) -> ReconcileOutcome {
        if !action.status.locked {
            return ReconcileOutcome::Done;
        }
        let ids = action
            .status
            .rendered_workflow
            .as_ref()
            .map(|r| r.type_instances_to_lock.clone())
            .unwrap_or_default();
        match self.type_instances.unlock(&ids, &owner(action.id)).await {
            Ok(()) => {
                debug!(action_id = %action.id, count = ids.len(), "Type instances unlocked");
                action.status.locked = false;
                ReconcileOutcome::Done
            }
            Err(err) => {
                let attempts = action.status.attempts.saturating_add(1);
                action.status.attempts = attempts;
                warn!(action_id = %action.id, error = %err, attempts, "Unlock failed, retrying");
                ReconcileOutcome::Requeue(self.config.retry.delay_for_attempt(attempts - 1))
            }
        }
    }

    // ── Retry ───────────────────────────────────────────────────────────

    /// Record a failure that leaves the phase unchanged and back off, or fail
    /// the action once the retry budget is spent.
    fn retry(
        &self,
        action: &mut Action,
        message: String,
    ) -> Result<ReconcileOutcome, EngineError> {
        let attempts = action.record_retry(message.clone());
        if attempts >= self.config.retry.max_attempts {
            error!(
                action_id = %action.id,
                phase = %action.phase(),
                attempts,
                error = %message,
                "Retries exhausted"
            );
            action.status.render_progress = None;
            action.fail(format!("giving up after {attempts} attempts: {message}"))?;
            return Ok(ReconcileOutcome::NOW);
        }
        let delay = self.config.retry.delay_for_attempt(attempts - 1);
        warn!(
            action_id = %action.id,
            phase = %action.phase(),
            attempts,
            delay_ms = delay.as_millis() as u64,
            error = %message,
            "Retrying phase"
        );
        Ok(ReconcileOutcome::Requeue(delay))
    }
}

/// Lock owner used for an action's Type-instances.
#[must_use]
pub fn owner(id: ActionId) -> String {
    format!("action/{id}")
}

fn elapsed_since_submit(action: &Action) -> Duration {
    action
        .status
        .runner_started_at
        .and_then(|started| (Utc::now() - started).to_std().ok())
        .unwrap_or_default()
}

/// Reported output instances, restricted to the ones the workflow declared.
fn captured_outputs(
    rendered: &RenderOutput,
    status: &RunnerStatus,
) -> Vec<OutputTypeInstance> {
    status
        .output_type_instances
        .iter()
        .filter(|reported| {
            rendered
                .output_type_instances
                .iter()
                .any(|declared| declared.name == reported.name)
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quasar_core::ManifestRef;
    use quasar_render::OutputBinding;
    use quasar_workflow::Workflow;

    fn rendered(outputs: &[&str]) -> RenderOutput {
        RenderOutput {
            workflow: Workflow {
                entrypoint: "main".to_owned(),
                ..Workflow::default()
            },
            implementation: ManifestRef::new("cap.implementation.app"),
            iterations: 0,
            output_type_instances: outputs
                .iter()
                .map(|name| OutputBinding {
                    name: (*name).to_owned(),
                    global_artifact: (*name).to_owned(),
                    type_ref: None,
                    step: format!("output-{name}"),
                })
                .collect(),
            type_instances_to_lock: Vec::new(),
        }
    }

    fn reported(name: &str) -> OutputTypeInstance {
        OutputTypeInstance {
            name: name.to_owned(),
            type_ref: ManifestRef::new("cap.type.release"),
            id: format!("ti-{name}").as_str().into(),
        }
    }

    #[test]
    fn only_declared_outputs_are_captured() {
        let status = RunnerStatus {
            output_type_instances: vec![reported("release"), reported("stray")],
            ..RunnerStatus::succeeded()
        };
        let captured = captured_outputs(&rendered(&["release"]), &status);
        assert_eq!(captured, vec![reported("release")]);
    }

    #[test]
    fn owner_is_scoped_to_the_action() {
        let id = ActionId::v4();
        assert_eq!(owner(id), format!("action/{id}"));
    }
}
