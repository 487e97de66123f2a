//! Scriptable in-memory execution backend.
//!
//! Nothing runs. Status reports come from a script set up by the caller, and
//! every side effect is counted so tests can assert idempotent re-entry.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use quasar_core::ActionId;
use quasar_ports::{
    CancelStatus, ExecutionBackend, ExecutionContext, ExecutionHandle, ExecutionIdentity,
    PortsError, RunnerInput, RunnerStatus,
};

/// In-memory [`ExecutionBackend`].
///
/// Without a script every execution reports success on the first poll.
/// With one, polls consume the scripted statuses in order and the last one
/// repeats.
#[derive(Default)]
pub struct MemoryBackend {
    identities: DashMap<String, ExecutionIdentity>,
    inputs: DashMap<ActionId, RunnerInput>,
    submissions: DashMap<String, ExecutionHandle>,
    executions: DashMap<ExecutionHandle, RunnerInput>,
    script: Mutex<VecDeque<RunnerStatus>>,
    cancel_polls: Mutex<HashMap<ExecutionHandle, usize>>,
    cancel_after: AtomicUsize,
    failing_submits: AtomicUsize,
    failing_statuses: AtomicUsize,
    cancels: AtomicUsize,
    identities_created: AtomicUsize,
    submitted: AtomicUsize,
}

impl MemoryBackend {
    /// Backend whose executions succeed immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `statuses` on successive polls.
    #[must_use]
    pub fn with_statuses(self, statuses: impl IntoIterator<Item = RunnerStatus>) -> Self {
        *self.script.lock() = statuses.into_iter().collect();
        self
    }

    /// Answer [`CancelStatus::Pending`] to the first `polls` cancel requests
    /// of each execution.
    #[must_use]
    pub fn with_cancel_after(self, polls: usize) -> Self {
        self.cancel_after.store(polls, Ordering::SeqCst);
        self
    }

    /// Pretend an identity was created by an earlier, interrupted pass.
    pub fn seed_identity(&self, name: impl Into<String>) {
        let name = name.into();
        self.identities
            .insert(name.clone(), ExecutionIdentity { name });
    }

    /// Make the next `count` submissions fail with a connection error.
    pub fn fail_next_submits(&self, count: usize) {
        self.failing_submits.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` status polls fail with a connection error.
    pub fn fail_next_statuses(&self, count: usize) {
        self.failing_statuses.store(count, Ordering::SeqCst);
    }

    /// Identity name used for `context`.
    #[must_use]
    pub fn identity_name(context: &ExecutionContext) -> String {
        format!("quasar-action-{}", context.action_id)
    }

    /// Identities created by this backend (seeded ones excluded).
    #[must_use]
    pub fn identities_created(&self) -> usize {
        self.identities_created.load(Ordering::SeqCst)
    }

    /// Executions actually started.
    #[must_use]
    pub fn submissions(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Cancel requests received, whatever their answer.
    #[must_use]
    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    /// Stored runner input for `action_id`.
    #[must_use]
    pub fn runner_input(&self, action_id: ActionId) -> Option<RunnerInput> {
        self.inputs.get(&action_id).map(|entry| entry.value().clone())
    }

    fn next_status(&self) -> RunnerStatus {
        let mut script = self.script.lock();
        match script.len() {
            0 => RunnerStatus::succeeded(),
            1 => script[0].clone(),
            _ => script.pop_front().unwrap_or_default(),
        }
    }
}

#[async_trait]
impl ExecutionBackend for MemoryBackend {
    async fn ensure_identity(
        &self,
        context: &ExecutionContext,
    ) -> Result<ExecutionIdentity, PortsError> {
        let name = Self::identity_name(context);
        let identity = self
            .identities
            .entry(name.clone())
            .or_insert_with(|| {
                self.identities_created.fetch_add(1, Ordering::SeqCst);
                ExecutionIdentity { name }
            })
            .value()
            .clone();
        Ok(identity)
    }

    async fn store_runner_input(&self, input: &RunnerInput) -> Result<(), PortsError> {
        let action_id = input.context.action_id;
        if self.inputs.contains_key(&action_id) {
            return Err(PortsError::already_exists("RunnerInput", action_id.to_string()));
        }
        self.inputs.insert(action_id, input.clone());
        Ok(())
    }

    async fn submit(
        &self,
        input: &RunnerInput,
        idempotency_key: &str,
    ) -> Result<ExecutionHandle, PortsError> {
        if self
            .failing_submits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PortsError::Connection("injected submit failure".to_owned()));
        }
        if let Some(existing) = self.submissions.get(idempotency_key) {
            return Err(PortsError::already_exists(
                "Execution",
                existing.value().as_str(),
            ));
        }

        let n = self.submitted.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = ExecutionHandle::new(format!("exec-{n}"));
        self.submissions
            .insert(idempotency_key.to_owned(), handle.clone());
        self.executions.insert(handle.clone(), input.clone());
        tracing::debug!(%handle, idempotency_key, "Execution submitted");
        Ok(handle)
    }

    async fn status(&self, handle: &ExecutionHandle) -> Result<RunnerStatus, PortsError> {
        if !self.executions.contains_key(handle) {
            return Err(PortsError::not_found("Execution", handle.as_str()));
        }
        if self
            .failing_statuses
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PortsError::Connection("injected status failure".to_owned()));
        }
        Ok(self.next_status())
    }

    async fn cancel(&self, handle: &ExecutionHandle) -> Result<CancelStatus, PortsError> {
        if !self.executions.contains_key(handle) {
            return Err(PortsError::not_found("Execution", handle.as_str()));
        }
        self.cancels.fetch_add(1, Ordering::SeqCst);
        let mut polls = self.cancel_polls.lock();
        let seen = polls.entry(handle.clone()).or_default();
        *seen += 1;
        if *seen > self.cancel_after.load(Ordering::SeqCst) {
            Ok(CancelStatus::Confirmed)
        } else {
            Ok(CancelStatus::Pending)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn input() -> RunnerInput {
        RunnerInput {
            context: ExecutionContext::new(ActionId::v4(), "install"),
            workflow: serde_json::json!({ "entrypoint": "main" }),
            parameters: None,
        }
    }

    #[tokio::test]
    async fn ensure_identity_reuses_existing() {
        let backend = MemoryBackend::new();
        let input = input();
        backend.seed_identity(MemoryBackend::identity_name(&input.context));

        let identity = backend.ensure_identity(&input.context).await.unwrap();
        assert_eq!(identity.name, MemoryBackend::identity_name(&input.context));
        assert_eq!(backend.identities_created(), 0);
    }

    #[tokio::test]
    async fn duplicate_submit_reports_existing_handle() {
        let backend = MemoryBackend::new();
        let input = input();
        let handle = backend.submit(&input, "key").await.unwrap();

        let err = backend.submit(&input, "key").await.unwrap_err();
        assert!(matches!(err, PortsError::AlreadyExists { ref id, .. } if id == handle.as_str()));
        assert_eq!(backend.submissions(), 1);
    }

    #[tokio::test]
    async fn scripted_statuses_repeat_the_last_one() {
        let backend = MemoryBackend::new()
            .with_statuses([RunnerStatus::running(), RunnerStatus::failed("boom")]);
        let handle = backend.submit(&input(), "key").await.unwrap();

        assert!(!backend.status(&handle).await.unwrap().finished);
        for _ in 0..2 {
            let status = backend.status(&handle).await.unwrap();
            assert!(status.finished && !status.succeeded);
        }
    }

    #[tokio::test]
    async fn cancel_confirms_after_configured_polls() {
        let backend = MemoryBackend::new().with_cancel_after(1);
        let handle = backend.submit(&input(), "key").await.unwrap();

        assert_eq!(backend.cancel(&handle).await.unwrap(), CancelStatus::Pending);
        assert_eq!(backend.cancel(&handle).await.unwrap(), CancelStatus::Confirmed);
        assert_eq!(backend.cancels(), 2);
    }

    #[tokio::test]
    async fn injected_status_failures_are_consumed() {
        let backend = MemoryBackend::new();
        let handle = backend.submit(&input(), "key").await.unwrap();
        backend.fail_next_statuses(1);

        assert!(backend.status(&handle).await.unwrap_err().is_retryable());
        assert!(backend.status(&handle).await.unwrap().succeeded);
    }

    #[tokio::test]
    async fn runner_input_is_stored_once() {
        let backend = MemoryBackend::new();
        let input = input();
        backend.store_runner_input(&input).await.unwrap();
        assert!(
            backend
                .store_runner_input(&input)
                .await
                .unwrap_err()
                .is_already_exists()
        );
        assert_eq!(backend.runner_input(input.context.action_id), Some(input));
    }
}
