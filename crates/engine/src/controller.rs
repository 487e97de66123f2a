//! Bounded worker pool feeding reconcile passes.
//!
//! The controller owns the scheduling guarantees the reconciler relies on:
//! distinct Actions are reconciled concurrently, up to `workers` at a time,
//! and a single Action is never reconciled by two passes at once.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use quasar_core::ActionId;
use quasar_execution::Action;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ControllerConfig;
use crate::error::EngineError;
use crate::reconciler::{ActionReconciler, ReconcileOutcome};

type PassResult = (ActionId, Result<ReconcileOutcome, EngineError>);

/// Schedules reconcile passes over a bounded worker pool.
pub struct Controller {
    reconciler: Arc<ActionReconciler>,
    config: ControllerConfig,
    sender: mpsc::Sender<ActionId>,
    receiver: Mutex<Option<mpsc::Receiver<ActionId>>>,
    /// Actions with a pass running; `true` once another request arrived.
    in_flight: DashMap<ActionId, bool>,
    /// Consecutive failed passes per action.
    failures: DashMap<ActionId, u32>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("config", &self.config)
            .field("in_flight", &self.in_flight.len())
            .field("shut_down", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Create a controller. Nothing runs until [`run`](Self::run).
    pub fn new(reconciler: Arc<ActionReconciler>, config: ControllerConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            reconciler,
            config,
            sender,
            receiver: Mutex::new(Some(receiver)),
            in_flight: DashMap::new(),
            failures: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// The reconciler passes are run with.
    #[must_use]
    pub fn reconciler(&self) -> &Arc<ActionReconciler> {
        &self.reconciler
    }

    /// Store a new Action and schedule its first pass.
    pub async fn submit(&self, action: Action) -> Result<ActionId, EngineError> {
        self.reconciler.create(&action).await?;
        self.enqueue(action.id).await?;
        Ok(action.id)
    }

    /// Set the run flag of `id` and schedule a pass.
    pub async fn request_run(&self, id: ActionId) -> Result<(), EngineError> {
        self.reconciler.update_spec(id, |spec| spec.run = true).await?;
        self.enqueue(id).await
    }

    /// Set the cancel flag of `id` and schedule a pass.
    pub async fn request_cancel(&self, id: ActionId) -> Result<(), EngineError> {
        self.reconciler
            .update_spec(id, |spec| spec.cancel = true)
            .await?;
        self.enqueue(id).await
    }

    /// Schedule a pass over `id`.
    pub async fn enqueue(&self, id: ActionId) -> Result<(), EngineError> {
        if self.shutdown.is_cancelled() {
            return Err(EngineError::ShutDown);
        }
        self.sender.send(id).await.map_err(|_| EngineError::ShutDown)
    }

    /// Schedule a pass over `id` once `delay` has elapsed.
    pub fn enqueue_after(&self, id: ActionId, delay: Duration) {
        let sender = self.sender.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let _ = sender.send(id).await;
                }
            }
        });
    }

    /// Enqueue every stored Action that is not finished.
    ///
    /// Run at startup to pick up work left behind by a previous process.
    pub async fn resync(&self) -> Result<usize, EngineError> {
        let mut scheduled = 0;
        for id in self.reconciler.list().await? {
            let action = self.reconciler.get(id).await?;
            if !action.phase().is_terminal() || action.status.locked {
                self.enqueue(id).await?;
                scheduled += 1;
            }
        }
        info!(scheduled, "Resync complete");
        Ok(scheduled)
    }

    /// Stop accepting work; [`run`](Self::run) returns once running passes end.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Process the queue until [`shutdown`](Self::shutdown).
    pub async fn run(&self) -> Result<(), EngineError> {
        let mut receiver = self
            .receiver
            .lock()
            .take()
            .ok_or(EngineError::AlreadyRunning)?;
        let permits = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut passes: JoinSet<PassResult> = JoinSet::new();
        info!(workers = self.config.workers, "Controller started");

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                Some(joined) = passes.join_next(), if !passes.is_empty() => match joined {
                    Ok((id, result)) => self.complete(id, result),
                    Err(err) => error!(error = %err, "Reconcile task aborted"),
                },
                received = receiver.recv() => {
                    let Some(id) = received else { break };
                    if let Some(mut dirty) = self.in_flight.get_mut(&id) {
                        *dirty = true;
                        continue;
                    }
                    let permit = tokio::select! {
                        () = self.shutdown.cancelled() => break,
                        permit = permits.clone().acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => break,
                        },
                    };
                    self.in_flight.insert(id, false);
                    let reconciler = Arc::clone(&self.reconciler);
                    passes.spawn(async move {
                        let _permit = permit;
                        let result = AssertUnwindSafe(reconciler.reconcile(id))
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|panic| {
                                Err(EngineError::TaskPanicked(panic_message(&*panic)))
                            });
                        (id, result)
                    });
                }
            }
        }

        debug!(in_flight = passes.len(), "Controller draining");
        while let Some(joined) = passes.join_next().await {
            if let Ok((id, result)) = joined {
                self.complete(id, result);
            }
        }
        info!("Controller stopped");
        Ok(())
    }

    fn complete(&self, id: ActionId, result: Result<ReconcileOutcome, EngineError>) {
        let dirty = self
            .in_flight
            .remove(&id)
            .is_some_and(|(_, dirty)| dirty);

        let next = match result {
            Ok(ReconcileOutcome::Done) => {
                self.failures.remove(&id);
                None
            }
            Ok(ReconcileOutcome::Requeue(delay)) => {
                self.failures.remove(&id);
                Some(delay)
            }
            Err(err) if err.is_retryable() => {
                let failures = {
                    let mut entry = self.failures.entry(id).or_insert(0);
                    *entry += 1;
                    *entry
                };
                let delay = self
                    .reconciler
                    .config()
                    .retry
                    .delay_for_attempt(failures - 1);
                warn!(action_id = %id, error = %err, failures, "Reconcile pass failed, retrying");
                Some(delay)
            }
            Err(err) => {
                self.failures.remove(&id);
                error!(action_id = %id, error = %err, "Reconcile pass failed permanently");
                None
            }
        };

        match next {
            Some(delay) if !delay.is_zero() && !dirty => self.enqueue_after(id, delay),
            Some(_) => self.enqueue_after(id, Duration::ZERO),
            None if dirty => self.enqueue_after(id, Duration::ZERO),
            None => {}
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}
