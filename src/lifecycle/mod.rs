// ABOUTME: Lifecycle gate: holds newly launched instances until bootstrap reports back.
// ABOUTME: Each hold ends exactly once, with the reported result or the default on timeout.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::backend::{BackendError, FleetOps};
use crate::config::LifecycleConfig;
use crate::fleet::LifecycleState;
use crate::types::{Color, InstanceId, LifecycleToken};

/// What happens to a held instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleResult {
    /// Release into service.
    Continue,
    /// Terminate without ever serving traffic.
    Abandon,
}

impl fmt::Display for LifecycleResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleResult::Continue => f.write_str("continue"),
            LifecycleResult::Abandon => f.write_str("abandon"),
        }
    }
}

/// How a hold ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Bootstrap reported a result before the heartbeat timeout.
    Completed(LifecycleResult),
    /// Nothing was reported in time; the configured default was applied.
    TimedOut(LifecycleResult),
}

impl GateOutcome {
    pub fn result(self) -> LifecycleResult {
        match self {
            GateOutcome::Completed(r) | GateOutcome::TimedOut(r) => r,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// Token was never issued or its hold already ended.
    #[error("unknown or already completed lifecycle token: {0}")]
    UnknownToken(LifecycleToken),

    #[error(transparent)]
    External(#[from] BackendError),

    #[error("lifecycle hold task failed: {0}")]
    TaskFailed(String),
}

/// A hold in progress.
pub struct LaunchHandle {
    pub token: LifecycleToken,
    pub instance: InstanceId,
    task: JoinHandle<Result<GateOutcome, BackendError>>,
}

impl fmt::Debug for LaunchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaunchHandle")
            .field("token", &self.token)
            .field("instance", &self.instance)
            .finish()
    }
}

impl LaunchHandle {
    /// Wait until the hold ends and the fleet manager has been told.
    pub async fn wait(self) -> Result<GateOutcome, LifecycleError> {
        match self.task.await {
            Ok(result) => Ok(result?),
            Err(e) => Err(LifecycleError::TaskFailed(e.to_string())),
        }
    }
}

struct Hold {
    instance: InstanceId,
    tx: oneshot::Sender<LifecycleResult>,
}

type PendingMap = HashMap<LifecycleToken, Hold>;

/// Holds launches until bootstrap calls [`LifecycleGate::complete`].
pub struct LifecycleGate<F: FleetOps + ?Sized + 'static> {
    ops: Arc<F>,
    heartbeat_timeout: Duration,
    default_result: LifecycleResult,
    pending: Arc<Mutex<PendingMap>>,
    sequence: AtomicU64,
}

impl<F: FleetOps + ?Sized + 'static> LifecycleGate<F> {
    pub fn new(ops: Arc<F>, config: &LifecycleConfig) -> Self {
        Self {
            ops,
            heartbeat_timeout: config.heartbeat_timeout,
            default_result: config.default_result,
            pending: Arc::new(Mutex::new(HashMap::new())),
            sequence: AtomicU64::new(1),
        }
    }

    /// Start holding `instance`. Must be called from within a tokio runtime.
    pub fn launch(&self, instance: InstanceId) -> LaunchHandle {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let token = LifecycleToken::new(format!("launch-{seq:06}-{instance}"));
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(
            token.clone(),
            Hold {
                instance: instance.clone(),
                tx,
            },
        );

        tracing::debug!(%instance, %token, timeout = ?self.heartbeat_timeout, "instance held at launch");

        let ops = Arc::clone(&self.ops);
        let pending = Arc::clone(&self.pending);
        let timeout = self.heartbeat_timeout;
        let default_result = self.default_result;
        let task_token = token.clone();
        let task_instance = instance.clone();

        let task = tokio::spawn(async move {
            let mut rx = rx;
            let reported = tokio::select! {
                reported = &mut rx => reported.ok(),
                _ = tokio::time::sleep(timeout) => None,
            };
            let outcome = match reported {
                Some(result) => GateOutcome::Completed(result),
                None => {
                    // `complete` sends while holding the lock: a hold that is
                    // already gone has a result waiting in the channel.
                    let still_held = pending.lock().remove(&task_token).is_some();
                    match rx.try_recv() {
                        Ok(result) if !still_held => GateOutcome::Completed(result),
                        _ => GateOutcome::TimedOut(default_result),
                    }
                }
            };
            pending.lock().remove(&task_token);

            if let GateOutcome::TimedOut(result) = outcome {
                tracing::warn!(
                    instance = %task_instance,
                    %result,
                    "no lifecycle result reported before heartbeat timeout"
                );
            }

            ops.complete_lifecycle_action(&task_instance, &task_token, outcome.result())
                .await?;
            tracing::info!(instance = %task_instance, result = %outcome.result(), "lifecycle action completed");
            Ok(outcome)
        });

        LaunchHandle {
            token,
            instance,
            task,
        }
    }

    /// Report the bootstrap result for a held instance.
    pub fn complete(
        &self,
        token: &LifecycleToken,
        result: LifecycleResult,
    ) -> Result<(), LifecycleError> {
        let mut pending = self.pending.lock();
        let hold = pending
            .remove(token)
            .ok_or_else(|| LifecycleError::UnknownToken(token.clone()))?;
        hold.tx
            .send(result)
            .map_err(|_| LifecycleError::UnknownToken(token.clone()))
    }

    /// Token of the hold on `instance`, if it is still held.
    pub fn token_for(&self, instance: &InstanceId) -> Option<LifecycleToken> {
        self.pending
            .lock()
            .iter()
            .find(|(_, hold)| &hold.instance == instance)
            .map(|(token, _)| token.clone())
    }

    /// Hold every pending instance of `color` that is not held yet.
    pub async fn hold_new_launches(&self, color: Color) -> Result<Vec<LaunchHandle>, BackendError> {
        let instances = self.ops.list_instances(color).await?;
        let handles: Vec<LaunchHandle> = instances
            .into_iter()
            .filter(|i| i.lifecycle_state == LifecycleState::Pending)
            .filter(|i| self.token_for(&i.id).is_none())
            .map(|i| self.launch(i.id))
            .collect();
        if !handles.is_empty() {
            tracing::info!(%color, held = handles.len(), "holding new launches");
        }
        Ok(handles)
    }

    /// Number of instances still held.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}
