use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::error::UpstreamError;
use crate::tokio_tools::{spawn_delayed, spawn_named_task};
use crate::tournament::clock::Clock;
use crate::tournament::error::{ErrorClass, TournamentError};
use crate::tournament::retry::RetryPolicy;
use crate::tournament::status::TournamentStatus;
use crate::tournament::types::TournamentId;

const LOG_TARGET: &str = "upstream::dispatch";

/// Payload of a time-triggered status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionTask {
    pub tournament_id: TournamentId,
    pub status: TournamentStatus,
    pub run_at_ms: i64,
}

/// At-least-once task dispatcher.
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    async fn schedule(&self, task: TransitionTask) -> Result<(), UpstreamError>;
}

/// Receiving end of a dispatched transition.
#[async_trait]
pub trait TransitionHandler: Send + Sync {
    async fn deliver(&self, task: &TransitionTask) -> Result<(), TournamentError>;
}

/// In-process dispatcher; pair it with [`run_dispatch_loop`].
#[derive(Clone)]
pub struct LocalDispatcher {
    tx: mpsc::UnboundedSender<TransitionTask>,
}

impl LocalDispatcher {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransitionTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl TaskDispatcher for LocalDispatcher {
    async fn schedule(&self, task: TransitionTask) -> Result<(), UpstreamError> {
        self.tx
            .send(task)
            .map_err(|_| UpstreamError::Dispatch("dispatch loop is not running".into()))
    }
}

fn is_retryable(err: &TournamentError) -> bool {
    matches!(err.class(), ErrorClass::Upstream | ErrorClass::Internal)
}

async fn deliver_with_retry(
    handler: Arc<dyn TransitionHandler>,
    policy: RetryPolicy,
    task: TransitionTask,
) {
    let mut attempt = 1;
    loop {
        match handler.deliver(&task).await {
            Ok(()) => {
                info!(
                    target: LOG_TARGET,
                    tournament_id = %task.tournament_id,
                    status = %task.status,
                    attempt,
                    "transition delivered"
                );
                return;
            }
            Err(err) if is_retryable(&err) && attempt < policy.max_attempts => {
                let delay = policy.jittered_delay(attempt);
                warn!(
                    target: LOG_TARGET,
                    tournament_id = %task.tournament_id,
                    status = %task.status,
                    attempt,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "transition failed; redelivering"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                warn!(
                    target: LOG_TARGET,
                    tournament_id = %task.tournament_id,
                    status = %task.status,
                    attempt,
                    error = %err,
                    "transition abandoned"
                );
                return;
            }
        }
    }
}

/// Drains the dispatcher channel, spawning one delayed delivery per task.
/// Ends when every [`LocalDispatcher`] handle is dropped.
pub fn run_dispatch_loop(
    mut rx: mpsc::UnboundedReceiver<TransitionTask>,
    handler: Arc<dyn TransitionHandler>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
) -> JoinHandle<()> {
    spawn_named_task("transition-dispatch", async move {
        while let Some(task) = rx.recv().await {
            let name = format!("transition-{}-{}", task.tournament_id, task.status);
            let wait_ms = task.run_at_ms.saturating_sub(clock.now_ms()).max(0);
            spawn_delayed(
                name,
                Duration::from_millis(wait_ms as u64),
                deliver_with_retry(handler.clone(), policy, task),
            );
        }
        info!(target: LOG_TARGET, "dispatch loop stopped");
    })
}
