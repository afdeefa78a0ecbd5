//! Pending action dispatcher: runs device commands off the tick path.
//!
//! Each normalized entity id gets one sequential worker task, so commands
//! to the same entity keep their order across ticks while different
//! entities are served concurrently. [`Dispatcher::dispatch`] never waits
//! for the device; the caller gets a [`DispatchTicket`] it may await or
//! drop. Failures are recorded and announced, never retried.
//!
//! A worker that stays idle for [`DEFAULT_WORKER_IDLE`] closes its queue,
//! finishes whatever raced in, and exits; the next command for that entity
//! starts a fresh one. The OUTGOING record is written on the blocking pool
//! so a slow log never stalls the runtime.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use flowhub_domain::action::PendingAction;
use flowhub_domain::id::{DispatchId, EntityId};

use crate::context::EngineContext;
use crate::ports::{DeviceController, RecordLog};

/// How long a per-entity worker waits for work before exiting.
pub const DEFAULT_WORKER_IDLE: Duration = Duration::from_secs(60);

/// How one dispatch attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub dispatch_id: DispatchId,
    pub entity_id: EntityId,
    pub success: bool,
    pub error: Option<String>,
}

/// Handle on an in-flight dispatch.
#[derive(Debug)]
pub struct DispatchTicket {
    pub dispatch_id: DispatchId,
    pub entity_id: EntityId,
    receiver: oneshot::Receiver<DispatchOutcome>,
}

impl DispatchTicket {
    /// Wait for the device call to finish.
    pub async fn outcome(self) -> DispatchOutcome {
        match self.receiver.await {
            Ok(outcome) => outcome,
            Err(_) => DispatchOutcome {
                dispatch_id: self.dispatch_id,
                entity_id: self.entity_id,
                success: false,
                error: Some("dispatcher stopped before the command completed".to_string()),
            },
        }
    }
}

struct Job {
    id: DispatchId,
    action: PendingAction,
    reply: oneshot::Sender<DispatchOutcome>,
}

pub struct Dispatcher<D, L> {
    controller: Arc<D>,
    context: Arc<EngineContext<L>>,
    workers: HashMap<EntityId, mpsc::UnboundedSender<Job>>,
    idle_timeout: Duration,
}

impl<D, L> Dispatcher<D, L>
where
    D: DeviceController,
    L: RecordLog + 'static,
{
    #[must_use]
    pub fn new(controller: Arc<D>, context: Arc<EngineContext<L>>) -> Self {
        Self {
            controller,
            context,
            workers: HashMap::new(),
            idle_timeout: DEFAULT_WORKER_IDLE,
        }
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Hand `action` to its entity's worker. Must be called inside a tokio runtime.
    pub fn dispatch(&mut self, action: PendingAction) -> DispatchTicket {
        let id = DispatchId::new();
        let entity_id = action.entity_id.clone();
        let (reply, receiver) = oneshot::channel();
        let mut job = Job { id, action, reply };

        if let Some(sender) = self.workers.get(&entity_id) {
            match sender.send(job) {
                Ok(()) => {
                    return DispatchTicket {
                        dispatch_id: id,
                        entity_id,
                        receiver,
                    };
                }
                Err(mpsc::error::SendError(returned)) => job = returned,
            }
        }

        let sender = self.spawn_worker(&entity_id);
        if let Err(mpsc::error::SendError(job)) = sender.send(job) {
            tracing::error!(entity_id = %job.action.entity_id, "dispatch worker unavailable");
        }
        self.workers.insert(entity_id.clone(), sender);
        DispatchTicket {
            dispatch_id: id,
            entity_id,
            receiver,
        }
    }

    /// Dispatch a tick's batch in order, dropping workers that went idle.
    pub fn dispatch_all(&mut self, actions: Vec<PendingAction>) -> Vec<DispatchTicket> {
        self.workers.retain(|_, sender| !sender.is_closed());
        actions
            .into_iter()
            .map(|action| self.dispatch(action))
            .collect()
    }

    /// Entities that currently have a worker.
    #[must_use]
    pub fn active_workers(&self) -> usize {
        self.workers.values().filter(|s| !s.is_closed()).count()
    }

    fn spawn_worker(&self, entity_id: &EntityId) -> mpsc::UnboundedSender<Job> {
        let (sender, receiver) = mpsc::unbounded_channel();
        tracing::debug!(entity_id = %entity_id, "starting dispatch worker");
        tokio::spawn(run_worker(
            receiver,
            Arc::clone(&self.controller),
            Arc::clone(&self.context),
            self.idle_timeout,
        ));
        sender
    }
}

impl<D, L> std::fmt::Debug for Dispatcher<D, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("workers", &self.workers.len())
            .finish_non_exhaustive()
    }
}

async fn run_worker<D, L>(
    mut receiver: mpsc::UnboundedReceiver<Job>,
    controller: Arc<D>,
    context: Arc<EngineContext<L>>,
    idle_timeout: Duration,
) where
    D: DeviceController,
    L: RecordLog + 'static,
{
    loop {
        match tokio::time::timeout(idle_timeout, receiver.recv()).await {
            Ok(Some(job)) => run_job(job, &*controller, &context).await,
            Ok(None) => break,
            Err(_) => {
                receiver.close();
                while let Some(job) = receiver.recv().await {
                    run_job(job, &*controller, &context).await;
                }
                tracing::debug!("dispatch worker idle, stopping");
                break;
            }
        }
    }
}

async fn run_job<D, L>(job: Job, controller: &D, context: &Arc<EngineContext<L>>)
where
    D: DeviceController,
    L: RecordLog + 'static,
{
    let Job { id, action, reply } = job;
    let record_context = Arc::clone(context);
    let record_action = action.clone();
    let recorded = tokio::task::spawn_blocking(move || {
        record_context.record_dispatch(&record_action);
    })
    .await;
    if let Err(err) = recorded {
        tracing::error!(entity_id = %action.entity_id, %err, "recording command failed");
    }

    let outcome = match controller.control_device(&action).await {
        Ok(()) => {
            tracing::info!(
                entity_id = %action.entity_id,
                action = %action.action(),
                node_id = %action.origin_node_id,
                reason = %action.reason,
                "device command sent"
            );
            DispatchOutcome {
                dispatch_id: id,
                entity_id: action.entity_id.clone(),
                success: true,
                error: None,
            }
        }
        Err(err) => {
            tracing::warn!(
                entity_id = %action.entity_id,
                node_id = %action.origin_node_id,
                %err,
                "device command failed"
            );
            context.record_dispatch_failure(&action, &err);
            DispatchOutcome {
                dispatch_id: id,
                entity_id: action.entity_id.clone(),
                success: false,
                error: Some(err.to_string()),
            }
        }
    };
    // the ticket may have been dropped
    let _ = reply.send(outcome);
}
