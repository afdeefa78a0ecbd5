//! Tick loop: drives the [`Engine`] on a fixed cadence.
//!
//! The loop owns the engine and the dispatcher. Each tick it evaluates the
//! graph, hands the batch to the dispatcher without awaiting the devices,
//! and releases at most one queued notification. Edits arrive through an
//! [`EngineHandle`] and are queued for the next tick boundary; they never
//! shift the cadence.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use flowhub_domain::error::FlowHubError;
use flowhub_domain::graph::GraphDocument;

use crate::context::EngineContext;
use crate::dispatcher::Dispatcher;
use crate::ports::{DeviceController, RecordLog};
use crate::scheduler::{Engine, EngineCommand};

/// Default cadence.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

enum Control {
    Command(EngineCommand),
    Load(GraphDocument, oneshot::Sender<Result<(), FlowHubError>>),
    Shutdown,
}

/// Cloneable sender side of a running tick loop.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    sender: mpsc::UnboundedSender<Control>,
}

impl EngineHandle {
    /// Queue a graph edit; `false` once the loop has stopped.
    pub fn send(&self, command: EngineCommand) -> bool {
        self.sender.send(Control::Command(command)).is_ok()
    }

    /// Replace the running graph between two ticks.
    ///
    /// # Errors
    ///
    /// Returns the engine's load error, or [`FlowHubError::Storage`] if the
    /// loop is no longer running.
    pub async fn load(&self, document: GraphDocument) -> Result<(), FlowHubError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(Control::Load(document, reply))
            .map_err(|_| FlowHubError::Storage("tick loop stopped".into()))?;
        response
            .await
            .map_err(|_| FlowHubError::Storage("tick loop stopped".into()))?
    }

    /// Ask the loop to stop after the current tick.
    pub fn shutdown(&self) {
        let _ = self.sender.send(Control::Shutdown);
    }
}

pub struct TickLoop<D, L> {
    engine: Engine,
    dispatcher: Dispatcher<D, L>,
    context: Arc<EngineContext<L>>,
    interval: Duration,
    receiver: mpsc::UnboundedReceiver<Control>,
}

impl<D, L> TickLoop<D, L>
where
    D: DeviceController,
    L: RecordLog + 'static,
{
    /// Spawn the loop. The task ends when [`EngineHandle::shutdown`] is
    /// called or every handle is dropped, and yields the engine back.
    pub fn start(
        engine: Engine,
        dispatcher: Dispatcher<D, L>,
        context: Arc<EngineContext<L>>,
        interval: Duration,
    ) -> (EngineHandle, JoinHandle<Engine>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let tick_loop = Self {
            engine,
            dispatcher,
            context,
            interval: interval.max(Duration::from_millis(1)),
            receiver,
        };
        tracing::info!(interval = ?tick_loop.interval, "tick loop started");
        (EngineHandle { sender }, tokio::spawn(tick_loop.run()))
    }

    async fn run(mut self) -> Engine {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.step(),
                control = self.receiver.recv() => match control {
                    Some(Control::Command(command)) => self.engine.enqueue(command),
                    Some(Control::Load(document, reply)) => {
                        let result = self.engine.load(document);
                        if let Err(err) = &result {
                            tracing::error!(%err, "graph load rejected");
                        }
                        let _ = reply.send(result);
                    }
                    Some(Control::Shutdown) | None => break,
                },
            }
        }

        tracing::info!(ticks = self.engine.next_tick(), "tick loop stopped");
        self.engine
    }

    fn step(&mut self) {
        let report = self.engine.tick();
        if report.requested {
            tracing::trace!(tick = report.tick.index, "evaluating pending edits");
        }
        if !report.actions.is_empty() {
            self.dispatcher.dispatch_all(report.actions);
        }
        self.context.flush_notifications();
    }
}
