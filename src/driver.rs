//! Async driver around the engine.
//!
//! The driver owns the [`Engine`] and runs it on one task. Host events and
//! requests arrive over an unbounded channel. Host commands go to a single
//! worker task that runs them one at a time in the order the engine issued
//! them, since later placements are anchored on tabs earlier commands moved;
//! each result comes back as another input. Requests get their answers through oneshot channels kept in a
//! pending map keyed by request id, so replies produced later (parked
//! requests, `new-tabs`) still reach their caller.

use crate::engine::{CommandId, Engine, IssuedCommand, Output, Reply};
use crate::gateway::RequestId;
use crate::host::{self, CommandOutcome, Host, HostError, HostEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tabtree_protocol::{
    ExternalRequest, ExternalResponse, InternalMessage, InternalResponse, TreeNotification,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// The driver has stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("engine driver is no longer running")]
    Closed,
}

/// A notification together with the collaborators listening for its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub notification: TreeNotification,
    pub listeners: Vec<String>,
}

enum DriverInput {
    Event(HostEvent),
    External {
        sender: String,
        request: ExternalRequest,
        reply: oneshot::Sender<ExternalResponse>,
    },
    Internal {
        message: InternalMessage,
        reply: oneshot::Sender<InternalResponse>,
    },
    Shutdown,
}

enum ReplySender {
    External(oneshot::Sender<ExternalResponse>),
    Internal(oneshot::Sender<InternalResponse>),
}

type Completion = (CommandId, Result<CommandOutcome, HostError>);

/// Cloneable handle for feeding the driver.
#[derive(Debug, Clone)]
pub struct DriverHandle {
    inputs: mpsc::UnboundedSender<DriverInput>,
}

impl DriverHandle {
    /// Deliver a host event
    pub fn send_event(&self, event: HostEvent) -> Result<(), DriverError> {
        self.inputs
            .send(DriverInput::Event(event))
            .map_err(|_| DriverError::Closed)
    }

    /// Send a collaborator request and wait for its reply
    pub async fn external(
        &self,
        sender: impl Into<String>,
        request: ExternalRequest,
    ) -> Result<ExternalResponse, DriverError> {
        let (reply, response) = oneshot::channel();
        self.inputs
            .send(DriverInput::External {
                sender: sender.into(),
                request,
                reply,
            })
            .map_err(|_| DriverError::Closed)?;
        response.await.map_err(|_| DriverError::Closed)
    }

    /// Send a presentation-layer message and wait for its reply
    pub async fn internal(&self, message: InternalMessage) -> Result<InternalResponse, DriverError> {
        let (reply, response) = oneshot::channel();
        self.inputs
            .send(DriverInput::Internal { message, reply })
            .map_err(|_| DriverError::Closed)?;
        response.await.map_err(|_| DriverError::Closed)
    }

    /// Stop the driver after the inputs already queued
    pub fn shutdown(&self) {
        let _ = self.inputs.send(DriverInput::Shutdown);
    }
}

impl std::fmt::Debug for DriverInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverInput::Event(event) => f.debug_tuple("Event").field(event).finish(),
            DriverInput::External { sender, request, .. } => f
                .debug_struct("External")
                .field("sender", sender)
                .field("request", request)
                .finish(),
            DriverInput::Internal { message, .. } => {
                f.debug_struct("Internal").field("message", message).finish()
            }
            DriverInput::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Runs an [`Engine`] against a [`Host`].
pub struct Driver<H: Host> {
    engine: Engine,
    host: Arc<H>,
    inputs: mpsc::UnboundedReceiver<DriverInput>,
    commands: mpsc::UnboundedSender<IssuedCommand>,
    commands_rx: Option<mpsc::UnboundedReceiver<IssuedCommand>>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    pending_replies: HashMap<RequestId, ReplySender>,
    notifications: mpsc::UnboundedSender<Delivery>,
}

impl<H: Host> Driver<H> {
    /// Create a driver, its input handle and the notification stream.
    pub fn new(
        engine: Engine,
        host: Arc<H>,
    ) -> (Self, DriverHandle, mpsc::UnboundedReceiver<Delivery>) {
        let (inputs_tx, inputs) = mpsc::unbounded_channel();
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (notifications, notifications_rx) = mpsc::unbounded_channel();
        let driver = Self {
            engine,
            host,
            inputs,
            commands,
            commands_rx: Some(commands_rx),
            completions_tx,
            completions_rx,
            pending_replies: HashMap::new(),
            notifications,
        };
        (driver, DriverHandle { inputs: inputs_tx }, notifications_rx)
    }

    /// Run until shut down or every handle is dropped; returns the engine.
    pub async fn run(mut self) -> Engine {
        log::info!("Tab tree driver started");
        if let Some(commands) = self.commands_rx.take() {
            tokio::spawn(run_commands(
                Arc::clone(&self.host),
                commands,
                self.completions_tx.clone(),
            ));
        }
        loop {
            let deadline = self.engine.next_deadline();
            tokio::select! {
                input = self.inputs.recv() => match input {
                    Some(DriverInput::Shutdown) | None => break,
                    Some(input) => self.handle_input(input),
                },
                Some((id, result)) = self.completions_rx.recv() => {
                    let out = self.engine.handle_completion(id, result, Instant::now());
                    self.apply(out);
                }
                _ = wait_until(deadline) => {
                    let out = self.engine.tick(Instant::now());
                    self.apply(out);
                }
            }
        }
        log::info!(
            "Tab tree driver stopped ({} requests unanswered)",
            self.pending_replies.len()
        );
        self.engine
    }

    fn handle_input(&mut self, input: DriverInput) {
        let now = Instant::now();
        match input {
            DriverInput::Event(event) => {
                let out = self.engine.handle_event(event, now);
                self.apply(out);
            }
            DriverInput::External {
                sender,
                request,
                reply,
            } => {
                let (id, out) = self.engine.handle_external(&sender, request, now);
                self.pending_replies.insert(id, ReplySender::External(reply));
                self.apply(out);
            }
            DriverInput::Internal { message, reply } => {
                let (id, out) = self.engine.handle_internal(message, now);
                self.pending_replies.insert(id, ReplySender::Internal(reply));
                self.apply(out);
            }
            DriverInput::Shutdown => {}
        }
    }

    fn apply(&mut self, out: Output) {
        for issued in out.commands {
            self.dispatch(issued);
        }
        for notification in out.notifications {
            let listeners = self.engine.listeners(notification.kind());
            let _ = self.notifications.send(Delivery {
                notification,
                listeners,
            });
        }
        for (id, reply) in out.replies {
            self.answer(id, reply);
        }
    }

    fn dispatch(&self, issued: IssuedCommand) {
        if self.commands.send(issued).is_err() {
            log::warn!("Host command worker is gone; command dropped");
        }
    }

    fn answer(&mut self, id: RequestId, reply: Reply) {
        let Some(sender) = self.pending_replies.remove(&id) else {
            log::debug!("Reply for request {} has no waiting caller", id);
            return;
        };
        let delivered = match (sender, reply) {
            (ReplySender::External(tx), Reply::External(response)) => tx.send(response).is_ok(),
            (ReplySender::Internal(tx), Reply::Internal(response)) => tx.send(response).is_ok(),
            _ => {
                log::warn!("Reply for request {} does not match its channel", id);
                false
            }
        };
        if !delivered {
            log::debug!("Caller of request {} went away", id);
        }
    }
}

/// Execute host commands strictly in issue order. Ends once the driver drops
/// its command sender.
async fn run_commands<H: Host>(
    host: Arc<H>,
    mut commands: mpsc::UnboundedReceiver<IssuedCommand>,
    completions: mpsc::UnboundedSender<Completion>,
) {
    while let Some(issued) = commands.recv().await {
        let result = host::execute(host.as_ref(), issued.command).await;
        if let Err(err) = &result {
            log::debug!("Host command {} failed: {}", issued.id, err);
        }
        let _ = completions.send((issued.id, result));
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
