//! Async event loop around the sans-IO controller.
//!
//! The [`Node`] owns a [`Controller`] and executes the actions it emits:
//! transmissions go to the [`Radio`] on a spawned task whose status comes
//! back through the event channel, timers live in a deadline table polled by
//! the loop, and notifications are forwarded to the application. Callers
//! talk to the loop through a cloneable [`NodeHandle`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use zwave_control::{
    Action, ControlError, Controller, ExclusionRequest, Handle, InclusionRequest, MemoryDirectory,
    NodeDirectory, NodeRecord, Notification, PriorityRoute, TimerKind, Transmission, TxStatus, TxTag,
};
use zwave_core::NodeId;

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::radio::{Inbound, Radio};

const EVENT_CAPACITY: usize = 1024;
const COMMAND_CAPACITY: usize = 64;
const NOTIFICATION_CAPACITY: usize = 256;

/// Events delivered to the loop from the radio side.
#[derive(Debug)]
enum NodeEvent {
    Frame(Inbound),
    TxComplete { tag: TxTag, status: TxStatus },
}

type Reply<T> = oneshot::Sender<T>;

#[derive(Debug)]
enum Command {
    BeginInclusion(InclusionRequest, Reply<Handle>),
    BeginExclusion(ExclusionRequest, Reply<Handle>),
    Stop(Reply<bool>),
    NeighborUpdate(NodeId, Reply<Handle>),
    AssignReturnRoute {
        source: NodeId,
        destination: NodeId,
        priority: Option<PriorityRoute>,
        reply: Reply<Handle>,
    },
    AssignSucReturnRoute {
        source: NodeId,
        priority: Option<PriorityRoute>,
        reply: Reply<Handle>,
    },
    DeleteReturnRoute {
        node: NodeId,
        suc_only: bool,
        reply: Reply<Handle>,
    },
    StopReturnRoute(Reply<bool>),
    NetworkUpdate(Reply<Handle>),
    RequestNodeInfo(NodeId, Reply<Result<(), ControlError>>),
    SetAuthority(Option<NodeId>, Reply<()>),
    Nodes(Reply<Vec<NodeRecord>>),
    Shutdown,
}

/// Cloneable front end to a running [`Node`].
#[derive(Debug, Clone)]
pub struct NodeHandle {
    commands: mpsc::Sender<Command>,
    events: mpsc::Sender<NodeEvent>,
}

impl NodeHandle {
    async fn call<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T, NodeError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| NodeError::ChannelClosed)?;
        response.await.map_err(|_| NodeError::ChannelClosed)
    }

    /// Hand a received frame to the controller.
    pub async fn deliver(&self, inbound: Inbound) -> Result<(), NodeError> {
        self.events
            .send(NodeEvent::Frame(inbound))
            .await
            .map_err(|_| NodeError::ChannelClosed)
    }

    pub async fn begin_inclusion(&self, request: InclusionRequest) -> Result<Handle, NodeError> {
        self.call(|reply| Command::BeginInclusion(request, reply)).await
    }

    pub async fn begin_exclusion(&self, request: ExclusionRequest) -> Result<Handle, NodeError> {
        self.call(|reply| Command::BeginExclusion(request, reply)).await
    }

    /// Stop a running inclusion or exclusion.
    pub async fn stop(&self) -> Result<bool, NodeError> {
        self.call(Command::Stop).await
    }

    pub async fn request_neighbor_update(&self, node: NodeId) -> Result<Handle, NodeError> {
        self.call(|reply| Command::NeighborUpdate(node, reply)).await
    }

    pub async fn assign_return_route(
        &self,
        source: NodeId,
        destination: NodeId,
        priority: Option<PriorityRoute>,
    ) -> Result<Handle, NodeError> {
        self.call(|reply| Command::AssignReturnRoute {
            source,
            destination,
            priority,
            reply,
        })
        .await
    }

    pub async fn assign_suc_return_route(
        &self,
        source: NodeId,
        priority: Option<PriorityRoute>,
    ) -> Result<Handle, NodeError> {
        self.call(|reply| Command::AssignSucReturnRoute {
            source,
            priority,
            reply,
        })
        .await
    }

    pub async fn delete_return_route(&self, node: NodeId, suc_only: bool) -> Result<Handle, NodeError> {
        self.call(|reply| Command::DeleteReturnRoute {
            node,
            suc_only,
            reply,
        })
        .await
    }

    pub async fn stop_return_route(&self) -> Result<bool, NodeError> {
        self.call(Command::StopReturnRoute).await
    }

    pub async fn request_network_update(&self) -> Result<Handle, NodeError> {
        self.call(Command::NetworkUpdate).await
    }

    pub async fn request_node_info(&self, node: NodeId) -> Result<(), NodeError> {
        Ok(self.call(|reply| Command::RequestNodeInfo(node, reply)).await??)
    }

    pub async fn set_authority(&self, authority: Option<NodeId>) -> Result<(), NodeError> {
        self.call(|reply| Command::SetAuthority(authority, reply)).await
    }

    /// Every record in the node directory, in ID order.
    pub async fn nodes(&self) -> Result<Vec<NodeRecord>, NodeError> {
        self.call(Command::Nodes).await
    }

    /// Ask the loop to exit.
    pub async fn shutdown(&self) -> Result<(), NodeError> {
        self.commands
            .send(Command::Shutdown)
            .await
            .map_err(|_| NodeError::ChannelClosed)
    }
}

/// A controller bound to a radio and driven by tokio.
pub struct Node<R: Radio> {
    controller: Controller<MemoryDirectory>,
    radio: Arc<R>,
    /// Deadline per running timer; restarting a timer replaces its entry.
    timers: HashMap<TimerKind, Instant>,
    event_tx: mpsc::Sender<NodeEvent>,
    event_rx: mpsc::Receiver<NodeEvent>,
    command_tx: mpsc::Sender<Command>,
    command_rx: mpsc::Receiver<Command>,
    notify_tx: mpsc::Sender<Notification>,
    notify_rx: Option<mpsc::Receiver<Notification>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    started: bool,
}

impl<R: Radio> Node<R> {
    /// Build a node with an empty directory from configuration.
    pub fn new(config: &NodeConfig, radio: R) -> Result<Self, NodeError> {
        let network = config.network_state()?;
        let control = config.to_control_config()?;
        let controller = Controller::new(network, control, MemoryDirectory::new());
        Ok(Self::with_controller(controller, radio))
    }

    /// Wrap an already configured controller, e.g. one with a restored directory.
    pub fn with_controller(controller: Controller<MemoryDirectory>, radio: R) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (notify_tx, notify_rx) = mpsc::channel(NOTIFICATION_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            controller,
            radio: Arc::new(radio),
            timers: HashMap::new(),
            event_tx,
            event_rx,
            command_tx,
            command_rx,
            notify_tx,
            notify_rx: Some(notify_rx),
            shutdown_tx,
            shutdown_rx,
            started: false,
        }
    }

    pub fn handle(&self) -> NodeHandle {
        NodeHandle {
            commands: self.command_tx.clone(),
            events: self.event_tx.clone(),
        }
    }

    /// The notification stream. Can be taken once.
    pub fn take_notifications(&mut self) -> Option<mpsc::Receiver<Notification>> {
        self.notify_rx.take()
    }

    pub fn controller(&self) -> &Controller<MemoryDirectory> {
        &self.controller
    }

    /// Signal the loop to exit.
    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Run the event loop until shutdown is requested.
    pub async fn run(&mut self) -> Result<(), NodeError> {
        if self.started {
            return Err(NodeError::AlreadyRunning);
        }
        self.started = true;
        {
            let network = self.controller.network();
            tracing::info!(
                home = %network.home_id,
                node = %network.node_id,
                role = ?network.role(),
                "entering event loop"
            );
        }
        self.flush();

        loop {
            let next_deadline = self.timers.values().min().copied();
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    tracing::info!("shutdown signal received");
                    break;
                }

                event = self.event_rx.recv() => match event {
                    Some(NodeEvent::Frame(inbound)) => {
                        self.controller.receive_frame(inbound.rx, &inbound.payload);
                    }
                    Some(NodeEvent::TxComplete { tag, status }) => {
                        self.controller.tx_complete(tag, status);
                    }
                    None => break,
                },

                command = self.command_rx.recv() => match command {
                    Some(Command::Shutdown) | None => {
                        tracing::info!("shutdown requested");
                        break;
                    }
                    Some(command) => self.execute(command),
                },

                _ = tokio::time::sleep_until(next_deadline.unwrap_or_else(Instant::now)),
                    if next_deadline.is_some() => {
                    self.fire_due_timers();
                }
            }
            self.flush();
        }

        self.timers.clear();
        tracing::info!("event loop stopped");
        Ok(())
    }

    fn execute(&mut self, command: Command) {
        let c = &mut self.controller;
        // A dropped reply receiver only means the caller stopped waiting.
        match command {
            Command::BeginInclusion(request, reply) => {
                let _ = reply.send(c.begin_inclusion(request));
            }
            Command::BeginExclusion(request, reply) => {
                let _ = reply.send(c.begin_exclusion(request));
            }
            Command::Stop(reply) => {
                let _ = reply.send(c.stop());
            }
            Command::NeighborUpdate(node, reply) => {
                let _ = reply.send(c.request_neighbor_update(node));
            }
            Command::AssignReturnRoute {
                source,
                destination,
                priority,
                reply,
            } => {
                let _ = reply.send(c.assign_return_route(source, destination, priority));
            }
            Command::AssignSucReturnRoute {
                source,
                priority,
                reply,
            } => {
                let _ = reply.send(c.assign_suc_return_route(source, priority));
            }
            Command::DeleteReturnRoute {
                node,
                suc_only,
                reply,
            } => {
                let _ = reply.send(c.delete_return_route(node, suc_only));
            }
            Command::StopReturnRoute(reply) => {
                let _ = reply.send(c.stop_return_route());
            }
            Command::NetworkUpdate(reply) => {
                let _ = reply.send(c.request_network_update());
            }
            Command::RequestNodeInfo(node, reply) => {
                let _ = reply.send(c.request_node_info(node));
            }
            Command::SetAuthority(authority, reply) => {
                c.set_authority(authority);
                let _ = reply.send(());
            }
            Command::Nodes(reply) => {
                let directory = c.directory();
                let nodes = directory
                    .ids()
                    .into_iter()
                    .filter_map(|id| directory.get(id))
                    .collect();
                let _ = reply.send(nodes);
            }
            Command::Shutdown => {}
        }
    }

    fn fire_due_timers(&mut self) {
        let now = Instant::now();
        let mut due: Vec<(Instant, TimerKind)> = self
            .timers
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(kind, at)| (*at, *kind))
            .collect();
        due.sort_by_key(|(at, _)| *at);
        for (_, kind) in due {
            self.timers.remove(&kind);
            self.controller.timer_expired(kind);
        }
    }

    /// Execute everything the controller has queued, until it is quiet.
    fn flush(&mut self) {
        loop {
            let actions = self.controller.poll_actions();
            if actions.is_empty() {
                return;
            }
            for action in actions {
                self.apply(action);
            }
        }
    }

    fn apply(&mut self, action: Action) {
        match action {
            Action::Transmit(tx) => self.transmit(tx),
            Action::StartTimer { timer, after } => {
                self.timers.insert(timer, Instant::now() + after);
            }
            Action::StopTimer(timer) => {
                self.timers.remove(&timer);
            }
            Action::Notify(notification) => match self.notify_tx.try_send(notification) {
                Ok(()) => {}
                Err(TrySendError::Full(notification)) => {
                    tracing::warn!(?notification, "notification dropped, receiver is lagging");
                }
                Err(TrySendError::Closed(_)) => {}
            },
        }
    }

    fn transmit(&mut self, tx: Transmission) {
        let payload = match tx.frame.encode() {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(destination = %tx.destination, frame = tx.frame.name(), %error, "frame does not encode");
                self.controller.tx_complete(tx.tag, TxStatus::Failed);
                return;
            }
        };
        let radio = Arc::clone(&self.radio);
        let events = self.event_tx.clone();
        tokio::spawn(async move {
            let status = radio.transmit(&tx, &payload).await;
            tracing::trace!(destination = %tx.destination, ?status, "radio reported");
            let _ = events
                .send(NodeEvent::TxComplete {
                    tag: tx.tag,
                    status,
                })
                .await;
        });
    }
}
