//! Topology-authority update distribution.
//!
//! Three roles share this component:
//! - **authority**: appends committed changes to the circular [`UpdateLog`]
//!   and replays it to controllers that ask, entry by entry, each frame
//!   gated by its acknowledgment;
//! - **requester**: asks the authority for a replay and applies what it
//!   streams;
//! - **registrar**: a controller that is not the authority keeps changes it
//!   could not deliver in [`PendingUpdates`] and retries with backoff.

pub mod log;
pub mod pending;

pub use log::{Backlog, ChangeKind, UpdateLog, UpdateLogEntry};
pub use pending::PendingUpdates;

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use zwave_core::constants::{NodesExistStatus, NodesExistType, TransferStatus};
use zwave_core::{NodeId, NodeInfo, NodeMask, ProtocolFrame};

use crate::action::{Handle, Notification, Owner, RxInfo, TimerKind, TxStatus, TxTag};
use crate::context::{Ctx, Outgoing};
use crate::directory::{NodeDirectory, NodeRecord, commit_neighbors, existing_mask, purge_node};
use crate::error::ControlError;

/// Effect of a replay frame once the requester acknowledged it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnAck {
    Nothing,
    /// The requester now holds every entry below this index.
    Advance(u64),
    /// Wait for the nodes-exist reply before continuing.
    AwaitReply,
    /// Replay complete; `Some` records the requester's new cursor.
    Finish(Option<u64>),
}

#[derive(Debug)]
struct Replay {
    requester: NodeId,
    steps: VecDeque<(ProtocolFrame, OnAck)>,
    in_flight: Option<OnAck>,
    awaiting_reply: bool,
}

#[derive(Debug)]
struct Request {
    handle: Handle,
    authority: NodeId,
}

#[derive(Debug)]
struct Registration {
    node: NodeId,
    frames: VecDeque<ProtocolFrame>,
    /// The node changed again after these frames were built.
    stale: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplayState {
    Idle,
    Streaming,
    AwaitNodesExistReply,
}

#[derive(Debug, Default)]
pub(crate) struct UpdateDistributor {
    log: UpdateLog,
    cursors: BTreeMap<NodeId, u64>,
    out_of_date: BTreeSet<NodeId>,
    pending: PendingUpdates,
    replay: Option<Replay>,
    replay_epoch: u32,
    request: Option<Request>,
    request_epoch: u32,
    registration: Option<Registration>,
    registration_epoch: u32,
}

/// Frames describing one node: its info, then its neighbors when present.
fn node_frames(directory: &dyn NodeDirectory, node: NodeId) -> (ProtocolFrame, Option<ProtocolFrame>) {
    match directory.get(node) {
        Some(record) => (
            ProtocolFrame::NewNodeRegistered {
                node_id: node,
                info: record.info,
            },
            Some(ProtocolFrame::NewRangeRegistered {
                node_id: node,
                neighbors: record.neighbors,
            }),
        ),
        None => (
            ProtocolFrame::NewNodeRegistered {
                node_id: node,
                info: NodeInfo::removed(),
            },
            None,
        ),
    }
}

/// Apply a registered node-info frame. Idempotent.
fn apply_node_info(ctx: &mut Ctx<'_>, node: NodeId, info: &NodeInfo) -> ChangeKind {
    if info.is_removed_marker() {
        if node != ctx.network.node_id {
            purge_node(ctx.directory, node);
        }
        return ChangeKind::NodeRemoved;
    }
    let mut record = ctx
        .directory
        .get(node)
        .unwrap_or_else(|| NodeRecord::new(node, info.clone()));
    record.info = info.clone();
    ctx.directory.put(node, record);
    ChangeKind::NodeAdded
}

fn apply_neighbors(ctx: &mut Ctx<'_>, node: NodeId, neighbors: &NodeMask) -> bool {
    if !ctx.directory.exists(node) {
        return false;
    }
    commit_neighbors(ctx.directory, node, neighbors);
    true
}

impl UpdateDistributor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> &UpdateLog {
        &self.log
    }

    pub fn pending(&self) -> &PendingUpdates {
        &self.pending
    }

    pub fn cursor_of(&self, controller: NodeId) -> Option<u64> {
        self.cursors.get(&controller).copied()
    }

    pub fn out_of_date(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.out_of_date.iter().copied()
    }

    pub fn is_requesting(&self) -> bool {
        self.request.is_some()
    }

    pub fn replay_state(&self) -> ReplayState {
        match &self.replay {
            None => ReplayState::Idle,
            Some(r) if r.awaiting_reply => ReplayState::AwaitNodesExistReply,
            Some(_) => ReplayState::Streaming,
        }
    }

    // -- authority ---------------------------------------------------------

    fn append(&mut self, ctx: &Ctx<'_>, change: ChangeKind, node: NodeId, origin: Option<NodeId>) {
        let info = match change {
            ChangeKind::NodeRemoved => NodeInfo::removed(),
            _ => ctx.directory.info(node).unwrap_or_else(NodeInfo::removed),
        };
        let before = self.log.cursor();
        let after = self.log.append(UpdateLogEntry { change, node, info });
        if change == ChangeKind::NodeRemoved {
            self.cursors.remove(&node);
            self.out_of_date.remove(&node);
        }
        for (controller, cursor) in self.cursors.iter_mut() {
            // The originator already holds the change it reported.
            if Some(*controller) == origin && *cursor == before {
                *cursor = after;
                continue;
            }
            self.out_of_date.insert(*controller);
        }
        tracing::debug!(%node, ?change, cursor = after, "update log append");
    }

    /// Record a committed change made by this node.
    pub fn register(&mut self, ctx: &mut Ctx<'_>, change: ChangeKind, node: NodeId) {
        if !ctx.network.policy().is_controller() || !node.is_classic() {
            return;
        }
        if ctx.network.is_authority() {
            self.append(ctx, change, node, None);
            return;
        }
        if self.pending.insert(node) {
            tracing::debug!(%node, ?change, "change pending for authority");
        }
        if let Some(registration) = self.registration.as_mut().filter(|r| r.node == node) {
            registration.stale = true;
        }
        self.scan(ctx);
    }

    pub fn on_update_start(&mut self, ctx: &mut Ctx<'_>, rx: &RxInfo) {
        let requester = rx.source;
        if !ctx.network.is_authority() {
            self.send_transfer_end(ctx, requester, TransferStatus::Disabled);
            return;
        }
        if let Some(replay) = &self.replay {
            if replay.requester != requester {
                tracing::debug!(%requester, busy_with = %replay.requester, "replay busy");
                self.send_transfer_end(ctx, requester, TransferStatus::Wait);
                return;
            }
            self.abort_replay(ctx, "requester restarted");
        }

        let backlog = match self.cursors.get(&requester) {
            Some(consumed) => self.log.backlog(*consumed),
            None => Backlog::Overflow,
        };
        tracing::info!(%requester, ?backlog, "replay requested");
        let mut steps = VecDeque::new();
        match backlog {
            Backlog::CaughtUp => {
                steps.push_back((
                    ProtocolFrame::TransferEnd {
                        status: TransferStatus::Done,
                    },
                    OnAck::Finish(None),
                ));
            }
            Backlog::Entries { from, to } => {
                for index in from..to {
                    let Some(entry) = self.log.get(index) else {
                        continue;
                    };
                    let neighbors = match entry.change {
                        ChangeKind::NodeRemoved => NodeMask::new(),
                        _ => ctx.directory.neighbors(entry.node),
                    };
                    steps.push_back((
                        ProtocolFrame::NewNodeRegistered {
                            node_id: entry.node,
                            info: entry.info.clone(),
                        },
                        OnAck::Nothing,
                    ));
                    steps.push_back((
                        ProtocolFrame::NewRangeRegistered {
                            node_id: entry.node,
                            neighbors,
                        },
                        OnAck::Advance(index + 1),
                    ));
                }
                steps.push_back((
                    ProtocolFrame::TransferEnd {
                        status: TransferStatus::Done,
                    },
                    OnAck::Finish(Some(to)),
                ));
            }
            Backlog::Overflow => {
                steps.push_back((
                    ProtocolFrame::NodesExist {
                        kind: NodesExistType::All,
                        nodes: existing_mask(ctx.directory),
                    },
                    OnAck::AwaitReply,
                ));
            }
        }
        self.replay = Some(Replay {
            requester,
            steps,
            in_flight: None,
            awaiting_reply: false,
        });
        self.replay_next(ctx);
    }

    fn replay_next(&mut self, ctx: &mut Ctx<'_>) {
        let Some(replay) = self.replay.as_mut() else {
            return;
        };
        match replay.steps.pop_front() {
            Some((frame, on_ack)) => {
                replay.in_flight = Some(on_ack);
                ctx.out.send(
                    Owner::Replay,
                    self.replay_epoch,
                    Outgoing::to(replay.requester, frame),
                );
            }
            None if replay.awaiting_reply => {}
            None => {
                self.replay = None;
                self.replay_epoch = self.replay_epoch.wrapping_add(1);
            }
        }
    }

    fn on_replay_tx(&mut self, ctx: &mut Ctx<'_>, status: TxStatus) {
        let Some(replay) = self.replay.as_mut() else {
            return;
        };
        let Some(on_ack) = replay.in_flight.take() else {
            return;
        };
        if !status.is_ok() {
            self.abort_replay(ctx, "frame not acknowledged");
            return;
        }
        let requester = replay.requester;
        match on_ack {
            OnAck::Nothing => {}
            OnAck::Advance(cursor) => {
                self.cursors.insert(requester, cursor);
            }
            OnAck::AwaitReply => {
                replay.awaiting_reply = true;
                ctx.out.start_timer(TimerKind::Replay, ctx.config.timing.update_timeout);
                return;
            }
            OnAck::Finish(cursor) => {
                if let Some(cursor) = cursor {
                    self.cursors.insert(requester, cursor);
                }
                if self.cursors.get(&requester) == Some(&self.log.cursor()) {
                    self.out_of_date.remove(&requester);
                }
                tracing::info!(%requester, "replay complete");
            }
        }
        self.replay_next(ctx);
    }

    fn on_nodes_exist_reply(&mut self, ctx: &mut Ctx<'_>, rx: &RxInfo, status: NodesExistStatus) {
        let Some(replay) = self.replay.as_mut() else {
            return;
        };
        if !replay.awaiting_reply || rx.source != replay.requester {
            return;
        }
        ctx.out.stop_timer(TimerKind::Replay);
        replay.awaiting_reply = false;
        if status != NodesExistStatus::Done {
            tracing::debug!(requester = %replay.requester, ?status, "nodes exist not understood");
        }
        let requester = replay.requester;
        let cursor = self.log.cursor();
        let mut steps = VecDeque::new();
        for node in ctx.directory.ids() {
            if !node.is_classic() || node == requester {
                continue;
            }
            let (info, range) = node_frames(ctx.directory, node);
            steps.push_back((info, OnAck::Nothing));
            if let Some(range) = range {
                steps.push_back((range, OnAck::Nothing));
            }
        }
        steps.push_back((
            ProtocolFrame::TransferEnd {
                status: TransferStatus::Done,
            },
            OnAck::Finish(Some(cursor)),
        ));
        replay.steps = steps;
        self.replay_next(ctx);
    }

    fn abort_replay(&mut self, ctx: &mut Ctx<'_>, reason: &str) {
        if let Some(replay) = self.replay.take() {
            tracing::warn!(requester = %replay.requester, reason, "replay aborted");
        }
        self.replay_epoch = self.replay_epoch.wrapping_add(1);
        ctx.out.cancel(Owner::Replay);
        ctx.out.stop_timer(TimerKind::Replay);
    }

    pub fn on_replay_timer(&mut self, ctx: &mut Ctx<'_>) {
        if self.replay.as_ref().is_some_and(|r| r.awaiting_reply) {
            self.abort_replay(ctx, "nodes exist reply timeout");
        }
    }

    fn send_transfer_end(&mut self, ctx: &mut Ctx<'_>, to: NodeId, status: TransferStatus) {
        ctx.out.send(
            Owner::Dispatcher,
            0,
            Outgoing::to(to, ProtocolFrame::TransferEnd { status }),
        );
    }

    // -- requester ---------------------------------------------------------

    pub fn request(&mut self, ctx: &mut Ctx<'_>, handle: Handle) -> Result<(), ControlError> {
        if !ctx.network.policy().is_controller() {
            return Err(ControlError::NotSupported);
        }
        if ctx.network.is_authority() {
            return Err(ControlError::NotAuthority);
        }
        let Some(authority) = ctx.network.remote_authority() else {
            return Err(ControlError::NoAuthorityKnown);
        };
        if self.request.is_some() {
            return Err(ControlError::Busy);
        }
        tracing::info!(%authority, "network update requested");
        self.request_epoch = self.request_epoch.wrapping_add(1);
        self.request = Some(Request { handle, authority });
        ctx.out.send(
            Owner::UpdateRequest,
            self.request_epoch,
            Outgoing::to(authority, ProtocolFrame::AutomaticControllerUpdateStart),
        );
        Ok(())
    }

    fn on_request_tx(&mut self, ctx: &mut Ctx<'_>, status: TxStatus) {
        let Some(request) = &self.request else {
            return;
        };
        if status.is_ok() {
            ctx.out
                .start_timer(TimerKind::NetworkUpdate, ctx.config.timing.update_timeout);
            return;
        }
        let handle = request.handle;
        self.end_request(ctx, Err(status.into_error()));
        tracing::debug!(handle = handle.0, ?status, "update request not delivered");
    }

    fn end_request(&mut self, ctx: &mut Ctx<'_>, result: Result<TransferStatus, ControlError>) {
        let Some(request) = self.request.take() else {
            return;
        };
        self.request_epoch = self.request_epoch.wrapping_add(1);
        ctx.out.stop_timer(TimerKind::NetworkUpdate);
        ctx.out.cancel(Owner::UpdateRequest);
        tracing::info!(result = ?result, "network update finished");
        ctx.out.notify(Notification::NetworkUpdate {
            handle: request.handle,
            result,
        });
    }

    pub fn on_request_timer(&mut self, ctx: &mut Ctx<'_>) {
        if self.request.is_none() {
            return;
        }
        tracing::warn!("authority stopped streaming, update aborted");
        self.end_request(ctx, Ok(TransferStatus::Abort));
        ctx.out.notify(Notification::RoutingCheckRestarted);
    }

    fn from_authority(&self, rx: &RxInfo) -> bool {
        self.request.as_ref().is_some_and(|r| r.authority == rx.source)
    }

    // -- registrar ---------------------------------------------------------

    /// Try to deliver the lowest pending node to the authority.
    pub fn scan(&mut self, ctx: &mut Ctx<'_>) {
        if self.registration.is_some() {
            return;
        }
        let Some(authority) = ctx.network.remote_authority() else {
            return;
        };
        let Some(node) = self.pending.first() else {
            return;
        };
        let (info, range) = node_frames(ctx.directory, node);
        let mut frames = VecDeque::from([info]);
        frames.extend(range);
        tracing::debug!(%node, %authority, "registering change with authority");
        self.registration_epoch = self.registration_epoch.wrapping_add(1);
        self.registration = Some(Registration {
            node,
            frames,
            stale: false,
        });
        self.send_registration(ctx, authority);
    }

    fn send_registration(&mut self, ctx: &mut Ctx<'_>, authority: NodeId) {
        let Some(registration) = self.registration.as_mut() else {
            return;
        };
        if let Some(frame) = registration.frames.pop_front() {
            ctx.out.send(
                Owner::Registration,
                self.registration_epoch,
                Outgoing::to(authority, frame),
            );
            return;
        }
        let node = registration.node;
        let stale = registration.stale;
        self.registration = None;
        self.pending.reset_backoff();
        if stale {
            tracing::debug!(%node, "node changed during registration, sending again");
        } else {
            self.pending.remove(node);
            tracing::debug!(%node, "change delivered to authority");
        }
        self.scan(ctx);
    }

    fn on_registration_tx(&mut self, ctx: &mut Ctx<'_>, status: TxStatus) {
        if self.registration.is_none() {
            return;
        }
        let Some(authority) = ctx.network.remote_authority() else {
            self.registration = None;
            return;
        };
        if status.is_ok() {
            self.send_registration(ctx, authority);
            return;
        }
        self.registration = None;
        let timing = &ctx.config.timing;
        let delay = self
            .pending
            .next_backoff(timing.pending_base, timing.pending_max_step);
        tracing::debug!(?status, ?delay, "authority unreachable, retry later");
        ctx.out.start_timer(TimerKind::PendingScan, delay);
    }

    /// The known authority changed.
    pub fn on_authority_changed(&mut self, ctx: &mut Ctx<'_>) {
        self.registration = None;
        self.registration_epoch = self.registration_epoch.wrapping_add(1);
        ctx.out.cancel(Owner::Registration);
        ctx.out.stop_timer(TimerKind::PendingScan);
        if ctx.network.is_authority() {
            // This directory is now the reference; nothing to forward.
            self.pending.clear();
            return;
        }
        self.pending.reset_backoff();
        self.scan(ctx);
    }

    // -- dispatch ----------------------------------------------------------

    pub fn on_tx(&mut self, ctx: &mut Ctx<'_>, tag: TxTag, status: TxStatus) {
        match tag.owner {
            Owner::Replay if tag.epoch == self.replay_epoch => self.on_replay_tx(ctx, status),
            Owner::UpdateRequest if tag.epoch == self.request_epoch => {
                self.on_request_tx(ctx, status)
            }
            Owner::Registration if tag.epoch == self.registration_epoch => {
                self.on_registration_tx(ctx, status)
            }
            _ => {}
        }
    }

    pub fn on_frame(&mut self, ctx: &mut Ctx<'_>, rx: &RxInfo, frame: &ProtocolFrame) {
        match frame {
            ProtocolFrame::AutomaticControllerUpdateStart => self.on_update_start(ctx, rx),
            ProtocolFrame::NodesExistReply { status, .. } => {
                self.on_nodes_exist_reply(ctx, rx, *status)
            }
            ProtocolFrame::NewNodeRegistered { node_id, info } => {
                if self.from_authority(rx) {
                    self.restart_request_timer(ctx);
                    apply_node_info(ctx, *node_id, info);
                } else if ctx.network.is_authority() && rx.source != ctx.network.node_id {
                    let change = apply_node_info(ctx, *node_id, info);
                    tracing::info!(node = %node_id, from = %rx.source, ?change, "registration applied");
                    self.append(ctx, change, *node_id, Some(rx.source));
                }
            }
            ProtocolFrame::NewRangeRegistered { node_id, neighbors } => {
                if self.from_authority(rx) {
                    self.restart_request_timer(ctx);
                    apply_neighbors(ctx, *node_id, neighbors);
                } else if ctx.network.is_authority()
                    && rx.source != ctx.network.node_id
                    && apply_neighbors(ctx, *node_id, neighbors)
                {
                    self.append(ctx, ChangeKind::RoutingChanged, *node_id, Some(rx.source));
                }
            }
            ProtocolFrame::NodesExist { kind, nodes } => {
                if !self.from_authority(rx) {
                    return;
                }
                self.restart_request_timer(ctx);
                let status = if *kind == NodesExistType::All {
                    self.prune(ctx, nodes, rx.source);
                    NodesExistStatus::Done
                } else {
                    NodesExistStatus::UnknownType
                };
                ctx.out.send(
                    Owner::Dispatcher,
                    0,
                    Outgoing::to(rx.source, ProtocolFrame::NodesExistReply { kind: *kind, status }),
                );
            }
            ProtocolFrame::TransferEnd { status } => {
                if self.from_authority(rx) {
                    self.end_request(ctx, Ok(*status));
                }
            }
            _ => {}
        }
    }

    fn restart_request_timer(&mut self, ctx: &mut Ctx<'_>) {
        ctx.out
            .start_timer(TimerKind::NetworkUpdate, ctx.config.timing.update_timeout);
    }

    /// Drop every node the authority no longer knows.
    fn prune(&mut self, ctx: &mut Ctx<'_>, nodes: &NodeMask, authority: NodeId) {
        let own = ctx.network.node_id;
        for id in ctx.directory.ids() {
            if id.is_classic() && id != own && id != authority && !nodes.contains(id) {
                tracing::debug!(node = %id, "pruned, unknown to authority");
                purge_node(ctx.directory, id);
            }
        }
    }
}
