//! Event dispatcher that owns every control-plane component.
//!
//! The [`Controller`] is the only entry point of the crate. It decodes
//! received frames, routes transmit-complete callbacks and timer expiries to
//! the component that is waiting for them, and serializes all outgoing frames
//! through one transmit slot: a new frame is only handed to the driver once
//! the previous one reported back.

use zwave_core::{LongRangeFrame, NodeId, NodeInfo, ProtocolFrame};

use crate::action::{
    Action, Channel, Event, ExclusionStatus, Handle, InclusionStatus, NeighborUpdateStatus,
    Notification, Owner, RxInfo, TimerKind, TxStatus, TxTag,
};
use crate::assign::{AssignFsm, AssignState, ExclusionRequest, InclusionRequest};
use crate::config::ControlConfig;
use crate::context::{Ctx, DiscoveryOutcome, Handoff, Origin, Outbox, Outgoing};
use crate::directory::{MemoryDirectory, NodeDirectory, NodeRecord};
use crate::discovery::{Discovery, DiscoveryPhase, ProbeResponder};
use crate::error::ControlError;
use crate::return_route::{self, PriorityRoute, ReturnRouteFsm, ReturnRouteState, RouteMode, RouteRequest};
use crate::role::NetworkState;
use crate::update::{ChangeKind, PendingUpdates, ReplayState, UpdateDistributor, UpdateLog};

/// State every component reads or writes while handling an event.
#[derive(Debug)]
struct Shared<D> {
    directory: D,
    network: NetworkState,
    config: ControlConfig,
    out: Outbox,
}

impl<D: NodeDirectory> Shared<D> {
    fn ctx(&mut self) -> Ctx<'_> {
        Ctx {
            directory: &mut self.directory,
            network: &mut self.network,
            config: &self.config,
            out: &mut self.out,
        }
    }
}

/// Frames accepted regardless of the sender's home ID.
fn accepts_foreign_home(frame: &ProtocolFrame) -> bool {
    matches!(
        frame,
        ProtocolFrame::NodeInfo(_)
            | ProtocolFrame::SmartStartIncludeNodeInfo(_)
            | ProtocolFrame::LongRange(
                LongRangeFrame::NodeInfo(_)
                    | LongRangeFrame::SmartStartIncludeNodeInfo(_)
                    | LongRangeFrame::ExcludeRequest
            )
    )
}

/// Sans-IO control plane of one node.
#[derive(Debug)]
pub struct Controller<D: NodeDirectory = MemoryDirectory> {
    shared: Shared<D>,
    assign: AssignFsm,
    discovery: Discovery,
    probe: ProbeResponder,
    return_route: ReturnRouteFsm,
    update: UpdateDistributor,
    in_flight: Option<TxTag>,
    next_handle: u32,
}

impl<D: NodeDirectory> Controller<D> {
    /// Create a controller. The directory gets a record for this node if it
    /// has none yet.
    pub fn new(network: NetworkState, config: ControlConfig, mut directory: D) -> Self {
        let own = network.node_id;
        if !directory.exists(own) {
            directory.put(own, NodeRecord::new(own, network.info.clone()));
        }
        let mut controller = Self {
            shared: Shared {
                directory,
                network,
                config,
                out: Outbox::default(),
            },
            assign: AssignFsm::new(),
            discovery: Discovery::new(),
            probe: ProbeResponder::new(),
            return_route: ReturnRouteFsm::new(),
            update: UpdateDistributor::new(),
            in_flight: None,
            next_handle: 0,
        };
        // An authority configured up front must still pass the existence check.
        let authority = controller.shared.network.authority();
        controller.shared.network.set_authority(None);
        controller.apply_authority(authority, false);
        controller
    }

    // -- accessors ---------------------------------------------------------

    pub fn directory(&self) -> &D {
        &self.shared.directory
    }

    /// Direct access for the owner of the persistent node records.
    pub fn directory_mut(&mut self) -> &mut D {
        &mut self.shared.directory
    }

    pub fn network(&self) -> &NetworkState {
        &self.shared.network
    }

    pub fn config(&self) -> &ControlConfig {
        &self.shared.config
    }

    pub fn assign_state(&self) -> AssignState {
        self.assign.state()
    }

    pub fn discovery_phase(&self) -> Option<DiscoveryPhase> {
        self.discovery.phase()
    }

    pub fn return_route_state(&self) -> ReturnRouteState {
        self.return_route.state()
    }

    pub fn replay_state(&self) -> ReplayState {
        self.update.replay_state()
    }

    pub fn is_probing(&self) -> bool {
        self.probe.is_probing()
    }

    pub fn is_updating(&self) -> bool {
        self.update.is_requesting()
    }

    pub fn update_log(&self) -> &UpdateLog {
        self.update.log()
    }

    pub fn pending_updates(&self) -> &PendingUpdates {
        self.update.pending()
    }

    /// Controllers the authority knows to be behind its log.
    pub fn out_of_date_controllers(&self) -> Vec<NodeId> {
        self.update.out_of_date().collect()
    }

    /// Log index up to which `controller` has consumed the authority's log.
    pub fn cursor_of(&self, controller: NodeId) -> Option<u64> {
        self.update.cursor_of(controller)
    }

    /// Tag of the transmission currently holding the transmit slot.
    pub fn in_flight(&self) -> Option<TxTag> {
        self.in_flight
    }

    /// Drain the actions produced since the last call.
    pub fn poll_actions(&mut self) -> Vec<Action> {
        self.shared.out.take_actions()
    }

    // -- caller operations -------------------------------------------------

    fn allocate_handle(&mut self) -> Handle {
        self.next_handle = self.next_handle.wrapping_add(1);
        Handle(self.next_handle)
    }

    /// Start accepting node-information announcements to add a node.
    ///
    /// Progress and failures arrive as [`Notification::Inclusion`] carrying
    /// the returned handle; a rejected start is reported before this returns.
    pub fn begin_inclusion(&mut self, request: InclusionRequest) -> Handle {
        let handle = self.allocate_handle();
        let result = if self.discovery.is_active() || self.update.is_requesting() {
            Err(ControlError::Busy)
        } else {
            self.assign
                .begin_inclusion(&mut self.shared.ctx(), handle, request)
        };
        if let Err(error) = result {
            tracing::debug!(handle = handle.0, %error, "inclusion rejected");
            self.shared.out.notify(Notification::Inclusion {
                handle,
                status: InclusionStatus::Failed(error),
            });
        }
        self.settle();
        handle
    }

    pub fn begin_exclusion(&mut self, request: ExclusionRequest) -> Handle {
        let handle = self.allocate_handle();
        let result = if self.discovery.is_active() || self.update.is_requesting() {
            Err(ControlError::Busy)
        } else {
            self.assign
                .begin_exclusion(&mut self.shared.ctx(), handle, request)
        };
        if let Err(error) = result {
            tracing::debug!(handle = handle.0, %error, "exclusion rejected");
            self.shared.out.notify(Notification::Exclusion {
                handle,
                status: ExclusionStatus::Failed(error),
            });
        }
        self.settle();
        handle
    }

    /// Stop the running inclusion or exclusion. Returns `false` when idle.
    pub fn stop(&mut self) -> bool {
        let stopped = self.assign.stop(&mut self.shared.ctx());
        self.settle();
        stopped
    }

    /// Rediscover the neighbors of `node`.
    pub fn request_neighbor_update(&mut self, node: NodeId) -> Handle {
        let handle = self.allocate_handle();
        let result = if !self.shared.network.policy().can_request_discovery() {
            Err(ControlError::NotSupported)
        } else if self.assign.is_active() {
            Err(ControlError::Busy)
        } else {
            self.discovery
                .start(&mut self.shared.ctx(), node, Origin::Caller(handle))
        };
        if let Err(error) = result {
            tracing::debug!(%node, %error, "neighbor update rejected");
            self.shared.out.notify(Notification::NeighborUpdate {
                handle,
                node,
                status: NeighborUpdateStatus::Failed(error),
            });
        }
        self.settle();
        handle
    }

    fn start_route_job(&mut self, handle: Handle, request: RouteRequest) {
        let source = request.source;
        let mut ctx = self.shared.ctx();
        if let Err(error) = self.return_route.start(&mut ctx, request) {
            tracing::debug!(%source, %error, "return route job rejected");
            return_route::notify(&mut ctx, handle, source, Err(error));
        }
        self.settle();
    }

    fn reject_route_job(&mut self, handle: Handle, source: NodeId, error: ControlError) {
        tracing::debug!(%source, %error, "return route job rejected");
        return_route::notify(&mut self.shared.ctx(), handle, source, Err(error));
        self.settle();
    }

    /// Give `source` up to four routes towards `destination`.
    ///
    /// A priority route, when given, takes the first slot.
    pub fn assign_return_route(
        &mut self,
        source: NodeId,
        destination: NodeId,
        priority: Option<PriorityRoute>,
    ) -> Handle {
        let handle = self.allocate_handle();
        let request = RouteRequest {
            origin: Origin::Caller(handle),
            source,
            destination,
            suc: false,
            mode: RouteMode::Assign,
            priority,
        };
        self.start_route_job(handle, request);
        handle
    }

    /// Give `source` routes towards the topology authority.
    pub fn assign_suc_return_route(&mut self, source: NodeId, priority: Option<PriorityRoute>) -> Handle {
        let handle = self.allocate_handle();
        match self.shared.network.authority() {
            Some(authority) => {
                let request = RouteRequest {
                    origin: Origin::Caller(handle),
                    source,
                    destination: authority,
                    suc: true,
                    mode: RouteMode::Assign,
                    priority,
                };
                self.start_route_job(handle, request);
            }
            None => self.reject_route_job(handle, source, ControlError::NoAuthorityKnown),
        }
        handle
    }

    /// Clear the return routes stored in `node`; with `suc_only`, only the
    /// ones towards the topology authority.
    pub fn delete_return_route(&mut self, node: NodeId, suc_only: bool) -> Handle {
        let handle = self.allocate_handle();
        let destination = if suc_only {
            self.shared.network.authority()
        } else {
            Some(NodeId::UNASSIGNED)
        };
        match destination {
            Some(destination) => {
                let request = RouteRequest {
                    origin: Origin::Caller(handle),
                    source: node,
                    destination,
                    suc: suc_only,
                    mode: RouteMode::Delete,
                    priority: None,
                };
                self.start_route_job(handle, request);
            }
            None => self.reject_route_job(handle, node, ControlError::NoAuthorityKnown),
        }
        handle
    }

    /// Stop the running return-route job. Returns `false` when idle.
    pub fn stop_return_route(&mut self) -> bool {
        let stopped = self.return_route.stop(&mut self.shared.ctx());
        self.settle();
        stopped
    }

    /// Ask the topology authority to replay the changes this node missed.
    pub fn request_network_update(&mut self) -> Handle {
        let handle = self.allocate_handle();
        let result = if self.assign.is_active() {
            Err(ControlError::Busy)
        } else {
            self.update.request(&mut self.shared.ctx(), handle)
        };
        if let Err(error) = result {
            tracing::debug!(%error, "network update rejected");
            self.shared.out.notify(Notification::NetworkUpdate {
                handle,
                result: Err(error),
            });
        }
        self.settle();
        handle
    }

    /// Ask `node` to announce its node information again.
    pub fn request_node_info(&mut self, node: NodeId) -> Result<(), ControlError> {
        if !self.shared.directory.exists(node) || node == self.shared.network.node_id {
            return Err(ControlError::NodeNotFound(node));
        }
        let frame = if node.is_long_range() {
            ProtocolFrame::LongRange(LongRangeFrame::RequestNodeInfo)
        } else {
            ProtocolFrame::RequestNodeInfo
        };
        self.shared
            .out
            .send(Owner::Dispatcher, 0, Outgoing::to(node, frame));
        self.settle();
        Ok(())
    }

    /// Set or clear the topology authority.
    ///
    /// An authority other than this node must be in the directory, otherwise
    /// it is treated as unknown.
    pub fn set_authority(&mut self, authority: Option<NodeId>) {
        self.apply_authority(authority, true);
        self.settle();
    }

    fn apply_authority(&mut self, authority: Option<NodeId>, announce: bool) {
        let own = self.shared.network.node_id;
        let authority =
            authority.filter(|id| *id == own || (id.is_classic() && self.shared.directory.exists(*id)));
        if self.shared.network.authority() == authority {
            return;
        }
        self.shared.network.set_authority(authority);
        let authority = self.shared.network.authority();
        tracing::info!(authority = ?authority, is_self = self.shared.network.is_authority(), "topology authority changed");
        if announce {
            self.shared
                .out
                .notify(Notification::AuthorityChanged { authority });
        }
        self.update.on_authority_changed(&mut self.shared.ctx());
    }

    // -- events ------------------------------------------------------------

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Frame { rx, payload } => self.receive_frame(rx, &payload),
            Event::TxComplete { tag, status } => self.tx_complete(tag, status),
            Event::TimerExpired(kind) => self.timer_expired(kind),
        }
    }

    pub fn receive_frame(&mut self, rx: RxInfo, payload: &[u8]) {
        let frame = match ProtocolFrame::decode(payload) {
            Ok(frame) => frame,
            Err(error) => {
                tracing::trace!(source = %rx.source, %error, "dropping malformed frame");
                return;
            }
        };
        if rx.home_id != self.shared.network.home_id && !accepts_foreign_home(&frame) {
            tracing::trace!(source = %rx.source, home = %rx.home_id, frame = frame.name(), "foreign network");
            return;
        }
        tracing::trace!(source = %rx.source, frame = frame.name(), "frame received");

        let mut ctx = self.shared.ctx();
        match frame {
            ProtocolFrame::NodeInfo(info) | ProtocolFrame::LongRange(LongRangeFrame::NodeInfo(info)) => {
                if self.assign.is_accepting() {
                    self.assign.on_node_info(&mut ctx, &rx, info, false);
                } else {
                    refresh_known(&mut ctx, &rx, info);
                }
            }
            ProtocolFrame::SmartStartIncludeNodeInfo(info)
            | ProtocolFrame::LongRange(LongRangeFrame::SmartStartIncludeNodeInfo(info)) => {
                self.assign.on_node_info(&mut ctx, &rx, info, true);
            }
            ProtocolFrame::LongRange(LongRangeFrame::ExcludeRequest) => {
                self.assign.on_exclude_request(&mut ctx, &rx);
            }
            ProtocolFrame::RequestNodeInfo => {
                let info = ctx.network.info.clone();
                ctx.out.send(
                    Owner::Dispatcher,
                    0,
                    Outgoing::to(rx.source, ProtocolFrame::NodeInfo(info)),
                );
            }
            ProtocolFrame::LongRange(LongRangeFrame::RequestNodeInfo) => {
                let info = ctx.network.info.clone();
                ctx.out.send(
                    Owner::Dispatcher,
                    0,
                    Outgoing::to(rx.source, ProtocolFrame::LongRange(LongRangeFrame::NodeInfo(info))),
                );
            }
            ProtocolFrame::FindNodesInRange(find) => self.probe.on_find(&mut ctx, &rx, &find),
            ProtocolFrame::GetNodesInRange { wakeup } => self.probe.on_get(&mut ctx, &rx, wakeup),
            ProtocolFrame::CommandComplete { .. } => self.discovery.on_command_complete(&mut ctx, &rx),
            ProtocolFrame::RangeInfo { neighbors, .. } => {
                self.discovery.on_range_info(&mut ctx, &rx, &neighbors)
            }
            ProtocolFrame::SucNodeId { node_id, .. } => {
                let authority = (!node_id.is_unassigned()).then_some(node_id);
                self.apply_authority(authority, true);
            }
            frame @ (ProtocolFrame::NewNodeRegistered { .. }
            | ProtocolFrame::NewRangeRegistered { .. }
            | ProtocolFrame::AutomaticControllerUpdateStart
            | ProtocolFrame::NodesExist { .. }
            | ProtocolFrame::NodesExistReply { .. }
            | ProtocolFrame::TransferEnd { .. }) => self.update.on_frame(&mut ctx, &rx, &frame),
            other => {
                tracing::trace!(source = %rx.source, frame = other.name(), "frame not handled here");
            }
        }
        self.settle();
    }

    pub fn tx_complete(&mut self, tag: TxTag, status: TxStatus) {
        if self.in_flight != Some(tag) {
            tracing::trace!(?tag, ?status, "stale transmit status");
            return;
        }
        self.in_flight = None;
        tracing::trace!(owner = ?tag.owner, ?status, "transmit complete");

        let mut ctx = self.shared.ctx();
        match tag.owner {
            Owner::Assign => self.assign.on_tx(&mut ctx, tag, status),
            Owner::Discovery => self.discovery.on_tx(&mut ctx, tag, status),
            Owner::Probe => self.probe.on_tx(&mut ctx, tag, status),
            Owner::ReturnRoute => self.return_route.on_tx(&mut ctx, tag, status),
            Owner::Replay | Owner::UpdateRequest | Owner::Registration => {
                self.update.on_tx(&mut ctx, tag, status)
            }
            Owner::Dispatcher => {}
        }
        self.settle();
    }

    pub fn timer_expired(&mut self, kind: TimerKind) {
        tracing::trace!(?kind, "timer expired");
        if kind == TimerKind::Probe && self.in_flight.is_some_and(|tag| tag.owner == Owner::Probe) {
            // The transport never reported back; free the slot.
            self.in_flight = None;
        }
        let mut ctx = self.shared.ctx();
        match kind {
            TimerKind::Assign => self.assign.on_timer(&mut ctx),
            TimerKind::Discovery => self.discovery.on_timer(&mut ctx),
            TimerKind::Probe => self.probe.on_timer(&mut ctx),
            TimerKind::NetworkUpdate => self.update.on_request_timer(&mut ctx),
            TimerKind::Replay => self.update.on_replay_timer(&mut ctx),
            TimerKind::PendingScan => self.update.scan(&mut ctx),
        }
        self.settle();
    }

    // -- internals ---------------------------------------------------------

    /// Run handoffs until quiet, then fill the transmit slot.
    fn settle(&mut self) {
        while let Some(handoff) = self.shared.out.next_handoff() {
            self.apply_handoff(handoff);
        }
        if self.in_flight.is_none()
            && let Some(tx) = self.shared.out.next_transmission()
        {
            self.in_flight = Some(tx.tag);
            self.shared.out.grant(tx);
        }
    }

    fn apply_handoff(&mut self, handoff: Handoff) {
        let mut ctx = self.shared.ctx();
        match handoff {
            Handoff::StartDiscovery { node, origin } => {
                if let Err(error) = self.discovery.start(&mut ctx, node, origin) {
                    tracing::debug!(%node, %error, "discovery after inclusion not started");
                    self.assign
                        .on_discovery_finished(&mut ctx, node, DiscoveryOutcome::Failed(error));
                }
            }
            Handoff::DiscoveryFinished { node, outcome } => {
                self.assign.on_discovery_finished(&mut ctx, node, outcome);
            }
            Handoff::AbortDiscovery => {
                if self.discovery.origin() == Some(Origin::Inclusion) {
                    self.discovery.abort(&mut ctx);
                }
            }
            Handoff::StartSucReturnRoute { node } => {
                let result = match ctx.network.authority() {
                    Some(authority) => self.return_route.start(
                        &mut ctx,
                        RouteRequest {
                            origin: Origin::Inclusion,
                            source: node,
                            destination: authority,
                            suc: true,
                            mode: RouteMode::Assign,
                            priority: None,
                        },
                    ),
                    None => Err(ControlError::NoAuthorityKnown),
                };
                if let Err(error) = result {
                    tracing::debug!(%node, %error, "authority route after inclusion not started");
                    self.assign.on_return_route_finished(&mut ctx, Err(error));
                }
            }
            Handoff::ReturnRouteFinished { result } => {
                self.assign.on_return_route_finished(&mut ctx, result);
            }
            Handoff::AbortReturnRoute => {
                if self.return_route.origin() == Some(Origin::Inclusion) {
                    self.return_route.abort(&mut ctx);
                }
            }
            Handoff::RegisterChange { change, node } => {
                self.update.register(&mut ctx, change, node);
                if change == ChangeKind::NodeRemoved && ctx.network.authority() == Some(node) {
                    self.apply_authority(None, true);
                }
            }
        }
    }
}

/// A known node re-announced itself outside of inclusion.
fn refresh_known(ctx: &mut Ctx<'_>, rx: &RxInfo, info: NodeInfo) {
    let own = ctx.network.node_id;
    if rx.home_id != ctx.network.home_id || rx.source == own {
        return;
    }
    let Some(mut record) = ctx.directory.get(rx.source) else {
        return;
    };
    if record.info == info {
        return;
    }
    if (rx.channel == Channel::LongRange) != rx.source.is_long_range() {
        return;
    }
    tracing::debug!(node = %rx.source, "node information refreshed");
    record.info = info;
    ctx.directory.put(rx.source, record);
    ctx.out.handoff(Handoff::RegisterChange {
        change: ChangeKind::NodeAdded,
        node: rx.source,
    });
}
