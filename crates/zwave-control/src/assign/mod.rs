//! Node-ID assignment state machine: inclusion and exclusion of one node.
//!
//! ```text
//! Idle -> Accepting -> IdSent ------------------> NopProbeSent -> RoutingInfoPending -> Idle
//!                   \-> ExcludeConfirmSent (LR) -/             \-> NonSecureInclusionComplete (LR)
//! ```
//!
//! At most one operation is in flight. Nothing is written to the directory
//! before the liveness probe confirms the node, so a failure or a stop
//! before that point leaves no trace.

pub mod allocator;

pub use allocator::IdAllocator;

use zwave_core::{HomeId, LongRangeFrame, NodeId, NodeInfo, ProtocolFrame};

use crate::action::{
    Channel, ExclusionStatus, Handle, InclusionStatus, NodeRole, Notification, Owner, RxInfo,
    TimerKind, TxStatus, TxTag,
};
use crate::context::{Ctx, DiscoveryOutcome, Handoff, Origin, Outgoing};
use crate::directory::{NodeRecord, purge_node};
use crate::error::ControlError;
use crate::update::ChangeKind;

/// Roles a caller is willing to accept during inclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AllowedRoles {
    #[default]
    Any,
    ControllerOnly,
    SlaveOnly,
}

impl AllowedRoles {
    pub fn allows(self, role: NodeRole) -> bool {
        match self {
            AllowedRoles::Any => true,
            AllowedRoles::ControllerOnly => role == NodeRole::Controller,
            AllowedRoles::SlaveOnly => role == NodeRole::Slave,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InclusionRequest {
    pub roles: AllowedRoles,
    pub channel: Channel,
    /// Directed inclusion: only announcers from this home ID are accepted.
    pub directed: Option<HomeId>,
}

impl InclusionRequest {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn roles(mut self, roles: AllowedRoles) -> Self {
        self.roles = roles;
        self
    }

    pub fn long_range(mut self) -> Self {
        self.channel = Channel::LongRange;
        self
    }

    pub fn directed(mut self, home_id: HomeId) -> Self {
        self.directed = Some(home_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExclusionRequest {
    /// Only remove this node; any announcer otherwise.
    pub target: Option<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignState {
    Idle,
    Accepting,
    IdSent,
    ExcludeConfirmSent,
    NopProbeSent,
    NonSecureInclusionComplete,
    RoutingInfoPending,
}

#[derive(Debug, Clone)]
enum Mode {
    Include(InclusionRequest),
    Exclude(ExclusionRequest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoutingStep {
    Discovery,
    ReturnRoute,
}

#[derive(Debug, Clone)]
struct Target {
    node: NodeId,
    info: NodeInfo,
    role: NodeRole,
    channel: Channel,
    /// Holds its ID on this network. Foreign nodes are reset without touching the directory.
    local: bool,
}

#[derive(Debug, Clone)]
struct Operation {
    handle: Handle,
    mode: Mode,
    target: Option<Target>,
    attempts: u8,
    routing: Option<RoutingStep>,
}

/// Mode-neutral progress, reported as inclusion or exclusion status.
enum Progress {
    LearnReady,
    NodeFound,
    Started { node: NodeId, role: NodeRole },
    ProtocolDone { node: NodeId },
    Done { node: NodeId },
    Failed(ControlError),
    Stopped,
}

fn role_of(info: &NodeInfo) -> NodeRole {
    if info.is_controller() {
        NodeRole::Controller
    } else {
        NodeRole::Slave
    }
}

#[derive(Debug)]
pub(crate) struct AssignFsm {
    state: AssignState,
    op: Option<Operation>,
    epoch: u32,
    allocator: IdAllocator,
}

impl AssignFsm {
    pub fn new() -> Self {
        Self {
            state: AssignState::Idle,
            op: None,
            epoch: 0,
            allocator: IdAllocator::new(),
        }
    }

    pub fn state(&self) -> AssignState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != AssignState::Idle
    }

    pub fn is_accepting(&self) -> bool {
        self.state == AssignState::Accepting
    }

    fn transition(&mut self, next: AssignState) {
        tracing::debug!(from = ?self.state, to = ?next, "assign state");
        self.state = next;
    }

    fn reset(&mut self, ctx: &mut Ctx<'_>) {
        ctx.out.stop_timer(TimerKind::Assign);
        ctx.out.cancel(Owner::Assign);
        self.epoch = self.epoch.wrapping_add(1);
        self.op = None;
        self.transition(AssignState::Idle);
    }

    fn report(&self, ctx: &mut Ctx<'_>, progress: Progress) {
        let Some(op) = &self.op else {
            return;
        };
        let handle = op.handle;
        let notification = match op.mode {
            Mode::Include(_) => {
                let status = match progress {
                    Progress::LearnReady => InclusionStatus::LearnReady,
                    Progress::NodeFound => InclusionStatus::NodeFound,
                    Progress::Started { node, role } => InclusionStatus::Adding { node, role },
                    Progress::ProtocolDone { node } => InclusionStatus::ProtocolDone { node },
                    Progress::Done { node } => InclusionStatus::Done { node },
                    Progress::Failed(err) => InclusionStatus::Failed(err),
                    Progress::Stopped => InclusionStatus::Stopped,
                };
                Notification::Inclusion { handle, status }
            }
            Mode::Exclude(_) => {
                let status = match progress {
                    Progress::LearnReady => ExclusionStatus::LearnReady,
                    Progress::NodeFound => ExclusionStatus::NodeFound,
                    Progress::Started { node, role } => ExclusionStatus::Removing { node, role },
                    Progress::ProtocolDone { .. } => return,
                    Progress::Done { node } => ExclusionStatus::Done { node },
                    Progress::Failed(err) => ExclusionStatus::Failed(err),
                    Progress::Stopped => ExclusionStatus::Stopped,
                };
                Notification::Exclusion { handle, status }
            }
        };
        ctx.out.notify(notification);
    }

    fn check_start(&self, ctx: &Ctx<'_>) -> Result<(), ControlError> {
        if self.is_active() {
            return Err(ControlError::Busy);
        }
        if !ctx.network.policy().can_include(ctx.network.authority_known()) {
            return Err(ControlError::NotSupported);
        }
        Ok(())
    }

    pub fn begin_inclusion(
        &mut self,
        ctx: &mut Ctx<'_>,
        handle: Handle,
        request: InclusionRequest,
    ) -> Result<(), ControlError> {
        self.check_start(ctx)?;
        if request.channel == Channel::LongRange && !ctx.network.long_range {
            return Err(ControlError::NotSupported);
        }
        tracing::info!(roles = ?request.roles, channel = ?request.channel, "inclusion started");
        self.op = Some(Operation {
            handle,
            mode: Mode::Include(request),
            target: None,
            attempts: 0,
            routing: None,
        });
        self.transition(AssignState::Accepting);
        self.report(ctx, Progress::LearnReady);
        Ok(())
    }

    pub fn begin_exclusion(
        &mut self,
        ctx: &mut Ctx<'_>,
        handle: Handle,
        request: ExclusionRequest,
    ) -> Result<(), ControlError> {
        self.check_start(ctx)?;
        tracing::info!(target = ?request.target, "exclusion started");
        self.op = Some(Operation {
            handle,
            mode: Mode::Exclude(request),
            target: None,
            attempts: 0,
            routing: None,
        });
        self.transition(AssignState::Accepting);
        self.report(ctx, Progress::LearnReady);
        Ok(())
    }

    /// A node-information announcement arrived while accepting.
    pub fn on_node_info(&mut self, ctx: &mut Ctx<'_>, rx: &RxInfo, info: NodeInfo, smart_start: bool) {
        if !self.is_accepting() {
            return;
        }
        let Some(op) = &self.op else {
            return;
        };
        match op.mode.clone() {
            Mode::Include(request) => self.include_announcer(ctx, rx, info, smart_start, &request),
            Mode::Exclude(request) => {
                if rx.channel == Channel::LongRange || smart_start {
                    tracing::trace!(source = %rx.source, "announcement ignored during exclusion");
                    return;
                }
                self.exclude_announcer(ctx, rx, info, request.target);
            }
        }
    }

    fn include_announcer(
        &mut self,
        ctx: &mut Ctx<'_>,
        rx: &RxInfo,
        info: NodeInfo,
        smart_start: bool,
        request: &InclusionRequest,
    ) {
        let role = role_of(&info);
        if !request.roles.allows(role) {
            tracing::debug!(source = %rx.source, ?role, "announcer role not allowed");
            return;
        }
        if rx.channel != request.channel {
            tracing::debug!(source = %rx.source, channel = ?rx.channel, "announcer on other channel");
            return;
        }
        match request.directed {
            Some(home_id) if rx.home_id != home_id => {
                tracing::trace!(source = %rx.source, home = %rx.home_id, "directed inclusion mismatch");
                return;
            }
            None if smart_start => {
                tracing::trace!(source = %rx.source, "smart start announcement outside directed inclusion");
                return;
            }
            _ => {}
        }

        self.report(ctx, Progress::NodeFound);

        let existing = rx.home_id == ctx.network.home_id
            && rx.source != ctx.network.node_id
            && ctx.directory.exists(rx.source);
        if existing {
            self.refresh_existing(ctx, rx.source, info, role);
            return;
        }

        let own = ctx.network.node_id;
        let allocated = match request.channel {
            Channel::Classic => self.allocator.next_classic(ctx.directory, own),
            Channel::LongRange => self.allocator.next_long_range(ctx.directory, own),
        };
        let node = match allocated {
            Ok(node) => node,
            Err(err) => {
                tracing::warn!(%err, "no node id available");
                self.report(ctx, Progress::Failed(err));
                self.reset(ctx);
                return;
            }
        };

        self.report(ctx, Progress::Started { node, role });
        let home_id = ctx.network.home_id;
        let frame = match request.channel {
            Channel::Classic => ProtocolFrame::AssignIds {
                node_id: node,
                home_id,
            },
            Channel::LongRange => ProtocolFrame::LongRange(LongRangeFrame::AssignIds {
                node_id: node,
                home_id,
            }),
        };
        ctx.out.send(Owner::Assign, self.epoch, Outgoing::to(rx.source, frame));
        ctx.out.start_timer(TimerKind::Assign, ctx.config.timing.learn_timeout);
        if let Some(op) = self.op.as_mut() {
            op.target = Some(Target {
                node,
                info,
                role,
                channel: request.channel,
                local: true,
            });
        }
        self.transition(AssignState::IdSent);
    }

    /// The announcer already belongs to this network: refresh its record
    /// instead of assigning a new ID.
    fn refresh_existing(&mut self, ctx: &mut Ctx<'_>, node: NodeId, info: NodeInfo, role: NodeRole) {
        let mut record = ctx
            .directory
            .get(node)
            .unwrap_or_else(|| NodeRecord::new(node, info.clone()));
        record.info = info;
        ctx.directory.put(node, record);
        ctx.out.handoff(Handoff::RegisterChange {
            change: ChangeKind::NodeAdded,
            node,
        });
        tracing::info!(%node, "existing node updated");
        self.report(ctx, Progress::Started { node, role });
        self.report(ctx, Progress::ProtocolDone { node });
        self.report(ctx, Progress::Done { node });
        self.reset(ctx);
    }

    fn exclude_announcer(
        &mut self,
        ctx: &mut Ctx<'_>,
        rx: &RxInfo,
        info: NodeInfo,
        target: Option<NodeId>,
    ) {
        if rx.source.is_unassigned() {
            tracing::trace!("announcer holds no id, nothing to exclude");
            return;
        }
        if target.is_some_and(|t| t != rx.source) {
            return;
        }
        let node = rx.source;
        let role = role_of(&info);
        let local = rx.home_id == ctx.network.home_id;
        self.report(ctx, Progress::NodeFound);
        self.report(ctx, Progress::Started { node, role });
        let frame = ProtocolFrame::AssignIds {
            node_id: NodeId::UNASSIGNED,
            home_id: HomeId::ZERO,
        };
        ctx.out.send(Owner::Assign, self.epoch, Outgoing::to(node, frame));
        ctx.out.start_timer(TimerKind::Assign, ctx.config.timing.learn_timeout);
        if let Some(op) = self.op.as_mut() {
            op.target = Some(Target {
                node,
                info,
                role,
                channel: Channel::Classic,
                local,
            });
        }
        self.transition(AssignState::IdSent);
    }

    /// Long-range nodes ask to leave explicitly; confirm before probing.
    pub fn on_exclude_request(&mut self, ctx: &mut Ctx<'_>, rx: &RxInfo) {
        if !self.is_accepting() || rx.channel != Channel::LongRange {
            return;
        }
        let target = match &self.op {
            Some(Operation {
                mode: Mode::Exclude(request),
                ..
            }) => request.target,
            _ => return,
        };
        if !rx.source.is_long_range() || target.is_some_and(|t| t != rx.source) {
            return;
        }
        let node = rx.source;
        let info = ctx.directory.info(node).unwrap_or_default();
        let role = role_of(&info);
        self.report(ctx, Progress::NodeFound);
        self.report(ctx, Progress::Started { node, role });
        let frame = ProtocolFrame::LongRange(LongRangeFrame::ExcludeRequestConfirm {
            node_id: node,
            home_id: ctx.network.home_id,
        });
        ctx.out.send(Owner::Assign, self.epoch, Outgoing::to(node, frame));
        ctx.out.start_timer(TimerKind::Assign, ctx.config.timing.learn_timeout);
        if let Some(op) = self.op.as_mut() {
            op.target = Some(Target {
                node,
                info,
                role,
                channel: Channel::LongRange,
                local: rx.home_id == ctx.network.home_id,
            });
        }
        self.transition(AssignState::ExcludeConfirmSent);
    }

    pub fn on_tx(&mut self, ctx: &mut Ctx<'_>, tag: TxTag, status: TxStatus) {
        if tag.epoch != self.epoch {
            return;
        }
        match self.state {
            // The probe decides; the ID frame's own status does not matter.
            AssignState::IdSent | AssignState::ExcludeConfirmSent => {
                tracing::debug!(?status, "id frame completed");
                self.send_probe(ctx, 1);
            }
            AssignState::NopProbeSent => self.on_probe_result(ctx, status),
            AssignState::NonSecureInclusionComplete => self.finish(ctx),
            _ => {}
        }
    }

    fn send_probe(&mut self, ctx: &mut Ctx<'_>, attempt: u8) {
        let Some(op) = self.op.as_mut() else {
            return;
        };
        let Some(target) = &op.target else {
            return;
        };
        op.attempts = attempt;
        let frame = match target.channel {
            Channel::Classic => ProtocolFrame::Nop,
            Channel::LongRange => ProtocolFrame::LongRange(LongRangeFrame::Nop),
        };
        ctx.out.send(Owner::Assign, self.epoch, Outgoing::to(target.node, frame));
        self.transition(AssignState::NopProbeSent);
    }

    fn on_probe_result(&mut self, ctx: &mut Ctx<'_>, status: TxStatus) {
        let Some(op) = &self.op else {
            return;
        };
        let including = matches!(op.mode, Mode::Include(_));
        let attempts = op.attempts;
        let bound = if including {
            ctx.config.retries.add_probe
        } else {
            ctx.config.retries.remove_probe
        };
        match (including, status.is_ok()) {
            (true, true) => self.commit(ctx),
            // Silence is the expected answer from a node that left.
            (false, false) => self.remove(ctx),
            _ if attempts < bound => self.send_probe(ctx, attempts + 1),
            _ => {
                tracing::warn!(attempts, ?status, "liveness probe retries exhausted");
                self.report(ctx, Progress::Failed(ControlError::LearnFailed));
                self.reset(ctx);
            }
        }
    }

    fn commit(&mut self, ctx: &mut Ctx<'_>) {
        let Some(target) = self.op.as_ref().and_then(|op| op.target.clone()) else {
            return;
        };
        let node = target.node;
        ctx.directory
            .put(node, NodeRecord::new(node, target.info.clone()));
        ctx.out.handoff(Handoff::RegisterChange {
            change: ChangeKind::NodeAdded,
            node,
        });
        ctx.out.stop_timer(TimerKind::Assign);
        tracing::info!(%node, role = ?target.role, "node added");
        self.report(ctx, Progress::ProtocolDone { node });

        match target.channel {
            Channel::LongRange => {
                let frame = ProtocolFrame::LongRange(LongRangeFrame::NonSecureInclusionComplete);
                ctx.out.send(Owner::Assign, self.epoch, Outgoing::to(node, frame));
                ctx.out.start_timer(TimerKind::Assign, ctx.config.timing.learn_timeout);
                self.transition(AssignState::NonSecureInclusionComplete);
            }
            Channel::Classic if target.info.is_controller() && !target.info.is_listening() => {
                self.finish(ctx);
            }
            Channel::Classic => {
                ctx.out.handoff(Handoff::StartDiscovery {
                    node,
                    origin: Origin::Inclusion,
                });
                if let Some(op) = self.op.as_mut() {
                    op.routing = Some(RoutingStep::Discovery);
                }
                self.transition(AssignState::RoutingInfoPending);
            }
        }
    }

    fn remove(&mut self, ctx: &mut Ctx<'_>) {
        let Some(target) = self.op.as_ref().and_then(|op| op.target.as_ref()) else {
            return;
        };
        let node = target.node;
        if target.local {
            purge_node(ctx.directory, node);
            ctx.out.handoff(Handoff::RegisterChange {
                change: ChangeKind::NodeRemoved,
                node,
            });
            tracing::info!(%node, "node removed");
        } else {
            // Same number, different network: our record of `node` is not this device.
            tracing::info!(%node, "foreign node reset");
        }
        self.report(ctx, Progress::Done { node });
        self.reset(ctx);
    }

    fn finish(&mut self, ctx: &mut Ctx<'_>) {
        if let Some(node) = self.target_node() {
            self.report(ctx, Progress::Done { node });
        }
        self.reset(ctx);
    }

    fn target_node(&self) -> Option<NodeId> {
        self.op.as_ref()?.target.as_ref().map(|t| t.node)
    }

    fn routing_step(&self) -> Option<RoutingStep> {
        if self.state != AssignState::RoutingInfoPending {
            return None;
        }
        self.op.as_ref()?.routing
    }

    pub fn on_discovery_finished(&mut self, ctx: &mut Ctx<'_>, node: NodeId, outcome: DiscoveryOutcome) {
        if self.routing_step() != Some(RoutingStep::Discovery) || self.target_node() != Some(node) {
            return;
        }
        if let DiscoveryOutcome::Failed(err) = &outcome {
            tracing::debug!(%node, %err, "neighbor discovery failed, left pending");
        }
        let routing_slave = self
            .op
            .as_ref()
            .and_then(|op| op.target.as_ref())
            .is_some_and(|t| t.info.is_routing_slave());
        let authority = ctx.network.authority().filter(|a| *a != node);
        if routing_slave && authority.is_some() {
            ctx.out.handoff(Handoff::StartSucReturnRoute { node });
            if let Some(op) = self.op.as_mut() {
                op.routing = Some(RoutingStep::ReturnRoute);
            }
            return;
        }
        self.finish(ctx);
    }

    pub fn on_return_route_finished(&mut self, ctx: &mut Ctx<'_>, result: Result<(), ControlError>) {
        if self.routing_step() != Some(RoutingStep::ReturnRoute) {
            return;
        }
        if let Err(err) = result {
            tracing::debug!(%err, "authority route for new node not assigned");
        }
        self.finish(ctx);
    }

    pub fn on_timer(&mut self, ctx: &mut Ctx<'_>) {
        match self.state {
            AssignState::IdSent | AssignState::ExcludeConfirmSent | AssignState::NopProbeSent => {
                tracing::warn!(state = ?self.state, "learn timeout");
                self.report(ctx, Progress::Failed(ControlError::LearnFailed));
                self.reset(ctx);
            }
            AssignState::NonSecureInclusionComplete => self.finish(ctx),
            _ => {}
        }
    }

    /// Abort the current operation. Returns `false` when nothing was running.
    pub fn stop(&mut self, ctx: &mut Ctx<'_>) -> bool {
        match self.state {
            AssignState::Idle => return false,
            AssignState::RoutingInfoPending => match self.routing_step() {
                Some(RoutingStep::Discovery) => ctx.out.handoff(Handoff::AbortDiscovery),
                Some(RoutingStep::ReturnRoute) => ctx.out.handoff(Handoff::AbortReturnRoute),
                None => {}
            },
            _ => {}
        }
        tracing::info!(state = ?self.state, "assignment stopped");
        self.report(ctx, Progress::Stopped);
        self.reset(ctx);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_roles() {
        assert!(AllowedRoles::Any.allows(NodeRole::Controller));
        assert!(AllowedRoles::SlaveOnly.allows(NodeRole::Slave));
        assert!(!AllowedRoles::SlaveOnly.allows(NodeRole::Controller));
        assert!(!AllowedRoles::ControllerOnly.allows(NodeRole::Slave));
    }

    #[test]
    fn request_builder() {
        let home = HomeId::from_u32(0x01020304);
        let request = InclusionRequest::any()
            .roles(AllowedRoles::SlaveOnly)
            .long_range()
            .directed(home);
        assert_eq!(request.channel, Channel::LongRange);
        assert_eq!(request.directed, Some(home));
        assert_eq!(request.roles, AllowedRoles::SlaveOnly);
    }
}
