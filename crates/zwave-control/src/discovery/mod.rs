//! Neighbor discovery driven from the controller side.
//!
//! A discovery episode asks the target node to probe a candidate set once per
//! speed tier, slowest first, then once per wake-up beam class for FLiRS
//! candidates. Each round is `FIND_NODES_IN_RANGE -> CMD_COMPLETE ->
//! GET_NODES_IN_RANGE -> RANGE_INFO`. Results are merged across tiers: a
//! neighbor confirmed at any tier is a neighbor.

pub mod responder;

pub use responder::ProbeResponder;

use std::collections::VecDeque;

use zwave_core::{FindNodesInRange, NodeId, NodeMask, ProtocolFrame, SensorWakeup, Speed, SpeedSet};

use crate::action::{NeighborUpdateStatus, Notification, Owner, RxInfo, TimerKind, TxStatus, TxTag};
use crate::context::{Ctx, DiscoveryOutcome, Handoff, Origin, Outgoing};
use crate::directory::{NodeDirectory, commit_neighbors};
use crate::error::ControlError;
use crate::update::ChangeKind;

/// One discovery round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier {
    pub speed: Speed,
    /// Beam class for FLiRS candidates; `None` for a plain speed tier.
    pub beam: Option<SensorWakeup>,
    pub candidates: NodeMask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscoveryPhase {
    SendingFind,
    AwaitComplete,
    SendingGet,
    AwaitRangeInfo,
}

#[derive(Debug)]
struct Episode {
    node: NodeId,
    origin: Origin,
    exhaustive: bool,
    wakeup: Option<SensorWakeup>,
    tiers: VecDeque<Tier>,
    current: Tier,
    phase: DiscoveryPhase,
    merged: NodeMask,
    timed_out: bool,
}

/// Plan the tiers for `node`: common speeds ascending, then one beam tier per
/// wake-up class present among FLiRS nodes. Tiers without candidates are
/// dropped.
pub fn plan_tiers(directory: &dyn NodeDirectory, node: NodeId, local_speeds: SpeedSet) -> Vec<Tier> {
    let Some(target) = directory.get(node) else {
        return Vec::new();
    };
    let records: Vec<_> = directory
        .ids()
        .into_iter()
        .filter(|id| *id != node && id.is_classic())
        .filter_map(|id| directory.get(id))
        .collect();

    let mut tiers = Vec::new();
    let speeds = target.info.speeds().intersection(local_speeds);
    for speed in speeds.iter() {
        let candidates: NodeMask = records
            .iter()
            .filter(|r| r.info.is_listening() && r.info.speeds().contains(speed))
            .map(|r| r.id)
            .collect();
        if !candidates.is_empty() {
            tiers.push(Tier {
                speed,
                beam: None,
                candidates,
            });
        }
    }

    for beam in [SensorWakeup::Ms1000, SensorWakeup::Ms250] {
        let flirs: Vec<_> = records
            .iter()
            .filter(|r| !r.info.is_listening() && r.info.sensor_wakeup() == Some(beam))
            .collect();
        if flirs.is_empty() {
            continue;
        }
        let common = flirs
            .iter()
            .fold(speeds, |acc, r| acc.intersection(r.info.speeds()));
        let speed = common.iter().last().unwrap_or(Speed::Kbps9_6);
        tiers.push(Tier {
            speed,
            beam: Some(beam),
            candidates: flirs.iter().map(|r| r.id).collect(),
        });
    }
    tiers
}

#[derive(Debug, Default)]
pub(crate) struct Discovery {
    epoch: u32,
    episode: Option<Episode>,
}

impl Discovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.episode.is_some()
    }

    pub fn origin(&self) -> Option<Origin> {
        self.episode.as_ref().map(|e| e.origin)
    }

    pub fn phase(&self) -> Option<DiscoveryPhase> {
        self.episode.as_ref().map(|e| e.phase)
    }

    pub fn start(
        &mut self,
        ctx: &mut Ctx<'_>,
        node: NodeId,
        origin: Origin,
    ) -> Result<(), ControlError> {
        if self.is_active() {
            return Err(ControlError::Busy);
        }
        if node == ctx.network.node_id || node.is_long_range() {
            return Err(ControlError::NotSupported);
        }
        let Some(record) = ctx.directory.get(node) else {
            return Err(ControlError::NodeNotFound(node));
        };
        // A node that previously reported nothing gets the full union.
        let exhaustive = record.pending_discovery;
        let mut tiers: VecDeque<_> = plan_tiers(ctx.directory, node, ctx.network.speeds).into();
        tracing::debug!(%node, tiers = tiers.len(), exhaustive, "neighbor discovery started");

        if let Origin::Caller(handle) = origin {
            ctx.out.notify(Notification::NeighborUpdate {
                handle,
                node,
                status: NeighborUpdateStatus::Started,
            });
        }

        let first = tiers.pop_front();
        let planned = first.is_some();
        self.episode = Some(Episode {
            node,
            origin,
            exhaustive,
            wakeup: record.info.sensor_wakeup(),
            tiers,
            current: first.unwrap_or(Tier {
                speed: Speed::Kbps9_6,
                beam: None,
                candidates: NodeMask::new(),
            }),
            phase: DiscoveryPhase::SendingFind,
            merged: NodeMask::new(),
            timed_out: false,
        });
        if planned {
            self.send_find(ctx);
        } else {
            // Nobody to probe: an empty neighbor set is the answer.
            self.finish(ctx, None);
        }
        Ok(())
    }

    fn send_find(&mut self, ctx: &mut Ctx<'_>) {
        let Some(ep) = self.episode.as_mut() else {
            return;
        };
        let frame = ProtocolFrame::FindNodesInRange(FindNodesInRange {
            candidates: ep.current.candidates,
            wakeup: ep.current.beam,
            speed: ep.current.speed,
        });
        tracing::debug!(
            node = %ep.node,
            speed = ?ep.current.speed,
            beam = ?ep.current.beam,
            candidates = ep.current.candidates.count(),
            "range round"
        );
        ep.phase = DiscoveryPhase::SendingFind;
        ctx.out.send(
            Owner::Discovery,
            self.epoch,
            Outgoing::to(ep.node, frame).beam(ep.wakeup),
        );
    }

    fn send_get(&mut self, ctx: &mut Ctx<'_>) {
        let Some(ep) = self.episode.as_mut() else {
            return;
        };
        ep.phase = DiscoveryPhase::SendingGet;
        let frame = ProtocolFrame::GetNodesInRange {
            wakeup: ep.current.beam,
        };
        ctx.out.send(
            Owner::Discovery,
            self.epoch,
            Outgoing::to(ep.node, frame).beam(ep.wakeup),
        );
    }

    pub fn on_tx(&mut self, ctx: &mut Ctx<'_>, tag: TxTag, status: TxStatus) {
        if tag.epoch != self.epoch {
            return;
        }
        let Some(ep) = self.episode.as_mut() else {
            return;
        };
        match (ep.phase, status.is_ok()) {
            (DiscoveryPhase::SendingFind, true) => {
                ep.phase = DiscoveryPhase::AwaitComplete;
                let timing = &ctx.config.timing;
                let after = timing.per_candidate(ep.current.beam) * ep.current.candidates.count()
                    + timing.range_slack;
                ctx.out.start_timer(TimerKind::Discovery, after);
            }
            (DiscoveryPhase::SendingFind, false) => {
                tracing::debug!(node = %ep.node, ?status, "find nodes in range not delivered");
                self.finish(ctx, Some(status.into_error()));
            }
            (DiscoveryPhase::SendingGet, true) => {
                ep.phase = DiscoveryPhase::AwaitRangeInfo;
                ctx.out
                    .start_timer(TimerKind::Discovery, ctx.config.timing.range_info_timeout);
            }
            (DiscoveryPhase::SendingGet, false) => {
                ep.timed_out = true;
                self.next_tier(ctx);
            }
            _ => {}
        }
    }

    pub fn on_command_complete(&mut self, ctx: &mut Ctx<'_>, rx: &RxInfo) {
        let Some(ep) = &self.episode else {
            return;
        };
        if ep.phase != DiscoveryPhase::AwaitComplete || rx.source != ep.node {
            return;
        }
        ctx.out.stop_timer(TimerKind::Discovery);
        self.send_get(ctx);
    }

    pub fn on_range_info(&mut self, ctx: &mut Ctx<'_>, rx: &RxInfo, neighbors: &NodeMask) {
        let Some(ep) = self.episode.as_mut() else {
            return;
        };
        if ep.phase != DiscoveryPhase::AwaitRangeInfo || rx.source != ep.node {
            return;
        }
        ctx.out.stop_timer(TimerKind::Discovery);
        let found = neighbors.intersection(&ep.current.candidates);
        tracing::debug!(node = %ep.node, found = found.count(), "range info");
        ep.merged = ep.merged.union(&found);
        self.next_tier(ctx);
    }

    pub fn on_timer(&mut self, ctx: &mut Ctx<'_>) {
        let Some(ep) = self.episode.as_mut() else {
            return;
        };
        match ep.phase {
            // The target may still have a partial answer.
            DiscoveryPhase::AwaitComplete => {
                tracing::debug!(node = %ep.node, "command complete timeout");
                ep.timed_out = true;
                self.send_get(ctx);
            }
            DiscoveryPhase::AwaitRangeInfo => {
                tracing::debug!(node = %ep.node, "range info timeout");
                ep.timed_out = true;
                self.next_tier(ctx);
            }
            _ => {}
        }
    }

    fn next_tier(&mut self, ctx: &mut Ctx<'_>) {
        let Some(ep) = self.episode.as_mut() else {
            return;
        };
        if !ep.exhaustive && ep.current.beam.is_none() && !ep.merged.is_empty() {
            // Early stop applies to speed tiers only; beam tiers always run.
            ep.tiers.retain(|t| t.beam.is_some());
        }
        match ep.tiers.pop_front() {
            Some(tier) => {
                ep.current = tier;
                self.send_find(ctx);
            }
            None => self.finish(ctx, None),
        }
    }

    fn finish(&mut self, ctx: &mut Ctx<'_>, error: Option<ControlError>) {
        let Some(ep) = self.episode.take() else {
            return;
        };
        self.epoch = self.epoch.wrapping_add(1);
        ctx.out.stop_timer(TimerKind::Discovery);
        let node = ep.node;
        let outcome = match error {
            Some(err) => {
                mark_pending(ctx.directory, node, true);
                DiscoveryOutcome::Failed(err)
            }
            None if ep.merged.is_empty() && ep.timed_out => {
                mark_pending(ctx.directory, node, true);
                DiscoveryOutcome::Pending
            }
            None => {
                commit_neighbors(ctx.directory, node, &ep.merged);
                mark_pending(ctx.directory, node, false);
                ctx.out.handoff(Handoff::RegisterChange {
                    change: ChangeKind::RoutingChanged,
                    node,
                });
                DiscoveryOutcome::Done(ctx.directory.neighbors(node))
            }
        };
        tracing::info!(%node, outcome = ?outcome, "neighbor discovery finished");
        match ep.origin {
            Origin::Caller(handle) => {
                let status = match outcome {
                    DiscoveryOutcome::Done(neighbors) => NeighborUpdateStatus::Done { neighbors },
                    DiscoveryOutcome::Pending => NeighborUpdateStatus::Pending,
                    DiscoveryOutcome::Failed(err) => NeighborUpdateStatus::Failed(err),
                };
                ctx.out.notify(Notification::NeighborUpdate {
                    handle,
                    node,
                    status,
                });
            }
            Origin::Inclusion => ctx.out.handoff(Handoff::DiscoveryFinished { node, outcome }),
        }
    }

    /// Drop the running episode without reporting. The node stays pending.
    pub fn abort(&mut self, ctx: &mut Ctx<'_>) {
        let Some(ep) = self.episode.take() else {
            return;
        };
        tracing::debug!(node = %ep.node, "neighbor discovery aborted");
        self.epoch = self.epoch.wrapping_add(1);
        ctx.out.stop_timer(TimerKind::Discovery);
        ctx.out.cancel(Owner::Discovery);
        mark_pending(ctx.directory, ep.node, true);
    }
}

fn mark_pending(directory: &mut dyn NodeDirectory, node: NodeId, pending: bool) {
    if let Some(mut record) = directory.get(node)
        && record.pending_discovery != pending
    {
        record.pending_discovery = pending;
        directory.put(node, record);
    }
}
