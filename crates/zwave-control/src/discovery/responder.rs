//! Target side of range discovery: probe each candidate and report who
//! acknowledged.

use std::collections::VecDeque;

use zwave_core::{FindNodesInRange, NodeId, NodeMask, ProtocolFrame, SensorWakeup, Speed};

use crate::action::{Owner, RxInfo, TimerKind, TxStatus, TxTag};
use crate::context::{Ctx, Outgoing};
use crate::directory::commit_neighbors;

#[derive(Debug)]
struct ProbeRun {
    requester: NodeId,
    candidates: NodeMask,
    remaining: VecDeque<NodeId>,
    current: Option<NodeId>,
    result: NodeMask,
    speed: Speed,
    wakeup: Option<SensorWakeup>,
}

#[derive(Debug, Default)]
pub struct ProbeResponder {
    epoch: u32,
    run: Option<ProbeRun>,
    last_result: Option<NodeMask>,
}

impl ProbeResponder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_probing(&self) -> bool {
        self.run.is_some()
    }

    pub(crate) fn on_find(&mut self, ctx: &mut Ctx<'_>, rx: &RxInfo, find: &FindNodesInRange) {
        if !ctx.network.policy().answers_range_requests() {
            return;
        }
        if self.run.is_some() {
            // The requester gave up on the previous round and started over.
            ctx.out.cancel(Owner::Probe);
            ctx.out.stop_timer(TimerKind::Probe);
            self.epoch = self.epoch.wrapping_add(1);
        }
        let own = ctx.network.node_id;
        let mut candidates = find.candidates;
        candidates.remove(own);
        tracing::debug!(
            requester = %rx.source,
            candidates = candidates.count(),
            speed = ?find.speed,
            "probing candidates"
        );
        self.run = Some(ProbeRun {
            requester: rx.source,
            candidates,
            remaining: candidates.iter().collect(),
            current: None,
            result: NodeMask::new(),
            speed: find.speed,
            wakeup: find.wakeup,
        });
        self.last_result = None;
        self.probe_next(ctx);
    }

    fn probe_next(&mut self, ctx: &mut Ctx<'_>) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        match run.remaining.pop_front() {
            Some(candidate) => {
                run.current = Some(candidate);
                let out = Outgoing::to(candidate, ProtocolFrame::Nop)
                    .at(run.speed)
                    .beam(run.wakeup)
                    .direct();
                ctx.out.send(Owner::Probe, self.epoch, out);
                ctx.out.start_timer(TimerKind::Probe, ctx.config.timing.probe_guard);
            }
            None => self.complete(ctx),
        }
    }

    fn complete(&mut self, ctx: &mut Ctx<'_>) {
        let Some(run) = self.run.take() else {
            return;
        };
        self.epoch = self.epoch.wrapping_add(1);
        let own = ctx.network.node_id;
        // Only the probed bits change; other neighbors are kept.
        let mine = ctx
            .directory
            .neighbors(own)
            .difference(&run.candidates)
            .union(&run.result);
        commit_neighbors(ctx.directory, own, &mine);
        tracing::debug!(found = run.result.count(), "probe run complete");
        self.last_result = Some(run.result);
        ctx.out.send(
            Owner::Probe,
            self.epoch,
            Outgoing::to(run.requester, ProtocolFrame::CommandComplete { seq: 0 }),
        );
    }

    fn record(&mut self, ctx: &mut Ctx<'_>, acked: bool) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        let Some(candidate) = run.current.take() else {
            return;
        };
        if acked {
            run.result.insert(candidate);
        } else {
            run.result.remove(candidate);
        }
        ctx.out.stop_timer(TimerKind::Probe);
        self.probe_next(ctx);
    }

    pub(crate) fn on_tx(&mut self, ctx: &mut Ctx<'_>, tag: TxTag, status: TxStatus) {
        if tag.epoch != self.epoch {
            return;
        }
        self.record(ctx, status.is_ok());
    }

    /// The transport never reported back for the current candidate.
    pub(crate) fn on_timer(&mut self, ctx: &mut Ctx<'_>) {
        let Some(candidate) = self.run.as_ref().and_then(|r| r.current) else {
            return;
        };
        tracing::debug!(%candidate, "probe guard expired");
        ctx.out.cancel(Owner::Probe);
        self.epoch = self.epoch.wrapping_add(1);
        self.record(ctx, false);
    }

    pub(crate) fn on_get(&mut self, ctx: &mut Ctx<'_>, rx: &RxInfo, wakeup: Option<SensorWakeup>) {
        if self.run.is_some() {
            tracing::trace!(requester = %rx.source, "range info requested while still probing");
            return;
        }
        let neighbors = match self.last_result {
            Some(result) => result,
            None => ctx.directory.neighbors(ctx.network.node_id),
        };
        ctx.out.send(
            Owner::Probe,
            self.epoch,
            Outgoing::to(rx.source, ProtocolFrame::RangeInfo { neighbors, wakeup }),
        );
    }
}
