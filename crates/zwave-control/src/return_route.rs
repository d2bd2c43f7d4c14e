//! Return-route assignment: compute routes and push them, one slot at a time,
//! to a routing end device.
//!
//! Slots are filled in priority order. A caller-supplied priority route takes
//! slot 0. Next comes a direct route when it is plausible, then the
//! shortest-path search from the highest common speed downward. Once no
//! further path exists the remaining slots are cleared. A job that assigned
//! a priority route closes with the priority marker for slot 0.

use zwave_core::constants::{MAX_REPEATERS, RETURN_ROUTE_SLOTS};
use zwave_core::{NodeId, NodeInfo, ProtocolFrame, ReturnRouteFrame, Speed};

use crate::action::{Handle, Notification, Owner, TxStatus, TxTag};
use crate::context::{Ctx, Handoff, Origin, Outgoing};
use crate::directory::NodeDirectory;
use crate::error::ControlError;
use crate::routing::RouteSearch;

/// Route a caller wants in slot 0 regardless of what the search finds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityRoute {
    pub repeaters: Vec<NodeId>,
    pub speed: Speed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnRouteState {
    Idle,
    BuildingRoute,
    Sending,
}

/// What a job writes into the slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RouteMode {
    Assign,
    Delete,
}

#[derive(Debug)]
struct Search {
    /// Speeds still to try, fastest first.
    speeds: Vec<Speed>,
    direct_tried: bool,
    /// Routes produced by the search itself; the priority route is not listed.
    found: Vec<Vec<NodeId>>,
}

#[derive(Debug)]
enum Pending {
    Slot { route: Option<Vec<NodeId>> },
    PriorityMarker,
}

#[derive(Debug)]
struct Job {
    origin: Origin,
    source: NodeId,
    destination: NodeId,
    suc: bool,
    mode: RouteMode,
    priority: Option<PriorityRoute>,
    priority_used: bool,
    marker_sent: bool,
    slot: u8,
    succeeded: usize,
    assigned: Vec<Vec<NodeId>>,
    search: Search,
    source_info: NodeInfo,
    destination_info: Option<NodeInfo>,
    pending: Option<Pending>,
}

/// Parameters of a new job, validated by [`ReturnRouteFsm::start`].
#[derive(Debug)]
pub(crate) struct RouteRequest {
    pub origin: Origin,
    pub source: NodeId,
    pub destination: NodeId,
    pub suc: bool,
    pub mode: RouteMode,
    pub priority: Option<PriorityRoute>,
}

#[derive(Debug, Default)]
pub(crate) struct ReturnRouteFsm {
    epoch: u32,
    job: Option<Job>,
}

impl ReturnRouteFsm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.job.is_some()
    }

    pub fn origin(&self) -> Option<Origin> {
        self.job.as_ref().map(|j| j.origin)
    }

    pub fn state(&self) -> ReturnRouteState {
        match &self.job {
            None => ReturnRouteState::Idle,
            Some(job) if job.pending.is_some() => ReturnRouteState::Sending,
            Some(_) => ReturnRouteState::BuildingRoute,
        }
    }

    pub fn start(&mut self, ctx: &mut Ctx<'_>, request: RouteRequest) -> Result<(), ControlError> {
        if self.is_active() {
            return Err(ControlError::Busy);
        }
        if !ctx.network.policy().can_assign_return_routes() {
            return Err(ControlError::NotSupported);
        }
        let source_info = ctx
            .directory
            .info(request.source)
            .filter(|_| request.source.is_classic())
            .ok_or(ControlError::NodeNotFound(request.source))?;
        if !source_info.is_routing() {
            return Err(ControlError::NotSupported);
        }
        let destination_info = if request.mode == RouteMode::Assign {
            if request.destination == request.source {
                return Err(ControlError::NotSupported);
            }
            let info = ctx
                .directory
                .info(request.destination)
                .filter(|_| request.destination.is_classic())
                .ok_or(ControlError::NodeNotFound(request.destination))?;
            Some(info)
        } else {
            None
        };
        if let Some(priority) = &request.priority {
            validate_priority(ctx.directory, priority)?;
        }

        let speeds = match &destination_info {
            Some(info) => {
                let common = source_info
                    .speeds()
                    .intersection(info.speeds())
                    .intersection(ctx.network.speeds);
                let mut speeds: Vec<_> = common.iter().collect();
                speeds.reverse();
                speeds
            }
            None => Vec::new(),
        };

        tracing::debug!(
            source = %request.source,
            destination = %request.destination,
            suc = request.suc,
            mode = ?request.mode,
            "return route job started"
        );
        self.job = Some(Job {
            origin: request.origin,
            source: request.source,
            destination: request.destination,
            suc: request.suc,
            mode: request.mode,
            priority: request.priority,
            priority_used: false,
            marker_sent: false,
            slot: 0,
            succeeded: 0,
            assigned: Vec::new(),
            search: Search {
                speeds,
                direct_tried: false,
                found: Vec::new(),
            },
            source_info,
            destination_info,
            pending: None,
        });
        self.step(ctx);
        Ok(())
    }

    /// Build and send the next frame, or finish.
    fn step(&mut self, ctx: &mut Ctx<'_>) {
        let Some(job) = self.job.as_mut() else {
            return;
        };

        if usize::from(job.slot) < RETURN_ROUTE_SLOTS {
            let route = match job.mode {
                RouteMode::Delete => None,
                RouteMode::Assign => match next_route(job, ctx.directory) {
                    Some(found) => Some(found),
                    None if job.slot == 0 => {
                        self.finish(ctx, Err(ControlError::NoRoute));
                        return;
                    }
                    None => {
                        tracing::debug!(slot = job.slot, "no more paths, clearing remaining slots");
                        job.mode = RouteMode::Delete;
                        None
                    }
                },
            };
            let frame = slot_frame(job, route.as_ref());
            job.pending = Some(Pending::Slot {
                route: route.map(|(repeaters, _)| repeaters),
            });
            let out = Outgoing::to(job.source, frame).beam(job.source_info.sensor_wakeup());
            ctx.out.send(Owner::ReturnRoute, self.epoch, out);
            return;
        }

        if job.priority_used && !job.marker_sent {
            let destination = job.destination;
            let frame = if job.suc {
                ProtocolFrame::AssignSucReturnRoutePriority {
                    destination,
                    route_number: 0,
                }
            } else {
                ProtocolFrame::AssignReturnRoutePriority {
                    destination,
                    route_number: 0,
                }
            };
            job.pending = Some(Pending::PriorityMarker);
            let out = Outgoing::to(job.source, frame).beam(job.source_info.sensor_wakeup());
            ctx.out.send(Owner::ReturnRoute, self.epoch, out);
            return;
        }

        self.finish(ctx, Ok(()));
    }

    pub fn on_tx(&mut self, ctx: &mut Ctx<'_>, tag: TxTag, status: TxStatus) {
        if tag.epoch != self.epoch {
            return;
        }
        let Some(job) = self.job.as_mut() else {
            return;
        };
        let Some(pending) = job.pending.take() else {
            return;
        };
        if !status.is_ok() {
            // After one slot landed the source has something usable; report
            // the route as incomplete rather than a delivery problem.
            let err = if job.succeeded == 0 {
                ControlError::TransmitFailed
            } else {
                ControlError::NoRoute
            };
            tracing::debug!(source = %job.source, slot = job.slot, ?status, "return route frame failed");
            self.finish(ctx, Err(err));
            return;
        }
        job.succeeded += 1;
        match pending {
            Pending::Slot { route } => {
                if let Some(route) = route {
                    job.assigned.push(route);
                }
                job.slot += 1;
            }
            Pending::PriorityMarker => job.marker_sent = true,
        }
        self.step(ctx);
    }

    fn finish(&mut self, ctx: &mut Ctx<'_>, result: Result<(), ControlError>) {
        let Some(job) = self.job.take() else {
            return;
        };
        self.epoch = self.epoch.wrapping_add(1);
        if result.is_ok() {
            store_routes(ctx.directory, &job);
        }
        match &result {
            Ok(()) => tracing::info!(
                source = %job.source,
                destination = %job.destination,
                routes = job.assigned.len(),
                "return routes assigned"
            ),
            Err(err) => tracing::info!(source = %job.source, %err, "return route job failed"),
        }
        report(ctx, job.origin, job.source, result);
    }

    /// Stop reacting to the running job. Returns `false` when idle.
    pub fn stop(&mut self, ctx: &mut Ctx<'_>) -> bool {
        let Some(job) = self.job.take() else {
            return false;
        };
        self.epoch = self.epoch.wrapping_add(1);
        ctx.out.cancel(Owner::ReturnRoute);
        tracing::info!(source = %job.source, "return route job stopped");
        report(ctx, job.origin, job.source, Err(ControlError::Stopped));
        true
    }

    /// Drop the job silently; used when the inclusion that started it stops.
    pub fn abort(&mut self, ctx: &mut Ctx<'_>) {
        if self.job.take().is_some() {
            self.epoch = self.epoch.wrapping_add(1);
            ctx.out.cancel(Owner::ReturnRoute);
        }
    }
}

fn report(ctx: &mut Ctx<'_>, origin: Origin, source: NodeId, result: Result<(), ControlError>) {
    match origin {
        Origin::Caller(handle) => notify(ctx, handle, source, result),
        Origin::Inclusion => ctx.out.handoff(Handoff::ReturnRouteFinished { result }),
    }
}

pub(crate) fn notify(ctx: &mut Ctx<'_>, handle: Handle, source: NodeId, result: Result<(), ControlError>) {
    ctx.out.notify(Notification::ReturnRoute {
        handle,
        source,
        result,
    });
}

fn validate_priority(directory: &dyn NodeDirectory, priority: &PriorityRoute) -> Result<(), ControlError> {
    if priority.repeaters.len() > MAX_REPEATERS {
        return Err(ControlError::NotSupported);
    }
    match priority.repeaters.iter().find(|id| !directory.exists(**id)) {
        Some(missing) => Err(ControlError::NodeNotFound(*missing)),
        None => Ok(()),
    }
}

/// Next route for the current slot, or `None` once every option is spent.
fn next_route(job: &mut Job, directory: &dyn NodeDirectory) -> Option<(Vec<NodeId>, Speed)> {
    if let Some(priority) = job.priority.as_ref().filter(|_| !job.priority_used) {
        job.priority_used = true;
        return Some((priority.repeaters.clone(), priority.speed));
    }

    if !job.search.direct_tried {
        job.search.direct_tried = true;
        let src = directory.neighbors(job.source);
        let dst = directory.neighbors(job.destination);
        let mutual = src.contains(job.destination) && dst.contains(job.source);
        if src.is_empty() || dst.is_empty() || mutual {
            let speed = job.search.speeds.first().copied().unwrap_or(Speed::Kbps9_6);
            job.search.found.push(Vec::new());
            return Some((Vec::new(), speed));
        }
    }

    while let Some(&speed) = job.search.speeds.first() {
        let search = RouteSearch::new(directory, speed);
        if let Some(path) = search.find(job.source, job.destination, &job.search.found) {
            job.search.found.push(path.clone());
            return Some((path, speed));
        }
        job.search.speeds.remove(0);
    }
    None
}

fn slot_frame(job: &Job, route: Option<&(Vec<NodeId>, Speed)>) -> ProtocolFrame {
    let body = match route {
        Some((repeaters, speed)) => ReturnRouteFrame {
            destination: job.destination,
            route_number: job.slot,
            repeaters: repeaters.clone(),
            speed: *speed,
            destination_wakeup: job.destination_info.as_ref().and_then(|i| i.sensor_wakeup()),
            source_wakeup: job.source_info.sensor_wakeup(),
        },
        None => ReturnRouteFrame::clear(job.slot),
    };
    if job.suc {
        ProtocolFrame::AssignSucReturnRoute(body)
    } else {
        ProtocolFrame::AssignReturnRoute(body)
    }
}

fn store_routes(directory: &mut dyn NodeDirectory, job: &Job) {
    let Some(mut record) = directory.get(job.source) else {
        return;
    };
    match job.mode {
        _ if !job.assigned.is_empty() => {
            record.routes.insert(job.destination, job.assigned.clone());
        }
        RouteMode::Delete if job.destination.is_unassigned() => record.routes.clear(),
        _ => {
            record.routes.remove(&job.destination);
        }
    }
    directory.put(job.source, record);
}
