//! Role capabilities and the local network identity.
//!
//! The role is resolved once at startup into a [`RolePolicy`] trait object;
//! components ask the policy instead of branching on the role themselves.

use std::fmt;

use zwave_core::{HomeId, NodeId, NodeInfo, SpeedSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Controller,
    SecondaryController,
    RoutingSlave,
    NonRoutingSlave,
}

/// What a node of a given role is allowed to do.
pub trait RolePolicy: fmt::Debug + Send {
    fn role(&self) -> Role;

    fn is_controller(&self) -> bool {
        matches!(self.role(), Role::Controller | Role::SecondaryController)
    }

    /// May run inclusion and exclusion of other nodes.
    fn can_include(&self, authority_known: bool) -> bool;

    /// May compute routes and push them to end devices.
    fn can_assign_return_routes(&self) -> bool;

    /// May request neighbor discovery of other nodes.
    fn can_request_discovery(&self) -> bool;

    /// May hold the topology authority log.
    fn can_be_authority(&self) -> bool;

    /// Answers find-nodes-in-range requests from a controller.
    fn answers_range_requests(&self) -> bool {
        true
    }
}

#[derive(Debug)]
struct PrimaryController;

impl RolePolicy for PrimaryController {
    fn role(&self) -> Role {
        Role::Controller
    }

    fn can_include(&self, _authority_known: bool) -> bool {
        true
    }

    fn can_assign_return_routes(&self) -> bool {
        true
    }

    fn can_request_discovery(&self) -> bool {
        true
    }

    fn can_be_authority(&self) -> bool {
        true
    }
}

/// A secondary controller includes only as an inclusion controller, which
/// requires an authority to report to.
#[derive(Debug)]
struct SecondaryController;

impl RolePolicy for SecondaryController {
    fn role(&self) -> Role {
        Role::SecondaryController
    }

    fn can_include(&self, authority_known: bool) -> bool {
        authority_known
    }

    fn can_assign_return_routes(&self) -> bool {
        true
    }

    fn can_request_discovery(&self) -> bool {
        true
    }

    fn can_be_authority(&self) -> bool {
        true
    }
}

#[derive(Debug)]
struct RoutingSlave;

impl RolePolicy for RoutingSlave {
    fn role(&self) -> Role {
        Role::RoutingSlave
    }

    fn can_include(&self, _authority_known: bool) -> bool {
        false
    }

    fn can_assign_return_routes(&self) -> bool {
        false
    }

    fn can_request_discovery(&self) -> bool {
        false
    }

    fn can_be_authority(&self) -> bool {
        false
    }
}

#[derive(Debug)]
struct NonRoutingSlave;

impl RolePolicy for NonRoutingSlave {
    fn role(&self) -> Role {
        Role::NonRoutingSlave
    }

    fn can_include(&self, _authority_known: bool) -> bool {
        false
    }

    fn can_assign_return_routes(&self) -> bool {
        false
    }

    fn can_request_discovery(&self) -> bool {
        false
    }

    fn can_be_authority(&self) -> bool {
        false
    }
}

pub fn policy_for(role: Role) -> Box<dyn RolePolicy> {
    match role {
        Role::Controller => Box::new(PrimaryController),
        Role::SecondaryController => Box::new(SecondaryController),
        Role::RoutingSlave => Box::new(RoutingSlave),
        Role::NonRoutingSlave => Box::new(NonRoutingSlave),
    }
}

/// Identity of the local node within its network.
#[derive(Debug)]
pub struct NetworkState {
    pub home_id: HomeId,
    pub node_id: NodeId,
    /// Node information this node announces about itself.
    pub info: NodeInfo,
    /// Speeds the local radio supports.
    pub speeds: SpeedSet,
    /// Allocate long-range IDs when including on the long-range channel.
    pub long_range: bool,
    authority: Option<NodeId>,
    policy: Box<dyn RolePolicy>,
}

impl NetworkState {
    pub fn new(home_id: HomeId, node_id: NodeId, role: Role, info: NodeInfo) -> Self {
        let speeds = info.speeds();
        Self {
            home_id,
            node_id,
            info,
            speeds,
            long_range: false,
            authority: None,
            policy: policy_for(role),
        }
    }

    pub fn policy(&self) -> &dyn RolePolicy {
        self.policy.as_ref()
    }

    pub fn role(&self) -> Role {
        self.policy.role()
    }

    pub fn authority(&self) -> Option<NodeId> {
        self.authority
    }

    /// Set or clear the known topology authority. An ID of zero clears it.
    pub fn set_authority(&mut self, authority: Option<NodeId>) {
        self.authority = authority.filter(|id| id.is_classic());
    }

    pub fn is_authority(&self) -> bool {
        self.authority == Some(self.node_id) && self.policy.can_be_authority()
    }

    /// The authority when it is a different node.
    pub fn remote_authority(&self) -> Option<NodeId> {
        self.authority.filter(|id| *id != self.node_id)
    }

    pub fn authority_known(&self) -> bool {
        self.authority.is_some()
    }
}
