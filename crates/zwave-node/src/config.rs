//! TOML-based configuration for a controller node.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use zwave_control::{ControlConfig, NetworkState, Retries, Role, Timing};
use zwave_core::constants::{
    BASIC_TYPE_CONTROLLER, BASIC_TYPE_ROUTING_SLAVE, BASIC_TYPE_SLAVE,
    BASIC_TYPE_STATIC_CONTROLLER, CAPABILITY_LISTENING, CAPABILITY_ROUTING, CAPABILITY_SPEED_40K,
    CAPABILITY_SPEED_9600, RESERVED_SPEED_100K, RESERVED_SPEED_100K_LR, SECURITY_CONTROLLER,
    SECURITY_ROUTING_SLAVE, SECURITY_SPECIFIC_DEVICE,
};
use zwave_core::{DeviceType, HomeId, NodeId, NodeInfo, Speed};

use crate::error::NodeError;

/// Top-level node configuration loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub timing: TimingSection,
    #[serde(default)]
    pub retries: RetriesSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, NodeError> {
        Ok(toml::from_str(s)?)
    }

    /// Timing and retry parameters for the state machines.
    pub fn to_control_config(&self) -> Result<ControlConfig, NodeError> {
        if self.retries.add_probe == 0 || self.retries.remove_probe == 0 {
            return Err(NodeError::Config("probe retries must be at least 1".into()));
        }
        Ok(ControlConfig {
            timing: self.timing.to_timing(),
            retries: Retries {
                add_probe: self.retries.add_probe,
                remove_probe: self.retries.remove_probe,
            },
        })
    }

    /// Identity of the local node: home ID, node ID, role and the node
    /// information it announces.
    pub fn network_state(&self) -> Result<NetworkState, NodeError> {
        let net = &self.network;
        let home_id = match &net.home_id {
            Some(s) => parse_home_id(s)?,
            None => return Err(NodeError::Config("network.home_id is required".into())),
        };
        let node_id = NodeId::new(net.node_id);
        if !node_id.is_classic() {
            return Err(NodeError::Config(format!("invalid node id: {}", net.node_id)));
        }
        let role = parse_role(&net.role)?;
        let speeds = net
            .speeds
            .iter()
            .map(|s| parse_speed(s))
            .collect::<Result<Vec<_>, _>>()?;

        let info = local_info(role, net, &speeds);
        let mut state = NetworkState::new(home_id, node_id, role, info);
        state.long_range = net.long_range;
        if let Some(id) = net.suc_node_id {
            state.set_authority(Some(NodeId::new(id)));
        }
        Ok(state)
    }
}

/// The `[network]` section.
#[derive(Debug, Deserialize)]
pub struct NetworkSection {
    /// Eight hex digits, e.g. `"C0FFEE01"`.
    pub home_id: Option<String>,
    #[serde(default = "default_node_id")]
    pub node_id: u16,
    #[serde(default = "default_role")]
    pub role: String,
    /// Topology authority (SUC) known at startup.
    pub suc_node_id: Option<u16>,
    #[serde(default)]
    pub long_range: bool,
    #[serde(default = "default_speeds")]
    pub speeds: Vec<String>,
    #[serde(default = "default_listening")]
    pub listening: bool,
    #[serde(default = "default_generic_type")]
    pub generic_type: u8,
    #[serde(default = "default_specific_type")]
    pub specific_type: u8,
    #[serde(default)]
    pub command_classes: Vec<u8>,
}

fn default_node_id() -> u16 {
    1
}

fn default_role() -> String {
    "controller".to_string()
}

fn default_speeds() -> Vec<String> {
    vec!["9.6k".to_string(), "40k".to_string()]
}

fn default_listening() -> bool {
    true
}

fn default_generic_type() -> u8 {
    0x02
}

fn default_specific_type() -> u8 {
    0x01
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            home_id: None,
            node_id: default_node_id(),
            role: default_role(),
            suc_node_id: None,
            long_range: false,
            speeds: default_speeds(),
            listening: default_listening(),
            generic_type: default_generic_type(),
            specific_type: default_specific_type(),
            command_classes: Vec::new(),
        }
    }
}

/// The `[timing]` section. All durations are in milliseconds.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TimingSection {
    pub probe_per_candidate_ms: u64,
    pub beam_250ms_extra_ms: u64,
    pub beam_1000ms_extra_ms: u64,
    pub range_slack_ms: u64,
    pub range_info_timeout_ms: u64,
    pub probe_guard_ms: u64,
    pub learn_timeout_ms: u64,
    pub update_timeout_ms: u64,
    pub pending_base_ms: u64,
    pub pending_max_step: u32,
}

impl Default for TimingSection {
    fn default() -> Self {
        let t = Timing::default();
        let ms = |d: Duration| d.as_millis() as u64;
        Self {
            probe_per_candidate_ms: ms(t.probe_per_candidate),
            beam_250ms_extra_ms: ms(t.beam_250ms_extra),
            beam_1000ms_extra_ms: ms(t.beam_1000ms_extra),
            range_slack_ms: ms(t.range_slack),
            range_info_timeout_ms: ms(t.range_info_timeout),
            probe_guard_ms: ms(t.probe_guard),
            learn_timeout_ms: ms(t.learn_timeout),
            update_timeout_ms: ms(t.update_timeout),
            pending_base_ms: ms(t.pending_base),
            pending_max_step: t.pending_max_step,
        }
    }
}

impl TimingSection {
    fn to_timing(&self) -> Timing {
        Timing {
            probe_per_candidate: Duration::from_millis(self.probe_per_candidate_ms),
            beam_250ms_extra: Duration::from_millis(self.beam_250ms_extra_ms),
            beam_1000ms_extra: Duration::from_millis(self.beam_1000ms_extra_ms),
            range_slack: Duration::from_millis(self.range_slack_ms),
            range_info_timeout: Duration::from_millis(self.range_info_timeout_ms),
            probe_guard: Duration::from_millis(self.probe_guard_ms),
            learn_timeout: Duration::from_millis(self.learn_timeout_ms),
            update_timeout: Duration::from_millis(self.update_timeout_ms),
            pending_base: Duration::from_millis(self.pending_base_ms),
            pending_max_step: self.pending_max_step,
        }
    }
}

/// The `[retries]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetriesSection {
    pub add_probe: u8,
    pub remove_probe: u8,
}

impl Default for RetriesSection {
    fn default() -> Self {
        let r = Retries::default();
        Self {
            add_probe: r.add_probe,
            remove_probe: r.remove_probe,
        }
    }
}

/// The `[logging]` section.
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Parse a home ID written as eight hex digits, with or without `0x`.
pub fn parse_home_id(s: &str) -> Result<HomeId, NodeError> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    if digits.len() != 8 {
        return Err(NodeError::Config(format!("home id must be 8 hex digits: '{s}'")));
    }
    u32::from_str_radix(digits, 16)
        .map(HomeId::from_u32)
        .map_err(|e| NodeError::Config(format!("invalid home id '{s}': {e}")))
}

/// Parse a role name.
pub fn parse_role(s: &str) -> Result<Role, NodeError> {
    match s.to_lowercase().as_str() {
        "controller" | "primary" => Ok(Role::Controller),
        "secondary_controller" | "secondary" => Ok(Role::SecondaryController),
        "routing_slave" => Ok(Role::RoutingSlave),
        "non_routing_slave" | "slave" => Ok(Role::NonRoutingSlave),
        other => Err(NodeError::Config(format!("unknown role: {other}"))),
    }
}

/// Parse a speed tier such as `"40k"`.
pub fn parse_speed(s: &str) -> Result<Speed, NodeError> {
    match s.to_lowercase().as_str() {
        "9.6k" | "9600" => Ok(Speed::Kbps9_6),
        "40k" | "40000" => Ok(Speed::Kbps40),
        "100k" | "100000" => Ok(Speed::Kbps100),
        other => Err(NodeError::Config(format!("unknown speed: {other}"))),
    }
}

fn local_info(role: Role, net: &NetworkSection, speeds: &[Speed]) -> NodeInfo {
    let mut capability = 0;
    if net.listening {
        capability |= CAPABILITY_LISTENING;
    }
    if role != Role::NonRoutingSlave {
        capability |= CAPABILITY_ROUTING;
    }
    let mut reserved = 0;
    for speed in speeds {
        match speed {
            Speed::Kbps9_6 => capability |= CAPABILITY_SPEED_9600,
            Speed::Kbps40 => capability |= CAPABILITY_SPEED_40K,
            Speed::Kbps100 => reserved |= RESERVED_SPEED_100K,
        }
    }
    if net.long_range {
        reserved |= RESERVED_SPEED_100K_LR;
    }
    let (security, basic) = match role {
        Role::Controller => (SECURITY_CONTROLLER, BASIC_TYPE_STATIC_CONTROLLER),
        Role::SecondaryController => (SECURITY_CONTROLLER, BASIC_TYPE_CONTROLLER),
        Role::RoutingSlave => (SECURITY_ROUTING_SLAVE, BASIC_TYPE_ROUTING_SLAVE),
        Role::NonRoutingSlave => (0, BASIC_TYPE_SLAVE),
    };
    NodeInfo {
        capability,
        security: security | SECURITY_SPECIFIC_DEVICE,
        reserved,
        device: DeviceType {
            basic,
            generic: net.generic_type,
            specific: net.specific_type,
        },
        command_classes: net.command_classes.clone(),
    }
}
