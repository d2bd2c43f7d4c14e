//! Protocol constants and enumerations for the Z-Wave control plane.

use crate::error::FrameError;

// Address space
pub const MAX_CLASSIC_NODES: u16 = 232;
pub const NODE_MASK_LENGTH: usize = 29; // ceil(232 / 8)
pub const LOWEST_LONG_RANGE_NODE_ID: u16 = 256;
pub const HIGHEST_LONG_RANGE_NODE_ID: u16 = 4000;
pub const HOME_ID_LENGTH: usize = 4;

// Routing
pub const MAX_REPEATERS: usize = 4;
pub const RETURN_ROUTE_SLOTS: usize = 4;

// Topology authority update log
pub const UPDATE_LOG_SIZE: usize = 64;
pub const UPDATE_NODEPARM_MAX: usize = 20;
pub const NODEPARM_MAX: usize = 35;

const _: () = assert!(UPDATE_LOG_SIZE.is_power_of_two());

// Command classes carrying protocol frames
pub const COMMAND_CLASS_PROTOCOL: u8 = 0x01;
pub const COMMAND_CLASS_PROTOCOL_LR: u8 = 0x04;

// Capability byte
pub const CAPABILITY_LISTENING: u8 = 0x80;
pub const CAPABILITY_ROUTING: u8 = 0x40;
pub const CAPABILITY_SPEED_MASK: u8 = 0x38;
pub const CAPABILITY_SPEED_9600: u8 = 0x08;
pub const CAPABILITY_SPEED_40K: u8 = 0x10;
pub const CAPABILITY_VERSION_MASK: u8 = 0x07;

// Security byte
pub const SECURITY_SECURE: u8 = 0x01;
pub const SECURITY_CONTROLLER: u8 = 0x02;
pub const SECURITY_SPECIFIC_DEVICE: u8 = 0x04;
pub const SECURITY_ROUTING_SLAVE: u8 = 0x08;
pub const SECURITY_BEAM_CAPABLE: u8 = 0x10;
pub const SECURITY_SENSOR_MASK: u8 = 0x60;
pub const SECURITY_SENSOR_1000MS: u8 = 0x40;
pub const SECURITY_SENSOR_250MS: u8 = 0x20;
pub const SECURITY_OPTIONAL_FUNCTIONALITY: u8 = 0x80;

// Reserved byte
pub const RESERVED_SPEED_100K: u8 = 0x01;
pub const RESERVED_SPEED_100K_LR: u8 = 0x02;

// Basic device types inferred for legacy announcements
pub const BASIC_TYPE_CONTROLLER: u8 = 0x01;
pub const BASIC_TYPE_STATIC_CONTROLLER: u8 = 0x02;
pub const BASIC_TYPE_SLAVE: u8 = 0x03;
pub const BASIC_TYPE_ROUTING_SLAVE: u8 = 0x04;

// Find-nodes-in-range speed marker
pub const FIND_NODES_MASK_LENGTH_BITS: u8 = 0x1F;
pub const FIND_NODES_SPEED_9600: u8 = 0x01;
pub const FIND_NODES_SPEED_40K: u8 = 0x02;
pub const FIND_NODES_SPEED_100K: u8 = 0x03;
pub const FIND_NODES_SPEED_MASK: u8 = 0x07;

// Assign-return-route route speed byte
pub const ROUTE_SPEED_MASK: u8 = 0x38;
pub const ROUTE_SPEED_9600: u8 = 0x08;
pub const ROUTE_SPEED_40K: u8 = 0x10;
pub const ROUTE_SPEED_100K: u8 = 0x20;
pub const ROUTE_DEST_WAKEUP_MASK: u8 = 0x06;
pub const ROUTE_DEST_WAKEUP_1000MS: u8 = 0x04;
pub const ROUTE_DEST_WAKEUP_250MS: u8 = 0x02;
pub const ROUTE_SRC_WAKEUP_MASK: u8 = 0xC0;
pub const ROUTE_SRC_WAKEUP_1000MS: u8 = 0x80;
pub const ROUTE_SRC_WAKEUP_250MS: u8 = 0x40;

// Zensor wake-up marker carried in discovery frames
pub const ZENSOR_WAKEUP_NONE: u8 = 0x00;
pub const ZENSOR_WAKEUP_1000MS: u8 = 0x01;
pub const ZENSOR_WAKEUP_250MS: u8 = 0x02;

/// Commands of the classic protocol command class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProtocolCommand {
    Nop = 0x00,
    NodeInfo = 0x01,
    RequestNodeInfo = 0x02,
    AssignIds = 0x03,
    FindNodesInRange = 0x04,
    GetNodesInRange = 0x05,
    RangeInfo = 0x06,
    CommandComplete = 0x07,
    AssignReturnRoute = 0x0C,
    NewNodeRegistered = 0x0D,
    NewRangeRegistered = 0x0E,
    TransferEnd = 0x0B,
    AutomaticControllerUpdateStart = 0x10,
    SucNodeId = 0x11,
    AssignSucReturnRoute = 0x14,
    NodesExist = 0x1F,
    NodesExistReply = 0x20,
    AssignReturnRoutePriority = 0x24,
    AssignSucReturnRoutePriority = 0x25,
    SmartStartIncludeNodeInfo = 0x28,
}

impl ProtocolCommand {
    pub fn from_u8(v: u8) -> Result<Self, FrameError> {
        match v {
            0x00 => Ok(ProtocolCommand::Nop),
            0x01 => Ok(ProtocolCommand::NodeInfo),
            0x02 => Ok(ProtocolCommand::RequestNodeInfo),
            0x03 => Ok(ProtocolCommand::AssignIds),
            0x04 => Ok(ProtocolCommand::FindNodesInRange),
            0x05 => Ok(ProtocolCommand::GetNodesInRange),
            0x06 => Ok(ProtocolCommand::RangeInfo),
            0x07 => Ok(ProtocolCommand::CommandComplete),
            0x0B => Ok(ProtocolCommand::TransferEnd),
            0x0C => Ok(ProtocolCommand::AssignReturnRoute),
            0x0D => Ok(ProtocolCommand::NewNodeRegistered),
            0x0E => Ok(ProtocolCommand::NewRangeRegistered),
            0x10 => Ok(ProtocolCommand::AutomaticControllerUpdateStart),
            0x11 => Ok(ProtocolCommand::SucNodeId),
            0x14 => Ok(ProtocolCommand::AssignSucReturnRoute),
            0x1F => Ok(ProtocolCommand::NodesExist),
            0x20 => Ok(ProtocolCommand::NodesExistReply),
            0x24 => Ok(ProtocolCommand::AssignReturnRoutePriority),
            0x25 => Ok(ProtocolCommand::AssignSucReturnRoutePriority),
            0x28 => Ok(ProtocolCommand::SmartStartIncludeNodeInfo),
            _ => Err(FrameError::UnknownCommand(v)),
        }
    }
}

/// Commands of the long-range protocol command class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LongRangeCommand {
    Nop = 0x00,
    NodeInfo = 0x01,
    RequestNodeInfo = 0x02,
    AssignIds = 0x03,
    ExcludeRequest = 0x23,
    SmartStartIncludeNodeInfo = 0x28,
    ExcludeRequestConfirm = 0x29,
    NonSecureInclusionComplete = 0x2A,
}

impl LongRangeCommand {
    pub fn from_u8(v: u8) -> Result<Self, FrameError> {
        match v {
            0x00 => Ok(LongRangeCommand::Nop),
            0x01 => Ok(LongRangeCommand::NodeInfo),
            0x02 => Ok(LongRangeCommand::RequestNodeInfo),
            0x03 => Ok(LongRangeCommand::AssignIds),
            0x23 => Ok(LongRangeCommand::ExcludeRequest),
            0x28 => Ok(LongRangeCommand::SmartStartIncludeNodeInfo),
            0x29 => Ok(LongRangeCommand::ExcludeRequestConfirm),
            0x2A => Ok(LongRangeCommand::NonSecureInclusionComplete),
            _ => Err(FrameError::UnknownCommand(v)),
        }
    }
}

/// Status carried by a transfer-end frame closing an authority replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransferStatus {
    Done = 0x00,
    Abort = 0x01,
    Wait = 0x02,
    Disabled = 0x03,
    Overflow = 0x04,
}

impl TransferStatus {
    pub fn from_u8(v: u8) -> Result<Self, FrameError> {
        match v {
            0x00 => Ok(TransferStatus::Done),
            0x01 => Ok(TransferStatus::Abort),
            0x02 => Ok(TransferStatus::Wait),
            0x03 => Ok(TransferStatus::Disabled),
            0x04 => Ok(TransferStatus::Overflow),
            _ => Err(FrameError::InvalidStatus(v)),
        }
    }
}

/// Which node population a nodes-exist bitmap describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NodesExistType {
    All = 0x00,
    Repeater = 0x01,
    Listening = 0x02,
    Wakeup1000ms = 0x03,
    Wakeup250ms = 0x04,
}

impl NodesExistType {
    pub fn from_u8(v: u8) -> Result<Self, FrameError> {
        match v {
            0x00 => Ok(NodesExistType::All),
            0x01 => Ok(NodesExistType::Repeater),
            0x02 => Ok(NodesExistType::Listening),
            0x03 => Ok(NodesExistType::Wakeup1000ms),
            0x04 => Ok(NodesExistType::Wakeup250ms),
            _ => Err(FrameError::InvalidStatus(v)),
        }
    }
}

/// Status byte of a nodes-exist reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NodesExistStatus {
    UnknownType = 0x00,
    Done = 0x01,
}

impl NodesExistStatus {
    pub fn from_u8(v: u8) -> Result<Self, FrameError> {
        match v {
            0x00 => Ok(NodesExistStatus::UnknownType),
            0x01 => Ok(NodesExistStatus::Done),
            _ => Err(FrameError::InvalidStatus(v)),
        }
    }
}
