//! Protocol frames exchanged by the membership and topology control plane.
//!
//! Each frame is a freshly constructed [`ProtocolFrame`] value; encoding
//! produces the application payload handed to the MAC layer (command class,
//! command, fields). Decoding validates lengths and field ranges and never
//! panics on arbitrary input.

pub mod route;

pub use route::ReturnRouteFrame;

use crate::constants::{
    COMMAND_CLASS_PROTOCOL, COMMAND_CLASS_PROTOCOL_LR, FIND_NODES_MASK_LENGTH_BITS,
    LongRangeCommand, NodesExistStatus, NodesExistType, ProtocolCommand, TransferStatus,
};
use crate::error::FrameError;
use crate::mask::NodeMask;
use crate::node_info::{NodeInfo, SensorWakeup, Speed};
use crate::types::{HomeId, NodeId};

/// Request to probe a set of candidates and report who answered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FindNodesInRange {
    pub candidates: NodeMask,
    pub wakeup: Option<SensorWakeup>,
    pub speed: Speed,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProtocolFrame {
    Nop,
    NodeInfo(NodeInfo),
    RequestNodeInfo,
    AssignIds {
        node_id: NodeId,
        home_id: HomeId,
    },
    FindNodesInRange(FindNodesInRange),
    GetNodesInRange {
        wakeup: Option<SensorWakeup>,
    },
    RangeInfo {
        neighbors: NodeMask,
        wakeup: Option<SensorWakeup>,
    },
    CommandComplete {
        seq: u8,
    },
    TransferEnd {
        status: TransferStatus,
    },
    AssignReturnRoute(ReturnRouteFrame),
    AssignSucReturnRoute(ReturnRouteFrame),
    AssignReturnRoutePriority {
        destination: NodeId,
        route_number: u8,
    },
    AssignSucReturnRoutePriority {
        destination: NodeId,
        route_number: u8,
    },
    NewNodeRegistered {
        node_id: NodeId,
        info: NodeInfo,
    },
    NewRangeRegistered {
        node_id: NodeId,
        neighbors: NodeMask,
    },
    AutomaticControllerUpdateStart,
    SucNodeId {
        node_id: NodeId,
        capabilities: u8,
    },
    NodesExist {
        kind: NodesExistType,
        nodes: NodeMask,
    },
    NodesExistReply {
        kind: NodesExistType,
        status: NodesExistStatus,
    },
    SmartStartIncludeNodeInfo(NodeInfo),
    LongRange(LongRangeFrame),
}

/// Frames of the long-range command class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LongRangeFrame {
    Nop,
    NodeInfo(NodeInfo),
    RequestNodeInfo,
    AssignIds { node_id: NodeId, home_id: HomeId },
    ExcludeRequest,
    SmartStartIncludeNodeInfo(NodeInfo),
    ExcludeRequestConfirm { node_id: NodeId, home_id: HomeId },
    NonSecureInclusionComplete,
}

/// Bounds-checked cursor over a frame body.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    frame_len: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8], frame_len: usize) -> Self {
        Self {
            bytes,
            pos: 0,
            frame_len,
        }
    }

    fn short(&self, needed: usize) -> FrameError {
        FrameError::TooShort {
            expected: self.frame_len - self.bytes.len() + self.pos + needed,
            actual: self.frame_len,
        }
    }

    fn u8(&mut self) -> Result<u8, FrameError> {
        let b = *self.bytes.get(self.pos).ok_or_else(|| self.short(1))?;
        self.pos += 1;
        Ok(b)
    }

    fn u8_or(&mut self, default: u8) -> u8 {
        self.u8().unwrap_or(default)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FrameError> {
        let end = self.pos + n;
        let slice = self.bytes.get(self.pos..end).ok_or_else(|| self.short(n))?;
        self.pos = end;
        Ok(slice)
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.bytes[self.pos..];
        self.pos = self.bytes.len();
        slice
    }

    fn mask(&mut self, len_bits: u8) -> Result<NodeMask, FrameError> {
        let len = usize::from(self.u8()? & len_bits);
        NodeMask::from_wire(self.take(len)?)
    }
}

fn push_mask(out: &mut Vec<u8>, mask: &NodeMask) {
    let bytes = mask.to_trimmed_bytes();
    out.push(bytes.len() as u8);
    out.extend_from_slice(&bytes);
}

/// Single-byte ID field that may also carry `0` (unassigned / clear).
pub(crate) fn id_byte(b: u8) -> Result<NodeId, FrameError> {
    let id = NodeId::from(b);
    if id.is_classic() || id.is_unassigned() {
        Ok(id)
    } else {
        Err(FrameError::InvalidNodeId(u16::from(b)))
    }
}

fn classic_id(b: u8) -> Result<NodeId, FrameError> {
    let id = NodeId::from(b);
    if id.is_classic() {
        Ok(id)
    } else {
        Err(FrameError::InvalidNodeId(u16::from(b)))
    }
}

impl ProtocolFrame {
    /// Serialize to the payload bytes given to the transport.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let mut out = Vec::with_capacity(8);
        match self {
            ProtocolFrame::Nop => {
                out.push(ProtocolCommand::Nop as u8);
                return Ok(out);
            }
            ProtocolFrame::LongRange(lr) => {
                lr.encode_into(&mut out)?;
                return Ok(out);
            }
            _ => out.push(COMMAND_CLASS_PROTOCOL),
        }
        match self {
            ProtocolFrame::Nop | ProtocolFrame::LongRange(_) => {}
            ProtocolFrame::NodeInfo(info) => {
                out.push(ProtocolCommand::NodeInfo as u8);
                info.encode_announcement(&mut out);
            }
            ProtocolFrame::SmartStartIncludeNodeInfo(info) => {
                out.push(ProtocolCommand::SmartStartIncludeNodeInfo as u8);
                info.encode_announcement(&mut out);
            }
            ProtocolFrame::RequestNodeInfo => out.push(ProtocolCommand::RequestNodeInfo as u8),
            ProtocolFrame::AssignIds { node_id, home_id } => {
                out.push(ProtocolCommand::AssignIds as u8);
                out.push(node_id.to_classic_byte()?);
                out.extend_from_slice(home_id.as_ref());
            }
            ProtocolFrame::FindNodesInRange(find) => {
                out.push(ProtocolCommand::FindNodesInRange as u8);
                push_mask(&mut out, &find.candidates);
                out.push(SensorWakeup::zensor_marker(find.wakeup));
                out.push(find.speed.find_nodes_marker());
            }
            ProtocolFrame::GetNodesInRange { wakeup } => {
                out.push(ProtocolCommand::GetNodesInRange as u8);
                out.push(SensorWakeup::zensor_marker(*wakeup));
            }
            ProtocolFrame::RangeInfo { neighbors, wakeup } => {
                out.push(ProtocolCommand::RangeInfo as u8);
                push_mask(&mut out, neighbors);
                out.push(SensorWakeup::zensor_marker(*wakeup));
            }
            ProtocolFrame::CommandComplete { seq } => {
                out.extend_from_slice(&[ProtocolCommand::CommandComplete as u8, *seq]);
            }
            ProtocolFrame::TransferEnd { status } => {
                out.extend_from_slice(&[ProtocolCommand::TransferEnd as u8, *status as u8]);
            }
            ProtocolFrame::AssignReturnRoute(route) => {
                out.push(ProtocolCommand::AssignReturnRoute as u8);
                route.encode_body(&mut out)?;
            }
            ProtocolFrame::AssignSucReturnRoute(route) => {
                out.push(ProtocolCommand::AssignSucReturnRoute as u8);
                route.encode_body(&mut out)?;
            }
            ProtocolFrame::AssignReturnRoutePriority {
                destination,
                route_number,
            } => {
                out.push(ProtocolCommand::AssignReturnRoutePriority as u8);
                out.extend_from_slice(&[destination.to_classic_byte()?, *route_number]);
            }
            ProtocolFrame::AssignSucReturnRoutePriority {
                destination,
                route_number,
            } => {
                out.push(ProtocolCommand::AssignSucReturnRoutePriority as u8);
                out.extend_from_slice(&[destination.to_classic_byte()?, *route_number]);
            }
            ProtocolFrame::NewNodeRegistered { node_id, info } => {
                out.push(ProtocolCommand::NewNodeRegistered as u8);
                out.push(node_id.to_classic_byte()?);
                info.encode_canonical(&mut out);
            }
            ProtocolFrame::NewRangeRegistered { node_id, neighbors } => {
                out.push(ProtocolCommand::NewRangeRegistered as u8);
                out.push(node_id.to_classic_byte()?);
                push_mask(&mut out, neighbors);
            }
            ProtocolFrame::AutomaticControllerUpdateStart => {
                out.push(ProtocolCommand::AutomaticControllerUpdateStart as u8);
            }
            ProtocolFrame::SucNodeId {
                node_id,
                capabilities,
            } => {
                out.push(ProtocolCommand::SucNodeId as u8);
                out.extend_from_slice(&[node_id.to_classic_byte()?, *capabilities]);
            }
            ProtocolFrame::NodesExist { kind, nodes } => {
                out.extend_from_slice(&[ProtocolCommand::NodesExist as u8, *kind as u8]);
                push_mask(&mut out, nodes);
            }
            ProtocolFrame::NodesExistReply { kind, status } => {
                out.extend_from_slice(&[
                    ProtocolCommand::NodesExistReply as u8,
                    *kind as u8,
                    *status as u8,
                ]);
            }
        }
        Ok(out)
    }

    /// Parse a received payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let Some(&class) = bytes.first() else {
            return Err(FrameError::TooShort {
                expected: 1,
                actual: 0,
            });
        };
        match class {
            0x00 if bytes.len() == 1 => Ok(ProtocolFrame::Nop),
            COMMAND_CLASS_PROTOCOL => Self::decode_classic(bytes),
            COMMAND_CLASS_PROTOCOL_LR => Ok(ProtocolFrame::LongRange(LongRangeFrame::decode(bytes)?)),
            other => Err(FrameError::UnknownCommandClass(other)),
        }
    }

    fn decode_classic(bytes: &[u8]) -> Result<Self, FrameError> {
        let Some(&cmd) = bytes.get(1) else {
            return Err(FrameError::TooShort {
                expected: 2,
                actual: bytes.len(),
            });
        };
        let command = ProtocolCommand::from_u8(cmd)?;
        let body = &bytes[2..];
        let mut r = Reader::new(body, bytes.len());

        let frame = match command {
            ProtocolCommand::Nop => ProtocolFrame::Nop,
            ProtocolCommand::NodeInfo => ProtocolFrame::NodeInfo(NodeInfo::decode_announcement(body)?),
            ProtocolCommand::SmartStartIncludeNodeInfo => {
                ProtocolFrame::SmartStartIncludeNodeInfo(NodeInfo::decode_announcement(body)?)
            }
            ProtocolCommand::RequestNodeInfo => ProtocolFrame::RequestNodeInfo,
            ProtocolCommand::AssignIds => {
                let node_id = id_byte(r.u8()?)?;
                let home_id = HomeId::try_from(r.take(4)?)?;
                ProtocolFrame::AssignIds { node_id, home_id }
            }
            ProtocolCommand::FindNodesInRange => {
                let candidates = r.mask(FIND_NODES_MASK_LENGTH_BITS)?;
                let wakeup = SensorWakeup::from_zensor_marker(r.u8_or(0))?;
                let speed = match r.u8() {
                    Ok(marker) => Speed::from_find_nodes_marker(marker)?,
                    Err(_) => Speed::Kbps9_6,
                };
                ProtocolFrame::FindNodesInRange(FindNodesInRange {
                    candidates,
                    wakeup,
                    speed,
                })
            }
            ProtocolCommand::GetNodesInRange => ProtocolFrame::GetNodesInRange {
                wakeup: SensorWakeup::from_zensor_marker(r.u8_or(0))?,
            },
            ProtocolCommand::RangeInfo => {
                let neighbors = r.mask(FIND_NODES_MASK_LENGTH_BITS)?;
                let wakeup = SensorWakeup::from_zensor_marker(r.u8_or(0))?;
                ProtocolFrame::RangeInfo { neighbors, wakeup }
            }
            ProtocolCommand::CommandComplete => ProtocolFrame::CommandComplete { seq: r.u8_or(0) },
            ProtocolCommand::TransferEnd => ProtocolFrame::TransferEnd {
                status: TransferStatus::from_u8(r.u8()?)?,
            },
            ProtocolCommand::AssignReturnRoute => {
                ProtocolFrame::AssignReturnRoute(ReturnRouteFrame::decode_body(body)?)
            }
            ProtocolCommand::AssignSucReturnRoute => {
                ProtocolFrame::AssignSucReturnRoute(ReturnRouteFrame::decode_body(body)?)
            }
            ProtocolCommand::AssignReturnRoutePriority => {
                ProtocolFrame::AssignReturnRoutePriority {
                    destination: id_byte(r.u8()?)?,
                    route_number: r.u8()?,
                }
            }
            ProtocolCommand::AssignSucReturnRoutePriority => {
                ProtocolFrame::AssignSucReturnRoutePriority {
                    destination: id_byte(r.u8()?)?,
                    route_number: r.u8()?,
                }
            }
            ProtocolCommand::NewNodeRegistered => {
                let node_id = classic_id(r.u8()?)?;
                let info = NodeInfo::decode_canonical(r.rest())?;
                ProtocolFrame::NewNodeRegistered { node_id, info }
            }
            ProtocolCommand::NewRangeRegistered => {
                let node_id = classic_id(r.u8()?)?;
                let neighbors = r.mask(0xFF)?;
                ProtocolFrame::NewRangeRegistered { node_id, neighbors }
            }
            ProtocolCommand::AutomaticControllerUpdateStart => {
                ProtocolFrame::AutomaticControllerUpdateStart
            }
            ProtocolCommand::SucNodeId => ProtocolFrame::SucNodeId {
                node_id: id_byte(r.u8()?)?,
                capabilities: r.u8_or(0),
            },
            ProtocolCommand::NodesExist => {
                let kind = NodesExistType::from_u8(r.u8()?)?;
                let nodes = r.mask(0xFF)?;
                ProtocolFrame::NodesExist { kind, nodes }
            }
            ProtocolCommand::NodesExistReply => ProtocolFrame::NodesExistReply {
                kind: NodesExistType::from_u8(r.u8()?)?,
                status: NodesExistStatus::from_u8(r.u8()?)?,
            },
        };
        Ok(frame)
    }

    /// Short name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            ProtocolFrame::Nop => "nop",
            ProtocolFrame::NodeInfo(_) => "node-info",
            ProtocolFrame::RequestNodeInfo => "request-node-info",
            ProtocolFrame::AssignIds { .. } => "assign-ids",
            ProtocolFrame::FindNodesInRange(_) => "find-nodes-in-range",
            ProtocolFrame::GetNodesInRange { .. } => "get-nodes-in-range",
            ProtocolFrame::RangeInfo { .. } => "range-info",
            ProtocolFrame::CommandComplete { .. } => "command-complete",
            ProtocolFrame::TransferEnd { .. } => "transfer-end",
            ProtocolFrame::AssignReturnRoute(_) => "assign-return-route",
            ProtocolFrame::AssignSucReturnRoute(_) => "assign-suc-return-route",
            ProtocolFrame::AssignReturnRoutePriority { .. } => "assign-return-route-priority",
            ProtocolFrame::AssignSucReturnRoutePriority { .. } => {
                "assign-suc-return-route-priority"
            }
            ProtocolFrame::NewNodeRegistered { .. } => "new-node-registered",
            ProtocolFrame::NewRangeRegistered { .. } => "new-range-registered",
            ProtocolFrame::AutomaticControllerUpdateStart => "automatic-controller-update-start",
            ProtocolFrame::SucNodeId { .. } => "suc-node-id",
            ProtocolFrame::NodesExist { .. } => "nodes-exist",
            ProtocolFrame::NodesExistReply { .. } => "nodes-exist-reply",
            ProtocolFrame::SmartStartIncludeNodeInfo(_) => "smart-start-include-node-info",
            ProtocolFrame::LongRange(lr) => lr.name(),
        }
    }
}

impl LongRangeFrame {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), FrameError> {
        out.push(COMMAND_CLASS_PROTOCOL_LR);
        match self {
            LongRangeFrame::Nop => out.push(LongRangeCommand::Nop as u8),
            LongRangeFrame::RequestNodeInfo => out.push(LongRangeCommand::RequestNodeInfo as u8),
            LongRangeFrame::ExcludeRequest => out.push(LongRangeCommand::ExcludeRequest as u8),
            LongRangeFrame::NonSecureInclusionComplete => {
                out.push(LongRangeCommand::NonSecureInclusionComplete as u8)
            }
            LongRangeFrame::NodeInfo(info) => {
                out.push(LongRangeCommand::NodeInfo as u8);
                info.encode_long_range_announcement(out);
            }
            LongRangeFrame::SmartStartIncludeNodeInfo(info) => {
                out.push(LongRangeCommand::SmartStartIncludeNodeInfo as u8);
                info.encode_long_range_announcement(out);
            }
            LongRangeFrame::AssignIds { node_id, home_id } => {
                out.push(LongRangeCommand::AssignIds as u8);
                out.extend_from_slice(&node_id.get().to_be_bytes());
                out.extend_from_slice(home_id.as_ref());
            }
            LongRangeFrame::ExcludeRequestConfirm { node_id, home_id } => {
                out.push(LongRangeCommand::ExcludeRequestConfirm as u8);
                out.extend_from_slice(&node_id.get().to_be_bytes());
                out.extend_from_slice(home_id.as_ref());
            }
        }
        Ok(())
    }

    fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let Some(&cmd) = bytes.get(1) else {
            return Err(FrameError::TooShort {
                expected: 2,
                actual: bytes.len(),
            });
        };
        let body = &bytes[2..];
        let mut r = Reader::new(body, bytes.len());
        let frame = match LongRangeCommand::from_u8(cmd)? {
            LongRangeCommand::Nop => LongRangeFrame::Nop,
            LongRangeCommand::RequestNodeInfo => LongRangeFrame::RequestNodeInfo,
            LongRangeCommand::ExcludeRequest => LongRangeFrame::ExcludeRequest,
            LongRangeCommand::NonSecureInclusionComplete => {
                LongRangeFrame::NonSecureInclusionComplete
            }
            LongRangeCommand::NodeInfo => {
                LongRangeFrame::NodeInfo(NodeInfo::decode_long_range_announcement(body)?)
            }
            LongRangeCommand::SmartStartIncludeNodeInfo => LongRangeFrame::SmartStartIncludeNodeInfo(
                NodeInfo::decode_long_range_announcement(body)?,
            ),
            LongRangeCommand::AssignIds => {
                let raw = r.take(2)?;
                let node_id = NodeId::new(u16::from_be_bytes([raw[0], raw[1]]));
                let home_id = HomeId::try_from(r.take(4)?)?;
                LongRangeFrame::AssignIds { node_id, home_id }
            }
            LongRangeCommand::ExcludeRequestConfirm => {
                let raw = r.take(2)?;
                let node_id = NodeId::new(u16::from_be_bytes([raw[0], raw[1]]));
                let home_id = HomeId::try_from(r.take(4)?)?;
                LongRangeFrame::ExcludeRequestConfirm { node_id, home_id }
            }
        };
        Ok(frame)
    }

    pub fn name(&self) -> &'static str {
        match self {
            LongRangeFrame::Nop => "lr-nop",
            LongRangeFrame::NodeInfo(_) => "lr-node-info",
            LongRangeFrame::RequestNodeInfo => "lr-request-node-info",
            LongRangeFrame::AssignIds { .. } => "lr-assign-ids",
            LongRangeFrame::ExcludeRequest => "lr-exclude-request",
            LongRangeFrame::SmartStartIncludeNodeInfo(_) => "lr-smart-start-include-node-info",
            LongRangeFrame::ExcludeRequestConfirm { .. } => "lr-exclude-request-confirm",
            LongRangeFrame::NonSecureInclusionComplete => "lr-non-secure-inclusion-complete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(hex_str: &str) -> Vec<u8> {
        hex::decode(hex_str).unwrap()
    }

    #[test]
    fn assign_ids_classic_layout() {
        let f = ProtocolFrame::AssignIds {
            node_id: NodeId::new(2),
            home_id: HomeId::new([0xC0, 0xFF, 0xEE, 0x01]),
        };
        let bytes = f.encode().unwrap();
        assert_eq!(bytes, frame("010302c0ffee01"));
        assert_eq!(ProtocolFrame::decode(&bytes).unwrap(), f);
    }

    #[test]
    fn assign_ids_long_range_uses_two_byte_id() {
        let f = ProtocolFrame::LongRange(LongRangeFrame::AssignIds {
            node_id: NodeId::new(0x0101),
            home_id: HomeId::from_u32(0xDEADBEEF),
        });
        let bytes = f.encode().unwrap();
        assert_eq!(bytes, frame("04030101deadbeef"));
        assert_eq!(ProtocolFrame::decode(&bytes).unwrap(), f);
    }

    #[test]
    fn classic_assign_ids_rejects_long_range_id() {
        let f = ProtocolFrame::AssignIds {
            node_id: NodeId::new(300),
            home_id: HomeId::ZERO,
        };
        assert_eq!(f.encode(), Err(FrameError::InvalidNodeId(300)));
    }

    #[test]
    fn range_info_fixture() {
        // Neighbor mask with only node 1 set and no beam.
        let decoded = ProtocolFrame::decode(&frame("0106010100")).unwrap();
        let mut expected = NodeMask::new();
        expected.insert(NodeId::new(1));
        assert_eq!(
            decoded,
            ProtocolFrame::RangeInfo {
                neighbors: expected,
                wakeup: None
            }
        );
    }

    #[test]
    fn find_nodes_in_range_layout() {
        let candidates: NodeMask = [1u16, 3, 10].into_iter().map(NodeId::new).collect();
        let f = ProtocolFrame::FindNodesInRange(FindNodesInRange {
            candidates,
            wakeup: Some(SensorWakeup::Ms1000),
            speed: Speed::Kbps100,
        });
        let bytes = f.encode().unwrap();
        assert_eq!(bytes, frame("01040205020103"));
        assert_eq!(ProtocolFrame::decode(&bytes).unwrap(), f);
    }

    #[test]
    fn find_nodes_without_trailer_defaults() {
        let decoded = ProtocolFrame::decode(&frame("01040101")).unwrap();
        match decoded {
            ProtocolFrame::FindNodesInRange(find) => {
                assert_eq!(find.wakeup, None);
                assert_eq!(find.speed, Speed::Kbps9_6);
                assert_eq!(find.candidates.count(), 1);
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn nop_is_single_byte() {
        assert_eq!(ProtocolFrame::Nop.encode().unwrap(), vec![0x00]);
        assert_eq!(ProtocolFrame::decode(&[0x00]).unwrap(), ProtocolFrame::Nop);
    }

    #[test]
    fn new_node_registered_roundtrip() {
        let info = NodeInfo::decode_announcement(&[0x53, 0xDC, 0x03, 0x45, 0x54]).unwrap();
        let f = ProtocolFrame::NewNodeRegistered {
            node_id: NodeId::new(7),
            info,
        };
        let bytes = f.encode().unwrap();
        assert_eq!(bytes[..3], [0x01, 0x0D, 0x07]);
        assert_eq!(ProtocolFrame::decode(&bytes).unwrap(), f);
    }

    #[test]
    fn transfer_end_and_nodes_exist() {
        let end = ProtocolFrame::decode(&frame("010b04")).unwrap();
        assert_eq!(
            end,
            ProtocolFrame::TransferEnd {
                status: TransferStatus::Overflow
            }
        );
        let reply = ProtocolFrame::NodesExistReply {
            kind: NodesExistType::All,
            status: NodesExistStatus::Done,
        };
        assert_eq!(reply.encode().unwrap(), frame("01200001"));
    }

    #[test]
    fn truncated_frames_are_errors() {
        for raw in ["", "01", "0103", "010302c0ff", "01060501", "04030101", "010b"] {
            assert!(
                ProtocolFrame::decode(&frame(raw)).is_err(),
                "expected error for {raw}"
            );
        }
    }

    #[test]
    fn unknown_class_and_command() {
        assert_eq!(
            ProtocolFrame::decode(&[0x20, 0x01]),
            Err(FrameError::UnknownCommandClass(0x20))
        );
        assert_eq!(
            ProtocolFrame::decode(&[0x01, 0x7E]),
            Err(FrameError::UnknownCommand(0x7E))
        );
    }

    #[test]
    fn new_node_registered_rejects_id_zero() {
        assert_eq!(
            ProtocolFrame::decode(&frame("010d00530403450000")),
            Err(FrameError::InvalidNodeId(0))
        );
    }
}
