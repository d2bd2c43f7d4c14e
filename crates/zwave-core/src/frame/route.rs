//! Assign-return-route payload: one route slot pushed to a routing end device.

use crate::constants::{
    MAX_REPEATERS, RETURN_ROUTE_SLOTS, ROUTE_DEST_WAKEUP_MASK, ROUTE_SRC_WAKEUP_MASK,
    ROUTE_SPEED_MASK,
};
use crate::error::FrameError;
use crate::node_info::{SensorWakeup, Speed};
use crate::types::NodeId;

/// One return-route slot. A destination of [`NodeId::UNASSIGNED`] clears the slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReturnRouteFrame {
    pub destination: NodeId,
    /// Slot number, `0` is the highest priority.
    pub route_number: u8,
    pub repeaters: Vec<NodeId>,
    pub speed: Speed,
    pub destination_wakeup: Option<SensorWakeup>,
    pub source_wakeup: Option<SensorWakeup>,
}

impl ReturnRouteFrame {
    /// A frame that deletes slot `route_number`.
    pub fn clear(route_number: u8) -> Self {
        Self {
            destination: NodeId::UNASSIGNED,
            route_number,
            repeaters: Vec::new(),
            speed: Speed::Kbps9_6,
            destination_wakeup: None,
            source_wakeup: None,
        }
    }

    pub fn is_clear(&self) -> bool {
        self.destination.is_unassigned()
    }

    pub fn route_speed_byte(&self) -> u8 {
        let mut byte = self.speed.route_bits();
        if let Some(w) = self.destination_wakeup {
            byte |= w.route_destination_bits();
        }
        if let Some(w) = self.source_wakeup {
            byte |= w.route_source_bits();
        }
        byte
    }

    pub(crate) fn encode_body(&self, out: &mut Vec<u8>) -> Result<(), FrameError> {
        if self.repeaters.len() > MAX_REPEATERS {
            return Err(FrameError::TooManyRepeaters(self.repeaters.len()));
        }
        if usize::from(self.route_number) >= RETURN_ROUTE_SLOTS {
            return Err(FrameError::InvalidStatus(self.route_number));
        }
        out.push(self.destination.to_classic_byte()?);
        out.push((self.route_number << 4) | self.repeaters.len() as u8);
        for repeater in &self.repeaters {
            out.push(repeater.to_classic_byte()?);
        }
        out.push(self.route_speed_byte());
        Ok(())
    }

    pub(crate) fn decode_body(body: &[u8]) -> Result<Self, FrameError> {
        if body.len() < 3 {
            return Err(FrameError::TooShort {
                expected: 3,
                actual: body.len(),
            });
        }
        let destination = super::id_byte(body[0])?;
        let route_number = body[1] >> 4;
        let hops = usize::from(body[1] & 0x0F);
        if hops > MAX_REPEATERS {
            return Err(FrameError::TooManyRepeaters(hops));
        }
        if usize::from(route_number) >= RETURN_ROUTE_SLOTS {
            return Err(FrameError::InvalidStatus(route_number));
        }
        if body.len() < 3 + hops {
            return Err(FrameError::TooShort {
                expected: 3 + hops,
                actual: body.len(),
            });
        }
        let repeaters = body[2..2 + hops]
            .iter()
            .map(|&b| match super::id_byte(b)? {
                id if id.is_unassigned() => Err(FrameError::InvalidNodeId(0)),
                id => Ok(id),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let speed_byte = body[2 + hops];
        let speed = if destination.is_unassigned() && speed_byte & ROUTE_SPEED_MASK == 0 {
            Speed::Kbps9_6
        } else {
            Speed::from_route_bits(speed_byte)?
        };
        Ok(Self {
            destination,
            route_number,
            repeaters,
            speed,
            destination_wakeup: wakeup_from_bits(
                speed_byte & ROUTE_DEST_WAKEUP_MASK,
                SensorWakeup::Ms1000.route_destination_bits(),
                SensorWakeup::Ms250.route_destination_bits(),
            ),
            source_wakeup: wakeup_from_bits(
                speed_byte & ROUTE_SRC_WAKEUP_MASK,
                SensorWakeup::Ms1000.route_source_bits(),
                SensorWakeup::Ms250.route_source_bits(),
            ),
        })
    }
}

fn wakeup_from_bits(bits: u8, ms1000: u8, ms250: u8) -> Option<SensorWakeup> {
    if bits == ms1000 {
        Some(SensorWakeup::Ms1000)
    } else if bits == ms250 {
        Some(SensorWakeup::Ms250)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_two_hop_route() {
        let frame = ReturnRouteFrame {
            destination: NodeId::new(1),
            route_number: 2,
            repeaters: vec![NodeId::new(7), NodeId::new(9)],
            speed: Speed::Kbps40,
            destination_wakeup: Some(SensorWakeup::Ms250),
            source_wakeup: None,
        };
        let mut out = Vec::new();
        frame.encode_body(&mut out).unwrap();
        assert_eq!(hex::encode(&out), "0122070912");
        assert_eq!(ReturnRouteFrame::decode_body(&out).unwrap(), frame);
    }

    #[test]
    fn clear_slot_encoding() {
        let mut out = Vec::new();
        ReturnRouteFrame::clear(3).encode_body(&mut out).unwrap();
        assert_eq!(out, vec![0x00, 0x30, 0x08]);
        assert!(ReturnRouteFrame::decode_body(&out).unwrap().is_clear());
    }

    #[test]
    fn rejects_five_repeaters() {
        let frame = ReturnRouteFrame {
            repeaters: (2..7).map(NodeId::new).collect(),
            ..ReturnRouteFrame::clear(0)
        };
        assert_eq!(
            frame.encode_body(&mut Vec::new()),
            Err(FrameError::TooManyRepeaters(5))
        );
        assert!(ReturnRouteFrame::decode_body(&[0x01, 0x05, 1, 2, 3, 4, 5, 0x08]).is_err());
    }

    #[test]
    fn rejects_slot_out_of_range() {
        assert!(ReturnRouteFrame::clear(4).encode_body(&mut Vec::new()).is_err());
    }

    #[test]
    fn truncated_repeater_list() {
        assert!(matches!(
            ReturnRouteFrame::decode_body(&[0x01, 0x02, 0x05, 0x08]),
            Err(FrameError::TooShort { .. })
        ));
    }
}
