//! Node information: capability flags, speed tiers, wake-up classes and
//! the device-type triple.
//!
//! A node announces itself with a node-information frame whose layout
//! depends on its role and age. Controllers send the full
//! basic/generic/specific triple; end devices omit the basic type; legacy
//! devices without the specific-device flag send only a generic type.
//! [`NodeInfo::decode_announcement`] normalizes all three into the
//! canonical layout that the rest of the control plane stores.

use crate::constants::*;
use crate::error::FrameError;

/// Radio data rate tier. Ordered from slowest to fastest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Speed {
    Kbps9_6,
    Kbps40,
    Kbps100,
}

impl Speed {
    /// Every classic tier, slowest first.
    pub const ASCENDING: [Speed; 3] = [Speed::Kbps9_6, Speed::Kbps40, Speed::Kbps100];

    pub const fn find_nodes_marker(self) -> u8 {
        match self {
            Speed::Kbps9_6 => FIND_NODES_SPEED_9600,
            Speed::Kbps40 => FIND_NODES_SPEED_40K,
            Speed::Kbps100 => FIND_NODES_SPEED_100K,
        }
    }

    pub fn from_find_nodes_marker(v: u8) -> Result<Self, FrameError> {
        match v & FIND_NODES_SPEED_MASK {
            FIND_NODES_SPEED_9600 => Ok(Speed::Kbps9_6),
            FIND_NODES_SPEED_40K => Ok(Speed::Kbps40),
            FIND_NODES_SPEED_100K => Ok(Speed::Kbps100),
            other => Err(FrameError::InvalidStatus(other)),
        }
    }

    pub const fn route_bits(self) -> u8 {
        match self {
            Speed::Kbps9_6 => ROUTE_SPEED_9600,
            Speed::Kbps40 => ROUTE_SPEED_40K,
            Speed::Kbps100 => ROUTE_SPEED_100K,
        }
    }

    pub fn from_route_bits(v: u8) -> Result<Self, FrameError> {
        match v & ROUTE_SPEED_MASK {
            ROUTE_SPEED_9600 => Ok(Speed::Kbps9_6),
            ROUTE_SPEED_40K => Ok(Speed::Kbps40),
            ROUTE_SPEED_100K => Ok(Speed::Kbps100),
            other => Err(FrameError::InvalidStatus(other)),
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Speed::Kbps9_6 => 0x01,
            Speed::Kbps40 => 0x02,
            Speed::Kbps100 => 0x04,
        }
    }
}

/// Set of speed tiers a node supports.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SpeedSet(u8);

impl SpeedSet {
    pub const EMPTY: SpeedSet = SpeedSet(0);
    pub const ALL: SpeedSet = SpeedSet(0x07);

    pub fn insert(&mut self, speed: Speed) {
        self.0 |= speed.bit();
    }

    pub fn remove(&mut self, speed: Speed) {
        self.0 &= !speed.bit();
    }

    pub fn contains(self, speed: Speed) -> bool {
        self.0 & speed.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn intersection(self, other: SpeedSet) -> SpeedSet {
        SpeedSet(self.0 & other.0)
    }

    /// Fastest tier present in both sets.
    pub fn highest_common(self, other: SpeedSet) -> Option<Speed> {
        self.intersection(other).iter().last()
    }

    /// Members, slowest first.
    pub fn iter(self) -> impl Iterator<Item = Speed> {
        Speed::ASCENDING
            .into_iter()
            .filter(move |s| self.contains(*s))
    }
}

impl FromIterator<Speed> for SpeedSet {
    fn from_iter<I: IntoIterator<Item = Speed>>(iter: I) -> Self {
        let mut set = SpeedSet::EMPTY;
        for speed in iter {
            set.insert(speed);
        }
        set
    }
}

impl core::fmt::Debug for SpeedSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Wake-up beam class of a frequently listening (FLiRS) node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorWakeup {
    Ms250,
    Ms1000,
}

impl SensorWakeup {
    /// Zensor marker byte carried by discovery frames; `0` means no beam.
    pub const fn zensor_marker(wakeup: Option<SensorWakeup>) -> u8 {
        match wakeup {
            None => ZENSOR_WAKEUP_NONE,
            Some(SensorWakeup::Ms1000) => ZENSOR_WAKEUP_1000MS,
            Some(SensorWakeup::Ms250) => ZENSOR_WAKEUP_250MS,
        }
    }

    pub fn from_zensor_marker(v: u8) -> Result<Option<SensorWakeup>, FrameError> {
        match v {
            ZENSOR_WAKEUP_NONE => Ok(None),
            ZENSOR_WAKEUP_1000MS => Ok(Some(SensorWakeup::Ms1000)),
            ZENSOR_WAKEUP_250MS => Ok(Some(SensorWakeup::Ms250)),
            other => Err(FrameError::InvalidStatus(other)),
        }
    }

    pub const fn route_destination_bits(self) -> u8 {
        match self {
            SensorWakeup::Ms1000 => ROUTE_DEST_WAKEUP_1000MS,
            SensorWakeup::Ms250 => ROUTE_DEST_WAKEUP_250MS,
        }
    }

    pub const fn route_source_bits(self) -> u8 {
        match self {
            SensorWakeup::Ms1000 => ROUTE_SRC_WAKEUP_1000MS,
            SensorWakeup::Ms250 => ROUTE_SRC_WAKEUP_250MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceType {
    pub basic: u8,
    pub generic: u8,
    pub specific: u8,
}

/// Canonical node information as stored in the node directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NodeInfo {
    pub capability: u8,
    pub security: u8,
    pub reserved: u8,
    pub device: DeviceType,
    pub command_classes: Vec<u8>,
}

impl NodeInfo {
    /// Placeholder carried by log entries for a node that left the network.
    pub fn removed() -> Self {
        Self::default()
    }

    /// A capability byte of zero in a registration means the node is gone.
    pub fn is_removed_marker(&self) -> bool {
        self.capability == 0
    }

    pub fn is_listening(&self) -> bool {
        self.capability & CAPABILITY_LISTENING != 0
    }

    pub fn is_routing(&self) -> bool {
        self.capability & CAPABILITY_ROUTING != 0
    }

    pub fn protocol_version(&self) -> u8 {
        self.capability & CAPABILITY_VERSION_MASK
    }

    pub fn is_controller(&self) -> bool {
        self.security & SECURITY_CONTROLLER != 0
    }

    pub fn is_routing_slave(&self) -> bool {
        !self.is_controller() && self.security & SECURITY_ROUTING_SLAVE != 0
    }

    pub fn is_secure(&self) -> bool {
        self.security & SECURITY_SECURE != 0
    }

    pub fn is_beam_capable(&self) -> bool {
        self.security & SECURITY_BEAM_CAPABLE != 0
    }

    pub fn has_optional_functionality(&self) -> bool {
        self.security & SECURITY_OPTIONAL_FUNCTIONALITY != 0
    }

    pub fn sensor_wakeup(&self) -> Option<SensorWakeup> {
        match self.security & SECURITY_SENSOR_MASK {
            SECURITY_SENSOR_1000MS => Some(SensorWakeup::Ms1000),
            SECURITY_SENSOR_250MS => Some(SensorWakeup::Ms250),
            _ => None,
        }
    }

    /// A node that can forward frames for others: listening and routing.
    pub fn is_repeater(&self) -> bool {
        self.is_listening() && self.is_routing()
    }

    pub fn speeds(&self) -> SpeedSet {
        let mut set = SpeedSet::EMPTY;
        let baud = self.capability & CAPABILITY_SPEED_MASK;
        if baud & CAPABILITY_SPEED_9600 != 0 {
            set.insert(Speed::Kbps9_6);
        }
        if baud & CAPABILITY_SPEED_40K != 0 {
            set.insert(Speed::Kbps40);
            set.insert(Speed::Kbps9_6);
        }
        if self.reserved & RESERVED_SPEED_100K != 0 {
            set.insert(Speed::Kbps100);
        }
        if set.is_empty() {
            set.insert(Speed::Kbps9_6);
        }
        set
    }

    pub fn supports_long_range(&self) -> bool {
        self.reserved & RESERVED_SPEED_100K_LR != 0
    }

    /// Infer the basic device type for announcements that omit it.
    pub fn inferred_basic(capability: u8, security: u8) -> u8 {
        if security & SECURITY_CONTROLLER != 0 {
            if capability & CAPABILITY_LISTENING != 0 {
                BASIC_TYPE_STATIC_CONTROLLER
            } else {
                BASIC_TYPE_CONTROLLER
            }
        } else if security & SECURITY_ROUTING_SLAVE != 0 {
            BASIC_TYPE_ROUTING_SLAVE
        } else {
            BASIC_TYPE_SLAVE
        }
    }

    /// Decode the body of a classic node-information announcement (the
    /// bytes after command class and command) into canonical form.
    pub fn decode_announcement(body: &[u8]) -> Result<Self, FrameError> {
        const HEADER: usize = 3;
        if body.len() < HEADER + 1 {
            return Err(FrameError::TooShort {
                expected: HEADER + 1,
                actual: body.len(),
            });
        }
        let (capability, mut security, reserved) = (body[0], body[1], body[2]);
        let rest = &body[HEADER..];

        let (device, ccs) = if security & SECURITY_SPECIFIC_DEVICE == 0 {
            // Legacy layout: a single generic type.
            security |= SECURITY_SPECIFIC_DEVICE;
            let device = DeviceType {
                basic: Self::inferred_basic(capability, security),
                generic: rest[0],
                specific: 0,
            };
            (device, &rest[1..])
        } else if security & SECURITY_CONTROLLER != 0 {
            if rest.len() < 3 {
                return Err(FrameError::TooShort {
                    expected: HEADER + 3,
                    actual: body.len(),
                });
            }
            let device = DeviceType {
                basic: rest[0],
                generic: rest[1],
                specific: rest[2],
            };
            (device, &rest[3..])
        } else {
            if rest.len() < 2 {
                return Err(FrameError::TooShort {
                    expected: HEADER + 2,
                    actual: body.len(),
                });
            }
            let device = DeviceType {
                basic: Self::inferred_basic(capability, security),
                generic: rest[0],
                specific: rest[1],
            };
            (device, &rest[2..])
        };

        let take = ccs.len().min(NODEPARM_MAX);
        Ok(Self {
            capability,
            security,
            reserved,
            device,
            command_classes: ccs[..take].to_vec(),
        })
    }

    /// Decode a long-range announcement body: generic and specific types
    /// followed by an explicit command-class list length.
    pub fn decode_long_range_announcement(body: &[u8]) -> Result<Self, FrameError> {
        const FIXED: usize = 6;
        if body.len() < FIXED {
            return Err(FrameError::TooShort {
                expected: FIXED,
                actual: body.len(),
            });
        }
        let (capability, security, reserved) = (body[0], body[1], body[2]);
        let cc_len = usize::from(body[5]);
        let ccs = &body[FIXED..];
        if ccs.len() < cc_len {
            return Err(FrameError::InvalidLength {
                expected: FIXED + cc_len,
                actual: body.len(),
            });
        }
        let take = cc_len.min(NODEPARM_MAX);
        Ok(Self {
            capability,
            security: security | SECURITY_SPECIFIC_DEVICE,
            reserved,
            device: DeviceType {
                basic: Self::inferred_basic(capability, security),
                generic: body[3],
                specific: body[4],
            },
            command_classes: ccs[..take].to_vec(),
        })
    }

    /// Encode as this node would announce itself on the classic channel.
    pub fn encode_announcement(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&[self.capability, self.security, self.reserved]);
        if self.is_controller() {
            out.push(self.device.basic);
        }
        out.push(self.device.generic);
        out.push(self.device.specific);
        out.extend_from_slice(&self.command_classes);
    }

    pub fn encode_long_range_announcement(&self, out: &mut Vec<u8>) {
        let ccs = &self.command_classes[..self.command_classes.len().min(NODEPARM_MAX)];
        out.extend_from_slice(&[
            self.capability,
            self.security,
            self.reserved,
            self.device.generic,
            self.device.specific,
            ccs.len() as u8,
        ]);
        out.extend_from_slice(ccs);
    }

    /// Canonical layout used by authority log frames: the full device
    /// triple is always present.
    pub fn encode_canonical(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&[
            self.capability,
            self.security,
            self.reserved,
            self.device.basic,
            self.device.generic,
            self.device.specific,
        ]);
        let take = self.command_classes.len().min(UPDATE_NODEPARM_MAX);
        out.extend_from_slice(&self.command_classes[..take]);
    }

    pub fn decode_canonical(body: &[u8]) -> Result<Self, FrameError> {
        const FIXED: usize = 6;
        if body.len() < FIXED {
            return Err(FrameError::TooShort {
                expected: FIXED,
                actual: body.len(),
            });
        }
        let take = (body.len() - FIXED).min(UPDATE_NODEPARM_MAX);
        Ok(Self {
            capability: body[0],
            security: body[1],
            reserved: body[2],
            device: DeviceType {
                basic: body[3],
                generic: body[4],
                specific: body[5],
            },
            command_classes: body[FIXED..FIXED + take].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // FLiRS routing end device announcing on the classic channel.
    const FLIRS_SLAVE_BODY: [u8; 5] = [0x53, 0xDC, 0x03, 0x45, 0x54];

    #[test]
    fn decode_slave_announcement_infers_basic() {
        let info = NodeInfo::decode_announcement(&FLIRS_SLAVE_BODY).unwrap();
        assert_eq!(info.device.basic, BASIC_TYPE_ROUTING_SLAVE);
        assert_eq!(info.device.generic, 0x45);
        assert_eq!(info.device.specific, 0x54);
        assert!(!info.is_controller());
        assert!(info.is_routing_slave());
        assert!(!info.is_listening());
        assert_eq!(info.sensor_wakeup(), Some(SensorWakeup::Ms1000));
        assert_eq!(info.protocol_version(), 3);
        assert!(info.speeds().contains(Speed::Kbps100));
        assert!(info.command_classes.is_empty());
    }

    #[test]
    fn decode_controller_announcement_keeps_triple() {
        let body = [0xD3, 0x06, 0x01, 0x02, 0x02, 0x01, 0x20, 0x86];
        let info = NodeInfo::decode_announcement(&body).unwrap();
        assert!(info.is_controller());
        assert!(info.is_listening());
        assert_eq!(
            info.device,
            DeviceType {
                basic: 0x02,
                generic: 0x02,
                specific: 0x01
            }
        );
        assert_eq!(info.command_classes, vec![0x20, 0x86]);
    }

    #[test]
    fn decode_legacy_announcement_sets_specific_flag() {
        // Listening non-routing slave without a specific device type.
        let body = [0x80, 0x00, 0x00, 0x10, 0x25];
        let info = NodeInfo::decode_announcement(&body).unwrap();
        assert_eq!(info.device.generic, 0x10);
        assert_eq!(info.device.specific, 0);
        assert_eq!(info.device.basic, BASIC_TYPE_SLAVE);
        assert_ne!(info.security & SECURITY_SPECIFIC_DEVICE, 0);
        assert_eq!(info.command_classes, vec![0x25]);
    }

    #[test]
    fn decode_announcement_too_short() {
        assert!(matches!(
            NodeInfo::decode_announcement(&[0x80, 0x00, 0x00]),
            Err(FrameError::TooShort { .. })
        ));
        // Controller flag promises three type bytes.
        assert!(NodeInfo::decode_announcement(&[0x80, 0x06, 0x00, 0x02, 0x02]).is_err());
    }

    #[test]
    fn command_class_list_truncated() {
        let mut body = vec![0x80, 0x04, 0x00, 0x10, 0x01];
        body.extend(std::iter::repeat_n(0x20, 50));
        let info = NodeInfo::decode_announcement(&body).unwrap();
        assert_eq!(info.command_classes.len(), NODEPARM_MAX);
    }

    #[test]
    fn long_range_command_class_count_is_clamped() {
        let body = [0x00, 0x40, 0x02, 0x45, 0x54, 0x00];
        let mut info = NodeInfo::decode_long_range_announcement(&body).unwrap();
        info.command_classes = vec![0x20; 300];
        let mut out = Vec::new();
        info.encode_long_range_announcement(&mut out);
        assert_eq!(usize::from(out[5]), NODEPARM_MAX);
        assert_eq!(out.len(), 6 + NODEPARM_MAX);
        let decoded = NodeInfo::decode_long_range_announcement(&out).unwrap();
        assert_eq!(decoded.command_classes.len(), NODEPARM_MAX);
    }

    #[test]
    fn decode_long_range_announcement() {
        let body = [0x00, 0x40, 0x02, 0x45, 0x54, 0x01, 0x5E];
        let info = NodeInfo::decode_long_range_announcement(&body).unwrap();
        assert!(info.supports_long_range());
        assert_eq!(info.device.generic, 0x45);
        assert_eq!(info.command_classes, vec![0x5E]);
        assert!(NodeInfo::decode_long_range_announcement(&[0, 0x40, 2, 1, 2, 3, 9]).is_err());
    }

    #[test]
    fn announcement_encoding_matches_decoding() {
        let info = NodeInfo::decode_announcement(&FLIRS_SLAVE_BODY).unwrap();
        let mut out = Vec::new();
        info.encode_announcement(&mut out);
        assert_eq!(out, FLIRS_SLAVE_BODY.to_vec());
    }

    #[test]
    fn canonical_carries_basic_type() {
        let info = NodeInfo::decode_announcement(&FLIRS_SLAVE_BODY).unwrap();
        let mut out = Vec::new();
        info.encode_canonical(&mut out);
        assert_eq!(out[3], BASIC_TYPE_ROUTING_SLAVE);
        assert_eq!(NodeInfo::decode_canonical(&out).unwrap(), info);
    }

    #[test]
    fn removed_marker() {
        assert!(NodeInfo::removed().is_removed_marker());
        let info = NodeInfo::decode_announcement(&FLIRS_SLAVE_BODY).unwrap();
        assert!(!info.is_removed_marker());
    }

    #[test]
    fn speeds_imply_slower_tiers() {
        let info = NodeInfo {
            capability: CAPABILITY_SPEED_40K,
            ..Default::default()
        };
        let speeds = info.speeds();
        assert!(speeds.contains(Speed::Kbps9_6));
        assert!(speeds.contains(Speed::Kbps40));
        assert!(!speeds.contains(Speed::Kbps100));
    }

    #[test]
    fn highest_common_speed() {
        let a: SpeedSet = [Speed::Kbps9_6, Speed::Kbps40, Speed::Kbps100]
            .into_iter()
            .collect();
        let b: SpeedSet = [Speed::Kbps9_6, Speed::Kbps40].into_iter().collect();
        assert_eq!(a.highest_common(b), Some(Speed::Kbps40));
        assert_eq!(a.highest_common(SpeedSet::EMPTY), None);
    }

    #[test]
    fn speed_markers() {
        for speed in Speed::ASCENDING {
            assert_eq!(
                Speed::from_find_nodes_marker(speed.find_nodes_marker()).unwrap(),
                speed
            );
            assert_eq!(Speed::from_route_bits(speed.route_bits()).unwrap(), speed);
        }
    }

    #[test]
    fn zensor_markers() {
        assert_eq!(SensorWakeup::zensor_marker(None), 0);
        assert_eq!(
            SensorWakeup::from_zensor_marker(ZENSOR_WAKEUP_250MS).unwrap(),
            Some(SensorWakeup::Ms250)
        );
        assert!(SensorWakeup::from_zensor_marker(7).is_err());
    }
}
