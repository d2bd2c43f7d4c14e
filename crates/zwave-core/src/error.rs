/// Errors raised while decoding or encoding protocol frames.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("unknown command class: {0:#04x}")]
    UnknownCommandClass(u8),

    #[error("unknown command: {0:#04x}")]
    UnknownCommand(u8),

    #[error("invalid node id: {0}")]
    InvalidNodeId(u16),

    #[error("invalid node mask length: {0}")]
    InvalidMaskLength(usize),

    #[error("too many repeaters: {0}")]
    TooManyRepeaters(usize),

    #[error("invalid status byte: {0:#04x}")]
    InvalidStatus(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_too_short() {
        let e = FrameError::TooShort {
            expected: 7,
            actual: 3,
        };
        assert_eq!(
            e.to_string(),
            "frame too short: expected at least 7 bytes, got 3"
        );
    }

    #[test]
    fn display_unknown_command() {
        assert_eq!(
            FrameError::UnknownCommand(0x42).to_string(),
            "unknown command: 0x42"
        );
    }

    #[test]
    fn display_invalid_node_id() {
        assert_eq!(
            FrameError::InvalidNodeId(4001).to_string(),
            "invalid node id: 4001"
        );
    }
}
