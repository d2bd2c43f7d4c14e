//! The seam between the runtime and the radio hardware.

use zwave_control::{RxInfo, Transmission, TxStatus};

/// Async transport for single frames.
///
/// The runtime calls `transmit` for at most one frame at a time and feeds
/// the returned status back into the controller. Received frames are pushed
/// into the runtime through [`NodeHandle::deliver`](crate::NodeHandle::deliver).
pub trait Radio: Send + Sync + 'static {
    /// Put `payload` on air as described by `tx` and report the outcome.
    fn transmit(
        &self,
        tx: &Transmission,
        payload: &[u8],
    ) -> impl Future<Output = TxStatus> + Send;
}

/// A frame received by the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub rx: RxInfo,
    pub payload: Vec<u8>,
}
