//! Error types for the controller runtime.

/// Errors that can occur while configuring or running a node.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Control(#[from] zwave_control::ControlError),
    #[error("node runtime is gone")]
    ChannelClosed,
    #[error("node already running")]
    AlreadyRunning,
}
