/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The channel was closed (locally, or the fabric dropped this peer).
    #[error("channel {0} is closed")]
    ChannelClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Connecting to the fabric failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The fabric sent something this peer could not understand.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}
