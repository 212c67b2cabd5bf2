/// Errors reported by a platform substrate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubstrateError {
    /// The substrate is not available in this environment.
    #[error("{0} is not supported here")]
    Unsupported(&'static str),

    /// The platform refused to open a window (popup blocked, no display).
    #[error("failed to open window {name}: {reason}")]
    OpenFailed { name: String, reason: String },

    /// The launching context has no receiver connection to adopt.
    #[error("no presentation receiver connection available")]
    NoReceiverConnection,

    /// A session could not be started.
    #[error("failed to start presentation session for {url}: {reason}")]
    StartFailed { url: String, reason: String },

    /// The peer endpoint is closed or terminated.
    #[error("{0} is closed")]
    Closed(&'static str),

    /// The user dismissed the device picker or nothing matched the filters.
    #[error("no device selected")]
    NoDeviceSelected,

    /// The GATT server is not connected.
    #[error("GATT server not connected")]
    GattDisconnected,

    /// A GATT service UUID did not resolve on the device.
    #[error("GATT service {0} not found")]
    ServiceNotFound(uuid::Uuid),

    /// A GATT characteristic UUID did not resolve on the service.
    #[error("GATT characteristic {0} not found")]
    CharacteristicNotFound(uuid::Uuid),

    /// A characteristic write was rejected.
    #[error("GATT write failed: {0}")]
    WriteFailed(String),
}

pub type Result<T> = std::result::Result<T, SubstrateError>;
