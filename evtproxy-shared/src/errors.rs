//! Error types shared across the proxy and bus participants.

use thiserror::Error;

use crate::registry::ProcessSerial;
use crate::wire::AttributeId;

/// Result alias used throughout the workspace.
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Closed error enumeration for the proxy.
///
/// The split between fatal and recoverable errors is encoded in
/// [`ProxyError::is_fatal`]: launch and setup failures abort the whole
/// process, everything else drops the offending message and keeps the loop
/// running. [`ProxyError::InvalidReplyTarget`] is a known benign condition
/// (a reply timer cannot be reset on a message whose sender expects no
/// reply) and callers match on it explicitly.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The target program could not be started.
    #[error("could not launch target: {0}")]
    Launch(String),

    /// The first message could not be coerced into startup parameters.
    #[error("could not coerce startup parameters: {0}")]
    StartupParams(String),

    /// The launched child never registered on the bus.
    #[error("no bus registration for launched pid {pid} after {attempts} attempts")]
    HandleUnresolved { pid: u32, attempts: u32 },

    /// Joining the bus (handler installation) failed.
    #[error("bus setup failed: {0}")]
    BusSetup(String),

    /// A required message attribute is absent.
    #[error("message is missing the {0:?} attribute")]
    MissingAttribute(AttributeId),

    /// A message attribute is present but has an unexpected shape.
    #[error("message attribute {0:?} has an unexpected shape")]
    MalformedAttribute(AttributeId),

    /// A send destination is not (or no longer) registered on the bus.
    #[error("no bus registration for process serial {0}")]
    UnknownDestination(ProcessSerial),

    /// The destination did not reply within the declared wait.
    #[error("timed out waiting for a reply")]
    ReplyTimeout,

    /// The reply slot has no reply target to arm a timer for.
    #[error("reply slot has no reply target")]
    InvalidReplyTarget,

    /// A message could not be encoded or decoded.
    #[error("could not encode or decode a message: {0}")]
    Codec(String),

    /// An underlying socket or filesystem operation failed.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ProxyError {
    /// Whether this error must abort the whole proxy process.
    ///
    /// The proxy has no purpose without a child, so anything that prevents
    /// the child from existing is fatal. Per-message failures are not.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProxyError::Launch(_)
                | ProxyError::StartupParams(_)
                | ProxyError::HandleUnresolved { .. }
                | ProxyError::BusSetup(_)
        )
    }
}
