//! Error types for remote endpoints.

use std::fmt;

use crate::endpoint::EndpointMessage;
use crate::serialization::SerializationError;
use crate::transport::TransportError;
use crate::types::OutboundDelivery;

/// Errors establishing a connection. Nothing of a failed connection is kept.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectError {
    /// The channel could not be dialed.
    #[error("failed to dial {address}: {source}")]
    Dial {
        /// Remote address.
        address: String,
        /// Transport cause.
        #[source]
        source: TransportError,
    },

    /// The stream failed while opening it or exchanging the handshake.
    #[error("handshake with {address} failed: {source}")]
    Handshake {
        /// Remote address.
        address: String,
        /// Transport cause.
        #[source]
        source: TransportError,
    },

    /// The peer answered the handshake with something other than a
    /// connect response.
    #[error("invalid connect response from {address}: got {received}")]
    HandshakeProtocol {
        /// Remote address.
        address: String,
        /// Variant the peer sent instead.
        received: &'static str,
    },

    /// No handshake response arrived in time.
    #[error("handshake with {address} timed out")]
    HandshakeTimeout {
        /// Remote address.
        address: String,
    },
}

/// Errors raised by the endpoint writer.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// Connecting to the remote node failed.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// The inbound side of the stream failed.
    ///
    /// Only logged by the liveness monitor, which turns it into a
    /// `Terminated` event; it never reaches the supervisor.
    #[error("stream read from {address} failed: {source}")]
    StreamRead {
        /// Remote address.
        address: String,
        /// Transport cause.
        #[source]
        source: TransportError,
    },

    /// A payload in the batch could not be serialized.
    #[error("batch for {address} could not be serialized: {source}")]
    Serialization {
        /// Remote address.
        address: String,
        /// Serializer cause.
        #[source]
        source: SerializationError,
    },

    /// The transport rejected a batch.
    #[error("failed to send batch to {address}: {source}")]
    Send {
        /// Remote address.
        address: String,
        /// Transport cause.
        #[source]
        source: TransportError,
    },

    /// A batch arrived before the handshake completed.
    #[error("endpoint for {address} is not connected")]
    NotConnected {
        /// Remote address.
        address: String,
    },
}

/// Fatal failure of an endpoint, handed to its supervisor.
///
/// The supervisor must discard the failed writer, build a fresh one and
/// redeliver `stashed` before any newer traffic.
pub struct EndpointFailure {
    /// What went wrong.
    pub cause: EndpointError,
    /// Messages to redeliver after the restart.
    pub stashed: Vec<EndpointMessage>,
}

impl EndpointFailure {
    /// Failure with nothing to redeliver.
    pub fn new(cause: impl Into<EndpointError>) -> Self {
        Self {
            cause: cause.into(),
            stashed: Vec::new(),
        }
    }

    /// Failure that asks for `message` to be redelivered after restart.
    pub fn with_stash(cause: impl Into<EndpointError>, message: EndpointMessage) -> Self {
        Self {
            cause: cause.into(),
            stashed: vec![message],
        }
    }
}

impl fmt::Debug for EndpointFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointFailure")
            .field("cause", &self.cause)
            .field("stashed", &self.stashed.len())
            .finish()
    }
}

impl fmt::Display for EndpointFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "endpoint failed: {}", self.cause)
    }
}

impl std::error::Error for EndpointFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// The endpoint a delivery was queued for has stopped.
#[derive(Debug, thiserror::Error)]
#[error("endpoint for {address} has stopped")]
pub struct EndpointClosed {
    /// Remote address of the stopped endpoint.
    pub address: String,
    /// The delivery that could not be queued.
    pub delivery: Option<OutboundDelivery>,
}
