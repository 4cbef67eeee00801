//! # Moonpool Remote
//!
//! Outbound endpoint writer for remote moonpool actors.
//!
//! This crate provides:
//! - **Connection**: dial, handshake and liveness monitoring of one remote node
//! - **Batching**: interning tables and envelope assembly for message batches
//! - **Endpoint**: the writer state machine, its supervisor and a per-address manager
//! - **Wire format**: length-prefixed frames with CRC32C checksums
//!
//! Everything runs on a single thread inside a tokio `LocalSet`.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// =============================================================================
// Modules
// =============================================================================

/// Interning tables and envelope assembly.
pub mod batch;

/// Message codecs.
pub mod codec;

/// Endpoint configuration and retry policy.
pub mod config;

/// Connection handshake and liveness monitor.
pub mod connection;

/// Endpoint writer, supervisor and manager.
pub mod endpoint;

/// Error types for connections and endpoints.
pub mod error;

/// Lifecycle events and the event stream.
pub mod events;

/// Wire protocol messages.
pub mod protocol;

/// Provider traits and the Tokio bundle.
pub mod providers;

/// Payload serialization registry.
pub mod serialization;

/// Transport abstraction and the framed stream transport.
pub mod transport;

/// Actor references and outbound deliveries.
pub mod types;

/// Length-prefixed wire framing with CRC32C.
pub mod wire;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use batch::{ActorRefTable, EnvelopeAssembler, TypeNameTable};
pub use codec::{CodecError, JsonCodec, MessageCodec};
pub use config::{CallOptions, DialOptions, EndpointConfig, RetryPolicy};
pub use connection::Connection;
pub use endpoint::{
    BatchItem, EndpointHandle, EndpointManager, EndpointMessage, EndpointState,
    EndpointSupervisor, EndpointWriter, Flow,
};
pub use error::{ConnectError, EndpointClosed, EndpointError, EndpointFailure};
pub use events::{EventStream, LifecycleEvent};
pub use protocol::{
    ConnectRequest, ConnectResponse, ConnectionType, MessageBatch, MessageEnvelope,
    RemoteMessage, ServerConnection,
};
pub use providers::{
    NetworkProvider, Providers, RandomProvider, TaskProvider, TimeError, TimeProvider,
    TokioNetworkProvider, TokioProviders, TokioRandomProvider, TokioTaskProvider,
    TokioTimeProvider,
};
pub use serialization::{CodecRegistry, SerializationError, SerializedPayload, SerializerRegistry};
pub use transport::{
    RemoteTransport, StreamReceiver, StreamSender, TcpChannel, TcpTransport, TransportChannel,
    TransportError,
};
pub use types::{ActorRef, MessageHeader, OutboundDelivery};
pub use wire::WireError;
