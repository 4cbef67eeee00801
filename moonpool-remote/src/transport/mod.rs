//! Transport seam between the endpoint and the network.
//!
//! The endpoint sees the network as three layers:
//!
//! ```text
//! RemoteTransport ──dial──► TransportChannel ──open_stream──► (StreamSender, StreamReceiver)
//! ```
//!
//! A channel is the dialed connection to one node; the stream is the
//! bidirectional message pipe negotiated over it. The halves are separate so
//! the writer can own the send side while the liveness monitor owns the
//! receive side without sharing anything.
//!
//! [`TcpTransport`] implements this over any [`NetworkProvider`](crate::NetworkProvider)
//! using the frame format in [`wire`](crate::wire).

use async_trait::async_trait;
use std::io;

use crate::config::{CallOptions, DialOptions};
use crate::protocol::RemoteMessage;
use crate::wire::WireError;

mod tcp;

pub use tcp::{FramedReceiver, FramedSender, TcpChannel, TcpTransport};

/// Errors surfaced by a transport.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Could not reach the remote node.
    #[error("dial {address} failed: {message}")]
    Dial {
        /// Address that was dialed.
        address: String,
        /// Underlying cause.
        message: String,
    },

    /// The peer finished its side of the stream cleanly.
    #[error("stream ended")]
    StreamEnded,

    /// The channel already handed out its stream.
    #[error("stream already opened on this channel")]
    StreamAlreadyOpen,

    /// The channel or stream was closed locally.
    #[error("transport closed")]
    Closed,

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// A malformed frame arrived.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// A frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

impl TransportError {
    /// True for a clean end of stream.
    pub fn is_stream_ended(&self) -> bool {
        matches!(self, TransportError::StreamEnded)
    }

    /// True when the message was refused while encoding, before any byte
    /// reached the stream. The stream is still usable and resending the
    /// same message fails the same way.
    pub fn is_unencodable(&self) -> bool {
        matches!(
            self,
            TransportError::Codec(_) | TransportError::Wire(WireError::PacketTooLarge { .. })
        )
    }
}

impl From<io::Error> for TransportError {
    fn from(error: io::Error) -> Self {
        TransportError::Io(error.to_string())
    }
}

/// Dials remote nodes.
#[async_trait(?Send)]
pub trait RemoteTransport: Clone + 'static {
    /// Channel type produced by a successful dial.
    type Channel: TransportChannel;

    /// Open a channel to `address`.
    async fn dial(
        &self,
        address: &str,
        options: &DialOptions,
    ) -> Result<Self::Channel, TransportError>;
}

/// A dialed connection to one remote node.
#[async_trait(?Send)]
pub trait TransportChannel: 'static {
    /// Send half of a stream.
    type Sender: StreamSender;
    /// Receive half of a stream.
    type Receiver: StreamReceiver;

    /// Open the bidirectional stream used for the handshake and batches.
    async fn open_stream(
        &mut self,
        options: &CallOptions,
    ) -> Result<(Self::Sender, Self::Receiver), TransportError>;

    /// Close the channel. Idempotent.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Send half of an endpoint stream.
#[async_trait(?Send)]
pub trait StreamSender: 'static {
    /// Send one message as a single frame.
    async fn send(&mut self, message: &RemoteMessage) -> Result<(), TransportError>;

    /// Half-close: tell the peer nothing more will be sent.
    async fn close_send(&mut self) -> Result<(), TransportError>;
}

/// Receive half of an endpoint stream.
#[async_trait(?Send)]
pub trait StreamReceiver: 'static {
    /// Wait for the next message.
    ///
    /// Returns [`TransportError::StreamEnded`] once the peer has closed its
    /// side cleanly.
    async fn recv(&mut self) -> Result<RemoteMessage, TransportError>;
}
