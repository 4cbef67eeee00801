//! Messages delivered to an endpoint writer.

use crate::events::LifecycleEvent;
use crate::types::OutboundDelivery;

/// One entry of a batch handed to the writer.
#[derive(Debug)]
pub enum BatchItem {
    /// Application message to put on the wire.
    Deliver(OutboundDelivery),

    /// Termination notice queued behind application traffic.
    Terminated(LifecycleEvent),
}

/// Input of [`EndpointWriter::receive`](super::EndpointWriter::receive).
#[derive(Debug)]
pub enum EndpointMessage {
    /// Connect now. `consecutive_failures` is 0 on first start and counts
    /// restarts since the last successful connect.
    Started {
        /// Restarts since the last successful connect.
        consecutive_failures: u32,
    },

    /// The endpoint is being stopped for good.
    Stopped,

    /// The writer is about to be replaced by a fresh one.
    Restarting,

    /// Lifecycle event from the event stream.
    Terminated(LifecycleEvent),

    /// Ordered application traffic.
    Batch(Vec<BatchItem>),

    /// Runtime control message with no meaning to the writer.
    System(String),

    /// Anything else; logged and dropped.
    Unknown(String),
}

impl EndpointMessage {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EndpointMessage::Started { .. } => "Started",
            EndpointMessage::Stopped => "Stopped",
            EndpointMessage::Restarting => "Restarting",
            EndpointMessage::Terminated(_) => "Terminated",
            EndpointMessage::Batch(_) => "Batch",
            EndpointMessage::System(_) => "System",
            EndpointMessage::Unknown(_) => "Unknown",
        }
    }

    /// Batch made only of deliveries.
    pub fn batch(deliveries: impl IntoIterator<Item = OutboundDelivery>) -> Self {
        EndpointMessage::Batch(deliveries.into_iter().map(BatchItem::Deliver).collect())
    }
}
