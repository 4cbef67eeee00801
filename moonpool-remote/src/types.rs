//! Actor addressing and outbound delivery types.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Reference to an actor, possibly on a remote node.
///
/// `address` + `id` identify a logical actor. `request_id` correlates a
/// single request/response exchange and is not part of the identity: two
/// refs that differ only by request id name the same actor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorRef {
    /// Address of the node hosting the actor.
    pub address: String,
    /// Node-local identifier of the actor.
    pub id: String,
    /// Ephemeral request correlator, 0 when unused.
    #[serde(default)]
    pub request_id: u32,
}

impl ActorRef {
    /// Create a reference without a request correlator.
    pub fn new(address: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            id: id.into(),
            request_id: 0,
        }
    }

    /// Return a copy of this reference bound to `request_id`.
    pub fn with_request_id(mut self, request_id: u32) -> Self {
        self.request_id = request_id;
        self
    }

    /// Copy of this reference with the request correlator cleared.
    ///
    /// This is the form stored in per-batch interning tables.
    pub fn stripped(&self) -> Self {
        Self {
            address: self.address.clone(),
            id: self.id.clone(),
            request_id: 0,
        }
    }
}

impl fmt::Display for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.id)
    }
}

/// Ordered key-value metadata attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Header entries, ordered by key.
    pub header_data: BTreeMap<String, String>,
}

impl MessageHeader {
    /// Create an empty header.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.header_data.insert(key.into(), value.into());
        self
    }

    /// Look up an entry.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.header_data.get(key).map(String::as_str)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.header_data.len()
    }

    /// True when the header carries no entries.
    pub fn is_empty(&self) -> bool {
        self.header_data.is_empty()
    }
}

/// A message on its way to an actor on the remote node.
pub struct OutboundDelivery {
    /// Destination actor.
    pub target: ActorRef,
    /// Sending actor, if the message expects no reply this may be absent.
    pub sender: Option<ActorRef>,
    /// Application payload, serialized by the
    /// [`SerializerRegistry`](crate::SerializerRegistry).
    pub message: Box<dyn Any>,
    /// Optional metadata.
    pub header: Option<MessageHeader>,
}

impl OutboundDelivery {
    /// Create a delivery without sender or header.
    pub fn new<M: Any>(target: ActorRef, message: M) -> Self {
        Self {
            target,
            sender: None,
            message: Box::new(message),
            header: None,
        }
    }

    /// Set the sending actor.
    pub fn with_sender(mut self, sender: ActorRef) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Attach a header.
    pub fn with_header(mut self, header: MessageHeader) -> Self {
        self.header = Some(header);
        self
    }
}

impl fmt::Debug for OutboundDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundDelivery")
            .field("target", &self.target)
            .field("sender", &self.sender)
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}
