//! Messages exchanged on an endpoint stream.
//!
//! Every frame carries exactly one [`RemoteMessage`]. The writer sends a
//! `ConnectRequest` first, expects a `ConnectResponse`, then sends any number
//! of `MessageBatch`es. After the handshake the peer only sends unsolicited
//! control messages such as `DisconnectRequest`.

use serde::{Deserialize, Serialize};

use crate::types::{ActorRef, MessageHeader};

/// Top-level wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RemoteMessage {
    /// Handshake request, always the first message on a stream.
    ConnectRequest(ConnectRequest),
    /// Handshake acceptance from the peer.
    ConnectResponse(ConnectResponse),
    /// Application traffic.
    MessageBatch(MessageBatch),
    /// Peer announces it is closing the stream.
    DisconnectRequest,
}

impl RemoteMessage {
    /// Variant name, for logs and handshake errors.
    pub fn variant_name(&self) -> &'static str {
        match self {
            RemoteMessage::ConnectRequest(_) => "ConnectRequest",
            RemoteMessage::ConnectResponse(_) => "ConnectResponse",
            RemoteMessage::MessageBatch(_) => "MessageBatch",
            RemoteMessage::DisconnectRequest => "DisconnectRequest",
        }
    }
}

/// Handshake request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    /// Role of the connecting side.
    pub connection_type: ConnectionType,
}

/// Role announced in a [`ConnectRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionType {
    /// A full node that can itself be dialed back at `address`.
    ServerConnection(ServerConnection),
}

/// Identity of a connecting node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConnection {
    /// Unique id of the local actor system.
    pub system_id: String,
    /// Address the local node is reachable at.
    pub address: String,
}

/// Handshake acceptance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResponse {
    /// Identity of the accepting node, informational only.
    #[serde(default)]
    pub member_id: String,
}

/// One batch of envelopes plus the interning tables they index into.
///
/// Tables are scoped to the batch. `target` and `sender` indices are 1-based
/// with 0 meaning "absent"; `type_id` is 0-based.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageBatch {
    /// Distinct payload type names, in first-seen order.
    pub type_names: Vec<String>,
    /// Distinct targets with request ids cleared.
    pub targets: Vec<ActorRef>,
    /// Distinct senders with request ids cleared.
    pub senders: Vec<ActorRef>,
    /// Envelopes in send order.
    pub envelopes: Vec<MessageEnvelope>,
}

impl MessageBatch {
    /// Resolve an envelope's target, reattaching its request id.
    pub fn target_of(&self, envelope: &MessageEnvelope) -> Option<ActorRef> {
        resolve(&self.targets, envelope.target, envelope.target_request_id)
    }

    /// Resolve an envelope's sender, reattaching its request id.
    pub fn sender_of(&self, envelope: &MessageEnvelope) -> Option<ActorRef> {
        resolve(&self.senders, envelope.sender, envelope.sender_request_id)
    }

    /// Resolve an envelope's payload type name.
    pub fn type_name_of(&self, envelope: &MessageEnvelope) -> Option<&str> {
        self.type_names
            .get(envelope.type_id as usize)
            .map(String::as_str)
    }
}

fn resolve(table: &[ActorRef], index: u32, request_id: u32) -> Option<ActorRef> {
    if index == 0 {
        return None;
    }
    table
        .get(index as usize - 1)
        .map(|actor| actor.clone().with_request_id(request_id))
}

/// A single serialized message inside a [`MessageBatch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Metadata, absent when the delivery had none.
    pub message_header: Option<MessageHeader>,
    /// Serialized payload.
    pub message_data: Vec<u8>,
    /// 1-based index into `senders`, 0 when there is no sender.
    pub sender: u32,
    /// 1-based index into `targets`.
    pub target: u32,
    /// 0-based index into `type_names`.
    pub type_id: u32,
    /// Serializer that produced `message_data`.
    pub serializer_id: u32,
    /// Request id of the original target ref.
    pub target_request_id: u32,
    /// Request id of the original sender ref, 0 when there is no sender.
    pub sender_request_id: u32,
}
