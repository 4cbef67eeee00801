//! Turns a list of outbound deliveries into one [`MessageBatch`].

use crate::batch::lookup::{ActorRefTable, TypeNameTable};
use crate::protocol::{MessageBatch, MessageEnvelope};
use crate::serialization::{SerializationError, SerializerRegistry};
use crate::types::OutboundDelivery;

/// Builds wire batches, serializing payloads through a registry.
///
/// Tables are created fresh for every call; nothing carries over between
/// batches.
pub struct EnvelopeAssembler<S: SerializerRegistry> {
    registry: S,
}

impl<S: SerializerRegistry> EnvelopeAssembler<S> {
    /// Create an assembler over `registry`.
    pub fn new(registry: S) -> Self {
        Self { registry }
    }

    /// Assemble `deliveries` into a batch, preserving their order.
    ///
    /// # Errors
    ///
    /// The first payload that fails to serialize aborts the whole batch.
    pub fn assemble<'a, I>(
        &self,
        deliveries: I,
        serializer_id: u32,
    ) -> Result<MessageBatch, SerializationError>
    where
        I: IntoIterator<Item = &'a OutboundDelivery>,
    {
        let mut type_names = TypeNameTable::new();
        let mut targets = ActorRefTable::new();
        let mut senders = ActorRefTable::new();
        let mut envelopes = Vec::new();

        for delivery in deliveries {
            let payload = self
                .registry
                .serialize(delivery.message.as_ref(), serializer_id)?;

            let message_header = delivery
                .header
                .as_ref()
                .filter(|header| !header.is_empty())
                .cloned();

            envelopes.push(MessageEnvelope {
                message_header,
                message_data: payload.bytes,
                sender: senders.intern(delivery.sender.as_ref()),
                target: targets.intern(Some(&delivery.target)),
                type_id: type_names.intern(&payload.type_name),
                serializer_id,
                target_request_id: delivery.target.request_id,
                sender_request_id: delivery.sender.as_ref().map_or(0, |s| s.request_id),
            });
        }

        Ok(MessageBatch {
            type_names: type_names.into_names(),
            targets: targets.into_refs(),
            senders: senders.into_refs(),
            envelopes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::serialization::CodecRegistry;
    use crate::types::{ActorRef, MessageHeader};
    use serde::Serialize;

    #[derive(Serialize)]
    struct Ping(u32);

    #[derive(Serialize)]
    struct Pong(u32);

    struct Opaque;

    fn assembler() -> EnvelopeAssembler<CodecRegistry<JsonCodec>> {
        EnvelopeAssembler::new(
            CodecRegistry::new(JsonCodec, 0)
                .register::<Ping>("test.Ping")
                .register::<Pong>("test.Pong"),
        )
    }

    fn target(id: &str) -> ActorRef {
        ActorRef::new("node-b:4000", id)
    }

    fn sender(id: &str) -> ActorRef {
        ActorRef::new("node-a:4000", id)
    }

    #[test]
    fn test_shared_identity_different_request_ids() {
        let deliveries = vec![
            OutboundDelivery::new(target("t1").with_request_id(5), Ping(1))
                .with_sender(sender("s1")),
            OutboundDelivery::new(target("t1").with_request_id(9), Ping(2))
                .with_sender(sender("s1")),
        ];

        let batch = assembler().assemble(&deliveries, 0).expect("assemble");

        assert_eq!(batch.targets, vec![target("t1")]);
        assert_eq!(batch.senders, vec![sender("s1")]);
        assert_eq!(batch.envelopes.len(), 2);
        assert_eq!(batch.envelopes[0].target_request_id, 5);
        assert_eq!(batch.envelopes[1].target_request_id, 9);
        for envelope in &batch.envelopes {
            assert_eq!(envelope.target, 1);
            assert_eq!(envelope.sender, 1);
        }
    }

    #[test]
    fn test_absent_sender_uses_sentinel() {
        let deliveries = vec![OutboundDelivery::new(target("t1"), Ping(1))];

        let batch = assembler().assemble(&deliveries, 0).expect("assemble");

        assert_eq!(batch.envelopes[0].sender, 0);
        assert_eq!(batch.envelopes[0].sender_request_id, 0);
        assert!(batch.senders.is_empty());
        assert!(batch.envelopes.iter().all(|e| e.target != 0));
    }

    #[test]
    fn test_every_index_resolves_to_its_delivery() {
        let deliveries = vec![
            OutboundDelivery::new(target("a"), Ping(1)).with_sender(sender("x")),
            OutboundDelivery::new(target("b"), Pong(2)),
            OutboundDelivery::new(target("a").with_request_id(3), Pong(3))
                .with_sender(sender("y").with_request_id(4)),
            OutboundDelivery::new(target("c"), Ping(4)).with_sender(sender("x")),
        ];

        let batch = assembler().assemble(&deliveries, 0).expect("assemble");

        assert_eq!(batch.targets.len(), 3);
        assert_eq!(batch.senders.len(), 2);
        assert_eq!(batch.type_names, vec!["test.Ping", "test.Pong"]);

        for (delivery, envelope) in deliveries.iter().zip(&batch.envelopes) {
            assert_eq!(batch.target_of(envelope).as_ref(), Some(&delivery.target));
            assert_eq!(batch.sender_of(envelope), delivery.sender.clone());
        }
    }

    #[test]
    fn test_envelope_order_matches_input() {
        let deliveries: Vec<_> = [3u32, 1, 4, 1, 5, 9, 2, 6]
            .into_iter()
            .map(|n| OutboundDelivery::new(target("t"), Ping(n)))
            .collect();

        let batch = assembler().assemble(&deliveries, 0).expect("assemble");

        let payloads: Vec<_> = batch
            .envelopes
            .iter()
            .map(|e| String::from_utf8(e.message_data.clone()).expect("utf8"))
            .collect();
        assert_eq!(payloads, vec!["3", "1", "4", "1", "5", "9", "2", "6"]);
    }

    #[test]
    fn test_empty_header_is_dropped() {
        let deliveries = vec![
            OutboundDelivery::new(target("t"), Ping(1)).with_header(MessageHeader::new()),
            OutboundDelivery::new(target("t"), Ping(2))
                .with_header(MessageHeader::new().with("trace", "abc")),
        ];

        let batch = assembler().assemble(&deliveries, 0).expect("assemble");

        assert!(batch.envelopes[0].message_header.is_none());
        let header = batch.envelopes[1]
            .message_header
            .as_ref()
            .expect("header kept");
        assert_eq!(header.get("trace"), Some("abc"));
    }

    #[test]
    fn test_serialization_failure_aborts_batch() {
        let deliveries = vec![
            OutboundDelivery::new(target("t"), Ping(1)),
            OutboundDelivery::new(target("t"), Opaque),
        ];

        let result = assembler().assemble(&deliveries, 0);
        assert!(matches!(
            result,
            Err(SerializationError::UnregisteredType { .. })
        ));
    }

    #[test]
    fn test_serializer_id_is_stamped_on_envelopes() {
        let assembler = EnvelopeAssembler::new(
            CodecRegistry::new(JsonCodec, 7).register::<Ping>("test.Ping"),
        );
        let deliveries = vec![OutboundDelivery::new(target("t"), Ping(1))];
        let batch = assembler.assemble(&deliveries, 7).expect("assemble");
        assert_eq!(batch.envelopes[0].serializer_id, 7);
    }
}
