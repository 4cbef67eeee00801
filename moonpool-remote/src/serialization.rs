//! Payload serialization registry.
//!
//! The endpoint does not know payload types. It hands each payload to a
//! [`SerializerRegistry`] and gets back bytes plus the logical type name the
//! remote side uses to pick a deserializer.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::rc::Rc;

use serde::Serialize;

use crate::codec::{CodecError, MessageCodec};

/// Serialized form of one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedPayload {
    /// Encoded payload bytes.
    pub bytes: Vec<u8>,
    /// Logical type name the receiver resolves the bytes against.
    pub type_name: String,
}

/// Errors raised while serializing a payload.
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    /// No serializer is registered under this id.
    #[error("unknown serializer id {serializer_id}")]
    UnknownSerializer {
        /// Requested serializer id.
        serializer_id: u32,
    },

    /// The payload's Rust type was never registered.
    #[error("payload type is not registered with serializer {serializer_id}")]
    UnregisteredType {
        /// Serializer that was asked.
        serializer_id: u32,
    },

    /// The codec failed to encode the payload.
    #[error("failed to encode {type_name}: {source}")]
    Codec {
        /// Logical type name of the payload.
        type_name: String,
        /// Underlying codec error.
        #[source]
        source: CodecError,
    },
}

/// Turns opaque payloads into bytes and a type name.
pub trait SerializerRegistry {
    /// Serialize `message` with the serializer identified by `serializer_id`.
    fn serialize(
        &self,
        message: &dyn Any,
        serializer_id: u32,
    ) -> Result<SerializedPayload, SerializationError>;
}

impl<R: SerializerRegistry + ?Sized> SerializerRegistry for Rc<R> {
    fn serialize(
        &self,
        message: &dyn Any,
        serializer_id: u32,
    ) -> Result<SerializedPayload, SerializationError> {
        (**self).serialize(message, serializer_id)
    }
}

type EncodeFn<C> = Box<dyn Fn(&C, &dyn Any) -> Option<Result<Vec<u8>, CodecError>>>;

struct Registration<C> {
    type_name: String,
    encode: EncodeFn<C>,
}

/// [`SerializerRegistry`] backed by a single [`MessageCodec`].
///
/// Payload types are registered up front with the name the remote side knows
/// them by. Lookups are by `TypeId`, so any registered `Serialize` type can be
/// sent as a `Box<dyn Any>`.
pub struct CodecRegistry<C: MessageCodec> {
    codec: C,
    serializer_id: u32,
    types: HashMap<TypeId, Registration<C>>,
}

impl<C: MessageCodec> CodecRegistry<C> {
    /// Create a registry answering to `serializer_id`.
    pub fn new(codec: C, serializer_id: u32) -> Self {
        Self {
            codec,
            serializer_id,
            types: HashMap::new(),
        }
    }

    /// Register `T` under `type_name`. Re-registering replaces the name.
    pub fn register<T>(mut self, type_name: impl Into<String>) -> Self
    where
        T: Serialize + 'static,
    {
        let encode: EncodeFn<C> = Box::new(|codec, message| {
            message
                .downcast_ref::<T>()
                .map(|typed| codec.encode(typed))
        });
        self.types.insert(
            TypeId::of::<T>(),
            Registration {
                type_name: type_name.into(),
                encode,
            },
        );
        self
    }

    /// Serializer id this registry answers to.
    pub fn serializer_id(&self) -> u32 {
        self.serializer_id
    }
}

impl<C: MessageCodec> SerializerRegistry for CodecRegistry<C> {
    fn serialize(
        &self,
        message: &dyn Any,
        serializer_id: u32,
    ) -> Result<SerializedPayload, SerializationError> {
        if serializer_id != self.serializer_id {
            return Err(SerializationError::UnknownSerializer { serializer_id });
        }

        let registration = self
            .types
            .get(&message.type_id())
            .ok_or(SerializationError::UnregisteredType { serializer_id })?;

        match (registration.encode)(&self.codec, message) {
            Some(Ok(bytes)) => Ok(SerializedPayload {
                bytes,
                type_name: registration.type_name.clone(),
            }),
            Some(Err(source)) => Err(SerializationError::Codec {
                type_name: registration.type_name.clone(),
                source,
            }),
            // TypeId matched, so the downcast cannot miss
            None => Err(SerializationError::UnregisteredType { serializer_id }),
        }
    }
}
