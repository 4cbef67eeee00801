//! Framed stream transport over a [`NetworkProvider`].

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};

use super::{RemoteTransport, StreamReceiver, StreamSender, TransportChannel, TransportError};
use crate::codec::{JsonCodec, MessageCodec};
use crate::config::{CallOptions, DialOptions};
use crate::protocol::RemoteMessage;
use crate::providers::{NetworkProvider, Providers, TimeProvider};
use crate::wire::{HEADER_SIZE, serialize_frame, try_deserialize_frame};

/// Size of a single socket read.
const READ_CHUNK_SIZE: usize = 4096;

type Stream<P> = <<P as Providers>::Network as NetworkProvider>::TcpStream;

/// Transport that dials through the provider bundle's network and frames
/// [`RemoteMessage`]s with the configured codec.
#[derive(Clone)]
pub struct TcpTransport<P: Providers, C: MessageCodec = JsonCodec> {
    providers: P,
    codec: C,
}

impl<P: Providers> TcpTransport<P, JsonCodec> {
    /// Create a transport using the JSON codec.
    pub fn new(providers: P) -> Self {
        Self::with_codec(providers, JsonCodec)
    }
}

impl<P: Providers, C: MessageCodec> TcpTransport<P, C> {
    /// Create a transport using `codec` for frames.
    pub fn with_codec(providers: P, codec: C) -> Self {
        Self { providers, codec }
    }
}

#[async_trait(?Send)]
impl<P: Providers, C: MessageCodec> RemoteTransport for TcpTransport<P, C> {
    type Channel = TcpChannel<P, C>;

    async fn dial(
        &self,
        address: &str,
        options: &DialOptions,
    ) -> Result<Self::Channel, TransportError> {
        let network = self.providers.network().clone();
        let connect = network.connect(address);

        let result = match options.connect_timeout {
            Some(limit) => match self.providers.time().timeout(limit, connect).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(TransportError::Dial {
                        address: address.to_string(),
                        message: format!("timed out after {:?}", limit),
                    });
                }
            },
            None => connect.await,
        };

        let stream = result.map_err(|e| TransportError::Dial {
            address: address.to_string(),
            message: e.to_string(),
        })?;

        tracing::debug!(address, "channel dialed");
        Ok(TcpChannel {
            address: address.to_string(),
            stream: Some(stream),
            codec: self.codec.clone(),
        })
    }
}

/// One dialed connection. Its single stream is handed out by
/// [`TransportChannel::open_stream`].
pub struct TcpChannel<P: Providers, C: MessageCodec = JsonCodec> {
    address: String,
    stream: Option<Stream<P>>,
    codec: C,
}

#[async_trait(?Send)]
impl<P: Providers, C: MessageCodec> TransportChannel for TcpChannel<P, C> {
    type Sender = FramedSender<Stream<P>, C>;
    type Receiver = FramedReceiver<Stream<P>, C>;

    async fn open_stream(
        &mut self,
        _options: &CallOptions,
    ) -> Result<(Self::Sender, Self::Receiver), TransportError> {
        let stream = self.stream.take().ok_or(TransportError::StreamAlreadyOpen)?;
        let (reader, writer) = tokio::io::split(stream);
        tracing::debug!(address = %self.address, "stream opened");
        Ok((
            FramedSender {
                writer,
                codec: self.codec.clone(),
                closed: false,
            },
            FramedReceiver {
                reader,
                buffer: Vec::new(),
                codec: self.codec.clone(),
            },
        ))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // Once split, the socket closes when both halves are dropped.
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }
}

/// Writes each message as one frame.
pub struct FramedSender<S, C: MessageCodec = JsonCodec> {
    writer: WriteHalf<S>,
    codec: C,
    closed: bool,
}

#[async_trait(?Send)]
impl<S, C> StreamSender for FramedSender<S, C>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + 'static,
    C: MessageCodec,
{
    async fn send(&mut self, message: &RemoteMessage) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let payload = self
            .codec
            .encode(message)
            .map_err(|e| TransportError::Codec(e.to_string()))?;
        let frame = serialize_frame(&payload)?;
        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;
        tracing::trace!(
            kind = message.variant_name(),
            bytes = frame.len(),
            "frame written"
        );
        Ok(())
    }

    async fn close_send(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Reassembles frames from the read side of the stream.
pub struct FramedReceiver<S, C: MessageCodec = JsonCodec> {
    reader: ReadHalf<S>,
    buffer: Vec<u8>,
    codec: C,
}

#[async_trait(?Send)]
impl<S, C> StreamReceiver for FramedReceiver<S, C>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + 'static,
    C: MessageCodec,
{
    async fn recv(&mut self) -> Result<RemoteMessage, TransportError> {
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        loop {
            if self.buffer.len() >= HEADER_SIZE {
                if let Some((payload, consumed)) = try_deserialize_frame(&self.buffer)? {
                    self.buffer.drain(..consumed);
                    return self
                        .codec
                        .decode(&payload)
                        .map_err(|e| TransportError::Codec(e.to_string()));
                }
            }

            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                if self.buffer.is_empty() {
                    return Err(TransportError::StreamEnded);
                }
                return Err(TransportError::Io(format!(
                    "stream closed with {} bytes of a partial frame buffered",
                    self.buffer.len()
                )));
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ConnectResponse, MessageBatch};
    use tokio::io::duplex;

    fn pair() -> (
        FramedSender<tokio::io::DuplexStream>,
        FramedReceiver<tokio::io::DuplexStream>,
    ) {
        let (client, server) = duplex(64);
        let (_, writer) = tokio::io::split(client);
        let (reader, _) = tokio::io::split(server);
        (
            FramedSender {
                writer,
                codec: JsonCodec,
                closed: false,
            },
            FramedReceiver {
                reader,
                buffer: Vec::new(),
                codec: JsonCodec,
            },
        )
    }

    #[tokio::test]
    async fn test_frames_survive_small_pipe_buffers() {
        let (mut tx, mut rx) = pair();
        let batch = MessageBatch {
            type_names: vec!["x".repeat(300)],
            ..MessageBatch::default()
        };

        let writer = async {
            tx.send(&RemoteMessage::MessageBatch(batch.clone()))
                .await
                .expect("send batch");
            tx.send(&RemoteMessage::DisconnectRequest)
                .await
                .expect("send disconnect");
            tx.close_send().await.expect("close");
        };
        let reader = async {
            let first = rx.recv().await.expect("first");
            let second = rx.recv().await.expect("second");
            let third = rx.recv().await;
            (first, second, third)
        };

        let ((), (first, second, third)) = tokio::join!(writer, reader);
        assert_eq!(first, RemoteMessage::MessageBatch(batch));
        assert_eq!(second, RemoteMessage::DisconnectRequest);
        assert!(matches!(third, Err(TransportError::StreamEnded)));
    }

    #[tokio::test]
    async fn test_send_after_close_is_rejected() {
        let (mut tx, _rx) = pair();
        tx.close_send().await.expect("close");
        let result = tx
            .send(&RemoteMessage::ConnectResponse(ConnectResponse::default()))
            .await;
        assert!(matches!(result, Err(TransportError::Closed)));
    }
}
