//! Connection lifecycle: dial, handshake, and teardown.
//!
//! # Handshake
//!
//! ```text
//! writer                                  peer
//!   │ dial(address) ─────────────────────►  │
//!   │ open_stream                           │
//!   │ ConnectRequest{ServerConnection} ───► │
//!   │ ◄─────────────────── ConnectResponse  │
//!   │ MessageBatch ... ──────────────────►  │
//! ```
//!
//! A [`Connection`] only exists once the peer has answered with a
//! `ConnectResponse`; every earlier failure closes what was opened and
//! returns a [`ConnectError`].

mod monitor;

use tokio::sync::oneshot;

pub use monitor::run_liveness_monitor;

use crate::config::EndpointConfig;
use crate::error::ConnectError;
use crate::events::{EventStream, LifecycleEvent};
use crate::protocol::{ConnectRequest, ConnectionType, MessageBatch, RemoteMessage, ServerConnection};
use crate::providers::{Providers, TaskProvider, TimeProvider};
use crate::transport::{
    RemoteTransport, StreamReceiver, StreamSender, TransportChannel, TransportError,
};

type Sender<T> = <<T as RemoteTransport>::Channel as TransportChannel>::Sender;
type Receiver<T> = <<T as RemoteTransport>::Channel as TransportChannel>::Receiver;

/// A live, handshaken connection to one remote node.
///
/// Owns the channel and the send half of the stream. The receive half is
/// held until [`spawn_monitor`](Connection::spawn_monitor) moves it into the
/// liveness monitor task.
pub struct Connection<T: RemoteTransport> {
    address: String,
    channel: T::Channel,
    sender: Sender<T>,
    receiver: Option<Receiver<T>>,
    monitor_shutdown: Option<oneshot::Sender<()>>,
    send_closed: bool,
}

impl<T: RemoteTransport> Connection<T> {
    /// Dial `address`, open the stream and run the handshake.
    ///
    /// Publishes [`LifecycleEvent::Connected`] on success. On failure the
    /// channel is closed and nothing is published.
    pub async fn connect<P: Providers>(
        providers: &P,
        transport: &T,
        address: &str,
        config: &EndpointConfig,
        events: &EventStream,
    ) -> Result<Self, ConnectError> {
        let mut channel = transport
            .dial(address, &config.dial_options)
            .await
            .map_err(|source| ConnectError::Dial {
                address: address.to_string(),
                source,
            })?;

        match Self::handshake(providers, &mut channel, address, config).await {
            Ok((sender, receiver)) => {
                events.publish(LifecycleEvent::Connected {
                    address: address.to_string(),
                });
                Ok(Self {
                    address: address.to_string(),
                    channel,
                    sender,
                    receiver: Some(receiver),
                    monitor_shutdown: None,
                    send_closed: false,
                })
            }
            Err(e) => {
                if let Err(close_err) = channel.close().await {
                    tracing::debug!(
                        address,
                        error = %close_err,
                        "closing channel after failed handshake"
                    );
                }
                Err(e)
            }
        }
    }

    async fn handshake<P: Providers>(
        providers: &P,
        channel: &mut T::Channel,
        address: &str,
        config: &EndpointConfig,
    ) -> Result<(Sender<T>, Receiver<T>), ConnectError> {
        let handshake_err = |source: TransportError| ConnectError::Handshake {
            address: address.to_string(),
            source,
        };

        let (mut sender, mut receiver) = channel
            .open_stream(&config.call_options)
            .await
            .map_err(|e| {
                tracing::error!(address, error = %e, "failed to create receive stream");
                handshake_err(e)
            })?;

        let request = RemoteMessage::ConnectRequest(ConnectRequest {
            connection_type: ConnectionType::ServerConnection(ServerConnection {
                system_id: config.system_id.clone(),
                address: config.local_address.clone(),
            }),
        });
        sender.send(&request).await.map_err(|e| {
            tracing::error!(address, error = %e, "failed to send connect request");
            handshake_err(e)
        })?;

        let response = match config.call_options.handshake_timeout {
            Some(limit) => providers
                .time()
                .timeout(limit, receiver.recv())
                .await
                .map_err(|_| ConnectError::HandshakeTimeout {
                    address: address.to_string(),
                })?,
            None => receiver.recv().await,
        };
        let response = response.map_err(|e| {
            tracing::error!(address, error = %e, "failed to receive connect response");
            handshake_err(e)
        })?;

        match response {
            RemoteMessage::ConnectResponse(accepted) => {
                tracing::debug!(address, member_id = %accepted.member_id, "connect accepted");
                Ok((sender, receiver))
            }
            other => {
                tracing::error!(
                    address,
                    received = other.variant_name(),
                    "failed to receive connect response"
                );
                Err(ConnectError::HandshakeProtocol {
                    address: address.to_string(),
                    received: other.variant_name(),
                })
            }
        }
    }

    /// Remote address of this connection.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// True while the liveness monitor has not been started yet.
    pub fn has_unmonitored_receiver(&self) -> bool {
        self.receiver.is_some()
    }

    /// Move the receive half into a liveness monitor task.
    ///
    /// The monitor runs until the stream ends, fails, or this connection is
    /// closed. Calling this twice does nothing.
    pub fn spawn_monitor<P: Providers>(&mut self, providers: &P, events: &EventStream) {
        let Some(receiver) = self.receiver.take() else {
            return;
        };
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.monitor_shutdown = Some(shutdown_tx);
        providers.task().spawn_task(
            "endpoint_liveness_monitor",
            run_liveness_monitor(receiver, self.address.clone(), events.clone(), shutdown_rx),
        );
    }

    /// Send one batch as a single frame.
    pub async fn send_batch(&mut self, batch: MessageBatch) -> Result<(), TransportError> {
        if self.send_closed {
            return Err(TransportError::Closed);
        }
        self.sender.send(&RemoteMessage::MessageBatch(batch)).await
    }

    /// Close the send side, stop the monitor, then close the channel.
    ///
    /// Best effort: failures are logged and never returned.
    pub async fn close(&mut self) {
        if !self.send_closed {
            self.send_closed = true;
            if let Err(e) = self.sender.close_send().await {
                tracing::error!(address = %self.address, error = %e, "error when closing the stream");
            }
        }
        if let Some(shutdown) = self.monitor_shutdown.take() {
            let _ = shutdown.send(());
        }
        self.receiver = None;
        if let Err(e) = self.channel.close().await {
            tracing::error!(address = %self.address, error = %e, "error when closing the channel");
        }
    }
}
