//! The endpoint writer: one connection, one remote address.

use crate::batch::EnvelopeAssembler;
use crate::config::EndpointConfig;
use crate::connection::Connection;
use crate::endpoint::message::{BatchItem, EndpointMessage};
use crate::endpoint::state::EndpointState;
use crate::error::{EndpointError, EndpointFailure};
use crate::events::{EventStream, LifecycleEvent};
use crate::providers::{Providers, TimeProvider};
use crate::serialization::SerializerRegistry;
use crate::transport::RemoteTransport;

/// What the supervisor should do after a message was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep feeding messages.
    Continue,
    /// The writer asked to be stopped.
    Stop,
}

/// Outbound writer for a single remote node.
///
/// Handles one [`EndpointMessage`] at a time. It never retries on its own:
/// every fatal condition is returned as an [`EndpointFailure`] and the
/// supervisor replaces the writer.
pub struct EndpointWriter<P: Providers, T: RemoteTransport, S: SerializerRegistry> {
    providers: P,
    transport: T,
    address: String,
    config: EndpointConfig,
    events: EventStream,
    assembler: EnvelopeAssembler<S>,
    state: EndpointState,
    connection: Option<Connection<T>>,
}

impl<P, T, S> EndpointWriter<P, T, S>
where
    P: Providers,
    T: RemoteTransport,
    S: SerializerRegistry,
{
    /// Create an idle writer for `address`.
    pub fn new(
        providers: P,
        transport: T,
        address: impl Into<String>,
        config: EndpointConfig,
        events: EventStream,
        registry: S,
    ) -> Self {
        Self {
            providers,
            transport,
            address: address.into(),
            config,
            events,
            assembler: EnvelopeAssembler::new(registry),
            state: EndpointState::Idle,
            connection: None,
        }
    }

    /// Remote address this writer serves.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Current state.
    pub fn state(&self) -> EndpointState {
        self.state
    }

    fn transition(&mut self, next: EndpointState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                address = %self.address,
                from = %self.state,
                to = %next,
                "unexpected endpoint state transition"
            );
        }
        self.state = next;
    }

    /// Handle one message.
    pub async fn receive(&mut self, message: EndpointMessage) -> Result<Flow, EndpointFailure> {
        match message {
            EndpointMessage::Started {
                consecutive_failures,
            } => self.start(consecutive_failures).await,
            EndpointMessage::Stopped => {
                self.shutdown().await;
                tracing::debug!(address = %self.address, "endpoint stopped");
                Ok(Flow::Stop)
            }
            EndpointMessage::Restarting => {
                self.shutdown().await;
                tracing::debug!(address = %self.address, "endpoint restarting");
                Ok(Flow::Continue)
            }
            EndpointMessage::Terminated(event) => Ok(self.on_terminated(&event)),
            EndpointMessage::Batch(items) => self.send_batch(items).await,
            EndpointMessage::System(kind) => {
                tracing::trace!(address = %self.address, kind = %kind, "ignoring system message");
                Ok(Flow::Continue)
            }
            EndpointMessage::Unknown(description) => {
                tracing::warn!(
                    address = %self.address,
                    message = %description,
                    "endpoint received unexpected message"
                );
                Ok(Flow::Continue)
            }
        }
    }

    async fn start(&mut self, consecutive_failures: u32) -> Result<Flow, EndpointFailure> {
        if self.state != EndpointState::Idle {
            tracing::warn!(address = %self.address, state = %self.state, "endpoint already started");
            return Ok(Flow::Continue);
        }
        self.transition(EndpointState::Connecting);
        tracing::debug!(address = %self.address, consecutive_failures, "connecting to endpoint");

        let result = Connection::connect(
            &self.providers,
            &self.transport,
            &self.address,
            &self.config,
            &self.events,
        )
        .await;

        match result {
            Ok(mut connection) => {
                connection.spawn_monitor(&self.providers, &self.events);
                self.connection = Some(connection);
                self.transition(EndpointState::Ready);
                tracing::info!(address = %self.address, "connected to endpoint");
                Ok(Flow::Continue)
            }
            Err(e) => {
                self.transition(EndpointState::Faulted);
                tracing::error!(address = %self.address, error = %e, "endpoint failed to connect");
                let delay = self
                    .config
                    .retry_policy
                    .delay_for(consecutive_failures, self.providers.random());
                if let Err(sleep_err) = self.providers.time().sleep(delay).await {
                    tracing::warn!(address = %self.address, error = %sleep_err, "retry delay interrupted");
                }
                Err(EndpointFailure::new(e))
            }
        }
    }

    fn on_terminated(&mut self, event: &LifecycleEvent) -> Flow {
        if !event.is_terminated_for(&self.address) {
            return Flow::Continue;
        }
        tracing::info!(address = %self.address, "endpoint terminated, stopping");
        self.transition(EndpointState::Terminating);
        Flow::Stop
    }

    async fn send_batch(&mut self, mut items: Vec<BatchItem>) -> Result<Flow, EndpointFailure> {
        if let Some(event) = items.iter().find_map(|item| match item {
            BatchItem::Terminated(event) => Some(event),
            BatchItem::Deliver(_) => None,
        }) {
            tracing::info!(
                address = %self.address,
                terminated = event.address(),
                dropped = items.len(),
                "termination notice in batch, stopping"
            );
            self.transition(EndpointState::Terminating);
            return Ok(Flow::Stop);
        }

        if items.is_empty() {
            return Ok(Flow::Continue);
        }

        let connection = match self.connection.as_mut() {
            Some(connection) if self.state.can_send() => connection,
            _ => {
                tracing::error!(
                    address = %self.address,
                    state = %self.state,
                    "batch received before handshake completed"
                );
                let cause = EndpointError::NotConnected {
                    address: self.address.clone(),
                };
                return Err(EndpointFailure::with_stash(
                    cause,
                    EndpointMessage::Batch(items),
                ));
            }
        };

        // Slices of `items` still to send. The last entry goes next, so the
        // stack is always ordered back to front.
        let mut pending = vec![0..items.len()];
        while let Some(range) = pending.pop() {
            let deliveries = items[range.clone()].iter().filter_map(|item| match item {
                BatchItem::Deliver(delivery) => Some(delivery),
                BatchItem::Terminated(_) => None,
            });
            let batch = match self.assembler.assemble(deliveries, self.config.serializer_id) {
                Ok(batch) => batch,
                Err(source) => {
                    tracing::error!(address = %self.address, error = %source, "failed to serialize batch");
                    self.transition(EndpointState::Faulted);
                    return Err(EndpointFailure::new(EndpointError::Serialization {
                        address: self.address.clone(),
                        source,
                    }));
                }
            };

            let envelopes = batch.envelopes.len();
            match connection.send_batch(batch).await {
                Ok(()) => {
                    tracing::debug!(address = %self.address, envelopes, "batch sent");
                }
                Err(source) if source.is_unencodable() && range.len() > 1 => {
                    let mid = range.start + range.len() / 2;
                    tracing::debug!(
                        address = %self.address,
                        envelopes,
                        error = %source,
                        "batch does not fit in one frame, splitting"
                    );
                    pending.push(mid..range.end);
                    pending.push(range.start..mid);
                }
                Err(source) if source.is_unencodable() => {
                    tracing::error!(
                        address = %self.address,
                        error = %source,
                        "dropping message that cannot be framed"
                    );
                }
                Err(source) => {
                    tracing::error!(address = %self.address, error = %source, "failed to send batch");
                    self.transition(EndpointState::Faulted);
                    // Earlier slices went out; only this one and later are redelivered.
                    let unsent = items.split_off(range.start);
                    return Err(EndpointFailure::with_stash(
                        EndpointError::Send {
                            address: self.address.clone(),
                            source,
                        },
                        EndpointMessage::Batch(unsent),
                    ));
                }
            }
        }
        Ok(Flow::Continue)
    }

    async fn shutdown(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.transition(EndpointState::Terminating);
        if let Some(mut connection) = self.connection.take() {
            connection.close().await;
        }
        self.transition(EndpointState::Terminated);
    }
}
