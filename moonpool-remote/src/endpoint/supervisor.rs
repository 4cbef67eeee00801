//! Supervised endpoint task.
//!
//! One task per remote address owns the [`EndpointWriter`] and feeds it from
//! an ordered mailbox. Pending deliveries are coalesced into batches. When
//! the writer fails, it is told it is restarting, dropped, and replaced by a
//! fresh writer that receives the stashed messages before anything newer.

use std::collections::VecDeque;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

use crate::config::EndpointConfig;
use crate::endpoint::message::{BatchItem, EndpointMessage};
use crate::endpoint::writer::{EndpointWriter, Flow};
use crate::error::EndpointClosed;
use crate::events::EventStream;
use crate::providers::{Providers, TaskProvider};
use crate::serialization::SerializerRegistry;
use crate::transport::RemoteTransport;
use crate::types::OutboundDelivery;

enum MailboxItem {
    Deliver(OutboundDelivery),
    Stop,
}

/// Handle to a supervised endpoint. Cloning yields another handle to the
/// same endpoint.
#[derive(Clone)]
pub struct EndpointHandle {
    address: String,
    mailbox: mpsc::UnboundedSender<MailboxItem>,
}

impl EndpointHandle {
    /// Remote address of the endpoint.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Queue a delivery. Deliveries are sent in the order they are queued.
    ///
    /// # Errors
    ///
    /// Returns the delivery back if the endpoint has stopped.
    pub fn send(&self, delivery: OutboundDelivery) -> Result<(), EndpointClosed> {
        self.mailbox
            .send(MailboxItem::Deliver(delivery))
            .map_err(|err| EndpointClosed {
                address: self.address.clone(),
                delivery: match err.0 {
                    MailboxItem::Deliver(delivery) => Some(delivery),
                    MailboxItem::Stop => None,
                },
            })
    }

    /// Ask the endpoint to stop after the deliveries already queued.
    pub fn stop(&self) {
        let _ = self.mailbox.send(MailboxItem::Stop);
    }

    /// True once the endpoint task has exited.
    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }

    /// Wait for the endpoint task to exit.
    pub async fn closed(&self) {
        self.mailbox.closed().await
    }
}

impl std::fmt::Debug for EndpointHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointHandle")
            .field("address", &self.address)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Spawns and runs supervised endpoints.
pub struct EndpointSupervisor;

impl EndpointSupervisor {
    /// Spawn the endpoint for `address` on the current `LocalSet`.
    ///
    /// `factory` builds a fresh writer for the first start and after every
    /// failure.
    pub fn spawn<P, T, S, F>(
        providers: &P,
        address: impl Into<String>,
        config: &EndpointConfig,
        events: &EventStream,
        factory: F,
    ) -> EndpointHandle
    where
        P: Providers,
        T: RemoteTransport,
        S: SerializerRegistry + 'static,
        F: Fn() -> EndpointWriter<P, T, S> + 'static,
    {
        let address = address.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let run = Supervision {
            address: address.clone(),
            batch_size: config.batch_size.max(1),
            max_restarts: config.max_restarts,
            events: events.clone(),
            mailbox: rx,
            pending: VecDeque::new(),
        };
        providers
            .task()
            .spawn_task("endpoint_supervisor", run.run(factory));
        EndpointHandle {
            address,
            mailbox: tx,
        }
    }
}

struct Supervision {
    address: String,
    batch_size: usize,
    max_restarts: Option<u32>,
    events: EventStream,
    mailbox: mpsc::UnboundedReceiver<MailboxItem>,
    pending: VecDeque<EndpointMessage>,
}

impl Supervision {
    async fn run<P, T, S, F>(mut self, factory: F)
    where
        P: Providers,
        T: RemoteTransport,
        S: SerializerRegistry,
        F: Fn() -> EndpointWriter<P, T, S>,
    {
        let mut lifecycle = self.events.subscribe();
        let mut writer = factory();
        let mut consecutive_failures = 0u32;
        self.pending.push_back(EndpointMessage::Started {
            consecutive_failures,
        });
        tracing::info!(address = %self.address, "endpoint supervisor started");

        loop {
            let message = match self.pending.pop_front() {
                Some(message) => message,
                None => {
                    tokio::select! {
                        biased;
                        event = lifecycle.recv() => match event {
                            Ok(event) if event.is_terminated_for(&self.address) => {
                                EndpointMessage::Terminated(event)
                            }
                            Ok(_) => continue,
                            Err(RecvError::Lagged(skipped)) => {
                                tracing::warn!(address = %self.address, skipped, "lifecycle events lagged");
                                continue;
                            }
                            Err(RecvError::Closed) => EndpointMessage::Stopped,
                        },
                        item = self.mailbox.recv() => match item {
                            Some(MailboxItem::Deliver(first)) => self.coalesce(first),
                            Some(MailboxItem::Stop) | None => EndpointMessage::Stopped,
                        },
                    }
                }
            };

            let was_start = matches!(message, EndpointMessage::Started { .. });
            let was_stop = matches!(message, EndpointMessage::Stopped);
            tracing::trace!(address = %self.address, kind = message.kind(), "delivering to writer");

            match writer.receive(message).await {
                Ok(Flow::Continue) => {
                    if was_start {
                        consecutive_failures = 0;
                    }
                }
                Ok(Flow::Stop) => {
                    if !was_stop {
                        if let Err(failure) = writer.receive(EndpointMessage::Stopped).await {
                            tracing::warn!(address = %self.address, error = %failure, "error while stopping endpoint");
                        }
                    }
                    break;
                }
                Err(failure) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    tracing::warn!(
                        address = %self.address,
                        error = %failure,
                        consecutive_failures,
                        stashed = failure.stashed.len(),
                        "endpoint failed"
                    );
                    if let Err(e) = writer.receive(EndpointMessage::Restarting).await {
                        tracing::warn!(address = %self.address, error = %e, "error while restarting endpoint");
                    }
                    if self
                        .max_restarts
                        .is_some_and(|max| consecutive_failures > max)
                    {
                        tracing::error!(
                            address = %self.address,
                            consecutive_failures,
                            dropped = failure.stashed.len() + self.pending.len(),
                            "endpoint exceeded restart limit, giving up"
                        );
                        break;
                    }
                    writer = factory();
                    let mut next = VecDeque::with_capacity(1 + failure.stashed.len() + self.pending.len());
                    next.push_back(EndpointMessage::Started {
                        consecutive_failures,
                    });
                    next.extend(failure.stashed);
                    next.extend(self.pending.drain(..));
                    self.pending = next;
                }
            }
        }

        tracing::info!(address = %self.address, "endpoint supervisor stopped");
    }

    /// Drain queued deliveries behind `first` into one batch.
    fn coalesce(&mut self, first: OutboundDelivery) -> EndpointMessage {
        let mut items = vec![BatchItem::Deliver(first)];
        while items.len() < self.batch_size {
            match self.mailbox.try_recv() {
                Ok(MailboxItem::Deliver(delivery)) => items.push(BatchItem::Deliver(delivery)),
                Ok(MailboxItem::Stop) => {
                    self.pending.push_back(EndpointMessage::Stopped);
                    break;
                }
                Err(_) => break,
            }
        }
        EndpointMessage::Batch(items)
    }
}
