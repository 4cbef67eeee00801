//! Registry of supervised endpoints, one per remote address.

use std::cell::RefCell;
use std::collections::HashMap;

use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::config::EndpointConfig;
use crate::endpoint::supervisor::{EndpointHandle, EndpointSupervisor};
use crate::endpoint::writer::EndpointWriter;
use crate::error::EndpointClosed;
use crate::events::{EventStream, LifecycleEvent};
use crate::providers::Providers;
use crate::serialization::SerializerRegistry;
use crate::transport::RemoteTransport;
use crate::types::OutboundDelivery;

/// Routes deliveries to the endpoint for their target address.
///
/// Endpoints are spawned on first use and forgotten once a `Terminated`
/// event for their address is observed, so the next delivery to that
/// address starts a fresh connection. Must be used inside a `LocalSet`.
pub struct EndpointManager<P, T, S>
where
    P: Providers,
    T: RemoteTransport,
    S: SerializerRegistry + Clone + 'static,
{
    providers: P,
    transport: T,
    config: EndpointConfig,
    events: EventStream,
    registry: S,
    lifecycle: RefCell<broadcast::Receiver<LifecycleEvent>>,
    endpoints: RefCell<HashMap<String, EndpointHandle>>,
}

impl<P, T, S> EndpointManager<P, T, S>
where
    P: Providers,
    T: RemoteTransport,
    S: SerializerRegistry + Clone + 'static,
{
    /// Create an empty manager.
    pub fn new(
        providers: P,
        transport: T,
        config: EndpointConfig,
        events: EventStream,
        registry: S,
    ) -> Self {
        let lifecycle = RefCell::new(events.subscribe());
        Self {
            providers,
            transport,
            config,
            events,
            registry,
            lifecycle,
            endpoints: RefCell::new(HashMap::new()),
        }
    }

    /// Queue `delivery` on the endpoint for its target's address.
    ///
    /// # Errors
    ///
    /// Fails only if a freshly spawned endpoint stopped before accepting the
    /// delivery.
    pub fn send(&self, delivery: OutboundDelivery) -> Result<(), EndpointClosed> {
        self.forget_terminated();
        let address = delivery.target.address.clone();
        let handle = self.endpoint(&address);
        match handle.send(delivery) {
            Ok(()) => Ok(()),
            Err(EndpointClosed {
                delivery: Some(delivery),
                ..
            }) => {
                tracing::debug!(address = %address, "endpoint had stopped, respawning");
                self.endpoints.borrow_mut().remove(&address);
                self.endpoint(&address).send(delivery)
            }
            Err(closed) => Err(closed),
        }
    }

    /// Handle for `address`, spawning the endpoint if needed.
    pub fn endpoint(&self, address: &str) -> EndpointHandle {
        self.forget_terminated();
        if let Some(handle) = self.endpoints.borrow().get(address) {
            if !handle.is_closed() {
                return handle.clone();
            }
        }
        let handle = self.spawn(address);
        self.endpoints
            .borrow_mut()
            .insert(address.to_string(), handle.clone());
        handle
    }

    fn spawn(&self, address: &str) -> EndpointHandle {
        tracing::info!(address, "spawning endpoint");
        let providers = self.providers.clone();
        let transport = self.transport.clone();
        let config = self.config.clone();
        let events = self.events.clone();
        let registry = self.registry.clone();
        let writer_address = address.to_string();
        EndpointSupervisor::spawn(&self.providers, address, &self.config, &self.events, move || {
            EndpointWriter::new(
                providers.clone(),
                transport.clone(),
                writer_address.clone(),
                config.clone(),
                events.clone(),
                registry.clone(),
            )
        })
    }

    /// Stop the endpoint for `address`, if any.
    pub fn stop(&self, address: &str) {
        if let Some(handle) = self.endpoints.borrow_mut().remove(address) {
            handle.stop();
        }
    }

    /// Stop every endpoint.
    pub fn stop_all(&self) {
        for (_, handle) in self.endpoints.borrow_mut().drain() {
            handle.stop();
        }
    }

    /// True if a live endpoint exists for `address`.
    pub fn contains(&self, address: &str) -> bool {
        self.forget_terminated();
        self.endpoints
            .borrow()
            .get(address)
            .is_some_and(|handle| !handle.is_closed())
    }

    /// Number of known endpoints.
    pub fn len(&self) -> usize {
        self.forget_terminated();
        self.endpoints.borrow().len()
    }

    /// True when no endpoint is known.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn forget_terminated(&self) {
        let mut lifecycle = self.lifecycle.borrow_mut();
        loop {
            match lifecycle.try_recv() {
                Ok(LifecycleEvent::Terminated { address }) => {
                    if self.endpoints.borrow_mut().remove(&address).is_some() {
                        tracing::debug!(address = %address, "forgetting terminated endpoint");
                    }
                }
                Ok(LifecycleEvent::Connected { .. }) => {}
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "endpoint manager lagged behind lifecycle events");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }
}
