//! Inbound liveness monitor.
//!
//! After the handshake the peer never sends application data on this
//! stream, so anything arriving on the receive half is a liveness signal:
//!
//! | read result            | action                                 |
//! |------------------------|----------------------------------------|
//! | stream ended cleanly   | log, exit                              |
//! | transport error        | publish `Terminated`, exit             |
//! | any message            | publish `Terminated`, keep reading     |
//!
//! `Terminated` is published at most once per connection.

use tokio::sync::oneshot;

use crate::error::EndpointError;
use crate::events::{EventStream, LifecycleEvent};
use crate::transport::StreamReceiver;

/// Watch `receiver` until the stream ends, fails, or `shutdown` fires.
pub async fn run_liveness_monitor<R: StreamReceiver>(
    mut receiver: R,
    address: String,
    events: EventStream,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut announced = false;
    let mut announce = |events: &EventStream| {
        if !announced {
            announced = true;
            events.publish(LifecycleEvent::Terminated {
                address: address.clone(),
            });
        }
    };

    loop {
        let result = tokio::select! {
            biased;
            _ = &mut shutdown => {
                tracing::debug!(address = %address, "liveness monitor stopped by connection close");
                return;
            }
            result = receiver.recv() => result,
        };

        match result {
            Err(e) if e.is_stream_ended() => {
                tracing::debug!(address = %address, "endpoint stream completed");
                return;
            }
            Err(source) => {
                let error = EndpointError::StreamRead {
                    address: address.clone(),
                    source,
                };
                tracing::error!(error = %error, "endpoint lost connection");
                announce(&events);
                return;
            }
            Ok(message) => {
                tracing::info!(
                    address = %address,
                    received = message.variant_name(),
                    "remote endpoint disconnected"
                );
                announce(&events);
            }
        }
    }
}
