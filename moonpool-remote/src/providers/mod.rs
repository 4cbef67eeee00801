//! Provider bundle for the endpoint runtime.
//!
//! Endpoint code is generic over a single [`Providers`] type parameter
//! instead of carrying network, time, task and random parameters separately:
//!
//! ```text
//! struct EndpointWriter<P: Providers, T: RemoteTransport>
//! ```
//!
//! [`TokioProviders`] is the production bundle. Tests build their own bundle
//! around an in-memory [`NetworkProvider`].

mod network;
mod random;
mod task;
mod time;

pub use network::{NetworkProvider, TokioNetworkProvider};
pub use random::{RandomProvider, TokioRandomProvider};
pub use task::{TaskProvider, TokioTaskProvider};
pub use time::{TimeError, TimeProvider, TokioTimeProvider};

/// Bundle of all provider types for a runtime environment.
pub trait Providers: Clone + 'static {
    /// Network provider type for outbound connections.
    type Network: NetworkProvider + Clone + 'static;

    /// Time provider type for sleep and timeout.
    type Time: TimeProvider + Clone + 'static;

    /// Task provider type for spawning local tasks.
    type Task: TaskProvider + Clone + 'static;

    /// Random provider type for backoff jitter.
    type Random: RandomProvider + Clone + 'static;

    /// Get the network provider instance.
    fn network(&self) -> &Self::Network;

    /// Get the time provider instance.
    fn time(&self) -> &Self::Time;

    /// Get the task provider instance.
    fn task(&self) -> &Self::Task;

    /// Get the random provider instance.
    fn random(&self) -> &Self::Random;
}

/// Production providers using the Tokio runtime.
#[derive(Clone, Default)]
pub struct TokioProviders {
    network: TokioNetworkProvider,
    time: TokioTimeProvider,
    task: TokioTaskProvider,
    random: TokioRandomProvider,
}

impl TokioProviders {
    /// Create a new production providers bundle.
    pub fn new() -> Self {
        Self {
            network: TokioNetworkProvider::new(),
            time: TokioTimeProvider::new(),
            task: TokioTaskProvider,
            random: TokioRandomProvider::new(),
        }
    }
}

impl Providers for TokioProviders {
    type Network = TokioNetworkProvider;
    type Time = TokioTimeProvider;
    type Task = TokioTaskProvider;
    type Random = TokioRandomProvider;

    fn network(&self) -> &Self::Network {
        &self.network
    }

    fn time(&self) -> &Self::Time {
        &self.time
    }

    fn task(&self) -> &Self::Task {
        &self.task
    }

    fn random(&self) -> &Self::Random {
        &self.random
    }
}
