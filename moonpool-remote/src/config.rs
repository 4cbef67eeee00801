//! Configuration for remote endpoints.

use std::time::Duration;

use crate::providers::RandomProvider;

/// Options applied when dialing a channel.
#[derive(Clone, Debug, Default)]
pub struct DialOptions {
    /// Upper bound on establishing the channel. `None` waits as long as the
    /// network does.
    pub connect_timeout: Option<Duration>,
}

/// Options applied to the stream opened on a channel.
#[derive(Clone, Debug, Default)]
pub struct CallOptions {
    /// Upper bound on waiting for the handshake response. Batch sends are
    /// never bounded.
    pub handshake_timeout: Option<Duration>,
}

/// Delay applied before a failed connect is escalated to the supervisor.
#[derive(Clone, Debug, PartialEq)]
pub enum RetryPolicy {
    /// Same delay for every attempt.
    Fixed(Duration),
    /// `initial * 2^attempt`, capped at `max`, with up to `jitter` (0.0..=1.0)
    /// of the delay randomly subtracted.
    ExponentialBackoff {
        /// Delay for the first failure.
        initial: Duration,
        /// Maximum delay.
        max: Duration,
        /// Fraction of the delay that may be shaved off at random.
        jitter: f64,
    },
}

impl RetryPolicy {
    /// Delay for the given consecutive failure count (0 for the first).
    pub fn delay_for<R: RandomProvider>(&self, attempt: u32, random: &R) -> Duration {
        match self {
            RetryPolicy::Fixed(delay) => *delay,
            RetryPolicy::ExponentialBackoff {
                initial,
                max,
                jitter,
            } => {
                let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
                let base = initial.saturating_mul(factor).min(*max);
                let jitter = jitter.clamp(0.0, 1.0);
                if jitter == 0.0 {
                    return base;
                }
                let scale = 1.0 - jitter * random.random_ratio().clamp(0.0, 1.0);
                Duration::from_nanos((base.as_nanos() as f64 * scale).round() as u64)
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::ExponentialBackoff {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            jitter: 0.2,
        }
    }
}

/// Configuration for an endpoint and its supervisor.
#[derive(Clone, Debug)]
pub struct EndpointConfig {
    /// Unique id of the local actor system, sent in the handshake.
    pub system_id: String,

    /// Address the local node advertises in the handshake.
    pub local_address: String,

    /// Passed through to [`RemoteTransport::dial`](crate::RemoteTransport::dial).
    pub dial_options: DialOptions,

    /// Passed through to [`TransportChannel::open_stream`](crate::TransportChannel::open_stream).
    pub call_options: CallOptions,

    /// Delay before a failed connect becomes fatal.
    pub retry_policy: RetryPolicy,

    /// Serializer used for every payload in a batch.
    pub serializer_id: u32,

    /// Maximum number of deliveries the mailbox coalesces into one batch.
    pub batch_size: usize,

    /// Maximum consecutive restarts before the supervisor gives up.
    /// `None` restarts forever.
    pub max_restarts: Option<u32>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            system_id: String::new(),
            local_address: String::new(),
            dial_options: DialOptions::default(),
            call_options: CallOptions::default(),
            retry_policy: RetryPolicy::default(),
            serializer_id: 0,
            batch_size: 1000,
            max_restarts: None,
        }
    }
}

impl EndpointConfig {
    /// Create a configuration identifying the local node.
    pub fn new(system_id: impl Into<String>, local_address: impl Into<String>) -> Self {
        Self {
            system_id: system_id.into(),
            local_address: local_address.into(),
            ..Self::default()
        }
    }

    /// Set the dial timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.dial_options.connect_timeout = Some(timeout);
        self
    }

    /// Set the handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.call_options.handshake_timeout = Some(timeout);
        self
    }

    /// Set the retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set the payload serializer id.
    pub fn with_serializer_id(mut self, serializer_id: u32) -> Self {
        self.serializer_id = serializer_id;
        self
    }

    /// Set the mailbox batch size (at least 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Bound the number of consecutive restarts.
    pub fn with_max_restarts(mut self, max_restarts: u32) -> Self {
        self.max_restarts = Some(max_restarts);
        self
    }

    /// Configuration for low-latency local networking.
    pub fn local_network(system_id: impl Into<String>, local_address: impl Into<String>) -> Self {
        Self::new(system_id, local_address)
            .with_connect_timeout(Duration::from_millis(500))
            .with_handshake_timeout(Duration::from_millis(500))
            .with_retry_policy(RetryPolicy::ExponentialBackoff {
                initial: Duration::from_millis(10),
                max: Duration::from_secs(1),
                jitter: 0.2,
            })
            .with_max_restarts(10)
    }

    /// Configuration for high-latency WAN networking.
    pub fn wan_network(system_id: impl Into<String>, local_address: impl Into<String>) -> Self {
        Self::new(system_id, local_address)
            .with_connect_timeout(Duration::from_secs(30))
            .with_handshake_timeout(Duration::from_secs(30))
            .with_retry_policy(RetryPolicy::ExponentialBackoff {
                initial: Duration::from_millis(500),
                max: Duration::from_secs(60),
                jitter: 0.2,
            })
    }
}
