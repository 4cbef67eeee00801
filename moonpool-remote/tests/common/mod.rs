//! Shared harness: in-memory network, provider bundle and a scripted peer.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashSet;
use std::future::Future;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::{broadcast, mpsc};

use moonpool_remote::wire::{serialize_frame, try_deserialize_frame};
use moonpool_remote::{
    ActorRef, CodecRegistry, ConnectRequest, ConnectResponse, EndpointConfig, EventStream,
    JsonCodec, LifecycleEvent, MessageBatch, MessageCodec, NetworkProvider, OutboundDelivery,
    Providers, RemoteMessage, RetryPolicy, TcpTransport, TokioRandomProvider, TokioTaskProvider,
    TokioTimeProvider,
};

/// Upper bound on any single wait in these tests.
pub const WAIT: Duration = Duration::from_secs(5);

pub const SERIALIZER_ID: u32 = 7;

/// Create a local tokio runtime for tests and run `future` inside a `LocalSet`.
pub fn run_local<F: Future>(future: F) -> F::Output {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::ERROR)
        .with_test_writer()
        .try_init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()
        .expect("Failed to build local runtime");
    tokio::task::LocalSet::new().block_on(&runtime, future)
}

/// Server end of an in-memory dial.
pub struct Accepted {
    pub address: String,
    pub stream: DuplexStream,
}

#[derive(Default)]
struct NetworkState {
    refused: HashSet<String>,
    dials: Vec<String>,
}

/// [`NetworkProvider`] that hands out duplex pipes. The server end of every
/// dial is queued on the receiver returned by [`MemoryNetwork::new`].
#[derive(Clone)]
pub struct MemoryNetwork {
    state: Rc<RefCell<NetworkState>>,
    accepted: mpsc::UnboundedSender<Accepted>,
}

impl MemoryNetwork {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Accepted>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                state: Rc::new(RefCell::new(NetworkState::default())),
                accepted: tx,
            },
            rx,
        )
    }

    /// Make every future dial to `address` fail with `ConnectionRefused`.
    pub fn refuse(&self, address: &str) {
        self.state.borrow_mut().refused.insert(address.to_string());
    }

    /// Accept dials to `address` again.
    pub fn accept(&self, address: &str) {
        self.state.borrow_mut().refused.remove(address);
    }

    pub fn dial_count(&self, address: &str) -> usize {
        self.state
            .borrow()
            .dials
            .iter()
            .filter(|dialed| dialed.as_str() == address)
            .count()
    }
}

#[async_trait(?Send)]
impl NetworkProvider for MemoryNetwork {
    type TcpStream = DuplexStream;

    async fn connect(&self, addr: &str) -> io::Result<Self::TcpStream> {
        let refused = {
            let mut state = self.state.borrow_mut();
            state.dials.push(addr.to_string());
            state.refused.contains(addr)
        };
        if refused {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{addr} refused"),
            ));
        }
        let (client, server) = tokio::io::duplex(64 * 1024);
        self.accepted
            .send(Accepted {
                address: addr.to_string(),
                stream: server,
            })
            .map_err(|_| io::Error::new(io::ErrorKind::NotConnected, "listener gone"))?;
        Ok(client)
    }
}

/// Provider bundle over [`MemoryNetwork`] and real tokio time.
#[derive(Clone)]
pub struct TestProviders {
    network: MemoryNetwork,
    time: TokioTimeProvider,
    task: TokioTaskProvider,
    random: TokioRandomProvider,
}

impl Providers for TestProviders {
    type Network = MemoryNetwork;
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

/// Payload type registered with the test registry.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct Ping {
    pub seq: u32,
}

/// Payload with a caller-chosen size. Every byte costs several bytes once
/// the envelope is framed, since JSON writes byte vectors as number arrays.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct Blob(pub Vec<u8>);

/// Payload type nobody registered.
#[derive(Debug)]
pub struct Unregistered;

pub fn registry() -> Rc<CodecRegistry<JsonCodec>> {
    Rc::new(
        CodecRegistry::new(JsonCodec, SERIALIZER_ID)
            .register::<Ping>("test.Ping")
            .register::<Blob>("test.Blob"),
    )
}

pub fn config() -> EndpointConfig {
    EndpointConfig::new("system-a", "node-a:4020")
        .with_serializer_id(SERIALIZER_ID)
        .with_handshake_timeout(Duration::from_secs(1))
        .with_retry_policy(RetryPolicy::Fixed(Duration::from_millis(5)))
}

/// Everything a test needs to drive an endpoint against fake peers.
pub struct Harness {
    pub providers: TestProviders,
    pub network: MemoryNetwork,
    pub transport: TcpTransport<TestProviders>,
    pub events: EventStream,
    pub accepted: mpsc::UnboundedReceiver<Accepted>,
}

impl Harness {
    pub fn new() -> Self {
        let (network, accepted) = MemoryNetwork::new();
        let providers = TestProviders {
            network: network.clone(),
            time: TokioTimeProvider::new(),
            task: TokioTaskProvider,
            random: TokioRandomProvider::new(),
        };
        Self {
            transport: TcpTransport::new(providers.clone()),
            providers,
            network,
            events: EventStream::new(),
            accepted,
        }
    }

    /// Wait for the next dial and wrap its server end.
    pub async fn next_peer(&mut self) -> FakePeer {
        next_peer(&mut self.accepted).await
    }
}

/// Wait for the next dial on `accepted` and wrap its server end.
pub async fn next_peer(accepted: &mut mpsc::UnboundedReceiver<Accepted>) -> FakePeer {
    let accepted = tokio::time::timeout(WAIT, accepted.recv())
        .await
        .expect("timed out waiting for a dial")
        .expect("network dropped");
    FakePeer::new(accepted.address, accepted.stream)
}

/// Delivery of `Ping { seq }` from `sender-1` on node-a to `target-1` on `address`.
pub fn ping(address: &str, seq: u32) -> OutboundDelivery {
    OutboundDelivery::new(ActorRef::new(address, "target-1"), Ping { seq })
        .with_sender(ActorRef::new("node-a:4020", "sender-1"))
}

/// Payloads of every envelope in `batch`, decoded as [`Ping`].
pub fn decode_pings(batch: &MessageBatch) -> Vec<u32> {
    batch
        .envelopes
        .iter()
        .map(|envelope| {
            JsonCodec
                .decode::<Ping>(&envelope.message_data)
                .expect("ping payload")
                .seq
        })
        .collect()
}

/// Remote side of a connection, speaking the real frame format.
pub struct FakePeer {
    pub address: String,
    reader: ReadHalf<DuplexStream>,
    writer: WriteHalf<DuplexStream>,
    buffer: Vec<u8>,
}

impl FakePeer {
    pub fn new(address: String, stream: DuplexStream) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            address,
            reader,
            writer,
            buffer: Vec::new(),
        }
    }

    /// Next message, or `None` once the endpoint closed its send side.
    pub async fn recv(&mut self) -> Option<RemoteMessage> {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some((payload, consumed)) =
                try_deserialize_frame(&self.buffer).expect("valid frame")
            {
                self.buffer.drain(..consumed);
                return Some(JsonCodec.decode(&payload).expect("valid message"));
            }
            let n = tokio::time::timeout(WAIT, self.reader.read(&mut chunk))
                .await
                .expect("timed out reading from endpoint")
                .expect("read");
            if n == 0 {
                return None;
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    pub async fn send(&mut self, message: &RemoteMessage) {
        let payload = JsonCodec.encode(message).expect("encode");
        let frame = serialize_frame(&payload).expect("frame");
        self.writer.write_all(&frame).await.expect("write");
        self.writer.flush().await.expect("flush");
    }

    /// Read the connect request and accept it.
    pub async fn accept_handshake(&mut self) -> ConnectRequest {
        let request = match self.recv().await {
            Some(RemoteMessage::ConnectRequest(request)) => request,
            other => panic!("expected connect request, got {other:?}"),
        };
        self.send(&RemoteMessage::ConnectResponse(ConnectResponse {
            member_id: "member-b".to_string(),
        }))
        .await;
        request
    }

    /// Half-close: the endpoint's monitor sees end of stream.
    pub async fn close_send(&mut self) {
        self.writer.shutdown().await.expect("shutdown");
    }

    /// Drain until end of stream, returning every message seen.
    pub async fn drain(&mut self) -> Vec<RemoteMessage> {
        let mut seen = Vec::new();
        while let Some(message) = self.recv().await {
            seen.push(message);
        }
        seen
    }
}

/// Wait for the next event matching `predicate`.
pub async fn wait_for_event(
    rx: &mut broadcast::Receiver<LifecycleEvent>,
    predicate: impl Fn(&LifecycleEvent) -> bool,
) -> LifecycleEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            let event = rx.recv().await.expect("event stream open");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for lifecycle event")
}

/// Events already published, without waiting.
pub fn published(rx: &mut broadcast::Receiver<LifecycleEvent>) -> Vec<LifecycleEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        seen.push(event);
    }
    seen
}

/// Let spawned local tasks run for a moment.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
}
