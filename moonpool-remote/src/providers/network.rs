//! Network provider used to open outbound connections to remote nodes.
//!
//! The endpoint writer never listens; it only dials. Keeping the dialer
//! behind a trait lets tests swap real sockets for in-memory pipes.

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};

/// Provider trait for dialing remote nodes.
///
/// Single-core design - no Send bounds needed.
/// Clone allows every endpoint to hold its own handle cheaply.
#[async_trait(?Send)]
pub trait NetworkProvider: Clone {
    /// The byte stream type produced by a successful dial.
    type TcpStream: AsyncRead + AsyncWrite + Unpin + 'static;

    /// Connect to a remote address.
    async fn connect(&self, addr: &str) -> io::Result<Self::TcpStream>;
}

/// Real Tokio networking implementation.
#[derive(Debug, Clone, Default)]
pub struct TokioNetworkProvider;

impl TokioNetworkProvider {
    /// Create a new Tokio network provider.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait(?Send)]
impl NetworkProvider for TokioNetworkProvider {
    type TcpStream = tokio::net::TcpStream;

    async fn connect(&self, addr: &str) -> io::Result<Self::TcpStream> {
        let stream = tokio::net::TcpStream::connect(addr).await?;
        // Batches are already coalesced by the mailbox; don't delay them further.
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}
