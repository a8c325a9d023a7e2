//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! In-memory transport for testing.
//!
//! This module provides a listener/connector pair backed by in-process
//! duplex streams. It is primarily useful for exercising the server without
//! touching the filesystem or a real pipe namespace, and it gives tests
//! direct control over liveness: [`MemoryStream::close`] flips the peer's
//! liveness flag the way a half-closed remote end does on a real transport.

use crate::transport::{BoxedStream, InstanceStream, Listener, ServerAddress, TransportError};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::mpsc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Global counter naming memory listeners.
static NEXT_MEMORY_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Buffer size of each direction of a memory stream pair.
const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Backlog of connections a connector may queue before `connect` suspends.
const PENDING_CONNECT_LIMIT: usize = 16;

/// One half of an in-process stream pair.
///
/// Both halves are ordinary bidirectional byte streams. Each half tracks
/// whether its peer has been closed, which is what [`InstanceStream::is_live`]
/// reports, mirroring the non-destructive probe real transports use.
///
/// # Examples
///
/// ```rust
/// use revipc::transport::{InstanceStream, MemoryStream};
/// use tokio::io::{AsyncReadExt, AsyncWriteExt};
///
/// # async fn example() -> std::io::Result<()> {
/// let (mut near, mut far) = MemoryStream::pair();
///
/// near.write_all(b"ping").await?;
/// let mut buffer = [0u8; 4];
/// far.read_exact(&mut buffer).await?;
/// assert_eq!(&buffer, b"ping");
///
/// assert!(near.is_live());
/// far.close();
/// assert!(!near.is_live());
/// # Ok(())
/// # }
/// ```
pub struct MemoryStream {
    io: DuplexStream,
    local_closed: Arc<AtomicBool>,
    peer_closed: Arc<AtomicBool>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl MemoryStream {
    /// Creates a connected pair of memory streams with the default buffer
    /// size.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        Self::pair_with_buffer(DEFAULT_BUFFER_SIZE)
    }

    /// Creates a connected pair with an explicit per-direction buffer size.
    #[must_use]
    pub fn pair_with_buffer(buffer_size: usize) -> (Self, Self) {
        let near_closed = Arc::new(AtomicBool::new(false));
        let far_closed = Arc::new(AtomicBool::new(false));
        let (near_io, far_io) = tokio::io::duplex(buffer_size);

        let near = Self {
            io: near_io,
            local_closed: near_closed.clone(),
            peer_closed: far_closed.clone(),
            _permit: None,
        };
        let far = Self {
            io: far_io,
            local_closed: far_closed,
            peer_closed: near_closed,
            _permit: None,
        };
        (near, far)
    }

    /// Marks this half closed, so the peer's liveness probe fails.
    ///
    /// The underlying byte channel is left open: reads on the peer do not
    /// see EOF until this half is dropped, which models a remote end that
    /// has gone away without the transport noticing yet.
    pub fn close(&self) {
        self.local_closed.store(true, Ordering::SeqCst);
    }

    fn attach_permit(&mut self, permit: OwnedSemaphorePermit) {
        self._permit = Some(permit);
    }
}

impl Drop for MemoryStream {
    fn drop(&mut self) {
        self.local_closed.store(true, Ordering::SeqCst);
    }
}

impl AsyncRead for MemoryStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for MemoryStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.local_closed.store(true, Ordering::SeqCst);
        Pin::new(&mut self.io).poll_shutdown(cx)
    }
}

impl InstanceStream for MemoryStream {
    fn is_live(&self) -> bool {
        !self.peer_closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MemoryStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStream")
            .field("live", &self.is_live())
            .finish()
    }
}

/// In-process listener accepting streams pushed by a [`MemoryConnector`].
///
/// # Examples
///
/// ```rust
/// use revipc::transport::{Listener, MemoryListener};
/// use tokio::io::{AsyncReadExt, AsyncWriteExt};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (listener, connector) = MemoryListener::new(8);
///
/// let mut client = connector.connect().await?;
/// let mut accepted = listener.accept().await?;
///
/// client.write_all(b"hello").await?;
/// let mut buffer = [0u8; 5];
/// accepted.read_exact(&mut buffer).await?;
/// assert_eq!(&buffer, b"hello");
/// # Ok(())
/// # }
/// ```
pub struct MemoryListener {
    address: ServerAddress,
    incoming: tokio::sync::Mutex<mpsc::Receiver<MemoryStream>>,
    limiter: Arc<Semaphore>,
}

/// Client-side handle that dials a [`MemoryListener`].
#[derive(Clone)]
pub struct MemoryConnector {
    tx: mpsc::Sender<MemoryStream>,
    buffer_size: usize,
}

impl MemoryListener {
    /// Creates a listener bounded to `max_connections` outstanding accepted
    /// streams, along with the connector that dials it.
    #[must_use]
    pub fn new(max_connections: usize) -> (Self, MemoryConnector) {
        let (tx, rx) = mpsc::channel(PENDING_CONNECT_LIMIT);
        let id = NEXT_MEMORY_LISTENER_ID.fetch_add(1, Ordering::Relaxed);
        let listener = Self {
            address: ServerAddress::Pipe(format!("memory-{id}")),
            incoming: tokio::sync::Mutex::new(rx),
            limiter: Arc::new(Semaphore::new(max_connections)),
        };
        let connector = MemoryConnector {
            tx,
            buffer_size: DEFAULT_BUFFER_SIZE,
        };
        (listener, connector)
    }
}

#[async_trait::async_trait]
impl Listener for MemoryListener {
    async fn accept(&self) -> Result<BoxedStream, TransportError> {
        let permit = self
            .limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransportError::Closed)?;
        let mut incoming = self.incoming.lock().await;
        match incoming.recv().await {
            Some(mut stream) => {
                stream.attach_permit(permit);
                Ok(Box::new(stream))
            }
            None => Err(TransportError::Closed),
        }
    }

    fn address(&self) -> &ServerAddress {
        &self.address
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.limiter.close();
        self.incoming.lock().await.close();
        Ok(())
    }
}

impl MemoryConnector {
    /// Opens a new connection to the listener.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the listener has shut down.
    pub async fn connect(&self) -> Result<MemoryStream, TransportError> {
        let (near, far) = MemoryStream::pair_with_buffer(self.buffer_size);
        self.tx
            .send(far)
            .await
            .map_err(|_| TransportError::Closed)?;
        Ok(near)
    }
}
