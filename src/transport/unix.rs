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

//! Unix domain socket transport.

use crate::transport::{BoxedStream, InstanceStream, Listener, ServerAddress, TransportError};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Listener bound to a Unix domain socket path.
///
/// A stale socket file left behind by a previous run is removed before
/// binding; [`Listener::shutdown`] unlinks the live one.
///
/// # Examples
///
/// ```rust,no_run
/// use revipc::transport::{Listener, UnixSocketListener};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let listener = UnixSocketListener::bind("/tmp/monitor.sock", 16)?;
/// let stream = listener.accept().await?;
/// # Ok(())
/// # }
/// ```
pub struct UnixSocketListener {
    listener: UnixListener,
    address: ServerAddress,
    path: PathBuf,
    limiter: Arc<Semaphore>,
}

impl UnixSocketListener {
    /// Binds a listener at `path`, bounded to `max_connections` outstanding
    /// accepted streams.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::BindFailed`] if the socket cannot be
    /// created at `path`.
    pub fn bind(path: impl Into<PathBuf>, max_connections: usize) -> Result<Self, TransportError> {
        let path = path.into();

        // A previous server instance may have exited without unlinking.
        remove_stale_socket(&path);

        let listener = UnixListener::bind(&path).map_err(|source| TransportError::BindFailed {
            address: path.display().to_string(),
            source,
        })?;

        debug!(path = %path.display(), max_connections, "bound unix socket listener");

        Ok(Self {
            listener,
            address: ServerAddress::Path(path.clone()),
            path,
            limiter: Arc::new(Semaphore::new(max_connections)),
        })
    }
}

#[async_trait::async_trait]
impl Listener for UnixSocketListener {
    async fn accept(&self) -> Result<BoxedStream, TransportError> {
        let permit = self
            .limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransportError::Closed)?;
        let (stream, _addr) = self
            .listener
            .accept()
            .await
            .map_err(|source| TransportError::AcceptFailed { source })?;
        Ok(Box::new(UnixSocketStream {
            stream,
            _permit: Some(permit),
        }))
    }

    fn address(&self) -> &ServerAddress {
        &self.address
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.limiter.close();
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(TransportError::Io { source }),
        }
    }
}

fn remove_stale_socket(path: &Path) {
    if path.exists() {
        if let Err(error) = std::fs::remove_file(path) {
            debug!(path = %path.display(), %error, "could not remove stale socket file");
        }
    }
}

/// A connected Unix domain socket stream.
pub struct UnixSocketStream {
    stream: UnixStream,
    _permit: Option<OwnedSemaphorePermit>,
}

impl UnixSocketStream {
    /// Connects to a server socket at `path`.
    ///
    /// This is the instance side of the transport; the connected stream
    /// should immediately send an advertise message.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the connect fails.
    pub async fn connect(path: impl AsRef<Path>) -> io::Result<Self> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self {
            stream,
            _permit: None,
        })
    }
}

impl AsyncRead for UnixSocketStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for UnixSocketStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

impl InstanceStream for UnixSocketStream {
    /// Peeks one byte without blocking or consuming.
    ///
    /// An orderly shutdown by the peer reads as zero bytes; `EAGAIN` means
    /// the peer is connected with nothing to read.
    fn is_live(&self) -> bool {
        use nix::errno::Errno;
        use nix::sys::socket::{MsgFlags, recv};

        let mut probe = [0u8; 1];
        match recv(
            self.stream.as_raw_fd(),
            &mut probe,
            MsgFlags::MSG_PEEK | MsgFlags::MSG_DONTWAIT,
        ) {
            Ok(0) => false,
            Ok(_) => true,
            Err(Errno::EAGAIN) => true,
            Err(_) => false,
        }
    }
}

impl std::fmt::Debug for UnixSocketStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixSocketStream")
            .field("fd", &self.stream.as_raw_fd())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn socket_path(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        dir.path().join(name)
    }

    #[tokio::test]
    async fn test_accept_and_exchange() {
        let dir = tempfile::tempdir().unwrap();
        let path = socket_path(&dir, "exchange.sock");
        let listener = UnixSocketListener::bind(&path, 4).unwrap();

        let mut client = UnixSocketStream::connect(&path).await.unwrap();
        let mut accepted = listener.accept().await.unwrap();

        client.write_all(b"hello").await.unwrap();
        let mut buffer = [0u8; 5];
        accepted.read_exact(&mut buffer).await.unwrap();
        assert_eq!(&buffer, b"hello");
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = socket_path(&dir, "stale.sock");

        let first = UnixSocketListener::bind(&path, 4).unwrap();
        drop(first);

        // The file is still there; a new bind must succeed anyway.
        assert!(path.exists());
        let second = UnixSocketListener::bind(&path, 4).unwrap();
        drop(second);
    }

    #[tokio::test]
    async fn test_shutdown_unlinks_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = socket_path(&dir, "unlink.sock");

        let listener = UnixSocketListener::bind(&path, 4).unwrap();
        assert!(path.exists());
        listener.shutdown().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_liveness_probe_sees_peer_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = socket_path(&dir, "live.sock");
        let listener = UnixSocketListener::bind(&path, 4).unwrap();

        let client = UnixSocketStream::connect(&path).await.unwrap();
        let accepted = listener.accept().await.unwrap();
        assert!(accepted.is_live());

        drop(client);
        // Closing is asynchronous; give the kernel a moment.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!accepted.is_live());
    }

    #[tokio::test]
    async fn test_liveness_probe_does_not_consume_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = socket_path(&dir, "peek.sock");
        let listener = UnixSocketListener::bind(&path, 4).unwrap();

        let mut client = UnixSocketStream::connect(&path).await.unwrap();
        let mut accepted = listener.accept().await.unwrap();

        client.write_all(b"x").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert!(accepted.is_live());
        assert!(accepted.is_live());

        // The byte is still readable after two probes.
        let mut buffer = [0u8; 1];
        accepted.read_exact(&mut buffer).await.unwrap();
        assert_eq!(&buffer, b"x");
    }
}
