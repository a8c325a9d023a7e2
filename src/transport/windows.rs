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

//! Windows named pipe transport.
//!
//! Named pipes accept differently from sockets: each instance of the pipe
//! serves one client, so the listener keeps one unconnected instance ready,
//! waits for a client on it, and creates the next instance after each
//! accept.

use crate::transport::{BoxedStream, InstanceStream, Listener, ServerAddress, TransportError};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeClient, NamedPipeServer, ServerOptions};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Listener bound to a named pipe.
pub struct NamedPipeListener {
    pipe_path: String,
    address: ServerAddress,
    next: tokio::sync::Mutex<Option<NamedPipeServer>>,
    limiter: Arc<Semaphore>,
}

impl NamedPipeListener {
    /// Binds the first instance of the pipe `name`, bounded to
    /// `max_connections` outstanding accepted streams.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::BindFailed`] if the first pipe instance
    /// cannot be created, typically because another process already owns
    /// the name.
    pub fn bind(name: impl AsRef<str>, max_connections: usize) -> Result<Self, TransportError> {
        let address = ServerAddress::pipe(name.as_ref());
        let pipe_path = match address.pipe_path() {
            Some(path) => path,
            None => {
                return Err(TransportError::UnsupportedAddress {
                    address: address.to_string(),
                });
            }
        };

        let first = ServerOptions::new()
            .first_pipe_instance(true)
            .create(&pipe_path)
            .map_err(|source| TransportError::BindFailed {
                address: pipe_path.clone(),
                source,
            })?;

        debug!(pipe = %pipe_path, max_connections, "bound named pipe listener");

        Ok(Self {
            pipe_path,
            address,
            next: tokio::sync::Mutex::new(Some(first)),
            limiter: Arc::new(Semaphore::new(max_connections)),
        })
    }
}

#[async_trait::async_trait]
impl Listener for NamedPipeListener {
    async fn accept(&self) -> Result<BoxedStream, TransportError> {
        let permit = self
            .limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransportError::Closed)?;

        let server = match self.next.lock().await.take() {
            Some(instance) => instance,
            None => ServerOptions::new()
                .create(&self.pipe_path)
                .map_err(|source| TransportError::AcceptFailed { source })?,
        };

        server
            .connect()
            .await
            .map_err(|source| TransportError::AcceptFailed { source })?;

        // Keep an unconnected instance ready so the next client has
        // something to dial while this one is being handled.
        match ServerOptions::new().create(&self.pipe_path) {
            Ok(instance) => *self.next.lock().await = Some(instance),
            Err(error) => debug!(%error, "could not pre-create next pipe instance"),
        }

        Ok(Box::new(NamedPipeStream {
            pipe: PipeEnd::Server(server),
            _permit: Some(permit),
        }))
    }

    fn address(&self) -> &ServerAddress {
        &self.address
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.limiter.close();
        *self.next.lock().await = None;
        Ok(())
    }
}

enum PipeEnd {
    Server(NamedPipeServer),
    Client(NamedPipeClient),
}

/// One end of a connected named pipe.
pub struct NamedPipeStream {
    pipe: PipeEnd,
    _permit: Option<OwnedSemaphorePermit>,
}

impl NamedPipeStream {
    /// Connects to a server pipe by name.
    ///
    /// This is the instance side of the transport; the connected stream
    /// should immediately send an advertise message.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the pipe cannot be opened.
    pub async fn connect(name: impl AsRef<str>) -> io::Result<Self> {
        let address = ServerAddress::pipe(name.as_ref());
        let pipe_path = address
            .pipe_path()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "not a pipe address"))?;
        let client = ClientOptions::new().open(pipe_path)?;
        Ok(Self {
            pipe: PipeEnd::Client(client),
            _permit: None,
        })
    }
}

impl AsyncRead for NamedPipeStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.pipe {
            PipeEnd::Server(pipe) => Pin::new(pipe).poll_read(cx, buf),
            PipeEnd::Client(pipe) => Pin::new(pipe).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for NamedPipeStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.pipe {
            PipeEnd::Server(pipe) => Pin::new(pipe).poll_write(cx, buf),
            PipeEnd::Client(pipe) => Pin::new(pipe).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.pipe {
            PipeEnd::Server(pipe) => Pin::new(pipe).poll_flush(cx),
            PipeEnd::Client(pipe) => Pin::new(pipe).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.pipe {
            PipeEnd::Server(pipe) => Pin::new(pipe).poll_shutdown(cx),
            PipeEnd::Client(pipe) => Pin::new(pipe).poll_shutdown(cx),
        }
    }
}

impl InstanceStream for NamedPipeStream {
    /// Peeks the pipe without blocking or consuming.
    ///
    /// `PeekNamedPipe` fails once the pipe is disconnected or broken.
    #[allow(unsafe_code)]
    fn is_live(&self) -> bool {
        use std::os::windows::io::AsRawHandle;
        use windows_sys::Win32::System::Pipes::PeekNamedPipe;

        let handle = match &self.pipe {
            PipeEnd::Server(pipe) => pipe.as_raw_handle(),
            PipeEnd::Client(pipe) => pipe.as_raw_handle(),
        };

        // SAFETY: the handle is owned by `self` and remains valid for the
        // duration of the call; every out-parameter of PeekNamedPipe may be
        // null when no data and no counts are requested.
        let ok = unsafe {
            PeekNamedPipe(
                handle as _,
                std::ptr::null_mut(),
                0,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };
        ok != 0
    }
}

impl std::fmt::Debug for NamedPipeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let end = match &self.pipe {
            PipeEnd::Server(_) => "server",
            PipeEnd::Client(_) => "client",
        };
        f.debug_struct("NamedPipeStream").field("end", &end).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_accept_and_exchange() {
        let listener = NamedPipeListener::bind("revipc-test-exchange", 4).unwrap();

        let connect = tokio::spawn(NamedPipeStream::connect("revipc-test-exchange"));
        let mut accepted = listener.accept().await.unwrap();
        let mut client = connect.await.unwrap().unwrap();

        client.write_all(b"hello").await.unwrap();
        let mut buffer = [0u8; 5];
        accepted.read_exact(&mut buffer).await.unwrap();
        assert_eq!(&buffer, b"hello");
    }

    #[tokio::test]
    async fn test_liveness_probe_sees_peer_close() {
        let listener = NamedPipeListener::bind("revipc-test-live", 4).unwrap();

        let connect = tokio::spawn(NamedPipeStream::connect("revipc-test-live"));
        let accepted = listener.accept().await.unwrap();
        let client = connect.await.unwrap().unwrap();
        assert!(accepted.is_live());

        drop(client);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!accepted.is_live());
    }
}
