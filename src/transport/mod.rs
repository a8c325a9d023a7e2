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

//! Transport layer: the listener adapter and the raw stream abstraction.
//!
//! The server core never touches OS transport primitives directly. It
//! depends on two seams defined here:
//!
//! - [`InstanceStream`]: a bidirectional, ordered byte channel with a
//!   non-destructive liveness probe. Dropping a stream closes it; a stream
//!   has exactly one owner at a time.
//! - [`Listener`]: accepts raw streams from the OS transport, bounded by a
//!   maximum number of concurrently outstanding connections so instances
//!   that connect but never advertise cannot exhaust the server.
//!
//! Three listeners are provided: [`UnixSocketListener`] (Unix domain
//! sockets), `NamedPipeListener` (Windows named pipes), and
//! [`MemoryListener`] (in-process, for tests). [`bind`] picks the right one
//! for a [`ServerAddress`].

mod address;
mod error;
pub mod memory;

#[cfg(unix)]
pub mod unix;

#[cfg(windows)]
pub mod windows;

pub use address::ServerAddress;
pub use error::TransportError;
pub use memory::{MemoryConnector, MemoryListener, MemoryStream};

#[cfg(unix)]
pub use unix::{UnixSocketListener, UnixSocketStream};

#[cfg(windows)]
pub use windows::{NamedPipeListener, NamedPipeStream};

use tokio::io::{AsyncRead, AsyncWrite};

/// A raw bidirectional byte stream between the server and one physical
/// connection of a runtime instance.
///
/// Beyond ordinary async I/O, a stream can report whether its remote end
/// still appears connected. The probe must be non-destructive and
/// non-blocking: a zero-byte send or a peek, never a read that consumes
/// data. Probe failures are a signal, not an error; a reconnect may be in
/// flight, with the replacement stream about to arrive.
///
/// Dropping a stream closes it. Whichever side owns the stream last is
/// responsible for that close; streams are never shared between two owners.
pub trait InstanceStream: AsyncRead + AsyncWrite + Send + Unpin {
    /// Returns `true` if the remote end still appears connected.
    fn is_live(&self) -> bool;
}

impl core::fmt::Debug for dyn InstanceStream {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InstanceStream")
            .field("is_live", &self.is_live())
            .finish()
    }
}

/// An owned raw stream, as handed between the listener, the per-instance
/// queues, and callers of `connect`.
pub type BoxedStream = Box<dyn InstanceStream>;

impl InstanceStream for BoxedStream {
    fn is_live(&self) -> bool {
        (**self).is_live()
    }
}

/// Accepts raw byte-stream connections from the OS transport.
///
/// Implementations are bounded: each accepted stream holds a permit from a
/// `max_connections`-sized pool for its lifetime, capping the resources a
/// flood of silent connections can pin.
#[async_trait::async_trait]
pub trait Listener: Send + Sync {
    /// Accepts the next incoming connection.
    ///
    /// Suspends until a connection arrives and a permit is available.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] after [`shutdown`](Self::shutdown),
    /// or [`TransportError::AcceptFailed`] on a transient accept failure,
    /// which the listen loop treats as retryable.
    async fn accept(&self) -> Result<BoxedStream, TransportError>;

    /// The address this listener is bound to.
    fn address(&self) -> &ServerAddress;

    /// Stops accepting and releases the transport endpoint.
    ///
    /// For socket listeners this unlinks the socket file.
    ///
    /// # Errors
    ///
    /// Returns an error if releasing the endpoint fails; the listener is
    /// unusable either way.
    async fn shutdown(&self) -> Result<(), TransportError>;
}

impl core::fmt::Debug for dyn Listener {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Listener")
            .field("address", self.address())
            .finish()
    }
}

/// Binds a listener for `address`, dispatching on the address kind.
///
/// # Errors
///
/// Returns [`TransportError::UnsupportedAddress`] if the address kind does
/// not exist on this platform (a pipe name on Unix, a socket path on
/// Windows), or [`TransportError::BindFailed`] if the endpoint cannot be
/// created.
pub fn bind(
    address: ServerAddress,
    max_connections: usize,
) -> Result<Box<dyn Listener>, TransportError> {
    match address {
        #[cfg(unix)]
        ServerAddress::Path(path) => Ok(Box::new(unix::UnixSocketListener::bind(
            path,
            max_connections,
        )?)),
        #[cfg(windows)]
        ServerAddress::Pipe(name) => Ok(Box::new(windows::NamedPipeListener::bind(
            name,
            max_connections,
        )?)),
        other => Err(TransportError::UnsupportedAddress {
            address: other.to_string(),
        }),
    }
}
