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

//! The reversed-connection server.
//!
//! [`ReversedServer`] owns the listen loop and wires the transport listener,
//! the advertise codec, and the connection registry together. Runtime
//! instances connect *inward* to the server's well-known address, advertise
//! their identity, and are tracked as logical connections across any number
//! of physical reconnects.
//!
//! # Lifecycle
//!
//! A server is in one of two states: **not started** or **listening**
//! (terminal until disposed). [`start`](ReversedServer::start) may succeed
//! exactly once; every accept/connect operation before it is a usage error,
//! and everything after [`shutdown`](ReversedServer::shutdown) fails with a
//! disposed error.
//!
//! The listen loop is an explicit task owned by the server: started once,
//! cancelled and joined at shutdown, with no ambient state. Any
//! per-connection failure (a handshake that never completes, a transport
//! hiccup) is absorbed by the loop: a single bad actor never stops the
//! server from accepting the next connection.

mod registry;

use crate::endpoint::{EndpointInfo, InstanceId};
use crate::error::RevipcError;
use crate::protocol::{Advertise, PARSE_TIMEOUT};
use crate::rendezvous::{Rendezvous, Verdict};
use crate::transport::{self, BoxedStream, Listener, ServerAddress, TransportError};
use parking_lot::Mutex;
use registry::ConnectionRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default bound on concurrently outstanding, not-yet-claimed connections.
///
/// Matches the named pipe instance ceiling, the tightest of the transports'
/// own limits.
pub const DEFAULT_MAX_CONNECTIONS: usize = 255;

/// Server endpoint that runtime instances connect to in reverse mode.
///
/// # Examples
///
/// ```rust,no_run
/// use revipc::{DEFAULT_MAX_CONNECTIONS, ReversedServer};
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let server = ReversedServer::new("/tmp/monitor.sock");
/// server.start(DEFAULT_MAX_CONNECTIONS)?;
///
/// // Accept must be pumped continuously: it yields each *new* instance
/// // identity exactly once, while reconnects refresh existing endpoints
/// // behind the scenes.
/// let cancel = CancellationToken::new();
/// let info = server.accept(&cancel).await?;
///
/// let stream = server
///     .connect(info.instance_id(), Duration::from_secs(30))
///     .await?;
/// # drop(stream);
///
/// server.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct ReversedServer {
    shared: Arc<ServerShared>,
}

struct ServerShared {
    address: ServerAddress,
    registry: ConnectionRegistry,
    notifications: Rendezvous<EndpointInfo>,
    shutdown: CancellationToken,
    lifecycle: Mutex<Lifecycle>,
}

enum Lifecycle {
    NotStarted,
    Listening { listen_task: JoinHandle<()> },
    Disposed,
}

impl ReversedServer {
    /// Creates a server for the given transport address.
    ///
    /// No I/O happens here; the address is bound by
    /// [`start`](Self::start).
    pub fn new(address: impl Into<ServerAddress>) -> Self {
        Self {
            shared: Arc::new(ServerShared {
                address: address.into(),
                registry: ConnectionRegistry::new(),
                notifications: Rendezvous::new(),
                shutdown: CancellationToken::new(),
                lifecycle: Mutex::new(Lifecycle::NotStarted),
            }),
        }
    }

    /// The address this server listens at.
    #[must_use]
    pub fn address(&self) -> &ServerAddress {
        &self.shared.address
    }

    /// Binds the listener and starts the listen loop.
    ///
    /// `max_connections` bounds how many accepted connections may be
    /// outstanding at once. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`RevipcError::AlreadyStarted`] on a second call,
    /// [`RevipcError::Disposed`] after shutdown, or a
    /// [`TransportError`] if the address cannot be bound.
    pub fn start(&self, max_connections: usize) -> Result<(), RevipcError> {
        let mut lifecycle = self.shared.lifecycle.lock();
        check_not_started(&lifecycle)?;
        let listener = transport::bind(self.shared.address.clone(), max_connections)?;
        info!(address = %self.shared.address, max_connections, "reversed server listening");
        *lifecycle = Lifecycle::Listening {
            listen_task: tokio::spawn(listen_loop(self.shared.clone(), listener)),
        };
        Ok(())
    }

    /// Starts the listen loop over an explicit listener.
    ///
    /// Useful for custom transports and for in-process testing with
    /// [`MemoryListener`](crate::transport::MemoryListener). Subject to the
    /// same start-once rule as [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// [`RevipcError::AlreadyStarted`] on a second start, or
    /// [`RevipcError::Disposed`] after shutdown.
    pub fn start_with(&self, listener: Box<dyn Listener>) -> Result<(), RevipcError> {
        let mut lifecycle = self.shared.lifecycle.lock();
        check_not_started(&lifecycle)?;
        info!(address = %listener.address(), "reversed server listening");
        *lifecycle = Lifecycle::Listening {
            listen_task: tokio::spawn(listen_loop(self.shared.clone(), listener)),
        };
        Ok(())
    }

    /// Yields endpoint information when a *new* runtime instance connects.
    ///
    /// Only the first connection of an identity produces a result here;
    /// reconnects refresh the identity's endpoint without a notification.
    /// Keep calling `accept` in a loop to let the server process
    /// reconnects, even if only one instance is expected. After
    /// [`remove_connection`](Self::remove_connection), the same identity
    /// advertising again yields a fresh result.
    ///
    /// # Errors
    ///
    /// [`RevipcError::NotStarted`] before `start`, a cancelled outcome when
    /// `cancel` fires, or a disposed error after shutdown.
    pub async fn accept(&self, cancel: &CancellationToken) -> Result<EndpointInfo, RevipcError> {
        self.ensure_listening()?;
        let info = self
            .shared
            .notifications
            .wait_cancellable(|_| Verdict::Claim, cancel)
            .await?;
        Ok(info)
    }

    /// Takes ownership of the current stream for `instance_id`.
    ///
    /// The identity's queue is created lazily, so this may be called before
    /// the instance has ever connected; the call then waits for its first
    /// advertise.
    ///
    /// # Errors
    ///
    /// [`RevipcError::NotStarted`] before `start`, a timeout if no stream
    /// arrives within `timeout`, or a disposed error after removal or
    /// shutdown.
    pub async fn connect(
        &self,
        instance_id: InstanceId,
        timeout: Duration,
    ) -> Result<BoxedStream, RevipcError> {
        self.ensure_listening()?;
        let endpoint = self.shared.registry.endpoint_for(instance_id);
        Ok(endpoint.connect(timeout).await?)
    }

    /// Waits until `instance_id` has a live stream available, without
    /// consuming it.
    ///
    /// # Errors
    ///
    /// [`RevipcError::NotStarted`] before `start`, a cancelled outcome when
    /// `cancel` fires, or a disposed error after removal or shutdown.
    pub async fn wait_for_connection(
        &self,
        instance_id: InstanceId,
        cancel: &CancellationToken,
    ) -> Result<(), RevipcError> {
        self.ensure_listening()?;
        let endpoint = self.shared.registry.endpoint_for(instance_id);
        Ok(endpoint.wait_for_connection(cancel).await?)
    }

    /// Stops tracking an identity.
    ///
    /// Its endpoint is disposed: cached streams are closed and outstanding
    /// waiters settle with a disposed error. Returns whether the identity
    /// was known. A subsequent advertise of the same identity is treated as
    /// brand-new and re-arms the one-time [`accept`](Self::accept)
    /// notification.
    ///
    /// # Errors
    ///
    /// [`RevipcError::NotStarted`] before `start`, or a disposed error
    /// after shutdown.
    pub fn remove_connection(&self, instance_id: InstanceId) -> Result<bool, RevipcError> {
        self.ensure_listening()?;
        let (was_known, endpoint) = self.shared.registry.remove(instance_id);
        if let Some(endpoint) = endpoint {
            endpoint.dispose();
        }
        if was_known {
            debug!(instance = %instance_id, "connection removed");
        }
        Ok(was_known)
    }

    /// Tears the server down.
    ///
    /// Cancels the listen loop and awaits its exit, then disposes the
    /// notification queue and every per-identity endpoint, closing all
    /// cached streams and settling every outstanding waiter with a disposed
    /// error. No stream or waiter is silently dropped. Idempotent.
    pub async fn shutdown(&self) {
        let listen_task = {
            let mut lifecycle = self.shared.lifecycle.lock();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Disposed) {
                Lifecycle::Listening { listen_task } => Some(listen_task),
                Lifecycle::NotStarted | Lifecycle::Disposed => None,
            }
        };

        self.shared.shutdown.cancel();

        if let Some(task) = listen_task {
            if let Err(error) = task.await {
                debug!(%error, "listen task ended abnormally");
            }
        }

        self.shared.notifications.dispose();
        for endpoint in self.shared.registry.drain() {
            endpoint.dispose();
        }
        info!("reversed server shut down");
    }

    fn ensure_listening(&self) -> Result<(), RevipcError> {
        match &*self.shared.lifecycle.lock() {
            Lifecycle::NotStarted => Err(RevipcError::NotStarted),
            Lifecycle::Listening { .. } => Ok(()),
            Lifecycle::Disposed => Err(RevipcError::Disposed),
        }
    }
}

impl Drop for ReversedServer {
    fn drop(&mut self) {
        // Stops the listen loop if shutdown() was never called.
        self.shared.shutdown.cancel();
    }
}

impl std::fmt::Debug for ReversedServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReversedServer")
            .field("address", &self.shared.address)
            .finish()
    }
}

fn check_not_started(lifecycle: &Lifecycle) -> Result<(), RevipcError> {
    match lifecycle {
        Lifecycle::NotStarted => Ok(()),
        Lifecycle::Listening { .. } => Err(RevipcError::AlreadyStarted),
        Lifecycle::Disposed => Err(RevipcError::Disposed),
    }
}

/// The accept loop: accept → parse advertise → registry update, looping
/// unconditionally on per-connection failures until shutdown.
async fn listen_loop(shared: Arc<ServerShared>, listener: Box<dyn Listener>) {
    debug!(address = %listener.address(), "listen loop running");
    loop {
        let accepted = tokio::select! {
            () = shared.shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        let mut stream = match accepted {
            Ok(stream) => stream,
            Err(TransportError::Closed) => break,
            Err(error) => {
                warn!(%error, "transport accept failed");
                continue;
            }
        };

        let advertise = tokio::select! {
            () = shared.shutdown.cancelled() => break,
            parsed = Advertise::parse(&mut stream, PARSE_TIMEOUT) => parsed,
        };

        let advertise = match advertise {
            Ok(advertise) => advertise,
            Err(error) => {
                // An instance may exit mid-handshake, or write garbage.
                // Drop the stream and keep listening.
                debug!(%error, "dropping connection with bad advertise");
                continue;
            }
        };

        debug!(
            instance = %advertise.instance_id(),
            pid = advertise.process_id(),
            "instance advertised"
        );

        let (endpoint, notification) = shared.registry.observe_advertise(&advertise);
        if endpoint.provide_stream(stream).is_err() {
            // The endpoint was removed between lookup and handoff.
            continue;
        }
        if let Some(info) = notification {
            if shared.notifications.add(info).is_err() {
                break;
            }
        }
    }

    if let Err(error) = listener.shutdown().await {
        debug!(%error, "listener shutdown failed");
    }
    debug!("listen loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryConnector, MemoryListener, MemoryStream};

    fn memory_server() -> (ReversedServer, MemoryConnector) {
        let (listener, connector) = MemoryListener::new(DEFAULT_MAX_CONNECTIONS);
        let server = ReversedServer::new(ServerAddress::pipe("test"));
        server.start_with(Box::new(listener)).unwrap();
        (server, connector)
    }

    async fn advertise_instance(
        connector: &MemoryConnector,
        instance_id: InstanceId,
        pid: u64,
    ) -> MemoryStream {
        let mut stream = connector.connect().await.unwrap();
        Advertise::new(instance_id, pid)
            .write_to(&mut stream)
            .await
            .unwrap();
        stream
    }

    #[tokio::test]
    async fn test_operations_require_start() {
        let server = ReversedServer::new(ServerAddress::pipe("test"));
        let cancel = CancellationToken::new();

        assert!(server.accept(&cancel).await.unwrap_err().is_usage());
        assert!(
            server
                .connect(InstanceId::new(), Duration::from_millis(10))
                .await
                .unwrap_err()
                .is_usage()
        );
        assert!(server.remove_connection(InstanceId::new()).unwrap_err().is_usage());
    }

    #[tokio::test]
    async fn test_start_twice_is_a_usage_error() {
        let (server, _connector) = memory_server();
        let (listener, _) = MemoryListener::new(4);
        let error = server.start_with(Box::new(listener)).unwrap_err();
        assert!(matches!(error, RevipcError::AlreadyStarted));
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_accept_yields_new_instance() {
        let (server, connector) = memory_server();
        let instance_id = InstanceId::new();

        let _client = advertise_instance(&connector, instance_id, 1234).await;

        let cancel = CancellationToken::new();
        let info = server.accept(&cancel).await.unwrap();
        assert_eq!(info.instance_id(), instance_id);
        assert_eq!(info.process_id(), 1234);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_operations_after_shutdown_are_disposed() {
        let (server, _connector) = memory_server();
        server.shutdown().await;

        let cancel = CancellationToken::new();
        assert!(server.accept(&cancel).await.unwrap_err().is_disposed());
        assert!(
            server
                .connect(InstanceId::new(), Duration::from_millis(10))
                .await
                .unwrap_err()
                .is_disposed()
        );
        assert!(
            server
                .remove_connection(InstanceId::new())
                .unwrap_err()
                .is_disposed()
        );
        assert!(server.start(4).unwrap_err().is_disposed());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let (server, _connector) = memory_server();
        server.shutdown().await;
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_settles_pending_accept() {
        let (server, _connector) = memory_server();
        let server = Arc::new(server);

        let accepting = {
            let server = server.clone();
            tokio::spawn(async move {
                let cancel = CancellationToken::new();
                server.accept(&cancel).await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        server.shutdown().await;
        assert!(accepting.await.unwrap().unwrap_err().is_disposed());
    }
}
