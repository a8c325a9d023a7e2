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

//! Instance identities and logical endpoints.
//!
//! A runtime instance may disconnect and reconnect many times over a
//! monitoring session. Every physical connection carries the instance's
//! stable [`InstanceId`], and all of them feed the same long-lived
//! [`InstanceEndpoint`], the handle through which callers obtain "the
//! current stream for this instance", however many reconnects have
//! happened.

use crate::rendezvous::{Rendezvous, RendezvousError, Verdict};
use crate::transport::{BoxedStream, InstanceStream};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// How long [`InstanceEndpoint::connect`] waits for a stream by default.
///
/// Generous on purpose: after a caller consumes the current stream, the
/// instance needs time to dial back in and advertise before the next stream
/// becomes available.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// The stable 128-bit identity a runtime instance advertises on every
/// physical connect.
///
/// Immutable for the lifetime of the logical instance and unique across
/// instances, which makes it the registry key. The OS process id is *not*
/// suitable for this; it can be reused over a long session.
///
/// # Examples
///
/// ```rust
/// use revipc::InstanceId;
///
/// let id = InstanceId::new();
/// let bytes = id.into_bytes();
/// assert_eq!(InstanceId::from_bytes(bytes), id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(Uuid);

impl InstanceId {
    /// Creates a new random identity.
    ///
    /// Instances generate one identity at startup and advertise it on every
    /// reconnect.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Reconstructs an identity from its wire bytes (RFC 4122 byte order).
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// The identity's wire bytes (RFC 4122 byte order).
    #[must_use]
    pub const fn into_bytes(self) -> [u8; 16] {
        *self.0.as_bytes()
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for InstanceId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct EndpointShared {
    instance_id: InstanceId,
    streams: Rendezvous<BoxedStream>,
}

/// The long-lived, identity-keyed handle to a runtime instance.
///
/// Created the first time an identity is seen (or lazily, when a caller
/// registers interest before the instance has connected) and destroyed only
/// by `remove_connection` or server teardown. Handles are cheap to clone;
/// all clones share the instance's private stream queue.
///
/// At most one unconsumed stream is cached per endpoint: a newly arriving
/// stream for the same identity supersedes and closes the previous one.
#[derive(Clone)]
pub struct InstanceEndpoint {
    shared: Arc<EndpointShared>,
}

impl InstanceEndpoint {
    pub(crate) fn new(instance_id: InstanceId) -> Self {
        Self {
            shared: Arc::new(EndpointShared {
                instance_id,
                streams: Rendezvous::new(),
            }),
        }
    }

    /// The identity this endpoint tracks.
    #[must_use]
    pub fn instance_id(&self) -> InstanceId {
        self.shared.instance_id
    }

    /// Takes ownership of the instance's current stream.
    ///
    /// Suspends until a stream is available (the instance may need to
    /// reconnect first) or `timeout` elapses. The returned stream is ready
    /// for command framing; ownership (and the duty to close it) passes to
    /// the caller.
    ///
    /// # Errors
    ///
    /// [`RendezvousError::Timeout`] if no stream arrives in time, or
    /// [`RendezvousError::Disposed`] once the endpoint has been removed or
    /// the server torn down.
    pub async fn connect(&self, timeout: Duration) -> Result<BoxedStream, RendezvousError> {
        self.shared.streams.wait_timeout(|_| Verdict::Claim, timeout).await
    }

    /// Waits until the instance has a live stream available.
    ///
    /// The stream is only observed, not consumed: it stays available for a
    /// subsequent [`connect`](Self::connect). A cached stream that fails
    /// its liveness probe is closed and discarded, since the previous
    /// physical connection can linger half-closed while a reconnect is in
    /// flight, and the wait continues until a probe succeeds.
    ///
    /// # Errors
    ///
    /// [`RendezvousError::Cancelled`] when `cancel` fires, or
    /// [`RendezvousError::Disposed`] on teardown.
    pub async fn wait_for_connection(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(), RendezvousError> {
        loop {
            let stream = self
                .shared
                .streams
                .wait_cancellable(|_| Verdict::Claim, cancel)
                .await?;

            // Probe outside the queue lock.
            if stream.is_live() {
                match self.shared.streams.restore(stream)? {
                    None => return Ok(()),
                    Some(stale) => {
                        // A newer stream arrived during the probe; this one
                        // is superseded. Close it and examine the new one.
                        drop(stale);
                        continue;
                    }
                }
            }

            debug!(
                instance = %self.shared.instance_id,
                "discarding dead stream, waiting for reconnect"
            );
            drop(stream);
        }
    }

    /// Hands a freshly advertised stream to this endpoint.
    ///
    /// Last-writer-wins: any previously cached, unconsumed stream is closed.
    pub(crate) fn provide_stream(&self, stream: BoxedStream) -> Result<(), RendezvousError> {
        let displaced = self.shared.streams.supersede(stream)?;
        if !displaced.is_empty() {
            debug!(
                instance = %self.shared.instance_id,
                count = displaced.len(),
                "superseding cached stream"
            );
        }
        drop(displaced);
        Ok(())
    }

    /// Settles all waiters with a disposed error and closes any cached
    /// stream.
    pub(crate) fn dispose(&self) {
        self.shared.streams.dispose();
    }

    #[cfg(test)]
    fn cached_streams(&self) -> usize {
        self.shared.streams.len()
    }
}

impl fmt::Debug for InstanceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceEndpoint")
            .field("instance_id", &self.shared.instance_id)
            .field("streams", &self.shared.streams)
            .finish()
    }
}

/// What [`accept`](crate::ReversedServer::accept) returns for a newly seen
/// instance: its endpoint plus the identity and process id it advertised.
///
/// Produced exactly once per identity (until the identity is removed), no
/// matter how many times the instance reconnects. Hold on to it and keep
/// using the endpoint across reconnects. The process id is the one reported
/// at first sighting.
#[derive(Clone)]
pub struct EndpointInfo {
    endpoint: InstanceEndpoint,
    instance_id: InstanceId,
    process_id: u64,
}

impl EndpointInfo {
    pub(crate) fn new(endpoint: InstanceEndpoint, instance_id: InstanceId, process_id: u64) -> Self {
        Self {
            endpoint,
            instance_id,
            process_id,
        }
    }

    /// The logical endpoint for this instance.
    #[must_use]
    pub fn endpoint(&self) -> &InstanceEndpoint {
        &self.endpoint
    }

    /// The instance's stable identity.
    #[must_use]
    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// The OS process id the instance reported. Informational only.
    #[must_use]
    pub fn process_id(&self) -> u64 {
        self.process_id
    }
}

impl fmt::Debug for EndpointInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointInfo")
            .field("instance_id", &self.instance_id)
            .field("process_id", &self.process_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryStream;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn boxed(stream: MemoryStream) -> BoxedStream {
        Box::new(stream)
    }

    #[tokio::test]
    async fn test_connect_returns_provided_stream() {
        let endpoint = InstanceEndpoint::new(InstanceId::new());
        let (client, server) = MemoryStream::pair();

        endpoint.provide_stream(boxed(server)).unwrap();
        let mut stream = endpoint.connect(Duration::from_secs(1)).await.unwrap();

        let mut client = client;
        client.write_all(b"abc").await.unwrap();
        let mut buffer = [0u8; 3];
        stream.read_exact(&mut buffer).await.unwrap();
        assert_eq!(&buffer, b"abc");
    }

    #[tokio::test]
    async fn test_connect_times_out_without_stream() {
        let endpoint = InstanceEndpoint::new(InstanceId::new());
        let error = endpoint.connect(Duration::from_millis(20)).await.unwrap_err();
        assert!(error.is_timeout());
    }

    #[tokio::test]
    async fn test_new_stream_supersedes_cached_one() {
        let endpoint = InstanceEndpoint::new(InstanceId::new());

        let (client1, server1) = MemoryStream::pair();
        let (client2, server2) = MemoryStream::pair();

        endpoint.provide_stream(boxed(server1)).unwrap();
        endpoint.provide_stream(boxed(server2)).unwrap();

        // The first stream was closed by the replacement.
        assert!(!client1.is_live());
        assert!(client2.is_live());
        assert_eq!(endpoint.cached_streams(), 1);

        // Only the second stream is obtainable.
        let stream = endpoint.connect(Duration::from_secs(1)).await.unwrap();
        assert!(stream.is_live());
        drop(stream);
        assert!(!client2.is_live());
    }

    #[tokio::test]
    async fn test_wait_for_connection_peeks_without_consuming() {
        let endpoint = InstanceEndpoint::new(InstanceId::new());
        let (_client, server) = MemoryStream::pair();
        endpoint.provide_stream(boxed(server)).unwrap();

        let cancel = CancellationToken::new();
        endpoint.wait_for_connection(&cancel).await.unwrap();

        // The live stream is still there for connect.
        assert_eq!(endpoint.cached_streams(), 1);
        assert!(endpoint.connect(Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_connection_discards_dead_stream() {
        let endpoint = InstanceEndpoint::new(InstanceId::new());

        let (client1, server1) = MemoryStream::pair();
        client1.close();
        endpoint.provide_stream(boxed(server1)).unwrap();

        let waiter = {
            let endpoint = endpoint.clone();
            tokio::spawn(async move {
                endpoint.wait_for_connection(&CancellationToken::new()).await
            })
        };

        // The dead stream is discarded; the wait keeps going until a live
        // stream arrives.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        let (_client2, server2) = MemoryStream::pair();
        endpoint.provide_stream(boxed(server2)).unwrap();

        waiter.await.unwrap().unwrap();
        assert_eq!(endpoint.cached_streams(), 1);
    }

    #[tokio::test]
    async fn test_wait_for_connection_cancellable() {
        let endpoint = InstanceEndpoint::new(InstanceId::new());
        let cancel = CancellationToken::new();

        let waiter = {
            let endpoint = endpoint.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { endpoint.wait_for_connection(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let error = waiter.await.unwrap().unwrap_err();
        assert!(error.is_cancelled());
    }

    #[tokio::test]
    async fn test_dispose_settles_connect_waiters_and_closes_stream() {
        let endpoint = InstanceEndpoint::new(InstanceId::new());
        let (client, server) = MemoryStream::pair();
        endpoint.provide_stream(boxed(server)).unwrap();

        let waiter = {
            let endpoint = endpoint.clone();
            tokio::spawn(async move {
                // Skip the cached stream so the waiter actually suspends.
                endpoint
                    .shared
                    .streams
                    .wait(|_| Verdict::Skip)
                    .await
            })
        };
        tokio::task::yield_now().await;

        endpoint.dispose();

        assert!(waiter.await.unwrap().unwrap_err().is_disposed());
        assert!(!client.is_live());
        assert!(
            endpoint
                .connect(Duration::from_millis(10))
                .await
                .unwrap_err()
                .is_disposed()
        );
    }

    #[test]
    fn test_instance_id_roundtrip() {
        let id = InstanceId::new();
        assert_eq!(InstanceId::from_bytes(id.into_bytes()), id);
        assert_ne!(InstanceId::new(), InstanceId::new());
    }
}
