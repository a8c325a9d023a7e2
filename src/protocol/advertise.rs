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

//! The advertise handshake message.

use crate::endpoint::InstanceId;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Magic marker opening every advertise message: protocol family `ADVR_V`
/// followed by the version text `1\0`.
pub const ADVERTISE_MAGIC: [u8; 8] = *b"ADVR_V1\0";

/// Total size of an advertise message on the wire. There is no length
/// prefix; both sides know the fixed layout.
pub const ADVERTISE_SIZE: usize = 34;

/// Bound on parsing the advertise data after a connect.
///
/// A misbehaving or exiting instance may open the transport and never finish
/// the handshake; without this bound the accept loop would stall forever on
/// a single half-written message.
pub const PARSE_TIMEOUT: Duration = Duration::from_secs(1);

const FAMILY_LEN: usize = 6;

/// The fixed-layout handshake a runtime instance sends immediately after
/// each physical connect.
///
/// Layout (34 bytes, no length prefix):
///
/// | offset | size | field |
/// |--------|------|-------|
/// | 0      | 8    | magic marker `ADVR_V1\0` |
/// | 8      | 16   | instance identity, RFC 4122 byte order |
/// | 24     | 8    | process id, little-endian |
/// | 32     | 2    | reserved, written as zero |
///
/// # Examples
///
/// ```rust
/// use revipc::{Advertise, InstanceId};
///
/// let advertise = Advertise::new(InstanceId::new(), 4242);
/// let bytes = advertise.to_bytes();
/// let parsed = Advertise::from_bytes(&bytes).unwrap();
/// assert_eq!(parsed, advertise);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advertise {
    instance_id: InstanceId,
    process_id: u64,
}

impl Advertise {
    /// Creates an advertise message for the given identity and process id.
    #[must_use]
    pub const fn new(instance_id: InstanceId, process_id: u64) -> Self {
        Self {
            instance_id,
            process_id,
        }
    }

    /// The instance identity carried by this message.
    ///
    /// Stable across reconnects of the same logical instance; this is the
    /// registry key.
    #[must_use]
    pub const fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// The OS process id reported by the instance.
    ///
    /// Informational only: the OS may reuse process ids over a long
    /// monitoring session, so this is never used as a key.
    #[must_use]
    pub const fn process_id(&self) -> u64 {
        self.process_id
    }

    /// Serializes the message into its wire layout.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; ADVERTISE_SIZE] {
        let mut bytes = [0u8; ADVERTISE_SIZE];
        bytes[0..8].copy_from_slice(&ADVERTISE_MAGIC);
        bytes[8..24].copy_from_slice(&self.instance_id.into_bytes());
        bytes[24..32].copy_from_slice(&self.process_id.to_le_bytes());
        // bytes[32..34] reserved, zero.
        bytes
    }

    /// Deserializes a message from its wire layout.
    ///
    /// # Errors
    ///
    /// Returns [`AdvertiseError::BadMagic`] if the protocol family marker
    /// does not match, or [`AdvertiseError::UnsupportedVersion`] if the
    /// family matches but the version text is unknown.
    pub fn from_bytes(bytes: &[u8; ADVERTISE_SIZE]) -> Result<Self, AdvertiseError> {
        if bytes[0..FAMILY_LEN] != ADVERTISE_MAGIC[0..FAMILY_LEN] {
            return Err(AdvertiseError::BadMagic);
        }
        if bytes[FAMILY_LEN..8] != ADVERTISE_MAGIC[FAMILY_LEN..8] {
            return Err(AdvertiseError::UnsupportedVersion {
                version: [bytes[FAMILY_LEN], bytes[FAMILY_LEN + 1]],
            });
        }

        let mut id = [0u8; 16];
        id.copy_from_slice(&bytes[8..24]);

        let mut pid = [0u8; 8];
        pid.copy_from_slice(&bytes[24..32]);

        // Reserved bytes are accepted as anything so future writers can use
        // them without breaking old servers.
        Ok(Self {
            instance_id: InstanceId::from_bytes(id),
            process_id: u64::from_le_bytes(pid),
        })
    }

    /// Reads and validates an advertise message, bounded by `timeout`.
    ///
    /// This is the server side of the handshake, called once per accepted
    /// connection. On any failure the caller drops the stream and keeps
    /// listening.
    ///
    /// # Errors
    ///
    /// - [`AdvertiseError::Timeout`] if the full message does not arrive
    ///   within the bound,
    /// - [`AdvertiseError::Truncated`] if the stream closes short,
    /// - [`AdvertiseError::BadMagic`] / [`AdvertiseError::UnsupportedVersion`]
    ///   on a format mismatch,
    /// - [`AdvertiseError::Io`] on a read failure.
    pub async fn parse<S>(stream: &mut S, timeout: Duration) -> Result<Self, AdvertiseError>
    where
        S: AsyncRead + Unpin,
    {
        match tokio::time::timeout(timeout, Self::read_from(stream)).await {
            Ok(result) => result,
            Err(_) => Err(AdvertiseError::Timeout { duration: timeout }),
        }
    }

    /// Reads and validates an advertise message without a time bound.
    ///
    /// # Errors
    ///
    /// As [`parse`](Self::parse), minus the timeout.
    pub async fn read_from<S>(stream: &mut S) -> Result<Self, AdvertiseError>
    where
        S: AsyncRead + Unpin,
    {
        let mut bytes = [0u8; ADVERTISE_SIZE];
        let mut read = 0;
        while read < ADVERTISE_SIZE {
            let n = stream
                .read(&mut bytes[read..])
                .await
                .map_err(|source| AdvertiseError::Io { source })?;
            if n == 0 {
                return Err(AdvertiseError::Truncated { read });
            }
            read += n;
        }
        Self::from_bytes(&bytes)
    }

    /// Writes the message to a stream and flushes it.
    ///
    /// This is the instance side of the handshake, sent once per physical
    /// connect before any command traffic.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the write or flush fails.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use revipc::transport::MemoryStream;
    /// use revipc::{Advertise, InstanceId};
    ///
    /// # async fn example() -> std::io::Result<()> {
    /// let (mut stream, _server_half) = MemoryStream::pair();
    /// let advertise = Advertise::new(InstanceId::new(), std::process::id() as u64);
    /// advertise.write_to(&mut stream).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn write_to<S>(&self, stream: &mut S) -> io::Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        stream.write_all(&self.to_bytes()).await?;
        stream.flush().await
    }
}

/// Errors produced while parsing an advertise message.
///
/// All of these are transient, per-connection failures: the listen loop logs
/// them, drops the offending stream, and keeps accepting.
#[derive(Debug, Error)]
pub enum AdvertiseError {
    /// The protocol family marker did not match.
    #[error("bad magic marker in advertise message")]
    BadMagic,

    /// The family matched but the version is not one this server speaks.
    #[error("unsupported advertise version {version:?}")]
    UnsupportedVersion {
        /// The version bytes that were received.
        version: [u8; 2],
    },

    /// The stream closed before the fixed-size message was fully read.
    #[error("stream closed after {read} bytes of the advertise message")]
    Truncated {
        /// How many bytes had been read when the stream closed.
        read: usize,
    },

    /// The full message did not arrive within the parse bound.
    #[error("advertise message not received within {duration:?}")]
    Timeout {
        /// The bound that was exceeded.
        duration: Duration,
    },

    /// Reading from the stream failed.
    #[error("failed to read advertise message: {source}")]
    Io {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let advertise = Advertise::new(InstanceId::new(), 0x1234_5678_9abc_def0);
        let parsed = Advertise::from_bytes(&advertise.to_bytes()).unwrap();
        assert_eq!(parsed, advertise);
    }

    #[test]
    fn test_layout() {
        let id = InstanceId::new();
        let advertise = Advertise::new(id, 99);
        let bytes = advertise.to_bytes();

        assert_eq!(&bytes[0..8], b"ADVR_V1\0");
        assert_eq!(&bytes[8..24], &id.into_bytes());
        assert_eq!(&bytes[24..32], &99u64.to_le_bytes());
        assert_eq!(&bytes[32..34], &[0, 0]);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = Advertise::new(InstanceId::new(), 1).to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            Advertise::from_bytes(&bytes),
            Err(AdvertiseError::BadMagic)
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = Advertise::new(InstanceId::new(), 1).to_bytes();
        bytes[6] = b'9';
        assert!(matches!(
            Advertise::from_bytes(&bytes),
            Err(AdvertiseError::UnsupportedVersion { version: [b'9', 0] })
        ));
    }

    #[test]
    fn test_reserved_bytes_ignored() {
        let mut bytes = Advertise::new(InstanceId::new(), 1).to_bytes();
        bytes[32] = 0xaa;
        bytes[33] = 0x55;
        assert!(Advertise::from_bytes(&bytes).is_ok());
    }

    #[tokio::test]
    async fn test_write_then_parse() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let advertise = Advertise::new(InstanceId::new(), 7);

        advertise.write_to(&mut client).await.unwrap();
        let parsed = Advertise::parse(&mut server, PARSE_TIMEOUT).await.unwrap();
        assert_eq!(parsed, advertise);
    }

    #[tokio::test]
    async fn test_parse_truncated_stream() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let bytes = Advertise::new(InstanceId::new(), 7).to_bytes();

        client.write_all(&bytes[..10]).await.unwrap();
        drop(client);

        let error = Advertise::parse(&mut server, PARSE_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(error, AdvertiseError::Truncated { read: 10 }));
    }

    #[tokio::test]
    async fn test_parse_times_out_on_stalled_stream() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let bytes = Advertise::new(InstanceId::new(), 7).to_bytes();

        // Write a partial message and keep the stream open.
        client.write_all(&bytes[..10]).await.unwrap();

        let error = Advertise::parse(&mut server, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(error, AdvertiseError::Timeout { .. }));
    }
}
