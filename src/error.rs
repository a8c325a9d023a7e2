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

//! Top-level error type for the server API.
//!
//! The crate keeps three error layers, each owned by the module that
//! produces it:
//!
//! 1. **Transport**: listener and stream failures ([`TransportError`])
//! 2. **Rendezvous**: wait outcomes: timeout, cancellation, disposal
//!    ([`RendezvousError`])
//! 3. **Usage**: calling the server outside its lifecycle
//!
//! [`RevipcError`] composes them for the public [`ReversedServer`]
//! operations. Failures local to a single physical connection (a malformed
//! advertise, an accept hiccup) are absorbed by the listen loop and never
//! appear here.
//!
//! [`ReversedServer`]: crate::ReversedServer

use crate::rendezvous::RendezvousError;
use crate::transport::TransportError;
use thiserror::Error;

/// Errors returned by [`ReversedServer`](crate::ReversedServer) operations.
///
/// # Examples
///
/// ```rust
/// use revipc::{RendezvousError, RevipcError};
///
/// let error = RevipcError::from(RendezvousError::Cancelled);
/// assert!(error.is_cancelled());
/// assert!(!error.is_timeout());
///
/// assert!(RevipcError::NotStarted.is_usage());
/// ```
#[derive(Debug, Error)]
pub enum RevipcError {
    /// An operation was called before `start`.
    #[error("server has not been started")]
    NotStarted,

    /// `start` was called a second time.
    #[error("server is already started")]
    AlreadyStarted,

    /// The server has been shut down; all pending and future operations
    /// receive this uniformly.
    #[error("server has been disposed")]
    Disposed,

    /// The transport layer failed, usually while binding the listener.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A wait outcome: timeout, cancellation, or disposal of the structure
    /// the operation was waiting on.
    #[error(transparent)]
    Rendezvous(#[from] RendezvousError),
}

impl RevipcError {
    /// Returns `true` if the operation timed out.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Rendezvous(RendezvousError::Timeout { .. }))
    }

    /// Returns `true` if the caller's cancellation signal fired.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Rendezvous(RendezvousError::Cancelled))
    }

    /// Returns `true` if the server (or the structure waited on) has been
    /// disposed.
    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        matches!(
            self,
            Self::Disposed | Self::Rendezvous(RendezvousError::Disposed)
        )
    }

    /// Returns `true` for lifecycle misuse: operating before `start` or
    /// starting twice.
    #[must_use]
    pub const fn is_usage(&self) -> bool {
        matches!(self, Self::NotStarted | Self::AlreadyStarted)
    }
}
