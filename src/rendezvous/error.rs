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

//! Error types for the rendezvous layer.

use std::time::Duration;
use thiserror::Error;

/// Errors produced by operations on a [`Rendezvous`](crate::rendezvous::Rendezvous)
/// collection.
///
/// The three variants are deliberately distinct and are never conflated:
/// a timeout is attributable to the duration passed by the caller, a
/// cancellation to the caller's own token, and disposal to the teardown of
/// the collection itself.
///
/// # Examples
///
/// ```rust
/// use revipc::rendezvous::RendezvousError;
/// use std::time::Duration;
///
/// let error = RendezvousError::Timeout {
///     duration: Duration::from_secs(30),
/// };
/// assert!(error.is_timeout());
/// assert!(!error.is_cancelled());
/// assert!(!error.is_disposed());
/// ```
#[derive(Debug, Error)]
pub enum RendezvousError {
    /// The wait did not complete within the caller-supplied bound.
    #[error("wait timed out after {duration:?}")]
    Timeout {
        /// The duration that was exceeded.
        duration: Duration,
    },

    /// The caller-supplied cancellation token fired before an item arrived.
    #[error("wait was cancelled")]
    Cancelled,

    /// The collection has been disposed.
    ///
    /// All pending waiters are settled with this error at disposal time, and
    /// every operation afterward fails with it.
    #[error("collection has been disposed")]
    Disposed,
}

impl RendezvousError {
    /// Returns `true` if this is a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if this is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` if this is a disposal error.
    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        matches!(self, Self::Disposed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let timeout = RendezvousError::Timeout {
            duration: Duration::from_millis(100),
        };
        assert!(timeout.is_timeout());
        assert!(!timeout.is_cancelled());

        assert!(RendezvousError::Cancelled.is_cancelled());
        assert!(RendezvousError::Disposed.is_disposed());
    }

    #[test]
    fn test_display() {
        let timeout = RendezvousError::Timeout {
            duration: Duration::from_secs(1),
        };
        assert!(timeout.to_string().contains("timed out"));
        assert!(RendezvousError::Cancelled.to_string().contains("cancelled"));
        assert!(RendezvousError::Disposed.to_string().contains("disposed"));
    }
}
