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

//! Transport layer error types.

use std::io;
use thiserror::Error;

/// Errors that can occur in the transport layer.
///
/// Accept failures are transient: the listen loop logs them and keeps
/// accepting. Bind failures and unsupported addresses surface to the caller
/// of `start`, since the server cannot run without its listener.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to bind the listener at the requested address.
    ///
    /// Typically the address is in use or the process lacks permission to
    /// create the socket file or pipe.
    #[error("failed to bind to {address}: {source}")]
    BindFailed {
        /// The address that failed to bind.
        address: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept a connection: {source}")]
    AcceptFailed {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The address kind is not usable on this platform.
    ///
    /// A pipe name on a Unix system, or a filesystem path on Windows.
    #[error("address {address} is not usable on this platform")]
    UnsupportedAddress {
        /// The rejected address.
        address: String,
    },

    /// The listener has been shut down.
    #[error("listener is closed")]
    Closed,

    /// An unexpected I/O error occurred.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl From<io::Error> for TransportError {
    fn from(source: io::Error) -> Self {
        TransportError::Io { source }
    }
}
