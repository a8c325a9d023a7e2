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

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

//! # Architecture
//!
//! The crate is organized into small layers, leaves first:
//!
//! - **[`rendezvous`]**: the generic matching collection pairing arriving
//!   items with waiting consumers; one-shot notifications and repeatable
//!   stream handoff are both built on it
//! - **[`protocol`]**: the fixed-size advertise handshake and the command
//!   framing identifiers
//! - **[`transport`]**: the listener adapter and raw stream abstraction
//!   (Unix domain sockets, Windows named pipes, in-memory for tests)
//! - **[`endpoint`]**: identity-keyed logical endpoints that survive
//!   reconnects
//! - **[`server`]**: the [`ReversedServer`] orchestrator owning the listen
//!   loop and the connection registry
//!
//! # Concurrency model
//!
//! One listen task per server; any number of concurrent callers. Every
//! blocking operation accepts a timeout or a cancellation token and never
//! spins. Waiters are satisfied in first-registered order; a stream has
//! exactly one owner at a time, and disposal at any level closes every
//! stream it owns.
//!
//! # Safety
//!
//! `#![deny(unsafe_code)]` crate-wide. The single exception is the Windows
//! `PeekNamedPipe` liveness probe, which opts down locally with a
//! documented `SAFETY:` contract.

pub mod endpoint;
pub mod error;
pub mod protocol;
pub mod rendezvous;
pub mod server;
pub mod transport;

pub use endpoint::{CONNECT_TIMEOUT, EndpointInfo, InstanceEndpoint, InstanceId};
pub use error::RevipcError;
pub use protocol::{Advertise, AdvertiseError};
pub use rendezvous::{Rendezvous, RendezvousError, Verdict};
pub use server::{DEFAULT_MAX_CONNECTIONS, ReversedServer};
pub use transport::{BoxedStream, InstanceStream, Listener, ServerAddress, TransportError};
