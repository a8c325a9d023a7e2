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

//! Wire protocol: the advertise handshake and command identifiers.
//!
//! Two small pieces live here:
//!
//! - [`Advertise`]: the fixed-size message a runtime instance writes
//!   immediately after every physical connect, before any command traffic.
//!   This is the only message the server itself ever parses.
//! - [`CommandSet`], [`ServerCommandId`], [`ResponseId`], [`CommandHeader`]:
//!   identifiers for the request/response framing that collaborators speak
//!   over an established stream. The server hands out streams ready for this
//!   framing but never interprets the payloads.

mod advertise;
mod command;

pub use advertise::{ADVERTISE_MAGIC, ADVERTISE_SIZE, Advertise, AdvertiseError, PARSE_TIMEOUT};
pub use command::{CommandHeader, CommandSet, ResponseId, ServerCommandId};
