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

//! Identifiers for the command framing spoken over an established stream.
//!
//! Requests are identified by a `{command set, command id}` byte pair
//! followed by a payload; responses carry a `{response id, payload}` pair.
//! The server never interprets these; they exist so that collaborators
//! (dump collection, event tracing, profiler attach) agree on the framing
//! without each inventing their own constants.

/// Command sets multiplexed over a diagnostic stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandSet {
    /// Process dump collection commands.
    Dump = 0x01,
    /// Event tracing session commands.
    EventPipe = 0x02,
    /// Profiler attach commands.
    Profiler = 0x03,
    /// Commands addressed to the diagnostics server itself.
    Server = 0xFF,
}

impl TryFrom<u8> for CommandSet {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Dump),
            0x02 => Ok(Self::EventPipe),
            0x03 => Ok(Self::Profiler),
            0xFF => Ok(Self::Server),
            other => Err(other),
        }
    }
}

/// Commands in the [`CommandSet::Server`] set.
///
/// Values must not overlap with [`ResponseId`]; both travel in the same
/// header position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServerCommandId {
    /// Tells a suspended runtime instance to resume execution.
    ResumeRuntime = 0x01,
}

/// Response identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResponseId {
    /// The command succeeded; the payload is command-specific.
    Ok = 0x00,
    /// The command failed; the payload describes the error.
    Error = 0xFF,
}

impl TryFrom<u8> for ResponseId {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0x00 => Ok(ResponseId::Ok),
            0xFF => Ok(ResponseId::Error),
            other => Err(other),
        }
    }
}

/// The two-byte header opening every request.
///
/// # Examples
///
/// ```rust
/// use revipc::protocol::{CommandHeader, CommandSet};
///
/// let header = CommandHeader::new(CommandSet::Dump, 0x01);
/// assert_eq!(header.to_bytes(), [0x01, 0x01]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    /// The command set the command belongs to.
    pub command_set: CommandSet,
    /// The command within the set.
    pub command_id: u8,
}

impl CommandHeader {
    /// Creates a header for the given set and command.
    #[must_use]
    pub const fn new(command_set: CommandSet, command_id: u8) -> Self {
        Self {
            command_set,
            command_id,
        }
    }

    /// Serializes the header.
    #[must_use]
    pub const fn to_bytes(self) -> [u8; 2] {
        [self.command_set as u8, self.command_id]
    }

    /// Deserializes a header, rejecting unknown command sets.
    ///
    /// # Errors
    ///
    /// Returns the raw command-set byte if it names no known set.
    pub fn from_bytes(bytes: [u8; 2]) -> Result<Self, u8> {
        Ok(Self {
            command_set: CommandSet::try_from(bytes[0])?,
            command_id: bytes[1],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_set_values() {
        assert_eq!(CommandSet::Dump as u8, 0x01);
        assert_eq!(CommandSet::EventPipe as u8, 0x02);
        assert_eq!(CommandSet::Profiler as u8, 0x03);
        assert_eq!(CommandSet::Server as u8, 0xFF);
    }

    #[test]
    fn test_command_set_try_from() {
        assert_eq!(CommandSet::try_from(0x02), Ok(CommandSet::EventPipe));
        assert_eq!(CommandSet::try_from(0x42), Err(0x42));
    }

    #[test]
    fn test_response_ids_do_not_overlap_server_commands() {
        assert_ne!(ResponseId::Ok as u8, ServerCommandId::ResumeRuntime as u8);
        assert_ne!(ResponseId::Error as u8, ServerCommandId::ResumeRuntime as u8);
    }

    #[test]
    fn test_header_roundtrip() {
        let header = CommandHeader::new(CommandSet::Server, ServerCommandId::ResumeRuntime as u8);
        assert_eq!(CommandHeader::from_bytes(header.to_bytes()), Ok(header));
    }

    #[test]
    fn test_header_rejects_unknown_set() {
        assert_eq!(CommandHeader::from_bytes([0x42, 0x01]), Err(0x42));
    }
}
