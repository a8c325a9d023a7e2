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

//! Transport addresses.

use std::fmt;
use std::path::PathBuf;

/// Windows named pipe namespace prefix, accepted and stripped on parse.
const PIPE_PREFIX: &str = r"\\.\pipe\";

/// The platform-specific address a server binds and listens at for the
/// lifetime of the process.
///
/// On Windows this is a named pipe, given as the full `\\.\pipe\` path or
/// the bare name. On all other platforms it is the filesystem path of a
/// Unix domain socket.
///
/// # Examples
///
/// ```rust
/// use revipc::ServerAddress;
///
/// let pipe = ServerAddress::pipe(r"\\.\pipe\my-monitor");
/// assert_eq!(pipe, ServerAddress::pipe("my-monitor"));
///
/// let socket = ServerAddress::path("/tmp/my-monitor.sock");
/// assert_eq!(socket.to_string(), "/tmp/my-monitor.sock");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServerAddress {
    /// A named pipe, stored without the `\\.\pipe\` prefix.
    Pipe(String),
    /// The filesystem path of a Unix domain socket.
    Path(PathBuf),
}

impl ServerAddress {
    /// Creates a named pipe address, stripping the `\\.\pipe\` prefix if
    /// present.
    pub fn pipe(name: impl AsRef<str>) -> Self {
        let name = name.as_ref();
        let name = name.strip_prefix(PIPE_PREFIX).unwrap_or(name);
        Self::Pipe(name.to_string())
    }

    /// Creates a Unix domain socket address.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// The full pipe path for a [`Pipe`](Self::Pipe) address.
    #[must_use]
    pub fn pipe_path(&self) -> Option<String> {
        match self {
            Self::Pipe(name) => Some(format!("{PIPE_PREFIX}{name}")),
            Self::Path(_) => None,
        }
    }
}

impl From<&str> for ServerAddress {
    /// Parses an address the way the current platform names transports:
    /// a pipe name on Windows, a socket path elsewhere.
    fn from(address: &str) -> Self {
        #[cfg(windows)]
        {
            Self::pipe(address)
        }
        #[cfg(not(windows))]
        {
            Self::path(address)
        }
    }
}

impl From<String> for ServerAddress {
    fn from(address: String) -> Self {
        Self::from(address.as_str())
    }
}

impl From<PathBuf> for ServerAddress {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pipe(name) => write!(f, "{PIPE_PREFIX}{name}"),
            Self::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_prefix_stripped() {
        let with_prefix = ServerAddress::pipe(r"\\.\pipe\monitor");
        let bare = ServerAddress::pipe("monitor");
        assert_eq!(with_prefix, bare);
        assert_eq!(bare.pipe_path().unwrap(), r"\\.\pipe\monitor");
    }

    #[test]
    fn test_path_display() {
        let address = ServerAddress::path("/tmp/monitor.sock");
        assert_eq!(address.to_string(), "/tmp/monitor.sock");
        assert_eq!(address.pipe_path(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_from_str_on_unix() {
        let address = ServerAddress::from("/tmp/monitor.sock");
        assert!(matches!(address, ServerAddress::Path(_)));
    }

    #[cfg(windows)]
    #[test]
    fn test_from_str_on_windows() {
        let address = ServerAddress::from("monitor");
        assert!(matches!(address, ServerAddress::Pipe(_)));
    }
}
