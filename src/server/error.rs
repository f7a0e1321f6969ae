// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implementation of the [`Error`] type for server operations.

use std::fmt;
use std::io;

use crate::backend;

/// The broad categories of server failure. The category decides what
/// happens next: see the documentation of each variant.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// A timeout, reset, short read or write, or oversized frame. The
    /// connection is closed.
    Transport,

    /// An unparsable message. The connection is closed without a
    /// reply.
    Protocol,

    /// A zone transfer was denied. A REFUSED reply is sent and the
    /// connection stays open.
    Authorization,

    /// The backend failed. The shared backend handle is discarded; a
    /// zone transfer in progress is abandoned.
    DataSource,

    /// The process ran out of file descriptors. This is fatal.
    ResourceExhaustion,

    /// The server was configured in a way it cannot run with. This is
    /// fatal.
    Configuration,
}

impl ErrorKind {
    /// Returns whether errors of this kind terminate the process.
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::ResourceExhaustion | Self::Configuration)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Transport => "transport error",
            Self::Protocol => "protocol error",
            Self::Authorization => "authorization error",
            Self::DataSource => "data source error",
            Self::ResourceExhaustion => "resource exhaustion",
            Self::Configuration => "configuration error",
        })
    }
}

/// An error from the TCP query path.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source<E>(kind: ErrorKind, message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Shorthand for a [`ErrorKind::Transport`] error caused by an I/O
    /// error.
    pub fn transport(message: impl Into<String>, source: io::Error) -> Self {
        Self::with_source(ErrorKind::Transport, message, source)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.source {
            Some(ref source) => write!(f, "{}: {}", self.message, source),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<backend::Error> for Error {
    fn from(err: backend::Error) -> Self {
        Self::with_source(ErrorKind::DataSource, "backend failure", err)
    }
}

/// The type returned by fallible server operations.
pub type Result<T> = std::result::Result<T, Error>;
