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

//! Provides target-specific listening socket support.
//!
//! The Rust standard library cannot wait for readiness on several
//! listening sockets at once, nor can it time out an `accept`. The
//! listener needs both: it serves every configured address from one
//! thread, and it must notice shutdown promptly. On Unix targets we
//! use `poll(2)` for this. Elsewhere the listeners are swept with
//! non-blocking `accept` calls, sleeping briefly between sweeps.
//!
//! Either way, listeners are left in non-blocking mode, and accepted
//! connections are switched back to blocking mode by the caller.

use std::io;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

/// The API that the concrete, target-specific [`TcpListener`] must
/// implement.
pub(crate) trait TcpListenerApi: Sized {
    /// Creates a new non-blocking listener bound to the provided
    /// address.
    fn bind(addr: SocketAddr) -> io::Result<Self>;

    /// Returns the address the listener is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Blocks until at least one of `listeners` may have a connection
    /// to accept, the provided timeout expires, or the call is
    /// interrupted. Returns, for each listener, whether `accept` should
    /// be tried on it.
    fn poll_accept(listeners: &[Self], timeout: Duration) -> io::Result<Vec<bool>>;

    /// Accepts a new connection.
    fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;

    /// Returns whether `err` (from [`TcpListenerApi::accept`]) means
    /// that the process has run out of file descriptors.
    fn is_out_of_descriptors(err: &io::Error) -> bool;
}

/// The implementation of [`TcpListener`] for this target.
#[cfg_attr(unix, path = "unix_tcp.rs")]
#[cfg_attr(not(unix), path = "std_tcp.rs")]
mod tcp_impl;

pub(crate) use tcp_impl::TcpListener;
