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

use std::io;
use std::net::{self, SocketAddr, TcpStream};
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};

use super::TcpListenerApi;

/// A TCP listener implementation that waits on a set of standard
/// library [`TcpListener`](net::TcpListener)s with `poll(2)`.
///
/// The standard library sets `SO_REUSEADDR` on listening sockets on
/// Unix targets.
pub struct TcpListener(net::TcpListener);

impl TcpListenerApi for TcpListener {
    fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = net::TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self(listener))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.0.local_addr()
    }

    fn poll_accept(listeners: &[Self], timeout: Duration) -> io::Result<Vec<bool>> {
        let millis = timeout.as_millis().try_into().unwrap_or(i32::MAX);
        let mut poll_fds: Vec<PollFd> = listeners
            .iter()
            .map(|l| PollFd::new(l.0.as_raw_fd(), PollFlags::POLLIN))
            .collect();
        match poll(&mut poll_fds, millis) {
            Ok(_) => Ok(poll_fds
                .iter()
                .map(|p| p.revents().map_or(false, |r| r.contains(PollFlags::POLLIN)))
                .collect()),
            Err(Errno::EINTR) => Ok(vec![false; listeners.len()]),
            Err(e) => Err(e.into()),
        }
    }

    fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        self.0.accept()
    }

    fn is_out_of_descriptors(err: &io::Error) -> bool {
        matches!(
            err.raw_os_error().map(Errno::from_i32),
            Some(Errno::EMFILE | Errno::ENFILE)
        )
    }
}
