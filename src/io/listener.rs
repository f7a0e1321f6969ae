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

//! The TCP accept loop.

// NOTE: Errors from a single accept are logged and the loop goes on;
// only running out of file descriptors stops it, and that takes the
// whole process down, since nothing else can make progress either.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{error, info};

use super::socket::{TcpListener, TcpListenerApi};
use crate::server::{Error, ErrorKind, Result, Server};
use crate::thread::ThreadGroup;

/// The longest the accept loop blocks before checking whether its
/// [`ThreadGroup`] is shutting down. This is also the most the shutdown
/// procedure has to wait for the listener to exit.
const CHECK_FOR_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// How long to back off after `poll(2)` itself fails.
const POLL_FAILURE_BACKOFF: Duration = Duration::from_millis(100);

/// A set of bound TCP listening sockets, all served by one accept
/// thread.
pub struct Listener {
    listeners: Vec<TcpListener>,
}

impl Listener {
    /// Binds a listening socket on `port` for each of the given local
    /// addresses. At least one address is required.
    pub fn bind(v4: &[Ipv4Addr], v6: &[Ipv6Addr], port: u16) -> Result<Self> {
        let addrs: Vec<SocketAddr> = v4
            .iter()
            .map(|&a| IpAddr::V4(a))
            .chain(v6.iter().map(|&a| IpAddr::V6(a)))
            .map(|ip| SocketAddr::new(ip, port))
            .collect();
        if addrs.is_empty() {
            return Err(Error::new(
                ErrorKind::Configuration,
                "No local address specified",
            ));
        }

        let mut listeners = Vec::with_capacity(addrs.len());
        for addr in addrs {
            let listener = TcpListener::bind(addr).map_err(|e| {
                Error::with_source(
                    ErrorKind::Configuration,
                    format!("Unable to bind to TCP socket {}", addr),
                    e,
                )
            })?;
            info!("TCP server bound to {}", listener.local_addr().unwrap_or(addr));
            listeners.push(listener);
        }
        Ok(Self { listeners })
    }

    /// Returns the addresses actually bound. This differs from the
    /// requested ones when port 0 was asked for.
    pub fn local_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        self.listeners.iter().map(TcpListener::local_addr).collect()
    }

    /// Starts the accept loop in a new thread of `group`. Each accepted
    /// connection is served in a thread of its own once
    /// [`Server::room`] has a free slot; until then the accept loop
    /// waits.
    ///
    /// The loop exits once `group` starts shutting down.
    pub fn start(
        self,
        server: &Arc<Server>,
        group: &Arc<ThreadGroup>,
    ) -> std::result::Result<(), crate::thread::Error> {
        let server = server.clone();
        let group_clone = group.clone();
        group.start_oneshot(Some("tcp listener".to_owned()), move || {
            if let Err(e) = self.run(&server, &group_clone) {
                error!("{}", e);
                std::process::exit(1);
            }
        })
    }

    /// The accept loop. Only fatal errors are returned.
    fn run(&self, server: &Arc<Server>, group: &Arc<ThreadGroup>) -> Result<()> {
        while !group.is_shutting_down() {
            let polled = TcpListener::poll_accept(&self.listeners, CHECK_FOR_SHUTDOWN_TIMEOUT);
            let ready = match polled {
                Ok(ready) => ready,
                Err(e) => {
                    error!("TCP listener poll error: {}", e);
                    thread::sleep(POLL_FAILURE_BACKOFF);
                    continue;
                }
            };
            for (listener, _) in self.listeners.iter().zip(ready).filter(|(_, r)| *r) {
                accept_all(listener, server, group)?;
            }
        }
        Ok(())
    }
}

/// Accepts connections from `listener` until none are pending.
fn accept_all(
    listener: &TcpListener,
    server: &Arc<Server>,
    group: &Arc<ThreadGroup>,
) -> Result<()> {
    loop {
        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if TcpListener::is_out_of_descriptors(&e) => {
                return Err(Error::with_source(
                    ErrorKind::ResourceExhaustion,
                    "TCP handler out of filedescriptors, exiting, won't recover from this",
                    e,
                ));
            }
            Err(e) => {
                error!("TCP question accept error: {}", e);
                continue;
            }
        };

        // The accepted socket may inherit non-blocking mode from the
        // listener.
        if let Err(e) = stream.set_nonblocking(false) {
            error!("Unable to set up TCP connection from {}: {}", peer, e);
            continue;
        }

        let slot = server.room().acquire(peer.ip());
        let server_clone = server.clone();
        let group_clone = group.clone();
        let task = move || {
            let _slot = slot;
            server_clone.serve_connection(stream, peer, &group_clone);
        };
        if let Err(e) = group.start_oneshot(Some(format!("tcp session {}", peer)), task) {
            // The slot went down with the unstarted task.
            error!("Unable to start a thread for TCP connection from {}: {}", peer, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpStream;
    use std::time::Instant;

    use super::*;
    use crate::backend::memory::tests::example_store;
    use crate::io::framing::{read_frame, write_frame};
    use crate::message::{Rcode, Reader, MAX_MESSAGE_SIZE};
    use crate::notify::RecentNotifies;
    use crate::rr::Type;
    use crate::server::tests::{query_bytes, server_with};
    use crate::server::Config;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn start(config: Config) -> (Arc<Server>, Arc<ThreadGroup>, SocketAddr) {
        let server = Arc::new(server_with(config, example_store(), RecentNotifies::default()));
        let listener = Listener::bind(&[Ipv4Addr::LOCALHOST], &[], 0).unwrap();
        let addr = listener.local_addrs().unwrap()[0];
        let group = ThreadGroup::new();
        listener.start(&server, &group).unwrap();
        (server, group, addr)
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + TIMEOUT;
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn bind_requires_an_address() {
        let err = Listener::bind(&[], &[], 0).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.kind().is_fatal());
    }

    #[test]
    fn connections_are_served() {
        let (_server, group, addr) = start(Config::default());
        let mut client = TcpStream::connect(addr).unwrap();
        let query = query_bytes(0x0707, "www.example.com.", Type::A.into(), false);
        write_frame(&mut client, &query, TIMEOUT).unwrap();
        let answer = read_frame(&mut client, TIMEOUT, MAX_MESSAGE_SIZE)
            .unwrap()
            .unwrap();
        let reader = Reader::try_from(&answer[..]).unwrap();
        assert_eq!(reader.id(), 0x0707);
        assert_eq!(reader.rcode(), Rcode::NoError);
        drop(client);
        group.shut_down();
        group.await_shutdown();
    }

    #[test]
    fn connections_beyond_the_limit_wait_for_a_slot() {
        let config = Config {
            max_connections: 1,
            ..Config::default()
        };
        let (server, group, addr) = start(config);

        let first = TcpStream::connect(addr).unwrap();
        wait_for(|| server.room().occupancy() == 1);

        // The second connection is established by the kernel but not
        // served until the first one goes away.
        let mut second = TcpStream::connect(addr).unwrap();
        let query = query_bytes(2, "www.example.com.", Type::A.into(), false);
        write_frame(&mut second, &query, TIMEOUT).unwrap();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(server.room().occupancy(), 1);

        drop(first);
        let answer = read_frame(&mut second, TIMEOUT, MAX_MESSAGE_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(Reader::try_from(&answer[..]).unwrap().id(), 2);
        drop(second);
        group.shut_down();
        group.await_shutdown();
        assert_eq!(server.room().occupancy(), 0);
    }

    #[test]
    fn listener_exits_at_shutdown() {
        let (_server, group, _addr) = start(Config::default());
        wait_for(|| group.thread_count() == 1);
        group.shut_down();
        group.await_shutdown();
        assert_eq!(group.thread_count(), 0);
    }
}
