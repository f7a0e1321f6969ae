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

//! The processing logic of the TCP side of an authoritative DNS server.
//!
//! The [`Server`] structure is the heart of this module; see its
//! documentation for details.

use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use log::error;

use crate::acl::NetmaskGroup;
use crate::backend::BackendFactory;
use crate::cache::PacketCache;
use crate::dnssec::Keystore;
use crate::io::framing::write_frame;
use crate::message::{Question, Rcode, Reader};
use crate::notify::NotifyTracker;

mod admission;
mod authorize;
mod axfr;
mod error;
mod proxy;
mod query;
mod session;
mod shared;
mod stats;

pub use admission::{ConnectionRoom, Slot};
pub use authorize::Decision;
pub use error::{Error, ErrorKind, Result};
pub use query::Outcome;
pub use shared::SharedBackend;
pub use stats::{Counter, Stats};

////////////////////////////////////////////////////////////////////////
// CONFIGURATION                                                      //
////////////////////////////////////////////////////////////////////////

/// Settings that govern a [`Server`].
#[derive(Clone, Debug)]
pub struct Config {
    /// The number of connections served at once. Further connections
    /// wait in the listener until a slot frees up.
    pub max_connections: usize,

    /// The time allowed for reading a whole query and for writing a
    /// whole response.
    pub io_timeout: Duration,

    /// The peers allowed to transfer zones when per-zone ACLs are off.
    /// An empty group allows everyone.
    pub allow_axfr: NetmaskGroup,

    /// Whether to consult each zone's `allow-axfr` access list instead
    /// of `allow_axfr`.
    pub per_zone_axfr_acls: bool,

    /// Refuses all zone transfers.
    pub disable_axfr: bool,

    /// Sends one record per message during zone transfers.
    pub strict_rfc_axfrs: bool,

    /// The number of records per zone-transfer message.
    pub axfr_chunk: usize,

    /// Where to send recursive queries for names outside our zones.
    pub recursor: Option<SocketAddr>,

    /// Logs each question and each packet-cache decision.
    pub log_dns_details: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_connections: 10,
            io_timeout: Duration::from_secs(5),
            allow_axfr: NetmaskGroup::new(),
            per_zone_axfr_acls: false,
            disable_axfr: false,
            strict_rfc_axfrs: false,
            axfr_chunk: 100,
            recursor: None,
            log_dns_details: false,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// SERVER                                                             //
////////////////////////////////////////////////////////////////////////

/// The TCP query and zone-transfer engine of an authoritative DNS
/// server.
///
/// A `Server` is shared (through an [`Arc`]) by the listener and all
/// of the connection threads. Ordinary questions are answered through
/// one [`SharedBackend`] handle, which connection threads take turns
/// using; each zone transfer gets a backend handle of its own so that
/// a long transfer does not hold up other connections. Answers to
/// cacheable questions go through a [`PacketCache`].
pub struct Server {
    config: Config,
    shared: SharedBackend,
    cache: Arc<dyn PacketCache>,
    keystore: Arc<dyn Keystore>,
    notifies: Arc<dyn NotifyTracker>,
    stats: Stats,
    room: Arc<ConnectionRoom>,
}

impl Server {
    /// Creates a new `Server`. The shared backend handle is made right
    /// away; if that fails, it is made again when the first question
    /// comes in.
    pub fn new(
        config: Config,
        factory: Arc<dyn BackendFactory>,
        cache: Arc<dyn PacketCache>,
        keystore: Arc<dyn Keystore>,
        notifies: Arc<dyn NotifyTracker>,
    ) -> Self {
        let shared = SharedBackend::new(factory);
        if let Err(e) = shared.launch() {
            error!(
                "TCP server is unable to launch backends - will try again when questions come in: {}",
                e
            );
        }
        let room = ConnectionRoom::new(config.max_connections);
        Self {
            config,
            shared,
            cache,
            keystore,
            notifies,
            stats: Stats::new(),
            room,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Returns the admission control for connection threads.
    pub fn room(&self) -> &Arc<ConnectionRoom> {
        &self.room
    }

    /// Writes one framed message to `socket`.
    fn send(&self, socket: &mut TcpStream, message: &[u8]) -> Result<()> {
        write_frame(socket, message, self.config.io_timeout)
    }

    /// Sends an empty, non-authoritative response with the given RCODE.
    fn send_rcode(
        &self,
        socket: &mut TcpStream,
        query: &Reader,
        question: &Question,
        rcode: Rcode,
    ) -> Result<()> {
        let response = query::respond(query, question, rcode, false, &[], &[]);
        self.send(socket, &response)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::net::TcpListener;

    use super::*;
    use crate::backend::memory::{MemoryBackendFactory, MemoryStore};
    use crate::cache::MemoryPacketCache;
    use crate::class::Class;
    use crate::dnssec::StaticKeystore;
    use crate::io::framing::read_frame;
    use crate::message::{Qtype, Writer, MAX_MESSAGE_SIZE};
    use crate::notify::RecentNotifies;
    use crate::rr::Record;

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// A response taken apart for inspection.
    #[derive(Debug)]
    pub struct Parsed {
        pub id: u16,
        pub aa: bool,
        pub tc: bool,
        pub rd: bool,
        pub rcode: Rcode,
        pub qdcount: u16,
        pub answers: Vec<Record>,
        pub authority: Vec<Record>,
        pub len: usize,
    }

    pub fn parse_message(octets: &[u8]) -> Parsed {
        let mut reader = Reader::try_from(octets).unwrap();
        for _ in 0..reader.qdcount() {
            reader.read_question().unwrap();
        }
        let answers = (0..reader.ancount())
            .map(|_| reader.read_rr().unwrap())
            .collect();
        let authority = (0..reader.nscount())
            .map(|_| reader.read_rr().unwrap())
            .collect();
        Parsed {
            id: reader.id(),
            aa: reader.aa(),
            tc: reader.tc(),
            rd: reader.rd(),
            rcode: reader.rcode(),
            qdcount: reader.qdcount(),
            answers,
            authority,
            len: octets.len(),
        }
    }

    pub fn query_bytes(id: u16, qname: &str, qtype: Qtype, rd: bool) -> Vec<u8> {
        let mut writer = Writer::new(512);
        writer.set_id(id);
        writer.set_rd(rd);
        writer
            .add_question(&Question {
                qname: qname.parse().unwrap(),
                qtype,
                qclass: Class::IN.into(),
            })
            .unwrap();
        writer.finish()
    }

    /// Returns the two ends of a fresh loopback connection: the client
    /// end first, then the server end.
    pub fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server_end, _) = listener.accept().unwrap();
        (client, server_end)
    }

    /// Reads frames until the other end closes the connection.
    pub fn read_all_frames(stream: &mut TcpStream) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        while let Some(frame) = read_frame(stream, TIMEOUT, MAX_MESSAGE_SIZE).unwrap() {
            frames.push(frame);
        }
        frames
    }

    pub fn server_with(
        config: Config,
        store: Arc<MemoryStore>,
        notifies: RecentNotifies,
    ) -> Server {
        server_with_parts(config, store, StaticKeystore::new(), notifies)
    }

    pub fn server_with_parts(
        config: Config,
        store: Arc<MemoryStore>,
        keystore: StaticKeystore,
        notifies: RecentNotifies,
    ) -> Server {
        Server::new(
            config,
            Arc::new(MemoryBackendFactory::new(store)),
            Arc::new(MemoryPacketCache::new(Duration::from_secs(60))),
            Arc::new(keystore),
            Arc::new(notifies),
        )
    }

    #[test]
    fn new_servers_launch_the_shared_backend() {
        let server = server_with(
            Config::default(),
            Arc::new(MemoryStore::new()),
            RecentNotifies::default(),
        );
        assert!(server.shared.is_launched());
        assert_eq!(server.room().capacity(), 10);
    }

    #[test]
    fn send_rcode_echoes_the_question() {
        let server = server_with(
            Config::default(),
            Arc::new(MemoryStore::new()),
            RecentNotifies::default(),
        );
        let (mut client, mut socket) = socket_pair();
        let query = query_bytes(0x1234, "example.org.", Qtype::ANY, true);
        let reader = Reader::try_from(&query[..]).unwrap();
        let question = Reader::try_from(&query[..])
            .unwrap()
            .read_question()
            .unwrap();
        server
            .send_rcode(&mut socket, &reader, &question, Rcode::Refused)
            .unwrap();
        drop(socket);
        let frames = read_all_frames(&mut client);
        assert_eq!(frames.len(), 1);
        let parsed = parse_message(&frames[0]);
        assert_eq!(parsed.id, 0x1234);
        assert_eq!(parsed.rcode, Rcode::Refused);
        assert_eq!(parsed.qdcount, 1);
        assert!(parsed.rd);
        assert!(!parsed.aa);
    }
}
