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

//! Connection sessions: the per-connection request loop.

use std::net::{IpAddr, SocketAddr, TcpStream};

use log::{debug, error, info, warn};

use super::query::{self, Outcome};
use super::stats::Counter;
use super::{proxy, Error, ErrorKind, Result, Server};
use crate::cache::CacheKey;
use crate::class::Class;
use crate::io::framing::{read_frame, MAX_QUERY_LEN};
use crate::message::{patch_id_and_rd, Opcode, Question, Rcode, Reader};
use crate::thread::ThreadGroup;
use crate::util::canonical_ip;

impl Server {
    /// Serves DNS requests on `stream` until the peer closes the
    /// connection, an error ends the session, or `group` starts
    /// shutting down.
    ///
    /// Errors never escape: they are logged here and the connection is
    /// closed when `stream` is dropped.
    pub fn serve_connection(&self, mut stream: TcpStream, peer: SocketAddr, group: &ThreadGroup) {
        let peer = canonical_ip(peer.ip());
        if let Err(e) = self.run_session(&mut stream, peer, group) {
            match e.kind() {
                ErrorKind::Transport => info!("TCP connection with {} closed: {}", peer, e),
                ErrorKind::Protocol => debug!("Dropping TCP connection with {}: {}", peer, e),
                _ => error!("TCP connection with {} died: {}", peer, e),
            }
        }
    }

    fn run_session(&self, stream: &mut TcpStream, peer: IpAddr, group: &ThreadGroup) -> Result<()> {
        loop {
            let frame = match read_frame(stream, self.config.io_timeout, MAX_QUERY_LEN)? {
                Some(frame) => frame,
                None => return Ok(()),
            };
            self.stats.increment(Counter::TcpQueries);
            self.handle_request(stream, &frame, peer)?;
            if group.is_shutting_down() {
                return Ok(());
            }
        }
    }

    /// Handles a single framed request.
    fn handle_request(&self, stream: &mut TcpStream, frame: &[u8], peer: IpAddr) -> Result<()> {
        let mut reader = Reader::try_from(frame).map_err(unparsable)?;
        if reader.qr() || reader.qdcount() == 0 {
            return Err(Error::new(
                ErrorKind::Protocol,
                "message is not a query with a question",
            ));
        }
        let question = reader.read_question().map_err(unparsable)?;

        if question.qtype.is_transfer() {
            return self.transfer(stream, &reader, &question, peer);
        }

        if self.config.log_dns_details {
            info!(
                "TCP Remote {} wants '{}|{}', rd = {}",
                peer,
                question.qname,
                question.qtype,
                reader.rd()
            );
        }

        let cacheable = !reader.rd()
            && reader.opcode() == Opcode::Query
            && Class::from(question.qclass) == Class::IN;
        let key = CacheKey::new(&question);
        if cacheable {
            if let Some(mut cached) = self.cache.lookup(&key) {
                if self.config.log_dns_details {
                    info!("packetcache HIT for '{}'", question.qname);
                }
                self.stats.increment(Counter::CacheHits);
                patch_id_and_rd(&mut cached, reader.id(), reader.rd());
                return self.send_answer(stream, &cached);
            }
            if self.config.log_dns_details {
                info!("packetcache MISS for '{}'", question.qname);
            }
            self.stats.increment(Counter::CacheMisses);
        }

        let may_recurse = self.config.recursor.is_some();
        let outcome = self
            .shared
            .with(|backend| query::answer(backend, &reader, &question, may_recurse));
        match (outcome, self.config.recursor) {
            (Ok(Outcome::Answer(message)), _) => {
                if cacheable && is_cacheable_answer(&message) {
                    self.cache.insert(key, message.clone());
                }
                self.send_answer(stream, &message)
            }
            (Ok(Outcome::Recurse), Some(recursor)) => {
                // The shared backend is released by now; the exchange
                // with the recursor can take a while.
                match proxy::forward(recursor, frame, self.config.io_timeout) {
                    Ok(answer) => self.send_answer(stream, &answer),
                    Err(e) => {
                        warn!("TCP-based question to recursor failed: {}", e);
                        self.send_failure(stream, &reader, &question)
                    }
                }
            }
            (Ok(Outcome::Recurse), None) => {
                self.send_rcode(stream, &reader, &question, Rcode::Refused)
            }
            (Err(e), _) => {
                error!(
                    "TCP Connection Thread unable to answer a question because of a backend error, cycling: {}",
                    e
                );
                self.send_failure(stream, &reader, &question)
            }
        }
    }

    fn send_answer(&self, stream: &mut TcpStream, message: &[u8]) -> Result<()> {
        self.send(stream, message)?;
        self.stats.increment(Counter::TcpAnswers);
        Ok(())
    }

    fn send_failure(
        &self,
        stream: &mut TcpStream,
        query: &Reader,
        question: &Question,
    ) -> Result<()> {
        self.send_rcode(stream, query, question, Rcode::ServFail)?;
        self.stats.increment(Counter::TcpAnswers);
        Ok(())
    }
}

fn unparsable(err: crate::message::reader::Error) -> Error {
    Error::with_source(ErrorKind::Protocol, "unparsable query", err)
}

/// Whether a freshly built answer may be cached: complete, and either
/// positive or NXDOMAIN.
fn is_cacheable_answer(message: &[u8]) -> bool {
    match Reader::try_from(message) {
        Ok(reader) => !reader.tc() && matches!(reader.rcode(), Rcode::NoError | Rcode::NxDomain),
        Err(_) => false,
    }
}
