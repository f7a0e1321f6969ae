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

//! Full zone transfers ([RFC 5936]).
//!
//! A transfer streams the zone out of a dedicated backend handle as a
//! sequence of framed messages. The first message carries the question
//! and starts with the SOA; the last carries nothing but the SOA again.
//! When the zone is signed, the NSEC or NSEC3 chain is synthesized from
//! an index of the names seen during the pass and sent after the
//! regular records.
//!
//! [RFC 5936]: https://datatracker.ietf.org/doc/html/rfc5936

use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, TcpStream};

use log::{error, info, warn};

use super::stats::Counter;
use super::{Error, ErrorKind, Result, Server};
use crate::dnssec::{base32hex_encode, nsec3_rdata, nsec_rdata, Nsec3Param};
use crate::message::{writer, Question, Rcode, Reader, Writer, MAX_MESSAGE_SIZE};
use crate::name::Name;
use crate::rr::{Record, SoaData, Ttl, Type};

/// What the authentication index knows about one owner name.
#[derive(Debug)]
struct IndexEntry {
    types: BTreeSet<Type>,
    ttl: Ttl,
}

/// The owner names of a zone in canonical order, with the types present
/// at each. Built during the transfer and used to synthesize the
/// NSEC/NSEC3 chain afterward.
#[derive(Debug, Default)]
struct AuthIndex(BTreeMap<Name, IndexEntry>);

impl AuthIndex {
    fn note(&mut self, owner: &Name, rr_type: Type, ttl: Ttl) {
        let entry = self
            .0
            .entry(owner.clone())
            .or_insert_with(|| IndexEntry {
                types: BTreeSet::new(),
                ttl,
            });
        entry.types.insert(rr_type);
        entry.ttl = ttl;
    }

    /// Builds one NSEC record per name, each pointing to the next name
    /// in canonical order and the last back to the first.
    fn nsec_chain(&self) -> Vec<Record> {
        let names: Vec<&Name> = self.0.keys().collect();
        self.0
            .iter()
            .enumerate()
            .map(|(i, (owner, entry))| {
                let next = names[(i + 1) % names.len()];
                let mut types = entry.types.clone();
                types.insert(Type::RRSIG);
                types.insert(Type::NSEC);
                Record::new(
                    owner.clone(),
                    Type::NSEC,
                    entry.ttl,
                    nsec_rdata(next, &types),
                )
            })
            .collect()
    }

    /// Builds one NSEC3 record per name. The records come out in hash
    /// order, each pointing to the next hash and the last back to the
    /// first.
    fn nsec3_chain(&self, param: &Nsec3Param, zone: &Name, ttl: Ttl) -> Result<Vec<Record>> {
        let mut hashed: Vec<_> = self
            .0
            .iter()
            .map(|(owner, entry)| (param.hash(owner), owner, entry))
            .collect();
        hashed.sort_by(|a, b| a.0.cmp(&b.0));

        let mut chain = Vec::with_capacity(hashed.len());
        for (i, (hash, owner, entry)) in hashed.iter().enumerate() {
            let next_hash = &hashed[(i + 1) % hashed.len()].0;
            let mut types = entry.types.clone();
            types.insert(Type::RRSIG);
            if *owner == zone {
                types.insert(Type::NSEC3PARAM);
            }
            let hashed_owner = zone
                .prepend_label(base32hex_encode(hash).as_bytes())
                .map_err(|e| {
                    Error::with_source(
                        ErrorKind::DataSource,
                        format!("cannot form the NSEC3 owner name for {}", owner),
                        e,
                    )
                })?;
            chain.push(Record::new(
                hashed_owner,
                Type::NSEC3,
                ttl,
                nsec3_rdata(param, next_hash, &types),
            ));
        }
        Ok(chain)
    }
}

/// Writes the records of a transfer into framed messages, flushing
/// every `chunk` records or whenever the next record does not fit.
struct TransferStream<'a> {
    server: &'a Server,
    socket: &'a mut TcpStream,
    query: &'a Reader<'a>,
    writer: Writer,
    chunk: usize,
    in_chunk: usize,
    records: usize,
    messages: usize,
}

impl<'a> TransferStream<'a> {
    fn new(
        server: &'a Server,
        socket: &'a mut TcpStream,
        query: &'a Reader<'a>,
        question: &Question,
    ) -> Result<Self> {
        let chunk = if server.config.strict_rfc_axfrs {
            1
        } else {
            server.config.axfr_chunk.max(1)
        };
        let mut writer = new_message(query);
        writer.add_question(question).map_err(question_error)?;
        Ok(Self {
            server,
            socket,
            query,
            writer,
            chunk,
            in_chunk: 0,
            records: 0,
            messages: 0,
        })
    }

    fn push(&mut self, record: &Record) -> Result<()> {
        match self.writer.add_answer(record) {
            Ok(()) => (),
            Err(writer::Error::Truncation | writer::Error::CountOverflow) if self.in_chunk > 0 => {
                self.flush()?;
                self.writer.add_answer(record).map_err(|e| oversized(record, e))?;
            }
            Err(e) => return Err(oversized(record, e)),
        }
        self.records += 1;
        self.in_chunk += 1;
        if self.in_chunk >= self.chunk {
            self.flush()?;
        }
        Ok(())
    }

    /// Sends the message under construction, if it has any records, and
    /// starts the next one (which has no question section).
    fn flush(&mut self) -> Result<()> {
        if self.in_chunk == 0 {
            return Ok(());
        }
        let message = std::mem::replace(&mut self.writer, new_message(self.query));
        self.server.send(self.socket, &message.finish())?;
        self.messages += 1;
        self.in_chunk = 0;
        Ok(())
    }

    /// Flushes any partial chunk and sends the closing SOA in a message
    /// of its own. Returns the record and message counts.
    fn finish(mut self, soa: &SoaData) -> Result<(usize, usize)> {
        self.flush()?;
        let record = soa.to_record();
        let mut last = new_message(self.query);
        last.add_answer(&record).map_err(|e| oversized(&record, e))?;
        self.server.send(self.socket, &last.finish())?;
        Ok((self.records + 1, self.messages + 1))
    }
}

fn new_message(query: &Reader) -> Writer {
    let mut writer = Writer::new_response(query, MAX_MESSAGE_SIZE);
    writer.set_aa(true);
    writer
}

fn question_error(err: writer::Error) -> Error {
    Error::with_source(ErrorKind::Protocol, "cannot echo the question", err)
}

fn oversized(record: &Record, err: writer::Error) -> Error {
    Error::with_source(
        ErrorKind::DataSource,
        format!("record {:?} cannot be written to a message", record),
        err,
    )
}

impl Server {
    /// Runs a zone transfer of the zone named in `question` to `peer`,
    /// writing every message to `socket`.
    ///
    /// Refusals and failures that have a reply code (REFUSED, NOTAUTH,
    /// SERVFAIL) are answered and return `Ok`, leaving the connection
    /// usable. An `Err` means the transfer broke off part way, either
    /// because the backend failed or because a send did; the connection
    /// should then be closed.
    pub(super) fn transfer(
        &self,
        socket: &mut TcpStream,
        query: &Reader,
        question: &Question,
        peer: IpAddr,
    ) -> Result<()> {
        let zone = &question.qname;

        let nsec3 = self.keystore.nsec3_param(zone);
        let narrow = matches!(nsec3, Some((_, true)));
        if narrow {
            error!("Not doing AXFR of an NSEC3 narrow zone");
        }
        if narrow || !self.authorize_transfer(zone, peer)?.is_permitted() {
            warn!("AXFR of domain '{}' denied to {}", zone, peer);
            self.stats.increment(Counter::AxfrRefused);
            return self.send_rcode(socket, query, question, Rcode::Refused);
        }

        info!("AXFR of domain '{}' initiated by {}", zone, peer);

        if self.shared.with(|backend| backend.get_soa(zone))?.is_none() {
            error!("AXFR of domain '{}' failed: not authoritative", zone);
            return self.send_rcode(socket, query, question, Rcode::NotAuth);
        }

        // The listing gets a handle of its own so that ordinary queries
        // can go on through the shared one meanwhile.
        let mut backend = match self.shared.factory().make() {
            Ok(backend) => backend,
            Err(e) => {
                error!(
                    "AXFR of domain '{}' failed: no valid backend: {}",
                    zone, e
                );
                return self.send_rcode(socket, query, question, Rcode::ServFail);
            }
        };
        let soa = match backend.get_soa(zone)? {
            Some(soa) => soa,
            None => {
                error!(
                    "AXFR of domain '{}' failed: not authoritative in second instance",
                    zone
                );
                return self.send_rcode(socket, query, question, Rcode::NotAuth);
            }
        };
        if !backend.list(zone, soa.domain_id)? {
            error!("Backend signals error condition for AXFR of domain '{}'", zone);
            return self.send_rcode(socket, query, question, Rcode::ServFail);
        }

        let mut stream = TransferStream::new(self, socket, query, question)?;
        let mut index = AuthIndex::default();
        stream.push(&soa.to_record())?;

        for key in self.keystore.keys(zone).iter().filter(|k| k.active) {
            let record = Record::new(zone.clone(), Type::DNSKEY, soa.minimum, key.rdata());
            index.note(zone, Type::DNSKEY, soa.minimum);
            stream.push(&record)?;
        }

        while let Some(record) = backend.get()? {
            if record.auth || record.rr_type == Type::NS || record.rr_type == Type::DS {
                index.note(&record.owner, record.rr_type, record.ttl);
            }
            // An SOA would signal the end of the transfer.
            if record.rr_type == Type::SOA {
                continue;
            }
            stream.push(&record)?;
        }

        if self.keystore.has_active_ksk(zone) {
            let chain = match nsec3 {
                Some((ref param, _)) => index.nsec3_chain(param, zone, soa.minimum)?,
                None => index.nsec_chain(),
            };
            for record in &chain {
                stream.push(record)?;
            }
        }

        let (records, messages) = stream.finish(&soa)?;
        self.stats.increment(Counter::AxfrCompleted);
        info!(
            "AXFR of domain '{}' to {} finished: {} records in {} messages",
            zone, peer, records, messages
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::acl::Netmask;
    use crate::backend::memory::tests::{example_soa, example_store, record};
    use crate::backend::memory::{MemoryStore, MemoryZone};
    use crate::backend::{self, Backend, BackendFactory};
    use crate::dnssec::{type_bitmap, Dnskey, StaticKeystore, ZoneKeys};
    use crate::message::Qtype;
    use crate::notify::RecentNotifies;
    use crate::server::tests::{
        parse_message, query_bytes, read_all_frames, server_with, server_with_parts, socket_pair,
        Parsed,
    };
    use crate::server::authorize::tests::acl_failure_server;
    use crate::server::Config;

    fn peer() -> IpAddr {
        "192.0.2.53".parse().unwrap()
    }

    /// Runs a transfer of `zone` and returns the parsed messages the
    /// client received.
    fn run_transfer(server: &Server, zone: &str) -> (Result<()>, Vec<Parsed>) {
        let (mut client, mut socket) = socket_pair();
        let collector = thread::spawn(move || read_all_frames(&mut client));
        let query = query_bytes(0x4242, zone, Qtype::AXFR, false);
        let reader = Reader::try_from(&query[..]).unwrap();
        let mut question_reader = Reader::try_from(&query[..]).unwrap();
        let question = question_reader.read_question().unwrap();
        let result = server.transfer(&mut socket, &reader, &question, peer());
        drop(socket);
        let messages = collector
            .join()
            .unwrap()
            .iter()
            .map(|m| parse_message(m))
            .collect();
        (result, messages)
    }

    fn all_records(messages: &[Parsed]) -> Vec<Record> {
        messages.iter().flat_map(|m| m.answers.clone()).collect()
    }

    fn ksk() -> Dnskey {
        Dnskey {
            flags: Dnskey::ZONE_KEY_FLAG | Dnskey::SEP_FLAG,
            protocol: 3,
            algorithm: 13,
            public_key: vec![0xab; 64].into_boxed_slice(),
            active: true,
        }
    }

    fn signed_keystore(nsec3: Option<(Nsec3Param, bool)>) -> StaticKeystore {
        let mut keystore = StaticKeystore::new();
        keystore.insert(
            "example.com.".parse().unwrap(),
            ZoneKeys {
                keys: vec![ksk()],
                nsec3,
            },
        );
        keystore
    }

    #[test]
    fn unsigned_zone_transfers_soa_to_soa() {
        let server = server_with(Config::default(), example_store(), RecentNotifies::default());
        let (result, messages) = run_transfer(&server, "example.com.");
        result.unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, 0x4242);
        assert!(messages[0].aa);
        assert_eq!(messages[0].rcode, Rcode::NoError);
        assert_eq!(messages[0].qdcount, 1);
        assert_eq!(messages[1].qdcount, 0);

        let records = all_records(&messages);
        let types: Vec<Type> = records.iter().map(|r| r.rr_type).collect();
        assert_eq!(types, [Type::SOA, Type::NS, Type::A, Type::SOA]);
        let soa = example_soa();
        assert_eq!(records[0].rdata, soa.rdata());
        assert_eq!(records[3].rdata, soa.rdata());
        assert_eq!(records[2].rdata.as_ref(), &[1, 2, 3, 4]);
        assert_eq!(server.stats.get(Counter::AxfrCompleted), 1);
    }

    #[test]
    fn strict_mode_sends_one_record_per_message() {
        let config = Config {
            strict_rfc_axfrs: true,
            ..Config::default()
        };
        let server = server_with(config, example_store(), RecentNotifies::default());
        let (result, messages) = run_transfer(&server, "example.com.");
        result.unwrap();
        assert_eq!(messages.len(), 4);
        assert!(messages.iter().all(|m| m.answers.len() == 1));
        assert_eq!(messages[0].qdcount, 1);
        assert!(messages[1..].iter().all(|m| m.qdcount == 0));
    }

    #[test]
    fn chunks_hold_the_configured_number_of_records() {
        let mut zone = MemoryZone::new(example_soa());
        for i in 0..25 {
            zone.add(record(&format!("h{}.example.com.", i), Type::A, &[10, 0, 0, i]))
                .unwrap();
        }
        let mut store = MemoryStore::new();
        store.insert(zone);
        let config = Config {
            axfr_chunk: 10,
            ..Config::default()
        };
        let server = server_with(config, Arc::new(store), RecentNotifies::default());
        let (result, messages) = run_transfer(&server, "example.com.");
        result.unwrap();
        // 26 records (SOA + 25) in chunks of 10, then the closing SOA.
        let sizes: Vec<usize> = messages.iter().map(|m| m.answers.len()).collect();
        assert_eq!(sizes, [10, 10, 6, 1]);
    }

    #[test]
    fn large_records_flush_early() {
        let mut zone = MemoryZone::new(example_soa());
        for i in 0..3 {
            zone.add(record(
                &format!("big{}.example.com.", i),
                Type::TXT,
                &vec![b'x'; 40000],
            ))
            .unwrap();
        }
        let mut store = MemoryStore::new();
        store.insert(zone);
        let server = server_with(Config::default(), Arc::new(store), RecentNotifies::default());
        let (result, messages) = run_transfer(&server, "example.com.");
        result.unwrap();
        let sizes: Vec<usize> = messages.iter().map(|m| m.answers.len()).collect();
        // Each 40,000-octet record needs a message of its own.
        assert_eq!(sizes, [2, 1, 1, 1]);
        assert!(messages.iter().all(|m| m.len <= MAX_MESSAGE_SIZE));
    }

    #[test]
    fn unlisted_peer_gets_single_refused() {
        let config = Config {
            allow_axfr: ["198.51.100.0/24".parse::<Netmask>().unwrap()]
                .into_iter()
                .collect(),
            ..Config::default()
        };
        let server = server_with(config, example_store(), RecentNotifies::default());
        let (result, messages) = run_transfer(&server, "example.com.");
        result.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].rcode, Rcode::Refused);
        assert_eq!(messages[0].qdcount, 1);
        assert!(messages[0].answers.is_empty());
        assert_eq!(server.stats.get(Counter::AxfrRefused), 1);
    }

    #[test]
    fn unknown_zone_gets_single_notauth() {
        let server = server_with(Config::default(), example_store(), RecentNotifies::default());
        let (result, messages) = run_transfer(&server, "example.net.");
        result.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].rcode, Rcode::NotAuth);
        assert!(messages[0].answers.is_empty());
    }

    #[test]
    fn narrow_nsec3_zones_are_refused() {
        let param: Nsec3Param = "1 0 1 aabb".parse().unwrap();
        let server = server_with_parts(
            Config::default(),
            example_store(),
            signed_keystore(Some((param, true))),
            RecentNotifies::default(),
        );
        let (result, messages) = run_transfer(&server, "example.com.");
        result.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].rcode, Rcode::Refused);
    }

    #[test]
    fn nsec_chain_covers_every_name_in_order() {
        let server = server_with_parts(
            Config::default(),
            example_store(),
            signed_keystore(None),
            RecentNotifies::default(),
        );
        let (result, messages) = run_transfer(&server, "example.com.");
        result.unwrap();
        let records = all_records(&messages);
        let types: Vec<Type> = records.iter().map(|r| r.rr_type).collect();
        assert_eq!(
            types,
            [
                Type::SOA,
                Type::DNSKEY,
                Type::NS,
                Type::A,
                Type::NSEC,
                Type::NSEC,
                Type::SOA
            ]
        );

        let apex: Name = "example.com.".parse().unwrap();
        let www: Name = "www.example.com.".parse().unwrap();
        assert_eq!(records[1].ttl, example_soa().minimum);

        let apex_types: BTreeSet<Type> = [
            Type::NS,
            Type::SOA,
            Type::RRSIG,
            Type::NSEC,
            Type::DNSKEY,
        ]
        .into_iter()
        .collect();
        assert_eq!(records[4].owner, apex);
        assert_eq!(records[4].rdata, nsec_rdata(&www, &apex_types));

        let www_types: BTreeSet<Type> = [Type::A, Type::RRSIG, Type::NSEC].into_iter().collect();
        assert_eq!(records[5].owner, www);
        assert_eq!(records[5].ttl, Ttl::from(300));
        assert_eq!(records[5].rdata, nsec_rdata(&apex, &www_types));
    }

    /// A zone whose names are added out of order. `WWW` and `www` are
    /// the same name, and `a.z` sorts after `z` canonically though not
    /// as a string.
    fn scrambled_store() -> Arc<MemoryStore> {
        let mut zone = MemoryZone::new(example_soa());
        zone.add(record("z.example.com.", Type::A, &[192, 0, 2, 4]))
            .unwrap();
        zone.add(record("WWW.example.com.", Type::A, &[192, 0, 2, 3]))
            .unwrap();
        zone.add(record("a.z.example.com.", Type::A, &[192, 0, 2, 5]))
            .unwrap();
        zone.add(record("www.example.com.", Type::TXT, b"\x02hi"))
            .unwrap();
        zone.add(record("b.example.com.", Type::A, &[192, 0, 2, 2]))
            .unwrap();
        zone.add(record(
            "example.com.",
            Type::NS,
            b"\x03ns1\x07example\x03com\x00",
        ))
        .unwrap();
        let mut store = MemoryStore::new();
        store.insert(zone);
        Arc::new(store)
    }

    fn scrambled_owners() -> Vec<Name> {
        [
            "example.com.",
            "b.example.com.",
            "www.example.com.",
            "z.example.com.",
            "a.z.example.com.",
        ]
        .iter()
        .map(|n| n.parse().unwrap())
        .collect()
    }

    #[test]
    fn nsec_chain_follows_canonical_order_and_wraps() {
        let server = server_with_parts(
            Config::default(),
            scrambled_store(),
            signed_keystore(None),
            RecentNotifies::default(),
        );
        let (result, messages) = run_transfer(&server, "example.com.");
        result.unwrap();
        let chain: Vec<Record> = all_records(&messages)
            .into_iter()
            .filter(|r| r.rr_type == Type::NSEC)
            .collect();

        let owners = scrambled_owners();
        let chain_owners: Vec<Name> = chain.iter().map(|r| r.owner.clone()).collect();
        assert_eq!(chain_owners, owners);

        let next_owners: Vec<Name> = chain
            .iter()
            .map(|r| Name::try_from_uncompressed(&r.rdata).unwrap().0)
            .collect();
        assert_eq!(
            next_owners,
            [
                owners[1].clone(),
                owners[2].clone(),
                owners[3].clone(),
                owners[4].clone(),
                owners[0].clone(),
            ]
        );

        // Both spellings of www land in one entry.
        let www = &chain[2];
        let (_, next_len) = Name::try_from_uncompressed(&www.rdata).unwrap();
        let www_types: BTreeSet<Type> = [Type::A, Type::TXT, Type::RRSIG, Type::NSEC]
            .into_iter()
            .collect();
        assert_eq!(&www.rdata[next_len..], &type_bitmap(&www_types)[..]);
    }

    #[test]
    fn nsec3_chain_follows_hash_order_and_wraps() {
        let param: Nsec3Param = "1 0 3 aabbccdd".parse().unwrap();
        let server = server_with_parts(
            Config::default(),
            scrambled_store(),
            signed_keystore(Some((param.clone(), false))),
            RecentNotifies::default(),
        );
        let (result, messages) = run_transfer(&server, "example.com.");
        result.unwrap();
        let chain: Vec<Record> = all_records(&messages)
            .into_iter()
            .filter(|r| r.rr_type == Type::NSEC3)
            .collect();

        let apex: Name = "example.com.".parse().unwrap();
        let mut hashed: Vec<_> = scrambled_owners()
            .into_iter()
            .map(|owner| (param.hash(&owner), owner))
            .collect();
        hashed.sort();
        assert_eq!(chain.len(), hashed.len());

        // The next hashed owner follows the salt and its length octet.
        let next_start = 6 + param.salt.len();
        for (i, record) in chain.iter().enumerate() {
            let (_, owner) = &hashed[i];
            let (next_hash, _) = &hashed[(i + 1) % hashed.len()];
            assert_eq!(record.owner, param.hashed_owner(owner, &apex).unwrap());
            assert_eq!(
                &record.rdata[next_start..next_start + next_hash.len()],
                &next_hash[..]
            );
        }
    }

    #[test]
    fn inactive_keys_do_not_sign() {
        let mut key = ksk();
        key.active = false;
        let mut keystore = StaticKeystore::new();
        keystore.insert(
            "example.com.".parse().unwrap(),
            ZoneKeys {
                keys: vec![key],
                nsec3: None,
            },
        );
        let server = server_with_parts(
            Config::default(),
            example_store(),
            keystore,
            RecentNotifies::default(),
        );
        let (result, messages) = run_transfer(&server, "example.com.");
        result.unwrap();
        let types: Vec<Type> = all_records(&messages).iter().map(|r| r.rr_type).collect();
        assert_eq!(types, [Type::SOA, Type::NS, Type::A, Type::SOA]);
    }

    #[test]
    fn nsec3_chain_is_in_hash_order_and_wraps() {
        let param: Nsec3Param = "1 0 1 aabbccdd".parse().unwrap();
        let server = server_with_parts(
            Config::default(),
            example_store(),
            signed_keystore(Some((param.clone(), false))),
            RecentNotifies::default(),
        );
        let (result, messages) = run_transfer(&server, "example.com.");
        result.unwrap();
        let chain: Vec<Record> = all_records(&messages)
            .into_iter()
            .filter(|r| r.rr_type == Type::NSEC3)
            .collect();
        assert_eq!(chain.len(), 2);

        let apex: Name = "example.com.".parse().unwrap();
        let www: Name = "www.example.com.".parse().unwrap();
        let mut hashes = [(param.hash(&apex), &apex), (param.hash(&www), &www)];
        hashes.sort();
        for (i, record) in chain.iter().enumerate() {
            let (hash, owner) = hashes[i];
            let (next_hash, _) = hashes[(i + 1) % 2];
            assert_eq!(record.owner, param.hashed_owner(owner, &apex).unwrap());
            assert_eq!(record.ttl, example_soa().minimum);
            let mut types: BTreeSet<Type> = if owner == &apex {
                [Type::SOA, Type::NS, Type::DNSKEY, Type::NSEC3PARAM]
                    .into_iter()
                    .collect()
            } else {
                [Type::A].into_iter().collect()
            };
            types.insert(Type::RRSIG);
            assert_eq!(record.rdata, nsec3_rdata(&param, &next_hash, &types));
            assert_ne!(hash, next_hash);
        }
    }

    #[test]
    fn glue_is_sent_but_not_indexed() {
        let mut zone = MemoryZone::new(example_soa());
        zone.add(record(
            "sub.example.com.",
            Type::NS,
            b"\x02ns\x03sub\x07example\x03com\x00",
        ))
        .unwrap();
        zone.add(record("ns.sub.example.com.", Type::A, &[192, 0, 2, 1]))
            .unwrap();
        let mut store = MemoryStore::new();
        store.insert(zone);
        let server = server_with_parts(
            Config::default(),
            Arc::new(store),
            signed_keystore(None),
            RecentNotifies::default(),
        );
        let (result, messages) = run_transfer(&server, "example.com.");
        result.unwrap();
        let records = all_records(&messages);
        assert!(records
            .iter()
            .any(|r| r.rr_type == Type::A
                && r.owner == "ns.sub.example.com.".parse::<Name>().unwrap()));
        let nsec_owners: Vec<String> = records
            .iter()
            .filter(|r| r.rr_type == Type::NSEC)
            .map(|r| r.owner.to_string())
            .collect();
        assert_eq!(nsec_owners, ["example.com.", "sub.example.com."]);
    }

    /// A backend whose listing fails after the SOA.
    struct FailingListBackend {
        yielded: bool,
    }

    impl Backend for FailingListBackend {
        fn get_soa(&mut self, _: &Name) -> std::result::Result<Option<SoaData>, backend::Error> {
            Ok(Some(example_soa()))
        }

        fn list(&mut self, _: &Name, _: u32) -> std::result::Result<bool, backend::Error> {
            Ok(true)
        }

        fn get(&mut self) -> std::result::Result<Option<Record>, backend::Error> {
            if self.yielded {
                Err(backend::Error::Query("connection lost".to_owned()))
            } else {
                self.yielded = true;
                Ok(Some(example_soa().to_record()))
            }
        }

        fn check_acl(
            &mut self,
            _: &str,
            _: &Name,
            _: IpAddr,
        ) -> std::result::Result<bool, backend::Error> {
            Ok(false)
        }

        fn lookup(&mut self, _: &Name) -> std::result::Result<Vec<Record>, backend::Error> {
            Ok(Vec::new())
        }
    }

    struct FailingListFactory;

    impl BackendFactory for FailingListFactory {
        fn make(&self) -> std::result::Result<Box<dyn Backend>, backend::Error> {
            Ok(Box::new(FailingListBackend { yielded: false }))
        }
    }

    #[test]
    fn backend_failure_aborts_without_closing_soa() {
        let server = Server::new(
            Config::default(),
            Arc::new(FailingListFactory),
            Arc::new(crate::cache::MemoryPacketCache::new(Duration::ZERO)),
            Arc::new(StaticKeystore::new()),
            Arc::new(RecentNotifies::default()),
        );
        let (result, messages) = run_transfer(&server, "example.com.");
        assert_eq!(result.unwrap_err().kind(), ErrorKind::DataSource);
        // Nothing was flushed before the failure.
        assert!(messages.is_empty());
    }

    #[test]
    fn acl_check_failure_aborts_the_transfer() {
        let server = acl_failure_server();
        let (result, messages) = run_transfer(&server, "example.com.");
        assert_eq!(result.unwrap_err().kind(), ErrorKind::DataSource);
        assert!(messages.is_empty());
        assert_eq!(server.stats.get(Counter::AxfrRefused), 0);
        assert!(!server.shared.is_launched());
    }

    #[test]
    fn send_failure_aborts_the_transfer() {
        let server = server_with(Config::default(), example_store(), RecentNotifies::default());
        let (client, mut socket) = socket_pair();
        drop(client);
        let query = query_bytes(1, "example.com.", Qtype::AXFR, false);
        let reader = Reader::try_from(&query[..]).unwrap();
        let mut question_reader = Reader::try_from(&query[..]).unwrap();
        let question = question_reader.read_question().unwrap();
        // The first write may still be accepted by the kernel; keep
        // going until the reset is noticed.
        let mut failed = false;
        for _ in 0..50 {
            if server.transfer(&mut socket, &reader, &question, peer()).is_err() {
                failed = true;
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(failed);
    }

    #[test]
    fn index_keeps_last_ttl_and_all_types() {
        let mut index = AuthIndex::default();
        let name: Name = "a.example.".parse().unwrap();
        index.note(&name, Type::A, Ttl::from(10));
        index.note(&name, Type::TXT, Ttl::from(20));
        let entry = &index.0[&name];
        assert_eq!(entry.ttl, Ttl::from(20));
        assert_eq!(
            entry.types.iter().copied().collect::<Vec<_>>(),
            [Type::A, Type::TXT]
        );
        assert!(AuthIndex::default().nsec_chain().is_empty());
    }
}
