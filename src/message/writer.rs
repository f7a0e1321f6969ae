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

//! Implementation of the [`Writer`] type to write on-the-wire DNS
//! messages.

use std::fmt;

use super::header::*;
use super::{Opcode, Question, Rcode, Reader};
use crate::rr::Record;

////////////////////////////////////////////////////////////////////////
// WRITER                                                             //
////////////////////////////////////////////////////////////////////////

/// Serializes a DNS message into an owned buffer.
///
/// The message header starts out zeroed and can be modified at any
/// time. Questions and records are appended with
/// [`Writer::add_question`], [`Writer::add_answer`] and
/// [`Writer::add_authority`], which must be used in that order; the
/// `Writer` tracks the current section and fails with
/// [`Error::OutOfOrder`] otherwise. Names are written uncompressed.
///
/// Every add either succeeds completely or leaves the message as it
/// was, so a caller that hits [`Error::Truncation`] can finish the
/// message and carry the record over into the next one.
pub struct Writer {
    octets: Vec<u8>,
    limit: usize,
    section: Section,
    qdcount: u16,
    ancount: u16,
    nscount: u16,
}

/// A type for recording which section of a DNS message a [`Writer`] is
/// currently serializing.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
enum Section {
    Question,
    Answer,
    Authority,
}

impl Writer {
    /// Creates a new `Writer` whose message may grow up to `limit`
    /// octets (clamped to the range a DNS message can have).
    pub fn new(limit: usize) -> Self {
        let limit = limit.clamp(HEADER_SIZE, MAX_MESSAGE_SIZE);
        Self {
            octets: vec![0; HEADER_SIZE],
            limit,
            section: Section::Question,
            qdcount: 0,
            ancount: 0,
            nscount: 0,
        }
    }

    /// Starts a response to `query`: the ID and opcode are copied, QR
    /// is set, and (for opcode QUERY only) RD is copied.
    pub fn new_response(query: &Reader, limit: usize) -> Self {
        let mut writer = Self::new(limit);
        writer.set_id(query.id());
        writer.set_qr(true);
        writer.set_opcode(query.opcode());
        if query.opcode() == Opcode::Query {
            writer.set_rd(query.rd());
        }
        writer
    }

    /// Returns the 16-bit ID of the message.
    pub fn id(&self) -> u16 {
        u16::from_be_bytes([self.octets[ID_START], self.octets[ID_END - 1]])
    }

    /// Sets the 16-bit ID of the message.
    pub fn set_id(&mut self, id: u16) {
        self.octets[ID_START..ID_END].copy_from_slice(&id.to_be_bytes());
    }

    /// Sets the QR (query response) bit.
    pub fn set_qr(&mut self, qr: bool) {
        self.set_flag(QR_BYTE, QR_MASK, qr);
    }

    /// Sets the message's opcode.
    pub fn set_opcode(&mut self, opcode: Opcode) {
        self.octets[OPCODE_BYTE] &= !OPCODE_MASK;
        self.octets[OPCODE_BYTE] |= (u8::from(opcode) << OPCODE_SHIFT) & OPCODE_MASK;
    }

    /// Returns whether the AA (authoritative answer) bit is set.
    pub fn aa(&self) -> bool {
        (self.octets[AA_BYTE] & AA_MASK) != 0
    }

    /// Sets the AA (authoritative answer) bit.
    pub fn set_aa(&mut self, aa: bool) {
        self.set_flag(AA_BYTE, AA_MASK, aa);
    }

    /// Sets the TC (truncation) bit.
    pub fn set_tc(&mut self, tc: bool) {
        self.set_flag(TC_BYTE, TC_MASK, tc);
    }

    /// Sets the RD (recursion desired) bit.
    pub fn set_rd(&mut self, rd: bool) {
        self.set_flag(RD_BYTE, RD_MASK, rd);
    }

    fn set_flag(&mut self, byte: usize, mask: u8, value: bool) {
        if value {
            self.octets[byte] |= mask;
        } else {
            self.octets[byte] &= !mask;
        }
    }

    /// Returns the message's current RCODE.
    pub fn rcode(&self) -> Rcode {
        (self.octets[RCODE_BYTE] & RCODE_MASK).into()
    }

    /// Sets the message's RCODE.
    pub fn set_rcode(&mut self, rcode: Rcode) {
        self.octets[RCODE_BYTE] &= !RCODE_MASK;
        self.octets[RCODE_BYTE] |= u8::from(rcode);
    }

    /// Returns the current number of answer RRs in the message.
    pub fn ancount(&self) -> u16 {
        self.ancount
    }

    /// Returns the current number of authority RRs in the message.
    pub fn nscount(&self) -> u16 {
        self.nscount
    }

    /// Returns the current length of the message.
    pub fn len(&self) -> usize {
        self.octets.len()
    }

    /// Returns whether nothing but the header has been written.
    pub fn is_empty(&self) -> bool {
        self.octets.len() == HEADER_SIZE
    }

    /// Returns how many more octets the message may grow by.
    pub fn remaining(&self) -> usize {
        self.limit - self.octets.len()
    }

    /// Adds a question to the message. This must be used before any
    /// resource records are added.
    pub fn add_question(&mut self, question: &Question) -> Result<()> {
        if self.section != Section::Question {
            return Err(Error::OutOfOrder);
        }
        let new_qdcount = self.qdcount.checked_add(1).ok_or(Error::CountOverflow)?;
        let qname = question.qname.wire_repr();
        self.ensure_room(qname.len() + 4)?;
        self.octets.extend_from_slice(qname);
        self.octets
            .extend_from_slice(&u16::from(question.qtype).to_be_bytes());
        self.octets
            .extend_from_slice(&u16::from(question.qclass).to_be_bytes());
        self.qdcount = new_qdcount;
        Ok(())
    }

    /// Adds a resource record to the answer section of the message.
    pub fn add_answer(&mut self, record: &Record) -> Result<()> {
        if self.section > Section::Answer {
            return Err(Error::OutOfOrder);
        }
        let new_ancount = self.ancount.checked_add(1).ok_or(Error::CountOverflow)?;
        self.add_rr(record)?;
        self.section = Section::Answer;
        self.ancount = new_ancount;
        Ok(())
    }

    /// Adds a resource record to the authority section of the message.
    /// No answers may be added afterward.
    pub fn add_authority(&mut self, record: &Record) -> Result<()> {
        let new_nscount = self.nscount.checked_add(1).ok_or(Error::CountOverflow)?;
        self.add_rr(record)?;
        self.section = Section::Authority;
        self.nscount = new_nscount;
        Ok(())
    }

    /// Writes out an RR at the end of the buffer, provided it fits.
    fn add_rr(&mut self, record: &Record) -> Result<()> {
        if record.rdata.len() > u16::MAX as usize {
            return Err(Error::Truncation);
        }
        self.ensure_room(record.wire_len())?;
        self.octets.extend_from_slice(record.owner.wire_repr());
        self.octets
            .extend_from_slice(&u16::from(record.rr_type).to_be_bytes());
        self.octets
            .extend_from_slice(&u16::from(record.class).to_be_bytes());
        self.octets
            .extend_from_slice(&u32::from(record.ttl).to_be_bytes());
        self.octets
            .extend_from_slice(&(record.rdata.len() as u16).to_be_bytes());
        self.octets.extend_from_slice(&record.rdata);
        Ok(())
    }

    fn ensure_room(&self, needed: usize) -> Result<()> {
        if needed > self.remaining() {
            Err(Error::Truncation)
        } else {
            Ok(())
        }
    }

    /// Finishes writing the message, returning its octets.
    pub fn finish(mut self) -> Vec<u8> {
        self.octets[QDCOUNT_START..QDCOUNT_START + 2].copy_from_slice(&self.qdcount.to_be_bytes());
        self.octets[ANCOUNT_START..ANCOUNT_START + 2].copy_from_slice(&self.ancount.to_be_bytes());
        self.octets[NSCOUNT_START..NSCOUNT_START + 2].copy_from_slice(&self.nscount.to_be_bytes());
        self.octets[ARCOUNT_START..ARCOUNT_START + 2].fill(0);
        self.octets
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a question or record could not be added.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    /// Adding the question or resource record would overflow the
    /// corresponding 16-bit counter in the DNS header.
    CountOverflow,

    /// There is not enough room left under the size limit.
    Truncation,

    /// An attempt was made to serialize a question or resource record
    /// in the wrong place in the message.
    OutOfOrder,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::CountOverflow => f.write_str("section count overflow"),
            Self::Truncation => f.write_str("message size limit reached"),
            Self::OutOfOrder => f.write_str("message sections written out of order"),
        }
    }
}

impl std::error::Error for Error {}

/// The type returned by fallible [`Writer`] methods.
pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
