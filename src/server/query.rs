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

//! Handling of ordinary (non-transfer) DNS queries.
//!
//! This is a deliberately small answering routine: exact-match lookups,
//! a single CNAME step, referrals at zone cuts, and negative answers
//! carrying the SOA. Wildcards and empty non-terminals are not
//! synthesized.

use crate::backend::{self, Backend};
use crate::class::Class;
use crate::message::{
    writer, Opcode, Qclass, Qtype, Question, Rcode, Reader, Writer, MAX_MESSAGE_SIZE,
};
use crate::name::Name;
use crate::rr::{Record, SoaData, Type};

/// What the server should do with a query.
#[derive(Debug, Eq, PartialEq)]
pub enum Outcome {
    /// Send this message.
    Answer(Vec<u8>),

    /// The query is for data we are not authoritative for; hand it to
    /// the recursor.
    Recurse,
}

/// Answers `question` (the question of `query`) from `backend`.
///
/// [`Outcome::Recurse`] is only returned when the query has RD set and
/// `may_recurse` is true; otherwise unknown names are REFUSED.
pub fn answer(
    backend: &mut dyn Backend,
    query: &Reader,
    question: &Question,
    may_recurse: bool,
) -> Result<Outcome, backend::Error> {
    if query.opcode() != Opcode::Query || question.qtype.is_transfer() {
        return Ok(Outcome::Answer(respond(
            query,
            question,
            Rcode::NotImp,
            false,
            &[],
            &[],
        )));
    }

    // We do not support QCLASS * (ANY), and we have nothing outside IN.
    if question.qclass == Qclass::ANY {
        return Ok(Outcome::Answer(respond(
            query,
            question,
            Rcode::NotImp,
            false,
            &[],
            &[],
        )));
    } else if Class::from(question.qclass) != Class::IN {
        return Ok(Outcome::Answer(respond(
            query,
            question,
            Rcode::Refused,
            false,
            &[],
            &[],
        )));
    }

    let soa = match find_zone(backend, &question.qname)? {
        Some(soa) => soa,
        None if query.rd() && may_recurse => return Ok(Outcome::Recurse),
        None => {
            return Ok(Outcome::Answer(respond(
                query,
                question,
                Rcode::Refused,
                false,
                &[],
                &[],
            )))
        }
    };

    if let Some(referral) = find_delegation(backend, &question.qname, &soa.zone, question.qtype)? {
        return Ok(Outcome::Answer(respond(
            query,
            question,
            Rcode::NoError,
            false,
            &[],
            &referral,
        )));
    }

    let records = backend.lookup(&question.qname)?;
    let matching: Vec<Record> = records
        .iter()
        .filter(|r| question.qtype == Qtype::ANY || Qtype::from(r.rr_type) == question.qtype)
        .cloned()
        .collect();

    let message = if !matching.is_empty() {
        respond(query, question, Rcode::NoError, true, &matching, &[])
    } else if let Some(cname) = records.iter().find(|r| r.rr_type == Type::CNAME) {
        respond(
            query,
            question,
            Rcode::NoError,
            true,
            &[cname.clone()],
            &[],
        )
    } else if !records.is_empty() {
        respond(
            query,
            question,
            Rcode::NoError,
            true,
            &[],
            &[negative_caching_soa(&soa)],
        )
    } else {
        respond(
            query,
            question,
            Rcode::NxDomain,
            true,
            &[],
            &[negative_caching_soa(&soa)],
        )
    };
    Ok(Outcome::Answer(message))
}

/// Builds a response to `query` echoing `question`. If the records do
/// not all fit, the message is cut short and TC is set.
pub fn respond(
    query: &Reader,
    question: &Question,
    rcode: Rcode,
    aa: bool,
    answers: &[Record],
    authority: &[Record],
) -> Vec<u8> {
    let mut writer = Writer::new_response(query, MAX_MESSAGE_SIZE);
    writer.set_rcode(rcode);
    writer.set_aa(aa);
    let truncated = execute_allowing_truncation(|| {
        writer.add_question(question)?;
        for record in answers {
            writer.add_answer(record)?;
        }
        for record in authority {
            writer.add_authority(record)?;
        }
        Ok(())
    });
    match truncated {
        Ok(false) => writer.finish(),
        Ok(true) => {
            writer.set_tc(true);
            writer.finish()
        }
        Err(_) => server_failure(query, question),
    }
}

/// Builds a bare SERVFAIL response to `query`.
fn server_failure(query: &Reader, question: &Question) -> Vec<u8> {
    let mut writer = Writer::new_response(query, MAX_MESSAGE_SIZE);
    writer.set_rcode(Rcode::ServFail);
    if writer.add_question(question).is_err() {
        return Writer::new_response(query, MAX_MESSAGE_SIZE).finish();
    }
    writer.finish()
}

/// Executes `f`, without returning an error if `f` itself fails with
/// [`writer::Error::Truncation`]. On success, this returns `Ok(true)`
/// if truncation occurred and `Ok(false)` if not.
fn execute_allowing_truncation(f: impl FnOnce() -> writer::Result<()>) -> writer::Result<bool> {
    match f() {
        Err(writer::Error::Truncation) => Ok(true),
        result => result.and(Ok(false)),
    }
}

/// Finds the closest enclosing zone of `qname`, if any.
fn find_zone(backend: &mut dyn Backend, qname: &Name) -> Result<Option<SoaData>, backend::Error> {
    let mut skip = 0;
    while let Some(candidate) = qname.superdomain(skip) {
        if let Some(soa) = backend.get_soa(&candidate)? {
            return Ok(Some(soa));
        }
        skip += 1;
    }
    Ok(None)
}

/// Looks for a zone cut between the apex of `zone` (exclusive) and
/// `qname` (inclusive), starting from the top. Returns the NS records
/// of the cut. A DS query at the cut itself is answered by the parent
/// and so does not produce a referral.
fn find_delegation(
    backend: &mut dyn Backend,
    qname: &Name,
    zone: &Name,
    qtype: Qtype,
) -> Result<Option<Vec<Record>>, backend::Error> {
    let depth = qname.len() - zone.len();
    for skip in (0..depth).rev() {
        let ancestor = match qname.superdomain(skip) {
            Some(ancestor) => ancestor,
            None => continue,
        };
        if skip == 0 && qtype == Qtype::from(Type::DS) {
            continue;
        }
        let ns: Vec<Record> = backend
            .lookup(&ancestor)?
            .into_iter()
            .filter(|r| r.rr_type == Type::NS && !r.auth)
            .collect();
        if !ns.is_empty() {
            return Ok(Some(ns));
        }
    }
    Ok(None)
}

/// Returns the SOA record to put in the authority section of a negative
/// answer. Its TTL is the lesser of the SOA's own TTL and its MINIMUM
/// field ([RFC 2308 § 3]).
///
/// [RFC 2308 § 3]: https://datatracker.ietf.org/doc/html/rfc2308#section-3
fn negative_caching_soa(soa: &SoaData) -> Record {
    let mut record = soa.to_record();
    record.ttl = soa.ttl.min(soa.minimum);
    record
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
