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

//! The interface between the server and its zone data.
//!
//! A [`Backend`] is a handle onto some record store. Handles are not
//! assumed to be safe for concurrent use, and each one supports only a
//! single zone listing at a time, so the server keeps one handle that
//! ordinary queries share under a mutex and opens a fresh one through
//! a [`BackendFactory`] for every zone transfer.

use std::fmt;
use std::net::IpAddr;

use crate::name::Name;
use crate::rr::{Record, SoaData};

pub mod memory;

////////////////////////////////////////////////////////////////////////
// BACKEND TRAITS                                                     //
////////////////////////////////////////////////////////////////////////

/// A handle onto a record store.
pub trait Backend: Send {
    /// Looks up the SOA of the zone whose apex is exactly `zone`.
    /// Returns `Ok(None)` if the backend is not authoritative for such
    /// a zone.
    fn get_soa(&mut self, zone: &Name) -> Result<Option<SoaData>, Error>;

    /// Starts listing the zone `zone` (with the backend identifier
    /// `domain_id` from its [`SoaData`]). Records are then fetched one
    /// by one with [`Backend::get`]. Returns `Ok(false)` if the backend
    /// cannot list the zone.
    fn list(&mut self, zone: &Name, domain_id: u32) -> Result<bool, Error>;

    /// Returns the next record of the listing started by
    /// [`Backend::list`], or `Ok(None)` once the listing is exhausted.
    fn get(&mut self) -> Result<Option<Record>, Error>;

    /// Evaluates the access-control rule `rule` (e.g. `"allow-axfr"`)
    /// for `peer` against the configuration of `zone`.
    fn check_acl(&mut self, rule: &str, zone: &Name, peer: IpAddr) -> Result<bool, Error>;

    /// Returns every record owned by `qname` in the most specific zone
    /// containing it. An empty result means that the name does not
    /// exist there.
    fn lookup(&mut self, qname: &Name) -> Result<Vec<Record>, Error>;
}

/// Creates [`Backend`] handles.
pub trait BackendFactory: Send + Sync {
    fn make(&self) -> Result<Box<dyn Backend>, Error>;
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error reported by a [`Backend`] or [`BackendFactory`].
///
/// After any error the handle that produced it should be considered
/// broken and dropped.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// A new handle could not be opened.
    Unavailable(String),

    /// The record store failed to answer a request.
    Query(String),

    /// [`Backend::get`] was called without a listing in progress.
    NotListing,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Unavailable(reason) => write!(f, "backend unavailable: {}", reason),
            Self::Query(reason) => write!(f, "backend query failed: {}", reason),
            Self::NotListing => f.write_str("no zone listing in progress"),
        }
    }
}

impl std::error::Error for Error {}
