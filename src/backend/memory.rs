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

//! An in-memory [`Backend`] implementation.
//!
//! Zones are assembled with [`MemoryZone`], collected into a
//! [`MemoryStore`], and then served through [`MemoryBackendFactory`].
//! The store is immutable once built, so any number of
//! [`MemoryBackend`] handles can read it at once.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use super::{Backend, BackendFactory, Error};
use crate::acl::NetmaskGroup;
use crate::name::Name;
use crate::rr::{Record, SoaData, Type};

////////////////////////////////////////////////////////////////////////
// ZONES                                                              //
////////////////////////////////////////////////////////////////////////

/// A zone held in memory.
///
/// Records are kept sorted in DNSSEC canonical order by owner (and by
/// type within an owner), which is also the order in which they are
/// listed for zone transfers. The SOA itself is kept apart in the
/// zone's [`SoaData`].
#[derive(Clone, Debug)]
pub struct MemoryZone {
    soa: SoaData,
    records: Vec<Record>,
    allow_axfr: NetmaskGroup,
}

impl MemoryZone {
    /// Creates an empty zone with the given SOA.
    pub fn new(soa: SoaData) -> Self {
        Self {
            soa,
            records: Vec::new(),
            allow_axfr: NetmaskGroup::new(),
        }
    }

    /// Returns the zone's apex.
    pub fn apex(&self) -> &Name {
        &self.soa.zone
    }

    /// Returns the zone's SOA.
    pub fn soa(&self) -> &SoaData {
        &self.soa
    }

    /// Returns the zone's records (not including the SOA).
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Sets the peers allowed to transfer this zone when per-zone
    /// access control is in use.
    pub fn set_allow_axfr(&mut self, allow_axfr: NetmaskGroup) {
        self.allow_axfr = allow_axfr;
    }

    /// Adds a record to the zone.
    ///
    /// Records at or below a delegation point are marked as not
    /// authoritative, with the exception of DS records at the delegation
    /// point itself. Adding a delegation marks the records already below
    /// it.
    pub fn add(&mut self, mut record: Record) -> Result<(), ZoneError> {
        if !record.owner.eq_or_subdomain_of(self.apex()) {
            return Err(ZoneError::OutOfZone(record.owner));
        } else if record.rr_type == Type::SOA {
            return Err(ZoneError::ExtraSoa(record.owner));
        }
        record.auth = !self.is_occluded(&record.owner, record.rr_type);
        let new_cut = record.rr_type == Type::NS
            && record.owner != self.soa.zone
            && !self.is_cut(&record.owner);
        let position = self
            .records
            .partition_point(|r| (&r.owner, r.rr_type) <= (&record.owner, record.rr_type));
        self.records.insert(position, record);
        if new_cut {
            self.mark_below_cut(position);
        }
        Ok(())
    }

    /// Returns whether `name` (below the apex) owns an NS record.
    fn is_cut(&self, name: &Name) -> bool {
        *name != self.soa.zone
            && self
                .records
                .binary_search_by(|r| (&r.owner, r.rr_type).cmp(&(name, Type::NS)))
                .is_ok()
    }

    /// Returns whether a record of type `rr_type` at `owner` lies at or
    /// below a delegation point.
    fn is_occluded(&self, owner: &Name, rr_type: Type) -> bool {
        let depth = owner.len() - self.soa.zone.len();
        (0..depth).any(|skip| {
            !(skip == 0 && rr_type == Type::DS)
                && owner
                    .superdomain(skip)
                    .map_or(false, |ancestor| self.is_cut(&ancestor))
        })
    }

    /// Marks the records at and below the delegation whose NS record
    /// sits at `position`. In canonical order these are contiguous,
    /// starting with the cut's own records.
    fn mark_below_cut(&mut self, position: usize) {
        let cut = self.records[position].owner.clone();
        let ds_auth = !self.is_occluded(&cut, Type::DS);
        let start = self.records[..position].partition_point(|r| r.owner < cut);
        for record in &mut self.records[start..] {
            if !record.owner.eq_or_subdomain_of(&cut) {
                break;
            }
            record.auth = ds_auth && record.owner == cut && record.rr_type == Type::DS;
        }
    }

    /// Returns the records owned by `name`.
    fn records_at<'a>(&'a self, name: &'a Name) -> impl Iterator<Item = &'a Record> + 'a {
        self.records.iter().filter(move |r| r.owner == *name)
    }
}

/// An error signaling that a record could not be added to a
/// [`MemoryZone`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ZoneError {
    /// The record's owner is outside the zone.
    OutOfZone(Name),

    /// SOA records cannot be added; the zone's SOA is fixed at
    /// creation.
    ExtraSoa(Name),
}

impl fmt::Display for ZoneError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::OutOfZone(owner) => write!(f, "{} is outside of the zone", owner),
            Self::ExtraSoa(owner) => write!(f, "extra SOA record at {}", owner),
        }
    }
}

impl std::error::Error for ZoneError {}

////////////////////////////////////////////////////////////////////////
// STORE                                                              //
////////////////////////////////////////////////////////////////////////

/// A set of [`MemoryZone`]s keyed by apex.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    zones: BTreeMap<Name, MemoryZone>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a zone, replacing any zone with the same apex.
    pub fn insert(&mut self, zone: MemoryZone) {
        self.zones.insert(zone.apex().clone(), zone);
    }

    /// Returns the number of zones in the store.
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Returns the zone with apex `apex`.
    pub fn get(&self, apex: &Name) -> Option<&MemoryZone> {
        self.zones.get(apex)
    }

    /// Finds the most specific zone containing `name`.
    fn find_zone(&self, name: &Name) -> Option<&MemoryZone> {
        (0..name.len())
            .filter_map(|skip| name.superdomain(skip))
            .find_map(|candidate| self.zones.get(&candidate))
    }
}

////////////////////////////////////////////////////////////////////////
// BACKEND HANDLES                                                    //
////////////////////////////////////////////////////////////////////////

/// A [`Backend`] handle onto a shared [`MemoryStore`].
pub struct MemoryBackend {
    store: Arc<MemoryStore>,
    listing: Option<Listing>,
}

/// The progress of a zone listing. Position 0 is the SOA; position
/// `n > 0` is the zone's `n - 1`th record.
struct Listing {
    apex: Name,
    position: usize,
}

impl MemoryBackend {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            listing: None,
        }
    }
}

impl Backend for MemoryBackend {
    fn get_soa(&mut self, zone: &Name) -> Result<Option<SoaData>, Error> {
        Ok(self.store.get(zone).map(|z| z.soa.clone()))
    }

    fn list(&mut self, zone: &Name, domain_id: u32) -> Result<bool, Error> {
        match self.store.get(zone) {
            Some(z) if z.soa.domain_id == domain_id => {
                self.listing = Some(Listing {
                    apex: zone.clone(),
                    position: 0,
                });
                Ok(true)
            }
            _ => {
                self.listing = None;
                Ok(false)
            }
        }
    }

    fn get(&mut self) -> Result<Option<Record>, Error> {
        let listing = self.listing.as_mut().ok_or(Error::NotListing)?;
        let zone = self
            .store
            .get(&listing.apex)
            .ok_or_else(|| Error::Query(format!("zone {} disappeared", listing.apex)))?;
        let record = match listing.position {
            0 => Some(zone.soa.to_record()),
            n => zone.records.get(n - 1).cloned(),
        };
        if record.is_some() {
            listing.position += 1;
        } else {
            self.listing = None;
        }
        Ok(record)
    }

    fn check_acl(&mut self, rule: &str, zone: &Name, peer: IpAddr) -> Result<bool, Error> {
        match (rule, self.store.get(zone)) {
            ("allow-axfr", Some(z)) => Ok(z.allow_axfr.matches(peer)),
            _ => Ok(false),
        }
    }

    fn lookup(&mut self, qname: &Name) -> Result<Vec<Record>, Error> {
        let zone = match self.store.find_zone(qname) {
            Some(z) => z,
            None => return Ok(Vec::new()),
        };
        let mut records = Vec::new();
        if *qname == zone.soa.zone {
            records.push(zone.soa.to_record());
        }
        records.extend(zone.records_at(qname).cloned());
        Ok(records)
    }
}

/// A [`BackendFactory`] producing [`MemoryBackend`]s.
#[derive(Clone)]
pub struct MemoryBackendFactory {
    store: Arc<MemoryStore>,
}

impl MemoryBackendFactory {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

impl BackendFactory for MemoryBackendFactory {
    fn make(&self) -> Result<Box<dyn Backend>, Error> {
        Ok(Box::new(MemoryBackend::new(self.store.clone())))
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
