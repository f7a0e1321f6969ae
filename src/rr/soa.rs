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

//! Implementation of the [`SoaData`] type.

use super::{Record, Ttl, Type};
use crate::name::{self, Name};

/// A snapshot of a zone's SOA record, plus the backend's identifier for
/// the zone.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SoaData {
    /// The zone apex (the owner of the SOA record).
    pub zone: Name,
    pub mname: Name,
    pub rname: Name,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,

    /// The SOA MINIMUM field. Synthesized records (DNSKEY, NSEC and
    /// NSEC3) use this as their TTL.
    pub minimum: Ttl,

    /// The TTL of the SOA record itself.
    pub ttl: Ttl,

    /// The backend's identifier for the zone, passed back to it when
    /// listing the zone.
    pub domain_id: u32,
}

impl SoaData {
    /// Serializes the SOA RDATA ([RFC 1035 § 3.3.13]).
    ///
    /// [RFC 1035 § 3.3.13]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.3.13
    pub fn rdata(&self) -> Box<[u8]> {
        let mut rdata =
            Vec::with_capacity(self.mname.wire_repr().len() + self.rname.wire_repr().len() + 20);
        rdata.extend_from_slice(self.mname.wire_repr());
        rdata.extend_from_slice(self.rname.wire_repr());
        for field in [
            self.serial,
            self.refresh,
            self.retry,
            self.expire,
            u32::from(self.minimum),
        ] {
            rdata.extend_from_slice(&field.to_be_bytes());
        }
        rdata.into_boxed_slice()
    }

    /// Returns the SOA as a [`Record`].
    pub fn to_record(&self) -> Record {
        Record::new(self.zone.clone(), Type::SOA, self.ttl, self.rdata())
    }

    /// Parses SOA RDATA (with uncompressed names) back into a
    /// `SoaData`.
    pub fn from_rdata(
        zone: Name,
        ttl: Ttl,
        domain_id: u32,
        rdata: &[u8],
    ) -> Result<Self, name::Error> {
        let (mname, mname_len) = Name::try_from_uncompressed(rdata)?;
        let (rname, rname_len) = Name::try_from_uncompressed(&rdata[mname_len..])?;
        let fields = &rdata[mname_len + rname_len..];
        if fields.len() < 20 {
            return Err(name::Error::UnexpectedEom);
        } else if fields.len() > 20 {
            return Err(name::Error::ExtraData);
        }
        let field = |i: usize| u32::from_be_bytes([
            fields[4 * i],
            fields[4 * i + 1],
            fields[4 * i + 2],
            fields[4 * i + 3],
        ]);
        Ok(Self {
            zone,
            mname,
            rname,
            serial: field(0),
            refresh: field(1),
            retry: field(2),
            expire: field(3),
            minimum: Ttl::from(field(4)),
            ttl,
            domain_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rdata_round_trips() {
        let soa = SoaData {
            zone: "example.com.".parse().unwrap(),
            mname: "ns1.example.com.".parse().unwrap(),
            rname: "hostmaster.example.com.".parse().unwrap(),
            serial: 5,
            refresh: 3600,
            retry: 600,
            expire: 86400,
            minimum: Ttl::from(300),
            ttl: Ttl::from(3600),
            domain_id: 1,
        };
        let rdata = soa.rdata();
        assert_eq!(&rdata[rdata.len() - 20..rdata.len() - 16], &[0, 0, 0, 5]);
        let parsed = SoaData::from_rdata(soa.zone.clone(), soa.ttl, 1, &rdata).unwrap();
        assert_eq!(parsed, soa);

        let record = soa.to_record();
        assert_eq!(record.rr_type, Type::SOA);
        assert_eq!(record.owner, soa.zone);
    }
}
