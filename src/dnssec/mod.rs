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

//! DNSSEC key information and authenticated-denial chain records.
//!
//! No signing happens here. The server only needs to know which keys a
//! zone has and how its denial-of-existence chain is built, so that the
//! DNSKEY, NSEC and NSEC3 records a transfer carries can be
//! synthesized.

use std::collections::HashMap;

use crate::name::Name;

mod nsec;
mod nsec3;
pub use nsec::{nsec_rdata, type_bitmap};
pub use nsec3::{base32hex_encode, nsec3_rdata, Nsec3Param};

////////////////////////////////////////////////////////////////////////
// KEYS                                                               //
////////////////////////////////////////////////////////////////////////

/// A DNSKEY ([RFC 4034 § 2]) along with whether it is in use.
///
/// [RFC 4034 § 2]: https://datatracker.ietf.org/doc/html/rfc4034#section-2
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Dnskey {
    pub flags: u16,
    pub protocol: u8,
    pub algorithm: u8,
    pub public_key: Box<[u8]>,
    pub active: bool,
}

impl Dnskey {
    /// The Secure Entry Point flag.
    pub const SEP_FLAG: u16 = 0x0001;

    /// The Zone Key flag.
    pub const ZONE_KEY_FLAG: u16 = 0x0100;

    /// Returns whether this is a key-signing key (i.e., it has the SEP
    /// flag set).
    pub fn is_ksk(&self) -> bool {
        self.flags & Self::SEP_FLAG != 0
    }

    /// Serializes the key's RDATA.
    pub fn rdata(&self) -> Box<[u8]> {
        let mut rdata = Vec::with_capacity(4 + self.public_key.len());
        rdata.extend_from_slice(&self.flags.to_be_bytes());
        rdata.push(self.protocol);
        rdata.push(self.algorithm);
        rdata.extend_from_slice(&self.public_key);
        rdata.into_boxed_slice()
    }
}

/// The source of DNSSEC configuration for zones.
pub trait Keystore: Send + Sync {
    /// Returns all keys configured for `zone`, active or not.
    fn keys(&self, zone: &Name) -> Vec<Dnskey>;

    /// Returns whether `zone` has an active key-signing key, i.e.
    /// whether it is signed.
    fn has_active_ksk(&self, zone: &Name) -> bool;

    /// Returns the NSEC3 parameters of `zone` and whether it uses
    /// narrow mode, or `None` if the zone uses NSEC.
    fn nsec3_param(&self, zone: &Name) -> Option<(Nsec3Param, bool)>;
}

/// The DNSSEC configuration of one zone in a [`StaticKeystore`].
#[derive(Clone, Debug, Default)]
pub struct ZoneKeys {
    pub keys: Vec<Dnskey>,
    pub nsec3: Option<(Nsec3Param, bool)>,
}

/// A [`Keystore`] with fixed contents.
#[derive(Clone, Debug, Default)]
pub struct StaticKeystore {
    zones: HashMap<Name, ZoneKeys>,
}

impl StaticKeystore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, zone: Name, keys: ZoneKeys) {
        self.zones.insert(zone, keys);
    }
}

impl Keystore for StaticKeystore {
    fn keys(&self, zone: &Name) -> Vec<Dnskey> {
        self.zones
            .get(zone)
            .map(|z| z.keys.clone())
            .unwrap_or_default()
    }

    fn has_active_ksk(&self, zone: &Name) -> bool {
        self.zones
            .get(zone)
            .map_or(false, |z| z.keys.iter().any(|k| k.active && k.is_ksk()))
    }

    fn nsec3_param(&self, zone: &Name) -> Option<(Nsec3Param, bool)> {
        self.zones.get(zone).and_then(|z| z.nsec3.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(flags: u16, active: bool) -> Dnskey {
        Dnskey {
            flags,
            protocol: 3,
            algorithm: 13,
            public_key: vec![0xaa; 4].into_boxed_slice(),
            active,
        }
    }

    #[test]
    fn dnskey_rdata_works() {
        assert_eq!(
            &*key(257, true).rdata(),
            &[0x01, 0x01, 3, 13, 0xaa, 0xaa, 0xaa, 0xaa]
        );
    }

    #[test]
    fn active_ksk_is_required() {
        let zone: Name = "example.com.".parse().unwrap();
        let mut keystore = StaticKeystore::new();
        keystore.insert(
            zone.clone(),
            ZoneKeys {
                keys: vec![key(256, true), key(257, false)],
                nsec3: None,
            },
        );
        assert!(!keystore.has_active_ksk(&zone));
        assert_eq!(keystore.keys(&zone).len(), 2);

        keystore.insert(
            zone.clone(),
            ZoneKeys {
                keys: vec![key(257, true)],
                nsec3: None,
            },
        );
        assert!(keystore.has_active_ksk(&zone));
        assert!(!keystore.has_active_ksk(&"example.net.".parse().unwrap()));
        assert!(keystore.keys(&"example.net.".parse().unwrap()).is_empty());
    }
}
