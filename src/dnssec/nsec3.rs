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

//! NSEC3 hashing and RDATA ([RFC 5155]).
//!
//! [RFC 5155]: https://datatracker.ietf.org/doc/html/rfc5155

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use sha1::{Digest, Sha1};

use super::type_bitmap;
use crate::name::Name;
use crate::rr::Type;
use crate::util::ascii_hex_digit_to_nibble;

/// The only hash algorithm defined for NSEC3.
const SHA1_ALGORITHM: u8 = 1;

/// The length of a SHA-1 digest.
const SHA1_LEN: usize = 20;

/// The parameters of a zone's NSEC3 chain, as carried in its
/// NSEC3PARAM record ([RFC 5155 § 4]).
///
/// The [`FromStr`] implementation accepts the presentation format of
/// NSEC3PARAM RDATA, e.g. `1 0 12 aabbccdd` (with `-` for an empty
/// salt).
///
/// [RFC 5155 § 4]: https://datatracker.ietf.org/doc/html/rfc5155#section-4
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Nsec3Param {
    pub algorithm: u8,
    pub flags: u8,
    pub iterations: u16,
    pub salt: Box<[u8]>,
}

impl Nsec3Param {
    /// Hashes `name` as described in [RFC 5155 § 5]. The name is
    /// lowercased first.
    ///
    /// [RFC 5155 § 5]: https://datatracker.ietf.org/doc/html/rfc5155#section-5
    pub fn hash(&self, name: &Name) -> [u8; SHA1_LEN] {
        let mut digest = sha1_with_salt(name.to_ascii_lowercase().wire_repr(), &self.salt);
        for _ in 0..self.iterations {
            digest = sha1_with_salt(&digest, &self.salt);
        }
        digest
    }

    /// Returns the owner name of the NSEC3 record for `name` in the
    /// zone `zone`.
    pub fn hashed_owner(&self, name: &Name, zone: &Name) -> Result<Name, crate::name::Error> {
        zone.prepend_label(base32hex_encode(&self.hash(name)).as_bytes())
    }

    /// Serializes NSEC3PARAM RDATA. The flags field is always zero in
    /// NSEC3PARAM records.
    pub fn rdata(&self) -> Box<[u8]> {
        let mut rdata = Vec::with_capacity(5 + self.salt.len());
        self.write_common_fields(&mut rdata, 0);
        rdata.into_boxed_slice()
    }

    fn write_common_fields(&self, rdata: &mut Vec<u8>, flags: u8) {
        rdata.push(self.algorithm);
        rdata.push(flags);
        rdata.extend_from_slice(&self.iterations.to_be_bytes());
        rdata.push(self.salt.len() as u8);
        rdata.extend_from_slice(&self.salt);
    }
}

fn sha1_with_salt(data: &[u8], salt: &[u8]) -> [u8; SHA1_LEN] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.update(salt);
    let mut digest = [0; SHA1_LEN];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

impl FromStr for Nsec3Param {
    type Err = &'static str;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = text.split_ascii_whitespace().collect();
        if fields.len() != 4 {
            return Err("expected algorithm, flags, iterations and salt");
        }
        let algorithm = fields[0].parse().or(Err("invalid algorithm"))?;
        if algorithm != SHA1_ALGORITHM {
            return Err("unsupported hash algorithm");
        }
        let flags = fields[1].parse().or(Err("invalid flags"))?;
        let iterations = fields[2].parse().or(Err("invalid iteration count"))?;
        let salt = if fields[3] == "-" {
            Vec::new()
        } else {
            parse_salt(fields[3])?
        };
        Ok(Self {
            algorithm,
            flags,
            iterations,
            salt: salt.into_boxed_slice(),
        })
    }
}

fn parse_salt(text: &str) -> Result<Vec<u8>, &'static str> {
    let digits = text.as_bytes();
    if digits.len() % 2 != 0 || digits.len() > 2 * u8::MAX as usize {
        return Err("invalid salt length");
    }
    digits
        .chunks(2)
        .map(|pair| {
            let high = ascii_hex_digit_to_nibble(pair[0]);
            let low = ascii_hex_digit_to_nibble(pair[1]);
            match (high, low) {
                (Some(high), Some(low)) => Ok(high << 4 | low),
                _ => Err("invalid hex digit in salt"),
            }
        })
        .collect()
}

impl fmt::Display for Nsec3Param {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {} ", self.algorithm, self.flags, self.iterations)?;
        if self.salt.is_empty() {
            f.write_str("-")
        } else {
            self.salt.iter().try_for_each(|b| write!(f, "{:02x}", b))
        }
    }
}

/// Builds NSEC3 RDATA ([RFC 5155 § 3.2]) whose next hashed owner is
/// `next_hash` (the raw digest, not its base32hex encoding).
///
/// [RFC 5155 § 3.2]: https://datatracker.ietf.org/doc/html/rfc5155#section-3.2
pub fn nsec3_rdata(param: &Nsec3Param, next_hash: &[u8], types: &BTreeSet<Type>) -> Box<[u8]> {
    let mut rdata = Vec::with_capacity(6 + param.salt.len() + next_hash.len());
    param.write_common_fields(&mut rdata, param.flags);
    rdata.push(next_hash.len() as u8);
    rdata.extend_from_slice(next_hash);
    rdata.extend(type_bitmap(types));
    rdata.into_boxed_slice()
}

/// The "Extended Hex" base 32 alphabet of [RFC 4648 § 7], lowercased as
/// is conventional for NSEC3 owner names.
///
/// [RFC 4648 § 7]: https://datatracker.ietf.org/doc/html/rfc4648#section-7
const BASE32HEX_ALPHABET: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

/// Encodes `data` in unpadded, lowercase base32hex.
pub fn base32hex_encode(data: &[u8]) -> String {
    let mut encoded = String::with_capacity((data.len() * 8 + 4) / 5);
    let mut buffer: u16 = 0;
    let mut bits = 0;
    for &octet in data {
        buffer = (buffer << 8) | octet as u16;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            encoded.push(BASE32HEX_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        encoded.push(BASE32HEX_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rfc_5155_param() -> Nsec3Param {
        "1 1 12 aabbccdd".parse().unwrap()
    }

    #[test]
    fn base32hex_encode_matches_rfc_4648_vectors() {
        assert_eq!(base32hex_encode(b""), "");
        assert_eq!(base32hex_encode(b"f"), "co");
        assert_eq!(base32hex_encode(b"fo"), "cpng");
        assert_eq!(base32hex_encode(b"foo"), "cpnmu");
        assert_eq!(base32hex_encode(b"foobar"), "cpnmuoj1e8");
    }

    #[test]
    fn hash_matches_rfc_5155_appendix_a() {
        let param = rfc_5155_param();
        let zone: Name = "example.".parse().unwrap();
        assert_eq!(
            base32hex_encode(&param.hash(&zone)),
            "0p9mhaveqvm6t7vbl5lop2u3t2rp3tom"
        );
        assert_eq!(
            base32hex_encode(&param.hash(&"A.EXAMPLE.".parse().unwrap())),
            "35mthgpgcu1qg68fab165klnsnk3dpvl"
        );
        assert_eq!(
            param
                .hashed_owner(&"a.example.".parse().unwrap(), &zone)
                .unwrap()
                .to_string(),
            "35mthgpgcu1qg68fab165klnsnk3dpvl.example."
        );
    }

    #[test]
    fn nsec3param_parses_and_displays() {
        let param = rfc_5155_param();
        assert_eq!(param.iterations, 12);
        assert_eq!(&*param.salt, &[0xaa, 0xbb, 0xcc, 0xdd]);
        assert_eq!(param.to_string(), "1 1 12 aabbccdd");
        let unsalted: Nsec3Param = "1 0 0 -".parse().unwrap();
        assert!(unsalted.salt.is_empty());
        assert_eq!(unsalted.to_string(), "1 0 0 -");
        assert!("2 0 0 -".parse::<Nsec3Param>().is_err());
        assert!("1 0 0 abc".parse::<Nsec3Param>().is_err());
        assert!("1 0 0".parse::<Nsec3Param>().is_err());
    }

    #[test]
    fn nsec3param_rdata_clears_flags() {
        assert_eq!(
            &*rfc_5155_param().rdata(),
            &[1, 0, 0, 12, 4, 0xaa, 0xbb, 0xcc, 0xdd]
        );
    }

    #[test]
    fn nsec3_rdata_works() {
        let types: BTreeSet<Type> = [Type::A, Type::RRSIG].into_iter().collect();
        let rdata = nsec3_rdata(&rfc_5155_param(), &[0x11; 20], &types);
        let mut expected = vec![1, 1, 0, 12, 4, 0xaa, 0xbb, 0xcc, 0xdd, 20];
        expected.extend_from_slice(&[0x11; 20]);
        expected.extend_from_slice(&[0x00, 0x06, 0x40, 0x00, 0x00, 0x00, 0x00, 0x02]);
        assert_eq!(&*rdata, &expected[..]);
    }
}
