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

//! NSEC RDATA and the type bitmap shared with NSEC3.

use std::collections::BTreeSet;

use arrayvec::ArrayVec;

use crate::name::Name;
use crate::rr::Type;

/// Encodes the type bitmap field of NSEC and NSEC3 RDATA ([RFC 4034
/// § 4.1.2]).
///
/// [RFC 4034 § 4.1.2]: https://datatracker.ietf.org/doc/html/rfc4034#section-4.1.2
pub fn type_bitmap(types: &BTreeSet<Type>) -> Vec<u8> {
    let mut bitmap = Vec::new();
    let mut window: Option<(u8, ArrayVec<u8, 32>)> = None;

    for &rr_type in types {
        let [number, low] = u16::from(rr_type).to_be_bytes();
        match window {
            Some((current, _)) if current == number => (),
            _ => {
                if let Some((current, bits)) = window.take() {
                    push_window(&mut bitmap, current, &bits);
                }
                window = Some((number, ArrayVec::new()));
            }
        }
        if let Some((_, ref mut bits)) = window {
            let octet = (low / 8) as usize;
            while bits.len() <= octet {
                bits.push(0);
            }
            bits[octet] |= 0x80 >> (low % 8);
        }
    }

    if let Some((current, bits)) = window {
        push_window(&mut bitmap, current, &bits);
    }
    bitmap
}

fn push_window(bitmap: &mut Vec<u8>, number: u8, bits: &[u8]) {
    bitmap.push(number);
    bitmap.push(bits.len() as u8);
    bitmap.extend_from_slice(bits);
}

/// Builds NSEC RDATA ([RFC 4034 § 4.1]) pointing at `next`.
///
/// [RFC 4034 § 4.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-4.1
pub fn nsec_rdata(next: &Name, types: &BTreeSet<Type>) -> Box<[u8]> {
    let mut rdata = next.wire_repr().to_vec();
    rdata.extend(type_bitmap(types));
    rdata.into_boxed_slice()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_bitmap_matches_rfc_4034_example() {
        let types: BTreeSet<Type> = [Type::A, Type::MX, Type::RRSIG, Type::NSEC, Type::from(1234)]
            .into_iter()
            .collect();
        let mut expected = vec![0x00, 0x06, 0x40, 0x01, 0x00, 0x00, 0x00, 0x03, 0x04, 0x1b];
        expected.extend_from_slice(&[0; 26]);
        expected.push(0x20);
        assert_eq!(type_bitmap(&types), expected);
    }

    #[test]
    fn type_bitmap_of_nothing_is_empty() {
        assert!(type_bitmap(&BTreeSet::new()).is_empty());
    }

    #[test]
    fn nsec_rdata_works() {
        let types: BTreeSet<Type> = [Type::A, Type::RRSIG, Type::NSEC].into_iter().collect();
        let rdata = nsec_rdata(&"host.example.com.".parse().unwrap(), &types);
        let mut expected = b"\x04host\x07example\x03com\x00".to_vec();
        expected.extend_from_slice(&[0x00, 0x06, 0x40, 0x00, 0x00, 0x00, 0x00, 0x03]);
        assert_eq!(&*rdata, &expected[..]);
    }
}
