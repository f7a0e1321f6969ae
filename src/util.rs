// Copyright 2021 Matthew Ingwersen.
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

//! Crate-private utilities.

use std::net::{IpAddr, Ipv4Addr};

/// Converts an ASCII hexadecimal digit to its numeric value. This
/// returns [`None`] if `digit` is not one of the ASCII characters
/// `0` through `9`, `A` through `F`, or `a` through `f`.
pub fn ascii_hex_digit_to_nibble(digit: u8) -> Option<u8> {
    if (b'0'..=b'9').contains(&digit) {
        Some(digit - b'0')
    } else if (b'A'..=b'F').contains(&digit) {
        Some(digit - b'A' + 10)
    } else if (b'a'..=b'f').contains(&digit) {
        Some(digit - b'a' + 10)
    } else {
        None
    }
}

/// Interprets IPv4-mapped IPv6 addresses of the kind that dual-stack
/// sockets produce (e.g. `::ffff:127.0.0.1`) as IPv4 addresses. ACL
/// matching and NOTIFY bookkeeping depend on this.
pub fn canonical_ip(address: IpAddr) -> IpAddr {
    // TODO: just use IpAddr::to_canonical once the MSRV allows it.
    match address {
        IpAddr::V4(_) => address,
        IpAddr::V6(ipv6) => {
            let octets = ipv6.octets();
            if octets[0..10].iter().all(|o| *o == 0) && octets[10] == 0xff && octets[11] == 0xff {
                IpAddr::V4(Ipv4Addr::new(
                    octets[12], octets[13], octets[14], octets[15],
                ))
            } else {
                address
            }
        }
    }
}
