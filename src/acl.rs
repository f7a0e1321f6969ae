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

//! Address-based access control lists.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;

use crate::util::canonical_ip;

/// A single network given as an address or an address/prefix pair.
///
/// A bare address is a network containing only that address.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Netmask(IpNet);

impl Netmask {
    /// Returns whether `address` is within this network.
    pub fn contains(&self, address: IpAddr) -> bool {
        self.0.contains(&canonical_ip(address))
    }
}

impl From<IpNet> for Netmask {
    fn from(net: IpNet) -> Self {
        Self(net.trunc())
    }
}

impl FromStr for Netmask {
    type Err = &'static str;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        if let Ok(net) = text.parse::<IpNet>() {
            Ok(net.into())
        } else {
            let address: IpAddr = text
                .parse()
                .or(Err("not an IP address or CIDR netmask"))?;
            let prefix_len = match address {
                IpAddr::V4(_) => 32,
                IpAddr::V6(_) => 128,
            };
            IpNet::new(canonical_ip(address), prefix_len)
                .map(Into::into)
                .or(Err("invalid prefix length"))
        }
    }
}

impl fmt::Display for Netmask {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An ordered list of [`Netmask`]s. An address matches the group when
/// any member contains it.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NetmaskGroup {
    masks: Vec<Netmask>,
}

impl NetmaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, mask: Netmask) {
        self.masks.push(mask);
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    /// Returns whether `address` falls within any member network.
    /// IPv4-mapped IPv6 addresses are matched as IPv4.
    pub fn matches(&self, address: IpAddr) -> bool {
        self.masks.iter().any(|mask| mask.contains(address))
    }
}

impl FromIterator<Netmask> for NetmaskGroup {
    fn from_iter<I: IntoIterator<Item = Netmask>>(iter: I) -> Self {
        Self {
            masks: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for NetmaskGroup {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, mask) in self.masks.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            mask.fmt(f)?;
        }
        Ok(())
    }
}
