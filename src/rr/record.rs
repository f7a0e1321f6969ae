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

//! Implementation of the [`Record`] type.

use std::fmt;

use super::{Ttl, Type};
use crate::class::Class;
use crate::name::Name;

/// A single resource record as a backend hands it out.
///
/// The RDATA is kept in its uncompressed wire form, so it can be copied
/// into a message as-is.
#[derive(Clone, Eq, PartialEq)]
pub struct Record {
    pub owner: Name,
    pub rr_type: Type,
    pub class: Class,
    pub ttl: Ttl,
    pub rdata: Box<[u8]>,

    /// Whether the record is authoritative data. Glue and other
    /// occluded data below a zone cut is not.
    pub auth: bool,
}

impl Record {
    /// Creates an authoritative record of class IN.
    pub fn new(owner: Name, rr_type: Type, ttl: Ttl, rdata: impl Into<Box<[u8]>>) -> Self {
        Self {
            owner,
            rr_type,
            class: Class::IN,
            ttl,
            rdata: rdata.into(),
            auth: true,
        }
    }

    /// Returns the number of octets the record occupies in a message
    /// written without name compression.
    pub fn wire_len(&self) -> usize {
        self.owner.wire_repr().len() + 10 + self.rdata.len()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} ({} octets of RDATA)",
            self.owner,
            self.ttl,
            self.class,
            self.rr_type,
            self.rdata.len()
        )
    }
}
