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

//! Implementation of data structures related to domain names.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FusedIterator;
use std::str::FromStr;

use arrayvec::ArrayVec;

mod error;
mod wire;
pub use error::Error;

/// The maximum number of labels in a domain name.
const MAX_N_LABELS: usize = 128;

/// The maximum length of the uncompressed on-the-wire representation of
/// a domain name.
const MAX_WIRE_LEN: usize = 255;

/// The maximum length of a label in a domain name (not including the
/// octet that provides the length).
const MAX_LABEL_LEN: usize = 63;

////////////////////////////////////////////////////////////////////////
// NAME STRUCTURE                                                     //
////////////////////////////////////////////////////////////////////////

/// An owned domain name.
///
/// A `Name` stores the uncompressed on-the-wire representation of a
/// domain name ([RFC 1035 § 3.1]), with the case of its octets
/// preserved. `Name`s can be constructed:
///
/// * through the [`FromStr`] implementation;
/// * from uncompressed on-the-wire names through
///   [`Name::try_from_uncompressed`]; and
/// * from compressed on-the-wire names through
///   [`Name::try_from_compressed`].
///
/// Comparisons are ASCII-case-insensitive, as the DNS requires. The
/// [`Ord`] implementation is the DNSSEC canonical ordering, so
/// `BTreeMap<Name, _>` iterates in the order that NSEC chains follow.
///
/// [RFC 1035 § 3.1]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.1
#[derive(Clone)]
pub struct Name {
    wire: Box<[u8]>,
}

impl Name {
    /// Wraps a wire representation that is already known to be valid.
    fn from_valid_wire(wire: &[u8]) -> Self {
        Self { wire: wire.into() }
    }

    /// Returns a `Name` representing the DNS root, `.`.
    pub fn root() -> Self {
        Self::from_valid_wire(&[0])
    }

    /// Returns whether the `Name` is the DNS root `.`.
    pub fn is_root(&self) -> bool {
        self.wire.len() == 1
    }

    /// Returns the number of labels in this `Name`, including the
    /// terminal null label.
    pub fn len(&self) -> usize {
        self.labels().len()
    }

    /// Returns an iterator over the labels of this `Name`, the null
    /// label included.
    pub fn labels(&self) -> Labels {
        Labels::new(self)
    }

    /// Returns the (uncompressed) on-the-wire representation of the
    /// `Name`.
    pub fn wire_repr(&self) -> &[u8] {
        &self.wire
    }

    /// Returns whether this `Name` is equal to or a subdomain of
    /// `other`.
    pub fn eq_or_subdomain_of(&self, other: &Name) -> bool {
        self.wire.len() >= other.wire.len()
            && self
                .labels()
                .rev()
                .zip(other.labels().rev())
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }

    /// Returns the superdomain obtained by skipping the first `skip`
    /// labels of the `Name`, or `None` if there aren't enough labels.
    pub fn superdomain(&self, skip: usize) -> Option<Name> {
        let mut offset = 0;
        for _ in 0..skip {
            let len = *self.wire.get(offset)? as usize;
            if len == 0 {
                return None;
            }
            offset += len + 1;
        }
        Some(Self::from_valid_wire(&self.wire[offset..]))
    }

    /// Returns a new `Name` formed by prepending `label` to this one.
    pub fn prepend_label(&self, label: &[u8]) -> Result<Name, Error> {
        if label.is_empty() {
            return Err(Error::NullNonTerminal);
        } else if label.len() > MAX_LABEL_LEN {
            return Err(Error::LabelTooLong);
        } else if label.len() + 1 + self.wire.len() > MAX_WIRE_LEN {
            return Err(Error::NameTooLong);
        }
        let mut wire = Vec::with_capacity(label.len() + 1 + self.wire.len());
        wire.push(label.len() as u8);
        wire.extend_from_slice(label);
        wire.extend_from_slice(&self.wire);
        Ok(Self {
            wire: wire.into_boxed_slice(),
        })
    }

    /// Returns a copy of this `Name` with all ASCII letters made
    /// lowercase. This is the form hashed by NSEC3 ([RFC 4034 § 6.2]).
    ///
    /// [RFC 4034 § 6.2]: https://datatracker.ietf.org/doc/html/rfc4034#section-6.2
    pub fn to_ascii_lowercase(&self) -> Name {
        // Length octets never fall in the ASCII letter range, since
        // labels are at most 63 octets long.
        Self {
            wire: self.wire.to_ascii_lowercase().into_boxed_slice(),
        }
    }

    /// Tries to parse a compressed name present at index `start` of the
    /// provided buffer. Pointers are followed; indices given in
    /// pointers are treated as equivalent to indices in `octets` (so
    /// generally one will pass an entire DNS message in `octets`). On
    /// success, the new `Name` is returned together with the number of
    /// contiguous octets read at `start`, i.e., the number of octets to
    /// skip to reach the next field of the message.
    pub fn try_from_compressed(octets: &[u8], start: usize) -> Result<(Self, usize), Error> {
        wire::parse_compressed_name(octets, start)
    }

    /// Tries to parse an uncompressed name present at the start of the
    /// provided buffer. The name need not occupy the entire buffer;
    /// extra data is ignored. If the name is valid, a new `Name` is
    /// returned along with the length of the name in octets.
    pub fn try_from_uncompressed(octets: &[u8]) -> Result<(Self, usize), Error> {
        wire::parse_uncompressed_name(octets, false)
    }

    /// Like [`Name::try_from_uncompressed`], but in addition fails if
    /// there is extra data in the buffer after the name.
    pub fn try_from_uncompressed_all(octets: &[u8]) -> Result<Self, Error> {
        wire::parse_uncompressed_name(octets, true).map(|(name, _)| name)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        for label in self.labels().filter(|label| !label.is_empty()) {
            for &octet in label {
                if octet == b'.' || octet == b'\\' {
                    write!(f, "\\{}", octet as char)?;
                } else if octet.is_ascii_graphic() {
                    write!(f, "{}", octet as char)?;
                } else {
                    write!(f, "\\{:03}", octet)?;
                }
            }
            f.write_str(".")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.wire.eq_ignore_ascii_case(&other.wire)
    }
}

impl Eq for Name {}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The [`Ord`] implementation for `Name` employs DNSSEC's canonical
/// ordering of domain names. Per [RFC 4034 § 6.1], `Name`s are ordered
/// as strings of labels read from right to left, where each label is
/// compared as a case-folded octet string.
///
/// [RFC 4034 § 6.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-6.1
impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        self.labels()
            .rev()
            .zip(other.labels().rev())
            .map(|(a, b)| cmp_label(a, b))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| self.len().cmp(&other.len()))
    }
}

fn cmp_label(a: &[u8], b: &[u8]) -> Ordering {
    a.iter()
        .map(u8::to_ascii_lowercase)
        .cmp(b.iter().map(u8::to_ascii_lowercase))
}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for octet in self.wire.iter() {
            state.write_u8(octet.to_ascii_lowercase());
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ITERATION OVER A NAME'S LABELS                                     //
////////////////////////////////////////////////////////////////////////

/// An iterator over the labels of a [`Name`], yielded as octet slices
/// without their length octets.
///
/// To use this iterator, construct one from a [`Name`] using
/// [`Name::labels`].
#[derive(Clone, Debug)]
pub struct Labels<'a> {
    wire: &'a [u8],
    offsets: ArrayVec<u8, MAX_N_LABELS>,
    front: usize,
    back: usize,
}

impl Labels<'_> {
    fn new(name: &Name) -> Labels {
        let mut offsets = ArrayVec::new();
        let mut offset = 0;
        while offset < name.wire.len() {
            offsets.push(offset as u8);
            offset += name.wire[offset] as usize + 1;
        }
        let back = offsets.len();
        Labels {
            wire: &name.wire,
            offsets,
            front: 0,
            back,
        }
    }
}

impl<'a> Iterator for Labels<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.front < self.back {
            let start = self.offsets[self.front] as usize;
            self.front += 1;
            let len = self.wire[start] as usize;
            Some(&self.wire[start + 1..start + 1 + len])
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.back - self.front;
        (len, Some(len))
    }
}

impl DoubleEndedIterator for Labels<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.back > self.front {
            self.back -= 1;
            let start = self.offsets[self.back] as usize;
            let len = self.wire[start] as usize;
            Some(&self.wire[start + 1..start + 1 + len])
        } else {
            None
        }
    }
}

impl ExactSizeIterator for Labels<'_> {}

impl FusedIterator for Labels<'_> {}

////////////////////////////////////////////////////////////////////////
// PARSING OF NAMES FROM RUST STRINGS                                 //
////////////////////////////////////////////////////////////////////////

/// Allows for conversion of a Rust [`str`] into a [`Name`]. The passed
/// string must be strictly ASCII and fully qualified. Escape sequences
/// as defined by [RFC 4343 § 2.1] are supported.
///
/// [RFC 4343 § 2.1]: https://datatracker.ietf.org/doc/html/rfc4343#section-2.1
impl FromStr for Name {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::StrEmpty);
        } else if s == "." {
            return Ok(Name::root());
        }

        let mut remaining_octets: &[u8] = s.as_ref();
        let mut wire = ArrayVec::<u8, MAX_WIRE_LEN>::new();
        let mut label_start = 0;
        wire.push(0);

        // NOTE: to check that the string is ASCII, it suffices to check
        // that each octet is ASCII as we go. This is because all
        // multi-byte characters start with an octet that is not ASCII.
        while let Some(&octet) = remaining_octets.first() {
            if octet == b'.' {
                if wire[label_start] == 0 {
                    return Err(Error::NullNonTerminal);
                }
                label_start = wire.len();
                wire.try_push(0).or(Err(Error::NameTooLong))?;
                remaining_octets = &remaining_octets[1..];
                continue;
            }

            let value = if octet == b'\\' {
                let (value, consumed) = parse_escape(&remaining_octets[1..])?;
                remaining_octets = &remaining_octets[consumed + 1..];
                value
            } else if !octet.is_ascii() {
                return Err(Error::StrNotAscii);
            } else {
                remaining_octets = &remaining_octets[1..];
                octet
            };
            if wire[label_start] as usize == MAX_LABEL_LEN {
                return Err(Error::LabelTooLong);
            }
            wire.try_push(value).or(Err(Error::NameTooLong))?;
            wire[label_start] += 1;
        }

        if wire[label_start] != 0 {
            Err(Error::NonNullTerminal)
        } else {
            Ok(Name::from_valid_wire(&wire))
        }
    }
}

/// Parses an escape sequence. We expect `remaining_octets` to start
/// with the octet immediately *after* the backslash that introduces the
/// escape sequence.
fn parse_escape(remaining_octets: &[u8]) -> Result<(u8, usize), Error> {
    if remaining_octets.is_empty() {
        Err(Error::InvalidEscape)
    } else if remaining_octets[0].is_ascii_digit() {
        if remaining_octets.len() < 3
            || !remaining_octets[1].is_ascii_digit()
            || !remaining_octets[2].is_ascii_digit()
        {
            Err(Error::InvalidEscape)
        } else {
            let hundreds = (remaining_octets[0] - b'0') as usize;
            let tens = (remaining_octets[1] - b'0') as usize;
            let ones = (remaining_octets[2] - b'0') as usize;
            let value = 100 * hundreds + 10 * tens + ones;
            if value > 255 {
                Err(Error::InvalidEscape)
            } else {
                Ok((value as u8, 3))
            }
        }
    } else {
        Ok((remaining_octets[0], 1))
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
