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

//! Implementation of reading and writing of DNS messages.

mod header;
mod question;
pub mod reader;
pub mod writer;
pub use header::{Opcode, Rcode, MAX_MESSAGE_SIZE};
pub use question::{Qclass, Qtype, Question};
pub use reader::Reader;
pub use writer::Writer;

/// Rewrites the ID and RD bit of an already serialized message in
/// place. Messages shorter than a header are left alone.
pub fn patch_id_and_rd(octets: &mut [u8], id: u16, rd: bool) {
    if octets.len() < header::HEADER_SIZE {
        return;
    }
    octets[header::ID_START..header::ID_END].copy_from_slice(&id.to_be_bytes());
    if rd {
        octets[header::RD_BYTE] |= header::RD_MASK;
    } else {
        octets[header::RD_BYTE] &= !header::RD_MASK;
    }
}
