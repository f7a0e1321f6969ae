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

//! Network I/O for running a [`Server`](crate::server::Server).
//!
//! The [`Server`](crate::server::Server) answers questions read from a
//! connection; this module owns the connections themselves. The
//! [`Listener`] accepts them and hands each to a thread of its own, and
//! [`framing`] reads and writes the length-prefixed messages that DNS
//! over TCP uses.

pub mod framing;
mod listener;
mod socket;

pub use listener::Listener;
