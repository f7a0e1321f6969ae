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

//! The TCP side of an authoritative DNS server: ordinary questions,
//! zone transfers (AXFR) and recursion forwarding over TCP.
//!
//! The [`server::Server`] holds the answering logic and reaches its
//! records through the [`backend::Backend`] trait; [`io::Listener`]
//! accepts connections and hands them to it.

pub mod acl;
pub mod backend;
pub mod cache;
pub mod class;
pub mod dnssec;
pub mod io;
pub mod message;
pub mod name;
pub mod notify;
pub mod rr;
pub mod server;
pub mod thread;
mod util;
