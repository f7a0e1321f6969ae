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

//! Caching of serialized answers.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::message::{Qclass, Qtype, Question};
use crate::name::Name;

/// The normalized form of a query used to look up cached answers.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct CacheKey {
    qname: Name,
    qtype: Qtype,
    qclass: Qclass,
}

impl CacheKey {
    pub fn new(question: &Question) -> Self {
        Self {
            qname: question.qname.to_ascii_lowercase(),
            qtype: question.qtype,
            qclass: question.qclass,
        }
    }
}

/// A store of previously built answers.
///
/// Cached answers are complete messages; the caller is responsible for
/// patching the transaction ID and RD bit of a hit to match the query
/// being answered (see [`patch_id_and_rd`]).
///
/// [`patch_id_and_rd`]: crate::message::patch_id_and_rd
pub trait PacketCache: Send + Sync {
    fn lookup(&self, key: &CacheKey) -> Option<Vec<u8>>;
    fn insert(&self, key: CacheKey, answer: Vec<u8>);
}

/// A [`PacketCache`] that keeps every answer for a fixed lifetime.
pub struct MemoryPacketCache {
    lifetime: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<CacheKey, Entry>>,
}

struct Entry {
    expires: Instant,
    answer: Vec<u8>,
}

impl MemoryPacketCache {
    /// The default bound on the number of cached answers.
    pub const DEFAULT_MAX_ENTRIES: usize = 100_000;

    /// Creates a cache whose entries live for `lifetime`. A zero
    /// lifetime disables caching altogether.
    pub fn new(lifetime: Duration) -> Self {
        Self::with_max_entries(lifetime, Self::DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(lifetime: Duration, max_entries: usize) -> Self {
        Self {
            lifetime,
            max_entries,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PacketCache for MemoryPacketCache {
    fn lookup(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.expires > Instant::now() => Some(entry.answer.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn insert(&self, key: CacheKey, answer: Vec<u8>) {
        if self.lifetime.is_zero() || self.max_entries == 0 {
            return;
        }
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            entries.retain(|_, entry| entry.expires > now);
            if entries.len() >= self.max_entries {
                return;
            }
        }
        entries.insert(
            key,
            Entry {
                expires: now + self.lifetime,
                answer,
            },
        );
    }
}
