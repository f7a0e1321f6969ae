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

//! Server statistics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// The counters kept by a [`Server`](super::Server).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Counter {
    TcpQueries,
    TcpAnswers,
    CacheHits,
    CacheMisses,
    AxfrRefused,
    AxfrCompleted,
}

impl Counter {
    pub const ALL: [Counter; 6] = [
        Self::TcpQueries,
        Self::TcpAnswers,
        Self::CacheHits,
        Self::CacheMisses,
        Self::AxfrRefused,
        Self::AxfrCompleted,
    ];

    /// Returns the name under which the counter is reported.
    pub fn name(self) -> &'static str {
        match self {
            Self::TcpQueries => "tcp-queries",
            Self::TcpAnswers => "tcp-answers",
            Self::CacheHits => "packetcache-hit",
            Self::CacheMisses => "packetcache-miss",
            Self::AxfrRefused => "axfr-refused",
            Self::AxfrCompleted => "axfr-completed",
        }
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of [`Counter`]s that may be bumped from any thread.
#[derive(Debug, Default)]
pub struct Stats {
    values: [AtomicU64; Counter::ALL.len()],
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, counter: Counter) {
        self.values[counter as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.values[counter as usize].load(Ordering::Relaxed)
    }

    /// Returns every counter with its current value.
    pub fn snapshot(&self) -> Vec<(Counter, u64)> {
        Counter::ALL.iter().map(|&c| (c, self.get(c))).collect()
    }
}
