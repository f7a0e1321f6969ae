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

//! Tracking of recently sent NOTIFY messages.
//!
//! A secondary that was just sent a NOTIFY for a zone is expected to
//! come back for a transfer, so it may be let through even when no
//! access list names it.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::name::Name;
use crate::util::canonical_ip;

/// Answers whether a peer was recently notified of a change to a zone.
pub trait NotifyTracker: Send + Sync {
    fn just_notified(&self, zone: &Name, peer: IpAddr) -> bool;
}

/// A [`NotifyTracker`] recording NOTIFY sends in memory and honoring
/// them for a fixed window.
pub struct RecentNotifies {
    window: Duration,
    sent: Mutex<HashMap<(Name, IpAddr), Instant>>,
}

impl RecentNotifies {
    pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

    pub fn new(window: Duration) -> Self {
        Self {
            window,
            sent: Mutex::new(HashMap::new()),
        }
    }

    /// Records that a NOTIFY for `zone` was just sent to `peer`.
    pub fn record(&self, zone: &Name, peer: IpAddr) {
        let now = Instant::now();
        let mut sent = self.sent.lock().unwrap();
        sent.retain(|_, at| now.duration_since(*at) < self.window);
        sent.insert((zone.clone(), canonical_ip(peer)), now);
    }
}

impl Default for RecentNotifies {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW)
    }
}

impl NotifyTracker for RecentNotifies {
    fn just_notified(&self, zone: &Name, peer: IpAddr) -> bool {
        let sent = self.sent.lock().unwrap();
        sent.get(&(zone.clone(), canonical_ip(peer)))
            .map_or(false, |at| at.elapsed() < self.window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifies_are_per_zone_and_peer() {
        let tracker = RecentNotifies::default();
        let zone: Name = "example.com.".parse().unwrap();
        let peer: IpAddr = "192.0.2.7".parse().unwrap();
        tracker.record(&zone, peer);
        assert!(tracker.just_notified(&"EXAMPLE.com.".parse().unwrap(), peer));
        assert!(tracker.just_notified(&zone, "::ffff:192.0.2.7".parse().unwrap()));
        assert!(!tracker.just_notified(&zone, "192.0.2.8".parse().unwrap()));
        assert!(!tracker.just_notified(&"example.net.".parse().unwrap(), peer));
    }

    #[test]
    fn notifies_lapse_after_window() {
        let tracker = RecentNotifies::new(Duration::ZERO);
        let zone: Name = "example.com.".parse().unwrap();
        let peer: IpAddr = "192.0.2.7".parse().unwrap();
        tracker.record(&zone, peer);
        assert!(!tracker.just_notified(&zone, peer));
    }
}
