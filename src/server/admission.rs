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

//! Admission control for TCP connections.

use std::net::IpAddr;
use std::sync::{Arc, Condvar, Mutex};

use log::warn;
use slab::Slab;

/// A fixed-capacity pool of connection slots.
///
/// Every connection session holds a [`Slot`] for its whole life. When
/// all slots are taken, [`ConnectionRoom::acquire`] blocks until one is
/// released, which in turn stops the listener from accepting more
/// connections: saturation produces backpressure rather than
/// rejections.
pub struct ConnectionRoom {
    capacity: usize,

    /// The peers of the outstanding slots.
    occupants: Mutex<Slab<IpAddr>>,

    /// Signaled whenever a slot is released.
    released: Condvar,
}

impl ConnectionRoom {
    /// Creates a room with `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        Arc::new(Self {
            capacity,
            occupants: Mutex::new(Slab::with_capacity(capacity)),
            released: Condvar::new(),
        })
    }

    /// Takes a slot for a connection with `peer`, blocking until one is
    /// free.
    pub fn acquire(self: &Arc<Self>, peer: IpAddr) -> Slot {
        let occupants = self.occupants.lock().unwrap();
        let mut occupants = self
            .released
            .wait_while(occupants, |o| o.len() >= self.capacity)
            .unwrap();
        let key = occupants.insert(peer);
        if occupants.len() >= self.capacity {
            warn!("Limit of simultaneous TCP connections reached - raise max-tcp-connections");
        }
        Slot {
            room: self.clone(),
            key,
            peer,
        }
    }

    /// Takes a slot if one is free right now.
    pub fn try_acquire(self: &Arc<Self>, peer: IpAddr) -> Option<Slot> {
        let mut occupants = self.occupants.lock().unwrap();
        if occupants.len() >= self.capacity {
            return None;
        }
        let key = occupants.insert(peer);
        Some(Slot {
            room: self.clone(),
            key,
            peer,
        })
    }

    /// Returns the total number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of slots currently held.
    pub fn occupancy(&self) -> usize {
        self.occupants.lock().unwrap().len()
    }

    /// Returns the peers of all currently held slots.
    pub fn active_peers(&self) -> Vec<IpAddr> {
        self.occupants
            .lock()
            .unwrap()
            .iter()
            .map(|(_, peer)| *peer)
            .collect()
    }
}

/// A held connection slot. The slot is released exactly once, when the
/// `Slot` is dropped, whether the session ends normally, with an error,
/// or by panicking.
pub struct Slot {
    room: Arc<ConnectionRoom>,
    key: usize,
    peer: IpAddr,
}

impl Slot {
    /// Returns the peer this slot was acquired for.
    pub fn peer(&self) -> IpAddr {
        self.peer
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        // A poisoned lock can only come from a panic inside one of the
        // short critical sections above; the slab is still consistent.
        let mut occupants = match self.room.occupants.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        occupants.remove(self.key);
        self.room.released.notify_one();
    }
}
