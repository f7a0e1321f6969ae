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

//! Implements zone loading.

use std::fmt::Write;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::{debug, error};

use zonewire::backend::memory::{MemoryStore, MemoryZone};
use zonewire::dnssec::{Dnskey, StaticKeystore, ZoneKeys};
use zonewire::notify::RecentNotifies;
use zonewire::rr::text::parse_rdata;
use zonewire::rr::{Record, SoaData, Ttl};

use crate::config::ZoneConfig;

/// Everything the server needs to know about the configured zones.
pub struct Zones {
    pub store: MemoryStore,
    pub keystore: StaticKeystore,
    pub notifies: RecentNotifies,
}

/// Loads the zones configured in `zones`. A zone that fails to load is
/// left out (and logged); the others are still served.
pub fn load(zones: Vec<ZoneConfig>, notify_window: Duration) -> Zones {
    let mut loaded = Zones {
        store: MemoryStore::new(),
        keystore: StaticKeystore::new(),
        notifies: RecentNotifies::new(notify_window),
    };
    let mut zones_failed = 0;

    for zone_config in zones {
        debug!(
            "Loading {} ({} records).",
            zone_config.name.0,
            zone_config.records.len()
        );
        match build_zone(&zone_config) {
            Ok(zone) => {
                loaded.store.insert(zone);
                loaded
                    .keystore
                    .insert(zone_config.name.0.clone(), build_keys(&zone_config));
                for peer in &zone_config.notified {
                    loaded.notifies.record(&zone_config.name.0, *peer);
                }
            }
            Err(e) => {
                let mut message = format!("Failed to load {}:", zone_config.name.0);
                for (i, cause) in e.chain().enumerate() {
                    write!(message, "\n[{}] {}", i + 1, cause).unwrap();
                }
                error!("{}", message);
                zones_failed += 1;
            }
        }
    }

    if zones_failed == 1 {
        error!("1 zone failed to load.");
    } else if zones_failed > 1 {
        error!("{} zones failed to load.", zones_failed);
    }

    loaded
}

/// Builds the records of a single zone.
fn build_zone(zone_config: &ZoneConfig) -> Result<MemoryZone> {
    let soa = &zone_config.soa;
    let mut zone = MemoryZone::new(SoaData {
        zone: zone_config.name.0.clone(),
        mname: soa.mname.0.clone(),
        rname: soa.rname.0.clone(),
        serial: soa.serial,
        refresh: soa.refresh,
        retry: soa.retry,
        expire: soa.expire,
        minimum: Ttl::from(soa.minimum),
        ttl: Ttl::from(soa.ttl),
        domain_id: zone_config.domain_id,
    });
    zone.set_allow_axfr(zone_config.allow_axfr.iter().map(|m| m.0).collect());

    for (i, record_config) in zone_config.records.iter().enumerate() {
        let rr_type = record_config.rr_type.0;
        let rdata = parse_rdata(rr_type, &record_config.data).map_err(|e| {
            anyhow!(
                "record {} ({} {}) has invalid data: {}",
                i + 1,
                record_config.owner.0,
                rr_type,
                e
            )
        })?;
        let record = Record::new(
            record_config.owner.0.clone(),
            rr_type,
            Ttl::from(record_config.ttl),
            rdata,
        );
        zone.add(record)
            .with_context(|| format!("failed to add record {} to the zone", i + 1))?;
    }

    Ok(zone)
}

/// Collects the DNSSEC settings of a single zone.
fn build_keys(zone_config: &ZoneConfig) -> ZoneKeys {
    ZoneKeys {
        keys: zone_config
            .keys
            .iter()
            .map(|k| Dnskey {
                flags: k.flags,
                protocol: k.protocol,
                algorithm: k.algorithm,
                public_key: k.public_key.clone(),
                active: k.active,
            })
            .collect(),
        nsec3: zone_config
            .nsec3
            .as_ref()
            .map(|n| (n.params.0.clone(), n.narrow)),
    }
}

#[cfg(test)]
mod tests {
    use zonewire::backend::memory::MemoryBackend;
    use zonewire::backend::Backend;
    use zonewire::dnssec::Keystore;
    use zonewire::name::Name;
    use zonewire::notify::NotifyTracker;
    use zonewire::rr::Type;

    use super::*;
    use crate::config;

    const CONFIG: &str = r#"
        [[zones]]
        name = "example.com."
        notified = ["192.0.2.53"]
        soa = { mname = "ns1.example.com.", rname = "hostmaster.example.com.", serial = 5 }
        records = [
            { owner = "example.com.", type = "NS", data = "ns1.example.com." },
            { owner = "www.example.com.", type = "A", ttl = 300, data = "192.0.2.1" },
        ]
        keys = [{ flags = 257, algorithm = 13, public_key = "AQID" }]

        [[zones]]
        name = "broken.example."
        soa = { mname = "ns1.broken.example.", rname = "hostmaster.broken.example.", serial = 1 }
        records = [{ owner = "www.broken.example.", type = "A", data = "not an address" }]
    "#;

    #[test]
    fn good_zones_load_and_bad_ones_are_skipped() {
        let config = config::parse(CONFIG.as_bytes()).unwrap();
        let zones = load(config.zones, Duration::from_secs(60));
        assert_eq!(zones.store.len(), 1);

        let apex: Name = "example.com.".parse().unwrap();
        let zone = zones.store.get(&apex).unwrap();
        assert_eq!(zone.soa().serial, 5);
        assert_eq!(zone.records().len(), 2);
        assert!(zones.keystore.has_active_ksk(&apex));
        assert!(zones.keystore.nsec3_param(&apex).is_none());
        assert!(zones
            .notifies
            .just_notified(&apex, "192.0.2.53".parse().unwrap()));
    }

    #[test]
    fn loaded_zones_are_served() {
        let config = config::parse(CONFIG.as_bytes()).unwrap();
        let zones = load(config.zones, Duration::from_secs(60));
        let mut backend = MemoryBackend::new(std::sync::Arc::new(zones.store));
        let www: Name = "www.example.com.".parse().unwrap();
        let records = backend.lookup(&www).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].rr_type, Type::A);
        assert_eq!(&records[0].rdata[..], &[192, 0, 2, 1]);
    }
}
