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

//! Authorization of zone transfers.

use std::net::IpAddr;

use log::warn;

use super::Server;
use crate::backend;
use crate::name::Name;

/// The outcome of an authorization check, naming the rule that decided
/// it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Decision {
    /// Transfers are disabled server-wide.
    Disabled,

    /// The global allow-list is empty or matches the peer.
    AllowList,

    /// The zone's own `allow-axfr` access list matches the peer.
    ZoneAcl,

    /// The peer was recently sent a NOTIFY for the zone.
    RecentNotify,

    /// No rule permitted the transfer.
    Refused,
}

impl Decision {
    pub fn is_permitted(self) -> bool {
        matches!(self, Self::AllowList | Self::ZoneAcl | Self::RecentNotify)
    }
}

impl Server {
    /// Decides whether `peer` may transfer `zone`. The first matching
    /// rule wins:
    ///
    /// 1. if transfers are disabled, refuse;
    /// 2. without per-zone ACLs, permit if the global allow-list is
    ///    empty or matches;
    /// 3. with per-zone ACLs, permit if the zone exists and its
    ///    `allow-axfr` list matches (asked through the shared backend);
    /// 4. permit if the peer was just sent a NOTIFY for the zone;
    /// 5. otherwise refuse.
    ///
    /// A non-matching global allow-list does not refuse outright; the
    /// NOTIFY rule still applies.
    pub(super) fn authorize_transfer(
        &self,
        zone: &Name,
        peer: IpAddr,
    ) -> Result<Decision, backend::Error> {
        if self.config.disable_axfr {
            return Ok(Decision::Disabled);
        }

        if !self.config.per_zone_axfr_acls {
            if self.config.allow_axfr.is_empty() || self.config.allow_axfr.matches(peer) {
                return Ok(Decision::AllowList);
            }
        } else {
            let permitted = self.shared.with(|backend| {
                if backend.get_soa(zone)?.is_some() {
                    backend.check_acl("allow-axfr", zone, peer)
                } else {
                    Ok(false)
                }
            })?;
            if permitted {
                return Ok(Decision::ZoneAcl);
            }
        }

        if self.notifies.just_notified(zone, peer) {
            warn!(
                "Approved AXFR of '{}' from recently notified slave {}",
                zone, peer
            );
            return Ok(Decision::RecentNotify);
        }

        Ok(Decision::Refused)
    }
}

#[cfg(test)]
pub(super) mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::acl::{Netmask, NetmaskGroup};
    use crate::backend::memory::tests::{example_soa, example_store, example_zone};
    use crate::backend::memory::MemoryStore;
    use crate::backend::{Backend, BackendFactory};
    use crate::cache::MemoryPacketCache;
    use crate::dnssec::StaticKeystore;
    use crate::notify::RecentNotifies;
    use crate::rr::{Record, SoaData};
    use crate::server::tests::server_with;
    use crate::server::Config;

    fn zone() -> Name {
        "example.com.".parse().unwrap()
    }

    fn peer() -> IpAddr {
        "192.0.2.53".parse().unwrap()
    }

    fn allow_list(masks: &[&str]) -> NetmaskGroup {
        masks.iter().map(|m| m.parse::<Netmask>().unwrap()).collect()
    }

    /// A backend that knows every zone but fails every ACL check.
    struct AclFailureBackend;

    impl Backend for AclFailureBackend {
        fn get_soa(&mut self, _: &Name) -> Result<Option<SoaData>, backend::Error> {
            Ok(Some(example_soa()))
        }

        fn list(&mut self, _: &Name, _: u32) -> Result<bool, backend::Error> {
            Ok(false)
        }

        fn get(&mut self) -> Result<Option<Record>, backend::Error> {
            Err(backend::Error::NotListing)
        }

        fn check_acl(&mut self, _: &str, _: &Name, _: IpAddr) -> Result<bool, backend::Error> {
            Err(backend::Error::Query("ACL table unavailable".to_owned()))
        }

        fn lookup(&mut self, _: &Name) -> Result<Vec<Record>, backend::Error> {
            Ok(Vec::new())
        }
    }

    struct AclFailureFactory;

    impl BackendFactory for AclFailureFactory {
        fn make(&self) -> Result<Box<dyn Backend>, backend::Error> {
            Ok(Box::new(AclFailureBackend))
        }
    }

    /// A server using per-zone ACLs whose backend fails the ACL check.
    pub(in crate::server) fn acl_failure_server() -> Server {
        let config = Config {
            per_zone_axfr_acls: true,
            ..Config::default()
        };
        Server::new(
            config,
            Arc::new(AclFailureFactory),
            Arc::new(MemoryPacketCache::new(Duration::ZERO)),
            Arc::new(StaticKeystore::new()),
            Arc::new(RecentNotifies::default()),
        )
    }

    #[test]
    fn disabled_refuses_even_listed_peers() {
        let config = Config {
            disable_axfr: true,
            allow_axfr: allow_list(&["192.0.2.0/24"]),
            ..Config::default()
        };
        let server = server_with(config, example_store(), RecentNotifies::default());
        assert_eq!(
            server.authorize_transfer(&zone(), peer()).unwrap(),
            Decision::Disabled
        );
    }

    #[test]
    fn empty_allow_list_permits_everyone() {
        let server = server_with(Config::default(), example_store(), RecentNotifies::default());
        assert_eq!(
            server.authorize_transfer(&zone(), peer()).unwrap(),
            Decision::AllowList
        );
    }

    #[test]
    fn allow_list_must_match() {
        let config = Config {
            allow_axfr: allow_list(&["198.51.100.0/24", "2001:db8::/32"]),
            ..Config::default()
        };
        let server = server_with(config, example_store(), RecentNotifies::default());
        assert_eq!(
            server.authorize_transfer(&zone(), "198.51.100.7".parse().unwrap()).unwrap(),
            Decision::AllowList
        );
        assert_eq!(
            server.authorize_transfer(&zone(), peer()).unwrap(),
            Decision::Refused
        );
    }

    #[test]
    fn recent_notify_overrides_allow_list_miss() {
        let config = Config {
            allow_axfr: allow_list(&["198.51.100.0/24"]),
            ..Config::default()
        };
        let notifies = RecentNotifies::default();
        notifies.record(&zone(), peer());
        let server = server_with(config, example_store(), notifies);
        assert_eq!(
            server.authorize_transfer(&zone(), peer()).unwrap(),
            Decision::RecentNotify
        );
        assert_eq!(
            server
                .authorize_transfer(&"example.net.".parse().unwrap(), peer())
                .unwrap(),
            Decision::Refused
        );
    }

    #[test]
    fn per_zone_acls_ignore_the_global_list() {
        let mut zone_data = example_zone();
        zone_data.set_allow_axfr(allow_list(&["192.0.2.0/24"]));
        let mut store = MemoryStore::new();
        store.insert(zone_data);
        let config = Config {
            per_zone_axfr_acls: true,
            allow_axfr: allow_list(&["198.51.100.0/24"]),
            ..Config::default()
        };
        let server = server_with(config, Arc::new(store), RecentNotifies::default());
        assert_eq!(
            server.authorize_transfer(&zone(), peer()).unwrap(),
            Decision::ZoneAcl
        );
        assert_eq!(
            server
                .authorize_transfer(&zone(), "198.51.100.7".parse().unwrap())
                .unwrap(),
            Decision::Refused
        );
    }

    #[test]
    fn per_zone_acls_refuse_unknown_zones() {
        let config = Config {
            per_zone_axfr_acls: true,
            ..Config::default()
        };
        let server = server_with(config, example_store(), RecentNotifies::default());
        assert_eq!(
            server
                .authorize_transfer(&"example.net.".parse().unwrap(), peer())
                .unwrap(),
            Decision::Refused
        );
    }

    #[test]
    fn acl_check_failure_discards_the_shared_backend() {
        let server = acl_failure_server();
        assert!(server.shared.is_launched());
        assert_eq!(
            server.authorize_transfer(&zone(), peer()),
            Err(backend::Error::Query("ACL table unavailable".to_owned()))
        );
        assert!(!server.shared.is_launched());
    }

    #[test]
    fn only_permitting_decisions_permit() {
        assert!(Decision::AllowList.is_permitted());
        assert!(Decision::ZoneAcl.is_permitted());
        assert!(Decision::RecentNotify.is_permitted());
        assert!(!Decision::Disabled.is_permitted());
        assert!(!Decision::Refused.is_permitted());
    }
}
