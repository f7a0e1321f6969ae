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

//! Implements the server configuration file.

use std::fmt::{self, Write};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::Engine;
use log::Level::Debug;
use log::{debug, log_enabled};
use paste::paste;
use serde::{de, Deserialize};

use zonewire::acl::Netmask;
use zonewire::dnssec::Nsec3Param;
use zonewire::name::Name;
use zonewire::rr::Type;
use zonewire::server;

////////////////////////////////////////////////////////////////////////
// CONFIGURATION LOADING                                              //
////////////////////////////////////////////////////////////////////////

/// Loads the server configuration from the file given by `path`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let raw_config = fs::read(path.as_ref()).context("failed to read the configuration file")?;
    let config = parse(&raw_config)?;
    log_config_summary(&config);
    Ok(config)
}

/// Parses a configuration file's contents.
pub fn parse(raw_config: &[u8]) -> Result<Config> {
    toml::from_slice(raw_config).context("failed to parse the configuration file")
}

/// Summarizes the configuration in the log, if the debug log level is
/// enabled.
fn log_config_summary(config: &Config) {
    if !log_enabled!(Debug) {
        // Don't compute the message if it will never be printed.
        return;
    }

    let recursor = match config.tcp.recursor {
        Some(addr) => addr.to_string(),
        None => "none".to_owned(),
    };
    let axfr = if config.tcp.disable_axfr {
        "disabled"
    } else if config.tcp.per_zone_axfr_acls {
        "per-zone ACLs"
    } else if config.tcp.allow_axfr.is_empty() {
        "anyone"
    } else {
        "allow-list"
    };

    let mut message = format!(
        "Configuration loaded:\n\
         Addresses:       {}\n\
         Port:            {}\n\
         Connections:     {}\n\
         AXFR:            {}\n\
         Recursor:        {}\n\
         Zones:           ",
        config.listen.addresses().join(", "),
        config.listen.port,
        config.tcp.max_connections,
        axfr,
        recursor,
    );
    if config.zones.is_empty() {
        message.push_str("none");
    } else {
        write!(message, "{}", config.zones.len()).unwrap();
        for zone_config in &config.zones {
            write!(
                message,
                "\n  {} ({} records, {} keys)",
                zone_config.name.0,
                zone_config.records.len(),
                zone_config.keys.len(),
            )
            .unwrap();
        }
    }
    debug!("{}", message);
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION FILE STRUCTURE                                       //
////////////////////////////////////////////////////////////////////////

/// The complete configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub tcp: TcpConfig,
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION SECTION: LISTENING                                   //
////////////////////////////////////////////////////////////////////////

/// The local addresses to accept connections on.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenConfig {
    #[serde(default = "default_local_address")]
    pub local_address: Vec<Ipv4Addr>,
    #[serde(default)]
    pub local_ipv6: Vec<Ipv6Addr>,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_local_address() -> Vec<Ipv4Addr> {
    vec![Ipv4Addr::LOCALHOST]
}

fn default_port() -> u16 {
    53
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            local_address: default_local_address(),
            local_ipv6: Vec::new(),
            port: default_port(),
        }
    }
}

impl ListenConfig {
    fn addresses(&self) -> Vec<String> {
        self.local_address
            .iter()
            .map(ToString::to_string)
            .chain(self.local_ipv6.iter().map(ToString::to_string))
            .collect()
    }
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION SECTION: TCP SERVER                                  //
////////////////////////////////////////////////////////////////////////

/// Options of the TCP server. Times are in seconds.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TcpConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_io_timeout")]
    pub io_timeout: u64,
    #[serde(default)]
    pub allow_axfr: Vec<ConfigNetmask>,
    #[serde(default)]
    pub per_zone_axfr_acls: bool,
    #[serde(default)]
    pub disable_axfr: bool,
    #[serde(default)]
    pub strict_rfc_axfrs: bool,
    #[serde(default = "default_axfr_chunk")]
    pub axfr_chunk: usize,
    pub recursor: Option<SocketAddr>,
    #[serde(default)]
    pub log_dns_details: bool,
    #[serde(default = "default_packet_cache_ttl")]
    pub packet_cache_ttl: u64,
    #[serde(default = "default_notify_window")]
    pub notify_window: u64,
}

fn default_max_connections() -> usize {
    10
}

fn default_io_timeout() -> u64 {
    5
}

fn default_axfr_chunk() -> usize {
    100
}

fn default_packet_cache_ttl() -> u64 {
    10
}

fn default_notify_window() -> u64 {
    60
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            io_timeout: default_io_timeout(),
            allow_axfr: Vec::new(),
            per_zone_axfr_acls: false,
            disable_axfr: false,
            strict_rfc_axfrs: false,
            axfr_chunk: default_axfr_chunk(),
            recursor: None,
            log_dns_details: false,
            packet_cache_ttl: default_packet_cache_ttl(),
            notify_window: default_notify_window(),
        }
    }
}

impl From<&TcpConfig> for server::Config {
    fn from(toml_config: &TcpConfig) -> Self {
        Self {
            max_connections: toml_config.max_connections,
            io_timeout: Duration::from_secs(toml_config.io_timeout),
            allow_axfr: toml_config.allow_axfr.iter().map(|m| m.0).collect(),
            per_zone_axfr_acls: toml_config.per_zone_axfr_acls,
            disable_axfr: toml_config.disable_axfr,
            strict_rfc_axfrs: toml_config.strict_rfc_axfrs,
            axfr_chunk: toml_config.axfr_chunk,
            recursor: toml_config.recursor,
            log_dns_details: toml_config.log_dns_details,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION SECTION: ZONES                                       //
////////////////////////////////////////////////////////////////////////

/// The configuration of a single zone.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZoneConfig {
    pub name: ConfigName,
    #[serde(default)]
    pub domain_id: u32,
    pub soa: SoaConfig,
    #[serde(default)]
    pub allow_axfr: Vec<ConfigNetmask>,
    #[serde(default)]
    pub records: Vec<RecordConfig>,
    #[serde(default)]
    pub keys: Vec<KeyConfig>,
    pub nsec3: Option<Nsec3Config>,

    /// Peers to treat as having just been sent a NOTIFY for the zone.
    #[serde(default)]
    pub notified: Vec<IpAddr>,
}

/// The SOA of a zone. The owner is the zone name.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SoaConfig {
    pub mname: ConfigName,
    pub rname: ConfigName,
    pub serial: u32,
    #[serde(default = "default_refresh")]
    pub refresh: u32,
    #[serde(default = "default_retry")]
    pub retry: u32,
    #[serde(default = "default_expire")]
    pub expire: u32,
    #[serde(default = "default_ttl")]
    pub minimum: u32,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

fn default_refresh() -> u32 {
    10800
}

fn default_retry() -> u32 {
    3600
}

fn default_expire() -> u32 {
    604800
}

fn default_ttl() -> u32 {
    3600
}

/// A record in presentation format, e.g. `data = "192.0.2.1"` for an A
/// record.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordConfig {
    pub owner: ConfigName,
    #[serde(rename = "type")]
    pub rr_type: ConfigType,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    pub data: String,
}

/// A DNSKEY of the zone.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyConfig {
    pub flags: u16,
    #[serde(default = "default_protocol")]
    pub protocol: u8,
    pub algorithm: u8,
    #[serde(deserialize_with = "deserialize_base64")]
    pub public_key: Box<[u8]>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_protocol() -> u8 {
    3
}

fn default_active() -> bool {
    true
}

/// NSEC3 settings of a zone; without them, a signed zone uses NSEC.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Nsec3Config {
    pub params: ConfigNsec3Param,
    #[serde(default)]
    pub narrow: bool,
}

/// Deserializes base64 (standard alphabet, padded) into octets.
fn deserialize_base64<'de, D>(deserializer: D) -> Result<Box<[u8]>, D::Error>
where
    D: de::Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    base64::engine::general_purpose::STANDARD
        .decode(text.trim())
        .map(Vec::into_boxed_slice)
        .map_err(|e| de::Error::custom(format!("invalid base64: {}", e)))
}

////////////////////////////////////////////////////////////////////////
// WRAPPERS OVER ZONEWIRE TYPES FOR SERDE                             //
////////////////////////////////////////////////////////////////////////

/// Generates a deserializable `ConfigX` structure wrapping an `X` type
/// from [`zonewire`], using its [`FromStr`](std::str::FromStr)
/// implementation.
macro_rules! make_serde_wrapper {
    ($wrapper:ident, $over:ty, $description:literal) => {
        /// A macro-generated deserializable wrapper over a [`zonewire`]
        /// type.
        #[derive(Clone, Debug)]
        pub struct $wrapper(pub $over);

        impl<'de> Deserialize<'de> for $wrapper {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: de::Deserializer<'de>,
            {
                deserializer.deserialize_str(paste! { [<$wrapper Visitor>] })
            }
        }

        paste! {
            /// A macro-generated [`Visitor`](de::Visitor).
            #[derive(Debug)]
            struct [<$wrapper Visitor>];
        }

        impl<'de> de::Visitor<'de> for paste! { [<$wrapper Visitor>] } {
            type Value = $wrapper;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str($description)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value
                    .parse()
                    .map($wrapper)
                    .map_err(|e| E::custom(format!("invalid {}: {}", $description, e)))
            }
        }
    };
}

make_serde_wrapper!(ConfigName, Name, "domain name");
make_serde_wrapper!(ConfigNetmask, Netmask, "address or netmask");
make_serde_wrapper!(ConfigType, Type, "record type");
make_serde_wrapper!(ConfigNsec3Param, Nsec3Param, "NSEC3 parameters");
