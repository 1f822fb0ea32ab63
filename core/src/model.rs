//! Data model for hypervisor-declared network configuration and
//! pending control-channel commands.
//!
//! Field names follow the wire format the hypervisor writes into the
//! control channel, so the structs deserialize the payloads as-is.

use serde::{Deserialize, Serialize};

/// An IPv4 address tuple declared for an interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpTuple {
    pub ip: String,
    pub netmask: String,
    /// "1" means the tuple should be applied.
    #[serde(default)]
    pub enabled: String,
}

/// An IPv6 address tuple declared for an interface.
///
/// `netmask` carries the prefix length; the wire format reuses the
/// IPv4 field name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ipv6Tuple {
    pub ip: String,
    pub netmask: String,
    #[serde(default)]
    pub gateway: String,
    #[serde(default)]
    pub enabled: String,
}

/// A hypervisor-declared network interface.
///
/// The hardware address is the matching key against local adapters;
/// comparison is case-insensitive (canonicalized uppercase).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInterface {
    /// Hardware address of the adapter this declaration targets.
    pub mac: String,
    /// Name the adapter should carry after reconciliation.
    pub label: String,
    /// Default IPv4 gateway; empty means none.
    #[serde(default)]
    pub gateway: String,
    /// Ordered IPv4 tuples.
    #[serde(default)]
    pub ips: Vec<IpTuple>,
    /// Ordered IPv6 tuples; at most the first enabled entry is applied.
    #[serde(default)]
    pub ip6s: Vec<Ipv6Tuple>,
    /// DNS servers in priority order.
    #[serde(default)]
    pub dns: Vec<String>,
}

impl NetworkInterface {
    /// Hardware address canonicalized for matching.
    pub fn mac_uppercase(&self) -> String {
        self.mac.to_uppercase()
    }
}

/// A pending command discovered in the host-writable namespace.
///
/// `key` is the entry's relative path segment, annotated after the
/// payload is decoded; removal of the key is the dispatcher's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestCommand {
    /// Relative key the command was read from.
    #[serde(default)]
    pub key: String,
    /// Command verb.
    pub name: String,
    /// Opaque payload handed to the verb's handler.
    #[serde(default)]
    pub value: String,
}
