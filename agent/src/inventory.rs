//! Local adapter discovery collaborators.
//!
//! The reconciliation engine only needs a name-to-MAC mapping and a way
//! to enumerate the IPv6 addresses currently bound to an adapter; both
//! are trait boundaries so the engine can be exercised without touching
//! the host. The Linux implementations read `/sys/class/net` and
//! `/proc/net/if_inet6`.

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv6Addr;
use std::path::PathBuf;

use guestlink_core::Result;
use tracing::debug;

/// Returns the local adapter name -> hardware address mapping.
///
/// An adapter that is administratively disabled may report an empty
/// hardware address; the engine enables it and re-queries.
pub trait AdapterInventory {
    fn get(&mut self) -> Result<BTreeMap<String, String>>;
}

/// Enumerates the IPv6 addresses currently bound to an adapter.
///
/// Addresses may carry an "%scope" suffix; the engine strips it.
pub trait Ipv6Finder {
    fn find_ipv6_addresses(&mut self, adapter: &str) -> Vec<String>;
}

/// Derived views over one discovery pass.
///
/// Built once per pass; never mutated in place. Hardware addresses are
/// canonicalized uppercase on entry so lookups are case-insensitive.
pub struct AdapterMap {
    by_name: BTreeMap<String, String>,
    by_mac: HashMap<String, String>,
}

impl AdapterMap {
    pub fn new(name_to_mac: BTreeMap<String, String>) -> Self {
        let by_name: BTreeMap<String, String> = name_to_mac
            .into_iter()
            .map(|(name, mac)| (name, mac.to_uppercase()))
            .collect();
        let by_mac = by_name
            .iter()
            .filter(|(_, mac)| !mac.is_empty())
            .map(|(name, mac)| (mac.clone(), name.clone()))
            .collect();
        Self { by_name, by_mac }
    }

    /// Adapter names in descending lexicographic order, the processing
    /// order for both the cleanse and configuration passes.
    pub fn names_descending(&self) -> Vec<String> {
        self.by_name.keys().rev().cloned().collect()
    }

    /// Hardware address of an adapter, uppercase.
    pub fn mac_of(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(String::as_str)
    }

    /// Adapter name owning a hardware address (case-insensitive).
    pub fn name_of(&self, mac: &str) -> Option<&str> {
        self.by_mac.get(&mac.to_uppercase()).map(String::as_str)
    }

    /// Adapters reporting an empty hardware address.
    pub fn disabled_names(&self) -> Vec<String> {
        self.by_name
            .iter()
            .filter(|(_, mac)| mac.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.by_name.iter()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Inventory reading adapter hardware addresses from sysfs.
pub struct SysfsInventory {
    root: PathBuf,
}

impl SysfsInventory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for SysfsInventory {
    fn default() -> Self {
        Self::new("/sys/class/net")
    }
}

impl AdapterInventory for SysfsInventory {
    fn get(&mut self) -> Result<BTreeMap<String, String>> {
        let mut adapters = BTreeMap::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name == "lo" {
                continue;
            }
            let mac = std::fs::read_to_string(entry.path().join("address"))
                .map(|s| s.trim().to_uppercase())
                .unwrap_or_default();
            // the loopback-style all-zero address means no hardware address
            let mac = if mac.chars().all(|c| c == '0' || c == ':') {
                String::new()
            } else {
                mac
            };
            adapters.insert(name, mac);
        }
        debug!(count = adapters.len(), "enumerated local adapters");
        Ok(adapters)
    }
}

/// IPv6 address lookup backed by `/proc/net/if_inet6`.
pub struct ProcIpv6Finder {
    path: PathBuf,
}

impl ProcIpv6Finder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ProcIpv6Finder {
    fn default() -> Self {
        Self::new("/proc/net/if_inet6")
    }
}

impl Ipv6Finder for ProcIpv6Finder {
    fn find_ipv6_addresses(&mut self, adapter: &str) -> Vec<String> {
        let Ok(contents) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        contents
            .lines()
            .filter_map(parse_if_inet6_line)
            .filter(|entry| entry.ifname == adapter)
            .map(|entry| {
                if entry.scope == SCOPE_LINK {
                    format!("{}%{}", entry.addr, entry.ifindex)
                } else {
                    entry.addr.to_string()
                }
            })
            .collect()
    }
}

/// Link-local scope value in `/proc/net/if_inet6`.
const SCOPE_LINK: u32 = 0x20;

struct IfInet6Entry {
    addr: Ipv6Addr,
    ifindex: u32,
    scope: u32,
    ifname: String,
}

/// Parse one `/proc/net/if_inet6` line:
/// `fe800000...0001 02 40 20 80 eth0`
/// (address, ifindex, prefix length, scope, flags, name; all hex but the name).
fn parse_if_inet6_line(line: &str) -> Option<IfInet6Entry> {
    let mut fields = line.split_whitespace();
    let hex = fields.next()?;
    let ifindex = u32::from_str_radix(fields.next()?, 16).ok()?;
    let _prefix = fields.next()?;
    let scope = u32::from_str_radix(fields.next()?, 16).ok()?;
    let _flags = fields.next()?;
    let ifname = fields.next()?.to_string();

    if hex.len() != 32 {
        return None;
    }
    let bits = u128::from_str_radix(hex, 16).ok()?;
    Some(IfInet6Entry {
        addr: Ipv6Addr::from(bits),
        ifindex,
        scope,
        ifname,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_adapter_map_canonicalizes_uppercase() {
        let adapters = AdapterMap::new(map(&[("Ethernet0", "aa:bb:cc:dd:ee:01")]));
        assert_eq!(adapters.mac_of("Ethernet0"), Some("AA:BB:CC:DD:EE:01"));
    }

    #[test]
    fn test_adapter_map_reverse_view() {
        let adapters = AdapterMap::new(map(&[
            ("Ethernet0", "AA:BB:CC:DD:EE:01"),
            ("Ethernet1", "AA:BB:CC:DD:EE:02"),
        ]));
        assert_eq!(adapters.name_of("aa:bb:cc:dd:ee:02"), Some("Ethernet1"));
        assert_eq!(adapters.name_of("AA:BB:CC:DD:EE:01"), Some("Ethernet0"));
        assert_eq!(adapters.name_of("AA:BB:CC:DD:EE:99"), None);
    }

    #[test]
    fn test_adapter_map_descending_order() {
        let adapters = AdapterMap::new(map(&[
            ("Ethernet0", "AA:BB:CC:DD:EE:01"),
            ("Ethernet10", "AA:BB:CC:DD:EE:03"),
            ("Ethernet2", "AA:BB:CC:DD:EE:02"),
        ]));
        // descending lexicographic, not numeric
        assert_eq!(
            adapters.names_descending(),
            vec!["Ethernet2", "Ethernet10", "Ethernet0"]
        );
    }

    #[test]
    fn test_adapter_map_disabled_names() {
        let adapters = AdapterMap::new(map(&[
            ("Ethernet0", ""),
            ("Ethernet1", "AA:BB:CC:DD:EE:02"),
        ]));
        assert_eq!(adapters.disabled_names(), vec!["Ethernet0"]);
        // empty addresses never appear in the reverse view
        assert_eq!(adapters.name_of(""), None);
    }

    #[test]
    fn test_sysfs_inventory_reads_addresses() {
        let dir = tempfile::tempdir().unwrap();
        for (name, addr) in [("eth0", "aa:bb:cc:dd:ee:01\n"), ("eth1", "aa:bb:cc:dd:ee:02\n")] {
            let d = dir.path().join(name);
            std::fs::create_dir(&d).unwrap();
            std::fs::write(d.join("address"), addr).unwrap();
        }
        // loopback is skipped
        std::fs::create_dir(dir.path().join("lo")).unwrap();

        let mut inventory = SysfsInventory::new(dir.path());
        let adapters = inventory.get().unwrap();
        assert_eq!(adapters.len(), 2);
        assert_eq!(adapters["eth0"], "AA:BB:CC:DD:EE:01");
        assert_eq!(adapters["eth1"], "AA:BB:CC:DD:EE:02");
    }

    #[test]
    fn test_sysfs_inventory_missing_or_zero_address_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("eth0")).unwrap();
        let d = dir.path().join("tun0");
        std::fs::create_dir(&d).unwrap();
        std::fs::write(d.join("address"), "00:00:00:00:00:00\n").unwrap();

        let mut inventory = SysfsInventory::new(dir.path());
        let adapters = inventory.get().unwrap();
        assert_eq!(adapters["eth0"], "");
        assert_eq!(adapters["tun0"], "");
    }

    #[test]
    fn test_parse_if_inet6_line() {
        let entry =
            parse_if_inet6_line("20010db8000000000000000000000005 02 40 00 80     eth0").unwrap();
        assert_eq!(entry.addr.to_string(), "2001:db8::5");
        assert_eq!(entry.ifindex, 2);
        assert_eq!(entry.scope, 0);
        assert_eq!(entry.ifname, "eth0");

        assert!(parse_if_inet6_line("garbage").is_none());
        assert!(parse_if_inet6_line("").is_none());
    }

    #[test]
    fn test_proc_ipv6_finder_filters_by_adapter_and_scopes_link_local() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            "fe800000000000000000000000000001 02 40 20 80     eth0\n\
             20010db8000000000000000000000005 02 40 00 80     eth0\n\
             20010db8000000000000000000000099 03 40 00 80     eth1\n",
        )
        .unwrap();

        let mut finder = ProcIpv6Finder::new(file.path());
        let addrs = finder.find_ipv6_addresses("eth0");
        assert_eq!(addrs, vec!["fe80::1%2", "2001:db8::5"]);
        assert_eq!(finder.find_ipv6_addresses("eth1"), vec!["2001:db8::99"]);
        assert!(finder.find_ipv6_addresses("eth2").is_empty());
    }

    #[test]
    fn test_proc_ipv6_finder_missing_file_yields_nothing() {
        let mut finder = ProcIpv6Finder::new("/nonexistent/if_inet6");
        assert!(finder.find_ipv6_addresses("eth0").is_empty());
    }
}
