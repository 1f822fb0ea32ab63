//! Network reconciliation engine.
//!
//! Matches hypervisor-declared interfaces (keyed by hardware address)
//! onto locally enumerated adapters and drives the network configuration
//! tool through an ordered command sequence: destructive cleanse first,
//! then address/route/DNS assignment, then a best-effort rename.
//!
//! Both passes walk adapters in descending lexicographic name order so a
//! run is reproducible and two adapters mid-rename cannot collide.

use std::collections::HashSet;

use guestlink_core::{AgentError, NetworkInterface, Result};
use tracing::{info, warn};

use crate::exec::{ProcessQueue, ProcessRunner};
use crate::inventory::{AdapterInventory, AdapterMap, Ipv6Finder};

/// Additional rename attempts after the first failure.
const RENAME_RETRIES: u32 = 10;

/// Throwaway link-local address added and removed before each real IPv6
/// deletion. The configuration tool refuses to delete an IPv6 address
/// from an adapter until at least one add/delete cycle has happened on
/// it.
const THROWAWAY_IPV6: &str = "1::";

pub struct NetworkReconciler<R: ProcessRunner, I: AdapterInventory, F: Ipv6Finder> {
    queue: ProcessQueue<R>,
    inventory: I,
    ip_finder: F,
    net_tool: String,
}

impl<R: ProcessRunner, I: AdapterInventory, F: Ipv6Finder> NetworkReconciler<R, I, F> {
    pub fn new(
        queue: ProcessQueue<R>,
        inventory: I,
        ip_finder: F,
        net_tool: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            inventory,
            ip_finder,
            net_tool: net_tool.into(),
        }
    }

    /// Apply one declared topology to the local adapters.
    ///
    /// No reconciliation state persists across runs; idempotence relies
    /// on the cleanse pass resetting each matched adapter first.
    pub fn apply(&mut self, interfaces: &mut [NetworkInterface]) -> Result<()> {
        let mut adapters = AdapterMap::new(self.inventory.get()?);
        if self.enable_disabled_adapters(&adapters)? {
            // single corrective re-query, not a loop
            adapters = AdapterMap::new(self.inventory.get()?);
        }
        log_local_adapters(&adapters);
        verify_all_declared_present(&adapters, interfaces)?;

        let names = adapters.names_descending();

        // Cleanse every matched adapter before configuring any of them;
        // declared settings may be swapped between adapters and stale
        // state on a later adapter would otherwise clash with an earlier
        // one's new settings. The cleanse commands accumulate here and
        // are flushed by the first adapter's configuration step.
        for name in &names {
            if find_declared(&adapters, interfaces, name).is_some() {
                self.cleanse_adapter(name);
            }
        }

        for name in &names {
            if let Some(index) = find_declared(&adapters, interfaces, name) {
                self.configure_adapter(name, &mut interfaces[index])?;
            }
        }
        Ok(())
    }

    /// Enable any adapter reporting an empty hardware address.
    ///
    /// Executed synchronously, outside the batched passes; returns
    /// whether discovery needs one re-query.
    fn enable_disabled_adapters(&mut self, adapters: &AdapterMap) -> Result<bool> {
        let disabled = adapters.disabled_names();
        for name in &disabled {
            info!(adapter = %name, "adapter reports no hardware address, enabling");
            self.queue.enqueue(
                &self.net_tool,
                &format!("interface set interface name=\"{}\" admin=ENABLED", name),
            );
            self.queue.go()?;
        }
        Ok(!disabled.is_empty())
    }

    /// Queue the destructive reset of one adapter: enable it, fall back
    /// to DHCP, purge every bound IPv6 address, drop the default IPv6
    /// route. Nothing is flushed here.
    fn cleanse_adapter(&mut self, name: &str) {
        self.queue.enqueue(
            &self.net_tool,
            &format!("interface set interface name=\"{}\" admin=ENABLED", name),
        );
        self.queue.enqueue_tolerating(
            &self.net_tool,
            &format!("interface ip set address name=\"{}\" source=dhcp", name),
            &["0", "1"],
        );

        for bound in self.ip_finder.find_ipv6_addresses(name) {
            // lookup results come back as "address%scope"
            let address = bound
                .split('%')
                .next()
                .unwrap_or_default()
                .to_uppercase();

            self.queue.enqueue(
                &self.net_tool,
                &format!(
                    "interface ipv6 add address interface=\"{}\" address={}",
                    name, THROWAWAY_IPV6
                ),
            );
            self.queue.enqueue(
                &self.net_tool,
                &format!(
                    "interface ipv6 delete address interface=\"{}\" address={}",
                    name, THROWAWAY_IPV6
                ),
            );
            self.queue.enqueue(
                &self.net_tool,
                &format!(
                    "interface ipv6 delete address interface=\"{}\" address={}",
                    name, address
                ),
            );
        }

        self.queue.enqueue_tolerating(
            &self.net_tool,
            &format!("interface ipv6 delete route ::/0 \"{}\"", name),
            &["0", "1"],
        );
    }

    /// Queue and flush one adapter's declared configuration, then rename
    /// it to its declared label.
    fn configure_adapter(&mut self, name: &str, iface: &mut NetworkInterface) -> Result<()> {
        self.setup_ipv4(name, iface);
        self.setup_ipv6(name, iface);
        self.setup_dns(name, iface);
        self.queue.go()?;
        self.rename_adapter(name, &iface.label);
        Ok(())
    }

    fn setup_ipv4(&mut self, name: &str, iface: &NetworkInterface) {
        let mut primary_assigned = false;
        for tuple in &iface.ips {
            if tuple.enabled != "1" {
                continue;
            }
            if !iface.gateway.is_empty() && !primary_assigned {
                self.queue.enqueue(
                    &self.net_tool,
                    &format!(
                        "interface ip add address name=\"{}\" addr={} mask={} gateway={} gwmetric=2",
                        name, tuple.ip, tuple.netmask, iface.gateway
                    ),
                );
                primary_assigned = true;
                continue;
            }
            self.queue.enqueue(
                &self.net_tool,
                &format!(
                    "interface ip add address name=\"{}\" addr={} mask={}",
                    name, tuple.ip, tuple.netmask
                ),
            );
        }
    }

    /// Only the first declared IPv6 entry is ever applied.
    fn setup_ipv6(&mut self, name: &str, iface: &NetworkInterface) {
        let Some(tuple) = iface.ip6s.first() else {
            return;
        };
        if tuple.enabled != "1" {
            return;
        }
        self.queue.enqueue(
            &self.net_tool,
            &format!(
                "interface ipv6 add address interface=\"{}\" address={}/{}",
                name, tuple.ip, tuple.netmask
            ),
        );
        self.queue.enqueue_tolerating(
            &self.net_tool,
            &format!(
                "interface ipv6 add route prefix=::/0 interface=\"{}\" nexthop={} publish=Yes",
                name, tuple.gateway
            ),
            &["0", "1"],
        );
    }

    fn setup_dns(&mut self, name: &str, iface: &mut NetworkInterface) {
        if iface.dns.is_empty() {
            return;
        }

        let deduplicated = dedupe_preserving_order(&iface.dns);
        if deduplicated.len() != iface.dns.len() {
            info!(
                before = %iface.dns.join(", "),
                after = %deduplicated.join(", "),
                "removed duplicate DNS entries"
            );
            iface.dns = deduplicated;
        }

        self.queue.enqueue_tolerating(
            &self.net_tool,
            &format!("interface ip set dns name=\"{}\" source=dhcp", name),
            &["0", "1"],
        );
        for (i, server) in iface.dns.iter().enumerate() {
            self.queue.enqueue(
                &self.net_tool,
                &format!(
                    "interface ip add dns name=\"{}\" addr={} index={}",
                    name,
                    server,
                    i + 1
                ),
            );
        }
    }

    /// Rename an adapter to its declared label, best-effort.
    ///
    /// The target name carries the attempt counter as a suffix; after
    /// `RENAME_RETRIES` additional attempts the failure is logged and
    /// swallowed rather than aborting the reconciliation.
    fn rename_adapter(&mut self, current: &str, label: &str) {
        if current == label {
            return;
        }
        for attempt in 0..=RENAME_RETRIES {
            let target = format!("{}{}", label, attempt);
            self.queue.enqueue(
                &self.net_tool,
                &format!(
                    "interface set interface name=\"{}\" newname=\"{}\"",
                    current, target
                ),
            );
            match self.queue.go() {
                Ok(()) => return,
                Err(error) => {
                    warn!(adapter = %current, %target, %error, "failed to set interface name, retrying");
                }
            }
        }
        warn!(
            adapter = %current,
            %label,
            attempts = RENAME_RETRIES + 1,
            "giving up on interface rename"
        );
    }
}

/// Index of the declared interface matching an adapter's hardware
/// address, if any.
fn find_declared(
    adapters: &AdapterMap,
    interfaces: &[NetworkInterface],
    name: &str,
) -> Option<usize> {
    let mac = adapters.mac_of(name)?;
    if mac.is_empty() {
        return None;
    }
    interfaces.iter().position(|iface| iface.mac_uppercase() == mac)
}

/// Every declared hardware address must be present locally; the first
/// absent one aborts the run before any configuration command is issued.
fn verify_all_declared_present(
    adapters: &AdapterMap,
    interfaces: &[NetworkInterface],
) -> Result<()> {
    for iface in interfaces {
        let mac = iface.mac_uppercase();
        if adapters.name_of(&mac).is_none() {
            return Err(AgentError::InterfaceNotFound { mac });
        }
    }
    Ok(())
}

fn log_local_adapters(adapters: &AdapterMap) {
    info!("network adapters found locally:");
    for (name, mac) in adapters.iter() {
        info!("  {} ({})", name, mac);
    }
}

/// Deduplicate DNS servers preserving first-occurrence order.
pub fn dedupe_preserving_order(servers: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    servers
        .iter()
        .filter(|server| seen.insert(server.as_str()))
        .cloned()
        .collect()
}
