//! Client for the hypervisor's hierarchical key/value store.
//!
//! Every operation funnels through the single subprocess-invocation
//! primitive, driving the control-channel client binary with `dir`,
//! `read`, `write`, and `remove` subcommands. Namespace roots come from
//! the `ChannelConfig` handed in at construction.

use guestlink_core::{AgentError, ChannelConfig, GuestCommand, NetworkInterface, Result};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::exec::{ExecutableResult, ProcessRunner};

pub struct ChannelClient<R: ProcessRunner> {
    config: ChannelConfig,
    runner: R,
}

impl<R: ProcessRunner> ChannelClient<R> {
    pub fn new(config: ChannelConfig, runner: R) -> Self {
        Self { config, runner }
    }

    fn run(&mut self, args: &str) -> Result<ExecutableResult> {
        let client_path = self.config.client_path.clone();
        self.runner.run(&client_path, args)
    }

    /// First output line of a `read` at the given absolute path.
    fn read_value(&mut self, path: &str) -> Result<String> {
        let result = self.run(&format!("read {}", path))?;
        result
            .output
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::ChannelError(format!("empty response reading {path}")))
    }

    /// List the direct children of a hierarchical key, one per line.
    pub fn read(&mut self, path: &str) -> Result<Vec<String>> {
        Ok(self.run(&format!("dir {}", path))?.output)
    }

    /// Fetch the value of a key under the host-writable namespace.
    ///
    /// The underlying tool's "not found" text is returned as the value,
    /// not swallowed; callers that care inspect it (see `get_commands`).
    pub fn read_key(&mut self, key: &str) -> Result<String> {
        let path = self.config.host_path(key);
        self.read_value(&path)
    }

    /// Fetch a key under the read-only VM metadata namespace.
    pub fn read_vm_data(&mut self, key: &str) -> Result<String> {
        let path = self.config.vm_data_path(key);
        self.read_value(&path)
    }

    /// Fetch a key under the networking sub-namespace.
    pub fn read_vm_data_key(&mut self, key: &str) -> Result<String> {
        let path = self.config.networking_path(key);
        self.read_value(&path)
    }

    /// Fetch a key under the provider-data sub-namespace.
    ///
    /// Provider metadata is optional: any failure (non-zero exit, empty
    /// output, tool missing) degrades to an empty string.
    pub fn read_vm_provider_data_key(&mut self, key: &str) -> String {
        let path = self.config.provider_data_path(key);
        match self.run(&format!("read {}", path)) {
            Ok(result) if result.exit_code == "0" => {
                result.output.into_iter().next().unwrap_or_default()
            }
            _ => String::new(),
        }
    }

    /// Write a value under the guest-writable namespace.
    ///
    /// The value is quoted and quote-escaped so an embedded `"` cannot
    /// break the tool's argument parsing.
    pub fn write(&mut self, key: &str, value: &str) -> Result<()> {
        let path = self.config.guest_path(key);
        let args = format!("write {} \"{}\"", path, escape_quotes(value));
        self.run(&args)?;
        Ok(())
    }

    /// Delete a key under the host-writable namespace.
    pub fn remove(&mut self, key: &str) -> Result<()> {
        let path = self.config.host_path(key);
        self.run(&format!("remove {}", path))?;
        Ok(())
    }

    /// Discover pending commands in the host-writable namespace.
    ///
    /// Keys that are not well-formed message identifiers are dropped;
    /// keys that vanish between listing and fetch (consumed by a
    /// concurrent removal) are skipped silently.
    pub fn get_commands(&mut self) -> Result<Vec<GuestCommand>> {
        let host_base = self.config.host_base.clone();
        let keys = validate_keys(self.read(&host_base)?);

        let mut commands = Vec::new();
        for key in keys {
            let value = self.read_key(&key)?;
            if value.contains(&self.config.not_found_marker) {
                debug!(%key, "pending command vanished before fetch, skipping");
                continue;
            }
            let mut command: GuestCommand = serde_json::from_str(&value)?;
            command.key = key;
            commands.push(command);
        }
        Ok(commands)
    }
}

/// Escape embedded double quotes for the tool's argument parser.
pub fn escape_quotes(value: &str) -> String {
    value.replace('"', "\\\"")
}

/// Drop malformed or placeholder entries from a listed key set.
///
/// Pending-command keys are message UUIDs; anything else in the
/// namespace is noise.
fn validate_keys(keys: Vec<String>) -> Vec<String> {
    keys.into_iter()
        .map(|key| key.trim().trim_matches('"').to_string())
        .filter(|key| Uuid::parse_str(key).is_ok())
        .collect()
}

/// Read the declared interface set from the networking sub-namespace.
///
/// Children of the namespace are hardware addresses; each value is a
/// JSON-encoded `NetworkInterface`.
pub fn declared_interfaces<R: ProcessRunner>(
    client: &mut ChannelClient<R>,
) -> Result<Vec<NetworkInterface>> {
    let networking = client.config.networking_base.clone();
    let base = client.config.vm_data_path(&networking);
    let macs = client.read(&base)?;

    let mut interfaces = Vec::new();
    for mac in macs {
        let mac = mac.trim().trim_matches('"').to_string();
        if mac.is_empty() {
            continue;
        }
        let value = client.read_vm_data_key(&mac)?;
        match serde_json::from_str::<NetworkInterface>(&value) {
            Ok(iface) => interfaces.push(iface),
            Err(e) => {
                warn!(%mac, error = %e, "skipping undecodable interface declaration");
            }
        }
    }
    Ok(interfaces)
}
