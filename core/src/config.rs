use serde::{Deserialize, Serialize};

/// Control-channel configuration.
///
/// Namespace roots are construction-time values rather than process-wide
/// constants so a test (or an unusual hypervisor layout) can point the
/// client somewhere else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Path to the control-channel client binary.
    pub client_path: String,

    /// Host-writable namespace holding pending commands.
    pub host_base: String,

    /// Guest-writable namespace for acks and results.
    pub guest_base: String,

    /// Read-only VM metadata namespace.
    pub vm_data_base: String,

    /// Networking sub-namespace under the metadata root.
    pub networking_base: String,

    /// Provider-data sub-namespace under the metadata root.
    pub provider_data_base: String,

    /// Separator joining a namespace root with a relative key.
    pub separator: String,

    /// Text the client binary prints when a key does not exist.
    pub not_found_marker: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            client_path: "xenstore-client".to_string(),
            host_base: "data/host".to_string(),
            guest_base: "data/guest".to_string(),
            vm_data_base: "vm-data".to_string(),
            networking_base: "networking".to_string(),
            provider_data_base: "provider_data".to_string(),
            separator: "/".to_string(),
            not_found_marker: "No such file or directory".to_string(),
        }
    }
}

impl ChannelConfig {
    /// Join a namespace root with a relative key.
    pub fn combine(&self, base: &str, key: &str) -> String {
        format!("{}{}{}", base, self.separator, key)
    }

    /// Path of a pending-command key in the host-writable namespace.
    pub fn host_path(&self, key: &str) -> String {
        self.combine(&self.host_base, key)
    }

    /// Path of a result key in the guest-writable namespace.
    pub fn guest_path(&self, key: &str) -> String {
        self.combine(&self.guest_base, key)
    }

    /// Path of a key in the read-only VM metadata namespace.
    pub fn vm_data_path(&self, key: &str) -> String {
        self.combine(&self.vm_data_base, key)
    }

    /// Path of a key in the networking sub-namespace.
    pub fn networking_path(&self, key: &str) -> String {
        let base = self.combine(&self.vm_data_base, &self.networking_base);
        self.combine(&base, key)
    }

    /// Path of a key in the provider-data sub-namespace.
    pub fn provider_data_path(&self, key: &str) -> String {
        let base = self.combine(&self.vm_data_base, &self.provider_data_base);
        self.combine(&base, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_namespace_roots() {
        let config = ChannelConfig::default();
        assert_eq!(config.host_base, "data/host");
        assert_eq!(config.guest_base, "data/guest");
        assert_eq!(config.vm_data_base, "vm-data");
        assert_eq!(config.separator, "/");
    }

    #[test]
    fn test_combine() {
        let config = ChannelConfig::default();
        assert_eq!(config.combine("data/host", "abc"), "data/host/abc");
    }

    #[test]
    fn test_path_helpers() {
        let config = ChannelConfig::default();
        assert_eq!(config.host_path("key1"), "data/host/key1");
        assert_eq!(config.guest_path("key1"), "data/guest/key1");
        assert_eq!(config.vm_data_path("hostname"), "vm-data/hostname");
        assert_eq!(
            config.networking_path("40:40:92:9E:44:48"),
            "vm-data/networking/40:40:92:9E:44:48"
        );
        assert_eq!(
            config.provider_data_path("provider"),
            "vm-data/provider_data/provider"
        );
    }

    #[test]
    fn test_custom_separator() {
        let config = ChannelConfig {
            separator: "\\".to_string(),
            ..Default::default()
        };
        assert_eq!(config.host_path("abc"), "data/host\\abc");
    }
}
