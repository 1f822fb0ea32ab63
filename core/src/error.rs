use thiserror::Error;

/// Guestlink agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// An external tool invocation exited with a code outside its
    /// tolerated set.
    #[error("Unsuccessful command execution: {tool} {args} (exit {exit_code})")]
    CommandFailed {
        tool: String,
        args: String,
        exit_code: String,
        output: Vec<String>,
    },

    /// A declared interface's hardware address has no local adapter.
    #[error("Interface with MAC address {mac} not found on machine")]
    InterfaceNotFound { mac: String },

    /// Control-channel error
    #[error("Control channel error: {0}")]
    ChannelError(String),

    /// Unknown command verb received over the control channel.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::SerializationError(err.to_string())
    }
}

/// Result type alias for guestlink operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_display() {
        let error = AgentError::CommandFailed {
            tool: "netsh".to_string(),
            args: "interface ip add address name=\"Ethernet0\"".to_string(),
            exit_code: "1".to_string(),
            output: vec!["The object already exists.".to_string()],
        };
        assert!(error.to_string().starts_with("Unsuccessful command execution: netsh"));
        assert!(error.to_string().contains("exit 1"));
    }

    #[test]
    fn test_interface_not_found_display() {
        let error = AgentError::InterfaceNotFound {
            mac: "AA:BB:CC:DD:EE:02".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Interface with MAC address AA:BB:CC:DD:EE:02 not found on machine"
        );
    }

    #[test]
    fn test_channel_error_display() {
        let error = AgentError::ChannelError("empty response".to_string());
        assert_eq!(error.to_string(), "Control channel error: empty response");
    }

    #[test]
    fn test_unknown_command_display() {
        let error = AgentError::UnknownCommand("rebootify".to_string());
        assert_eq!(error.to_string(), "Unknown command: rebootify");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "tool not found");
        let agent_error: AgentError = io_error.into();
        assert!(matches!(agent_error, AgentError::IoError(_)));
        assert!(agent_error.to_string().contains("tool not found"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> =
            serde_json::from_str("{ not json }");
        let agent_error: AgentError = result.unwrap_err().into();
        assert!(matches!(agent_error, AgentError::SerializationError(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(7)
        }
        assert_eq!(returns_ok().unwrap(), 7);
    }
}
