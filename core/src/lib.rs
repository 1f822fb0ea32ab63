//! Guestlink Core - Foundational Types and Abstractions
//!
//! This module provides the shared types, configuration, and error
//! taxonomy used across the guestlink agent.

pub mod config;
pub mod error;
pub mod model;

// Re-export commonly used types
pub use config::ChannelConfig;
pub use error::{AgentError, Result};
pub use model::{GuestCommand, IpTuple, Ipv6Tuple, NetworkInterface};

/// Guestlink version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
