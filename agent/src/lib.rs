//! Guestlink agent library.
//!
//! Reconciles the VM's live network configuration with metadata supplied
//! by the hypervisor's control channel. The pieces:
//! - `exec`: ordered subprocess execution with per-command tolerated
//!   exit codes
//! - `channel`: client for the hypervisor's hierarchical key/value store
//! - `inventory`: local adapter discovery collaborators
//! - `reconcile`: the network reconciliation engine
//! - `dispatch`: verb-to-handler lookup for pending commands

pub mod channel;
pub mod dispatch;
pub mod exec;
pub mod inventory;
pub mod reconcile;

pub use channel::ChannelClient;
pub use dispatch::{CommandHandler, CommandRegistry};
pub use exec::{ExecutableResult, ProcessQueue, ProcessRunner, ShellRunner};
pub use inventory::{AdapterInventory, AdapterMap, Ipv6Finder};
pub use reconcile::NetworkReconciler;
