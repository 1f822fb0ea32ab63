//! Guestlink agent entry point.
//!
//! Polls the hypervisor control channel for pending commands and
//! dispatches them: `resetnetwork` reconciles the VM's adapters with the
//! declared topology, `features` enumerates supported verbs, `version`
//! reports the agent version. Each consumed command is acknowledged
//! under the guest-writable namespace and removed from the host-writable
//! one.

use std::thread;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use guestlink_agent::channel::{declared_interfaces, ChannelClient};
use guestlink_agent::dispatch::{CommandHandler, CommandRegistry, FeaturesHandler};
use guestlink_agent::exec::{ExecutableResult, ProcessQueue, ShellRunner};
use guestlink_agent::inventory::{ProcIpv6Finder, SysfsInventory};
use guestlink_agent::reconcile::NetworkReconciler;
use guestlink_core::{ChannelConfig, Result};

#[derive(Parser)]
#[command(name = "guestlink-agent", version, about = "Hypervisor guest agent")]
struct Cli {
    /// Path to the control-channel client binary
    #[arg(long, default_value = "xenstore-client")]
    channel_tool: String,

    /// Path to the network configuration tool
    #[arg(long, default_value = "netsh")]
    net_tool: String,

    /// Seconds between polls of the pending-command namespace
    #[arg(long, default_value_t = 60)]
    poll_interval: u64,

    /// Process pending commands once and exit
    #[arg(long)]
    once: bool,
}

/// Reconciles the declared network topology onto the local adapters.
struct ResetNetworkHandler {
    channel: ChannelConfig,
    net_tool: String,
}

impl CommandHandler for ResetNetworkHandler {
    fn execute(&mut self, _value: &str) -> Result<ExecutableResult> {
        let mut client = ChannelClient::new(self.channel.clone(), ShellRunner);
        let mut interfaces = declared_interfaces(&mut client)?;
        info!(count = interfaces.len(), "applying declared network topology");

        let mut reconciler = NetworkReconciler::new(
            ProcessQueue::new(ShellRunner),
            SysfsInventory::default(),
            ProcIpv6Finder::default(),
            self.net_tool.clone(),
        );
        reconciler.apply(&mut interfaces)?;

        Ok(ExecutableResult {
            exit_code: "0".to_string(),
            output: vec![format!("configured {} interface(s)", interfaces.len())],
        })
    }
}

/// Reports the agent version.
struct VersionHandler;

impl CommandHandler for VersionHandler {
    fn execute(&mut self, _value: &str) -> Result<ExecutableResult> {
        Ok(ExecutableResult {
            exit_code: "0".to_string(),
            output: vec![guestlink_core::VERSION.to_string()],
        })
    }
}

fn build_registry(channel: &ChannelConfig, net_tool: &str) -> CommandRegistry {
    let mut registry = CommandRegistry::new();
    registry.register(
        "resetnetwork",
        Box::new(ResetNetworkHandler {
            channel: channel.clone(),
            net_tool: net_tool.to_string(),
        }),
    );
    registry.register("version", Box::new(VersionHandler));

    let mut verbs = registry.verbs();
    verbs.push("features".to_string());
    registry.register("features", Box::new(FeaturesHandler::new(verbs)));
    registry
}

/// One poll: discover pending commands, dispatch each, acknowledge and
/// remove the consumed keys.
fn poll_once(
    client: &mut ChannelClient<ShellRunner>,
    registry: &mut CommandRegistry,
) -> Result<()> {
    for command in client.get_commands()? {
        let ack = match registry.dispatch(&command) {
            Ok(result) => serde_json::json!({
                "returncode": result.exit_code,
                "message": result.output.join("\n"),
            }),
            Err(e) => {
                warn!(verb = %command.name, key = %command.key, error = %e, "command failed");
                serde_json::json!({
                    "returncode": "1",
                    "message": e.to_string(),
                })
            }
        };
        client.write(&command.key, &ack.to_string())?;
        client.remove(&command.key)?;
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let channel = ChannelConfig {
        client_path: cli.channel_tool.clone(),
        ..ChannelConfig::default()
    };

    let mut client = ChannelClient::new(channel.clone(), ShellRunner);
    let provider = client.read_vm_provider_data_key("provider");
    if provider.is_empty() {
        info!(version = guestlink_core::VERSION, "guestlink agent starting");
    } else {
        info!(version = guestlink_core::VERSION, %provider, "guestlink agent starting");
    }

    let mut registry = build_registry(&channel, &cli.net_tool);

    loop {
        if let Err(e) = poll_once(&mut client, &mut registry) {
            error!(error = %e, "poll failed");
        }
        if cli.once {
            return Ok(());
        }
        thread::sleep(Duration::from_secs(cli.poll_interval));
    }
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("agent failed: {}", e);
        std::process::exit(1);
    }
}
