//! Verb-to-handler lookup for pending commands.
//!
//! The dispatch layer stays thin: the registry maps a command verb to a
//! handler, hands it the opaque payload, and reports the outcome. Key
//! acknowledgement (writing the result, removing the consumed key) is
//! the poll loop's job.

use std::collections::BTreeMap;

use guestlink_core::{AgentError, GuestCommand, Result};
use tracing::info;

use crate::exec::ExecutableResult;

/// A command handler invoked with the command's payload.
pub trait CommandHandler {
    fn execute(&mut self, value: &str) -> Result<ExecutableResult>;
}

/// Verb -> handler registry.
#[derive(Default)]
pub struct CommandRegistry {
    handlers: BTreeMap<String, Box<dyn CommandHandler>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, verb: impl Into<String>, handler: Box<dyn CommandHandler>) {
        self.handlers.insert(verb.into(), handler);
    }

    /// Registered verbs, sorted.
    pub fn verbs(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    /// Execute a discovered command.
    pub fn dispatch(&mut self, command: &GuestCommand) -> Result<ExecutableResult> {
        let handler = self
            .handlers
            .get_mut(&command.name)
            .ok_or_else(|| AgentError::UnknownCommand(command.name.clone()))?;
        info!(verb = %command.name, key = %command.key, "dispatching command");
        handler.execute(&command.value)
    }
}

/// Reports every supported verb except `features` itself.
pub struct FeaturesHandler {
    verbs: Vec<String>,
}

impl FeaturesHandler {
    /// Snapshot the verb list at registration time.
    pub fn new(verbs: Vec<String>) -> Self {
        Self { verbs }
    }
}

impl CommandHandler for FeaturesHandler {
    fn execute(&mut self, _value: &str) -> Result<ExecutableResult> {
        let listing = self
            .verbs
            .iter()
            .filter(|verb| verb.as_str() != "features")
            .cloned()
            .collect::<Vec<_>>()
            .join(",");
        Ok(ExecutableResult {
            exit_code: "0".to_string(),
            output: vec![listing],
        })
    }
}
