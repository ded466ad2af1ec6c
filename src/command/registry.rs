//! Command registration and execution.
//!
//! Registration happens once through [`CommandRegistryBuilder`]; the built
//! [`CommandRegistry`] is immutable, so lookups take no lock.

use super::schema;
use super::{Command, CommandErrorKind, CommandResult, Executer, FnCommand, ParamType};
use crate::error::{FrameworkError, Result};
use crate::utils::metrics::Metrics;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Collects commands before the registry is frozen
#[derive(Default)]
pub struct CommandRegistryBuilder {
    commands: HashMap<String, Arc<dyn Command>>,
}

impl CommandRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a command. Fails with `DuplicateCommand` if the name is taken.
    pub fn register<C: Command + 'static>(mut self, command: C) -> Result<Self> {
        let name = command.name().to_string();
        if self.commands.contains_key(&name) {
            return Err(FrameworkError::DuplicateCommand(name));
        }
        debug!(command = %name, level = command.permission(), "Command registered");
        self.commands.insert(name, Arc::new(command));
        Ok(self)
    }

    /// Add a closure-backed command
    pub fn command<F>(
        self,
        name: impl Into<String>,
        permission: u32,
        params: Vec<ParamType>,
        body: F,
    ) -> Result<Self>
    where
        F: Fn(&[Value], &dyn Executer) -> CommandResult + Send + Sync + 'static,
    {
        self.register(FnCommand::new(name, permission, params, body))
    }

    pub fn build(self) -> CommandRegistry {
        CommandRegistry {
            commands: self.commands,
            metrics: None,
        }
    }
}

/// Immutable name -> command table
#[derive(Clone, Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Arc<dyn Command>>,
    metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.names())
            .finish()
    }
}

impl CommandRegistry {
    pub fn builder() -> CommandRegistryBuilder {
        CommandRegistryBuilder::new()
    }

    /// Count outcomes into `metrics`
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Command>> {
        self.commands.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Run `name` for `executer`.
    ///
    /// Arguments are validated before the permission gate; neither failure
    /// invokes the command body.
    #[instrument(level = "debug", skip(self, args, executer), fields(caller = %executer.id()))]
    pub fn execute(&self, name: &str, args: &[Value], executer: &dyn Executer) -> CommandResult {
        let Some(command) = self.commands.get(name) else {
            debug!(command = name, "Unknown command");
            return CommandResult::failure(
                CommandErrorKind::NotFound,
                FrameworkError::CommandNotFound(name.to_string()).to_string(),
            );
        };

        if let Err(mismatch) = schema::validate(command.params(), args) {
            debug!(command = name, reason = %mismatch, "Arguments rejected");
            if let Some(m) = &self.metrics {
                m.command_mismatched();
            }
            return command.on_mismatch(&mismatch);
        }

        let required = command.permission();
        let actual = executer.permission_level();
        if actual < required {
            warn!(command = name, required, actual, "Permission level too low");
            if let Some(m) = &self.metrics {
                m.command_denied();
            }
            return command.on_denied(required, actual);
        }

        let result = command.execute(args, executer);
        if let Some(m) = &self.metrics {
            m.command_executed();
        }
        debug!(command = name, success = result.success, "Command executed");
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::command::ConsoleExecuter;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn echo_registry() -> CommandRegistry {
        CommandRegistry::builder()
            .command("echo", 0, vec![ParamType::String], |args, _| {
                CommandResult::ok(args[0].clone())
            })
            .unwrap()
            .build()
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let result = CommandRegistry::builder()
            .command("a", 0, vec![], |_, _| CommandResult::ok(Value::Null))
            .unwrap()
            .command("a", 0, vec![], |_, _| CommandResult::ok(Value::Null));
        assert!(matches!(result, Err(FrameworkError::DuplicateCommand(n)) if n == "a"));
    }

    #[test]
    fn test_unknown_command() {
        let result = echo_registry().execute("nope", &[], &ConsoleExecuter::new());
        assert!(!result.success);
        assert_eq!(result.error, Some(CommandErrorKind::NotFound));
    }

    #[test]
    fn test_echo_runs() {
        let result = echo_registry().execute("echo", &[json!("hi")], &ConsoleExecuter::new());
        assert!(result.success);
        assert_eq!(result.payload, json!("hi"));
    }

    #[test]
    fn test_mismatch_skips_body_and_counts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let metrics = Arc::new(Metrics::new());
        let registry = CommandRegistry::builder()
            .command("add", 0, vec![ParamType::Int, ParamType::Int], move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
                CommandResult::ok(Value::Null)
            })
            .unwrap()
            .build()
            .with_metrics(metrics.clone());

        let result = registry.execute("add", &[json!(1)], &ConsoleExecuter::new());
        assert!(result.is_mismatch());
        assert!(result.message.contains("expected 2 parameters, got 1"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(metrics.snapshot().commands_mismatched, 1);
        assert_eq!(metrics.snapshot().commands_executed, 0);
    }
}
