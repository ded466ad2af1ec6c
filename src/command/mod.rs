//! # Command Registry & Permission Gate
//!
//! Named commands with a parameter schema and a required permission level.
//!
//! ## Execution Order
//! ```text
//! lookup -> validate args -> resolve caller level -> gate -> invoke
//! ```
//! Every failure before `invoke` is returned as a failed [`CommandResult`];
//! the command body never runs in that case.
//!
//! ## Callers
//! Anything implementing [`Executer`] can run commands: network sessions,
//! the in-process [`ConsoleExecuter`], or a collaborator's own type. The caller's
//! level comes from its [`PermissionGroup`] component, or `GUEST` when absent.

pub mod i18n;
pub mod registry;
pub mod schema;

use crate::component::{Components, PermissionGroup, PermissionLevel};
use crate::error::FrameworkError;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::warn;
use uuid::Uuid;

pub use i18n::{Locale, Localized, MessageCatalog};
pub use registry::{CommandRegistry, CommandRegistryBuilder};
pub use schema::{ArgsError, ParamType};

/// Something that can run commands
pub trait Executer: Send + Sync {
    fn id(&self) -> Uuid;

    fn components(&self) -> &Components;

    /// Resolved permission level; `GUEST` without a [`PermissionGroup`]
    fn permission_level(&self) -> u32 {
        self.components()
            .with::<PermissionGroup, _>(|group| group.level())
            .unwrap_or(PermissionLevel::GUEST)
    }
}

/// In-process operator console with the highest permission level
pub struct ConsoleExecuter {
    id: Uuid,
    components: Components,
}

impl Default for ConsoleExecuter {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleExecuter {
    pub fn new() -> Self {
        let id = Uuid::new_v4();
        let components = Components::new(id);
        if let Err(e) = components.add(PermissionGroup::new(PermissionLevel::CONSOLE)) {
            warn!(executer = %id, error = %e, "Console permission group not attached");
        }
        Self { id, components }
    }
}

impl Executer for ConsoleExecuter {
    fn id(&self) -> Uuid {
        self.id
    }

    fn components(&self) -> &Components {
        &self.components
    }
}

/// Why a command did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandErrorKind {
    NotFound,
    ParameterMismatch,
    PermissionDenied,
    /// The command body ran and reported failure
    Failed,
}

/// Outcome of [`CommandRegistry::execute`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CommandErrorKind>,
}

impl CommandResult {
    pub fn ok(payload: impl Into<Value>) -> Self {
        Self {
            success: true,
            message: String::new(),
            payload: payload.into(),
            error: None,
        }
    }

    pub fn ok_with_message(message: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            message: message.into(),
            ..Self::ok(payload)
        }
    }

    pub fn failure(kind: CommandErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            payload: Value::Null,
            error: Some(kind),
        }
    }

    pub fn is_denied(&self) -> bool {
        self.error == Some(CommandErrorKind::PermissionDenied)
    }

    pub fn is_mismatch(&self) -> bool {
        self.error == Some(CommandErrorKind::ParameterMismatch)
    }
}

/// A registered command.
///
/// `on_denied` and `on_mismatch` build the failure results for the gate and
/// the schema check; override them to change the wording.
pub trait Command: Send + Sync {
    fn name(&self) -> &str;

    /// Minimum caller level
    fn permission(&self) -> u32 {
        PermissionLevel::CLIENT
    }

    /// Expected arguments; empty means none
    fn params(&self) -> &[ParamType] {
        &[]
    }

    /// Business logic. Only called with validated args and a permitted caller.
    fn execute(&self, args: &[Value], executer: &dyn Executer) -> CommandResult;

    /// Optional help payload
    fn info(&self) -> Option<Value> {
        None
    }

    fn on_denied(&self, required: u32, actual: u32) -> CommandResult {
        CommandResult::failure(
            CommandErrorKind::PermissionDenied,
            FrameworkError::PermissionDenied { required, actual }.to_string(),
        )
    }

    fn on_mismatch(&self, error: &ArgsError) -> CommandResult {
        CommandResult::failure(
            CommandErrorKind::ParameterMismatch,
            FrameworkError::ParameterMismatch(error.to_string()).to_string(),
        )
    }
}

type CommandFn = dyn Fn(&[Value], &dyn Executer) -> CommandResult + Send + Sync;

/// Closure-backed [`Command`]
pub struct FnCommand {
    name: String,
    permission: u32,
    params: Vec<ParamType>,
    body: Box<CommandFn>,
}

impl FnCommand {
    pub fn new<F>(name: impl Into<String>, permission: u32, params: Vec<ParamType>, body: F) -> Self
    where
        F: Fn(&[Value], &dyn Executer) -> CommandResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            permission,
            params,
            body: Box::new(body),
        }
    }
}

impl fmt::Debug for FnCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCommand")
            .field("name", &self.name)
            .field("permission", &self.permission)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl Command for FnCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn permission(&self) -> u32 {
        self.permission
    }

    fn params(&self) -> &[ParamType] {
        &self.params
    }

    fn execute(&self, args: &[Value], executer: &dyn Executer) -> CommandResult {
        (self.body)(args, executer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_outranks_admin() {
        let console = ConsoleExecuter::new();
        assert_eq!(console.permission_level(), PermissionLevel::CONSOLE);
        assert!(console.components().has::<PermissionGroup>());
        assert_eq!(console.components().len(), 1);
    }

    #[test]
    fn test_missing_group_is_guest() {
        struct Bare(Components);
        impl Executer for Bare {
            fn id(&self) -> Uuid {
                Uuid::nil()
            }
            fn components(&self) -> &Components {
                &self.0
            }
        }
        let bare = Bare(Components::new(Uuid::new_v4()));
        assert_eq!(bare.permission_level(), PermissionLevel::GUEST);
    }

    #[test]
    fn test_result_serializes_error_kind() {
        let denied = CommandResult::failure(CommandErrorKind::PermissionDenied, "no");
        let json = serde_json::to_value(&denied).unwrap();
        assert_eq!(json["error"], "permission_denied");
        assert!(serde_json::to_value(CommandResult::ok(1)).unwrap().get("error").is_none());
    }
}
