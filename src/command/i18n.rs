//! Localized failure messages for user-facing commands.
//!
//! [`Localized`] wraps any [`Command`] and replaces the gate and schema
//! failure text with entries from a [`MessageCatalog`].

use super::schema::ArgsError;
use super::{Command, CommandErrorKind, CommandResult, Executer, ParamType};
use crate::error::FrameworkError;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

pub const PERMISSION_NOT_ENOUGH: &str = "permission_not_enough_msg";
pub const ARGUMENT_ERROR: &str = "argument_error_msg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Locale {
    #[default]
    En,
    Zh,
}

impl FromStr for Locale {
    type Err = FrameworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "en" | "en-us" | "en_us" => Ok(Self::En),
            "zh" | "zh-cn" | "zh_cn" => Ok(Self::Zh),
            other => Err(FrameworkError::ConfigError(format!(
                "Unsupported locale: {other}"
            ))),
        }
    }
}

fn builtin(locale: Locale, key: &str) -> Option<&'static str> {
    match (locale, key) {
        (Locale::En, PERMISSION_NOT_ENOUGH) => {
            Some("Permission not enough: requires level {required}, you have {actual}.")
        }
        (Locale::En, ARGUMENT_ERROR) => {
            Some("Argument error: expected {expected} arguments, got {actual}. {detail}")
        }
        (Locale::Zh, PERMISSION_NOT_ENOUGH) => Some("权限不足：需要等级 {required}，当前等级 {actual}。"),
        (Locale::Zh, ARGUMENT_ERROR) => {
            Some("参数错误：预期 {expected} 个参数，实际收到 {actual} 个。{detail}")
        }
        _ => None,
    }
}

/// Message templates for one locale, with per-key overrides.
///
/// Templates use `{name}` placeholders.
#[derive(Debug, Clone, Default)]
pub struct MessageCatalog {
    locale: Locale,
    overrides: HashMap<String, String>,
}

impl MessageCatalog {
    pub fn new(locale: Locale) -> Self {
        Self {
            locale,
            overrides: HashMap::new(),
        }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn with_message(mut self, key: impl Into<String>, template: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), template.into());
        self
    }

    pub fn template(&self, key: &str) -> Option<&str> {
        self.overrides
            .get(key)
            .map(String::as_str)
            .or_else(|| builtin(self.locale, key))
    }

    /// Fill a template. Unknown keys render as the key itself.
    pub fn render(&self, key: &str, params: &[(&str, String)]) -> String {
        let mut text = self.template(key).unwrap_or(key).to_string();
        for (name, value) in params {
            text = text.replace(&format!("{{{name}}}"), value);
        }
        text.trim_end().to_string()
    }

    pub fn permission_not_enough(&self, required: u32, actual: u32) -> String {
        self.render(
            PERMISSION_NOT_ENOUGH,
            &[("required", required.to_string()), ("actual", actual.to_string())],
        )
    }

    pub fn argument_error(&self, expected: usize, actual: usize, detail: &str) -> String {
        self.render(
            ARGUMENT_ERROR,
            &[
                ("expected", expected.to_string()),
                ("actual", actual.to_string()),
                ("detail", detail.to_string()),
            ],
        )
    }
}

/// A command whose gate and schema failures read from a catalog
pub struct Localized<C> {
    inner: C,
    catalog: Arc<MessageCatalog>,
}

impl<C: Command> Localized<C> {
    pub fn new(inner: C, catalog: Arc<MessageCatalog>) -> Self {
        Self { inner, catalog }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: Command> Command for Localized<C> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn permission(&self) -> u32 {
        self.inner.permission()
    }

    fn params(&self) -> &[ParamType] {
        self.inner.params()
    }

    fn execute(&self, args: &[Value], executer: &dyn Executer) -> CommandResult {
        self.inner.execute(args, executer)
    }

    fn info(&self) -> Option<Value> {
        self.inner.info()
    }

    fn on_denied(&self, required: u32, actual: u32) -> CommandResult {
        CommandResult::failure(
            CommandErrorKind::PermissionDenied,
            self.catalog.permission_not_enough(required, actual),
        )
    }

    fn on_mismatch(&self, error: &ArgsError) -> CommandResult {
        let expected = error.expected_count(self.params());
        let actual = match error {
            ArgsError::NoParametersExpected { actual } | ArgsError::CountMismatch { actual, .. } => {
                *actual
            }
            // Count matched; the detail names the bad slot
            _ => expected,
        };
        let detail = match error {
            ArgsError::NullArgument { .. } | ArgsError::TypeMismatch { .. } => error.to_string(),
            _ => String::new(),
        };
        CommandResult::failure(
            CommandErrorKind::ParameterMismatch,
            self.catalog.argument_error(expected, actual, &detail),
        )
    }
}
