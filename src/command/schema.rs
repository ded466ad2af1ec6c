//! Parameter schemas for commands.
//!
//! A schema is an ordered list of [`ParamType`] tags given at registration.
//! Arguments are checked against it with plain pattern matching on JSON values.

use serde_json::Value;
use std::fmt;

/// Expected type of one command argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    Bool,
    /// Signed integer fitting in `i64`
    Int,
    /// Unsigned integer fitting in `u64`
    UInt,
    /// Any JSON number
    Float,
    String,
    Array,
    Object,
    /// Anything, including `null`
    Any,
}

impl ParamType {
    /// Value tags cannot hold `null`
    pub fn is_value_type(self) -> bool {
        matches!(self, Self::Bool | Self::Int | Self::UInt | Self::Float)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::UInt => "uint",
            Self::Float => "float",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        }
    }

    /// Whether a non-null `value` fits this slot
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Bool => value.is_boolean(),
            Self::Int => value.is_i64(),
            Self::UInt => value.is_u64(),
            Self::Float => value.is_number(),
            Self::String => value.is_string(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// JSON kind of a value, for mismatch messages
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Why a set of arguments failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgsError {
    NoParametersExpected { actual: usize },
    CountMismatch { expected: usize, actual: usize },
    NullArgument { index: usize, expected: ParamType },
    TypeMismatch {
        index: usize,
        expected: ParamType,
        actual: &'static str,
    },
}

impl ArgsError {
    pub fn expected_count(&self, schema: &[ParamType]) -> usize {
        match self {
            Self::NoParametersExpected { .. } => 0,
            Self::CountMismatch { expected, .. } => *expected,
            _ => schema.len(),
        }
    }
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoParametersExpected { actual } => {
                write!(f, "command takes no parameters, got {actual}")
            }
            Self::CountMismatch { expected, actual } => {
                write!(f, "expected {expected} parameters, got {actual}")
            }
            Self::NullArgument { index, expected } => {
                write!(f, "parameter {index} ({expected}) cannot be null")
            }
            Self::TypeMismatch {
                index,
                expected,
                actual,
            } => write!(f, "parameter {index} expected {expected}, got {actual}"),
        }
    }
}

/// Check `args` against `schema`. An empty schema means no parameters.
pub fn validate(schema: &[ParamType], args: &[Value]) -> Result<(), ArgsError> {
    if schema.is_empty() {
        return if args.is_empty() {
            Ok(())
        } else {
            Err(ArgsError::NoParametersExpected { actual: args.len() })
        };
    }

    if args.len() != schema.len() {
        return Err(ArgsError::CountMismatch {
            expected: schema.len(),
            actual: args.len(),
        });
    }

    for (index, (expected, arg)) in schema.iter().zip(args).enumerate() {
        if arg.is_null() {
            if expected.is_value_type() {
                return Err(ArgsError::NullArgument {
                    index,
                    expected: *expected,
                });
            }
            continue;
        }
        if !expected.accepts(arg) {
            return Err(ArgsError::TypeMismatch {
                index,
                expected: *expected,
                actual: value_kind(arg),
            });
        }
    }

    Ok(())
}
