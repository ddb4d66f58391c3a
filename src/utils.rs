use std::env::var;
use std::str::FromStr;

use anyhow::Context;
use anyhow::Result;

/// Get the value of ENV var, or a default
///
/// Only when:
/// - It is set
/// - It is not empty
pub fn env_var_or_else<F>(var_name: &'static str, or_else: F) -> String
where
    F: FnOnce() -> String,
{
    env_var_optional(var_name).unwrap_or_else(or_else)
}

/// Get the value of ENV var, if it is set and not empty
pub fn env_var_optional(var_name: &'static str) -> Option<String> {
    var(var_name).ok().filter(|value| !value.is_empty())
}

/// Parse the value of ENV var, or use a default when it is not set
///
/// # Errors
///
/// Will return `Err` when the value is set but can not be parsed
pub fn env_var_parse_or<T>(var_name: &'static str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env_var_optional(var_name) {
        Some(value) => value
            .parse::<T>()
            .with_context(|| format!("Invalid value for `{var_name}`: {value}")),
        None => Ok(default),
    }
}
