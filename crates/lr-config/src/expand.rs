//! `${VAR}` and `~` expansion for config values.
//!
//! Runs before paths are resolved, so an expanded `watch.root` may still be
//! relative to the config file.

use std::borrow::Cow;

use crate::ConfigError;

/// Variable source for expansion.
pub(crate) type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Reads the process environment.
pub(crate) fn process_env(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

/// Expand `${VAR}` and `${VAR:-default}` in `value`.
///
/// Bare `$VAR` is left alone. An unset variable without a default is an
/// error naming `field`.
pub(crate) fn expand_value(
    value: &str,
    field: &str,
    lookup: Lookup<'_>,
) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }
    shellexpand::env_with_context(value, |var: &str| lookup(var).map(Some).ok_or(Unset))
        .map(Cow::into_owned)
        .map_err(|err| ConfigError::EnvVar {
            field: field.to_owned(),
            message: format!("${{{}}} not set", err.var_name),
        })
}

/// [`expand_value`], then a leading `~` becomes `$HOME`.
pub(crate) fn expand_path(
    value: &str,
    field: &str,
    lookup: Lookup<'_>,
) -> Result<String, ConfigError> {
    let expanded = expand_value(value, field, lookup)?;
    Ok(shellexpand::tilde_with_context(expanded.as_str(), || lookup("HOME")).into_owned())
}

struct Unset;
