// Copyright 2026 The Inference Relay Project
// SPDX-License-Identifier: Apache-2.0

use super::error::ConfigError;

/// Expand `${NAME}` references from the process environment.
///
/// An unterminated or empty reference is kept literally. A reference to an
/// unset variable is an error, so a typo never silently becomes "".
pub fn resolve_variables(input: &str) -> Result<String, ConfigError> {
    resolve_with(input, |name| std::env::var(name).ok())
}

pub(super) fn resolve_with(
    input: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(0) | None => {
                // Not a usable reference, emit the marker and move past it.
                out.push_str("${");
                rest = after;
            }
            Some(end) => {
                let name = &after[..end];
                let value = lookup(name).ok_or_else(|| ConfigError::UndefinedVariable {
                    name: name.to_string(),
                })?;
                out.push_str(&value);
                rest = &after[end + 1..];
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}
