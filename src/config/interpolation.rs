// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

use super::error::ConfigError;

/// Resolves `${VAR_NAME}` references in a string from environment variables.
/// Returns `ConfigError::UndefinedVariable` if a referenced variable is not set.
pub fn resolve_variables(input: &str) -> Result<String, ConfigError> {
    resolve_with(input, |name| std::env::var(name).ok())
}

/// Same as [`resolve_variables`] with an injected lookup.
pub(crate) fn resolve_with(
    input: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            let mut found_close = false;
            for c in chars.by_ref() {
                if c == '}' {
                    found_close = true;
                    break;
                }
                var_name.push(c);
            }
            if !found_close || var_name.is_empty() {
                // Malformed interpolation -- treat literally
                result.push('$');
                result.push('{');
                result.push_str(&var_name);
                if found_close {
                    result.push('}');
                }
                continue;
            }
            let value = lookup(&var_name).ok_or_else(|| ConfigError::UndefinedVariable {
                name: var_name.clone(),
            })?;
            result.push_str(&value);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(name: &str) -> Option<String> {
        match name {
            "KEY_A" => Some("alpha".to_string()),
            "EMPTY" => Some(String::new()),
            _ => None,
        }
    }

    #[test]
    fn substitutes_known_variables() {
        assert_eq!(resolve_with("${KEY_A}", env).unwrap(), "alpha");
        assert_eq!(resolve_with("pre-${KEY_A}-post", env).unwrap(), "pre-alpha-post");
        assert_eq!(resolve_with("x${EMPTY}y", env).unwrap(), "xy");
    }

    #[test]
    fn undefined_variable_is_an_error() {
        let err = resolve_with("${MISSING}", env).unwrap_err();
        assert!(matches!(err, ConfigError::UndefinedVariable { ref name } if name == "MISSING"));
    }

    #[test]
    fn malformed_references_kept_literally() {
        assert_eq!(resolve_with("${", env).unwrap(), "${");
        assert_eq!(resolve_with("${}", env).unwrap(), "${}");
        assert_eq!(resolve_with("${KEY_A", env).unwrap(), "${KEY_A");
        assert_eq!(resolve_with("$KEY_A", env).unwrap(), "$KEY_A");
    }
}
