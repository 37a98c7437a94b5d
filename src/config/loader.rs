// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use super::error::ConfigError;
use super::interpolation::resolve_variables;
use super::raw;
use super::source::ConfigSource;
use super::types::*;

/// Load and validate a relay config from the given source.
///
/// Steps:
/// 1. Read raw YAML from source
/// 2. Parse YAML into raw deserialization types
/// 3. Validate version and values
/// 4. Resolve `${VAR}` interpolation in the base URL and credential keys
/// 5. Build typed Config struct
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw_yaml = source.load()?;
    let raw: raw::RawConfig = serde_yaml::from_str(&raw_yaml).map_err(|e| ConfigError::Parse {
        origin: source.origin(),
        source: e,
    })?;

    if raw.relay != "v1" {
        return Err(ConfigError::invalid(
            "relay",
            format!("unsupported version \"{}\", expected \"v1\"", raw.relay),
        ));
    }

    Ok(Config {
        upstream: build_upstream_config(raw.upstream)?,
        stream: build_stream_config(raw.stream)?,
        credentials: build_credential_config(raw.credentials)?,
        environment: raw.environment.unwrap_or_default(),
    })
}

fn build_upstream_config(
    raw: Option<raw::RawUpstreamConfig>,
) -> Result<UpstreamConfig, ConfigError> {
    let Some(raw) = raw else {
        return Ok(UpstreamConfig::default());
    };

    let base_url = match raw.base_url {
        Some(url) => resolve_variables(&url)?,
        None => DEFAULT_BASE_URL.to_string(),
    };
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ConfigError::invalid(
            "upstream.base_url",
            format!("\"{base_url}\" must start with http:// or https://"),
        ));
    }

    if raw.timeout_ms == Some(0) {
        return Err(ConfigError::invalid("upstream.timeout_ms", "must be greater than 0"));
    }

    Ok(UpstreamConfig {
        base_url: base_url.trim_end_matches('/').to_string(),
        timeout_ms: raw.timeout_ms,
    })
}

fn build_stream_config(raw: Option<raw::RawStreamConfig>) -> Result<StreamConfig, ConfigError> {
    let Some(raw) = raw else {
        return Ok(StreamConfig::default());
    };
    let defaults = StreamConfig::default();

    // 0 disables the idle timeout.
    let idle_timeout = match raw.idle_timeout_ms {
        Some(0) => None,
        Some(ms) => Some(Duration::from_millis(ms)),
        None => defaults.idle_timeout,
    };

    let channel_capacity = raw.channel_capacity.unwrap_or(defaults.channel_capacity);
    if channel_capacity == 0 {
        return Err(ConfigError::invalid("stream.channel_capacity", "must be greater than 0"));
    }

    let max_line_bytes = raw.max_line_bytes.unwrap_or(defaults.max_line_bytes);
    if max_line_bytes == 0 {
        return Err(ConfigError::invalid("stream.max_line_bytes", "must be greater than 0"));
    }

    Ok(StreamConfig {
        idle_timeout,
        channel_capacity,
        max_line_bytes,
    })
}

fn build_credential_config(
    raw: Option<raw::RawCredentialConfig>,
) -> Result<CredentialConfig, ConfigError> {
    let Some(raw) = raw else {
        return Ok(CredentialConfig::default());
    };

    let selection = match raw.selection.as_deref() {
        Some("random") | None => SelectionPolicy::Random,
        Some("round_robin") => SelectionPolicy::RoundRobin,
        Some(other) => {
            return Err(ConfigError::invalid(
                "credentials.selection",
                format!("unknown value \"{other}\", expected \"random\" or \"round_robin\""),
            ));
        }
    };

    let mut keys = Vec::with_capacity(raw.keys.len());
    for key in &raw.keys {
        let resolved = resolve_variables(key)?;
        let resolved = resolved.trim();
        if !resolved.is_empty() {
            keys.push(resolved.to_string());
        }
    }

    Ok(CredentialConfig { selection, keys })
}
