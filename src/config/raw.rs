// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Raw YAML deserialization types (internal)
// Kept apart from the public Config structs so that validation, defaults
// and ${VAR} interpolation happen in one place between raw and public.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub relay: String,
    pub upstream: Option<RawUpstreamConfig>,
    pub stream: Option<RawStreamConfig>,
    pub credentials: Option<RawCredentialConfig>,
    pub environment: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawUpstreamConfig {
    pub base_url: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawStreamConfig {
    pub idle_timeout_ms: Option<u64>,
    pub channel_capacity: Option<usize>,
    pub max_line_bytes: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawCredentialConfig {
    pub selection: Option<String>,
    #[serde(default)]
    pub keys: Vec<String>,
}
