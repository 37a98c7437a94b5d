// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use super::error::ConfigError;

/// Where relay YAML is read from.
pub trait ConfigSource {
    /// Human-readable origin, used in parse errors.
    fn origin(&self) -> String;

    fn load(&self) -> Result<String, ConfigError>;
}

/// `relay.yaml` (or the `--config` path) on disk.
pub struct FileSource {
    pub path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigSource for FileSource {
    fn origin(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<String, ConfigError> {
        std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Read {
            path: self.path.clone(),
            source,
        })
    }
}

/// Inline YAML, for embedding a config without touching the filesystem.
pub struct StringSource {
    pub content: String,
}

impl ConfigSource for StringSource {
    fn origin(&self) -> String {
        "<inline>".to_string()
    }

    fn load(&self) -> Result<String, ConfigError> {
        Ok(self.content.clone())
    }
}
