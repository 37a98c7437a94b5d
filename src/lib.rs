// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

pub mod config;
pub mod credential;
pub mod engine;
pub mod proxy;
pub mod stream;
