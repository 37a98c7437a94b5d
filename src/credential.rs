// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Credential rotation -- M1.4
//
// Callers may pass several API keys in one `key` query parameter,
// separated by `;`. One of them (or, when the caller sent none, one of the
// configured keys) is picked per request before dispatch.

use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Query parameter that carries caller credentials.
pub const KEY_PARAM: &str = "key";

/// Picks one credential out of a non-empty pool.
pub trait CredentialSelector: Send + Sync {
    /// Index into `pool`, or `None` if the pool is empty.
    fn select(&self, pool: &[String]) -> Option<usize>;
}

/// Uniformly random choice, independent per request.
#[derive(Debug, Default)]
pub struct RandomSelector;

impl CredentialSelector for RandomSelector {
    fn select(&self, pool: &[String]) -> Option<usize> {
        if pool.is_empty() {
            return None;
        }
        Some(rand::rng().random_range(0..pool.len()))
    }
}

/// Cycles through the pool in order, shared across requests.
#[derive(Debug, Default)]
pub struct RoundRobinSelector {
    next: AtomicUsize,
}

impl CredentialSelector for RoundRobinSelector {
    fn select(&self, pool: &[String]) -> Option<usize> {
        if pool.is_empty() {
            return None;
        }
        Some(self.next.fetch_add(1, Ordering::Relaxed) % pool.len())
    }
}

/// Split a `key` parameter value into individual credentials.
pub fn parse_keys(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect()
}

/// Decoded `(name, value)` pairs of a query string.
fn query_pairs(query: &str) -> impl Iterator<Item = (String, String)> + '_ {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (percent_decode(name), percent_decode(value))
        })
}

/// Keys the caller supplied in the query string (all `key` params, merged).
pub fn caller_keys(query: Option<&str>) -> Vec<String> {
    let Some(query) = query else {
        return Vec::new();
    };
    query_pairs(query)
        .filter(|(name, _)| name == KEY_PARAM)
        .flat_map(|(_, value)| parse_keys(&value))
        .collect()
}

/// Rebuild `query` with every `key` param replaced by a single `key=<selected>`.
///
/// Other parameters keep their original encoding and order.
pub fn replace_key_param(query: Option<&str>, selected: &str) -> String {
    let mut parts: Vec<String> = query
        .unwrap_or("")
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let name = pair.split_once('=').map(|(n, _)| n).unwrap_or(pair);
            percent_decode(name) != KEY_PARAM
        })
        .map(String::from)
        .collect();
    parts.push(format!("{KEY_PARAM}={}", percent_encode(selected)));
    parts.join("&")
}

fn percent_decode(input: &str) -> String {
    urlencoding::decode(input)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| input.to_string())
}

fn percent_encode(input: &str) -> String {
    urlencoding::encode(input).into_owned()
}
