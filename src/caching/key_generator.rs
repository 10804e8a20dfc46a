//! # Cache Key Generator
//!
//! Deterministic keys for upstream requests: the tier prefix, the endpoint and
//! a SHA-256 digest of the parameters sorted by name. Two requests with the
//! same endpoint and parameters always map to the same key regardless of the
//! order the parameters were supplied in.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Builds cache keys for one tier
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    prefix: String,
}

impl KeyGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Generate `<prefix>:<endpoint>:<hex digest of params>`
    pub fn generate(&self, endpoint: &str, params: &BTreeMap<String, String>) -> String {
        format!("{}:{}:{}", self.prefix, endpoint, Self::params_digest(params))
    }

    /// Hash parameters in name order
    pub fn params_digest(params: &BTreeMap<String, String>) -> String {
        let mut hasher = Sha256::new();
        for (name, value) in params {
            hasher.update(name.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"&");
        }
        hex::encode(hasher.finalize())
    }
}
