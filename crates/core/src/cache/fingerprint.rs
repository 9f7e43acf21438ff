//! Content fingerprints for cacheable calls.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Named parts that distinguish one call from another.
///
/// Stored in a `BTreeMap` so the serialized form is canonical no matter
/// in which order the parts were added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeyParts(BTreeMap<String, String>);

impl KeyParts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Parts for an agent invocation
    pub fn for_call(agent_name: &str, prompt: &str, context: &str) -> Self {
        Self::new()
            .with("agent_name", agent_name)
            .with("prompt", prompt)
            .with("context", context)
    }

    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        // BTreeMap<String, String> serialization cannot fail
        let canonical = serde_json::to_vec(&self.0).unwrap_or_default();
        hasher.update(&canonical);
        Fingerprint(hex::encode(hasher.finalize()))
    }
}

/// Hex-encoded SHA-256 over the canonical key parts
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accept a stored key if it looks like a fingerprint
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = raw.len() == 64 && raw.bytes().all(|b| b.is_ascii_hexdigit());
        valid.then(|| Fingerprint(raw.to_ascii_lowercase()))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
