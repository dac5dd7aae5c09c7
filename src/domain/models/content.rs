//! Content normalization, hashing and the write-hash ledger.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Normalize text for comparison and storage.
///
/// Line endings become `\n`, trailing whitespace is stripped from every line,
/// runs of blank lines collapse to one, and the result ends with exactly one
/// newline. Input that is blank after stripping normalizes to `"\n"`.
pub fn normalize_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut out: Vec<&str> = Vec::new();
    let mut previous_blank = false;
    for line in unified.split('\n') {
        let trimmed = line.trim_end();
        let blank = trimmed.is_empty();
        if blank && previous_blank {
            continue;
        }
        out.push(trimmed);
        previous_blank = blank;
    }

    let joined = out.join("\n");
    let body = joined.trim_end_matches('\n');
    format!("{body}\n")
}

/// SHA-256 of the given bytes as lowercase hex.
pub fn sha256_hex(bytes: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes.as_ref());
    format!("{:x}", hasher.finalize())
}

/// Hash of the normalized form of `text`.
pub fn content_hash(text: &str) -> String {
    sha256_hex(normalize_text(text))
}

/// Persisted `path -> normalized content hash` map.
///
/// Used to short-circuit redundant writes; the file on disk stays
/// authoritative and stale entries are repaired on the next write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentLedger {
    entries: BTreeMap<String, String>,
}

impl ContentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    /// Record `hash` for `path`. Returns true if the entry changed.
    pub fn record(&mut self, path: impl Into<String>, hash: impl Into<String>) -> bool {
        let path = path.into();
        let hash = hash.into();
        if self.entries.get(&path) == Some(&hash) {
            return false;
        }
        self.entries.insert(path, hash);
        true
    }

    pub fn remove(&mut self, path: &str) -> Option<String> {
        self.entries.remove(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
