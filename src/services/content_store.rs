//! Content store: normalized, idempotent, atomic file writes.
//!
//! Every write goes through the same gate:
//! - suspicious targets (empty names, bare short names) are refused
//! - dry runs report what would change and touch nothing
//! - missing files are only created when creation is enabled
//! - content whose normalized hash matches the file on disk is a no-op
//! - everything else lands through a temp file and an atomic rename
//!
//! The ledger records the normalized hash of every path written. The file on
//! disk stays authoritative: a stale ledger entry is repaired, never trusted.

use std::fs::{self, File};
use std::io::{self, ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::domain::errors::WriteError;
use crate::domain::models::{normalize_text, sha256_hex, ContentLedger};

/// Names refused regardless of length.
const RESERVED_NAMES: &[&str] = &["tmp", "tmpfile", "py"];

/// Options for a single write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub dry_run: bool,
    pub allow_create: bool,
}

impl WriteOptions {
    pub const fn new(dry_run: bool, allow_create: bool) -> Self {
        Self {
            dry_run,
            allow_create,
        }
    }
}

/// Why a write did or did not change the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteReason {
    WouldWrite,
    CreationDisabled,
    Unchanged,
    Created,
    Updated,
}

impl WriteReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WouldWrite => "would write",
            Self::CreationDisabled => "skipped: creation disabled",
            Self::Unchanged => "unchanged",
            Self::Created => "created",
            Self::Updated => "updated",
        }
    }
}

impl std::fmt::Display for WriteReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub path: String,
    /// True only when the file on disk changed.
    pub written: bool,
    pub reason: WriteReason,
    /// Normalized hash of the requested content.
    pub hash: String,
}

/// Normalizing, idempotent writer rooted at a repository directory.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
    durable: bool,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            durable: true,
        }
    }

    /// Skip fsync calls; used by tests.
    #[must_use]
    pub const fn with_durability(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical relative key and absolute path for `path`.
    pub fn resolve(&self, path: &str) -> Result<(String, PathBuf), WriteError> {
        let candidate = Path::new(path);
        let relative = if candidate.is_absolute() {
            candidate
                .strip_prefix(&self.root)
                .map_err(|_| WriteError::OutsideRoot(candidate.to_path_buf()))?
        } else {
            candidate
        };

        let mut parts: Vec<String> = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(WriteError::OutsideRoot(candidate.to_path_buf()));
                }
            }
        }

        let key = parts.join("/");
        let absolute = self.root.join(&key);
        Ok((key, absolute))
    }

    /// Write `content` (normalized) to `path`.
    pub fn write(
        &self,
        ledger: &mut ContentLedger,
        path: &str,
        content: &str,
        options: WriteOptions,
    ) -> Result<WriteOutcome, WriteError> {
        if is_suspicious_target(path) {
            let backtrace = std::backtrace::Backtrace::force_capture();
            warn!(path, %backtrace, "refusing suspicious write target");
            return Err(WriteError::SuspiciousTarget(PathBuf::from(path)));
        }
        let (key, absolute) = self.resolve(path)?;

        let normalized = normalize_text(content);
        let hash = sha256_hex(&normalized);
        let outcome = |written, reason| WriteOutcome {
            path: key.clone(),
            written,
            reason,
            hash: hash.clone(),
        };

        if options.dry_run {
            info!(path = %key, "dry run: would write");
            return Ok(outcome(false, WriteReason::WouldWrite));
        }

        let existing = read_optional(&absolute)?;
        let Some(existing) = existing else {
            if !options.allow_create {
                info!(path = %key, "skipped: creation disabled");
                return Ok(outcome(false, WriteReason::CreationDisabled));
            }
            atomic_write(&absolute, normalized.as_bytes(), self.durable)
                .map_err(|e| WriteError::io(&absolute, e))?;
            ledger.record(key.clone(), hash.clone());
            info!(path = %key, "created file");
            return Ok(outcome(true, WriteReason::Created));
        };

        let current_hash = sha256_hex(normalize_text(&String::from_utf8_lossy(&existing)));
        if current_hash == hash {
            if ledger.record(key.clone(), hash.clone()) {
                debug!(path = %key, "repaired stale ledger entry");
            }
            return Ok(outcome(false, WriteReason::Unchanged));
        }

        atomic_write(&absolute, normalized.as_bytes(), self.durable)
            .map_err(|e| WriteError::io(&absolute, e))?;
        ledger.record(key.clone(), hash.clone());
        info!(path = %key, "updated file");
        Ok(outcome(true, WriteReason::Updated))
    }

    /// Raw bytes of `path`, or `None` if it does not exist.
    pub fn read_bytes(&self, path: &str) -> Result<Option<Vec<u8>>, WriteError> {
        let (_, absolute) = self.resolve(path)?;
        read_optional(&absolute)
    }

    /// Content of `path` as text, or `None` if it does not exist.
    pub fn read_text(&self, path: &str) -> Result<Option<String>, WriteError> {
        Ok(self
            .read_bytes(path)?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Whether the normalized content of `path` already equals `content`.
    pub fn matches_disk(&self, path: &str, content: &str) -> Result<bool, WriteError> {
        Ok(self
            .read_text(path)?
            .is_some_and(|current| normalize_text(&current) == normalize_text(content)))
    }

    /// Put back exact prior bytes, bypassing normalization.
    pub fn restore_bytes(
        &self,
        ledger: &mut ContentLedger,
        path: &str,
        bytes: &[u8],
    ) -> Result<(), WriteError> {
        let (key, absolute) = self.resolve(path)?;
        atomic_write(&absolute, bytes, self.durable).map_err(|e| WriteError::io(&absolute, e))?;
        ledger.record(key, sha256_hex(normalize_text(&String::from_utf8_lossy(bytes))));
        Ok(())
    }

    /// Delete a file created by an apply and drop its ledger entry.
    pub fn remove(&self, ledger: &mut ContentLedger, path: &str) -> Result<(), WriteError> {
        let (key, absolute) = self.resolve(path)?;
        match fs::remove_file(&absolute) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(WriteError::io(&absolute, err)),
        }
        ledger.remove(&key);
        Ok(())
    }
}

/// Empty names, bare names of three characters or fewer, and reserved
/// scratch names are never valid write targets.
pub fn is_suspicious_target(path: &str) -> bool {
    let path = Path::new(path);
    let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
        return true;
    };
    let name = name.trim();
    if name.is_empty() || RESERVED_NAMES.contains(&name.to_ascii_lowercase().as_str()) {
        return true;
    }
    name.chars().count() <= 3 && path.extension().is_none()
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, WriteError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(WriteError::io(path, err)),
    }
}

/// Write `bytes` to `path` through a sibling temp file and an atomic rename.
///
/// Readers observe either the old or the new content, never a partial file.
pub(crate) fn atomic_write(path: &Path, bytes: &[u8], durable: bool) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut temp_file = NamedTempFile::new_in(parent)?;
    temp_file.write_all(bytes)?;
    temp_file.flush()?;

    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(temp_file.path(), meta.permissions())?;
    }

    if durable {
        temp_file.as_file().sync_data()?;
    }

    temp_file.persist(path).map_err(|e| e.error)?;

    if durable {
        fsync_parent_dir(parent)?;
    }
    Ok(())
}

#[cfg(unix)]
fn fsync_parent_dir(parent: &Path) -> io::Result<()> {
    File::open(parent)?.sync_all()
}

#[cfg(not(unix))]
fn fsync_parent_dir(_parent: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::content_hash;
    use tempfile::TempDir;

    fn store() -> (TempDir, ContentStore) {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::new(tmp.path()).with_durability(false);
        (tmp, store)
    }

    const CREATE: WriteOptions = WriteOptions::new(false, true);

    #[test]
    fn test_write_twice_is_idempotent() {
        let (tmp, store) = store();
        let mut ledger = ContentLedger::new();

        let first = store.write(&mut ledger, "src/lib.rs", "fn a() {}  \r\n\n\n", CREATE).unwrap();
        assert!(first.written);
        assert_eq!(first.reason, WriteReason::Created);

        let second = store.write(&mut ledger, "src/lib.rs", "fn a() {}  \r\n\n\n", CREATE).unwrap();
        assert!(!second.written);
        assert_eq!(second.reason, WriteReason::Unchanged);

        let on_disk = fs::read_to_string(tmp.path().join("src/lib.rs")).unwrap();
        assert_eq!(on_disk, "fn a() {}\n");
        assert_eq!(ledger.get("src/lib.rs"), Some(content_hash("fn a() {}").as_str()));
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let (tmp, store) = store();
        let mut ledger = ContentLedger::new();

        let outcome = store
            .write(&mut ledger, "new.rs", "x", WriteOptions::new(true, true))
            .unwrap();
        assert_eq!(outcome.reason, WriteReason::WouldWrite);
        assert_eq!(outcome.reason.as_str(), "would write");
        assert!(!outcome.written);
        assert!(!tmp.path().join("new.rs").exists());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_creation_disabled() {
        let (tmp, store) = store();
        let mut ledger = ContentLedger::new();

        let outcome = store
            .write(&mut ledger, "missing.rs", "x", WriteOptions::default())
            .unwrap();
        assert!(!outcome.written);
        assert_eq!(outcome.reason.as_str(), "skipped: creation disabled");
        assert!(!tmp.path().join("missing.rs").exists());
    }

    #[test]
    fn test_existing_file_updated_without_create_flag() {
        let (tmp, store) = store();
        fs::write(tmp.path().join("main.rs"), "old\n").unwrap();
        let mut ledger = ContentLedger::new();

        let outcome = store
            .write(&mut ledger, "main.rs", "new", WriteOptions::default())
            .unwrap();
        assert!(outcome.written);
        assert_eq!(outcome.reason, WriteReason::Updated);
        assert_eq!(fs::read_to_string(tmp.path().join("main.rs")).unwrap(), "new\n");
    }

    #[test]
    fn test_suspicious_targets_refused() {
        let (tmp, store) = store();
        let mut ledger = ContentLedger::new();

        for target in ["", "py", "tmp", "abc", "dir/ab", "tmpfile"] {
            let result = store.write(&mut ledger, target, "x", CREATE);
            assert!(
                matches!(result, Err(WriteError::SuspiciousTarget(_))),
                "expected {target:?} to be refused"
            );
        }
        assert!(!tmp.path().join("abc").exists());
    }

    #[test]
    fn test_short_names_with_extension_allowed() {
        assert!(!is_suspicious_target("a.rs"));
        assert!(!is_suspicious_target("Makefile"));
        assert!(!is_suspicious_target("src/main.go"));
        assert!(is_suspicious_target("src/go"));
    }

    #[test]
    fn test_paths_outside_root_refused() {
        let (_tmp, store) = store();
        let mut ledger = ContentLedger::new();
        let result = store.write(&mut ledger, "../escape.rs", "x", CREATE);
        assert!(matches!(result, Err(WriteError::OutsideRoot(_))));
    }

    #[test]
    fn test_stale_ledger_entry_repaired_on_noop() {
        let (tmp, store) = store();
        fs::write(tmp.path().join("a.rs"), "same\n").unwrap();
        let mut ledger = ContentLedger::new();
        ledger.record("a.rs", "stale-hash");

        let outcome = store.write(&mut ledger, "a.rs", "same", CREATE).unwrap();
        assert!(!outcome.written);
        assert_eq!(ledger.get("a.rs"), Some(content_hash("same").as_str()));
    }

    #[test]
    fn test_ledger_match_does_not_skip_when_disk_differs() {
        let (tmp, store) = store();
        fs::write(tmp.path().join("a.rs"), "edited by hand\n").unwrap();
        let mut ledger = ContentLedger::new();
        ledger.record("a.rs", content_hash("wanted"));

        let outcome = store.write(&mut ledger, "a.rs", "wanted", CREATE).unwrap();
        assert!(outcome.written);
        assert_eq!(fs::read_to_string(tmp.path().join("a.rs")).unwrap(), "wanted\n");
    }

    #[test]
    fn test_restore_bytes_is_exact() {
        let (tmp, store) = store();
        let original = b"keep  \r\n\n\n\ttrailing\t";
        fs::write(tmp.path().join("a.rs"), original).unwrap();
        let mut ledger = ContentLedger::new();

        store.write(&mut ledger, "a.rs", "changed", CREATE).unwrap();
        store.restore_bytes(&mut ledger, "a.rs", original).unwrap();

        assert_eq!(fs::read(tmp.path().join("a.rs")).unwrap(), original);
    }

    #[test]
    fn test_remove_created_file() {
        let (tmp, store) = store();
        let mut ledger = ContentLedger::new();
        store.write(&mut ledger, "gen/new.rs", "x", CREATE).unwrap();

        store.remove(&mut ledger, "gen/new.rs").unwrap();
        assert!(!tmp.path().join("gen/new.rs").exists());
        assert!(ledger.get("gen/new.rs").is_none());
        store.remove(&mut ledger, "gen/new.rs").unwrap();
    }
}
