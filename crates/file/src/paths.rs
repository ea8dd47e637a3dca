//! Managed file set
//!
//! Every persisted value owns four sibling paths derived from one base
//! path `P`:
//!
//! | Role | Path | Meaning |
//! |---|---|---|
//! | committed | `P` | last durable value |
//! | staging | `P.new` | staged next value, not yet durable |
//! | old | `P.old` | previous committed value, present only mid-pivot |
//! | lock | `P.lck` | exclusive-open sentinel |
//!
//! Between operations (after lock release) only `P` may exist; every other
//! combination marks an interrupted commit and is resolved by recovery.

use std::path::{Path, PathBuf};

/// Suffix of the staged-value file.
const STAGING_SUFFIX: &str = ".new";
/// Suffix of the superseded-value file.
const OLD_SUFFIX: &str = ".old";
/// Suffix of the lock sentinel file.
const LOCK_SUFFIX: &str = ".lck";

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// The four sibling paths a persister manages for one value
#[derive(Debug, Clone)]
pub struct ManagedPaths {
    committed: PathBuf,
    staging: PathBuf,
    old: PathBuf,
    lock: PathBuf,
}

impl ManagedPaths {
    /// Derive the file set from the base path of the persisted value
    pub fn new(base: impl Into<PathBuf>) -> Self {
        let committed = base.into();
        let staging = with_suffix(&committed, STAGING_SUFFIX);
        let old = with_suffix(&committed, OLD_SUFFIX);
        let lock = with_suffix(&committed, LOCK_SUFFIX);
        ManagedPaths {
            committed,
            staging,
            old,
            lock,
        }
    }

    /// Path of the last durable value
    pub fn committed(&self) -> &Path {
        &self.committed
    }

    /// Path the next value is staged into before the commit pivot
    pub fn staging(&self) -> &Path {
        &self.staging
    }

    /// Path the previous committed value briefly occupies during the pivot
    pub fn old(&self) -> &Path {
        &self.old
    }

    /// Path of the lock sentinel
    pub fn lock(&self) -> &Path {
        &self.lock
    }
}
