//! Snapshot files and their scoped cleanup.
//!
//! A snapshot is an offline copy of the CIB plus a frozen `.orig` twin taken
//! at export time. Both live in a permission-restricted directory and are
//! removed together when the owning [`Snapshot`] is released or dropped, so no
//! exit path can leak them.

use crate::error::{Result, io_err};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Pacemaker's CIB directory, readable only by root and hacluster.
pub const DEFAULT_SNAPSHOT_DIR: &str = "/var/lib/pacemaker/cib";

/// Name prefix for CIB backups.
pub const BACKUP_PREFIX: &str = "cib-backup-";

/// Name prefix for simulator transition graphs.
pub const SIMULATE_PREFIX: &str = "cib-simulate-";

const ORIG_SUFFIX: &str = ".orig";

/// Path of the frozen twin of `path`.
pub fn orig_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(ORIG_SUFFIX);
    PathBuf::from(name)
}

/// Generate `<prefix><YYYYmmdd>-<pid>-<random base36>`.
pub fn tmp_name(prefix: &str) -> String {
    let date = chrono::Local::now().format("%Y%m%d");
    let random = (uuid::Uuid::new_v4().as_u128() & 0xffff_ffff) as u64;
    format!("{prefix}{date}-{}-{}", std::process::id(), to_base36(random))
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(path, e)),
    }
}

/// Delete a snapshot and its `.orig` twin. Missing files are fine.
pub fn release_paths(path: &Path) -> Result<()> {
    let main = remove_if_exists(path);
    let orig = remove_if_exists(&orig_path(path));
    main.and(orig)
}

/// The directory snapshots are created in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotDir {
    base: PathBuf,
}

impl SnapshotDir {
    /// Use `base` as the snapshot directory.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// The base directory.
    pub fn path(&self) -> &Path {
        &self.base
    }

    /// Create the directory (mode 0700) if it does not exist yet.
    pub fn ensure(&self) -> Result<()> {
        if self.base.is_dir() {
            return Ok(());
        }
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder.create(&self.base).map_err(|e| io_err(&self.base, e))
    }

    /// Reserve a fresh snapshot guard. No file is created yet.
    pub fn acquire(&self, prefix: &str) -> Snapshot {
        Snapshot::new(self.base.join(tmp_name(prefix)))
    }
}

/// Guard over one snapshot file and its `.orig` twin.
#[derive(Debug)]
pub struct Snapshot {
    path: PathBuf,
    released: bool,
}

impl Snapshot {
    /// Take ownership of `path`; it is deleted when the guard goes away.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            released: false,
        }
    }

    /// The working copy.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The frozen copy taken at export time.
    pub fn orig_path(&self) -> PathBuf {
        orig_path(&self.path)
    }

    /// Duplicate the working copy into its `.orig` twin.
    pub fn freeze(&self) -> Result<()> {
        let orig = self.orig_path();
        fs::copy(&self.path, &orig).map_err(|e| io_err(&orig, e))?;
        Ok(())
    }

    /// Whether the working copy still hashes the same as its twin.
    pub fn is_unchanged(&self) -> Result<bool> {
        Ok(digest(&self.path)? == digest(&self.orig_path())?)
    }

    /// Delete both files now.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        release_paths(&self.path)
    }

    /// Delete both files, logging instead of failing when that goes wrong.
    pub fn discard(self) {
        let path = self.path.clone();
        if let Err(e) = self.release() {
            log::warn!("could not remove snapshot {}: {e}", path.display());
        }
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = release_paths(&self.path)
        {
            log::warn!("could not remove snapshot {}: {e}", self.path.display());
        }
    }
}

fn digest(path: &Path) -> Result<blake3::Hash> {
    let content = fs::read(path).map_err(|e| io_err(path, e))?;
    Ok(blake3::hash(&content))
}
