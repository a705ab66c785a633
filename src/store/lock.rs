//! Index locks.
//!
//! A [`LockFactory`] hands out named [`Lock`]s scoped to one directory. Only
//! one writer may hold the index lock at a time; readers never take it. The
//! factories here are advisory: they coordinate processes that agree on the
//! convention, they do not lock byte ranges of data files.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Name of the lock an index writer holds
pub const WRITE_LOCK_NAME: &str = "write.lock";

/// Default poll interval for [`Lock::obtain_timeout`]
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(1000);

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

/// Process-unique id identifying one lock handle
fn next_owner() -> u64 {
    NEXT_OWNER.fetch_add(1, Ordering::Relaxed)
}

/// An acquirable named exclusive lock
pub trait Lock: fmt::Display + Send {
    /// Try once to acquire the lock; `Ok(false)` means someone else holds it
    fn obtain(&mut self) -> Result<bool>;

    /// Release the lock if this handle holds it
    fn release(&mut self) -> Result<()>;

    /// Whether the lock is currently held by anyone
    fn is_locked(&self) -> Result<bool>;

    /// Poll [`obtain`](Lock::obtain) until it succeeds or `timeout` elapses
    fn obtain_timeout(&mut self, timeout: Duration, poll_interval: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.obtain()? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(StoreError::LockObtainFailed(self.to_string()));
            }
            thread::sleep(poll_interval);
        }
    }
}

/// Creates and clears locks for one directory
pub trait LockFactory: Send + Sync + fmt::Debug {
    fn make_lock(&self, name: &str) -> Box<dyn Lock>;

    /// Forcibly remove a lock, whether or not anyone holds it.
    ///
    /// A handle that held the cleared lock no longer owns it; its release
    /// leaves any later holder's lock in place.
    fn clear_lock(&self, name: &str) -> Result<()>;

    fn lock_prefix(&self) -> Option<String>;

    /// Bind the prefix used to namespace lock names.
    ///
    /// # Panics
    ///
    /// If the prefix was already set.
    fn set_lock_prefix(&self, prefix: Option<String>);

    /// Downcast hook for factories that keep lock files on disk
    fn as_fs_lock_factory(&self) -> Option<&dyn FsLockFactory> {
        None
    }
}

/// A lock factory whose locks live as files in a lock directory
pub trait FsLockFactory: LockFactory {
    fn lock_dir(&self) -> Option<PathBuf>;

    /// # Panics
    ///
    /// If the lock directory was already set.
    fn set_lock_dir(&self, dir: PathBuf);
}

/// Write-once lock prefix shared by the factory implementations
#[derive(Debug, Default)]
struct LockPrefix(OnceLock<Option<String>>);

impl LockPrefix {
    fn get(&self) -> Option<String> {
        self.0.get().cloned().flatten()
    }

    fn set(&self, prefix: Option<String>) {
        if self.0.set(prefix).is_err() {
            panic!("lock prefix can not be set twice");
        }
    }

    fn apply(&self, name: &str) -> String {
        match self.get() {
            Some(prefix) => format!("{}-{}", prefix, name),
            None => name.to_string(),
        }
    }
}

/// Lock strategy selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LockFactoryKind {
    /// Lock files created exclusively on disk
    #[default]
    Simple,
    /// In-process locks, for single-process deployments
    SingleInstance,
    /// No locking at all, for read-only use
    #[serde(rename = "none")]
    Disabled,
}

impl LockFactoryKind {
    pub fn build(self, lock_dir: Option<PathBuf>) -> Arc<dyn LockFactory> {
        match self {
            LockFactoryKind::Simple => match lock_dir {
                Some(dir) => Arc::new(SimpleFsLockFactory::with_lock_dir(dir)),
                None => Arc::new(SimpleFsLockFactory::new()),
            },
            LockFactoryKind::SingleInstance => Arc::new(SingleInstanceLockFactory::new()),
            LockFactoryKind::Disabled => Arc::new(NoLockFactory::default()),
        }
    }
}

// ---------------------------------------------------------------------------
// Simple filesystem locks
// ---------------------------------------------------------------------------

/// Locks acquired by exclusively creating a file in the lock directory.
///
/// A process that dies while holding a lock leaves the file behind; remove it
/// with [`LockFactory::clear_lock`] once no writer is running.
#[derive(Debug, Default)]
pub struct SimpleFsLockFactory {
    lock_dir: OnceLock<PathBuf>,
    prefix: LockPrefix,
}

impl SimpleFsLockFactory {
    /// A factory without a lock directory; binding it to a directory makes
    /// the locks live inside the index directory
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lock_dir(dir: impl Into<PathBuf>) -> Self {
        let factory = Self::default();
        factory.set_lock_dir(dir.into());
        factory
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        let dir = self
            .lock_dir
            .get()
            .unwrap_or_else(|| panic!("lock directory is not set for lock '{}'", name));
        dir.join(self.prefix.apply(name))
    }
}

impl LockFactory for SimpleFsLockFactory {
    fn make_lock(&self, name: &str) -> Box<dyn Lock> {
        Box::new(SimpleFsLock {
            path: self.lock_path(name),
            token: format!("{}:{}", std::process::id(), next_owner()),
            held: false,
        })
    }

    fn clear_lock(&self, name: &str) -> Result<()> {
        let path = self.lock_path(name);
        match fs::remove_file(&path) {
            Ok(()) => {
                warn!(lock = %path.display(), "cleared lock file");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::LockReleaseFailed(format!(
                "cannot delete {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn lock_prefix(&self) -> Option<String> {
        self.prefix.get()
    }

    fn set_lock_prefix(&self, prefix: Option<String>) {
        self.prefix.set(prefix);
    }

    fn as_fs_lock_factory(&self) -> Option<&dyn FsLockFactory> {
        Some(self)
    }
}

impl FsLockFactory for SimpleFsLockFactory {
    fn lock_dir(&self) -> Option<PathBuf> {
        self.lock_dir.get().cloned()
    }

    fn set_lock_dir(&self, dir: PathBuf) {
        if self.lock_dir.set(dir).is_err() {
            panic!("the lock directory for this factory can only be set once");
        }
    }
}

/// The lock file holds `token` while this handle owns it
struct SimpleFsLock {
    path: PathBuf,
    token: String,
    held: bool,
}

impl SimpleFsLock {
    fn ensure_lock_dir(&self) -> Result<()> {
        let Some(dir) = self.path.parent() else {
            return Ok(());
        };
        match fs::metadata(dir) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(StoreError::NotADirectory(dir.to_path_buf())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => fs::create_dir_all(dir)
                .map_err(|e| {
                    StoreError::io(format!("cannot create lock directory {}", dir.display()), e)
                }),
            Err(e) => Err(StoreError::io(
                format!("cannot stat lock directory {}", dir.display()),
                e,
            )),
        }
    }

    /// Whether the lock file on disk still carries this handle's token
    fn owns_file(&self) -> Result<bool> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents == self.token),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::LockReleaseFailed(format!(
                "cannot read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

impl Lock for SimpleFsLock {
    fn obtain(&mut self) -> Result<bool> {
        if self.held {
            return Ok(false);
        }
        self.ensure_lock_dir()?;
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(mut file) => {
                if let Err(e) = file.write_all(self.token.as_bytes()) {
                    let _ = fs::remove_file(&self.path);
                    return Err(StoreError::io(
                        format!("cannot write lock file {}", self.path.display()),
                        e,
                    ));
                }
                self.held = true;
                debug!(lock = %self.path.display(), "obtained lock");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(StoreError::io(
                format!("cannot create lock file {}", self.path.display()),
                e,
            )),
        }
    }

    fn release(&mut self) -> Result<()> {
        if !self.held {
            return Ok(());
        }
        if !self.owns_file()? {
            warn!(lock = %self.path.display(), "lock file vanished or was taken over while held");
            self.held = false;
            return Ok(());
        }
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(lock = %self.path.display(), "lock file vanished while held");
            }
            Err(e) => {
                return Err(StoreError::LockReleaseFailed(format!(
                    "{}: {}",
                    self.path.display(),
                    e
                )));
            }
        }
        self.held = false;
        debug!(lock = %self.path.display(), "released lock");
        Ok(())
    }

    fn is_locked(&self) -> Result<bool> {
        Ok(self.path.exists())
    }
}

impl Drop for SimpleFsLock {
    fn drop(&mut self) {
        if self.held {
            if let Err(e) = self.release() {
                warn!(error = %e, "failed to release lock on drop");
            }
        }
    }
}

impl fmt::Display for SimpleFsLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SimpleFsLock@{}", self.path.display())
    }
}

// ---------------------------------------------------------------------------
// In-process locks
// ---------------------------------------------------------------------------

/// Locks held in a table shared by every lock the factory makes, mapping
/// each held name to the id of the handle holding it
#[derive(Debug, Default)]
pub struct SingleInstanceLockFactory {
    held: Arc<Mutex<HashMap<String, u64>>>,
    prefix: LockPrefix,
}

impl SingleInstanceLockFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockFactory for SingleInstanceLockFactory {
    fn make_lock(&self, name: &str) -> Box<dyn Lock> {
        Box::new(SingleInstanceLock {
            name: self.prefix.apply(name),
            owner: next_owner(),
            held_names: Arc::clone(&self.held),
            held: false,
        })
    }

    fn clear_lock(&self, name: &str) -> Result<()> {
        let name = self.prefix.apply(name);
        lock_set(&self.held).remove(&name);
        Ok(())
    }

    fn lock_prefix(&self) -> Option<String> {
        self.prefix.get()
    }

    fn set_lock_prefix(&self, prefix: Option<String>) {
        self.prefix.set(prefix);
    }
}

type HeldLocks = HashMap<String, u64>;

fn lock_set(set: &Mutex<HeldLocks>) -> std::sync::MutexGuard<'_, HeldLocks> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct SingleInstanceLock {
    name: String,
    owner: u64,
    held_names: Arc<Mutex<HeldLocks>>,
    held: bool,
}

impl SingleInstanceLock {
    /// Drop the table entry only while it still names this handle
    fn remove_own_entry(&mut self) {
        let mut held = lock_set(&self.held_names);
        if held.get(&self.name) == Some(&self.owner) {
            held.remove(&self.name);
        } else {
            warn!(lock = %self.name, "lock was cleared while held");
        }
        self.held = false;
    }
}

impl Lock for SingleInstanceLock {
    fn obtain(&mut self) -> Result<bool> {
        if self.held {
            return Ok(false);
        }
        if let Entry::Vacant(slot) = lock_set(&self.held_names).entry(self.name.clone()) {
            slot.insert(self.owner);
            self.held = true;
        }
        Ok(self.held)
    }

    fn release(&mut self) -> Result<()> {
        if self.held {
            self.remove_own_entry();
        }
        Ok(())
    }

    fn is_locked(&self) -> Result<bool> {
        Ok(lock_set(&self.held_names).contains_key(&self.name))
    }
}

impl Drop for SingleInstanceLock {
    fn drop(&mut self) {
        if self.held {
            self.remove_own_entry();
        }
    }
}

impl fmt::Display for SingleInstanceLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SingleInstanceLock: {}", self.name)
    }
}

// ---------------------------------------------------------------------------
// No locking
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct NoLockFactory {
    prefix: LockPrefix,
}

impl LockFactory for NoLockFactory {
    fn make_lock(&self, name: &str) -> Box<dyn Lock> {
        Box::new(NoLock {
            name: self.prefix.apply(name),
        })
    }

    fn clear_lock(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn lock_prefix(&self) -> Option<String> {
        self.prefix.get()
    }

    fn set_lock_prefix(&self, prefix: Option<String>) {
        self.prefix.set(prefix);
    }
}

struct NoLock {
    name: String,
}

impl Lock for NoLock {
    fn obtain(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn release(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_locked(&self) -> Result<bool> {
        Ok(false)
    }
}

impl fmt::Display for NoLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NoLock: {}", self.name)
    }
}

/// True when both paths name the same location on disk
pub(crate) fn same_location(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
