//! Directory backed by a filesystem path.

use crate::error::{Result, StoreError};
use crate::store::context::IoContext;
use crate::store::directory::{Directory, lock_id_for};
use crate::store::fs_input::{DEFAULT_READ_CHUNK_SIZE, FsIndexInput};
use crate::store::index_input::IndexInput;
use crate::store::lock::{LockFactory, SimpleFsLockFactory, same_location};
use crate::utils::StoreConfig;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// How [`FsDirectory::open_input`] reads files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadStrategy {
    /// Buffered positioned reads
    #[default]
    Buffered,
    /// Memory-mapped reads
    #[cfg(feature = "mmap")]
    Mmap,
}

pub struct FsDirectory {
    path: PathBuf,
    chunk_size: usize,
    buffer_size_override: Option<usize>,
    read_strategy: ReadStrategy,
    lock_factory: Arc<dyn LockFactory>,
    is_open: bool,
}

impl FsDirectory {
    /// Open a directory with lock files kept inside it.
    ///
    /// The path does not have to exist yet, but if it does it must be a
    /// directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_lock_factory(path, Arc::new(SimpleFsLockFactory::new()))
    }

    pub fn with_lock_factory(
        path: impl AsRef<Path>,
        lock_factory: Arc<dyn LockFactory>,
    ) -> Result<Self> {
        let path = resolve_location(path.as_ref())?;
        match fs::metadata(&path) {
            Ok(meta) if !meta.is_dir() => return Err(StoreError::NotADirectory(path)),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(StoreError::io(
                    format!("failed to stat {}", path.display()),
                    e,
                ));
            }
        }

        let dir = Self {
            path,
            chunk_size: DEFAULT_READ_CHUNK_SIZE,
            buffer_size_override: None,
            read_strategy: ReadStrategy::default(),
            lock_factory,
            is_open: true,
        };
        dir.bind(dir.lock_factory.as_ref());
        debug!(path = %dir.path.display(), lock_id = %dir.lock_id(), "opened directory");
        Ok(dir)
    }

    /// Open a directory configured by `config`
    pub fn open_with_config(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        let lock_factory = config.lock_factory.build(config.lock_dir.clone());
        let mut dir = Self::with_lock_factory(path, lock_factory)?;
        dir.set_read_chunk_size(config.effective_chunk_size());
        dir.buffer_size_override = config.effective_buffer_size();
        dir.read_strategy = strategy_for(config);
        Ok(dir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Upper bound on a single physical read issued by inputs opened later
    ///
    /// # Panics
    ///
    /// If `chunk_size` is 0.
    pub fn set_read_chunk_size(&mut self, chunk_size: usize) {
        assert!(chunk_size > 0, "chunk size must be greater than 0");
        self.chunk_size = chunk_size;
    }

    pub fn read_chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Use a fixed buffer size instead of the context's policy
    ///
    /// # Panics
    ///
    /// If `buffer_size` is `Some(0)`.
    pub fn set_buffer_size_override(&mut self, buffer_size: Option<usize>) {
        assert!(
            buffer_size != Some(0),
            "buffer size must be greater than 0 (got 0)"
        );
        self.buffer_size_override = buffer_size;
    }

    pub fn set_read_strategy(&mut self, strategy: ReadStrategy) {
        self.read_strategy = strategy;
    }

    pub fn read_strategy(&self) -> ReadStrategy {
        self.read_strategy
    }

    /// Open a buffered input with an explicit buffer size
    pub fn open_buffered(&self, name: &str, buffer_size: usize) -> Result<FsIndexInput> {
        self.ensure_open();
        let file_path = self.path.join(name);
        FsIndexInput::open_with_buffer_size(&file_path, buffer_size, self.chunk_size)
            .map_err(|e| self.not_found_as_file(name, e))
    }

    /// Filesystem lock factories that share this directory's location keep
    /// their files directly inside it, so the prefix is dropped.
    fn bind(&self, lock_factory: &dyn LockFactory) {
        let mut prefix = Some(self.lock_id());
        if let Some(fs_factory) = lock_factory.as_fs_lock_factory() {
            match fs_factory.lock_dir() {
                None => {
                    fs_factory.set_lock_dir(self.path.clone());
                    prefix = None;
                }
                Some(lock_dir) if same_location(&lock_dir, &self.path) => prefix = None,
                Some(_) => {}
            }
        }
        lock_factory.set_lock_prefix(prefix);
    }

    fn not_found_as_file(&self, name: &str, err: StoreError) -> StoreError {
        if err.is_not_found() {
            StoreError::FileNotFound {
                name: name.to_string(),
                path: self.path.clone(),
            }
        } else {
            err
        }
    }
}

impl Directory for FsDirectory {
    fn list_all(&self) -> Result<Vec<String>> {
        self.ensure_open();
        list_all(&self.path)
    }

    fn file_exists(&self, name: &str) -> Result<bool> {
        self.ensure_open();
        let file_path = self.path.join(name);
        file_path
            .try_exists()
            .map_err(|e| StoreError::io(format!("failed to stat {}", file_path.display()), e))
    }

    fn file_length(&self, name: &str) -> Result<u64> {
        self.ensure_open();
        let file_path = self.path.join(name);
        fs::metadata(&file_path)
            .map(|meta| meta.len())
            .map_err(|e| {
                self.not_found_as_file(
                    name,
                    StoreError::io(format!("failed to stat {}", file_path.display()), e),
                )
            })
    }

    fn open_input(&self, name: &str, context: IoContext) -> Result<Box<dyn IndexInput>> {
        self.ensure_open();
        match self.read_strategy {
            ReadStrategy::Buffered => {
                let buffer_size = self
                    .buffer_size_override
                    .unwrap_or_else(|| context.buffer_size());
                Ok(Box::new(self.open_buffered(name, buffer_size)?))
            }
            #[cfg(feature = "mmap")]
            ReadStrategy::Mmap => {
                let file_path = self.path.join(name);
                let input = crate::store::mmap_input::MmapIndexInput::open(&file_path)
                    .map_err(|e| self.not_found_as_file(name, e))?;
                Ok(Box::new(input))
            }
        }
    }

    fn lock_id(&self) -> String {
        self.ensure_open();
        lock_id_for(&self.path.to_string_lossy())
    }

    fn lock_factory(&self) -> &Arc<dyn LockFactory> {
        &self.lock_factory
    }

    fn set_lock_factory(&mut self, lock_factory: Arc<dyn LockFactory>) {
        self.ensure_open();
        self.bind(lock_factory.as_ref());
        self.lock_factory = lock_factory;
    }

    fn is_open(&self) -> bool {
        self.is_open
    }

    fn close(&mut self) -> Result<()> {
        if !self.is_open {
            return Err(StoreError::AlreadyClosed(self.to_string()));
        }
        self.is_open = false;
        debug!(path = %self.path.display(), "closed directory");
        Ok(())
    }
}

impl fmt::Display for FsDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FsDirectory@{}", self.path.display())
    }
}

impl fmt::Debug for FsDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsDirectory")
            .field("path", &self.path)
            .field("chunk_size", &self.chunk_size)
            .field("read_strategy", &self.read_strategy)
            .field("lock_factory", &self.lock_factory)
            .field("is_open", &self.is_open)
            .finish()
    }
}

#[cfg(feature = "mmap")]
fn strategy_for(config: &StoreConfig) -> ReadStrategy {
    if config.use_mmap {
        ReadStrategy::Mmap
    } else {
        ReadStrategy::Buffered
    }
}

#[cfg(not(feature = "mmap"))]
fn strategy_for(config: &StoreConfig) -> ReadStrategy {
    if config.use_mmap {
        tracing::warn!("use_mmap is set but the mmap feature is disabled; using buffered reads");
    }
    ReadStrategy::Buffered
}

/// Direct entries of the directory at `path`, sorted by name
pub fn list_all(path: &Path) -> Result<Vec<String>> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        Err(e) => return Err(StoreError::io(format!("failed to stat {}", path.display()), e)),
    };
    if !meta.is_dir() {
        return Err(StoreError::NotADirectory(path.to_path_buf()));
    }

    let entries = fs::read_dir(path)
        .map_err(|e| StoreError::io(format!("failed to list {}", path.display()), e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| StoreError::io(format!("failed to list {}", path.display()), e))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

/// Canonical form of `path` when it exists, otherwise its absolute form, so
/// that two handles over one location agree on their lock id
fn resolve_location(path: &Path) -> Result<PathBuf> {
    match path.canonicalize() {
        Ok(canonical) => Ok(canonical),
        Err(e) if e.kind() == io::ErrorKind::NotFound => std::path::absolute(path)
            .map_err(|e| StoreError::io(format!("failed to resolve {}", path.display()), e)),
        Err(e) => Err(StoreError::io(
            format!("failed to resolve {}", path.display()),
            e,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::data_input::DataInput;
    use crate::store::lock::{
        FsLockFactory, NoLockFactory, SingleInstanceLockFactory, WRITE_LOCK_NAME,
    };
    use tempfile::tempdir;

    #[test]
    fn test_open_nonexistent_path_is_allowed() {
        let dir = tempdir().unwrap();
        let index = FsDirectory::open(dir.path().join("not-yet")).unwrap();
        assert!(index.is_open());
        assert!(index.list_all().unwrap_err().is_not_found());
    }

    #[test]
    fn test_open_on_file_fails() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("plain");
        fs::write(&file, b"x").unwrap();
        let err = FsDirectory::open(&file).unwrap_err();
        assert!(matches!(err, StoreError::NotADirectory(_)));
    }

    #[test]
    fn test_list_all_errors() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(matches!(
            list_all(&missing).unwrap_err(),
            StoreError::NotFound(_)
        ));

        let file = dir.path().join("file");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(
            list_all(&file).unwrap_err(),
            StoreError::NotADirectory(_)
        ));
    }

    #[test]
    fn test_list_all_is_not_recursive() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("_0.cfs"), b"a").unwrap();
        fs::write(dir.path().join("segments_1"), b"b").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("nested"), b"c").unwrap();

        assert_eq!(list_all(dir.path()).unwrap(), vec!["_0.cfs", "segments_1", "sub"]);
    }

    #[test]
    fn test_default_lock_factory_lives_in_directory() {
        let dir = tempdir().unwrap();
        let index = FsDirectory::open(dir.path()).unwrap();
        let factory = index.lock_factory();
        assert_eq!(factory.lock_prefix(), None);
        assert_eq!(
            factory.as_fs_lock_factory().unwrap().lock_dir(),
            Some(index.path().to_path_buf())
        );

        let mut lock = index.make_lock(WRITE_LOCK_NAME);
        assert!(lock.obtain().unwrap());
        assert!(index.path().join(WRITE_LOCK_NAME).exists());
    }

    #[test]
    fn test_lock_factory_with_same_dir_drops_prefix() {
        let dir = tempdir().unwrap();
        let factory = Arc::new(SimpleFsLockFactory::with_lock_dir(dir.path()));
        let index = FsDirectory::with_lock_factory(dir.path(), factory).unwrap();
        assert_eq!(index.lock_factory().lock_prefix(), None);
    }

    #[test]
    fn test_separate_lock_dir_keeps_prefix() {
        let dir = tempdir().unwrap();
        let index_path = dir.path().join("index");
        let lock_path = dir.path().join("locks");
        fs::create_dir(&index_path).unwrap();

        let factory = Arc::new(SimpleFsLockFactory::with_lock_dir(&lock_path));
        let index = FsDirectory::with_lock_factory(&index_path, factory).unwrap();
        let lock_id = index.lock_id();
        assert_eq!(index.lock_factory().lock_prefix(), Some(lock_id.clone()));

        let mut lock = index.make_lock(WRITE_LOCK_NAME);
        assert!(lock.obtain().unwrap());
        assert!(lock_path.join(format!("{}-{}", lock_id, WRITE_LOCK_NAME)).exists());
    }

    #[test]
    fn test_non_fs_factory_gets_lock_id_prefix() {
        let dir = tempdir().unwrap();
        let mut index = FsDirectory::open(dir.path()).unwrap();
        index.set_lock_factory(Arc::new(SingleInstanceLockFactory::new()));
        assert_eq!(index.lock_factory().lock_prefix(), Some(index.lock_id()));
    }

    #[test]
    #[should_panic(expected = "lock prefix can not be set twice")]
    fn test_factory_cannot_be_bound_twice() {
        let dir = tempdir().unwrap();
        let factory: Arc<dyn LockFactory> = Arc::new(NoLockFactory::default());
        let _first = FsDirectory::with_lock_factory(dir.path(), Arc::clone(&factory)).unwrap();
        let _second = FsDirectory::with_lock_factory(dir.path(), factory).unwrap();
    }

    #[test]
    fn test_lock_id_stable_across_handles() {
        let dir = tempdir().unwrap();
        let a = FsDirectory::open(dir.path()).unwrap();
        let b = FsDirectory::open(dir.path().join(".")).unwrap();
        assert_eq!(a.lock_id(), a.lock_id());
        assert_eq!(a.lock_id(), b.lock_id());

        let other = tempdir().unwrap();
        let c = FsDirectory::open(other.path()).unwrap();
        assert_ne!(a.lock_id(), c.lock_id());
    }

    #[test]
    fn test_open_input_missing_file() {
        let dir = tempdir().unwrap();
        let index = FsDirectory::open(dir.path()).unwrap();
        let err = index.open_input("_9.cfs", IoContext::DEFAULT).unwrap_err();
        assert!(matches!(err, StoreError::FileNotFound { ref name, .. } if name == "_9.cfs"));
    }

    #[test]
    fn test_open_input_uses_context_buffer_size() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("f"), [0u8; 16]).unwrap();
        let index = FsDirectory::open(dir.path()).unwrap();

        let merge = index.open_buffered("f", IoContext::MERGE.buffer_size()).unwrap();
        assert_eq!(merge.buffer_size(), 4096);
        let input = index.open_input("f", IoContext::READ).unwrap();
        assert_eq!(input.length(), 16);
    }

    #[test]
    fn test_file_length_and_exists() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("segments_2"), [1u8; 20]).unwrap();
        let index = FsDirectory::open(dir.path()).unwrap();
        assert!(index.file_exists("segments_2").unwrap());
        assert!(!index.file_exists("segments_3").unwrap());
        assert_eq!(index.file_length("segments_2").unwrap(), 20);
        assert!(index.file_length("segments_3").unwrap_err().is_not_found());
    }

    #[test]
    fn test_chunk_size_applies_to_inputs() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("f"), [5u8; 64]).unwrap();
        let mut index = FsDirectory::open(dir.path()).unwrap();
        assert_eq!(index.read_chunk_size(), i32::MAX as usize);
        index.set_read_chunk_size(16);

        let mut input = index.open_buffered("f", 64).unwrap();
        input.read_byte().unwrap();
        assert_eq!(input.backend().chunk_size(), 16);
        assert_eq!(input.backend().physical_reads(), 4);
    }

    #[test]
    fn test_close_twice_is_error() {
        let dir = tempdir().unwrap();
        let mut index = FsDirectory::open(dir.path()).unwrap();
        index.close().unwrap();
        assert!(!index.is_open());
        assert!(matches!(
            index.close().unwrap_err(),
            StoreError::AlreadyClosed(_)
        ));
    }

    #[test]
    #[should_panic(expected = "this Directory is closed")]
    fn test_use_after_close_panics() {
        let dir = tempdir().unwrap();
        let mut index = FsDirectory::open(dir.path()).unwrap();
        index.close().unwrap();
        let _ = index.list_all();
    }

    #[test]
    #[should_panic(expected = "this Directory is closed")]
    fn test_lock_id_after_close_panics() {
        let dir = tempdir().unwrap();
        let mut index = FsDirectory::open(dir.path()).unwrap();
        index.close().unwrap();
        index.lock_id();
    }

    #[cfg(feature = "mmap")]
    #[test]
    fn test_mmap_strategy() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("f"), 42i32.to_be_bytes()).unwrap();
        let mut index = FsDirectory::open(dir.path()).unwrap();
        index.set_read_strategy(ReadStrategy::Mmap);

        let mut input = index.open_input("f", IoContext::DEFAULT).unwrap();
        assert!(input.description().as_str().starts_with("MmapIndexInput"));
        assert_eq!(input.read_int().unwrap(), 42);
    }
}
