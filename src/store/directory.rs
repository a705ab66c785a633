use crate::error::Result;
use crate::store::context::IoContext;
use crate::store::index_input::IndexInput;
use crate::store::lock::{Lock, LockFactory};
use std::sync::Arc;

/// A flat collection of named files plus a lock namespace.
///
/// Every capability requires the directory to be open; calling one after
/// [`close`](Directory::close) is a programming error and panics.
pub trait Directory: Send + Sync {
    /// Names of the entries directly inside the directory
    fn list_all(&self) -> Result<Vec<String>>;

    fn file_exists(&self, name: &str) -> Result<bool>;

    fn file_length(&self, name: &str) -> Result<u64>;

    /// Open a read cursor on `name`, buffered according to `context`
    fn open_input(&self, name: &str, context: IoContext) -> Result<Box<dyn IndexInput>>;

    /// Stable identifier of the directory's location. Two directories over
    /// the same location return the same id so their locks collide.
    fn lock_id(&self) -> String;

    fn lock_factory(&self) -> &Arc<dyn LockFactory>;

    /// Bind `lock_factory`, setting its lock prefix from [`lock_id`](Directory::lock_id)
    fn set_lock_factory(&mut self, lock_factory: Arc<dyn LockFactory>);

    fn is_open(&self) -> bool;

    /// Close the directory. Closing twice is an error.
    fn close(&mut self) -> Result<()>;

    fn make_lock(&self, name: &str) -> Box<dyn Lock> {
        self.ensure_open();
        self.lock_factory().make_lock(name)
    }

    fn clear_lock(&self, name: &str) -> Result<()> {
        self.ensure_open();
        self.lock_factory().clear_lock(name)
    }

    /// # Panics
    ///
    /// If the directory is closed.
    fn ensure_open(&self) {
        assert!(self.is_open(), "this Directory is closed");
    }
}

/// Base-31 polynomial hash of `location`, formatted as a lock id
pub fn lock_id_for(location: &str) -> String {
    let digest = location
        .chars()
        .fold(0u64, |digest, ch| digest.wrapping_mul(31).wrapping_add(ch as u64));
    format!("lucene-{}", digest)
}
