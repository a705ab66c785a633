pub mod buffered;
pub mod context;
pub mod data_input;
pub mod directory;
pub mod fs_directory;
pub mod fs_input;
pub mod index_input;
pub mod lock;
pub mod memory;
#[cfg(feature = "mmap")]
pub mod mmap_input;

pub use buffered::{BufferedIndexInput, InputBackend};
pub use context::{IoContext, IoContextKind};
pub use data_input::DataInput;
pub use directory::{Directory, lock_id_for};
pub use fs_directory::{FsDirectory, ReadStrategy, list_all};
pub use fs_input::{DEFAULT_READ_CHUNK_SIZE, FsFileBackend, FsIndexInput};
pub use index_input::{IndexInput, ResourceDescription};
pub use lock::{
    FsLockFactory, Lock, LockFactory, LockFactoryKind, NoLockFactory, SimpleFsLockFactory,
    SingleInstanceLockFactory,
};
pub use memory::{MemoryBackend, MemoryIndexInput};
#[cfg(feature = "mmap")]
pub use mmap_input::MmapIndexInput;
