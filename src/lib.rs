//! # segdir - Index Directory Storage
//!
//! segdir is the storage layer under a search index: a flat namespace of
//! immutable segment files behind a [`Directory`](store::Directory), read
//! through buffered random-access cursors, with named locks so that at most
//! one writer touches an index at a time.
//!
//! ## Architecture
//!
//! The crate is organized into these main modules:
//!
//! - [`store`] - Directories, read cursors, IO contexts, and lock factories
//! - [`error`] - The [`StoreError`] type every fallible operation returns
//! - [`output`] - Listing and hex dump formatting for the `segdir` CLI
//! - [`utils`] - Configuration and encoders for the on-disk primitives
//!
//! ## Quick Start
//!
//! ```no_run
//! use segdir::store::{DataInput, Directory, FsDirectory, IndexInput, IoContext};
//!
//! let dir = FsDirectory::open("/path/to/index")?;
//! for name in dir.list_all()? {
//!     println!("{name}: {} bytes", dir.file_length(&name)?);
//! }
//!
//! let mut input = dir.open_input("segments_1", IoContext::READ)?;
//! let version = input.read_int()?;
//! let segment_count = input.read_vint()?;
//! println!("version {version}, {segment_count} segments");
//! input.close()?;
//! # Ok::<(), segdir::StoreError>(())
//! ```
//!
//! ## Reading
//!
//! Every cursor decodes the same big-endian primitives through
//! [`DataInput`](store::DataInput). File cursors keep a per-cursor buffer
//! sized by the [`IoContext`](store::IoContext) (1 KiB by default, 4 KiB for
//! merges) and issue positioned reads on a descriptor shared with their
//! clones, so clones can be read concurrently from different threads.

pub mod error;
pub mod output;
pub mod store;
pub mod utils;

pub use error::{Result, StoreError};
