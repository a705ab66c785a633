//! Buffered input over an open file.
//!
//! The descriptor is shared between an original input, its clones and its
//! slices through an [`Arc`]. Every physical read is positioned
//! (`pread`-style), so no cursor state lives in the descriptor and holders
//! never race on it. The descriptor closes when the last holder lets go;
//! closing the original while clones are still open is rejected.

use crate::error::{Result, StoreError};
use crate::store::buffered::{BufferedIndexInput, InputBackend};
use crate::store::context::IoContext;
use crate::store::index_input::ResourceDescription;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// Default upper bound on a single physical read: effectively unchunked
pub const DEFAULT_READ_CHUNK_SIZE: usize = i32::MAX as usize;

/// Buffered input over a file, or over a window of one
pub type FsIndexInput = BufferedIndexInput<FsFileBackend>;

#[derive(Debug)]
struct SharedFile {
    file: File,
    path: PathBuf,
}

/// Unbuffered reads over `[off, end)` of a shared file
#[derive(Debug)]
pub struct FsFileBackend {
    handle: Option<Arc<SharedFile>>,
    is_clone: bool,
    chunk_size: usize,
    off: u64,
    end: u64,
    physical_reads: u64,
}

impl FsFileBackend {
    /// Open `path` as a whole-file view
    pub fn open(path: &Path, chunk_size: usize) -> Result<Self> {
        assert!(chunk_size > 0, "chunk size must be greater than 0");
        let file = File::open(path)
            .map_err(|e| StoreError::io(format!("failed to open {}", path.display()), e))?;
        let size = file
            .metadata()
            .map_err(|e| StoreError::io(format!("failed to stat {}", path.display()), e))?
            .len();
        Ok(Self {
            handle: Some(Arc::new(SharedFile {
                file,
                path: path.to_path_buf(),
            })),
            is_clone: false,
            chunk_size,
            off: 0,
            end: size,
            physical_reads: 0,
        })
    }

    pub fn is_clone(&self) -> bool {
        self.is_clone
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of read calls issued to the OS
    pub fn physical_reads(&self) -> u64 {
        self.physical_reads
    }

    /// Holders of the descriptor, including this one; 0 once released
    pub fn open_handles(&self) -> usize {
        self.handle.as_ref().map(Arc::strong_count).unwrap_or(0)
    }

    fn shared(&self) -> Result<&Arc<SharedFile>> {
        self.handle
            .as_ref()
            .ok_or_else(|| StoreError::AlreadyClosed("file handle".to_string()))
    }

    fn derive(&self, off: u64, end: u64) -> Result<Self> {
        Ok(Self {
            handle: Some(Arc::clone(self.shared()?)),
            is_clone: true,
            chunk_size: self.chunk_size,
            off,
            end,
            physical_reads: 0,
        })
    }
}

impl InputBackend for FsFileBackend {
    fn length(&self) -> u64 {
        self.end - self.off
    }

    fn read_internal(&mut self, pos: u64, buf: &mut [u8]) -> Result<()> {
        let shared = Arc::clone(self.shared()?);
        let mut done = 0;
        let mut file_pos = self.off + pos;
        while done < buf.len() {
            let n = (buf.len() - done).min(self.chunk_size);
            read_exact_at(&shared.file, &mut buf[done..done + n], file_pos).map_err(|e| {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    StoreError::PastEnd {
                        resource: format!("{} (file truncated)", shared.path.display()),
                    }
                } else {
                    StoreError::io(
                        format!("read failed at {} in {}", file_pos, shared.path.display()),
                        e,
                    )
                }
            })?;
            self.physical_reads += 1;
            done += n;
            file_pos += n as u64;
        }
        if buf.len() > self.chunk_size {
            trace!(
                path = %shared.path.display(),
                len = buf.len(),
                chunk_size = self.chunk_size,
                "chunked read"
            );
        }
        Ok(())
    }

    fn try_clone(&self) -> Result<Self> {
        self.derive(self.off, self.end)
    }

    fn slice(&self, offset: u64, length: u64) -> Result<Self> {
        let off = self.off + offset;
        self.derive(off, off + length)
    }

    fn close(&mut self) -> Result<()> {
        let Some(handle) = self.handle.as_ref() else {
            return Ok(());
        };
        if !self.is_clone {
            let holders = Arc::strong_count(handle);
            if holders > 1 {
                return Err(StoreError::ClonesOutstanding {
                    resource: handle.path.display().to_string(),
                    clones: holders - 1,
                });
            }
            debug!(path = %handle.path.display(), "closing file");
        }
        // the descriptor closes when the last Arc drops
        self.handle = None;
        Ok(())
    }
}

impl FsIndexInput {
    /// Open `path` with the buffer size chosen by `context`
    pub fn open(path: &Path, context: IoContext, chunk_size: usize) -> Result<Self> {
        Self::open_with_buffer_size(path, context.buffer_size(), chunk_size)
    }

    pub fn open_with_buffer_size(
        path: &Path,
        buffer_size: usize,
        chunk_size: usize,
    ) -> Result<Self> {
        let backend = FsFileBackend::open(path, chunk_size)?;
        let description =
            ResourceDescription::new(format!("FsIndexInput(path=\"{}\")", path.display()));
        debug!(path = %path.display(), len = backend.length(), buffer_size, "opened input");
        Ok(Self::with_buffer_size(description, buffer_size, backend))
    }

    pub fn is_clone(&self) -> bool {
        self.backend().is_clone()
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::data_input::DataInput;
    use crate::store::index_input::IndexInput;
    use std::fs;
    use std::thread;
    use tempfile::tempdir;

    fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn test_whole_file_view() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "_0.frq", &[9; 37]);
        let input = FsIndexInput::open(&path, IoContext::DEFAULT, DEFAULT_READ_CHUNK_SIZE).unwrap();
        assert_eq!(input.length(), 37);
        assert_eq!(input.buffer_size(), 1024);
        assert!(!input.is_clone());
        assert!(input.description().as_str().contains("_0.frq"));
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempdir().unwrap();
        let err = FsIndexInput::open(&dir.path().join("nope"), IoContext::DEFAULT, 16).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_chunked_reads() {
        let dir = tempdir().unwrap();
        let data: Vec<u8> = (0..100).collect();
        let path = write_file(dir.path(), "big", &data);

        let mut input = FsIndexInput::open_with_buffer_size(&path, 8, 3).unwrap();
        let mut buf = vec![0u8; 100];
        input.read_bytes(&mut buf).unwrap();
        assert_eq!(buf, data);
        // 100 bytes straight through, 3 per call
        assert_eq!(input.backend().physical_reads(), 34);
    }

    #[test]
    fn test_refill_respects_chunk_size() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "f", &[1; 10]);
        let mut input = FsIndexInput::open_with_buffer_size(&path, 10, 4).unwrap();
        input.read_byte().unwrap();
        assert_eq!(input.refill_count(), 1);
        assert_eq!(input.backend().physical_reads(), 3);
    }

    #[test]
    fn test_clone_shares_descriptor() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "f", &(0..64).collect::<Vec<u8>>());
        let mut original = FsIndexInput::open_with_buffer_size(&path, 4, 16).unwrap();
        original.read_int().unwrap();

        let mut clone = original.try_clone().unwrap();
        assert!(clone.is_clone());
        assert_eq!(original.backend().open_handles(), 2);
        assert_eq!(clone.file_pointer(), 4);

        clone.seek(60).unwrap();
        assert_eq!(clone.read_byte().unwrap(), 60);
        assert_eq!(original.file_pointer(), 4);
        assert_eq!(original.read_byte().unwrap(), 4);

        clone.close().unwrap();
        assert_eq!(original.backend().open_handles(), 1);
        assert_eq!(original.read_byte().unwrap(), 5);
        original.close().unwrap();
        assert_eq!(original.backend().open_handles(), 0);
    }

    #[test]
    fn test_close_original_with_open_clone_is_rejected() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "f", &[1, 2, 3]);
        let mut original = FsIndexInput::open_with_buffer_size(&path, 4, 16).unwrap();
        let clone = original.try_clone().unwrap();

        let err = original.close().unwrap_err();
        assert!(matches!(err, StoreError::ClonesOutstanding { clones: 1, .. }));
        assert!(!original.is_closed());
        assert_eq!(original.read_byte().unwrap(), 1);

        drop(clone);
        original.close().unwrap();
    }

    #[test]
    fn test_slice_window() {
        let dir = tempdir().unwrap();
        let data: Vec<u8> = (0..50).collect();
        let path = write_file(dir.path(), "_0.cfs", &data);
        let input = FsIndexInput::open_with_buffer_size(&path, 4, 16).unwrap();

        let mut slice = input.try_slice("_0.tis", 20, 10).unwrap();
        assert_eq!(slice.length(), 10);
        assert!(slice.is_clone());
        assert_eq!(slice.read_byte().unwrap(), 20);

        let mut nested = slice.try_slice("inner", 5, 5).unwrap();
        assert_eq!(nested.read_byte().unwrap(), 25);
        nested.seek(4).unwrap();
        assert_eq!(nested.read_byte().unwrap(), 29);
        assert!(nested.read_byte().unwrap_err().is_past_end());
    }

    #[test]
    fn test_truncated_file_is_past_end() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "f", &[0; 32]);
        let mut input = FsIndexInput::open_with_buffer_size(&path, 16, 64).unwrap();
        fs::write(&path, [0u8; 4]).unwrap();
        assert!(input.read_byte().unwrap_err().is_past_end());
    }

    #[test]
    fn test_clones_read_concurrently() {
        let dir = tempdir().unwrap();
        let data: Vec<u8> = (0..=255).cycle().take(8192).collect();
        let path = write_file(dir.path(), "f", &data);
        let original = FsIndexInput::open_with_buffer_size(&path, 64, 1024).unwrap();

        let handles: Vec<_> = (0..4u64)
            .map(|i| {
                let mut clone = original.try_clone().unwrap();
                let expected = data.clone();
                thread::spawn(move || {
                    let start = i * 1000;
                    clone.seek(start).unwrap();
                    for offset in start..start + 3000 {
                        assert_eq!(clone.read_byte().unwrap(), expected[offset as usize]);
                    }
                    assert_eq!(clone.file_pointer(), start + 3000);
                    clone.close().unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(original.file_pointer(), 0);
        assert_eq!(original.backend().open_handles(), 1);
    }
}
