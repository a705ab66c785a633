//! Memory-mapped input.
//!
//! The map is shared by the original and its clones and slices; reads copy
//! straight out of it, so there is no buffer to refill.

use crate::error::{Result, StoreError};
use crate::store::data_input::DataInput;
use crate::store::index_input::{IndexInput, ResourceDescription};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
enum Mapping {
    Mapped(Mmap),
    /// Zero-length files cannot be mapped on every platform
    Empty,
}

#[derive(Debug)]
struct SharedMap {
    mapping: Mapping,
    path: PathBuf,
}

impl SharedMap {
    fn bytes(&self) -> &[u8] {
        match &self.mapping {
            Mapping::Mapped(map) => &map[..],
            Mapping::Empty => &[],
        }
    }
}

#[derive(Debug)]
pub struct MmapIndexInput {
    description: ResourceDescription,
    map: Option<Arc<SharedMap>>,
    is_clone: bool,
    off: u64,
    end: u64,
    /// Relative to `off`
    pos: u64,
}

impl MmapIndexInput {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| StoreError::io(format!("failed to open {}", path.display()), e))?;
        let len = file
            .metadata()
            .map_err(|e| StoreError::io(format!("failed to stat {}", path.display()), e))?
            .len();
        let mapping = if len == 0 {
            Mapping::Empty
        } else {
            // SAFETY: index files are written once and never modified in place
            let map = unsafe { Mmap::map(&file) }
                .map_err(|e| StoreError::io(format!("failed to map {}", path.display()), e))?;
            Mapping::Mapped(map)
        };
        debug!(path = %path.display(), len, "mapped input");
        Ok(Self {
            description: ResourceDescription::new(format!(
                "MmapIndexInput(path=\"{}\")",
                path.display()
            )),
            map: Some(Arc::new(SharedMap {
                mapping,
                path: path.to_path_buf(),
            })),
            is_clone: false,
            off: 0,
            end: len,
            pos: 0,
        })
    }

    pub fn is_clone(&self) -> bool {
        self.is_clone
    }

    fn shared(&self) -> Result<&Arc<SharedMap>> {
        self.map
            .as_ref()
            .ok_or_else(|| StoreError::AlreadyClosed(self.description.to_string()))
    }

    fn past_end(&self) -> StoreError {
        StoreError::PastEnd {
            resource: self.description.to_string(),
        }
    }

    fn derive(
        &self,
        description: ResourceDescription,
        off: u64,
        end: u64,
        pos: u64,
    ) -> Result<Self> {
        Ok(Self {
            description,
            map: Some(Arc::clone(self.shared()?)),
            is_clone: true,
            off,
            end,
            pos,
        })
    }
}

impl DataInput for MmapIndexInput {
    fn read_byte(&mut self) -> Result<u8> {
        let shared = self.shared()?;
        if self.pos >= self.end - self.off {
            return Err(self.past_end());
        }
        let b = shared.bytes()[(self.off + self.pos) as usize];
        self.pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        let shared = self.shared()?;
        let after = self
            .pos
            .checked_add(buf.len() as u64)
            .filter(|&after| after <= self.end - self.off)
            .ok_or_else(|| self.past_end())?;
        let start = (self.off + self.pos) as usize;
        buf.copy_from_slice(&shared.bytes()[start..start + buf.len()]);
        self.pos = after;
        Ok(())
    }
}

impl IndexInput for MmapIndexInput {
    fn description(&self) -> &ResourceDescription {
        &self.description
    }

    fn length(&self) -> u64 {
        self.end - self.off
    }

    fn file_pointer(&self) -> u64 {
        self.pos
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.shared()?;
        self.pos = pos;
        Ok(())
    }

    fn clone_input(&self) -> Result<Box<dyn IndexInput>> {
        let clone = self.derive(self.description.clone(), self.off, self.end, self.pos)?;
        Ok(Box::new(clone))
    }

    fn slice(&self, name: &str, offset: u64, length: u64) -> Result<Box<dyn IndexInput>> {
        let available = self.length();
        if offset.checked_add(length).is_none_or(|end| end > available) {
            return Err(StoreError::InvalidSlice {
                resource: self.description.to_string(),
                offset,
                length,
                available,
            });
        }
        let off = self.off + offset;
        let slice = self.derive(self.description.slice(name), off, off + length, 0)?;
        Ok(Box::new(slice))
    }

    fn close(&mut self) -> Result<()> {
        let shared = self.shared()?;
        if !self.is_clone {
            let holders = Arc::strong_count(shared);
            if holders > 1 {
                return Err(StoreError::ClonesOutstanding {
                    resource: shared.path.display().to_string(),
                    clones: holders - 1,
                });
            }
            debug!(path = %shared.path.display(), "unmapping file");
        }
        self.map = None;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.map.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_mapped_reads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("_0.tii");
        fs::write(&path, 0x0102_0304_0506_0708i64.to_be_bytes()).unwrap();

        let mut input = MmapIndexInput::open(&path).unwrap();
        assert_eq!(input.length(), 8);
        assert_eq!(input.read_long().unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(input.file_pointer(), 8);
        assert!(input.read_byte().unwrap_err().is_past_end());
    }

    #[test]
    fn test_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty");
        fs::write(&path, b"").unwrap();

        let mut input = MmapIndexInput::open(&path).unwrap();
        assert_eq!(input.length(), 0);
        assert!(input.read_byte().unwrap_err().is_past_end());
        input.close().unwrap();
    }

    #[test]
    fn test_clone_and_slice() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, (0..32).collect::<Vec<u8>>()).unwrap();

        let mut input = MmapIndexInput::open(&path).unwrap();
        input.seek(3).unwrap();
        let mut clone = input.clone_input().unwrap();
        let mut slice = input.slice("s", 10, 4).unwrap();

        assert_eq!(clone.read_byte().unwrap(), 3);
        assert_eq!(slice.read_byte().unwrap(), 10);
        assert_eq!(input.file_pointer(), 3);

        assert!(matches!(
            input.close().unwrap_err(),
            StoreError::ClonesOutstanding { clones: 2, .. }
        ));
        clone.close().unwrap();
        slice.close().unwrap();
        input.close().unwrap();
        assert!(input.is_closed());
        assert!(matches!(
            input.read_byte().unwrap_err(),
            StoreError::AlreadyClosed(_)
        ));
    }

    #[test]
    fn test_read_after_far_seek() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, [0u8; 16]).unwrap();

        let mut input = MmapIndexInput::open(&path).unwrap();
        input.seek(u64::MAX - 2).unwrap();
        let mut buf = [0u8; 8];
        assert!(input.read_bytes(&mut buf).unwrap_err().is_past_end());
        assert!(input.read_byte().unwrap_err().is_past_end());
    }
}
