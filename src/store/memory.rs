use crate::error::Result;
use crate::store::buffered::{BufferedIndexInput, InputBackend};
use crate::store::index_input::ResourceDescription;
use std::sync::Arc;

/// Buffered input over bytes already in memory
pub type MemoryIndexInput = BufferedIndexInput<MemoryBackend>;

/// Backend over a shared byte slice
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    data: Arc<[u8]>,
    off: u64,
    end: u64,
}

impl MemoryBackend {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        let data = data.into();
        let end = data.len() as u64;
        Self { data, off: 0, end }
    }
}

impl InputBackend for MemoryBackend {
    fn length(&self) -> u64 {
        self.end - self.off
    }

    fn read_internal(&mut self, pos: u64, buf: &mut [u8]) -> Result<()> {
        let start = (self.off + pos) as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    fn try_clone(&self) -> Result<Self> {
        Ok(self.clone())
    }

    fn slice(&self, offset: u64, length: u64) -> Result<Self> {
        let off = self.off + offset;
        Ok(Self {
            data: Arc::clone(&self.data),
            off,
            end: off + length,
        })
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl MemoryIndexInput {
    pub fn from_bytes(name: &str, data: impl Into<Arc<[u8]>>, buffer_size: usize) -> Self {
        Self::with_buffer_size(
            ResourceDescription::new(format!("MemoryIndexInput({})", name)),
            buffer_size,
            MemoryBackend::new(data),
        )
    }
}
