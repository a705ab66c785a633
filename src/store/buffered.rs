//! Buffered cursor over an unbuffered backend.
//!
//! [`BufferedIndexInput`] keeps a window `[buffer_start, buffer_start +
//! buffer_length)` of the resource in memory and only asks its
//! [`InputBackend`] for bytes when the window is exhausted. The cursor
//! position is always `buffer_start + buffer_position`.

use crate::error::{Result, StoreError};
use crate::store::context::IoContext;
use crate::store::data_input::DataInput;
use crate::store::index_input::{IndexInput, ResourceDescription};
use std::fmt;
use tracing::{debug, trace};

/// Unbuffered access to the bytes of one logical resource
pub trait InputBackend: Send + Sized + 'static {
    /// Logical length of the resource
    fn length(&self) -> u64;

    /// Notified when the cursor is repositioned outside its window.
    /// Backends that keep their own cursor reposition here.
    fn seek_internal(&mut self, _pos: u64) -> Result<()> {
        Ok(())
    }

    /// Fill `buf` with the bytes starting at logical offset `pos`
    fn read_internal(&mut self, pos: u64, buf: &mut [u8]) -> Result<()>;

    /// A backend sharing the same underlying resource
    fn try_clone(&self) -> Result<Self>;

    /// A backend over `[offset, offset + length)`; bounds are already checked
    fn slice(&self, offset: u64, length: u64) -> Result<Self>;

    fn close(&mut self) -> Result<()>;
}

pub struct BufferedIndexInput<B: InputBackend> {
    description: ResourceDescription,
    backend: B,
    buffer_size: usize,
    /// Empty until the first refill
    buffer: Vec<u8>,
    buffer_start: u64,
    buffer_length: usize,
    buffer_position: usize,
    refills: u64,
    closed: bool,
}

fn check_buffer_size(buffer_size: usize) {
    assert!(
        buffer_size > 0,
        "buffer size must be greater than 0 (got {})",
        buffer_size
    );
}

impl<B: InputBackend> BufferedIndexInput<B> {
    /// Buffer sized by the context's policy
    pub fn new(description: ResourceDescription, context: IoContext, backend: B) -> Self {
        Self::with_buffer_size(description, context.buffer_size(), backend)
    }

    /// # Panics
    ///
    /// If `buffer_size` is 0.
    pub fn with_buffer_size(
        description: ResourceDescription,
        buffer_size: usize,
        backend: B,
    ) -> Self {
        check_buffer_size(buffer_size);
        Self {
            description,
            backend,
            buffer_size,
            buffer: Vec::new(),
            buffer_start: 0,
            buffer_length: 0,
            buffer_position: 0,
            refills: 0,
            closed: false,
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Change the buffer size, keeping as many unread buffered bytes as fit.
    ///
    /// # Panics
    ///
    /// If `new_size` is 0.
    pub fn set_buffer_size(&mut self, new_size: usize) {
        check_buffer_size(new_size);
        if new_size == self.buffer_size {
            return;
        }
        self.buffer_size = new_size;
        if !self.buffer.is_empty() {
            let left = self.buffer_length - self.buffer_position;
            let keep = left.min(new_size);
            let mut new_buffer = vec![0u8; new_size];
            new_buffer[..keep]
                .copy_from_slice(&self.buffer[self.buffer_position..self.buffer_position + keep]);
            self.buffer_start += self.buffer_position as u64;
            self.buffer_position = 0;
            self.buffer_length = keep;
            self.buffer = new_buffer;
        }
    }

    /// Number of times the window was reloaded from the backend
    pub fn refill_count(&self) -> u64 {
        self.refills
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// A clone with the concrete type, for callers that need backend access
    pub fn try_clone(&self) -> Result<Self> {
        self.ensure_open()?;
        let backend = self.backend.try_clone()?;
        debug!(resource = %self.description, pos = self.file_pointer(), "cloned input");
        Ok(Self {
            description: self.description.clone(),
            backend,
            buffer_size: self.buffer_size,
            buffer: Vec::new(),
            buffer_start: self.file_pointer(),
            buffer_length: 0,
            buffer_position: 0,
            refills: 0,
            closed: false,
        })
    }

    /// A slice with the concrete type
    pub fn try_slice(&self, name: &str, offset: u64, length: u64) -> Result<Self> {
        self.ensure_open()?;
        let available = self.backend.length();
        if offset.checked_add(length).is_none_or(|end| end > available) {
            return Err(StoreError::InvalidSlice {
                resource: self.description.to_string(),
                offset,
                length,
                available,
            });
        }
        let backend = self.backend.slice(offset, length)?;
        Ok(Self::with_buffer_size(
            self.description.slice(name),
            self.buffer_size,
            backend,
        ))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(StoreError::AlreadyClosed(self.description.to_string()));
        }
        Ok(())
    }

    fn past_end(&self) -> StoreError {
        StoreError::PastEnd {
            resource: self.description.to_string(),
        }
    }

    /// Load the window that starts at the current position
    fn refill(&mut self) -> Result<()> {
        self.ensure_open()?;
        let start = self.buffer_start + self.buffer_position as u64;
        let end = start
            .saturating_add(self.buffer_size as u64)
            .min(self.backend.length());
        if end <= start {
            return Err(self.past_end());
        }
        let new_length = (end - start) as usize;

        if self.buffer.is_empty() {
            self.buffer = vec![0u8; self.buffer_size];
            self.backend.seek_internal(self.buffer_start)?;
        }
        self.backend
            .read_internal(start, &mut self.buffer[..new_length])?;

        self.buffer_length = new_length;
        self.buffer_start = start;
        self.buffer_position = 0;
        self.refills += 1;
        trace!(resource = %self.description, start, len = new_length, "refilled buffer");
        Ok(())
    }
}

impl<B: InputBackend> DataInput for BufferedIndexInput<B> {
    fn read_byte(&mut self) -> Result<u8> {
        if self.buffer_position >= self.buffer_length {
            self.refill()?;
        }
        let b = self.buffer[self.buffer_position];
        self.buffer_position += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        let available = self.buffer_length - self.buffer_position;
        if buf.len() <= available {
            let from = self.buffer_position;
            buf.copy_from_slice(&self.buffer[from..from + buf.len()]);
            self.buffer_position += buf.len();
            return Ok(());
        }

        if available > 0 {
            let from = self.buffer_position;
            buf[..available].copy_from_slice(&self.buffer[from..from + available]);
            self.buffer_position += available;
        }
        let rest = &mut buf[available..];

        if rest.len() < self.buffer_size {
            self.refill()?;
            if rest.len() > self.buffer_length {
                // copy what is left so the cursor ends at the logical end
                let n = self.buffer_length;
                rest[..n].copy_from_slice(&self.buffer[..n]);
                self.buffer_position = n;
                return Err(self.past_end());
            }
            rest.copy_from_slice(&self.buffer[..rest.len()]);
            self.buffer_position = rest.len();
            Ok(())
        } else {
            // large request: read straight into the caller's buffer
            self.ensure_open()?;
            let start = self.file_pointer();
            let after = start
                .checked_add(rest.len() as u64)
                .filter(|&after| after <= self.backend.length())
                .ok_or_else(|| self.past_end())?;
            self.backend.read_internal(start, rest)?;
            self.buffer_start = after;
            self.buffer_position = 0;
            self.buffer_length = 0;
            Ok(())
        }
    }
}

impl<B: InputBackend> IndexInput for BufferedIndexInput<B> {
    fn description(&self) -> &ResourceDescription {
        &self.description
    }

    fn length(&self) -> u64 {
        self.backend.length()
    }

    fn file_pointer(&self) -> u64 {
        self.buffer_start + self.buffer_position as u64
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.ensure_open()?;
        let window_end = self.buffer_start + self.buffer_length as u64;
        if pos >= self.buffer_start && pos < window_end {
            self.buffer_position = (pos - self.buffer_start) as usize;
        } else {
            self.buffer_start = pos;
            self.buffer_position = 0;
            self.buffer_length = 0;
            self.backend.seek_internal(pos)?;
        }
        Ok(())
    }

    fn clone_input(&self) -> Result<Box<dyn IndexInput>> {
        Ok(Box::new(self.try_clone()?))
    }

    fn slice(&self, name: &str, offset: u64, length: u64) -> Result<Box<dyn IndexInput>> {
        Ok(Box::new(self.try_slice(name, offset, length)?))
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.backend.close()?;
        self.closed = true;
        self.buffer = Vec::new();
        self.buffer_length = 0;
        self.buffer_position = 0;
        debug!(resource = %self.description, "closed input");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<B: InputBackend> fmt::Debug for BufferedIndexInput<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedIndexInput")
            .field("description", &self.description.as_str())
            .field("buffer_size", &self.buffer_size)
            .field("buffer_start", &self.buffer_start)
            .field("buffer_length", &self.buffer_length)
            .field("buffer_position", &self.buffer_position)
            .field("closed", &self.closed)
            .finish()
    }
}

impl<B: InputBackend> fmt::Display for BufferedIndexInput<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.description, f)
    }
}
