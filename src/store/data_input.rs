//! Byte-cursor decoding.
//!
//! Every multi-byte value is derived from [`DataInput::read_byte`] (and the
//! bulk [`DataInput::read_bytes`]). Fixed-width integers are big-endian;
//! variable-length integers use 7-bit groups, low group first.

use crate::error::{Result, StoreError};

/// Longest valid vint encoding in bytes
const MAX_VINT_BYTES: u32 = 5;

/// Longest valid vlong encoding in bytes (non-negative values only)
const MAX_VLONG_BYTES: u32 = 9;

/// Piece size for string reads; the result only grows as bytes arrive
const STRING_CHUNK: usize = 4096;

pub trait DataInput {
    /// Read a single byte
    fn read_byte(&mut self) -> Result<u8>;

    /// Fill `buf` completely
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        for b in buf.iter_mut() {
            *b = self.read_byte()?;
        }
        Ok(())
    }

    /// Two bytes, big-endian
    fn read_short(&mut self) -> Result<i16> {
        let b0 = self.read_byte()? as u16;
        let b1 = self.read_byte()? as u16;
        Ok(((b0 << 8) | b1) as i16)
    }

    /// Four bytes, big-endian
    fn read_int(&mut self) -> Result<i32> {
        let b0 = self.read_byte()? as u32;
        let b1 = self.read_byte()? as u32;
        let b2 = self.read_byte()? as u32;
        let b3 = self.read_byte()? as u32;
        Ok(((b0 << 24) | (b1 << 16) | (b2 << 8) | b3) as i32)
    }

    /// Eight bytes, big-endian: the high word is read first
    fn read_long(&mut self) -> Result<i64> {
        let high = self.read_int()? as i64;
        let low = self.read_int()? as i64;
        Ok((high << 32) | (low & 0xFFFF_FFFF))
    }

    fn read_vint(&mut self) -> Result<i32> {
        let mut result: u32 = 0;
        for i in 0..MAX_VINT_BYTES {
            let b = self.read_byte()?;
            let shift = 7 * i;
            if i == MAX_VINT_BYTES - 1 && b & 0xF0 != 0 {
                return Err(StoreError::Malformed {
                    kind: "vint",
                    detail: format!("too many bits in final byte 0x{:02x}", b),
                });
            }
            result |= ((b & 0x7F) as u32) << shift;
            if b & 0x80 == 0 {
                return Ok(result as i32);
            }
        }
        Err(StoreError::Malformed {
            kind: "vint",
            detail: format!("longer than {} bytes", MAX_VINT_BYTES),
        })
    }

    fn read_vlong(&mut self) -> Result<i64> {
        let mut result: u64 = 0;
        for i in 0..MAX_VLONG_BYTES {
            let b = self.read_byte()?;
            result |= ((b & 0x7F) as u64) << (7 * i);
            if b & 0x80 == 0 {
                return Ok(result as i64);
            }
        }
        Err(StoreError::Malformed {
            kind: "vlong",
            detail: format!("longer than {} bytes", MAX_VLONG_BYTES),
        })
    }

    /// A vint byte length followed by that many UTF-8 bytes
    fn read_string(&mut self) -> Result<String> {
        let len = self.read_vint()?;
        if len < 0 {
            return Err(StoreError::Malformed {
                kind: "string",
                detail: format!("negative length {}", len),
            });
        }
        let len = len as usize;
        let mut bytes = Vec::with_capacity(len.min(STRING_CHUNK));
        let mut chunk = [0u8; STRING_CHUNK];
        while bytes.len() < len {
            let n = (len - bytes.len()).min(STRING_CHUNK);
            self.read_bytes(&mut chunk[..n])?;
            bytes.extend_from_slice(&chunk[..n]);
        }
        String::from_utf8(bytes).map_err(|e| StoreError::Malformed {
            kind: "string",
            detail: e.to_string(),
        })
    }

    /// Discard `count` bytes
    fn skip_bytes(&mut self, count: u64) -> Result<()> {
        let mut scratch = [0u8; 256];
        let mut remaining = count;
        while remaining > 0 {
            let n = remaining.min(scratch.len() as u64) as usize;
            self.read_bytes(&mut scratch[..n])?;
            remaining -= n as u64;
        }
        Ok(())
    }
}
