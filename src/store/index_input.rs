use crate::error::Result;
use crate::store::data_input::DataInput;
use std::fmt;
use std::sync::Arc;

/// Human-readable name of the resource behind an input, used in error
/// messages. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescription(Arc<str>);

impl ResourceDescription {
    /// # Panics
    ///
    /// If `description` is empty.
    pub fn new(description: impl Into<String>) -> Self {
        let description = description.into();
        assert!(
            !description.is_empty(),
            "resource description must not be empty"
        );
        Self(Arc::from(description))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Description of a sub-range of this resource
    pub fn slice(&self, name: &str) -> Self {
        Self::new(format!("{} [slice={}]", self.0, name))
    }
}

impl fmt::Display for ResourceDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named, positionable, read-only byte cursor over one logical resource
pub trait IndexInput: DataInput + Send {
    fn description(&self) -> &ResourceDescription;

    /// Logical length in bytes
    fn length(&self) -> u64;

    /// Absolute offset of the next byte to be read
    fn file_pointer(&self) -> u64;

    /// Move the cursor. Seeking past [`length`](IndexInput::length) is
    /// allowed; the next read fails.
    fn seek(&mut self, pos: u64) -> Result<()>;

    /// An independent cursor over the same resource, starting at the current
    /// position
    fn clone_input(&self) -> Result<Box<dyn IndexInput>>;

    /// A cursor over `[offset, offset + length)` of this input, starting at 0
    fn slice(&self, name: &str, offset: u64, length: u64) -> Result<Box<dyn IndexInput>>;

    /// Release the input. Closing an input twice is an error.
    fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;

    /// Bytes left between the cursor and the logical end
    fn remaining(&self) -> u64 {
        self.length().saturating_sub(self.file_pointer())
    }
}

impl fmt::Display for dyn IndexInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.description(), f)
    }
}

impl fmt::Debug for dyn IndexInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IndexInput").field(self.description()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description() {
        let desc = ResourceDescription::new("FsIndexInput(path=\"/idx/_0.cfs\")");
        assert_eq!(desc.to_string(), "FsIndexInput(path=\"/idx/_0.cfs\")");
        assert_eq!(
            desc.slice("_0.tis").as_str(),
            "FsIndexInput(path=\"/idx/_0.cfs\") [slice=_0.tis]"
        );
    }

    #[test]
    #[should_panic(expected = "resource description must not be empty")]
    fn test_empty_description_panics() {
        ResourceDescription::new("");
    }
}
