use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the storage layer.
///
/// Contract violations (using a closed directory, an empty resource
/// description, a non-positive buffer size, setting a lock prefix twice) are
/// not represented here: they panic.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("directory '{}' does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("file '{}' exists but is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("file '{name}' not found in directory '{}'", .path.display())]
    FileNotFound { name: String, path: PathBuf },

    #[error("read past EOF: {resource}")]
    PastEnd { resource: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("{0} is already closed")]
    AlreadyClosed(String),

    #[error("cannot close {resource}: {clones} clone(s) still open")]
    ClonesOutstanding { resource: String, clones: usize },

    #[error("lock obtain timed out: {0}")]
    LockObtainFailed(String),

    #[error("failed to release lock: {0}")]
    LockReleaseFailed(String),

    #[error(
        "slice [{offset}, {offset}+{length}) out of bounds for {resource} (length {available})"
    )]
    InvalidSlice {
        resource: String,
        offset: u64,
        length: u64,
        available: u64,
    },

    #[error("malformed {kind}: {detail}")]
    Malformed { kind: &'static str, detail: String },
}

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Wrap an I/O error with the path or resource it concerns
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        StoreError::Io {
            context: context.into(),
            source,
        }
    }

    /// True for missing directories and missing files
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::NotFound(_) | StoreError::FileNotFound { .. } => true,
            StoreError::Io { source, .. } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    pub fn is_past_end(&self) -> bool {
        matches!(self, StoreError::PastEnd { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::PastEnd {
            resource: "FsIndexInput(path=\"/tmp/x/_0.cfs\")".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "read past EOF: FsIndexInput(path=\"/tmp/x/_0.cfs\")"
        );

        let err = StoreError::NotADirectory(PathBuf::from("/tmp/file"));
        assert_eq!(
            err.to_string(),
            "file '/tmp/file' exists but is not a directory"
        );
    }

    #[test]
    fn test_not_found_classification() {
        assert!(StoreError::NotFound(PathBuf::from("/nope")).is_not_found());
        assert!(
            StoreError::io("open", io::Error::from(io::ErrorKind::NotFound)).is_not_found()
        );
        assert!(!StoreError::AlreadyClosed("dir".to_string()).is_not_found());
    }

    #[test]
    fn test_io_context_is_kept() {
        let err = StoreError::io(
            "failed to open /tmp/a",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.to_string(), "failed to open /tmp/a: denied");
        assert!(!err.is_past_end());
    }
}
