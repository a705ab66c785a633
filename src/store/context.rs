//! IO context: why a file is being opened, and the buffer size that follows.

/// Default read buffer size in bytes
pub const BUFFER_SIZE: usize = 1024;

/// Read buffer size used while merging segments
pub const MERGE_BUFFER_SIZE: usize = 4096;

/// Purpose of an open call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IoContextKind {
    #[default]
    Default,
    Read,
    Merge,
    Flush,
}

/// Usage hint passed to [`Directory::open_input`](crate::store::Directory::open_input).
///
/// Carries no I/O state; it only parametrizes buffering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IoContext {
    kind: IoContextKind,
    read_once: bool,
}

impl IoContext {
    pub const DEFAULT: IoContext = IoContext {
        kind: IoContextKind::Default,
        read_once: false,
    };

    pub const READ: IoContext = IoContext {
        kind: IoContextKind::Read,
        read_once: false,
    };

    pub const READ_ONCE: IoContext = IoContext {
        kind: IoContextKind::Read,
        read_once: true,
    };

    pub const MERGE: IoContext = IoContext {
        kind: IoContextKind::Merge,
        read_once: false,
    };

    pub const FLUSH: IoContext = IoContext {
        kind: IoContextKind::Flush,
        read_once: false,
    };

    /// A read context, optionally flagged as a single sequential pass
    pub const fn read(read_once: bool) -> Self {
        Self {
            kind: IoContextKind::Read,
            read_once,
        }
    }

    pub const fn kind(&self) -> IoContextKind {
        self.kind
    }

    pub const fn is_read_once(&self) -> bool {
        self.read_once
    }

    /// Buffer size for a buffered input opened under this context.
    ///
    /// Merges read long sequential spans, so they get a larger buffer. It is
    /// kept small because many inputs are open at once during a merge.
    pub const fn buffer_size(&self) -> usize {
        match self.kind {
            IoContextKind::Merge => MERGE_BUFFER_SIZE,
            _ => BUFFER_SIZE,
        }
    }
}

impl From<IoContextKind> for IoContext {
    fn from(kind: IoContextKind) -> Self {
        Self {
            kind,
            read_once: false,
        }
    }
}
