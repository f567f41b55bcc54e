use std::fmt;
use std::io;

use nix::errno::Errno;
use thiserror::Error;

use crate::capture::format::FormatSpec;
use crate::capture::session::SessionState;

/// Session setup stage a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Configuration,
    Open,
    Capabilities,
    Format,
    BufferPool,
    BufferQuery,
    Mapping,
    Enqueue,
    StreamStart,
}

impl Stage {
    /// Process exit code reported when setup fails at this stage.
    ///
    /// Codes 1-6 keep their historical meaning; the buffer query and mapping
    /// stages were added later and take 7 and 8.
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Open => 1,
            Self::Capabilities => 2,
            Self::Format => 3,
            Self::BufferPool => 4,
            Self::Enqueue => 5,
            Self::StreamStart => 6,
            Self::BufferQuery => 7,
            Self::Mapping => 8,
            Self::Configuration => 9,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configuration => "configuration",
            Self::Open => "open",
            Self::Capabilities => "capabilities",
            Self::Format => "format",
            Self::BufferPool => "buffer pool",
            Self::BufferQuery => "buffer query",
            Self::Mapping => "mapping",
            Self::Enqueue => "enqueue",
            Self::StreamStart => "stream start",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Cannot open capture device {path}: {source}")]
    DeviceUnavailable {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Capability query failed: {0}")]
    CapabilityQuery(#[source] Errno),

    #[error("Device {card:?} doesn't support video capture")]
    NotACaptureDevice { card: String },

    #[error("Format {requested} rejected: {source}")]
    FormatRejected {
        requested: FormatSpec,
        #[source]
        source: Errno,
    },

    #[error("Request for {requested} mmap buffers rejected: {source}")]
    AllocationRejected {
        requested: u32,
        #[source]
        source: Errno,
    },

    #[error("Driver allocated no buffers (requested {requested})")]
    EmptyPool { requested: u32 },

    #[error("Buffer {index} is not part of the pool: {source}")]
    InvalidIndex {
        index: u32,
        #[source]
        source: Errno,
    },

    #[error("Mapping buffer {index} ({length} bytes at offset {offset:#x}) failed: {source}")]
    MapFailed {
        index: u32,
        length: u32,
        offset: u32,
        #[source]
        source: io::Error,
    },

    #[error("Queueing buffer {index} failed: {source}")]
    EnqueueFailed {
        index: u32,
        #[source]
        source: Errno,
    },

    #[error("Stream start failed: {0}")]
    StreamStartFailed(#[source] Errno),

    #[error("{stage} stage needs the session in state {expected:?}, but it is {actual:?}")]
    OutOfOrder {
        stage: Stage,
        expected: SessionState,
        actual: SessionState,
    },
}

impl CaptureError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::DeviceUnavailable { .. } => Stage::Open,
            Self::CapabilityQuery(_) | Self::NotACaptureDevice { .. } => Stage::Capabilities,
            Self::FormatRejected { .. } => Stage::Format,
            Self::AllocationRejected { .. } | Self::EmptyPool { .. } => Stage::BufferPool,
            Self::InvalidIndex { .. } => Stage::BufferQuery,
            Self::MapFailed { .. } => Stage::Mapping,
            Self::EnqueueFailed { .. } => Stage::Enqueue,
            Self::StreamStartFailed(_) => Stage::StreamStart,
            Self::OutOfOrder { stage, .. } => *stage,
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.stage().exit_code()
    }
}

pub type Result<T> = std::result::Result<T, CaptureError>;
