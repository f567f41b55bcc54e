//! Kernel buffer pool and memory mapping
//!
//! Buffers go through three steps: the pool is requested, each slot is
//! queried for its kernel-assigned length and offset, and only then is it
//! mapped. A [`BufferDescriptor`] can only come out of [`query_buffer`], so a
//! mapping can never be attempted with guessed or zeroed metadata.

use std::{io, mem};

use memmap2::MmapMut;
use nix::errno::Errno;
use tracing::{debug, info};
use v4l::buffer::Type;
use v4l::memory::Memory;

use super::ioctl::{xioctl, ControlDevice, Request};
use super::sys::{v4l2_buffer, v4l2_requestbuffers};
use crate::error::{CaptureError, Result};

/// Buffers the kernel allocated for memory-mapped capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPool {
    count: u32,
}

impl BufferPool {
    /// Number of buffers actually allocated, which may differ from the request.
    pub fn count(&self) -> u32 {
        self.count
    }
}

/// Kernel-assigned placement of one pool buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDescriptor {
    index: u32,
    length: u32,
    offset: u32,
}

impl BufferDescriptor {
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Buffer size in bytes.
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Mapping cookie to pass as the `mmap` offset.
    pub fn offset(&self) -> u32 {
        self.offset
    }
}

/// A pool buffer mapped into this process.
///
/// The kernel writes frame data into the region once the buffer is queued
/// and streaming is on. Reads are not synchronised with those writes until
/// the buffer has been dequeued. The region is unmapped on drop.
#[derive(Debug)]
pub struct MappedBuffer {
    descriptor: BufferDescriptor,
    region: MmapMut,
}

impl MappedBuffer {
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    pub fn index(&self) -> u32 {
        self.descriptor.index
    }

    pub fn len(&self) -> usize {
        self.region.len()
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.region
    }
}

/// Ask the kernel for `count` memory-mapped capture buffers.
pub fn request_buffer_pool<D: ControlDevice + ?Sized>(device: &D, count: u32) -> Result<BufferPool> {
    let mut req = v4l2_requestbuffers {
        count,
        type_: Type::VideoCapture as u32,
        memory: Memory::Mmap as u32,
        // SAFETY: `v4l2_requestbuffers` is plain integers.
        ..unsafe { mem::zeroed() }
    };

    xioctl(device, &mut Request::RequestBuffers(&mut req)).map_err(|source| {
        CaptureError::AllocationRejected {
            requested: count,
            source,
        }
    })?;

    if req.count == 0 {
        return Err(CaptureError::EmptyPool { requested: count });
    }
    if req.count != count {
        debug!("Driver allocated {} buffers instead of {}", req.count, count);
    }

    info!("Allocated {} mmap buffers", req.count);
    Ok(BufferPool { count: req.count })
}

/// Fetch the length and offset the kernel assigned to buffer `index`.
pub fn query_buffer<D: ControlDevice + ?Sized>(
    device: &D,
    pool: &BufferPool,
    index: u32,
) -> Result<BufferDescriptor> {
    if index >= pool.count {
        return Err(CaptureError::InvalidIndex {
            index,
            source: Errno::EINVAL,
        });
    }

    let mut buf = v4l2_buffer {
        index,
        type_: Type::VideoCapture as u32,
        memory: Memory::Mmap as u32,
        // SAFETY: zero is valid for every member, including the `m` union.
        ..unsafe { mem::zeroed() }
    };

    xioctl(device, &mut Request::QueryBuffer(&mut buf))
        .map_err(|source| CaptureError::InvalidIndex { index, source })?;

    // SAFETY: for MMAP buffers the kernel fills `m.offset`.
    let offset = unsafe { buf.m.offset };
    debug!("Buffer {}: {} bytes at offset {:#x}", index, buf.length, offset);

    Ok(BufferDescriptor {
        index,
        length: buf.length,
        offset,
    })
}

/// Map the buffer described by `descriptor` read/write into this process.
pub fn map_buffer<D: ControlDevice + ?Sized>(
    device: &D,
    descriptor: &BufferDescriptor,
) -> Result<MappedBuffer> {
    let map_failed = |source: io::Error| CaptureError::MapFailed {
        index: descriptor.index,
        length: descriptor.length,
        offset: descriptor.offset,
        source,
    };

    if descriptor.length == 0 {
        return Err(map_failed(io::Error::new(
            io::ErrorKind::InvalidInput,
            "kernel reported a zero-length buffer",
        )));
    }
    if descriptor.offset as usize % page_size::get() != 0 {
        return Err(map_failed(io::Error::new(
            io::ErrorKind::InvalidInput,
            "offset is not page aligned",
        )));
    }

    let region = device
        .map_shared(descriptor.length as usize, u64::from(descriptor.offset))
        .map_err(map_failed)?;

    Ok(MappedBuffer {
        descriptor: *descriptor,
        region,
    })
}
