//! Queueing and stream activation

use std::mem;

use tracing::info;
use v4l::buffer::Type;
use v4l::memory::Memory;

use super::buffer::MappedBuffer;
use super::ioctl::{xioctl, ControlDevice, Request};
use super::sys::v4l2_buffer;
use crate::error::{CaptureError, Result};

/// A buffer the driver accepted into its incoming queue.
///
/// Only [`enqueue`] hands these out, and [`start_streaming`] takes one, so a
/// stream cannot be started before something has been queued. Drivers do
/// not check this themselves: videobuf2 accepts `VIDIOC_STREAMON` on an
/// empty queue and just defers the hardware start.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "the stream can only be started with a queued buffer"]
pub struct Queued {
    index: u32,
}

impl Queued {
    pub fn index(&self) -> u32 {
        self.index
    }
}

/// Hand a mapped buffer to the driver so it can be filled with a frame.
pub fn enqueue<D: ControlDevice + ?Sized>(device: &D, buffer: &MappedBuffer) -> Result<Queued> {
    let index = buffer.index();
    let mut buf = v4l2_buffer {
        index,
        type_: Type::VideoCapture as u32,
        memory: Memory::Mmap as u32,
        // SAFETY: zero is valid for every member, including the `m` union.
        ..unsafe { mem::zeroed() }
    };

    xioctl(device, &mut Request::QueueBuffer(&mut buf))
        .map_err(|source| CaptureError::EnqueueFailed { index, source })?;

    Ok(Queued { index })
}

/// Switch the device into active capture, with `queued` waiting to be filled.
pub fn start_streaming<D: ControlDevice + ?Sized>(device: &D, queued: &Queued) -> Result<()> {
    let kind = Type::VideoCapture as libc::c_int;
    xioctl(device, &mut Request::StreamOn(&kind)).map_err(CaptureError::StreamStartFailed)?;

    info!("Capture stream started, buffer {} queued", queued.index);
    Ok(())
}
