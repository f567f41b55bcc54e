//! Interrupt-safe device control

use std::io;

use memmap2::MmapMut;
use nix::errno::Errno;
use tracing::trace;

use super::sys::{v4l2_buffer, v4l2_capability, v4l2_format, v4l2_requestbuffers};

/// A device-control request together with the argument structure it
/// reads and writes.
pub enum Request<'a> {
    QueryCapabilities(&'a mut v4l2_capability),
    SetFormat(&'a mut v4l2_format),
    RequestBuffers(&'a mut v4l2_requestbuffers),
    QueryBuffer(&'a mut v4l2_buffer),
    QueueBuffer(&'a mut v4l2_buffer),
    StreamOn(&'a libc::c_int),
}

impl Request<'_> {
    /// Kernel name of the request, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::QueryCapabilities(_) => "VIDIOC_QUERYCAP",
            Self::SetFormat(_) => "VIDIOC_S_FMT",
            Self::RequestBuffers(_) => "VIDIOC_REQBUFS",
            Self::QueryBuffer(_) => "VIDIOC_QUERYBUF",
            Self::QueueBuffer(_) => "VIDIOC_QBUF",
            Self::StreamOn(_) => "VIDIOC_STREAMON",
        }
    }
}

/// The two syscalls a capture session needs from a device node.
///
/// Implementations issue exactly one attempt per call; retrying is the job
/// of [`xioctl`].
pub trait ControlDevice {
    /// Issue a single device-control call.
    fn ioctl(&self, request: &mut Request<'_>) -> nix::Result<()>;

    /// Map `length` bytes of device memory at `offset`, shared and read/write.
    fn map_shared(&self, length: usize, offset: u64) -> io::Result<MmapMut>;
}

/// Issue `request`, reissuing it with the same argument while the call is
/// interrupted by a signal. Every other failure is returned as-is.
pub fn xioctl<D: ControlDevice + ?Sized>(device: &D, request: &mut Request<'_>) -> nix::Result<()> {
    loop {
        match device.ioctl(request) {
            Err(Errno::EINTR) => trace!(request = request.name(), "interrupted, retrying"),
            result => return result,
        }
    }
}
