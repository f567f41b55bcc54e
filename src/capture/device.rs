//! Capture device node ownership

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};
use tracing::debug;

use super::ioctl::{ControlDevice, Request};
use super::sys;
use crate::error::{CaptureError, Result};

/// Open V4L2 device node.
///
/// Sole owner of the descriptor: it is never duplicated, and it is closed
/// when the handle is dropped. Mappings made through the handle keep their
/// own reference to the device and stay valid until they are dropped.
#[derive(Debug)]
pub struct DeviceHandle {
    file: File,
    path: PathBuf,
}

impl DeviceHandle {
    /// Open `path` for reading and writing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| CaptureError::DeviceUnavailable {
                path: path.display().to_string(),
                source,
            })?;

        debug!("Opened {} as fd {}", path.display(), file.as_raw_fd());

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ControlDevice for DeviceHandle {
    fn ioctl(&self, request: &mut Request<'_>) -> nix::Result<()> {
        let fd = self.file.as_raw_fd();

        // SAFETY: `fd` is open for the lifetime of `self`, and every variant
        // borrows an argument of the exact type its request code encodes.
        let result = unsafe {
            match request {
                Request::QueryCapabilities(caps) => sys::vidioc_querycap(fd, &mut **caps),
                Request::SetFormat(fmt) => sys::vidioc_s_fmt(fd, &mut **fmt),
                Request::RequestBuffers(req) => sys::vidioc_reqbufs(fd, &mut **req),
                Request::QueryBuffer(buf) => sys::vidioc_querybuf(fd, &mut **buf),
                Request::QueueBuffer(buf) => sys::vidioc_qbuf(fd, &mut **buf),
                Request::StreamOn(kind) => sys::vidioc_streamon(fd, *kind),
            }
        };

        result.map(drop)
    }

    fn map_shared(&self, length: usize, offset: u64) -> io::Result<MmapMut> {
        // SAFETY: the range is a kernel capture buffer backed by this
        // descriptor; nothing in this process resizes or remaps it.
        unsafe {
            MmapOptions::new()
                .len(length)
                .offset(offset)
                .map_mut(&self.file)
        }
    }
}
