//! Fake V4L2 driver for testing session setup without hardware.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::{io, mem};

use memmap2::{MmapMut, MmapOptions};
use nix::errno::Errno;
use v4l::buffer::Type;
use v4l::memory::Memory;
use v4l::v4l_sys::{V4L2_CAP_STREAMING, V4L2_CAP_VIDEO_CAPTURE};

use super::format::{FieldOrder, PixelFormat};
use super::ioctl::{ControlDevice, Request};
use super::sys::{v4l2_pix_format, V4L2_CAP_DEVICE_CAPS};

const BUF_TYPE_VIDEO_CAPTURE: u32 = Type::VideoCapture as u32;
const MEMORY_MMAP: u32 = Memory::Mmap as u32;

/// Something the fake device was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// One ioctl attempt, including interrupted ones.
    Ioctl(&'static str),
    Map { length: usize, offset: u64 },
}

/// In-memory device that behaves like a simple single-planar videobuf2
/// capture driver.
pub struct FakeDevice {
    capabilities: u32,
    sizes: Vec<(u32, u32)>,
    pixel_formats: Vec<PixelFormat>,
    min_buffers: u32,
    max_buffers: u32,
    zero_length: bool,
    map_fails: bool,
    interrupts: RefCell<HashMap<&'static str, u32>>,
    failures: HashMap<&'static str, Errno>,
    calls: RefCell<Vec<Call>>,
    format: Cell<v4l2_pix_format>,
    allocated: Cell<u32>,
    queued: RefCell<Vec<u32>>,
    streaming: Cell<bool>,
}

impl Default for FakeDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDevice {
    /// A capture device supporting MJPEG and YUYV at three sizes, with a
    /// pool of one to four buffers.
    pub fn new() -> Self {
        let mut device = Self {
            capabilities: V4L2_CAP_VIDEO_CAPTURE | V4L2_CAP_STREAMING,
            sizes: vec![(320, 240), (640, 480), (1280, 720)],
            pixel_formats: vec![PixelFormat::Mjpeg, PixelFormat::Yuyv],
            min_buffers: 1,
            max_buffers: 4,
            zero_length: false,
            map_fails: false,
            interrupts: RefCell::new(HashMap::new()),
            failures: HashMap::new(),
            calls: RefCell::new(Vec::new()),
            // SAFETY: `v4l2_pix_format` is plain integers.
            format: Cell::new(unsafe { mem::zeroed() }),
            allocated: Cell::new(0),
            queued: RefCell::new(Vec::new()),
            streaming: Cell::new(false),
        };
        let (width, height) = device.sizes[0];
        device.format = Cell::new(device.pix(width, height, PixelFormat::Mjpeg));
        device
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: u32) -> Self {
        self.capabilities = capabilities;
        self
    }

    #[must_use]
    pub fn with_sizes(mut self, sizes: &[(u32, u32)]) -> Self {
        self.sizes = sizes.to_vec();
        self
    }

    #[must_use]
    pub fn with_pixel_formats(mut self, formats: &[PixelFormat]) -> Self {
        self.pixel_formats = formats.to_vec();
        self
    }

    #[must_use]
    pub fn with_buffer_limits(mut self, min: u32, max: u32) -> Self {
        self.min_buffers = min;
        self.max_buffers = max;
        self
    }

    #[must_use]
    pub fn with_zero_length_buffers(mut self) -> Self {
        self.zero_length = true;
        self
    }

    #[must_use]
    pub fn fail_mapping(mut self) -> Self {
        self.map_fails = true;
        self
    }

    /// Make the next `times` attempts of `request` fail with `EINTR`.
    #[must_use]
    pub fn interrupt(self, request: &'static str, times: u32) -> Self {
        self.interrupts.borrow_mut().insert(request, times);
        self
    }

    /// Make every attempt of `request` fail with `errno`.
    #[must_use]
    pub fn fail(mut self, request: &'static str, errno: Errno) -> Self {
        self.failures.insert(request, errno);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn ioctl_names(&self) -> Vec<&'static str> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                Call::Ioctl(name) => Some(*name),
                Call::Map { .. } => None,
            })
            .collect()
    }

    pub fn queued(&self) -> Vec<u32> {
        self.queued.borrow().clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.get()
    }

    /// Length reported for every buffer of the current format.
    pub fn buffer_length(&self) -> u32 {
        if self.zero_length {
            0
        } else {
            self.format.get().sizeimage
        }
    }

    /// Distance between consecutive buffer offsets.
    pub fn buffer_stride(&self) -> u32 {
        let page = page_size::get() as u32;
        self.format.get().sizeimage.div_ceil(page) * page
    }

    fn pix(&self, width: u32, height: u32, pixel_format: PixelFormat) -> v4l2_pix_format {
        let bytes_per_line = if pixel_format == PixelFormat::Mjpeg {
            0
        } else {
            width * 2
        };
        v4l2_pix_format {
            width,
            height,
            pixelformat: pixel_format.to_raw(),
            field: FieldOrder::Progressive as u32,
            bytesperline: bytes_per_line,
            sizeimage: width * height * 2,
            // SAFETY: plain integers.
            ..unsafe { mem::zeroed() }
        }
    }

    fn closest_size(&self, width: u32, height: u32) -> (u32, u32) {
        self.sizes
            .iter()
            .copied()
            .min_by_key(|&(w, h)| w.abs_diff(width) + h.abs_diff(height))
            .unwrap_or((width, height))
    }
}

impl ControlDevice for FakeDevice {
    fn ioctl(&self, request: &mut Request<'_>) -> nix::Result<()> {
        let name = request.name();
        self.calls.borrow_mut().push(Call::Ioctl(name));

        if let Some(left) = self.interrupts.borrow_mut().get_mut(name) {
            if *left > 0 {
                *left -= 1;
                return Err(Errno::EINTR);
            }
        }
        if let Some(errno) = self.failures.get(name) {
            return Err(*errno);
        }

        match request {
            Request::QueryCapabilities(caps) => {
                caps.driver[..4].copy_from_slice(b"fake");
                caps.card[..11].copy_from_slice(b"Fake Camera");
                caps.bus_info[..6].copy_from_slice(b"fake:0");
                caps.version = 0x0006_0100;
                caps.capabilities = self.capabilities | V4L2_CAP_DEVICE_CAPS;
                caps.device_caps = self.capabilities;
            }
            Request::SetFormat(fmt) => {
                if fmt.type_ != BUF_TYPE_VIDEO_CAPTURE {
                    return Err(Errno::EINVAL);
                }
                // SAFETY: capture requests carry a single-planar pix format.
                let requested = unsafe { fmt.fmt.pix };
                let (width, height) = self.closest_size(requested.width, requested.height);
                let wanted = PixelFormat::from_raw(requested.pixelformat);
                let pixel_format = if self.pixel_formats.contains(&wanted) {
                    wanted
                } else {
                    self.pixel_formats[0]
                };
                let pix = self.pix(width, height, pixel_format);
                self.format.set(pix);
                fmt.fmt.pix = pix;
            }
            Request::RequestBuffers(req) => {
                if req.type_ != BUF_TYPE_VIDEO_CAPTURE || req.memory != MEMORY_MMAP {
                    return Err(Errno::EINVAL);
                }
                req.count = req.count.clamp(self.min_buffers, self.max_buffers);
                self.allocated.set(req.count);
            }
            Request::QueryBuffer(buf) => {
                if buf.index >= self.allocated.get() {
                    return Err(Errno::EINVAL);
                }
                buf.length = self.buffer_length();
                buf.m.offset = buf.index * self.buffer_stride();
            }
            Request::QueueBuffer(buf) => {
                if buf.index >= self.allocated.get() {
                    return Err(Errno::EINVAL);
                }
                self.queued.borrow_mut().push(buf.index);
            }
            Request::StreamOn(kind) => {
                // Like vb2_core_streamon: a pool is required, queued buffers
                // are not.
                if **kind != BUF_TYPE_VIDEO_CAPTURE as libc::c_int || self.allocated.get() == 0 {
                    return Err(Errno::EINVAL);
                }
                self.streaming.set(true);
            }
        }

        Ok(())
    }

    fn map_shared(&self, length: usize, offset: u64) -> io::Result<MmapMut> {
        self.calls.borrow_mut().push(Call::Map { length, offset });
        if self.map_fails {
            return Err(Errno::ENOMEM.into());
        }
        MmapOptions::new().len(length).map_anon()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::sys::v4l2_requestbuffers;

    #[test]
    fn test_fake_device_records_attempts() {
        let device = FakeDevice::new().interrupt("VIDIOC_STREAMON", 1);
        let kind: libc::c_int = 1;

        assert_eq!(device.ioctl(&mut Request::StreamOn(&kind)), Err(Errno::EINTR));
        // No pool allocated yet.
        assert_eq!(device.ioctl(&mut Request::StreamOn(&kind)), Err(Errno::EINVAL));
        assert_eq!(device.ioctl_names(), vec!["VIDIOC_STREAMON", "VIDIOC_STREAMON"]);
    }

    #[test]
    fn test_fake_device_streams_with_empty_queue() {
        let device = FakeDevice::new();
        let mut req: v4l2_requestbuffers = unsafe { mem::zeroed() };
        req.count = 1;
        req.type_ = BUF_TYPE_VIDEO_CAPTURE;
        req.memory = MEMORY_MMAP;
        device.ioctl(&mut Request::RequestBuffers(&mut req)).unwrap();
        let kind = BUF_TYPE_VIDEO_CAPTURE as libc::c_int;

        // The driver itself does not insist on a queued buffer.
        device.ioctl(&mut Request::StreamOn(&kind)).unwrap();

        assert!(device.queued().is_empty());
        assert!(device.is_streaming());
    }

    #[test]
    fn test_fake_device_picks_closest_size() {
        let device = FakeDevice::new();

        assert_eq!(device.closest_size(700, 500), (640, 480));
        assert_eq!(device.closest_size(9999, 9999), (1280, 720));
    }
}
