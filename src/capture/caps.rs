//! Capability query

use std::mem;

use tracing::{info, warn};
use v4l::capability::Flags;

use super::ioctl::{xioctl, ControlDevice, Request};
use super::sys::{c_string, v4l2_capability, V4L2_CAP_DEVICE_CAPS};
use crate::error::{CaptureError, Result};

/// Decoded `VIDIOC_QUERYCAP` report
#[derive(Debug, Clone)]
pub struct Capabilities {
    pub driver: String,
    pub card: String,
    pub bus_info: String,
    /// Kernel version the driver was built for, as (major, minor, patch).
    pub version: (u8, u8, u8),
    /// Capabilities of the opened node.
    pub flags: Flags,
}

impl Capabilities {
    pub fn can_capture(&self) -> bool {
        self.flags.contains(Flags::VIDEO_CAPTURE)
    }

    pub fn can_stream(&self) -> bool {
        self.flags.contains(Flags::STREAMING)
    }
}

impl From<&v4l2_capability> for Capabilities {
    fn from(raw: &v4l2_capability) -> Self {
        // `capabilities` covers the whole physical device; prefer the
        // per-node set when the driver provides it.
        let bits = if raw.capabilities & V4L2_CAP_DEVICE_CAPS != 0 {
            raw.device_caps
        } else {
            raw.capabilities
        };

        Self {
            driver: c_string(&raw.driver),
            card: c_string(&raw.card),
            bus_info: c_string(&raw.bus_info),
            version: (
                (raw.version >> 16) as u8,
                (raw.version >> 8) as u8,
                raw.version as u8,
            ),
            flags: Flags::from_bits_truncate(bits),
        }
    }
}

/// Query the device and require video capture support.
pub fn query_capabilities<D: ControlDevice + ?Sized>(device: &D) -> Result<Capabilities> {
    // SAFETY: `v4l2_capability` is plain integers and byte arrays.
    let mut raw: v4l2_capability = unsafe { mem::zeroed() };
    xioctl(device, &mut Request::QueryCapabilities(&mut raw))
        .map_err(CaptureError::CapabilityQuery)?;

    let caps = Capabilities::from(&raw);
    info!("Device: {} ({})", caps.card, caps.driver);

    if !caps.can_capture() {
        return Err(CaptureError::NotACaptureDevice { card: caps.card });
    }
    if !caps.can_stream() {
        warn!("{} doesn't advertise streaming I/O", caps.card);
    }

    Ok(caps)
}
