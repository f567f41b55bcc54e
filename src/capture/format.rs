//! Pixel format negotiation

use std::{fmt, mem};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use v4l::buffer::Type;
use v4l::FourCC;

use super::ioctl::{xioctl, ControlDevice, Request};
use super::sys::{v4l2_format, v4l2_pix_format};
use crate::error::{CaptureError, Result};

/// Pixel formats we know by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Yuyv,
    Mjpeg,
    Nv12,
    /// Any other four-character code the driver picked.
    Other([u8; 4]),
}

impl PixelFormat {
    pub fn fourcc(self) -> FourCC {
        let code = match self {
            Self::Rgb24 => b"RGB3",
            Self::Bgr24 => b"BGR3",
            Self::Yuyv => b"YUYV",
            Self::Mjpeg => b"MJPG",
            Self::Nv12 => b"NV12",
            Self::Other(ref code) => code,
        };
        FourCC::new(code)
    }

    pub fn from_fourcc(fourcc: FourCC) -> Self {
        match &fourcc.repr {
            b"RGB3" => Self::Rgb24,
            b"BGR3" => Self::Bgr24,
            b"YUYV" => Self::Yuyv,
            b"MJPG" => Self::Mjpeg,
            b"NV12" => Self::Nv12,
            code => Self::Other(*code),
        }
    }

    /// Little-endian packed code, as stored in `v4l2_pix_format::pixelformat`.
    pub fn to_raw(self) -> u32 {
        u32::from_le_bytes(self.fourcc().repr)
    }

    pub fn from_raw(raw: u32) -> Self {
        Self::from_fourcc(FourCC::new(&raw.to_le_bytes()))
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.fourcc().repr))
    }
}

/// Interlacing of captured frames (`enum v4l2_field`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum FieldOrder {
    /// Let the driver choose.
    Any = 0,
    Progressive = 1,
    Top = 2,
    Bottom = 3,
    Interlaced = 4,
    SeqTopBottom = 5,
    SeqBottomTop = 6,
    Alternate = 7,
    InterlacedTopBottom = 8,
    InterlacedBottomTop = 9,
}

impl FieldOrder {
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::Any,
            1 => Self::Progressive,
            2 => Self::Top,
            3 => Self::Bottom,
            4 => Self::Interlaced,
            5 => Self::SeqTopBottom,
            6 => Self::SeqBottomTop,
            7 => Self::Alternate,
            8 => Self::InterlacedTopBottom,
            9 => Self::InterlacedBottomTop,
            _ => return None,
        })
    }
}

/// A capture format, either as requested or as accepted by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatSpec {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub field_order: FieldOrder,
}

impl FormatSpec {
    pub const fn new(width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        Self {
            width,
            height,
            pixel_format,
            field_order: FieldOrder::Progressive,
        }
    }

    fn to_pix(self) -> v4l2_pix_format {
        v4l2_pix_format {
            width: self.width,
            height: self.height,
            pixelformat: self.pixel_format.to_raw(),
            field: self.field_order as u32,
            // SAFETY: `v4l2_pix_format` is plain integers.
            ..unsafe { mem::zeroed() }
        }
    }
}

impl fmt::Display for FormatSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} {} {:?}",
            self.width, self.height, self.pixel_format, self.field_order
        )
    }
}

/// The driver's answer to a format request.
///
/// `spec` is authoritative for every later stage; the requested values are
/// not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedFormat {
    pub spec: FormatSpec,
    pub bytes_per_line: u32,
    pub size_image: u32,
}

impl From<v4l2_pix_format> for NegotiatedFormat {
    fn from(pix: v4l2_pix_format) -> Self {
        Self {
            spec: FormatSpec {
                width: pix.width,
                height: pix.height,
                pixel_format: PixelFormat::from_raw(pix.pixelformat),
                // Drivers must never return V4L2_FIELD_ANY; treat junk the same.
                field_order: FieldOrder::from_raw(pix.field).unwrap_or(FieldOrder::Any),
            },
            bytes_per_line: pix.bytesperline,
            size_image: pix.sizeimage,
        }
    }
}

/// Ask the driver for `requested` and return what it actually set.
pub fn negotiate_format<D: ControlDevice + ?Sized>(
    device: &D,
    requested: &FormatSpec,
) -> Result<NegotiatedFormat> {
    // SAFETY: zero is a valid value for every member of the format union.
    let mut fmt: v4l2_format = unsafe { mem::zeroed() };
    fmt.type_ = Type::VideoCapture as u32;
    fmt.fmt.pix = requested.to_pix();

    xioctl(device, &mut Request::SetFormat(&mut fmt)).map_err(|source| {
        CaptureError::FormatRejected {
            requested: *requested,
            source,
        }
    })?;

    // SAFETY: for single-planar capture the driver answers in `fmt.pix`.
    let negotiated = NegotiatedFormat::from(unsafe { fmt.fmt.pix });

    if negotiated.spec == *requested {
        debug!("Format accepted as requested: {}", negotiated.spec);
    } else {
        info!(
            "Driver adjusted format: requested {}, got {}",
            requested, negotiated.spec
        );
    }

    Ok(negotiated)
}
