//! Request functions for the V4L2 calls issued during session setup.
//!
//! Argument layouts and request codes come from the `videodev2.h` bindings
//! re-exported by `v4l`. The structs are plain C data, so callers build them
//! with `..unsafe { mem::zeroed() }` and set the fields a request reads.

pub use v4l::v4l_sys::{
    v4l2_buffer, v4l2_capability, v4l2_format, v4l2_pix_format, v4l2_requestbuffers,
    V4L2_CAP_DEVICE_CAPS,
};
use v4l::v4l2::vidioc;

nix::ioctl_read_bad!(vidioc_querycap, vidioc::VIDIOC_QUERYCAP, v4l2_capability);
nix::ioctl_readwrite_bad!(vidioc_s_fmt, vidioc::VIDIOC_S_FMT, v4l2_format);
nix::ioctl_readwrite_bad!(vidioc_reqbufs, vidioc::VIDIOC_REQBUFS, v4l2_requestbuffers);
nix::ioctl_readwrite_bad!(vidioc_querybuf, vidioc::VIDIOC_QUERYBUF, v4l2_buffer);
nix::ioctl_readwrite_bad!(vidioc_qbuf, vidioc::VIDIOC_QBUF, v4l2_buffer);
nix::ioctl_write_ptr_bad!(vidioc_streamon, vidioc::VIDIOC_STREAMON, libc::c_int);

/// Decode a fixed-size, NUL-padded kernel string.
pub fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
