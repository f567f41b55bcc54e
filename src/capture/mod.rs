pub mod buffer;
pub mod caps;
pub mod device;
pub mod format;
pub mod ioctl;
pub mod session;
pub mod stream;
pub mod sys;

#[cfg(test)]
pub(crate) mod mock;

pub use buffer::{BufferDescriptor, BufferPool, MappedBuffer};
pub use caps::Capabilities;
pub use device::DeviceHandle;
pub use format::{FieldOrder, FormatSpec, NegotiatedFormat, PixelFormat};
pub use ioctl::{xioctl, ControlDevice, Request};
pub use session::{CaptureSession, SessionState};
pub use stream::Queued;
