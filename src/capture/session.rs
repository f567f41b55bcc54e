//! Capture session: the ordered setup of one device

use std::path::Path;

use tracing::{info, instrument};

use super::buffer::{self, BufferDescriptor, BufferPool, MappedBuffer};
use super::caps::{self, Capabilities};
use super::device::DeviceHandle;
use super::format::{self, FormatSpec, NegotiatedFormat};
use super::ioctl::ControlDevice;
use super::stream::{self, Queued};
use crate::error::{CaptureError, Result, Stage};
use crate::CaptureConfig;

/// Setup progress of a [`CaptureSession`].
///
/// A session moves forward one state per successful call and never skips a
/// state. Before [`CaptureSession::open`] succeeds, and after the session is
/// dropped, the device is closed; a live session is always at least
/// `Opened`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    Opened,
    CapabilityConfirmed,
    FormatNegotiated,
    PoolAllocated,
    BufferDescribed,
    BufferMapped,
    BufferEnqueued,
    Streaming,
}

/// One device, negotiated and (eventually) streaming into mapped buffers.
///
/// Failures leave the session in its last successful state; there is no
/// rollback, and a failed session should be dropped. Dropping unmaps every
/// buffer and then closes the device, which also stops the stream.
pub struct CaptureSession<D: ControlDevice = DeviceHandle> {
    // Field order is drop order: unmap before closing the descriptor.
    buffers: Vec<MappedBuffer>,
    descriptors: Vec<BufferDescriptor>,
    device: D,
    state: SessionState,
    capabilities: Option<Capabilities>,
    format: Option<NegotiatedFormat>,
    pool: Option<BufferPool>,
    queued: Vec<Queued>,
}

impl CaptureSession<DeviceHandle> {
    /// Open the device node at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        DeviceHandle::open(path).map(Self::with_device)
    }

    /// Open the configured device and take it all the way to streaming.
    pub fn start(config: &CaptureConfig) -> Result<Self> {
        info!("Initializing V4L2 capture: {}", config.device);

        let mut session = Self::open(&config.device)?;
        session.activate(&config.format_spec(), config.buffer_count)?;
        Ok(session)
    }
}

impl<D: ControlDevice> CaptureSession<D> {
    /// Wrap a device that is already open.
    pub fn with_device(device: D) -> Self {
        Self {
            buffers: Vec::new(),
            descriptors: Vec::new(),
            device,
            state: SessionState::Opened,
            capabilities: None,
            format: None,
            pool: None,
            queued: Vec::new(),
        }
    }

    /// Run every remaining stage: confirm capture support, negotiate
    /// `requested`, allocate `buffer_count` buffers, describe and map all of
    /// them, queue the first one and start streaming.
    pub fn activate(&mut self, requested: &FormatSpec, buffer_count: u32) -> Result<()> {
        self.confirm_capabilities()?;
        self.negotiate_format(requested)?;
        self.allocate_pool(buffer_count)?;
        self.describe_buffers()?;
        self.map_buffers()?;
        self.enqueue(0)?;
        self.start_streaming()
    }

    #[instrument(skip(self))]
    pub fn confirm_capabilities(&mut self) -> Result<&Capabilities> {
        self.expect(SessionState::Opened, Stage::Capabilities)?;

        let caps = caps::query_capabilities(&self.device)?;
        self.state = SessionState::CapabilityConfirmed;
        Ok(self.capabilities.insert(caps))
    }

    /// Negotiate `requested`. The returned format, not the request, is what
    /// the rest of the session uses.
    #[instrument(skip(self, requested), fields(requested = %requested))]
    pub fn negotiate_format(&mut self, requested: &FormatSpec) -> Result<&NegotiatedFormat> {
        self.expect(SessionState::CapabilityConfirmed, Stage::Format)?;

        let negotiated = format::negotiate_format(&self.device, requested)?;
        self.state = SessionState::FormatNegotiated;
        Ok(self.format.insert(negotiated))
    }

    #[instrument(skip(self))]
    pub fn allocate_pool(&mut self, count: u32) -> Result<BufferPool> {
        self.expect(SessionState::FormatNegotiated, Stage::BufferPool)?;

        let pool = buffer::request_buffer_pool(&self.device, count)?;
        self.state = SessionState::PoolAllocated;
        self.pool = Some(pool);
        Ok(pool)
    }

    /// Query the placement of every buffer in the pool.
    #[instrument(skip(self))]
    pub fn describe_buffers(&mut self) -> Result<&[BufferDescriptor]> {
        let pool = match (self.state, self.pool) {
            (SessionState::PoolAllocated, Some(pool)) => pool,
            _ => return Err(self.out_of_order(SessionState::PoolAllocated, Stage::BufferQuery)),
        };

        let descriptors = (0..pool.count())
            .map(|index| buffer::query_buffer(&self.device, &pool, index))
            .collect::<Result<Vec<_>>>()?;

        self.descriptors = descriptors;
        self.state = SessionState::BufferDescribed;
        Ok(&self.descriptors)
    }

    /// Map every described buffer.
    #[instrument(skip(self))]
    pub fn map_buffers(&mut self) -> Result<&[MappedBuffer]> {
        self.expect(SessionState::BufferDescribed, Stage::Mapping)?;

        let buffers = self
            .descriptors
            .iter()
            .map(|descriptor| buffer::map_buffer(&self.device, descriptor))
            .collect::<Result<Vec<_>>>()?;

        self.buffers = buffers;
        self.state = SessionState::BufferMapped;
        Ok(&self.buffers)
    }

    /// Queue mapped buffer `index` for capture.
    #[instrument(skip(self))]
    pub fn enqueue(&mut self, index: u32) -> Result<()> {
        self.expect(SessionState::BufferMapped, Stage::Enqueue)?;

        let mapped = self
            .buffers
            .iter()
            .find(|buffer| buffer.index() == index)
            .ok_or(CaptureError::EnqueueFailed {
                index,
                source: nix::errno::Errno::EINVAL,
            })?;

        let queued = stream::enqueue(&self.device, mapped)?;
        self.queued.push(queued);
        self.state = SessionState::BufferEnqueued;
        Ok(())
    }

    /// Turn the stream on. Refused, without asking the driver, until a
    /// buffer has been queued.
    #[instrument(skip(self))]
    pub fn start_streaming(&mut self) -> Result<()> {
        let queued = match (self.state, self.queued.first()) {
            (SessionState::BufferEnqueued, Some(queued)) => queued,
            _ => return Err(self.out_of_order(SessionState::BufferEnqueued, Stage::StreamStart)),
        };

        stream::start_streaming(&self.device, queued)?;
        self.state = SessionState::Streaming;
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn capabilities(&self) -> Option<&Capabilities> {
        self.capabilities.as_ref()
    }

    /// The driver's negotiated format, once negotiation has succeeded.
    pub fn format(&self) -> Option<&NegotiatedFormat> {
        self.format.as_ref()
    }

    pub fn pool(&self) -> Option<BufferPool> {
        self.pool
    }

    pub fn descriptors(&self) -> &[BufferDescriptor] {
        &self.descriptors
    }

    /// Mapped buffers. Slices borrowed from them cannot outlive the session.
    pub fn buffers(&self) -> &[MappedBuffer] {
        &self.buffers
    }

    pub fn buffer(&self, index: u32) -> Option<&MappedBuffer> {
        self.buffers.iter().find(|buffer| buffer.index() == index)
    }

    /// Buffers handed to the driver, in queue order.
    pub fn queued(&self) -> &[Queued] {
        &self.queued
    }

    fn expect(&self, expected: SessionState, stage: Stage) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.out_of_order(expected, stage))
        }
    }

    fn out_of_order(&self, expected: SessionState, stage: Stage) -> CaptureError {
        CaptureError::OutOfOrder {
            stage,
            expected,
            actual: self.state,
        }
    }
}
