//! Status codes of the Infiniband core.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::ib::device::IbDevice;
use crate::ib::iobuf::IoBuffer;

/// Error type of every fallible Infiniband core operation.
///
/// Hardware drivers report failures through the same type, usually as
/// [`IbError::Device`], and the core hands them back to its caller unchanged.
#[derive(Debug, Error)]
pub enum IbError {
    /// The work queue has no free slot. Retry after the next completion drain.
    #[error("work queue full")]
    NoBuffers,

    /// An I/O buffer or a bookkeeping structure could not be allocated.
    #[error("out of memory")]
    NoMemory,

    /// A receive buffer cannot hold a maximum-size payload.
    #[error("receive buffer too small: {tailroom} bytes of tailroom, {required} required")]
    BufferTooSmall {
        /// Tailroom of the offered buffer.
        tailroom: usize,
        /// Minimum tailroom accepted by the queue pair.
        required: usize,
    },

    /// The hardware does not implement the requested optional operation.
    /// Expected on adapters with an embedded subnet management agent.
    #[error("operation not supported by device")]
    NotSupported,

    /// The work request was cancelled because its queue pair was destroyed.
    #[error("work request cancelled")]
    Cancelled,

    /// The queue pair handle does not refer to a live queue pair.
    #[error("no such queue pair")]
    NoSuchQueuePair,

    /// The completion queue handle does not refer to a live completion queue.
    #[error("no such completion queue")]
    NoSuchCompletionQueue,

    /// The hardware-specific layer reported an error.
    #[error("device error: {0}")]
    Device(#[from] io::Error),
}

impl IbError {
    /// Build a device error from a raw errno value.
    #[inline]
    pub fn from_errno(errno: i32) -> Self {
        IbError::Device(io::Error::from_raw_os_error(errno))
    }

    /// Get the errno value conventionally associated with this error.
    pub fn errno(&self) -> i32 {
        match self {
            IbError::NoBuffers => libc::ENOBUFS,
            IbError::NoMemory => libc::ENOMEM,
            IbError::BufferTooSmall { .. } => libc::EINVAL,
            IbError::NotSupported => libc::ENOTSUP,
            IbError::Cancelled => libc::ECANCELED,
            IbError::NoSuchQueuePair | IbError::NoSuchCompletionQueue => libc::ENOENT,
            IbError::Device(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }

    /// Determine whether the error is transient, i.e., the same request may
    /// succeed once completions have been drained.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, IbError::NoBuffers | IbError::NoMemory)
    }
}

/// Result type of the Infiniband core.
pub type Result<T, E = IbError> = std::result::Result<T, E>;

/// Error returned by post operations that did not take effect.
///
/// Ownership of the offered buffer goes back to the caller so that it can be
/// retried or released.
#[derive(Error)]
#[error("{error}")]
pub struct PostError {
    /// Reason the post was rejected.
    #[source]
    pub error: IbError,

    /// The buffer that was not posted.
    pub iobuf: IoBuffer,
}

impl PostError {
    /// Bundle an error with the rejected buffer.
    #[inline]
    pub fn new(error: IbError, iobuf: IoBuffer) -> Self {
        Self { error, iobuf }
    }

    /// Split into the error and the rejected buffer.
    #[inline]
    pub fn into_parts(self) -> (IbError, IoBuffer) {
        (self.error, self.iobuf)
    }
}

impl fmt::Debug for PostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostError")
            .field("error", &self.error)
            .field("iobuf", &self.iobuf)
            .finish()
    }
}

impl From<PostError> for IbError {
    /// Drop the rejected buffer and keep the status.
    #[inline]
    fn from(err: PostError) -> Self {
        err.error
    }
}

/// Error returned when the network binding refuses a newly registered device.
///
/// The device leaves the registry and goes back to the caller, still intact.
#[derive(Error)]
#[error("{error}")]
pub struct RegisterError {
    /// Reason the binding refused the device.
    #[source]
    pub error: IbError,

    /// The device that was not registered.
    pub dev: IbDevice,
}

impl RegisterError {
    /// Bundle an error with the refused device.
    #[inline]
    pub fn new(error: IbError, dev: IbDevice) -> Self {
        Self { error, dev }
    }

    /// Split into the error and the refused device.
    #[inline]
    pub fn into_parts(self) -> (IbError, IbDevice) {
        (self.error, self.dev)
    }
}

impl fmt::Debug for RegisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterError")
            .field("error", &self.error)
            .field("dev", &self.dev.name())
            .finish()
    }
}

impl From<RegisterError> for IbError {
    /// Drop the refused device and keep the status.
    #[inline]
    fn from(err: RegisterError) -> Self {
        err.error
    }
}
