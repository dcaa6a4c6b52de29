//! Hardware-specific operations.

use std::fmt;

use super::av::AddressVector;
use super::cq::{CompletionQueue, CqHandle};
use super::device::DeviceContext;
use super::gid::Gid;
use super::iobuf::IoBuffer;
use super::qp::QueuePair;
use crate::error::{IbError, PostError, Result};

/// Size of a management datagram.
pub const MAD_SIZE: usize = 256;

/// An opaque management datagram.
///
/// The core only forwards these to the hardware; their layout belongs to the
/// management layer.
#[derive(Clone, PartialEq, Eq)]
pub struct Mad(pub [u8; MAD_SIZE]);

impl Mad {
    /// Create an all-zero datagram.
    pub fn zeroed() -> Self {
        Self([0; MAD_SIZE])
    }
}

impl fmt::Debug for Mad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Mad").field(&&self.0[..24]).finish()
    }
}

/// Operations implemented once per channel adapter family.
///
/// The core never touches hardware rings itself: every device-side action is
/// delegated here. Implementations own their device-private state and may
/// attach per-object state to queues via `set_drvdata`.
///
/// Posting contract: on success a driver places the buffer into a work queue
/// slot with [`QueuePair::claim`](super::qp::QueuePair::claim); on failure it
/// returns the buffer inside the [`PostError`]. Completion contract: from
/// [`DeviceOps::poll_cq`], the driver takes the buffer out of its slot with
/// [`QueuePair::take`](super::qp::QueuePair::take) and hands it to
/// [`DeviceContext::complete_send`] or [`DeviceContext::complete_recv`],
/// exactly once per slot.
pub trait DeviceOps {
    /// Create the device-side completion queue and assign its CQN.
    fn create_cq(&mut self, cq: &mut CompletionQueue) -> Result<()>;

    /// Destroy the device-side completion queue.
    fn destroy_cq(&mut self, cq: &mut CompletionQueue);

    /// Drain completions of the completion queue, reporting each of them
    /// through `ctx`.
    fn poll_cq(&mut self, ctx: &mut DeviceContext, cq: CqHandle);

    /// Create the device-side queue pair and assign its QPN.
    fn create_qp(&mut self, qp: &mut QueuePair) -> Result<()>;

    /// Apply the queue pair's current attributes (e.g., its default address
    /// vector and queue key) to the hardware.
    fn modify_qp(&mut self, qp: &mut QueuePair) -> Result<()>;

    /// Destroy the device-side queue pair. Outstanding buffers stay in their
    /// slots; the core cancels them afterwards.
    fn destroy_qp(&mut self, qp: &mut QueuePair);

    /// Post a send work request. `av` has every optional field filled in.
    fn post_send(
        &mut self,
        qp: &mut QueuePair,
        av: &AddressVector,
        iobuf: IoBuffer,
    ) -> Result<(), PostError>;

    /// Post a receive work request.
    fn post_recv(&mut self, qp: &mut QueuePair, iobuf: IoBuffer) -> Result<(), PostError>;

    /// Poll the device event queue. Port changes are reported through
    /// [`DeviceContext::link_state_changed`].
    fn poll_eq(&mut self, ctx: &mut DeviceContext);

    /// Bring the port up.
    fn open(&mut self, ctx: &mut DeviceContext) -> Result<()>;

    /// Take the port down.
    fn close(&mut self, ctx: &mut DeviceContext);

    /// Attach the queue pair to a multicast group on the adapter.
    fn mcast_attach(&mut self, qp: &QueuePair, gid: &Gid) -> Result<()>;

    /// Detach the queue pair from a multicast group on the adapter.
    fn mcast_detach(&mut self, qp: &QueuePair, gid: &Gid);

    /// Apply a Set(PortInfo) request.
    ///
    /// Adapters with an embedded subnet management agent need not implement
    /// this; the default reports [`IbError::NotSupported`].
    fn set_port_info(&mut self, _ctx: &mut DeviceContext, _mad: &Mad) -> Result<()> {
        Err(IbError::NotSupported)
    }

    /// Apply a Set(P_KeyTable) request.
    ///
    /// Adapters with an embedded subnet management agent need not implement
    /// this; the default reports [`IbError::NotSupported`].
    fn set_pkey_table(&mut self, _ctx: &mut DeviceContext, _mad: &Mad) -> Result<()> {
        Err(IbError::NotSupported)
    }
}
