//! Queue pair and related types.

use std::any::Any;
use std::fmt;

use slab::Slab;

use crate::error::{IbError, PostError, Result};
use crate::ib::av::AddressVector;
use crate::ib::cq::{cq_entry, CqHandle};
use crate::ib::device::{DeviceContext, IbDevice};
use crate::ib::gid::Gid;
use crate::ib::iobuf::IoBuffer;
use crate::ib::type_alias::*;
use crate::utils::rollback::transaction;

pub use self::ty::*;
pub use self::wq::*;

mod ty;
mod wq;

/// Handle of a queue pair owned by an [`IbDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QpHandle(pub(crate) usize);

/// Queue pair.
///
/// Owns one slot array shared by its two work queues: send slots first,
/// receive slots after them.
///
/// A freshly created queue pair is not ready for traffic: callers set its
/// default address vector and queue key as needed and then call
/// [`IbDevice::modify_qp`] before posting.
pub struct QueuePair {
    handle: QpHandle,
    qp_type: QpType,
    qpn: Qpn,
    ext_qpn: Qpn,
    qkey: QKey,
    av: AddressVector,
    pub(crate) send: WorkQueue,
    pub(crate) recv: WorkQueue,
    slots: Box<[Option<IoBuffer>]>,
    pub(crate) mgids: Vec<Gid>,
    drvdata: Option<Box<dyn Any>>,
}

impl fmt::Debug for QueuePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuePair")
            .field("type", &self.qp_type)
            .field("qpn", &format_args!("{:#x}", self.qpn))
            .field("ext_qpn", &format_args!("{:#x}", self.ext_qpn))
            .field("send", &self.send)
            .field("recv", &self.recv)
            .field("mgids", &self.mgids)
            .finish()
    }
}

impl QueuePair {
    /// Get the handle of this queue pair.
    #[inline]
    pub fn handle(&self) -> QpHandle {
        self.handle
    }

    /// Get the queue pair type.
    #[inline]
    pub fn qp_type(&self) -> QpType {
        self.qp_type
    }

    /// Get the queue pair number assigned by the hardware.
    #[inline]
    pub fn qpn(&self) -> Qpn {
        self.qpn
    }

    /// Set the queue pair number. Called by hardware drivers on creation.
    #[inline]
    pub fn set_qpn(&mut self, qpn: Qpn) {
        self.qpn = qpn;
    }

    /// Get the externally visible queue pair number.
    #[inline]
    pub fn ext_qpn(&self) -> Qpn {
        self.ext_qpn
    }

    /// Get the default queue key.
    #[inline]
    pub fn qkey(&self) -> QKey {
        self.qkey
    }

    /// Set the default queue key. Takes effect on the next [`IbDevice::modify_qp`].
    #[inline]
    pub fn set_qkey(&mut self, qkey: QKey) {
        self.qkey = qkey;
    }

    /// Get the default address vector.
    #[inline]
    pub fn av(&self) -> &AddressVector {
        &self.av
    }

    /// Get the default address vector mutably.
    #[inline]
    pub fn av_mut(&mut self) -> &mut AddressVector {
        &mut self.av
    }

    /// Get the send work queue.
    #[inline]
    pub fn send(&self) -> &WorkQueue {
        &self.send
    }

    /// Get the receive work queue.
    #[inline]
    pub fn recv(&self) -> &WorkQueue {
        &self.recv
    }

    /// Get one of the work queues.
    #[inline]
    pub fn wq(&self, kind: WqKind) -> &WorkQueue {
        match kind {
            WqKind::Send => &self.send,
            WqKind::Recv => &self.recv,
        }
    }

    #[inline]
    pub(crate) fn wq_mut(&mut self, kind: WqKind) -> &mut WorkQueue {
        match kind {
            WqKind::Send => &mut self.send,
            WqKind::Recv => &mut self.recv,
        }
    }

    /// Place a buffer into the next ring slot of a work queue and return the
    /// slot index within that work queue. Called by hardware drivers when
    /// posting.
    ///
    /// # Panics
    ///
    /// Panic if the work queue has no slots or the slot is still occupied.
    pub fn claim(&mut self, kind: WqKind, iobuf: IoBuffer) -> usize {
        let wq = self.wq_mut(kind);
        let base = wq.range().start;
        let idx = wq.advance();
        let slot = &mut self.slots[base + idx];
        assert!(slot.is_none(), "{:?} work queue slot {} still occupied", kind, idx);
        *slot = Some(iobuf);
        idx
    }

    /// Take the buffer out of a work queue slot. Called by hardware drivers
    /// on completion.
    pub fn take(&mut self, kind: WqKind, idx: usize) -> Option<IoBuffer> {
        let range = self.wq(kind).range();
        if idx >= range.len() {
            return None;
        }
        self.slots[range.start + idx].take()
    }

    /// Peek at the buffer in a work queue slot.
    pub fn slot(&self, kind: WqKind, idx: usize) -> Option<&IoBuffer> {
        self.slots[self.wq(kind).range()].get(idx)?.as_ref()
    }

    /// Count the occupied slots of a work queue.
    pub fn occupied(&self, kind: WqKind) -> usize {
        self.slots[self.wq(kind).range()]
            .iter()
            .filter(|slot| slot.is_some())
            .count()
    }

    /// Empty every occupied slot of a work queue, in slot order.
    fn drain(&mut self, kind: WqKind) -> Vec<IoBuffer> {
        let range = self.wq(kind).range();
        self.slots[range].iter_mut().filter_map(Option::take).collect()
    }

    /// Get the multicast groups this queue pair is attached to.
    #[inline]
    pub fn mgids(&self) -> &[Gid] {
        &self.mgids
    }

    /// Attach driver-private data.
    #[inline]
    pub fn set_drvdata<T: Any>(&mut self, data: T) {
        self.drvdata = Some(Box::new(data));
    }

    /// Get driver-private data, if present and of type `T`.
    #[inline]
    pub fn drvdata<T: Any>(&self) -> Option<&T> {
        self.drvdata.as_ref()?.downcast_ref()
    }

    /// Get driver-private data mutably, if present and of type `T`.
    #[inline]
    pub fn drvdata_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.drvdata.as_mut()?.downcast_mut()
    }
}

/// Allocate the slot array of both work queues in one go.
fn alloc_slots(num_send_wqes: usize, num_recv_wqes: usize) -> Result<Box<[Option<IoBuffer>]>> {
    let len = num_send_wqes
        .checked_add(num_recv_wqes)
        .ok_or(IbError::NoMemory)?;
    let mut slots = Vec::new();
    slots.try_reserve_exact(len).map_err(|_| IbError::NoMemory)?;
    slots.resize_with(len, || None);
    Ok(slots.into_boxed_slice())
}

/// Look up a queue pair by handle, mutably.
#[inline]
pub(crate) fn qp_entry(qps: &mut Slab<QueuePair>, qp: QpHandle) -> &mut QueuePair {
    match qps.get_mut(qp.0) {
        Some(qp) => qp,
        None => panic!("stale queue pair handle {:?}", qp),
    }
}

impl IbDevice {
    /// Create a queue pair.
    ///
    /// The send work queue gets `num_send_wqes` slots and reports to
    /// `send_cq`; the receive work queue gets `num_recv_wqes` slots and
    /// reports to `recv_cq`. The two completion queues may be the same.
    ///
    /// The queue pair is left in its initial state; call
    /// [`IbDevice::modify_qp`] before using it.
    pub fn create_qp(
        &mut self,
        qp_type: QpType,
        num_send_wqes: usize,
        send_cq: CqHandle,
        num_recv_wqes: usize,
        recv_cq: CqHandle,
    ) -> Result<QpHandle> {
        log::debug!("IBDEV {} creating queue pair", self.name());
        if !self.ctx.cqs.contains(send_cq.0) || !self.ctx.cqs.contains(recv_cq.0) {
            return Err(IbError::NoSuchCompletionQueue);
        }

        transaction(self, |dev, rollback| {
            let slots = alloc_slots(num_send_wqes, num_recv_wqes)?;
            let entry = dev.ctx.qps.vacant_entry();
            let handle = QpHandle(entry.key());
            entry.insert(QueuePair {
                handle,
                qp_type,
                qpn: 0,
                ext_qpn: 0,
                qkey: 0,
                av: AddressVector::default(),
                send: WorkQueue::new(WqKind::Send, handle, send_cq, 0, num_send_wqes),
                recv: WorkQueue::new(WqKind::Recv, handle, recv_cq, num_send_wqes, num_recv_wqes),
                slots,
                mgids: Vec::new(),
                drvdata: None,
            });
            rollback.push(move |dev: &mut IbDevice| {
                dev.ctx.qps.remove(handle.0);
            });

            let send_wq = WqHandle {
                qp: handle,
                kind: WqKind::Send,
            };
            cq_entry(&mut dev.ctx.cqs, send_cq).register(send_wq);
            rollback.push(move |dev: &mut IbDevice| {
                cq_entry(&mut dev.ctx.cqs, send_cq).deregister(send_wq);
            });

            let recv_wq = WqHandle {
                qp: handle,
                kind: WqKind::Recv,
            };
            cq_entry(&mut dev.ctx.cqs, recv_cq).register(recv_wq);
            rollback.push(move |dev: &mut IbDevice| {
                cq_entry(&mut dev.ctx.cqs, recv_cq).deregister(recv_wq);
            });

            let qp = &mut dev.ctx.qps[handle.0];
            dev.ops.create_qp(qp).inspect_err(|e| {
                log::debug!(
                    "IBDEV {} could not initialise queue pair: {}",
                    dev.ctx.name,
                    e
                );
            })?;
            log::debug!(
                "IBDEV {} created queue pair {:?} with QPN {:#x}, {} send and {} receive entries",
                dev.ctx.name,
                handle,
                qp.qpn,
                num_send_wqes,
                num_recv_wqes
            );

            qp.ext_qpn = qp_type.ext_qpn(qp.qpn);
            if qp.ext_qpn != qp.qpn {
                log::debug!(
                    "IBDEV {} QPN {:#x} has external QPN {:#x}",
                    dev.ctx.name,
                    qp.qpn,
                    qp.ext_qpn
                );
            }
            Ok(handle)
        })
    }

    /// Apply the queue pair's current attributes to the hardware.
    ///
    /// Which transitions are admissible is decided by the hardware layer.
    pub fn modify_qp(&mut self, qp: QpHandle) -> Result<()> {
        let entry = self
            .ctx
            .qps
            .get_mut(qp.0)
            .ok_or(IbError::NoSuchQueuePair)?;
        log::debug!("IBDEV {} modifying QPN {:#x}", self.ctx.name, entry.qpn);

        self.ops.modify_qp(entry).inspect_err(|e| {
            log::debug!(
                "IBDEV {} could not modify QPN {:#x}: {}",
                self.ctx.name,
                entry.qpn,
                e
            );
        })
    }

    /// Destroy a queue pair.
    ///
    /// Every buffer still outstanding on either work queue is completed with
    /// [`IbError::Cancelled`] before this returns.
    ///
    /// # Panics
    ///
    /// Panic if the queue pair is still attached to a multicast group.
    pub fn destroy_qp(&mut self, qp: QpHandle) {
        let entry = qp_entry(&mut self.ctx.qps, qp);
        log::debug!("IBDEV {} destroying QPN {:#x}", self.ctx.name, entry.qpn);
        assert!(
            entry.mgids.is_empty(),
            "destroying QPN {:#x} with {} multicast group(s) attached",
            entry.qpn,
            entry.mgids.len()
        );

        self.ops.destroy_qp(entry);

        let sends = entry.drain(WqKind::Send);
        let recvs = entry.drain(WqKind::Recv);
        let (send_cq, recv_cq) = (entry.send.cq(), entry.recv.cq());
        let (send_wq, recv_wq) = (entry.send.handle(), entry.recv.handle());
        for iobuf in sends {
            self.ctx.complete_send(qp, iobuf, Err(IbError::Cancelled));
        }
        for iobuf in recvs {
            self.ctx.complete_recv(qp, None, iobuf, Err(IbError::Cancelled));
        }

        cq_entry(&mut self.ctx.cqs, send_cq).deregister(send_wq);
        cq_entry(&mut self.ctx.cqs, recv_cq).deregister(recv_wq);
        self.ctx.qps.remove(qp.0);
    }

    /// Post a send work request.
    ///
    /// Without `av` the queue pair's default address vector is used. Unset
    /// queue key and rate are filled in on a private copy; neither the
    /// caller's nor the default vector is modified.
    ///
    /// A full send queue is reported as [`IbError::NoBuffers`]. On any
    /// failure the buffer comes back inside the [`PostError`].
    pub fn post_send(
        &mut self,
        qp: QpHandle,
        av: Option<&AddressVector>,
        iobuf: IoBuffer,
    ) -> Result<(), PostError> {
        let Some(entry) = self.ctx.qps.get_mut(qp.0) else {
            return Err(PostError::new(IbError::NoSuchQueuePair, iobuf));
        };

        if entry.send.is_full() {
            log::debug!("IBDEV {} QPN {:#x} send queue full", self.ctx.name, entry.qpn);
            return Err(PostError::new(IbError::NoBuffers, iobuf));
        }

        let av = av
            .unwrap_or(&entry.av)
            .with_defaults(entry.qkey, self.ctx.config.default_rate);

        self.ops.post_send(entry, &av, iobuf).inspect_err(|e| {
            log::debug!(
                "IBDEV {} QPN {:#x} could not post send WQE: {}",
                self.ctx.name,
                entry.qpn,
                e
            );
        })?;
        entry.send.fill += 1;
        Ok(())
    }

    /// Post a receive work request.
    ///
    /// The buffer must have room for a maximum-size payload, otherwise
    /// [`IbError::BufferTooSmall`] is reported. A full receive queue is
    /// reported as [`IbError::NoBuffers`]. On any failure the buffer comes
    /// back inside the [`PostError`].
    pub fn post_recv(&mut self, qp: QpHandle, iobuf: IoBuffer) -> Result<(), PostError> {
        let Some(entry) = self.ctx.qps.get_mut(qp.0) else {
            return Err(PostError::new(IbError::NoSuchQueuePair, iobuf));
        };

        let required = self.ctx.config.max_payload_size;
        if iobuf.tailroom() < required {
            log::debug!(
                "IBDEV {} QPN {:#x} wrong RX buffer size ({})",
                self.ctx.name,
                entry.qpn,
                iobuf.tailroom()
            );
            let tailroom = iobuf.tailroom();
            return Err(PostError::new(
                IbError::BufferTooSmall { tailroom, required },
                iobuf,
            ));
        }

        if entry.recv.is_full() {
            log::debug!("IBDEV {} QPN {:#x} receive queue full", self.ctx.name, entry.qpn);
            return Err(PostError::new(IbError::NoBuffers, iobuf));
        }

        self.ops.post_recv(entry, iobuf).inspect_err(|e| {
            log::debug!(
                "IBDEV {} QPN {:#x} could not post receive WQE: {}",
                self.ctx.name,
                entry.qpn,
                e
            );
        })?;
        entry.recv.fill += 1;
        Ok(())
    }

    /// Top up the receive work queue with freshly allocated buffers.
    ///
    /// Best effort: an allocation failure or a refused post ends the refill
    /// quietly, and the next call tries again.
    pub fn refill_recv(&mut self, qp: QpHandle) {
        loop {
            let Some(entry) = self.ctx.qps.get(qp.0) else {
                return;
            };
            if entry.recv.is_full() {
                return;
            }

            let iobuf = match IoBuffer::alloc(self.ctx.config.max_payload_size) {
                Ok(iobuf) => iobuf,
                Err(e) => {
                    log::debug!("IBDEV {} could not allocate refill buffer: {}", self.ctx.name, e);
                    return;
                }
            };
            if let Err(err) = self.post_recv(qp, iobuf) {
                log::debug!("IBDEV {} could not refill: {}", self.ctx.name, err.error);
                return;
            }
        }
    }
}

impl DeviceContext {
    /// Report a send completion.
    ///
    /// The buffer goes to the send completion queue's handler, or is
    /// released if there is none. Called by hardware drivers from
    /// [`DeviceOps::poll_cq`](crate::ib::ops::DeviceOps::poll_cq).
    pub fn complete_send(&mut self, qp: QpHandle, iobuf: IoBuffer, status: Result<()>) {
        self.complete(qp, WqKind::Send, None, iobuf, status);
    }

    /// Report a receive completion, with the sender's address vector if the
    /// hardware knows it.
    ///
    /// The buffer goes to the receive completion queue's handler, or is
    /// released if there is none. Called by hardware drivers from
    /// [`DeviceOps::poll_cq`](crate::ib::ops::DeviceOps::poll_cq).
    pub fn complete_recv(
        &mut self,
        qp: QpHandle,
        av: Option<&AddressVector>,
        iobuf: IoBuffer,
        status: Result<()>,
    ) {
        self.complete(qp, WqKind::Recv, av, iobuf, status);
    }

    fn complete(
        &mut self,
        qp: QpHandle,
        kind: WqKind,
        av: Option<&AddressVector>,
        iobuf: IoBuffer,
        status: Result<()>,
    ) {
        let entry = qp_entry(&mut self.qps, qp);
        let ops = cq_entry(&mut self.cqs, entry.wq(kind).cq()).ops();
        match (ops, kind) {
            (Some(ops), WqKind::Send) => ops.complete_send(entry, iobuf, status),
            (Some(ops), WqKind::Recv) => ops.complete_recv(entry, av, iobuf, status),
            (None, _) => drop(iobuf),
        }

        let wq = entry.wq_mut(kind);
        assert!(wq.fill > 0, "completion on an empty work queue");
        wq.fill -= 1;
    }
}
