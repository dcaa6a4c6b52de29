//! Completion queues.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use slab::Slab;

use crate::error::Result;
use crate::ib::av::AddressVector;
use crate::ib::device::IbDevice;
use crate::ib::iobuf::IoBuffer;
use crate::ib::qp::{QueuePair, WqHandle, WqKind};
use crate::ib::type_alias::Cqn;
use crate::utils::rollback::transaction;

/// Handle of a completion queue owned by an [`IbDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CqHandle(pub(crate) usize);

/// Completion handlers of a completion queue.
///
/// Each handler receives ownership of the completed buffer together with the
/// completion status, and decides what happens to the buffer. The default
/// implementations release it.
pub trait CompletionOps {
    /// A send work request on `qp` completed.
    fn complete_send(&self, qp: &QueuePair, iobuf: IoBuffer, status: Result<()>) {
        let _ = (qp, iobuf, status);
    }

    /// A receive work request on `qp` completed. `av` describes the sender
    /// when the hardware reports it.
    fn complete_recv(
        &self,
        qp: &QueuePair,
        av: Option<&AddressVector>,
        iobuf: IoBuffer,
        status: Result<()>,
    ) {
        let _ = (qp, av, iobuf, status);
    }
}

/// Completion queue.
///
/// Holds the set of work queues registered against it, in registration
/// order. A completion queue can only be destroyed once that set is empty.
pub struct CompletionQueue {
    handle: CqHandle,
    num_cqes: usize,
    cqn: Cqn,
    ops: Option<Rc<dyn CompletionOps>>,
    pub(crate) work_queues: Vec<WqHandle>,
    drvdata: Option<Box<dyn Any>>,
}

impl fmt::Debug for CompletionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionQueue")
            .field("cqn", &self.cqn)
            .field("num_cqes", &self.num_cqes)
            .field("work_queues", &self.work_queues)
            .finish()
    }
}

impl CompletionQueue {
    fn new(handle: CqHandle, num_cqes: usize, ops: Option<Rc<dyn CompletionOps>>) -> Self {
        Self {
            handle,
            num_cqes,
            cqn: 0,
            ops,
            work_queues: Vec::new(),
            drvdata: None,
        }
    }

    /// Get the handle of this completion queue.
    #[inline]
    pub fn handle(&self) -> CqHandle {
        self.handle
    }

    /// Get the requested number of completion queue entries.
    #[inline]
    pub fn num_cqes(&self) -> usize {
        self.num_cqes
    }

    /// Get the completion queue number assigned by the hardware.
    #[inline]
    pub fn cqn(&self) -> Cqn {
        self.cqn
    }

    /// Set the completion queue number. Called by hardware drivers.
    #[inline]
    pub fn set_cqn(&mut self, cqn: Cqn) {
        self.cqn = cqn;
    }

    /// Get the completion handlers.
    #[inline]
    pub(crate) fn ops(&self) -> Option<Rc<dyn CompletionOps>> {
        self.ops.clone()
    }

    /// Get the work queues registered on this completion queue.
    #[inline]
    pub fn work_queues(&self) -> &[WqHandle] {
        &self.work_queues
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

    pub(crate) fn register(&mut self, wq: WqHandle) {
        self.work_queues.push(wq);
    }

    pub(crate) fn deregister(&mut self, wq: WqHandle) {
        self.work_queues.retain(|&registered| registered != wq);
    }
}

/// Look up a completion queue by handle, mutably.
#[inline]
pub(crate) fn cq_entry(cqs: &mut Slab<CompletionQueue>, cq: CqHandle) -> &mut CompletionQueue {
    match cqs.get_mut(cq.0) {
        Some(cq) => cq,
        None => panic!("stale completion queue handle {:?}", cq),
    }
}

impl IbDevice {
    /// Create a completion queue with `num_cqes` entries.
    ///
    /// If the hardware refuses, the half-built queue is unlinked again and the
    /// hardware's error is returned.
    pub fn create_cq(
        &mut self,
        num_cqes: usize,
        ops: Option<Rc<dyn CompletionOps>>,
    ) -> Result<CqHandle> {
        log::debug!("IBDEV {} creating completion queue", self.name());

        transaction(self, |dev, rollback| {
            let entry = dev.ctx.cqs.vacant_entry();
            let handle = CqHandle(entry.key());
            entry.insert(CompletionQueue::new(handle, num_cqes, ops));
            rollback.push(move |dev: &mut IbDevice| {
                dev.ctx.cqs.remove(handle.0);
            });

            let cq = &mut dev.ctx.cqs[handle.0];
            dev.ops.create_cq(cq).inspect_err(|e| {
                log::debug!(
                    "IBDEV {} could not initialise completion queue: {}",
                    dev.ctx.name,
                    e
                );
            })?;

            log::debug!(
                "IBDEV {} created {}-entry completion queue {:?} with CQN {:#x}",
                dev.ctx.name,
                num_cqes,
                handle,
                cq.cqn
            );
            Ok(handle)
        })
    }

    /// Destroy a completion queue.
    ///
    /// # Panics
    ///
    /// Panic if any work queue is still registered on the completion queue;
    /// destroy its queue pairs first.
    pub fn destroy_cq(&mut self, cq: CqHandle) {
        let entry = cq_entry(&mut self.ctx.cqs, cq);
        log::debug!(
            "IBDEV {} destroying completion queue {:#x}",
            self.ctx.name,
            entry.cqn
        );
        assert!(
            entry.work_queues.is_empty(),
            "destroying completion queue {:#x} with {} work queue(s) registered",
            entry.cqn,
            entry.work_queues.len()
        );

        self.ops.destroy_cq(entry);
        self.ctx.cqs.remove(cq.0);
    }

    /// Poll a completion queue.
    ///
    /// The hardware reports completions through the completion handlers;
    /// afterwards every receive work queue on this completion queue is
    /// refilled, since slots have just been freed.
    pub fn poll_cq(&mut self, cq: CqHandle) {
        if !self.ctx.cqs.contains(cq.0) {
            log::warn!("IBDEV {} polling unknown completion queue {:?}", self.ctx.name, cq);
            return;
        }
        self.ops.poll_cq(&mut self.ctx, cq);

        let Some(entry) = self.ctx.cqs.get(cq.0) else {
            return;
        };
        let recv_qps = entry
            .work_queues
            .iter()
            .filter(|wq| wq.kind == WqKind::Recv)
            .map(|wq| wq.qp)
            .collect::<Vec<_>>();
        for qp in recv_qps {
            self.refill_recv(qp);
        }
    }
}
