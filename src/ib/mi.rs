//! Management interfaces created when a device opens.
//!
//! The management datagram protocol itself lives outside this crate. The core
//! only decides *when* the subnet management interface (SMI), the subnet
//! management agent (SMA) and the general services interface (GSI) come and
//! go; a [`ManagementLayer`] decides *what* they are.

use std::any::Any;
use std::rc::Rc;

use crate::error::Result;
use crate::ib::av::AddressVector;
use crate::ib::cq::{CompletionOps, CqHandle};
use crate::ib::device::IbDevice;
use crate::ib::iobuf::IoBuffer;
use crate::ib::qp::{QpHandle, QpType, QueuePair};
use crate::utils::rollback::transaction;

/// Type-erased management interface owned by an open device.
pub type MiHandle = Box<dyn Any>;

/// Constructor and destructor hooks of the management layer.
///
/// Called by [`IbDevice::open`] in the order SMI, SMA, GSI and by
/// [`IbDevice::close`] in the reverse order.
pub trait ManagementLayer {
    /// Create a management interface of type [`QpType::Smi`] or [`QpType::Gsi`].
    fn create_mi(&self, dev: &mut IbDevice, qp_type: QpType) -> Result<MiHandle>;

    /// Destroy a management interface created by [`ManagementLayer::create_mi`].
    fn destroy_mi(&self, dev: &mut IbDevice, mi: MiHandle);

    /// Create the subnet management agent on top of the SMI.
    fn create_sma(&self, dev: &mut IbDevice) -> Result<()>;

    /// Destroy the subnet management agent.
    fn destroy_sma(&self, dev: &mut IbDevice);
}

/// A management interface: one completion queue and one queue pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagementInterface {
    qp_type: QpType,
    cq: CqHandle,
    qp: QpHandle,
}

impl ManagementInterface {
    /// Get the type of the interface's queue pair.
    #[inline]
    pub fn qp_type(&self) -> QpType {
        self.qp_type
    }

    /// Get the interface's completion queue.
    #[inline]
    pub fn cq(&self) -> CqHandle {
        self.cq
    }

    /// Get the interface's queue pair.
    #[inline]
    pub fn qp(&self) -> QpHandle {
        self.qp
    }
}

/// Releases every management datagram it is handed.
struct DiscardMads;

impl CompletionOps for DiscardMads {
    fn complete_send(&self, qp: &QueuePair, _iobuf: IoBuffer, status: Result<()>) {
        if let Err(e) = status {
            log::trace!("MI QPN {:#x} send completed with error: {}", qp.qpn(), e);
        }
    }

    fn complete_recv(
        &self,
        qp: &QueuePair,
        _av: Option<&AddressVector>,
        iobuf: IoBuffer,
        status: Result<()>,
    ) {
        match status {
            Ok(()) => log::trace!("MI QPN {:#x} dropping {}-byte MAD", qp.qpn(), iobuf.len()),
            Err(e) => log::trace!("MI QPN {:#x} receive completed with error: {}", qp.qpn(), e),
        }
    }
}

/// Management layer that brings up bare SMI and GSI queue pairs and ignores
/// whatever arrives on them. Its subnet management agent does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicManagement;

impl ManagementLayer for BasicManagement {
    fn create_mi(&self, dev: &mut IbDevice, qp_type: QpType) -> Result<MiHandle> {
        let sizing = dev.config().mi;
        let ops: Rc<dyn CompletionOps> = Rc::new(DiscardMads);

        let mi = transaction(dev, |dev, rollback| -> Result<ManagementInterface> {
            let cq = dev.create_cq(sizing.num_cqes, Some(ops))?;
            rollback.push(move |dev: &mut IbDevice| dev.destroy_cq(cq));

            let qp = dev.create_qp(
                qp_type,
                sizing.num_send_wqes,
                cq,
                sizing.num_recv_wqes,
                cq,
            )?;
            rollback.push(move |dev: &mut IbDevice| dev.destroy_qp(qp));

            if let Some(entry) = dev.qp_mut(qp) {
                entry.set_qkey(qp_type.default_qkey());
            }
            dev.modify_qp(qp)?;
            dev.refill_recv(qp);

            Ok(ManagementInterface { qp_type, cq, qp })
        })
        .inspect_err(|e| {
            log::debug!("IBDEV {} could not create {:?} MI: {}", dev.name(), qp_type, e);
        })?;

        log::debug!(
            "IBDEV {} created {:?} MI on QP {:?}",
            dev.name(),
            qp_type,
            mi.qp
        );
        Ok(Box::new(mi))
    }

    fn destroy_mi(&self, dev: &mut IbDevice, mi: MiHandle) {
        let Ok(mi) = mi.downcast::<ManagementInterface>() else {
            log::warn!("IBDEV {} asked to destroy a foreign MI", dev.name());
            return;
        };
        dev.destroy_qp(mi.qp);
        dev.destroy_cq(mi.cq);
    }

    fn create_sma(&self, _dev: &mut IbDevice) -> Result<()> {
        Ok(())
    }

    fn destroy_sma(&self, _dev: &mut IbDevice) {}
}
