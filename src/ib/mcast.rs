//! Multicast group membership of queue pairs.

use crate::error::{IbError, Result};
use crate::ib::device::IbDevice;
use crate::ib::gid::Gid;
use crate::ib::qp::{qp_entry, QpHandle};
use crate::utils::rollback::transaction;

impl IbDevice {
    /// Attach a queue pair to a multicast group on the adapter.
    ///
    /// This only affects local adapter state; joining the group at the subnet
    /// level is up to the management layer.
    pub fn mcast_attach(&mut self, qp: QpHandle, gid: &Gid) -> Result<()> {
        if !self.ctx.qps.contains(qp.0) {
            return Err(IbError::NoSuchQueuePair);
        }
        log::debug!("IBDEV {} attaching to multicast group {}", self.ctx.name, gid);

        transaction(self, |dev, rollback| {
            let entry = qp_entry(&mut dev.ctx.qps, qp);
            entry.mgids.push(*gid);
            rollback.push(move |dev: &mut IbDevice| {
                qp_entry(&mut dev.ctx.qps, qp).mgids.pop();
            });

            dev.ops.mcast_attach(entry, gid).inspect_err(|e| {
                log::debug!(
                    "IBDEV {} could not attach QPN {:#x} to {}: {}",
                    dev.ctx.name,
                    entry.qpn(),
                    gid,
                    e
                );
            })
        })
    }

    /// Detach a queue pair from a multicast group.
    ///
    /// The adapter is always told to detach; the membership record, if any,
    /// is dropped afterwards.
    ///
    /// # Panics
    ///
    /// Panic if the queue pair handle is stale.
    pub fn mcast_detach(&mut self, qp: QpHandle, gid: &Gid) {
        let entry = qp_entry(&mut self.ctx.qps, qp);
        log::debug!(
            "IBDEV {} detaching QPN {:#x} from multicast group {}",
            self.ctx.name,
            entry.qpn(),
            gid
        );

        self.ops.mcast_detach(entry, gid);
        if let Some(pos) = entry.mgids.iter().position(|mgid| mgid == gid) {
            entry.mgids.remove(pos);
        }
    }
}
