//! Infiniband devices.

use std::any::Any;
use std::fmt;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use slab::Slab;

use crate::config::IbConfig;
use crate::error::{IbError, Result};
use crate::ib::cq::{CompletionQueue, CqHandle};
use crate::ib::gid::Gid;
use crate::ib::mi::{BasicManagement, ManagementLayer, MiHandle};
use crate::ib::ops::{DeviceOps, Mad};
use crate::ib::qp::{QpHandle, QpType, QueuePair, WqHandle, WqKind};
use crate::ib::type_alias::*;
use crate::utils::rollback::transaction;

/// State of one fabric port that hardware drivers may read and update.
///
/// Owns the port's completion queues and queue pairs. Drivers receive it in
/// [`DeviceOps::poll_cq`], [`DeviceOps::poll_eq`], [`DeviceOps::open`] and
/// [`DeviceOps::close`].
pub struct DeviceContext {
    pub(crate) name: String,
    phys: String,
    port: PortNum,
    gid: Gid,
    lid: Lid,
    sm_lid: Lid,
    pkey: PKey,
    link_up: bool,
    link_changed: bool,
    pub(crate) open_count: usize,
    pub(crate) config: IbConfig,
    pub(crate) cqs: Slab<CompletionQueue>,
    pub(crate) qps: Slab<QueuePair>,
    drvdata: Option<Box<dyn Any>>,
}

impl fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceContext")
            .field("name", &self.name)
            .field("gid", &self.gid)
            .field("lid", &format_args!("{:#x}", self.lid))
            .field("pkey", &format_args!("{:#x}", self.pkey))
            .field("open_count", &self.open_count)
            .field("cqs", &self.cqs.len())
            .field("qps", &self.qps.len())
            .finish()
    }
}

impl DeviceContext {
    fn new(phys: String, port: PortNum, config: IbConfig) -> Self {
        Self {
            name: format!("{}:{}", phys, port),
            phys,
            port,
            gid: Gid::default(),
            lid: LID_NONE,
            sm_lid: LID_NONE,
            pkey: PKEY_NONE,
            link_up: false,
            link_changed: false,
            open_count: 0,
            config,
            cqs: Slab::new(),
            qps: Slab::new(),
            drvdata: None,
        }
    }

    /// Get the name used in log messages: physical device and port.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the name of the physical device this port belongs to.
    #[inline]
    pub fn phys(&self) -> &str {
        &self.phys
    }

    /// Get the port number on the physical device.
    #[inline]
    pub fn port(&self) -> PortNum {
        self.port
    }

    /// Get the port GID.
    #[inline]
    pub fn gid(&self) -> Gid {
        self.gid
    }

    /// Set the port GID.
    #[inline]
    pub fn set_gid(&mut self, gid: Gid) {
        self.gid = gid;
    }

    /// Get the port LID, [`LID_NONE`] until assigned.
    #[inline]
    pub fn lid(&self) -> Lid {
        self.lid
    }

    /// Set the port LID.
    #[inline]
    pub fn set_lid(&mut self, lid: Lid) {
        self.lid = lid;
    }

    /// Get the LID of the subnet manager.
    #[inline]
    pub fn sm_lid(&self) -> Lid {
        self.sm_lid
    }

    /// Set the LID of the subnet manager.
    #[inline]
    pub fn set_sm_lid(&mut self, sm_lid: Lid) {
        self.sm_lid = sm_lid;
    }

    /// Get the partition key, [`PKEY_NONE`] until known.
    #[inline]
    pub fn pkey(&self) -> PKey {
        self.pkey
    }

    /// Set the partition key.
    #[inline]
    pub fn set_pkey(&mut self, pkey: PKey) {
        self.pkey = pkey;
    }

    /// Determine whether the link is up.
    #[inline]
    pub fn link_up(&self) -> bool {
        self.link_up
    }

    /// Record the link state. Drivers follow up with
    /// [`DeviceContext::link_state_changed`] when it differs from before.
    #[inline]
    pub fn set_link_up(&mut self, link_up: bool) {
        self.link_up = link_up;
    }

    /// Signal a link state change. The notification is forwarded to the
    /// network binding once the current event queue poll returns.
    #[inline]
    pub fn link_state_changed(&mut self) {
        self.link_changed = true;
    }

    /// Get the number of outstanding opens.
    #[inline]
    pub fn open_count(&self) -> usize {
        self.open_count
    }

    /// Determine whether the device is open.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.open_count > 0
    }

    /// Get the configuration of this device.
    #[inline]
    pub fn config(&self) -> &IbConfig {
        &self.config
    }

    /// Get a completion queue.
    #[inline]
    pub fn cq(&self, cq: CqHandle) -> Option<&CompletionQueue> {
        self.cqs.get(cq.0)
    }

    /// Get a completion queue mutably.
    #[inline]
    pub fn cq_mut(&mut self, cq: CqHandle) -> Option<&mut CompletionQueue> {
        self.cqs.get_mut(cq.0)
    }

    /// Iterate over the completion queues.
    pub fn cqs(&self) -> impl Iterator<Item = &CompletionQueue> + '_ {
        self.cqs.iter().map(|(_, cq)| cq)
    }

    /// Get a queue pair.
    #[inline]
    pub fn qp(&self, qp: QpHandle) -> Option<&QueuePair> {
        self.qps.get(qp.0)
    }

    /// Get a queue pair mutably.
    #[inline]
    pub fn qp_mut(&mut self, qp: QpHandle) -> Option<&mut QueuePair> {
        self.qps.get_mut(qp.0)
    }

    /// Iterate over the queue pairs.
    pub fn qps(&self) -> impl Iterator<Item = &QueuePair> + '_ {
        self.qps.iter().map(|(_, qp)| qp)
    }

    /// Find a queue pair by number. Either the hardware-assigned or the
    /// externally visible number matches.
    pub fn find_qp_by_number(&self, qpn: Qpn) -> Option<QpHandle> {
        self.qps()
            .find(|qp| qp.qpn() == qpn || qp.ext_qpn() == qpn)
            .map(QueuePair::handle)
    }

    /// Find a queue pair attached to the given multicast group.
    pub fn find_qp_by_multicast_gid(&self, gid: &Gid) -> Option<QpHandle> {
        self.qps()
            .find(|qp| qp.mgids().contains(gid))
            .map(QueuePair::handle)
    }

    /// Find the work queue registered on `cq` that belongs to the queue pair
    /// numbered `qpn` and goes in direction `kind`.
    pub fn find_wq(&self, cq: CqHandle, qpn: Qpn, kind: WqKind) -> Option<WqHandle> {
        self.cq(cq)?
            .work_queues()
            .iter()
            .copied()
            .find(|wq| wq.kind == kind && self.qp(wq.qp).is_some_and(|qp| qp.qpn() == qpn))
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

/// Infiniband device: one fabric port and everything created on it.
///
/// Hardware actions are delegated to the [`DeviceOps`] given at allocation.
/// The device dereferences to its [`DeviceContext`] for port attributes and
/// lookups.
pub struct IbDevice {
    pub(crate) ops: Box<dyn DeviceOps>,
    pub(crate) ctx: DeviceContext,
    mgmt: Rc<dyn ManagementLayer>,
    smi: Option<MiHandle>,
    gsi: Option<MiHandle>,
}

impl fmt::Debug for IbDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IbDevice").field(&self.ctx).finish()
    }
}

impl Deref for IbDevice {
    type Target = DeviceContext;

    fn deref(&self) -> &Self::Target {
        &self.ctx
    }
}

impl DerefMut for IbDevice {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.ctx
    }
}

impl IbDevice {
    /// Allocate a device for port `port` of physical device `phys`, driven by
    /// `ops`, with the default configuration and management layer.
    pub fn new(phys: impl Into<String>, port: PortNum, ops: Box<dyn DeviceOps>) -> Self {
        Self {
            ops,
            ctx: DeviceContext::new(phys.into(), port, IbConfig::default()),
            mgmt: Rc::new(BasicManagement),
            smi: None,
            gsi: None,
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: IbConfig) -> Self {
        self.ctx.config = config;
        self
    }

    /// Replace the management layer created on open.
    pub fn with_management(mut self, mgmt: Rc<dyn ManagementLayer>) -> Self {
        self.mgmt = mgmt;
        self
    }

    /// Get the subnet management interface, present while open.
    #[inline]
    pub fn smi(&self) -> Option<&(dyn Any + 'static)> {
        self.smi.as_deref()
    }

    /// Get the general services interface, present while open.
    #[inline]
    pub fn gsi(&self) -> Option<&(dyn Any + 'static)> {
        self.gsi.as_deref()
    }

    /// Open the port.
    ///
    /// Opens nest: only the first one creates the management interfaces and
    /// opens the hardware, later ones just count. If any step of the first
    /// open fails, the completed steps are undone in reverse order and the
    /// device is left closed.
    pub fn open(&mut self) -> Result<()> {
        self.ctx.open_count += 1;
        if self.ctx.open_count > 1 {
            return Ok(());
        }

        let mgmt = self.mgmt.clone();
        let ret = transaction(self, |dev, rollback| {
            let smi = mgmt.create_mi(dev, QpType::Smi).inspect_err(|e| {
                log::debug!("IBDEV {} could not create SMI: {}", dev.ctx.name, e);
            })?;
            dev.smi = Some(smi);
            let m = mgmt.clone();
            rollback.push(move |dev: &mut IbDevice| {
                if let Some(smi) = dev.smi.take() {
                    m.destroy_mi(dev, smi);
                }
            });

            mgmt.create_sma(dev).inspect_err(|e| {
                log::debug!("IBDEV {} could not create SMA: {}", dev.ctx.name, e);
            })?;
            let m = mgmt.clone();
            rollback.push(move |dev: &mut IbDevice| m.destroy_sma(dev));

            let gsi = mgmt.create_mi(dev, QpType::Gsi).inspect_err(|e| {
                log::debug!("IBDEV {} could not create GSI: {}", dev.ctx.name, e);
            })?;
            dev.gsi = Some(gsi);
            let m = mgmt.clone();
            rollback.push(move |dev: &mut IbDevice| {
                if let Some(gsi) = dev.gsi.take() {
                    m.destroy_mi(dev, gsi);
                }
            });

            dev.ops.open(&mut dev.ctx).inspect_err(|e| {
                log::debug!("IBDEV {} could not open: {}", dev.ctx.name, e);
            })
        });

        if ret.is_err() {
            self.ctx.open_count = 0;
        }
        ret
    }

    /// Close the port.
    ///
    /// Only the close matching the first open tears down, in reverse order of
    /// construction.
    ///
    /// # Panics
    ///
    /// Panic if the device is not open.
    pub fn close(&mut self) {
        assert!(self.ctx.open_count > 0, "closing IBDEV {} which is not open", self.ctx.name);
        self.ctx.open_count -= 1;
        if self.ctx.open_count > 0 {
            return;
        }

        let mgmt = self.mgmt.clone();
        if let Some(gsi) = self.gsi.take() {
            mgmt.destroy_mi(self, gsi);
        }
        mgmt.destroy_sma(self);
        if let Some(smi) = self.smi.take() {
            mgmt.destroy_mi(self, smi);
        }
        self.ops.close(&mut self.ctx);
    }

    /// Forward a Set(PortInfo) request to the hardware.
    ///
    /// Reports [`IbError::NotSupported`] on adapters with an embedded subnet
    /// management agent.
    pub fn set_port_info(&mut self, mad: &Mad) -> Result<()> {
        self.ops.set_port_info(&mut self.ctx, mad).inspect_err(|e| match e {
            IbError::NotSupported => log::debug!(
                "IBDEV {} does not support setting port information",
                self.ctx.name
            ),
            e => log::debug!(
                "IBDEV {} could not set port information: {}",
                self.ctx.name,
                e
            ),
        })
    }

    /// Forward a Set(P_KeyTable) request to the hardware.
    ///
    /// Reports [`IbError::NotSupported`] on adapters with an embedded subnet
    /// management agent.
    pub fn set_pkey_table(&mut self, mad: &Mad) -> Result<()> {
        self.ops.set_pkey_table(&mut self.ctx, mad).inspect_err(|e| match e {
            IbError::NotSupported => log::debug!(
                "IBDEV {} does not support setting partition key table",
                self.ctx.name
            ),
            e => log::debug!(
                "IBDEV {} could not set partition key table: {}",
                self.ctx.name,
                e
            ),
        })
    }

    /// Poll the hardware event queue. Return whether the link state changed.
    pub fn poll_events(&mut self) -> bool {
        self.ops.poll_eq(&mut self.ctx);
        mem::take(&mut self.ctx.link_changed)
    }

    /// Poll every completion queue of this device.
    pub fn poll_cqs(&mut self) {
        let cqs = self.ctx.cqs.iter().map(|(key, _)| CqHandle(key)).collect::<Vec<_>>();
        for cq in cqs {
            if self.ctx.cqs.contains(cq.0) {
                self.poll_cq(cq);
            }
        }
    }

    /// Poll the event queue, then every completion queue. Return whether the
    /// link state changed.
    pub fn poll_eq(&mut self) -> bool {
        let link_changed = self.poll_events();
        self.poll_cqs();
        link_changed
    }
}
