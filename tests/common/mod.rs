//! Recording mock hardware shared by the integration tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::rc::Rc;

use ibcore::type_alias::*;
use ibcore::*;

/// Everything the mock hardware has seen, plus knobs to make it misbehave.
#[derive(Default)]
pub struct HwState {
    /// Names of the hardware operations called, in order.
    pub calls: Vec<&'static str>,

    /// Operations to fail: `None` fails every call, `Some(n)` only the n-th.
    pub fail: HashMap<&'static str, Option<usize>>,

    /// Outstanding sends as (CQ, QPN, slot).
    pub sends: Vec<(CqHandle, Qpn, usize)>,

    /// Outstanding receives as (CQ, QPN, slot).
    pub recvs: Vec<(CqHandle, Qpn, usize)>,

    /// Address vector of the last accepted send.
    pub last_av: Option<AddressVector>,

    /// Multicast groups attached on the adapter.
    pub mcast: Vec<(Qpn, Gid)>,

    /// Link state to report on the next event queue poll.
    pub link_change: Option<bool>,

    /// Whether Set(PortInfo) and Set(P_KeyTable) are handled.
    pub has_sma: bool,

    next_qpn: Qpn,
    next_cqn: Cqn,
}

impl HwState {
    /// Count the calls of one operation.
    pub fn count(&self, op: &str) -> usize {
        self.calls.iter().filter(|&&call| call == op).count()
    }

    /// Make every call of `op` fail.
    pub fn fail_always(&mut self, op: &'static str) {
        self.fail.insert(op, None);
    }

    /// Make the `n`-th call of `op` (counting from 0) fail.
    pub fn fail_nth(&mut self, op: &'static str, n: usize) {
        self.fail.insert(op, Some(n));
    }
}

pub type Hw = Rc<RefCell<HwState>>;

pub struct MockOps {
    hw: Hw,
}

impl MockOps {
    fn check(&self, op: &'static str) -> Result<()> {
        let mut hw = self.hw.borrow_mut();
        let nth = hw.count(op);
        hw.calls.push(op);
        match hw.fail.get(op) {
            Some(None) => Err(injected(op)),
            Some(Some(n)) if *n == nth => Err(injected(op)),
            _ => Ok(()),
        }
    }

    fn record(&self, op: &'static str) {
        self.hw.borrow_mut().calls.push(op);
    }
}

fn injected(op: &str) -> IbError {
    IbError::Device(io::Error::new(io::ErrorKind::Other, format!("{} failed", op)))
}

impl DeviceOps for MockOps {
    fn create_cq(&mut self, cq: &mut CompletionQueue) -> Result<()> {
        self.check("create_cq")?;
        let mut hw = self.hw.borrow_mut();
        hw.next_cqn += 1;
        cq.set_cqn(hw.next_cqn);
        Ok(())
    }

    fn destroy_cq(&mut self, _cq: &mut CompletionQueue) {
        self.record("destroy_cq");
    }

    fn poll_cq(&mut self, ctx: &mut DeviceContext, cq: CqHandle) {
        let (sends, recvs) = {
            let mut hw = self.hw.borrow_mut();
            let (sends, rest) = hw.sends.drain(..).partition::<Vec<_>, _>(|e| e.0 == cq);
            hw.sends = rest;
            let (recvs, rest) = hw.recvs.drain(..).partition::<Vec<_>, _>(|e| e.0 == cq);
            hw.recvs = rest;
            (sends, recvs)
        };

        for (_, qpn, idx) in sends {
            let wq = ctx.find_wq(cq, qpn, WqKind::Send).unwrap();
            let iobuf = ctx.qp_mut(wq.qp).unwrap().take(WqKind::Send, idx).unwrap();
            ctx.complete_send(wq.qp, iobuf, Ok(()));
        }
        for (_, qpn, idx) in recvs {
            let wq = ctx.find_wq(cq, qpn, WqKind::Recv).unwrap();
            let mut iobuf = ctx.qp_mut(wq.qp).unwrap().take(WqKind::Recv, idx).unwrap();
            iobuf.put(64);
            let av = AddressVector::new(0x99, 0x7);
            ctx.complete_recv(wq.qp, Some(&av), iobuf, Ok(()));
        }
    }

    fn create_qp(&mut self, qp: &mut QueuePair) -> Result<()> {
        self.check("create_qp")?;
        let mut hw = self.hw.borrow_mut();
        hw.next_qpn += 1;
        qp.set_qpn(0x40 + hw.next_qpn);
        Ok(())
    }

    fn modify_qp(&mut self, _qp: &mut QueuePair) -> Result<()> {
        self.check("modify_qp")
    }

    fn destroy_qp(&mut self, qp: &mut QueuePair) {
        self.record("destroy_qp");
        let qpn = qp.qpn();
        let mut hw = self.hw.borrow_mut();
        hw.sends.retain(|e| e.1 != qpn);
        hw.recvs.retain(|e| e.1 != qpn);
    }

    fn post_send(
        &mut self,
        qp: &mut QueuePair,
        av: &AddressVector,
        iobuf: IoBuffer,
    ) -> Result<(), PostError> {
        if let Err(e) = self.check("post_send") {
            return Err(PostError::new(e, iobuf));
        }
        let idx = qp.claim(WqKind::Send, iobuf);
        let mut hw = self.hw.borrow_mut();
        hw.sends.push((qp.send().cq(), qp.qpn(), idx));
        hw.last_av = Some(*av);
        Ok(())
    }

    fn post_recv(&mut self, qp: &mut QueuePair, iobuf: IoBuffer) -> Result<(), PostError> {
        if let Err(e) = self.check("post_recv") {
            return Err(PostError::new(e, iobuf));
        }
        let idx = qp.claim(WqKind::Recv, iobuf);
        self.hw
            .borrow_mut()
            .recvs
            .push((qp.recv().cq(), qp.qpn(), idx));
        Ok(())
    }

    fn poll_eq(&mut self, ctx: &mut DeviceContext) {
        if let Some(up) = self.hw.borrow_mut().link_change.take() {
            ctx.set_link_up(up);
            ctx.link_state_changed();
        }
    }

    fn open(&mut self, ctx: &mut DeviceContext) -> Result<()> {
        self.check("open")?;
        ctx.set_lid(0x1);
        ctx.set_sm_lid(0x2);
        ctx.set_pkey(0xffff);
        Ok(())
    }

    fn close(&mut self, ctx: &mut DeviceContext) {
        self.record("close");
        ctx.set_lid(LID_NONE);
    }

    fn mcast_attach(&mut self, qp: &QueuePair, gid: &Gid) -> Result<()> {
        self.check("mcast_attach")?;
        self.hw.borrow_mut().mcast.push((qp.qpn(), *gid));
        Ok(())
    }

    fn mcast_detach(&mut self, qp: &QueuePair, gid: &Gid) {
        self.record("mcast_detach");
        let mut hw = self.hw.borrow_mut();
        if let Some(pos) = hw.mcast.iter().position(|&(qpn, g)| qpn == qp.qpn() && g == *gid) {
            hw.mcast.remove(pos);
        }
    }

    fn set_port_info(&mut self, _ctx: &mut DeviceContext, _mad: &Mad) -> Result<()> {
        if self.hw.borrow().has_sma {
            return Err(IbError::NotSupported);
        }
        self.check("set_port_info")
    }

    fn set_pkey_table(&mut self, _ctx: &mut DeviceContext, _mad: &Mad) -> Result<()> {
        if self.hw.borrow().has_sma {
            return Err(IbError::NotSupported);
        }
        self.check("set_pkey_table")
    }
}

/// Allocate a device on port 1 of `phys`, driven by fresh mock hardware.
pub fn device_on(phys: &str, port: PortNum) -> (IbDevice, Hw) {
    let hw = Hw::default();
    let ops = MockOps { hw: hw.clone() };
    (IbDevice::new(phys, port, Box::new(ops)), hw)
}

/// Allocate a device driven by fresh mock hardware.
pub fn device() -> (IbDevice, Hw) {
    device_on("mock0", 1)
}

/// How a completion ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Cancelled,
    Failed,
}

impl From<&Result<()>> for Status {
    fn from(status: &Result<()>) -> Self {
        match status {
            Ok(()) => Status::Ok,
            Err(IbError::Cancelled) => Status::Cancelled,
            Err(_) => Status::Failed,
        }
    }
}

/// Completion handlers that record every completion.
#[derive(Default)]
pub struct Recorder {
    pub sends: RefCell<Vec<(Qpn, Status)>>,
    pub recvs: RefCell<Vec<(Qpn, Status, Option<AddressVector>, usize)>>,
}

impl CompletionOps for Recorder {
    fn complete_send(&self, qp: &QueuePair, _iobuf: IoBuffer, status: Result<()>) {
        self.sends.borrow_mut().push((qp.qpn(), Status::from(&status)));
    }

    fn complete_recv(
        &self,
        qp: &QueuePair,
        av: Option<&AddressVector>,
        iobuf: IoBuffer,
        status: Result<()>,
    ) {
        self.recvs
            .borrow_mut()
            .push((qp.qpn(), Status::from(&status), av.copied(), iobuf.len()));
    }
}

/// A buffer large enough to be posted for receive.
pub fn rx_buf() -> IoBuffer {
    IoBuffer::alloc(MAX_PAYLOAD_SIZE).unwrap()
}

/// A small payload buffer.
pub fn tx_buf() -> IoBuffer {
    IoBuffer::from_slice(b"payload").unwrap()
}
