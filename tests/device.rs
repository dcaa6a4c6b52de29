mod common;

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use ibcore::type_alias::*;
use ibcore::*;
use rstest::rstest;

use common::device;

#[test]
fn nested_open_close() -> Result<()> {
    let (mut dev, hw) = device();
    assert_eq!(dev.lid(), LID_NONE);
    assert_eq!(dev.pkey(), PKEY_NONE);

    dev.open()?;
    dev.open()?;
    assert_eq!(dev.open_count(), 2);
    assert_eq!(hw.borrow().count("open"), 1);
    assert_eq!(hw.borrow().count("create_qp"), 2);
    assert_eq!(dev.lid(), 0x1);

    dev.close();
    assert_eq!(dev.open_count(), 1);
    assert_eq!(hw.borrow().count("close"), 0);
    assert!(dev.smi().is_some());

    dev.close();
    assert_eq!(dev.open_count(), 0);
    assert_eq!(hw.borrow().count("close"), 1);
    assert_eq!(dev.lid(), LID_NONE);
    assert!(dev.smi().is_none());
    assert!(dev.gsi().is_none());
    assert_eq!(dev.qps().count(), 0);
    assert_eq!(dev.cqs().count(), 0);
    Ok(())
}

#[test]
fn management_interfaces() -> Result<()> {
    let (mut dev, hw) = device();
    dev.open()?;

    let smi = dev.smi().unwrap().downcast_ref::<ManagementInterface>().unwrap();
    let gsi = dev.gsi().unwrap().downcast_ref::<ManagementInterface>().unwrap();
    assert_eq!(smi.qp_type(), QpType::Smi);
    assert_eq!(gsi.qp_type(), QpType::Gsi);

    let (smi_qp, gsi_qp) = (smi.qp(), gsi.qp());
    assert_eq!(dev.find_qp_by_number(QPN_SMI), Some(smi_qp));
    assert_eq!(dev.find_qp_by_number(QPN_GSI), Some(gsi_qp));
    assert_eq!(dev.qp(gsi_qp).unwrap().qkey(), QKEY_GSI);

    let mi = dev.config().mi;
    assert_eq!(dev.qp(gsi_qp).unwrap().recv().fill(), mi.num_recv_wqes);
    assert_eq!(dev.qp(gsi_qp).unwrap().send().capacity(), mi.num_send_wqes);
    assert_eq!(hw.borrow().count("modify_qp"), 2);

    // Arrivals on the GSI are consumed and the ring is refilled.
    dev.poll_cqs();
    assert_eq!(dev.qp(gsi_qp).unwrap().recv().fill(), mi.num_recv_wqes);

    dev.close();
    Ok(())
}

#[test]
fn destruction_order() -> Result<()> {
    let (mut dev, hw) = device();
    dev.open()?;
    hw.borrow_mut().calls.clear();
    dev.close();
    assert_eq!(
        hw.borrow().calls,
        vec!["destroy_qp", "destroy_cq", "destroy_qp", "destroy_cq", "close"]
    );
    Ok(())
}

#[rstest]
#[case::smi_cq("create_cq", 0)]
#[case::smi_qp("create_qp", 0)]
#[case::gsi_cq("create_cq", 1)]
#[case::gsi_modify("modify_qp", 1)]
#[case::hardware("open", 0)]
fn failed_open_unwinds(#[case] op: &'static str, #[case] nth: usize) {
    let (mut dev, hw) = device();
    hw.borrow_mut().fail_nth(op, nth);

    assert!(matches!(dev.open(), Err(IbError::Device(_))));
    assert_eq!(dev.open_count(), 0);
    assert!(dev.smi().is_none());
    assert!(dev.gsi().is_none());
    assert_eq!(dev.qps().count(), 0);
    assert_eq!(dev.cqs().count(), 0);
    assert_eq!(hw.borrow().count("close"), 0);

    // A later open starts from scratch.
    dev.open().unwrap();
    assert_eq!(dev.open_count(), 1);
    assert_eq!(dev.qps().count(), 2);
}

#[test]
#[should_panic(expected = "not open")]
fn close_unopened_device() {
    let (mut dev, _hw) = device();
    dev.close();
}

#[derive(Default)]
struct Hooks {
    calls: RefCell<Vec<String>>,
    fail_sma: bool,
}

impl ManagementLayer for Hooks {
    fn create_mi(&self, _dev: &mut IbDevice, qp_type: QpType) -> ibcore::Result<MiHandle> {
        self.calls.borrow_mut().push(format!("create {:?}", qp_type));
        Ok(Box::new(qp_type))
    }

    fn destroy_mi(&self, _dev: &mut IbDevice, mi: MiHandle) {
        let qp_type = mi.downcast_ref::<QpType>().unwrap();
        self.calls.borrow_mut().push(format!("destroy {:?}", qp_type));
    }

    fn create_sma(&self, _dev: &mut IbDevice) -> ibcore::Result<()> {
        self.calls.borrow_mut().push("create SMA".into());
        if self.fail_sma {
            return Err(IbError::NoMemory);
        }
        Ok(())
    }

    fn destroy_sma(&self, _dev: &mut IbDevice) {
        self.calls.borrow_mut().push("destroy SMA".into());
    }
}

#[test]
fn management_layer_ordering() -> Result<()> {
    let (dev, hw) = device();
    let hooks = Rc::new(Hooks::default());
    let mut dev = dev.with_management(hooks.clone());

    dev.open()?;
    dev.close();
    assert_eq!(
        *hooks.calls.borrow(),
        vec![
            "create Smi",
            "create SMA",
            "create Gsi",
            "destroy Gsi",
            "destroy SMA",
            "destroy Smi",
        ]
    );
    assert_eq!(hw.borrow().calls, vec!["open", "close"]);
    Ok(())
}

#[test]
fn failed_sma_unwinds_smi() {
    let (dev, hw) = device();
    let hooks = Rc::new(Hooks {
        fail_sma: true,
        ..Default::default()
    });
    let mut dev = dev.with_management(hooks.clone());

    assert!(matches!(dev.open(), Err(IbError::NoMemory)));
    assert_eq!(
        *hooks.calls.borrow(),
        vec!["create Smi", "create SMA", "destroy Smi"]
    );
    assert!(hw.borrow().calls.is_empty());
}

#[test]
fn port_management_requests() {
    let (mut dev, hw) = device();
    let mad = Mad::zeroed();
    dev.set_port_info(&mad).unwrap();
    dev.set_pkey_table(&mad).unwrap();

    hw.borrow_mut().has_sma = true;
    assert!(matches!(dev.set_port_info(&mad), Err(IbError::NotSupported)));
    assert!(matches!(dev.set_pkey_table(&mad), Err(IbError::NotSupported)));
}

#[test]
fn link_state_change_is_reported_once() {
    let (mut dev, hw) = device();
    assert!(!dev.poll_eq());

    hw.borrow_mut().link_change = Some(true);
    assert!(dev.poll_eq());
    assert!(dev.link_up());
    assert!(!dev.poll_eq());
}

#[test]
fn names() {
    let (dev, _hw) = common::device_on("mlx4_0", 2);
    assert_eq!(dev.name(), "mlx4_0:2");
    assert_eq!(dev.phys(), "mlx4_0");
    assert_eq!(dev.port(), 2);
    assert!(!dev.is_open());
}
