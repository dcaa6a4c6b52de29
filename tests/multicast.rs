mod common;

use std::net::Ipv6Addr;

use anyhow::Result;
use ibcore::*;

use common::device;

fn mgid(group: u16) -> Gid {
    Gid::from(Ipv6Addr::new(0xff12, 0x401b, 0xffff, 0, 0, 0, 0, group))
}

#[test]
fn attach_then_detach_restores_membership() -> Result<()> {
    let (mut dev, hw) = device();
    let cq = dev.create_cq(4, None)?;
    let qp = dev.create_qp(QpType::Ud, 1, cq, 1, cq)?;
    let qpn = dev.qp(qp).unwrap().qpn();

    dev.mcast_attach(qp, &mgid(1))?;
    assert_eq!(dev.qp(qp).unwrap().mgids(), &[mgid(1)]);
    assert_eq!(hw.borrow().mcast, vec![(qpn, mgid(1))]);
    assert_eq!(dev.find_qp_by_multicast_gid(&mgid(1)), Some(qp));

    dev.mcast_detach(qp, &mgid(1));
    assert!(dev.qp(qp).unwrap().mgids().is_empty());
    assert!(hw.borrow().mcast.is_empty());
    assert_eq!(dev.find_qp_by_multicast_gid(&mgid(1)), None);

    dev.destroy_qp(qp);
    Ok(())
}

#[test]
fn detach_unknown_group_still_reaches_hardware() -> Result<()> {
    let (mut dev, hw) = device();
    let cq = dev.create_cq(4, None)?;
    let qp = dev.create_qp(QpType::Ud, 1, cq, 1, cq)?;
    dev.mcast_attach(qp, &mgid(1))?;

    dev.mcast_detach(qp, &mgid(2));
    assert_eq!(hw.borrow().count("mcast_detach"), 1);
    assert_eq!(dev.qp(qp).unwrap().mgids(), &[mgid(1)]);
    Ok(())
}

#[test]
fn detach_removes_first_match_only() -> Result<()> {
    let (mut dev, _hw) = device();
    let cq = dev.create_cq(4, None)?;
    let qp = dev.create_qp(QpType::Ud, 1, cq, 1, cq)?;
    dev.mcast_attach(qp, &mgid(1))?;
    dev.mcast_attach(qp, &mgid(2))?;
    dev.mcast_attach(qp, &mgid(1))?;

    dev.mcast_detach(qp, &mgid(1));
    assert_eq!(dev.qp(qp).unwrap().mgids(), &[mgid(2), mgid(1)]);
    Ok(())
}

#[test]
fn failed_attach_leaves_no_membership() -> Result<()> {
    let (mut dev, hw) = device();
    let cq = dev.create_cq(4, None)?;
    let qp = dev.create_qp(QpType::Ud, 1, cq, 1, cq)?;
    dev.mcast_attach(qp, &mgid(1))?;
    hw.borrow_mut().fail_always("mcast_attach");

    assert!(matches!(dev.mcast_attach(qp, &mgid(2)), Err(IbError::Device(_))));
    assert_eq!(dev.qp(qp).unwrap().mgids(), &[mgid(1)]);
    Ok(())
}

#[test]
fn attach_to_unknown_queue_pair() -> Result<()> {
    let (mut dev, hw) = device();
    let cq = dev.create_cq(4, None)?;
    let qp = dev.create_qp(QpType::Ud, 1, cq, 1, cq)?;
    dev.destroy_qp(qp);

    assert!(matches!(dev.mcast_attach(qp, &mgid(1)), Err(IbError::NoSuchQueuePair)));
    assert_eq!(hw.borrow().count("mcast_attach"), 0);
    Ok(())
}

#[test]
#[should_panic(expected = "multicast group(s) attached")]
fn destroy_qp_with_membership() {
    let (mut dev, _hw) = device();
    let cq = dev.create_cq(4, None).unwrap();
    let qp = dev.create_qp(QpType::Ud, 1, cq, 1, cq).unwrap();
    dev.mcast_attach(qp, &mgid(1)).unwrap();
    dev.destroy_qp(qp);
}
