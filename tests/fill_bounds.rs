mod common;

use ibcore::{IbError, QpType, WqKind};
use proptest::prelude::*;

use common::{device, rx_buf, tx_buf};

#[derive(Debug, Clone, Copy)]
enum Action {
    Send,
    Recv,
    Poll,
    Refill,
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        3 => Just(Action::Send),
        3 => Just(Action::Recv),
        1 => Just(Action::Poll),
        1 => Just(Action::Refill),
    ]
}

proptest! {
    #[test]
    fn fill_stays_within_capacity(
        send_cap in 1usize..6,
        recv_cap in 1usize..6,
        actions in prop::collection::vec(action(), 0..64),
    ) {
        let (mut dev, _hw) = device();
        let cq = dev.create_cq(16, None).unwrap();
        let qp = dev.create_qp(QpType::Ud, send_cap, cq, recv_cap, cq).unwrap();

        for action in actions {
            let before = {
                let entry = dev.qp(qp).unwrap();
                (entry.send().fill(), entry.recv().fill())
            };
            match action {
                Action::Send => {
                    let ret = dev.post_send(qp, None, tx_buf());
                    if before.0 == send_cap {
                        prop_assert!(matches!(ret, Err(ref e) if matches!(e.error, IbError::NoBuffers)));
                        prop_assert_eq!(dev.qp(qp).unwrap().send().fill(), send_cap);
                    } else {
                        prop_assert!(ret.is_ok());
                    }
                }
                Action::Recv => {
                    let ret = dev.post_recv(qp, rx_buf());
                    if before.1 == recv_cap {
                        prop_assert!(matches!(ret, Err(ref e) if matches!(e.error, IbError::NoBuffers)));
                        prop_assert_eq!(dev.qp(qp).unwrap().recv().fill(), recv_cap);
                    } else {
                        prop_assert!(ret.is_ok());
                    }
                }
                Action::Poll => dev.poll_cq(cq),
                Action::Refill => dev.refill_recv(qp),
            }

            let entry = dev.qp(qp).unwrap();
            prop_assert!(entry.send().fill() <= send_cap);
            prop_assert!(entry.recv().fill() <= recv_cap);
            prop_assert_eq!(entry.send().fill(), entry.occupied(WqKind::Send));
            prop_assert_eq!(entry.recv().fill(), entry.occupied(WqKind::Recv));
        }
    }
}
