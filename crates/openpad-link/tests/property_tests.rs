//! Property tests for the outbound slot under arbitrary interleavings.

use hid_8bitdo_protocol::{PRODUCT_ULTIMATE_2C, RumbleCommand, VENDOR_ID};
use openpad_link::sink::mock::RecordingSink;
use openpad_link::{Link, LinkConfig, SubmitOutcome};
use openpad_usb_common::mock::MockTransport;
use openpad_usb_common::{DeviceIdentity, Direction};
use proptest::prelude::*;
use std::sync::Arc;

const STOP_REPORT: [u8; 8] = [0x00, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

#[derive(Debug, Clone)]
enum Op {
    Rumble(u16, u16),
    Stop,
    Announce,
    CompleteOut,
    Read([u8; 4]),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u16..=u16::MAX, any::<u16>()).prop_map(|(weak, strong)| Op::Rumble(weak, strong)),
        Just(Op::Stop),
        Just(Op::Announce),
        Just(Op::CompleteOut),
        any::<[u8; 4]>().prop_map(Op::Read),
    ]
}

fn runtime() -> Result<tokio::runtime::Runtime, TestCaseError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| TestCaseError::fail(format!("runtime: {e}")))
}

fn connect(
    rt: &tokio::runtime::Runtime,
) -> Result<(Arc<MockTransport>, Link), TestCaseError> {
    let transport = Arc::new(MockTransport::interrupt_pair(DeviceIdentity::new(
        VENDOR_ID,
        PRODUCT_ULTIMATE_2C,
        "usb-prop",
    )));
    let config = LinkConfig::builder()
        .teardown_grace_ms(10)
        .kill_grace_ms(5)
        .build()
        .map_err(|e| TestCaseError::fail(e.to_string()))?;
    let link = rt
        .block_on(Link::connect(
            transport.clone(),
            Arc::new(RecordingSink::new()),
            config,
        ))
        .map_err(|e| TestCaseError::fail(e.to_string()))?;
    Ok((transport, link))
}

fn out_pending(transport: &MockTransport) -> usize {
    usize::from(transport.has_pending(Direction::Out))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_at_most_one_write_in_flight(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let rt = runtime()?;
        let (transport, link) = connect(&rt)?;

        for op in ops {
            let outcome = match op {
                Op::Rumble(weak, strong) => Some(link.rumble(RumbleCommand::new(weak, strong))),
                Op::Stop => Some(link.rumble(RumbleCommand::STOP)),
                Op::Announce => Some(link.announce()),
                Op::CompleteOut => {
                    let _ = transport.complete_out();
                    None
                }
                Op::Read(head) => {
                    let mut data = [0u8; 32];
                    data[..4].copy_from_slice(&head);
                    let _ = transport.complete_in(&data);
                    None
                }
            };
            if let Some(outcome) = outcome {
                prop_assert!(!matches!(outcome, SubmitOutcome::Rejected(_)), "{outcome:?}");
            }
            prop_assert_eq!(link.outbound_status().busy, out_pending(&transport) == 1);
            prop_assert!(link.in_flight() <= 2);
        }

        let _ = rt.block_on(link.disconnect());
        prop_assert_eq!(transport.live_buffers(), 0);
        prop_assert_eq!(transport.invalid_frees(), 0);
    }

    #[test]
    fn prop_final_stop_is_never_lost(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let rt = runtime()?;
        let (transport, link) = connect(&rt)?;

        for op in ops {
            match op {
                Op::Rumble(weak, strong) => {
                    let _ = link.rumble(RumbleCommand::new(weak, strong));
                }
                Op::Stop => {
                    let _ = link.rumble(RumbleCommand::STOP);
                }
                Op::Announce => {
                    let _ = link.announce();
                }
                Op::CompleteOut => {
                    let _ = transport.complete_out();
                }
                Op::Read(_) => {}
            }
        }

        let outcome = link.rumble(RumbleCommand::STOP);
        prop_assert!(
            matches!(outcome, SubmitOutcome::Accepted | SubmitOutcome::Coalesced),
            "{outcome:?}"
        );
        let mut drained = 0;
        while transport.complete_out() {
            drained += 1;
            prop_assert!(drained <= 2, "stop resent more than once");
        }

        let last = transport.write_history().last().cloned();
        prop_assert_eq!(last.as_deref(), Some(&STOP_REPORT[..]));
        prop_assert!(!link.outbound_status().stop_pending);
        let _ = rt.block_on(link.disconnect());
    }
}
