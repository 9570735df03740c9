//! Connect rollback and bounded teardown.

use hid_8bitdo_protocol::{PRODUCT_ULTIMATE_2C, RumbleCommand, VENDOR_ID};
use openpad_link::sink::mock::RecordingSink;
use openpad_link::{
    Capabilities, InputFrame, InputSink, LinkConfig, Link, LinkError, LinkPhase, RejectReason,
    SinkDevice, SinkError, SubmitOutcome, TeardownReport,
};
use parking_lot::Mutex;
use openpad_usb_common::mock::{CancelBehavior, MockTransport};
use openpad_usb_common::{
    DeviceIdentity, Direction, EndpointDescriptor, InterfaceDescriptor, TransferStatus,
    TransportError,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing_test::traced_test;

type TestResult = Result<(), Box<dyn std::error::Error>>;

const PATH: &str = "usb-0000:00:14.0-2";

fn identity() -> DeviceIdentity {
    DeviceIdentity::new(VENDOR_ID, PRODUCT_ULTIMATE_2C, PATH)
}

fn gamepad() -> Arc<MockTransport> {
    Arc::new(MockTransport::interrupt_pair(identity()))
}

fn fast_config() -> Result<LinkConfig, Box<dyn std::error::Error>> {
    Ok(LinkConfig::builder()
        .teardown_grace_ms(20)
        .kill_grace_ms(5)
        .build()?)
}

fn assert_no_leaks(transport: &MockTransport) {
    assert_eq!(transport.live_buffers(), 0, "buffers leaked");
    assert_eq!(transport.live_requests(), 0, "requests leaked");
    assert_eq!(transport.invalid_frees(), 0, "invalid frees");
}

#[tokio::test]
async fn test_connect_reaches_active_with_read_armed() -> TestResult {
    let transport = gamepad();
    let sink = Arc::new(RecordingSink::new());
    let link = Link::connect(transport.clone(), sink.clone(), fast_config()?).await?;

    assert_eq!(link.phase(), LinkPhase::Active);
    assert!(link.is_active());
    assert_eq!(link.device().phys, format!("{PATH}/input0"));
    assert!(sink.is_registered(&link.device().phys));
    assert!(transport.has_pending(Direction::In));
    assert!(transport.has_pending(Direction::Out), "announce in flight");
    assert_eq!(link.in_flight(), 2);

    assert!(transport.complete_out());
    let report = link.disconnect().await;
    assert_eq!(
        report,
        TeardownReport {
            graceful: true,
            forced: 0,
            synthesized: 0
        }
    );
    assert_eq!(sink.unregistrations(), 1);
    assert_eq!(transport.unlink_requests().len(), 1);
    assert!(transport.kill_requests().is_empty());
    assert_no_leaks(&transport);
    Ok(())
}

#[tokio::test]
async fn test_pending_outbound_drains_during_grace() -> TestResult {
    let transport = gamepad();
    let link = Link::connect(
        transport.clone(),
        Arc::new(RecordingSink::new()),
        LinkConfig::builder()
            .teardown_grace_ms(500)
            .kill_grace_ms(5)
            .build()?,
    )
    .await?;
    assert!(transport.complete_out());
    assert_eq!(link.rumble(RumbleCommand::new(0, 0xFF00)), SubmitOutcome::Accepted);

    let completer = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            transport.complete_out()
        })
    };
    let report = link.disconnect().await;
    assert!(completer.await?);

    assert!(report.graceful);
    assert!(transport.kill_requests().is_empty());
    assert_no_leaks(&transport);
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn test_teardown_bounded_when_transport_ignores_cancellation() -> TestResult {
    let transport = gamepad();
    transport.set_unlink_behavior(CancelBehavior::Ignore);
    transport.set_kill_behavior(CancelBehavior::Ignore);

    let link = Link::connect(transport.clone(), Arc::new(RecordingSink::new()), fast_config()?)
        .await?;
    assert!(transport.complete_out());
    assert_eq!(link.rumble(RumbleCommand::new(1 << 8, 1 << 8)), SubmitOutcome::Accepted);

    let started = Instant::now();
    let report = link.disconnect().await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(
        report,
        TeardownReport {
            graceful: false,
            forced: 2,
            synthesized: 2
        }
    );
    assert_eq!(transport.unlink_requests().len(), 1);
    assert_eq!(transport.kill_requests().len(), 2);
    assert!(logs_contain("transport ignored kill"));

    // The completions arrive after teardown; buffers go back, nothing resubmits.
    let submits = transport.submit_count();
    for id in transport.pending_ids() {
        assert!(transport.finish(id, TransferStatus::Killed));
    }
    assert_eq!(transport.submit_count(), submits);
    assert_no_leaks(&transport);
    Ok(())
}

#[tokio::test]
async fn test_kill_path_used_when_unlink_ignored() -> TestResult {
    let transport = gamepad();
    transport.set_unlink_behavior(CancelBehavior::Ignore);

    let link = Link::connect(transport.clone(), Arc::new(RecordingSink::new()), fast_config()?)
        .await?;
    assert!(transport.complete_out());

    let report = link.disconnect().await;
    assert_eq!(
        report,
        TeardownReport {
            graceful: false,
            forced: 1,
            synthesized: 0
        }
    );
    assert_no_leaks(&transport);
    Ok(())
}

#[tokio::test]
async fn test_surprise_removal_then_disconnect() -> TestResult {
    let transport = gamepad();
    let link = Link::connect(transport.clone(), Arc::new(RecordingSink::new()), fast_config()?)
        .await?;

    transport.disconnect();
    assert_eq!(link.in_flight(), 0);
    assert!(!link.outbound_status().busy);
    assert_eq!(
        link.rumble(RumbleCommand::STOP),
        SubmitOutcome::Rejected(RejectReason::Transport(TransportError::NoDevice))
    );

    let report = link.disconnect().await;
    assert!(report.graceful);
    assert_no_leaks(&transport);
    Ok(())
}

#[tokio::test]
async fn test_buffer_exhaustion_rolls_back() -> TestResult {
    for budget in 0..2 {
        let transport = gamepad();
        transport.set_buffer_alloc_limit(Some(budget));
        let sink = Arc::new(RecordingSink::new());

        let result = Link::connect(transport.clone(), sink.clone(), fast_config()?).await;
        assert!(
            matches!(result, Err(LinkError::ResourceExhaustion(TransportError::NoMemory))),
            "budget {budget}: {result:?}"
        );
        assert_eq!(sink.registrations(), 0);
        assert_eq!(transport.submit_count(), 0);
        assert_no_leaks(&transport);
    }
    Ok(())
}

#[tokio::test]
async fn test_request_exhaustion_rolls_back() -> TestResult {
    for budget in 0..2 {
        let transport = gamepad();
        transport.set_request_alloc_limit(Some(budget));

        let result =
            Link::connect(transport.clone(), Arc::new(RecordingSink::new()), fast_config()?)
                .await;
        assert!(
            matches!(result, Err(LinkError::ResourceExhaustion(_))),
            "budget {budget}: {result:?}"
        );
        assert_no_leaks(&transport);
    }
    Ok(())
}

#[tokio::test]
async fn test_missing_out_endpoint() -> TestResult {
    let transport = Arc::new(MockTransport::new(
        identity(),
        InterfaceDescriptor::new(0, vec![EndpointDescriptor::interrupt_in(1, 32, 1)]),
    ));

    let result = Link::connect(transport.clone(), Arc::new(RecordingSink::new()), fast_config()?)
        .await;
    assert!(matches!(
        result,
        Err(LinkError::EndpointNotFound(Direction::Out))
    ));
    assert_no_leaks(&transport);
    Ok(())
}

#[tokio::test]
async fn test_sink_refusal_rolls_back() -> TestResult {
    let transport = gamepad();
    let sink = Arc::new(RecordingSink::failing());

    let result = Link::connect(transport.clone(), sink.clone(), fast_config()?).await;
    assert!(matches!(result, Err(LinkError::Sink(_))));
    assert_eq!(sink.registered_count(), 0);
    assert_eq!(sink.unregistrations(), 0);
    assert!(!transport.has_pending(Direction::In), "read never started");
    assert_no_leaks(&transport);
    Ok(())
}

#[tokio::test]
async fn test_first_read_refused_rolls_back() -> TestResult {
    let transport = gamepad();
    // The announce takes the first failure, the first read the second.
    transport.fail_next_submits(2);
    let sink = Arc::new(RecordingSink::new());

    let result = Link::connect(transport.clone(), sink.clone(), fast_config()?).await;
    assert!(matches!(result, Err(LinkError::Transport(_))));
    assert_eq!(sink.registrations(), 1);
    assert_eq!(sink.unregistrations(), 1);
    assert_eq!(transport.submit_count(), 0);
    assert_no_leaks(&transport);
    Ok(())
}

#[tokio::test]
async fn test_invalid_config_allocates_nothing() {
    let transport = gamepad();
    let config = LinkConfig {
        teardown_grace_ms: 0,
        ..LinkConfig::default()
    };

    let result = Link::connect(transport.clone(), Arc::new(RecordingSink::new()), config).await;
    assert!(matches!(result, Err(LinkError::Config(_))));
    assert_eq!(transport.live_buffers(), 0);
    assert_eq!(transport.submit_count(), 0);
}

#[tokio::test]
#[traced_test]
async fn test_drop_without_disconnect_stops_resubmission() -> TestResult {
    let transport = gamepad();
    let sink = Arc::new(RecordingSink::new());
    let link = Link::connect(transport.clone(), sink.clone(), fast_config()?).await?;
    let phys = link.device().phys.clone();

    drop(link);
    assert!(logs_contain("link dropped without disconnect"));
    assert!(!sink.is_registered(&phys));

    assert!(transport.complete_in(&[0u8; 32]));
    assert!(!transport.has_pending(Direction::In));
    assert!(sink.frames().is_empty());
    Ok(())
}

/// Stalls every event emitted on the thread it is installed on, which
/// stretches a completion handler running on that thread.
struct StallingSubscriber(Duration);

impl tracing::Subscriber for StallingSubscriber {
    fn enabled(&self, _: &tracing::Metadata<'_>) -> bool {
        true
    }

    fn new_span(&self, _: &tracing::span::Attributes<'_>) -> tracing::span::Id {
        tracing::span::Id::from_u64(1)
    }

    fn record(&self, _: &tracing::span::Id, _: &tracing::span::Record<'_>) {}

    fn record_follows_from(&self, _: &tracing::span::Id, _: &tracing::span::Id) {}

    fn event(&self, _: &tracing::Event<'_>) {
        std::thread::sleep(self.0);
    }

    fn enter(&self, _: &tracing::span::Id) {}

    fn exit(&self, _: &tracing::span::Id) {}
}

/// Wait on a plain thread until `ready` holds, giving up after two seconds.
fn wait_until(ready: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !ready() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    true
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_read_cancelled_on_another_thread_during_teardown_is_freed() -> TestResult {
    let transport = gamepad();
    transport.set_unlink_behavior(CancelBehavior::Ignore);
    let config = LinkConfig::builder()
        .teardown_grace_ms(2_000)
        .kill_grace_ms(5)
        .build()?;
    let link = Link::connect(transport.clone(), Arc::new(RecordingSink::new()), config).await?;
    assert!(transport.complete_out());
    let pending = transport.pending_ids();
    let [read] = pending.as_slice() else {
        return Err(format!("expected one pending read, got {pending:?}").into());
    };
    let read = *read;

    let completer = {
        let transport = Arc::clone(&transport);
        std::thread::spawn(move || {
            // Deliver while teardown waits on the ignored unlink.
            if !wait_until(|| !transport.unlink_requests().is_empty()) {
                return false;
            }
            let stalling = StallingSubscriber(Duration::from_millis(100));
            tracing::subscriber::with_default(stalling, || {
                transport.finish(read, TransferStatus::Cancelled)
            })
        })
    };

    let report = link.disconnect().await;
    let delivered = completer
        .join()
        .map_err(|e| format!("completer thread panicked: {e:?}"))?;
    assert!(delivered, "teardown never unlinked the read");
    assert_eq!(
        report,
        TeardownReport {
            graceful: true,
            forced: 0,
            synthesized: 0
        }
    );
    assert_no_leaks(&transport);
    Ok(())
}

/// Records the order of reports and unregistration; each report is slow.
#[derive(Default)]
struct SlowSink {
    reporting: AtomicBool,
    events: Mutex<Vec<&'static str>>,
}

impl InputSink for SlowSink {
    fn register(&self, _: &SinkDevice, _: &Capabilities) -> Result<(), SinkError> {
        Ok(())
    }

    fn report(&self, _: &SinkDevice, _: &InputFrame) {
        self.reporting.store(true, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(50));
        self.events.lock().push("report");
    }

    fn unregister(&self, _: &SinkDevice) {
        self.events.lock().push("unregister");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_frame_in_progress_finishes_before_unregister() -> TestResult {
    let transport = gamepad();
    let sink = Arc::new(SlowSink::default());
    let config = LinkConfig::builder()
        .teardown_grace_ms(500)
        .kill_grace_ms(5)
        .build()?;
    let link = Link::connect(transport.clone(), sink.clone(), config).await?;
    assert!(transport.complete_out());

    let reader = {
        let transport = Arc::clone(&transport);
        std::thread::spawn(move || transport.complete_in(&[0u8; 32]))
    };
    let started = {
        let sink = Arc::clone(&sink);
        tokio::task::spawn_blocking(move || wait_until(|| sink.reporting.load(Ordering::SeqCst)))
            .await?
    };
    assert!(started, "report never started");

    let report = link.disconnect().await;
    let delivered = reader
        .join()
        .map_err(|e| format!("reader thread panicked: {e:?}"))?;
    assert!(delivered);
    assert!(report.graceful);
    assert_eq!(*sink.events.lock(), vec!["report", "unregister"]);
    assert_no_leaks(&transport);
    Ok(())
}
