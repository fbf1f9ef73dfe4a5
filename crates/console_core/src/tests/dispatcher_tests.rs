use super::*;
use crate::{
    test_support::FakeBackend,
    transport::{BackendApi, HttpBackend},
};
use shared::domain::{LogEntry, Severity};
use std::time::Duration;
use tokio::sync::broadcast;

struct Harness {
    backend: FakeBackend,
    session: Arc<SessionStateMachine>,
    log: Arc<LogBook>,
    dispatcher: Arc<CommandDispatcher>,
}

async fn harness() -> Harness {
    let backend = FakeBackend::spawn().await;
    let api = backend.api();
    harness_with(backend, api)
}

/// Commands go to `api` while `backend` stays available for assertions.
fn harness_with(backend: FakeBackend, api: Arc<dyn BackendApi>) -> Harness {
    let (events, _) = broadcast::channel(64);
    let session = Arc::new(SessionStateMachine::new(StrategyConfig::default()));
    let log = Arc::new(LogBook::new(100, events));
    let dispatcher = Arc::new(CommandDispatcher::new(
        api,
        Arc::clone(&session),
        Arc::clone(&log),
    ));
    Harness {
        backend,
        session,
        log,
        dispatcher,
    }
}

impl Harness {
    async fn latest_log(&self) -> LogEntry {
        self.log.snapshot().await.into_iter().next().expect("a log line")
    }

    async fn run_to_running(&self) {
        self.dispatcher
            .start(StrategyConfig::default())
            .await
            .expect("start");
        assert_eq!(self.session.status(), SessionStatus::Running);
    }
}

#[tokio::test]
async fn confirmed_start_runs_the_session_and_sends_the_full_config() {
    let h = harness().await;
    let config = StrategyConfig {
        ticker: "BTC-PERP".into(),
        quantity: 0.01,
        spread: 0.001,
        interval: 3,
        boost_mode: true,
        max_exposure: 150.0,
    };
    let outcome = h.dispatcher.start(config).await.expect("start");
    assert_eq!(outcome, CommandOutcome::Started);
    assert_eq!(h.session.status(), SessionStatus::Running);

    let payloads = h.backend.state.start_payloads.lock().await;
    assert_eq!(payloads.len(), 1);
    let body = &payloads[0];
    assert_eq!(body["ticker"], "BTC-PERP");
    assert_eq!(body["quantity"], 0.01);
    assert_eq!(body["spread"], 0.001);
    assert_eq!(body["interval"], 3);
    assert_eq!(body["boost_mode"], true);
    assert_eq!(body["max_exposure"], 150.0);

    let latest = h.latest_log().await;
    assert_eq!(latest.severity, Severity::Success);
    assert!(latest.text.contains("started"));
}

#[tokio::test]
async fn rejected_start_keeps_the_session_stopped() {
    let h = harness().await;
    h.backend
        .set_start_reply(r#"{"status":"error","error":"insufficient margin"}"#)
        .await;
    let err = h
        .dispatcher
        .start(StrategyConfig::default())
        .await
        .expect_err("rejected");
    assert_eq!(err, CommandError::Rejected("insufficient margin".into()));
    assert_eq!(h.session.status(), SessionStatus::Stopped);

    let latest = h.latest_log().await;
    assert_eq!(latest.severity, Severity::Error);
    assert!(latest.text.starts_with(FAILURE_PREFIX));
    assert!(latest.text.contains("insufficient margin"));
}

#[tokio::test]
async fn unparseable_start_reply_is_logged_verbatim() {
    let h = harness().await;
    h.backend.set_start_reply("Internal Server Error").await;
    let err = h
        .dispatcher
        .start(StrategyConfig::default())
        .await
        .expect_err("garbage reply");
    assert!(err.reached_backend());
    assert_eq!(h.session.status(), SessionStatus::Stopped);
    assert!(h.latest_log().await.text.contains("Internal Server Error"));
}

#[tokio::test]
async fn start_is_refused_locally_while_running() {
    let h = harness().await;
    h.run_to_running().await;

    let err = h
        .dispatcher
        .start(StrategyConfig::default())
        .await
        .expect_err("gated");
    assert!(matches!(
        err,
        CommandError::Gated {
            command: CommandKind::Start,
            ..
        }
    ));
    assert_eq!(FakeBackend::hits(&h.backend.state.start_hits), 1);
    assert_eq!(h.latest_log().await.severity, Severity::Warning);
}

#[tokio::test]
async fn invalid_config_never_reaches_the_backend() {
    let h = harness().await;
    let config = StrategyConfig {
        quantity: 0.0,
        ..StrategyConfig::default()
    };
    let err = h.dispatcher.start(config).await.expect_err("invalid");
    assert!(matches!(err, CommandError::InvalidConfig(_)));
    assert!(!err.reached_backend());
    assert_eq!(FakeBackend::hits(&h.backend.state.start_hits), 0);
    assert_eq!(h.session.status(), SessionStatus::Stopped);
}

#[tokio::test]
async fn stop_always_ends_stopped_even_on_garbage_reply() {
    let h = harness().await;
    h.run_to_running().await;
    h.backend.set_stop_reply("<html>bad gateway</html>").await;

    let outcome = h.dispatcher.stop().await.expect("stop");
    assert_eq!(
        outcome,
        CommandOutcome::Stopped(StopReconciliation::Confirmed)
    );
    assert_eq!(h.session.status(), SessionStatus::Stopped);
    assert_eq!(FakeBackend::hits(&h.backend.state.stop_hits), 1);
    assert!(FakeBackend::hits(&h.backend.state.status_hits) >= 1);
}

#[tokio::test]
async fn stop_reports_a_backend_that_keeps_running() {
    let h = harness().await;
    h.run_to_running().await;
    h.backend.set_status("running").await;

    let outcome = h.dispatcher.stop().await.expect("stop");
    assert_eq!(
        outcome,
        CommandOutcome::Stopped(StopReconciliation::BackendStillRunning)
    );
    assert_eq!(h.session.status(), SessionStatus::Stopped);

    let latest = h.latest_log().await;
    assert_eq!(latest.severity, Severity::Critical);
    assert!(latest.text.contains("still reports running"));
}

#[tokio::test]
async fn stop_is_gated_while_stopped() {
    let h = harness().await;
    let err = h.dispatcher.stop().await.expect_err("gated");
    assert!(matches!(err, CommandError::Gated { .. }));
    assert_eq!(FakeBackend::hits(&h.backend.state.stop_hits), 0);
}

#[tokio::test]
async fn close_all_reports_the_flattened_position() {
    let h = harness().await;
    h.backend
        .set_close_reply(r#"{"status":"closed","size":10,"side":"sell"}"#)
        .await;
    let outcome = h.dispatcher.close_all().await.expect("close");
    assert_eq!(
        outcome,
        CommandOutcome::Closed {
            size: Some(10.0),
            side: Some("sell".into())
        }
    );
    let latest = h.latest_log().await;
    assert_eq!(latest.severity, Severity::Success);
    assert!(latest.text.contains("10"));
    assert!(latest.text.contains("sell"));
    assert_eq!(h.session.status(), SessionStatus::Stopped);
}

#[tokio::test]
async fn close_all_with_flat_position_is_informational() {
    let h = harness().await;
    h.run_to_running().await;
    let outcome = h.dispatcher.close_all().await.expect("close");
    assert_eq!(outcome, CommandOutcome::NoPosition);
    assert_eq!(h.latest_log().await.severity, Severity::Info);
    assert_eq!(h.session.status(), SessionStatus::Running);

    let logs = h.log.snapshot().await;
    assert!(logs.iter().any(|entry| entry.text.contains("PANIC CLOSE")));
    assert!(!logs.iter().any(|entry| entry.severity == Severity::Error));
}

#[tokio::test]
async fn close_all_error_carries_backend_text() {
    let h = harness().await;
    h.backend
        .set_close_reply(r#"{"status":"error","error":"engine not initialized"}"#)
        .await;
    let err = h.dispatcher.close_all().await.expect_err("error");
    assert_eq!(err, CommandError::Rejected("engine not initialized".into()));
    let latest = h.latest_log().await;
    assert_eq!(latest.severity, Severity::Error);
    assert!(latest.text.contains("engine not initialized"));
}

#[tokio::test]
async fn cancel_all_logs_success_and_failure() {
    let h = harness().await;
    assert_eq!(
        h.dispatcher.cancel_all().await.expect("cancel"),
        CommandOutcome::Cancelled
    );
    assert_eq!(h.latest_log().await.severity, Severity::Success);

    h.backend
        .set_cancel_reply(r#"{"status":"error","error":"rate limited"}"#)
        .await;
    let err = h.dispatcher.cancel_all().await.expect_err("error");
    assert_eq!(err, CommandError::Rejected("rate limited".into()));
    assert_eq!(FakeBackend::hits(&h.backend.state.cancel_hits), 2);
}

#[tokio::test]
async fn second_command_is_refused_while_one_is_in_flight() {
    let h = harness().await;
    h.backend
        .set_command_delay(Duration::from_millis(200))
        .await;

    let first = {
        let dispatcher = Arc::clone(&h.dispatcher);
        tokio::spawn(async move { dispatcher.cancel_all().await })
    };
    assert!(
        crate::test_support::wait_until(
            || h.dispatcher.in_flight() == Some(CommandKind::CancelAll),
            Duration::from_secs(1)
        )
        .await
    );

    let err = h.dispatcher.close_all().await.expect_err("in flight");
    assert_eq!(err, CommandError::InFlight(CommandKind::CancelAll));
    assert_eq!(FakeBackend::hits(&h.backend.state.close_hits), 0);

    assert_eq!(
        first.await.expect("join").expect("cancel"),
        CommandOutcome::Cancelled
    );
    assert_eq!(h.dispatcher.in_flight(), None);
    h.dispatcher.close_all().await.expect("slot released");
}

fn unreachable_api() -> Arc<dyn BackendApi> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    Arc::new(HttpBackend::new("http://127.0.0.1:1", Duration::from_millis(500)).expect("backend"))
}

#[tokio::test]
async fn start_without_a_backend_stays_stopped() {
    let h = harness_with(FakeBackend::spawn().await, unreachable_api());
    let err = h
        .dispatcher
        .start(StrategyConfig::default())
        .await
        .expect_err("no backend");
    assert!(matches!(err, CommandError::Transport(_)));
    assert_eq!(h.session.status(), SessionStatus::Stopped);

    let latest = h.latest_log().await;
    assert_eq!(latest.severity, Severity::Error);
    assert!(latest.text.starts_with(FAILURE_PREFIX));
}

#[tokio::test]
async fn stop_without_a_backend_still_stops() {
    let offline = harness_with(FakeBackend::spawn().await, unreachable_api());
    offline.session.confirm_started();

    let outcome = offline.dispatcher.stop().await.expect("stop");
    assert!(matches!(
        outcome,
        CommandOutcome::Stopped(StopReconciliation::Unverified(_))
    ));
    assert_eq!(offline.session.status(), SessionStatus::Stopped);

    let logs = offline.log.snapshot().await;
    assert!(logs
        .iter()
        .any(|entry| entry.severity == Severity::Warning && entry.text.contains("stop request")));
    assert_eq!(logs[0].severity, Severity::Warning);
    assert!(logs[0].text.contains("could not verify stop"));
}
