use medguard::activity::ActivityMonitor;
use medguard::config::SessionSettings;
use medguard::keepalive::KeepAlive;
use medguard::navigator::Navigator;
use medguard::timer::{SessionEnd, SessionHandle, SessionTimer};
use medguard::{ActivityKind, KeepAliveOutcome, SessionPhase, SessionSignal, UrgencyTier};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};

const LOGIN_URL: &str = "http://127.0.0.1:5000/admin/login";

struct FakeKeepAlive {
    outcome: KeepAliveOutcome,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeKeepAlive {
    fn new(outcome: KeepAliveOutcome, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            delay,
            calls: AtomicUsize::new(0),
        })
    }
}

impl KeepAlive for FakeKeepAlive {
    async fn ping(&self) -> KeepAliveOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        sleep(self.delay).await;
        self.outcome.clone()
    }
}

#[derive(Default)]
struct RecordingNavigator {
    visited: Mutex<Vec<String>>,
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, url: &str) -> std::io::Result<()> {
        self.visited.lock().unwrap().push(url.to_string());
        Ok(())
    }

    fn open_in_new_tab(&self, url: &str) -> std::io::Result<()> {
        self.navigate(url)
    }
}

struct Harness {
    handle: SessionHandle,
    task: JoinHandle<SessionEnd>,
    navigator: Arc<RecordingNavigator>,
    keep_alive: Arc<FakeKeepAlive>,
}

fn start(keep_alive: Arc<FakeKeepAlive>) -> Harness {
    start_with(SessionSettings::default(), keep_alive)
}

fn start_with(settings: SessionSettings, keep_alive: Arc<FakeKeepAlive>) -> Harness {
    let navigator = Arc::new(RecordingNavigator::default());
    let (timer, handle) =
        SessionTimer::new(settings, keep_alive.clone(), navigator.clone(), LOGIN_URL);
    Harness {
        handle,
        task: timer.spawn(),
        navigator,
        keep_alive,
    }
}

fn ok_keep_alive() -> Arc<FakeKeepAlive> {
    FakeKeepAlive::new(KeepAliveOutcome::Success, Duration::ZERO)
}

async fn wait_for_remaining(handle: &SessionHandle, secs: u32) {
    let mut snapshots = handle.snapshots();
    snapshots
        .wait_for(|s| s.remaining_secs == secs)
        .await
        .expect("timer stopped early");
}

#[tokio::test(start_paused = true)]
async fn ticks_count_down_once_per_second() {
    let h = start(ok_keep_alive());

    sleep(Duration::from_millis(10_500)).await;
    let snapshot = h.handle.snapshot();
    assert_eq!(snapshot.remaining_secs, 290);
    assert_eq!(snapshot.clock, "04:50");
    assert_eq!(snapshot.urgency, UrgencyTier::Normal);
    assert!(!snapshot.modal_visible);
}

#[tokio::test(start_paused = true)]
async fn warning_appears_at_thirty_and_tracks_countdown() {
    let h = start(ok_keep_alive());

    // 270 ticks
    wait_for_remaining(&h.handle, 30).await;
    let snapshot = h.handle.snapshot();
    assert!(snapshot.modal_visible);
    assert_eq!(snapshot.modal_secs, Some(30));
    assert_eq!(snapshot.urgency, UrgencyTier::Urgent);

    // one more tick
    wait_for_remaining(&h.handle, 29).await;
    let snapshot = h.handle.snapshot();
    assert!(snapshot.modal_visible);
    assert_eq!(snapshot.modal_secs, Some(29));
}

#[tokio::test(start_paused = true)]
async fn activity_resets_from_warning() {
    let h = start(ok_keep_alive());
    wait_for_remaining(&h.handle, 30).await;

    assert!(h.handle.activity(ActivityKind::Click));
    wait_for_remaining(&h.handle, 300).await;

    let snapshot = h.handle.snapshot();
    assert!(!snapshot.modal_visible);
    assert_eq!(snapshot.modal_secs, None);
    assert_eq!(snapshot.urgency, UrgencyTier::Normal);
}

#[tokio::test(start_paused = true)]
async fn every_activity_kind_resets() {
    let h = start(ok_keep_alive());
    for kind in ActivityKind::ALL {
        wait_for_remaining(&h.handle, 295).await;
        assert!(h.handle.activity(kind));
        wait_for_remaining(&h.handle, 300).await;
    }
}

#[tokio::test(start_paused = true)]
async fn expires_once_after_full_duration() {
    let started = Instant::now();
    let h = start(ok_keep_alive());
    let mut signals = h.handle.subscribe();

    assert_eq!(signals.recv().await, Some(SessionSignal::SessionExpired));
    assert!(started.elapsed() >= Duration::from_secs(300));

    assert_eq!(h.task.await.unwrap(), SessionEnd::Expired);
    assert_eq!(signals.recv().await, None);

    assert_eq!(*h.navigator.visited.lock().unwrap(), vec![LOGIN_URL.to_string()]);

    let snapshot = h.handle.snapshot();
    assert_eq!(snapshot.remaining_secs, 0);
    assert_eq!(snapshot.phase, SessionPhase::Expired);
    assert!(!snapshot.modal_visible);

    // Nothing reaches a stopped session.
    assert!(!h.handle.activity(ActivityKind::Click));
    assert!(h.handle.is_closed());
}

#[tokio::test(start_paused = true)]
async fn keep_alive_success_resets() {
    let h = start(ok_keep_alive());
    wait_for_remaining(&h.handle, 30).await;

    assert!(h.handle.stay_logged_in());
    wait_for_remaining(&h.handle, 300).await;

    assert!(!h.handle.snapshot().modal_visible);
    assert_eq!(h.keep_alive.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn keep_alive_failure_still_resets() {
    let keep_alive = FakeKeepAlive::new(
        KeepAliveOutcome::Failure("503 Service Unavailable".into()),
        Duration::ZERO,
    );
    let h = start(keep_alive);
    wait_for_remaining(&h.handle, 30).await;

    assert!(h.handle.stay_logged_in());
    wait_for_remaining(&h.handle, 300).await;

    assert!(!h.handle.snapshot().modal_visible);
    assert_eq!(h.keep_alive.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn ticks_continue_while_keep_alive_outstanding() {
    let keep_alive = FakeKeepAlive::new(KeepAliveOutcome::Success, Duration::from_millis(3_500));
    let h = start(keep_alive);
    wait_for_remaining(&h.handle, 30).await;

    h.handle.stay_logged_in();
    wait_for_remaining(&h.handle, 27).await;
    let snapshot = h.handle.snapshot();
    assert!(snapshot.modal_visible);
    assert_eq!(snapshot.modal_secs, Some(27));

    wait_for_remaining(&h.handle, 300).await;
    assert!(!h.handle.snapshot().modal_visible);
}

#[tokio::test(start_paused = true)]
async fn slow_keep_alive_loses_to_expiry() {
    let keep_alive = FakeKeepAlive::new(KeepAliveOutcome::Success, Duration::from_secs(60));
    let h = start(keep_alive);
    wait_for_remaining(&h.handle, 30).await;

    h.handle.stay_logged_in();
    assert_eq!(h.task.await.unwrap(), SessionEnd::Expired);

    // Let the ping finish; its completion has nowhere to go.
    sleep(Duration::from_secs(60)).await;
    let snapshot = h.handle.snapshot();
    assert_eq!(snapshot.phase, SessionPhase::Expired);
    assert_eq!(snapshot.remaining_secs, 0);
    assert_eq!(h.keep_alive.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.navigator.visited.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_handles_closes_session() {
    let Harness {
        handle,
        task,
        navigator,
        ..
    } = start(ok_keep_alive());
    drop(handle);

    assert_eq!(task.await.unwrap(), SessionEnd::Closed);
    assert!(navigator.visited.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn short_session_from_settings() {
    let settings = SessionSettings {
        duration_secs: 5,
        warning_secs: 2,
        urgent_secs: 3,
        tick_millis: 100,
        ..SessionSettings::default()
    };
    let started = Instant::now();
    let h = start_with(settings, ok_keep_alive());

    assert_eq!(h.task.await.unwrap(), SessionEnd::Expired);
    assert_eq!(started.elapsed(), Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn activity_monitor_forwards_every_event_by_default() {
    let h = start(ok_keep_alive());
    let mut monitor = ActivityMonitor::new(h.handle.clone(), &SessionSettings::default());

    assert!(monitor.observe(ActivityKind::Mousemove));
    assert!(monitor.observe(ActivityKind::Mousemove));
    assert!(monitor.observe(ActivityKind::Keypress));
}

#[tokio::test(start_paused = true)]
async fn activity_monitor_debounce_within_one_tick() {
    let settings = SessionSettings {
        activity_debounce_millis: 250,
        ..SessionSettings::default()
    };
    let h = start_with(settings, ok_keep_alive());
    let mut monitor = ActivityMonitor::new(h.handle.clone(), &settings);

    wait_for_remaining(&h.handle, 298).await;
    assert!(monitor.observe(ActivityKind::Mousemove));
    assert!(!monitor.observe(ActivityKind::Mousemove));

    sleep(Duration::from_millis(300)).await;
    assert!(monitor.observe(ActivityKind::Scroll));
    wait_for_remaining(&h.handle, 300).await;
}

#[tokio::test(start_paused = true)]
async fn activity_monitor_forwards_after_a_tick_inside_the_window() {
    let settings = SessionSettings {
        activity_debounce_millis: 1_000,
        ..SessionSettings::default()
    };
    let h = start_with(settings, ok_keep_alive());
    let mut monitor = ActivityMonitor::new(h.handle.clone(), &settings);

    sleep(Duration::from_millis(500)).await;
    assert!(monitor.observe(ActivityKind::Click));

    // The tick at 1s lands half a window after the last reset.
    wait_for_remaining(&h.handle, 299).await;
    assert!(monitor.observe(ActivityKind::Mousemove));
    wait_for_remaining(&h.handle, 300).await;

    assert!(!monitor.observe(ActivityKind::Mousemove));
    assert_eq!(h.handle.snapshot().remaining_secs, 300);
}

#[tokio::test(start_paused = true)]
async fn activity_monitor_debounce_capped_at_tick() {
    let settings = SessionSettings {
        tick_millis: 1000,
        activity_debounce_millis: 10_000,
        ..SessionSettings::default()
    };
    let h = start_with(settings, ok_keep_alive());
    let mut monitor = ActivityMonitor::new(h.handle.clone(), &settings);

    assert!(monitor.observe(ActivityKind::Click));
    sleep(Duration::from_millis(1_000)).await;
    assert!(monitor.observe(ActivityKind::Click));
}
