//! Session timer actor
//!
//! One task owns the [`SessionTimerState`] and is its only writer. Everything
//! else talks to it through a [`SessionHandle`]:
//!
//! - activity and "stay logged in" requests go into the mailbox,
//! - a 1-second interval drives the countdown,
//! - keep-alive pings run as separate tasks and report back through the mailbox,
//! - expiry is broadcast to subscribers before navigating to the login page.
//!
//! The select loop is biased toward the mailbox, and the tick that would reach
//! zero first drains any queued messages, so a reset pending in the same cycle
//! always beats expiry.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::config::SessionSettings;
use crate::event::{ActivityKind, KeepAliveOutcome, SessionSignal};
use crate::keepalive::KeepAlive;
use crate::navigator::Navigator;
use crate::session::{SessionTimerState, TickOutcome, TimerSnapshot};
use crate::view::{NullView, TimerView};

const SIGNAL_BUFFER: usize = 16;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Mailbox message for the timer task
#[derive(Debug, Clone, PartialEq, Eq)]
enum TimerMessage {
    Activity(ActivityKind),
    StayLoggedIn,
    KeepAliveCompleted {
        instance: u64,
        outcome: KeepAliveOutcome,
    },
}

/// Why a timer task stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Countdown reached zero and the login page was opened
    Expired,
    /// Every handle was dropped (the client left the page)
    Closed,
}

/// Cloneable handle to a running session timer.
#[derive(Debug)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<TimerMessage>,
    /// Never read; only used to create subscribers, so the timer stays the
    /// sole sender and subscribers see the stream close when it stops
    signals: broadcast::Receiver<SessionSignal>,
    snapshots: watch::Receiver<TimerSnapshot>,
}

impl Clone for SessionHandle {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            signals: self.signals.resubscribe(),
            snapshots: self.snapshots.clone(),
        }
    }
}

impl SessionHandle {
    /// Report user activity. Returns false once the timer has stopped.
    pub fn activity(&self, kind: ActivityKind) -> bool {
        self.tx.send(TimerMessage::Activity(kind)).is_ok()
    }

    /// Send a keep-alive ping; the session resets when it completes, whatever the result.
    pub fn stay_logged_in(&self) -> bool {
        self.tx.send(TimerMessage::StayLoggedIn).is_ok()
    }

    /// Subscribe to session signals (expiry).
    pub fn subscribe(&self) -> SignalRx {
        SignalRx {
            rx: self.signals.resubscribe(),
        }
    }

    /// Latest published timer state.
    pub fn snapshot(&self) -> TimerSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that is notified after every tick and reset.
    pub fn snapshots(&self) -> watch::Receiver<TimerSnapshot> {
        self.snapshots.clone()
    }

    /// True once the timer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug)]
pub struct SignalRx {
    rx: broadcast::Receiver<SessionSignal>,
}

impl SignalRx {
    /// Next signal, or `None` once the timer has stopped.
    ///
    /// Lagging is skipped over; the only signal is idempotent.
    pub async fn recv(&mut self) -> Option<SessionSignal> {
        loop {
            match self.rx.recv().await {
                Ok(signal) => return Some(signal),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// The countdown task. Build with [`SessionTimer::new`], then [`spawn`](Self::spawn) or
/// [`run`](Self::run) it.
pub struct SessionTimer<K: KeepAlive> {
    instance: u64,
    state: SessionTimerState,
    keep_alive: Arc<K>,
    navigator: Arc<dyn Navigator>,
    view: Box<dyn TimerView>,
    login_url: String,
    rx: mpsc::UnboundedReceiver<TimerMessage>,
    /// Weak so that dropping every handle closes the mailbox
    tx: mpsc::WeakUnboundedSender<TimerMessage>,
    signals: broadcast::Sender<SessionSignal>,
    snapshots: watch::Sender<TimerSnapshot>,
}

impl<K: KeepAlive> SessionTimer<K> {
    pub fn new(
        settings: SessionSettings,
        keep_alive: Arc<K>,
        navigator: Arc<dyn Navigator>,
        login_url: impl Into<String>,
    ) -> (Self, SessionHandle) {
        let state = SessionTimerState::new(settings.sanitized());
        let (tx, rx) = mpsc::unbounded_channel();
        let (signals, signals_rx) = broadcast::channel(SIGNAL_BUFFER);
        let (snapshots_tx, snapshots_rx) = watch::channel(state.snapshot());

        let timer = Self {
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            state,
            keep_alive,
            navigator,
            view: Box::new(NullView),
            login_url: login_url.into(),
            rx,
            tx: tx.downgrade(),
            signals,
            snapshots: snapshots_tx,
        };
        let handle = SessionHandle {
            tx,
            signals: signals_rx,
            snapshots: snapshots_rx,
        };
        (timer, handle)
    }

    pub fn with_view(mut self, view: Box<dyn TimerView>) -> Self {
        self.view = view;
        self
    }

    pub fn spawn(self) -> JoinHandle<SessionEnd> {
        tokio::spawn(self.run())
    }

    /// Drive the countdown until expiry or until every handle is dropped.
    pub async fn run(mut self) -> SessionEnd {
        let period = self.state.settings().tick_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            instance = self.instance,
            duration_secs = self.state.remaining(),
            "session timer started"
        );
        self.publish();

        loop {
            tokio::select! {
                biased;

                msg = self.rx.recv() => match msg {
                    Some(msg) => self.handle(msg),
                    None => {
                        debug!(instance = self.instance, "all session handles dropped");
                        return SessionEnd::Closed;
                    }
                },

                _ = ticker.tick() => {
                    if let Some(end) = self.on_tick() {
                        return end;
                    }
                }
            }
        }
    }

    fn handle(&mut self, msg: TimerMessage) {
        match msg {
            TimerMessage::Activity(kind) => {
                trace!(?kind, "activity");
                self.reset("activity");
            }

            TimerMessage::StayLoggedIn => self.start_keep_alive(),

            TimerMessage::KeepAliveCompleted { instance, outcome } => {
                if instance != self.instance {
                    debug!(instance, "ignoring keep-alive completion from another session");
                    return;
                }
                debug!(success = outcome.is_success(), "keep-alive completed");
                if let KeepAliveOutcome::Failure(reason) = &outcome {
                    warn!(%reason, "keep-alive failed, resetting anyway");
                }
                self.reset("keep-alive");
            }
        }
    }

    fn on_tick(&mut self) -> Option<SessionEnd> {
        if self.state.expires_on_next_tick() {
            while let Ok(msg) = self.rx.try_recv() {
                self.handle(msg);
            }
        }

        let outcome = self.state.tick();
        self.publish();

        match outcome {
            TickOutcome::Ticked { remaining } => trace!(remaining, "tick"),
            TickOutcome::WarningShown { remaining } => {
                info!(remaining, "session expiry warning shown");
            }
            TickOutcome::Expired => {
                self.expire();
                return Some(SessionEnd::Expired);
            }
            TickOutcome::Ignored => {}
        }
        None
    }

    fn reset(&mut self, cause: &'static str) {
        if self.state.reset() {
            debug!(cause, "session reset");
            self.publish();
        } else {
            debug!(cause, "reset ignored, session already expired");
        }
    }

    fn start_keep_alive(&self) {
        if self.state.is_expired() {
            return;
        }
        if !self.state.modal().is_visible() {
            debug!("keep-alive requested without a visible warning");
        }
        info!(instance = self.instance, "sending keep-alive");

        let keep_alive = Arc::clone(&self.keep_alive);
        let tx = self.tx.clone();
        let instance = self.instance;
        tokio::spawn(async move {
            let outcome = keep_alive.ping().await;
            let delivered = tx.upgrade().is_some_and(|tx| {
                tx.send(TimerMessage::KeepAliveCompleted { instance, outcome })
                    .is_ok()
            });
            if !delivered {
                debug!(instance, "late keep-alive completion ignored");
            }
        });
    }

    fn expire(&mut self) {
        info!(instance = self.instance, "session expired");

        let receivers = self.signals.send(SessionSignal::SessionExpired).unwrap_or(0);
        debug!(receivers, "session-expired signal sent");

        if let Err(e) = self.navigator.navigate(&self.login_url) {
            warn!("Failed to open login page {}: {}", self.login_url, e);
        }
    }

    fn publish(&mut self) {
        let snapshot = self.state.snapshot();
        self.view.render(&snapshot);
        self.snapshots.send_replace(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct NeverPinged;

    impl KeepAlive for NeverPinged {
        async fn ping(&self) -> KeepAliveOutcome {
            unreachable!("keep-alive not expected")
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

    fn short_settings() -> SessionSettings {
        SessionSettings {
            duration_secs: 3,
            warning_secs: 2,
            urgent_secs: 2,
            ..SessionSettings::default()
        }
    }

    fn timer() -> (
        SessionTimer<NeverPinged>,
        SessionHandle,
        Arc<RecordingNavigator>,
    ) {
        let navigator = Arc::new(RecordingNavigator::default());
        let (timer, handle) = SessionTimer::new(
            short_settings(),
            Arc::new(NeverPinged),
            navigator.clone(),
            "http://localhost/admin/login",
        );
        (timer, handle, navigator)
    }

    #[test]
    fn pending_reset_beats_expiring_tick() {
        let (mut timer, handle, navigator) = timer();
        assert_eq!(timer.on_tick(), None);
        assert_eq!(timer.on_tick(), None);
        assert!(timer.state.expires_on_next_tick());

        // Queued but not yet processed when the expiring tick fires.
        assert!(handle.activity(ActivityKind::Scroll));
        assert_eq!(timer.on_tick(), None);

        assert_eq!(timer.state.remaining(), 2);
        assert!(!timer.state.is_expired());
        assert!(navigator.visited.lock().unwrap().is_empty());
    }

    #[test]
    fn expiring_tick_without_reset() {
        let (mut timer, handle, navigator) = timer();
        let mut signals = handle.subscribe();

        timer.on_tick();
        timer.on_tick();
        assert_eq!(timer.on_tick(), Some(SessionEnd::Expired));

        assert_eq!(
            signals.rx.try_recv().unwrap(),
            SessionSignal::SessionExpired
        );
        assert!(signals.rx.try_recv().is_err());
        assert_eq!(
            *navigator.visited.lock().unwrap(),
            vec!["http://localhost/admin/login".to_string()]
        );
        assert!(handle.snapshot().remaining_secs == 0);
    }

    #[test]
    fn keep_alive_from_other_instance_ignored() {
        let (mut timer, _handle, _navigator) = timer();
        timer.on_tick();
        timer.handle(TimerMessage::KeepAliveCompleted {
            instance: timer.instance + 1,
            outcome: KeepAliveOutcome::Success,
        });
        assert_eq!(timer.state.remaining(), 2);

        timer.handle(TimerMessage::KeepAliveCompleted {
            instance: timer.instance,
            outcome: KeepAliveOutcome::Failure("503".into()),
        });
        assert_eq!(timer.state.remaining(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_tick_interval_is_clamped() {
        let settings = SessionSettings {
            tick_millis: 0,
            ..short_settings()
        };
        let navigator = Arc::new(RecordingNavigator::default());
        let (timer, _handle) = SessionTimer::new(
            settings,
            Arc::new(NeverPinged),
            navigator.clone(),
            "http://localhost/admin/login",
        );
        assert_eq!(timer.state.settings().tick_millis, 1);

        assert_eq!(timer.spawn().await.unwrap(), SessionEnd::Expired);
        assert_eq!(navigator.visited.lock().unwrap().len(), 1);
    }

    #[test]
    fn snapshots_published_on_tick_and_reset() {
        let (mut timer, handle, _navigator) = timer();
        timer.on_tick();
        assert_eq!(handle.snapshot().remaining_secs, 2);
        assert!(handle.snapshot().modal_visible);

        timer.handle(TimerMessage::Activity(ActivityKind::Click));
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.remaining_secs, 3);
        assert!(!snapshot.modal_visible);
    }
}
