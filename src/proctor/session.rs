use super::machine::{Directive, ProctorEvent, ProctorMachine, ProctorState, Violation};
use super::{is_game_path, ProctorTimings, HOME_PATH};
use crate::device::DeviceState;
use crate::exit::ExitCapture;
use crate::host::{HostPage, Notice, NoticeKind, Severity};
use crate::progress::ProgressClient;
use crate::timer::{TimerDisplay, TimerTicker};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

struct Inner {
    machine: ProctorMachine,
    current_path: String,
    /// Pending Escape rechecks
    rechecks: Vec<JoinHandle<()>>,
    lock_poll: Option<JoinHandle<()>>,
    ticker: Option<TimerTicker>,
}

/// Proctoring for one connected page.
///
/// Feeds page events through the [`ProctorMachine`] and carries out its
/// directives on the [`HostPage`]. Clones share the same session.
#[derive(Clone)]
pub struct ProctorSession {
    inner: Arc<Mutex<Inner>>,
    host: Arc<dyn HostPage>,
    progress: ProgressClient,
    exit: ExitCapture,
    timings: ProctorTimings,
}

impl ProctorSession {
    pub fn new(host: Arc<dyn HostPage>, progress: ProgressClient, timings: ProctorTimings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                machine: ProctorMachine::new(timings),
                current_path: HOME_PATH.to_string(),
                rechecks: Vec::new(),
                lock_poll: None,
                ticker: None,
            })),
            exit: ExitCapture::new(progress.clone()),
            host,
            progress,
            timings,
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn device(&self) -> &DeviceState {
        self.progress.device()
    }

    pub fn state(&self) -> ProctorState {
        self.inner().machine.state()
    }

    pub fn is_armed(&self) -> bool {
        self.inner().machine.is_armed()
    }

    pub fn overlay_visible(&self) -> bool {
        self.inner().machine.overlay_visible()
    }

    pub fn current_path(&self) -> String {
        self.inner().current_path.clone()
    }

    /// The page finished loading `path`.
    ///
    /// A locked device gets the locked screen. Otherwise a session that was
    /// armed before a reload resumes on game pages. Returns whether proctoring
    /// is armed afterwards.
    pub fn page_loaded(&self, path: &str) -> bool {
        self.inner().current_path = path.to_string();

        if self.device().is_locked() {
            tracing::info!(path, "Page loaded on a locked device");
            self.host.show_system_locked();
            return false;
        }
        self.ensure_lock_poll();

        if self.device().is_session_active() && is_game_path(path) {
            if self.inner().machine.arm() {
                tracing::info!(path, "Resuming proctored session");
            }
            return true;
        }

        self.is_armed()
    }

    /// Player pressed "start": request fullscreen and begin monitoring.
    /// Calling it again while armed does nothing.
    pub fn start_session(&self) -> bool {
        if self.device().is_locked() {
            self.host.show_system_locked();
            return false;
        }

        if !self.inner().machine.arm() {
            return self.is_armed();
        }

        self.host.request_fullscreen();
        self.ensure_lock_poll();
        if let Err(e) = self.device().mark_session_active() {
            tracing::error!("Failed to persist session flag: {}", e);
        }
        tracing::info!("Proctored session started");
        true
    }

    /// Overlay button: ask the page to re-enter fullscreen
    pub fn return_to_fullscreen(&self) {
        if self.overlay_visible() {
            self.host.request_fullscreen();
        }
    }

    pub fn handle(&self, event: ProctorEvent) {
        let locked = self.device().is_locked();
        let directives = self.inner().machine.handle(event, locked);
        self.apply(directives);
    }

    fn apply(&self, directives: Vec<Directive>) {
        for directive in directives {
            match directive {
                Directive::Notify(notice) => self.host.show_notice(notice),
                Directive::SetOverlay(visible) => self.host.set_fullscreen_overlay(visible),
                Directive::PreventDefault => self.host.prevent_default(),
                Directive::ScheduleFullscreenRecheck(delay) => self.schedule_recheck(delay),
                Directive::BeginDisqualification(violation) => self.begin_disqualification(violation),
            }
        }
    }

    fn schedule_recheck(&self, delay: Duration) {
        let session = self.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            session.handle(ProctorEvent::FullscreenRecheck);
        });

        let mut inner = self.inner();
        inner.rechecks.retain(|t| !t.is_finished());
        inner.rechecks.push(task);
    }

    fn cancel_timers(inner: &mut Inner) {
        for task in inner.rechecks.drain(..) {
            task.abort();
        }
        inner.ticker = None;
    }

    /// The exit screen is up. After the grace delay the timer is stopped,
    /// the device locked and the player sent home.
    ///
    /// The task is not tracked: the lock must land even if the page goes away.
    fn begin_disqualification(&self, violation: Violation) {
        self.host.show_game_exited();
        Self::cancel_timers(&mut self.inner());

        let session = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(session.timings.disqualify_grace).await;
            session.complete_disqualification(violation).await;
        });
    }

    async fn complete_disqualification(&self, violation: Violation) {
        self.exit.stop_cached_timer().await;

        let device = self.device();
        if device.is_locked() {
            tracing::debug!("Device already locked, skipping");
        } else if let Err(e) = device.set_locked() {
            tracing::error!("Failed to lock device: {}", e);
        } else {
            tracing::warn!(?violation, "Device locked after disqualification");
        }

        if let Err(e) = device.clear_identity() {
            tracing::error!("Failed to clear cached player: {}", e);
        }
        if let Err(e) = device.clear_session() {
            tracing::error!("Failed to clear session flag: {}", e);
        }

        self.inner().current_path = HOME_PATH.to_string();
        self.host.navigate(HOME_PATH);
    }

    fn ensure_lock_poll(&self) {
        let mut inner = self.inner();
        if inner.lock_poll.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let session = self.clone();
        inner.lock_poll = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(session.timings.lock_poll);
            interval.tick().await;
            loop {
                interval.tick().await;
                if session.device().is_locked() {
                    session.lock_observed().await;
                    break;
                }
            }
        }));
    }

    /// The lock appeared while this page was open (another tab finished or
    /// was disqualified).
    async fn lock_observed(&self) {
        let directives = {
            let mut inner = self.inner();
            // Disqualification sends the player home itself
            if inner.machine.state() == ProctorState::Disqualified {
                return;
            }
            Self::cancel_timers(&mut inner);
            inner.machine.disarm()
        };
        self.apply(directives);

        tracing::info!("System lock detected");
        self.host.show_notice(Notice::new(
            NoticeKind::SystemLocked,
            "System Locked",
            "This device has been locked. Please contact the game administrator.",
            Severity::Destructive,
            self.timings.lock_notice,
        ));
        self.host.show_system_locked();

        tokio::time::sleep(self.timings.lock_redirect).await;
        let path = self.current_path();
        if path != HOME_PATH {
            self.inner().current_path = HOME_PATH.to_string();
            self.host.navigate(HOME_PATH);
        }
    }

    /// Show a countup timer on the page, replacing any previous one
    pub fn watch_timer(&self, display: TimerDisplay) {
        let host = self.host.clone();
        let ticker = display.spawn_ticker(
            self.progress.clock().clone(),
            self.device().clone(),
            move |reading| host.show_timer(&reading.text, reading.animating),
        );
        self.inner().ticker = Some(ticker);
    }

    /// The page is gone. Stops monitoring and every timer this page owns;
    /// a disqualification already under way still completes.
    pub fn teardown(&self) {
        let mut inner = self.inner();
        Self::cancel_timers(&mut inner);
        if let Some(task) = inner.lock_poll.take() {
            task.abort();
        }
        // The page cannot render an overlay change any more
        let _ = inner.machine.disarm();
    }
}
