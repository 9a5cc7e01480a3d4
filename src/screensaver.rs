use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::events::TimerKind;
use crate::host::{DimmingPreferences, HostHandle, PlatformScreensaver, PlaybackStatus};
use crate::timers::DelayedCallbacks;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreensaverState {
    Active,
    Dimmed,
    Blocked,
}

/// Collaborators the manager consults on every dim/undim.
#[derive(Clone)]
pub struct Collaborators {
    pub host: HostHandle,
    pub playback: Arc<dyn PlaybackStatus>,
    pub prefs: Arc<dyn DimmingPreferences>,
    pub platform: Arc<dyn PlatformScreensaver>,
}

/// Dims the screen after a period without user interaction or playback.
///
/// All methods run on the event loop that owns the manager; deadlines are
/// returned through [`ScreensaverManager::next_deadline`] and fired by
/// [`ScreensaverManager::run_due`].
pub struct ScreensaverManager {
    deps: Collaborators,
    callbacks: DelayedCallbacks<TimerKind>,
    blocked: bool,
    dimmed: bool,
    /// Set while the platform screensaver, not the overlay, is doing the dimming.
    platform_dimmed: bool,
}

impl ScreensaverManager {
    /// Suppresses the platform screensaver and arms the dim timer.
    pub fn new(deps: Collaborators, now: Instant) -> Self {
        deps.platform.disable();
        let mut manager = Self {
            deps,
            callbacks: DelayedCallbacks::new(),
            blocked: false,
            dimmed: false,
            platform_dimmed: false,
        };
        manager.enable(now);
        manager
    }

    pub fn enable(&mut self, now: Instant) {
        if self.blocked {
            return;
        }

        let timeout = self.deps.prefs.dimming_timeout();
        let delay = timeout.dim_delay();
        debug!(
            %timeout,
            delay = %humantime::format_duration(delay),
            "enable screensaver"
        );

        self.disable(now);
        self.callbacks.post(TimerKind::Dim, delay, now);
    }

    pub fn disable(&mut self, now: Instant) {
        if self.blocked {
            return;
        }

        debug!("disable screensaver");

        self.callbacks.cancel(TimerKind::Dim);
        self.callbacks.post(TimerKind::Undim, Duration::ZERO, now);
    }

    /// Freezes the current schedule. Nothing is cancelled or re-armed.
    pub fn set_blocked(&mut self, blocked: bool) {
        if self.blocked != blocked {
            debug!(blocked, "screensaver block changed");
        }
        self.blocked = blocked;
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub fn state(&self) -> ScreensaverState {
        if self.blocked {
            ScreensaverState::Blocked
        } else if self.dimmed {
            ScreensaverState::Dimmed
        } else {
            ScreensaverState::Active
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.callbacks.next_deadline()
    }

    /// Remaining delay of a pending callback.
    pub fn pending_delay(&self, kind: TimerKind, now: Instant) -> Option<Duration> {
        self.callbacks
            .deadline(kind)
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    pub fn pending_count(&self) -> usize {
        self.callbacks.len()
    }

    pub fn pending_of(&self, kind: TimerKind) -> usize {
        self.callbacks.count(kind)
    }

    /// Runs every callback whose deadline has passed. Returns how many ran.
    pub fn run_due(&mut self, now: Instant) -> usize {
        let mut ran = 0;
        while let Some(kind) = self.callbacks.pop_due(now) {
            trace!(?kind, "running screensaver callback");
            match kind {
                TimerKind::Dim => self.dim_screen(),
                TimerKind::Undim => self.undim_screen(),
            }
            ran += 1;
        }
        ran
    }

    /// Drops pending callbacks and undims immediately. Used on shutdown.
    pub fn release(&mut self) {
        self.callbacks.cancel(TimerKind::Dim);
        self.callbacks.cancel(TimerKind::Undim);
        self.undim_screen();
    }

    fn dim_screen(&mut self) {
        self.show_hide(true);
    }

    fn undim_screen(&mut self) {
        self.show_hide(false);
    }

    fn show_hide(&mut self, show: bool) {
        let Some(host) = self.deps.host.get() else {
            trace!(show, "host window gone; ignoring");
            return;
        };

        if show && self.deps.playback.is_playing() {
            debug!("playback active; not dimming");
            return;
        }

        let overlay = host
            .find_dim_overlay()
            .or_else(|| host.attach_dim_overlay());

        let never = self.deps.prefs.dimming_timeout().is_never();
        if show {
            if never {
                self.deps.platform.enable();
                self.platform_dimmed = true;
            } else if let Some(overlay) = overlay {
                overlay.set_visible(true);
            } else {
                trace!("no dim overlay available");
                return;
            }
        } else {
            // The timeout may have changed since the screen was dimmed, so
            // undo whichever mechanism is still active.
            let handed_off = never || self.platform_dimmed;
            if handed_off {
                self.deps.platform.disable();
                self.platform_dimmed = false;
            }
            match overlay {
                Some(overlay) if !never || overlay.is_visible() => overlay.set_visible(false),
                Some(_) => {}
                None if handed_off => {}
                None => {
                    trace!("no dim overlay available");
                    return;
                }
            }
        }

        self.dimmed = show;
    }
}

impl std::fmt::Debug for ScreensaverManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScreensaverManager")
            .field("host", &self.deps.host)
            .field("callbacks", &self.callbacks)
            .field("blocked", &self.blocked)
            .field("dimmed", &self.dimmed)
            .field("platform_dimmed", &self.platform_dimmed)
            .finish()
    }
}
