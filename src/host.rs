use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::prefs::DimmingTimeout;

/// Top-level surface the dim overlay is placed on.
pub trait HostWindow: Send + Sync {
    /// Looks up a dim overlay previously attached to the root view.
    fn find_dim_overlay(&self) -> Option<Arc<dyn DimOverlay>>;

    /// Creates a dim overlay and adds it to the root view. Returns `None` when
    /// the root cannot host an overlay.
    fn attach_dim_overlay(&self) -> Option<Arc<dyn DimOverlay>>;
}

/// Semi-opaque layer drawn above the content to simulate dimming.
pub trait DimOverlay: Send + Sync {
    fn set_visible(&self, visible: bool);
    fn is_visible(&self) -> bool;
}

pub trait PlaybackStatus: Send + Sync {
    fn is_playing(&self) -> bool;
}

pub trait DimmingPreferences: Send + Sync {
    fn dimming_timeout(&self) -> DimmingTimeout;
}

/// Platform-level screensaver suppression switch.
pub trait PlatformScreensaver: Send + Sync {
    fn enable(&self);
    fn disable(&self);
}

/// Non-owning handle to the host window. Resolving fails once the host has
/// been torn down.
#[derive(Clone)]
pub struct HostHandle {
    window: Weak<dyn HostWindow>,
}

impl HostHandle {
    pub fn new(window: Weak<dyn HostWindow>) -> Self {
        Self { window }
    }

    pub fn from_arc<W: HostWindow + 'static>(window: &Arc<W>) -> Self {
        let window = Arc::downgrade(window);
        Self { window }
    }

    pub fn get(&self) -> Option<Arc<dyn HostWindow>> {
        self.window.upgrade()
    }
}

impl std::fmt::Debug for HostHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostHandle")
            .field("alive", &(self.window.strong_count() > 0))
            .finish()
    }
}

/// Playback flag flipped by the control channel.
#[derive(Debug, Default)]
pub struct PlaybackFlag {
    playing: AtomicBool,
}

impl PlaybackFlag {
    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::SeqCst);
    }
}

impl PlaybackStatus for PlaybackFlag {
    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;

    impl HostWindow for Bare {
        fn find_dim_overlay(&self) -> Option<Arc<dyn DimOverlay>> {
            None
        }

        fn attach_dim_overlay(&self) -> Option<Arc<dyn DimOverlay>> {
            None
        }
    }

    #[test]
    fn handle_expires_with_host() {
        let host = Arc::new(Bare);
        let handle = HostHandle::from_arc(&host);
        assert!(handle.get().is_some());
        drop(host);
        assert!(handle.get().is_none());
    }

    #[test]
    fn playback_flag_round_trips() {
        let flag = PlaybackFlag::default();
        assert!(!flag.is_playing());
        flag.set_playing(true);
        assert!(flag.is_playing());
    }
}
