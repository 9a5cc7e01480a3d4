pub mod config;
pub mod events;
pub mod host;
pub mod platform;
pub mod prefs;
pub mod screensaver;
pub mod timers;
pub mod tasks {
    pub mod control;
    pub mod driver;
    pub mod input;
    pub mod prefs_watch;
}
