pub mod overlay;
pub mod screensaver;
pub mod shell;
