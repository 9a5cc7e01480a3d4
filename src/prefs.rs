use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use tracing::{info, warn};

use crate::host::DimmingPreferences;

/// Delay used to arm the dim callback when the timeout is [`DimmingTimeout::Never`].
pub const NEVER_FALLBACK_DELAY: Duration = Duration::from_secs(10);

/// Reserved minute value meaning "never dim via the overlay".
pub const NEVER_SENTINEL_MINUTES: u32 = 0;

/// User-configured dimming timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimmingTimeout {
    /// Overlay dimming is off; the platform screensaver takes over instead.
    Never,
    After { minutes: u32 },
}

impl DimmingTimeout {
    pub fn from_minutes(minutes: u32) -> Self {
        if minutes == NEVER_SENTINEL_MINUTES {
            Self::Never
        } else {
            Self::After { minutes }
        }
    }

    pub fn is_never(self) -> bool {
        matches!(self, Self::Never)
    }

    /// Delay between arming the screensaver and the dim callback.
    pub fn dim_delay(self) -> Duration {
        match self {
            Self::Never => NEVER_FALLBACK_DELAY,
            Self::After { minutes } => Duration::from_secs(u64::from(minutes) * 60),
        }
    }
}

impl Default for DimmingTimeout {
    fn default() -> Self {
        Self::After { minutes: 5 }
    }
}

impl fmt::Display for DimmingTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Never => f.write_str("never"),
            Self::After { minutes } => write!(f, "{minutes}min"),
        }
    }
}

impl<'de> Deserialize<'de> for DimmingTimeout {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(DimmingTimeoutVisitor)
    }
}

struct DimmingTimeoutVisitor;

impl<'de> Visitor<'de> for DimmingTimeoutVisitor {
    type Value = DimmingTimeout;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a number of minutes or the keyword `never`")
    }

    fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        let minutes = u32::try_from(value)
            .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(value), &self))?;
        Ok(DimmingTimeout::from_minutes(minutes))
    }

    fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        let value = u64::try_from(value)
            .map_err(|_| E::invalid_value(de::Unexpected::Signed(value), &self))?;
        self.visit_u64(value)
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("never") {
            return Ok(DimmingTimeout::Never);
        }
        trimmed
            .parse::<u32>()
            .map(DimmingTimeout::from_minutes)
            .map_err(|_| E::invalid_value(de::Unexpected::Str(value), &self))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PreferencesFile {
    dimming_timeout: DimmingTimeout,
}

/// Persisted user settings consulted by the screensaver.
#[derive(Debug)]
pub struct PreferenceStore {
    path: Option<PathBuf>,
    timeout: Mutex<DimmingTimeout>,
}

impl PreferenceStore {
    /// Fixed preference with no backing file.
    pub fn fixed(timeout: DimmingTimeout) -> Self {
        Self {
            path: None,
            timeout: Mutex::new(timeout),
        }
    }

    /// Loads the preferences file, falling back to `default` when the file
    /// does not exist yet.
    pub fn open(path: impl Into<PathBuf>, default: DimmingTimeout) -> Result<Self> {
        let path = path.into();
        let timeout = if path.exists() {
            read_timeout(&path)?
        } else {
            info!(path = %path.display(), timeout = %default, "preferences file missing; using default");
            default
        };
        Ok(Self {
            path: Some(path),
            timeout: Mutex::new(timeout),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Re-reads the backing file. The previous value is kept when the file is
    /// unreadable.
    pub fn reload(&self) -> DimmingTimeout {
        let current = self.dimming_timeout();
        let Some(path) = self.path.as_deref() else {
            return current;
        };
        match read_timeout(path) {
            Ok(timeout) => {
                if timeout != current {
                    info!(from = %current, to = %timeout, "dimming timeout changed");
                }
                self.set(timeout);
                timeout
            }
            Err(err) => {
                warn!(path = %path.display(), error = ?err, "failed to reload preferences");
                current
            }
        }
    }

    pub fn set(&self, timeout: DimmingTimeout) {
        match self.timeout.lock() {
            Ok(mut guard) => *guard = timeout,
            Err(poisoned) => *poisoned.into_inner() = timeout,
        }
    }
}

impl DimmingPreferences for PreferenceStore {
    fn dimming_timeout(&self) -> DimmingTimeout {
        match self.timeout.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl DimmingPreferences for DimmingTimeout {
    fn dimming_timeout(&self) -> DimmingTimeout {
        *self
    }
}

fn read_timeout(path: &Path) -> Result<DimmingTimeout> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read preferences from {}", path.display()))?;
    let file: PreferencesFile = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse preferences in {}", path.display()))?;
    Ok(file.dimming_timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_minutes_and_never() {
        let t: DimmingTimeout = serde_yaml::from_str("5").unwrap();
        assert_eq!(t, DimmingTimeout::After { minutes: 5 });
        let t: DimmingTimeout = serde_yaml::from_str("never").unwrap();
        assert_eq!(t, DimmingTimeout::Never);
        let t: DimmingTimeout = serde_yaml::from_str("0").unwrap();
        assert_eq!(t, DimmingTimeout::Never);
        assert!(serde_yaml::from_str::<DimmingTimeout>("-3").is_err());
        assert!(serde_yaml::from_str::<DimmingTimeout>("soon").is_err());
    }

    #[test]
    fn dim_delay_uses_minutes_or_fallback() {
        assert_eq!(
            DimmingTimeout::After { minutes: 5 }.dim_delay(),
            Duration::from_millis(300_000)
        );
        assert_eq!(DimmingTimeout::Never.dim_delay(), NEVER_FALLBACK_DELAY);
    }

    #[test]
    fn reload_picks_up_changes_and_keeps_value_on_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "dimming-timeout: 15").unwrap();
        let store = PreferenceStore::open(file.path(), DimmingTimeout::default()).unwrap();
        assert_eq!(store.dimming_timeout(), DimmingTimeout::After { minutes: 15 });

        std::fs::write(file.path(), "dimming-timeout: never\n").unwrap();
        assert_eq!(store.reload(), DimmingTimeout::Never);

        std::fs::write(file.path(), "dimming-timeout: [").unwrap();
        assert_eq!(store.reload(), DimmingTimeout::Never);
        assert_eq!(store.dimming_timeout(), DimmingTimeout::Never);
    }

    #[test]
    fn missing_file_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferenceStore::open(
            dir.path().join("prefs.yaml"),
            DimmingTimeout::After { minutes: 2 },
        )
        .unwrap();
        assert_eq!(store.dimming_timeout(), DimmingTimeout::After { minutes: 2 });
        assert_eq!(store.reload(), DimmingTimeout::After { minutes: 2 });
    }
}
