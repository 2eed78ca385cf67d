//! Run configuration and per-name utterance resolution.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::settings::SettingsError;

/// Volume applied when a run configuration omits it (percent).
pub const DEFAULT_VOLUME: u32 = 100;

/// Upper bound for run volume (percent).
pub const MAX_VOLUME: u32 = 100;

/// Playback speed applied when a run configuration omits it (percent).
pub const DEFAULT_SPEED: u32 = 100;

/// Upper bound for run speed (percent).
pub const MAX_SPEED: u32 = 200;

/// Which synthesis backend announces a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// On-device engine: synchronous, not thread-safe, no caching.
    Local,
    /// Remote provider: cached, retried, played through the playback queue.
    #[default]
    Network,
}

impl EngineKind {
    /// Wire label used in settings payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Network => "network",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "network" => Ok(Self::Network),
            other => Err(SettingsError::UnknownEngine(other.to_string())),
        }
    }
}

/// Per-run playback settings supplied by the host.
///
/// `volume` and `speed` are percentages. Speed is applied by resampling, so
/// 200 plays twice as fast and one octave higher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Output volume, 0–100.
    pub volume: u32,

    /// Playback speed, 0–200 (100 = normal).
    pub speed: u32,

    /// Engine preference recorded with the settings, if any.
    pub engine: Option<EngineKind>,

    /// Voice preference recorded with the settings, if any.
    pub voice_id: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            volume: DEFAULT_VOLUME,
            speed: DEFAULT_SPEED,
            engine: None,
            voice_id: None,
        }
    }
}

/// Alias, prefix and suffix configured for one raw name.
///
/// Looked up by raw name from the host's per-context settings. Empty fields
/// are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NameAnnouncement {
    pub prefix: String,
    pub alias: String,
    pub suffix: String,
}

impl NameAnnouncement {
    /// Build the utterance spoken for `raw_name`.
    ///
    /// The alias replaces the raw name when set; prefix and suffix are
    /// concatenated literally.
    #[must_use]
    pub fn utterance(&self, raw_name: &str) -> String {
        let body = if self.alias.is_empty() {
            raw_name
        } else {
            self.alias.as_str()
        };
        format!("{}{}{}", self.prefix, body, self.suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_kind_round_trip_labels() {
        assert_eq!("local".parse::<EngineKind>().unwrap(), EngineKind::Local);
        assert_eq!("network".parse::<EngineKind>().unwrap(), EngineKind::Network);
        assert!(matches!(
            "cloud".parse::<EngineKind>(),
            Err(SettingsError::UnknownEngine(e)) if e == "cloud"
        ));
    }

    #[test]
    fn test_utterance_uses_alias_prefix_suffix() {
        let entry = NameAnnouncement {
            prefix: "Congratulations ".to_string(),
            alias: "Ally".to_string(),
            suffix: "!".to_string(),
        };
        assert_eq!(entry.utterance("Alice"), "Congratulations Ally!");
    }

    #[test]
    fn test_utterance_falls_back_to_raw_name() {
        let entry = NameAnnouncement {
            suffix: " wins".to_string(),
            ..Default::default()
        };
        assert_eq!(entry.utterance("Bob"), "Bob wins");
    }
}
