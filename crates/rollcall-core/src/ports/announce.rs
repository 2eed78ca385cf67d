//! Announcement collaborator ports.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use super::PortError;
use crate::domain::NameAnnouncement;

/// Per-context lookup of alias/prefix/suffix settings, keyed by raw name.
#[cfg_attr(test, mockall::automock)]
pub trait NameSettingsPort: Send + Sync {
    /// Return the announcement settings for `name` within `context`, if any.
    fn lookup(&self, context: &str, name: &str) -> Option<NameAnnouncement>;
}

/// Resolve `name` to the utterance that should be spoken, falling back to
/// the raw name when the port has no entry for it.
pub fn resolve_utterance(port: &dyn NameSettingsPort, context: &str, name: &str) -> String {
    port.lookup(context, name)
        .map_or_else(|| name.to_string(), |entry| entry.utterance(name))
}

/// Global "announcements enabled" switch.
pub trait AnnouncementToggle: Send + Sync {
    fn is_enabled(&self) -> bool;
}

/// Optional side-effect hook that restores the system output volume before
/// a run is spoken.
pub trait SystemVolumePort: Send + Sync {
    fn apply_output_volume(&self) -> Result<(), PortError>;
}

// ── Default implementations ────────────────────────────────────────

/// Name settings port with no configured aliases.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoNameSettings;

impl NameSettingsPort for NoNameSettings {
    fn lookup(&self, _context: &str, _name: &str) -> Option<NameAnnouncement> {
        None
    }
}

/// Name settings held in memory, keyed by `(context, name)`.
#[derive(Debug, Default)]
pub struct InMemoryNameSettings {
    entries: RwLock<HashMap<(String, String), NameAnnouncement>>,
}

impl InMemoryNameSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the settings for one name.
    pub fn set(&self, context: &str, name: &str, entry: NameAnnouncement) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.insert((context.to_string(), name.to_string()), entry);
    }

    /// Remove the settings for one name.
    pub fn remove(&self, context: &str, name: &str) -> Option<NameAnnouncement> {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.remove(&(context.to_string(), name.to_string()))
    }
}

impl NameSettingsPort for InMemoryNameSettings {
    fn lookup(&self, context: &str, name: &str) -> Option<NameAnnouncement> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries
            .get(&(context.to_string(), name.to_string()))
            .cloned()
    }
}

/// Toggle backed by an atomic flag.
#[derive(Debug)]
pub struct StaticToggle(AtomicBool);

impl StaticToggle {
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self(AtomicBool::new(enabled))
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::SeqCst);
    }
}

impl Default for StaticToggle {
    fn default() -> Self {
        Self::new(true)
    }
}

impl AnnouncementToggle for StaticToggle {
    fn is_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Volume hook that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopVolumeHook;

impl SystemVolumePort for NoopVolumeHook {
    fn apply_output_volume(&self) -> Result<(), PortError> {
        Ok(())
    }
}
