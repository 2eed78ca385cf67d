//! Port definitions for the collaborators the host application provides.
//!
//! The announcement subsystem never reaches into host state directly; every
//! external dependency is one of the traits below. All traits are
//! object-safe and `Send + Sync` so they can be shared as `Arc<dyn …>`
//! across the playback worker and the synthesis pool.

mod announce;

pub use announce::{
    AnnouncementToggle, InMemoryNameSettings, NameSettingsPort, NoNameSettings, NoopVolumeHook,
    StaticToggle, SystemVolumePort, resolve_utterance,
};

use thiserror::Error;

/// Error reported by a host-provided port.
#[derive(Debug, Error)]
pub enum PortError {
    /// The host rejected or could not complete the request.
    #[error("Host operation failed: {0}")]
    Host(String),

    /// The capability is not available on this platform.
    #[error("Unsupported on this platform: {0}")]
    Unsupported(String),
}
