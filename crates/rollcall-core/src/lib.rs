//! Core domain types and port definitions for rollcall.
//!
//! This crate holds everything the announcement subsystem shares with the
//! host application without depending on any audio or network stack:
//!
//! - [`domain`]: run configuration, engine selection, per-name aliasing
//! - [`ports`]: traits for the collaborators the host provides (alias
//!   lookup, global toggle, system volume hook)
//! - [`settings`]: validation of run configuration payloads
//! - [`paths`]: resolution of the on-disk voice cache directory

#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod paths;
pub mod ports;
pub mod settings;

pub use domain::{
    DEFAULT_SPEED, DEFAULT_VOLUME, EngineKind, MAX_SPEED, MAX_VOLUME, NameAnnouncement, RunConfig,
};
pub use paths::{PathError, default_voice_cache_dir, ensure_directory};
pub use ports::{
    AnnouncementToggle, InMemoryNameSettings, NameSettingsPort, NoNameSettings, NoopVolumeHook,
    PortError, StaticToggle, SystemVolumePort, resolve_utterance,
};
pub use settings::{SettingsError, parse_names, parse_run_config, validate_run_config};

