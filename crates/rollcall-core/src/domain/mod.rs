//! Announcement domain types.
//!
//! Pure data types with no infrastructure dependencies.

mod announce;

pub use announce::{
    DEFAULT_SPEED, DEFAULT_VOLUME, EngineKind, MAX_SPEED, MAX_VOLUME, NameAnnouncement, RunConfig,
};
