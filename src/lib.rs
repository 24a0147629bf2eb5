//! chanlist: playlist aggregation with template-driven classification.
//!
//! Sources are fetched, parsed into [`playlist::Channel`]s, classified and
//! ordered by a rule [`template::Template`], speed-tested and written out as
//! grouped TXT/M3U playlists. [`pipeline::run`] drives one full pass.

pub mod config;
pub mod pipeline;
pub mod playlist;
pub mod probe;
pub mod template;
pub mod util;
