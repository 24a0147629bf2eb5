//! Playlist data model, source parsing and output files.
//!
//! - [`types`] - the [`Channel`] record and its status/address family
//! - [`parser`] - M3U and `name,url` text sources into channels
//! - [`export`] - grouped TXT/M3U outputs and the failed-URL report

mod export;
mod parser;
mod types;

pub use export::{write_failed_urls, ExportSummary, Exporter};
pub use parser::parse_playlist;
pub use types::{Channel, IpFamily, Status, UNCATEGORIZED};
