//! Utility functions for common operations.
//!
//! This module provides reusable utilities for:
//!
//! - **Name cleaning**: whitespace and separator cleanup plus suffix stripping
//! - **Override lists**: whitelist/blacklist files matched against channels
//!
//! # Examples
//!
//! ```
//! use chanlist::util::{clean_name, EntryList};
//!
//! assert_eq!(clean_name("CCTV_1  HD"), "CCTV 1 HD");
//!
//! let whitelist = EntryList::parse("example.com\n");
//! assert!(whitelist.matches("Any", "http://example.com/live.m3u8"));
//! ```

mod lists;
mod text;

pub use lists::{EntryList, ListError};
pub use text::{clean_name, strip_suffixes};
