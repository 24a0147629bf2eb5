//! Rule-template classification.
//!
//! A template is a text file of category headers followed by rule lines:
//!
//! ```text
//! #suffixes:HD,高清
//! 央视,#genre#
//! CCTV-1|CCTV1|中央一套
//! CCTV-2
//! ```
//!
//! - [`compiler`] turns the file into a [`Template`]: ordered categories with
//!   their regex rules, the alias table and the canonical sort order
//! - [`classifier`] matches and normalizes channel names against a template,
//!   with per-instance caches, and sorts channels into template order

mod classifier;
mod compiler;

pub use classifier::{CacheStats, Classifier, ClassifierOptions};
pub use compiler::{Category, RuleError, Template, TemplateError, DEFAULT_SUFFIXES};
