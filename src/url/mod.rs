//! URL handling module for Driftnet
//!
//! This module provides URL normalization, base-URL extraction and the link
//! sanitation applied to every href the crawler discovers.

mod domain;
mod links;
mod normalize;

// Re-export main functions
pub use domain::base_url;
pub use links::sanitize_links;
pub use normalize::{normalize_parsed, normalize_url};
