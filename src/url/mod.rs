//! URL handling for discovered locations
//!
//! Locations are normalized before they are stored so the same document
//! reached through two spellings is only fetched once.

mod normalize;

pub use normalize::normalize_url;
