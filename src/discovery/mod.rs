//! Discovered URLs
//!
//! Discovery hands the driver a flat, ordered list of [`DiscoveredUrl`]
//! records, read either from a plain URL list file or by walking a sitemap
//! (see [`sitemap`]). The same location may be named by several sources;
//! [`merge_by_location`] folds those into one entry per location.

pub mod sitemap;

use crate::url::normalize_url;
use crate::IngestError;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use tracing::{debug, warn};

pub use sitemap::{parse_sitemap, SitemapCrawler, SitemapDocument, SitemapEntry, SitemapError};

/// Kind of sitemap a location was found in
///
/// Only leaf entries are ever handed on, so an index never appears here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SitemapType {
    Urlset,
}

impl SitemapType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Urlset => "urlset",
        }
    }
}

/// One leaf URL entry from discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredUrl {
    pub location: String,
    pub last_modified: Option<String>,
    pub source_sitemap: String,
    pub sitemap_type: SitemapType,
}

impl DiscoveredUrl {
    pub fn new(location: impl Into<String>, source_sitemap: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            last_modified: None,
            source_sitemap: source_sitemap.into(),
            sitemap_type: SitemapType::Urlset,
        }
    }

    pub fn with_last_modified(mut self, last_modified: impl Into<String>) -> Self {
        self.last_modified = Some(last_modified.into());
        self
    }
}

/// Every record for one location folded together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedLocation {
    pub location: String,
    pub last_modified: Option<String>,
    pub sources: BTreeSet<String>,
}

/// Groups records by location, in order of first appearance
///
/// The greatest last-modified value among the records wins and their source
/// sitemaps are unioned.
pub fn merge_by_location(urls: &[DiscoveredUrl]) -> Vec<MergedLocation> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut merged: Vec<MergedLocation> = Vec::new();

    for url in urls {
        match positions.get(url.location.as_str()) {
            Some(&position) => {
                let entry = &mut merged[position];
                entry.sources.insert(url.source_sitemap.clone());
                // None sorts below any value
                if url.last_modified > entry.last_modified {
                    entry.last_modified = url.last_modified.clone();
                }
            }
            None => {
                positions.insert(url.location.as_str(), merged.len());
                merged.push(MergedLocation {
                    location: url.location.clone(),
                    last_modified: url.last_modified.clone(),
                    sources: BTreeSet::from([url.source_sitemap.clone()]),
                });
            }
        }
    }

    merged
}

/// Parses URL list text
///
/// One location per line, optionally followed by whitespace and a
/// last-modified value. Blank lines and `#` comments are ignored, invalid
/// locations are skipped with a warning, and the first occurrence of a
/// normalized location wins.
pub fn parse_url_list(text: &str, source: &str) -> Vec<DiscoveredUrl> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.split_whitespace();
        let Some(raw_location) = fields.next() else {
            continue;
        };

        let location = match normalize_url(raw_location) {
            Ok(location) => location,
            Err(e) => {
                warn!(source, line = line_no + 1, "Skipping invalid location: {}", e);
                continue;
            }
        };

        if !seen.insert(location.clone()) {
            debug!(source, %location, "Duplicate location ignored");
            continue;
        }

        let mut entry = DiscoveredUrl::new(location, source);
        if let Some(last_modified) = fields.next() {
            entry = entry.with_last_modified(last_modified);
        }
        urls.push(entry);
    }

    urls
}

/// Reads a URL list file
pub fn read_url_list(path: &Path) -> Result<Vec<DiscoveredUrl>, IngestError> {
    let text = std::fs::read_to_string(path)?;
    let source = path.display().to_string();
    Ok(parse_url_list(&text, &source))
}
