//! Sitemap traversal
//!
//! A sitemap document is either an index naming child sitemaps or a urlset
//! naming documents. [`SitemapCrawler`] follows indexes depth first and hands
//! back the urlset entries in document order, each tagged with the sitemap it
//! was listed in. A sitemap that cannot be fetched or parsed is logged and
//! contributes nothing; the rest of the walk carries on.

use crate::config::{DiscoveryConfig, FetchConfig};
use crate::discovery::{DiscoveredUrl, SitemapType};
use crate::fetch::{build_http_client, Sleeper, TokioSleeper};
use crate::url::normalize_url;
use reqwest::Client;
use roxmltree::Node;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Namespace of the sitemaps.org protocol
pub const SITEMAP_NAMESPACE: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

/// Errors while loading a single sitemap document
#[derive(Debug, Error)]
pub enum SitemapError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("Malformed XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Unrecognized root element <{0}>")]
    UnknownRoot(String),
}

/// One `<url>` entry of a urlset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapEntry {
    pub location: String,
    pub last_modified: Option<String>,
}

/// A parsed sitemap document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapDocument {
    /// Child sitemap locations of a `<sitemapindex>`
    Index(Vec<String>),
    /// Entries of a `<urlset>`
    UrlSet(Vec<SitemapEntry>),
}

/// Parses a sitemap or sitemap index
///
/// Elements are matched by local name in the sitemaps.org namespace (or in no
/// namespace). Entries without a `<loc>` are dropped; `<loc>` and `<lastmod>`
/// text is trimmed.
pub fn parse_sitemap(xml: &str) -> Result<SitemapDocument, SitemapError> {
    let document = roxmltree::Document::parse(xml)?;
    let root = document.root_element();

    match root.tag_name().name() {
        "sitemapindex" => Ok(SitemapDocument::Index(
            sitemap_children(root, "sitemap")
                .filter_map(|sitemap| child_text(sitemap, "loc"))
                .collect(),
        )),
        "urlset" => Ok(SitemapDocument::UrlSet(
            sitemap_children(root, "url")
                .filter_map(|url| {
                    Some(SitemapEntry {
                        location: child_text(url, "loc")?,
                        last_modified: child_text(url, "lastmod"),
                    })
                })
                .collect(),
        )),
        other => Err(SitemapError::UnknownRoot(other.to_string())),
    }
}

fn sitemap_children<'a, 'input>(
    node: Node<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(move |child| is_sitemap_element(child, name))
}

fn is_sitemap_element(node: &Node, name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == name
        && matches!(node.tag_name().namespace(), None | Some(SITEMAP_NAMESPACE))
}

fn child_text(node: Node, name: &'static str) -> Option<String> {
    sitemap_children(node, name)
        .next()
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// Walks a sitemap tree over HTTP
pub struct SitemapCrawler<S = TokioSleeper> {
    client: Client,
    config: DiscoveryConfig,
    sleeper: S,
}

impl SitemapCrawler<TokioSleeper> {
    /// Creates a crawler sharing the fetch engine's request identity and timeout
    pub fn new(fetch: &FetchConfig, config: DiscoveryConfig) -> Result<Self, reqwest::Error> {
        Self::with_sleeper(fetch, config, TokioSleeper)
    }
}

impl<S: Sleeper> SitemapCrawler<S> {
    /// Creates a crawler that paces itself through `sleeper`
    pub fn with_sleeper(
        fetch: &FetchConfig,
        config: DiscoveryConfig,
        sleeper: S,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(fetch)?,
            config,
            sleeper,
        })
    }

    /// Returns every urlset entry reachable from `root`, in document order
    ///
    /// Each child sitemap of an index is followed by the configured pause.
    /// A sitemap already visited in this walk is not fetched again, and
    /// indexes deeper than `max_depth` are not followed. Locations are
    /// normalized; invalid ones are skipped with a warning.
    pub async fn discover(&self, root: &str) -> Vec<DiscoveredUrl> {
        let mut discovered = Vec::new();
        let mut visited = HashSet::new();
        let mut sitemaps_read = 0usize;
        // Children are pushed in reverse so they pop in document order
        let mut stack = vec![(root.to_string(), 0usize)];

        while let Some((sitemap, depth)) = stack.pop() {
            if !visited.insert(sitemap.clone()) {
                debug!(sitemap = %sitemap, "Sitemap already visited");
                continue;
            }

            match self.fetch_sitemap(&sitemap).await {
                Ok(SitemapDocument::Index(children)) => {
                    sitemaps_read += 1;
                    if depth >= self.config.max_depth {
                        warn!(
                            sitemap = %sitemap,
                            depth,
                            "Not following {} child sitemaps past the depth limit",
                            children.len()
                        );
                    } else {
                        debug!(sitemap = %sitemap, children = children.len(), "Read sitemap index");
                        stack.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
                    }
                }
                Ok(SitemapDocument::UrlSet(entries)) => {
                    sitemaps_read += 1;
                    debug!(sitemap = %sitemap, entries = entries.len(), "Read urlset");
                    discovered.extend(leaf_entries(&sitemap, entries));
                }
                Err(e) => warn!(sitemap = %sitemap, "Skipping sitemap: {}", e),
            }

            if depth > 0 {
                self.sleeper.sleep(self.config.child_delay()).await;
            }
        }

        info!(
            root,
            sitemaps = sitemaps_read,
            "Discovered {} URLs",
            discovered.len()
        );
        discovered
    }

    async fn fetch_sitemap(&self, url: &str) -> Result<SitemapDocument, SitemapError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SitemapError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        parse_sitemap(&body)
    }
}

fn leaf_entries(sitemap: &str, entries: Vec<SitemapEntry>) -> Vec<DiscoveredUrl> {
    entries
        .into_iter()
        .filter_map(|entry| match normalize_url(&entry.location) {
            Ok(location) => Some(DiscoveredUrl {
                location,
                last_modified: entry.last_modified,
                source_sitemap: sitemap.to_string(),
                sitemap_type: SitemapType::Urlset,
            }),
            Err(e) => {
                warn!(sitemap, location = %entry.location, "Skipping invalid location: {}", e);
                None
            }
        })
        .collect()
}
