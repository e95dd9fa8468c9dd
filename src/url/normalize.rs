use crate::UrlError;
use url::Url;

/// Normalizes a discovered location for deduplication
///
/// # Normalization Steps
///
/// 1. Trim surrounding whitespace; reject empty or malformed input
/// 2. Accept only `http` and `https`
/// 3. Lowercase the scheme and host, drop the default port
/// 4. Normalize path:
///    - Remove dot segments (. and ..)
///    - Collapse duplicate slashes
///    - Remove trailing slash (except for root /)
///    - Re-encode consistently
/// 5. Remove fragment; the query string is kept as-is
///
/// # Examples
///
/// ```
/// use doc_ingest::url::normalize_url;
///
/// let url = normalize_url("  HTTPS://Docs.Example.COM:443//en/guide/ ").unwrap();
/// assert_eq!(url, "https://docs.example.com/en/guide");
/// ```
pub fn normalize_url(url_str: &str) -> Result<String, UrlError> {
    let trimmed = url_str.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Parse("empty URL".to_string()));
    }

    // Parsing lowercases scheme and host, drops default ports and resolves dot segments
    let mut url = Url::parse(trimmed).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingHost);
    }

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);
    url.set_fragment(None);

    Ok(url.to_string())
}

/// Normalizes a URL path by removing dot segments, empty segments and trailing slashes
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    format!("/{}", segments.join("/"))
}
