use crate::error::Result;
use log::{error, info};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

/// One discovered catalog item, immutable for the rest of the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Dot-segmented lowercase package identity, unique across the run
    pub identity: String,
    /// Human-readable name shown on the listing page
    pub display_name: String,
    /// Developer the entry was first discovered under
    pub vendor: String,
    /// Site-relative item path, without trailing slash
    pub reference_path: String,
}

// Package identities: 2+ segments separated by dots, lowercase + digits + underscores
static APP_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"href="(/[^"]+/([a-z][a-z0-9_]*(?:\.[a-z0-9_]+)+)/)""#).unwrap()
});

/// Scrapes developer listing pages to discover tracked packages
///
/// Pagination continues while the page body advertises a next page. A request
/// failure stops pagination for that developer only; other developers are
/// still processed.
pub struct Discoverer {
    client: Client,
    base_url: Url,
    politeness_delay: Duration,
}

impl Discoverer {
    /// Creates a discoverer against the given distribution site
    pub fn new(client: Client, base_url: Url, politeness_delay: Duration) -> Self {
        Self {
            client,
            base_url,
            politeness_delay,
        }
    }

    /// Discovers all packages published by the given developers, in order.
    ///
    /// The first occurrence of an identity wins; later occurrences under other
    /// developers or pages are dropped.
    pub async fn discover(&self, developers: &[String]) -> Vec<CatalogEntry> {
        let mut entries = Vec::new();
        let mut seen = HashSet::new();

        for developer in developers {
            self.discover_developer(developer, &mut entries, &mut seen)
                .await;
            sleep(self.politeness_delay).await;
        }

        entries
    }

    async fn discover_developer(
        &self,
        developer: &str,
        entries: &mut Vec<CatalogEntry>,
        seen: &mut HashSet<String>,
    ) {
        let dev_url = match self.base_url.join(&format!("developer/{}/", developer)) {
            Ok(url) => url,
            Err(e) => {
                error!("Invalid developer URL for {}: {}", developer, e);
                return;
            }
        };

        let mut page = 1u32;
        loop {
            let url = if page == 1 {
                dev_url.to_string()
            } else {
                format!("{}?page={}", dev_url, page)
            };
            info!("Fetching {} (page {})", developer, page);

            let body = match self.fetch_page(&url).await {
                Ok(body) => body,
                Err(e) => {
                    error!("  request failed: {}", e);
                    break;
                }
            };

            let links = extract_app_links(&body);
            if links.is_empty() {
                if page == 1 {
                    info!("  No apps found for {}", developer);
                }
                break;
            }

            let mut added = 0;
            for (raw_path, identity) in &links {
                if seen.insert(identity.clone()) {
                    let display_name = extract_display_name(&body, raw_path)
                        .unwrap_or_else(|| identity.clone());
                    entries.push(CatalogEntry {
                        identity: identity.clone(),
                        display_name,
                        vendor: developer.to_string(),
                        reference_path: raw_path.trim_end_matches('/').to_string(),
                    });
                    added += 1;
                }
            }
            info!("  Found {} new apps", added);

            if body.contains(&format!("?page={}", page + 1)) {
                page += 1;
                sleep(self.politeness_delay).await;
            } else {
                break;
            }
        }
    }

    async fn fetch_page(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

/// Extracts (raw item path, identity) pairs from a listing page body
fn extract_app_links(body: &str) -> Vec<(String, String)> {
    APP_LINK_RE
        .captures_iter(body)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}

/// Finds the display name textually associated with an item link.
///
/// The listing page renders the name in the first `<p>` element following the
/// anchor; absence is not an error, callers fall back to the identity.
fn extract_display_name(body: &str, raw_path: &str) -> Option<String> {
    let pattern = format!(
        r#"{}"?[^>]*>[\s\S]*?<p[^>]*>([^<]+)</p>"#,
        regex::escape(raw_path)
    );
    let re = Regex::new(&pattern).ok()?;
    re.captures(body)
        .map(|caps| caps[1].trim().to_string())
        .filter(|name| !name.is_empty())
}
