use crate::error::Result;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use url::Url;

/// One way of pulling a published version string out of a detail page body.
///
/// Strategies are applied in order and the first non-empty match wins, so the
/// matching can be swapped or extended without touching pipeline logic.
pub trait VersionStrategy: Send + Sync {
    /// Short name used in trace output
    fn name(&self) -> &'static str;
    /// Attempts to extract a version string from the page body
    fn extract(&self, body: &str) -> Option<String>;
}

static STRUCTURED_VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""softwareVersion"\s*:\s*"([^"]+)""#).unwrap());

static LABELED_VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"class="version"[^>]*>([^<]+)<"#).unwrap());

/// Reads the embedded structured-data "softwareVersion" field
struct StructuredField;

impl VersionStrategy for StructuredField {
    fn name(&self) -> &'static str {
        "structured softwareVersion field"
    }

    fn extract(&self, body: &str) -> Option<String> {
        STRUCTURED_VERSION_RE
            .captures(body)
            .map(|caps| caps[1].trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// Falls back to the version-labeled element in the page header area
struct LabeledElement;

impl VersionStrategy for LabeledElement {
    fn name(&self) -> &'static str {
        "version-labeled element"
    }

    fn extract(&self, body: &str) -> Option<String> {
        LABELED_VERSION_RE
            .captures(body)
            .map(|caps| caps[1].trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// Fetches an item's detail page and extracts its currently published version
pub struct VersionOracle {
    client: Client,
    base_url: Url,
    strategies: Vec<Box<dyn VersionStrategy>>,
}

impl VersionOracle {
    /// Creates an oracle with the default strategy order
    pub fn new(client: Client, base_url: Url) -> Self {
        Self {
            client,
            base_url,
            strategies: vec![Box::new(StructuredField), Box::new(LabeledElement)],
        }
    }

    /// Returns the version currently published for the item, or `None` when
    /// the request fails or no strategy matches. Never fatal to the run.
    pub async fn current_version(&self, reference_path: &str) -> Option<String> {
        let body = match self.fetch_detail_page(reference_path).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Version check failed: {}", e);
                return None;
            }
        };

        for strategy in &self.strategies {
            if let Some(version) = strategy.extract(&body) {
                debug!("Version {} via {}", version, strategy.name());
                return Some(version);
            }
        }
        None
    }

    async fn fetch_detail_page(&self, reference_path: &str) -> Result<String> {
        let url = self.base_url.join(reference_path)?;
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}
