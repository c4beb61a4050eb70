use crate::discovery::CatalogEntry;
use crate::error::{HarvestError, Result};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use url::Url;

/// A retrieved binary package, owned by the pipeline for one item.
///
/// The backing scratch directory is deleted unconditionally after the
/// decompilation attempt, whatever its outcome.
#[derive(Debug, Clone)]
pub struct RetrievedArtifact {
    /// Identity of the catalog item the artifact belongs to
    pub identity: String,
    /// Location of the downloaded file on disk
    pub path: PathBuf,
    /// Size of the downloaded file in bytes
    pub size_bytes: u64,
}

// Storage-redirect links are site-relative; CDN-redirect links are absolute.
static STORAGE_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"href="(/r2\?u=[^"]+)""#).unwrap());

static CONTENT_DISPOSITION_FILENAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"filename="?([^";\n]+)"?"#).unwrap());

/// Resolves a direct download link from an item's download page and retrieves
/// the binary into the item's scratch directory.
pub struct ArtifactFetcher {
    client: Client,
    base_url: Url,
    apks_dir: PathBuf,
    download_timeout: Duration,
    min_artifact_bytes: u64,
    cdn_link_re: Regex,
}

impl ArtifactFetcher {
    /// Creates a fetcher rooted at the given scratch directory
    pub fn new(
        client: Client,
        base_url: Url,
        apks_dir: PathBuf,
        download_timeout: Duration,
        min_artifact_bytes: u64,
    ) -> Self {
        let host_prefix = regex::escape(base_url.as_str().trim_end_matches('/'));
        let cdn_link_re =
            Regex::new(&format!(r#"href="({}/d\?u=[^"]+)""#, host_prefix)).unwrap();
        Self {
            client,
            base_url,
            apks_dir,
            download_timeout,
            min_artifact_bytes,
            cdn_link_re,
        }
    }

    /// Downloads the item's artifact, replacing any previous scratch state.
    ///
    /// Every failure is terminal for this item's fetch attempt; the caller does
    /// not retry within a run.
    pub async fn fetch(&self, entry: &CatalogEntry) -> Result<RetrievedArtifact> {
        let scratch_dir = self.apks_dir.join(&entry.identity);
        if scratch_dir.exists() {
            fs::remove_dir_all(&scratch_dir).await?;
        }
        fs::create_dir_all(&scratch_dir).await?;

        let page_url = self
            .base_url
            .join(&format!("{}/download/apk", entry.reference_path))?;
        let body = self
            .client
            .get(page_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let download_url = self
            .pick_download_url(&body)
            .ok_or(HarvestError::NoDownloadLinks)?;

        info!("Downloading...");
        let response = self
            .client
            .get(download_url)
            .timeout(self.download_timeout)
            .send()
            .await?
            .error_for_status()?;

        let final_url = response.url().clone();
        let content_disposition = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let bytes = response.bytes().await?;

        let filename = sanitize_filename(&derive_filename(
            content_disposition.as_deref(),
            &final_url,
            &entry.identity,
        ));
        let dest = scratch_dir.join(&filename);
        fs::write(&dest, &bytes).await?;

        let size_bytes = bytes.len() as u64;
        let size_mb = size_bytes as f64 / (1024.0 * 1024.0);
        if size_bytes < self.min_artifact_bytes {
            fs::remove_file(&dest).await?;
            return Err(HarvestError::UndersizedArtifact { size_mb });
        }

        info!("Downloaded: {} ({:.1} MB)", filename, size_mb);
        Ok(RetrievedArtifact {
            identity: entry.identity.clone(),
            path: dest,
            size_bytes,
        })
    }

    /// Scans the download page for the two known link shapes, in priority
    /// order: the storage-redirect shape, then the CDN-redirect shape.
    fn pick_download_url(&self, body: &str) -> Option<String> {
        if let Some(caps) = STORAGE_LINK_RE.captures(body) {
            let href = unescape_html(&caps[1]);
            return self.base_url.join(&href).ok().map(|u| u.to_string());
        }
        if let Some(caps) = self.cdn_link_re.captures(body) {
            return Some(unescape_html(&caps[1]));
        }
        None
    }
}

/// Derives the artifact filename from the response metadata.
///
/// Preference order: content-disposition filename, then the final URL's last
/// path segment when it looks like a filename, then a synthesized name.
fn derive_filename(content_disposition: Option<&str>, final_url: &Url, identity: &str) -> String {
    if let Some(header) = content_disposition {
        if let Some(caps) = CONTENT_DISPOSITION_FILENAME_RE.captures(header) {
            let name = caps[1].trim();
            if !name.is_empty() {
                return name.to_string();
            }
        }
    }

    let last_segment = final_url
        .path_segments()
        .and_then(|segments| segments.last())
        .unwrap_or("");
    if last_segment.contains('.') {
        return last_segment.to_string();
    }

    format!("{}.apk", identity)
}

/// Replaces characters unsafe for the filesystem with underscores
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            _ => c,
        })
        .collect()
}

/// Unescapes the HTML entities that appear inside extracted href attributes
fn unescape_html(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
