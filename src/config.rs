use crate::error::{HarvestError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Default distribution site the discoverer and fetcher talk to
pub const DEFAULT_BASE_URL: &str = "https://apkcombo.com";

/// Developer names tracked when no explicit list is configured
pub const DEFAULT_DEVELOPERS: &[&str] = &[
    "Google LLC",
    "Developed with Google",
    "Research at Google",
    "Red Hot Labs",
    "Google Samples",
    "Fitbit LLC",
    "Nest Labs Inc.",
    "Waymo LLC",
    "Waze",
];

/// Main configuration struct for the application
///
/// This structure holds the tracked developer list, the distribution site base
/// URL, the data directory layout, and the network and decompilation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the distribution site
    pub base_url: String,
    /// Ordered list of tracked developer names
    pub developers: Vec<String>,
    /// Root directory for downloaded artifacts, sources, versions, and tools
    pub data_dir: PathBuf,
    /// Network settings for page and artifact requests
    pub network: NetworkConfig,
    /// Artifact download settings
    pub fetch: FetchConfig,
    /// Decompiler invocation settings
    pub decompile: DecompileConfig,
}

/// Network settings for listing and detail page requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Timeout for listing/detail page requests, in seconds
    pub request_timeout_secs: u64,
    /// Politeness pause between page requests, vendors, and items, in milliseconds
    pub politeness_delay_ms: u64,
}

/// Artifact download settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Extended timeout for the binary download, in seconds
    pub download_timeout_secs: u64,
    /// Payloads below this size are rejected as interstitial/error pages
    pub min_artifact_bytes: u64,
}

/// Decompiler invocation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecompileConfig {
    /// Hard wall-clock limit on one decompiler invocation, in seconds
    pub timeout_secs: u64,
    /// Interval between output-directory polls, in seconds
    pub poll_interval_secs: u64,
    /// Minimum number of produced source files for a run to count as a success
    pub min_source_files: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            politeness_delay_ms: 500,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            download_timeout_secs: 300,
            min_artifact_bytes: 512 * 1024,
        }
    }
}

impl Default for DecompileConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 1800,
            poll_interval_secs: 10,
            min_source_files: 1,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            developers: DEFAULT_DEVELOPERS.iter().map(|d| d.to_string()).collect(),
            data_dir: PathBuf::from("."),
            network: NetworkConfig::default(),
            fetch: FetchConfig::default(),
            decompile: DecompileConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the default config file location
    ///
    /// If the config file doesn't exist, returns the default configuration.
    /// The config file is expected to be in TOML format.
    pub fn load() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| HarvestError::Config("Could not find config directory".into()))?;
        let config_path = config_dir.join("apkharvest").join("config.toml");

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|e| HarvestError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| HarvestError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Directory holding per-identity scratch directories for downloaded artifacts
    pub fn apks_dir(&self) -> PathBuf {
        self.data_dir.join("apks")
    }

    /// Directory holding per-identity decompiled source trees
    pub fn sources_dir(&self) -> PathBuf {
        self.data_dir.join("sources")
    }

    /// Directory holding per-identity version ledger files
    pub fn versions_dir(&self) -> PathBuf {
        self.data_dir.join("versions")
    }

    /// Directory holding the externally provisioned decompiler and runtime
    pub fn tools_dir(&self) -> PathBuf {
        self.data_dir.join("tools")
    }

    /// Path to the jadx launcher inside the tools directory
    pub fn jadx_path(&self) -> PathBuf {
        let launcher = if cfg!(windows) { "jadx.bat" } else { "jadx" };
        self.tools_dir().join("jadx").join("bin").join(launcher)
    }

    /// Ensures the data directories required by a run exist
    pub fn ensure_directories_exist(&self) -> Result<()> {
        for dir in [self.apks_dir(), self.sources_dir(), self.versions_dir()] {
            fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Resolves a developer name case-insensitively against the tracked list
    ///
    /// # Returns
    /// The canonical developer name, or a config error listing the valid names
    pub fn match_developer(&self, name: &str) -> Result<String> {
        self.developers
            .iter()
            .find(|d| d.eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| {
                HarvestError::Config(format!(
                    "Unknown developer '{}'. Valid developers: {}",
                    name,
                    self.developers.join(", ")
                ))
            })
    }
}
