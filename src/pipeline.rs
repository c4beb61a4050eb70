use crate::config::Config;
use crate::decompile::DecompileSupervisor;
use crate::discovery::{CatalogEntry, Discoverer};
use crate::error::Result;
use crate::fetch::ArtifactFetcher;
use crate::ledger::VersionLedger;
use crate::version::VersionOracle;
use log::{error, info, warn};
use reqwest::Client;
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

// The distribution site serves interstitial pages to obvious bots.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Outcome of processing one catalog item
#[derive(Debug, Clone)]
pub struct ItemOutcome {
    /// Identity of the processed item
    pub identity: String,
    /// Whether the item ended in the `Succeeded` terminal state
    pub succeeded: bool,
}

/// Aggregated outcomes of one pipeline run
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Per-item outcomes in processing order
    pub outcomes: Vec<ItemOutcome>,
}

impl RunSummary {
    /// Number of items that succeeded (including unchanged no-ops)
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded).count()
    }

    /// Number of items that failed
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Total number of processed items
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// True when any item failed; drives the process exit status
    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }
}

/// Sequences discovery, version diffing, retrieval, and decompilation across
/// catalog items.
///
/// Items are processed strictly one at a time; a failure in one item never
/// prevents processing of subsequent items.
pub struct Pipeline {
    config: Config,
    ledger: VersionLedger,
    discoverer: Discoverer,
    oracle: VersionOracle,
    fetcher: ArtifactFetcher,
    supervisor: DecompileSupervisor,
    threads: usize,
    force: bool,
    politeness_delay: Duration,
}

impl Pipeline {
    /// Builds a pipeline and its collaborators from the configuration.
    ///
    /// Creates the data directories if missing; fails only on unusable
    /// configuration, never on network state.
    pub fn new(config: Config, force: bool, threads: usize) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)?;
        config.ensure_directories_exist()?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.network.request_timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        let politeness_delay = Duration::from_millis(config.network.politeness_delay_ms);
        let ledger = VersionLedger::new(config.versions_dir());
        let discoverer = Discoverer::new(client.clone(), base_url.clone(), politeness_delay);
        let oracle = VersionOracle::new(client.clone(), base_url.clone());
        let fetcher = ArtifactFetcher::new(
            client,
            base_url,
            config.apks_dir(),
            Duration::from_secs(config.fetch.download_timeout_secs),
            config.fetch.min_artifact_bytes,
        );
        let supervisor = DecompileSupervisor::new(
            config.jadx_path(),
            config.tools_dir(),
            config.sources_dir(),
            config.decompile.clone(),
        );

        Ok(Self {
            config,
            ledger,
            discoverer,
            oracle,
            fetcher,
            supervisor,
            threads,
            force,
            politeness_delay,
        })
    }

    /// Read access to the version ledger, used by the list mode
    pub fn ledger(&self) -> &VersionLedger {
        &self.ledger
    }

    /// Discovers the catalog for the given developers
    pub async fn discover(&self, developers: &[String]) -> Vec<CatalogEntry> {
        self.discoverer.discover(developers).await
    }

    /// Processes every entry in order and aggregates the outcomes
    pub async fn run(&self, entries: &[CatalogEntry]) -> RunSummary {
        let mut summary = RunSummary::default();

        for (index, entry) in entries.iter().enumerate() {
            info!("{}", "=".repeat(60));
            info!(
                "[{}/{}] {} ({})",
                index + 1,
                entries.len(),
                entry.display_name,
                entry.identity
            );

            let succeeded = self.process_entry(entry).await;
            summary.outcomes.push(ItemOutcome {
                identity: entry.identity.clone(),
                succeeded,
            });
            sleep(self.politeness_delay).await;
        }

        summary
    }

    /// Runs one item through the state machine:
    /// check version, skip or fetch, decompile, persist, clean up.
    async fn process_entry(&self, entry: &CatalogEntry) -> bool {
        info!("Checking version...");
        let current_version = self.oracle.current_version(&entry.reference_path).await;

        match &current_version {
            Some(current) => {
                let stored = self.ledger.get(&entry.identity);
                info!("Current:  {}", current);
                info!("Stored:   {}", stored.as_deref().unwrap_or("(none)"));

                if stored.as_deref() == Some(current.as_str()) && !self.force {
                    info!("Version unchanged, skipping.");
                    return true;
                }
            }
            None => info!("Could not determine version, downloading anyway..."),
        }

        info!("Downloading APK...");
        let artifact = match self.fetcher.fetch(entry).await {
            Ok(artifact) => artifact,
            Err(e) => {
                error!("Download failed: {}", e);
                self.cleanup_scratch(&entry.identity).await;
                return false;
            }
        };

        info!("Decompiling...");
        let succeeded = match self.supervisor.decompile(&artifact, self.threads).await {
            Ok(()) => true,
            Err(e) => {
                error!("Decompilation failed: {}", e);
                false
            }
        };

        // Unknown-version successes are not persisted; the item is re-checked
        // on the next run rather than wrongly skipped.
        if succeeded {
            if let Some(version) = &current_version {
                match self.ledger.record(&entry.identity, version) {
                    Ok(()) => info!("Version saved."),
                    Err(e) => error!("Failed to persist version: {}", e),
                }
            }
        }

        self.cleanup_scratch(&entry.identity).await;
        succeeded
    }

    /// Deletes the item's scratch directory to bound disk usage
    async fn cleanup_scratch(&self, identity: &str) {
        let scratch_dir = self.config.apks_dir().join(identity);
        if !scratch_dir.exists() {
            return;
        }
        match tokio::fs::remove_dir_all(&scratch_dir).await {
            Ok(()) => info!("Cleaned up downloaded APK"),
            Err(e) => warn!("Failed to clean up {}: {}", scratch_dir.display(), e),
        }
    }
}
