use crate::config::DecompileConfig;
use crate::dex;
use crate::error::{HarvestError, Result};
use crate::fetch::RetrievedArtifact;
use crate::process::{run_supervised, SupervisedOutput};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task;
use tokio::time::sleep;
use walkdir::WalkDir;

/// Invokes the external decompiler over a retrieved artifact while a
/// background monitor reports progress from the growing output directory.
///
/// Success is judged solely by the filesystem side effect: the decompiler can
/// exit non-zero and still produce a usable partial source tree.
pub struct DecompileSupervisor {
    jadx_path: PathBuf,
    tools_dir: PathBuf,
    sources_dir: PathBuf,
    settings: DecompileConfig,
}

impl DecompileSupervisor {
    /// Creates a supervisor over the given tool and output locations
    pub fn new(
        jadx_path: PathBuf,
        tools_dir: PathBuf,
        sources_dir: PathBuf,
        settings: DecompileConfig,
    ) -> Self {
        Self {
            jadx_path,
            tools_dir,
            sources_dir,
            settings,
        }
    }

    /// Decompiles the artifact into the identity's output directory,
    /// replacing any previous tree.
    pub async fn decompile(&self, artifact: &RetrievedArtifact, threads: usize) -> Result<()> {
        let output_dir = self.sources_dir.join(&artifact.identity);
        if output_dir.exists() {
            tokio::fs::remove_dir_all(&output_dir).await?;
        }
        tokio::fs::create_dir_all(&output_dir).await?;

        let artifact_path = artifact.path.clone();
        let expected = task::spawn_blocking(move || dex::expected_class_count(&artifact_path))
            .await
            .unwrap_or(0);
        if expected > 0 {
            info!("Found {} classes in DEX", expected);
        }

        info!("Decompiling with jadx ({} threads)...", threads);
        let (stop_tx, stop_rx) = oneshot::channel();
        let monitor = tokio::spawn(monitor_progress(
            output_dir.clone(),
            expected,
            Duration::from_secs(self.settings.poll_interval_secs),
            stop_rx,
        ));

        let start = Instant::now();
        let args = self.jadx_args(&output_dir, &artifact.path, threads);
        let envs = self.env_overrides();
        let result = run_supervised(
            &self.jadx_path,
            &args,
            &envs,
            Duration::from_secs(self.settings.timeout_secs),
        )
        .await;

        // Stop and join the monitor before judging the outcome so no
        // background work survives this step.
        let _ = stop_tx.send(());
        let _ = monitor.await;

        let output = result?;
        let elapsed = start.elapsed();

        if output.timed_out {
            return Err(HarvestError::DecompileTimeout {
                limit_secs: self.settings.timeout_secs,
            });
        }
        info!("Progress: 100.0%");
        log_diagnostics(&output);

        let java_files = census(&output_dir, "java");
        let xml_files = census(&output_dir, "xml");
        info!(
            "Output: {} Java files, {} XML files ({:.0}s)",
            java_files,
            xml_files,
            elapsed.as_secs_f64()
        );

        if java_files < self.settings.min_source_files {
            return Err(HarvestError::EmptyDecompileOutput);
        }
        Ok(())
    }

    fn jadx_args(&self, output_dir: &Path, artifact: &Path, threads: usize) -> Vec<OsString> {
        vec![
            OsString::from("--threads-count"),
            OsString::from(threads.to_string()),
            OsString::from("--output-dir"),
            output_dir.as_os_str().to_os_string(),
            OsString::from("--log-level"),
            OsString::from("error"),
            OsString::from("--deobf"),
            OsString::from("--deobf-use-sourcename"),
            OsString::from("--deobf-min"),
            OsString::from("3"),
            OsString::from("--deobf-res"),
            artifact.as_os_str().to_os_string(),
        ]
    }

    /// Builds the child environment: a fixed heap for the decompiler, plus the
    /// bundled JDK when one is provisioned under the tools directory.
    fn env_overrides(&self) -> Vec<(String, OsString)> {
        let mut overrides = vec![("JAVA_OPTS".to_string(), OsString::from("-Xmx8g"))];

        if let Some(jdk_home) = bundled_jdk(&self.tools_dir) {
            overrides.push(("JAVA_HOME".to_string(), jdk_home.clone().into_os_string()));

            let mut paths = vec![jdk_home.join("bin")];
            if let Some(existing) = env::var_os("PATH") {
                paths.extend(env::split_paths(&existing));
            }
            if let Ok(joined) = env::join_paths(paths) {
                overrides.push(("PATH".to_string(), joined));
            }
        }

        overrides
    }
}

/// Returns the locally provisioned JDK home, the first subdirectory under
/// `tools/jdk`, or `None` to use the ambient runtime.
fn bundled_jdk(tools_dir: &Path) -> Option<PathBuf> {
    let jdk_dir = tools_dir.join("jdk");
    fs::read_dir(jdk_dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .find(|path| path.is_dir())
}

/// Polls the output directory and reports completion until signalled to stop.
///
/// Purely observational; it shares nothing with the decompiler beyond read
/// access to the output directory, and the reported percentage never reaches
/// 100 while the subprocess is still running.
async fn monitor_progress(
    output_dir: PathBuf,
    expected: u64,
    interval: Duration,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    bar.enable_steady_tick(Duration::from_millis(100));

    let mut last_count = 0u64;
    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            _ = sleep(interval) => {
                let dir = output_dir.clone();
                let count = task::spawn_blocking(move || count_files_with_ext(&dir, "java"))
                    .await
                    .unwrap_or(0);
                if count > last_count {
                    if expected > 0 {
                        let pct = progress_percent(count, expected);
                        bar.set_message(format!(
                            "Progress: {:5.1}% ({}/{} classes)",
                            pct, count, expected
                        ));
                    } else {
                        bar.set_message(format!("Decompiled {} classes...", count));
                    }
                    last_count = count;
                }
            }
        }
    }
    bar.finish_and_clear();
}

/// Completion estimate for the monitor, capped below 100 until the
/// subprocess has actually finished
fn progress_percent(produced: u64, expected: u64) -> f64 {
    if expected == 0 {
        return 0.0;
    }
    (produced as f64 / expected as f64 * 100.0).min(99.9)
}

/// Fast recursive count of files with the given extension.
///
/// Used on the polling path; unreadable directories are counted as empty.
fn count_files_with_ext(dir: &Path, ext: &str) -> u64 {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };

    let mut count = 0;
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let path = entry.path();
        if file_type.is_dir() {
            count += count_files_with_ext(&path, ext);
        } else if file_type.is_file()
            && path.extension().and_then(|e| e.to_str()) == Some(ext)
        {
            count += 1;
        }
    }
    count
}

/// Post-run census over the produced tree
fn census(dir: &Path, ext: &str) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry.path().extension().and_then(|e| e.to_str()) == Some(ext)
        })
        .count() as u64
}

fn log_diagnostics(output: &SupervisedOutput) {
    log_tail(&output.stdout);
    log_tail(&output.stderr);
    if !output.exit_ok && !output.timed_out {
        warn!("decompiler exited non-zero; judging by produced output");
    }
}

fn log_tail(text: &str) {
    let lines: Vec<&str> = text.trim().lines().collect();
    if lines.is_empty() {
        return;
    }
    let start = lines.len().saturating_sub(5);
    for line in &lines[start..] {
        info!("    {}", line);
    }
}
