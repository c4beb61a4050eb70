#![cfg(unix)]

use apkharvest::config::{Config, DecompileConfig, FetchConfig, NetworkConfig};
use apkharvest::{Pipeline, VersionLedger};
use mockito::ServerGuard;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use tempfile::TempDir;

const IDENTITY: &str = "com.acme.alpha";

// Stub decompiler: finds --output-dir among its arguments and produces a
// single source file there, the minimal tree a real jadx run would leave.
const FAKE_JADX_OK: &str = r#"#!/bin/sh
out=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "--output-dir" ]; then out="$arg"; fi
  prev="$arg"
done
mkdir -p "$out/com/acme"
echo "public class Alpha {}" > "$out/com/acme/Alpha.java"
"#;

const FAKE_JADX_EMPTY: &str = "#!/bin/sh\nexit 0\n";

const FAKE_JADX_HANGS: &str = "#!/bin/sh\nsleep 30\n";

fn install_fake_jadx(data: &TempDir, script: &str) {
    let bin_dir = data.path().join("tools/jadx/bin");
    fs::create_dir_all(&bin_dir).unwrap();
    let jadx = bin_dir.join("jadx");
    fs::write(&jadx, script).unwrap();
    let mut perms = fs::metadata(&jadx).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&jadx, perms).unwrap();
}

fn test_config(server: &ServerGuard, data: &TempDir) -> Config {
    Config {
        base_url: server.url(),
        developers: vec!["acme".to_string()],
        data_dir: data.path().to_path_buf(),
        network: NetworkConfig {
            request_timeout_secs: 5,
            politeness_delay_ms: 0,
        },
        fetch: FetchConfig {
            download_timeout_secs: 5,
            min_artifact_bytes: 1024,
        },
        decompile: DecompileConfig {
            timeout_secs: 20,
            poll_interval_secs: 1,
            min_source_files: 1,
        },
    }
}

async fn mock_listing(server: &mut ServerGuard) -> mockito::Mock {
    server
        .mock("GET", "/developer/acme/")
        .with_status(200)
        .with_body(r#"<a href="/alpha/com.acme.alpha/"><p>Alpha</p></a>"#)
        .create_async()
        .await
}

async fn mock_detail(server: &mut ServerGuard, version: &str) -> mockito::Mock {
    server
        .mock("GET", "/alpha/com.acme.alpha/")
        .with_status(200)
        .with_body(format!(r#"{{"softwareVersion": "{}"}}"#, version))
        .create_async()
        .await
}

async fn mock_download(
    server: &mut ServerGuard,
    expected_hits: usize,
) -> (mockito::Mock, mockito::Mock) {
    let page = server
        .mock("GET", "/alpha/com.acme.alpha/download/apk")
        .with_status(200)
        .with_body(r#"<a href="/r2?u=alpha">Download</a>"#)
        .expect(expected_hits)
        .create_async()
        .await;
    let payload = server
        .mock("GET", "/r2?u=alpha")
        .with_status(200)
        .with_header(
            "content-disposition",
            r#"attachment; filename="alpha.apk""#,
        )
        .with_body(vec![0u8; 4096])
        .expect(expected_hits)
        .create_async()
        .await;
    (page, payload)
}

#[tokio::test]
async fn test_end_to_end_changed_version() {
    let mut server = mockito::Server::new_async().await;
    let data = TempDir::new().unwrap();
    install_fake_jadx(&data, FAKE_JADX_OK);

    let _listing = mock_listing(&mut server).await;
    let _detail = mock_detail(&mut server, "3.2.1").await;
    let (_page, _payload) = mock_download(&mut server, 1).await;

    let pipeline = Pipeline::new(test_config(&server, &data), false, 2).unwrap();
    let entries = pipeline.discover(&["acme".to_string()]).await;
    assert_eq!(entries.len(), 1);

    let summary = pipeline.run(&entries).await;
    assert_eq!(summary.total(), 1);
    assert_eq!(summary.succeeded(), 1);
    assert!(!summary.has_failures());

    // Ledger now claims the processed version, and only because the
    // decompiler actually produced output.
    let ledger = VersionLedger::new(data.path().join("versions"));
    assert_eq!(ledger.get(IDENTITY), Some("3.2.1".to_string()));
    assert!(data
        .path()
        .join("sources/com.acme.alpha/com/acme/Alpha.java")
        .exists());
    // Scratch artifact directory is gone whatever the outcome
    assert!(!data.path().join("apks/com.acme.alpha").exists());
}

#[tokio::test]
async fn test_second_run_skips_unchanged_version() {
    let mut server = mockito::Server::new_async().await;
    let data = TempDir::new().unwrap();
    install_fake_jadx(&data, FAKE_JADX_OK);

    let _listing = mock_listing(&mut server).await;
    let _detail = mock_detail(&mut server, "1.0").await;
    let (page, payload) = mock_download(&mut server, 1).await;

    let pipeline = Pipeline::new(test_config(&server, &data), false, 2).unwrap();
    let entries = pipeline.discover(&["acme".to_string()]).await;

    let first = pipeline.run(&entries).await;
    assert!(!first.has_failures());

    let second = pipeline.run(&entries).await;
    assert!(!second.has_failures());
    assert_eq!(second.succeeded(), 1);

    // The download happened exactly once: the second run was a no-op.
    page.assert_async().await;
    payload.assert_async().await;

    let ledger = VersionLedger::new(data.path().join("versions"));
    assert_eq!(ledger.get(IDENTITY), Some("1.0".to_string()));
    assert!(data
        .path()
        .join("sources/com.acme.alpha/com/acme/Alpha.java")
        .exists());
}

#[tokio::test]
async fn test_force_bypasses_unchanged_short_circuit() {
    let mut server = mockito::Server::new_async().await;
    let data = TempDir::new().unwrap();
    install_fake_jadx(&data, FAKE_JADX_OK);

    let _listing = mock_listing(&mut server).await;
    let _detail = mock_detail(&mut server, "1.0").await;
    let (page, payload) = mock_download(&mut server, 2).await;

    let config = test_config(&server, &data);
    let pipeline = Pipeline::new(config.clone(), false, 2).unwrap();
    let entries = pipeline.discover(&["acme".to_string()]).await;
    pipeline.run(&entries).await;

    let forced = Pipeline::new(config, true, 2).unwrap();
    let summary = forced.run(&entries).await;
    assert!(!summary.has_failures());

    page.assert_async().await;
    payload.assert_async().await;
}

#[tokio::test]
async fn test_unknown_version_success_is_not_persisted() {
    let mut server = mockito::Server::new_async().await;
    let data = TempDir::new().unwrap();
    install_fake_jadx(&data, FAKE_JADX_OK);

    let _listing = mock_listing(&mut server).await;
    let _detail = server
        .mock("GET", "/alpha/com.acme.alpha/")
        .with_status(200)
        .with_body("<html><body>no version markers here</body></html>")
        .create_async()
        .await;
    let (_page, _payload) = mock_download(&mut server, 1).await;

    let pipeline = Pipeline::new(test_config(&server, &data), false, 2).unwrap();
    let entries = pipeline.discover(&["acme".to_string()]).await;
    let summary = pipeline.run(&entries).await;

    // The decompile succeeded, but with no version string there is nothing
    // safe to record; the item will be re-checked next run.
    assert!(!summary.has_failures());
    let ledger = VersionLedger::new(data.path().join("versions"));
    assert_eq!(ledger.get(IDENTITY), None);
    assert!(data.path().join("sources/com.acme.alpha").exists());
}

#[tokio::test]
async fn test_empty_decompile_output_fails_without_ledger_write() {
    let mut server = mockito::Server::new_async().await;
    let data = TempDir::new().unwrap();
    install_fake_jadx(&data, FAKE_JADX_EMPTY);

    let _listing = mock_listing(&mut server).await;
    let _detail = mock_detail(&mut server, "2.0").await;
    let (_page, _payload) = mock_download(&mut server, 1).await;

    let pipeline = Pipeline::new(test_config(&server, &data), false, 2).unwrap();
    let entries = pipeline.discover(&["acme".to_string()]).await;
    let summary = pipeline.run(&entries).await;

    assert_eq!(summary.failed(), 1);
    let ledger = VersionLedger::new(data.path().join("versions"));
    assert_eq!(ledger.get(IDENTITY), None);
    // Cleanup still ran
    assert!(!data.path().join("apks/com.acme.alpha").exists());
}

#[tokio::test]
async fn test_decompile_timeout_fails_item() {
    let mut server = mockito::Server::new_async().await;
    let data = TempDir::new().unwrap();
    install_fake_jadx(&data, FAKE_JADX_HANGS);

    let _listing = mock_listing(&mut server).await;
    let _detail = mock_detail(&mut server, "2.0").await;
    let (_page, _payload) = mock_download(&mut server, 1).await;

    let mut config = test_config(&server, &data);
    config.decompile.timeout_secs = 1;

    let pipeline = Pipeline::new(config, false, 2).unwrap();
    let entries = pipeline.discover(&["acme".to_string()]).await;
    let summary = pipeline.run(&entries).await;

    assert_eq!(summary.failed(), 1);
    let ledger = VersionLedger::new(data.path().join("versions"));
    assert_eq!(ledger.get(IDENTITY), None);
}

#[tokio::test]
async fn test_fetch_failure_does_not_stop_later_items() {
    let mut server = mockito::Server::new_async().await;
    let data = TempDir::new().unwrap();
    install_fake_jadx(&data, FAKE_JADX_OK);

    let _listing = server
        .mock("GET", "/developer/acme/")
        .with_status(200)
        .with_body(
            r#"
            <a href="/alpha/com.acme.alpha/"><p>Alpha</p></a>
            <a href="/beta/com.acme.beta/"><p>Beta</p></a>
            "#,
        )
        .create_async()
        .await;
    let _alpha_detail = mock_detail(&mut server, "1.0").await;
    let _beta_detail = server
        .mock("GET", "/beta/com.acme.beta/")
        .with_status(200)
        .with_body(r#"{"softwareVersion": "2.0"}"#)
        .create_async()
        .await;
    // Alpha's download page offers nothing usable
    let _alpha_download = server
        .mock("GET", "/alpha/com.acme.alpha/download/apk")
        .with_status(200)
        .with_body("<html><body>come back later</body></html>")
        .create_async()
        .await;
    let _beta_download = server
        .mock("GET", "/beta/com.acme.beta/download/apk")
        .with_status(200)
        .with_body(r#"<a href="/r2?u=beta">Download</a>"#)
        .create_async()
        .await;
    let _beta_payload = server
        .mock("GET", "/r2?u=beta")
        .with_status(200)
        .with_header(
            "content-disposition",
            r#"attachment; filename="beta.apk""#,
        )
        .with_body(vec![0u8; 4096])
        .create_async()
        .await;

    let pipeline = Pipeline::new(test_config(&server, &data), false, 2).unwrap();
    let entries = pipeline.discover(&["acme".to_string()]).await;
    assert_eq!(entries.len(), 2);

    let summary = pipeline.run(&entries).await;
    assert_eq!(summary.total(), 2);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.succeeded(), 1);

    let by_identity: Vec<(&str, bool)> = summary
        .outcomes
        .iter()
        .map(|o| (o.identity.as_str(), o.succeeded))
        .collect();
    assert_eq!(
        by_identity,
        vec![("com.acme.alpha", false), ("com.acme.beta", true)]
    );

    let ledger = VersionLedger::new(data.path().join("versions"));
    assert_eq!(ledger.get("com.acme.alpha"), None);
    assert_eq!(ledger.get("com.acme.beta"), Some("2.0".to_string()));
}
