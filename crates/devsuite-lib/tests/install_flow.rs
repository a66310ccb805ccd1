mod common;

use common::*;
use devsuite_lib::catalog::Catalog;
use devsuite_lib::error::{Error, InstallError};
use devsuite_lib::installer::types::{OsType, SelectedOption, UnitState};
use devsuite_lib::installer::{CompletionEvent, Target};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::broadcast;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn serve(server: &MockServer, route: &str, body: &[u8], expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn suite_catalog(server: &MockServer) -> Catalog {
    let uri = server.uri();
    Catalog::from_value(
        json!({
            "jdk": {
                "name": "OpenJDK", "version": "17.0.2", "detectable": true,
                "fileName": "jdk.zip", "url": format!("{}/jdk.zip", uri),
                "sha256sum": sha256_hex(b"jdk-bytes"), "size": 9
            },
            "ide": {
                "name": "Studio", "version": "12.0", "requires": ["jdk"],
                "fileName": "ide.zip", "url": format!("{}/ide.zip", uri),
                "sha256sum": sha256_hex(b"ide-bytes"), "size": 9
            },
            "kubectl": {
                "name": "kubectl", "version": "1.27.3",
                "files": [
                    { "name": "kubectl", "fileName": "kubectl-1.27.3", "url": format!("{}/kubectl", uri), "size": 3 },
                    { "name": "completion", "fileName": "kubectl.bash", "url": format!("{}/kubectl.bash", uri), "size": 4 }
                ]
            }
        }),
        OsType::current(),
    )
    .unwrap()
}

async fn serve_suite(server: &MockServer, calls: u64) {
    serve(server, "/jdk.zip", b"jdk-bytes", calls).await;
    serve(server, "/ide.zip", b"ide-bytes", calls).await;
    serve(server, "/kubectl", b"bin", calls).await;
    serve(server, "/kubectl.bash", b"comp", calls).await;
}

fn drain(rx: &mut broadcast::Receiver<CompletionEvent>) -> Vec<CompletionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn installs(journal: &Journal) -> Vec<String> {
    journal
        .entries()
        .into_iter()
        .filter(|e| e.starts_with("start:") || e.starts_with("end:") || e.starts_with("fail:"))
        .collect()
}

#[tokio::test]
async fn full_run_installs_along_the_chain() {
    init_logging();
    let server = MockServer::start().await;
    serve_suite(&server, 1).await;
    let dir = TempDir::new().unwrap();
    let journal = Arc::new(Journal::default());

    let orchestrator =
        orchestrator(suite_catalog(&server), dir.path(), Host::default(), journal.clone()).unwrap();
    let mut events = orchestrator.subscribe();

    let report = orchestrator.run().await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.downloaded, vec!["jdk", "ide", "kubectl"]);
    assert_eq!(report.installed, vec!["jdk", "ide", "kubectl"]);
    assert_eq!(
        installs(&journal),
        vec!["start:jdk", "end:jdk", "start:ide", "end:ide", "start:kubectl", "end:kubectl"]
    );
    assert_eq!(journal.max_running(), 1);
    assert!(journal.entries().contains(&"setup:ide".to_string()));

    for unit in orchestrator.units().iter() {
        assert_eq!(unit.state(), UnitState::Done, "{}", unit.id());
        assert!(unit.is_installed());
    }

    let downloads = dir.path().join("downloads");
    assert_eq!(std::fs::read(downloads.join("kubectl-1.27.3")).unwrap(), b"bin");
    assert_eq!(std::fs::read(downloads.join("kubectl.bash")).unwrap(), b"comp");

    let events = drain(&mut events);
    assert_eq!(
        events.last(),
        Some(&CompletionEvent::InstallComplete(Target::All))
    );
    assert!(events.contains(&CompletionEvent::CheckComplete(Target::All)));
    assert!(events.contains(&CompletionEvent::DownloadingComplete(Target::All)));
    assert!(events.contains(&CompletionEvent::DownloadingComplete(Target::unit("ide"))));
    assert_eq!(
        events
            .iter()
            .filter(|e| **e == CompletionEvent::InstallComplete(Target::All))
            .count(),
        1
    );
}

#[tokio::test]
async fn verified_files_are_not_downloaded_again() {
    let server = MockServer::start().await;
    serve_suite(&server, 1).await;
    let dir = TempDir::new().unwrap();

    let first =
        orchestrator(suite_catalog(&server), dir.path(), Host::default(), Arc::default()).unwrap();
    assert!(first.download().await.is_success());

    let second =
        orchestrator(suite_catalog(&server), dir.path(), Host::default(), Arc::default()).unwrap();
    second.verify().await;
    for unit in second.units().iter() {
        assert!(unit.is_downloaded(), "{}", unit.id());
        assert_eq!(unit.state(), UnitState::Downloaded);
    }
    let outcome = second.download().await;
    assert!(outcome.succeeded.is_empty() && outcome.failed.is_empty());
}

#[tokio::test]
async fn corrupt_local_file_is_fetched_again() {
    let server = MockServer::start().await;
    serve(&server, "/jdk.zip", b"jdk-bytes", 1).await;
    let dir = TempDir::new().unwrap();
    let downloads = dir.path().join("downloads");
    std::fs::create_dir_all(&downloads).unwrap();
    std::fs::write(downloads.join("jdk.zip"), b"truncated").unwrap();

    let catalog = Catalog::from_value(
        json!({ "jdk": {
            "name": "OpenJDK", "fileName": "jdk.zip", "url": format!("{}/jdk.zip", server.uri()),
            "sha256sum": sha256_hex(b"jdk-bytes")
        }}),
        OsType::current(),
    )
    .unwrap();
    let orchestrator = orchestrator(catalog, dir.path(), Host::default(), Arc::default()).unwrap();

    orchestrator.verify().await;
    assert!(!orchestrator.unit("jdk").unwrap().is_downloaded());
    assert_eq!(orchestrator.download().await.succeeded, vec!["jdk"]);
    assert_eq!(std::fs::read(downloads.join("jdk.zip")).unwrap(), b"jdk-bytes");
}

#[tokio::test]
async fn bundled_copy_skips_the_download() {
    let server = MockServer::start().await;
    serve(&server, "/jdk.zip", b"jdk-bytes", 0).await;
    let dir = TempDir::new().unwrap();
    let bundle = dir.path().join("bundle");
    std::fs::create_dir_all(&bundle).unwrap();
    std::fs::write(bundle.join("jdk.zip"), b"jdk-bytes").unwrap();

    let catalog = Catalog::from_value(
        json!({ "jdk": {
            "name": "OpenJDK", "bundle": "yes", "fileName": "jdk.zip",
            "url": format!("{}/jdk.zip", server.uri()), "sha256sum": sha256_hex(b"jdk-bytes")
        }}),
        OsType::current(),
    )
    .unwrap();
    let journal = Arc::new(Journal::default());
    let orchestrator = orchestrator(catalog, dir.path(), Host::default(), journal.clone()).unwrap();

    let report = orchestrator.run().await.unwrap();
    assert_eq!(report.installed, vec!["jdk"]);
    assert_eq!(installs(&journal), vec!["start:jdk", "end:jdk"]);
}

#[tokio::test]
async fn staging_url_wins_over_url() {
    let server = MockServer::start().await;
    serve(&server, "/public/jdk.zip", b"public", 0).await;
    serve(&server, "/staging/jdk.zip", b"staged", 1).await;
    let dir = TempDir::new().unwrap();

    let catalog = Catalog::from_value(
        json!({ "jdk": {
            "name": "OpenJDK", "fileName": "jdk.zip",
            "url": format!("{}/public/jdk.zip", server.uri()),
            "dmUrl": format!("{}/staging/jdk.zip", server.uri())
        }}),
        OsType::current(),
    )
    .unwrap();
    let orchestrator = orchestrator(catalog, dir.path(), Host::default(), Arc::default()).unwrap();

    assert!(orchestrator.download().await.is_success());
    assert_eq!(
        std::fs::read(dir.path().join("downloads").join("jdk.zip")).unwrap(),
        b"staged"
    );
}

#[tokio::test]
async fn failed_download_holds_install_until_retried() {
    let server = MockServer::start().await;
    serve(&server, "/jdk.zip", b"jdk-bytes", 1).await;
    serve(&server, "/kubectl", b"bin", 1).await;
    serve(&server, "/kubectl.bash", b"comp", 1).await;
    Mock::given(method("GET"))
        .and(path("/ide.zip"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    serve(&server, "/ide.zip", b"ide-bytes", 1).await;

    let dir = TempDir::new().unwrap();
    let journal = Arc::new(Journal::default());
    let reporter_journal = journal.clone();
    let orchestrator =
        orchestrator(suite_catalog(&server), dir.path(), Host::default(), reporter_journal).unwrap();

    let report = orchestrator.run().await.unwrap();
    assert_eq!(report.failed_downloads, vec!["ide"]);
    assert_eq!(report.downloaded, vec!["jdk", "kubectl"]);
    assert!(report.installed.is_empty());
    assert!(journal.entries().is_empty());

    let ide = orchestrator.unit("ide").unwrap();
    assert!(ide.has_failed_downloads());
    assert_eq!(ide.state(), UnitState::AwaitingDownload);

    let retry = orchestrator.retry_failed_downloads().await;
    assert_eq!(retry.succeeded, vec!["ide"]);
    assert!(!ide.has_failed_downloads());
    assert!(ide.is_downloaded());

    let installs = orchestrator.install().await;
    assert_eq!(installs.succeeded, vec!["jdk", "ide", "kubectl"]);
}

#[tokio::test]
async fn failed_install_halts_the_rest_of_the_chain() {
    let server = MockServer::start().await;
    serve_suite(&server, 1).await;
    let dir = TempDir::new().unwrap();
    let journal = Arc::new(Journal::default());
    let host = Host::default().with_failing("jdk");

    let orchestrator =
        orchestrator(suite_catalog(&server), dir.path(), host, journal.clone()).unwrap();
    let mut events = orchestrator.subscribe();
    let report = orchestrator.run().await.unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failed_installs, vec!["jdk", "ide", "kubectl"]);
    assert_eq!(installs(&journal), vec!["start:jdk", "fail:jdk"]);
    assert_eq!(orchestrator.unit("ide").unwrap().state(), UnitState::Failed);

    let events = drain(&mut events);
    assert_eq!(
        events.last(),
        Some(&CompletionEvent::InstallComplete(Target::All))
    );
}

#[tokio::test]
async fn detected_dependency_is_passed_through() {
    let server = MockServer::start().await;
    serve(&server, "/jdk.zip", b"jdk-bytes", 0).await;
    serve(&server, "/ide.zip", b"ide-bytes", 1).await;
    serve(&server, "/kubectl", b"bin", 1).await;
    serve(&server, "/kubectl.bash", b"comp", 1).await;

    let dir = TempDir::new().unwrap();
    let journal = Arc::new(Journal::default());
    let java_home = dir.path().join("system-jdk");
    let host = Host::default().with_detected("jdk", "17.0.5", &java_home);

    let orchestrator =
        orchestrator(suite_catalog(&server), dir.path(), host, journal.clone()).unwrap();
    orchestrator.detect_all().await.unwrap();

    let jdk = orchestrator.unit("jdk").unwrap();
    assert_eq!(jdk.selected_option(), SelectedOption::Detected);
    assert_eq!(orchestrator.units().location_of("jdk"), Some(java_home));
    assert!(orchestrator.unit("ide").unwrap().get_install_after().is_none());

    let report = orchestrator.run().await.unwrap();
    assert_eq!(report.downloaded, vec!["ide", "kubectl"]);
    assert_eq!(
        installs(&journal),
        vec!["start:ide", "end:ide", "start:kubectl", "end:kubectl"]
    );
    assert!(journal.entries().contains(&"setup:jdk".to_string()));
    assert_eq!(jdk.state(), UnitState::Done);
    assert!(!jdk.is_installed());
}

#[tokio::test]
async fn unusable_detection_blocks_the_run() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::from_value(
        json!({ "virtualbox": {
            "name": "VirtualBox", "detectable": true,
            "minimumVersion": "5.1.22", "maximumVersion": "5.2.0",
            "fileName": "vbox.exe", "url": format!("{}/vbox.exe", server.uri())
        }}),
        OsType::current(),
    )
    .unwrap();
    let host = Host::default().with_detected("virtualbox", "4.3.0", &dir.path().join("vbox"));
    let orchestrator = orchestrator(catalog, dir.path(), host, Arc::default()).unwrap();
    orchestrator.detect_all().await.unwrap();

    let unit = orchestrator.unit("virtualbox").unwrap();
    assert!(unit.will_install());
    unit.set_selected_option(SelectedOption::Detected);
    assert!(!unit.is_configured());

    let result = orchestrator.run().await;
    assert!(matches!(
        result,
        Err(Error::Install(InstallError::NotConfigured(ref id))) if id == "virtualbox"
    ));
}
