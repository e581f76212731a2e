//! Integration tests for the HTTP listing session
//!
//! These tests use wiremock to serve a listing page and its report files and
//! run the supervised crawl end-to-end against it.

use resume_crawl::config::{load_config_with_hash, SessionConfig};
use resume_crawl::crawler::{crawl, open_writer, HttpSession, Session, SessionError};
use resume_crawl::state::{ArtifactKind, Outcome};
use resume_crawl::storage::{AttemptStatus, RunLedger};
use resume_crawl::ProgressStore;
use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LISTING: &str = r#"
<html><body>
  <div id="tbtext-1070">4 companies</div>
  <div id="gridview-1061">
    <table data-recordindex="0"><tr><td>
      <span>Acme, Inc.</span>
      <a href="/files/acme.pdf">Download ESG Ratings Report</a>
    </td></tr></table>
    <table data-recordindex="1"><tr><td>
      <span>Globex (Pty) Ltd.</span>
      <a href="/files/globex-tearsheet.pdf">Download Tearsheet</a>
    </td></tr></table>
    <table data-recordindex="2"><tr><td>
      <span>Initech</span>
      <a href="/download?id=2">Download ESG Ratings Report</a>
    </td></tr></table>
  </div>
</body></html>
"#;

async fn mount_listing(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/listing"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/acme.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-acme".to_vec()))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/globex-tearsheet.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-globex".to_vec()))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/download"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-disposition", "attachment; filename=\"initech.pdf\"")
                .set_body_bytes(b"%PDF-initech".to_vec()),
        )
        .mount(server)
        .await;
}

fn write_config(dir: &Path, listing_url: &str) -> std::path::PathBuf {
    let out = |name: &str| dir.join(name).display().to_string().replace('\\', "/");
    let content = format!(
        r#"
[crawl]
checkpoint-interval = 2
item-delay-ms = 0
settle-delay-ms = 0
download-polls = 500
poll-interval-ms = 10
fallback-artifacts = ["tearsheet"]

[supervisor]
max-attempts = 3
initial-backoff-ms = 1
max-backoff-ms = 5

[session]
listing-url = "{listing_url}"

[output]
log-path = "{log}"
checkpoint-path = "{blob}"
artifact-dir = "{artifacts}"
ledger-path = "{ledger}"
"#,
        listing_url = listing_url,
        log = out("logger.csv"),
        blob = out("dwn_map.json"),
        artifacts = out("reports"),
        ledger = out("runs.db"),
    );

    let path = dir.join("crawl.toml");
    std::fs::write(&path, content).unwrap();
    path
}

#[tokio::test]
async fn test_full_crawl_against_listing() {
    let server = MockServer::start().await;
    mount_listing(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(dir.path(), &format!("{}/listing", server.uri()));
    let (config, hash) = load_config_with_hash(&config_path).unwrap();

    let report = crawl(config.clone(), &hash).await.unwrap();

    assert_eq!(report.total, 4);
    assert_eq!(report.records, 4);
    assert_eq!(report.attempts, 1);
    assert!(report.gaps.is_empty());

    let mut records = open_writer(&config).store().load().unwrap();
    records.sort_by_key(|r| r.index);

    assert_eq!(records[0].outcome, Outcome::Succeeded);
    assert_eq!(records[0].note, "Acme Inc");
    assert!(records[0].artifacts.report);

    assert_eq!(records[1].outcome, Outcome::PartialFailure);
    assert_eq!(
        records[1].note,
        "Globex Pty Ltd -> found but report does not exist"
    );
    assert!(records[1].artifacts.get(ArtifactKind::Tearsheet));

    assert_eq!(records[2].outcome, Outcome::Succeeded);
    assert_eq!(records[3].outcome, Outcome::NotFound);
    assert_eq!(records[3].note, "record 3 -> not found");

    let artifacts = dir.path().join("reports");
    assert_eq!(
        std::fs::read(artifacts.join("Acme Inc Report.pdf")).unwrap(),
        b"%PDF-acme"
    );
    assert!(artifacts.join("Globex Pty Ltd Tearsheet.pdf").exists());
    assert!(artifacts.join("Initech Report.pdf").exists());

    let ledger = RunLedger::open(&dir.path().join("runs.db")).unwrap();
    let attempts = ledger.recent_attempts(5).unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, AttemptStatus::Completed);
    assert_eq!(attempts[0].config_hash, hash);
    assert_eq!(attempts[0].total, Some(4));
}

#[tokio::test]
async fn test_second_crawl_is_a_no_op() {
    let server = MockServer::start().await;
    mount_listing(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(dir.path(), &format!("{}/listing", server.uri()));
    let (mut config, hash) = load_config_with_hash(&config_path).unwrap();
    crawl(config.clone(), &hash).await.unwrap();

    config.crawl.range_size = Some(4);
    let report = crawl(config, &hash).await.unwrap();

    assert_eq!(report.attempts, 0);
    assert_eq!(report.records, 4);
}

#[tokio::test]
async fn test_unavailable_listing_exhausts_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listing"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(dir.path(), &format!("{}/listing", server.uri()));
    let (config, hash) = load_config_with_hash(&config_path).unwrap();

    let result = crawl(config, &hash).await;

    match result {
        Err(resume_crawl::CrawlError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected RetriesExhausted, got {:?}", other.map(|r| r.records)),
    }
}

#[tokio::test]
async fn test_open_reports_listing_total() {
    let server = MockServer::start().await;
    mount_listing(&server).await;
    let dir = tempfile::tempdir().unwrap();

    let config = SessionConfig::new(format!("{}/listing", server.uri()));
    let mut session = HttpSession::new(config, dir.path().join("incoming")).unwrap();

    assert_eq!(session.open().await.unwrap(), Some(4));
    assert_eq!(session.row_count(), 3);

    let target = session.locate(2).await.unwrap();
    assert_eq!(target.label, "Initech");
    assert!(matches!(
        session.locate(3).await,
        Err(SessionError::NotFound { index: 3 })
    ));

    session.close().await;
}

#[tokio::test]
async fn test_trigger_without_matching_link() {
    let server = MockServer::start().await;
    mount_listing(&server).await;
    let dir = tempfile::tempdir().unwrap();

    let config = SessionConfig::new(format!("{}/listing", server.uri()));
    let mut session = HttpSession::new(config, dir.path().join("incoming")).unwrap();
    session.open().await.unwrap();

    let target = session.locate(1).await.unwrap();
    let result = session.trigger(&target, ArtifactKind::Report).await;

    assert!(matches!(
        result,
        Err(SessionError::ArtifactMissing {
            index: 1,
            kind: ArtifactKind::Report
        })
    ));
}

#[tokio::test]
async fn test_open_fails_fatally_on_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listing"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();

    let config = SessionConfig::new(format!("{}/listing", server.uri()));
    let mut session = HttpSession::new(config, dir.path().join("incoming")).unwrap();

    let err = session.open().await.unwrap_err();
    assert!(err.is_fatal());
}
