//! Supervisor tests against a scripted listing
//!
//! The scripted session keeps its failure plan in shared state, so a fault
//! injected once stays consumed across the fresh sessions the supervisor
//! creates for every attempt.

use async_trait::async_trait;
use resume_crawl::config::{CrawlConfig, SupervisorConfig};
use resume_crawl::crawler::{
    CheckpointWriter, DownloadStatus, Session, SessionError, SessionFactory, Supervisor, Target,
};
use resume_crawl::state::{ArtifactFlags, ArtifactKind, Checkpoint, Outcome, WorkItem};
use resume_crawl::storage::{AttemptStatus, CsvProgressStore, MergeOrder, RunLedger};
use resume_crawl::{CrawlError, ProgressStore};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Debug, Default)]
struct Plan {
    /// Indices whose `locate` fails fatally once
    fatal_once: HashSet<u64>,
    /// Indices whose `locate` always fails fatally
    fatal_always: HashSet<u64>,
    /// Every index passed to `locate`, across sessions
    located: Vec<u64>,
    sessions_created: u32,
    sessions_closed: u32,
    fail_open: bool,
    reported_total: Option<u64>,
}

struct ScriptedSession {
    plan: Arc<Mutex<Plan>>,
    download_dir: PathBuf,
    pending: Option<PathBuf>,
}

#[async_trait]
impl Session for ScriptedSession {
    async fn open(&mut self) -> Result<Option<u64>, SessionError> {
        let plan = self.plan.lock().unwrap();
        if plan.fail_open {
            return Err(SessionError::Fatal("listing did not load".to_string()));
        }
        Ok(plan.reported_total)
    }

    async fn seek(&mut self, _index: u64) -> Result<(), SessionError> {
        Ok(())
    }

    async fn locate(&mut self, index: u64) -> Result<Target, SessionError> {
        let mut plan = self.plan.lock().unwrap();
        plan.located.push(index);
        if plan.fatal_always.contains(&index) || plan.fatal_once.remove(&index) {
            return Err(SessionError::Fatal(format!("browser crashed at {}", index)));
        }
        Ok(Target {
            index,
            label: format!("Company {}", index),
        })
    }

    async fn trigger(&mut self, target: &Target, _kind: ArtifactKind) -> Result<(), SessionError> {
        let path = self.download_dir.join(format!("dl-{}.pdf", target.index));
        std::fs::write(&path, b"%PDF").map_err(|e| SessionError::Item {
            index: target.index,
            message: e.to_string(),
        })?;
        self.pending = Some(path);
        Ok(())
    }

    async fn download_status(&mut self) -> Result<DownloadStatus, SessionError> {
        match self.pending.take() {
            Some(path) => Ok(DownloadStatus::Finished(path)),
            None => Ok(DownloadStatus::InProgress),
        }
    }

    async fn close(&mut self) {
        self.plan.lock().unwrap().sessions_closed += 1;
    }
}

struct ScriptedFactory {
    plan: Arc<Mutex<Plan>>,
    download_dir: PathBuf,
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    type Session = ScriptedSession;

    async fn create(&mut self) -> Result<ScriptedSession, SessionError> {
        self.plan.lock().unwrap().sessions_created += 1;
        Ok(ScriptedSession {
            plan: Arc::clone(&self.plan),
            download_dir: self.download_dir.clone(),
            pending: None,
        })
    }
}

struct Harness {
    dir: TempDir,
    plan: Arc<Mutex<Plan>>,
}

impl Harness {
    fn new(plan: Plan) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("incoming")).unwrap();
        std::fs::create_dir_all(dir.path().join("reports")).unwrap();
        Self {
            dir,
            plan: Arc::new(Mutex::new(plan)),
        }
    }

    fn writer(&self) -> CheckpointWriter<CsvProgressStore> {
        let store = CsvProgressStore::new(self.dir.path().join("logger.csv"), MergeOrder::BufferFirst);
        CheckpointWriter::new(store, self.dir.path().join("dwn_map.json"))
    }

    fn supervisor(
        &self,
        policy: SupervisorConfig,
    ) -> Supervisor<ScriptedFactory, CsvProgressStore> {
        self.supervisor_with(policy, self.writer())
    }

    fn supervisor_with(
        &self,
        policy: SupervisorConfig,
        writer: CheckpointWriter<CsvProgressStore>,
    ) -> Supervisor<ScriptedFactory, CsvProgressStore> {
        let factory = ScriptedFactory {
            plan: Arc::clone(&self.plan),
            download_dir: self.dir.path().join("incoming"),
        };
        Supervisor::new(
            factory,
            writer,
            RunLedger::open_in_memory().unwrap(),
            fast_crawl(),
            policy,
            self.artifact_dir(),
        )
        .with_config_hash("test-hash")
    }

    fn artifact_dir(&self) -> PathBuf {
        self.dir.path().join("reports")
    }

    fn records(&self) -> Vec<WorkItem> {
        self.writer().store().load().unwrap()
    }
}

fn fast_crawl() -> CrawlConfig {
    CrawlConfig {
        checkpoint_interval: 7,
        item_delay_ms: 0,
        settle_delay_ms: 0,
        download_polls: 3,
        poll_interval_ms: 1,
        ..CrawlConfig::default()
    }
}

fn policy(max_attempts: u32, skip_after: u32) -> SupervisorConfig {
    SupervisorConfig {
        max_attempts,
        initial_backoff_ms: 1,
        max_backoff_ms: 4,
        skip_after,
    }
}

fn indices_once(records: &[WorkItem]) -> HashMap<u64, usize> {
    let mut counts = HashMap::new();
    for record in records {
        *counts.entry(record.index).or_insert(0) += 1;
    }
    counts
}

#[tokio::test]
async fn test_full_coverage_despite_injected_failures() {
    let harness = Harness::new(Plan {
        fatal_once: [4, 11, 17].into_iter().collect(),
        ..Plan::default()
    });
    let mut supervisor = harness.supervisor(policy(10, 0));

    let report = supervisor.run(Some(20)).await.unwrap();

    assert_eq!(report.attempts, 4);
    assert_eq!(report.total, 20);
    assert_eq!(report.records, 20);
    assert!(report.gaps.is_empty());
    assert!(report.skipped.is_empty());

    let records = harness.records();
    let counts = indices_once(&records);
    assert_eq!(counts.len(), 20);
    assert!(counts.values().all(|&count| count == 1));
    assert!(records.iter().all(|r| r.outcome == Outcome::Succeeded));

    assert!(harness.artifact_dir().join("Company 4 Report.pdf").exists());
    assert!(harness.artifact_dir().join("Company 19 Report.pdf").exists());

    let plan = harness.plan.lock().unwrap();
    assert_eq!(plan.sessions_created, 4);
    assert_eq!(plan.sessions_closed, 4);

    let ledger = supervisor.ledger();
    assert_eq!(ledger.count_by_status(AttemptStatus::Failed).unwrap(), 3);
    assert_eq!(ledger.count_by_status(AttemptStatus::Completed).unwrap(), 1);
}

#[tokio::test]
async fn test_full_coverage_for_every_single_failure_point() {
    for total in 1..=15u64 {
        for failure_at in 0..total {
            let harness = Harness::new(Plan {
                fatal_once: [failure_at].into_iter().collect(),
                ..Plan::default()
            });
            let mut supervisor = harness.supervisor(policy(5, 0));

            let report = supervisor.run(Some(total)).await.unwrap();
            assert_eq!(report.attempts, 2, "total {} failure at {}", total, failure_at);

            let counts = indices_once(&harness.records());
            assert_eq!(
                counts.len() as u64,
                total,
                "total {} failure at {}",
                total,
                failure_at
            );
            assert!(
                (0..total).all(|i| counts.get(&i) == Some(&1)),
                "total {} failure at {}: {:?}",
                total,
                failure_at,
                counts
            );
        }
    }
}

#[tokio::test]
async fn test_resumes_after_highest_recorded_index() {
    let harness = Harness::new(Plan::default());
    {
        let mut writer = harness.writer();
        let mut done: Checkpoint = (0..10)
            .map(|i| WorkItem::succeeded(i, &format!("Company {}", i), ArtifactFlags::default()))
            .collect::<Vec<_>>()
            .into();
        writer.flush(&mut done).unwrap();
    }

    let mut supervisor = harness.supervisor(policy(3, 0));
    let report = supervisor.run(Some(14)).await.unwrap();

    assert_eq!(report.attempts, 1);
    assert_eq!(report.records, 14);
    assert_eq!(harness.plan.lock().unwrap().located, vec![10, 11, 12, 13]);
}

#[tokio::test]
async fn test_replays_checkpoint_left_unmerged() {
    let harness = Harness::new(Plan::default());
    {
        let mut writer = harness.writer();
        let mut first: Checkpoint = (0..8)
            .map(|i| WorkItem::succeeded(i, &format!("Company {}", i), ArtifactFlags::default()))
            .collect::<Vec<_>>()
            .into();
        writer.flush(&mut first).unwrap();
    }

    // Blob for 8..10 written, merge never happened
    let blob = serde_json::json!({
        "report": [true, true],
        "tearsheet": [false, false],
        "industry-report": [false, false],
        "data-record-id": [8, 9],
        "name": ["Company 8", "Company 9"],
    });
    std::fs::write(
        harness.dir.path().join("dwn_map.json"),
        serde_json::to_string(&blob).unwrap(),
    )
    .unwrap();

    let mut supervisor = harness.supervisor(policy(3, 0));
    supervisor.run(Some(12)).await.unwrap();

    assert_eq!(harness.plan.lock().unwrap().located, vec![10, 11]);
    assert_eq!(harness.records().len(), 12);
}

#[tokio::test]
async fn test_skips_index_that_keeps_failing() {
    let harness = Harness::new(Plan {
        fatal_always: [5].into_iter().collect(),
        ..Plan::default()
    });
    let mut supervisor = harness.supervisor(policy(0, 2));

    let report = supervisor.run(Some(9)).await.unwrap();

    assert_eq!(report.skipped, vec![5]);
    assert_eq!(report.records, 9);
    assert!(report.gaps.is_empty());

    let records = harness.records();
    let skipped = records.iter().find(|r| r.index == 5).unwrap();
    assert_eq!(skipped.outcome, Outcome::NotFound);
    assert_eq!(skipped.note, "record 5 -> skipped after 2 failed attempts");
}

#[tokio::test]
async fn test_gives_up_after_max_attempts_without_progress() {
    let harness = Harness::new(Plan {
        fail_open: true,
        ..Plan::default()
    });
    let mut supervisor = harness.supervisor(policy(3, 0));

    let result = supervisor.run(Some(10)).await;

    match result {
        Err(CrawlError::RetriesExhausted {
            attempts,
            last_index,
            last_error,
        }) => {
            assert_eq!(attempts, 3);
            assert_eq!(last_index, None);
            assert!(last_error.contains("listing did not load"));
        }
        other => panic!("expected RetriesExhausted, got {:?}", other.map(|r| r.attempts)),
    }

    let ledger = supervisor.ledger();
    assert_eq!(ledger.count_by_status(AttemptStatus::Failed).unwrap(), 2);
    assert_eq!(ledger.count_by_status(AttemptStatus::Abandoned).unwrap(), 1);
    assert_eq!(harness.plan.lock().unwrap().sessions_closed, 3);
}

#[tokio::test]
async fn test_listing_outage_never_skips_unvisited_records() {
    let harness = Harness::new(Plan {
        fail_open: true,
        ..Plan::default()
    });
    let mut supervisor = harness.supervisor(policy(6, 2));

    let result = supervisor.run(Some(10)).await;

    assert!(matches!(
        result,
        Err(CrawlError::RetriesExhausted { attempts: 6, .. })
    ));
    assert!(harness.plan.lock().unwrap().located.is_empty());
    assert!(harness.records().is_empty());
}

#[tokio::test]
async fn test_attempts_without_durable_progress_trip_the_breaker() {
    let harness = Harness::new(Plan::default());
    // The checkpoint directory does not exist, so no flush ever succeeds
    let store = CsvProgressStore::new(harness.dir.path().join("logger.csv"), MergeOrder::BufferFirst);
    let writer = CheckpointWriter::new(store, harness.dir.path().join("missing").join("dwn_map.json"));
    let mut supervisor = harness.supervisor_with(policy(3, 0), writer);

    let result = supervisor.run(Some(20)).await;

    assert!(matches!(
        result,
        Err(CrawlError::RetriesExhausted { attempts: 3, .. })
    ));
    assert!(harness.records().is_empty());
    assert_eq!(harness.plan.lock().unwrap().sessions_created, 3);
}

#[tokio::test]
async fn test_completed_range_starts_no_session() {
    let harness = Harness::new(Plan::default());
    {
        let mut writer = harness.writer();
        let mut done: Checkpoint = (0..5)
            .map(|i| WorkItem::succeeded(i, &format!("Company {}", i), ArtifactFlags::default()))
            .collect::<Vec<_>>()
            .into();
        writer.flush(&mut done).unwrap();
    }

    let mut supervisor = harness.supervisor(policy(3, 0));
    let report = supervisor.run(Some(5)).await.unwrap();

    assert_eq!(report.attempts, 0);
    assert_eq!(report.records, 5);
    assert_eq!(harness.plan.lock().unwrap().sessions_created, 0);
}

#[tokio::test]
async fn test_total_taken_from_session() {
    let harness = Harness::new(Plan {
        reported_total: Some(3),
        ..Plan::default()
    });
    let mut supervisor = harness.supervisor(policy(3, 0));

    let report = supervisor.run(None).await.unwrap();

    assert_eq!(report.total, 3);
    assert_eq!(report.records, 3);
}

#[tokio::test]
async fn test_unknown_total_is_an_error() {
    let harness = Harness::new(Plan::default());
    let mut supervisor = harness.supervisor(policy(3, 0));

    let result = supervisor.run(None).await;

    assert!(matches!(result, Err(CrawlError::UnknownTotal)));
    assert!(harness.records().is_empty());
}
