use std::fs;

use crate::orchestrator::{Job, JobStatus};
use crate::persistence::{JobStore, JsonSessionStore, MemoryJobStore, SessionSnapshot};

fn job(url: &str, status: JobStatus, message: &str) -> Job {
    let mut job = Job::new(url);
    job.status = status;
    job.short_message = message.to_string();
    job
}

#[test]
fn test_restore_resets_processing_and_keeps_terminal_states() {
    let jobs = vec![
        job("https://a", JobStatus::Completed, ""),
        job("https://b", JobStatus::Processing, ""),
        job("https://c", JobStatus::Failed, "API한도초과"),
        job("https://d", JobStatus::Skipped, "길이초과45초"),
    ];

    let restored = SessionSnapshot::from_jobs(&jobs).into_jobs();
    let statuses: Vec<JobStatus> = restored.iter().map(|j| j.status).collect();
    assert_eq!(
        statuses,
        vec![
            JobStatus::Completed,
            JobStatus::Waiting,
            JobStatus::Failed,
            JobStatus::Skipped
        ]
    );
    assert_eq!(restored[2].short_message, "API한도초과");
    assert_eq!(restored[3].short_message, "길이초과45초");
}

#[test]
fn test_missing_or_null_status_reads_as_waiting() {
    let raw = r#"{
        "url_queue": ["https://a", "https://b"],
        "url_status": {"https://b": null},
        "url_remarks": {"https://a": "note"}
    }"#;
    let snapshot: SessionSnapshot = serde_json::from_str(raw).unwrap();
    let jobs = snapshot.into_jobs();

    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j.status == JobStatus::Waiting));
    assert_eq!(jobs[0].remark, "note");
}

#[test]
fn test_processing_url_outside_queue_is_appended() {
    let raw = r#"{
        "url_queue": ["https://a"],
        "url_status": {"https://a": "completed", "https://lost": "processing"}
    }"#;
    let snapshot: SessionSnapshot = serde_json::from_str(raw).unwrap();
    let jobs = snapshot.into_jobs();

    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[1].url, "https://lost");
    assert_eq!(jobs[1].status, JobStatus::Waiting);
}

#[test]
fn test_orphan_urls_are_appended_in_stable_order() {
    let raw = r#"{
        "url_queue": ["https://a"],
        "url_status": {
            "https://a": "completed",
            "https://z": "processing",
            "https://m": "processing",
            "https://b": "processing",
            "https://c": "processing"
        },
        "url_updated_at": {
            "https://z": "2026-01-01T10:00:00Z",
            "https://m": "2026-01-01T09:00:00Z"
        }
    }"#;
    for _ in 0..5 {
        let snapshot: SessionSnapshot = serde_json::from_str(raw).unwrap();
        let urls: Vec<String> = snapshot.into_jobs().into_iter().map(|j| j.url).collect();
        assert_eq!(urls, vec!["https://a", "https://b", "https://c", "https://m", "https://z"]);
    }
}

#[test]
fn test_json_store_save_load_clear() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonSessionStore::new(dir.path().join("session.json"));
    assert!(store.load().unwrap().is_none());

    let first = SessionSnapshot::from_jobs(&[job("https://a", JobStatus::Waiting, "")]);
    store.save(&first).unwrap();
    assert!(!store.backup_path().exists(), "резервная копия появляется со второго сохранения");

    let second = SessionSnapshot::from_jobs(&[
        job("https://a", JobStatus::Completed, ""),
        job("https://b", JobStatus::Waiting, ""),
    ]);
    store.save(&second).unwrap();
    assert!(store.backup_path().exists());

    let loaded = store.load().unwrap().unwrap();
    assert_eq!(loaded.url_queue, vec!["https://a", "https://b"]);
    assert_eq!(loaded.stats.completed, 1);
    assert_eq!(loaded.stats.waiting, 1);

    store.clear().unwrap();
    assert!(!store.path().exists());
    assert!(!store.backup_path().exists());
    assert!(store.load().unwrap().is_none());
}

#[test]
fn test_corrupt_session_falls_back_to_backup() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonSessionStore::new(dir.path().join("session.json"));
    store
        .save(&SessionSnapshot::from_jobs(&[job("https://a", JobStatus::Waiting, "")]))
        .unwrap();
    store
        .save(&SessionSnapshot::from_jobs(&[job("https://a", JobStatus::Completed, "")]))
        .unwrap();

    fs::write(store.path(), "{ not json").unwrap();
    let loaded = store.load().unwrap().unwrap();
    assert_eq!(loaded.url_status["https://a"], Some(JobStatus::Waiting));
}

#[test]
fn test_memory_store_roundtrip() {
    let store = MemoryJobStore::new();
    assert!(store.load().unwrap().is_none());
    store
        .save(&SessionSnapshot::from_jobs(&[job("https://a", JobStatus::Failed, "알수없음")]))
        .unwrap();
    assert_eq!(store.load().unwrap().unwrap().url_status_message["https://a"], "알수없음");
    store.clear().unwrap();
    assert!(store.load().unwrap().is_none());
}
