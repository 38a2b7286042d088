use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::mocks::{keys, run_to_completion, HarnessBuilder, StubStretcher, ToneMeter, STRETCHED_FILE};
use crate::errors::AppError;
use crate::orchestrator::wait::sleep_ticks;
use crate::orchestrator::{BatchRunner, BatchSummary, DisplayCommand, JobStatus};
use crate::persistence::JobStore;
use crate::sync::{validate_timeline, TimestampsSource};

fn statuses(h: &super::mocks::Harness) -> Vec<(JobStatus, String)> {
    h.ctx
        .jobs()
        .into_iter()
        .map(|j| (j.status, j.short_message))
        .collect()
}

fn blocked_count(h: &super::mocks::Harness) -> usize {
    h.ctx
        .credentials
        .status()
        .iter()
        .filter(|s| s.blocked_minutes_left.is_some())
        .count()
}

#[tokio::test]
async fn test_successful_jobs_complete_and_clear_session() {
    let mut h = HarnessBuilder::new(&["https://a", "https://b"]).build();

    let summary = run_to_completion(&h).await;

    assert_eq!(
        summary,
        BatchSummary {
            success: 2,
            failed: 0,
            skipped: 0
        }
    );
    let jobs = h.ctx.jobs();
    assert!(jobs.iter().all(|j| j.status == JobStatus::Completed));
    assert_eq!(jobs[0].remark, "라면");
    assert_eq!(h.usage.urls.lock().len(), 2);
    assert_eq!(h.renderer.renders.lock().len(), 2);
    assert!(h.store.load().unwrap().is_none(), "без незавершенных заданий сессия удаляется");

    let mut finished = None;
    while let Ok(command) = h.rx.try_recv() {
        if let DisplayCommand::RunFinished(s) = command {
            finished = Some(s);
        }
    }
    assert_eq!(finished, Some(summary));
}

#[tokio::test]
async fn test_quota_rotates_once_per_attempt_then_fails() {
    let mut builder = HarnessBuilder::new(&["https://a"]);
    builder.credentials = keys(5);
    builder.content = super::mocks::ScriptedContent::failing(
        (0..5)
            .map(|_| AppError::QuotaExceeded("RESOURCE_EXHAUSTED".to_string()))
            .collect(),
    );
    let h = builder.build();

    let summary = run_to_completion(&h).await;

    assert_eq!(summary.failed, 1);
    assert_eq!(statuses(&h), vec![(JobStatus::Failed, "API한도초과".to_string())]);
    assert_eq!(h.content.calls(), 5);
    assert_eq!(blocked_count(&h), 4, "четыре повтора: по одной блокировке на попытку");
    assert_eq!(*h.content.secrets.lock(), vec!["s1", "s2", "s3", "s4", "s5"]);
}

#[tokio::test]
async fn test_quota_recovers_after_rotation() {
    let mut builder = HarnessBuilder::new(&["https://a"]);
    builder.credentials = keys(3);
    builder.content = super::mocks::ScriptedContent::failing(vec![
        AppError::QuotaExceeded("429".to_string()),
        AppError::Other("status 429 quota exceeded".to_string()),
    ]);
    let h = builder.build();

    let summary = run_to_completion(&h).await;

    assert_eq!(summary.success, 1);
    assert_eq!(blocked_count(&h), 2);
    assert_eq!(h.content.calls(), 3);
}

#[tokio::test]
async fn test_permission_without_spare_key_fails_immediately() {
    let mut builder = HarnessBuilder::new(&["https://a"]);
    builder.credentials = keys(1);
    builder.content = super::mocks::ScriptedContent::failing(vec![AppError::PermissionDenied(
        "API key suspended".to_string(),
    )]);
    let h = builder.build();

    let summary = run_to_completion(&h).await;

    assert_eq!(summary.failed, 1);
    assert_eq!(statuses(&h), vec![(JobStatus::Failed, "API권한없음".to_string())]);
    assert_eq!(h.content.calls(), 1);
}

#[tokio::test]
async fn test_permission_rotates_and_retries() {
    let mut builder = HarnessBuilder::new(&["https://a"]);
    builder.credentials = keys(2);
    builder.content = super::mocks::ScriptedContent::failing(vec![AppError::Other(
        "403 Forbidden".to_string(),
    )]);
    let h = builder.build();

    let summary = run_to_completion(&h).await;

    assert_eq!(summary.success, 1);
    assert_eq!(*h.content.secrets.lock(), vec!["s1", "s2"]);
}

#[tokio::test]
async fn test_source_duration_outside_window_is_skipped() {
    let mut builder = HarnessBuilder::new(&["https://short", "https://long", "https://ok"]);
    builder.durations.insert("https://short".to_string(), 5.0);
    builder.durations.insert("https://long".to_string(), 45.0);
    let h = builder.build();

    let summary = run_to_completion(&h).await;

    assert_eq!(
        summary,
        BatchSummary {
            success: 1,
            failed: 0,
            skipped: 2
        }
    );
    assert_eq!(
        statuses(&h),
        vec![
            (JobStatus::Skipped, "너무짧음5초".to_string()),
            (JobStatus::Skipped, "길이초과45초".to_string()),
            (JobStatus::Completed, String::new()),
        ]
    );
    assert_eq!(h.content.calls(), 1, "пропущенные задания не доходят до анализа");
    assert_eq!(blocked_count(&h), 0);
}

#[tokio::test]
async fn test_overload_waits_do_not_count_retries() {
    let mut builder = HarnessBuilder::new(&["https://a"]);
    builder.content = super::mocks::ScriptedContent::failing(
        (0..7)
            .map(|_| AppError::ServerOverloaded("model is overloaded".to_string()))
            .collect(),
    );
    let h = builder.build();

    let summary = run_to_completion(&h).await;

    assert_eq!(summary.success, 1, "перегрузка не расходует лимит повторов");
    assert_eq!(h.content.calls(), 8);
    assert_eq!(blocked_count(&h), 0);
}

#[tokio::test]
async fn test_overload_cap_fails_job() {
    let mut builder = HarnessBuilder::new(&["https://a"]);
    builder.config.orchestrator.max_overload_waits = Some(2);
    builder.content = super::mocks::ScriptedContent::failing(
        (0..3)
            .map(|_| AppError::ServerOverloaded("busy".to_string()))
            .collect(),
    );
    let h = builder.build();

    let summary = run_to_completion(&h).await;

    assert_eq!(summary.failed, 1);
    assert_eq!(statuses(&h), vec![(JobStatus::Failed, "서버과부하".to_string())]);
    assert_eq!(h.content.calls(), 3);
}

#[tokio::test]
async fn test_server_error_retries_then_succeeds() {
    let mut builder = HarnessBuilder::new(&["https://a"]);
    builder.content = super::mocks::ScriptedContent::failing(vec![
        AppError::ServerError("HTTP 500: oops".to_string()),
        AppError::ServerError("HTTP 500: oops".to_string()),
    ]);
    let h = builder.build();

    let summary = run_to_completion(&h).await;
    assert_eq!(summary.success, 1);
    assert_eq!(h.content.calls(), 3);
}

#[tokio::test]
async fn test_unclassified_error_fails_without_retry_and_run_continues() {
    let mut builder = HarnessBuilder::new(&["https://a", "https://b"]);
    builder.content = super::mocks::ScriptedContent::failing(vec![AppError::Other(
        "subtitle overlay missing".to_string(),
    )]);
    let h = builder.build();

    let summary = run_to_completion(&h).await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.success, 1);
    assert_eq!(statuses(&h)[0], (JobStatus::Failed, "자막처리오류".to_string()));
}

#[tokio::test]
async fn test_panicking_job_is_recorded_as_failed() {
    let builder = HarnessBuilder::new(&["https://a", "https://b"]);
    *builder.content.panic_once.lock() = true;
    let h = builder.build();

    let summary = run_to_completion(&h).await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.success, 1);
    assert_eq!(h.ctx.jobs()[0].status, JobStatus::Failed);
}

#[tokio::test]
async fn test_usage_failure_is_not_fatal() {
    let mut builder = HarnessBuilder::new(&["https://a"]);
    builder.usage.fail = true;
    let h = builder.build();

    let summary = run_to_completion(&h).await;
    assert_eq!(summary.success, 1);
    assert_eq!(h.ctx.jobs()[0].status, JobStatus::Completed);
}

#[tokio::test]
async fn test_cancelled_run_keeps_jobs_pending_and_saves_session() {
    let h = HarnessBuilder::new(&["https://a", "https://b"]).build();
    h.ctx.cancel();

    let summary = BatchRunner::new(h.ctx.clone(), h.pipeline.clone()).run().await;

    assert_eq!(summary, BatchSummary::default());
    assert_eq!(h.content.analyze_calls.load(Ordering::SeqCst), 0);
    let saved = h.store.load().unwrap().expect("незавершенные задания сохраняются");
    assert_eq!(saved.stats.waiting, 2);
}

#[tokio::test]
async fn test_idle_run_picks_up_job_enqueued_later() {
    let h = HarnessBuilder::new(&[]).build();
    let runner = BatchRunner::new(h.ctx.clone(), h.pipeline.clone());
    let ctx = h.ctx.clone();

    let feeder = async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!ctx.is_cancelled(), "пустая очередь не завершает запуск");
        ctx.enqueue("https://late").unwrap();
        while ctx.pending_count() > 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        ctx.cancel();
    };
    let (summary, _) = tokio::join!(runner.run(), feeder);

    assert_eq!(summary.success, 1);
    assert_eq!(statuses(&h), vec![(JobStatus::Completed, String::new())]);
    assert_eq!(h.content.calls(), 1);
}

#[tokio::test]
async fn test_idle_run_ends_only_on_stop() {
    let h = HarnessBuilder::new(&[]).build();
    let runner = BatchRunner::new(h.ctx.clone(), h.pipeline.clone());

    let still_running = tokio::time::timeout(Duration::from_millis(50), runner.run()).await;
    assert!(still_running.is_err(), "запуск ждет новые задания до остановки");

    h.ctx.cancel();
    let summary = tokio::time::timeout(Duration::from_secs(2), runner.run()).await;
    assert_eq!(summary.ok(), Some(BatchSummary::default()));
}

#[tokio::test]
async fn test_stage_timeout_waits_as_overload_and_retries() {
    let mut builder = HarnessBuilder::new(&["https://a"]);
    builder.config.orchestrator.call_timeout_secs = 1;
    *builder.content.stall_once.lock() = Some(Duration::from_secs(2));
    let h = builder.build();

    let summary = run_to_completion(&h).await;

    assert_eq!(summary.success, 1);
    assert_eq!(h.content.calls(), 2, "после таймаута анализ повторяется");
    assert_eq!(blocked_count(&h), 0, "таймаут не блокирует ключ");
    assert_eq!(statuses(&h), vec![(JobStatus::Completed, String::new())]);
}

#[tokio::test]
async fn test_post_stretch_moves_timeline_onto_stretched_audio() {
    let mut builder = HarnessBuilder::new(&["https://a"]);
    builder.config.orchestrator.post_stretch_ratio = 1.25;
    builder.meter = ToneMeter {
        normal: 6.0,
        stretched: 4.75,
    };
    let stretcher = Arc::new(StubStretcher::default());
    builder.stretcher = Some(stretcher.clone());
    let sync = builder.config.sync.clone();
    let h = builder.build();

    let summary = run_to_completion(&h).await;

    assert_eq!(summary.success, 1);
    let rendered = h.renderer.rendered.lock();
    assert!(!rendered.is_empty());
    assert_eq!(stretcher.ratios.lock().len(), rendered.len());
    assert!(stretcher.ratios.lock().iter().all(|r| (*r - 1.25).abs() < 1e-9));
    for render in rendered.iter() {
        assert!(render.audio.ends_with(STRETCHED_FILE));
        assert_eq!(render.metadata.timestamps_source, TimestampsSource::Preserved);
        assert!((render.metadata.audio_duration - 4.95).abs() < 1e-6);
        assert!(!render.segments.is_empty());
        assert!(render
            .segments
            .iter()
            .all(|seg| seg.audio_path.as_deref() == Some(render.audio.as_path())));
        let last = render.segments.last().unwrap();
        assert!(last.end <= 4.95);
        assert!(validate_timeline(&render.segments, 4.95, sync.overlap_epsilon, sync.end_tolerance).is_ok());
    }
}

#[test]
fn test_sleep_ticks_stops_on_cancel() {
    let token = CancellationToken::new();
    token.cancel();
    let result = tokio_test::block_on(sleep_ticks(
        Duration::from_secs(60),
        Duration::from_millis(10),
        &token,
    ));
    assert!(matches!(result, Err(AppError::Cancelled)));

    let fresh = CancellationToken::new();
    let result = tokio_test::block_on(sleep_ticks(
        Duration::from_millis(20),
        Duration::from_millis(5),
        &fresh,
    ));
    assert!(result.is_ok());
}
