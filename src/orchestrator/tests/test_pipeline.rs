use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::mocks::HarnessBuilder;
use crate::errors::AppError;
use crate::orchestrator::pipeline::stage;

#[tokio::test]
async fn test_stop_lets_started_call_finish() {
    let h = HarnessBuilder::new(&["https://a"]).build();
    let finished = Arc::new(AtomicBool::new(false));
    let flag = finished.clone();
    let call = async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        flag.store(true, Ordering::SeqCst);
        Ok::<_, AppError>(7)
    };
    let ctx = h.ctx.clone();
    let stopper = async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        ctx.cancel();
    };

    let (result, _) = tokio::join!(stage(&h.ctx, "https://a", "analysis", call), stopper);

    assert_eq!(result.ok(), Some(7));
    assert!(finished.load(Ordering::SeqCst), "начатый вызов доводится до конца");
    assert!(h.ctx.is_cancelled());
}

#[tokio::test]
async fn test_stage_is_not_started_after_stop() {
    let h = HarnessBuilder::new(&["https://a"]).build();
    h.ctx.cancel();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let result = stage(&h.ctx, "https://a", "tts", async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, AppError>(())
    })
    .await;

    assert!(matches!(result, Err(AppError::Cancelled)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stage_over_limit_is_a_timeout() {
    let mut builder = HarnessBuilder::new(&["https://a"]);
    builder.config.orchestrator.call_timeout_secs = 1;
    let h = builder.build();

    let result = stage(&h.ctx, "https://a", "render", async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        Ok::<_, AppError>(())
    })
    .await;

    assert!(matches!(result, Err(AppError::Timeout(_))));
}
