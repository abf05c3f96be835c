mod common;

use common::{FakeLlm, build_pipeline, cleanup_database, faucet_post, post_with, temp_database_url};
use groundswell::model::PostStatus;
use groundswell::queue::{JobQueue, QueueRefiller, spawn_workers};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

async fn wait_until<F, Fut>(mut check: F, timeout: Duration)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within {timeout:?}"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn workers_drain_the_queue() {
    let (db_path, url) = temp_database_url("worker_drain");
    let db = groundswell::db::spawn(&url).await;
    let (pipeline, _metrics, _registry) = build_pipeline(db.clone(), FakeLlm::default()).await;
    let queue = Arc::new(JobQueue::new(db.clone(), 3, 500));

    let posts = vec![
        faucet_post(),
        post_with("t3_q2", "Another broken thing", "The dishwasher swallows forks whole."),
        post_with("t3_q3", "Third problem", "My bike brakes squeal in the rain."),
    ];
    assert_eq!(queue.enqueue_bulk(&posts).await.unwrap(), 3);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (refill_tx, _refill_rx) = mpsc::channel(16);
    spawn_workers(queue.clone(), pipeline, 2, refill_tx, shutdown_rx);

    let q = queue.clone();
    wait_until(
        || {
            let q = q.clone();
            async move {
                let counts = q.counts().await.unwrap();
                counts.completed == 3 && counts.waiting == 0 && counts.active == 0
            }
        },
        Duration::from_secs(10),
    )
    .await;

    let _ = shutdown_tx.send(true);

    for post in &posts {
        let row = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(row.status(), Some(PostStatus::Processed));
        assert_eq!(db.count_mentions(&post.id).await.unwrap(), 1);
    }

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn duplicate_enqueue_processes_once() {
    let (db_path, url) = temp_database_url("dup_enqueue");
    let db = groundswell::db::spawn(&url).await;
    let (pipeline, _metrics, _registry) = build_pipeline(db.clone(), FakeLlm::default()).await;
    let queue = Arc::new(JobQueue::new(db.clone(), 3, 500));

    let post = faucet_post();
    queue.enqueue(&post).await.unwrap();
    queue.enqueue(&post).await.unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (refill_tx, _refill_rx) = mpsc::channel(16);
    spawn_workers(queue.clone(), pipeline, 2, refill_tx, shutdown_rx);

    let q = queue.clone();
    wait_until(
        || {
            let q = q.clone();
            async move {
                let counts = q.counts().await.unwrap();
                counts.completed == 2
            }
        },
        Duration::from_secs(10),
    )
    .await;
    let _ = shutdown_tx.send(true);

    // Both jobs completed, but the enrichment ran exactly once.
    assert_eq!(db.count_mentions(&post.id).await.unwrap(), 1);

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn refiller_tops_up_from_unprocessed_store() {
    let (db_path, url) = temp_database_url("refiller");
    let db = groundswell::db::spawn(&url).await;
    let queue = Arc::new(JobQueue::new(db.clone(), 3, 500));

    // Store holds unprocessed posts but the queue is empty.
    db.upsert_raw_post(faucet_post(), None).await.unwrap();
    db.upsert_raw_post(
        post_with("t3_r2", "Second candidate", "A long enough body for the check."),
        None,
    )
    .await
    .unwrap();

    let refiller = QueueRefiller::new(db.clone(), queue.clone(), 3, 10);
    let enqueued = refiller.refill_if_low().await.unwrap();
    assert_eq!(enqueued, 2);

    // Candidates are now in flight, so a second pass adds nothing.
    let again = refiller.refill_if_low().await.unwrap();
    assert_eq!(again, 0);

    let counts = queue.counts().await.unwrap();
    assert_eq!(counts.waiting, 2);

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn refiller_respects_low_threshold() {
    let (db_path, url) = temp_database_url("refiller_threshold");
    let db = groundswell::db::spawn(&url).await;
    let queue = Arc::new(JobQueue::new(db.clone(), 3, 500));

    // Queue already above the low watermark.
    for i in 0..5 {
        db.enqueue_job(&format!("busy{i}"), "{}", 3, 0).await.unwrap();
    }
    db.upsert_raw_post(faucet_post(), None).await.unwrap();

    let refiller = QueueRefiller::new(db.clone(), queue, 3, 10);
    assert_eq!(refiller.refill_if_low().await.unwrap(), 0);

    cleanup_database(&db_path).await;
}
