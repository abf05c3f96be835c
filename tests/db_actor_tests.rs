mod common;

use common::{cleanup_database, faucet_post, post_with, temp_database_url};
use groundswell::db::NewMention;
use groundswell::model::PostStatus;

#[tokio::test]
async fn post_lifecycle_and_lock() {
    let (db_path, url) = temp_database_url("post_lifecycle");
    let db = groundswell::db::spawn(&url).await;

    let post = faucet_post();
    assert!(db.upsert_raw_post(post.clone(), None).await.unwrap());
    // Re-upserting the same id is a no-op, never a clobber.
    assert!(!db.upsert_raw_post(post.clone(), None).await.unwrap());

    let row = db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(row.status(), Some(PostStatus::Unprocessed));
    assert_eq!(row.title, post.title);
    assert_eq!(row.sub_source, "homeimprovement");

    // The lock is granted exactly once per epoch.
    assert!(db.acquire_post_lock(&post.id, 3).await.unwrap());
    assert!(!db.acquire_post_lock(&post.id, 3).await.unwrap());

    db.mark_processed(&post.id).await.unwrap();
    let row = db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(row.status(), Some(PostStatus::Processed));
    assert!(row.processed_at.is_some());

    // Processed is terminal: no further lock grants.
    assert!(!db.acquire_post_lock(&post.id, 3).await.unwrap());

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn failed_posts_retry_until_cap() {
    let (db_path, url) = temp_database_url("failed_retry");
    let db = groundswell::db::spawn(&url).await;

    let post = post_with("t3_flaky", "A post that fails", "some long enough body here");
    db.upsert_raw_post(post.clone(), None).await.unwrap();

    for attempt in 0..3 {
        assert!(
            db.acquire_post_lock(&post.id, 3).await.unwrap(),
            "attempt {attempt} should acquire"
        );
        db.mark_failed(&post.id, "boom").await.unwrap();
    }

    let row = db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(row.status(), Some(PostStatus::Failed));
    assert_eq!(row.retry_count, 3);
    assert_eq!(row.error_message.as_deref(), Some("boom"));

    // Retries exhausted: the lock is no longer granted.
    assert!(!db.acquire_post_lock(&post.id, 3).await.unwrap());

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn categories_are_unique_by_name() {
    let (db_path, url) = temp_database_url("categories");
    let db = groundswell::db::spawn(&url).await;

    let first = db
        .find_or_create_category("Home & DIY", "Household repairs", None)
        .await
        .unwrap();
    let second = db
        .find_or_create_category("Home & DIY", "different description", None)
        .await
        .unwrap();
    assert_eq!(first, second);

    let child = db
        .find_or_create_category("Plumbing", "", Some(first))
        .await
        .unwrap();
    assert_ne!(child, first);

    let names = db.list_category_names().await.unwrap();
    assert_eq!(names, vec!["Home & DIY".to_string(), "Plumbing".to_string()]);

    let row = db.get_category(child).await.unwrap().unwrap();
    assert_eq!(row.parent_id, Some(first));

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn job_queue_claim_retry_and_counts() {
    let (db_path, url) = temp_database_url("jobs");
    let db = groundswell::db::spawn(&url).await;

    let now_ms = chrono::Utc::now().timestamp_millis();
    db.enqueue_job("p1", "{\"id\":\"p1\"}", 2, now_ms).await.unwrap();
    db.enqueue_job("p2", "{\"id\":\"p2\"}", 2, now_ms).await.unwrap();

    let counts = db.job_counts().await.unwrap();
    assert_eq!(counts.waiting, 2);
    assert_eq!(counts.active, 0);

    // FIFO claim order.
    let job1 = db.claim_next_job(now_ms).await.unwrap().unwrap();
    assert_eq!(job1.post_id, "p1");
    assert_eq!(job1.attempts, 1);

    let in_flight = db.in_flight_post_ids().await.unwrap();
    assert!(in_flight.contains(&"p1".to_string()));
    assert!(in_flight.contains(&"p2".to_string()));

    // First failure reschedules with backoff in the future.
    let will_retry = db.fail_job(job1, "transient", 1000, now_ms).await.unwrap();
    assert!(will_retry);
    assert!(db.claim_next_job(now_ms).await.unwrap().unwrap().post_id == "p2");
    // p1 is not runnable until its backoff elapses.
    assert!(db.claim_next_job(now_ms).await.unwrap().is_none());

    // After the backoff window it can be claimed again, and the second
    // failure (attempts = max_attempts) is terminal.
    let job1_again = db.claim_next_job(now_ms + 10_000).await.unwrap().unwrap();
    assert_eq!(job1_again.post_id, "p1");
    assert_eq!(job1_again.attempts, 2);
    let will_retry = db
        .fail_job(job1_again, "still broken", 1000, now_ms)
        .await
        .unwrap();
    assert!(!will_retry);

    let counts = db.job_counts().await.unwrap();
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.active, 1); // p2 still claimed

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn mentions_are_append_only_rows() {
    let (db_path, url) = temp_database_url("mentions");
    let db = groundswell::db::spawn(&url).await;

    let post = faucet_post();
    db.upsert_raw_post(post.clone(), None).await.unwrap();

    let cluster_id = db
        .insert_cluster("faucet-issues", [0u8; 8].to_vec(), None)
        .await
        .unwrap();

    assert_eq!(db.count_mentions(&post.id).await.unwrap(), 0);
    db.insert_mention(NewMention {
        post_id: post.id.clone(),
        cluster_id,
        category_id: None,
        sentiment_score: Some(-0.4),
        engagement_score: 18.0,
    })
    .await
    .unwrap();
    assert_eq!(db.count_mentions(&post.id).await.unwrap(), 1);

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn trend_points_upsert_per_bucket() {
    let (db_path, url) = temp_database_url("trends");
    let db = groundswell::db::spawn(&url).await;

    let cluster_id = db
        .insert_cluster("trendy", [0u8; 8].to_vec(), None)
        .await
        .unwrap();
    let bucket = chrono::Utc::now();

    db.record_trend_point(groundswell::db::TrendPoint {
        cluster_id,
        bucket_start: bucket,
        mention_count: 3,
        avg_sentiment: Some(-0.2),
        trend_score: None,
    })
    .await
    .unwrap();

    // Same bucket again: replaced, not duplicated.
    db.record_trend_point(groundswell::db::TrendPoint {
        cluster_id,
        bucket_start: bucket,
        mention_count: 5,
        avg_sentiment: Some(-0.1),
        trend_score: Some(1.8),
    })
    .await
    .unwrap();

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn unprocessed_fetch_is_oldest_first() {
    let (db_path, url) = temp_database_url("unprocessed");
    let db = groundswell::db::spawn(&url).await;

    let mut newer = post_with("t3_newer", "newer post", "body long enough to matter");
    newer.created_at = 2_000;
    let mut older = post_with("t3_older", "older post", "body long enough to matter");
    older.created_at = 1_000;

    db.upsert_raw_posts(vec![newer, older]).await.unwrap();

    let batch = db.fetch_unprocessed(10).await.unwrap();
    let ids: Vec<&str> = batch.iter().map(|row| row.id.as_str()).collect();
    assert_eq!(ids, vec!["t3_older", "t3_newer"]);

    cleanup_database(&db_path).await;
}
