mod common;

use common::{FakeLlm, build_pipeline, cleanup_database, faucet_post, post_with, temp_database_url};
use groundswell::model::{EMBEDDING_DIM, PostStatus};
use groundswell::pipeline::{PipelineOutcome, StopReason};

#[tokio::test]
async fn spam_post_stops_before_enrichment() {
    let (db_path, url) = temp_database_url("spam_stop");
    let db = groundswell::db::spawn(&url).await;
    let (pipeline, _metrics, _registry) = build_pipeline(db.clone(), FakeLlm::default()).await;

    let post = post_with(
        "t3_spam",
        "Buy now! click here to win free money",
        "limited time",
    );
    let outcome = pipeline.run(&post).await.unwrap();
    assert_eq!(outcome, PipelineOutcome::Stopped(StopReason::Spam));

    let row = db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(row.status(), Some(PostStatus::Processed));
    assert_eq!(row.is_spam, Some(true));
    // Nothing downstream ran.
    assert!(row.classification.is_none());
    assert!(row.embedding.is_none());
    assert_eq!(db.count_mentions(&post.id).await.unwrap(), 0);

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn pii_match_halts_pipeline() {
    let (db_path, url) = temp_database_url("pii_stop");
    let db = groundswell::db::spawn(&url).await;
    let (pipeline, _metrics, _registry) = build_pipeline(db.clone(), FakeLlm::default()).await;

    let post = post_with(
        "t3_pii",
        "Is this identity theft?",
        "Someone posted my SSN 123-45-6789 on a forum.",
    );
    let outcome = pipeline.run(&post).await.unwrap();
    assert_eq!(outcome, PipelineOutcome::Stopped(StopReason::Pii));

    let row = db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(row.has_pii, Some(true));
    assert_eq!(db.count_mentions(&post.id).await.unwrap(), 0);

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn too_short_content_is_invalid_but_processed() {
    let (db_path, url) = temp_database_url("too_short");
    let db = groundswell::db::spawn(&url).await;
    let (pipeline, _metrics, _registry) = build_pipeline(db.clone(), FakeLlm::default()).await;

    let post = post_with("t3_short", "", "hi");
    let outcome = pipeline.run(&post).await.unwrap();
    assert_eq!(outcome, PipelineOutcome::Stopped(StopReason::Invalid));

    let row = db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(row.status(), Some(PostStatus::Processed));
    assert_eq!(row.is_valid, Some(false));
    assert_eq!(
        row.validity_reason.as_deref(),
        Some("Content too short to be meaningful")
    );
    assert!(row.classification.is_none());
    assert_eq!(db.count_mentions(&post.id).await.unwrap(), 0);

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn happy_path_produces_one_mention_and_full_record() {
    let (db_path, url) = temp_database_url("happy_path");
    let db = groundswell::db::spawn(&url).await;
    let (pipeline, metrics, _registry) = build_pipeline(db.clone(), FakeLlm::default()).await;

    let post = faucet_post();
    let outcome = pipeline.run(&post).await.unwrap();
    assert_eq!(outcome, PipelineOutcome::Completed { derived: 0 });

    let row = db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(row.status(), Some(PostStatus::Processed));
    assert_eq!(row.is_valid, Some(true));
    assert_eq!(row.classification.as_deref(), Some("question"));
    assert_eq!(row.sentiment_label.as_deref(), Some("negative"));
    assert!(row.summary.is_some());
    assert_eq!(
        row.embedding.as_ref().map(Vec::len),
        Some(EMBEDDING_DIM * 4),
        "embedding stored as f32 LE blob"
    );
    assert!(row.category_id.is_some());
    assert!(row.cluster_id.is_some());

    // Exactly one mention, singleton cluster.
    assert_eq!(db.count_mentions(&post.id).await.unwrap(), 1);
    let cluster = db
        .get_cluster(row.cluster_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cluster.member_count, 1);

    // Every stage reported into the metrics registry.
    let stages: Vec<String> = metrics.snapshot().into_iter().map(|s| s.stage).collect();
    assert!(stages.contains(&"spam_check".to_string()));
    assert!(stages.contains(&"record_mention".to_string()));

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn near_duplicate_post_joins_cluster_and_bumps_member_count() {
    let (db_path, url) = temp_database_url("cluster_join");
    let db = groundswell::db::spawn(&url).await;
    let (pipeline, _metrics, _registry) = build_pipeline(db.clone(), FakeLlm::default()).await;

    let first = faucet_post();
    pipeline.run(&first).await.unwrap();

    // Same text => same fake embedding => similarity 1.0 with the centroid.
    let second = post_with("t3_faucet2", &first.title, &first.body);
    pipeline.run(&second).await.unwrap();

    let row1 = db.get_post(&first.id).await.unwrap().unwrap();
    let row2 = db.get_post(&second.id).await.unwrap().unwrap();
    assert_eq!(row1.cluster_id, row2.cluster_id);

    let cluster = db
        .get_cluster(row1.cluster_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cluster.member_count, 2);

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn rerun_is_idempotent() {
    let (db_path, url) = temp_database_url("idempotent");
    let db = groundswell::db::spawn(&url).await;
    let (pipeline, _metrics, _registry) = build_pipeline(db.clone(), FakeLlm::default()).await;

    let post = faucet_post();
    assert_eq!(
        pipeline.run(&post).await.unwrap(),
        PipelineOutcome::Completed { derived: 0 }
    );
    let first_row = db.get_post(&post.id).await.unwrap().unwrap();

    // Second execution returns without doing work.
    assert_eq!(
        pipeline.run(&post).await.unwrap(),
        PipelineOutcome::AlreadyProcessed
    );

    let second_row = db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(db.count_mentions(&post.id).await.unwrap(), 1);
    assert_eq!(first_row.cluster_id, second_row.cluster_id);
    assert_eq!(first_row.processed_at, second_row.processed_at);

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn llm_invalid_verdict_stops_pipeline() {
    let (db_path, url) = temp_database_url("invalid_verdict");
    let db = groundswell::db::spawn(&url).await;

    let llm = FakeLlm {
        validity_reply: r#"{"is_valid": false, "reason": "Just a meme"}"#.to_string(),
        ..FakeLlm::default()
    };
    let (pipeline, _metrics, _registry) = build_pipeline(db.clone(), llm).await;

    let post = faucet_post();
    let outcome = pipeline.run(&post).await.unwrap();
    assert_eq!(outcome, PipelineOutcome::Stopped(StopReason::Invalid));

    let row = db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(row.is_valid, Some(false));
    assert_eq!(row.validity_reason.as_deref(), Some("Just a meme"));
    assert_eq!(db.count_mentions(&post.id).await.unwrap(), 0);

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn unparseable_classification_defaults_to_other() {
    let (db_path, url) = temp_database_url("classify_default");
    let db = groundswell::db::spawn(&url).await;

    let llm = FakeLlm {
        classification_reply: "definitely not json".to_string(),
        ..FakeLlm::default()
    };
    let (pipeline, _metrics, _registry) = build_pipeline(db.clone(), llm).await;

    let post = faucet_post();
    pipeline.run(&post).await.unwrap();

    let row = db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(row.classification.as_deref(), Some("other"));
    assert_eq!(row.classification_confidence, Some(0.0));

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn embedding_failure_skips_mention_but_completes() {
    let (db_path, url) = temp_database_url("embed_fail");
    let db = groundswell::db::spawn(&url).await;

    let llm = FakeLlm {
        embed_error: Some("embedding endpoint down".to_string()),
        ..FakeLlm::default()
    };
    let (pipeline, _metrics, _registry) = build_pipeline(db.clone(), llm).await;

    let post = faucet_post();
    let outcome = pipeline.run(&post).await.unwrap();
    assert_eq!(outcome, PipelineOutcome::Completed { derived: 0 });

    let row = db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(row.status(), Some(PostStatus::Processed));
    assert!(row.embedding.is_none());
    assert!(row.cluster_id.is_none());
    // Cluster stage failed, so the mention invariant holds: none recorded.
    assert_eq!(db.count_mentions(&post.id).await.unwrap(), 0);

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn derived_problems_become_linked_records() {
    let (db_path, url) = temp_database_url("derived");
    let db = groundswell::db::spawn(&url).await;

    let llm = FakeLlm {
        validity_reply: r#"{
            "is_valid": true,
            "reason": "Two distinct problems",
            "derived_problems": [
                {"label": "Dripping faucet", "explanation": "The faucet drips constantly.", "industry": "Home & DIY"},
                {"label": "Water damage to cabinet", "explanation": "The cabinet under the sink is warping.", "industry": "Home & DIY"}
            ]
        }"#
        .to_string(),
        ..FakeLlm::default()
    };
    let (pipeline, _metrics, _registry) = build_pipeline(db.clone(), llm).await;

    let post = faucet_post();
    let outcome = pipeline.run(&post).await.unwrap();
    assert_eq!(outcome, PipelineOutcome::Completed { derived: 2 });

    // Parent fully processed with its own mention.
    let parent = db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(parent.status(), Some(PostStatus::Processed));
    assert_eq!(db.count_mentions(&post.id).await.unwrap(), 1);

    // Derived records exist, are linked, and were processed downstream.
    let unprocessed = db.fetch_unprocessed(10).await.unwrap();
    assert!(unprocessed.is_empty(), "derived records must not linger unprocessed");

    cleanup_database(&db_path).await;
}
