mod common;

use common::{cleanup_database, temp_database_url};
use groundswell::cluster::vector::{cosine_similarity, from_blob};
use groundswell::model::EMBEDDING_DIM;

fn axis_embedding(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[axis] = 1.0;
    v
}

/// Two unit vectors with a controlled cosine similarity.
fn angled_embedding(cos: f32) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[0] = cos;
    v[1] = (1.0 - cos * cos).sqrt();
    v
}

#[tokio::test]
async fn empty_registry_creates_singleton_cluster() {
    let (db_path, url) = temp_database_url("registry_create");
    let db = groundswell::db::spawn(&url).await;
    let registry = groundswell::cluster::spawn(db.clone()).await;

    assert_eq!(registry.cluster_count().await.unwrap(), 0);
    assert!(registry
        .find_nearest(axis_embedding(0), 0.7)
        .await
        .unwrap()
        .is_none());

    let outcome = registry
        .assign(axis_embedding(0), 0.7, Some("dripping faucet".to_string()), None)
        .await
        .unwrap();
    assert!(outcome.created);
    assert_eq!(outcome.member_count, 1);

    let cluster = db.get_cluster(outcome.cluster_id).await.unwrap().unwrap();
    assert_eq!(cluster.member_count, 1);
    assert_eq!(cluster.centroid_vec(), axis_embedding(0));
    assert!(cluster.name.starts_with("dripping-faucet"));

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn similarity_at_threshold_counts_as_nearest() {
    let (db_path, url) = temp_database_url("registry_threshold");
    let db = groundswell::db::spawn(&url).await;
    let registry = groundswell::cluster::spawn(db.clone()).await;

    registry
        .assign(axis_embedding(0), 0.7, None, None)
        .await
        .unwrap();

    // Identical vector scores exactly 1.0; with threshold 1.0 the match is
    // similarity == threshold, so >= (not >) must be the comparison.
    let found = registry.find_nearest(axis_embedding(0), 1.0).await.unwrap();
    let found = found.expect("similarity == threshold must match");
    assert!((found.similarity - 1.0).abs() < 1e-6);

    // Comfortably below the threshold: no match.
    let below = angled_embedding(0.5);
    assert!(registry.find_nearest(below, 0.7).await.unwrap().is_none());

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn incremental_update_tracks_running_mean() {
    let (db_path, url) = temp_database_url("registry_incremental");
    let db = groundswell::db::spawn(&url).await;
    let registry = groundswell::cluster::spawn(db.clone()).await;

    let first = registry
        .assign(angled_embedding(1.0), 0.7, None, None)
        .await
        .unwrap();
    let second = registry
        .assign(angled_embedding(0.9), 0.7, None, None)
        .await
        .unwrap();

    assert_eq!(first.cluster_id, second.cluster_id);
    assert!(!second.created);
    assert_eq!(second.member_count, 2);

    let cluster = db.get_cluster(first.cluster_id).await.unwrap().unwrap();
    assert_eq!(cluster.member_count, 2);
    let centroid = cluster.centroid_vec();
    // Mean of the two members, computed independently.
    let expected_0 = (1.0 + 0.9) / 2.0;
    let expected_1 = (0.0 + (1.0f32 - 0.81).sqrt()) / 2.0;
    assert!((centroid[0] - expected_0).abs() < 1e-5);
    assert!((centroid[1] - expected_1).abs() < 1e-5);

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn recompute_restores_centroid_from_members() {
    let (db_path, url) = temp_database_url("registry_recompute");
    let db = groundswell::db::spawn(&url).await;
    let registry = groundswell::cluster::spawn(db.clone()).await;

    let outcome = registry
        .assign(axis_embedding(3), 0.7, None, None)
        .await
        .unwrap();

    // Two processed member posts carry the embeddings of record.
    for (id, axis) in [("m1", 3usize), ("m2", 4usize)] {
        let post = common::post_with(id, "member", "body long enough for checks");
        db.upsert_raw_post(post, None).await.unwrap();
        db.acquire_post_lock(id, 3).await.unwrap();
        db.apply_post_patch(
            id,
            groundswell::db::PostPatch {
                embedding: Some(groundswell::cluster::vector::to_blob(&axis_embedding(axis))),
                cluster_id: Some(outcome.cluster_id),
                ..groundswell::db::PostPatch::default()
            },
        )
        .await
        .unwrap();
        db.mark_processed(id).await.unwrap();
    }

    // Drift the stored centroid, then recompute from members.
    db.update_centroid(
        outcome.cluster_id,
        groundswell::cluster::vector::to_blob(&axis_embedding(9)),
        7,
    )
    .await
    .unwrap();

    let updated = registry.recompute_all().await.unwrap();
    assert_eq!(updated, 1);

    let cluster = db.get_cluster(outcome.cluster_id).await.unwrap().unwrap();
    assert_eq!(cluster.member_count, 2);
    let centroid = cluster.centroid_vec();
    assert!((centroid[3] - 0.5).abs() < 1e-6);
    assert!((centroid[4] - 0.5).abs() < 1e-6);

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn merge_similar_absorbs_smaller_cluster() {
    let (db_path, url) = temp_database_url("registry_merge");
    let db = groundswell::db::spawn(&url).await;
    let registry = groundswell::cluster::spawn(db.clone()).await;

    // Two clusters with near-identical centroids, distinct members.
    let big = registry
        .assign(angled_embedding(1.0), 0.99, None, None)
        .await
        .unwrap();
    registry
        .assign(angled_embedding(1.0), 0.99, None, None)
        .await
        .unwrap();
    let small = registry
        .assign(angled_embedding(0.97), 0.999, None, None)
        .await
        .unwrap();
    assert_ne!(big.cluster_id, small.cluster_id);

    for (id, cluster_id, cos) in [
        ("b1", big.cluster_id, 1.0f32),
        ("b2", big.cluster_id, 1.0),
        ("s1", small.cluster_id, 0.97),
    ] {
        let post = common::post_with(id, "member", "body long enough for checks");
        db.upsert_raw_post(post, None).await.unwrap();
        db.apply_post_patch(
            id,
            groundswell::db::PostPatch {
                embedding: Some(groundswell::cluster::vector::to_blob(&angled_embedding(cos))),
                cluster_id: Some(cluster_id),
                ..groundswell::db::PostPatch::default()
            },
        )
        .await
        .unwrap();
    }

    let merges = registry.merge_similar(0.95).await.unwrap();
    assert_eq!(merges, 1);
    assert_eq!(registry.cluster_count().await.unwrap(), 1);

    // The loser is gone and its member now points at the survivor.
    assert!(db.get_cluster(small.cluster_id).await.unwrap().is_none());
    let moved = db.get_post("s1").await.unwrap().unwrap();
    assert_eq!(moved.cluster_id, Some(big.cluster_id));

    let survivor = db.get_cluster(big.cluster_id).await.unwrap().unwrap();
    assert_eq!(survivor.member_count, 3);
    let centroid = survivor.centroid_vec();
    let expected = cosine_similarity(&centroid, &angled_embedding(1.0));
    assert!(expected > 0.95);

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn outliers_move_to_their_nearest_cluster() {
    let (db_path, url) = temp_database_url("registry_outliers");
    let db = groundswell::db::spawn(&url).await;
    let registry = groundswell::cluster::spawn(db.clone()).await;

    let a = registry.assign(axis_embedding(0), 0.7, None, None).await.unwrap();
    let b = registry.assign(axis_embedding(5), 0.7, None, None).await.unwrap();
    assert_ne!(a.cluster_id, b.cluster_id);

    // A processed post whose embedding clearly belongs to B but sits in A.
    let post = common::post_with("outlier", "misfiled", "body long enough for checks");
    db.upsert_raw_post(post, None).await.unwrap();
    db.acquire_post_lock("outlier", 3).await.unwrap();
    db.apply_post_patch(
        "outlier",
        groundswell::db::PostPatch {
            embedding: Some(groundswell::cluster::vector::to_blob(&axis_embedding(5))),
            cluster_id: Some(a.cluster_id),
            ..groundswell::db::PostPatch::default()
        },
    )
    .await
    .unwrap();
    db.mark_processed("outlier").await.unwrap();

    let moved = registry.reassign_outliers().await.unwrap();
    assert_eq!(moved, 1);

    let row = db.get_post("outlier").await.unwrap().unwrap();
    assert_eq!(row.cluster_id, Some(b.cluster_id));

    cleanup_database(&db_path).await;
}

#[tokio::test]
async fn centroid_blob_roundtrip_through_store() {
    let (db_path, url) = temp_database_url("registry_blob");
    let db = groundswell::db::spawn(&url).await;

    let centroid = angled_embedding(0.42);
    let id = db
        .insert_cluster("roundtrip", groundswell::cluster::vector::to_blob(&centroid), None)
        .await
        .unwrap();

    let row = db.get_cluster(id).await.unwrap().unwrap();
    assert_eq!(from_blob(&row.centroid), centroid);

    cleanup_database(&db_path).await;
}
