use crate::cluster::vector::{cosine_similarity, from_blob, incremental_mean, mean, to_blob};
use crate::db::DbHandle;
use crate::error::GroundswellError;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use tracing::{debug, info};
use uuid::Uuid;

/// Default assignment threshold; similarity at the threshold counts (>=).
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;

#[derive(Debug, Clone)]
struct ClusterEntry {
    id: i64,
    centroid: Vec<f32>,
    member_count: i64,
}

/// Nearest-centroid query result.
#[derive(Debug, Clone)]
pub struct NearestCluster {
    pub cluster_id: i64,
    pub similarity: f32,
}

/// Result of assigning one embedding.
#[derive(Debug, Clone)]
pub struct AssignOutcome {
    pub cluster_id: i64,
    pub created: bool,
    pub similarity: f32,
    pub member_count: i64,
}

#[derive(Debug)]
pub enum RegistryMessage {
    FindNearest {
        embedding: Vec<f32>,
        threshold: f32,
        reply: RpcReplyPort<Option<NearestCluster>>,
    },
    Assign {
        embedding: Vec<f32>,
        threshold: f32,
        name_hint: Option<String>,
        category_id: Option<i64>,
        reply: RpcReplyPort<Result<AssignOutcome, GroundswellError>>,
    },
    RecomputeAll(RpcReplyPort<Result<usize, GroundswellError>>),
    MergeSimilar {
        threshold: f32,
        reply: RpcReplyPort<Result<usize, GroundswellError>>,
    },
    ReassignOutliers(RpcReplyPort<Result<usize, GroundswellError>>),
    ClusterCount(RpcReplyPort<usize>),
}

/// Cloneable handle for the cluster registry actor.
#[derive(Clone)]
pub struct ClusterRegistryHandle {
    actor: ActorRef<RegistryMessage>,
}

impl ClusterRegistryHandle {
    /// Single nearest centroid with similarity >= threshold, if any.
    pub async fn find_nearest(
        &self,
        embedding: Vec<f32>,
        threshold: f32,
    ) -> Result<Option<NearestCluster>, GroundswellError> {
        ractor::call!(self.actor, |reply| RegistryMessage::FindNearest {
            embedding,
            threshold,
            reply
        })
        .map_err(|e| GroundswellError::Ractor(format!("Registry FindNearest RPC failed: {e}")))
    }

    /// Joins the nearest cluster (updating its centroid incrementally) or
    /// creates a fresh singleton cluster.
    pub async fn assign(
        &self,
        embedding: Vec<f32>,
        threshold: f32,
        name_hint: Option<String>,
        category_id: Option<i64>,
    ) -> Result<AssignOutcome, GroundswellError> {
        ractor::call!(self.actor, |reply| RegistryMessage::Assign {
            embedding,
            threshold,
            name_hint,
            category_id,
            reply
        })
        .map_err(|e| GroundswellError::Ractor(format!("Registry Assign RPC failed: {e}")))?
    }

    /// Batch job: reload member embeddings and reset every centroid to the
    /// arithmetic mean. Returns how many clusters were updated.
    pub async fn recompute_all(&self) -> Result<usize, GroundswellError> {
        ractor::call!(self.actor, RegistryMessage::RecomputeAll)
            .map_err(|e| GroundswellError::Ractor(format!("Registry RecomputeAll RPC failed: {e}")))?
    }

    /// Pairwise merge of near-duplicate clusters. Returns merges performed.
    pub async fn merge_similar(&self, threshold: f32) -> Result<usize, GroundswellError> {
        ractor::call!(self.actor, |reply| RegistryMessage::MergeSimilar {
            threshold,
            reply
        })
        .map_err(|e| GroundswellError::Ractor(format!("Registry MergeSimilar RPC failed: {e}")))?
    }

    /// Moves each processed post to its nearest cluster when the current
    /// assignment is no longer the closest. Returns posts moved.
    pub async fn reassign_outliers(&self) -> Result<usize, GroundswellError> {
        ractor::call!(self.actor, RegistryMessage::ReassignOutliers).map_err(|e| {
            GroundswellError::Ractor(format!("Registry ReassignOutliers RPC failed: {e}"))
        })?
    }

    pub async fn cluster_count(&self) -> Result<usize, GroundswellError> {
        ractor::call!(self.actor, RegistryMessage::ClusterCount)
            .map_err(|e| GroundswellError::Ractor(format!("Registry ClusterCount RPC failed: {e}")))
    }
}

struct RegistryState {
    db: DbHandle,
    clusters: Vec<ClusterEntry>,
}

impl RegistryState {
    fn nearest(&self, embedding: &[f32], threshold: f32) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (i, entry) in self.clusters.iter().enumerate() {
            if entry.centroid.len() != embedding.len() {
                continue;
            }
            let sim = cosine_similarity(&entry.centroid, embedding);
            if sim >= threshold && best.is_none_or(|(_, b)| sim > b) {
                best = Some((i, sim));
            }
        }
        best
    }
}

struct RegistryActor;

#[ractor::async_trait]
impl Actor for RegistryActor {
    type Msg = RegistryMessage;
    type State = RegistryState;
    type Arguments = DbHandle;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        db: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let rows = db
            .list_clusters()
            .await
            .map_err(|e| ActorProcessingErr::from(format!("cluster load failed: {e}")))?;

        let clusters = rows
            .into_iter()
            .map(|row| ClusterEntry {
                id: row.id,
                centroid: row.centroid_vec(),
                member_count: row.member_count,
            })
            .collect::<Vec<_>>();

        info!(clusters = clusters.len(), "ClusterRegistry initialized");
        Ok(RegistryState { db, clusters })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            RegistryMessage::FindNearest {
                embedding,
                threshold,
                reply,
            } => {
                let found = state.nearest(&embedding, threshold).map(|(i, sim)| {
                    NearestCluster {
                        cluster_id: state.clusters[i].id,
                        similarity: sim,
                    }
                });
                let _ = reply.send(found);
            }
            RegistryMessage::Assign {
                embedding,
                threshold,
                name_hint,
                category_id,
                reply,
            } => {
                let _ = reply.send(assign(state, embedding, threshold, name_hint, category_id).await);
            }
            RegistryMessage::RecomputeAll(reply) => {
                let _ = reply.send(recompute_all(state).await);
            }
            RegistryMessage::MergeSimilar { threshold, reply } => {
                let _ = reply.send(merge_similar(state, threshold).await);
            }
            RegistryMessage::ReassignOutliers(reply) => {
                let _ = reply.send(reassign_outliers(state).await);
            }
            RegistryMessage::ClusterCount(reply) => {
                let _ = reply.send(state.clusters.len());
            }
        }
        Ok(())
    }
}

async fn assign(
    state: &mut RegistryState,
    embedding: Vec<f32>,
    threshold: f32,
    name_hint: Option<String>,
    category_id: Option<i64>,
) -> Result<AssignOutcome, GroundswellError> {
    if let Some((idx, similarity)) = state.nearest(&embedding, threshold) {
        let entry = &state.clusters[idx];
        let new_centroid = incremental_mean(&entry.centroid, entry.member_count, &embedding);
        let new_count = entry.member_count + 1;

        state
            .db
            .update_centroid(entry.id, to_blob(&new_centroid), new_count)
            .await?;

        let entry = &mut state.clusters[idx];
        entry.centroid = new_centroid;
        entry.member_count = new_count;

        debug!(
            cluster_id = entry.id,
            similarity, member_count = new_count, "embedding joined existing cluster"
        );
        return Ok(AssignOutcome {
            cluster_id: entry.id,
            created: false,
            similarity,
            member_count: new_count,
        });
    }

    let name = short_cluster_name(name_hint.as_deref());
    let id = state
        .db
        .insert_cluster(&name, to_blob(&embedding), category_id)
        .await?;
    state.clusters.push(ClusterEntry {
        id,
        centroid: embedding,
        member_count: 1,
    });

    info!(cluster_id = id, name = %name, "new cluster created");
    Ok(AssignOutcome {
        cluster_id: id,
        created: true,
        similarity: 1.0,
        member_count: 1,
    })
}

async fn recompute_all(state: &mut RegistryState) -> Result<usize, GroundswellError> {
    let rows = state.db.list_clusters().await?;
    let mut refreshed = Vec::with_capacity(rows.len());
    let mut updated = 0usize;

    for row in rows {
        let blobs = state.db.list_cluster_member_embeddings(row.id).await?;
        let members: Vec<Vec<f32>> = blobs.iter().map(|b| from_blob(b)).collect();

        match mean(&members) {
            Some(centroid) => {
                let count = members.len() as i64;
                state
                    .db
                    .update_centroid(row.id, to_blob(&centroid), count)
                    .await?;
                refreshed.push(ClusterEntry {
                    id: row.id,
                    centroid,
                    member_count: count,
                });
                updated += 1;
            }
            None => {
                // No member embeddings (e.g. mid-migration); keep as stored.
                refreshed.push(ClusterEntry {
                    id: row.id,
                    centroid: row.centroid_vec(),
                    member_count: row.member_count,
                });
            }
        }
    }

    state.clusters = refreshed;
    info!(updated, "centroid recomputation complete");
    Ok(updated)
}

async fn merge_similar(
    state: &mut RegistryState,
    threshold: f32,
) -> Result<usize, GroundswellError> {
    let mut merges = 0usize;

    // Pairwise scan; the inner loop restarts after each merge because the
    // survivor's centroid moved.
    'scan: loop {
        for i in 0..state.clusters.len() {
            for j in (i + 1)..state.clusters.len() {
                let sim =
                    cosine_similarity(&state.clusters[i].centroid, &state.clusters[j].centroid);
                if sim < threshold {
                    continue;
                }

                // The smaller cluster loses.
                let (winner_idx, loser_idx) =
                    if state.clusters[i].member_count >= state.clusters[j].member_count {
                        (i, j)
                    } else {
                        (j, i)
                    };
                let winner_id = state.clusters[winner_idx].id;
                let loser_id = state.clusters[loser_idx].id;

                info!(winner_id, loser_id, similarity = sim, "merging clusters");

                state.db.reassign_posts_cluster(loser_id, winner_id).await?;
                state.db.reassign_mentions(loser_id, winner_id).await?;

                let blobs = state.db.list_cluster_member_embeddings(winner_id).await?;
                let members: Vec<Vec<f32>> = blobs.iter().map(|b| from_blob(b)).collect();
                if let Some(centroid) = mean(&members) {
                    let count = members.len() as i64;
                    state
                        .db
                        .update_centroid(winner_id, to_blob(&centroid), count)
                        .await?;
                    let winner = &mut state.clusters[winner_idx];
                    winner.centroid = centroid;
                    winner.member_count = count;
                }

                state.db.delete_cluster(loser_id).await?;
                state.clusters.remove(loser_idx);
                merges += 1;
                continue 'scan;
            }
        }
        break;
    }

    if merges > 0 {
        info!(merges, "cluster merge pass complete");
    }
    Ok(merges)
}

async fn reassign_outliers(state: &mut RegistryState) -> Result<usize, GroundswellError> {
    let posts = state.db.list_processed_embeddings().await?;
    let mut moved = 0usize;

    for post in posts {
        let Some(current) = post.cluster_id else {
            continue;
        };
        let embedding = from_blob(&post.embedding);
        let Some((idx, _)) = state.nearest(&embedding, f32::MIN) else {
            continue;
        };
        let nearest_id = state.clusters[idx].id;
        if nearest_id != current {
            state.db.set_post_cluster(&post.id, nearest_id).await?;
            moved += 1;
        }
    }

    if moved > 0 {
        // Member counts and centroids shifted; settle them in one pass.
        recompute_all(state).await?;
        info!(moved, "outlier reassignment complete");
    }
    Ok(moved)
}

/// Short, human-scannable cluster name from the first keyword or title words.
fn short_cluster_name(hint: Option<&str>) -> String {
    let slug: String = hint
        .unwrap_or("")
        .split_whitespace()
        .take(4)
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-')
        .take(40)
        .collect::<String>()
        .to_lowercase();

    let suffix = Uuid::new_v4().simple().to_string();
    if slug.is_empty() {
        format!("cluster-{}", &suffix[..8])
    } else {
        format!("{slug}-{}", &suffix[..8])
    }
}

/// Spawn the cluster registry actor, loading centroids from the store.
pub async fn spawn(db: DbHandle) -> ClusterRegistryHandle {
    let (actor, _jh) = ractor::Actor::spawn(None, RegistryActor, db)
        .await
        .expect("failed to spawn ClusterRegistry");
    ClusterRegistryHandle { actor }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names_are_bounded_and_unique() {
        let a = short_cluster_name(Some("Leaking Faucet Under Kitchen Sink Again"));
        let b = short_cluster_name(Some("Leaking Faucet Under Kitchen Sink Again"));
        assert!(a.starts_with("leaking-faucet-under-kitchen"));
        assert_ne!(a, b);
        assert!(a.len() <= 49);

        let anon = short_cluster_name(None);
        assert!(anon.starts_with("cluster-"));
    }
}
