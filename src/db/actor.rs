use crate::db::models::{
    CategoryRow, ClusterRow, JobRow, PostEmbeddingRow, PostRow, QueueCounts,
};
use crate::db::patch::PostPatch;
use crate::db::schema::SQLITE_INIT;
use crate::db::{categories, clusters, jobs, mentions, posts};
use crate::error::GroundswellError;
use crate::model::{PostStatus, RawPost};
use chrono::{DateTime, Utc};
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::{str::FromStr, time::Duration};
use tracing::info;

/// Mention insert payload.
#[derive(Debug, Clone)]
pub struct NewMention {
    pub post_id: String,
    pub cluster_id: i64,
    pub category_id: Option<i64>,
    pub sentiment_score: Option<f64>,
    pub engagement_score: f64,
}

/// Audit insert payload (one per stage execution).
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub post_id: String,
    pub stage: String,
    pub success: bool,
    pub error: Option<String>,
    pub latency_ms: i64,
    pub tokens_used: i64,
}

/// Trend bucket upsert payload.
#[derive(Debug, Clone)]
pub struct TrendPoint {
    pub cluster_id: i64,
    pub bucket_start: DateTime<Utc>,
    pub mention_count: i64,
    pub avg_sentiment: Option<f64>,
    pub trend_score: Option<f64>,
}

#[derive(Debug)]
pub enum DbActorMessage {
    // Posts
    UpsertRawPost {
        post: RawPost,
        parent_id: Option<String>,
        reply: RpcReplyPort<Result<bool, GroundswellError>>,
    },
    UpsertRawPosts(Vec<RawPost>, RpcReplyPort<Result<usize, GroundswellError>>),
    GetPost(String, RpcReplyPort<Result<Option<PostRow>, GroundswellError>>),
    AcquirePostLock {
        id: String,
        max_retries: i64,
        reply: RpcReplyPort<Result<bool, GroundswellError>>,
    },
    MarkProcessed(String, RpcReplyPort<Result<(), GroundswellError>>),
    MarkFailed {
        id: String,
        error: String,
        reply: RpcReplyPort<Result<(), GroundswellError>>,
    },
    ApplyPostPatch {
        id: String,
        patch: PostPatch,
        reply: RpcReplyPort<Result<(), GroundswellError>>,
    },
    FetchUnprocessed(i64, RpcReplyPort<Result<Vec<PostRow>, GroundswellError>>),
    ListPostIds(String, RpcReplyPort<Result<Vec<String>, GroundswellError>>),
    CountByStatus(PostStatus, RpcReplyPort<Result<i64, GroundswellError>>),
    ListProcessedEmbeddings(RpcReplyPort<Result<Vec<PostEmbeddingRow>, GroundswellError>>),
    ListClusterMemberEmbeddings(i64, RpcReplyPort<Result<Vec<Vec<u8>>, GroundswellError>>),
    ReassignPostsCluster {
        from: i64,
        to: i64,
        reply: RpcReplyPort<Result<u64, GroundswellError>>,
    },
    SetPostCluster {
        post_id: String,
        cluster_id: i64,
        reply: RpcReplyPort<Result<(), GroundswellError>>,
    },

    // Categories
    FindOrCreateCategory {
        name: String,
        description: String,
        parent_id: Option<i64>,
        reply: RpcReplyPort<Result<i64, GroundswellError>>,
    },
    ListCategoryNames(RpcReplyPort<Result<Vec<String>, GroundswellError>>),
    GetCategory(i64, RpcReplyPort<Result<Option<CategoryRow>, GroundswellError>>),

    // Clusters
    InsertCluster {
        name: String,
        centroid: Vec<u8>,
        category_id: Option<i64>,
        reply: RpcReplyPort<Result<i64, GroundswellError>>,
    },
    ListClusters(RpcReplyPort<Result<Vec<ClusterRow>, GroundswellError>>),
    GetCluster(i64, RpcReplyPort<Result<Option<ClusterRow>, GroundswellError>>),
    UpdateCentroid {
        id: i64,
        centroid: Vec<u8>,
        member_count: i64,
        reply: RpcReplyPort<Result<(), GroundswellError>>,
    },
    DeleteCluster(i64, RpcReplyPort<Result<(), GroundswellError>>),

    // Mentions / trends / audit
    InsertMention(NewMention, RpcReplyPort<Result<i64, GroundswellError>>),
    CountMentions(String, RpcReplyPort<Result<i64, GroundswellError>>),
    ReassignMentions {
        from: i64,
        to: i64,
        reply: RpcReplyPort<Result<u64, GroundswellError>>,
    },
    RecordTrendPoint(TrendPoint, RpcReplyPort<Result<(), GroundswellError>>),
    InsertAudit(AuditEntry, RpcReplyPort<Result<(), GroundswellError>>),

    // Jobs
    EnqueueJob {
        post_id: String,
        payload: String,
        max_attempts: i64,
        run_at_ms: i64,
        reply: RpcReplyPort<Result<i64, GroundswellError>>,
    },
    ClaimNextJob(i64, RpcReplyPort<Result<Option<JobRow>, GroundswellError>>),
    CompleteJob(i64, RpcReplyPort<Result<(), GroundswellError>>),
    FailJob {
        job: Box<JobRow>,
        error: String,
        backoff_ms: u64,
        now_ms: i64,
        reply: RpcReplyPort<Result<bool, GroundswellError>>,
    },
    JobCounts(RpcReplyPort<Result<QueueCounts, GroundswellError>>),
    InFlightPostIds(RpcReplyPort<Result<Vec<String>, GroundswellError>>),
}

/// Cloneable handle for interacting with the database actor.
#[derive(Clone)]
pub struct DbHandle {
    actor: ActorRef<DbActorMessage>,
}

macro_rules! db_call {
    ($self:expr, $variant:ident $(, $arg:expr)*) => {
        ractor::call!($self.actor, DbActorMessage::$variant $(, $arg)*)
            .map_err(|e| GroundswellError::Ractor(format!(
                concat!("DbActor ", stringify!($variant), " RPC failed: {}"), e
            )))?
    };
}

impl DbHandle {
    pub async fn upsert_raw_post(
        &self,
        post: RawPost,
        parent_id: Option<String>,
    ) -> Result<bool, GroundswellError> {
        ractor::call!(self.actor, |reply| DbActorMessage::UpsertRawPost {
            post,
            parent_id,
            reply
        })
        .map_err(|e| GroundswellError::Ractor(format!("DbActor UpsertRawPost RPC failed: {e}")))?
    }

    pub async fn upsert_raw_posts(&self, batch: Vec<RawPost>) -> Result<usize, GroundswellError> {
        db_call!(self, UpsertRawPosts, batch)
    }

    pub async fn get_post(&self, id: &str) -> Result<Option<PostRow>, GroundswellError> {
        db_call!(self, GetPost, id.to_string())
    }

    pub async fn acquire_post_lock(
        &self,
        id: &str,
        max_retries: i64,
    ) -> Result<bool, GroundswellError> {
        let id = id.to_string();
        ractor::call!(self.actor, |reply| DbActorMessage::AcquirePostLock {
            id,
            max_retries,
            reply
        })
        .map_err(|e| GroundswellError::Ractor(format!("DbActor AcquirePostLock RPC failed: {e}")))?
    }

    pub async fn mark_processed(&self, id: &str) -> Result<(), GroundswellError> {
        db_call!(self, MarkProcessed, id.to_string())
    }

    pub async fn mark_failed(&self, id: &str, error: &str) -> Result<(), GroundswellError> {
        let (id, error) = (id.to_string(), error.to_string());
        ractor::call!(self.actor, |reply| DbActorMessage::MarkFailed {
            id,
            error,
            reply
        })
        .map_err(|e| GroundswellError::Ractor(format!("DbActor MarkFailed RPC failed: {e}")))?
    }

    pub async fn apply_post_patch(
        &self,
        id: &str,
        patch: PostPatch,
    ) -> Result<(), GroundswellError> {
        let id = id.to_string();
        ractor::call!(self.actor, |reply| DbActorMessage::ApplyPostPatch {
            id,
            patch,
            reply
        })
        .map_err(|e| GroundswellError::Ractor(format!("DbActor ApplyPostPatch RPC failed: {e}")))?
    }

    pub async fn fetch_unprocessed(&self, limit: i64) -> Result<Vec<PostRow>, GroundswellError> {
        db_call!(self, FetchUnprocessed, limit)
    }

    pub async fn list_post_ids(&self, source: &str) -> Result<Vec<String>, GroundswellError> {
        db_call!(self, ListPostIds, source.to_string())
    }

    pub async fn count_by_status(&self, status: PostStatus) -> Result<i64, GroundswellError> {
        db_call!(self, CountByStatus, status)
    }

    pub async fn list_processed_embeddings(
        &self,
    ) -> Result<Vec<PostEmbeddingRow>, GroundswellError> {
        db_call!(self, ListProcessedEmbeddings)
    }

    pub async fn list_cluster_member_embeddings(
        &self,
        cluster_id: i64,
    ) -> Result<Vec<Vec<u8>>, GroundswellError> {
        db_call!(self, ListClusterMemberEmbeddings, cluster_id)
    }

    pub async fn reassign_posts_cluster(
        &self,
        from: i64,
        to: i64,
    ) -> Result<u64, GroundswellError> {
        ractor::call!(self.actor, |reply| DbActorMessage::ReassignPostsCluster {
            from,
            to,
            reply
        })
        .map_err(|e| {
            GroundswellError::Ractor(format!("DbActor ReassignPostsCluster RPC failed: {e}"))
        })?
    }

    pub async fn set_post_cluster(
        &self,
        post_id: &str,
        cluster_id: i64,
    ) -> Result<(), GroundswellError> {
        let post_id = post_id.to_string();
        ractor::call!(self.actor, |reply| DbActorMessage::SetPostCluster {
            post_id,
            cluster_id,
            reply
        })
        .map_err(|e| GroundswellError::Ractor(format!("DbActor SetPostCluster RPC failed: {e}")))?
    }

    pub async fn find_or_create_category(
        &self,
        name: &str,
        description: &str,
        parent_id: Option<i64>,
    ) -> Result<i64, GroundswellError> {
        let (name, description) = (name.to_string(), description.to_string());
        ractor::call!(self.actor, |reply| DbActorMessage::FindOrCreateCategory {
            name,
            description,
            parent_id,
            reply
        })
        .map_err(|e| {
            GroundswellError::Ractor(format!("DbActor FindOrCreateCategory RPC failed: {e}"))
        })?
    }

    pub async fn list_category_names(&self) -> Result<Vec<String>, GroundswellError> {
        db_call!(self, ListCategoryNames)
    }

    pub async fn get_category(&self, id: i64) -> Result<Option<CategoryRow>, GroundswellError> {
        db_call!(self, GetCategory, id)
    }

    pub async fn insert_cluster(
        &self,
        name: &str,
        centroid: Vec<u8>,
        category_id: Option<i64>,
    ) -> Result<i64, GroundswellError> {
        let name = name.to_string();
        ractor::call!(self.actor, |reply| DbActorMessage::InsertCluster {
            name,
            centroid,
            category_id,
            reply
        })
        .map_err(|e| GroundswellError::Ractor(format!("DbActor InsertCluster RPC failed: {e}")))?
    }

    pub async fn list_clusters(&self) -> Result<Vec<ClusterRow>, GroundswellError> {
        db_call!(self, ListClusters)
    }

    pub async fn get_cluster(&self, id: i64) -> Result<Option<ClusterRow>, GroundswellError> {
        db_call!(self, GetCluster, id)
    }

    pub async fn update_centroid(
        &self,
        id: i64,
        centroid: Vec<u8>,
        member_count: i64,
    ) -> Result<(), GroundswellError> {
        ractor::call!(self.actor, |reply| DbActorMessage::UpdateCentroid {
            id,
            centroid,
            member_count,
            reply
        })
        .map_err(|e| GroundswellError::Ractor(format!("DbActor UpdateCentroid RPC failed: {e}")))?
    }

    pub async fn delete_cluster(&self, id: i64) -> Result<(), GroundswellError> {
        db_call!(self, DeleteCluster, id)
    }

    pub async fn insert_mention(&self, mention: NewMention) -> Result<i64, GroundswellError> {
        db_call!(self, InsertMention, mention)
    }

    pub async fn count_mentions(&self, post_id: &str) -> Result<i64, GroundswellError> {
        db_call!(self, CountMentions, post_id.to_string())
    }

    pub async fn reassign_mentions(&self, from: i64, to: i64) -> Result<u64, GroundswellError> {
        ractor::call!(self.actor, |reply| DbActorMessage::ReassignMentions {
            from,
            to,
            reply
        })
        .map_err(|e| GroundswellError::Ractor(format!("DbActor ReassignMentions RPC failed: {e}")))?
    }

    pub async fn record_trend_point(&self, point: TrendPoint) -> Result<(), GroundswellError> {
        db_call!(self, RecordTrendPoint, point)
    }

    pub async fn insert_audit(&self, entry: AuditEntry) -> Result<(), GroundswellError> {
        db_call!(self, InsertAudit, entry)
    }

    pub async fn enqueue_job(
        &self,
        post_id: &str,
        payload: &str,
        max_attempts: i64,
        run_at_ms: i64,
    ) -> Result<i64, GroundswellError> {
        let (post_id, payload) = (post_id.to_string(), payload.to_string());
        ractor::call!(self.actor, |reply| DbActorMessage::EnqueueJob {
            post_id,
            payload,
            max_attempts,
            run_at_ms,
            reply
        })
        .map_err(|e| GroundswellError::Ractor(format!("DbActor EnqueueJob RPC failed: {e}")))?
    }

    pub async fn claim_next_job(&self, now_ms: i64) -> Result<Option<JobRow>, GroundswellError> {
        db_call!(self, ClaimNextJob, now_ms)
    }

    pub async fn complete_job(&self, id: i64) -> Result<(), GroundswellError> {
        db_call!(self, CompleteJob, id)
    }

    pub async fn fail_job(
        &self,
        job: JobRow,
        error: &str,
        backoff_ms: u64,
        now_ms: i64,
    ) -> Result<bool, GroundswellError> {
        let error = error.to_string();
        let job = Box::new(job);
        ractor::call!(self.actor, |reply| DbActorMessage::FailJob {
            job,
            error,
            backoff_ms,
            now_ms,
            reply
        })
        .map_err(|e| GroundswellError::Ractor(format!("DbActor FailJob RPC failed: {e}")))?
    }

    pub async fn job_counts(&self) -> Result<QueueCounts, GroundswellError> {
        db_call!(self, JobCounts)
    }

    pub async fn in_flight_post_ids(&self) -> Result<Vec<String>, GroundswellError> {
        db_call!(self, InFlightPostIds)
    }
}

struct DbActorState {
    pool: SqlitePool,
}

struct DbActor;

#[ractor::async_trait]
impl Actor for DbActor {
    type Msg = DbActorMessage;
    type State = DbActorState;
    type Arguments = String;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        database_url: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let connect_opts = SqliteConnectOptions::from_str(database_url.as_str())
            .map_err(|e| ActorProcessingErr::from(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5))
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .connect_with(connect_opts)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("db connect failed: {e}")))?;

        apply_schema(&pool)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("db schema init failed: {e}")))?;

        info!("DbActor initialized");
        Ok(DbActorState { pool })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let pool = &state.pool;
        match message {
            DbActorMessage::UpsertRawPost {
                post,
                parent_id,
                reply,
            } => {
                let res = posts::upsert_raw(pool, &post, parent_id.as_deref()).await;
                let _ = reply.send(res);
            }
            DbActorMessage::UpsertRawPosts(batch, reply) => {
                let mut inserted = 0usize;
                let mut failure = None;
                for post in &batch {
                    match posts::upsert_raw(pool, post, None).await {
                        Ok(true) => inserted += 1,
                        Ok(false) => {}
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
                let _ = reply.send(match failure {
                    Some(e) => Err(e),
                    None => Ok(inserted),
                });
            }
            DbActorMessage::GetPost(id, reply) => {
                let _ = reply.send(posts::get(pool, &id).await);
            }
            DbActorMessage::AcquirePostLock {
                id,
                max_retries,
                reply,
            } => {
                let _ = reply.send(posts::acquire_lock(pool, &id, max_retries).await);
            }
            DbActorMessage::MarkProcessed(id, reply) => {
                let _ = reply.send(posts::mark_processed(pool, &id).await);
            }
            DbActorMessage::MarkFailed { id, error, reply } => {
                let _ = reply.send(posts::mark_failed(pool, &id, &error).await);
            }
            DbActorMessage::ApplyPostPatch { id, patch, reply } => {
                let _ = reply.send(patch.apply(pool, &id).await);
            }
            DbActorMessage::FetchUnprocessed(limit, reply) => {
                let _ = reply.send(posts::fetch_unprocessed(pool, limit).await);
            }
            DbActorMessage::ListPostIds(source, reply) => {
                let _ = reply.send(posts::list_ids(pool, &source).await);
            }
            DbActorMessage::CountByStatus(status, reply) => {
                let _ = reply.send(posts::count_by_status(pool, status).await);
            }
            DbActorMessage::ListProcessedEmbeddings(reply) => {
                let _ = reply.send(posts::list_processed_embeddings(pool).await);
            }
            DbActorMessage::ListClusterMemberEmbeddings(cluster_id, reply) => {
                let _ = reply.send(posts::list_cluster_member_embeddings(pool, cluster_id).await);
            }
            DbActorMessage::ReassignPostsCluster { from, to, reply } => {
                let _ = reply.send(posts::reassign_cluster(pool, from, to).await);
            }
            DbActorMessage::SetPostCluster {
                post_id,
                cluster_id,
                reply,
            } => {
                let _ = reply.send(posts::set_cluster(pool, &post_id, cluster_id).await);
            }
            DbActorMessage::FindOrCreateCategory {
                name,
                description,
                parent_id,
                reply,
            } => {
                let _ =
                    reply.send(categories::find_or_create(pool, &name, &description, parent_id).await);
            }
            DbActorMessage::ListCategoryNames(reply) => {
                let _ = reply.send(categories::list_names(pool).await);
            }
            DbActorMessage::GetCategory(id, reply) => {
                let _ = reply.send(categories::get(pool, id).await);
            }
            DbActorMessage::InsertCluster {
                name,
                centroid,
                category_id,
                reply,
            } => {
                let _ = reply.send(clusters::insert(pool, &name, &centroid, category_id).await);
            }
            DbActorMessage::ListClusters(reply) => {
                let _ = reply.send(clusters::list(pool).await);
            }
            DbActorMessage::GetCluster(id, reply) => {
                let _ = reply.send(clusters::get(pool, id).await);
            }
            DbActorMessage::UpdateCentroid {
                id,
                centroid,
                member_count,
                reply,
            } => {
                let _ = reply.send(clusters::update_centroid(pool, id, &centroid, member_count).await);
            }
            DbActorMessage::DeleteCluster(id, reply) => {
                let _ = reply.send(clusters::delete(pool, id).await);
            }
            DbActorMessage::InsertMention(m, reply) => {
                let _ = reply.send(
                    mentions::insert(
                        pool,
                        &m.post_id,
                        m.cluster_id,
                        m.category_id,
                        m.sentiment_score,
                        m.engagement_score,
                    )
                    .await,
                );
            }
            DbActorMessage::CountMentions(post_id, reply) => {
                let _ = reply.send(mentions::count_for_post(pool, &post_id).await);
            }
            DbActorMessage::ReassignMentions { from, to, reply } => {
                let _ = reply.send(mentions::reassign_cluster(pool, from, to).await);
            }
            DbActorMessage::RecordTrendPoint(p, reply) => {
                let _ = reply.send(
                    mentions::record_trend_point(
                        pool,
                        p.cluster_id,
                        p.bucket_start,
                        p.mention_count,
                        p.avg_sentiment,
                        p.trend_score,
                    )
                    .await,
                );
            }
            DbActorMessage::InsertAudit(a, reply) => {
                let _ = reply.send(
                    mentions::insert_audit(
                        pool,
                        &a.post_id,
                        &a.stage,
                        a.success,
                        a.error.as_deref(),
                        a.latency_ms,
                        a.tokens_used,
                    )
                    .await,
                );
            }
            DbActorMessage::EnqueueJob {
                post_id,
                payload,
                max_attempts,
                run_at_ms,
                reply,
            } => {
                let _ =
                    reply.send(jobs::enqueue(pool, &post_id, &payload, max_attempts, run_at_ms).await);
            }
            DbActorMessage::ClaimNextJob(now_ms, reply) => {
                let _ = reply.send(jobs::claim_next(pool, now_ms).await);
            }
            DbActorMessage::CompleteJob(id, reply) => {
                let _ = reply.send(jobs::complete(pool, id).await);
            }
            DbActorMessage::FailJob {
                job,
                error,
                backoff_ms,
                now_ms,
                reply,
            } => {
                let _ = reply.send(jobs::fail(pool, &job, &error, backoff_ms, now_ms).await);
            }
            DbActorMessage::JobCounts(reply) => {
                let _ = reply.send(jobs::counts(pool).await);
            }
            DbActorMessage::InFlightPostIds(reply) => {
                let _ = reply.send(jobs::in_flight_post_ids(pool).await);
            }
        }
        Ok(())
    }
}

/// Spawn the database actor and return a cloneable handle.
pub async fn spawn(database_url: &str) -> DbHandle {
    let (actor, _jh) = ractor::Actor::spawn(None, DbActor, database_url.to_string())
        .await
        .expect("failed to spawn DbActor");

    DbHandle { actor }
}

async fn apply_schema(pool: &SqlitePool) -> Result<(), GroundswellError> {
    for stmt in SQLITE_INIT.split(';') {
        let s = stmt.trim();
        if s.is_empty() {
            continue;
        }
        sqlx::query(s).execute(pool).await?;
    }
    Ok(())
}
