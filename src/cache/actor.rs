use crate::error::GroundswellError;
use chrono::Utc;
use moka::sync::Cache;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::{str::FromStr, time::Duration};
use tracing::info;

/// Mirror horizon matches the longest TTL in use (dedup, 90 days).
const MIRROR_TTL_SECS: u64 = 90 * 24 * 3600;
const MIRROR_CAPACITY: u64 = 2_000_000;

#[derive(Debug)]
pub enum CacheActorMessage {
    KvGetI64(String, RpcReplyPort<Result<Option<i64>, GroundswellError>>),
    KvPutI64 {
        key: String,
        value: i64,
        ttl_secs: Option<i64>,
        reply: RpcReplyPort<Result<(), GroundswellError>>,
    },
    /// Monotonic update: stores `max(current, value)` and returns the result.
    KvMaxI64 {
        key: String,
        value: i64,
        reply: RpcReplyPort<Result<i64, GroundswellError>>,
    },
    /// Counter increment; a fresh or expired key restarts at `by` with the TTL.
    KvIncr {
        key: String,
        by: i64,
        ttl_secs: i64,
        reply: RpcReplyPort<Result<i64, GroundswellError>>,
    },
    SetAdd {
        set_key: String,
        member: String,
        ttl_secs: Option<i64>,
        reply: RpcReplyPort<Result<bool, GroundswellError>>,
    },
    SetAddMany {
        set_key: String,
        members: Vec<String>,
        ttl_secs: Option<i64>,
        reply: RpcReplyPort<Result<usize, GroundswellError>>,
    },
    SetContainsMany {
        set_key: String,
        members: Vec<String>,
        reply: RpcReplyPort<Result<Vec<bool>, GroundswellError>>,
    },
}

/// Cloneable handle for the durable cache actor.
#[derive(Clone)]
pub struct CacheHandle {
    actor: ActorRef<CacheActorMessage>,
}

impl CacheHandle {
    pub async fn kv_get_i64(&self, key: &str) -> Result<Option<i64>, GroundswellError> {
        ractor::call!(self.actor, CacheActorMessage::KvGetI64, key.to_string())
            .map_err(|e| GroundswellError::Ractor(format!("CacheActor KvGetI64 RPC failed: {e}")))?
    }

    pub async fn kv_put_i64(
        &self,
        key: &str,
        value: i64,
        ttl_secs: Option<i64>,
    ) -> Result<(), GroundswellError> {
        let key = key.to_string();
        ractor::call!(self.actor, |reply| CacheActorMessage::KvPutI64 {
            key,
            value,
            ttl_secs,
            reply
        })
        .map_err(|e| GroundswellError::Ractor(format!("CacheActor KvPutI64 RPC failed: {e}")))?
    }

    pub async fn kv_max_i64(&self, key: &str, value: i64) -> Result<i64, GroundswellError> {
        let key = key.to_string();
        ractor::call!(self.actor, |reply| CacheActorMessage::KvMaxI64 {
            key,
            value,
            reply
        })
        .map_err(|e| GroundswellError::Ractor(format!("CacheActor KvMaxI64 RPC failed: {e}")))?
    }

    pub async fn kv_incr(
        &self,
        key: &str,
        by: i64,
        ttl_secs: i64,
    ) -> Result<i64, GroundswellError> {
        let key = key.to_string();
        ractor::call!(self.actor, |reply| CacheActorMessage::KvIncr {
            key,
            by,
            ttl_secs,
            reply
        })
        .map_err(|e| GroundswellError::Ractor(format!("CacheActor KvIncr RPC failed: {e}")))?
    }

    pub async fn set_add(
        &self,
        set_key: &str,
        member: &str,
        ttl_secs: Option<i64>,
    ) -> Result<bool, GroundswellError> {
        let (set_key, member) = (set_key.to_string(), member.to_string());
        ractor::call!(self.actor, |reply| CacheActorMessage::SetAdd {
            set_key,
            member,
            ttl_secs,
            reply
        })
        .map_err(|e| GroundswellError::Ractor(format!("CacheActor SetAdd RPC failed: {e}")))?
    }

    pub async fn set_add_many(
        &self,
        set_key: &str,
        members: Vec<String>,
        ttl_secs: Option<i64>,
    ) -> Result<usize, GroundswellError> {
        let set_key = set_key.to_string();
        ractor::call!(self.actor, |reply| CacheActorMessage::SetAddMany {
            set_key,
            members,
            ttl_secs,
            reply
        })
        .map_err(|e| GroundswellError::Ractor(format!("CacheActor SetAddMany RPC failed: {e}")))?
    }

    pub async fn set_contains_many(
        &self,
        set_key: &str,
        members: Vec<String>,
    ) -> Result<Vec<bool>, GroundswellError> {
        let set_key = set_key.to_string();
        ractor::call!(self.actor, |reply| CacheActorMessage::SetContainsMany {
            set_key,
            members,
            reply
        })
        .map_err(|e| {
            GroundswellError::Ractor(format!("CacheActor SetContainsMany RPC failed: {e}"))
        })?
    }
}

struct CacheActorState {
    pool: SqlitePool,
    /// In-memory mirror of recently-touched set members. Misses fall through
    /// to the durable table, so a cold mirror is never incorrect.
    mirror: Cache<(String, String), ()>,
}

struct CacheActor;

#[ractor::async_trait]
impl Actor for CacheActor {
    type Msg = CacheActorMessage;
    type State = CacheActorState;
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
            .map_err(|e| ActorProcessingErr::from(format!("cache db connect failed: {e}")))?;

        // Cache tables may precede the main schema init when the cache actor
        // starts first; create just what this actor touches.
        for stmt in [
            "CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY NOT NULL, value TEXT NOT NULL, expires_at INTEGER NULL)",
            "CREATE TABLE IF NOT EXISTS seen_ids (set_key TEXT NOT NULL, member TEXT NOT NULL, expires_at INTEGER NULL, PRIMARY KEY (set_key, member))",
        ] {
            sqlx::query(stmt)
                .execute(&pool)
                .await
                .map_err(|e| ActorProcessingErr::from(format!("cache schema init failed: {e}")))?;
        }

        let mirror = Cache::builder()
            .time_to_live(Duration::from_secs(MIRROR_TTL_SECS))
            .max_capacity(MIRROR_CAPACITY)
            .build();

        info!("CacheActor initialized");
        Ok(CacheActorState { pool, mirror })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            CacheActorMessage::KvGetI64(key, reply) => {
                let _ = reply.send(kv_get_i64(&state.pool, &key).await);
            }
            CacheActorMessage::KvPutI64 {
                key,
                value,
                ttl_secs,
                reply,
            } => {
                let _ = reply.send(kv_put_i64(&state.pool, &key, value, ttl_secs).await);
            }
            CacheActorMessage::KvMaxI64 { key, value, reply } => {
                let res = async {
                    let current = kv_get_i64(&state.pool, &key).await?.unwrap_or(i64::MIN);
                    let next = current.max(value);
                    if next != current {
                        kv_put_i64(&state.pool, &key, next, None).await?;
                    }
                    Ok(next)
                }
                .await;
                let _ = reply.send(res);
            }
            CacheActorMessage::KvIncr {
                key,
                by,
                ttl_secs,
                reply,
            } => {
                let res = async {
                    let now = Utc::now().timestamp();
                    let row: Option<(String, Option<i64>)> =
                        sqlx::query_as("SELECT value, expires_at FROM kv WHERE key = ?")
                            .bind(&key)
                            .fetch_optional(&state.pool)
                            .await?;

                    let (current, expires_at) = match row {
                        Some((v, exp)) if exp.is_none_or(|e| e > now) => {
                            (v.parse::<i64>().unwrap_or(0), exp)
                        }
                        // Missing or expired: restart the window.
                        _ => (0, Some(now + ttl_secs)),
                    };

                    let next = current + by;
                    sqlx::query(
                        r#"
                        INSERT INTO kv (key, value, expires_at) VALUES (?, ?, ?)
                        ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
                        "#,
                    )
                    .bind(&key)
                    .bind(next.to_string())
                    .bind(expires_at)
                    .execute(&state.pool)
                    .await?;
                    Ok(next)
                }
                .await;
                let _ = reply.send(res);
            }
            CacheActorMessage::SetAdd {
                set_key,
                member,
                ttl_secs,
                reply,
            } => {
                let res = set_add(state, &set_key, &member, ttl_secs).await;
                let _ = reply.send(res);
            }
            CacheActorMessage::SetAddMany {
                set_key,
                members,
                ttl_secs,
                reply,
            } => {
                let res = async {
                    purge_expired(&state.pool, &set_key).await?;
                    let mut added = 0usize;
                    for member in &members {
                        if set_add(state, &set_key, member, ttl_secs).await? {
                            added += 1;
                        }
                    }
                    Ok(added)
                }
                .await;
                let _ = reply.send(res);
            }
            CacheActorMessage::SetContainsMany {
                set_key,
                members,
                reply,
            } => {
                let res = async {
                    let now = Utc::now().timestamp();
                    let mut out = Vec::with_capacity(members.len());
                    for member in &members {
                        let key = (set_key.clone(), member.clone());
                        if state.mirror.contains_key(&key) {
                            out.push(true);
                            continue;
                        }
                        let hit: Option<i64> = sqlx::query_scalar(
                            "SELECT 1 FROM seen_ids WHERE set_key = ? AND member = ? AND (expires_at IS NULL OR expires_at > ?)",
                        )
                        .bind(&set_key)
                        .bind(member)
                        .bind(now)
                        .fetch_optional(&state.pool)
                        .await?;
                        if hit.is_some() {
                            state.mirror.insert(key, ());
                        }
                        out.push(hit.is_some());
                    }
                    Ok(out)
                }
                .await;
                let _ = reply.send(res);
            }
        }
        Ok(())
    }
}

async fn kv_get_i64(pool: &SqlitePool, key: &str) -> Result<Option<i64>, GroundswellError> {
    let now = Utc::now().timestamp();
    let row: Option<(String, Option<i64>)> =
        sqlx::query_as("SELECT value, expires_at FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    Ok(match row {
        Some((value, exp)) if exp.is_none_or(|e| e > now) => value.parse::<i64>().ok(),
        _ => None,
    })
}

async fn kv_put_i64(
    pool: &SqlitePool,
    key: &str,
    value: i64,
    ttl_secs: Option<i64>,
) -> Result<(), GroundswellError> {
    let expires_at = ttl_secs.map(|t| Utc::now().timestamp() + t);
    sqlx::query(
        r#"
        INSERT INTO kv (key, value, expires_at) VALUES (?, ?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .bind(expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// One atomic set-add; returns whether the member was new. Re-adding an
/// existing member refreshes its expiry.
async fn set_add(
    state: &CacheActorState,
    set_key: &str,
    member: &str,
    ttl_secs: Option<i64>,
) -> Result<bool, GroundswellError> {
    let expires_at = ttl_secs.map(|t| Utc::now().timestamp() + t);
    let res = sqlx::query("INSERT OR IGNORE INTO seen_ids (set_key, member, expires_at) VALUES (?, ?, ?)")
        .bind(set_key)
        .bind(member)
        .bind(expires_at)
        .execute(&state.pool)
        .await?;

    let was_new = res.rows_affected() == 1;
    if !was_new && expires_at.is_some() {
        sqlx::query("UPDATE seen_ids SET expires_at = ? WHERE set_key = ? AND member = ?")
            .bind(expires_at)
            .bind(set_key)
            .bind(member)
            .execute(&state.pool)
            .await?;
    }
    state
        .mirror
        .insert((set_key.to_string(), member.to_string()), ());
    Ok(was_new)
}

async fn purge_expired(pool: &SqlitePool, set_key: &str) -> Result<(), GroundswellError> {
    let now = Utc::now().timestamp();
    sqlx::query("DELETE FROM seen_ids WHERE set_key = ? AND expires_at IS NOT NULL AND expires_at <= ?")
        .bind(set_key)
        .bind(now)
        .execute(pool)
        .await?;
    Ok(())
}

/// Spawn the cache actor and return a cloneable handle.
pub async fn spawn(database_url: &str) -> CacheHandle {
    let (actor, _jh) = ractor::Actor::spawn(None, CacheActor, database_url.to_string())
        .await
        .expect("failed to spawn CacheActor");

    CacheHandle { actor }
}
