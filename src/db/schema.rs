//! SQL DDL for initializing the database schema.
//! SQLite-first design; can be adapted for other RDBMS.

/// SQLite schema includes:
/// - `posts` (raw ingest columns + enrichment columns, one row per post,
///   derived records reference their parent via `parent_id`)
/// - `categories` (find-or-create by unique name, optional parent DAG)
/// - `clusters` (centroid BLOB of little-endian f32, D=1536)
/// - `mentions` (append-only, one per successfully enriched post)
/// - `trends` (per-cluster time buckets written by the periodic scorer)
/// - `audit_log` (one row per stage execution)
/// - `jobs` (durable enrichment queue)
/// - `kv` / `seen_ids` (durable cache: watermarks, cooldowns, dedup sets)
pub const SQLITE_INIT: &str = r#"
-- ---------------------------------------------------------------------------
-- Posts: raw harvest + enrichment state
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS posts (
    id TEXT PRIMARY KEY NOT NULL,
    source TEXT NOT NULL,
    sub_source TEXT NOT NULL DEFAULT '',
    title TEXT NOT NULL DEFAULT '',
    body TEXT NOT NULL DEFAULT '',
    author TEXT NOT NULL DEFAULT '',
    score INTEGER NOT NULL DEFAULT 0,
    url TEXT NOT NULL DEFAULT '',
    metadata TEXT NULL,            -- JSON
    parent_id TEXT NULL,           -- set for derived problem records
    created_at INTEGER NOT NULL,   -- unix seconds, source-side creation time
    status TEXT NOT NULL DEFAULT 'unprocessed',
    is_spam INTEGER NULL,
    has_pii INTEGER NULL,
    moderation_notes TEXT NULL,
    is_valid INTEGER NULL,
    validity_reason TEXT NULL,
    classification TEXT NULL,
    classification_confidence REAL NULL,
    summary TEXT NULL,
    keywords TEXT NULL,            -- JSON array of strings
    embedding BLOB NULL,           -- little-endian f32, 1536 dims
    sentiment_label TEXT NULL,
    sentiment_score REAL NULL,
    category_id INTEGER NULL,
    cluster_id INTEGER NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    error_message TEXT NULL,
    inserted_at TEXT NOT NULL,     -- RFC3339
    updated_at TEXT NOT NULL,      -- RFC3339
    processing_started_at TEXT NULL,
    processed_at TEXT NULL,
    failed_at TEXT NULL
);

CREATE INDEX IF NOT EXISTS idx_posts_status ON posts(status);
CREATE INDEX IF NOT EXISTS idx_posts_sub_source ON posts(sub_source, created_at);
CREATE INDEX IF NOT EXISTS idx_posts_cluster ON posts(cluster_id);

-- ---------------------------------------------------------------------------
-- Categories (unique by name, optional parent reference)
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY NOT NULL,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    parent_id INTEGER NULL REFERENCES categories(id),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- ---------------------------------------------------------------------------
-- Clusters (centroid = arithmetic mean of member embeddings)
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS clusters (
    id INTEGER PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    centroid BLOB NOT NULL,
    member_count INTEGER NOT NULL DEFAULT 1,
    category_id INTEGER NULL REFERENCES categories(id),
    metadata TEXT NULL,            -- JSON
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- ---------------------------------------------------------------------------
-- Mentions (append-only)
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS mentions (
    id INTEGER PRIMARY KEY NOT NULL,
    post_id TEXT NOT NULL,
    cluster_id INTEGER NOT NULL,
    category_id INTEGER NULL,
    sentiment_score REAL NULL,
    engagement_score REAL NOT NULL DEFAULT 0,
    mentioned_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_mentions_cluster ON mentions(cluster_id, mentioned_at);
CREATE INDEX IF NOT EXISTS idx_mentions_post ON mentions(post_id);

-- ---------------------------------------------------------------------------
-- Trends (written by the periodic scorer, interaction contract only)
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS trends (
    id INTEGER PRIMARY KEY NOT NULL,
    cluster_id INTEGER NOT NULL,
    bucket_start TEXT NOT NULL,    -- RFC3339
    mention_count INTEGER NOT NULL DEFAULT 0,
    avg_sentiment REAL NULL,
    trend_score REAL NULL,
    UNIQUE(cluster_id, bucket_start)
);

-- ---------------------------------------------------------------------------
-- Audit log (one row per stage execution)
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY NOT NULL,
    post_id TEXT NOT NULL,
    stage TEXT NOT NULL,
    success INTEGER NOT NULL,
    error TEXT NULL,
    latency_ms INTEGER NOT NULL DEFAULT 0,
    tokens_used INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_post ON audit_log(post_id);

-- ---------------------------------------------------------------------------
-- Jobs (durable enrichment queue, at-least-once)
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY NOT NULL,
    post_id TEXT NOT NULL,
    payload TEXT NOT NULL,         -- RawPost JSON
    state TEXT NOT NULL DEFAULT 'waiting',
    attempts INTEGER NOT NULL DEFAULT 0,
    max_attempts INTEGER NOT NULL DEFAULT 3,
    run_at INTEGER NOT NULL,       -- unix millis, earliest execution time
    last_error TEXT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_state_run_at ON jobs(state, run_at);
CREATE INDEX IF NOT EXISTS idx_jobs_post ON jobs(post_id);

-- ---------------------------------------------------------------------------
-- Durable cache: scalar keys and membership sets with expiry
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    expires_at INTEGER NULL        -- unix seconds, NULL = no expiry
);

CREATE TABLE IF NOT EXISTS seen_ids (
    set_key TEXT NOT NULL,
    member TEXT NOT NULL,
    expires_at INTEGER NULL,
    PRIMARY KEY (set_key, member)
);
"#;
