//! Durable cache: scalar keys and membership sets with expiry.
//!
//! Backed by the `kv` / `seen_ids` tables and fronted by an in-memory moka
//! mirror, behind one actor so every mutation is a single serialized
//! operation. Key layout:
//!
//! - `seen:<source>` / `seen_posts:<subSource>` — dedup membership sets
//! - `last_fetch:<subSource>` — watermark integer
//! - `cooldown:<credentialIndex>` — cooldown expiry, unix millis, with TTL
//! - `posts:fetched:current_minute` — throughput counter, rolled every 60 s

mod actor;

pub use actor::{CacheHandle, spawn};
