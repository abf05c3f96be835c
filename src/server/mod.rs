//! HTTP ingress: health, enqueue/sync processing and queue inspection.

pub mod router;
mod routes;

pub use router::{AppState, groundswell_router};
