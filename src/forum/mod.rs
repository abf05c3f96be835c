//! Forum listing API client (Reddit-shaped, password-grant OAuth accounts).

mod client;

pub use client::{ForumClient, ListingQuery};
