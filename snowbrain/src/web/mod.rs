mod cache;
mod client;

pub use cache::ContentCache;
pub use client::{truncate_graphemes, ContentClient, MAX_QUERIES, MAX_URLS};
