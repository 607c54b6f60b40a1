mod client;
pub mod types;

pub use client::{ApiError, TimelineApi, TimelineEndpoint, TimelineQuery, TwitterClient};
