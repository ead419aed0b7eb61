//! Research feed aggregation over OpenAlex and Semantic Scholar.
//!
//! [`feed::FeedAggregator`] is the entry point: it pages both providers
//! through one shared [`limiter::RateLimiter`], merges and de-duplicates the
//! results, and shuffles them into a single feed.

pub mod apis;
pub mod config;
pub mod dedup;
pub mod feed;
pub mod limiter;
pub mod shuffle;
pub mod topics;

pub use apis::{FeedPost, FeedSource, SourceError, SourceKind, SourcePage};
pub use config::Config;
pub use feed::{FeedAggregator, FeedError, FeedSettings, FeedSnapshot};
pub use limiter::RateLimiter;
