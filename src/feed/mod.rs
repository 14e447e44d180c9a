//! Feed retrieval and parsing.
//!
//! - [`fetcher`] - HTTP retrieval of raw feed bodies with a size limit
//! - [`parser`] - RSS parsing using the `feed-rs` crate
//!
//! The scheduler combines the two: it fetches through a [`FeedSource`] under a
//! deadline and hands the body to [`parse_feed`].

mod fetcher;
mod parser;

pub use fetcher::{FeedSource, FetchError, HttpFetcher};
pub use parser::{parse_feed, FeedDocument, FeedEntry, ParseError};
