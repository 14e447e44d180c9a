mod feeds;
mod posts;
mod schema;
mod store;
mod types;
mod users;

pub use schema::Database;
pub use store::{FeedStore, IngestStore, PostStore};
pub use types::{Feed, FeedFollow, IngestSummary, NewPost, Post, StoreError, User};
