use chrono::{DateTime, Utc};
use feed_rs::model::FeedType;
use feed_rs::parser;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::storage::NewPost;
use crate::util::strip_control_chars;

/// Errors produced while turning a response body into a [`FeedDocument`].
#[derive(Debug, Error)]
pub enum ParseError {
    /// Body is not a syndication document at all (bad XML, HTML page, empty body)
    #[error("Malformed feed document: {0}")]
    Malformed(String),
    /// Body is a valid feed, but not RSS
    #[error("Unsupported feed format: {0} (only RSS is accepted)")]
    UnsupportedFormat(String),
}

/// A parsed RSS document: channel metadata plus entries in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedDocument {
    pub title: String,
    pub description: Option<String>,
    pub entries: Vec<FeedEntry>,
}

/// One `<item>` of a feed document, before persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub guid: String,
    pub title: String,
    pub link: Option<String>,
    /// `None` when the item had no publish date or it could not be parsed
    pub published: Option<DateTime<Utc>>,
    pub description: Option<String>,
}

impl FeedEntry {
    pub fn to_new_post(&self, feed_id: i64) -> NewPost {
        NewPost {
            feed_id,
            guid: self.guid.clone(),
            title: self.title.clone(),
            url: self.link.clone(),
            description: self.description.clone(),
            published_at: self.published.map(|dt| dt.timestamp()),
        }
    }
}

/// Parse an RSS body.
///
/// Entries are returned in document order without de-duplication. Atom and
/// JSON feeds are rejected with [`ParseError::UnsupportedFormat`].
pub fn parse_feed(bytes: &[u8]) -> Result<FeedDocument, ParseError> {
    // feed-rs fills missing ids with random UUIDs; leave them blank so
    // generate_guid derives a key that is stable across fetches.
    let feed = parser::Builder::new()
        .id_generator(|_links, _title, _uri| String::new())
        .build()
        .parse(bytes)
        .map_err(|e| ParseError::Malformed(e.to_string()))?;

    match feed.feed_type {
        FeedType::RSS0 | FeedType::RSS1 | FeedType::RSS2 => {}
        other => return Err(ParseError::UnsupportedFormat(format!("{:?}", other))),
    }

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry
                .links
                .first()
                .map(|l| l.href.trim().to_string())
                .filter(|l| !l.is_empty());
            let published = entry.published;
            let description = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .and_then(|d| clean_text(&d));
            let title = entry
                .title
                .and_then(|t| clean_text(&t.content))
                .unwrap_or_else(|| "Untitled".to_string());

            let existing_id = if entry.id.is_empty() {
                None
            } else {
                Some(entry.id.as_str())
            };
            let guid = generate_guid(existing_id, link.as_deref(), &title, published);

            FeedEntry {
                guid,
                title,
                link,
                published,
                description,
            }
        })
        .collect();

    Ok(FeedDocument {
        title: feed
            .title
            .and_then(|t| clean_text(&t.content))
            .unwrap_or_default(),
        description: feed.description.and_then(|d| clean_text(&d.content)),
        entries,
    })
}

/// Trim and strip control characters, mapping blank text to `None`.
fn clean_text(s: &str) -> Option<String> {
    let cleaned = strip_control_chars(s.trim());
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.into_owned())
    }
}

fn generate_guid(
    existing: Option<&str>,
    link: Option<&str>,
    title: &str,
    published: Option<DateTime<Utc>>,
) -> String {
    if let Some(guid) = existing {
        let trimmed = guid.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let input = format!(
        "{}|{}|{}",
        link.unwrap_or(""),
        title,
        published.map(|p| p.timestamp().to_string()).unwrap_or_default()
    );
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}
