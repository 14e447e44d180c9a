//! Helpers shared by the parser and the CLI.
//!
//! - **Text sanitizing**: strip control characters from feed-supplied text
//! - **URL validation**: refuse feed URLs the worker should not fetch

mod text;
mod url_validator;

pub use text::strip_control_chars;
pub use url_validator::{validate_feed_url, UrlValidationError};
