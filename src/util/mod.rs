//! Shared utilities.
//!
//! Currently this is URL validation: article links taken from fetched feeds
//! go through [`validate_url`] before being handed to the reader proxy, so a
//! hostile feed entry cannot point the scraper at internal infrastructure.
//! Feed and control-plane URLs come from operator config and are trusted
//! as-is.
//!
//! # Examples
//!
//! ```
//! use qbank::util::validate_url;
//!
//! let url = validate_url("https://example.com/business/article-42").unwrap();
//! assert_eq!(url.host_str(), Some("example.com"));
//! ```

mod url_validator;

pub use url_validator::{validate_url, UrlValidationError};
