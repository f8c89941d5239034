//! Article content retrieval and cleanup.

pub mod reader;

pub use reader::{clean_text, fetch_content, ContentError};
