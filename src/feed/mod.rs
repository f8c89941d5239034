pub mod crawler;
pub mod parser;

pub use crawler::{CrawlStats, FeedCrawler};
pub use parser::{parse_feed, ParsedEntry};
