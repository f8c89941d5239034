use anyhow::Result;
use feed_rs::parser;

/// One feed entry with the fields the crawler needs. Entries without a link
/// are dropped at parse time.
#[derive(Debug, Clone)]
pub struct ParsedEntry {
    pub url: String,
    pub title: String,
    /// Publication date as YYYY-MM-DD, when the feed provides one.
    pub published: Option<String>,
}

pub fn parse_feed(bytes: &[u8]) -> Result<Vec<ParsedEntry>> {
    let feed = parser::parse(bytes)?;

    let entries: Vec<ParsedEntry> = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let url = entry.links.first().map(|l| l.href.clone())?;
            let title = entry
                .title
                .map(|t| t.content)
                .unwrap_or_else(|| "Untitled".to_string());
            let published = entry
                .published
                .or(entry.updated)
                .map(|dt| dt.format("%Y-%m-%d").to_string());

            Some(ParsedEntry {
                url,
                title,
                published,
            })
        })
        .collect();

    Ok(entries)
}
