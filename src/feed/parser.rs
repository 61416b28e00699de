use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use feed_rs::parser;

use super::source::item_sources;

const UNKNOWN_SOURCE: &str = "Unknown";

/// One current entry of a keyword feed, in provider order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    /// Publisher name.
    pub source: String,
    /// Publication time in the configured offset, without zone information.
    pub published: NaiveDateTime,
}

/// Entries parsed from one feed document.
#[derive(Debug, Default)]
pub struct ParseResult {
    pub entries: Vec<FeedEntry>,
    /// Entries dropped for lacking a link.
    pub skipped: usize,
}

/// Parse an RSS/Atom document into feed entries.
///
/// Entries without a link are skipped. Entries without a publication (or
/// update) time are stamped with `fetched_at`.
pub fn parse_feed(
    bytes: &[u8],
    offset: FixedOffset,
    fetched_at: DateTime<Utc>,
) -> Result<ParseResult, parser::ParseFeedError> {
    let feed = parser::parse(bytes)?;
    let sources = item_sources(bytes);

    let mut result = ParseResult::default();
    for (idx, entry) in feed.entries.into_iter().enumerate() {
        let Some(link) = entry
            .links
            .first()
            .map(|l| l.href.trim().to_string())
            .filter(|href| !href.is_empty())
        else {
            result.skipped += 1;
            continue;
        };

        let title = entry
            .title
            .map(|t| t.content.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Untitled".to_string());

        let source = sources
            .get(idx)
            .cloned()
            .flatten()
            .or_else(|| title_suffix_source(&title))
            .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());

        let published = entry
            .published
            .or(entry.updated)
            .unwrap_or(fetched_at)
            .with_timezone(&offset)
            .naive_local();

        result.entries.push(FeedEntry {
            title,
            link,
            source,
            published,
        });
    }

    Ok(result)
}

/// Publisher from a "Headline - Publisher" title, as news aggregators format them.
fn title_suffix_source(title: &str) -> Option<String> {
    let (_, suffix) = title.rsplit_once(" - ")?;
    let suffix = suffix.trim();
    (!suffix.is_empty()).then(|| suffix.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use pretty_assertions::assert_eq;

    fn kst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn fetched() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap()
    }

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>"acme" - Google News</title>
<item>
  <title>Acme beats estimates - Example Times</title>
  <link>https://news.example.com/acme-1</link>
  <pubDate>Wed, 01 May 2024 15:30:00 GMT</pubDate>
  <source url="https://times.example.com">Example Times</source>
</item>
<item>
  <title>Acme shares slide - Market Wire</title>
  <link>https://wire.example.com/acme-2</link>
  <pubDate>Wed, 01 May 2024 01:00:00 GMT</pubDate>
</item>
<item>
  <title>No link here</title>
  <pubDate>Wed, 01 May 2024 01:00:00 GMT</pubDate>
</item>
<item>
  <title>Undated</title>
  <link>https://undated.example.com/3</link>
</item>
</channel></rss>"#;

    #[test]
    fn test_parse_entries_in_feed_order() {
        let result = parse_feed(FEED.as_bytes(), kst(), fetched()).unwrap();
        let links: Vec<_> = result.entries.iter().map(|e| e.link.as_str()).collect();
        assert_eq!(
            links,
            vec![
                "https://news.example.com/acme-1",
                "https://wire.example.com/acme-2",
                "https://undated.example.com/3",
            ]
        );
        assert_eq!(result.skipped, 1);
    }

    #[test]
    fn test_published_normalized_to_offset() {
        let result = parse_feed(FEED.as_bytes(), kst(), fetched()).unwrap();
        // 15:30 UTC is 00:30 the next day in UTC+9
        assert_eq!(
            result.entries[0].published,
            NaiveDate::from_ymd_opt(2024, 5, 2)
                .unwrap()
                .and_hms_opt(0, 30, 0)
                .unwrap()
        );
    }

    #[test]
    fn test_missing_date_uses_fetch_time() {
        let result = parse_feed(FEED.as_bytes(), kst(), fetched()).unwrap();
        assert_eq!(
            result.entries[2].published,
            NaiveDate::from_ymd_opt(2024, 5, 2)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn test_source_fallbacks() {
        let result = parse_feed(FEED.as_bytes(), kst(), fetched()).unwrap();
        assert_eq!(result.entries[0].source, "Example Times");
        assert_eq!(result.entries[1].source, "Market Wire");
        assert_eq!(result.entries[2].source, "Unknown");
    }

    #[test]
    fn test_empty_channel() {
        let xml = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>t</title></channel></rss>"#;
        let result = parse_feed(xml.as_bytes(), kst(), fetched()).unwrap();
        assert!(result.entries.is_empty());
    }

    #[test]
    fn test_not_a_feed_is_error() {
        assert!(parse_feed(b"<html><body>captcha</body></html>", kst(), fetched()).is_err());
    }

    #[test]
    fn test_title_suffix_source() {
        assert_eq!(title_suffix_source("A - B - Publisher").as_deref(), Some("Publisher"));
        assert_eq!(title_suffix_source("No suffix"), None);
        assert_eq!(title_suffix_source("Trailing - "), None);
    }
}
