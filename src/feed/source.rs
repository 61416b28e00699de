use quick_xml::events::Event;
use quick_xml::Reader;

/// Text of each RSS `<item>`'s `<source>` element, in item order.
///
/// feed-rs keeps only the source URL, so the publisher name is read with a
/// second, lightweight pass over the same bytes. Items without a `<source>`
/// yield `None`. Parsing stops at the first XML error and returns what was
/// collected so far; the caller falls back to other publisher hints.
///
/// quick-xml (0.37) never expands `<!ENTITY>` declarations, so a hostile
/// DOCTYPE cannot inject content here.
pub(crate) fn item_sources(xml: &[u8]) -> Vec<Option<String>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut sources = Vec::new();
    let mut buf = Vec::new();
    let mut in_item = false;
    let mut in_source = false;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"item" => {
                    in_item = true;
                    sources.push(None);
                }
                b"source" if in_item => {
                    in_source = true;
                    text.clear();
                }
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"item" => sources.push(None),
            Ok(Event::Text(t)) if in_source => match t.unescape() {
                Ok(s) => text.push_str(&s),
                Err(e) => {
                    tracing::debug!(error = %e, "Unreadable <source> text");
                }
            },
            Ok(Event::CData(c)) if in_source => {
                text.push_str(&String::from_utf8_lossy(&c));
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"source" if in_source => {
                    in_source = false;
                    let name = text.trim();
                    if let Some(slot) = sources.last_mut() {
                        if !name.is_empty() {
                            *slot = Some(name.to_string());
                        }
                    }
                }
                b"item" => in_item = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!(error = %e, items = sources.len(), "Stopped reading item sources");
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sources_align_with_items() {
        let xml = br#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>t</title>
  <item><title>A - Daily</title><link>https://a.example/1</link>
    <source url="https://daily.example">The Daily</source></item>
  <item><title>B</title><link>https://b.example/1</link></item>
  <item><title>C</title><link>https://c.example/1</link>
    <source url="https://c.example">C &amp; Co</source></item>
</channel></rss>"#;
        assert_eq!(
            item_sources(xml),
            vec![
                Some("The Daily".to_string()),
                None,
                Some("C & Co".to_string())
            ]
        );
    }

    #[test]
    fn test_korean_source_name() {
        let xml = "<rss><channel><item><source url=\"https://www.hankyung.com\">한국경제</source></item></channel></rss>";
        assert_eq!(item_sources(xml.as_bytes()), vec![Some("한국경제".to_string())]);
    }

    #[test]
    fn test_channel_level_source_ignored() {
        let xml = b"<rss><channel><source>Channel</source><item><title>x</title></item></channel></rss>";
        assert_eq!(item_sources(xml), vec![None]);
    }

    #[test]
    fn test_malformed_xml_returns_partial() {
        let xml = b"<rss><channel><item><source>First</source></item><item><source>Bro";
        let sources = item_sources(xml);
        assert_eq!(sources.first(), Some(&Some("First".to_string())));
    }

    #[test]
    fn test_custom_entity_not_expanded() {
        let xml = br#"<?xml version="1.0"?>
<!DOCTYPE rss [<!ENTITY xxe "INJECTED">]>
<rss><channel><item><source>&xxe;</source></item></channel></rss>"#;
        let sources = item_sources(xml);
        assert!(sources
            .iter()
            .flatten()
            .all(|s| !s.contains("INJECTED")));
    }
}
