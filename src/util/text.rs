use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

/// Smallest maximum length a caller may configure for cleaned article text.
pub const MIN_CONTENT_LIMIT: usize = 1500;
/// Largest maximum length a caller may configure for cleaned article text.
pub const MAX_CONTENT_LIMIT: usize = 3000;

/// Boilerplate notices removed from extracted text, matched case-insensitively.
///
/// Removal is textual: a marker inside an ordinary sentence is removed too.
const BOILERPLATE_MARKERS: &[&str] = &[
    "광고",
    "스폰서",
    "관련기사",
    "추천기사",
    "댓글",
    "공유하기",
    "저작권",
    "All rights reserved",
    "Copyright",
    "Advertisement",
    "Sponsored",
    "Related Articles",
];

static BOILERPLATE_RE: OnceLock<Regex> = OnceLock::new();

fn boilerplate_regex() -> &'static Regex {
    BOILERPLATE_RE.get_or_init(|| {
        let alternation = BOILERPLATE_MARKERS
            .iter()
            .map(|m| regex::escape(m))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!("(?i)(?:{alternation})"))
            .expect("boilerplate markers are escaped literals")
    })
}

/// Collapses every run of whitespace to a single space and trims both ends.
///
/// Returns `Cow::Borrowed` when the input is already normalized.
pub fn normalize_whitespace(s: &str) -> Cow<'_, str> {
    let already_clean = !s.starts_with(char::is_whitespace)
        && !s.ends_with(char::is_whitespace)
        && !s
            .chars()
            .zip(s.chars().skip(1))
            .any(|(a, b)| a.is_whitespace() && (b.is_whitespace() || a != ' '));
    if already_clean {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Removes boilerplate notices (ads, sponsor lines, related-article headers,
/// comment and share prompts, copyright lines).
pub fn strip_boilerplate(s: &str) -> Cow<'_, str> {
    boilerplate_regex().replace_all(s, "")
}

/// Hard-cuts `s` to at most `max_chars` characters, then drops any trailing
/// whitespace left at the cut.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => s[..byte_idx].trim_end(),
        None => s,
    }
}

/// Text Cleaner: normalize, strip boilerplate, re-normalize, truncate.
///
/// Pure: the same input and limit always produce the same output.
///
/// # Examples
///
/// ```
/// use newsreel::util::clean_text;
///
/// let cleaned = clean_text("  Markets rose \n\n today. Advertisement  ", 1500);
/// assert_eq!(cleaned, "Markets rose today.");
/// ```
pub fn clean_text(text: &str, max_chars: usize) -> String {
    let collapsed = normalize_whitespace(text);
    let stripped = strip_boilerplate(&collapsed);
    let recollapsed = normalize_whitespace(&stripped);
    truncate_chars(&recollapsed, max_chars).to_string()
}

/// SEC-001: Strip terminal control characters and ANSI escape sequences.
///
/// Applied to stored article text before it is printed by the CLI, since feed
/// titles and page bodies are attacker-controlled.
/// Tab, newline and carriage return are kept.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let is_control = |c: char| c == '\x7f' || (c < ' ' && !matches!(c, '\t' | '\n' | '\r'));
    if !s.chars().any(is_control) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\x1b' {
            if !is_control(c) {
                out.push(c);
            }
            continue;
        }
        match chars.peek() {
            // CSI: parameters until a final byte in 0x40..=0x7e
            Some('[') => {
                chars.next();
                for n in chars.by_ref() {
                    if ('\x40'..='\x7e').contains(&n) {
                        break;
                    }
                }
            }
            // OSC: until BEL or ST (ESC \)
            Some(']') => {
                chars.next();
                while let Some(n) = chars.next() {
                    if n == '\x07' {
                        break;
                    }
                    if n == '\x1b' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => {}
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_collapses_runs() {
        assert_eq!(normalize_whitespace("  a \n\t b   c  "), "a b c");
    }

    #[test]
    fn test_normalize_clean_input_is_borrowed() {
        let result = normalize_whitespace("already clean text");
        assert!(matches!(result, Cow::Borrowed(_)));
    }

    #[test]
    fn test_normalize_single_newline_is_rewritten() {
        assert_eq!(normalize_whitespace("a\nb"), "a b");
    }

    #[test]
    fn test_strip_boilerplate_is_case_insensitive() {
        let result = strip_boilerplate("Body ADVERTISEMENT text copyright 2024 ALL RIGHTS RESERVED");
        assert_eq!(normalize_whitespace(&result), "Body text 2024");
    }

    #[test]
    fn test_strip_boilerplate_korean_markers() {
        let result = clean_text("삼성전자 주가 상승 관련기사 댓글 공유하기 저작권", 1500);
        assert_eq!(result, "삼성전자 주가 상승");
    }

    #[test]
    fn test_strip_boilerplate_partial_match_accepted() {
        // "광고주" loses its "광고" prefix: textual removal, known limitation
        assert_eq!(clean_text("광고주 회의", 1500), "주 회의");
    }

    #[test]
    fn test_truncate_exact_length() {
        let input: String = "abcdefghij".repeat(1000);
        let cleaned = clean_text(&input, 1500);
        assert_eq!(cleaned.chars().count(), 1500);
    }

    #[test]
    fn test_truncate_drops_trailing_space_at_cut() {
        // 4 chars + space, cut at 5 leaves "abcd "
        assert_eq!(truncate_chars("abcd efgh", 5), "abcd");
    }

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        let input = "가나다라마바사";
        assert_eq!(truncate_chars(input, 3), "가나다");
    }

    #[test]
    fn test_truncate_short_input_unchanged() {
        assert_eq!(truncate_chars("short", 1500), "short");
    }

    #[test]
    fn test_clean_text_ten_thousand_chars() {
        let word = "news ";
        let input = word.repeat(2000);
        assert_eq!(input.chars().count(), 10_000);
        let cleaned = clean_text(&input, 1500);
        // 1500 falls right after a space, which the cut drops
        assert_eq!(cleaned.chars().count(), 1499);
        assert!(!cleaned.ends_with(' '));

        let dense = "abcdefghij".repeat(1000);
        assert_eq!(clean_text(&dense, 1500).chars().count(), 1500);
    }

    proptest! {
        #[test]
        fn prop_clean_text_bounded_and_trimmed(s in "\\PC{0,4000}", limit in 1500usize..=3000) {
            let cleaned = clean_text(&s, limit);
            prop_assert!(cleaned.chars().count() <= limit);
            prop_assert_eq!(cleaned.trim(), cleaned.as_str());
            prop_assert!(!cleaned.contains("  "));
        }

        #[test]
        fn prop_clean_text_deterministic(s in "\\PC{0,500}") {
            prop_assert_eq!(clean_text(&s, 1500), clean_text(&s, 1500));
        }
    }

    #[test]
    fn test_strip_control_clean_text_is_borrowed() {
        let result = strip_control_chars("Hello, world!\n\tok");
        assert!(matches!(result, Cow::Borrowed(_)));
    }

    #[test]
    fn test_strip_control_removes_c0_and_del() {
        assert_eq!(strip_control_chars("he\x00ll\x07o\x7f!"), "hello!");
    }

    #[test]
    fn test_strip_ansi_sequences() {
        assert_eq!(strip_control_chars("\x1b[31mRed\x1b[0m"), "Red");
        assert_eq!(strip_control_chars("\x1b]0;title\x07safe"), "safe");
        assert_eq!(strip_control_chars("\x1b]0;title\x1b\\safe"), "safe");
        assert_eq!(strip_control_chars("a\x1bb"), "ab");
    }

    #[test]
    fn test_strip_control_keeps_unicode() {
        assert_eq!(strip_control_chars("뉴스 \x1b[1m속보\x1b[0m"), "뉴스 속보");
    }
}
