//! HTML cleaning and text extraction for the indexer.
//!
//! Works on the raw markup string rather than a parsed DOM: the recovery
//! rules for malformed input (an unclosed `<script>` stops script
//! stripping, an unterminated indexer marker leaves the rest verbatim)
//! are positional and would be lost in a tree parse.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::hooks::HookRegistry;

/// Raw page handed to the indexer by the fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageInput {
    pub url: String,
    pub pid: i64,
    pub title: String,
    pub language: String,
    #[serde(default)]
    pub protected: bool,
    #[serde(default)]
    pub groups: Vec<i64>,
    pub content: String,
    #[serde(default)]
    pub filesize: Option<f64>,
}

/// Indexable content pulled out of one page.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPage {
    /// Cleaned concatenation of title, description, body and keywords.
    pub text: String,
    pub description: String,
    pub keywords: Vec<String>,
    /// Page size in KiB, rounded to two decimal places.
    pub filesize: f64,
}

const STOP_MARKER: &str = "<!-- indexer::stop -->";
const CONTINUE_MARKER: &str = "<!-- indexer::continue -->";

lazy_static! {
    static ref META_DESCRIPTION: Regex =
        Regex::new(r#"(?i)<meta[^>]+name\s*=\s*"description"[^>]+content\s*=\s*"([^"]*)""#)
            .expect("valid regex");
    static ref META_KEYWORDS: Regex =
        Regex::new(r#"(?i)<meta[^>]+name\s*=\s*"keywords"[^>]+content\s*=\s*"([^"]*)""#)
            .expect("valid regex");
    static ref ALT_TITLE_ATTR: Regex =
        Regex::new(r#"(?i)\b(?:title|alt)\s*=\s*"([^"]*)""#).expect("valid regex");
    static ref BR_TAG: Regex = Regex::new(r"(?i)<br").expect("valid regex");
    static ref TAG: Regex = Regex::new(r"<[^>]*>").expect("valid regex");
}

/// Clean the raw markup of `page` and extract its indexable parts.
///
/// Registered hooks run after region stripping, before the head/body
/// split, and may rewrite the content.
pub fn extract_page(page: &PageInput, hooks: &HookRegistry) -> ExtractedPage {
    let mut content = page.content.clone();

    for pat in ["\n", "\r", "\t", "&#160;", "&nbsp;"] {
        content = content.replace(pat, " ");
    }
    content = content.replace("&shy;", "");

    content = strip_regions(&content, "<script", "</script>");
    content = strip_regions(&content, "<style", "</style>");
    content = strip_marked_regions(&content);

    hooks.run(&mut content, page);

    let (head, body) = split_head(&content);

    let description = meta_content(head, &META_DESCRIPTION);

    let mut keywords = Vec::new();
    let meta_keywords = meta_content(head, &META_KEYWORDS);
    if !meta_keywords.is_empty() {
        keywords.push(meta_keywords);
    }
    collect_attribute_values(body, &mut keywords);

    let body_text = strip_tags(body);

    let joined = format!(
        "{} {} {} {}",
        page.title,
        description,
        body_text,
        keywords.join(" ")
    );
    let text = normalize_whitespace(&decode_entities(&joined));

    let filesize = page
        .filesize
        .unwrap_or_else(|| (page.content.len() as f64 / 1024.0 * 100.0).round() / 100.0);

    ExtractedPage {
        text,
        description,
        keywords,
        filesize,
    }
}

/// Remove every `open`..`close` region, replacing it with a single space.
/// An `open` without a matching `close` stops the stripping and leaves the
/// remainder verbatim.
fn strip_regions(html: &str, open: &str, close: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    loop {
        let Some(start) = find_ignore_ascii_case(rest, open, 0) else {
            out.push_str(rest);
            return out;
        };
        let Some(end) = find_ignore_ascii_case(rest, close, start + open.len()) else {
            out.push_str(rest);
            return out;
        };
        out.push_str(&rest[..start]);
        out.push(' ');
        rest = &rest[end + close.len()..];
    }
}

/// Remove regions bracketed by the `indexer::stop` / `indexer::continue`
/// markers. Markers nest: an inner stop consumes the next continue, so the
/// region closes at the balancing continue. An unterminated stop ends the
/// stripping.
fn strip_marked_regions(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    loop {
        let Some(start) = rest.find(STOP_MARKER) else {
            out.push_str(rest);
            return out;
        };
        let mut depth = 1usize;
        let mut pos = start + STOP_MARKER.len();
        let end = loop {
            let next_stop = rest[pos..].find(STOP_MARKER);
            let next_continue = rest[pos..].find(CONTINUE_MARKER);
            match (next_stop, next_continue) {
                (_, None) => break None,
                (Some(s), Some(c)) if s < c => {
                    depth += 1;
                    pos += s + STOP_MARKER.len();
                }
                (_, Some(c)) => {
                    depth -= 1;
                    pos += c + CONTINUE_MARKER.len();
                    if depth == 0 {
                        break Some(pos);
                    }
                }
            }
        };
        match end {
            Some(end) => {
                out.push_str(&rest[..start]);
                out.push(' ');
                rest = &rest[end..];
            }
            None => {
                out.push_str(rest);
                return out;
            }
        }
    }
}

fn split_head(content: &str) -> (&str, &str) {
    match find_ignore_ascii_case(content, "</head>", 0) {
        Some(pos) => (&content[..pos], &content[pos + "</head>".len()..]),
        None => ("", content),
    }
}

fn meta_content(head: &str, pattern: &Regex) -> String {
    pattern
        .captures(head)
        .map(|caps| normalize_whitespace(&decode_entities(&caps[1])))
        .unwrap_or_default()
}

/// Collect deduplicated `title="…"` and `alt="…"` attribute values.
fn collect_attribute_values(body: &str, keywords: &mut Vec<String>) {
    for caps in ALT_TITLE_ATTR.captures_iter(body) {
        let value = normalize_whitespace(&decode_entities(&caps[1]));
        if !value.is_empty() && !keywords.contains(&value) {
            keywords.push(value);
        }
    }
}

/// Reduce markup to plain text: a space before every `<br` and between
/// adjacent `><` keeps words apart once the tags are dropped.
fn strip_tags(body: &str) -> String {
    let spaced = BR_TAG.replace_all(body, " ${0}");
    let spaced = spaced.replace("><", "> <");
    TAG.replace_all(&spaced, "").into_owned()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn find_ignore_ascii_case(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let haystack = haystack.as_bytes();
    let needle = needle.as_bytes();
    if needle.is_empty() || haystack.len() < from + needle.len() {
        return None;
    }
    (from..=haystack.len() - needle.len())
        .find(|&i| haystack[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

/// Decode named and numeric character references. Unknown references are
/// left as-is.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail[1..]
            .find(';')
            .filter(|&i| i > 0 && i <= 31)
            .and_then(|semi| decode_entity(&tail[1..1 + semi]).map(|ch| (ch, semi + 2)));
        match decoded {
            Some((ch, len)) => {
                out.push(ch);
                rest = &tail[len..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = if let Some(hex) = num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            u32::from_str_radix(hex, 16).ok()?
        } else {
            num.parse::<u32>().ok()?
        };
        return char::from_u32(code);
    }
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "shy" => '\u{AD}',
        "auml" => 'ä',
        "ouml" => 'ö',
        "uuml" => 'ü',
        "Auml" => 'Ä',
        "Ouml" => 'Ö',
        "Uuml" => 'Ü',
        "szlig" => 'ß',
        "agrave" => 'à',
        "eacute" => 'é',
        "egrave" => 'è',
        "ccedil" => 'ç',
        "ndash" => '–',
        "mdash" => '—',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "hellip" => '…',
        "laquo" => '«',
        "raquo" => '»',
        "middot" => '·',
        "sect" => '§',
        "para" => '¶',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        "euro" => '€',
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(content: &str) -> PageInput {
        PageInput {
            url: "/test".into(),
            pid: 1,
            title: String::new(),
            language: "en".into(),
            protected: false,
            groups: vec![],
            content: content.into(),
            filesize: None,
        }
    }

    fn extract(content: &str) -> ExtractedPage {
        extract_page(&page(content), &HookRegistry::new())
    }

    #[test]
    fn scripts_are_removed() {
        assert_eq!(extract("<p>Hi<script>x</script>there</p>").text, "Hi there");
    }

    #[test]
    fn unclosed_script_stops_script_stripping() {
        // Without a closing tag the remainder is treated verbatim, so the
        // script body survives tag stripping.
        let out = extract("<p>Hi <script>alert(1)</p>");
        assert_eq!(out.text, "Hi alert(1)");
    }

    #[test]
    fn styles_are_removed() {
        assert_eq!(
            extract("<p>A<style>p { color: red }</style>B</p>").text,
            "A B"
        );
    }

    #[test]
    fn nested_indexer_markers_consume_until_balanced() {
        let html = "<p>A<!-- indexer::stop -->B<!-- indexer::stop -->C\
                    <!-- indexer::continue -->D<!-- indexer::continue -->E</p>";
        assert_eq!(extract(html).text, "A E");
    }

    #[test]
    fn unterminated_stop_marker_keeps_the_rest() {
        // The unmatched marker survives region stripping and is dropped
        // later with the other tags.
        let html = "<p>A <!-- indexer::stop -->B</p>";
        assert_eq!(extract(html).text, "A B");
    }

    #[test]
    fn alt_and_title_attributes_become_keywords() {
        let out = extract("</head><img alt=\"cat\" title=\"pet\">");
        assert!(out.keywords.contains(&"cat".to_string()));
        assert!(out.keywords.contains(&"pet".to_string()));
        assert!(out.text.contains("cat"));
        assert!(out.text.contains("pet"));
    }

    #[test]
    fn duplicate_attribute_values_are_merged() {
        let out = extract("</head><img alt=\"cat\"><img title=\"cat\">");
        assert_eq!(out.keywords, vec!["cat".to_string()]);
    }

    #[test]
    fn meta_description_and_keywords_are_extracted() {
        let html = "<meta name=\"description\" content=\"A &amp; B\">\
                    <meta name=\"keywords\" content=\"one, two\">\
                    </head><p>body</p>";
        let out = extract(html);
        assert_eq!(out.description, "A & B");
        assert_eq!(out.keywords[0], "one, two");
    }

    #[test]
    fn br_and_adjacent_tags_separate_words() {
        assert_eq!(
            extract("</head>one<br>two</p><p>three</p>").text,
            "one two three"
        );
    }

    #[test]
    fn whitespace_entities_collapse() {
        assert_eq!(extract("</head>a&nbsp;&#160;b\n\tc&shy;d").text, "a b cd");
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(decode_entities("a &amp; b &#65; &#x42; &euro;"), "a & b A B €");
        assert_eq!(decode_entities("broken &nope; &"), "broken &nope; &");
    }

    #[test]
    fn title_is_prepended_to_text() {
        let mut input = page("</head><p>body</p>");
        input.title = "Title".into();
        let out = extract_page(&input, &HookRegistry::new());
        assert_eq!(out.text, "Title body");
    }

    #[test]
    fn filesize_defaults_to_content_length() {
        let content = "x".repeat(2048);
        let out = extract(&content);
        assert!((out.filesize - 2.0).abs() < f64::EPSILON);

        let mut input = page("abc");
        input.filesize = Some(7.5);
        assert!((extract_page(&input, &HookRegistry::new()).filesize - 7.5).abs() < f64::EPSILON);
    }

    #[test]
    fn hooks_can_rewrite_content() {
        let mut hooks = HookRegistry::new();
        hooks.register(Box::new(|content: &mut String, _: &PageInput| {
            *content = content.replace("secret", "");
        }));
        let out = extract_page(&page("</head><p>public secret</p>"), &hooks);
        assert_eq!(out.text, "public");
    }
}
