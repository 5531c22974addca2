//! URL detection for scrap text shown in the widget.
//!
//! Only the first URL of a scrap is turned into a link; any later URLs stay
//! plain text.

use std::sync::OnceLock;

use regex::Regex;

// Word characters are ASCII only; a non-ASCII letter ends the URL.
const URL_PATTERN: &str = concat!(
    r"(http|ftp|https)://",
    r"([A-Za-z0-9_-]+(?:(?:\.[A-Za-z0-9_-]+)+))",
    r"([A-Za-z0-9_.,@?^=%&:/~+#-]*[A-Za-z0-9_@?^=%&/~+#-])?",
);

fn url_regex() -> Option<&'static Regex> {
    static URL_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    URL_REGEX.get_or_init(|| Regex::new(URL_PATTERN).ok()).as_ref()
}

/// A scrap split around its first URL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Segments<'a> {
    Plain(&'a str),
    Linked { before: &'a str, url: &'a str, after: &'a str },
}

pub fn split_first_url(text: &str) -> Segments<'_> {
    match url_regex().and_then(|regex| regex.find(text)) {
        Some(found) => Segments::Linked {
            before: &text[..found.start()],
            url: found.as_str(),
            after: &text[found.end()..],
        },
        None => Segments::Plain(text),
    }
}
