//! Finding links in command output
//!
//! Backend tools print links surrounded by banners and colour codes. The
//! output is cleaned first, then scanned for the first proxy link.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

/// CSI sequences (colours, cursor movement), OSC sequences and two-byte escapes
static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]")
        .expect("valid regex")
});

static URI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b[a-z][a-z0-9+.-]*://[^\s"'<>]+"#).expect("valid regex")
});

/// Result of scanning output for a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkMatch {
    Found(String),
    /// Output contained no proxy link; the output format may have changed
    NotFound,
}

impl LinkMatch {
    #[must_use]
    pub fn into_option(self) -> Option<String> {
        match self {
            LinkMatch::Found(link) => Some(link),
            LinkMatch::NotFound => None,
        }
    }
}

/// Remove terminal escape sequences and carriage returns
#[must_use]
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    let stripped = ANSI_RE.replace_all(text, "");
    if stripped.contains('\r') {
        Cow::Owned(stripped.replace('\r', ""))
    } else {
        stripped
    }
}

/// Find the first `scheme://...` link in `text`
///
/// Web links are skipped: backend tools print project and documentation
/// URLs next to the node link.
#[must_use]
pub fn find_link(text: &str) -> LinkMatch {
    let cleaned = strip_ansi(text);

    URI_RE
        .find_iter(&cleaned)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ')', ']', '>']))
        .find(|link| {
            let lower = link.to_ascii_lowercase();
            !lower.starts_with("http://") && !lower.starts_with("https://")
        })
        .map_or(LinkMatch::NotFound, |link| LinkMatch::Found(link.to_string()))
}
