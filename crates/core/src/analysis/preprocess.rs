//! Input normalization before text is sent to the provider.

use once_cell::sync::Lazy;
use regex_lite::Regex;

static MARKUP_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static BARE_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").unwrap());
static REPEATED_PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"([!?])[!?]+").unwrap());

/// Text ready for a provider request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedText {
    pub text: String,
    pub truncated: bool,
    /// Character count after cleaning, before truncation.
    pub original_chars: usize,
}

impl PreparedText {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn chars(&self) -> usize {
        self.text.chars().count()
    }
}

/// Trim, collapse whitespace and clamp to `max_chars` characters.
///
/// With `strip_markup`, HTML tags and bare URLs are removed first.
/// Truncated output ends with "..." and never exceeds `max_chars`.
pub fn preprocess(text: &str, max_chars: usize, strip_markup: bool) -> PreparedText {
    let mut cleaned = text.to_string();
    if strip_markup {
        cleaned = MARKUP_TAG.replace_all(&cleaned, " ").into_owned();
        cleaned = BARE_URL.replace_all(&cleaned, " ").into_owned();
        cleaned = REPEATED_PUNCTUATION.replace_all(&cleaned, "$1").into_owned();
    }

    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let original_chars = collapsed.chars().count();

    if original_chars <= max_chars {
        return PreparedText {
            text: collapsed,
            truncated: false,
            original_chars,
        };
    }

    const ELLIPSIS: &str = "...";
    // No room for the ellipsis: plain cut.
    if max_chars <= ELLIPSIS.len() {
        return PreparedText {
            text: collapsed.chars().take(max_chars).collect(),
            truncated: true,
            original_chars,
        };
    }

    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut text: String = collapsed.chars().take(keep).collect();
    text.truncate(text.trim_end().len());
    text.push_str(ELLIPSIS);

    PreparedText {
        text,
        truncated: true,
        original_chars,
    }
}
