//! Markup module.
//!
//! Converts the small markdown subset accepted in bodies into an HTML
//! document: `**bold**`, `[label](http(s)://url)`, line breaks and
//! double spaces. Everything else is copied as is, HTML included.

use log::trace;
use regex::Regex;
use std::sync::OnceLock;

pub const FONT_STACK: &str = "'Google Sans', Arial, sans-serif";
pub const LINK_STYLE: &str = "color:#1a73e8; text-decoration:underline;";

fn bold_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\*\*(.*?)\*\*").unwrap())
}

fn link_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\[(.*?)\]\((https?://[^\s)]+)\)").unwrap())
}

/// Converts the given text into an HTML document. An empty text gives
/// an empty string.
pub fn markup_to_html(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    trace!(">> convert markup to html");

    let text = text.replace("\r\n", "\n");
    let text = bold_regex().replace_all(&text, "<b>$1</b>");
    let text = link_regex().replace_all(
        &text,
        format!(r#"<a href="$2" style="{}" target="_blank">$1</a>"#, LINK_STYLE).as_str(),
    );
    let text = text.replace('\n', "<br>").replace("  ", "&nbsp;&nbsp;");

    trace!("<< convert markup to html");

    format!(
        "<html><body style=\"font-family: {}; font-size: 14px; line-height: 1.6;\">\n{}\n</body></html>\n",
        FONT_STACK, text
    )
}
