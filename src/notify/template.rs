use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid blank regex"));
static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(\w+)\}").expect("valid placeholder regex"));

/// Replaces every `{name}` occurrence with its value in one pass, so substituted
/// values are never expanded again. Unknown placeholders stay as written.
pub fn replace_placeholders<'a, I>(template: &str, replacements: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut values = HashMap::new();
    for (placeholder, value) in replacements {
        values.entry(placeholder).or_insert(value);
    }
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match values.get(&caps[1]) {
            Some(value) => (*value).to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Plain-text alternative for an HTML body.
pub fn strip_tags(html: &str) -> String {
    let spaced = html
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("<br />", "\n")
        .replace("</p>", "</p>\n")
        .replace("</li>", "</li>\n");
    let text = TAG_REGEX.replace_all(&spaced, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    BLANK_LINES.replace_all(text.trim(), "\n\n").into_owned()
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
