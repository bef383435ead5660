use std::sync::Arc;

use crate::{
    db::ReferenceStore,
    domain::{ActionKind, DigestText, RuleDuration},
    error::StoreError,
    notify::template::escape_html,
};

use super::executor::ExecutedAction;

pub const SECTION_OPEN_DOMAIN: &str = "open_domain";
pub const SECTION_OPEN_URL: &str = "open_url";
pub const SECTION_OPEN_DOMAIN_TEMPORARY: &str = "open_domain_temporary";
pub const SECTION_OPEN_URL_TEMPORARY: &str = "open_url_temporary";
pub const SECTION_BLOCKED: &str = "netfree_block";

pub const PRE_TEXT: &str = "pre_text";
pub const AFTER_TEXT: &str = "after_text";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DigestGroupKey {
    pub kind: ActionKind,
    pub duration: Option<RuleDuration>,
}

impl DigestGroupKey {
    /// Digest section the group renders into; email actions grant nothing and have none.
    pub fn section(&self) -> Option<&'static str> {
        match self.kind {
            ActionKind::OpenDomain => Some(SECTION_OPEN_DOMAIN),
            ActionKind::OpenUrl => Some(SECTION_OPEN_URL),
            ActionKind::OpenDomainFor => Some(SECTION_OPEN_DOMAIN_TEMPORARY),
            ActionKind::OpenUrlFor => Some(SECTION_OPEN_URL_TEMPORARY),
            ActionKind::SendEmail => None,
        }
    }

    pub fn duration_label(&self) -> Option<String> {
        self.duration.map(|duration| duration.to_string())
    }
}

/// URLs grouped by rule kind and duration, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestAccumulator {
    groups: Vec<(DigestGroupKey, Vec<String>)>,
}

impl DigestAccumulator {
    /// Adds the action's URL to its group. Actions without a digest section are
    /// ignored and reported with `false`.
    pub fn record(&mut self, action: &ExecutedAction) -> bool {
        let key = DigestGroupKey {
            kind: action.kind,
            duration: action.duration,
        };
        if key.section().is_none() {
            return false;
        }
        let index = match self.groups.iter().position(|(existing, _)| *existing == key) {
            Some(index) => index,
            None => {
                self.groups.push((key, Vec::new()));
                self.groups.len() - 1
            }
        };
        let urls = &mut self.groups[index].1;
        if !urls.contains(&action.url) {
            urls.push(action.url.clone());
        }
        true
    }

    pub fn groups(&self) -> &[(DigestGroupKey, Vec<String>)] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    fn urls_for(&self, kind: ActionKind) -> Vec<String> {
        self.groups
            .iter()
            .filter(|(key, _)| key.kind == kind)
            .flat_map(|(_, urls)| urls.iter().cloned())
            .collect()
    }
}

/// Duration-specific text first, then the section default, then any undated row.
pub fn pick_text(rows: &[DigestText], text_type: &str, duration: Option<&str>) -> String {
    let of_type = || rows.iter().filter(move |row| row.text_type == text_type);
    duration
        .and_then(|label| {
            of_type().find(|row| row.duration_label.as_deref() == Some(label))
        })
        .or_else(|| of_type().find(|row| row.is_default))
        .or_else(|| of_type().find(|row| row.duration_label.is_none()))
        .map(|row| row.text.clone())
        .unwrap_or_default()
}

pub fn render_url_list(urls: &[String]) -> String {
    if urls.is_empty() {
        return String::new();
    }
    let mut html = String::from("<ul>");
    for url in urls {
        let escaped = escape_html(url);
        html.push_str(&format!("<li><a href=\"{escaped}\">{escaped}</a></li>"));
    }
    html.push_str("</ul>");
    html
}

/// Pre-text with the duration, the URL list, then the post-text.
pub fn render_group(urls: &[String], pre: &str, after: &str, duration: &str) -> String {
    if urls.is_empty() {
        return String::new();
    }
    let heading = format!("{} {}", pre.trim(), duration.trim());
    let mut html = String::new();
    if !heading.trim().is_empty() {
        html.push_str(&format!("<p>{}</p>", escape_html(heading.trim())));
    }
    html.push_str(&render_url_list(urls));
    if !after.trim().is_empty() {
        html.push_str(&format!("<p>{}</p>", escape_html(after.trim())));
    }
    html
}

pub struct DigestRenderer {
    store: Arc<dyn ReferenceStore>,
}

impl DigestRenderer {
    pub fn new(store: Arc<dyn ReferenceStore>) -> Self {
        Self { store }
    }

    /// Placeholder values for the digest template, all of them HTML-safe.
    pub async fn placeholders(
        &self,
        accumulator: &DigestAccumulator,
        denied_urls: &[String],
        client_email: &str,
    ) -> Result<Vec<(String, String)>, StoreError> {
        let mut values = vec![("client_email".to_string(), escape_html(client_email))];

        for (section, prefix, urls) in [
            (
                SECTION_OPEN_DOMAIN,
                "traffic_recording_open_domain",
                accumulator.urls_for(ActionKind::OpenDomain),
            ),
            (
                SECTION_OPEN_URL,
                "traffic_recording_open_url",
                accumulator.urls_for(ActionKind::OpenUrl),
            ),
            (
                SECTION_BLOCKED,
                "traffic_recording_blocked",
                denied_urls.to_vec(),
            ),
        ] {
            let rows = self.store.digest_texts(section).await?;
            values.push((format!("{prefix}_pre_text"), pick_text(&rows, PRE_TEXT, None)));
            values.push((format!("{prefix}_list"), render_url_list(&urls)));
            values.push((format!("{prefix}_after_text"), pick_text(&rows, AFTER_TEXT, None)));
        }

        for (section, placeholder, kind) in [
            (
                SECTION_OPEN_DOMAIN_TEMPORARY,
                "traffic_recording_open_domain_temporary",
                ActionKind::OpenDomainFor,
            ),
            (
                SECTION_OPEN_URL_TEMPORARY,
                "traffic_recording_open_url_temporary",
                ActionKind::OpenUrlFor,
            ),
        ] {
            let rows = self.store.digest_texts(section).await?;
            let mut rendered = String::new();
            for (key, urls) in accumulator.groups().iter().filter(|(key, _)| key.kind == kind) {
                let duration = key.duration_label().unwrap_or_default();
                let pre = pick_text(&rows, PRE_TEXT, Some(&duration));
                let after = pick_text(&rows, AFTER_TEXT, Some(&duration));
                rendered.push_str(&render_group(urls, &pre, &after, &duration));
            }
            values.push((placeholder.to_string(), rendered));
        }

        Ok(values)
    }
}
