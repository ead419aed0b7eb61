pub mod openalex;
pub mod semantic_scholar;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::topics;

/// Longest description kept on a post, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 300;
/// Most tags kept on a post.
pub const MAX_TAGS: usize = 3;
/// Most author names listed before "et al.".
pub const MAX_AUTHORS: usize = 3;

const USER_AGENT: &str = "research-feed/0.1";

/// Provider a post came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    OpenAlex,
    SemanticScholar,
}

impl SourceKind {
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::OpenAlex => "openalex",
            SourceKind::SemanticScholar => "semantic_scholar",
        }
    }

    /// Prefix that keeps ids from different providers apart.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            SourceKind::OpenAlex => "openalex_",
            SourceKind::SemanticScholar => "semantic_",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A paper normalized into the shape the feed renders, whichever provider
/// produced it. `id` doubles as the dedup key and the render key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPost {
    pub id: String,
    pub title: String,
    pub description: String,
    pub author: String,
    pub thumbnail_url: Option<String>,
    pub tags: Vec<String>,
    pub citation_count: u32,
    pub year: u32,
    pub url: Option<String>,
    pub source: SourceKind,
}

/// One page of search results plus the provider's total hit count.
#[derive(Debug, Clone, Default)]
pub struct SourcePage {
    pub posts: Vec<FeedPost>,
    pub total: u64,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Provider returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Unexpected response: {0}")]
    Provider(String),
}

/// A paper-search provider the feed can pull from.
///
/// Implementations do no pacing of their own. Callers go through
/// [`crate::limiter::RateLimiter`] so one budget covers every provider.
#[async_trait]
pub trait FeedSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn search(&self, query: &str, limit: u32, offset: u32) -> Result<SourcePage, SourceError>;

    /// Search using the canned phrase for a coarse field keyword.
    async fn by_field(&self, field: &str, limit: u32) -> Result<SourcePage, SourceError> {
        self.search(topics::field_query(field), limit, 0).await
    }
}

/// Error body shape used by the paper proxies (`{ "error", "message" }`).
#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

pub(crate) fn http_client(user_agent: Option<String>) -> Result<reqwest::Client, SourceError> {
    let client = reqwest::Client::builder()
        .user_agent(user_agent.unwrap_or_else(|| USER_AGENT.to_string()))
        .build()?;
    Ok(client)
}

pub(crate) fn user_agent_with_mailto(email: Option<&str>) -> String {
    match email {
        Some(e) => format!("{} (mailto:{})", USER_AGENT, e),
        None => USER_AGENT.to_string(),
    }
}

/// Check the status, then decode the JSON body.
pub(crate) async fn decode_response<T: DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, SourceError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message.or(b.error))
            .unwrap_or_else(|| body.chars().take(200).collect());
        return Err(SourceError::Status {
            status: status.as_u16(),
            message,
        });
    }
    serde_json::from_str(&body).map_err(|e| SourceError::Provider(e.to_string()))
}

/// Deterministic placeholder image for posts without a thumbnail.
pub fn fallback_thumbnail(id: &str) -> String {
    let hash = id
        .chars()
        .fold(0u32, |h, c| h.wrapping_mul(31).wrapping_add(c as u32));
    format!("https://picsum.photos/seed/{:08x}/640/360", hash)
}

pub fn truncate_description(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= MAX_DESCRIPTION_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(MAX_DESCRIPTION_CHARS).collect();
    format!("{}...", cut.trim_end())
}

/// "A, B, C et al. · Venue"
pub fn author_line(names: &[String], venue: Option<&str>) -> String {
    let mut line = names
        .iter()
        .take(MAX_AUTHORS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if names.len() > MAX_AUTHORS {
        line.push_str(" et al.");
    }
    if line.is_empty() {
        line.push_str("Unknown author");
    }
    if let Some(venue) = venue.map(str::trim).filter(|v| !v.is_empty()) {
        line.push_str(" · ");
        line.push_str(venue);
    }
    line
}

pub fn cap_tags<I: IntoIterator<Item = String>>(tags: I) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        if out.len() == MAX_TAGS {
            break;
        }
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_thumbnail_is_stable_per_id() {
        let a = fallback_thumbnail("openalex_W123");
        assert_eq!(a, fallback_thumbnail("openalex_W123"));
        assert_ne!(a, fallback_thumbnail("semantic_abc"));
        assert!(a.starts_with("https://picsum.photos/seed/"));
    }

    #[test]
    fn long_descriptions_are_cut_with_ellipsis() {
        let text = "word ".repeat(100);
        let out = truncate_description(&text);
        assert!(out.ends_with("..."));
        assert!(out.chars().count() <= MAX_DESCRIPTION_CHARS + 3);
        assert_eq!(truncate_description("  short  "), "short");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "é".repeat(MAX_DESCRIPTION_CHARS + 10);
        let out = truncate_description(&text);
        assert_eq!(out.chars().count(), MAX_DESCRIPTION_CHARS + 3);
    }

    #[test]
    fn author_line_joins_and_appends_venue() {
        let names: Vec<String> = ["Ada", "Grace", "Alan", "Edsger"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(author_line(&names, Some("Nature")), "Ada, Grace, Alan et al. · Nature");
        assert_eq!(author_line(&names[..1], None), "Ada");
        assert_eq!(author_line(&[], Some(" ")), "Unknown author");
    }

    #[test]
    fn tags_are_capped_and_unique() {
        let tags = ["a", "b", "a", "", "c", "d"].iter().map(|s| s.to_string());
        assert_eq!(cap_tags(tags), vec!["a", "b", "c"]);
    }

    #[test]
    fn post_serializes_camel_case() {
        let post = FeedPost {
            id: "semantic_1".into(),
            title: "T".into(),
            description: String::new(),
            author: "A".into(),
            thumbnail_url: None,
            tags: vec![],
            citation_count: 3,
            year: 2021,
            url: None,
            source: SourceKind::SemanticScholar,
        };
        let json = serde_json::to_value(&post).unwrap();
        assert_eq!(json["citationCount"], 3);
        assert_eq!(json["source"], "semantic_scholar");
        assert!(json["thumbnailUrl"].is_null());
    }
}
