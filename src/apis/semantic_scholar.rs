use async_trait::async_trait;
use serde::Deserialize;

use super::{
    author_line, cap_tags, decode_response, fallback_thumbnail, http_client,
    truncate_description, FeedPost, FeedSource, SourceError, SourceKind, SourcePage,
};

pub const DEFAULT_BASE_URL: &str = "https://api.semanticscholar.org/graph/v1";

const FIELDS: &str = "title,abstract,authors,year,citationCount,venue,url,fieldsOfStudy,externalIds";

pub struct SemanticScholarClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl SemanticScholarClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, SourceError> {
        Ok(Self {
            client: http_client(None)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn add_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("x-api-key", key),
            None => req,
        }
    }
}

#[derive(Deserialize)]
struct S2SearchResponse {
    total: Option<u64>,
    data: Option<Vec<S2Paper>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Paper {
    paper_id: Option<String>,
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    authors: Option<Vec<S2Author>>,
    year: Option<u32>,
    citation_count: Option<u32>,
    venue: Option<String>,
    url: Option<String>,
    fields_of_study: Option<Vec<String>>,
    external_ids: Option<S2ExternalIds>,
}

#[derive(Deserialize)]
struct S2Author {
    name: Option<String>,
}

#[derive(Deserialize)]
struct S2ExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
}

fn s2_to_post(p: &S2Paper) -> Option<FeedPost> {
    let native = p.paper_id.as_deref().filter(|id| !id.is_empty())?;
    let id = format!("{}{}", SourceKind::SemanticScholar.id_prefix(), native);

    let names: Vec<String> = p
        .authors
        .as_ref()
        .map(|a| a.iter().filter_map(|a| a.name.clone()).collect())
        .unwrap_or_default();

    let url = p.url.clone().or_else(|| {
        p.external_ids
            .as_ref()
            .and_then(|e| e.doi.as_ref())
            .map(|doi| format!("https://doi.org/{}", doi))
    });

    Some(FeedPost {
        thumbnail_url: Some(fallback_thumbnail(&id)),
        id,
        title: p.title.clone().unwrap_or_default(),
        description: p
            .abstract_text
            .as_deref()
            .map(truncate_description)
            .unwrap_or_default(),
        author: author_line(&names, p.venue.as_deref()),
        tags: cap_tags(p.fields_of_study.clone().unwrap_or_default()),
        citation_count: p.citation_count.unwrap_or(0),
        year: p.year.unwrap_or(0),
        url,
        source: SourceKind::SemanticScholar,
    })
}

#[async_trait]
impl FeedSource for SemanticScholarClient {
    fn kind(&self) -> SourceKind {
        SourceKind::SemanticScholar
    }

    async fn search(&self, query: &str, limit: u32, offset: u32) -> Result<SourcePage, SourceError> {
        let limit = limit.clamp(1, 100).to_string();
        let offset = offset.to_string();
        let resp = self
            .add_auth(self.client.get(format!("{}/paper/search", self.base_url)).query(&[
                ("query", query),
                ("limit", limit.as_str()),
                ("offset", offset.as_str()),
                ("fields", FIELDS),
            ]))
            .send()
            .await?;
        let body: S2SearchResponse = decode_response(resp).await?;
        let posts: Vec<FeedPost> = body
            .data
            .unwrap_or_default()
            .iter()
            .filter_map(s2_to_post)
            .collect();
        let total = body.total.unwrap_or(posts.len() as u64);
        tracing::debug!(query, offset = offset.as_str(), returned = posts.len(), total, "semantic scholar search");
        Ok(SourcePage { posts, total })
    }
}
