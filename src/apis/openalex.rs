use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use super::{
    author_line, cap_tags, decode_response, fallback_thumbnail, http_client,
    truncate_description, user_agent_with_mailto, FeedPost, FeedSource, SourceError, SourceKind,
    SourcePage,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openalex.org";

const SELECT: &str = "id,title,display_name,authorships,publication_year,cited_by_count,\
abstract_inverted_index,primary_location,doi,concepts,topics";

pub struct OpenAlexClient {
    client: reqwest::Client,
    base_url: String,
}

impl OpenAlexClient {
    pub fn new(base_url: impl Into<String>, email: Option<String>) -> Result<Self, SourceError> {
        Ok(Self {
            client: http_client(Some(user_agent_with_mailto(email.as_deref())))?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Deserialize)]
struct OAResponse {
    meta: Option<OAMeta>,
    results: Vec<OAWork>,
}

#[derive(Deserialize)]
struct OAMeta {
    count: Option<u64>,
}

#[derive(Deserialize)]
struct OAWork {
    id: Option<String>,
    title: Option<String>,
    display_name: Option<String>,
    authorships: Option<Vec<OAAuthorship>>,
    publication_year: Option<u32>,
    cited_by_count: Option<u32>,
    abstract_inverted_index: Option<HashMap<String, Vec<usize>>>,
    primary_location: Option<OALocation>,
    doi: Option<String>,
    concepts: Option<Vec<OALabel>>,
    topics: Option<Vec<OALabel>>,
}

#[derive(Deserialize)]
struct OAAuthorship {
    author: OAAuthor,
}

#[derive(Deserialize)]
struct OAAuthor {
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct OALocation {
    landing_page_url: Option<String>,
    source: Option<OALabel>,
}

#[derive(Deserialize)]
struct OALabel {
    display_name: Option<String>,
}

/// Rebuild abstract text from OpenAlex's `{word: [positions]}` encoding.
pub fn decode_inverted_index(index: &HashMap<String, Vec<usize>>) -> String {
    let mut pairs: Vec<(usize, &str)> = index
        .iter()
        .flat_map(|(word, positions)| positions.iter().map(move |&p| (p, word.as_str())))
        .collect();
    pairs.sort_by_key(|(pos, _)| *pos);
    pairs.into_iter().map(|(_, w)| w).collect::<Vec<_>>().join(" ")
}

fn oa_to_post(w: &OAWork) -> Option<FeedPost> {
    // "https://openalex.org/W2741809807" -> "W2741809807"
    let native = w.id.as_deref()?.rsplit('/').next()?.to_string();
    if native.is_empty() {
        return None;
    }
    let id = format!("{}{}", SourceKind::OpenAlex.id_prefix(), native);

    let title = w
        .title
        .clone()
        .or_else(|| w.display_name.clone())
        .unwrap_or_default();
    let description = w
        .abstract_inverted_index
        .as_ref()
        .map(decode_inverted_index)
        .map(|text| truncate_description(&text))
        .unwrap_or_default();

    let names: Vec<String> = w
        .authorships
        .as_ref()
        .map(|a| a.iter().filter_map(|a| a.author.display_name.clone()).collect())
        .unwrap_or_default();
    let venue = w
        .primary_location
        .as_ref()
        .and_then(|loc| loc.source.as_ref())
        .and_then(|s| s.display_name.as_deref());

    let labels = w
        .topics
        .iter()
        .chain(w.concepts.iter())
        .flatten()
        .filter_map(|l| l.display_name.clone());

    let url = w
        .doi
        .clone()
        .or_else(|| {
            w.primary_location
                .as_ref()
                .and_then(|loc| loc.landing_page_url.clone())
        })
        .or_else(|| w.id.clone());

    Some(FeedPost {
        thumbnail_url: Some(fallback_thumbnail(&id)),
        id,
        title,
        description,
        author: author_line(&names, venue),
        tags: cap_tags(labels),
        citation_count: w.cited_by_count.unwrap_or(0),
        year: w.publication_year.unwrap_or(0),
        url,
        source: SourceKind::OpenAlex,
    })
}

#[async_trait]
impl FeedSource for OpenAlexClient {
    fn kind(&self) -> SourceKind {
        SourceKind::OpenAlex
    }

    async fn search(&self, query: &str, limit: u32, offset: u32) -> Result<SourcePage, SourceError> {
        // OpenAlex pages by page number, not offset.
        let per_page = limit.clamp(1, 200);
        let page = (offset / per_page + 1).to_string();
        let per_page = per_page.to_string();
        let resp = self
            .client
            .get(format!("{}/works", self.base_url))
            .query(&[
                ("search", query),
                ("per_page", per_page.as_str()),
                ("page", page.as_str()),
                ("select", SELECT),
            ])
            .send()
            .await?;
        let body: OAResponse = decode_response(resp).await?;
        let posts: Vec<FeedPost> = body.results.iter().filter_map(oa_to_post).collect();
        let total = body
            .meta
            .and_then(|m| m.count)
            .unwrap_or(posts.len() as u64);
        tracing::debug!(query, offset, returned = posts.len(), total, "openalex search");
        Ok(SourcePage { posts, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn inverted_index_is_rebuilt_by_position() {
        let index: HashMap<String, Vec<usize>> = serde_json::from_value(json!({
            "interest": [2, 4],
            "Despite": [0],
            "growing": [1],
            "and": [3]
        }))
        .unwrap();
        assert_eq!(decode_inverted_index(&index), "Despite growing interest and interest");
        assert_eq!(decode_inverted_index(&HashMap::new()), "");
    }

    #[test]
    fn work_is_normalized() {
        let work: OAWork = serde_json::from_value(json!({
            "id": "https://openalex.org/W42",
            "title": "Attention Is All You Need",
            "authorships": [
                {"author": {"display_name": "Ashish Vaswani"}},
                {"author": {"display_name": "Noam Shazeer"}}
            ],
            "publication_year": 2017,
            "cited_by_count": 90000,
            "abstract_inverted_index": {"The": [0], "dominant": [1]},
            "primary_location": {"source": {"display_name": "NeurIPS"}},
            "doi": "https://doi.org/10.5555/3295222",
            "topics": [{"display_name": "Transformers"}],
            "concepts": [{"display_name": "Computer science"}, {"display_name": "Transformers"}]
        }))
        .unwrap();

        let post = oa_to_post(&work).unwrap();
        assert_eq!(post.id, "openalex_W42");
        assert_eq!(post.description, "The dominant");
        assert_eq!(post.author, "Ashish Vaswani, Noam Shazeer · NeurIPS");
        assert_eq!(post.tags, vec!["Transformers", "Computer science"]);
        assert_eq!(post.year, 2017);
        assert_eq!(post.citation_count, 90000);
        assert_eq!(post.url.as_deref(), Some("https://doi.org/10.5555/3295222"));
        assert_eq!(post.thumbnail_url, Some(fallback_thumbnail("openalex_W42")));
        assert_eq!(post.source, SourceKind::OpenAlex);
    }

    #[test]
    fn work_without_id_is_skipped() {
        let work: OAWork = serde_json::from_value(json!({"title": "orphan"})).unwrap();
        assert!(oa_to_post(&work).is_none());
    }

    #[tokio::test]
    async fn search_maps_offset_to_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works"))
            .and(query_param("search", "graph theory"))
            .and(query_param("per_page", "4"))
            .and(query_param("page", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meta": {"count": 321},
                "results": [{"id": "https://openalex.org/W1", "title": "Paths"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAlexClient::new(server.uri(), None).unwrap();
        let page = client.search("graph theory", 4, 8).await.unwrap();
        assert_eq!(page.total, 321);
        assert_eq!(page.posts.len(), 1);
        assert_eq!(page.posts[0].id, "openalex_W1");
    }

    #[tokio::test]
    async fn error_status_carries_proxy_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({
                "error": "upstream",
                "message": "OpenAlex unavailable"
            })))
            .mount(&server)
            .await;

        let client = OpenAlexClient::new(server.uri(), None).unwrap();
        match client.search("x", 4, 0).await {
            Err(SourceError::Status { status, message }) => {
                assert_eq!(status, 503);
                assert_eq!(message, "OpenAlex unavailable");
            }
            other => panic!("expected status error, got {:?}", other.map(|p| p.posts.len())),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
            .mount(&server)
            .await;

        let client = OpenAlexClient::new(server.uri(), None).unwrap();
        let err = client.search("x", 4, 0).await.unwrap_err();
        assert!(matches!(err, SourceError::Provider(_)));
    }

    #[tokio::test]
    async fn by_field_uses_canned_phrase() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works"))
            .and(query_param("search", "quantum physics theoretical physics"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meta": {"count": 0},
                "results": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAlexClient::new(server.uri(), None).unwrap();
        let page = client.by_field("physics", 6).await.unwrap();
        assert!(page.posts.is_empty());
    }
}
