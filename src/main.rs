use std::sync::Arc;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters,
    model::*, tool, tool_handler, tool_router,
    transport::stdio, ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use research_feed::topics;
use research_feed::{Config, FeedAggregator, FeedError};

// ── Parameter structs ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
struct SearchFeedParams {
    #[schemars(description = "Free-text search. Empty string returns to the mixed-topic feed")]
    query: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct FilterFeedParams {
    #[schemars(description = "Field keyword, e.g. \"physics\" or \"biology\" (see list_fields)")]
    field: String,
}

// ── Server ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct FeedServer {
    tool_router: ToolRouter<Self>,
    config: Arc<Config>,
    feed: Arc<FeedAggregator>,
}

#[tool_router]
impl FeedServer {
    pub fn create() -> anyhow::Result<Self> {
        let config = Config::from_env()?;
        let feed = config.build_aggregator()?;

        tracing::info!(
            openalex = %config.openalex_base_url,
            semantic_scholar = %config.semantic_scholar_base_url,
            min_interval_ms = config.min_interval.as_millis() as u64,
            "feed aggregator ready"
        );

        Ok(Self {
            tool_router: Self::tool_router(),
            config: Arc::new(config),
            feed: Arc::new(feed),
        })
    }

    #[tool(description = "List the paper providers behind the feed and their credentials status")]
    async fn list_sources(&self) -> Result<CallToolResult, McpError> {
        to_json(&self.config.source_status())
    }

    #[tool(description = "List the field keywords accepted by filter_feed and the phrase each searches")]
    async fn list_fields(&self) -> Result<CallToolResult, McpError> {
        let fields: Vec<_> = topics::field_names()
            .into_iter()
            .map(|name| serde_json::json!({ "field": name, "query": topics::field_query(name) }))
            .collect();
        to_json(&fields)
    }

    #[tool(description = "Load the first page of a mixed-topic research feed")]
    async fn load_feed(&self) -> Result<CallToolResult, McpError> {
        let outcome = self.feed.load_initial().await;
        self.respond(outcome).await
    }

    #[tool(description = "Append the next page to the current feed")]
    async fn load_more(&self) -> Result<CallToolResult, McpError> {
        let outcome = self.feed.load_more().await;
        self.respond(outcome).await
    }

    #[tool(description = "Reload the feed from page one for the current query")]
    async fn refresh_feed(&self) -> Result<CallToolResult, McpError> {
        let outcome = self.feed.refresh().await;
        self.respond(outcome).await
    }

    #[tool(description = "Replace the feed with papers matching a search query")]
    async fn search_feed(
        &self,
        Parameters(params): Parameters<SearchFeedParams>,
    ) -> Result<CallToolResult, McpError> {
        let outcome = self.feed.search_by_query(&params.query).await;
        self.respond(outcome).await
    }

    #[tool(description = "Replace the feed with papers from a coarse field such as physics")]
    async fn filter_feed(
        &self,
        Parameters(params): Parameters<FilterFeedParams>,
    ) -> Result<CallToolResult, McpError> {
        let outcome = self.feed.filter_by_field(&params.field).await;
        self.respond(outcome).await
    }

    #[tool(description = "Current feed state: posts, loading, error, hasMore and rate-limiter queue length")]
    async fn feed_status(&self) -> Result<CallToolResult, McpError> {
        to_json(&self.feed.snapshot().await)
    }
}

impl FeedServer {
    /// Report the feed after an operation. A failed load is still a
    /// successful tool call: the snapshot carries the error for the client.
    async fn respond(&self, outcome: Result<bool, FeedError>) -> Result<CallToolResult, McpError> {
        match outcome {
            Ok(false) => tracing::debug!("feed operation skipped"),
            Ok(true) => {}
            Err(e) => tracing::warn!("feed operation failed: {}", e),
        }
        to_json(&self.feed.snapshot().await)
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("Serialization error: {}", e), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[tool_handler]
impl ServerHandler for FeedServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Browse a research feed merged from OpenAlex and Semantic Scholar. \
                 Start with load_feed, page with load_more, narrow with search_feed \
                 or filter_feed. Provider calls are paced to one per second."
                    .into(),
            ),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Starting research-feed MCP server");

    let server = FeedServer::create()?;
    let service = server.serve(stdio()).await?;
    service.waiting().await?;

    Ok(())
}
