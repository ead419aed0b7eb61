//! Feed aggregation: pulls batches from both providers through the shared
//! rate limiter, merges them, drops duplicates, shuffles and paginates.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{watch, Mutex};

use crate::apis::{FeedPost, FeedSource, SourcePage};
use crate::dedup::dedupe;
use crate::limiter::RateLimiter;
use crate::shuffle::shuffle;
use crate::topics::{field_query, TOPIC_CATALOG};

/// Tunables for batch sizes and pagination.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Wait before the first load so fast responses don't flash a spinner.
    pub initial_delay: Duration,
    /// Random topics sampled per page in mixed mode. Every page draws fresh
    /// topics and reads each from its first result; repeats across pages are
    /// dropped through the seen-id set.
    pub mixed_topics: usize,
    /// Posts requested per call in mixed mode.
    pub mixed_batch: u32,
    /// Posts requested per source for a query or field filter.
    pub query_batch: u32,
    /// Most posts kept from one operation.
    pub max_posts: usize,
    /// A page must keep at least this many posts to offer another page.
    pub has_more_threshold: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(300),
            mixed_topics: 3,
            mixed_batch: 4,
            query_batch: 6,
            max_posts: 12,
            has_more_threshold: 8,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum FeedError {
    #[error("all sources failed: {}", .0.join("; "))]
    AllSourcesFailed(Vec<String>),
}

/// Everything a view needs to render the feed.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    pub posts: Vec<FeedPost>,
    pub loading: bool,
    pub error: Option<String>,
    pub has_more: bool,
    pub current_page: u32,
    pub current_query: String,
    pub queue_length: usize,
}

struct FeedState {
    posts: Vec<FeedPost>,
    seen_ids: HashSet<String>,
    current_page: u32,
    current_query: String,
    has_more: bool,
    error: Option<String>,
    rng: StdRng,
}

/// What a single operation asks of the providers.
#[derive(Debug, Clone)]
enum Request {
    Search { query: String, offset: u32 },
    Field { field: String },
}

struct SourceCall {
    source: Arc<dyn FeedSource>,
    request: Request,
    limit: u32,
}

impl SourceCall {
    fn offset(&self) -> u32 {
        match self.request {
            Request::Search { offset, .. } => offset,
            Request::Field { .. } => 0,
        }
    }

    async fn run(self) -> Result<SourcePage, crate::apis::SourceError> {
        match &self.request {
            Request::Search { query, offset } => self.source.search(query, self.limit, *offset).await,
            Request::Field { field } => self.source.by_field(field, self.limit).await,
        }
    }
}

struct Plan {
    calls: Vec<SourceCall>,
    page: u32,
    query: String,
    append: bool,
}

/// Posts gathered from one round of provider calls.
struct Harvest {
    posts: Vec<FeedPost>,
    more_available: bool,
}

/// Holds the in-flight flag for one operation. Dropping it before
/// [`InFlight::finish`] (the caller abandoned the operation) clears the flag
/// and tells subscribers loading stopped.
struct InFlight<'a> {
    agg: &'a FeedAggregator,
    armed: bool,
}

impl InFlight<'_> {
    /// Clear the flag on normal completion. Call with the state lock held.
    fn finish(mut self) {
        self.armed = false;
        self.agg.in_flight.store(false, Ordering::SeqCst);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!("feed operation abandoned before completing");
            self.agg.in_flight.store(false, Ordering::SeqCst);
            self.agg.updates.send_modify(|snap| snap.loading = false);
        }
    }
}

/// Stateful controller behind the feed view.
///
/// Every provider call goes through the shared [`RateLimiter`], one after
/// another. Operations started while another is in flight are ignored and
/// return `Ok(false)`.
pub struct FeedAggregator {
    primary: Arc<dyn FeedSource>,
    secondary: Arc<dyn FeedSource>,
    limiter: Arc<RateLimiter>,
    settings: FeedSettings,
    state: Mutex<FeedState>,
    in_flight: AtomicBool,
    updates: watch::Sender<FeedSnapshot>,
}

impl FeedAggregator {
    pub fn new(
        primary: Arc<dyn FeedSource>,
        secondary: Arc<dyn FeedSource>,
        limiter: Arc<RateLimiter>,
        settings: FeedSettings,
    ) -> Self {
        let (updates, _) = watch::channel(FeedSnapshot::default());
        Self {
            primary,
            secondary,
            limiter,
            settings,
            state: Mutex::new(FeedState {
                posts: Vec::new(),
                seen_ids: HashSet::new(),
                current_page: 1,
                current_query: String::new(),
                has_more: false,
                error: None,
                rng: StdRng::from_entropy(),
            }),
            in_flight: AtomicBool::new(false),
            updates,
        }
    }

    /// Make topic picks and shuffles reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.state.get_mut().rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn settings(&self) -> &FeedSettings {
        &self.settings
    }

    pub async fn snapshot(&self) -> FeedSnapshot {
        let state = self.state.lock().await;
        self.snapshot_of(&state)
    }

    /// Receive a fresh snapshot after every state change.
    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.updates.subscribe()
    }

    /// First load of a mixed-topic feed, after the debounce delay.
    pub async fn load_initial(&self) -> Result<bool, FeedError> {
        if !self.settings.initial_delay.is_zero() {
            tokio::time::sleep(self.settings.initial_delay).await;
        }
        self.run(|agg, state| Some(agg.reset_plan(state, String::new())))
            .await
    }

    /// Append the next page. Does nothing when there is no next page.
    pub async fn load_more(&self) -> Result<bool, FeedError> {
        self.run(|agg, state| {
            if !state.has_more {
                return None;
            }
            let page = state.current_page + 1;
            let query = state.current_query.clone();
            let calls = agg.page_calls(state, &query, page);
            Some(Plan {
                calls,
                page,
                query,
                append: true,
            })
        })
        .await
    }

    /// Start over on the current query (or mixed topics if there is none).
    pub async fn refresh(&self) -> Result<bool, FeedError> {
        self.run(|agg, state| {
            let query = state.current_query.clone();
            Some(agg.reset_plan(state, query))
        })
        .await
    }

    /// Replace the feed with results for `query`. An empty query switches
    /// back to mixed topics.
    pub async fn search_by_query(&self, query: &str) -> Result<bool, FeedError> {
        let query = query.trim().to_string();
        self.run(move |agg, state| Some(agg.reset_plan(state, query)))
            .await
    }

    /// Replace the feed with results for a coarse field such as "physics".
    /// Later pages continue with the field's search phrase.
    pub async fn filter_by_field(&self, field: &str) -> Result<bool, FeedError> {
        let field = field.trim().to_string();
        self.run(move |agg, _| {
            let limit = agg.settings.query_batch;
            let calls = [&agg.primary, &agg.secondary]
                .into_iter()
                .map(|source| SourceCall {
                    source: Arc::clone(source),
                    request: Request::Field {
                        field: field.clone(),
                    },
                    limit,
                })
                .collect();
            Some(Plan {
                calls,
                page: 1,
                query: field_query(&field).to_string(),
                append: false,
            })
        })
        .await
    }

    fn reset_plan(&self, state: &mut FeedState, query: String) -> Plan {
        let calls = self.page_calls(state, &query, 1);
        Plan {
            calls,
            page: 1,
            query,
            append: false,
        }
    }

    /// Calls for one page: random topics split across both providers in
    /// mixed mode, otherwise one call per provider for the query.
    fn page_calls(&self, state: &mut FeedState, query: &str, page: u32) -> Vec<SourceCall> {
        let sources = [&self.primary, &self.secondary];
        if query.is_empty() {
            // Topics are redrawn each page, so each starts at its first result.
            let limit = self.settings.mixed_batch;
            let offset = 0;
            TOPIC_CATALOG
                .choose_multiple(&mut state.rng, self.settings.mixed_topics)
                .enumerate()
                .map(|(i, topic)| SourceCall {
                    source: Arc::clone(sources[i % 2]),
                    request: Request::Search {
                        query: topic.to_string(),
                        offset,
                    },
                    limit,
                })
                .collect()
        } else {
            let limit = self.settings.query_batch;
            let offset = (page - 1) * limit;
            sources
                .into_iter()
                .map(|source| SourceCall {
                    source: Arc::clone(source),
                    request: Request::Search {
                        query: query.to_string(),
                        offset,
                    },
                    limit,
                })
                .collect()
        }
    }

    async fn run<P>(&self, make_plan: P) -> Result<bool, FeedError>
    where
        P: FnOnce(&Self, &mut FeedState) -> Option<Plan>,
    {
        let (plan, in_flight) = {
            let mut state = self.state.lock().await;
            if self.in_flight.load(Ordering::SeqCst) {
                tracing::debug!("feed operation ignored: another is in flight");
                return Ok(false);
            }
            let Some(plan) = make_plan(self, &mut *state) else {
                return Ok(false);
            };
            self.in_flight.store(true, Ordering::SeqCst);
            let in_flight = InFlight { agg: self, armed: true };
            state.error = None;
            self.publish(&state);
            (plan, in_flight)
        };

        let (page, query, append) = (plan.page, plan.query, plan.append);
        let result = self.fetch(plan.calls).await;

        let mut state = self.state.lock().await;
        in_flight.finish();
        let harvest = match result {
            Ok(harvest) => harvest,
            Err(e) => {
                tracing::warn!(query = %query, page, "feed load failed: {}", e);
                state.error = Some(e.to_string());
                self.publish(&state);
                return Err(e);
            }
        };

        let empty = HashSet::new();
        let seen = if append { &state.seen_ids } else { &empty };
        let unique = dedupe(harvest.posts, seen);
        let mut kept = shuffle(&unique, &mut state.rng);
        kept.truncate(self.settings.max_posts);

        let has_more = kept.len() >= self.settings.has_more_threshold && harvest.more_available;
        tracing::info!(
            query = %query,
            page,
            kept = kept.len(),
            append,
            has_more,
            "feed page loaded"
        );

        if append {
            state.seen_ids.extend(kept.iter().map(|p| p.id.clone()));
            state.posts.extend(kept);
        } else {
            state.seen_ids = kept.iter().map(|p| p.id.clone()).collect();
            state.posts = kept;
        }
        state.current_page = page;
        state.current_query = query;
        state.has_more = has_more;
        self.publish(&state);
        Ok(true)
    }

    /// Issue the calls one at a time through the limiter. A failing call
    /// counts as zero posts; only a round where every call fails is an error.
    async fn fetch(&self, calls: Vec<SourceCall>) -> Result<Harvest, FeedError> {
        let mut harvest = Harvest {
            posts: Vec::new(),
            more_available: false,
        };
        let mut failures = Vec::new();
        let mut succeeded = 0usize;

        for call in calls {
            let kind = call.source.kind();
            let offset = call.offset() as u64;
            match self.limiter.schedule(move || call.run()).await {
                Ok(Ok(page)) => {
                    succeeded += 1;
                    if page.total > offset + page.posts.len() as u64 {
                        harvest.more_available = true;
                    }
                    harvest.posts.extend(page.posts);
                }
                Ok(Err(e)) => {
                    tracing::warn!(source = %kind, "source call failed: {}", e);
                    failures.push(format!("{}: {}", kind, e));
                }
                Err(e) => {
                    tracing::warn!(source = %kind, "source call not completed: {}", e);
                    failures.push(format!("{}: {}", kind, e));
                }
            }
        }

        if succeeded == 0 && !failures.is_empty() {
            return Err(FeedError::AllSourcesFailed(failures));
        }
        Ok(harvest)
    }

    fn snapshot_of(&self, state: &FeedState) -> FeedSnapshot {
        FeedSnapshot {
            posts: state.posts.clone(),
            loading: self.in_flight.load(Ordering::SeqCst),
            error: state.error.clone(),
            has_more: state.has_more,
            current_page: state.current_page,
            current_query: state.current_query.clone(),
            queue_length: self.limiter.queue_length(),
        }
    }

    fn publish(&self, state: &FeedState) {
        self.updates.send_replace(self.snapshot_of(state));
    }
}
