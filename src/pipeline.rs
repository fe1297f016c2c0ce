//! Per-request search pipeline: search the index, filter by rating, format.
//!
//! Every failure is folded into an [`Outcome`] so callers only ever have
//! replies to deliver.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SearchSettings;
use crate::error::SearchError;
use crate::filter::filter_by_rating;
use crate::format::{format_entry_with_ratings, ReplyEntry};
use crate::models::{ExternalRatings, MovieRecord};
use crate::omdb::RatingsApi;
use crate::yts::{clean_title, MovieIndex};

pub const INVALID_TITLE_TEXT: &str =
    "❌ Please enter a valid movie title.\nExample: /search Inception";
pub const SEARCH_FAILED_TEXT: &str = "❌ Search failed. Please try again later.";

const DEFAULT_DEADLINE: Duration = Duration::from_secs(15);

/// What a request was about, for reply wording.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Title(String),
    Featured(i32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Replies {
        query: Query,
        entries: Vec<ReplyEntry>,
    },
    InvalidTitle,
    SearchFailed,
    NoMatches {
        query: Query,
    },
}

impl Outcome {
    /// Chat messages for this outcome, in sending order.
    pub fn into_messages(self, settings: &SearchSettings) -> Vec<ReplyEntry> {
        match self {
            Outcome::InvalidTitle => vec![plain(INVALID_TITLE_TEXT.to_string())],
            Outcome::SearchFailed => vec![plain(SEARCH_FAILED_TEXT.to_string())],
            Outcome::NoMatches { query } => vec![plain(no_matches_text(&query, settings))],
            Outcome::Replies { query, entries } => {
                let mut messages = Vec::with_capacity(entries.len() + 1);
                messages.push(plain(header_text(&query, entries.len(), settings)));
                messages.extend(entries);
                messages
            }
        }
    }
}

fn plain(text: String) -> ReplyEntry {
    ReplyEntry {
        text,
        buttons: Vec::new(),
    }
}

fn header_text(query: &Query, count: usize, settings: &SearchSettings) -> String {
    let noun = if count == 1 { "movie" } else { "movies" };
    match query {
        Query::Title(title) => format!(
            "🎬 Found {count} {noun} rated ≥ {:.1} for <b>{}</b>:",
            settings.min_rating,
            crate::format::escape_html(title)
        ),
        Query::Featured(year) => format!(
            "🆕 <b>Featured {year} movies</b> rated ≥ {:.1} ({count} {noun}):",
            settings.min_rating
        ),
    }
}

fn no_matches_text(query: &Query, settings: &SearchSettings) -> String {
    match query {
        Query::Title(title) => format!(
            "❌ No qualifying movies found for <b>{}</b> (rating ≥ {:.1}).\n\nTry checking the spelling or using a different title.",
            crate::format::escape_html(title),
            settings.min_rating
        ),
        Query::Featured(year) => format!(
            "🆕 No qualifying movies found among the featured {year} releases (rating ≥ {:.1}).",
            settings.min_rating
        ),
    }
}

/// Stateless across requests; share it behind an `Arc`.
pub struct Pipeline {
    index: Arc<dyn MovieIndex>,
    ratings: Option<Arc<dyn RatingsApi>>,
    settings: SearchSettings,
    deadline: Duration,
}

impl Pipeline {
    pub fn new(index: Arc<dyn MovieIndex>, settings: SearchSettings) -> Self {
        Self {
            index,
            ratings: None,
            settings,
            deadline: DEFAULT_DEADLINE,
        }
    }

    pub fn with_ratings(mut self, ratings: Arc<dyn RatingsApi>) -> Self {
        self.ratings = Some(ratings);
        self
    }

    /// Upper bound on one request: the index call plus ratings enrichment,
    /// on top of the HTTP clients' own timeouts.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Title search: Searching, then Filtering, then Formatting.
    pub async fn run(&self, title: &str) -> Outcome {
        let title = match clean_title(title) {
            Ok(t) => t.to_string(),
            Err(_) => return Outcome::InvalidTitle,
        };
        debug!(stage = "searching", %title);
        let started = Instant::now();
        let result = self.bounded(self.index.search(&title)).await;
        self.finish(Query::Title(title), result, started).await
    }

    /// Featured releases of `year`.
    pub async fn featured(&self, year: i32) -> Outcome {
        debug!(stage = "searching", year, "featured");
        let started = Instant::now();
        let result = self
            .bounded(self.index.featured(year, self.settings.min_rating))
            .await;
        self.finish(Query::Featured(year), result, started).await
    }

    async fn bounded<F>(&self, call: F) -> Result<Vec<MovieRecord>, SearchError>
    where
        F: std::future::Future<Output = Result<Vec<MovieRecord>, SearchError>>,
    {
        match tokio::time::timeout(self.deadline, call).await {
            Ok(result) => result,
            Err(_) => Err(SearchError::UpstreamUnavailable(format!(
                "no answer within {:?}",
                self.deadline
            ))),
        }
    }

    async fn finish(
        &self,
        query: Query,
        result: Result<Vec<MovieRecord>, SearchError>,
        started: Instant,
    ) -> Outcome {
        let records = match result {
            Ok(records) => records,
            Err(SearchError::InvalidInput(reason)) => {
                debug!("Rejected query {:?}: {}", query, reason);
                return Outcome::InvalidTitle;
            }
            Err(err) => {
                warn!("Search for {:?} failed: {}", query, err);
                return Outcome::SearchFailed;
            }
        };

        debug!(stage = "filtering", found = records.len());
        let filtered = match filter_by_rating(
            records,
            self.settings.min_rating,
            self.settings.max_results,
        ) {
            Ok(f) => f,
            Err(err) => {
                warn!("Filtering for {:?} failed: {}", query, err);
                return Outcome::SearchFailed;
            }
        };
        if filtered.is_empty() {
            info!("No qualifying movies for {:?}", query);
            return Outcome::NoMatches { query };
        }

        debug!(stage = "formatting", kept = filtered.len());
        let budget = self.deadline.saturating_sub(started.elapsed());
        let ratings = self.external_ratings(&filtered, budget).await;
        let entries: Vec<ReplyEntry> = filtered
            .iter()
            .zip(&ratings)
            .map(|(record, r)| format_entry_with_ratings(record, r.as_ref(), self.settings.mode))
            .collect();
        info!("Replying with {} movies for {:?}", entries.len(), query);
        Outcome::Replies { query, entries }
    }

    /// Ratings for each record, looked up concurrently. Lookups that fail or
    /// are still running when `budget` runs out leave `None`.
    async fn external_ratings(
        &self,
        records: &[MovieRecord],
        budget: Duration,
    ) -> Vec<Option<ExternalRatings>> {
        let mut found = vec![None; records.len()];
        let Some(api) = &self.ratings else {
            return found;
        };

        let mut lookups = JoinSet::new();
        for (i, record) in records.iter().enumerate() {
            let Some(imdb) = record.imdb_code.clone() else {
                continue;
            };
            let api = Arc::clone(api);
            lookups.spawn(async move {
                let result = api.ratings(&imdb).await;
                (i, imdb, result)
            });
        }

        let collect = async {
            while let Some(joined) = lookups.join_next().await {
                match joined {
                    Ok((i, _, Ok(r))) => found[i] = r,
                    Ok((_, imdb, Err(e))) => warn!("Ratings lookup failed for {}: {:#}", imdb, e),
                    Err(e) => warn!("Ratings lookup task failed: {}", e),
                }
            }
        };
        if tokio::time::timeout(budget, collect).await.is_err() {
            warn!("Ratings lookups cut off after {:?}", budget);
        }
        found
    }
}
