pub mod apify;
pub mod cache;
pub mod mock;
pub mod records;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::consts::{DEFAULT_RESULTS_LIMIT, MAX_RESULTS_LIMIT, MIN_RESULTS_LIMIT};
use crate::store::{DocumentStore, Filter, filter_eq};

use cache::ScrapeCache;
use records::{PostEntry, ProfileRecord, build_posts, build_profile, profile_url};

/// A vendor-hosted scraping job: run it with structured input, wait for it
/// to finish, get its dataset items back.
#[async_trait]
pub trait Actor: Send + Sync {
    async fn call(&self, input: &Value) -> Result<Vec<Value>>;
}

/// Body of `POST /scrape-instagram`.
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeRequest {
    pub username: String,
    #[serde(default = "default_results_limit")]
    pub results_limit: i64,
}

fn default_results_limit() -> i64 {
    DEFAULT_RESULTS_LIMIT as i64
}

impl ScrapeRequest {
    /// Check bounds and normalize the username.
    /// Returns `(username, results_limit)` or a message for the caller.
    pub fn validate(&self) -> Result<(String, usize), String> {
        if self.results_limit < MIN_RESULTS_LIMIT as i64 {
            return Err(format!("results_limit must be at least {MIN_RESULTS_LIMIT}"));
        }
        if self.results_limit > MAX_RESULTS_LIMIT as i64 {
            return Err(format!("results_limit cannot exceed {MAX_RESULTS_LIMIT}"));
        }
        let username = normalize_username(&self.username)
            .ok_or_else(|| format!("invalid username: {:?}", self.username))?;
        Ok((username, self.results_limit as usize))
    }
}

/// Accepts `name`, `@name` or a profile URL and returns the bare handle.
pub fn normalize_username(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let handle = if raw.contains("instagram.com") || raw.contains("://") {
        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("https://{raw}")
        };
        let url = Url::parse(&with_scheme).ok()?;
        url.path_segments()?.find(|s| !s.is_empty())?.to_string()
    } else {
        raw.trim_start_matches('@').to_string()
    };

    let valid = !handle.is_empty()
        && handle
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_');
    valid.then_some(handle)
}

fn base_input(username: &str) -> Map<String, Value> {
    let value = json!({
        "directUrls": [profile_url(username)],
        "proxy": {
            "useApifyProxy": true,
            "apifyProxyGroups": ["RESIDENTIAL"],
        },
        "languageCode": "en",
    });
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Actor input for the profile details run.
pub fn profile_input(username: &str) -> Value {
    let mut input = base_input(username);
    input.insert("resultsType".into(), json!("details"));
    input.insert("searchType".into(), json!("user"));
    Value::Object(input)
}

/// Actor input for the newest-posts run.
pub fn posts_input(username: &str, limit: usize) -> Value {
    let mut input = base_input(username);
    let extra = json!({
        "resultsType": "posts",
        "maxItems": limit,
        "searchType": "user",
        "searchLimit": limit,
        "scrapeStories": false,
        "scrapeHighlights": false,
        "scrapeIgtv": false,
        "scrapeReels": true,
        "scrapePosts": true,
        "scrapeComments": false,
        "sort": "newest",
        "limit": limit,
    });
    if let Value::Object(extra) = extra {
        input.extend(extra);
    }
    Value::Object(input)
}

/// What a fresh scrape removes from the store before writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReplaceScope {
    /// The whole collection holds only the latest profile.
    #[default]
    Collection,
    /// Only documents for the scraped username.
    User,
}

/// Response of `POST /scrape-instagram`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeOutcome {
    pub success: bool,
    pub profile_data: Option<ProfileRecord>,
    pub posts_data: Vec<PostEntry>,
    pub total_posts: i64,
    pub error: Option<String>,
    pub db_status: bool,
    pub db_message: String,
}

/// Fetches a profile and its posts, stores them, and caches the result.
pub struct Scraper {
    actor: Arc<dyn Actor>,
    store: Arc<dyn DocumentStore>,
    cache: ScrapeCache,
    collection: String,
    scope: ReplaceScope,
    /// Serializes store replacement and cache update across requests.
    write_lock: tokio::sync::Mutex<()>,
}

impl Scraper {
    pub fn new(
        actor: Arc<dyn Actor>,
        store: Arc<dyn DocumentStore>,
        collection: &str,
        scope: ReplaceScope,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            actor,
            store,
            cache: ScrapeCache::new(cache_ttl),
            collection: collection.to_string(),
            scope,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn cache(&self) -> &ScrapeCache {
        &self.cache
    }

    pub async fn scrape(&self, username: &str, results_limit: usize) -> Result<ScrapeOutcome> {
        info!(username, results_limit, "scrape requested");

        if let Some(cached) = self.cache.get(username, results_limit)? {
            info!(username, "returning cached data");
            return Ok(cached);
        }

        let profile_in = profile_input(username);
        let posts_in = posts_input(username, results_limit);
        let (profile_items, post_items) = tokio::try_join!(
            self.actor.call(&profile_in),
            self.actor.call(&posts_in)
        )
        .context("Failed to process data")?;

        let profile = build_profile(&profile_items, username)
            .map_err(|e| anyhow!("Failed to process data: {}", e))?;
        let posts = build_posts(post_items, username, results_limit);

        let _guard = self.write_lock.lock().await;
        let (db_status, db_message) = self.persist(&profile, &posts).await;

        let outcome = ScrapeOutcome {
            success: true,
            total_posts: profile.total_posts,
            profile_data: Some(profile),
            posts_data: posts,
            error: None,
            db_status,
            db_message,
        };
        info!(username, posts = outcome.posts_data.len(), "scrape finished");

        // Whatever the store replacement removed must not be served from cache.
        match self.scope {
            ReplaceScope::Collection => self.cache.clear()?,
            ReplaceScope::User => self.cache.invalidate(username)?,
        }
        self.cache.put(username, results_limit, outcome.clone())?;

        Ok(outcome)
    }

    /// Replace the stored data and write one combined document.
    /// Failures are reported, never raised.
    async fn persist(&self, profile: &ProfileRecord, posts: &[PostEntry]) -> (bool, String) {
        match self.try_persist(profile, posts).await {
            Ok(()) => {
                info!(username = %profile.username, "stored scrape result");
                (true, "Data inserted successfully".to_string())
            }
            Err(e) => {
                error!(username = %profile.username, error = %format!("{e:#}"), "failed to store scrape result");
                (false, format!("Error inserting data: {e:#}"))
            }
        }
    }

    async fn try_persist(&self, profile: &ProfileRecord, posts: &[PostEntry]) -> Result<()> {
        let username = profile.username.as_str();
        let owned_by_user = ownership_filter(username);

        let existing = self.store.count(&self.collection, &owned_by_user).await?;
        info!(username, existing, "records before replacement");

        let replace = match self.scope {
            ReplaceScope::Collection => Filter::new(),
            ReplaceScope::User => owned_by_user.clone(),
        };
        let removed = self.store.delete_many(&self.collection, &replace).await?;
        if removed > 0 {
            info!(removed, scope = ?self.scope, "removed previous data");
        }

        let document = combined_document(profile, posts)?;
        self.store.insert_one(&self.collection, document).await?;

        let after = self.store.count(&self.collection, &owned_by_user).await?;
        if after != 1 {
            warn!(username, after, "unexpected record count after insertion");
        }
        Ok(())
    }
}

/// Matches every document that belongs to `username`.
pub fn ownership_filter(username: &str) -> Filter {
    let mut filter = Filter::new();
    filter.insert(
        "$or".into(),
        json!([
            filter_eq("username", username),
            filter_eq("profile_data.username", username),
        ]),
    );
    filter
}

/// `{username, profile_data, posts: {post_1: ..}, last_updated}`
pub fn combined_document(profile: &ProfileRecord, posts: &[PostEntry]) -> Result<Value> {
    let mut numbered = Map::new();
    for entry in posts {
        numbered.insert(
            entry.post_number.clone(),
            serde_json::to_value(&entry.post_data)?,
        );
    }
    Ok(json!({
        "username": profile.username,
        "profile_data": profile,
        "posts": numbered,
        "last_updated": Utc::now().to_rfc3339(),
    }))
}
