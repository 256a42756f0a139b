use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::cache::{Clock, TtlCache};
use crate::error::FetchError;

/// Identity of one upstream feed, used as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeedKey {
    HackerNews,
    Subreddit(String),
}

impl FeedKey {
    pub fn subreddit(name: &str) -> Self {
        FeedKey::Subreddit(name.trim().to_lowercase())
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedKey::HackerNews => write!(f, "HN"),
            FeedKey::Subreddit(sub) => write!(f, "r/{sub}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsItem {
    pub title: String,
    pub url: String,
    pub source: String,
    pub points: i64,
    pub comments: i64,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// A fetched item placed in a category and scored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Article {
    #[serde(flatten)]
    pub item: NewsItem,
    pub category: String,
    pub score: f64,
}

impl Article {
    /// Key under which the article is saved as a favorite.
    pub fn favorite_key(&self) -> &str {
        if self.item.url.is_empty() {
            &self.item.title
        } else {
            &self.item.url
        }
    }
}

/// Performs the live retrieval for a feed.
pub trait FeedFetcher: Send + Sync {
    fn fetch<'a>(&'a self, key: &'a FeedKey) -> BoxFuture<'a, Result<Vec<NewsItem>, FetchError>>;
}

/// Log-scaled points so that giant threads do not dominate.
pub fn normalize_points(points: i64) -> f64 {
    if points == 0 {
        return 0.0;
    }
    (points.max(1) as f64).log10() * 100.0
}

/// Recency bonus with a one-day decay constant.
pub fn time_decay_score(published_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(published_at) = published_at else {
        return 0.0;
    };
    let age_hours = (now - published_at).num_milliseconds() as f64 / 3_600_000.0;
    100.0 * (-age_hours / 24.0).exp()
}

#[derive(Debug, Default, Clone)]
pub struct Aggregation {
    pub articles: Vec<Article>,
    pub errors: Vec<String>,
}

pub struct Aggregator {
    cache: TtlCache<FeedKey, Vec<NewsItem>>,
    fetcher: Arc<dyn FeedFetcher>,
    clock: Arc<dyn Clock>,
}

impl Aggregator {
    pub fn new(fetcher: Arc<dyn FeedFetcher>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            cache: TtlCache::new(ttl, clock.clone()),
            fetcher,
            clock,
        }
    }

    pub fn cache(&self) -> &TtlCache<FeedKey, Vec<NewsItem>> {
        &self.cache
    }

    /// Resolves one feed through the cache.
    pub async fn feed(&self, key: FeedKey) -> Result<Vec<NewsItem>, FetchError> {
        let fetcher = &self.fetcher;
        let lookup = key.clone();
        self.cache
            .get_or_fetch(key, move || async move { fetcher.fetch(&lookup).await })
            .await
    }

    /// Collects the enabled feeds, one after another, into scored articles.
    /// A failing feed contributes a message instead of items.
    pub async fn aggregate(
        &self,
        category: &str,
        enable_hn: bool,
        enable_reddit: bool,
        subreddits: &[String],
    ) -> Aggregation {
        let mut keys = Vec::new();
        if enable_reddit {
            keys.extend(subreddits.iter().map(|s| FeedKey::subreddit(s)));
        }
        if enable_hn {
            keys.push(FeedKey::HackerNews);
        }

        let mut items = Vec::new();
        let mut errors = Vec::new();
        for key in keys {
            let label = key.to_string();
            match self.feed(key).await {
                Ok(feed) => items.extend(feed),
                Err(err) => errors.push(format!("{label} fetch failed: {err}")),
            }
        }

        let now = self.clock.now();
        let scored = items.into_iter().map(|item| Article {
            score: normalize_points(item.points) + time_decay_score(item.published_at, now),
            category: category.to_string(),
            item,
        });

        Aggregation {
            articles: dedupe(scored),
            errors,
        }
    }
}

/// Keeps the first article for every `(url, title prefix)` pair.
fn dedupe(articles: impl IntoIterator<Item = Article>) -> Vec<Article> {
    let mut seen = HashSet::new();
    articles
        .into_iter()
        .filter(|a| {
            let title: String = a.item.title.chars().take(80).collect();
            seen.insert((a.item.url.clone(), title))
        })
        .collect()
}
