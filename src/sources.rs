use futures::future::{BoxFuture, FutureExt};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use scraper::Html;
use serde_json::Value;
use std::time::Duration;

use crate::custom_date::{from_unix_seconds, parse_iso_date};
use crate::error::FetchError;
use crate::news::{FeedFetcher, FeedKey, NewsItem};

pub const HN_URL: &str = "https://hn.algolia.com/api/v1/search?tags=front_page";
pub const HN_SOURCE: &str = "Hacker News";
const HN_ITEM_URL: &str = "https://news.ycombinator.com/item?id=";
pub const REDDIT_URL: &str = "https://www.reddit.com";
const NO_TITLE: &str = "(no title)";

fn build_user_agent() -> HeaderMap {
    let user_agent = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(user_agent));
    headers
}

/// Reddit names are 1 to 21 ASCII letters, digits or underscores.
pub fn is_valid_subreddit(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 21
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn reddit_url(base: &str, sub: &str, limit: u16) -> String {
    format!("{base}/r/{sub}/hot.json?limit={limit}")
}

/// Fetches live listings from the Hacker News search API and Reddit.
pub struct HttpFetcher {
    client: reqwest::Client,
    reddit_limit: u16,
    hn_url: String,
    reddit_base: String,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, reddit_limit: u16) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .default_headers(build_user_agent())
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            reddit_limit,
            hn_url: HN_URL.to_string(),
            reddit_base: REDDIT_URL.to_string(),
        })
    }

    /// Points the fetcher at other hosts, e.g. a mirror or a local server.
    pub fn with_base_urls(mut self, hn_url: &str, reddit_base: &str) -> Self {
        self.hn_url = hn_url.to_string();
        self.reddit_base = reddit_base.trim_end_matches('/').to_string();
        self
    }

    async fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn fetch_hn(&self) -> Result<Vec<NewsItem>, FetchError> {
        let json = self.fetch_json(&self.hn_url).await?;
        Ok(parse_hn(&json))
    }

    pub async fn fetch_reddit(&self, sub: &str) -> Result<Vec<NewsItem>, FetchError> {
        if !is_valid_subreddit(sub) {
            return Err(FetchError::InvalidSubreddit(sub.to_string()));
        }

        let url = reddit_url(&self.reddit_base, sub, self.reddit_limit);
        let json = self.fetch_json(&url).await?;
        Ok(parse_reddit(sub, &json))
    }
}

impl FeedFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, key: &'a FeedKey) -> BoxFuture<'a, Result<Vec<NewsItem>, FetchError>> {
        async move {
            match key {
                FeedKey::HackerNews => self.fetch_hn().await,
                FeedKey::Subreddit(sub) => self.fetch_reddit(sub).await,
            }
        }
        .boxed()
    }
}

fn non_empty_str<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value[field].as_str().filter(|s| !s.is_empty())
}

fn int_field(value: &Value, field: &str) -> i64 {
    match &value[field] {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

pub fn parse_hn(json: &Value) -> Vec<NewsItem> {
    let Some(hits) = json["hits"].as_array() else {
        return Vec::new();
    };

    hits.iter()
        .map(|hit| {
            let url = match non_empty_str(hit, "url") {
                Some(url) => url.to_string(),
                None => {
                    let id = match &hit["objectID"] {
                        Value::String(s) => s.clone(),
                        Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    format!("{HN_ITEM_URL}{id}")
                }
            };

            NewsItem {
                title: non_empty_str(hit, "title").unwrap_or(NO_TITLE).to_string(),
                url,
                source: HN_SOURCE.to_string(),
                points: int_field(hit, "points"),
                comments: int_field(hit, "num_comments"),
                author: non_empty_str(hit, "author").map(str::to_string),
                published_at: hit["created_at"].as_str().and_then(parse_iso_date),
            }
        })
        .collect()
}

/// Reddit escapes `&`, `<` and `>` in titles.
fn decode_entities(text: &str) -> String {
    let fragment = Html::parse_fragment(text);
    fragment.root_element().text().collect::<String>()
}

pub fn parse_reddit(sub: &str, json: &Value) -> Vec<NewsItem> {
    let Some(children) = json["data"]["children"].as_array() else {
        return Vec::new();
    };

    children
        .iter()
        .map(|child| {
            let post = &child["data"];

            let url = non_empty_str(post, "url_overridden_by_dest")
                .or_else(|| non_empty_str(post, "url"))
                .map(str::to_string)
                .unwrap_or_else(|| {
                    let permalink = post["permalink"].as_str().unwrap_or_default();
                    format!("https://reddit.com{permalink}")
                });

            let points = match int_field(post, "ups") {
                0 => int_field(post, "score"),
                ups => ups,
            };

            NewsItem {
                title: non_empty_str(post, "title")
                    .map(decode_entities)
                    .unwrap_or_else(|| NO_TITLE.to_string()),
                url,
                source: format!("r/{sub}"),
                points,
                comments: int_field(post, "num_comments"),
                author: non_empty_str(post, "author").map(str::to_string),
                published_at: post["created_utc"].as_f64().and_then(from_unix_seconds),
            }
        })
        .collect()
}
