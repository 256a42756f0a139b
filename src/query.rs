use serde::Deserialize;

use crate::categories::{self, DEFAULT_CATEGORY};
use crate::listing::{clamp_page_size, ListingOptions, SortOrder, DEFAULT_PAGE_SIZE};

/// Raw query string of the news page and the export routes.
///
/// Every field is kept as text so a stale or hand-edited link falls back to
/// defaults instead of failing the whole request.
#[derive(Debug, Default, Deserialize)]
pub struct NewsQuery {
    pub category: Option<String>,
    pub subs: Option<String>,
    pub subs_for: Option<String>,
    pub hn: Option<String>,
    pub reddit: Option<String>,
    pub submitted: Option<String>,
    pub q: Option<String>,
    pub include: Option<String>,
    pub exclude: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub auto_refresh: Option<String>,
}

fn is_on(value: &str) -> bool {
    !matches!(value.trim(), "" | "0" | "false" | "off")
}

/// Before the settings form is submitted a missing checkbox means "on",
/// afterwards it means "off".
fn checkbox(value: Option<&str>, submitted: bool) -> bool {
    match value {
        Some(v) => is_on(v),
        None => !submitted,
    }
}

fn number(value: Option<&str>) -> Option<usize> {
    value.and_then(|v| v.trim().parse().ok())
}

fn split_subreddits(subs: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for sub in subs.split([',', ' ']).map(str::trim).filter(|s| !s.is_empty()) {
        let sub = sub.trim_start_matches("r/").to_lowercase();
        if !sub.is_empty() && !out.contains(&sub) {
            out.push(sub);
        }
    }
    out
}

/// Resolved page settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub category: String,
    pub subreddits: Vec<String>,
    pub enable_hn: bool,
    pub enable_reddit: bool,
    pub listing: ListingOptions,
    pub auto_refresh: bool,
}

impl Settings {
    pub fn from_query(query: &NewsQuery) -> Self {
        let category = query
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| categories::is_known(c))
            .unwrap_or(DEFAULT_CATEGORY)
            .to_string();

        let subreddits = match (&query.subs, &query.subs_for) {
            (Some(subs), Some(subs_for)) if *subs_for == category => split_subreddits(subs),
            _ => categories::default_subreddits(&category),
        };

        let submitted = query.submitted.as_deref().is_some_and(is_on);

        Self {
            subreddits,
            enable_hn: checkbox(query.hn.as_deref(), submitted),
            enable_reddit: checkbox(query.reddit.as_deref(), submitted),
            listing: ListingOptions {
                search: query.q.clone().unwrap_or_default(),
                include: query.include.clone().unwrap_or_default(),
                exclude: query.exclude.clone().unwrap_or_default(),
                sort: query
                    .sort
                    .as_deref()
                    .and_then(SortOrder::from_param)
                    .unwrap_or_default(),
                page: number(query.page.as_deref()).unwrap_or(1).max(1),
                page_size: clamp_page_size(
                    number(query.page_size.as_deref()).unwrap_or(DEFAULT_PAGE_SIZE),
                ),
            },
            auto_refresh: query.auto_refresh.as_deref().is_some_and(is_on),
            category,
        }
    }

    /// Encodes these settings for `page` as a query string, so links and
    /// redirects land on the same view.
    pub fn to_query_string(&self, page: usize) -> String {
        let mut pairs: Vec<(&str, String)> = vec![
            ("submitted", "1".into()),
            ("category", self.category.clone()),
            ("subs", self.subreddits.join(",")),
            ("subs_for", self.category.clone()),
        ];
        if self.enable_hn {
            pairs.push(("hn", "1".into()));
        }
        if self.enable_reddit {
            pairs.push(("reddit", "1".into()));
        }
        for (name, value) in [
            ("q", &self.listing.search),
            ("include", &self.listing.include),
            ("exclude", &self.listing.exclude),
        ] {
            if !value.is_empty() {
                pairs.push((name, value.clone()));
            }
        }
        pairs.push(("sort", self.listing.sort.as_str().into()));
        pairs.push(("page", page.to_string()));
        pairs.push(("page_size", self.listing.page_size.to_string()));
        if self.auto_refresh {
            pairs.push(("auto_refresh", "1".into()));
        }

        pairs
            .iter()
            .map(|(name, value)| format!("{name}={}", urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&")
    }
}
