use chrono::{DateTime, Utc};

use crate::news::Article;

pub const MIN_PAGE_SIZE: usize = 5;
pub const MAX_PAGE_SIZE: usize = 50;
pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Score,
    Points,
    Newest,
}

impl SortOrder {
    pub const ALL: [SortOrder; 3] = [SortOrder::Score, SortOrder::Points, SortOrder::Newest];

    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Score => "score",
            SortOrder::Points => "points",
            SortOrder::Newest => "newest",
        }
    }

    /// Case-insensitive lookup of a `sort` query value.
    pub fn from_param(value: &str) -> Option<SortOrder> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|order| order.as_str().eq_ignore_ascii_case(value))
    }

    pub fn label(self) -> &'static str {
        match self {
            SortOrder::Score => "Score (default)",
            SortOrder::Points => "Points",
            SortOrder::Newest => "Newest",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListingOptions {
    pub search: String,
    pub include: String,
    pub exclude: String,
    pub sort: SortOrder,
    pub page: usize,
    pub page_size: usize,
}

impl Default for ListingOptions {
    fn default() -> Self {
        Self {
            search: String::new(),
            include: String::new(),
            exclude: String::new(),
            sort: SortOrder::Score,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// One page of the filtered, sorted listing. `first` and `last` are the
/// 1-based positions shown, both zero when the page is empty.
#[derive(Debug, Clone)]
pub struct Page {
    pub articles: Vec<Article>,
    pub total: usize,
    pub first: usize,
    pub last: usize,
    pub page: usize,
    pub page_size: usize,
}

impl Page {
    pub fn caption(&self) -> String {
        format!(
            "{} articles • showing {}-{}",
            self.total, self.first, self.last
        )
    }

    pub fn page_count(&self) -> usize {
        self.total.div_ceil(self.page_size).max(1)
    }
}

pub fn clamp_page_size(page_size: usize) -> usize {
    page_size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
}

/// Splits a comma-separated keyword list, lowercased, blanks dropped.
pub fn keyword_list(keywords_csv: &str) -> Vec<String> {
    keywords_csv
        .split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

pub fn matches_keywords(text: &str, keywords_csv: &str, must_include: bool) -> bool {
    let keywords = keyword_list(keywords_csv);
    if keywords.is_empty() {
        return true;
    }

    let text = text.to_lowercase();
    let any = keywords.iter().any(|k| text.contains(k.as_str()));
    if must_include {
        any
    } else {
        !any
    }
}

fn sort_articles(articles: &mut [Article], order: SortOrder) {
    match order {
        SortOrder::Points => articles.sort_by(|a, b| b.item.points.cmp(&a.item.points)),
        SortOrder::Newest => articles.sort_by_key(|a| {
            std::cmp::Reverse(a.item.published_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH))
        }),
        SortOrder::Score => articles.sort_by(|a, b| b.score.total_cmp(&a.score)),
    }
}

/// Filters by title, sorts and cuts out the requested page.
pub fn apply(articles: Vec<Article>, options: &ListingOptions) -> Page {
    let search = options.search.trim().to_lowercase();

    let mut matching: Vec<Article> = articles
        .into_iter()
        .filter(|a| search.is_empty() || a.item.title.to_lowercase().contains(&search))
        .filter(|a| matches_keywords(&a.item.title, &options.include, true))
        .filter(|a| matches_keywords(&a.item.title, &options.exclude, false))
        .collect();

    sort_articles(&mut matching, options.sort);

    let page = options.page.max(1);
    let page_size = clamp_page_size(options.page_size);
    let total = matching.len();
    let start = (page - 1).saturating_mul(page_size).min(total);
    let end = start.saturating_add(page_size).min(total);

    let articles: Vec<Article> = matching.drain(start..end).collect();
    let (first, last) = if articles.is_empty() {
        (0, 0)
    } else {
        (start + 1, end)
    };

    Page {
        articles,
        total,
        first,
        last,
        page,
        page_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::news::NewsItem;
    use chrono::TimeZone;

    fn article(title: &str, points: i64, score: f64, hour: Option<u32>) -> Article {
        Article {
            item: NewsItem {
                title: title.into(),
                url: format!("https://{}.test", title.replace(' ', "-")),
                source: "r/test".into(),
                points,
                comments: 0,
                author: None,
                published_at: hour.map(|h| Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap()),
            },
            category: "general".into(),
            score,
        }
    }

    fn sample() -> Vec<Article> {
        vec![
            article("Rust compiler release", 50, 180.0, Some(8)),
            article("Election results", 900, 320.0, Some(6)),
            article("New GPU benchmarks", 300, 250.0, None),
            article("Rust in the kernel", 10, 90.0, Some(11)),
        ]
    }

    fn titles(page: &Page) -> Vec<&str> {
        page.articles.iter().map(|a| a.item.title.as_str()).collect()
    }

    #[test]
    fn default_sort_is_by_score() {
        let page = apply(sample(), &ListingOptions::default());
        assert_eq!(
            titles(&page),
            [
                "Election results",
                "New GPU benchmarks",
                "Rust compiler release",
                "Rust in the kernel"
            ]
        );
        assert_eq!(page.caption(), "4 articles • showing 1-4");
    }

    #[test]
    fn sort_by_points_and_newest() {
        let options = ListingOptions {
            sort: SortOrder::Points,
            ..Default::default()
        };
        assert_eq!(titles(&apply(sample(), &options))[0], "Election results");

        let options = ListingOptions {
            sort: SortOrder::Newest,
            ..Default::default()
        };
        assert_eq!(
            titles(&apply(sample(), &options)),
            [
                "Rust in the kernel",
                "Rust compiler release",
                "Election results",
                "New GPU benchmarks"
            ]
        );
    }

    #[test]
    fn search_is_case_insensitive() {
        let options = ListingOptions {
            search: "RUST".into(),
            ..Default::default()
        };
        let page = apply(sample(), &options);
        assert_eq!(page.total, 2);
    }

    #[test]
    fn include_and_exclude_keywords() {
        let options = ListingOptions {
            include: "rust, gpu".into(),
            exclude: "kernel".into(),
            ..Default::default()
        };
        let page = apply(sample(), &options);
        assert_eq!(titles(&page), ["New GPU benchmarks", "Rust compiler release"]);
    }

    #[test]
    fn blank_keyword_lists_match_everything() {
        assert!(matches_keywords("anything", "", true));
        assert!(matches_keywords("anything", " , ,", true));
        assert!(matches_keywords("anything", " , ,", false));
        assert_eq!(keyword_list(" Rust ,, Go "), ["rust", "go"]);
    }

    #[test]
    fn pagination_windows() {
        let many: Vec<Article> = (0..23)
            .map(|i| article(&format!("story {i}"), i, f64::from(100 - i as i32), None))
            .collect();

        let options = ListingOptions {
            page: 3,
            page_size: 10,
            ..Default::default()
        };
        let page = apply(many.clone(), &options);
        assert_eq!(page.articles.len(), 3);
        assert_eq!((page.first, page.last), (21, 23));
        assert_eq!(page.page_count(), 3);

        let options = ListingOptions {
            page: 9,
            page_size: 10,
            ..Default::default()
        };
        let page = apply(many, &options);
        assert!(page.articles.is_empty());
        assert_eq!(page.caption(), "23 articles • showing 0-0");
    }

    #[test]
    fn page_size_is_clamped() {
        assert_eq!(clamp_page_size(1), MIN_PAGE_SIZE);
        assert_eq!(clamp_page_size(500), MAX_PAGE_SIZE);
        let options = ListingOptions {
            page: 0,
            page_size: 0,
            ..Default::default()
        };
        let page = apply(sample(), &options);
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, MIN_PAGE_SIZE);
        assert_eq!(page.articles.len(), 4);
    }
}
