use chrono_tz::Tz;
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use std::collections::HashSet;

use crate::categories;
use crate::custom_date::format_local;
use crate::listing::{Page, SortOrder, MAX_PAGE_SIZE, MIN_PAGE_SIZE};
use crate::news::Article;
use crate::query::Settings;

pub const AUTO_REFRESH_SECS: u32 = 60;

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; margin: 0; display: flex; color: #222; }
aside { width: 280px; padding: 1rem; background: #f4f4f6; min-height: 100vh; box-sizing: border-box; }
aside label { display: block; margin: .6rem 0 .2rem; font-size: .9rem; }
aside input[type=text], aside select { width: 100%; box-sizing: border-box; }
main { flex: 1; padding: 1rem 2rem; max-width: 960px; }
.card { display: flex; align-items: center; border-bottom: 1px solid #ddd; padding: .6rem 0; }
.card .body { flex: 1; }
.card .meta, .caption { color: #666; font-size: .85rem; }
.card .score { width: 110px; text-align: right; padding-right: 1rem; }
.errors { background: #fff4e5; padding: .4rem 1rem; margin-bottom: 1rem; }
.downloads a { margin-right: 1rem; }
"#;

/// Everything the news page shows.
pub struct PageView<'a> {
    pub settings: &'a Settings,
    pub page: &'a Page,
    pub errors: &'a [String],
    pub favorites: &'a [Article],
    pub favorite_keys: &'a HashSet<String>,
    pub tz: &'a Tz,
    pub cache_lifetime: u32,
}

pub fn render_page(view: &PageView<'_>) -> String {
    let settings = view.settings;
    let current = settings.to_query_string(view.page.page);

    let refresh = if settings.auto_refresh {
        format!(r#"<meta http-equiv="refresh" content="{AUTO_REFRESH_SECS}">"#)
    } else {
        String::new()
    };

    let cards: String = view
        .page
        .articles
        .iter()
        .map(|a| render_card(a, view.favorite_keys.contains(a.favorite_key()), view.tz, &current))
        .collect();

    let app_name = env!("CARGO_PKG_NAME");
    let app_version = env!("CARGO_PKG_VERSION");
    let minutes = view.cache_lifetime / 60;
    let lifetime = if view.cache_lifetime % 60 == 0 {
        format!("{minutes} minutes")
    } else {
        format!("{} seconds", view.cache_lifetime)
    };
    let favorites_disabled = if view.favorites.is_empty() {
        r#" aria-disabled="true""#
    } else {
        ""
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Trending News</title>
    {refresh}
    <style>{STYLE}</style>
</head>
<body>
{sidebar}
<main>
    <h1>📰 Trending News</h1>
    <p class="caption">{caption}</p>
    <p class="downloads">
        <a href="/export/page.csv?{current_attr}">⬇️ Download CSV (page)</a>
        <a href="/export/page.json?{current_attr}">⬇️ Download JSON (page)</a>
        <a href="/export/favorites.csv"{favorites_disabled}>⭐ Export Favorites (CSV)</a>
    </p>
    {errors}
    <hr>
    {cards}
    {pager}
    {favorites}
    <p class="caption">Sources: Hacker News (Algolia API) and Reddit hot posts. Data cached {lifetime}. {app_name} v{app_version}</p>
</main>
</body>
</html>"#,
        refresh = refresh,
        sidebar = render_sidebar(settings),
        caption = text(&view.page.caption()),
        current_attr = attr(&current),
        favorites_disabled = favorites_disabled,
        errors = render_errors(view.errors),
        cards = cards,
        pager = render_pager(settings, view.page),
        favorites = render_favorites(view.favorites, view.tz),
        lifetime = lifetime,
        app_name = app_name,
        app_version = app_version,
    )
}

fn checked(on: bool) -> &'static str {
    if on {
        " checked"
    } else {
        ""
    }
}

fn render_sidebar(settings: &Settings) -> String {
    let category_options: String = categories::names()
        .map(|name| {
            let selected = if name == settings.category { " selected" } else { "" };
            format!(r#"<option value="{name}"{selected}>{name}</option>"#)
        })
        .collect();

    let sort_options: String = SortOrder::ALL
        .iter()
        .map(|order| {
            let selected = if *order == settings.listing.sort { " selected" } else { "" };
            format!(
                r#"<option value="{}"{selected}>{}</option>"#,
                order.as_str(),
                order.label()
            )
        })
        .collect();

    let listing = &settings.listing;

    format!(
        r#"<aside>
    <h2>Settings</h2>
    <form method="get" action="/">
        <input type="hidden" name="submitted" value="1">
        <input type="hidden" name="subs_for" value="{category}">
        <label>Category</label>
        <select name="category">{category_options}</select>
        <label>Subreddits for this category</label>
        <input type="text" name="subs" value="{subs}">
        <label><input type="checkbox" name="hn" value="1"{hn}> Hacker News</label>
        <label><input type="checkbox" name="reddit" value="1"{reddit}> Reddit</label>
        <h3>Filters</h3>
        <label>Search in title</label>
        <input type="text" name="q" value="{search}">
        <label>Include keywords (comma-sep)</label>
        <input type="text" name="include" value="{include}">
        <label>Exclude keywords (comma-sep)</label>
        <input type="text" name="exclude" value="{exclude}">
        <h3>Sorting &amp; Pagination</h3>
        <label>Sort by</label>
        <select name="sort">{sort_options}</select>
        <label>Page size</label>
        <input type="number" name="page_size" min="{min_size}" max="{max_size}" value="{page_size}">
        <label>Page #</label>
        <input type="number" name="page" min="1" value="{page}">
        <label><input type="checkbox" name="auto_refresh" value="1"{auto_refresh}> Auto refresh every {refresh_secs}s</label>
        <p><button type="submit">Apply</button></p>
    </form>
</aside>"#,
        category = attr(&settings.category),
        category_options = category_options,
        subs = attr(&settings.subreddits.join(", ")),
        hn = checked(settings.enable_hn),
        reddit = checked(settings.enable_reddit),
        search = attr(&listing.search),
        include = attr(&listing.include),
        exclude = attr(&listing.exclude),
        sort_options = sort_options,
        min_size = MIN_PAGE_SIZE,
        max_size = MAX_PAGE_SIZE,
        page_size = listing.page_size,
        page = listing.page,
        auto_refresh = checked(settings.auto_refresh),
        refresh_secs = AUTO_REFRESH_SECS,
    )
}

fn render_errors(errors: &[String]) -> String {
    if errors.is_empty() {
        return String::new();
    }

    let items: String = errors
        .iter()
        .map(|e| format!("<li>{}</li>", text(e)))
        .collect();

    format!(
        r#"<details class="errors">
        <summary>⚠️ Some sources had issues (click to expand)</summary>
        <ul>{items}</ul>
    </details>"#
    )
}

fn hidden(name: &str, value: &str) -> String {
    format!(r#"<input type="hidden" name="{name}" value="{}">"#, attr(value))
}

fn render_card(article: &Article, is_favorite: bool, tz: &Tz, return_to: &str) -> String {
    let item = &article.item;
    let label = if is_favorite { "★ Unsave" } else { "☆ Save" };
    let published_at = item
        .published_at
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default();

    let fields = [
        hidden("title", &item.title),
        hidden("url", &item.url),
        hidden("source", &item.source),
        hidden("category", &article.category),
        hidden("points", &item.points.to_string()),
        hidden("comments", &item.comments.to_string()),
        hidden("author", item.author.as_deref().unwrap_or_default()),
        hidden("published_at", &published_at),
        hidden("score", &article.score.to_string()),
        hidden("return_to", return_to),
    ]
    .concat();

    format!(
        r#"<div class="card">
        <div class="body">
            <strong><a href="{url}">{title}</a></strong>
            <div class="meta">{source} • {category} • {time}</div>
        </div>
        <div class="score" title="points={points}, comments={comments}">Score<br><strong>{score:.1}</strong></div>
        <form method="post" action="/favorites">{fields}<button type="submit">{label}</button></form>
    </div>
    "#,
        url = attr(&item.url),
        title = text(&item.title),
        source = text(&item.source),
        category = text(&article.category),
        time = format_local(item.published_at, tz),
        points = item.points,
        comments = item.comments,
        score = article.score,
        fields = fields,
        label = label,
    )
}

fn render_pager(settings: &Settings, page: &Page) -> String {
    let mut links = Vec::new();
    if page.page > 1 {
        links.push(format!(
            r#"<a href="/?{}">← Previous</a>"#,
            attr(&settings.to_query_string(page.page - 1))
        ));
    }
    if page.page < page.page_count() {
        links.push(format!(
            r#"<a href="/?{}">Next →</a>"#,
            attr(&settings.to_query_string(page.page + 1))
        ));
    }

    format!(
        r#"<p class="caption">Page {} of {} {}</p>"#,
        page.page,
        page.page_count(),
        links.join(" ")
    )
}

fn render_favorites(favorites: &[Article], tz: &Tz) -> String {
    let body = if favorites.is_empty() {
        "<p>No favorites yet. Click <strong>☆ Save</strong> on any card.</p>".to_string()
    } else {
        let items: String = favorites
            .iter()
            .map(|a| {
                format!(
                    r#"<li><strong><a href="{}">{}</a></strong> — {} • {}</li>"#,
                    attr(&a.item.url),
                    text(&a.item.title),
                    text(&a.item.source),
                    format_local(a.item.published_at, tz)
                )
            })
            .collect();
        format!("<ul>{items}</ul>")
    };

    format!(
        r#"<details>
        <summary>⭐ Favorites ({count})</summary>
        {body}
    </details>"#,
        count = favorites.len(),
    )
}
