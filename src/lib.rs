use actix_web::{
    get,
    http::{header, Method},
    post, route, web, HttpRequest, HttpResponse,
};
use chrono_tz::Tz;
use clap::Parser;
use serde::Deserialize;

pub mod cache;
pub mod categories;
pub mod custom_date;
pub mod database;
pub mod error;
pub mod export;
pub mod listing;
pub mod news;
pub mod query;
pub mod render;
pub mod sources;

use cache::DEFAULT_TTL_SECS;
use custom_date::{parse_iso_date, parse_timezone};
use database::FavoriteStore;
use error::AppError;
use listing::Page;
use news::{Aggregator, Article, NewsItem};
use query::{NewsQuery, Settings};
use render::PageView;

#[derive(Parser, Debug, Clone)]
#[clap(about, version)]
pub struct Args {
    #[clap(short, long, default_value = "127.0.0.1")]
    pub ip: String,

    #[clap(short, long, default_value = "8501")]
    pub port: u16,

    /// Reddit posts requested per subreddit
    #[clap(short, long, default_value = "25")]
    pub limit: u16,

    /// Seconds a fetched feed is served from cache
    #[clap(short, long, default_value_t = DEFAULT_TTL_SECS)]
    pub cache_lifetime: u32,

    #[clap(short, long, default_value = "favorites.sqlite")]
    pub db_path: String,

    /// IANA timezone used to display publication times
    #[clap(short, long, default_value = "UTC", value_parser = parse_timezone)]
    pub timezone: Tz,

    /// Upstream request timeout in seconds
    #[clap(long, default_value = "15")]
    pub request_timeout: u64,
}

pub struct AppState {
    pub config: Args,
    pub aggregator: Aggregator,
    pub favorites: FavoriteStore,
}

/// Everything one news view needs, loaded for the given settings.
struct Loaded {
    page: Page,
    errors: Vec<String>,
}

async fn load(app_data: &AppState, settings: &Settings) -> Loaded {
    let aggregation = app_data
        .aggregator
        .aggregate(
            &settings.category,
            settings.enable_hn,
            settings.enable_reddit,
            &settings.subreddits,
        )
        .await;

    for error in &aggregation.errors {
        tracing::warn!(category = %settings.category, "{error}");
    }

    Loaded {
        page: listing::apply(aggregation.articles, &settings.listing),
        errors: aggregation.errors,
    }
}

#[route("/", method = "GET", method = "HEAD")]
pub async fn index(
    query: web::Query<NewsQuery>,
    app_data: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let settings = Settings::from_query(&query);
    let loaded = load(&app_data, &settings).await;
    let favorites = app_data.favorites.list().await?;
    let favorite_keys = app_data.favorites.keys().await?;

    let html = render::render_page(&PageView {
        settings: &settings,
        page: &loaded.page,
        errors: &loaded.errors,
        favorites: &favorites,
        favorite_keys: &favorite_keys,
        tz: &app_data.config.timezone,
        cache_lifetime: app_data.config.cache_lifetime,
    });

    Ok(create_response(&req, "text/html; charset=utf-8", html.into_bytes()))
}

#[get("/export/page.csv")]
pub async fn export_page_csv(
    query: web::Query<NewsQuery>,
    app_data: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let settings = Settings::from_query(&query);
    let loaded = load(&app_data, &settings).await;
    let favorite_keys = app_data.favorites.keys().await?;
    let body = export::to_csv(&export::rows(&loaded.page.articles, &favorite_keys))?;

    Ok(attachment(create_response(&req, "text/csv", body), "news_page.csv"))
}

#[get("/export/page.json")]
pub async fn export_page_json(
    query: web::Query<NewsQuery>,
    app_data: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let settings = Settings::from_query(&query);
    let loaded = load(&app_data, &settings).await;
    let favorite_keys = app_data.favorites.keys().await?;
    let body = export::to_json(&export::rows(&loaded.page.articles, &favorite_keys))?;

    Ok(attachment(
        create_response(&req, "application/json", body),
        "news_page.json",
    ))
}

#[get("/export/favorites.csv")]
pub async fn export_favorites_csv(
    app_data: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let favorites = app_data.favorites.list().await?;
    let rows: Vec<_> = favorites
        .iter()
        .map(|a| export::ExportRow::new(a, true))
        .collect();
    let body = export::to_csv(&rows)?;

    Ok(attachment(create_response(&req, "text/csv", body), "favorites.csv"))
}

/// Card fields posted by the save/unsave button.
#[derive(Debug, Deserialize)]
pub struct FavoriteForm {
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub comments: i64,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub published_at: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub return_to: String,
}

impl FavoriteForm {
    fn into_article(self) -> Article {
        Article {
            item: NewsItem {
                title: self.title,
                url: self.url,
                source: self.source,
                points: self.points,
                comments: self.comments,
                author: Some(self.author).filter(|a| !a.is_empty()),
                published_at: parse_iso_date(&self.published_at),
            },
            category: self.category,
            score: self.score,
        }
    }
}

/// Only a plain query string is accepted, so the redirect stays on `/`.
fn redirect_target(return_to: &str) -> String {
    let return_to = return_to.trim_start_matches('?');
    if !return_to.is_empty() && return_to.chars().all(|c| c.is_ascii_graphic()) {
        format!("/?{return_to}")
    } else {
        "/".to_string()
    }
}

#[post("/favorites")]
pub async fn toggle_favorite(
    form: web::Form<FavoriteForm>,
    app_data: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    let location = redirect_target(&form.return_to);
    let article = form.into_article();
    let key = article.favorite_key().to_string();

    let saved = app_data.favorites.toggle(article).await?;
    tracing::info!(%key, saved, "favorite toggled");

    Ok(HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location))
        .finish())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(index)
        .service(export_page_csv)
        .service(export_page_json)
        .service(export_favorites_csv)
        .service(toggle_favorite);
}

fn create_response(req: &HttpRequest, content_type: &str, body: Vec<u8>) -> HttpResponse {
    let mut response = HttpResponse::Ok();
    response.insert_header((header::CONTENT_TYPE, content_type.to_string()));
    response.insert_header((header::CACHE_CONTROL, "no-store"));

    if req.method() == Method::HEAD {
        response
            .insert_header((header::CONTENT_LENGTH, body.len()))
            .finish()
    } else {
        response.body(body)
    }
}

fn attachment(mut response: HttpResponse, file_name: &str) -> HttpResponse {
    if let Ok(value) =
        header::HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\""))
    {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, value);
    }
    response
}
