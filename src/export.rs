use serde::Serialize;
use std::collections::HashSet;

use crate::error::AppError;
use crate::news::Article;

/// Flat record written to CSV and JSON downloads.
#[derive(Debug, Serialize)]
pub struct ExportRow<'a> {
    pub title: &'a str,
    pub url: &'a str,
    pub source: &'a str,
    pub category: &'a str,
    pub points: i64,
    pub comments: i64,
    pub author: Option<&'a str>,
    pub published_at: Option<String>,
    pub score: f64,
    pub favorite: bool,
}

impl<'a> ExportRow<'a> {
    pub fn new(article: &'a Article, favorite: bool) -> Self {
        Self {
            title: &article.item.title,
            url: &article.item.url,
            source: &article.item.source,
            category: &article.category,
            points: article.item.points,
            comments: article.item.comments,
            author: article.item.author.as_deref(),
            published_at: article.item.published_at.map(|dt| dt.to_rfc3339()),
            score: (article.score * 100.0).round() / 100.0,
            favorite,
        }
    }
}

pub fn rows<'a>(articles: &'a [Article], favorites: &HashSet<String>) -> Vec<ExportRow<'a>> {
    articles
        .iter()
        .map(|a| ExportRow::new(a, favorites.contains(a.favorite_key())))
        .collect()
}

pub fn to_csv(rows: &[ExportRow<'_>]) -> Result<Vec<u8>, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if rows.is_empty() {
        writer.write_record([
            "title",
            "url",
            "source",
            "category",
            "points",
            "comments",
            "author",
            "published_at",
            "score",
            "favorite",
        ])?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::Export(e.error().to_string()))
}

pub fn to_json(rows: &[ExportRow<'_>]) -> Result<Vec<u8>, AppError> {
    Ok(serde_json::to_vec(rows)?)
}
