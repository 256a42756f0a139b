use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tokio_rusqlite::{params, Connection, Result};

use crate::news::{Article, NewsItem};

/// Saved articles, kept in SQLite so they survive restarts.
#[derive(Clone)]
pub struct FavoriteStore {
    conn: Connection,
}

impl FavoriteStore {
    pub async fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS favorites (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    key TEXT NOT NULL UNIQUE,
                    title TEXT NOT NULL,
                    url TEXT NOT NULL,
                    source TEXT NOT NULL,
                    category TEXT NOT NULL,
                    points INTEGER NOT NULL,
                    comments INTEGER NOT NULL,
                    author TEXT,
                    published_at TEXT,
                    score REAL NOT NULL
                    )",
                [],
            )?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Saves the article, or removes it when already saved.
    /// Returns whether it is saved afterwards.
    pub async fn toggle(&self, article: Article) -> Result<bool> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let key = article.favorite_key().to_string();
                let removed = tx.execute("DELETE FROM favorites WHERE key = ?", params![key])?;

                if removed == 0 {
                    tx.execute(
                        "INSERT INTO favorites
                        (key, title, url, source, category, points, comments, author, published_at, score)
                        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                        params![
                            key,
                            article.item.title,
                            article.item.url,
                            article.item.source,
                            article.category,
                            article.item.points,
                            article.item.comments,
                            article.item.author,
                            article.item.published_at.map(|dt| dt.to_rfc3339()),
                            article.score
                        ],
                    )?;
                }

                tx.commit()?;
                Ok(removed == 0)
            })
            .await
    }

    pub async fn keys(&self) -> Result<HashSet<String>> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT key FROM favorites")?;
                let keys = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<HashSet<_>, _>>()?;
                Ok(keys)
            })
            .await
    }

    /// Favorites in the order they were saved.
    pub async fn list(&self) -> Result<Vec<Article>> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT title, url, source, category, points, comments, author, published_at, score
                    FROM favorites ORDER BY id",
                )?;
                let articles = stmt
                    .query_map([], |row| {
                        let published_at: Option<String> = row.get(7)?;
                        Ok(Article {
                            item: NewsItem {
                                title: row.get(0)?,
                                url: row.get(1)?,
                                source: row.get(2)?,
                                points: row.get(4)?,
                                comments: row.get(5)?,
                                author: row.get(6)?,
                                published_at: published_at
                                    .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                                    .map(|dt| dt.with_timezone(&Utc)),
                            },
                            category: row.get(3)?,
                            score: row.get(8)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await
    }
}
