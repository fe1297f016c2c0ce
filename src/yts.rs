use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::SearchError;
use crate::models::{MovieRecord, TorrentVariant};

pub const DEFAULT_YTS_BASE: &str = "https://yts.mx/api/v2";
const SEARCH_LIMIT: u32 = 50;

/// Title search against a movie-torrent index.
#[async_trait]
pub trait MovieIndex: Send + Sync {
    async fn search(&self, title: &str) -> Result<Vec<MovieRecord>, SearchError>;

    /// Featured releases of `year`, pre-filtered upstream by `min_rating`.
    async fn featured(&self, year: i32, min_rating: f32) -> Result<Vec<MovieRecord>, SearchError>;
}

#[derive(Debug, Clone)]
pub struct YtsClient {
    client: Client,
    base_url: String,
}

/// Trimmed title, or `InvalidInput` when nothing is left to search for.
pub fn clean_title(title: &str) -> Result<&str, SearchError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(SearchError::InvalidInput(
            "title is empty after trimming".to_string(),
        ));
    }
    Ok(trimmed)
}

impl YtsClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let user_agent = format!("reelscout/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build YTS HTTP client: {}", e))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn list_movies(&self, url: &str) -> Result<Vec<MovieRecord>, SearchError> {
        let res = self.client.get(url).send().await?;
        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            return Err(SearchError::UpstreamUnavailable(format!(
                "HTTP {} from movie index",
                status
            )));
        }
        parse_list_response(&text)
    }
}

#[async_trait]
impl MovieIndex for YtsClient {
    async fn search(&self, title: &str) -> Result<Vec<MovieRecord>, SearchError> {
        let title = clean_title(title)?;
        let url = format!(
            "{}/list_movies.json?query_term={}&limit={SEARCH_LIMIT}&sort_by=rating",
            self.base_url,
            urlencoding::encode(title)
        );
        debug!(%url, "Querying movie index");
        let movies = self.list_movies(&url).await?;
        info!("Movie index returned {} movies for '{}'", movies.len(), title);
        Ok(movies)
    }

    async fn featured(&self, year: i32, min_rating: f32) -> Result<Vec<MovieRecord>, SearchError> {
        let url = format!(
            "{}/list_movies.json?limit={SEARCH_LIMIT}&sort_by=featured&order_by=desc&minimum_rating={}&year={year}",
            self.base_url,
            min_rating.floor() as u32
        );
        debug!(%url, "Querying featured movies");
        let movies = self.list_movies(&url).await?;
        Ok(movies.into_iter().filter(|m| m.year == year).collect())
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    status: String,
    #[serde(default)]
    status_message: Option<String>,
    #[serde(default)]
    data: Option<ListData>,
}

#[derive(Debug, Deserialize)]
struct ListData {
    #[serde(default)]
    movies: Option<Vec<RawMovie>>,
}

#[derive(Debug, Deserialize)]
struct RawMovie {
    #[serde(default)]
    id: i64,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    imdb_code: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    rating: Option<f32>,
    #[serde(default)]
    runtime: Option<u32>,
    #[serde(default)]
    genres: Option<Vec<String>>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    large_cover_image: Option<String>,
    #[serde(default)]
    medium_cover_image: Option<String>,
    #[serde(default)]
    date_uploaded: Option<String>,
    #[serde(default)]
    torrents: Option<Vec<RawTorrent>>,
}

#[derive(Debug, Deserialize)]
struct RawTorrent {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    hash: Option<String>,
    #[serde(default)]
    quality: Option<String>,
    #[serde(rename = "type", default)]
    release_type: Option<String>,
    #[serde(default)]
    seeds: Option<u32>,
    #[serde(default)]
    peers: Option<u32>,
    #[serde(default)]
    size: Option<String>,
}

fn parse_list_response(body: &str) -> Result<Vec<MovieRecord>, SearchError> {
    let parsed: ListResponse = serde_json::from_str(body)
        .map_err(|e| SearchError::UpstreamMalformed(format!("JSON parse failed: {}", e)))?;
    if !parsed.status.eq_ignore_ascii_case("ok") {
        return Err(SearchError::UpstreamUnavailable(
            parsed
                .status_message
                .unwrap_or_else(|| format!("index status '{}'", parsed.status)),
        ));
    }
    let movies = parsed
        .data
        .and_then(|d| d.movies)
        .unwrap_or_default()
        .into_iter()
        .map(map_movie)
        .collect();
    Ok(movies)
}

fn map_movie(raw: RawMovie) -> MovieRecord {
    let page_url = raw
        .url
        .filter(|u| u.starts_with("https://") || u.starts_with("http://"))
        .or_else(|| {
            raw.slug
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(|s| format!("https://yts.mx/movies/{s}"))
        })
        .unwrap_or_else(|| "https://yts.mx".to_string());
    let poster = raw
        .large_cover_image
        .filter(|p| !p.is_empty())
        .or(raw.medium_cover_image.filter(|p| !p.is_empty()));

    MovieRecord {
        id: raw.id,
        title: raw.title.unwrap_or_default(),
        year: raw.year.unwrap_or_default(),
        rating: raw.rating.unwrap_or_default(),
        genres: raw.genres.unwrap_or_default(),
        poster,
        page_url,
        imdb_code: raw.imdb_code.filter(|c| !c.is_empty()),
        runtime_minutes: raw.runtime.unwrap_or_default(),
        summary: raw.summary.filter(|s| !s.trim().is_empty()),
        date_uploaded: raw.date_uploaded,
        torrents: raw
            .torrents
            .unwrap_or_default()
            .into_iter()
            .map(map_torrent)
            .collect(),
    }
}

fn map_torrent(raw: RawTorrent) -> TorrentVariant {
    TorrentVariant {
        quality: raw.quality.unwrap_or_else(|| "Unknown".to_string()),
        release_type: raw.release_type,
        size: raw.size,
        seeds: raw.seeds.unwrap_or_default(),
        peers: raw.peers.unwrap_or_default(),
        hash: raw.hash.unwrap_or_default(),
        download_url: raw.url.unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INCEPTION: &str = r#"{
        "status": "ok",
        "status_message": "Query was successful",
        "data": {
            "movie_count": 1,
            "limit": 50,
            "page_number": 1,
            "movies": [{
                "id": 1632,
                "url": "https://yts.mx/movies/inception-2010",
                "imdb_code": "tt1375666",
                "title": "Inception",
                "slug": "inception-2010",
                "year": 2010,
                "rating": 8.8,
                "runtime": 148,
                "genres": ["Action", "Adventure", "Sci-Fi"],
                "summary": "A thief who steals corporate secrets...",
                "large_cover_image": "https://yts.mx/assets/images/movies/Inception_2010/large-cover.jpg",
                "date_uploaded": "2015-11-02 01:04:39",
                "torrents": [
                    {"url": "https://yts.mx/torrent/download/AAA", "hash": "AAA", "quality": "1080p", "type": "bluray", "seeds": 100, "peers": 12, "size": "1.85 GB"},
                    {"url": "https://yts.mx/torrent/download/BBB", "hash": "BBB", "quality": "720p", "type": "bluray", "seeds": 40, "peers": 3, "size": "1.00 GB"}
                ]
            }]
        }
    }"#;

    #[test]
    fn maps_movie_fields_and_keeps_torrent_order() {
        let movies = parse_list_response(INCEPTION).unwrap();
        assert_eq!(movies.len(), 1);
        let m = &movies[0];
        assert_eq!(m.title, "Inception");
        assert_eq!(m.year, 2010);
        assert!((m.rating - 8.8).abs() < f32::EPSILON);
        assert_eq!(m.genres, vec!["Action", "Adventure", "Sci-Fi"]);
        assert_eq!(m.imdb_code.as_deref(), Some("tt1375666"));
        assert_eq!(m.page_url, "https://yts.mx/movies/inception-2010");
        let qualities: Vec<_> = m.torrents.iter().map(|t| t.quality.as_str()).collect();
        assert_eq!(qualities, vec!["1080p", "720p"]);
        assert_eq!(m.torrents[0].release_type.as_deref(), Some("bluray"));
    }

    #[test]
    fn missing_optional_fields_default() {
        let body = r#"{"status":"ok","data":{"movies":[{"title":"Bare","slug":"bare-1999"}]}}"#;
        let movies = parse_list_response(body).unwrap();
        let m = &movies[0];
        assert_eq!(m.year, 0);
        assert_eq!(m.rating, 0.0);
        assert!(m.genres.is_empty());
        assert!(m.poster.is_none());
        assert!(m.torrents.is_empty());
        assert_eq!(m.page_url, "https://yts.mx/movies/bare-1999");
    }

    #[test]
    fn no_movies_key_means_no_hits() {
        let body = r#"{"status":"ok","data":{"movie_count":0,"limit":50,"page_number":1}}"#;
        assert!(parse_list_response(body).unwrap().is_empty());
    }

    #[test]
    fn error_status_is_upstream_unavailable() {
        let body = r#"{"status":"error","status_message":"Server busy"}"#;
        let err = parse_list_response(body).unwrap_err();
        assert!(matches!(err, SearchError::UpstreamUnavailable(ref m) if m == "Server busy"));
    }

    #[test]
    fn garbage_is_upstream_malformed() {
        let err = parse_list_response("<html>cloudflare</html>").unwrap_err();
        assert!(matches!(err, SearchError::UpstreamMalformed(_)));
        let err = parse_list_response(r#"{"data": []}"#).unwrap_err();
        assert!(matches!(err, SearchError::UpstreamMalformed(_)));
    }

    #[test]
    fn falls_back_to_medium_cover() {
        let body = r#"{"status":"ok","data":{"movies":[{"title":"X","large_cover_image":"","medium_cover_image":"https://img/m.jpg"}]}}"#;
        let movies = parse_list_response(body).unwrap();
        assert_eq!(movies[0].poster.as_deref(), Some("https://img/m.jpg"));
    }

    #[test]
    fn blank_title_is_rejected() {
        assert!(matches!(clean_title("   \t"), Err(SearchError::InvalidInput(_))));
        assert_eq!(clean_title("  Heat ").unwrap(), "Heat");
    }
}
