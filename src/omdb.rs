use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::models::ExternalRatings;

const OMDB_BASE: &str = "https://www.omdbapi.com/";

/// Auxiliary metadata source queried by IMDb id.
#[async_trait]
pub trait RatingsApi: Send + Sync {
    async fn ratings(&self, imdb_code: &str) -> Result<Option<ExternalRatings>>;
}

#[derive(Debug, Clone)]
pub struct OmdbClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OmdbClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        Self::with_base_url(api_key, OMDB_BASE, timeout)
    }

    pub fn with_base_url(api_key: String, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build OMDb HTTP client")?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct OmdbResponse {
    #[serde(rename = "Response")]
    response: String,
    #[serde(rename = "Ratings", default)]
    ratings: Vec<OmdbRating>,
    #[serde(rename = "Metascore", default)]
    metascore: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OmdbRating {
    #[serde(rename = "Source")]
    source: String,
    #[serde(rename = "Value")]
    value: String,
}

#[async_trait]
impl RatingsApi for OmdbClient {
    async fn ratings(&self, imdb_code: &str) -> Result<Option<ExternalRatings>> {
        let url = format!(
            "{}?i={}&apikey={}",
            self.base_url,
            urlencoding::encode(imdb_code),
            urlencoding::encode(&self.api_key)
        );
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .context("OMDb request failed")?;
        let status = res.status();
        let text = res.text().await.context("reading OMDb body failed")?;
        if !status.is_success() {
            return Err(anyhow!("OMDb HTTP error (status {})", status));
        }
        let parsed: OmdbResponse =
            serde_json::from_str(&text).context("Failed to parse OMDb JSON")?;
        Ok(map_ratings(parsed))
    }
}

fn map_ratings(data: OmdbResponse) -> Option<ExternalRatings> {
    if data.response != "True" {
        return None;
    }
    let rotten_tomatoes = data
        .ratings
        .into_iter()
        .find(|r| r.source == "Rotten Tomatoes")
        .map(|r| r.value);
    // OMDb reports unknown values as "N/A".
    let metascore = data.metascore.filter(|m| !m.is_empty() && m != "N/A");
    let ratings = ExternalRatings {
        rotten_tomatoes,
        metascore,
    };
    (!ratings.is_empty()).then_some(ratings)
}
