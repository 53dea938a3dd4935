// Internal release feed - a static JSON array published next to the apps
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::http::{check_response, decode_records, HttpConfig};

pub const DEFAULT_FEED_URL: &str =
    "https://nimiq-frontend-release-notes.netlify.app/mainnet_releases.json";

pub struct ReleaseFeedClient {
    client: reqwest::Client,
    feed_url: String,
}

impl ReleaseFeedClient {
    pub fn new(feed_url: String, http: &HttpConfig) -> Self {
        Self {
            client: http.build_client(),
            feed_url,
        }
    }

    pub async fn fetch(&self) -> Result<Vec<FeedRelease>> {
        debug!("GET {}", self.feed_url);
        let response = self.client.get(&self.feed_url).send().await?;
        let response = check_response(response, &self.feed_url).await?;
        let text = response.text().await?;
        decode_records(&text, "release feed")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedRelease {
    pub version: String,
    pub date: String,
    /// Markdown release notes, usually a bullet list of commits
    #[serde(default)]
    pub message: Option<String>,
    pub app: String,
}
