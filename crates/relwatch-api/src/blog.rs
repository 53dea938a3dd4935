// Blog HTML fetcher - parsing happens in core, this only moves bytes
use tracing::debug;

use crate::error::Result;
use crate::http::{check_response, HttpConfig};

pub const DEFAULT_BLOG_URL: &str = "https://www.nimiq.com/blog";

/// The blog serves a bot-hostile response to unknown agents
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

pub struct BlogClient {
    client: reqwest::Client,
    index_url: String,
}

impl BlogClient {
    pub fn new(index_url: String, http: &HttpConfig) -> Self {
        let http = HttpConfig {
            user_agent: BROWSER_USER_AGENT.to_string(),
            ..http.clone()
        };
        Self {
            client: http.build_client(),
            index_url,
        }
    }

    pub fn index_url(&self) -> &str {
        &self.index_url
    }

    pub async fn fetch_index(&self) -> Result<String> {
        self.fetch_html(&self.index_url).await
    }

    pub async fn fetch_html(&self, url: &str) -> Result<String> {
        debug!("GET {}", url);
        let response = check_response(self.client.get(url).send().await?, url).await?;
        Ok(response.text().await?)
    }
}
