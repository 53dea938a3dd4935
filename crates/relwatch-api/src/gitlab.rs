use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::http::{check_response, decode_records, HttpConfig};

pub struct GitLabClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl GitLabClient {
    /// `base_url` is the instance root, e.g. `https://gitlab.example.com`
    pub fn new(token: String, base_url: String, http: &HttpConfig) -> Self {
        Self {
            client: http.build_client(),
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Releases of a project, newest first
    ///
    /// `project_id` may be the numeric id or the `group/project` path.
    pub async fn list_releases(&self, project_id: &str) -> Result<Vec<GitLabRelease>> {
        // GitLab uses URL-encoded paths
        let encoded_id = urlencoding::encode(project_id);
        let url = format!("{}/api/v4/projects/{}/releases", self.base_url, encoded_id);

        debug!("GET {}", url);
        let response = self.client.get(&url).bearer_auth(&self.token).send().await?;
        let response = check_response(response, &url).await?;

        let text = response.text().await?;
        decode_records(&text, "GitLab release")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabRelease {
    pub tag_name: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub released_at: Option<String>,
}
