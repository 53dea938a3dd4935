// npm registry client
use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use tracing::debug;

use crate::error::Result;
use crate::http::{check_response, HttpConfig};

pub const NPM_REGISTRY: &str = "https://registry.npmjs.org";

pub struct NpmClient {
    client: reqwest::Client,
    registry_url: String,
}

impl NpmClient {
    pub fn new(http: &HttpConfig) -> Self {
        Self::with_registry(NPM_REGISTRY.to_string(), http)
    }

    pub fn with_registry(registry_url: String, http: &HttpConfig) -> Self {
        Self {
            client: http.build_client(),
            registry_url: registry_url.trim_end_matches('/').to_string(),
        }
    }

    /// Full packument for a package - every version plus publish times
    pub async fn package_info(&self, name: &str) -> Result<NpmPackage> {
        // Scoped names keep their `@` but the slash has to be escaped
        let url = format!("{}/{}", self.registry_url, name.replace('/', "%2f"));

        debug!("GET {}", url);
        let response = check_response(self.client.get(&url).send().await?, &url).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// npm registry metadata document
#[derive(Debug, Clone, Deserialize)]
pub struct NpmPackage {
    pub name: String,
    #[serde(default)]
    pub versions: BTreeMap<String, NpmVersion>,
    /// version -> ISO publish time, plus `created` and `modified`
    ///
    /// Values stay raw JSON: unpublished packages put an object in here.
    #[serde(default)]
    pub time: HashMap<String, serde_json::Value>,
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NpmVersion {
    #[serde(default)]
    pub version: Option<String>,
}

impl NpmPackage {
    /// Versions that have a recorded publish time, paired with that time
    pub fn published_versions(&self) -> Vec<(&str, &str)> {
        self.versions
            .keys()
            .filter_map(|v| {
                self.time
                    .get(v)
                    .and_then(|t| t.as_str())
                    .map(|t| (v.as_str(), t))
            })
            .collect()
    }
}
