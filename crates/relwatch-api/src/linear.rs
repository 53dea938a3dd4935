// Linear GraphQL client - completed issues, cursor paginated
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{ApiError, Result};
use crate::http::{check_response, decode_values, HttpConfig, MAX_PAGES};

pub const LINEAR_API_URL: &str = "https://api.linear.app/graphql";

const PAGE_SIZE: u32 = 50;

const ISSUES_QUERY: &str = r#"
query CompletedIssues($first: Int!, $after: String, $since: DateTimeOrDuration!) {
  issues(first: $first, after: $after, filter: { completedAt: { gte: $since } }) {
    nodes {
      id
      title
      identifier
      url
      description
      completedAt
      team { name key }
      project { name }
      state { name type }
    }
    pageInfo {
      hasNextPage
      endCursor
    }
  }
}
"#;

pub struct LinearClient {
    client: reqwest::Client,
    api_key: String,
    url: String,
}

impl LinearClient {
    pub fn new(api_key: String, http: &HttpConfig) -> Self {
        Self::with_url(api_key, LINEAR_API_URL.to_string(), http)
    }

    pub fn with_url(api_key: String, url: String, http: &HttpConfig) -> Self {
        Self {
            client: http.build_client(),
            api_key,
            url,
        }
    }

    /// Issues completed at or after `since` (RFC 3339), every page up to [`MAX_PAGES`]
    ///
    /// GraphQL errors on the first page are an error. Later on they end the
    /// walk and the pages read so far are kept.
    pub async fn completed_issues(&self, since: &str) -> Result<Vec<LinearIssue>> {
        let mut issues = Vec::new();
        let mut cursor: Option<String> = None;

        for page in 1..=MAX_PAGES {
            let body = json!({
                "query": ISSUES_QUERY,
                "variables": { "first": PAGE_SIZE, "after": cursor, "since": since },
            });

            debug!("POST {} (page {})", self.url, page);
            // Linear takes the personal API key as is, no Bearer prefix
            let response = self
                .client
                .post(&self.url)
                .header("Authorization", &self.api_key)
                .json(&body)
                .send()
                .await?;
            let response = check_response(response, &self.url).await?;
            let text = response.text().await?;
            let parsed: GraphQlResponse = serde_json::from_str(&text)?;

            if !parsed.errors.is_empty() {
                let messages: Vec<&str> = parsed.errors.iter().map(|e| e.message.as_str()).collect();
                if issues.is_empty() {
                    return Err(ApiError::RequestFailed(format!(
                        "Linear API errors: {}",
                        messages.join("; ")
                    )));
                }
                warn!("Linear API errors on page {}: {}", page, messages.join("; "));
                break;
            }

            let Some(data) = parsed.data else {
                break;
            };
            let connection = data.issues;
            issues.extend(decode_values::<LinearIssue>(connection.nodes, "Linear issue"));

            match connection.page_info.end_cursor {
                Some(next) if connection.page_info.has_next_page => cursor = Some(next),
                _ => break,
            }
        }

        debug!("{} completed Linear issues since {}", issues.len(), since);
        Ok(issues)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearIssue {
    pub id: String,
    pub title: String,
    pub identifier: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    pub team: LinearTeam,
    #[serde(default)]
    pub project: Option<LinearProject>,
    pub state: LinearState,
}

impl LinearIssue {
    pub fn is_completed(&self) -> bool {
        self.state.state_type == "completed"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearTeam {
    pub name: String,
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearProject {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearState {
    pub name: String,
    #[serde(rename = "type")]
    pub state_type: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<IssuesData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct IssuesData {
    issues: IssueConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueConnection {
    #[serde(default)]
    nodes: Vec<serde_json::Value>,
    page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}
