// GitHub REST client - releases, tags, commits, pull requests and issues
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::http::{check_response, decode_records, HttpConfig};

pub const GITHUB_API_BASE: &str = "https://api.github.com";

pub struct GitHubClient {
    client: reqwest::Client,
    token: Option<String>,
    base_url: String,
}

impl GitHubClient {
    pub fn new(token: Option<String>) -> Self {
        Self::with_base_url(token, GITHUB_API_BASE.to_string(), &HttpConfig::default())
    }

    /// For GitHub Enterprise or a mock server
    pub fn with_base_url(token: Option<String>, base_url: String, http: &HttpConfig) -> Self {
        Self {
            client: http.build_client(),
            // An empty token is the same as no token
            token: token.filter(|t| !t.is_empty()),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        let mut request = self
            .client
            .get(url)
            .query(query)
            .header("Accept", "application/vnd.github+json");

        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        debug!("GET {}", url);
        let response = check_response(request.send().await?, url).await?;
        Ok(response.text().await?)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let text = self.get_text(url, query).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// A JSON array endpoint where one odd element must not sink the page
    async fn get_records<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        what: &str,
    ) -> Result<Vec<T>> {
        let text = self.get_text(url, query).await?;
        decode_records(&text, what)
    }

    /// Published releases of a repository, newest first
    pub async fn list_releases(&self, repo: &str) -> Result<Vec<GitHubRelease>> {
        let url = format!("{}/repos/{}/releases", self.base_url, repo);
        self.get_records(&url, &[("per_page", "100".to_string())], "release")
            .await
    }

    /// Tags of a repository, newest first
    pub async fn list_tags(&self, repo: &str) -> Result<Vec<GitHubTag>> {
        let url = format!("{}/repos/{}/tags", self.base_url, repo);
        self.get_json(&url, &[]).await
    }

    /// Commits reachable from `head` but not from `base`, oldest first
    pub async fn compare(&self, repo: &str, base: &str, head: &str) -> Result<Vec<GitHubCommit>> {
        let url = format!("{}/repos/{}/compare/{}...{}", self.base_url, repo, base, head);
        let comparison: GitHubComparison = self.get_json(&url, &[]).await?;
        Ok(comparison.commits)
    }

    /// Most recent commits reachable from `sha`, newest first
    pub async fn list_commits(
        &self,
        repo: &str,
        sha: &str,
        per_page: u32,
    ) -> Result<Vec<GitHubCommit>> {
        let url = format!("{}/repos/{}/commits", self.base_url, repo);
        self.get_json(
            &url,
            &[("sha", sha.to_string()), ("per_page", per_page.to_string())],
        )
        .await
    }

    /// A single commit, for its dates
    pub async fn get_commit(&self, repo: &str, sha: &str) -> Result<GitHubCommit> {
        let url = format!("{}/repos/{}/commits/{}", self.base_url, repo, sha);
        self.get_json(&url, &[]).await
    }

    /// One page of pull requests
    pub async fn list_pull_requests(
        &self,
        repo: &str,
        query: &PullRequestQuery,
    ) -> Result<Vec<GitHubPullRequest>> {
        let url = format!("{}/repos/{}/pulls", self.base_url, repo);
        self.get_records(&url, &query.to_params(), "pull request")
            .await
    }

    /// One page of issues (the endpoint returns pull requests too)
    pub async fn list_issues(&self, repo: &str, query: &IssueQuery) -> Result<Vec<GitHubIssue>> {
        let url = format!("{}/repos/{}/issues", self.base_url, repo);
        self.get_records(&url, &query.to_params(), "issue").await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Desc,
    Asc,
}

impl SortDirection {
    fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Desc => "desc",
            SortDirection::Asc => "asc",
        }
    }
}

/// Query for `GET /repos/{repo}/pulls`
#[derive(Debug, Clone)]
pub struct PullRequestQuery {
    pub state: String,
    pub page: u32,
    pub per_page: u32,
    pub sort: String,
    pub direction: SortDirection,
}

impl Default for PullRequestQuery {
    fn default() -> Self {
        Self {
            state: "closed".to_string(),
            page: 1,
            per_page: 100,
            sort: "updated".to_string(),
            direction: SortDirection::Desc,
        }
    }
}

impl PullRequestQuery {
    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    /// True when results come back most recently updated first, which is
    /// what makes stopping at the first stale item safe
    pub fn is_newest_first(&self) -> bool {
        self.sort == "updated" && self.direction == SortDirection::Desc
    }

    fn to_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("state", self.state.clone()),
            ("page", self.page.to_string()),
            ("per_page", self.per_page.to_string()),
            ("sort", self.sort.clone()),
            ("direction", self.direction.as_str().to_string()),
        ]
    }
}

/// Query for `GET /repos/{repo}/issues`
#[derive(Debug, Clone)]
pub struct IssueQuery {
    pub state: String,
    pub since: Option<String>,
    pub labels: Vec<String>,
    pub page: u32,
    pub per_page: u32,
}

impl Default for IssueQuery {
    fn default() -> Self {
        Self {
            state: "all".to_string(),
            since: None,
            labels: Vec::new(),
            page: 1,
            per_page: 100,
        }
    }
}

impl IssueQuery {
    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("state", self.state.clone())];
        if let Some(ref since) = self.since {
            params.push(("since", since.clone()));
        }
        if !self.labels.is_empty() {
            params.push(("labels", self.labels.join(",")));
        }
        params.push(("page", self.page.to_string()));
        params.push(("per_page", self.per_page.to_string()));
        params.push(("sort", "updated".to_string()));
        params.push(("direction", "desc".to_string()));
        params
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRelease {
    pub tag_name: String,
    pub name: Option<String>,
    pub body: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    pub published_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubTag {
    pub name: String,
    pub commit: GitHubTagCommit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubTagCommit {
    pub sha: String,
}

#[derive(Debug, Deserialize)]
struct GitHubComparison {
    #[serde(default)]
    commits: Vec<GitHubCommit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubCommit {
    pub sha: String,
    pub commit: GitHubCommitDetail,
}

impl GitHubCommit {
    /// Subject line of the commit message
    pub fn subject(&self) -> &str {
        self.commit.message.lines().next().unwrap_or("")
    }

    /// Committer date, falling back to the author date
    pub fn date(&self) -> Option<&str> {
        self.commit
            .committer
            .as_ref()
            .and_then(|s| s.date.as_deref())
            .or_else(|| self.commit.author.as_ref().and_then(|s| s.date.as_deref()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubCommitDetail {
    pub message: String,
    pub author: Option<GitHubSignature>,
    pub committer: Option<GitHubSignature>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubSignature {
    pub name: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubPullRequest {
    pub number: u64,
    pub title: String,
    pub merged_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    pub html_url: String,
    #[serde(default)]
    pub base: Option<GitHubBranchRef>,
}

impl GitHubPullRequest {
    /// Branch the pull request was merged into
    pub fn base_branch(&self) -> Option<&str> {
        self.base.as_ref().map(|b| b.ref_name.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubBranchRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubIssue {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub labels: Vec<GitHubLabel>,
    pub html_url: String,
    #[serde(default)]
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl GitHubIssue {
    pub fn is_pull_request(&self) -> bool {
        self.html_url.contains("/pull/")
    }

    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubLabel {
    pub name: String,
}
