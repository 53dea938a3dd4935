//! Source fetchers.
//!
//! Each kind of upstream gets one [`ReleaseSource`] implementation that turns
//! the upstream's objects into [`Release`]s. Fetchers never fail: missing
//! configuration, HTTP errors and malformed records are logged and the
//! affected unit (repo, project, package, post) contributes nothing.

pub mod blog;
pub mod github;
pub mod github_issues;
pub mod github_prs;
pub mod gitlab;
pub mod npm;
pub mod release_feed;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use relwatch_api::HttpConfig;
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::config::{Endpoints, Environment};
use crate::models::Release;
use crate::registry::RepoFilter;
use crate::{Error, Result};

pub use blog::BlogSource;
pub use github::GitHubReleaseSource;
pub use github_issues::GitHubIssueSource;
pub use github_prs::GitHubPullRequestSource;
pub use gitlab::GitLabReleaseSource;
pub use npm::NpmSource;
pub use release_feed::ReleaseFeedSource;

/// Every upstream we know how to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    #[serde(rename = "github")]
    GitHub,
    #[serde(rename = "gitlab")]
    GitLab,
    #[serde(rename = "npm")]
    Npm,
    #[serde(rename = "gh_pr")]
    GitHubPullRequests,
    #[serde(rename = "nimiq-wallet")]
    ReleaseFeed,
    #[serde(rename = "nimiq-blog")]
    Blog,
    #[serde(rename = "github-issues-feedback")]
    GitHubIssues,
}

impl SourceKind {
    pub const ALL: [SourceKind; 7] = [
        SourceKind::GitHub,
        SourceKind::GitLab,
        SourceKind::Npm,
        SourceKind::GitHubPullRequests,
        SourceKind::ReleaseFeed,
        SourceKind::Blog,
        SourceKind::GitHubIssues,
    ];

    /// Name used in configuration files
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::GitHub => "github",
            SourceKind::GitLab => "gitlab",
            SourceKind::Npm => "npm",
            SourceKind::GitHubPullRequests => "gh_pr",
            SourceKind::ReleaseFeed => "nimiq-wallet",
            SourceKind::Blog => "nimiq-blog",
            SourceKind::GitHubIssues => "github-issues-feedback",
        }
    }

    /// Prefix of the `prefix:target` shorthand, for kinds that have one
    pub fn shorthand(&self) -> Option<&'static str> {
        match self {
            SourceKind::GitHub => Some("gh"),
            SourceKind::Npm => Some("npm"),
            SourceKind::GitHubPullRequests => Some("gh_pr"),
            SourceKind::GitHubIssues => Some("gh_issues_feedback"),
            _ => None,
        }
    }

    pub fn from_shorthand(prefix: &str) -> Option<SourceKind> {
        SourceKind::ALL
            .into_iter()
            .find(|k| k.shorthand() == Some(prefix))
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SourceKind::GitHub => "GitHub",
            SourceKind::GitLab => "GitLab",
            SourceKind::Npm => "NPM",
            SourceKind::GitHubPullRequests => "GitHub Pull Requests",
            SourceKind::ReleaseFeed => "Nimiq Wallet",
            SourceKind::Blog => "Nimiq Blog",
            SourceKind::GitHubIssues => "GitHub Issues Feedback",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SourceKind::GitHub => "Releases and tags from GitHub repositories",
            SourceKind::GitLab => "Releases from GitLab projects",
            SourceKind::Npm => "Package versions from the npm registry",
            SourceKind::GitHubPullRequests => "Merged pull requests grouped by week",
            SourceKind::ReleaseFeed => "Frontend release notes feed",
            SourceKind::Blog => "Posts scraped from the blog",
            SourceKind::GitHubIssues => "Recently updated feedback issues",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = Error;

    /// Accepts configuration names and shorthand prefixes
    fn from_str(s: &str) -> Result<Self> {
        SourceKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .or_else(|| SourceKind::from_shorthand(s))
            .ok_or_else(|| Error::ConfigError(format!("Unknown source kind '{}'", s)))
    }
}

/// A GitLab project: numeric (or path) id plus the name shown as `repo`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLabProject {
    pub id: String,
    pub name: String,
}

/// `projects` is either `"12:group/app,34:group/lib"` or a list of tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProjectList {
    Csv(String),
    List(Vec<GitLabProject>),
}

impl ProjectList {
    /// Projects with both an id and a name; malformed CSV entries are skipped
    pub fn projects(&self) -> Vec<GitLabProject> {
        match self {
            ProjectList::List(projects) => projects.clone(),
            ProjectList::Csv(csv) => csv
                .split(',')
                .filter_map(|entry| {
                    let (id, name) = entry.trim().split_once(':')?;
                    let (id, name) = (id.trim(), name.trim());
                    if id.is_empty() || name.is_empty() {
                        return None;
                    }
                    Some(GitLabProject {
                        id: id.to_string(),
                        name: name.to_string(),
                    })
                })
                .collect(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Parameters for one fetch. Each kind reads only the fields it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub repos: Vec<String>,

    #[serde(default)]
    pub projects: Option<ProjectList>,

    #[serde(default)]
    pub packages: Vec<String>,

    #[serde(default, alias = "baseUrl")]
    pub base_url: Option<String>,

    #[serde(default)]
    pub token: Option<String>,

    /// ISO date, lower bound for pull requests and issues
    #[serde(default)]
    pub since: Option<String>,

    #[serde(default)]
    pub labels: Vec<String>,

    #[serde(default)]
    pub state: Option<String>,

    /// repo -> base branches whose merged pull requests count
    #[serde(default)]
    pub branches: HashMap<String, Vec<String>>,

    /// Turn `@user` into profile links; each kind has its own default
    #[serde(default, alias = "linkMentions")]
    pub link_mentions: Option<bool>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            repos: Vec::new(),
            projects: None,
            packages: Vec::new(),
            base_url: None,
            token: None,
            since: None,
            labels: Vec::new(),
            state: None,
            branches: HashMap::new(),
            link_mentions: None,
        }
    }
}

impl SourceConfig {
    /// Non-empty token, if any
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// Shared plumbing every fetcher is built with
#[derive(Clone)]
pub struct FetchContext {
    pub http: HttpConfig,
    pub endpoints: Endpoints,
    pub environment: Environment,
    pub clock: Arc<dyn Clock>,
}

impl Default for FetchContext {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            endpoints: Endpoints::default(),
            environment: Environment::default(),
            clock: Arc::new(SystemClock),
        }
    }
}

impl fmt::Debug for FetchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchContext")
            .field("http", &self.http)
            .field("endpoints", &self.endpoints)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

/// One upstream, translated into releases
///
/// `fetch` has no error path. A disabled or incomplete config yields an
/// empty list, and failures are logged.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn fetch(&self, config: &SourceConfig, filter: Option<&RepoFilter>) -> Vec<Release>;
}

/// Whether a repo survives the caller's filter, if there is one
pub(crate) fn passes(filter: Option<&RepoFilter>, kind: SourceKind, repo: &str) -> bool {
    filter.map_or(true, |f| f.matches(kind, repo))
}
