// Feedback issues from GitHub, one release per issue
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{Duration, SecondsFormat};
use futures::future::join_all;
use regex::Regex;
use relwatch_api::{GitHubClient, GitHubIssue, IssueQuery, MAX_PAGES};
use tracing::{debug, error, warn};

use super::{passes, FetchContext, ReleaseSource, SourceConfig, SourceKind};
use crate::extract::strip_image_nodes;
use crate::markup::{parse_markdown, Node};
use crate::models::{parse_date, Release};
use crate::registry::RepoFilter;

const DEFAULT_WINDOW_DAYS: i64 = 7;

/// Issues with this label are synthetic and stay out of production output
const TEST_LABEL: &str = "test";

static MARKDOWN_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[.*?\]\(.*?\)").expect("Invalid regex"));

static HTML_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<img[^>]*>").expect("Invalid regex"));

static IMAGE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://\S*?\.(jpg|jpeg|png|gif|webp|svg)(\?\S*)?").expect("Invalid regex")
});

/// Remove markdown images, `<img>` tags and bare image links
pub fn strip_images(markdown: &str) -> String {
    let cleaned = MARKDOWN_IMAGE.replace_all(markdown, "");
    let cleaned = HTML_IMAGE.replace_all(&cleaned, "");
    let cleaned = IMAGE_URL.replace_all(&cleaned, "");
    cleaned.trim().to_string()
}

pub struct GitHubIssueSource {
    ctx: FetchContext,
}

impl GitHubIssueSource {
    pub fn new(ctx: FetchContext) -> Self {
        Self { ctx }
    }

    fn query(&self, config: &SourceConfig) -> IssueQuery {
        let since = config.since.clone().unwrap_or_else(|| {
            (self.ctx.clock.now() - Duration::days(DEFAULT_WINDOW_DAYS))
                .to_rfc3339_opts(SecondsFormat::Secs, true)
        });

        IssueQuery {
            state: config.state.clone().unwrap_or_else(|| "all".to_string()),
            since: Some(since),
            labels: config.labels.clone(),
            ..Default::default()
        }
    }

    async fn fetch_repo(
        &self,
        client: &GitHubClient,
        repo: &str,
        query: &IssueQuery,
    ) -> Vec<Release> {
        let production = self.ctx.environment.is_production();
        let mut releases = Vec::new();

        for page in 1..=MAX_PAGES {
            let issues = match client.list_issues(repo, &query.clone().page(page)).await {
                Ok(issues) => issues,
                Err(e) => {
                    error!("Failed to fetch issues for {}: {}", repo, e);
                    break;
                }
            };

            let count = issues.len();
            releases.extend(
                issues
                    .into_iter()
                    .filter(|issue| !issue.is_pull_request())
                    .filter(|issue| !(production && issue.has_label(TEST_LABEL)))
                    .filter_map(|issue| issue_to_release(repo, issue)),
            );

            if count < query.per_page as usize {
                break;
            }
        }

        debug!("{} feedback issues for {}", releases.len(), repo);
        releases
    }
}

fn issue_body(issue: &GitHubIssue) -> Node {
    let mut markdown = strip_images(issue.body.as_deref().unwrap_or(""));
    if !issue.labels.is_empty() {
        let names: Vec<&str> = issue.labels.iter().map(|l| l.name.as_str()).collect();
        markdown.push_str(&format!("\n\n**Labels:** {}", names.join(", ")));
    }

    if markdown.trim().is_empty() {
        return Node::paragraph_root(issue.title.as_str());
    }

    let mut tree = parse_markdown(&markdown);
    // Reference-style images survive the text pass
    strip_image_nodes(&mut tree);
    tree
}

fn issue_to_release(repo: &str, issue: GitHubIssue) -> Option<Release> {
    let Some(date) = issue.created_at.as_deref().and_then(parse_date) else {
        warn!("Skipping {}#{}: invalid creation date", repo, issue.number);
        return None;
    };

    let body = issue_body(&issue);
    Some(Release::new(
        issue.html_url,
        repo,
        format!("#{}", issue.number),
        issue.title,
        date,
        body,
    ))
}

#[async_trait]
impl ReleaseSource for GitHubIssueSource {
    fn kind(&self) -> SourceKind {
        SourceKind::GitHubIssues
    }

    async fn fetch(&self, config: &SourceConfig, filter: Option<&RepoFilter>) -> Vec<Release> {
        if !config.enabled {
            return Vec::new();
        }
        if config.repos.is_empty() {
            warn!("No repositories configured, skipping GitHub issues feedback");
            return Vec::new();
        }

        let client = GitHubClient::with_base_url(
            config.token().map(str::to_string),
            self.ctx.endpoints.github_api.clone(),
            &self.ctx.http,
        );
        let query = self.query(config);

        let repos = config
            .repos
            .iter()
            .filter(|repo| passes(filter, self.kind(), repo));
        let results = join_all(repos.map(|repo| self.fetch_repo(&client, repo, &query))).await;

        results.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::Environment;
    use crate::markup::to_markdown;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(server: &MockServer, environment: Environment) -> GitHubIssueSource {
        let mut ctx = FetchContext::default();
        ctx.endpoints.github_api = server.uri();
        ctx.environment = environment;
        ctx.clock = Arc::new(FixedClock(parse_date("2024-05-10T12:00:00Z").unwrap()));
        GitHubIssueSource::new(ctx)
    }

    fn config() -> SourceConfig {
        SourceConfig {
            repos: vec!["o/feedback".to_string()],
            ..Default::default()
        }
    }

    async fn mount_issues(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/repos/o/feedback/issues"))
            .and(query_param("state", "all"))
            .and(query_param("since", "2024-05-03T12:00:00Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "number": 7,
                    "title": "Wallet crashes",
                    "body": "It crashes ![shot](https://x.io/a.png) on start",
                    "state": "open",
                    "labels": [{ "name": "bug" }, { "name": "wallet" }],
                    "html_url": "https://github.com/o/feedback/issues/7",
                    "created_at": "2024-05-08T10:00:00Z",
                    "updated_at": "2024-05-09T10:00:00Z"
                },
                {
                    "number": 8,
                    "title": "A pull request",
                    "body": null,
                    "state": "closed",
                    "labels": [],
                    "html_url": "https://github.com/o/feedback/pull/8",
                    "created_at": "2024-05-08T10:00:00Z",
                    "updated_at": "2024-05-09T10:00:00Z"
                },
                {
                    "number": 9,
                    "title": "Ignore me",
                    "body": "",
                    "state": "open",
                    "labels": [{ "name": "test" }],
                    "html_url": "https://github.com/o/feedback/issues/9",
                    "created_at": "2024-05-08T11:00:00Z",
                    "updated_at": "2024-05-09T11:00:00Z"
                },
                {
                    "number": 10,
                    "title": "No words",
                    "body": null,
                    "state": "open",
                    "labels": [],
                    "html_url": "https://github.com/o/feedback/issues/10",
                    "created_at": "2024-05-08T12:00:00Z",
                    "updated_at": "2024-05-09T12:00:00Z"
                }
            ])))
            .mount(server)
            .await;
    }

    #[test]
    fn test_strip_images() {
        let input = "Before ![alt](https://x.io/a.png) <IMG src=\"b.gif\"> see https://cdn.io/c.JPG?size=2 after";
        assert_eq!(strip_images(input), "Before   see  after");
        assert_eq!(strip_images("keep https://example.com/page"), "keep https://example.com/page");
    }

    #[tokio::test]
    async fn test_production_drops_prs_and_test_issues() {
        let server = MockServer::start().await;
        mount_issues(&server).await;

        let releases = source(&server, Environment::Production)
            .fetch(&config(), None)
            .await;
        let tags: Vec<&str> = releases.iter().map(|r| r.tag.as_str()).collect();
        assert_eq!(tags, vec!["#7", "#10"]);

        let crash = &releases[0];
        assert_eq!(crash.title, "Wallet crashes");
        assert_eq!(crash.url, "https://github.com/o/feedback/issues/7");
        let rendered = to_markdown(&crash.body);
        assert!(!rendered.contains("x.io"));
        assert!(crash.body.text_content().contains("Labels: bug, wallet"));

        // Nothing to show but the title
        assert_eq!(releases[1].body, Node::paragraph_root("No words"));
    }

    #[tokio::test]
    async fn test_development_keeps_test_issues() {
        let server = MockServer::start().await;
        mount_issues(&server).await;

        let releases = source(&server, Environment::Development)
            .fetch(&config(), None)
            .await;
        let tags: Vec<&str> = releases.iter().map(|r| r.tag.as_str()).collect();
        assert_eq!(tags, vec!["#7", "#9", "#10"]);
    }

    #[tokio::test]
    async fn test_malformed_issue_keeps_the_rest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/feedback/issues"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "number": 1,
                    "title": "Fine",
                    "html_url": "https://github.com/o/feedback/issues/1",
                    "created_at": "2024-05-08T10:00:00Z"
                },
                {
                    "number": 2,
                    "title": null,
                    "html_url": "https://github.com/o/feedback/issues/2",
                    "created_at": "2024-05-08T10:00:00Z"
                },
                {
                    "number": 3,
                    "title": "Undated",
                    "html_url": "https://github.com/o/feedback/issues/3"
                }
            ])))
            .mount(&server)
            .await;

        let releases = source(&server, Environment::Production)
            .fetch(&config(), None)
            .await;
        let tags: Vec<&str> = releases.iter().map(|r| r.tag.as_str()).collect();
        assert_eq!(tags, vec!["#1"]);
    }

    #[tokio::test]
    async fn test_disabled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let config = SourceConfig {
            enabled: false,
            ..config()
        };
        let releases = source(&server, Environment::Production)
            .fetch(&config, None)
            .await;
        assert!(releases.is_empty());
    }

    #[tokio::test]
    async fn test_labels_and_state_are_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/feedback/issues"))
            .and(query_param("state", "open"))
            .and(query_param("labels", "bug,ux"))
            .and(query_param("since", "2024-01-01T00:00:00Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let config = SourceConfig {
            state: Some("open".to_string()),
            labels: vec!["bug".to_string(), "ux".to_string()],
            since: Some("2024-01-01T00:00:00Z".to_string()),
            ..config()
        };
        let releases = source(&server, Environment::Production)
            .fetch(&config, None)
            .await;
        assert!(releases.is_empty());
    }
}
