// GitLab project releases
use async_trait::async_trait;
use futures::future::join_all;
use relwatch_api::{GitLabClient, GitLabRelease};
use tracing::{debug, warn};

use super::{passes, FetchContext, GitLabProject, ReleaseSource, SourceConfig, SourceKind};
use crate::enhance::CommitEnhancer;
use crate::markup::Node;
use crate::models::{parse_date, Release};
use crate::pipeline::{process_release_body, HeadingPolicy};
use crate::registry::RepoFilter;

/// `repo` for a project configured without a name
const UNKNOWN_PROJECT: &str = "unknown";

pub struct GitLabReleaseSource {
    ctx: FetchContext,
}

impl GitLabReleaseSource {
    pub fn new(ctx: FetchContext) -> Self {
        Self { ctx }
    }

    async fn fetch_project(
        &self,
        client: &GitLabClient,
        project: &GitLabProject,
        enhancer: &CommitEnhancer,
    ) -> Vec<Release> {
        let releases = match client.list_releases(&project.id).await {
            Ok(releases) => releases,
            Err(e) => {
                warn!("Failed to fetch GitLab releases for {}: {}", project.name, e);
                return Vec::new();
            }
        };

        debug!("{} GitLab releases for {}", releases.len(), project.name);
        releases
            .into_iter()
            .filter_map(|r| gitlab_to_release(client.base_url(), project, r, enhancer))
            .collect()
    }
}

fn gitlab_to_release(
    base_url: &str,
    project: &GitLabProject,
    release: GitLabRelease,
    enhancer: &CommitEnhancer,
) -> Option<Release> {
    let repo = if project.name.is_empty() {
        UNKNOWN_PROJECT
    } else {
        project.name.as_str()
    };

    let Some(date) = release.released_at.as_deref().and_then(parse_date) else {
        warn!("Skipping {} {}: missing or invalid release date", repo, release.tag_name);
        return None;
    };

    // A release without notes still shows up, just with an empty body
    let body = match release.description.as_deref() {
        Some(description) if !description.trim().is_empty() => {
            process_release_body(description, repo, enhancer, HeadingPolicy::Preserve)
        }
        _ => Node::empty_root(),
    };

    Some(Release::new(
        format!("{}/{}/-/releases/{}", base_url, project.name, release.tag_name),
        repo,
        release.tag_name.as_str(),
        release.name.unwrap_or_default(),
        date,
        body,
    ))
}

#[async_trait]
impl ReleaseSource for GitLabReleaseSource {
    fn kind(&self) -> SourceKind {
        SourceKind::GitLab
    }

    async fn fetch(&self, config: &SourceConfig, filter: Option<&RepoFilter>) -> Vec<Release> {
        if !config.enabled {
            return Vec::new();
        }

        let Some(token) = config.token() else {
            warn!("GitLab token not configured, skipping GitLab releases");
            return Vec::new();
        };
        let Some(projects) = config.projects.as_ref() else {
            warn!("No GitLab projects configured, skipping GitLab releases");
            return Vec::new();
        };
        let Some(base_url) = config.base_url.as_deref().filter(|u| !u.trim().is_empty()) else {
            warn!("GitLab base URL not configured, skipping GitLab releases");
            return Vec::new();
        };

        let projects = projects.projects();
        if projects.is_empty() {
            warn!("No valid GitLab projects found after parsing");
            return Vec::new();
        }

        let client = GitLabClient::new(token.to_string(), base_url.to_string(), &self.ctx.http);
        let enhancer = CommitEnhancer::new().with_mentions(config.link_mentions.unwrap_or(false));

        let wanted = projects
            .iter()
            .filter(|p| passes(filter, self.kind(), &p.name));
        let results = join_all(wanted.map(|p| self.fetch_project(&client, p, &enhancer))).await;

        results.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::to_markdown;
    use crate::sources::ProjectList;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer, projects: &str) -> SourceConfig {
        SourceConfig {
            token: Some("glpat-secret".to_string()),
            base_url: Some(server.uri()),
            projects: Some(ProjectList::Csv(projects.to_string())),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_releases_with_and_without_description() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/12/releases"))
            .and(header("authorization", "Bearer glpat-secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "tag_name": "v2.0.0",
                    "name": "Big one",
                    "description": "- feat: pay with a link\n- fix: rounding in totals",
                    "released_at": "2024-05-01T09:00:00Z"
                },
                {
                    "tag_name": "v1.9.0",
                    "name": null,
                    "description": null,
                    "released_at": "2024-04-01T09:00:00Z"
                },
                {
                    "tag_name": "v1.8.0",
                    "name": "Undated",
                    "description": "x",
                    "released_at": null
                }
            ])))
            .mount(&server)
            .await;

        let releases = GitLabReleaseSource::new(FetchContext::default())
            .fetch(&config(&server, "12:pay/app"), None)
            .await;

        assert_eq!(releases.len(), 2);
        let big = &releases[0];
        assert_eq!(big.repo, "pay/app");
        assert_eq!(big.url, format!("{}/pay/app/-/releases/v2.0.0", server.uri()));
        assert!(to_markdown(&big.body).contains("Bug Fixes"));

        let bare = &releases[1];
        assert_eq!(bare.title, "v1.9.0");
        assert_eq!(bare.body, Node::empty_root());
    }

    #[tokio::test]
    async fn test_one_failing_project_keeps_the_others() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/1/releases"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/2/releases"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "tag_name": "v1",
                "name": "One",
                "description": "## Notes\n\nfine",
                "released_at": "2024-05-01T09:00:00Z"
            }])))
            .mount(&server)
            .await;

        let releases = GitLabReleaseSource::new(FetchContext::default())
            .fetch(&config(&server, "1:gone/app,2:live/app"), None)
            .await;

        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].repo, "live/app");
    }

    #[tokio::test]
    async fn test_missing_preconditions_return_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        let source = GitLabReleaseSource::new(FetchContext::default());

        let no_token = SourceConfig {
            token: None,
            ..config(&server, "1:a")
        };
        let no_base = SourceConfig {
            base_url: None,
            ..config(&server, "1:a")
        };
        let no_projects = SourceConfig {
            projects: None,
            ..config(&server, "1:a")
        };
        let bad_projects = config(&server, "garbage");

        for config in [no_token, no_base, no_projects, bad_projects] {
            assert!(source.fetch(&config, None).await.is_empty());
        }
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
            ..config(&server, "12:group/app")
        };
        let releases = GitLabReleaseSource::new(FetchContext::default())
            .fetch(&config, None)
            .await;
        assert!(releases.is_empty());
    }
}
