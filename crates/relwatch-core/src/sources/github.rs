// GitHub releases, or synthetic ones built from tags when a repo has none
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use relwatch_api::{GitHubClient, GitHubCommit, GitHubRelease, GitHubTag};
use tracing::{debug, info, warn};

use super::{passes, FetchContext, ReleaseSource, SourceConfig, SourceKind};
use crate::enhance::CommitEnhancer;
use crate::models::{parse_date, Release};
use crate::pipeline::{
    commits_to_markdown, github_release_body, process_release_body, HeadingPolicy,
};
use crate::registry::RepoFilter;

/// How many of the newest tags get a synthetic release
const MAX_TAGS: usize = 5;

/// Commits listed for the oldest tag, which has nothing to compare against
const INITIAL_COMMITS: u32 = 10;

pub struct GitHubReleaseSource {
    ctx: FetchContext,
}

impl GitHubReleaseSource {
    pub fn new(ctx: FetchContext) -> Self {
        Self { ctx }
    }

    fn client(&self, config: &SourceConfig) -> GitHubClient {
        GitHubClient::with_base_url(
            config.token().map(str::to_string),
            self.ctx.endpoints.github_api.clone(),
            &self.ctx.http,
        )
    }

    async fn fetch_repo(
        &self,
        client: &GitHubClient,
        repo: &str,
        enhancer: &CommitEnhancer,
    ) -> Vec<Release> {
        match client.list_releases(repo).await {
            Ok(releases) if !releases.is_empty() => releases
                .into_iter()
                .filter(|r| !r.draft)
                .filter_map(|r| github_to_release(repo, r, enhancer))
                .collect(),
            Ok(_) => {
                info!("No releases found for {}, generating from tags", repo);
                self.releases_from_tags(client, repo, enhancer).await
            }
            Err(e) => {
                warn!("Failed to fetch releases for {}: {}", repo, e);
                Vec::new()
            }
        }
    }

    async fn releases_from_tags(
        &self,
        client: &GitHubClient,
        repo: &str,
        enhancer: &CommitEnhancer,
    ) -> Vec<Release> {
        let tags = match client.list_tags(repo).await {
            Ok(tags) => tags,
            Err(e) => {
                warn!("Failed to fetch tags for {}: {}", repo, e);
                return Vec::new();
            }
        };

        let newest = &tags[..tags.len().min(MAX_TAGS)];
        let mut releases = Vec::with_capacity(newest.len());

        for (i, tag) in newest.iter().enumerate() {
            let commits = self.commits_for_tag(client, repo, tag, tags.get(i + 1)).await;
            let Some(date) = tag_date(client, repo, tag, &commits).await else {
                warn!("Skipping {} {}: no commit date", repo, tag.name);
                continue;
            };
            releases.push(tag_to_release(repo, tag, date, &commits, enhancer));
        }

        releases
    }

    /// Commits that went into `tag`, newest first
    async fn commits_for_tag(
        &self,
        client: &GitHubClient,
        repo: &str,
        tag: &GitHubTag,
        previous: Option<&GitHubTag>,
    ) -> Vec<GitHubCommit> {
        let result: relwatch_api::Result<Vec<GitHubCommit>> = match previous {
            Some(previous) => client
                .compare(repo, &previous.name, &tag.name)
                .await
                // compare lists oldest first
                .map(|commits| commits.into_iter().rev().collect()),
            None => {
                client
                    .list_commits(repo, &tag.commit.sha, INITIAL_COMMITS)
                    .await
            }
        };

        result.unwrap_or_else(|e| {
            warn!("Failed to fetch commits for {} {}: {}", repo, tag.name, e);
            Vec::new()
        })
    }
}

/// Head commit date of the range, else the date of the commit the tag points at
async fn tag_date(
    client: &GitHubClient,
    repo: &str,
    tag: &GitHubTag,
    commits: &[GitHubCommit],
) -> Option<DateTime<Utc>> {
    if let Some(date) = commits.first().and_then(|c| c.date()).and_then(parse_date) {
        return Some(date);
    }

    debug!("No commits listed for {} {}, asking for the tag commit", repo, tag.name);
    match client.get_commit(repo, &tag.commit.sha).await {
        Ok(commit) => commit.date().and_then(parse_date),
        Err(e) => {
            warn!("Failed to fetch tag commit for {} {}: {}", repo, tag.name, e);
            None
        }
    }
}

fn tag_to_release(
    repo: &str,
    tag: &GitHubTag,
    date: DateTime<Utc>,
    commits: &[GitHubCommit],
    enhancer: &CommitEnhancer,
) -> Release {
    let messages: Vec<&str> = commits.iter().map(|c| c.commit.message.as_str()).collect();
    let markdown = commits_to_markdown(&messages, repo, enhancer);
    let body = process_release_body(&markdown, repo, enhancer, HeadingPolicy::Preserve);

    Release::new(
        release_url(repo, &tag.name),
        repo,
        tag.name.as_str(),
        tag.name.as_str(),
        date,
        body,
    )
}

fn release_url(repo: &str, tag: &str) -> String {
    format!("https://github.com/{}/releases/tag/{}", repo, tag)
}

/// Convert a published GitHub release; `None` when it has no usable date
fn github_to_release(repo: &str, gh: GitHubRelease, enhancer: &CommitEnhancer) -> Option<Release> {
    let Some(date) = gh.published_at.as_deref().and_then(parse_date) else {
        warn!("Skipping {} {}: missing or invalid publish date", repo, gh.tag_name);
        return None;
    };

    let body = github_release_body(gh.body.as_deref().unwrap_or(""), repo, enhancer);
    let title = gh.name.unwrap_or_default();

    Some(Release::new(
        release_url(repo, &gh.tag_name),
        repo,
        gh.tag_name,
        title,
        date,
        body,
    ))
}

#[async_trait]
impl ReleaseSource for GitHubReleaseSource {
    fn kind(&self) -> SourceKind {
        SourceKind::GitHub
    }

    async fn fetch(&self, config: &SourceConfig, filter: Option<&RepoFilter>) -> Vec<Release> {
        if !config.enabled {
            return Vec::new();
        }
        if config.repos.is_empty() {
            warn!("No GitHub repositories configured, skipping GitHub releases");
            return Vec::new();
        }

        let client = self.client(config);
        let enhancer = CommitEnhancer::new().with_mentions(config.link_mentions.unwrap_or(true));

        let repos = config
            .repos
            .iter()
            .filter(|repo| passes(filter, self.kind(), repo));
        let results = join_all(repos.map(|repo| self.fetch_repo(&client, repo, &enhancer))).await;

        results.into_iter().flatten().collect()
    }
}
