// Merged pull requests, bundled into synthetic weekly releases
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, TimeZone, Utc};
use futures::future::join_all;
use relwatch_api::{GitHubClient, GitHubPullRequest, PullRequestQuery, MAX_PAGES};
use tracing::{debug, error, warn};

use super::{passes, FetchContext, ReleaseSource, SourceConfig, SourceKind};
use crate::markup::Node;
use crate::models::{parse_date, Release};
use crate::registry::RepoFilter;

/// Rolling window of merged pull requests
const WINDOW_DAYS: i64 = 7;

/// Pull requests per synthetic release
const MAX_PER_RELEASE: usize = 3;

const MAX_TITLE_CHARS: usize = 100;

/// A pull request that made it through the merge and date checks
#[derive(Debug, Clone, PartialEq)]
pub struct MergedPullRequest {
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub url: String,
    pub merged_at: DateTime<Utc>,
}

pub struct GitHubPullRequestSource {
    ctx: FetchContext,
}

impl GitHubPullRequestSource {
    pub fn new(ctx: FetchContext) -> Self {
        Self { ctx }
    }

    /// Seven days back, or `since` when that is more recent
    fn cutoff(&self, config: &SourceConfig) -> DateTime<Utc> {
        let window = self.ctx.clock.now() - Duration::days(WINDOW_DAYS);
        match config.since.as_deref().and_then(parse_date) {
            Some(since) if since > window => since,
            _ => window,
        }
    }

    async fn fetch_repo(
        &self,
        client: &GitHubClient,
        repo: &str,
        query: &PullRequestQuery,
        cutoff: DateTime<Utc>,
        branches: Option<&[String]>,
    ) -> Vec<MergedPullRequest> {
        // Stopping at the first stale item is only sound when results are newest first
        let stop_early = query.is_newest_first();
        let mut merged = Vec::new();

        for page in 1..=MAX_PAGES {
            let pulls = match client
                .list_pull_requests(repo, &query.clone().page(page))
                .await
            {
                Ok(pulls) => pulls,
                Err(e) => {
                    error!("Failed to fetch pull requests for {}: {}", repo, e);
                    break;
                }
            };

            let count = pulls.len();
            let mut reached_cutoff = false;
            for pr in pulls {
                if stop_early && last_activity(&pr).is_some_and(|at| at < cutoff) {
                    reached_cutoff = true;
                    break;
                }
                if let Some(pr) = to_merged(repo, pr, cutoff, branches) {
                    merged.push(pr);
                }
            }

            if reached_cutoff || count < query.per_page as usize {
                break;
            }
            if page == MAX_PAGES {
                warn!("Stopped paging pull requests for {} after {} pages", repo, MAX_PAGES);
            }
        }

        debug!("{} merged pull requests in window for {}", merged.len(), repo);
        merged
    }
}

/// Updated time, which is never earlier than the merge time
fn last_activity(pr: &GitHubPullRequest) -> Option<DateTime<Utc>> {
    pr.updated_at
        .as_deref()
        .or(pr.merged_at.as_deref())
        .and_then(parse_date)
}

fn to_merged(
    repo: &str,
    pr: GitHubPullRequest,
    cutoff: DateTime<Utc>,
    branches: Option<&[String]>,
) -> Option<MergedPullRequest> {
    let merged_at = pr.merged_at.as_deref().and_then(parse_date)?;
    if merged_at < cutoff {
        return None;
    }
    if let Some(branches) = branches.filter(|b| !b.is_empty()) {
        let base = pr.base_branch()?;
        if !branches.iter().any(|b| b == base) {
            return None;
        }
    }

    Some(MergedPullRequest {
        repo: repo.to_string(),
        number: pr.number,
        title: pr.title,
        url: pr.html_url,
        merged_at,
    })
}

/// Sunday on or before `date`
fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_sunday() as i64)
}

fn truncate_title(title: &str) -> String {
    if title.chars().count() <= MAX_TITLE_CHARS {
        return title.to_string();
    }
    let mut short: String = title.chars().take(MAX_TITLE_CHARS - 3).collect();
    short.push_str("...");
    short
}

/// Bundle pull requests into releases of at most three per week
///
/// Weeks start on Sunday at midnight in `tz`. Pull requests are taken newest
/// first and a new release starts whenever the week changes or the current
/// one is full. Each release borrows its link, repo and date from its newest
/// pull request.
pub fn group_into_weekly_releases<Tz: TimeZone>(
    mut pulls: Vec<MergedPullRequest>,
    tz: &Tz,
) -> Vec<Release> {
    pulls.sort_by(|a, b| b.merged_at.cmp(&a.merged_at));

    let mut weeks: Vec<(NaiveDate, Vec<MergedPullRequest>)> = Vec::new();
    for pr in pulls {
        let week = week_start(pr.merged_at.with_timezone(tz).date_naive());
        match weeks.last_mut() {
            Some((current, items)) if *current == week && items.len() < MAX_PER_RELEASE => {
                items.push(pr)
            }
            _ => weeks.push((week, vec![pr])),
        }
    }

    weeks
        .into_iter()
        .filter_map(|(week, items)| {
            let first = items.first()?;
            let title = items
                .iter()
                .map(|pr| pr.title.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            let body = Node::root(vec![Node::element(
                "ul",
                items
                    .iter()
                    .map(|pr| Node::element("li", vec![Node::text(pr.title.as_str())]))
                    .collect(),
            )]);

            Some(Release::new(
                first.url.as_str(),
                first.repo.as_str(),
                format!("Week of {}", week.format("%Y-%m-%d")),
                truncate_title(&title),
                first.merged_at,
                body,
            ))
        })
        .collect()
}

#[async_trait]
impl ReleaseSource for GitHubPullRequestSource {
    fn kind(&self) -> SourceKind {
        SourceKind::GitHubPullRequests
    }

    async fn fetch(&self, config: &SourceConfig, filter: Option<&RepoFilter>) -> Vec<Release> {
        if !config.enabled {
            return Vec::new();
        }
        if config.repos.is_empty() {
            warn!("No repositories configured, skipping GitHub pull requests");
            return Vec::new();
        }

        let client = GitHubClient::with_base_url(
            config.token().map(str::to_string),
            self.ctx.endpoints.github_api.clone(),
            &self.ctx.http,
        );
        let query = PullRequestQuery {
            state: config.state.clone().unwrap_or_else(|| "closed".to_string()),
            ..Default::default()
        };
        let cutoff = self.cutoff(config);

        let repos = config
            .repos
            .iter()
            .filter(|repo| passes(filter, self.kind(), repo));
        let results = join_all(repos.map(|repo| {
            let branches = config.branches.get(repo).map(Vec::as_slice);
            self.fetch_repo(&client, repo, &query, cutoff, branches)
        }))
        .await;

        group_into_weekly_releases(results.into_iter().flatten().collect(), &Local)
    }
}
