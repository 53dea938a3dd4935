// Wallet release notes from the frontend release feed
use async_trait::async_trait;
use relwatch_api::{FeedRelease, ReleaseFeedClient};
use tracing::warn;

use super::{passes, FetchContext, ReleaseSource, SourceConfig, SourceKind};
use crate::enhance::CommitEnhancer;
use crate::models::{parse_date, Release, PLACEHOLDER_URL};
use crate::pipeline::{process_release_body, HeadingPolicy};
use crate::registry::RepoFilter;

pub struct ReleaseFeedSource {
    ctx: FetchContext,
}

impl ReleaseFeedSource {
    pub fn new(ctx: FetchContext) -> Self {
        Self { ctx }
    }
}

fn feed_repo(app: &str) -> String {
    format!("nimiq/{}", app.to_lowercase())
}

fn feed_to_release(entry: FeedRelease, enhancer: &CommitEnhancer) -> Option<Release> {
    let repo = feed_repo(&entry.app);
    let Some(date) = parse_date(&entry.date) else {
        warn!("Skipping {} {}: invalid date '{}'", repo, entry.version, entry.date);
        return None;
    };

    // Feed notes are always commit lists, headings or not
    let message = entry.message.as_deref().unwrap_or_default();
    let body = process_release_body(message, &repo, enhancer, HeadingPolicy::Regroup);
    Some(Release::new(
        PLACEHOLDER_URL,
        repo,
        entry.version.as_str(),
        entry.version.as_str(),
        date,
        body,
    ))
}

#[async_trait]
impl ReleaseSource for ReleaseFeedSource {
    fn kind(&self) -> SourceKind {
        SourceKind::ReleaseFeed
    }

    async fn fetch(&self, config: &SourceConfig, filter: Option<&RepoFilter>) -> Vec<Release> {
        if !config.enabled {
            return Vec::new();
        }

        let client =
            ReleaseFeedClient::new(self.ctx.endpoints.release_feed.clone(), &self.ctx.http);
        let entries = match client.fetch().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to fetch release feed: {}", e);
                return Vec::new();
            }
        };

        let enhancer = CommitEnhancer::new().with_mentions(config.link_mentions.unwrap_or(false));
        entries
            .into_iter()
            .filter(|entry| passes(filter, self.kind(), &feed_repo(&entry.app)))
            .filter_map(|entry| feed_to_release(entry, &enhancer))
            .collect()
    }
}
