// npm package versions as releases
//
// The registry has no changelog text, so each version gets a two-line body
// naming it and the version before it.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use relwatch_api::{NpmClient, NpmPackage};
use tracing::{debug, warn};

use super::{passes, FetchContext, ReleaseSource, SourceConfig, SourceKind};
use crate::markup::parse_markdown;
use crate::models::{parse_date, Release};
use crate::registry::RepoFilter;

/// Most recent versions listed per package
const MAX_VERSIONS: usize = 10;

pub struct NpmSource {
    ctx: FetchContext,
}

impl NpmSource {
    pub fn new(ctx: FetchContext) -> Self {
        Self { ctx }
    }

    async fn fetch_package(&self, client: &NpmClient, name: &str) -> Vec<Release> {
        match client.package_info(name).await {
            Ok(package) => package_to_releases(name, &package),
            Err(e) => {
                warn!("Failed to fetch npm releases for {}: {}", name, e);
                Vec::new()
            }
        }
    }
}

fn changelog(version: &str, previous: Option<&str>) -> String {
    let mut lines = vec![format!("- Updated to version {}", version)];
    if let Some(previous) = previous {
        lines.push(format!("- Previous version: {}", previous));
    }
    lines.join("\n")
}

/// Newest published versions first, at most [`MAX_VERSIONS`]
fn recent_versions(package: &NpmPackage) -> Vec<(&str, DateTime<Utc>)> {
    let mut versions: Vec<(&str, DateTime<Utc>)> = package
        .published_versions()
        .into_iter()
        .filter_map(|(version, time)| parse_date(time).map(|t| (version, t)))
        .collect();

    versions.sort_by(|a, b| b.1.cmp(&a.1));
    versions.truncate(MAX_VERSIONS);
    versions
}

fn package_to_releases(name: &str, package: &NpmPackage) -> Vec<Release> {
    let versions = recent_versions(package);
    if versions.is_empty() {
        warn!("No version information found for package {}", name);
        return Vec::new();
    }
    debug!("{} recent versions of {}", versions.len(), name);

    versions
        .iter()
        .enumerate()
        .map(|(i, (version, published))| {
            let previous = versions.get(i + 1).map(|(v, _)| *v);
            Release::new(
                format!("https://www.npmjs.com/package/{}/v/{}", name, version),
                format!("npm/{}", name),
                *version,
                format!("{}@{}", name, version),
                *published,
                parse_markdown(&changelog(version, previous)),
            )
        })
        .collect()
}

#[async_trait]
impl ReleaseSource for NpmSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Npm
    }

    async fn fetch(&self, config: &SourceConfig, filter: Option<&RepoFilter>) -> Vec<Release> {
        if !config.enabled {
            return Vec::new();
        }
        if config.packages.is_empty() {
            warn!("No npm packages configured, skipping npm releases");
            return Vec::new();
        }

        let client =
            NpmClient::with_registry(self.ctx.endpoints.npm_registry.clone(), &self.ctx.http);

        let packages = config
            .packages
            .iter()
            .filter(|name| passes(filter, self.kind(), &format!("npm/{}", name)));
        let results = join_all(packages.map(|name| self.fetch_package(&client, name))).await;

        results.into_iter().flatten().collect()
    }
}
