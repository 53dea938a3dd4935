// Source groups, shorthand resolution and the kind -> fetcher table
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::ReleaseContext;
use crate::sources::{
    BlogSource, FetchContext, GitHubIssueSource, GitHubPullRequestSource, GitHubReleaseSource,
    GitLabReleaseSource, NpmSource, ReleaseFeedSource, ReleaseSource, SourceConfig, SourceKind,
};
use crate::{Error, Result};

/// What a group points at: `gh:owner/repo` style shorthand or a full table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceItem {
    Shorthand(String),
    Explicit {
        kind: SourceKind,
        #[serde(default)]
        config: SourceConfig,
    },
}

fn default_true() -> bool {
    true
}

/// A labelled source with its visibility flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceGroup {
    pub label: String,

    pub source: SourceItem,

    /// Overrides whatever token the source config carries
    #[serde(default)]
    pub token: Option<String>,

    /// Environment variable to read the token from when `token` is unset
    #[serde(default)]
    pub token_env: Option<String>,

    #[serde(default = "default_true", alias = "showInReleases")]
    pub show_in_releases: bool,

    #[serde(default = "default_true", alias = "showInSummary")]
    pub show_in_summary: bool,
}

impl SourceGroup {
    pub fn new(label: impl Into<String>, source: SourceItem) -> Self {
        Self {
            label: label.into(),
            source,
            token: None,
            token_env: None,
            show_in_releases: true,
            show_in_summary: true,
        }
    }

    /// Inline token first, then the named environment variable
    pub fn token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| {
                self.token_env
                    .as_deref()
                    .and_then(|var| std::env::var(var).ok())
            })
            .filter(|t| !t.trim().is_empty())
    }

    pub fn is_visible(&self, context: ReleaseContext) -> bool {
        match context {
            ReleaseContext::Releases => self.show_in_releases,
            ReleaseContext::Summary => self.show_in_summary,
        }
    }

    /// The kind and effective config this group fetches with
    pub fn resolve(&self) -> Result<(SourceKind, SourceConfig)> {
        normalize_source_item(&self.source, self.token().as_deref())
            .map_err(|e| Error::ConfigError(format!("Source group '{}': {}", self.label, e)))
    }
}

/// Resolve a source item into a kind and a config carrying the group token
pub fn normalize_source_item(
    item: &SourceItem,
    group_token: Option<&str>,
) -> Result<(SourceKind, SourceConfig)> {
    let (kind, mut config) = match item {
        SourceItem::Explicit { kind, config } => (*kind, config.clone()),
        SourceItem::Shorthand(shorthand) => parse_shorthand(shorthand)?,
    };

    if let Some(token) = group_token.filter(|t| !t.trim().is_empty()) {
        config.token = Some(token.to_string());
    }

    Ok((kind, config))
}

fn parse_shorthand(shorthand: &str) -> Result<(SourceKind, SourceConfig)> {
    let (prefix, target) = shorthand.trim().split_once(':').ok_or_else(|| {
        Error::ConfigError(format!(
            "'{}' is not a shorthand source, expected prefix:target",
            shorthand
        ))
    })?;

    let kind = SourceKind::from_shorthand(prefix)
        .ok_or_else(|| Error::ConfigError(format!("Unknown source prefix '{}'", prefix)))?;

    let target = target.trim();
    if target.is_empty() {
        return Err(Error::ConfigError(format!(
            "Shorthand '{}' has no target",
            shorthand
        )));
    }

    let config = match kind {
        SourceKind::Npm => SourceConfig {
            packages: vec![target.to_string()],
            ..Default::default()
        },
        _ => {
            let valid = target
                .split_once('/')
                .is_some_and(|(owner, name)| !owner.is_empty() && !name.is_empty());
            if !valid {
                return Err(Error::ConfigError(format!(
                    "Expected owner/repo in '{}'",
                    shorthand
                )));
            }
            SourceConfig {
                repos: vec![target.to_string()],
                ..Default::default()
            }
        }
    };

    Ok((kind, config))
}

/// One fetch the aggregator runs
#[derive(Debug, Clone, PartialEq)]
pub struct FetchUnit {
    pub kind: SourceKind,
    pub config: SourceConfig,
    pub group_label: String,
}

/// Expand the groups visible in `context` into fetch-ready units
pub fn flatten_source_groups(
    groups: &[SourceGroup],
    context: ReleaseContext,
) -> Result<Vec<FetchUnit>> {
    groups
        .iter()
        .filter(|group| group.is_visible(context))
        .map(|group| {
            let (kind, config) = group.resolve()?;
            Ok(FetchUnit {
                kind,
                config,
                group_label: group.label.clone(),
            })
        })
        .collect()
}

/// Caller supplied repo filter: `wallet`, or `gh:wallet` to pin the kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFilter {
    raw: String,
    compound: Option<(SourceKind, String)>,
}

impl RepoFilter {
    /// `None` for a blank filter
    pub fn parse(input: &str) -> Result<Option<Self>> {
        let raw = input.trim().to_string();
        if raw.is_empty() {
            return Ok(None);
        }

        let compound = match raw.split_once(':') {
            Some((prefix, rest)) => match prefix.to_lowercase().parse::<SourceKind>() {
                Ok(kind) => {
                    let rest = rest.trim();
                    if rest.is_empty() {
                        return Err(Error::InvalidFilter(format!(
                            "'{}' names a source kind but no repo",
                            input.trim()
                        )));
                    }
                    Some((kind, rest.to_string()))
                }
                Err(_) => None,
            },
            None => None,
        };

        Ok(Some(Self { raw, compound }))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whole-string substring, or kind plus substring for the compound form
    ///
    /// Repo matching is case-sensitive; only the kind prefix is not.
    pub fn matches(&self, kind: SourceKind, repo: &str) -> bool {
        if repo.contains(&self.raw) {
            return true;
        }
        self.compound
            .as_ref()
            .is_some_and(|(k, needle)| *k == kind && repo.contains(needle.as_str()))
    }
}

impl fmt::Display for RepoFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Kind -> fetcher lookup
///
/// Built-in fetchers are registered for every kind. `register` swaps one
/// out, which is how tests plug in fakes.
pub struct SourceRegistry {
    sources: HashMap<SourceKind, Arc<dyn ReleaseSource>>,
}

impl SourceRegistry {
    pub fn new(ctx: FetchContext) -> Self {
        let sources = SourceKind::ALL
            .into_iter()
            .map(|kind| (kind, Self::builtin(kind, ctx.clone())))
            .collect();
        Self { sources }
    }

    /// Registry with nothing in it
    pub fn empty() -> Self {
        Self {
            sources: HashMap::new(),
        }
    }

    fn builtin(kind: SourceKind, ctx: FetchContext) -> Arc<dyn ReleaseSource> {
        match kind {
            SourceKind::GitHub => Arc::new(GitHubReleaseSource::new(ctx)),
            SourceKind::GitLab => Arc::new(GitLabReleaseSource::new(ctx)),
            SourceKind::Npm => Arc::new(NpmSource::new(ctx)),
            SourceKind::GitHubPullRequests => Arc::new(GitHubPullRequestSource::new(ctx)),
            SourceKind::ReleaseFeed => Arc::new(ReleaseFeedSource::new(ctx)),
            SourceKind::Blog => Arc::new(BlogSource::new(ctx)),
            SourceKind::GitHubIssues => Arc::new(GitHubIssueSource::new(ctx)),
        }
    }

    pub fn register(&mut self, source: Arc<dyn ReleaseSource>) {
        debug!("Registering {} source", source.kind());
        self.sources.insert(source.kind(), source);
    }

    pub fn get(&self, kind: SourceKind) -> Option<Arc<dyn ReleaseSource>> {
        self.sources.get(&kind).cloned()
    }
}
