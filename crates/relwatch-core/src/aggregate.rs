// Fan out over every source group, merge, filter, sort, cap
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use relwatch_cache::CacheManager;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::models::{Release, ReleaseContext};
use crate::registry::{flatten_source_groups, FetchUnit, RepoFilter, SourceRegistry};
use crate::Result;

/// The "list releases" entry point
pub struct ReleaseAggregator {
    config: Config,
    registry: SourceRegistry,
}

impl ReleaseAggregator {
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Self {
        let registry = SourceRegistry::new(config.fetch_context(clock));
        Self { config, registry }
    }

    pub fn with_registry(config: Config, registry: SourceRegistry) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The fetch units a context would run
    pub fn units(&self, context: ReleaseContext) -> Result<Vec<FetchUnit>> {
        flatten_source_groups(&self.config.sources, context)
    }

    /// Fetch everything visible in `context`, newest first
    ///
    /// Only a bad filter or a bad source group is an error. Upstream
    /// failures shrink the result instead.
    pub async fn list_releases(
        &self,
        context: ReleaseContext,
        filter: Option<&str>,
    ) -> Result<Vec<Release>> {
        let filter = RepoFilter::parse(filter.unwrap_or(""))?;
        let units = self.units(context)?;
        info!("Fetching releases from {} sources", units.len());

        let fetches = units
            .iter()
            .map(|unit| self.fetch_unit(unit, filter.as_ref()));
        let releases: Vec<Release> = join_all(fetches).await.into_iter().flatten().collect();

        let merged = merge_releases(
            releases,
            self.config.excludes(context),
            self.config.aggregation.max_releases,
        );
        debug!("{} releases after merge", merged.len());
        Ok(merged)
    }

    async fn fetch_unit(&self, unit: &FetchUnit, filter: Option<&RepoFilter>) -> Vec<Release> {
        let Some(source) = self.registry.get(unit.kind) else {
            warn!("No fetcher registered for {}, skipping {}", unit.kind, unit.group_label);
            return Vec::new();
        };

        let deadline = self.config.aggregation.source_timeout();
        let releases = match timeout(deadline, source.fetch(&unit.config, filter)).await {
            Ok(releases) => releases,
            Err(_) => {
                warn!(
                    "{} source '{}' timed out after {}s",
                    unit.kind,
                    unit.group_label,
                    deadline.as_secs()
                );
                return Vec::new();
            }
        };

        releases
            .into_iter()
            .filter(|r| filter.map_or(true, |f| f.matches(unit.kind, &r.repo)))
            .map(|r| r.with_group_label(unit.group_label.as_str()))
            .collect()
    }
}

/// Drop excluded repos, sort by date descending and keep the first `max`
pub fn merge_releases(releases: Vec<Release>, excludes: &[String], max: usize) -> Vec<Release> {
    let mut merged: Vec<Release> = releases
        .into_iter()
        .filter(|r| !excludes.iter().any(|ex| r.repo.contains(ex.as_str())))
        .collect();

    merged.sort_by(|a, b| b.date.cmp(&a.date));
    merged.truncate(max);
    merged
}

/// Aggregator that checks the cache before fetching
pub struct CachedAggregator {
    inner: ReleaseAggregator,
    cache: Option<Arc<CacheManager>>,
    ttl: Duration,
}

impl CachedAggregator {
    pub fn new(inner: ReleaseAggregator) -> Self {
        let ttl = Duration::from_secs(inner.config().aggregation.cache_ttl_secs);
        Self {
            inner,
            cache: None,
            ttl,
        }
    }

    pub fn with_cache(inner: ReleaseAggregator, cache: Arc<CacheManager>) -> Self {
        Self {
            cache: Some(cache),
            ..Self::new(inner)
        }
    }

    pub fn inner(&self) -> &ReleaseAggregator {
        &self.inner
    }

    pub fn cache_key(context: ReleaseContext, filter: Option<&RepoFilter>) -> String {
        format!(
            "releases:{}:{}",
            context,
            filter.map(RepoFilter::as_str).unwrap_or("")
        )
    }

    /// Same contract as [`ReleaseAggregator::list_releases`]; cache trouble
    /// only costs a live fetch
    pub async fn list_releases(
        &self,
        context: ReleaseContext,
        filter: Option<&str>,
    ) -> Result<Vec<Release>> {
        let parsed = RepoFilter::parse(filter.unwrap_or(""))?;
        let key = Self::cache_key(context, parsed.as_ref());

        if let Some(cache) = &self.cache {
            debug!("Checking cache for {}", key);
            match cache.get::<Vec<Release>>(&key) {
                Ok(Some(releases)) => {
                    info!("Cache hit! {} releases", releases.len());
                    return Ok(releases);
                }
                Ok(None) => debug!("Cache miss for {}", key),
                Err(e) => warn!("Cache read failed for {}: {}", key, e),
            }
        }

        let releases = self.inner.list_releases(context, filter).await?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set(&key, &releases, Some(self.ttl)) {
                warn!("Failed to cache {}: {}", key, e);
            }
        }

        Ok(releases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::Node;
    use crate::registry::{SourceGroup, SourceItem};
    use crate::sources::{ReleaseSource, SourceConfig, SourceKind};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn release(repo: &str, day: u32) -> Release {
        Release::new(
            format!("https://example.com/{}", day),
            repo,
            format!("v{}", day),
            "",
            Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            Node::empty_root(),
        )
    }

    /// Returns one release per configured repo and counts its calls
    struct CountingSource {
        kind: SourceKind,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReleaseSource for CountingSource {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn fetch(&self, config: &SourceConfig, _: Option<&RepoFilter>) -> Vec<Release> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !config.enabled {
                return Vec::new();
            }
            config
                .repos
                .iter()
                .enumerate()
                .map(|(i, repo)| release(repo, i as u32 + 1))
                .collect()
        }
    }

    struct SlowSource;

    #[async_trait]
    impl ReleaseSource for SlowSource {
        fn kind(&self) -> SourceKind {
            SourceKind::GitLab
        }

        async fn fetch(&self, _: &SourceConfig, _: Option<&RepoFilter>) -> Vec<Release> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            vec![release("slow/project", 9)]
        }
    }

    fn group(label: &str, shorthand: &str) -> SourceGroup {
        SourceGroup::new(label, SourceItem::Shorthand(shorthand.to_string()))
    }

    fn aggregator(sources: Vec<SourceGroup>) -> (ReleaseAggregator, Arc<CountingSource>) {
        let counting = Arc::new(CountingSource {
            kind: SourceKind::GitHub,
            calls: AtomicUsize::new(0),
        });
        let mut registry = SourceRegistry::empty();
        registry.register(counting.clone());

        let mut config = Config {
            sources,
            ..Default::default()
        };
        config.aggregation.exclude_from_releases = vec!["nimiq/internal".to_string()];
        (ReleaseAggregator::with_registry(config, registry), counting)
    }

    #[test]
    fn test_merge_sorts_excludes_and_caps() {
        let releases = vec![release("a/x", 1), release("b/internal", 3), release("c/z", 2)];
        let merged = merge_releases(releases, &["internal".to_string()], 1);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].repo, "c/z");
    }

    #[tokio::test]
    async fn test_group_labels_and_context_excludes() {
        let (aggregator, _) = aggregator(vec![
            group("Wallet", "gh:nimiq/wallet"),
            group("Internal", "gh:nimiq/internal"),
        ]);

        let releases = aggregator
            .list_releases(ReleaseContext::Releases, None)
            .await
            .unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].group_label.as_deref(), Some("Wallet"));

        // The summary context has its own exclude list
        let releases = aggregator
            .list_releases(ReleaseContext::Summary, None)
            .await
            .unwrap();
        assert_eq!(releases.len(), 2);
    }

    #[tokio::test]
    async fn test_filter_applies_to_the_merged_list() {
        let (aggregator, _) = aggregator(vec![
            group("Wallet", "gh:nimiq/wallet"),
            group("Hub", "gh:nimiq/hub"),
        ]);

        let releases = aggregator
            .list_releases(ReleaseContext::Releases, Some("gh:hub"))
            .await
            .unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].repo, "nimiq/hub");

        let err = aggregator
            .list_releases(ReleaseContext::Releases, Some("gh:"))
            .await
            .unwrap_err();
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn test_missing_fetcher_is_skipped() {
        let (aggregator, _) = aggregator(vec![
            group("Wallet", "gh:nimiq/wallet"),
            group("Package", "npm:left-pad"),
        ]);

        let releases = aggregator
            .list_releases(ReleaseContext::Releases, None)
            .await
            .unwrap();
        assert_eq!(releases.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_source_times_out() {
        let mut registry = SourceRegistry::empty();
        registry.register(Arc::new(SlowSource));
        registry.register(Arc::new(CountingSource {
            kind: SourceKind::GitHub,
            calls: AtomicUsize::new(0),
        }));

        let mut config = Config {
            sources: vec![
                group("Wallet", "gh:nimiq/wallet"),
                SourceGroup::new(
                    "Slow",
                    SourceItem::Explicit {
                        kind: SourceKind::GitLab,
                        config: SourceConfig::default(),
                    },
                ),
            ],
            ..Default::default()
        };
        config.aggregation.source_timeout_secs = 5;

        let releases = ReleaseAggregator::with_registry(config, registry)
            .list_releases(ReleaseContext::Releases, None)
            .await
            .unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].repo, "nimiq/wallet");
    }

    #[tokio::test]
    async fn test_cached_aggregator_serves_from_cache() {
        let (aggregator, counting) = aggregator(vec![group("Wallet", "gh:nimiq/wallet")]);
        let cache = Arc::new(CacheManager::in_memory().unwrap());
        let cached = CachedAggregator::with_cache(aggregator, cache.clone());

        let first = cached
            .list_releases(ReleaseContext::Releases, Some("Wallet"))
            .await
            .unwrap();
        let second = cached
            .list_releases(ReleaseContext::Releases, Some("wallet"))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);

        let key = CachedAggregator::cache_key(
            ReleaseContext::Releases,
            RepoFilter::parse("wallet").unwrap().as_ref(),
        );
        assert_eq!(key, "releases:releases:wallet");
        assert!(cache.delete(&key).unwrap());

        cached
            .list_releases(ReleaseContext::Releases, Some("wallet"))
            .await
            .unwrap();
        assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cached_aggregator_without_cache_always_fetches() {
        let (aggregator, counting) = aggregator(vec![group("Wallet", "gh:nimiq/wallet")]);
        let cached = CachedAggregator::new(aggregator);

        for _ in 0..2 {
            cached
                .list_releases(ReleaseContext::Releases, None)
                .await
                .unwrap();
        }
        assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
    }
}
