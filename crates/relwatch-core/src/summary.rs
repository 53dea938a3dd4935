//! Weekly chat summary.
//!
//! The text itself comes from a [`TextGenerator`]. This module picks the
//! releases of the week, assembles the generator input (with earlier weeks
//! attached for running jokes), falls back to canned text when the
//! generator lets us down, and keeps past summaries in the KV cache.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use relwatch_cache::CacheManager;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::extract::flatten_text;
use crate::models::Release;
use crate::Result;

/// Days of releases one summary covers
pub const WINDOW_DAYS: i64 = 7;

/// Earlier summaries handed to the generator
const PREVIOUS_WEEKS: i64 = 4;

/// Body characters per release in the generator input
const EXCERPT_CHARS: usize = 300;

/// Anything shorter is treated as a failed generation
const MIN_SUMMARY_CHARS: usize = 20;

const KEY_PREFIX: &str = "weekly-summary";

pub const DEFAULT_SYSTEM_PROMPT: &str = "Write a short, dry-humored weekly recap for a Slack \
channel of what shipped across the Nimiq projects this week. Keep it under 250 words, group \
similar changes, and highlight what users will notice.";

pub const CRICKETS: &str = "This week in Nimiq: Crickets. Not even the bugs bothered showing up. \
Everyone's apparently taking a well-deserved break from shipping. The calm before the storm, or \
just peak efficiency? You decide.";

/// The AI collaborator
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_message: &str) -> Result<String>;
}

/// A generated (or fallback) summary as stored in the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklySummary {
    /// Sunday the week starts on
    pub week_of: NaiveDate,
    pub text: String,
    pub release_count: usize,
    pub generated_at: DateTime<Utc>,
}

/// `"{repo} {tag}: {start of body}..."`
pub fn format_release_for_ai(release: &Release) -> String {
    let text = flatten_text(&release.body);
    let excerpt: String = text.chars().take(EXCERPT_CHARS).collect();
    format!("{} {}: {}...", release.repo, release.tag, excerpt)
}

/// Releases dated within the last `days` days
pub fn recent_releases(releases: &[Release], now: DateTime<Utc>, days: i64) -> Vec<Release> {
    let cutoff = now - Duration::days(days);
    releases
        .iter()
        .filter(|r| r.date >= cutoff)
        .cloned()
        .collect()
}

/// The user message sent to the generator
pub fn build_summary_context(releases: &[Release], previous: &[WeeklySummary]) -> String {
    let formatted: Vec<String> = releases.iter().map(format_release_for_ai).collect();
    let mut context = format!(
        "Here are the releases from this week:\n\n{}",
        formatted.join("\n\n")
    );

    if !previous.is_empty() {
        let weeks: Vec<String> = previous
            .iter()
            .map(|s| format!("Week of {}: {}", s.week_of, s.text))
            .collect();
        context.push_str(
            "\n\nPrevious weeks for context (use for running jokes and references):\n\n",
        );
        context.push_str(&weeks.join("\n\n"));
    }

    context
}

/// Used when the generator fails or comes back with next to nothing
pub fn fallback_summary(releases: &[Release]) -> String {
    let mut projects: Vec<&str> = Vec::new();
    for release in releases {
        let name = release.repo.rsplit('/').next().unwrap_or(&release.repo);
        if !projects.contains(&name) {
            projects.push(name);
        }
    }

    format!(
        "This week in Nimiq: {} releases across {}. The team's been busy shipping updates while \
         I was having technical difficulties crafting witty commentary. Sometimes the robots need \
         a coffee break too.",
        releases.len(),
        projects.join(", ")
    )
}

/// Sunday on or before `now`
pub fn week_of(now: DateTime<Utc>) -> NaiveDate {
    let today = now.date_naive();
    today - Duration::days(i64::from(today.weekday().num_days_from_sunday()))
}

pub fn summary_key(week_of: NaiveDate) -> String {
    format!("{}:{}", KEY_PREFIX, week_of.format("%Y-%m-%d"))
}

/// Week start from `weekly-summary:YYYY-MM-DD` or a bare `YYYY-MM-DD`
pub fn parse_summary_key(key: &str) -> Option<NaiveDate> {
    let date = match key.split_once(':') {
        Some((prefix, date)) if prefix == KEY_PREFIX => date,
        Some(_) => return None,
        None => key,
    };
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()
}

/// Past summaries, one entry per week
pub struct SummaryStore {
    cache: Arc<CacheManager>,
}

impl SummaryStore {
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self { cache }
    }

    pub fn save(&self, summary: &WeeklySummary) -> Result<()> {
        self.cache
            .set(&summary_key(summary.week_of), summary, None)?;
        Ok(())
    }

    pub fn load(&self, week_of: NaiveDate) -> Result<Option<WeeklySummary>> {
        Ok(self.cache.get(&summary_key(week_of))?)
    }

    /// Summaries of the weeks before `week_of`, most recent first.
    /// Unreadable entries are skipped.
    pub fn previous(&self, week_of: NaiveDate) -> Vec<WeeklySummary> {
        (1..=PREVIOUS_WEEKS)
            .filter_map(|i| {
                let week = week_of - Duration::weeks(i);
                match self.load(week) {
                    Ok(summary) => summary,
                    Err(e) => {
                        warn!("Skipping stored summary for week of {}: {}", week, e);
                        None
                    }
                }
            })
            .collect()
    }
}

/// What the generator gets to see
#[derive(Debug, Clone)]
pub struct SummaryInput {
    pub week_of: NaiveDate,
    pub releases: Vec<Release>,
    pub context: String,
}

pub struct WeeklySummarizer<G> {
    generator: G,
    store: Option<SummaryStore>,
    clock: Arc<dyn Clock>,
    system_prompt: String,
}

impl<G: TextGenerator> WeeklySummarizer<G> {
    pub fn new(generator: G, clock: Arc<dyn Clock>) -> Self {
        Self {
            generator,
            store: None,
            clock,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_store(mut self, store: SummaryStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Pick this week's releases and build the generator input
    pub fn prepare(&self, releases: &[Release], days: i64) -> SummaryInput {
        let now = self.clock.now();
        let week_of = week_of(now);
        let recent = recent_releases(releases, now, days);
        let previous = self
            .store
            .as_ref()
            .map(|store| store.previous(week_of))
            .unwrap_or_default();
        debug!(
            "{} releases in the last {} days, {} earlier summaries",
            recent.len(),
            days,
            previous.len()
        );

        SummaryInput {
            week_of,
            context: build_summary_context(&recent, &previous),
            releases: recent,
        }
    }

    /// Produce this week's summary and store it. Never fails: generator
    /// trouble falls back to canned text and store trouble is logged.
    pub async fn summarize(&self, releases: &[Release]) -> WeeklySummary {
        let input = self.prepare(releases, WINDOW_DAYS);

        let text = if input.releases.is_empty() {
            info!("No releases this week");
            CRICKETS.to_string()
        } else {
            match self
                .generator
                .generate(&self.system_prompt, &input.context)
                .await
            {
                Ok(text) if text.trim().chars().count() >= MIN_SUMMARY_CHARS => {
                    text.trim().to_string()
                }
                Ok(_) => {
                    warn!("Generated summary is too short or empty, using fallback");
                    fallback_summary(&input.releases)
                }
                Err(e) => {
                    warn!("Summary generation failed, using fallback: {}", e);
                    fallback_summary(&input.releases)
                }
            }
        };

        let summary = WeeklySummary {
            week_of: input.week_of,
            text,
            release_count: input.releases.len(),
            generated_at: self.clock.now(),
        };

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&summary) {
                warn!("Failed to store summary for week of {}: {}", summary.week_of, e);
            }
        }

        summary
    }
}
