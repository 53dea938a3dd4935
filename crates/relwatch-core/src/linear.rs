//! Weekly digest of Linear issues marked done.
//!
//! Issues completed in the window are grouped by team and project, handed
//! to the [`TextGenerator`] as XML, and the result is kept per week number
//! so the next few digests can call back to it.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use relwatch_api::{LinearClient, LinearIssue};
use relwatch_cache::CacheManager;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::models::parse_date;
use crate::summary::TextGenerator;
use crate::Result;

const KEY_PREFIX: &str = "weekly-linear-summary-";

/// Earlier digests handed to the generator
const PREVIOUS_WEEKS: u32 = 4;

/// Digests older than this many weeks are deleted on every run
const KEEP_WEEKS: u32 = 8;

const NO_PROJECT: &str = "No Project";

pub const LINEAR_SYSTEM_PROMPT: &str = "You write the weekly recap of what the Nimiq teams \
finished in Linear, for a Slack channel of developers. Start with \"This is week number [X], \
and here's what the teams shipped:\". Stay between 150 and 250 words, no markdown. Hop between \
teams instead of going through them one by one, keep the humor dry, and end on a punchline.";

#[derive(Debug, Clone, Serialize)]
pub struct ProjectIssues {
    pub name: String,
    pub issues: Vec<LinearIssue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamIssues {
    pub team: String,
    pub projects: Vec<ProjectIssues>,
}

impl TeamIssues {
    pub fn total(&self) -> usize {
        self.projects.iter().map(|p| p.issues.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub model: String,
    pub text: String,
}

/// One week's digest as stored in the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearWeeklySummary {
    pub week: u32,
    pub year: i32,
    pub date: DateTime<Utc>,
    pub issue_count: usize,
    pub summaries: Vec<ModelSummary>,
    /// Markdown report of every issue, grouped by team
    pub issues: String,
}

impl LinearWeeklySummary {
    pub fn text(&self) -> &str {
        self.summaries.first().map(|s| s.text.as_str()).unwrap_or("")
    }
}

/// Issues in a completed state with a completion time at or after `since`
pub fn done_since(issues: Vec<LinearIssue>, since: DateTime<Utc>) -> Vec<LinearIssue> {
    issues
        .into_iter()
        .filter(|issue| {
            issue.is_completed()
                && issue
                    .completed_at
                    .as_deref()
                    .and_then(parse_date)
                    .is_some_and(|at| at >= since)
        })
        .collect()
}

/// Team -> project -> issues, each level in order of first appearance
///
/// A project belongs to the team of its first issue.
pub fn group_issues(issues: Vec<LinearIssue>) -> Vec<TeamIssues> {
    let mut projects: Vec<(String, ProjectIssues)> = Vec::new();
    for issue in issues {
        let name = issue
            .project
            .as_ref()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| NO_PROJECT.to_string());
        match projects.iter_mut().find(|(_, p)| p.name == name) {
            Some((_, project)) => project.issues.push(issue),
            None => projects.push((
                issue.team.name.clone(),
                ProjectIssues {
                    name,
                    issues: vec![issue],
                },
            )),
        }
    }

    let mut teams: Vec<TeamIssues> = Vec::new();
    for (team, project) in projects {
        match teams.iter_mut().find(|t| t.team == team) {
            Some(existing) => existing.projects.push(project),
            None => teams.push(TeamIssues {
                team,
                projects: vec![project],
            }),
        }
    }
    teams
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Generator input: teams, projects and issues as nested XML
pub fn format_issues_for_llm(teams: &[TeamIssues]) -> String {
    let mut out = String::from("<teams>\n");
    for team in teams {
        out.push_str(&format!("  <team name=\"{}\">\n", escape_xml(&team.team)));
        for project in &team.projects {
            out.push_str(&format!("    <project name=\"{}\">\n", escape_xml(&project.name)));
            for issue in &project.issues {
                out.push_str("      <issue>\n");
                out.push_str(&format!(
                    "        <identifier>{}</identifier>\n",
                    escape_xml(&issue.identifier)
                ));
                out.push_str(&format!("        <title>{}</title>\n", escape_xml(&issue.title)));
                if let Some(description) = issue.description.as_deref().filter(|d| !d.is_empty()) {
                    out.push_str(&format!(
                        "        <description>{}</description>\n",
                        escape_xml(description)
                    ));
                }
                out.push_str("      </issue>\n");
            }
            out.push_str("    </project>\n");
        }
        out.push_str("  </team>\n");
    }
    out.push_str("</teams>");
    out
}

/// Markdown report, busiest team first
pub fn format_report(teams: &[TeamIssues], generated_on: NaiveDate) -> String {
    if teams.is_empty() {
        return "No issues completed this week.".to_string();
    }

    let mut sorted: Vec<&TeamIssues> = teams.iter().collect();
    sorted.sort_by_key(|t| std::cmp::Reverse(t.total()));

    let mut out = String::from("# Weekly Linear Issues Report\n\n");
    out.push_str(&format!("*Generated on {}*\n\n", generated_on.format("%B %-d, %Y")));

    for team in sorted {
        out.push_str(&format!("## {} ({} issues)\n\n", team.team, team.total()));
        for project in &team.projects {
            out.push_str(&format!("### {}\n\n", project.name));
            for issue in &project.issues {
                out.push_str(&format!(
                    "- [{}]({}): {}\n",
                    issue.identifier, issue.url, issue.title
                ));
            }
            out.push('\n');
        }
    }
    out
}

/// Week of the year, counting the partial week holding January 1st as week 1
pub fn week_number(now: DateTime<Utc>) -> u32 {
    let today = now.date_naive();
    let days = today.ordinal0();
    let jan_first = today - Duration::days(i64::from(days));
    let offset = jan_first.weekday().num_days_from_sunday();
    (days + offset + 1).div_ceil(7)
}

pub fn linear_summary_key(year: i32, week: u32) -> String {
    format!("{}{}-{}", KEY_PREFIX, year, week)
}

/// `(year, week)` from a key made by [`linear_summary_key`]
pub fn parse_linear_key(key: &str) -> Option<(i32, u32)> {
    let (year, week) = key.strip_prefix(KEY_PREFIX)?.split_once('-')?;
    Some((year.parse().ok()?, week.parse().ok()?))
}

/// The user message sent to the generator
pub fn build_linear_context(
    week: u32,
    year: i32,
    issues_xml: &str,
    previous: &[LinearWeeklySummary],
) -> String {
    let mut context = format!(
        "Current week: {} of {}\n\nCompleted Issues:\n\n{}",
        week, year, issues_xml
    );
    if !previous.is_empty() {
        let weeks: Vec<String> = previous
            .iter()
            .map(|s| format!("Week {}: {}", s.week, s.text()))
            .collect();
        context.push_str(
            "\n\nPrevious weeks for context (use for running jokes and references):\n\n",
        );
        context.push_str(&weeks.join("\n\n"));
    }
    context
}

pub struct LinearStore {
    cache: Arc<CacheManager>,
}

impl LinearStore {
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self { cache }
    }

    pub fn save(&self, summary: &LinearWeeklySummary) -> Result<()> {
        self.cache
            .set(&linear_summary_key(summary.year, summary.week), summary, None)?;
        Ok(())
    }

    pub fn load(&self, year: i32, week: u32) -> Result<Option<LinearWeeklySummary>> {
        Ok(self.cache.get(&linear_summary_key(year, week))?)
    }

    /// Digests of the weeks before `week` in the same year, most recent first
    pub fn previous(&self, year: i32, week: u32) -> Vec<LinearWeeklySummary> {
        (1..=PREVIOUS_WEEKS)
            .filter_map(|i| week.checked_sub(i).filter(|w| *w > 0))
            .filter_map(|w| match self.load(year, w) {
                Ok(summary) => summary,
                Err(e) => {
                    warn!("Skipping stored Linear digest for week {}: {}", w, e);
                    None
                }
            })
            .collect()
    }

    /// Delete the digests that fell out of the context window; returns how many went
    pub fn prune(&self, year: i32, week: u32) -> usize {
        (PREVIOUS_WEEKS + 1..=KEEP_WEEKS)
            .filter_map(|i| week.checked_sub(i).filter(|w| *w > 0))
            .filter(|w| {
                self.cache
                    .delete(&linear_summary_key(year, *w))
                    .unwrap_or_else(|e| {
                        warn!("Failed to delete Linear digest for week {}: {}", w, e);
                        false
                    })
            })
            .count()
    }
}

pub struct LinearDigest<G> {
    client: LinearClient,
    generator: G,
    model: String,
    clock: Arc<dyn Clock>,
    store: Option<LinearStore>,
    system_prompt: String,
}

impl<G: TextGenerator> LinearDigest<G> {
    pub fn new(
        client: LinearClient,
        generator: G,
        model: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            generator,
            model: model.into(),
            clock,
            store: None,
            system_prompt: LINEAR_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_store(mut self, store: LinearStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Completed issues from the last `days` days; upstream trouble means none
    pub async fn done_issues(&self, days: i64) -> Vec<LinearIssue> {
        let since = self.clock.now() - Duration::days(days);
        match self.client.completed_issues(&since.to_rfc3339()).await {
            Ok(issues) => {
                let total = issues.len();
                let done = done_since(issues, since);
                info!("{} done Linear issues (from {} fetched)", done.len(), total);
                done
            }
            Err(e) => {
                warn!("Failed to fetch Linear issues: {}", e);
                Vec::new()
            }
        }
    }

    /// Build, generate and store this week's digest
    ///
    /// `None` when nothing was completed. A generator failure is an error:
    /// there is no canned text for this digest.
    pub async fn run(&self, days: i64) -> Result<Option<LinearWeeklySummary>> {
        let issues = self.done_issues(days).await;
        if issues.is_empty() {
            info!("No Linear issues found for the past {} days", days);
            return Ok(None);
        }

        let now = self.clock.now();
        let (year, week) = (now.year(), week_number(now));
        let issue_count = issues.len();
        let teams = group_issues(issues);

        let previous = self
            .store
            .as_ref()
            .map(|store| store.previous(year, week))
            .unwrap_or_default();
        debug!("Week {} of {}, {} earlier digests", week, year, previous.len());

        let context = build_linear_context(week, year, &format_issues_for_llm(&teams), &previous);
        let text = self
            .generator
            .generate(&self.system_prompt, &context)
            .await?;

        let summary = LinearWeeklySummary {
            week,
            year,
            date: now,
            issue_count,
            summaries: vec![ModelSummary {
                model: self.model.clone(),
                text: text.trim().to_string(),
            }],
            issues: format_report(&teams, now.date_naive()),
        };

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&summary) {
                warn!("Failed to store Linear digest for week {}: {}", week, e);
            }
            let pruned = store.prune(year, week);
            if pruned > 0 {
                debug!("Pruned {} old Linear digests", pruned);
            }
        }

        Ok(Some(summary))
    }
}
