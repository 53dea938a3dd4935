// Blog posts scraped from the public blog index
use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use futures::future::join_all;
use regex::Regex;
use relwatch_api::BlogClient;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use super::{passes, FetchContext, ReleaseSource, SourceConfig, SourceKind};
use crate::markup::Node;
use crate::models::{parse_date, Release};
use crate::registry::RepoFilter;

pub const BLOG_REPO: &str = "Nimiq Blog";

/// Posts read from the top of the index
const MAX_POSTS: usize = 8;

static LINKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("Invalid selector"));
static HEADING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1").expect("Invalid selector"));
static TIME: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("time").expect("Invalid selector"));
static ARTICLE_PARAGRAPH: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("article p").expect("Invalid selector"));

/// `Aug 28` or `Aug 28, 2024`
static SHORT_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z]{3})\s+(\d{1,2})(?:,\s*(\d{4}))?$").expect("Invalid regex")
});

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Used when a post carries no date we can read
pub fn fallback_date() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(2025, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
        .unwrap_or_default()
}

/// What we could scrape from one post page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlogPost {
    pub title: Option<String>,
    pub published: Option<String>,
    pub summary: Option<String>,
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Absolute post URLs from the index, in page order, deduplicated
pub fn extract_post_links(html: &str, base: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for anchor in document.select(&LINKS) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if !href.contains("/blog/") {
            continue;
        }
        let Ok(url) = base.join(href) else {
            debug!("Ignoring unparseable blog link {}", href);
            continue;
        };
        // The index linking to itself
        if url.path().trim_end_matches('/') == "/blog" {
            continue;
        }
        if seen.insert(url.to_string()) {
            links.push(url);
            if links.len() == MAX_POSTS {
                break;
            }
        }
    }

    links
}

pub fn parse_post(html: &str) -> BlogPost {
    let document = Html::parse_document(html);

    let title = document
        .select(&HEADING)
        .next()
        .map(element_text)
        .and_then(non_empty);

    let published = document.select(&TIME).next().and_then(|time| {
        time.value()
            .attr("datetime")
            .map(|d| d.trim().to_string())
            .and_then(non_empty)
            .or_else(|| non_empty(element_text(time)))
    });

    let summary = document
        .select(&ARTICLE_PARAGRAPH)
        .map(element_text)
        .find(|text| !text.is_empty());

    BlogPost {
        title,
        published,
        summary,
    }
}

/// Parse the dates the blog prints
///
/// Handles `Mon D` (in `default_year`), `Mon D, YYYY`, RFC 3339, bare ISO
/// dates and long forms like `August 28, 2024`.
pub fn parse_blog_date(raw: &str, default_year: i32) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Some(caps) = SHORT_DATE.captures(raw) {
        let month = MONTHS.iter().position(|m| *m == &caps[1])? as u32 + 1;
        let day: u32 = caps[2].parse().ok()?;
        let year = match caps.get(3) {
            Some(y) => y.as_str().parse().ok()?,
            None => default_year,
        };
        return NaiveDate::from_ymd_opt(year, month, day)?
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc());
    }

    parse_date(raw).or_else(|| {
        ["%B %d, %Y", "%b %d, %Y", "%d %B %Y"]
            .iter()
            .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|d| d.and_utc())
    })
}

/// `/blog/some-post-title` -> `Some Post Title`
fn title_from_url(url: &Url) -> String {
    let slug = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or("");

    let title = slug
        .split('-')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ");

    if title.is_empty() {
        "Untitled".to_string()
    } else {
        title
    }
}

pub struct BlogSource {
    ctx: FetchContext,
}

impl BlogSource {
    pub fn new(ctx: FetchContext) -> Self {
        Self { ctx }
    }

    async fn fetch_post(&self, client: &BlogClient, url: Url) -> Option<Release> {
        let html = match client.fetch_html(url.as_str()).await {
            Ok(html) => html,
            Err(e) => {
                warn!("Failed to fetch blog post {}: {}", url, e);
                return None;
            }
        };

        let post = parse_post(&html);
        let title = post.title.unwrap_or_else(|| title_from_url(&url));
        let default_year = self.ctx.clock.now().year();
        let date = post
            .published
            .as_deref()
            .and_then(|raw| parse_blog_date(raw, default_year))
            .unwrap_or_else(|| {
                debug!("No readable date on {}, using fallback", url);
                fallback_date()
            });

        let body = Node::paragraph_root(post.summary.unwrap_or_else(|| title.clone()));
        Some(Release::new(
            url.as_str(),
            BLOG_REPO,
            format!("blog-{}", date.format("%Y-%m-%d")),
            title,
            date,
            body,
        ))
    }
}

#[async_trait]
impl ReleaseSource for BlogSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Blog
    }

    async fn fetch(&self, config: &SourceConfig, filter: Option<&RepoFilter>) -> Vec<Release> {
        if !config.enabled || !passes(filter, self.kind(), BLOG_REPO) {
            return Vec::new();
        }

        let client = BlogClient::new(self.ctx.endpoints.blog_url.clone(), &self.ctx.http);
        let base = match Url::parse(client.index_url()) {
            Ok(base) => base,
            Err(e) => {
                warn!("Invalid blog URL {}: {}", client.index_url(), e);
                return Vec::new();
            }
        };

        let index = match client.fetch_index().await {
            Ok(index) => index,
            Err(e) => {
                warn!("Failed to fetch blog index: {}", e);
                return Vec::new();
            }
        };

        let links = extract_post_links(&index, &base);
        debug!("{} blog posts linked from the index", links.len());

        let posts = join_all(links.into_iter().map(|url| self.fetch_post(&client, url))).await;
        posts.into_iter().flatten().collect()
    }
}
