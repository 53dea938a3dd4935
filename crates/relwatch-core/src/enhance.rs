// Turns bare references in commit and issue text into repository links
use std::sync::LazyLock;

use regex::{Captures, Regex};

const GITHUB: &str = "https://github.com";

/// Issue/PR URLs on github.com
static ISSUE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://github\.com/([^/\s()\[\]]+/[^/\s()\[\]]+)/(?:pull|issues)/(\d+)")
        .expect("Invalid regex")
});

/// `#123`, optionally after a closing verb
static ISSUE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(^|\s)((?:fix(?:es)?|close(?:s)?|resolve(?:s)?)\s+)?#(\d+)")
        .expect("Invalid regex")
});

/// A run of hex digits starting a token - length is checked by the caller
static HEX_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|\s)([0-9A-Fa-f]+)").expect("Invalid regex"));

static MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|\s)@([A-Za-z0-9-]+)").expect("Invalid regex"));

/// Rewrites issue numbers, commit SHAs and (optionally) `@mentions` into
/// markdown links scoped to one repository
///
/// The steps run in a fixed order and each one only matches tokens that start
/// the text or follow whitespace, so the links produced by earlier steps are
/// never matched again. Running the enhancer twice gives the same text.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitEnhancer {
    pub link_mentions: bool,
}

impl CommitEnhancer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mentions(mut self, enabled: bool) -> Self {
        self.link_mentions = enabled;
        self
    }

    pub fn enhance(&self, message: &str, repo: &str) -> String {
        let base = format!("{}/{}", GITHUB, repo);

        let text = shorten_same_repo_urls(message, repo);
        let text = link_issue_refs(&text, &base);
        let text = link_shas(&text, &base);
        if self.link_mentions {
            link_mentions(&text)
        } else {
            text
        }
    }
}

/// The character right after a token must end it: whitespace, `.,!?` or nothing
fn ends_token(text: &str, at: usize) -> bool {
    match text[at..].chars().next() {
        None => true,
        Some(c) => c.is_whitespace() || matches!(c, '.' | ',' | '!' | '?'),
    }
}

/// Run `regex` over `text`, replacing each match for which `rewrite` returns
/// a value and copying everything else through
fn replace_tokens<F>(text: &str, regex: &Regex, mut rewrite: F) -> String
where
    F: FnMut(&Captures, &str) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in regex.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if let Some(replacement) = rewrite(&caps, text) {
            out.push_str(&text[last..whole.start()]);
            out.push_str(&replacement);
            last = whole.end();
        }
    }

    out.push_str(&text[last..]);
    out
}

fn shorten_same_repo_urls(text: &str, repo: &str) -> String {
    replace_tokens(text, &ISSUE_URL, |caps, text| {
        let whole = caps.get(0)?;
        // Already the target of a markdown link
        if text[..whole.start()].ends_with("](") {
            return None;
        }
        if &caps[1] != repo {
            return None;
        }
        Some(format!("[#{}]({})", &caps[2], whole.as_str()))
    })
}

fn link_issue_refs(text: &str, base: &str) -> String {
    replace_tokens(text, &ISSUE_REF, |caps, text| {
        if !ends_token(text, caps.get(0)?.end()) {
            return None;
        }
        let lead = &caps[1];
        let verb = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let number = &caps[3];
        Some(format!(
            "{}{}[#{}]({}/issues/{})",
            lead, verb, number, base, number
        ))
    })
}

fn link_shas(text: &str, base: &str) -> String {
    replace_tokens(text, &HEX_TOKEN, |caps, text| {
        if !ends_token(text, caps.get(0)?.end()) {
            return None;
        }
        let lead = &caps[1];
        let sha = &caps[2];
        match sha.len() {
            7 | 8 => Some(format!("{}[`{}`]({}/commit/{})", lead, sha, base, sha)),
            40 => Some(format!(
                "{}[`{}`]({}/commit/{})",
                lead,
                &sha[..8],
                base,
                sha
            )),
            _ => None,
        }
    })
}

/// GitHub logins: alphanumeric or single hyphens, no leading/trailing hyphen, max 39
fn is_github_login(name: &str) -> bool {
    name.len() <= 39
        && !name.starts_with('-')
        && !name.ends_with('-')
        && !name.contains("--")
}

fn link_mentions(text: &str) -> String {
    replace_tokens(text, &MENTION, |caps, text| {
        if !ends_token(text, caps.get(0)?.end()) {
            return None;
        }
        let user = &caps[2];
        if !is_github_login(user) {
            return None;
        }
        Some(format!("{}[@{}]({}/{})", &caps[1], user, GITHUB, user))
    })
}
