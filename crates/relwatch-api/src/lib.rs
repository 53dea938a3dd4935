// API clients for every upstream we pull release data from, plus the chat model
pub mod blog;
pub mod error;
pub mod github;
pub mod gitlab;
pub mod http;
pub mod linear;
pub mod npm;
pub mod openai;
pub mod release_feed;

// Re-export common types
pub use blog::{BlogClient, DEFAULT_BLOG_URL};
pub use error::{ApiError, Result};
pub use github::{
    GitHubClient, GitHubCommit, GitHubIssue, GitHubPullRequest, GitHubRelease, GitHubTag,
    IssueQuery, PullRequestQuery, SortDirection, GITHUB_API_BASE,
};
pub use gitlab::{GitLabClient, GitLabRelease};
pub use http::{HttpConfig, MAX_PAGES};
pub use linear::{LinearClient, LinearIssue, LINEAR_API_URL};
pub use npm::{NpmClient, NpmPackage, NPM_REGISTRY};
pub use openai::{ChatClient, OPENAI_API_BASE};
pub use release_feed::{FeedRelease, ReleaseFeedClient, DEFAULT_FEED_URL};
