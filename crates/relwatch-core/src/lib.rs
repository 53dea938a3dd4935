// Release aggregation: fetch, normalize, render, merge, summarize
pub mod aggregate;
pub mod clock;
pub mod config;
pub mod enhance;
pub mod error;
pub mod extract;
pub mod generator;
pub mod grouping;
pub mod linear;
pub mod markup;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod sources;
pub mod summary;

pub use aggregate::{CachedAggregator, ReleaseAggregator};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use enhance::CommitEnhancer;
pub use error::Error;
pub use generator::ChatGenerator;
pub use linear::{LinearDigest, LinearStore, LinearWeeklySummary};
pub use markup::Node;
pub use models::{Release, ReleaseContext};
pub use registry::{RepoFilter, SourceGroup, SourceItem, SourceRegistry};
pub use sources::{ReleaseSource, SourceConfig, SourceKind};
pub use summary::{SummaryStore, TextGenerator, WeeklySummarizer, WeeklySummary};

/// One error type for the whole crate
pub type Result<T> = std::result::Result<T, Error>;
