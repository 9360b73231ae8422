//! Multi-site torrent search.
//!
//! A [`Dispatcher`] runs one keyword against one site through the protocol
//! adapter the site needs, with per-site rate limiting. Results come back in
//! the canonical [`TorrentRecord`] schema with promotions normalized, and
//! [`select_best`] ranks and dedups candidates gathered across sites.

pub mod detail;
pub mod discount;
mod dispatcher;
pub mod keyword;
mod ranker;
mod rate_limiter;
pub mod spiders;
mod traits;
mod types;

pub use detail::{HtmlDetailInspector, MTeamDetailClient, TorrentAttr};
pub use discount::{Discount, Promotion};
pub use dispatcher::{BasicResultFilter, DiscardStatistics, Dispatcher, ENGINE_ID};
pub use ranker::{season_episode_markers, select_best, OrderMode, RankCandidate};
pub use rate_limiter::{RateLimitError, RateLimitStatus, RateLimiterPool, SiteRateLimit, TokenBucket};
pub use spiders::{Spider, SpiderContext, SpiderKind, SpiderRegistry};
pub use traits::*;
pub use types::*;
