//! Client-side community feed: REST adapter plus the controllers UI code drives.

pub mod config;
pub mod detail;
pub mod error;
pub mod feed;
pub mod source;
pub mod transport;

pub use config::{load_settings, load_settings_from, ClientSettings, SettingsError};
pub use detail::{DetailState, PostDetailController};
pub use error::{ClientError, ErrorKind, FeedError};
pub use feed::{FeedController, FeedState, LoadingState, DEFAULT_PAGE_SIZE};
pub use source::{CommunitySource, FeedQuery, FeedScope, Page, PageCursor};
pub use transport::HttpCommunitySource;

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
