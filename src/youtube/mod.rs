//! YouTube-backed implementations of the snowball's data sources.

pub mod api;
pub mod recommender;
pub mod watch;

pub use api::YouTubeApiClient;
pub use recommender::YouTubeRecommender;
