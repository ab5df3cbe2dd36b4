//! Discovers YouTube channels by snowballing recommendations: starting from a
//! seed, each round promotes the channel most recommended next to the latest
//! videos of the channels already in the set.

pub mod blacklist;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod source;
pub mod tally;
pub mod writer;
pub mod youtube;

pub use blacklist::Blacklist;
pub use config::{ClientConfig, SnowballConfig, StartingSet};
pub use engine::Snowball;
pub use error::{Result, SnowballError};
pub use model::{
    Channel, ChannelId, ChannelMetadata, ChannelSet, LatestVideo, RecommendedVideo, RoundRecord,
    RunStatus, SnowballReport, SourceRecord, VideoRecord,
};
pub use source::{MetadataService, RecommendationFetcher};
pub use tally::RecommendationTally;
pub use writer::ResultWriter;
