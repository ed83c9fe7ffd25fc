// src/models/mod.rs

//! Domain models for the stats aggregator.
//!
//! Documents stored under `climbs/` and the configuration that drives the
//! aggregator, change feed and storage backends.

mod climb;
mod config;
mod grade;
mod media;

// Re-export all public types
pub use climb::{Climb, ClimbLog, ClimbStats};
pub use config::{
    AggregatorConfig, Config, FeedConfig, LoggingConfig, OrphanPolicy, StoreBackend, StoreConfig,
};
pub use grade::{GradeTally, GradeVote, grade_options_for_tag, validate_vote};
pub use media::{Comment, VideoData};
