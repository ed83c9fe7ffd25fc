// src/lib.rs

//! Climb stats library
//!
//! Keeps `ascentCount` and `avgRating` on climb documents consistent with
//! their ascent logs, plus the grade-vote and leaderboard read models.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod feed;
#[cfg(feature = "lambda")]
pub mod lambda;
pub mod models;
pub mod services;
pub mod storage;
