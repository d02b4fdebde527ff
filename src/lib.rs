//! tablescout - restaurant website enrichment.
//!
//! Fetches restaurant websites, extracts structured details through a
//! generative analysis service, scores the result and merges accepted
//! enrichments into a SQLite record store. Failed attempts land in a durable
//! backlog with exponential retry.

pub mod backlog;
pub mod cli;
pub mod config;
pub mod extraction;
pub mod fetcher;
pub mod llm;
pub mod merge;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod pipeline;
pub mod profile;
pub mod quality;
pub mod repository;
