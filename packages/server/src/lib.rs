// Contact-discovery mining engine - API core.
//
// This crate provides the HTTP surface and orchestration wiring around
// `mining_core`'s extraction pipeline: job submission, result-row
// retrieval/correction, and the background prospect-import pipeline.

pub mod common;
pub mod config;
pub mod server;

pub use config::Config;
