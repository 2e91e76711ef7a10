//! Core trait abstractions for the extraction library.
//!
//! These traits define the interfaces that applications implement
//! to provide AI and crawling capabilities.

pub mod ai;
pub mod crawler;
