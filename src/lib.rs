#![deny(missing_docs)]

//! Core library for Course Digest: map-reduce summarization of course material with
//! resilient calls to a hosted text-generation service.

/// Environment-driven configuration management.
pub mod config;
/// Source file discovery and text extraction.
pub mod document;
/// Text-generation providers and the resilient call wrapper.
pub mod generation;
/// Structured logging and tracing setup.
pub mod logging;
/// Generation traffic counters.
pub mod metrics;
/// Digest pipeline: chunking, map, reduce, and artifact extraction.
pub mod processing;
/// Interactive study session state.
pub mod session;
