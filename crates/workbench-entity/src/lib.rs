//! # workbench-entity
//!
//! Domain entity models for the Sentiment Workbench job system. Every
//! struct in this crate represents a job record or a domain value object.
//! All entities derive `Debug`, `Clone`, `Serialize`, and `Deserialize`.

pub mod job;
