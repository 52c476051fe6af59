//! Core domain logic for nzbrelay.
//!
//! This crate ties the grammar, HTTP collaborators and dedup store together:
//! - [`router`]: category → channel + styled announcement
//! - [`pipeline`]: the per-release fulfillment state machine
//! - [`listener`]: inbound message decision and job spawning
//! - [`keywords`] / [`events`]: injected keyword source and event sink

pub mod events;
pub mod keywords;
pub mod listener;
pub mod pipeline;
pub mod router;

pub use events::{EventKind, EventSink, NullSink, PipelineEvent, TracingSink};
pub use keywords::{FileKeywords, KeywordSource, StaticKeywords};
pub use listener::{Dispatch, IgnoreReason, Listener};
pub use pipeline::{Announcer, JobOutcome, JobReport, Pipeline, Stage, extract_final_name};
pub use router::{Route, Router, Style};
