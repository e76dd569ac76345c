//! Port の実装

pub mod activity;

pub use activity::{InMemoryActivitySink, NoopActivitySink, TracingActivitySink};
