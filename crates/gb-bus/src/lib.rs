//! Typed, in-process publish/subscribe event bus.
//!
//! A single dispatcher thread serializes delivery of every [`Event`] to its
//! registered subscribers, in publish order, with no two handlers ever
//! running concurrently. This is the central trick that lets every other
//! component in the pipeline hold mutable per-component state without its
//! own locking.

mod bus;
mod metrics;

pub use bus::{EventBus, EventBusBuilder};
pub use metrics::{BusMetrics, BusMetricsSnapshot};

pub use gb_types::{Event, EventTag};
