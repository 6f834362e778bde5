//! Market data ingestion for the GlowBack trading core.
//!
//! An ingester is the sole non-dispatcher producer of events: it owns its
//! own thread, publishes `Market`/`OrderBook`/`News` events onto an
//! [`gb_bus::EventBus`], and — for historical replay — publishes exactly one
//! terminal `System` event on end-of-stream.

pub mod ingest;
pub mod historical;
pub mod live;
pub mod ambient;

pub use ingest::DataIngester;
pub use historical::HistoricalReplayIngester;
pub use live::{LiveDepthIngester, LiveIngesterConfig};
pub use ambient::{NewsIngester, RegimeIngester};
