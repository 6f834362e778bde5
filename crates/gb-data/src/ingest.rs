//! The abstract data ingester contract (spec.md §4.3).

use gb_bus::EventBus;
use gb_types::GbResult;

/// Produces `Market`/`OrderBook`/`News` events onto the bus. Ingestion runs
/// on its own thread; the ingester is the only producer outside the
/// dispatcher. Historical ingesters publish exactly one terminal `System`
/// event on end-of-stream; live ingesters run until `stop()`.
pub trait DataIngester: Send {
    /// Spawn the ingester's thread and begin publishing onto `bus`.
    fn start(&mut self, bus: EventBus) -> GbResult<()>;

    /// Signal shutdown and block until the ingester's thread has exited.
    fn stop(&mut self);
}
