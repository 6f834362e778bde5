use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, warn};

use gb_types::{Event, EventTag};

use crate::metrics::{BusMetrics, BusMetricsSnapshot};

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusState {
    Idle,
    Running,
    Stopping,
}

struct Inner {
    subscribers: RwLock<HashMap<EventTag, Vec<Handler>>>,
    sender: Sender<Event>,
    receiver: Receiver<Event>,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
    state: Mutex<BusState>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    metrics: BusMetrics,
    drop_noncritical_when_full: bool,
}

impl Inner {
    fn dispatch_one(&self, event: &Event) {
        let tag = event.tag();
        let handlers = {
            let table = self.subscribers.read();
            table.get(&tag).cloned().unwrap_or_default()
        };
        for handler in &handlers {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(event)));
            if outcome.is_err() {
                error!(?tag, "subscriber handler panicked; continuing with next subscriber");
                self.metrics.record_handler_error();
            }
        }
        self.metrics.record_dispatched();
    }

    fn dispatch_loop(self: Arc<Self>) {
        loop {
            select! {
                recv(self.receiver) -> msg => {
                    match msg {
                        Ok(event) => self.dispatch_one(&event),
                        Err(_) => break,
                    }
                }
                recv(self.stop_rx) -> _ => {
                    while let Ok(event) = self.receiver.try_recv() {
                        self.dispatch_one(&event);
                    }
                    break;
                }
            }
        }
        *self.state.lock() = BusState::Idle;
        debug!("dispatcher thread exiting, queue drained");
    }
}

/// Builder for an [`EventBus`], mirroring the default-unbounded /
/// opt-in-bounded choice from the design notes on queue backpressure.
#[derive(Default)]
pub struct EventBusBuilder {
    capacity: Option<usize>,
}

impl EventBusBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the queue at `capacity`, dropping `Market`/`OrderBook` events
    /// (with a warning) rather than blocking publishers when full. `Order`,
    /// `Fill`, and `PortfolioUpdate` always block the publisher instead of
    /// being dropped.
    pub fn bounded(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn build(self) -> EventBus {
        let (sender, receiver) = match self.capacity {
            Some(capacity) => bounded(capacity),
            None => unbounded(),
        };
        let (stop_tx, stop_rx) = bounded(1);
        EventBus(Arc::new(Inner {
            subscribers: RwLock::new(HashMap::new()),
            sender,
            receiver,
            stop_tx,
            stop_rx,
            state: Mutex::new(BusState::Idle),
            dispatcher: Mutex::new(None),
            metrics: BusMetrics::default(),
            drop_noncritical_when_full: self.capacity.is_some(),
        }))
    }
}

/// Handle to the bus. Cheaply `Clone`-able (an `Arc` underneath); every
/// clone refers to the same subscriber table, queue, and dispatcher thread.
#[derive(Clone)]
pub struct EventBus(Arc<Inner>);

impl EventBus {
    /// Unbounded queue, the contract's default.
    pub fn new() -> Self {
        EventBusBuilder::new().build()
    }

    /// Bounded queue with the drop-oldest policy for non-critical variants.
    pub fn bounded(capacity: usize) -> Self {
        EventBusBuilder::new().bounded(capacity).build()
    }

    /// Registers a handler for `tag`. There is no cancellation token;
    /// subscribers live for the bus's lifetime. Safe to call before or
    /// after `start()`.
    pub fn subscribe<F>(&self, tag: EventTag, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.0
            .subscribers
            .write()
            .entry(tag)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Hands `event` to the internal queue. Never blocks meaningfully for
    /// the default unbounded bus; may be called from any thread.
    pub fn publish(&self, event: Event) {
        self.0.metrics.record_published();
        if self.0.drop_noncritical_when_full
            && matches!(event.tag(), EventTag::Market | EventTag::OrderBook)
        {
            if self.0.sender.try_send(event).is_err() {
                warn!("queue full, dropping non-critical event");
            }
            return;
        }
        // The receiver is always held alongside the sender in `Inner`, so
        // this can only fail if the bus itself has been torn down.
        let _ = self.0.sender.send(event);
    }

    /// Spawns the single dispatcher thread. Idempotent: calling `start()`
    /// while already running is a no-op.
    pub fn start(&self) {
        let mut state = self.0.state.lock();
        if *state != BusState::Idle {
            return;
        }
        *state = BusState::Running;
        drop(state);

        let inner = self.0.clone();
        let handle = thread::Builder::new()
            .name("gb-bus-dispatcher".to_string())
            .spawn(move || inner.dispatch_loop())
            .expect("failed to spawn dispatcher thread");
        *self.0.dispatcher.lock() = Some(handle);
    }

    /// Signals shutdown and blocks until the dispatcher has drained every
    /// event already enqueued. Idempotent: calling `stop()` while not
    /// running is a no-op.
    pub fn stop(&self) {
        let mut state = self.0.state.lock();
        if *state != BusState::Running {
            return;
        }
        *state = BusState::Stopping;
        drop(state);

        let _ = self.0.stop_tx.send(());
        if let Some(handle) = self.0.dispatcher.lock().take() {
            let _ = handle.join();
        }
    }

    pub fn metrics(&self) -> BusMetricsSnapshot {
        self.0.metrics.snapshot()
    }

    pub fn is_running(&self) -> bool {
        *self.0.state.lock() == BusState::Running
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn symbol() -> gb_types::Symbol {
        gb_types::Symbol::crypto("BTC-USD")
    }

    #[test]
    fn test_subscriber_receives_published_event() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        bus.subscribe(EventTag::Market, move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        bus.start();
        bus.publish(Event::market(symbol(), dec!(100)));
        bus.stop();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_order_matches_publish_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let order_clone = order.clone();
        bus.subscribe(EventTag::Market, move |event| {
            if let Event::Market { price, .. } = event {
                order_clone.lock().push(*price);
            }
        });
        bus.start();
        for price in [dec!(1), dec!(2), dec!(3)] {
            bus.publish(Event::market(symbol(), price));
        }
        bus.stop();
        assert_eq!(*order.lock(), vec![dec!(1), dec!(2), dec!(3)]);
    }

    #[test]
    fn test_drain_on_stop_delivers_all_enqueued_events() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        bus.subscribe(EventTag::Market, move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        bus.start();
        for _ in 0..1000 {
            bus.publish(Event::market(symbol(), dec!(1)));
        }
        bus.stop();
        assert_eq!(count.load(Ordering::SeqCst), 1000);
    }

    #[test]
    fn test_handler_panic_does_not_stop_subsequent_handlers() {
        let bus = EventBus::new();
        let reached = Arc::new(AtomicUsize::new(0));
        bus.subscribe(EventTag::Market, |_event| {
            panic!("boom");
        });
        let reached_clone = reached.clone();
        bus.subscribe(EventTag::Market, move |_event| {
            reached_clone.fetch_add(1, Ordering::SeqCst);
        });
        bus.start();
        bus.publish(Event::market(symbol(), dec!(1)));
        bus.stop();
        assert_eq!(reached.load(Ordering::SeqCst), 1);
        assert_eq!(bus.metrics().handler_errors, 1);
    }

    #[test]
    fn test_start_is_idempotent() {
        let bus = EventBus::new();
        bus.start();
        bus.start();
        assert!(bus.is_running());
        bus.stop();
        bus.stop();
        assert!(!bus.is_running());
    }

    #[test]
    fn test_stop_then_start_redelivers_late_publishes() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        bus.subscribe(EventTag::Market, move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        bus.start();
        bus.stop();
        bus.publish(Event::market(symbol(), dec!(1)));
        bus.start();
        // give the dispatcher a moment to pick the event up
        thread::sleep(Duration::from_millis(50));
        bus.stop();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_bounded_bus_drops_market_events_when_full() {
        let bus = EventBus::bounded(1);
        // No subscriber is started, so the queue fills up immediately.
        bus.publish(Event::market(symbol(), dec!(1)));
        bus.publish(Event::market(symbol(), dec!(2)));
        assert_eq!(bus.metrics().published, 2);
    }
}
