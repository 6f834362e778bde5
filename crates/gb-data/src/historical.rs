//! Historical replay ingester (spec.md §4.3, §6).
//!
//! Reads a delimited file whose first record is a header. Each subsequent
//! record either carries a single tick (`timestamp,open,high,low,close,volume`,
//! producing `Market` with the close price) or two JSON-encoded arrays of
//! `[price, quantity]` pairs for bids and asks (`timestamp,bids,asks`,
//! producing `OrderBook`). Malformed records are logged and skipped.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use gb_bus::EventBus;
use gb_types::{BookLevel, Event, GbError, GbResult, Symbol};

use crate::ingest::DataIngester;

/// Pacing between records. Not a correctness requirement (spec.md §4.3), just
/// enough to avoid flooding the bus with an unbounded replay loop.
const DEFAULT_REPLAY_DELAY: Duration = Duration::from_micros(100);

pub struct HistoricalReplayIngester {
    path: PathBuf,
    symbol: Symbol,
    replay_delay: Duration,
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl HistoricalReplayIngester {
    pub fn new(path: impl AsRef<Path>, symbol: Symbol) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            symbol,
            replay_delay: DEFAULT_REPLAY_DELAY,
            stop_flag: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn with_replay_delay(mut self, delay: Duration) -> Self {
        self.replay_delay = delay;
        self
    }
}

impl DataIngester for HistoricalReplayIngester {
    fn start(&mut self, bus: EventBus) -> GbResult<()> {
        // Fail fast on a missing/unreadable file rather than discovering it
        // only once the replay thread is already running.
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| GbError::Ingestion(format!("opening {}: {e}", self.path.display())))?;

        let symbol = self.symbol.clone();
        let stop_flag = self.stop_flag.clone();
        let delay = self.replay_delay;
        stop_flag.store(false, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("gb-data-historical".to_string())
            .spawn(move || replay_loop(&mut reader, &symbol, &bus, &stop_flag, delay))
            .map_err(|e| GbError::Internal(format!("spawning historical ingester thread: {e}")))?;

        self.handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn replay_loop(
    reader: &mut csv::Reader<std::fs::File>,
    symbol: &Symbol,
    bus: &EventBus,
    stop_flag: &AtomicBool,
    delay: Duration,
) {
    for result in reader.records() {
        if stop_flag.load(Ordering::Relaxed) {
            break;
        }
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "malformed historical record, skipping");
                continue;
            }
        };

        match record.len() {
            6 => match parse_market_row(&record) {
                Some(close) => bus.publish(Event::market(symbol.clone(), close)),
                None => warn!(?record, "unparseable market-data row, skipping"),
            },
            3 => match parse_order_book_row(&record) {
                Some((bids, asks)) => {
                    bus.publish(Event::order_book(symbol.clone(), bids, asks))
                }
                None => warn!(?record, "unparseable order-book row, skipping"),
            },
            other => warn!(field_count = other, ?record, "unrecognized historical record shape, skipping"),
        }

        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }

    debug!("historical replay reached end of file, publishing terminal System event");
    bus.publish(Event::system());
}

fn parse_market_row(record: &csv::StringRecord) -> Option<Decimal> {
    // timestamp,open,high,low,close,volume — only close is consumed.
    record.get(4)?.trim().parse::<Decimal>().ok()
}

fn parse_order_book_row(record: &csv::StringRecord) -> Option<(Vec<BookLevel>, Vec<BookLevel>)> {
    let bids_json = record.get(1)?;
    let asks_json = record.get(2)?;
    let bids = parse_levels(bids_json)?;
    let asks = parse_levels(asks_json)?;

    let mut bids = bids;
    let mut asks = asks;
    bids.sort_by(|a, b| b.price.cmp(&a.price));
    asks.sort_by(|a, b| a.price.cmp(&b.price));
    Some((bids, asks))
}

fn parse_levels(json: &str) -> Option<Vec<BookLevel>> {
    let pairs: Vec<(Decimal, Decimal)> = serde_json::from_str(json).ok()?;
    Some(
        pairs
            .into_iter()
            .map(|(price, quantity)| BookLevel::new(price, quantity))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use gb_bus::EventTag;
    use std::io::Write;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    fn write_csv(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_market_rows_produce_market_events_and_terminal_system() {
        let file = write_csv(
            "timestamp,open,high,low,close,volume\n\
             1,100,101,99,100.0,10\n\
             2,100,102,99,101.0,10\n\
             3,101,103,100,102.0,10\n",
        );
        let bus = EventBus::new();
        let market_count = Arc::new(AtomicUsize::new(0));
        let saw_system = Arc::new(AtomicBool::new(false));

        let mc = market_count.clone();
        bus.subscribe(EventTag::Market, move |_| {
            mc.fetch_add(1, Ordering::SeqCst);
        });
        let ss = saw_system.clone();
        bus.subscribe(EventTag::System, move |_| {
            ss.store(true, Ordering::SeqCst);
        });

        bus.start();
        let mut ingester =
            HistoricalReplayIngester::new(file.path(), Symbol::crypto("BTC-USD"))
                .with_replay_delay(Duration::ZERO);
        ingester.start(bus.clone()).unwrap();
        ingester.stop();
        bus.stop();

        assert_eq!(market_count.load(Ordering::SeqCst), 3);
        assert!(saw_system.load(Ordering::SeqCst));
    }

    #[test]
    fn test_order_book_row_sorts_bids_desc_asks_asc() {
        let file = write_csv(
            "timestamp,bids,asks\n\
             1,\"[[99,1],[100,2]]\",\"[[102,1],[101,2]]\"\n",
        );
        let bus = EventBus::new();
        let captured = Arc::new(Mutex::new(None));
        let captured_clone = captured.clone();
        bus.subscribe(EventTag::OrderBook, move |event| {
            if let Event::OrderBook { bids, asks, .. } = event {
                *captured_clone.lock().unwrap() = Some((bids.clone(), asks.clone()));
            }
        });

        bus.start();
        let mut ingester =
            HistoricalReplayIngester::new(file.path(), Symbol::crypto("BTC-USD"))
                .with_replay_delay(Duration::ZERO);
        ingester.start(bus.clone()).unwrap();
        ingester.stop();
        bus.stop();

        let (bids, asks) = captured.lock().unwrap().take().unwrap();
        assert_eq!(bids[0].price, Decimal::from(100));
        assert_eq!(bids[1].price, Decimal::from(99));
        assert_eq!(asks[0].price, Decimal::from(101));
        assert_eq!(asks[1].price, Decimal::from(102));
    }

    #[test]
    fn test_malformed_rows_are_skipped_not_fatal() {
        let file = write_csv(
            "timestamp,open,high,low,close,volume\n\
             1,100,101,99,not_a_number,10\n\
             2,100,102,99,101.0,10\n",
        );
        let bus = EventBus::new();
        let market_count = Arc::new(AtomicUsize::new(0));
        let mc = market_count.clone();
        bus.subscribe(EventTag::Market, move |_| {
            mc.fetch_add(1, Ordering::SeqCst);
        });

        bus.start();
        let mut ingester =
            HistoricalReplayIngester::new(file.path(), Symbol::crypto("BTC-USD"))
                .with_replay_delay(Duration::ZERO);
        ingester.start(bus.clone()).unwrap();
        ingester.stop();
        bus.stop();

        assert_eq!(market_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_file_is_a_fatal_ingestion_error() {
        let bus = EventBus::new();
        let mut ingester =
            HistoricalReplayIngester::new("/nonexistent/path.csv", Symbol::crypto("BTC-USD"));
        assert!(ingester.start(bus).is_err());
    }
}
