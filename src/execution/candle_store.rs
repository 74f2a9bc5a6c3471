use crate::models::{Candle, Timeframe};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

/// Candles kept per (symbol, timeframe) series
pub const MAX_CANDLES: usize = 200;

/// Thread-safe in-memory store of candle series, one ring buffer per
/// (symbol, timeframe).
///
/// Series invariant: strictly increasing timestamps. An incoming candle
/// matching the last stored timestamp is the live-updating current candle
/// and replaces it in place; anything older is dropped.
#[derive(Clone)]
pub struct CandleStore {
    data: Arc<RwLock<HashMap<(String, Timeframe), VecDeque<Candle>>>>,
    max_candles: usize,
}

impl Default for CandleStore {
    fn default() -> Self {
        Self::new(MAX_CANDLES)
    }
}

impl CandleStore {
    pub fn new(max_candles: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            max_candles,
        }
    }

    /// Insert or replace a candle for (symbol, timeframe).
    ///
    /// Same timestamp as the last stored candle -> replace; newer -> append
    /// (evicting the oldest past capacity); older -> ignored.
    pub fn upsert(&self, symbol: &str, timeframe: Timeframe, candle: Candle) {
        let mut data = self.data.write().unwrap_or_else(|e| e.into_inner());
        let series = data
            .entry((symbol.to_string(), timeframe))
            .or_insert_with(VecDeque::new);

        if let Some(last_ts) = series.back().map(|c| c.timestamp) {
            if candle.timestamp == last_ts {
                if let Some(last) = series.back_mut() {
                    *last = candle;
                }
                return;
            }
            if candle.timestamp < last_ts {
                tracing::debug!(
                    target: "feed",
                    symbol,
                    timeframe = timeframe.as_str(),
                    "Dropping out-of-order candle"
                );
                return;
            }
        }

        series.push_back(candle);
        while series.len() > self.max_candles {
            series.pop_front();
        }
    }

    /// Current series, oldest first; empty (never an error) when absent
    pub fn series(&self, symbol: &str, timeframe: Timeframe) -> Vec<Candle> {
        let data = self.data.read().unwrap_or_else(|e| e.into_inner());
        data.get(&(symbol.to_string(), timeframe))
            .map(|series| series.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, symbol: &str, timeframe: Timeframe) -> usize {
        let data = self.data.read().unwrap_or_else(|e| e.into_inner());
        data.get(&(symbol.to_string(), timeframe))
            .map(|series| series.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, symbol: &str, timeframe: Timeframe) -> bool {
        self.len(symbol, timeframe) == 0
    }

    /// Timestamp of the newest stored candle, for incremental kline fetches
    pub fn last_timestamp(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Option<chrono::DateTime<chrono::Utc>> {
        let data = self.data.read().unwrap_or_else(|e| e.into_inner());
        data.get(&(symbol.to_string(), timeframe))
            .and_then(|series| series.back())
            .map(|candle| candle.timestamp)
    }

    /// Drop every series for a symbol (symbol left the monitored set)
    pub fn remove_symbol(&self, symbol: &str) {
        let mut data = self.data.write().unwrap_or_else(|e| e.into_inner());
        data.retain(|(s, _), _| s != symbol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn candle_at(minute: u32, close: f64) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 12, minute, 0).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn test_append_and_read_back() {
        let store = CandleStore::default();
        store.upsert("XYZUSDT", Timeframe::M1, candle_at(0, 100.0));
        store.upsert("XYZUSDT", Timeframe::M1, candle_at(1, 101.0));

        let series = store.series("XYZUSDT", Timeframe::M1);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].close, 100.0);
        assert_eq!(series[1].close, 101.0);
    }

    #[test]
    fn test_same_timestamp_replaces_last() {
        let store = CandleStore::default();
        store.upsert("XYZUSDT", Timeframe::M1, candle_at(0, 100.0));
        store.upsert("XYZUSDT", Timeframe::M1, candle_at(0, 100.5));

        let series = store.series("XYZUSDT", Timeframe::M1);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].close, 100.5);
    }

    #[test]
    fn test_out_of_order_candle_ignored() {
        let store = CandleStore::default();
        store.upsert("XYZUSDT", Timeframe::M1, candle_at(5, 100.0));
        store.upsert("XYZUSDT", Timeframe::M1, candle_at(3, 99.0));

        let series = store.series("XYZUSDT", Timeframe::M1);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].close, 100.0);
    }

    #[test]
    fn test_capacity_eviction() {
        let store = CandleStore::new(5);
        for i in 0..10 {
            store.upsert("XYZUSDT", Timeframe::M1, candle_at(i, 100.0 + i as f64));
        }

        let series = store.series("XYZUSDT", Timeframe::M1);
        assert_eq!(series.len(), 5);
        assert_eq!(series[0].close, 105.0);
        assert_eq!(series[4].close, 109.0);
    }

    #[test]
    fn test_timeframes_are_independent() {
        let store = CandleStore::default();
        store.upsert("XYZUSDT", Timeframe::M1, candle_at(0, 100.0));
        store.upsert("XYZUSDT", Timeframe::H1, candle_at(0, 200.0));

        assert_eq!(store.series("XYZUSDT", Timeframe::M1)[0].close, 100.0);
        assert_eq!(store.series("XYZUSDT", Timeframe::H1)[0].close, 200.0);
    }

    #[test]
    fn test_absent_series_is_empty() {
        let store = CandleStore::default();
        assert!(store.series("NOPEUSDT", Timeframe::M1).is_empty());
        assert!(store.last_timestamp("NOPEUSDT", Timeframe::M1).is_none());
    }

    #[test]
    fn test_remove_symbol_clears_all_timeframes() {
        let store = CandleStore::default();
        store.upsert("XYZUSDT", Timeframe::M1, candle_at(0, 100.0));
        store.upsert("XYZUSDT", Timeframe::H4, candle_at(0, 100.0));
        store.upsert("ABCUSDT", Timeframe::M1, candle_at(0, 50.0));

        store.remove_symbol("XYZUSDT");

        assert!(store.is_empty("XYZUSDT", Timeframe::M1));
        assert!(store.is_empty("XYZUSDT", Timeframe::H4));
        assert_eq!(store.len("ABCUSDT", Timeframe::M1), 1);
    }
}
