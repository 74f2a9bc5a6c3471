use crate::models::{Candle, Timeframe};
use crate::Result;
use chrono::{DateTime, TimeZone, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Duration};

/// Compact candle encoding for the archive
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCandle {
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

/// Redis-backed candle archive.
///
/// One sorted set per (symbol, timeframe), scored by timestamp in
/// milliseconds, so discovery can delta-fetch from the last stored candle
/// instead of re-downloading full history every cycle.
pub struct CandleArchive {
    conn: ConnectionManager,
}

fn archive_key(symbol: &str, timeframe: Timeframe) -> String {
    format!("candles:{}:{}", symbol, timeframe.as_str())
}

impl CandleArchive {
    /// Connect to Redis; bounded so a dead server fails startup fast
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;

        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| "Redis connection timeout after 5 seconds")??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }

    /// Upsert candles into the archive; same-timestamp members are
    /// replaced, matching the store's live-candle semantics
    pub async fn save_candles(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
    ) -> Result<()> {
        let key = archive_key(symbol, timeframe);

        for candle in candles {
            let score = candle.timestamp.timestamp_millis() as f64;

            // drop any previous member at this timestamp before writing
            self.conn
                .zrembyscore::<_, _, _, ()>(&key, score, score)
                .await?;

            let stored = StoredCandle {
                o: candle.open,
                h: candle.high,
                l: candle.low,
                c: candle.close,
                v: candle.volume,
            };
            let member = format!("{}|{}", score as i64, serde_json::to_string(&stored)?);
            self.conn.zadd::<_, _, _, ()>(&key, member, score).await?;
        }

        tracing::debug!(
            "Archived {} candles for {}:{}",
            candles.len(),
            symbol,
            timeframe.as_str()
        );

        Ok(())
    }

    /// Most recent `count` candles, oldest first
    pub async fn load_recent(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>> {
        let key = archive_key(symbol, timeframe);

        let members: Vec<(String, f64)> = self
            .conn
            .zrevrange_withscores(&key, 0, count.saturating_sub(1) as isize)
            .await?;

        let mut candles = Vec::with_capacity(members.len());
        for (member, score) in members.into_iter().rev() {
            let json = member
                .split_once('|')
                .map(|(_, rest)| rest)
                .ok_or("corrupt archive member")?;
            let stored: StoredCandle = serde_json::from_str(json)?;

            let timestamp = Utc
                .timestamp_millis_opt(score as i64)
                .single()
                .ok_or("corrupt archive score")?;

            candles.push(Candle {
                timestamp,
                open: stored.o,
                high: stored.h,
                low: stored.l,
                close: stored.c,
                volume: stored.v,
            });
        }

        Ok(candles)
    }

    /// Timestamp of the newest archived candle, None for an empty archive
    pub async fn last_timestamp(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<DateTime<Utc>>> {
        let key = archive_key(symbol, timeframe);

        let members: Vec<(String, f64)> = self.conn.zrevrange_withscores(&key, 0, 0).await?;

        Ok(members
            .first()
            .and_then(|(_, score)| Utc.timestamp_millis_opt(*score as i64).single()))
    }

    /// Keep only the newest `keep` candles to bound archive growth
    pub async fn prune(&mut self, symbol: &str, timeframe: Timeframe, keep: usize) -> Result<usize> {
        let key = archive_key(symbol, timeframe);

        let removed: usize = self
            .conn
            .zremrangebyrank(&key, 0, -(keep as isize) - 1)
            .await?;

        if removed > 0 {
            tracing::debug!(
                "Pruned {} archived candles for {}:{}",
                removed,
                symbol,
                timeframe.as_str()
            );
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle_at(ms: i64, close: f64) -> Candle {
        Candle {
            timestamp: Utc.timestamp_millis_opt(ms).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000.0,
        }
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_save_and_load_round_trip() {
        let mut archive = CandleArchive::new("redis://127.0.0.1:6379")
            .await
            .expect("Failed to connect to Redis");

        let _ = archive.prune("TEST_RT", Timeframe::H4, 0).await;

        let candles = vec![
            candle_at(1_000_000, 100.0),
            candle_at(2_000_000, 101.0),
            candle_at(3_000_000, 102.0),
        ];
        archive
            .save_candles("TEST_RT", Timeframe::H4, &candles)
            .await
            .unwrap();

        let loaded = archive.load_recent("TEST_RT", Timeframe::H4, 10).await.unwrap();
        assert_eq!(loaded, candles);

        let last = archive.last_timestamp("TEST_RT", Timeframe::H4).await.unwrap();
        assert_eq!(last, Some(candles[2].timestamp));

        let _ = archive.prune("TEST_RT", Timeframe::H4, 0).await;
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_same_timestamp_replaces() {
        let mut archive = CandleArchive::new("redis://127.0.0.1:6379")
            .await
            .expect("Failed to connect to Redis");

        let _ = archive.prune("TEST_UPSERT", Timeframe::M1, 0).await;

        archive
            .save_candles("TEST_UPSERT", Timeframe::M1, &[candle_at(1_000_000, 100.0)])
            .await
            .unwrap();
        archive
            .save_candles("TEST_UPSERT", Timeframe::M1, &[candle_at(1_000_000, 105.0)])
            .await
            .unwrap();

        let loaded = archive
            .load_recent("TEST_UPSERT", Timeframe::M1, 10)
            .await
            .unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].close, 105.0);

        let _ = archive.prune("TEST_UPSERT", Timeframe::M1, 0).await;
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_empty_archive() {
        let mut archive = CandleArchive::new("redis://127.0.0.1:6379")
            .await
            .expect("Failed to connect to Redis");

        let loaded = archive
            .load_recent("TEST_NONE", Timeframe::M1, 10)
            .await
            .unwrap();
        assert!(loaded.is_empty());

        let last = archive.last_timestamp("TEST_NONE", Timeframe::M1).await.unwrap();
        assert!(last.is_none());
    }
}
