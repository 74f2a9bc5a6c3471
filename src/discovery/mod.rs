use crate::api::{ExchangeClient, ExchangeError, TickerSummary};
use crate::config::BotSettings;
use crate::execution::{CandleStore, MAX_CANDLES};
use crate::indicators::{calculate_adx, calculate_sma};
use crate::models::{MarketRegime, Timeframe, Trend};
use crate::persistence::CandleArchive;

pub const REGIME_FAST_PERIOD: usize = 20;
pub const REGIME_SLOW_PERIOD: usize = 50;
/// Long-horizon trend needs at least this much directional strength
pub const TREND_ADX_FLOOR: f64 = 20.0;

/// One admitted symbol with its discovery-sourced classification
#[derive(Debug, Clone)]
pub struct DiscoveredRecord {
    pub symbol: String,
    pub price: f64,
    pub volume: f64,
    pub regime: MarketRegime,
    pub trend_long: Trend,
}

/// Result of one discovery cycle; `failed` symbols were skipped this
/// round and will be retried on the next cycle
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOutcome {
    pub records: Vec<DiscoveredRecord>,
    pub failed: usize,
}

/// Periodic batch job: pull the exchange ticker snapshot, keep qualifying
/// quote-asset pairs, hydrate their long-timeframe candles (delta-fetching
/// from the archive's last stored timestamp) and classify the regime.
///
/// The merge into the monitored set happens on the engine loop; this type
/// only reads the exchange and feeds the candle store/archive.
pub struct PairDiscovery {
    client: ExchangeClient,
}

impl PairDiscovery {
    pub fn new(client: ExchangeClient) -> Self {
        Self { client }
    }

    /// Run one cycle. A ticker-list failure aborts the whole cycle (the
    /// previous monitored set stays intact); a single-symbol failure only
    /// skips that symbol.
    pub async fn run_cycle(
        &self,
        settings: &BotSettings,
        store: &CandleStore,
        mut archive: Option<&mut CandleArchive>,
    ) -> Result<DiscoveryOutcome, ExchangeError> {
        let tickers = self.client.ticker_24h().await?;
        let admitted = filter_tickers(&tickers, settings);

        tracing::info!(
            target: "discovery",
            total = tickers.len(),
            admitted = admitted.len(),
            "Ticker snapshot filtered"
        );

        let mut outcome = DiscoveryOutcome::default();
        let timeframe = settings.regime_tf();

        for ticker in admitted {
            match self
                .hydrate_symbol(&ticker.symbol, timeframe, store, archive.as_deref_mut())
                .await
            {
                Ok(()) => {
                    let candles = store.series(&ticker.symbol, timeframe);
                    let (regime, trend_long) = classify_regime(&candles);

                    outcome.records.push(DiscoveredRecord {
                        symbol: ticker.symbol.clone(),
                        price: ticker.last_price,
                        volume: ticker.quote_volume,
                        regime,
                        trend_long,
                    });
                }
                Err(error) => {
                    tracing::warn!(
                        target: "discovery",
                        symbol = %ticker.symbol,
                        %error,
                        "Symbol hydration failed, skipping this cycle"
                    );
                    outcome.failed += 1;
                }
            }
        }

        Ok(outcome)
    }

    /// Fill the candle store for (symbol, timeframe), fetching only the
    /// window since the newest candle already known.
    async fn hydrate_symbol(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        store: &CandleStore,
        mut archive: Option<&mut CandleArchive>,
    ) -> Result<(), ExchangeError> {
        // warm the in-memory store from the archive on first sight;
        // archive read failures degrade to a full fetch
        if store.is_empty(symbol, timeframe) {
            if let Some(archive) = archive.as_deref_mut() {
                match archive.load_recent(symbol, timeframe, MAX_CANDLES).await {
                    Ok(candles) => {
                        for candle in candles {
                            store.upsert(symbol, timeframe, candle);
                        }
                    }
                    Err(error) => {
                        tracing::warn!(
                            target: "discovery",
                            symbol,
                            %error,
                            "Candle archive read failed"
                        );
                    }
                }
            }
        }

        let start = store.last_timestamp(symbol, timeframe);
        let fetched = self
            .client
            .klines(symbol, timeframe, start, MAX_CANDLES)
            .await?;

        for candle in &fetched {
            store.upsert(symbol, timeframe, candle.clone());
        }

        if let Some(archive) = archive {
            if let Err(error) = archive.save_candles(symbol, timeframe, &fetched).await {
                tracing::warn!(target: "discovery", symbol, %error, "Candle archive write failed");
            } else if let Err(error) = archive.prune(symbol, timeframe, MAX_CANDLES).await {
                tracing::warn!(target: "discovery", symbol, %error, "Candle archive prune failed");
            }
        }

        Ok(())
    }
}

/// Quote-asset match, volume floor, exclusion list
pub fn filter_tickers<'a>(
    tickers: &'a [TickerSummary],
    settings: &BotSettings,
) -> Vec<&'a TickerSummary> {
    let excluded = settings.excluded_set();

    tickers
        .iter()
        .filter(|t| t.symbol.ends_with(&settings.quote_asset))
        .filter(|t| t.quote_volume >= settings.min_volume_usd)
        .filter(|t| !excluded.contains(&t.symbol.to_uppercase()))
        .collect()
}

/// Long/short moving-average crossover regime, with the longer-horizon
/// trend flag gated by ADX strength. Neutral while data is insufficient.
pub fn classify_regime(candles: &[crate::models::Candle]) -> (MarketRegime, Trend) {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

    let (Some(fast), Some(slow)) = (
        calculate_sma(&closes, REGIME_FAST_PERIOD),
        calculate_sma(&closes, REGIME_SLOW_PERIOD),
    ) else {
        return (MarketRegime::Neutral, Trend::Neutral);
    };

    let regime = if fast > slow {
        MarketRegime::Uptrend
    } else if fast < slow {
        MarketRegime::Downtrend
    } else {
        MarketRegime::Neutral
    };

    let adx = calculate_adx(candles, 14).map(|(adx, _, _)| adx);
    let trend_long = match (regime, adx) {
        (MarketRegime::Uptrend, Some(adx)) if adx > TREND_ADX_FLOOR => Trend::Up,
        (MarketRegime::Downtrend, Some(adx)) if adx > TREND_ADX_FLOOR => Trend::Down,
        _ => Trend::Neutral,
    };

    (regime, trend_long)
}
