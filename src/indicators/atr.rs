/// Average True Range (ATR)
///
/// Volatility measure used for adaptive stop distances. True Range is the
/// greatest of high-low, |high - prev close|, |low - prev close|; smoothed
/// with Wilder's method like RSI and ADX.
use crate::models::Candle;

/// Calculate ATR, or None if insufficient data
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let true_ranges: Vec<f64> = candles
        .windows(2)
        .map(|pair| {
            let (prev, curr) = (&pair[0], &pair[1]);
            (curr.high - curr.low)
                .max((curr.high - prev.close).abs())
                .max((curr.low - prev.close).abs())
        })
        .collect();

    if true_ranges.len() < period {
        return None;
    }

    let mut atr: f64 = true_ranges[..period].iter().sum::<f64>() / period as f64;
    for tr in &true_ranges[period..] {
        atr = (atr * (period as f64 - 1.0) + tr) / period as f64;
    }

    Some(atr)
}
