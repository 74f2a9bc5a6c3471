/// Average Directional Index (ADX) - trend strength
///
/// - ADX > 25: strong trend (either direction)
/// - ADX < 20: choppy / ranging market
///
/// +DI / -DI give the direction: +DI > -DI means uptrend.
use crate::models::Candle;

/// Calculate ADX, +DI and -DI with Wilder's smoothing.
///
/// Returns `(adx, plus_di, minus_di)`, or None if insufficient data.
pub fn calculate_adx(candles: &[Candle], period: usize) -> Option<(f64, f64, f64)> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let mut true_ranges = Vec::with_capacity(candles.len() - 1);
    let mut plus_dms = Vec::with_capacity(candles.len() - 1);
    let mut minus_dms = Vec::with_capacity(candles.len() - 1);

    for pair in candles.windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);

        let tr = (curr.high - curr.low)
            .max((curr.high - prev.close).abs())
            .max((curr.low - prev.close).abs());
        true_ranges.push(tr);

        let up_move = curr.high - prev.high;
        let down_move = prev.low - curr.low;

        plus_dms.push(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        minus_dms.push(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });
    }

    let smoothed_tr = wilder_smooth(&true_ranges, period)?;
    let smoothed_plus = wilder_smooth(&plus_dms, period)?;
    let smoothed_minus = wilder_smooth(&minus_dms, period)?;

    let (plus_di, minus_di) = if smoothed_tr > 0.0 {
        (
            smoothed_plus / smoothed_tr * 100.0,
            smoothed_minus / smoothed_tr * 100.0,
        )
    } else {
        (0.0, 0.0)
    };

    let di_sum = plus_di + minus_di;
    let dx = if di_sum > 0.0 {
        (plus_di - minus_di).abs() / di_sum * 100.0
    } else {
        0.0
    };

    // Single-shot DX as the ADX approximation; a streaming ADX would smooth
    // DX over another `period` bars.
    Some((dx, plus_di, minus_di))
}

/// Wilder's smoothing: seed with a simple average, then recursive blend
fn wilder_smooth(values: &[f64], period: usize) -> Option<f64> {
    if values.len() < period {
        return None;
    }

    let mut smoothed: f64 = values[..period].iter().sum::<f64>() / period as f64;
    for value in &values[period..] {
        smoothed = (smoothed * (period as f64 - 1.0) + value) / period as f64;
    }

    Some(smoothed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candles_from(ohlc: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        ohlc.iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Candle {
                timestamp: Utc::now() + chrono::Duration::minutes(i as i64),
                open,
                high,
                low,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn test_adx_strong_uptrend() {
        let ohlc: Vec<(f64, f64, f64, f64)> = (0..15)
            .map(|i| {
                let base = 100.0 + i as f64 * 3.0;
                (base, base + 2.0, base - 1.0, base + 1.0)
            })
            .collect();

        let (adx, plus_di, minus_di) = calculate_adx(&candles_from(&ohlc), 14).unwrap();
        assert!(plus_di > minus_di, "+DI should exceed -DI in an uptrend");
        assert!(adx > 25.0, "steady climb should read as a strong trend");
    }

    #[test]
    fn test_adx_choppy_market() {
        let ohlc: Vec<(f64, f64, f64, f64)> = (0..15)
            .map(|i| {
                if i % 2 == 0 {
                    (100.0, 102.0, 98.0, 99.0)
                } else {
                    (99.0, 103.0, 97.0, 101.0)
                }
            })
            .collect();

        let (adx, _, _) = calculate_adx(&candles_from(&ohlc), 14).unwrap();
        assert!(adx < 40.0, "ranging market should not read strongly trending");
    }

    #[test]
    fn test_adx_insufficient_data() {
        let ohlc = vec![(100.0, 102.0, 99.0, 101.0), (101.0, 105.0, 100.0, 104.0)];
        assert!(calculate_adx(&candles_from(&ohlc), 14).is_none());
    }
}
