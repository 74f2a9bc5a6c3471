/// Dispersion measures used by the volatility filter and Bollinger Bands
use crate::models::Candle;

/// Population standard deviation, None for an empty slice
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values
        .iter()
        .map(|v| {
            let d = v - mean;
            d * d
        })
        .sum::<f64>()
        / values.len() as f64;

    Some(variance.sqrt())
}

/// Relative volatility: stddev of closes as a percent of their mean.
///
/// None when the slice is empty or the mean is zero (no meaningful scale).
pub fn calculate_volatility(closes: &[f64]) -> Option<f64> {
    let std = std_dev(closes)?;
    let mean = closes.iter().sum::<f64>() / closes.len() as f64;

    if mean == 0.0 {
        return None;
    }

    Some(std / mean * 100.0)
}

/// Average volume over the most recent `period` candles
pub fn calculate_average_volume(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period {
        return None;
    }

    let total: f64 = candles[candles.len() - period..]
        .iter()
        .map(|c| c.volume)
        .sum();
    Some(total / period as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_std_dev_constant_series() {
        assert_eq!(std_dev(&[5.0, 5.0, 5.0]), Some(0.0));
        assert!(std_dev(&[]).is_none());
    }

    #[test]
    fn test_std_dev_population() {
        // population stddev of [2, 4, 4, 4, 5, 5, 7, 9] is exactly 2
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((std_dev(&values).unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_volatility_pct() {
        // stddev 2 on mean 5 = 40%
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((calculate_volatility(&values).unwrap() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_volatility_zero_mean_unavailable() {
        assert!(calculate_volatility(&[1.0, -1.0]).is_none());
        assert!(calculate_volatility(&[]).is_none());
    }

    #[test]
    fn test_average_volume() {
        let candles: Vec<Candle> = [1000.0, 2000.0, 3000.0]
            .iter()
            .enumerate()
            .map(|(i, &volume)| Candle {
                timestamp: Utc::now() + chrono::Duration::minutes(i as i64),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume,
            })
            .collect();

        assert_eq!(calculate_average_volume(&candles, 3), Some(2000.0));
        assert_eq!(calculate_average_volume(&candles, 2), Some(2500.0));
        assert!(calculate_average_volume(&candles, 4).is_none());
    }
}
