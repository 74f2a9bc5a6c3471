/// Bollinger Bands: SMA(period) +/- multiplier * population std dev.
///
/// Band width compression ("squeeze") precedes volatility breakouts; the
/// breakout scorer compares widths across a trailing window.
use super::volatility::std_dev;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bollinger {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl Bollinger {
    /// Band width as a percent of the middle band, 0 when the middle is 0
    pub fn width_pct(&self) -> f64 {
        if self.middle == 0.0 {
            return 0.0;
        }
        (self.upper - self.lower) / self.middle * 100.0
    }
}

/// Calculate bands over the most recent `period` closes
pub fn calculate_bollinger(closes: &[f64], period: usize, multiplier: f64) -> Option<Bollinger> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let middle = window.iter().sum::<f64>() / period as f64;
    let std = std_dev(window)?;

    Some(Bollinger {
        upper: middle + multiplier * std,
        middle,
        lower: middle - multiplier * std,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_prices_collapse_bands() {
        let closes = vec![100.0; 20];
        let bands = calculate_bollinger(&closes, 20, 2.0).unwrap();
        assert_eq!(bands.upper, 100.0);
        assert_eq!(bands.middle, 100.0);
        assert_eq!(bands.lower, 100.0);
        assert_eq!(bands.width_pct(), 0.0);
    }

    #[test]
    fn test_bands_bracket_the_mean() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + (i % 4) as f64).collect();
        let bands = calculate_bollinger(&closes, 20, 2.0).unwrap();
        assert!(bands.upper > bands.middle);
        assert!(bands.lower < bands.middle);
        assert!(bands.width_pct() > 0.0);
    }

    #[test]
    fn test_insufficient_data() {
        assert!(calculate_bollinger(&[1.0, 2.0], 20, 2.0).is_none());
    }
}
