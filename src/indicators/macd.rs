/// Moving Average Convergence Divergence
///
/// MACD line = EMA(fast) - EMA(slow); signal = EMA(signal period) of the
/// MACD line; histogram = line - signal.
use super::moving_average::ema_series;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Calculate MACD(fast, slow, signal); None until `slow + signal - 1`
/// closes are available
pub fn calculate_macd(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> Option<Macd> {
    if fast == 0 || signal == 0 || fast >= slow || closes.len() < slow + signal - 1 {
        return None;
    }

    let fast_series = ema_series(closes, fast);
    let slow_series = ema_series(closes, slow);

    // Align the fast series to the slow one's starting index
    let offset = fast_series.len() - slow_series.len();
    let macd_line: Vec<f64> = slow_series
        .iter()
        .zip(&fast_series[offset..])
        .map(|(s, f)| f - s)
        .collect();

    let signal_series = ema_series(&macd_line, signal);
    let line = *macd_line.last()?;
    let signal_value = *signal_series.last()?;

    Some(Macd {
        line,
        signal: signal_value,
        histogram: line - signal_value,
    })
}
