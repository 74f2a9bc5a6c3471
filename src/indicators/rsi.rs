/// Calculate Relative Strength Index (RSI)
///
/// Momentum oscillator in the 0-100 range:
/// - RSI > 70: overbought
/// - RSI < 30: oversold
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    // Average gain/loss over the last `period` price changes
    let window = &prices[prices.len() - period - 1..];
    let mut gain_sum = 0.0;
    let mut loss_sum = 0.0;

    for pair in window.windows(2) {
        let change = pair[1] - pair[0];
        if change > 0.0 {
            gain_sum += change;
        } else {
            loss_sum += -change;
        }
    }

    let avg_gain = gain_sum / period as f64;
    let avg_loss = loss_sum / period as f64;

    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}
