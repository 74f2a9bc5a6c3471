// Technical indicators module
// Pure functions over candle/price slices; None when warm-up data is missing

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod macd;
pub mod moving_average;
pub mod rsi;
pub mod volatility;

pub use adx::calculate_adx;
pub use atr::calculate_atr;
pub use bollinger::{calculate_bollinger, Bollinger};
pub use macd::{calculate_macd, Macd};
pub use moving_average::{calculate_ema, calculate_sma};
pub use rsi::calculate_rsi;
pub use volatility::{calculate_average_volume, calculate_volatility, std_dev};
