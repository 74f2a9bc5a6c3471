// Exchange-facing REST surface
pub mod exchange;

pub use exchange::{ExchangeClient, ExchangeError, TickerSummary};
