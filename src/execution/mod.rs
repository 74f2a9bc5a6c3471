// Execution: candle storage and position lifecycle
pub mod candle_store;
pub mod position_manager;

pub use candle_store::{CandleStore, MAX_CANDLES};
pub use position_manager::{EntryDecision, PartialExit, PositionManager, TickOutcome};
