use crate::models::{Position, ScannedPair, TradingMode};
use serde::Serialize;
use tokio::sync::broadcast;

/// Structured events emitted by the core; the delivery transport
/// (websocket broadcast, log sink, ...) subscribes and is out of scope.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notification {
    ScannerUpdate(ScannedPair),
    PositionsUpdated {
        balance: f64,
        active_positions: Vec<Position>,
        closed_trades: usize,
    },
    BotStatusUpdate {
        is_running: bool,
        trading_mode: TradingMode,
        balance: f64,
    },
}

/// Fan-out handle for core notifications.
///
/// Backed by a broadcast channel: a slow or absent subscriber drops its
/// own backlog and never blocks the engine.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn send(&self, notification: Notification) {
        // Err means no subscribers right now; nothing to do
        let _ = self.tx.send(notification);
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(256)
    }
}
