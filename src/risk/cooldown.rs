use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Per-symbol trading suspension windows after a losing exit.
///
/// Entries are lazily expired: reads ignore anything past its deadline,
/// and stale entries are pruned whenever a new one is written.
#[derive(Debug, Clone, Default)]
pub struct CooldownRegistry {
    entries: HashMap<String, DateTime<Utc>>,
}

impl CooldownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a loss-triggered cooldown lasting `hours` from `now`
    pub fn record_loss(&mut self, symbol: &str, now: DateTime<Utc>, hours: f64) {
        if hours <= 0.0 {
            return;
        }

        let until = now + Duration::seconds((hours * 3600.0) as i64);
        self.entries.insert(symbol.to_string(), until);
        self.entries.retain(|_, deadline| *deadline > now);

        tracing::info!(target: "trade", symbol, %until, "Cooldown started after losing exit");
    }

    pub fn is_active(&self, symbol: &str, now: DateTime<Utc>) -> bool {
        self.entries
            .get(symbol)
            .map(|until| *until > now)
            .unwrap_or(false)
    }

    pub fn active_until(&self, symbol: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.entries
            .get(symbol)
            .filter(|until| **until > now)
            .copied()
    }
}
