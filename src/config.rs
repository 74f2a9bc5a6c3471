use crate::models::Timeframe;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How the auto-break-even trigger is expressed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BreakevenTriggerStyle {
    /// Trigger when total PnL% reaches the configured value
    Percent,
    /// Trigger when gain per unit reaches value x initial risk per unit
    RMultiple,
}

/// Flat bot configuration. Read-mostly: the engine reads one consistent
/// snapshot at the start of each evaluation cycle; updates replace the
/// whole struct through the settings watch channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BotSettings {
    // Discovery
    pub quote_asset: String,
    pub min_volume_usd: f64,
    /// Comma-separated symbols to never trade
    pub excluded_pairs: String,
    pub sync_seconds: u64,
    pub scoring_timeframe: String,
    pub regime_timeframe: String,

    // Scoring
    pub strategy: String,
    pub min_volatility_pct: f64,
    pub use_market_regime_filter: bool,
    pub use_multi_timeframe_confirmation: bool,
    pub use_volume_confirmation: bool,
    pub require_strong_buy: bool,

    // Stops and targets
    pub use_atr_stop_loss: bool,
    pub atr_multiplier: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub use_trailing_stop_loss: bool,
    pub trailing_stop_loss_pct: f64,
    pub use_auto_breakeven: bool,
    pub breakeven_trigger_style: BreakevenTriggerStyle,
    pub breakeven_trigger: f64,
    pub use_partial_take_profit: bool,
    pub partial_tp_trigger_pct: f64,
    pub partial_tp_sell_qty_pct: f64,

    // Sizing and capacity
    pub max_open_positions: usize,
    pub position_size_pct: f64,
    pub use_dynamic_position_sizing: bool,
    pub strong_buy_position_size_pct: f64,
    pub loss_cooldown_hours: f64,
    pub slippage_pct: f64,
    pub initial_virtual_balance: f64,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            quote_asset: "USDT".to_string(),
            min_volume_usd: 5_000_000.0,
            excluded_pairs: String::new(),
            sync_seconds: 1800,
            scoring_timeframe: "1m".to_string(),
            regime_timeframe: "4h".to_string(),

            strategy: "filter_chain".to_string(),
            min_volatility_pct: 0.5,
            use_market_regime_filter: true,
            use_multi_timeframe_confirmation: true,
            use_volume_confirmation: true,
            require_strong_buy: true,

            use_atr_stop_loss: true,
            atr_multiplier: 2.0,
            stop_loss_pct: 2.0,
            take_profit_pct: 4.0,
            use_trailing_stop_loss: true,
            trailing_stop_loss_pct: 2.0,
            use_auto_breakeven: true,
            breakeven_trigger_style: BreakevenTriggerStyle::Percent,
            breakeven_trigger: 1.5,
            use_partial_take_profit: true,
            partial_tp_trigger_pct: 2.0,
            partial_tp_sell_qty_pct: 50.0,

            max_open_positions: 5,
            position_size_pct: 10.0,
            use_dynamic_position_sizing: true,
            strong_buy_position_size_pct: 15.0,
            loss_cooldown_hours: 4.0,
            slippage_pct: 0.1,
            initial_virtual_balance: 10_000.0,
        }
    }
}

impl BotSettings {
    /// Load settings from an optional `pairbot.toml` plus `PAIRBOT_`-prefixed
    /// environment variables layered over the defaults
    pub fn load() -> anyhow::Result<Self> {
        let settings: BotSettings = config::Config::builder()
            .add_source(config::File::with_name("pairbot").required(false))
            .add_source(config::Environment::with_prefix("PAIRBOT"))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Fatal-configuration check: the only error class that halts startup
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.strategy != "filter_chain" && self.strategy != "breakout" {
            anyhow::bail!("Unknown strategy '{}'", self.strategy);
        }
        if Timeframe::parse(&self.scoring_timeframe).is_none() {
            anyhow::bail!("Invalid scoring timeframe '{}'", self.scoring_timeframe);
        }
        if Timeframe::parse(&self.regime_timeframe).is_none() {
            anyhow::bail!("Invalid regime timeframe '{}'", self.regime_timeframe);
        }
        if self.position_size_pct <= 0.0 || self.position_size_pct > 100.0 {
            anyhow::bail!("position_size_pct must be in (0, 100]");
        }
        if self.partial_tp_sell_qty_pct <= 0.0 || self.partial_tp_sell_qty_pct >= 100.0 {
            anyhow::bail!("partial_tp_sell_qty_pct must be in (0, 100)");
        }
        if self.max_open_positions == 0 {
            anyhow::bail!("max_open_positions must be at least 1");
        }
        if self.initial_virtual_balance <= 0.0 {
            anyhow::bail!("initial_virtual_balance must be positive");
        }
        if self.stop_loss_pct <= 0.0 || self.take_profit_pct <= 0.0 {
            anyhow::bail!("stop_loss_pct and take_profit_pct must be positive");
        }
        if self.sync_seconds == 0 {
            anyhow::bail!("sync_seconds must be positive");
        }
        Ok(())
    }

    pub fn excluded_set(&self) -> HashSet<String> {
        self.excluded_pairs
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Parsed scoring timeframe; validated at startup
    pub fn scoring_tf(&self) -> Timeframe {
        Timeframe::parse(&self.scoring_timeframe).unwrap_or(Timeframe::M1)
    }

    /// Parsed long timeframe used for regime classification
    pub fn regime_tf(&self) -> Timeframe {
        Timeframe::parse(&self.regime_timeframe).unwrap_or(Timeframe::H4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(BotSettings::default().validate().is_ok());
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let settings = BotSettings {
            strategy: "martingale".to_string(),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_bad_timeframe_rejected() {
        let settings = BotSettings {
            scoring_timeframe: "7m".to_string(),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_position_size_bounds() {
        let settings = BotSettings {
            position_size_pct: 0.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = BotSettings {
            partial_tp_sell_qty_pct: 100.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_excluded_set_parsing() {
        let settings = BotSettings {
            excluded_pairs: "busdusdt, TUSDUSDT ,,usdcusdt".to_string(),
            ..Default::default()
        };

        let excluded = settings.excluded_set();
        assert_eq!(excluded.len(), 3);
        assert!(excluded.contains("BUSDUSDT"));
        assert!(excluded.contains("TUSDUSDT"));
        assert!(excluded.contains("USDCUSDT"));
    }

    #[test]
    fn test_settings_serde_round_trip() {
        let settings = BotSettings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let restored: BotSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, settings);
    }
}
