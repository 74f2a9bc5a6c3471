use crate::config::BotSettings;
use crate::models::{
    BotState, ClosedTrade, ExitReason, Position, PositionStatus, TradingMode,
};
use crate::Result;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

/// Postgres persistence for the bot state aggregate and the settings
/// snapshot. Saved after every state-changing engine operation.
pub struct StateStore {
    pool: PgPool,
}

impl StateStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to Postgres");

        Ok(Self { pool })
    }

    /// Write the whole aggregate in one transaction
    pub async fn save_state(&self, state: &BotState) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO bot_state (id, balance, trade_id_counter, is_running, trading_mode, updated_at)
            VALUES (1, $1, $2, $3, $4, NOW())
            ON CONFLICT (id) DO UPDATE SET
                balance = EXCLUDED.balance,
                trade_id_counter = EXCLUDED.trade_id_counter,
                is_running = EXCLUDED.is_running,
                trading_mode = EXCLUDED.trading_mode,
                updated_at = NOW()
            "#,
        )
        .bind(decimal(state.balance)?)
        .bind(state.trade_id_counter as i64)
        .bind(state.is_running)
        .bind(mode_str(state.trading_mode))
        .execute(&mut *tx)
        .await?;

        // open positions are few; rewrite the table wholesale
        sqlx::query("DELETE FROM positions").execute(&mut *tx).await?;
        for position in &state.active_positions {
            sqlx::query(
                r#"
                INSERT INTO positions (
                    id, symbol, entry_price, quantity, initial_quantity,
                    stop_loss, take_profit, highest_price, entry_time,
                    realized_pnl, is_at_breakeven, partial_tp_hit
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(position.id as i64)
            .bind(&position.symbol)
            .bind(decimal(position.entry_price)?)
            .bind(decimal(position.quantity)?)
            .bind(decimal(position.initial_quantity)?)
            .bind(decimal(position.stop_loss)?)
            .bind(decimal(position.take_profit)?)
            .bind(decimal(position.highest_price_since_entry)?)
            .bind(position.entry_time)
            .bind(decimal(position.realized_pnl)?)
            .bind(position.is_at_breakeven)
            .bind(position.partial_tp_hit)
            .execute(&mut *tx)
            .await?;
        }

        // trade history is append-only
        for trade in &state.trade_history {
            sqlx::query(
                r#"
                INSERT INTO trades (
                    id, symbol, entry_price, exit_price, initial_quantity,
                    pnl, pnl_pct, reason, entry_time, exit_time
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(trade.id as i64)
            .bind(&trade.symbol)
            .bind(decimal(trade.entry_price)?)
            .bind(decimal(trade.exit_price)?)
            .bind(decimal(trade.initial_quantity)?)
            .bind(decimal(trade.pnl)?)
            .bind(decimal(trade.pnl_pct)?)
            .bind(reason_str(trade.reason))
            .bind(trade.entry_time)
            .bind(trade.exit_time)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Load the persisted aggregate; None when nothing was saved yet
    pub async fn load_state(&self) -> Result<Option<BotState>> {
        let header = sqlx::query(
            "SELECT balance, trade_id_counter, is_running, trading_mode FROM bot_state WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(header) = header else {
            return Ok(None);
        };

        let balance = to_f64(header.get::<Decimal, _>("balance"))?;
        let trade_id_counter = header.get::<i64, _>("trade_id_counter") as u64;
        let is_running: bool = header.get("is_running");
        let trading_mode = parse_mode(header.get("trading_mode"));

        let mut active_positions = Vec::new();
        let rows = sqlx::query("SELECT * FROM positions ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            active_positions.push(Position {
                id: row.get::<i64, _>("id") as u64,
                symbol: row.get("symbol"),
                entry_price: to_f64(row.get::<Decimal, _>("entry_price"))?,
                quantity: to_f64(row.get::<Decimal, _>("quantity"))?,
                initial_quantity: to_f64(row.get::<Decimal, _>("initial_quantity"))?,
                stop_loss: to_f64(row.get::<Decimal, _>("stop_loss"))?,
                take_profit: to_f64(row.get::<Decimal, _>("take_profit"))?,
                highest_price_since_entry: to_f64(row.get::<Decimal, _>("highest_price"))?,
                entry_time: row.get::<DateTime<Utc>, _>("entry_time"),
                status: PositionStatus::Filled,
                realized_pnl: to_f64(row.get::<Decimal, _>("realized_pnl"))?,
                is_at_breakeven: row.get("is_at_breakeven"),
                partial_tp_hit: row.get("partial_tp_hit"),
            });
        }

        let mut trade_history = Vec::new();
        let rows = sqlx::query("SELECT * FROM trades ORDER BY exit_time ASC, id ASC")
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            trade_history.push(ClosedTrade {
                id: row.get::<i64, _>("id") as u64,
                symbol: row.get("symbol"),
                entry_price: to_f64(row.get::<Decimal, _>("entry_price"))?,
                exit_price: to_f64(row.get::<Decimal, _>("exit_price"))?,
                initial_quantity: to_f64(row.get::<Decimal, _>("initial_quantity"))?,
                pnl: to_f64(row.get::<Decimal, _>("pnl"))?,
                pnl_pct: to_f64(row.get::<Decimal, _>("pnl_pct"))?,
                reason: parse_reason(row.get("reason")),
                entry_time: row.get::<DateTime<Utc>, _>("entry_time"),
                exit_time: row.get::<DateTime<Utc>, _>("exit_time"),
            });
        }

        Ok(Some(BotState {
            balance,
            active_positions,
            trade_history,
            trade_id_counter,
            is_running,
            trading_mode,
        }))
    }

    pub async fn save_settings(&self, settings: &BotSettings) -> Result<()> {
        let data = serde_json::to_string(settings)?;

        sqlx::query(
            r#"
            INSERT INTO bot_settings (id, data, updated_at)
            VALUES (1, $1, NOW())
            ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()
            "#,
        )
        .bind(data)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Load the settings snapshot. An unparseable snapshot is treated as
    /// absent: the caller falls back to defaults and a warning is logged.
    pub async fn load_settings(&self) -> Result<Option<BotSettings>> {
        let row = sqlx::query("SELECT data FROM bot_settings WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let data: String = row.get("data");
        match serde_json::from_str::<BotSettings>(&data) {
            Ok(settings) => Ok(Some(settings)),
            Err(error) => {
                tracing::warn!(%error, "Persisted settings unparseable, using defaults");
                Ok(None)
            }
        }
    }
}

fn decimal(value: f64) -> Result<Decimal> {
    Decimal::from_f64(value).ok_or_else(|| format!("value {} not representable", value).into())
}

fn to_f64(value: Decimal) -> Result<f64> {
    value
        .to_f64()
        .ok_or_else(|| format!("decimal {} out of f64 range", value).into())
}

fn mode_str(mode: TradingMode) -> &'static str {
    match mode {
        TradingMode::Simulated => "Simulated",
        TradingMode::SimulatedRealFeed => "SimulatedRealFeed",
    }
}

fn parse_mode(text: &str) -> TradingMode {
    match text {
        "SimulatedRealFeed" => TradingMode::SimulatedRealFeed,
        "Simulated" => TradingMode::Simulated,
        other => {
            tracing::warn!(mode = other, "Unknown trading mode in store, using default");
            TradingMode::default()
        }
    }
}

fn reason_str(reason: ExitReason) -> &'static str {
    match reason {
        ExitReason::StopLoss => "StopLoss",
        ExitReason::TakeProfit => "TakeProfit",
        ExitReason::Manual => "Manual",
    }
}

fn parse_reason(text: &str) -> ExitReason {
    match text {
        "StopLoss" => ExitReason::StopLoss,
        "TakeProfit" => ExitReason::TakeProfit,
        _ => ExitReason::Manual,
    }
}
