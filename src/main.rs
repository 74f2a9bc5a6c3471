use pairbot::api::ExchangeClient;
use pairbot::config::BotSettings;
use pairbot::db::StateStore;
use pairbot::discovery::PairDiscovery;
use pairbot::engine::{BotEngine, ControlCommand, MarketEvent};
use pairbot::execution::{CandleStore, PositionManager};
use pairbot::notify::Notifier;
use pairbot::persistence::CandleArchive;
use pairbot::Result;
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;

const DEFAULT_EXCHANGE_URL: &str = "https://api.binance.com";
const FEED_POLL_SECONDS: u64 = 15;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    tracing::info!("pairbot starting");

    // Fatal configuration errors are the only thing allowed to halt startup
    let mut settings = BotSettings::load()?;

    let exchange_url =
        std::env::var("EXCHANGE_API_URL").unwrap_or_else(|_| DEFAULT_EXCHANGE_URL.to_string());
    let exchange = ExchangeClient::new(&exchange_url)?;

    // Optional candle archive: without Redis every discovery cycle fetches
    // full history instead of the delta window
    let archive = match std::env::var("REDIS_URL") {
        Ok(url) => match CandleArchive::new(&url).await {
            Ok(archive) => Some(archive),
            Err(error) => {
                tracing::warn!(%error, "Candle archive unavailable, running without delta fetch");
                None
            }
        },
        Err(_) => None,
    };

    // Optional durable state; without Postgres the bot state is in-memory
    let state_store = match std::env::var("DATABASE_URL") {
        Ok(url) => Some(StateStore::new(&url).await?),
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, bot state will not survive restarts");
            None
        }
    };

    // A persisted settings snapshot wins over file/env defaults
    if let Some(store) = &state_store {
        if let Some(persisted) = store.load_settings().await? {
            match persisted.validate() {
                Ok(()) => settings = persisted,
                Err(error) => {
                    tracing::warn!(%error, "Persisted settings invalid, keeping startup settings")
                }
            }
        }
    }

    let positions = match &state_store {
        Some(store) => match store.load_state().await {
            Ok(Some(state)) => PositionManager::from_state(state),
            Ok(None) => PositionManager::new(settings.initial_virtual_balance),
            Err(error) => {
                tracing::warn!(%error, "Persisted state unreadable, starting fresh");
                PositionManager::new(settings.initial_virtual_balance)
            }
        },
        None => PositionManager::new(settings.initial_virtual_balance),
    };

    tracing::info!(
        balance = positions.balance(),
        open_positions = positions.open_positions().len(),
        strategy = %settings.strategy,
        quote_asset = %settings.quote_asset,
        "Configuration loaded"
    );

    let (settings_tx, settings_rx) = watch::channel(settings.clone());
    let (symbols_tx, symbols_rx) = watch::channel(Vec::<String>::new());
    let (events_tx, events_rx) = mpsc::channel::<MarketEvent>(1024);
    let (commands_tx, commands_rx) = mpsc::channel::<ControlCommand>(32);

    let store = CandleStore::default();
    let notifier = Notifier::default();

    let engine = BotEngine::new(
        settings,
        Some(settings_tx),
        Some(symbols_tx),
        store.clone(),
        positions,
        notifier.clone(),
        state_store,
    );
    let engine_task = tokio::spawn(engine.run(events_rx, commands_rx));

    // Discovery loop: refresh the monitored set every sync interval
    let discovery_task = {
        let discovery = PairDiscovery::new(exchange.clone());
        let store = store.clone();
        let settings_rx = settings_rx.clone();
        let events_tx = events_tx.clone();
        tokio::spawn(async move {
            discovery_loop(discovery, store, archive, settings_rx, events_tx).await;
        })
    };

    // Feed loop: poll the scoring-timeframe klines for monitored symbols
    // and turn them into closed-candle + price-tick events
    let feed_task = {
        let exchange = exchange.clone();
        let events_tx = events_tx.clone();
        tokio::spawn(async move {
            feed_loop(exchange, symbols_rx, settings_rx, events_tx).await;
        })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    let _ = commands_tx.send(ControlCommand::Shutdown).await;
    discovery_task.abort();
    feed_task.abort();
    let _ = engine_task.await;

    Ok(())
}

async fn discovery_loop(
    discovery: PairDiscovery,
    store: CandleStore,
    mut archive: Option<CandleArchive>,
    settings_rx: watch::Receiver<BotSettings>,
    events_tx: mpsc::Sender<MarketEvent>,
) {
    loop {
        let settings = settings_rx.borrow().clone();

        match discovery
            .run_cycle(&settings, &store, archive.as_mut())
            .await
        {
            Ok(outcome) => {
                if events_tx
                    .send(MarketEvent::DiscoveryCompleted(outcome))
                    .await
                    .is_err()
                {
                    return; // engine gone
                }
            }
            Err(error) => {
                tracing::warn!(
                    target: "discovery",
                    %error,
                    "Discovery cycle aborted, previous set kept until next interval"
                );
            }
        }

        tokio::time::sleep(Duration::from_secs(settings.sync_seconds)).await;
    }
}

async fn feed_loop(
    exchange: ExchangeClient,
    symbols_rx: watch::Receiver<Vec<String>>,
    settings_rx: watch::Receiver<BotSettings>,
    events_tx: mpsc::Sender<MarketEvent>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(FEED_POLL_SECONDS));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let symbols = symbols_rx.borrow().clone();
        let timeframe = settings_rx.borrow().scoring_tf();

        for symbol in symbols {
            // last two klines: the newest closed candle plus the live one
            match exchange.klines(&symbol, timeframe, None, 2).await {
                Ok(candles) if candles.len() >= 2 => {
                    let closed = candles[candles.len() - 2].clone();
                    let live_price = candles[candles.len() - 1].close;

                    let closed_event = MarketEvent::CandleClosed {
                        symbol: symbol.clone(),
                        timeframe,
                        candle: closed,
                    };
                    let tick_event = MarketEvent::PriceTick {
                        symbol,
                        price: live_price,
                    };

                    if events_tx.send(closed_event).await.is_err()
                        || events_tx.send(tick_event).await.is_err()
                    {
                        return;
                    }
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(target: "feed", %symbol, %error, "Kline poll failed");
                }
            }
        }
    }
}

fn setup_logging() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}
