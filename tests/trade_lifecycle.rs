//! End-to-end trade lifecycle through a live `TradingEngine`: a strategy
//! signals once, the engine sizes and places the order, then a later cycle
//! reconciles the position's disappearance from the broker into a single
//! immutable close.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use tokio::sync::mpsc;

use zonecore::domain::candle::Granularity;
use zonecore::domain::ports::TradeRepository;
use zonecore::domain::signal::{Direction, EntrySignal, GateDiagnostics, StrategyResult};
use zonecore::domain::stream_config::{SessionWindow, StreamConfig};
use zonecore::domain::trade::{RunMode, TradeStatus};
use zonecore::engine::{EngineCommand, InstrumentSpec, TradingEngine};
use zonecore::risk::DrawdownSupervisor;
use zonecore::status::StatusProjection;
use zonecore::strategies::{StrategyContext, TradingStrategy};
use zonecore::testing::{InMemoryEquitySnapshotRepository, InMemoryTradeRepository, MockBroker};

/// Signals exactly once, then vetoes every later cycle. Mirrors a strategy
/// that found its one setup and has nothing left to say.
struct SignalOnceStrategy {
    signalled: AtomicBool,
}

impl TradingStrategy for SignalOnceStrategy {
    fn id(&self) -> &'static str {
        "signal_once"
    }

    fn gates(&self) -> &'static [&'static str] {
        &["signal_once"]
    }

    fn evaluate(&self, ctx: &StrategyContext) -> StrategyResult {
        if self.signalled.swap(true, Ordering::SeqCst) {
            return StrategyResult::veto("already signalled this run", GateDiagnostics::default());
        }
        StrategyResult::Signal(EntrySignal {
            direction: Direction::Buy,
            entry_price: dec!(1.10000),
            stop_loss: dec!(1.09800),
            take_profit: dec!(1.10400),
            zone: None,
            reason: "test fixture signal".to_string(),
            stream: ctx.config.name.clone(),
            evaluated_at: ctx.evaluated_at,
        })
    }
}

fn stream_config() -> StreamConfig {
    StreamConfig {
        name: "eur_usd_lifecycle".to_string(),
        instrument: "EUR_USD".to_string(),
        strategy_id: "signal_once".to_string(),
        granularities: vec![Granularity::M5],
        poll_interval: Duration::from_millis(15),
        risk_percent_per_trade: dec!(1),
        max_concurrent_positions: 1,
        target_rr: None,
        session: SessionWindow::all_day(),
        enabled: true,
    }
}

#[tokio::test]
async fn a_trade_moves_from_open_to_closed_exactly_once_and_stays_immutable() {
    let broker = Arc::new(MockBroker::new(dec!(10000)));
    broker.set_next_fill_price(dec!(1.10000));
    broker.set_next_event_time(chrono::Utc::now());

    let trade_repo = Arc::new(InMemoryTradeRepository::default());
    let equity_repo = Arc::new(InMemoryEquitySnapshotRepository::default());
    let status = Arc::new(StatusProjection::new());
    let drawdown = DrawdownSupervisor::new(dec!(10000), dec!(20));
    let (cmd_tx, cmd_rx) = mpsc::channel(4);

    let engine = TradingEngine::new(
        RunMode::Paper,
        Arc::new(tokio::sync::RwLock::new(stream_config())),
        InstrumentSpec::fx_default(),
        broker.clone(),
        Arc::new(SignalOnceStrategy {
            signalled: AtomicBool::new(false),
        }),
        trade_repo.clone(),
        equity_repo,
        drawdown,
        status,
        cmd_rx,
        "eur_usd_lifecycle".to_string(),
    );
    let handle = tokio::spawn(engine.run());

    let opened = wait_for(Duration::from_secs(2), || {
        let trade_repo = trade_repo.clone();
        async move { trade_repo.find_open("eur_usd_lifecycle").await.unwrap().len() == 1 }
    })
    .await;
    assert!(opened, "expected the engine to open exactly one trade");

    let open_trades = trade_repo.find_open("eur_usd_lifecycle").await.unwrap();
    assert_eq!(open_trades.len(), 1);
    let trade = &open_trades[0];
    assert_eq!(trade.status, TradeStatus::Open);
    assert_eq!(trade.direction, Direction::Buy);
    assert_eq!(trade.entry_price, dec!(1.10000));
    assert!(trade.exit_price.is_none());
    assert!(trade.closed_at.is_none());

    // Simulate the broker having closed the position on its own (stop or
    // target fill) without the engine ever calling close_order.
    broker.clear_all_positions();

    let closed = wait_for(Duration::from_secs(2), || {
        let trade_repo = trade_repo.clone();
        async move { trade_repo.find_recent_closed(10).await.unwrap().len() == 1 }
    })
    .await;
    assert!(closed, "expected the vanished position to reconcile into one closed trade");

    assert!(trade_repo.find_open("eur_usd_lifecycle").await.unwrap().is_empty());
    let closed_trades = trade_repo.find_recent_closed(10).await.unwrap();
    assert_eq!(closed_trades.len(), 1);
    let closed_trade = &closed_trades[0];
    assert_eq!(closed_trade.id, trade.id);
    assert_eq!(closed_trade.status, TradeStatus::Closed);
    assert!(closed_trade.exit_price.is_some());
    assert!(closed_trade.exit_reason.is_some());
    assert!(closed_trade.pnl.is_some());
    assert!(closed_trade.closed_at.is_some());

    // A further reconcile window must not re-close or duplicate the row.
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(trade_repo.find_recent_closed(10).await.unwrap().len(), 1);

    let _ = cmd_tx.send(EngineCommand::Stop).await;
    let _ = handle.await;
}

async fn wait_for<F, Fut>(timeout: Duration, mut predicate: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn settings_updates_do_not_disturb_an_in_flight_trade() {
    use zonecore::engine::EngineManager;
    use zonecore::domain::stream_config::StreamConfigSet;

    let broker = Arc::new(MockBroker::new(dec!(10000)));
    broker.set_next_fill_price(dec!(1.10000));
    let trade_repo = Arc::new(InMemoryTradeRepository::default());
    let equity_repo = Arc::new(InMemoryEquitySnapshotRepository::default());
    let status = Arc::new(StatusProjection::new());
    let drawdown = DrawdownSupervisor::new(dec!(10000), dec!(20));

    let mut manager = EngineManager::new(RunMode::Paper, broker, trade_repo.clone(), equity_repo, drawdown, status.clone());

    let mut config = stream_config();
    config.name = "eur_usd_settings".to_string();
    config.strategy_id = "sr_rejection".to_string();
    let streams = StreamConfigSet { streams: vec![config.clone()] };
    manager.start_all(&streams, &HashMap::new());

    tokio::time::sleep(Duration::from_millis(40)).await;

    let mut updated = config.clone();
    updated.risk_percent_per_trade = dec!(2);
    assert!(manager.apply_settings(updated).await);
    assert!(!manager.apply_settings(stream_config_named("unknown")).await);

    manager.stop_all().await;
}

fn stream_config_named(name: &str) -> StreamConfig {
    let mut config = stream_config();
    config.name = name.to_string();
    config
}
